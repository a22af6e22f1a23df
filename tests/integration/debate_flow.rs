//! Debate integration tests.
//!
//! These tests run a debate from enrolment to synthesis, with every step
//! persisted and reloaded between calls as separate agents would see it.

use team_tasks::workflow::{DebatePhase, RoundType};
use team_tasks::{Error, ProjectStatus};

use crate::fixtures::TestStore;

/// Test: Three debaters, full debate
/// Given debaters a1, a2 and a3
/// When all respond to the initial round and the cross-review round
/// Then the synthesis package carries every response, keyed by round
#[test]
fn test_full_debate() {
    let store = TestStore::new();
    store.create_debate(
        "arch",
        &[("a1", Some("pragmatist")), ("a2", Some("skeptic")), ("a3", None)],
    );

    let prompts = store
        .manager
        .mutate("arch", "round start", |p| p.round_start())
        .unwrap()
        .value;
    assert_eq!(prompts.len(), 3);
    assert_eq!(prompts[0].goal, "integration goal");
    assert_eq!(prompts[2].role, "no role specified");

    for (agent, text) in [("a1", "use sqlite"), ("a2", "use postgres")] {
        let outcome = store
            .manager
            .mutate("arch", "round collect", |p| p.round_collect(agent, text))
            .unwrap()
            .value;
        assert!(!outcome.complete);
    }
    let last = store
        .manager
        .mutate("arch", "round collect", |p| p.round_collect("a3", "use files"))
        .unwrap()
        .value;
    assert!(last.complete);
    assert_eq!(last.next, Some(RoundType::CrossReview));

    let reviews = store
        .manager
        .mutate("arch", "round cross-review", |p| p.round_cross_review())
        .unwrap()
        .value;
    let a1 = reviews.iter().find(|r| r.agent_id == "a1").unwrap();
    assert_eq!(a1.own_response, "use sqlite");
    let peers: Vec<&str> = a1.peers.iter().map(|p| p.agent_id.as_str()).collect();
    assert_eq!(peers, vec!["a2", "a3"]);

    for agent in ["a1", "a2", "a3"] {
        store
            .manager
            .mutate("arch", "round collect", |p| {
                p.round_collect(agent, &format!("{} agrees on sqlite", agent))
            })
            .unwrap();
    }

    let project = store.manager.read("arch").unwrap();
    assert_eq!(project.debate("status").unwrap().phase(), DebatePhase::CrossReviewDone);
    assert_eq!(project.summary().detail.next_round, Some(RoundType::Synthesis));

    let package = store
        .manager
        .mutate("arch", "round synthesize", |p| p.round_synthesize())
        .unwrap()
        .value;
    assert_eq!(package.debaters.len(), 3);
    let a2 = &package.debaters[1];
    assert_eq!(a2.responses["initial"], "use postgres");
    assert_eq!(a2.responses["cross-review"], "a2 agrees on sqlite");

    let project = store.manager.read("arch").unwrap();
    assert_eq!(project.status, ProjectStatus::Completed);
    let progress = project.engine().progress();
    assert_eq!((progress.done, progress.total), (3, 3));
}

/// Test: Round ordering is enforced
#[test]
fn test_cross_review_before_initial_done() {
    let store = TestStore::new();
    store.create_debate("arch", &[("a1", None), ("a2", None)]);
    store
        .manager
        .mutate("arch", "round start", |p| p.round_start())
        .unwrap();
    store
        .manager
        .mutate("arch", "round collect", |p| p.round_collect("a1", "yes"))
        .unwrap();

    let err = store
        .manager
        .mutate("arch", "round cross-review", |p| p.round_cross_review())
        .unwrap_err();
    assert!(matches!(err, Error::RoundNotReady(_)));

    let err = store
        .manager
        .mutate("arch", "round collect", |p| p.round_collect("zz", "hi"))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownDebater(_)));

    let err = store
        .manager
        .mutate("arch", "add-debater", |p| p.add_debater("late", None))
        .unwrap_err();
    assert!(matches!(err, Error::DebatersLocked(_)));
}

/// Test: Reopen allows revision after a round closes
/// Given a completed initial round
/// When it is reopened and one debater resubmits
/// Then the new response replaces the old one and the round closes again
#[test]
fn test_reopen_and_revise() {
    let store = TestStore::new();
    store.create_debate("arch", &[("a1", None), ("a2", None)]);
    store
        .manager
        .mutate("arch", "round start", |p| p.round_start())
        .unwrap();
    for agent in ["a1", "a2"] {
        store
            .manager
            .mutate("arch", "round collect", |p| p.round_collect(agent, "first"))
            .unwrap();
    }

    let err = store
        .manager
        .mutate("arch", "round collect", |p| p.round_collect("a1", "second"))
        .unwrap_err();
    assert!(matches!(err, Error::RoundNotReady(_)));

    let reopened = store
        .manager
        .mutate("arch", "round reopen", |p| p.round_reopen())
        .unwrap()
        .value;
    assert_eq!(reopened.round, 1);
    assert_eq!(reopened.responses, 2);

    let outcome = store
        .manager
        .mutate("arch", "round collect", |p| p.round_collect("a1", "second"))
        .unwrap()
        .value;
    assert!(outcome.complete);

    let project = store.manager.read("arch").unwrap();
    let debate = project.debate("status").unwrap();
    assert_eq!(debate.rounds()[0].responses["a1"], "second");
    let a1 = &debate.debater("a1").unwrap().responses;
    assert_eq!(a1.len(), 1);
    assert_eq!(a1[0].response, "second");
}
