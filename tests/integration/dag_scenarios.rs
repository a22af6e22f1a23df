//! DAG integration tests.
//!
//! These tests verify dependency resolution, parallel dispatch and cycle
//! rejection against projects persisted in the file store.

use team_tasks::core::StageStatus;
use team_tasks::workflow::StageUpdate;
use team_tasks::{Error, ProjectStatus};

use crate::fixtures::TestStore;

fn update(store: &TestStore, stage: &str, status: StageStatus) -> StageUpdate {
    store
        .manager
        .mutate("build", "update", |p| p.update_stage(stage, status))
        .expect("update should succeed")
        .value
}

fn unblocked(update: &StageUpdate) -> Vec<String> {
    match update {
        StageUpdate::Dag(transition) => transition.newly_unblocked.clone(),
        other => panic!("Expected a dag transition, got {:?}", other),
    }
}

/// Test: Fan-in dispatch
/// Given A and B with no dependencies and C depending on both
/// When A and then B complete with outputs
/// Then C is unblocked only after B, with both outputs in its context
#[test]
fn test_fan_in_dispatch() {
    let store = TestStore::new();
    store.create_dag("build", &[("a", &[]), ("b", &[]), ("c", &["a", "b"])]);

    let ready: Vec<String> = store
        .manager
        .read("build")
        .unwrap()
        .ready()
        .unwrap()
        .into_iter()
        .map(|r| r.stage)
        .collect();
    assert_eq!(ready, vec!["a", "b"]);

    for (stage, output) in [("a", "schema drafted"), ("b", "api sketched")] {
        store
            .manager
            .mutate("build", "result", |p| p.record_result(stage, output))
            .unwrap();
    }

    let after_a = update(&store, "a", StageStatus::Done);
    assert!(unblocked(&after_a).is_empty());

    let after_b = update(&store, "b", StageStatus::Done);
    assert_eq!(unblocked(&after_b), vec!["c"]);

    let ready = store.manager.read("build").unwrap().ready().unwrap();
    assert_eq!(ready.len(), 1);
    let c = &ready[0];
    assert_eq!(c.stage, "c");
    assert_eq!(c.agent, "c-agent");
    assert_eq!(c.workspace.as_deref(), Some("/tmp/ws"));
    assert_eq!(c.dependency_outputs.len(), 2);
    assert_eq!(
        c.context,
        "### a (a-agent)\nschema drafted\n\n### b (b-agent)\napi sketched"
    );

    update(&store, "c", StageStatus::Done);
    let project = store.manager.read("build").unwrap();
    assert_eq!(project.status, ProjectStatus::Completed);
    assert!(project.ready().unwrap().is_empty());
}

/// Test: Cycle rejection leaves the graph untouched
/// Given C depending on D
/// When D is made to depend on C
/// Then the edge is refused with the cycle path and nothing is saved
#[test]
fn test_cycle_rejected() {
    let store = TestStore::new();
    store.create_dag("build", &[("d", &[]), ("c", &["d"])]);
    let before = std::fs::read_to_string(store.dir().join("build.json")).unwrap();

    let err = store
        .manager
        .mutate("build", "depend", |p| p.depend("d", &["c".to_string()]))
        .unwrap_err();
    match err {
        Error::CycleDetected { path } => {
            assert_eq!(path.first().map(String::as_str), Some("d"));
            assert_eq!(path.last().map(String::as_str), Some("d"));
            assert!(path.contains(&"c".to_string()));
        }
        other => panic!("Expected CycleDetected, got {:?}", other),
    }

    let after = std::fs::read_to_string(store.dir().join("build.json")).unwrap();
    assert_eq!(before, after);
}

/// Test: Unknown dependency is refused at add time
#[test]
fn test_unknown_dependency_rejected() {
    let store = TestStore::new();
    store.create_dag("build", &[("a", &[])]);
    let err = store
        .manager
        .mutate("build", "add", |p| {
            p.add_stage("b", "b-agent", &["ghost".to_string()], None)
        })
        .unwrap_err();
    assert!(matches!(err, Error::UnknownDependency { .. }));
    assert_eq!(store.manager.read("build").unwrap().dag("test").unwrap().len(), 1);
}

/// Test: Failure propagation
/// Given a chain a -> b -> c and an independent d
/// When a fails
/// Then b and c are reported blocked while d stays dispatchable
#[test]
fn test_failure_blocks_descendants() {
    let store = TestStore::new();
    store.create_dag(
        "build",
        &[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &[])],
    );

    match update(&store, "a", StageStatus::Failed) {
        StageUpdate::Dag(transition) => assert_eq!(transition.ready, vec!["d"]),
        other => panic!("Expected a dag transition, got {:?}", other),
    }

    let project = store.manager.read("build").unwrap();
    let detail = project.summary().detail;
    assert_eq!(detail.blocked, vec!["b", "c"]);
    assert_eq!(detail.ready, vec!["d"]);
    assert_eq!(project.status, ProjectStatus::Active);

    update(&store, "d", StageStatus::Done);
    assert_eq!(store.manager.read("build").unwrap().status, ProjectStatus::Failed);

    let reset = store
        .manager
        .mutate("build", "reset", |p| p.reset_stage("a"))
        .unwrap();
    assert_eq!(unblocked(&reset.value), vec!["a"]);
    assert_eq!(reset.project.status, ProjectStatus::Active);
}

/// Test: Skipped dependencies do not unblock dependents
#[test]
fn test_skipped_dependency_keeps_dependent_waiting() {
    let store = TestStore::new();
    store.create_dag("build", &[("a", &[]), ("b", &["a"])]);
    let skipped = update(&store, "a", StageStatus::Skipped);
    assert!(unblocked(&skipped).is_empty());
    assert!(store.manager.read("build").unwrap().ready().unwrap().is_empty());
}

/// Test: Dependency tree rendering
#[test]
fn test_graph_marks_repeated_nodes() {
    let store = TestStore::new();
    store.create_dag("build", &[("a", &[]), ("b", &[]), ("c", &["a", "b"])]);
    let tree = store.manager.read("build").unwrap().graph().unwrap();

    let stages: Vec<(&str, bool)> = tree
        .iter()
        .map(|line| (line.stage.as_str(), line.repeated))
        .collect();
    assert_eq!(
        stages,
        vec![("a", false), ("c", false), ("b", false), ("c", true)]
    );
}

/// Test: Late upstream failure
/// Given a chain a -> b -> c with a and b done
/// When a is moved to failed
/// Then c leaves the ready set and is reported only as blocked
#[test]
fn test_late_failure_blocks_ready_stage() {
    let store = TestStore::new();
    store.create_dag("build", &[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
    update(&store, "a", StageStatus::Done);
    update(&store, "b", StageStatus::Done);
    assert_eq!(store.manager.read("build").unwrap().ready().unwrap().len(), 1);

    update(&store, "a", StageStatus::Failed);

    let project = store.manager.read("build").unwrap();
    assert!(project.ready().unwrap().is_empty());
    let detail = project.summary().detail;
    assert!(detail.ready.is_empty());
    assert_eq!(detail.blocked, vec!["c"]);
    assert_eq!(project.status, ProjectStatus::Failed);
}
