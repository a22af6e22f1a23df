//! Linear pipeline integration tests.
//!
//! These tests walk a pipeline stage by stage through the file store and
//! check that each hand-off carries the previous stage's output.

use team_tasks::core::StageStatus;
use team_tasks::workflow::StageUpdate;
use team_tasks::{Error, Mode, ProjectStatus};

use crate::fixtures::TestStore;

/// Test: Full pipeline hand-off
/// Given a three-stage pipeline
/// When each stage records a result and completes in turn
/// Then `next` advances and forwards the previous output, and the project completes
#[test]
fn test_pipeline_hand_off() {
    let store = TestStore::new();
    store.create("site", Mode::Linear, &["code-agent", "test-agent", "docs-agent"]);

    let next = store.manager.read("site").unwrap().next_stage().unwrap().unwrap();
    assert_eq!(next.stage, "code-agent");
    assert_eq!(next.agent, "code-agent");
    assert_eq!(next.workspace.as_deref(), Some("/tmp/ws"));
    assert!(next.previous.is_none());

    store
        .manager
        .mutate("site", "result", |p| p.record_result("code-agent", "wrote src/lib.rs"))
        .unwrap();
    let committed = store
        .manager
        .mutate("site", "update", |p| p.update_stage("code-agent", StageStatus::Done))
        .unwrap();
    match committed.value {
        StageUpdate::Linear(transition) => {
            assert_eq!(transition.current_stage.as_deref(), Some("test-agent"));
        }
        other => panic!("Expected a linear transition, got {:?}", other),
    }

    let next = store.manager.read("site").unwrap().next_stage().unwrap().unwrap();
    assert_eq!(next.stage, "test-agent");
    let previous = next.previous.expect("previous output should be forwarded");
    assert_eq!(previous.stage, "code-agent");
    assert_eq!(previous.output, "wrote src/lib.rs");

    for stage in ["test-agent", "docs-agent"] {
        store
            .manager
            .mutate("site", "update", |p| p.update_stage(stage, StageStatus::Done))
            .unwrap();
    }

    let project = store.manager.read("site").unwrap();
    assert_eq!(project.status, ProjectStatus::Completed);
    assert!(project.next_stage().unwrap().is_none());
    let summary = project.summary();
    assert_eq!(summary.progress.done, 3);
    assert_eq!(summary.progress.total, 3);
}

/// Test: Failed stage blocks the pipeline until reset
#[test]
fn test_failed_stage_needs_reset() {
    let store = TestStore::new();
    store.create("site", Mode::Linear, &["code", "test"]);

    store
        .manager
        .mutate("site", "update", |p| p.update_stage("code", StageStatus::Failed))
        .unwrap();
    assert_eq!(store.manager.read("site").unwrap().status, ProjectStatus::Failed);

    let err = store
        .manager
        .mutate("site", "update", |p| p.update_stage("code", StageStatus::Done))
        .unwrap_err();
    assert!(matches!(err, Error::StageFailed { .. }));

    store
        .manager
        .mutate("site", "reset", |p| p.reset_stage("code"))
        .unwrap();
    let project = store.manager.read("site").unwrap();
    assert_eq!(project.status, ProjectStatus::Active);
    assert_eq!(project.summary().detail.current_stage.as_deref(), Some("code"));
}

/// Test: Skipped stages hold the pipeline
/// Given a stage marked skipped
/// Then it stays the current stage, since only done advances
#[test]
fn test_skipped_stage_does_not_advance() {
    let store = TestStore::new();
    store.create("site", Mode::Linear, &["code", "test"]);
    store
        .manager
        .mutate("site", "update", |p| p.update_stage("code", StageStatus::Skipped))
        .unwrap();
    let next = store.manager.read("site").unwrap().next_stage().unwrap().unwrap();
    assert_eq!(next.stage, "code");
    assert_eq!(next.status, StageStatus::Skipped);
}

/// Test: Logs and history survive a reload
#[test]
fn test_history_is_persisted() {
    let store = TestStore::new();
    store.create("site", Mode::Linear, &["code"]);
    store
        .manager
        .mutate("site", "assign", |p| p.assign("code", "Implement the parser"))
        .unwrap();
    store
        .manager
        .mutate("site", "log", |p| p.append_log("code", "halfway there"))
        .unwrap();

    let project = store.other_manager().read("site").unwrap();
    let events: Vec<&str> = project
        .history("code")
        .unwrap()
        .iter()
        .map(|e| e.event.as_str())
        .collect();
    assert!(events.contains(&"halfway there"));
    assert_eq!(events.last(), Some(&"halfway there"));
    assert_eq!(
        project.next_stage().unwrap().unwrap().description,
        "Implement the parser"
    );
}

/// Test: DAG-only commands are rejected for linear projects
#[test]
fn test_dag_commands_rejected() {
    let store = TestStore::new();
    store.create("site", Mode::Linear, &["code"]);
    let err = store
        .manager
        .mutate("site", "add", |p| p.add_stage("extra", "agent", &[], None))
        .unwrap_err();
    assert!(matches!(err, Error::WrongMode { .. }));
    assert!(store.manager.read("site").unwrap().ready().is_err());
}
