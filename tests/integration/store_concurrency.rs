//! Store and locking integration tests.
//!
//! These tests verify that concurrent writers through separate managers,
//! as separate processes would be, never lose updates, and that rejected
//! operations leave the stored record untouched.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use team_tasks::core::StageStatus;
use team_tasks::state::LockFile;
use team_tasks::{Error, ErrorKind, FileStore, Mode, ProjectManager, ProjectStore};

use crate::fixtures::TestStore;

/// Test: No lost updates across managers
/// Given eight threads, each with its own manager over the same directory
/// When each adds a distinct stage to the same project
/// Then every stage is present afterwards
#[test]
fn test_concurrent_writers_lose_nothing() {
    let store = TestStore::new();
    store.create("busy", Mode::Dag, &[]);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let manager = store.other_manager();
            thread::spawn(move || {
                manager
                    .mutate("busy", "add", |p| {
                        p.add_stage(&format!("s{}", i), "agent", &[], None)
                    })
                    .expect("add should succeed");
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let project = store.manager.read("busy").unwrap();
    let dag = project.dag("test").unwrap();
    assert_eq!(dag.len(), 8);
    for i in 0..8 {
        assert!(dag.contains(&format!("s{}", i)));
    }
    assert!(!store.dir().join("busy.lock").exists());
}

/// Test: Shared manager serializes status updates
#[test]
fn test_shared_manager_updates() {
    let store = TestStore::new();
    let stages = ["a", "b", "c", "d"];
    store.create("flow", Mode::Linear, &stages);
    let manager = Arc::new(store.other_manager());

    let handles: Vec<_> = stages
        .iter()
        .map(|stage| {
            let manager = Arc::clone(&manager);
            let stage = stage.to_string();
            thread::spawn(move || {
                manager
                    .mutate("flow", "update", |p| p.update_stage(&stage, StageStatus::Done))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let project = manager.read("flow").unwrap();
    assert_eq!(project.summary().progress.done, 4);
}

/// Test: Rejected operation writes nothing
#[test]
fn test_rejected_operation_leaves_file_identical() {
    let store = TestStore::new();
    store.create_dag("build", &[("a", &[])]);
    let path = store.dir().join("build.json");
    let before = std::fs::read(&path).unwrap();

    let err = store
        .manager
        .mutate("build", "add", |p| p.add_stage("a", "again", &[], None))
        .unwrap_err();
    assert!(matches!(err, Error::StageExists(_)));
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

/// Test: Held lock times out other writers
/// Given a lock held on a project
/// When another manager with a short timeout mutates it
/// Then it fails with LockTimeout and the lock holder is unaffected
#[test]
fn test_lock_timeout() {
    let store = TestStore::new();
    store.create("held", Mode::Linear, &["a"]);

    let impatient = ProjectManager::new(
        FileStore::new(store.dir()).with_lock_timeout(Duration::from_millis(50)),
    );
    let guard: LockFile = store.manager.store().lock("held").unwrap();

    let err = impatient
        .mutate("held", "update", |p| p.update_stage("a", StageStatus::Done))
        .unwrap_err();
    assert!(matches!(err, Error::LockTimeout { .. }));
    assert_eq!(err.kind(), ErrorKind::Storage);

    drop(guard);
    assert!(!store.dir().join("held.lock").exists());
    impatient
        .mutate("held", "update", |p| p.update_stage("a", StageStatus::Done))
        .unwrap();
}

/// Test: Stale lock files are broken
#[test]
fn test_stale_lock_is_broken() {
    let store = TestStore::new();
    store.create("stale", Mode::Linear, &["a"]);
    std::fs::write(store.dir().join("stale.lock"), "dead-owner").unwrap();
    thread::sleep(Duration::from_millis(20));

    let manager = ProjectManager::new(
        FileStore::new(store.dir())
            .with_lock_timeout(Duration::from_secs(5))
            .with_stale_lock_age(Duration::from_millis(0)),
    );
    manager
        .mutate("stale", "update", |p| p.update_stage("a", StageStatus::Done))
        .unwrap();
    assert!(!store.dir().join("stale.lock").exists());
}

/// Test: Corrupt record is reported, not overwritten
#[test]
fn test_corrupt_record() {
    let store = TestStore::new();
    store.create("good", Mode::Linear, &["a"]);
    std::fs::write(store.dir().join("bad.json"), "{ not json").unwrap();

    let err = store.manager.read("bad").unwrap_err();
    assert!(matches!(err, Error::CorruptRecord { .. }));
    let err = store
        .manager
        .mutate("bad", "update", |p| p.update_stage("a", StageStatus::Done))
        .unwrap_err();
    assert!(matches!(err, Error::CorruptRecord { .. }));
    assert_eq!(
        std::fs::read_to_string(store.dir().join("bad.json")).unwrap(),
        "{ not json"
    );

    let entries = store.manager.list().unwrap();
    assert_eq!(entries.len(), 2);
}

/// Test: Saves keep a backup of the previous record
#[test]
fn test_backup_written_on_save() {
    let store = TestStore::new();
    store.create("flow", Mode::Linear, &["a"]);
    store
        .manager
        .mutate("flow", "log", |p| p.append_log("a", "started"))
        .unwrap();
    let backup = store.manager.store().backup_path("flow");
    assert!(backup.exists());
    assert!(store.manager.store().exists("flow").unwrap());
}
