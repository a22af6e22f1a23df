//! Binary integration tests.
//!
//! These tests run `team-tasks` as a subprocess and check exit codes,
//! error prefixes and the JSON payloads agents parse.

use serde_json::Value;
use tempfile::TempDir;

use crate::fixtures::{run_cli, run_cli_with_env, stderr, stdout};

struct Cli {
    home: TempDir,
    dir: TempDir,
}

impl Cli {
    fn new() -> Self {
        Self {
            home: TempDir::new().unwrap(),
            dir: TempDir::new().unwrap(),
        }
    }

    fn run(&self, args: &[&str]) -> std::process::Output {
        run_cli(self.home.path(), self.dir.path(), args)
    }

    fn ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "{:?} failed: {}",
            args,
            stderr(&output)
        );
        stdout(&output)
    }

    fn json(&self, args: &[&str]) -> Value {
        serde_json::from_str(&self.ok(args)).expect("stdout should be JSON")
    }
}

/// Test: DAG workflow through the binary
/// Given a dag project built with `add`
/// When stages complete through `update`
/// Then `ready --json` tracks the dispatchable set
#[test]
fn test_dag_commands() {
    let cli = Cli::new();
    let created = cli.json(&["init", "web", "-m", "dag", "-g", "Ship the site"]);
    assert_eq!(created["mode"], "dag");
    assert_eq!(created["status"], "active");

    cli.ok(&["add", "web", "design", "-a", "designer"]);
    cli.ok(&["add", "web", "build", "-d", "design", "--desc", "Write the pages"]);

    let ready = cli.json(&["ready", "web", "--json"]);
    let ready = ready.as_array().unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0]["stage"], "design");
    assert_eq!(ready[0]["agent"], "designer");

    cli.ok(&["result", "web", "design", "mockups in /tmp/mock"]);
    let out = cli.ok(&["update", "web", "design", "done"]);
    assert!(out.contains("Unblocked: build"));

    let ready = cli.json(&["ready", "web", "--json"]);
    assert_eq!(ready[0]["stage"], "build");
    assert!(ready[0]["context"]
        .as_str()
        .unwrap()
        .contains("mockups in /tmp/mock"));

    let status = cli.json(&["status", "web", "--json"]);
    assert_eq!(status["summary"]["progress"]["done"], 1);
    assert_eq!(status["summary"]["progress"]["total"], 2);
    assert_eq!(status["project"]["id"], "web");

    let graph = cli.ok(&["graph", "web"]);
    assert!(graph.contains("└─ ✅ design [designer]"));
}

/// Test: Linear defaults and `next --json`
#[test]
fn test_linear_commands() {
    let cli = Cli::new();
    cli.ok(&["init", "blog", "-p", "write, edit"]);

    let next = cli.json(&["next", "blog", "--json"]);
    assert_eq!(next["stage"], "write");

    cli.ok(&["update", "blog", "write", "done"]);
    cli.ok(&["update", "blog", "edit", "done"]);
    let next = cli.json(&["next", "blog", "--json"]);
    assert!(next.is_null());

    let listing = cli.ok(&["list"]);
    assert!(listing.contains("blog [completed] (2/2) mode=linear"));
}

/// Test: Error taxonomy maps to exit codes
#[test]
fn test_exit_codes() {
    let cli = Cli::new();
    cli.ok(&["init", "web", "-m", "dag"]);

    let bad_status = cli.run(&["update", "web", "x", "finished"]);
    assert_eq!(bad_status.status.code(), Some(2));
    assert!(stderr(&bad_status).starts_with("error[validation]"));

    let missing = cli.run(&["status", "ghost"]);
    assert_eq!(missing.status.code(), Some(3));
    assert!(stderr(&missing).starts_with("error[not-found]"));

    let duplicate = cli.run(&["init", "web", "-m", "dag"]);
    assert_eq!(duplicate.status.code(), Some(4));

    let wrong_mode = cli.run(&["next", "web"]);
    assert_eq!(wrong_mode.status.code(), Some(5));

    cli.ok(&["init", "web", "-m", "dag", "--force"]);
}

/// Test: Debate rounds through the binary
#[test]
fn test_debate_commands() {
    let cli = Cli::new();
    cli.ok(&["init", "db", "-m", "debate", "-g", "Which database?"]);
    cli.ok(&["add-debater", "db", "a1", "-r", "pragmatist"]);
    cli.ok(&["add-debater", "db", "a2"]);

    let started = cli.ok(&["round", "db", "start"]);
    assert!(started.contains("Question: Which database?"));

    let usage = cli.run(&["round", "db", "collect", "a1"]);
    assert_eq!(usage.status.code(), Some(2));

    cli.ok(&["round", "db", "collect", "a1", "sqlite"]);
    let done = cli.ok(&["round", "db", "collect", "a2", "postgres"]);
    assert!(done.contains("is complete"));

    let reviews = cli.ok(&["round", "db", "cross-review"]);
    assert!(reviews.contains("- a2 (no role specified): postgres"));

    let early = cli.run(&["round", "db", "synthesize"]);
    assert_eq!(early.status.code(), Some(5));
}

/// Test: Log levels from the environment
/// Given TEAM_TASKS_LOG=trace
/// When a command saves a project
/// Then the log file carries the saved record, and INFO runs do not
#[test]
fn test_trace_logging_records_saved_project() {
    let cli = Cli::new();
    let log_path = cli.home.path().join(".team-tasks").join("team-tasks.log");

    cli.ok(&["init", "quiet", "-m", "dag"]);
    let info_log = std::fs::read_to_string(&log_path).unwrap_or_default();
    assert!(info_log.contains("project=quiet op=init"));
    assert!(!info_log.contains("record="));

    let output = run_cli_with_env(
        cli.home.path(),
        cli.dir.path(),
        &[("TEAM_TASKS_LOG", "trace")],
        &["init", "loud", "-m", "dag", "-g", "trace me"],
    );
    assert!(output.status.success(), "{}", stderr(&output));
    let log = std::fs::read_to_string(&log_path).unwrap();
    let traced = log
        .split_once("project=loud record=")
        .map(|(_, record)| record)
        .expect("saved record should be traced");
    assert!(traced.contains("\"goal\": \"trace me\""));
}
