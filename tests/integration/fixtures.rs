//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - File-backed managers in a temporary directory
//! - Projects pre-populated for each mode
//! - Running the `team-tasks` binary in isolation

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

use tempfile::TempDir;

use team_tasks::{FileStore, Mode, ModeState, Project, ProjectManager};

/// A project directory in a temporary location with a manager over it.
pub struct TestStore {
    /// Keeps the directory alive for the lifetime of the fixture.
    pub temp_dir: TempDir,
    pub manager: ProjectManager<FileStore>,
}

impl TestStore {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::new(temp_dir.path().join("projects"))
            .with_lock_timeout(Duration::from_secs(10));
        Self {
            temp_dir,
            manager: ProjectManager::new(store),
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.temp_dir.path().join("projects")
    }

    /// A second manager over the same directory, as another process would have.
    pub fn other_manager(&self) -> ProjectManager<FileStore> {
        ProjectManager::new(FileStore::new(self.dir()).with_lock_timeout(Duration::from_secs(10)))
    }

    pub fn create(&self, id: &str, mode: Mode, pipeline: &[&str]) -> Project {
        let pipeline: Vec<String> = pipeline.iter().map(|s| s.to_string()).collect();
        let state = ModeState::for_mode(mode, &pipeline).expect("Failed to build mode state");
        let project = Project::new(id, "integration goal", Some("/tmp/ws"), state)
            .expect("Failed to build project");
        self.manager
            .create(project, false)
            .expect("Failed to create project")
    }

    /// DAG project with stages `(id, deps)` added in order.
    pub fn create_dag(&self, id: &str, stages: &[(&str, &[&str])]) -> Project {
        self.create(id, Mode::Dag, &[]);
        for (stage, deps) in stages {
            let deps: Vec<String> = deps.iter().map(|d| d.to_string()).collect();
            self.manager
                .mutate(id, "add", |p| {
                    p.add_stage(stage, &format!("{}-agent", stage), &deps, None)
                })
                .expect("Failed to add stage");
        }
        self.manager.read(id).expect("Failed to read project")
    }

    /// Debate project with the given debaters enrolled.
    pub fn create_debate(&self, id: &str, debaters: &[(&str, Option<&str>)]) -> Project {
        self.create(id, Mode::Debate, &[]);
        for (agent, role) in debaters {
            self.manager
                .mutate(id, "add-debater", |p| p.add_debater(agent, *role))
                .expect("Failed to add debater");
        }
        self.manager.read(id).expect("Failed to read project")
    }
}

/// Run the binary with an isolated home and project directory.
pub fn run_cli(home: &Path, dir: &Path, args: &[&str]) -> Output {
    run_cli_with_env(home, dir, &[], args)
}

/// Like [`run_cli`], with extra environment variables set.
pub fn run_cli_with_env(home: &Path, dir: &Path, env: &[(&str, &str)], args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_team-tasks"))
        .env("HOME", home)
        .env_remove("TEAM_TASKS_DIR")
        .env_remove("TEAM_TASKS_DEBUG")
        .env_remove("TEAM_TASKS_LOG")
        .envs(env.iter().copied())
        .arg("--dir")
        .arg(dir)
        .args(args)
        .output()
        .expect("Failed to run team-tasks")
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
