use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{ttlog_debug, Error, Result};

/// Pipeline used by `init --mode linear` when none is given.
pub const DEFAULT_PIPELINE: [&str; 4] = ["code-agent", "test-agent", "docs-agent", "monitor-bot"];

/// Environment variable that overrides `tasks_dir`.
pub const TASKS_DIR_ENV: &str = "TEAM_TASKS_DIR";

const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_STALE_LOCK_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Directory holding one `<project>.json` per project.
    pub tasks_dir: Option<String>,
    pub default_pipeline: Option<Vec<String>>,
    pub lock_timeout_ms: Option<u64>,
    /// Lock files older than this are considered abandoned.
    pub stale_lock_secs: Option<u64>,
}

impl Config {
    pub fn home_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".team-tasks"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    /// Resolve the project directory: `TEAM_TASKS_DIR`, then the config file, then the default.
    pub fn tasks_dir(&self) -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(TASKS_DIR_ENV) {
            if !dir.trim().is_empty() {
                return Ok(expand_tilde(&dir));
            }
        }
        match &self.tasks_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Ok(Self::home_dir()?.join("projects")),
        }
    }

    pub fn effective_pipeline(&self) -> Vec<String> {
        match &self.default_pipeline {
            Some(pipeline) if !pipeline.is_empty() => pipeline.clone(),
            _ => DEFAULT_PIPELINE.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms.unwrap_or(DEFAULT_LOCK_TIMEOUT_MS))
    }

    pub fn stale_lock_age(&self) -> Duration {
        Duration::from_secs(self.stale_lock_secs.unwrap_or(DEFAULT_STALE_LOCK_SECS))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        ttlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            ttlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        ttlog_debug!(
            "Config loaded: tasks_dir={:?}, default_pipeline={:?}, lock_timeout_ms={:?}",
            config.tasks_dir,
            config.default_pipeline,
            config.lock_timeout_ms
        );
        Ok(config)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
