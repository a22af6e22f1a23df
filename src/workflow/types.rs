//! Core workflow type definitions.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Execution mode of a project.
///
/// The mode is fixed at creation: it is the variant tag of the project's
/// state block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Ordered pipeline, one stage at a time.
    Linear,
    /// Dependency graph with parallel dispatch.
    Dag,
    /// Multi-party debate with rounds and cross-review.
    Debate,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Linear => "linear",
            Mode::Dag => "dag",
            Mode::Debate => "debate",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear" => Ok(Mode::Linear),
            "dag" => Ok(Mode::Dag),
            "debate" => Ok(Mode::Debate),
            other => Err(Error::Validation(format!(
                "unknown mode '{}': expected linear, dag or debate",
                other
            ))),
        }
    }
}

/// Status of a project in its lifecycle.
///
/// Always derived from the mode state after a mutation; never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    /// Work remains that can still make progress
    #[default]
    Active,
    /// Every stage is done, or the debate was synthesized
    Completed,
    /// A failure blocks further progress until reset
    #[serde(alias = "blocked")]
    Failed,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Active => write!(f, "active"),
            ProjectStatus::Completed => write!(f, "completed"),
            ProjectStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Completed units of work out of the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(done: usize, total: usize) -> Self {
        Self { done, total }
    }

    /// Whole percentage, 0 for an empty total.
    pub fn percent(&self) -> usize {
        if self.total == 0 {
            0
        } else {
            self.done * 100 / self.total
        }
    }
}
