//! Stage data model shared by linear pipelines and dependency graphs.
//!
//! Stages are the units of work handed to agents. Each stage tracks its
//! assignee, status, forwarded output and an append-only log of events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::keyed::Keyed;
use crate::error::{Error, Result};

/// Stage status in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    /// Not started yet.
    #[default]
    Pending,
    /// An agent is working on the stage.
    InProgress,
    /// Finished successfully; satisfies dependents.
    Done,
    /// Finished unsuccessfully; blocks dependents until reset.
    Failed,
    /// Deliberately not run. Does not satisfy dependents.
    Skipped,
}

impl StageStatus {
    pub const ALL: [StageStatus; 5] = [
        StageStatus::Pending,
        StageStatus::InProgress,
        StageStatus::Done,
        StageStatus::Failed,
        StageStatus::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::InProgress => "in-progress",
            StageStatus::Done => "done",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        }
    }

    /// Check if the status ends the stage's work (done, failed or skipped).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Done | StageStatus::Failed | StageStatus::Skipped
        )
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StageStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        StageStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "unknown status '{}': expected one of pending, in-progress, done, failed, skipped",
                    s
                ))
            })
    }
}

/// A timestamped note in a stage's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub event: String,
}

/// The outcome of a status change on a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub stage: String,
    pub from: StageStatus,
    pub to: StageStatus,
}

/// A single unit of work.
///
/// The id is the key of the record's `stages` map and is not repeated
/// inside the stage body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    #[serde(skip)]
    pub id: String,
    /// Agent the stage is assigned to.
    pub agent: String,
    #[serde(default, alias = "task")]
    pub description: String,
    #[serde(default)]
    pub status: StageStatus,
    /// Stage ids this stage waits on (dependency graphs only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "logs")]
    pub log: Vec<LogEntry>,
}

impl Stage {
    /// Create a pending stage with no dependencies.
    pub fn new(id: &str, agent: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            agent: agent.to_string(),
            description: description.to_string(),
            status: StageStatus::Pending,
            depends_on: Vec::new(),
            output: None,
            started_at: None,
            completed_at: None,
            log: Vec::new(),
        }
    }

    /// Output text, treating an empty string as absent.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref().filter(|o| !o.is_empty())
    }

    pub fn set_output(&mut self, output: &str) {
        self.output = if output.is_empty() {
            None
        } else {
            Some(output.to_string())
        };
    }

    pub fn append_log(&mut self, event: &str) {
        self.log.push(LogEntry {
            time: Utc::now(),
            event: event.to_string(),
        });
    }

    /// Move the stage to a new status.
    ///
    /// Records the start time on the first `in-progress`, the completion time
    /// on terminal statuses, and a log entry for the change. A failed stage
    /// can only leave `failed` through [`Stage::reset`].
    pub fn set_status(&mut self, to: StageStatus) -> Result<StatusChange> {
        let from = self.status;
        if from == StageStatus::Failed && to != StageStatus::Failed {
            return Err(Error::StageFailed {
                stage: self.id.clone(),
                to: to.to_string(),
            });
        }

        self.status = to;
        match to {
            StageStatus::InProgress if self.started_at.is_none() => {
                self.started_at = Some(Utc::now());
            }
            s if s.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        self.append_log(&format!("status: {} → {}", from, to));

        Ok(StatusChange {
            stage: self.id.clone(),
            from,
            to,
        })
    }

    /// Return the stage to `pending`, clearing timing and output.
    ///
    /// Structure (agent, description, dependencies, log) is preserved.
    pub fn reset(&mut self) -> StatusChange {
        let from = self.status;
        self.status = StageStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.output = None;
        self.append_log("reset to pending");
        StatusChange {
            stage: self.id.clone(),
            from,
            to: StageStatus::Pending,
        }
    }
}

impl Keyed for Stage {
    fn key(&self) -> &str {
        &self.id
    }

    fn set_key(&mut self, key: String) {
        self.id = key;
    }
}
