//! Traits shared by the mode engines.
//!
//! Every mode implements [`ModeEngine`]. The two stage-based modes also
//! implement [`StageBoard`], which carries the per-stage operations that
//! behave the same in both (assign, result, log, history, reset-all).

use serde::Serialize;

use crate::core::dag::DagTransition;
use crate::core::stage::{LogEntry, Stage, StageStatus, StatusChange};
use crate::error::{Error, Result};
use crate::workflow::debate::{DebatePhase, RoundType};
use crate::workflow::linear::LinearTransition;
use crate::workflow::types::{Mode, Progress, ProjectStatus};

/// Mode-specific part of a status summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ready: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub in_progress: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocked: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<DebatePhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_round: Option<RoundType>,
}

/// Status derivation and reporting for one execution mode.
pub trait ModeEngine {
    fn mode(&self) -> Mode;

    /// Project status implied by the current state.
    fn derive_status(&self) -> ProjectStatus;

    fn progress(&self) -> Progress;

    fn detail(&self) -> ModeDetail;
}

/// Outcome of a stage status change, shaped by the mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StageUpdate {
    Linear(LinearTransition),
    Dag(DagTransition),
}

impl StageUpdate {
    pub fn change(&self) -> &StatusChange {
        match self {
            StageUpdate::Linear(t) => &t.change,
            StageUpdate::Dag(t) => &t.change,
        }
    }
}

/// Per-stage operations for the linear and dag modes.
pub trait StageBoard: ModeEngine {
    fn stage(&self, id: &str) -> Option<&Stage>;

    fn stage_mut(&mut self, id: &str) -> Option<&mut Stage>;

    /// All stages in their reporting order.
    fn stage_list(&self) -> Vec<&Stage>;

    fn update_stage(&mut self, id: &str, status: StageStatus) -> Result<StageUpdate>;

    fn reset_stage(&mut self, id: &str) -> Result<StageUpdate>;

    fn require(&self, id: &str) -> Result<&Stage> {
        self.stage(id)
            .ok_or_else(|| Error::StageNotFound(id.to_string()))
    }

    fn require_mut(&mut self, id: &str) -> Result<&mut Stage> {
        self.stage_mut(id)
            .ok_or_else(|| Error::StageNotFound(id.to_string()))
    }

    /// Replace a stage's task description.
    fn assign(&mut self, id: &str, description: &str) -> Result<()> {
        let stage = self.require_mut(id)?;
        stage.description = description.to_string();
        stage.append_log("task assigned");
        Ok(())
    }

    /// Store the stage's output for forwarding to later stages.
    fn record_result(&mut self, id: &str, output: &str) -> Result<()> {
        self.require_mut(id)?.set_output(output);
        Ok(())
    }

    fn append_log(&mut self, id: &str, message: &str) -> Result<()> {
        self.require_mut(id)?.append_log(message);
        Ok(())
    }

    fn history(&self, id: &str) -> Result<&[LogEntry]> {
        Ok(&self.require(id)?.log)
    }

    /// Reset every stage to pending.
    fn reset_all(&mut self) -> Result<Vec<StatusChange>> {
        let ids: Vec<String> = self.stage_list().iter().map(|s| s.id.clone()).collect();
        ids.iter()
            .map(|id| self.reset_stage(id).map(|update| update.change().clone()))
            .collect()
    }
}
