//! The persisted project record and mode dispatch.
//!
//! A [`Project`] carries exactly one [`ModeState`]. Operations that only
//! make sense for some modes go through the dispatch helpers here, which
//! fail with `WrongMode` instead of touching the wrong engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::dag::{ReadyStage, StageGraph, TreeLine};
use crate::core::ident::validate_id;
use crate::core::stage::{LogEntry, Stage, StageStatus, StatusChange};
use crate::error::{Error, Result};
use crate::workflow::debate::{
    CollectOutcome, CrossReviewPrompt, Debate, DebatePrompt, ReopenOutcome, SynthesisPackage,
};
use crate::workflow::engine::{ModeDetail, ModeEngine, StageBoard, StageUpdate};
use crate::workflow::linear::{LinearPipeline, NextStage};
use crate::workflow::types::{Mode, Progress, ProjectStatus};

/// Mode-specific state block, tagged by `mode` in the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ModeState {
    Linear(LinearPipeline),
    Dag(StageGraph),
    Debate(Debate),
}

impl ModeState {
    /// Fresh state for a new project.
    ///
    /// `pipeline` is only used by linear projects.
    pub fn for_mode(mode: Mode, pipeline: &[String]) -> Result<Self> {
        Ok(match mode {
            Mode::Linear => ModeState::Linear(LinearPipeline::new(pipeline)?),
            Mode::Dag => ModeState::Dag(StageGraph::new()),
            Mode::Debate => ModeState::Debate(Debate::new()),
        })
    }

    pub fn engine(&self) -> &dyn ModeEngine {
        match self {
            ModeState::Linear(linear) => linear,
            ModeState::Dag(dag) => dag,
            ModeState::Debate(debate) => debate,
        }
    }
}

/// Project-level status summary for `status` and `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub id: String,
    pub mode: Mode,
    pub goal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    pub status: ProjectStatus,
    pub progress: Progress,
    pub updated: DateTime<Utc>,
    #[serde(flatten)]
    pub detail: ModeDetail,
}

/// Older records store an unset workspace as `""`.
fn non_blank<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|w| !w.trim().is_empty()))
}

/// A persisted project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(alias = "project")]
    pub id: String,
    #[serde(default)]
    pub goal: String,
    #[serde(
        default,
        deserialize_with = "non_blank",
        skip_serializing_if = "Option::is_none"
    )]
    pub workspace: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(flatten)]
    pub state: ModeState,
}

impl Project {
    /// Create a new project around a fresh mode state.
    pub fn new(id: &str, goal: &str, workspace: Option<&str>, state: ModeState) -> Result<Self> {
        validate_id("project", id)?;
        let now = Utc::now();
        let mut project = Self {
            id: id.to_string(),
            goal: goal.to_string(),
            workspace: workspace.filter(|w| !w.trim().is_empty()).map(str::to_string),
            status: ProjectStatus::Active,
            created: now,
            updated: now,
            state,
        };
        project.status = project.engine().derive_status();
        Ok(project)
    }

    pub fn mode(&self) -> Mode {
        self.engine().mode()
    }

    pub fn engine(&self) -> &dyn ModeEngine {
        self.state.engine()
    }

    /// Recompute the derived status and bump `updated`.
    pub fn touch(&mut self) {
        self.status = self.engine().derive_status();
        self.updated = Utc::now();
    }

    pub fn summary(&self) -> StatusSummary {
        let engine = self.engine();
        StatusSummary {
            id: self.id.clone(),
            mode: engine.mode(),
            goal: self.goal.clone(),
            workspace: self.workspace.clone(),
            status: self.status,
            progress: engine.progress(),
            updated: self.updated,
            detail: engine.detail(),
        }
    }

    fn wrong_mode(&self, command: &str) -> Error {
        Error::WrongMode {
            command: command.to_string(),
            mode: self.mode().to_string(),
        }
    }

    // ========== Mode Dispatch ==========

    pub fn linear(&self, command: &str) -> Result<&LinearPipeline> {
        match &self.state {
            ModeState::Linear(linear) => Ok(linear),
            _ => Err(self.wrong_mode(command)),
        }
    }

    pub fn dag(&self, command: &str) -> Result<&StageGraph> {
        match &self.state {
            ModeState::Dag(dag) => Ok(dag),
            _ => Err(self.wrong_mode(command)),
        }
    }

    pub fn dag_mut(&mut self, command: &str) -> Result<&mut StageGraph> {
        let err = self.wrong_mode(command);
        match &mut self.state {
            ModeState::Dag(dag) => Ok(dag),
            _ => Err(err),
        }
    }

    pub fn debate(&self, command: &str) -> Result<&Debate> {
        match &self.state {
            ModeState::Debate(debate) => Ok(debate),
            _ => Err(self.wrong_mode(command)),
        }
    }

    pub fn debate_mut(&mut self, command: &str) -> Result<&mut Debate> {
        let err = self.wrong_mode(command);
        match &mut self.state {
            ModeState::Debate(debate) => Ok(debate),
            _ => Err(err),
        }
    }

    /// Stage operations for linear and dag projects.
    pub fn board(&self, command: &str) -> Result<&dyn StageBoard> {
        match &self.state {
            ModeState::Linear(linear) => Ok(linear),
            ModeState::Dag(dag) => Ok(dag),
            ModeState::Debate(_) => Err(self.wrong_mode(command)),
        }
    }

    pub fn board_mut(&mut self, command: &str) -> Result<&mut dyn StageBoard> {
        let err = self.wrong_mode(command);
        match &mut self.state {
            ModeState::Linear(linear) => Ok(linear),
            ModeState::Dag(dag) => Ok(dag),
            ModeState::Debate(_) => Err(err),
        }
    }

    // ========== Stage Operations ==========

    /// Add a stage to a dag project.
    pub fn add_stage(
        &mut self,
        id: &str,
        agent: &str,
        deps: &[String],
        description: Option<&str>,
    ) -> Result<()> {
        let mut stage = Stage::new(id, agent, description.unwrap_or_default());
        stage.depends_on = deps.to_vec();
        self.dag_mut("add")?.add_stage(stage)
    }

    /// Add dependencies to an existing dag stage.
    pub fn depend(&mut self, id: &str, deps: &[String]) -> Result<Vec<String>> {
        self.dag_mut("depend")?.add_dependencies(id, deps)
    }

    pub fn update_stage(&mut self, id: &str, status: StageStatus) -> Result<StageUpdate> {
        self.board_mut("update")?.update_stage(id, status)
    }

    pub fn assign(&mut self, id: &str, description: &str) -> Result<()> {
        self.board_mut("assign")?.assign(id, description)
    }

    pub fn record_result(&mut self, id: &str, output: &str) -> Result<()> {
        self.board_mut("result")?.record_result(id, output)
    }

    pub fn append_log(&mut self, id: &str, message: &str) -> Result<()> {
        self.board_mut("log")?.append_log(id, message)
    }

    pub fn reset_stage(&mut self, id: &str) -> Result<StageUpdate> {
        self.board_mut("reset")?.reset_stage(id)
    }

    pub fn reset_all(&mut self) -> Result<Vec<StatusChange>> {
        self.board_mut("reset")?.reset_all()
    }

    pub fn history(&self, id: &str) -> Result<&[LogEntry]> {
        self.board("history")?.history(id)
    }

    /// The current linear stage with forwarded context.
    pub fn next_stage(&self) -> Result<Option<NextStage>> {
        Ok(self.linear("next")?.next(self.workspace.as_deref()))
    }

    /// Every ready dag stage with forwarded context.
    pub fn ready(&self) -> Result<Vec<ReadyStage>> {
        let mut ready = self.dag("ready")?.ready();
        for stage in &mut ready {
            stage.workspace = self.workspace.clone();
        }
        Ok(ready)
    }

    pub fn graph(&self) -> Result<Vec<TreeLine>> {
        Ok(self.dag("graph")?.tree())
    }

    // ========== Debate Operations ==========

    pub fn add_debater(&mut self, agent_id: &str, role: Option<&str>) -> Result<()> {
        self.debate_mut("add-debater")?.add_debater(agent_id, role)
    }

    pub fn round_start(&mut self) -> Result<Vec<DebatePrompt>> {
        let goal = self.goal.clone();
        self.debate_mut("round start")?.start(&goal)
    }

    pub fn round_collect(&mut self, agent_id: &str, response: &str) -> Result<CollectOutcome> {
        self.debate_mut("round collect")?.collect(agent_id, response)
    }

    pub fn round_cross_review(&mut self) -> Result<Vec<CrossReviewPrompt>> {
        self.debate_mut("round cross-review")?.cross_review()
    }

    pub fn round_synthesize(&mut self) -> Result<SynthesisPackage> {
        let goal = self.goal.clone();
        self.debate_mut("round synthesize")?.synthesize(&goal)
    }

    pub fn round_reopen(&mut self) -> Result<ReopenOutcome> {
        self.debate_mut("round reopen")?.reopen()
    }
}
