//! Linear pipeline sequencing.
//!
//! Stages run in the fixed pipeline order. The current stage is never
//! stored: it is the first stage that is not `done`, so marking it done
//! advances the pipeline and resetting an earlier stage moves it back.

use serde::{Deserialize, Serialize};

use crate::core::dag::DependencyOutput;
use crate::core::ident::validate_id;
use crate::core::keyed;
use crate::core::stage::{Stage, StageStatus, StatusChange};
use crate::error::{Error, Result};
use crate::workflow::engine::{ModeDetail, ModeEngine, StageBoard, StageUpdate};
use crate::workflow::types::{Mode, Progress, ProjectStatus};

/// Result of a status change in a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearTransition {
    #[serde(flatten)]
    pub change: StatusChange,
    /// Current stage after the change, none once every stage is done.
    pub current_stage: Option<String>,
}

/// Dispatch payload for the current stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStage {
    pub stage: String,
    pub agent: String,
    pub description: String,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Output of the stage just before this one, when it left any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<DependencyOutput>,
}

/// An ordered pipeline of stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "LinearRecord", into = "LinearRecord")]
pub struct LinearPipeline {
    stages: Vec<Stage>,
}

#[derive(Serialize, Deserialize)]
struct LinearRecord {
    pipeline: Vec<String>,
    #[serde(with = "keyed", default)]
    stages: Vec<Stage>,
}

impl LinearPipeline {
    /// Create a pipeline with one pending stage per entry.
    ///
    /// Each stage is assigned to the agent of the same name.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty pipeline or a malformed id, and
    /// `StageExists` when an id appears twice.
    pub fn new(pipeline: &[String]) -> Result<Self> {
        if pipeline.is_empty() {
            return Err(Error::Validation(
                "pipeline must name at least one stage".to_string(),
            ));
        }
        let mut stages: Vec<Stage> = Vec::with_capacity(pipeline.len());
        for id in pipeline {
            validate_id("stage", id)?;
            if stages.iter().any(|s| &s.id == id) {
                return Err(Error::StageExists(id.clone()));
            }
            stages.push(Stage::new(id, id, ""));
        }
        Ok(Self { stages })
    }

    /// Stage ids in pipeline order.
    pub fn pipeline(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.id.as_str()).collect()
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.stages
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| Error::StageNotFound(id.to_string()))
    }

    fn current_index(&self) -> Option<usize> {
        self.stages
            .iter()
            .position(|s| s.status != StageStatus::Done)
    }

    /// First stage in pipeline order that is not done.
    pub fn current(&self) -> Option<&Stage> {
        self.current_index().map(|i| &self.stages[i])
    }

    /// Dispatch payload for the current stage, or none when the pipeline is complete.
    pub fn next(&self, workspace: Option<&str>) -> Option<NextStage> {
        let index = self.current_index()?;
        let stage = &self.stages[index];
        let previous = index
            .checked_sub(1)
            .map(|i| &self.stages[i])
            .and_then(|prev| {
                prev.output().map(|output| DependencyOutput {
                    stage: prev.id.clone(),
                    agent: prev.agent.clone(),
                    output: output.to_string(),
                })
            });

        Some(NextStage {
            stage: stage.id.clone(),
            agent: stage.agent.clone(),
            description: stage.description.clone(),
            status: stage.status,
            workspace: workspace.map(str::to_string),
            previous,
        })
    }

    fn transition(&self, change: StatusChange) -> StageUpdate {
        StageUpdate::Linear(LinearTransition {
            change,
            current_stage: self.current().map(|s| s.id.clone()),
        })
    }
}

impl ModeEngine for LinearPipeline {
    fn mode(&self) -> Mode {
        Mode::Linear
    }

    fn derive_status(&self) -> ProjectStatus {
        if self.stages.iter().any(|s| s.status == StageStatus::Failed) {
            ProjectStatus::Failed
        } else if self.current().is_none() {
            ProjectStatus::Completed
        } else {
            ProjectStatus::Active
        }
    }

    fn progress(&self) -> Progress {
        let done = self
            .stages
            .iter()
            .filter(|s| s.status == StageStatus::Done)
            .count();
        Progress::new(done, self.stages.len())
    }

    fn detail(&self) -> ModeDetail {
        ModeDetail {
            current_stage: self.current().map(|s| s.id.clone()),
            in_progress: self
                .stages
                .iter()
                .filter(|s| s.status == StageStatus::InProgress)
                .map(|s| s.id.clone())
                .collect(),
            ..ModeDetail::default()
        }
    }
}

impl StageBoard for LinearPipeline {
    fn stage(&self, id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }

    fn stage_mut(&mut self, id: &str) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|s| s.id == id)
    }

    fn stage_list(&self) -> Vec<&Stage> {
        self.stages.iter().collect()
    }

    fn update_stage(&mut self, id: &str, status: StageStatus) -> Result<StageUpdate> {
        let index = self.position(id)?;
        let change = self.stages[index].set_status(status)?;
        Ok(self.transition(change))
    }

    fn reset_stage(&mut self, id: &str) -> Result<StageUpdate> {
        let index = self.position(id)?;
        let change = self.stages[index].reset();
        Ok(self.transition(change))
    }
}

impl From<LinearPipeline> for LinearRecord {
    fn from(linear: LinearPipeline) -> Self {
        Self {
            pipeline: linear.stages.iter().map(|s| s.id.clone()).collect(),
            stages: linear.stages,
        }
    }
}

impl TryFrom<LinearRecord> for LinearPipeline {
    type Error = Error;

    fn try_from(record: LinearRecord) -> Result<Self> {
        let mut remaining = record.stages;
        let mut stages = Vec::with_capacity(record.pipeline.len());
        for id in &record.pipeline {
            let index = remaining.iter().position(|s| &s.id == id).ok_or_else(|| {
                Error::Validation(format!("pipeline stage '{}' has no stage record", id))
            })?;
            stages.push(remaining.remove(index));
        }
        if let Some(extra) = remaining.first() {
            return Err(Error::Validation(format!(
                "stage '{}' is not part of the pipeline",
                extra.id
            )));
        }
        Ok(Self { stages })
    }
}
