//! Dependency-graph mode on top of [`StageGraph`].

use crate::core::dag::StageGraph;
use crate::core::stage::{Stage, StageStatus};
use crate::error::Result;
use crate::workflow::engine::{ModeDetail, ModeEngine, StageBoard, StageUpdate};
use crate::workflow::types::{Mode, Progress, ProjectStatus};

impl ModeEngine for StageGraph {
    fn mode(&self) -> Mode {
        Mode::Dag
    }

    /// Completed when every stage is done. Failed when a failure leaves
    /// nothing ready and nothing running. Active otherwise, including an
    /// empty graph.
    fn derive_status(&self) -> ProjectStatus {
        if self.all_done() {
            return ProjectStatus::Completed;
        }
        let stalled = self.count_with_status(StageStatus::Failed) > 0
            && self.count_with_status(StageStatus::InProgress) == 0
            && self.ready_ids().is_empty();
        if stalled {
            ProjectStatus::Failed
        } else {
            ProjectStatus::Active
        }
    }

    fn progress(&self) -> Progress {
        Progress::new(self.count_with_status(StageStatus::Done), self.len())
    }

    fn detail(&self) -> ModeDetail {
        ModeDetail {
            ready: self.ready_ids(),
            in_progress: self
                .stages()
                .filter(|s| s.status == StageStatus::InProgress)
                .map(|s| s.id.clone())
                .collect(),
            blocked: self.blocked_by_failure(),
            ..ModeDetail::default()
        }
    }
}

impl StageBoard for StageGraph {
    fn stage(&self, id: &str) -> Option<&Stage> {
        self.get(id)
    }

    fn stage_mut(&mut self, id: &str) -> Option<&mut Stage> {
        self.get_mut(id)
    }

    fn stage_list(&self) -> Vec<&Stage> {
        self.stages().collect()
    }

    fn update_stage(&mut self, id: &str, status: StageStatus) -> Result<StageUpdate> {
        self.update_status(id, status).map(StageUpdate::Dag)
    }

    fn reset_stage(&mut self, id: &str) -> Result<StageUpdate> {
        StageGraph::reset_stage(self, id).map(StageUpdate::Dag)
    }
}
