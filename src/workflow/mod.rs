//! Workflow engines for the three execution modes.
//!
//! This module provides the project record, the mode dispatcher, and the
//! linear, dependency-graph and debate engines behind it.

pub mod debate;
pub mod engine;
mod graph;
pub mod linear;
pub mod project;
mod types;

pub use debate::{Debate, DebatePhase, RoundStatus, RoundType};
pub use engine::{ModeDetail, ModeEngine, StageBoard, StageUpdate};
pub use linear::{LinearPipeline, LinearTransition, NextStage};
pub use project::{ModeState, Project, StatusSummary};
pub use types::{Mode, Progress, ProjectStatus};
