//! Core domain models for team-tasks.
//!
//! This module contains the building blocks shared by every execution mode:
//! identifier rules, the stage model, and the stage dependency graph.

pub mod dag;
pub mod ident;
pub mod keyed;
pub mod stage;

pub use dag::{DagTransition, DependencyOutput, ReadyStage, StageGraph, TreeLine};
pub use ident::{parse_id_list, validate_id};
pub use keyed::Keyed;
pub use stage::{LogEntry, Stage, StageStatus, StatusChange};
