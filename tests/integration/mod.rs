//! Integration test suite for team-tasks.
//!
//! These tests drive whole projects through the file-backed store and the
//! `team-tasks` binary, the way coordinating agents use them.
//!
//! # Test Categories
//!
//! - `linear_pipeline`: Ordered stage hand-off
//! - `dag_scenarios`: Dependency resolution and parallel dispatch
//! - `debate_flow`: Rounds, cross-review and synthesis
//! - `store_concurrency`: Locking, atomic saves and lost-update checks
//! - `cli`: Exit codes and JSON output of the binary

mod fixtures;

mod cli;
mod dag_scenarios;
mod debate_flow;
mod linear_pipeline;
mod store_concurrency;
