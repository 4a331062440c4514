// src/scheduler/mod.rs

//! Stages, the execution graph and the scheduler that drives it.
//!
//! - [`stage`] holds the per-stage data model and its atomic status.
//! - [`graph`] validates and orders the stages of a pipeline.
//! - [`driver`] runs the graph, wrapping every stage run in the
//!   [`TaskOutput`](crate::output::TaskOutput) protocol.

pub mod driver;
pub mod graph;
pub mod stage;

pub use driver::{RunSummary, Scheduler, StageReport};
pub use graph::ExecutionGraph;
pub use stage::{Stage, StageLog, StageStatus};
