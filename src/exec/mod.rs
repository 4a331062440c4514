// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the commands defined in
//! the stages, using `tokio::process::Command`, and handing their output
//! streams back to the scheduler.
//!
//! - [`backend`] provides the `ExecutorBackend` trait that the scheduler uses,
//!   and which tests can replace with a fake implementation.
//! - [`shell`] is the production `ShellExecutor`.

pub mod backend;
pub mod shell;

pub use backend::{BoxFuture, ExecutorBackend, OutputHandle, RunningProcess, StageOutcome};
pub use shell::ShellExecutor;
