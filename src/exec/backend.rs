// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The scheduler talks to an `ExecutorBackend` instead of spawning processes
//! itself. This makes it easy to swap in a fake executor in tests while
//! keeping the production implementation in [`shell`](super::shell).
//!
//! - `ShellExecutor` is the default implementation used by `taskpipe`. It
//!   runs each stage's command through the platform shell.
//! - Tests can provide their own `ExecutorBackend` that, for example, serves
//!   scripted output and exit codes without any process.

use std::future::Future;
use std::pin::Pin;

use tokio::io::AsyncRead;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::errors::Result;
use crate::scheduler::Stage;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Readable end of a process output stream.
pub type OutputHandle = Box<dyn AsyncRead + Send + Unpin>;

/// How a stage process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Success,
    /// Non-zero exit; `-1` when no exit code is available (e.g. signals).
    Failed(i32),
    /// Stopped through the cancel channel.
    Canceled,
}

/// A spawned stage process.
///
/// `exit` resolves once the process is gone. Both output handles reach
/// end-of-stream when the process (and anything holding its pipes) exits.
pub struct RunningProcess {
    pub stdout: OutputHandle,
    pub stderr: OutputHandle,
    pub exit: JoinHandle<Result<StageOutcome>>,
}

/// Trait abstracting how stage processes are started.
///
/// Production code uses [`ShellExecutor`](super::ShellExecutor); tests can
/// provide their own implementation that doesn't spawn real processes.
pub trait ExecutorBackend: Send + Sync {
    /// Start the stage's process.
    ///
    /// When `cancel` fires the process must be stopped and `exit` must
    /// resolve to [`StageOutcome::Canceled`].
    fn spawn(&self, stage: &Stage, cancel: oneshot::Receiver<()>) -> Result<RunningProcess>;

    /// Decide whether a stage with a condition should run.
    ///
    /// Only called for stages that have one.
    fn check_condition<'a>(&'a self, stage: &'a Stage) -> BoxFuture<'a, Result<bool>>;
}
