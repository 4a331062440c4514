use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use taskpipe::errors::{Result, TaskpipeError};
use taskpipe::exec::{BoxFuture, ExecutorBackend, RunningProcess, StageOutcome};
use taskpipe::scheduler::Stage;

/// How a fake process ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeExit {
    Code(i32),
    /// Runs until the scheduler cancels it.
    UntilCancelled,
    /// The exit task reports an executor error.
    Error(String),
}

/// Scripted behaviour of one stage.
#[derive(Debug, Clone)]
pub struct FakeProcess {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit: FakeExit,
    pub delay: Duration,
}

impl FakeProcess {
    pub fn success() -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit: FakeExit::Code(0),
            delay: Duration::ZERO,
        }
    }

    pub fn failing(code: i32) -> Self {
        Self {
            exit: FakeExit::Code(code),
            ..Self::success()
        }
    }

    pub fn hanging() -> Self {
        Self {
            exit: FakeExit::UntilCancelled,
            ..Self::success()
        }
    }

    pub fn erroring(msg: &str) -> Self {
        Self {
            exit: FakeExit::Error(msg.to_string()),
            ..Self::success()
        }
    }

    pub fn with_stdout(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.stdout = bytes.as_ref().to_vec();
        self
    }

    pub fn with_stderr(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.stderr = bytes.as_ref().to_vec();
        self
    }

    /// Time before the process exits on its own.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A fake executor that:
/// - records which stages were spawned, in order
/// - serves scripted output and exit codes (success when unscripted)
/// - answers condition checks from a fixed table (true when unscripted).
#[derive(Default)]
pub struct FakeExecutor {
    processes: HashMap<String, FakeProcess>,
    conditions: HashMap<String, bool>,
    failing_conditions: HashSet<String>,
    condition_delays: HashMap<String, Duration>,
    spawn_errors: HashSet<String>,
    spawned: Arc<Mutex<Vec<String>>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_process(mut self, stage: &str, process: FakeProcess) -> Self {
        self.processes.insert(stage.to_string(), process);
        self
    }

    pub fn with_condition(mut self, stage: &str, result: bool) -> Self {
        self.conditions.insert(stage.to_string(), result);
        self
    }

    /// Condition check itself fails for this stage.
    pub fn with_failing_condition(mut self, stage: &str) -> Self {
        self.failing_conditions.insert(stage.to_string());
        self
    }

    /// The condition check for this stage takes `delay` before answering.
    pub fn with_condition_delay(mut self, stage: &str, delay: Duration) -> Self {
        self.condition_delays.insert(stage.to_string(), delay);
        self
    }

    /// `spawn` fails for this stage.
    pub fn with_spawn_error(mut self, stage: &str) -> Self {
        self.spawn_errors.insert(stage.to_string());
        self
    }

    /// Names of spawned stages, in spawn order.
    pub fn spawned(&self) -> Vec<String> {
        self.spawned.lock().unwrap().clone()
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn(&self, stage: &Stage, mut cancel: oneshot::Receiver<()>) -> Result<RunningProcess> {
        if self.spawn_errors.contains(&stage.name) {
            return Err(TaskpipeError::Other(anyhow::anyhow!(
                "fake spawn failure for '{}'",
                stage.name
            )));
        }

        self.spawned.lock().unwrap().push(stage.name.clone());
        let FakeProcess {
            stdout,
            stderr,
            exit,
            delay,
        } = self
            .processes
            .get(&stage.name)
            .cloned()
            .unwrap_or_else(FakeProcess::success);

        let exit = tokio::spawn(async move {
            match exit {
                FakeExit::UntilCancelled => {
                    let _ = cancel.await;
                    Ok(StageOutcome::Canceled)
                }
                FakeExit::Error(msg) => Err(TaskpipeError::Other(anyhow::anyhow!(msg))),
                FakeExit::Code(code) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        Ok(()) = &mut cancel => return Ok(StageOutcome::Canceled),
                    }
                    if code == 0 {
                        Ok(StageOutcome::Success)
                    } else {
                        Ok(StageOutcome::Failed(code))
                    }
                }
            }
        });

        Ok(RunningProcess {
            stdout: Box::new(Cursor::new(stdout)),
            stderr: Box::new(Cursor::new(stderr)),
            exit,
        })
    }

    fn check_condition<'a>(&'a self, stage: &'a Stage) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            if let Some(delay) = self.condition_delays.get(&stage.name) {
                tokio::time::sleep(*delay).await;
            }
            if self.failing_conditions.contains(&stage.name) {
                return Err(TaskpipeError::Other(anyhow::anyhow!(
                    "fake condition failure for '{}'",
                    stage.name
                )));
            }
            Ok(self.conditions.get(&stage.name).copied().unwrap_or(true))
        })
    }
}
