// src/exec/shell.rs

//! Production executor: runs stage commands through the platform shell.

use std::process::Stdio;

use anyhow::{anyhow, Context};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::backend::{BoxFuture, ExecutorBackend, RunningProcess, StageOutcome};
use crate::scheduler::Stage;

#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }
}

/// Build a shell command appropriate for the platform, with the stage's
/// working directory and environment applied.
fn shell_command(stage: &Stage, script: &str) -> Command {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(script);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(script);
        c
    };

    if !stage.dir.is_empty() {
        cmd.current_dir(&stage.dir);
    }
    cmd.envs(stage.env.iter());
    cmd.stdin(Stdio::null()).kill_on_drop(true);

    // Own process group, so cancellation reaches everything the shell starts.
    #[cfg(unix)]
    cmd.process_group(0);

    cmd
}

/// Kill the process group led by `pid`.
#[cfg(unix)]
fn kill_process_group(stage: &str, pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    // SAFETY: plain syscall; the group id is the child's pid.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        debug!(
            stage = %stage,
            error = %std::io::Error::last_os_error(),
            "failed to kill process group"
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_stage: &str, _pid: Option<u32>) {}

impl ExecutorBackend for ShellExecutor {
    fn spawn(&self, stage: &Stage, cancel: oneshot::Receiver<()>) -> Result<RunningProcess> {
        let script = stage.command();
        info!(stage = %stage.name, cmd = %script, "starting stage process");

        let mut cmd = shell_command(stage, &script);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for stage '{}'", stage.name))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stage '{}' has no stdout pipe", stage.name))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stage '{}' has no stderr pipe", stage.name))?;

        let exit = tokio::spawn(wait_or_cancel(stage.name.clone(), child, cancel));

        Ok(RunningProcess {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            exit,
        })
    }

    fn check_condition<'a>(&'a self, stage: &'a Stage) -> BoxFuture<'a, Result<bool>> {
        Box::pin(evaluate_condition(stage))
    }
}

/// Run the stage's condition as a shell command; exit status 0 means "run".
async fn evaluate_condition(stage: &Stage) -> Result<bool> {
    let Some(condition) = stage.condition.as_deref() else {
        return Ok(true);
    };

    let mut cmd = shell_command(stage, condition);
    cmd.stdout(Stdio::null()).stderr(Stdio::null());

    let status = cmd
        .status()
        .await
        .with_context(|| format!("evaluating condition of stage '{}'", stage.name))?;

    debug!(
        stage = %stage.name,
        condition = %condition,
        exit_code = status.code().unwrap_or(-1),
        "condition evaluated"
    );
    Ok(status.success())
}

/// Either the process exits on its own (normal case), or we receive a
/// cancellation request and kill it.
async fn wait_or_cancel(
    stage: String,
    mut child: Child,
    mut cancel: oneshot::Receiver<()>,
) -> Result<StageOutcome> {
    tokio::select! {
        status_res = child.wait() => {
            let status = status_res
                .with_context(|| format!("waiting for process of stage '{stage}'"))?;

            let code = status.code().unwrap_or(-1);
            info!(
                stage = %stage,
                exit_code = code,
                success = status.success(),
                "stage process exited"
            );

            if status.success() {
                Ok(StageOutcome::Success)
            } else {
                Ok(StageOutcome::Failed(code))
            }
        }

        cancel_res = &mut cancel => {
            match cancel_res {
                Ok(()) => {
                    info!(stage = %stage, "cancellation requested; killing process");
                    kill_process_group(&stage, child.id());
                    if let Err(e) = child.kill().await {
                        warn!(stage = %stage, error = %e, "failed to kill process on cancellation");
                    }
                    Ok(StageOutcome::Canceled)
                }
                Err(_) => {
                    // The scheduler dropped the sender without cancelling;
                    // keep waiting for a normal exit.
                    debug!(stage = %stage, "cancel channel closed without explicit cancellation");
                    let status = child
                        .wait()
                        .await
                        .with_context(|| format!("waiting for process of stage '{stage}'"))?;
                    if status.success() {
                        Ok(StageOutcome::Success)
                    } else {
                        Ok(StageOutcome::Failed(status.code().unwrap_or(-1)))
                    }
                }
            }
        }
    }
}
