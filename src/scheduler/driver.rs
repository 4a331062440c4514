// src/scheduler/driver.rs

//! Drives an [`ExecutionGraph`] to completion.
//!
//! The scheduler repeatedly walks the graph in topological order, moves
//! every stage whose dependencies are settled into `Running`, and runs it on
//! its own Tokio task. Each stage run is wrapped in the output protocol:
//! `start`, `stream` (joined with the process exit), `finish`. Condition
//! checks run as tasks too, so a slow condition never holds up the loop.
//!
//! Dependency rules:
//! - a dependency that is `Done` or `Skipped` (condition false) is satisfied;
//! - a dependency in `Error` is satisfied only if it allows failure;
//! - a dependency that was skipped because of an upstream failure, or that
//!   was `Canceled`, blocks the stage, which becomes `Skipped`.
//!
//! A stage ending in `Error` without `allow_failure` cancels the run:
//! running processes are stopped and end `Canceled`, waiting stages become
//! `Skipped` (downstream of the failure) or `Canceled` (everything else).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::TimeDelta;
use tokio::sync::{oneshot, Notify};
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::exec::{ExecutorBackend, StageOutcome};
use crate::output::{format_duration, TaskOutput};
use crate::scheduler::graph::ExecutionGraph;
use crate::scheduler::stage::{Stage, StageStatus};

/// Outcome of one stage, as reported after the run.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub name: String,
    pub status: StageStatus,
    pub allow_failure: bool,
    pub duration: TimeDelta,
    /// Process exit code, when the stage ran and exited on its own.
    pub exit_code: Option<i32>,
    /// Captured stdout and stderr bytes; empty for stages that did not run.
    pub output: Vec<u8>,
}

/// Per-stage reports of a finished run, in topological order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub stages: Vec<StageReport>,
}

impl RunSummary {
    pub fn get(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.name == name)
    }

    pub fn status_of(&self, name: &str) -> Option<StageStatus> {
        self.get(name).map(|r| r.status)
    }

    /// False if any stage failed without `allow_failure` or was canceled.
    pub fn is_success(&self) -> bool {
        !self.stages.iter().any(|r| match r.status {
            StageStatus::Error => !r.allow_failure,
            StageStatus::Canceled => true,
            _ => false,
        })
    }
}

/// Result of a single stage run.
#[derive(Debug)]
struct StageRun {
    status: StageStatus,
    exit_code: Option<i32>,
    output: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Readiness {
    Ready,
    Pending,
    Blocked(String),
}

/// What a task of the run's `JoinSet` reports back.
enum Completion {
    Condition { name: String, result: Result<bool> },
    Stage { name: String, run: StageRun },
}

/// Mutable bookkeeping of one `schedule` call.
#[derive(Default)]
struct RunState {
    tasks: JoinSet<Completion>,
    cancels: HashMap<String, oneshot::Sender<()>>,
    /// Stages whose condition check is in flight.
    checking: HashMap<String, AbortHandle>,
    runs: HashMap<String, StageRun>,
    /// Stages skipped because something upstream failed.
    blocked: HashSet<String>,
    swept: bool,
}

pub struct Scheduler {
    executor: Arc<dyn ExecutorBackend>,
    output: Arc<TaskOutput>,
    cancelled: AtomicBool,
    wake: Notify,
}

impl Scheduler {
    pub fn new(executor: Arc<dyn ExecutorBackend>, output: Arc<TaskOutput>) -> Self {
        Self {
            executor,
            output,
            cancelled: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    /// Request cancellation of the current run (e.g. on Ctrl-C).
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            info!("run cancellation requested");
        }
        self.wake.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run every stage of `graph` and close the task output afterwards.
    pub async fn schedule(&self, graph: &Arc<ExecutionGraph>) -> Result<RunSummary> {
        info!(pipeline = %graph.name(), stages = graph.len(), "pipeline run started");

        let mut state = RunState::default();

        loop {
            if self.is_cancelled() {
                if !state.swept {
                    state.swept = true;
                    self.cancel_running(&mut state);
                    sweep_waiting(graph, &mut state.blocked);
                }
            } else {
                self.launch_ready(graph, &mut state);
            }

            if state.tasks.is_empty() {
                break;
            }

            tokio::select! {
                joined = state.tasks.join_next() => match joined {
                    Some(Ok(Completion::Stage { name, run })) => {
                        self.on_stage_finished(graph, &mut state, name, run)
                    }
                    Some(Ok(Completion::Condition { name, result })) => {
                        self.on_condition_checked(graph, &mut state, name, result)
                    }
                    Some(Err(err)) if err.is_cancelled() => {
                        debug!("condition check aborted");
                    }
                    Some(Err(err)) => {
                        error!(error = %err, "stage task failed to complete");
                        self.cancel();
                    }
                    None => {}
                },
                _ = self.wake.notified(), if !state.swept => {
                    debug!("scheduler woken up");
                }
            }
        }

        // Nothing may be left in flight once the loop ends.
        for stage in graph.stages() {
            match stage.read_status() {
                StageStatus::Waiting => {
                    warn!(stage = %stage.name, "stage never became ready; marking canceled");
                    stage.update_status(StageStatus::Canceled);
                }
                StageStatus::Running => {
                    warn!(stage = %stage.name, "stage task lost; marking error");
                    stage.update_status(StageStatus::Error);
                }
                _ => {}
            }
        }

        self.output.close();

        let summary = build_summary(graph, state.runs);
        info!(
            pipeline = %graph.name(),
            success = summary.is_success(),
            "pipeline run finished"
        );
        Ok(summary)
    }

    /// Launch every stage that can run now; stages with a condition get a
    /// condition check task first.
    fn launch_ready(&self, graph: &Arc<ExecutionGraph>, state: &mut RunState) {
        for stage in graph.stages() {
            if stage.read_status() != StageStatus::Waiting
                || state.checking.contains_key(&stage.name)
            {
                continue;
            }

            match readiness(graph, stage, &state.blocked) {
                Readiness::Pending => continue,
                Readiness::Blocked(dep) => {
                    info!(stage = %stage.name, dependency = %dep, "upstream stage failed; skipping");
                    stage.update_status(StageStatus::Skipped);
                    state.blocked.insert(stage.name.clone());
                    continue;
                }
                Readiness::Ready => {}
            }

            if stage.condition.is_some() {
                debug!(stage = %stage.name, "checking stage condition");
                let task_stage = Arc::clone(stage);
                let executor = Arc::clone(&self.executor);
                let handle = state.tasks.spawn(async move {
                    let result = executor.check_condition(&task_stage).await;
                    Completion::Condition {
                        name: task_stage.name.clone(),
                        result,
                    }
                });
                state.checking.insert(stage.name.clone(), handle);
                continue;
            }

            self.launch(stage, state);
        }
    }

    fn launch(&self, stage: &Arc<Stage>, state: &mut RunState) {
        debug!(stage = %stage.name, "dependencies satisfied; marking Running");
        stage.update_status(StageStatus::Running);

        let (cancel_tx, cancel_rx) = oneshot::channel();
        state.cancels.insert(stage.name.clone(), cancel_tx);

        let stage = Arc::clone(stage);
        let executor = Arc::clone(&self.executor);
        let output = Arc::clone(&self.output);
        state.tasks.spawn(async move {
            let run = run_stage(executor, output, &stage, cancel_rx).await;
            Completion::Stage {
                name: stage.name.clone(),
                run,
            }
        });
    }

    fn on_condition_checked(
        &self,
        graph: &ExecutionGraph,
        state: &mut RunState,
        name: String,
        result: Result<bool>,
    ) {
        state.checking.remove(&name);
        let Some(stage) = graph.stage(&name) else {
            return;
        };
        // Settled by a cancellation sweep in the meantime.
        if stage.read_status() != StageStatus::Waiting || self.is_cancelled() {
            return;
        }

        match result {
            Ok(true) => self.launch(stage, state),
            Ok(false) => {
                info!(stage = %name, "condition not met; skipping");
                stage.update_status(StageStatus::Skipped);
            }
            Err(err) => {
                error!(stage = %name, error = %err, "condition check failed");
                stage.update_status(StageStatus::Error);
                if !stage.allow_failure {
                    self.cancel();
                }
            }
        }
    }

    fn on_stage_finished(
        &self,
        graph: &ExecutionGraph,
        state: &mut RunState,
        name: String,
        run: StageRun,
    ) {
        state.cancels.remove(&name);

        let allow_failure = graph.stage(&name).is_some_and(|s| s.allow_failure);
        if run.status == StageStatus::Error && !allow_failure {
            warn!(stage = %name, "stage failed; cancelling the rest of the run");
            self.cancel();
        }
        state.runs.insert(name, run);
    }

    fn cancel_running(&self, state: &mut RunState) {
        for (name, cancel) in state.cancels.drain() {
            if cancel.send(()).is_err() {
                debug!(stage = %name, "stage already finished while cancelling");
            }
        }
        for (name, check) in state.checking.drain() {
            debug!(stage = %name, "aborting condition check");
            check.abort();
        }
    }
}

/// Whether all dependencies of `stage` allow it to run.
fn readiness(graph: &ExecutionGraph, stage: &Stage, blocked: &HashSet<String>) -> Readiness {
    let mut pending = false;

    for dep_name in &stage.depends_on {
        let Some(dep) = graph.stage(dep_name) else {
            // Cannot happen for a validated graph.
            warn!(stage = %stage.name, dependency = %dep_name, "dependency missing from graph");
            return Readiness::Blocked(dep_name.clone());
        };

        match dep.read_status() {
            StageStatus::Done => {}
            StageStatus::Skipped if !blocked.contains(dep_name) => {}
            StageStatus::Error if dep.allow_failure => {}
            StageStatus::Skipped | StageStatus::Error | StageStatus::Canceled => {
                return Readiness::Blocked(dep_name.clone());
            }
            StageStatus::Waiting | StageStatus::Running => pending = true,
        }
    }

    if pending {
        Readiness::Pending
    } else {
        Readiness::Ready
    }
}

/// Settle every Waiting stage of a cancelled run.
fn sweep_waiting(graph: &ExecutionGraph, blocked: &mut HashSet<String>) {
    for stage in graph.stages() {
        if stage.read_status() != StageStatus::Waiting {
            continue;
        }

        let downstream_of_failure = stage.depends_on.iter().any(|dep| {
            blocked.contains(dep)
                || graph
                    .stage(dep)
                    .is_some_and(|d| d.read_status() == StageStatus::Error && !d.allow_failure)
        });

        if downstream_of_failure {
            debug!(stage = %stage.name, "skipping stage downstream of a failure");
            stage.update_status(StageStatus::Skipped);
            blocked.insert(stage.name.clone());
        } else {
            debug!(stage = %stage.name, "canceling waiting stage");
            stage.update_status(StageStatus::Canceled);
        }
    }
}

/// One full stage run: header, process, streaming, footer.
async fn run_stage(
    executor: Arc<dyn ExecutorBackend>,
    output: Arc<TaskOutput>,
    stage: &Stage,
    cancel: oneshot::Receiver<()>,
) -> StageRun {
    stage.mark_started();
    if let Err(err) = stage.log.open() {
        warn!(stage = %stage.name, error = %err, "failed to open stage log files");
    }
    if let Err(err) = output.start(stage) {
        warn!(stage = %stage.name, error = %err, "failed to write stage header");
    }

    let run = match executor.spawn(stage, cancel) {
        Ok(process) => {
            let (out_tx, out_rx) = oneshot::channel();
            let (report, exit) = tokio::join!(
                output.stream(stage, process.stdout, process.stderr, out_tx),
                process.exit
            );
            if report.has_errors() {
                debug!(stage = %stage.name, ?report, "stage output was not fully captured");
            }
            let captured = out_rx.await.unwrap_or_default();

            let (status, exit_code) = match exit {
                Ok(Ok(StageOutcome::Success)) => (StageStatus::Done, Some(0)),
                Ok(Ok(StageOutcome::Failed(code))) => (StageStatus::Error, Some(code)),
                Ok(Ok(StageOutcome::Canceled)) => (StageStatus::Canceled, None),
                Ok(Err(err)) => {
                    error!(stage = %stage.name, error = %err, "stage execution error");
                    (StageStatus::Error, None)
                }
                Err(err) => {
                    error!(stage = %stage.name, error = %err, "stage process task failed");
                    (StageStatus::Error, None)
                }
            };

            StageRun {
                status,
                exit_code,
                output: captured,
            }
        }
        Err(err) => {
            error!(stage = %stage.name, error = %err, "failed to start stage process");
            StageRun {
                status: StageStatus::Error,
                exit_code: None,
                output: Vec::new(),
            }
        }
    };

    stage.mark_finished();
    stage.update_status(run.status);

    let duration = format_duration(stage.duration());
    match run.status {
        StageStatus::Done => info!(stage = %stage.name, %duration, "stage done"),
        StageStatus::Error if stage.allow_failure => warn!(
            stage = %stage.name,
            exit_code = ?run.exit_code,
            %duration,
            "stage failed (failure allowed)"
        ),
        StageStatus::Error => error!(
            stage = %stage.name,
            exit_code = ?run.exit_code,
            %duration,
            "stage failed"
        ),
        status => info!(stage = %stage.name, %status, %duration, "stage ended"),
    }

    if let Err(err) = output.finish(stage) {
        warn!(stage = %stage.name, error = %err, "failed to write stage footer");
    }

    run
}

fn build_summary(graph: &ExecutionGraph, mut runs: HashMap<String, StageRun>) -> RunSummary {
    let stages = graph
        .stages()
        .map(|stage| {
            let run = runs.remove(&stage.name);
            StageReport {
                name: stage.name.clone(),
                status: stage.read_status(),
                allow_failure: stage.allow_failure,
                duration: stage.duration(),
                exit_code: run.as_ref().and_then(|r| r.exit_code),
                output: run.map(|r| r.output).unwrap_or_default(),
            }
        })
        .collect();
    RunSummary { stages }
}
