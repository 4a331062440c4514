// src/scheduler/stage.rs

//! A single node of the execution graph.
//!
//! A [`Stage`] is plain bookkeeping: identity, dependencies, bindings, log
//! sinks and runtime state. Only `status` may be touched concurrently; it is
//! stored in an atomic. Timing is written by the scheduler task that owns the
//! stage's run and read by everyone else afterwards.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use chrono::{DateTime, TimeDelta, Utc};

use crate::output::sink::{lock_unpoisoned, LogSink};
use crate::scheduler::graph::ExecutionGraph;
use crate::variables::Variables;

/// Execution status of a stage.
///
/// `Waiting` and `Running` are the only non-terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StageStatus {
    Waiting = 0,
    Running = 1,
    /// Condition evaluated false, or an upstream stage failed without
    /// `allow_failure`. Counts as "not executed".
    Skipped = 2,
    Done = 3,
    Error = 4,
    Canceled = 5,
}

impl StageStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StageStatus::Waiting,
            1 => StageStatus::Running,
            2 => StageStatus::Skipped,
            3 => StageStatus::Done,
            4 => StageStatus::Error,
            _ => StageStatus::Canceled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StageStatus::Waiting | StageStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Waiting => "waiting",
            StageStatus::Running => "running",
            StageStatus::Skipped => "skipped",
            StageStatus::Done => "done",
            StageStatus::Error => "error",
            StageStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable per-channel logs of a stage.
#[derive(Debug, Clone, Default)]
pub struct StageLog {
    pub stdout: LogSink,
    pub stderr: LogSink,
}

impl StageLog {
    /// Create any pending log files. Called once the stage is about to run.
    pub fn open(&self) -> std::io::Result<()> {
        self.stdout.open()?;
        self.stderr.open()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct StageTiming {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

pub struct Stage {
    pub name: String,
    /// Shell command run for this stage.
    pub cmd: String,
    /// Opaque skip condition; evaluated by the executor backend.
    pub condition: Option<String>,
    /// Working directory; empty means "inherit".
    pub dir: String,
    pub depends_on: Vec<String>,
    pub allow_failure: bool,
    pub env: Variables,
    pub variables: Variables,
    pub log: StageLog,

    status: AtomicU8,
    timing: Mutex<StageTiming>,
    pipeline: OnceLock<Weak<ExecutionGraph>>,
}

impl Stage {
    pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into(),
            condition: None,
            dir: String::new(),
            depends_on: Vec::new(),
            allow_failure: false,
            env: Variables::new(),
            variables: Variables::new(),
            log: StageLog::default(),
            status: AtomicU8::new(StageStatus::Waiting as u8),
            timing: Mutex::new(StageTiming::default()),
            pipeline: OnceLock::new(),
        }
    }

    pub fn after(mut self, dep: impl Into<String>) -> Self {
        self.depends_on.push(dep.into());
        self
    }

    pub fn with_dir(mut self, dir: impl Into<String>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_allow_failure(mut self, allow: bool) -> Self {
        self.allow_failure = allow;
        self
    }

    pub fn with_env(mut self, env: Variables) -> Self {
        self.env = env;
        self
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_log(mut self, log: StageLog) -> Self {
        self.log = log;
        self
    }

    pub fn update_status(&self, status: StageStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }

    pub fn read_status(&self) -> StageStatus {
        StageStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        lock_unpoisoned(&self.timing).start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        lock_unpoisoned(&self.timing).end
    }

    pub fn set_start(&self, at: DateTime<Utc>) {
        lock_unpoisoned(&self.timing).start = Some(at);
    }

    pub fn set_end(&self, at: DateTime<Utc>) {
        lock_unpoisoned(&self.timing).end = Some(at);
    }

    pub fn mark_started(&self) {
        self.set_start(Utc::now());
    }

    pub fn mark_finished(&self) {
        self.set_end(Utc::now());
    }

    /// `end - start`.
    ///
    /// Only meaningful once the stage is terminal. Called earlier it may be
    /// zero or negative; if either timestamp is unset it is zero.
    pub fn duration(&self) -> TimeDelta {
        let timing = *lock_unpoisoned(&self.timing);
        match (timing.start, timing.end) {
            (Some(start), Some(end)) => end - start,
            _ => TimeDelta::zero(),
        }
    }

    /// The graph this stage belongs to, if it was attached and is still alive.
    pub fn pipeline(&self) -> Option<Arc<ExecutionGraph>> {
        self.pipeline.get().and_then(Weak::upgrade)
    }

    pub(crate) fn attach(&self, graph: Weak<ExecutionGraph>) {
        // A stage belongs to exactly one graph; later attaches are ignored.
        let _ = self.pipeline.set(graph);
    }

    /// Command with `{{ var }}` placeholders resolved.
    ///
    /// `Stage.Name` and `Stage.Dir` are always bound; stage variables may
    /// shadow them.
    pub fn command(&self) -> String {
        let builtins = Variables::new()
            .with("Stage.Name", self.name.as_str())
            .with("Stage.Dir", self.dir.as_str());
        builtins.merge(&self.variables).interpolate(&self.cmd)
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("cmd", &self.cmd)
            .field("depends_on", &self.depends_on)
            .field("allow_failure", &self.allow_failure)
            .field("status", &self.read_status())
            .finish_non_exhaustive()
    }
}
