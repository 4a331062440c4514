// src/output/cockpit.rs

//! Live dashboard of running stages.
//!
//! Every running stage owns one row: a spinner frame, the stage name, its
//! elapsed time and the last line it printed. Rows are redrawn in place on
//! every stage transition and on a background tick. When a stage finishes
//! its row is replaced by a permanent completion line.
//!
//! The ticker stops when the run-wide shutdown signal fires.
//!
//! When the destination is not a terminal (a pipe, a CI log) nothing is
//! redrawn: only the completion lines are written, without escape codes.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use chrono::TimeDelta;
use colored::Colorize;
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::output::decorator::{format_duration, DecoratedOutputWriter};
use crate::output::sink::{lock_unpoisoned, SharedWriter};
use crate::scheduler::{Stage, StageStatus};

const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const TICK: Duration = Duration::from_millis(100);
/// Bytes of recent output kept per row to find its last line.
const TAIL_LIMIT: usize = 512;
const LAST_LINE_WIDTH: usize = 60;

struct Row {
    started: Instant,
    tail: Vec<u8>,
}

impl Row {
    fn last_line(&self) -> String {
        let text = String::from_utf8_lossy(&self.tail);
        let line = text
            .split(|c: char| c == '\n' || c == '\r')
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("");
        line.chars().take(LAST_LINE_WIDTH).collect()
    }
}

#[derive(Default)]
struct CockpitState {
    rows: BTreeMap<String, Row>,
    frame: usize,
    /// Number of row lines currently on screen.
    drawn: usize,
    closed: bool,
}

pub struct CockpitOutputWriter {
    dst: SharedWriter,
    colors: bool,
    live: bool,
    state: Mutex<CockpitState>,
}

impl CockpitOutputWriter {
    /// Build the dashboard and start its refresh ticker.
    ///
    /// `live` enables in-place redraws. The ticker needs a Tokio runtime;
    /// without one the dashboard is only redrawn on stage transitions.
    pub fn new(
        dst: SharedWriter,
        colors: bool,
        live: bool,
        shutdown: oneshot::Receiver<()>,
    ) -> Arc<Self> {
        let cockpit = Arc::new(Self {
            dst,
            colors,
            live,
            state: Mutex::new(CockpitState::default()),
        });

        if !live {
            debug!("cockpit destination is not a terminal; printing completion lines only");
            return cockpit;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(run_ticker(Arc::downgrade(&cockpit), shutdown));
            }
            Err(_) => {
                debug!("no tokio runtime; cockpit redraws on stage transitions only");
            }
        }

        cockpit
    }

    /// Advance the spinner and redraw.
    pub fn tick(&self) {
        let mut state = lock_unpoisoned(&self.state);
        if state.closed || state.rows.is_empty() {
            return;
        }
        state.frame = state.frame.wrapping_add(1);
        if let Err(err) = self.redraw(&mut state, None) {
            debug!(error = %err, "cockpit redraw failed");
        }
    }

    /// Stop refreshing and clear the dashboard rows.
    ///
    /// Shutdown is fired once per run; a second notification is a bug in the
    /// caller and is reported, not acted upon.
    pub fn shut_down(&self) {
        let mut state = lock_unpoisoned(&self.state);
        if state.closed {
            error!("cockpit shutdown signalled more than once");
            return;
        }
        state.closed = true;
        state.rows.clear();
        if let Err(err) = self.redraw(&mut state, None) {
            debug!(error = %err, "cockpit final redraw failed");
        }
    }

    pub fn is_closed(&self) -> bool {
        lock_unpoisoned(&self.state).closed
    }

    fn record_output(&self, stage: &str, buf: &[u8]) {
        let mut state = lock_unpoisoned(&self.state);
        if let Some(row) = state.rows.get_mut(stage) {
            row.tail.extend_from_slice(buf);
            if row.tail.len() > TAIL_LIMIT {
                let excess = row.tail.len() - TAIL_LIMIT;
                row.tail.drain(..excess);
            }
        }
    }

    /// Erase the rows on screen, print `permanent` (if any) above them and
    /// draw the current rows again, all in one write.
    fn redraw(&self, state: &mut CockpitState, permanent: Option<String>) -> io::Result<()> {
        if !self.live {
            return match permanent {
                Some(line) => self.dst.write_all(format!("{line}\n").as_bytes()),
                None => Ok(()),
            };
        }

        let mut out = String::new();
        if state.drawn > 0 {
            // Cursor to the start of the first drawn row, clear to end of screen.
            out.push_str(&format!("\x1b[{}F\x1b[J", state.drawn));
        }
        if let Some(line) = permanent {
            out.push_str(&line);
            out.push('\n');
        }

        let frame = FRAMES[state.frame % FRAMES.len()];
        for (name, row) in state.rows.iter() {
            let elapsed =
                TimeDelta::from_std(row.started.elapsed()).unwrap_or_else(|_| TimeDelta::zero());
            let spinner = if self.colors {
                frame.cyan().to_string()
            } else {
                frame.to_string()
            };
            out.push_str(&format!(
                "{spinner} {name} ({}) {}\n",
                format_duration(elapsed),
                row.last_line()
            ));
        }
        state.drawn = state.rows.len();

        if out.is_empty() {
            return Ok(());
        }
        self.dst.write_all(out.as_bytes())
    }

    fn completion_line(&self, stage: &Stage) -> String {
        let status = stage.read_status();
        let symbol = match status {
            StageStatus::Done => "✔",
            StageStatus::Error => "✗",
            _ => "-",
        };
        let symbol = match (self.colors, status) {
            (false, _) => symbol.to_string(),
            (true, StageStatus::Done) => symbol.green().to_string(),
            (true, StageStatus::Error) => symbol.red().to_string(),
            (true, _) => symbol.yellow().to_string(),
        };
        format!(
            "{symbol} {} {} in {}",
            stage.name,
            status,
            format_duration(stage.duration())
        )
    }
}

async fn run_ticker(cockpit: Weak<CockpitOutputWriter>, mut shutdown: oneshot::Receiver<()>) {
    let mut interval = tokio::time::interval(TICK);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match cockpit.upgrade() {
                    Some(c) => c.tick(),
                    None => break,
                }
            }
            // A dropped sender also means the run is over.
            _ = &mut shutdown => {
                if let Some(c) = cockpit.upgrade() {
                    c.shut_down();
                }
                break;
            }
        }
    }
    debug!("cockpit ticker stopped");
}

impl DecoratedOutputWriter for CockpitOutputWriter {
    /// Output without a stage has no row to show in; it is dropped.
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn write_header(&self, stage: &Stage) -> io::Result<()> {
        let mut state = lock_unpoisoned(&self.state);
        state.rows.insert(
            stage.name.clone(),
            Row {
                started: Instant::now(),
                tail: Vec::new(),
            },
        );
        if state.closed {
            return Ok(());
        }
        self.redraw(&mut state, None)
    }

    fn write_footer(&self, stage: &Stage) -> io::Result<()> {
        let line = self.completion_line(stage);
        let mut state = lock_unpoisoned(&self.state);
        state.rows.remove(&stage.name);
        if state.closed {
            return self.dst.write_all(format!("{line}\n").as_bytes());
        }
        self.redraw(&mut state, Some(line))
    }

    fn for_task(self: Arc<Self>, stage: &Stage) -> Arc<dyn DecoratedOutputWriter> {
        Arc::new(CockpitStageWriter {
            parent: self,
            stage: stage.name.clone(),
        })
    }
}

/// Feeds one stage's output into its dashboard row.
pub struct CockpitStageWriter {
    parent: Arc<CockpitOutputWriter>,
    stage: String,
}

impl DecoratedOutputWriter for CockpitStageWriter {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.parent.record_output(&self.stage, buf);
        Ok(buf.len())
    }

    fn write_header(&self, stage: &Stage) -> io::Result<()> {
        self.parent.write_header(stage)
    }

    fn write_footer(&self, stage: &Stage) -> io::Result<()> {
        self.parent.write_footer(stage)
    }

    fn for_task(self: Arc<Self>, stage: &Stage) -> Arc<dyn DecoratedOutputWriter> {
        Arc::clone(&self.parent).for_task(stage)
    }
}
