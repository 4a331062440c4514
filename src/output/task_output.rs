// src/output/task_output.rs

//! Per-run coordinator of stage output.
//!
//! [`TaskOutput`] owns the decorator selected for the run. For every running
//! stage it fans the process's stdout and stderr into:
//! - the stage-scoped decorator (terminal rendering),
//! - the stage's per-channel log sink,
//! - an in-memory capture buffer handed back once both streams end.
//!
//! Each channel is read by its own Tokio task. Bytes of one channel reach
//! every destination in order; the two channels interleave freely. The
//! capture buffer and scoped decorator are shared by both readers and sit
//! behind one mutex, so both destinations observe the same interleaving.

use std::io;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::output::cockpit::CockpitOutputWriter;
use crate::output::decorator::{self, DecoratedOutputWriter, OutputConfig};
use crate::output::prefixed::PrefixedOutputWriter;
use crate::output::raw::RawOutputWriter;
use crate::output::sink::{lock_unpoisoned, LogSink};
use crate::scheduler::Stage;
use crate::types::OutputFormat;

/// Which process stream a reader consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stdout,
    Stderr,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Stdout => "stdout",
            Channel::Stderr => "stderr",
        }
    }
}

/// What one channel reader did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelReport {
    /// Bytes read from the handle (and fanned out).
    pub bytes: usize,
    /// Read error that ended the reader early, if any.
    pub error: Option<String>,
}

/// Diagnostics of one `stream` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamReport {
    pub stdout: ChannelReport,
    pub stderr: ChannelReport,
}

impl StreamReport {
    pub fn has_errors(&self) -> bool {
        self.stdout.error.is_some() || self.stderr.error.is_some()
    }
}

/// Destinations shared by both readers of one stage.
struct SharedTargets {
    capture: Vec<u8>,
    decorator: Arc<dyn DecoratedOutputWriter>,
}

pub struct TaskOutput {
    /// Guards acquisition of stage-scoped decorators only.
    decorator: Mutex<Arc<dyn DecoratedOutputWriter>>,
    /// Run-wide shutdown signal; taken on the first `close`.
    close_tx: Mutex<Option<oneshot::Sender<()>>>,
    chunk_size: usize,
}

impl TaskOutput {
    /// Build the coordinator with one of the built-in decorators.
    pub fn new(format: OutputFormat, config: OutputConfig) -> Self {
        Self::with_decorator(&config, |config, shutdown| {
            let dst = config.destination.clone();
            let decorator: Arc<dyn DecoratedOutputWriter> = match format {
                OutputFormat::Raw => Arc::new(RawOutputWriter::new(dst)),
                OutputFormat::Prefixed => Arc::new(PrefixedOutputWriter::new(dst, config.colors)),
                OutputFormat::Cockpit => {
                    CockpitOutputWriter::new(dst, config.colors, config.live, shutdown)
                }
            };
            decorator
        })
    }

    /// Build the coordinator from a mode tag (`raw`, `prefixed`, `cockpit`).
    ///
    /// An unknown tag fails before any decorator is created.
    pub fn from_name(format: &str, config: OutputConfig) -> Result<Self> {
        let format: OutputFormat = format.parse()?;
        Ok(Self::new(format, config))
    }

    /// Build the coordinator around a custom renderer.
    ///
    /// `make` receives the run-wide shutdown signal; renderers that do not
    /// care about it may drop it.
    pub fn with_decorator<F>(config: &OutputConfig, make: F) -> Self
    where
        F: FnOnce(&OutputConfig, oneshot::Receiver<()>) -> Arc<dyn DecoratedOutputWriter>,
    {
        let (close_tx, close_rx) = oneshot::channel();
        Self {
            decorator: Mutex::new(make(config, close_rx)),
            close_tx: Mutex::new(Some(close_tx)),
            chunk_size: config.chunk_size.max(1),
        }
    }

    /// Write the stage header. Call once per stage run, before `stream`.
    pub fn start(&self, stage: &Stage) -> io::Result<()> {
        let decorator = Arc::clone(&*lock_unpoisoned(&self.decorator));
        decorator.write_header(stage)
    }

    /// Write the stage footer. Call once per stage run, after `stream`.
    pub fn finish(&self, stage: &Stage) -> io::Result<()> {
        let decorator = Arc::clone(&*lock_unpoisoned(&self.decorator));
        decorator.write_footer(stage)
    }

    /// Stream a stage's stdout and stderr until both reach end-of-stream.
    ///
    /// The captured bytes are sent through `out` exactly once; consuming the
    /// sender closes the channel. Read and write failures are diagnostics
    /// only: they show up in the returned report and in the logs, never as
    /// an error.
    pub async fn stream<O, E>(
        &self,
        stage: &Stage,
        stdout: O,
        stderr: E,
        out: oneshot::Sender<Vec<u8>>,
    ) -> StreamReport
    where
        O: AsyncRead + Send + Unpin + 'static,
        E: AsyncRead + Send + Unpin + 'static,
    {
        let scoped = {
            let guard = lock_unpoisoned(&self.decorator);
            Arc::clone(&*guard).for_task(stage)
        };

        let targets = Arc::new(Mutex::new(SharedTargets {
            capture: Vec::new(),
            decorator: scoped,
        }));

        let stdout_reader = tokio::spawn(pipe(
            Channel::Stdout,
            stage.name.clone(),
            stdout,
            Arc::clone(&targets),
            stage.log.stdout.clone(),
            self.chunk_size,
        ));
        let stderr_reader = tokio::spawn(pipe(
            Channel::Stderr,
            stage.name.clone(),
            stderr,
            Arc::clone(&targets),
            stage.log.stderr.clone(),
            self.chunk_size,
        ));

        let (stdout_res, stderr_res) = tokio::join!(stdout_reader, stderr_reader);
        let report = StreamReport {
            stdout: reader_report(&stage.name, Channel::Stdout, stdout_res),
            stderr: reader_report(&stage.name, Channel::Stderr, stderr_res),
        };

        let captured = std::mem::take(&mut lock_unpoisoned(&targets).capture);
        if out.send(captured).is_err() {
            debug!(stage = %stage.name, "capture receiver dropped before delivery");
        }

        report
    }

    /// Fire the run-wide shutdown signal.
    ///
    /// Only the first call fires; it returns `true`. Later calls do nothing
    /// and return `false`.
    pub fn close(&self) -> bool {
        let sender = lock_unpoisoned(&self.close_tx).take();
        match sender {
            Some(tx) => {
                // Decorators without a shutdown hook dropped the receiver.
                let _ = tx.send(());
                debug!("task output closed");
                true
            }
            None => {
                warn!("task output closed more than once; ignoring");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        lock_unpoisoned(&self.close_tx).is_none()
    }
}

fn reader_report(
    stage: &str,
    channel: Channel,
    res: std::result::Result<ChannelReport, JoinError>,
) -> ChannelReport {
    res.unwrap_or_else(|err| {
        warn!(stage = %stage, channel = channel.as_str(), error = %err, "stream reader task failed");
        ChannelReport {
            bytes: 0,
            error: Some(err.to_string()),
        }
    })
}

/// Copy `src` into the shared targets and the channel's log sink until
/// end-of-stream or a read error.
async fn pipe<R>(
    channel: Channel,
    stage: String,
    mut src: R,
    targets: Arc<Mutex<SharedTargets>>,
    log: LogSink,
    chunk_size: usize,
) -> ChannelReport
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size];
    let mut report = ChannelReport::default();

    loop {
        let n = match src.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                debug!(
                    stage = %stage,
                    channel = channel.as_str(),
                    error = %err,
                    "stream read failed; stopping this channel"
                );
                report.error = Some(err.to_string());
                break;
            }
        };

        let chunk = &buf[..n];
        report.bytes += n;

        {
            let mut shared = lock_unpoisoned(&targets);
            shared.capture.extend_from_slice(chunk);
            if let Err(err) = decorator::write_all(shared.decorator.as_ref(), chunk) {
                debug!(
                    stage = %stage,
                    channel = channel.as_str(),
                    error = %err,
                    "decorator write failed; output dropped"
                );
            }
        }

        if let Err(err) = log.write_all(chunk) {
            warn!(
                stage = %stage,
                channel = channel.as_str(),
                error = %err,
                "log sink write failed"
            );
        }
    }

    if let Err(err) = log.flush() {
        warn!(stage = %stage, channel = channel.as_str(), error = %err, "log sink flush failed");
    }

    report
}
