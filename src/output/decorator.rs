// src/output/decorator.rs

//! The renderer contract every output mode implements.

use std::io::{self, IsTerminal};
use std::sync::Arc;

use chrono::TimeDelta;

use crate::output::sink::SharedWriter;
use crate::scheduler::Stage;

/// Default number of bytes a stream reader pulls per read call.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// A pluggable renderer of stage output.
///
/// One instance is shared by every running stage, so implementations must
/// synchronize whatever state they mutate per call.
///
/// Call protocol, per stage run:
/// 1. `write_header(stage)` exactly once,
/// 2. `for_task(stage)` to obtain the instance that receives the stage's
///    bytes, then any number of `write` calls on it,
/// 3. `write_footer(stage)` exactly once, after the last `write`.
pub trait DecoratedOutputWriter: Send + Sync {
    /// Raw byte sink. Chunks are arbitrary; no line framing is implied.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    fn write_header(&self, stage: &Stage) -> io::Result<()>;

    fn write_footer(&self, stage: &Stage) -> io::Result<()>;

    /// Renderer scoped to `stage`. May be `self`; callers must not assume.
    fn for_task(self: Arc<Self>, stage: &Stage) -> Arc<dyn DecoratedOutputWriter>;
}

/// Write the whole buffer through a decorator.
pub(crate) fn write_all(decorator: &dyn DecoratedOutputWriter, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match decorator.write(buf) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "decorator accepted zero bytes",
                ));
            }
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Construction-time settings shared by all output modes.
///
/// Replaces process-wide default targets: the destination is chosen once, by
/// whoever builds the [`TaskOutput`](crate::output::TaskOutput).
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Where decorators render to. Defaults to stdout.
    pub destination: SharedWriter,
    /// Whether decorators may emit ANSI colours.
    pub colors: bool,
    /// Whether the destination is a terminal that can be redrawn in place.
    pub live: bool,
    /// Bytes per read call of each stream reader (>= 1).
    pub chunk_size: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            destination: SharedWriter::stdout(),
            colors: io::stdout().is_terminal(),
            live: io::stdout().is_terminal(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl OutputConfig {
    /// Plain output into `destination`: no colours, no in-place redraws.
    pub fn to_writer(destination: SharedWriter) -> Self {
        Self {
            destination,
            colors: false,
            live: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_colors(mut self, colors: bool) -> Self {
        self.colors = colors;
        self
    }

    pub fn with_live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

/// Human-friendly rendering of a stage duration: `350ms`, `1.25s`, `2m03s`.
pub fn format_duration(d: TimeDelta) -> String {
    let ms = d.num_milliseconds();
    let sign = if ms < 0 { "-" } else { "" };
    let ms = ms.unsigned_abs();

    if ms < 1_000 {
        format!("{sign}{ms}ms")
    } else if ms < 60_000 {
        format!("{sign}{:.2}s", ms as f64 / 1_000.0)
    } else {
        let secs = ms / 1_000;
        format!("{sign}{}m{:02}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_durations_by_magnitude() {
        assert_eq!(format_duration(TimeDelta::milliseconds(0)), "0ms");
        assert_eq!(format_duration(TimeDelta::milliseconds(350)), "350ms");
        assert_eq!(format_duration(TimeDelta::milliseconds(1250)), "1.25s");
        assert_eq!(format_duration(TimeDelta::seconds(123)), "2m03s");
        assert_eq!(format_duration(TimeDelta::milliseconds(-20)), "-20ms");
    }

    #[test]
    fn chunk_size_is_at_least_one() {
        let cfg = OutputConfig::to_writer(SharedWriter::new(std::io::sink())).with_chunk_size(0);
        assert_eq!(cfg.chunk_size, 1);
    }
}
