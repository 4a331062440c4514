// src/output/sink.rs

//! Writers shared between concurrent producers.
//!
//! - [`SharedWriter`] is the destination every decorator renders into. It is
//!   shared by all running stages, so every write goes through one mutex.
//! - [`LogSink`] is a per-stage, per-channel durable log: an in-memory buffer
//!   that can additionally be teed into a file. Log files are only created
//!   once the sink is opened or first written, so building a pipeline never
//!   touches the logs of an earlier run.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Output plumbing never gives up on a destination because an unrelated
/// writer panicked mid-write.
pub(crate) fn lock_unpoisoned<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle to a mutex-guarded byte destination.
#[derive(Clone)]
pub struct SharedWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl SharedWriter {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// The process standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Write the whole buffer and flush, holding the lock for both.
    pub fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut guard = lock_unpoisoned(&self.inner);
        guard.write_all(buf)?;
        guard.flush()
    }
}

impl fmt::Debug for SharedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedWriter").finish_non_exhaustive()
    }
}

/// In-memory buffer that can be handed out to tests and shared with a
/// [`SharedWriter`] at the same time.
#[derive(Debug, Clone, Default)]
pub struct MemoryBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        lock_unpoisoned(&self.inner).clone()
    }

    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for MemoryBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock_unpoisoned(&self.inner).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct LogSinkInner {
    buf: Vec<u8>,
    tee: Option<Box<dyn Write + Send>>,
    /// Log file not opened yet.
    pending: Option<PathBuf>,
}

/// Durable log of one output channel of one stage.
///
/// Bytes are always kept in memory; a tee writer (usually a log file) is
/// optional. Clones share the same underlying log.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Mutex<LogSinkInner>>,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::memory()
    }
}

impl LogSink {
    pub fn memory() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogSinkInner {
                buf: Vec::new(),
                tee: None,
                pending: None,
            })),
        }
    }

    pub fn with_tee<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogSinkInner {
                buf: Vec::new(),
                tee: Some(Box::new(writer)),
                pending: None,
            })),
        }
    }

    /// Tee every logged byte into `path`.
    ///
    /// The file (and its parent directories) is created, or truncated, by
    /// [`open`](Self::open) or the first write, not here.
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogSinkInner {
                buf: Vec::new(),
                tee: None,
                pending: Some(path.into()),
            })),
        }
    }

    /// Create the log file if it is still pending. A no-op otherwise.
    pub fn open(&self) -> io::Result<()> {
        open_pending(&mut lock_unpoisoned(&self.inner))
    }

    /// Append `buf` to the log.
    ///
    /// The in-memory copy always succeeds; an error only reports a failing
    /// tee writer.
    pub fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut guard = lock_unpoisoned(&self.inner);
        guard.buf.extend_from_slice(buf);
        open_pending(&mut guard)?;
        match guard.tee.as_mut() {
            Some(tee) => tee.write_all(buf),
            None => Ok(()),
        }
    }

    pub fn flush(&self) -> io::Result<()> {
        let mut guard = lock_unpoisoned(&self.inner);
        match guard.tee.as_mut() {
            Some(tee) => tee.flush(),
            None => Ok(()),
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        lock_unpoisoned(&self.inner).buf.clone()
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.inner).buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn open_pending(inner: &mut LogSinkInner) -> io::Result<()> {
    let Some(path) = inner.pending.take() else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    inner.tee = Some(Box::new(File::create(&path)?));
    Ok(())
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = lock_unpoisoned(&self.inner);
        f.debug_struct("LogSink")
            .field("len", &guard.buf.len())
            .field("tee", &guard.tee.is_some())
            .field("pending", &guard.pending)
            .finish()
    }
}
