use std::io;
use std::sync::{Arc, Mutex};

use taskpipe::output::DecoratedOutputWriter;
use taskpipe::scheduler::Stage;

/// One call observed by a [`RecordingDecorator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Header(String),
    /// Stage name (empty for unscoped writes) and the bytes written.
    Write(String, Vec<u8>),
    Footer(String),
}

/// Decorator that records every call instead of rendering.
///
/// Scoped instances share the event log with their parent.
pub struct RecordingDecorator {
    stage: Option<String>,
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingDecorator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            stage: None,
            events: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Concatenation of every write scoped to `stage`.
    pub fn written_by(&self, stage: &str) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Write(name, bytes) if name == stage => Some(bytes),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

impl DecoratedOutputWriter for RecordingDecorator {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let stage = self.stage.clone().unwrap_or_default();
        self.events
            .lock()
            .unwrap()
            .push(Event::Write(stage, buf.to_vec()));
        Ok(buf.len())
    }

    fn write_header(&self, stage: &Stage) -> io::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(Event::Header(stage.name.clone()));
        Ok(())
    }

    fn write_footer(&self, stage: &Stage) -> io::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(Event::Footer(stage.name.clone()));
        Ok(())
    }

    fn for_task(self: Arc<Self>, stage: &Stage) -> Arc<dyn DecoratedOutputWriter> {
        Arc::new(RecordingDecorator {
            stage: Some(stage.name.clone()),
            events: Arc::clone(&self.events),
        })
    }
}

/// Decorator whose writes always fail.
pub struct FailingDecorator;

impl DecoratedOutputWriter for FailingDecorator {
    fn write(&self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal went away"))
    }

    fn write_header(&self, _stage: &Stage) -> io::Result<()> {
        Ok(())
    }

    fn write_footer(&self, _stage: &Stage) -> io::Result<()> {
        Ok(())
    }

    fn for_task(self: Arc<Self>, _stage: &Stage) -> Arc<dyn DecoratedOutputWriter> {
        self
    }
}
