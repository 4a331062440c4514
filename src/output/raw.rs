// src/output/raw.rs

use std::io;
use std::sync::Arc;

use crate::output::decorator::DecoratedOutputWriter;
use crate::output::sink::SharedWriter;
use crate::scheduler::Stage;

/// Passes stage output through untouched.
///
/// Stateless, so every stage shares the same instance.
#[derive(Debug, Clone)]
pub struct RawOutputWriter {
    dst: SharedWriter,
}

impl RawOutputWriter {
    pub fn new(dst: SharedWriter) -> Self {
        Self { dst }
    }
}

impl DecoratedOutputWriter for RawOutputWriter {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.dst.write_all(buf)?;
        Ok(buf.len())
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
