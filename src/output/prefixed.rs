// src/output/prefixed.rs

//! Line-prefixed output: `<stage> | <line>`.
//!
//! Stage output arrives as arbitrary chunks, so every stage-scoped writer
//! keeps the bytes of its current, unterminated line until a newline shows
//! up. Whatever is still pending when the stage's footer is written is
//! flushed as a final line.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use colored::{Color, Colorize};

use crate::output::decorator::{format_duration, DecoratedOutputWriter};
use crate::output::sink::{lock_unpoisoned, SharedWriter};
use crate::scheduler::Stage;

const PALETTE: [Color; 6] = [
    Color::Cyan,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::BrightCyan,
];

#[derive(Default)]
struct PrefixState {
    /// Widest stage name seen so far; prefixes are padded to it.
    width: usize,
    /// Colour slot per stage name, in first-seen order.
    slots: HashMap<String, usize>,
    /// Scoped writers of stages whose footer has not been written yet.
    open: HashMap<String, Arc<StagePrefixedWriter>>,
}

pub struct PrefixedOutputWriter {
    dst: SharedWriter,
    colors: bool,
    state: Mutex<PrefixState>,
}

impl PrefixedOutputWriter {
    pub fn new(dst: SharedWriter, colors: bool) -> Self {
        Self {
            dst,
            colors,
            state: Mutex::new(PrefixState::default()),
        }
    }

    fn prefix_for(&self, state: &mut PrefixState, name: &str) -> Vec<u8> {
        state.width = state.width.max(name.chars().count());
        let next_slot = state.slots.len();
        let slot = *state.slots.entry(name.to_string()).or_insert(next_slot);

        let padded = format!("{:<width$}", name, width = state.width);
        let label = if self.colors {
            padded.color(PALETTE[slot % PALETTE.len()]).to_string()
        } else {
            padded
        };
        format!("{label} | ").into_bytes()
    }
}

impl DecoratedOutputWriter for PrefixedOutputWriter {
    /// Output not tied to a stage is written as is.
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.dst.write_all(buf)?;
        Ok(buf.len())
    }

    fn write_header(&self, stage: &Stage) -> io::Result<()> {
        {
            let mut state = lock_unpoisoned(&self.state);
            state.width = state.width.max(stage.name.chars().count());
        }
        self.dst
            .write_all(format!("Running stage {}\n", stage.name).as_bytes())
    }

    fn write_footer(&self, stage: &Stage) -> io::Result<()> {
        let scoped = lock_unpoisoned(&self.state).open.remove(&stage.name);
        if let Some(scoped) = scoped {
            scoped.flush_pending()?;
        }

        let line = format!(
            "Finished stage {} ({}) in {}\n",
            stage.name,
            stage.read_status(),
            format_duration(stage.duration())
        );
        self.dst.write_all(line.as_bytes())
    }

    fn for_task(self: Arc<Self>, stage: &Stage) -> Arc<dyn DecoratedOutputWriter> {
        let mut state = lock_unpoisoned(&self.state);
        let prefix = self.prefix_for(&mut state, &stage.name);
        let scoped = Arc::new(StagePrefixedWriter {
            dst: self.dst.clone(),
            prefix,
            pending: Mutex::new(Vec::new()),
        });
        state.open.insert(stage.name.clone(), Arc::clone(&scoped));
        scoped
    }
}

/// Prefixed writer scoped to one stage run.
pub struct StagePrefixedWriter {
    dst: SharedWriter,
    prefix: Vec<u8>,
    pending: Mutex<Vec<u8>>,
}

impl StagePrefixedWriter {
    fn flush_pending(&self) -> io::Result<()> {
        let mut pending = lock_unpoisoned(&self.pending);
        if pending.is_empty() {
            return Ok(());
        }
        let mut out = Vec::with_capacity(self.prefix.len() + pending.len() + 1);
        out.extend_from_slice(&self.prefix);
        out.append(&mut pending);
        out.push(b'\n');
        self.dst.write_all(&out)
    }
}

impl DecoratedOutputWriter for StagePrefixedWriter {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        // Held until the rendered lines are written so lines of this stage
        // reach the destination in the order they were completed.
        let mut pending = lock_unpoisoned(&self.pending);
        pending.extend_from_slice(buf);

        let mut out = Vec::new();
        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            out.extend_from_slice(&self.prefix);
            out.extend(pending.drain(..=pos));
        }

        if !out.is_empty() {
            self.dst.write_all(&out)?;
        }
        Ok(buf.len())
    }

    fn write_header(&self, _stage: &Stage) -> io::Result<()> {
        Ok(())
    }

    fn write_footer(&self, _stage: &Stage) -> io::Result<()> {
        self.flush_pending()
    }

    fn for_task(self: Arc<Self>, _stage: &Stage) -> Arc<dyn DecoratedOutputWriter> {
        self
    }
}
