// src/output/mod.rs

//! Stage output capture and rendering.
//!
//! - [`decorator`] defines the [`DecoratedOutputWriter`] contract every
//!   renderer satisfies, plus the construction-time [`OutputConfig`].
//! - [`raw`], [`prefixed`] and [`cockpit`] are the built-in renderers.
//! - [`task_output`] holds [`TaskOutput`], which streams a stage's stdout and
//!   stderr into the renderer, the stage's log sinks and a capture buffer.
//! - [`sink`] has the mutex-guarded writers shared between concurrent
//!   producers.

pub mod cockpit;
pub mod decorator;
pub mod prefixed;
pub mod raw;
pub mod sink;
pub mod task_output;

pub use cockpit::CockpitOutputWriter;
pub use decorator::{format_duration, DecoratedOutputWriter, OutputConfig, DEFAULT_CHUNK_SIZE};
pub use prefixed::PrefixedOutputWriter;
pub use raw::RawOutputWriter;
pub use sink::{LogSink, MemoryBuffer, SharedWriter};
pub use task_output::{Channel, ChannelReport, StreamReport, TaskOutput};
