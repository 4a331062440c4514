// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `taskpipe`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskpipe",
    version,
    about = "Run a pipeline of shell stages along their dependency graph.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    ///
    /// Default: `Taskpipe.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Taskpipe.toml")]
    pub config: String,

    /// Output mode (raw, prefixed, cockpit). Overrides `[config].output`.
    #[arg(long, value_name = "FORMAT")]
    pub output: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKPIPE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Disable coloured output.
    #[arg(long)]
    pub no_color: bool,

    /// Parse + validate, print the stage graph, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
