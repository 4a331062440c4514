// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod output;
pub mod scheduler;
pub mod types;
pub mod variables;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use colored::Colorize;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::PipelineConfig;
use crate::exec::ShellExecutor;
use crate::output::{format_duration, OutputConfig, TaskOutput};
use crate::scheduler::{ExecutionGraph, RunSummary, Scheduler, StageStatus};
use crate::types::OutputFormat;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - pipeline loading and validation
/// - output mode selection
/// - execution graph, scheduler and shell executor
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    if args.no_color {
        colored::control::set_override(false);
    }

    let cfg = load_and_validate(&args.config)?;

    let tag = args
        .output
        .clone()
        .unwrap_or_else(|| cfg.config.output.clone());

    if args.dry_run {
        let format: OutputFormat = tag.parse()?;
        print_dry_run(&cfg, format)?;
        return Ok(());
    }

    let mut output_config = OutputConfig::default().with_chunk_size(cfg.config.chunk_size);
    if args.no_color {
        output_config = output_config.with_colors(false);
    }
    // Unknown tags fail here, before any stage runs.
    let output = Arc::new(TaskOutput::from_name(&tag, output_config)?);

    let graph = ExecutionGraph::from_config(&cfg)?;
    info!(pipeline = %graph.name(), output = %tag, "pipeline loaded");

    let scheduler = Arc::new(Scheduler::new(Arc::new(ShellExecutor::new()), output));

    // Ctrl-C → cancel the run; the scheduler settles every stage.
    {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            scheduler.cancel();
        });
    }

    let summary = scheduler.schedule(&graph).await?;
    print_summary(&summary);

    if !summary.is_success() {
        return Err(anyhow!("pipeline '{}' failed", graph.name()));
    }
    Ok(())
}

/// Dry-run output: print stages in run order with their settings.
fn print_dry_run(cfg: &PipelineConfig, format: OutputFormat) -> Result<()> {
    let graph = ExecutionGraph::from_config(cfg)?;

    println!("taskpipe dry-run: {}", graph.name());
    println!("  config.output = {format}");
    println!("  config.chunk_size = {}", cfg.config.chunk_size);
    if let Some(ref dir) = cfg.config.log_dir {
        println!("  config.log_dir = {}", dir.display());
    }
    println!();

    println!("stages ({}):", graph.len());
    for stage in graph.stages() {
        println!("  - {}", stage.name);
        println!("      cmd: {}", stage.command());
        if !stage.depends_on.is_empty() {
            println!("      after: {:?}", stage.depends_on);
        }
        if !stage.dir.is_empty() {
            println!("      dir: {}", stage.dir);
        }
        if let Some(ref condition) = stage.condition {
            println!("      condition: {condition}");
        }
        if stage.allow_failure {
            println!("      allow_failure: true");
        }
        if !stage.env.is_empty() {
            let keys: Vec<&str> = stage.env.iter().map(|(k, _)| k).collect();
            println!("      env: {keys:?}");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

/// Per-stage status table printed after a run.
fn print_summary(summary: &RunSummary) {
    let width = summary
        .stages
        .iter()
        .map(|r| r.name.len())
        .max()
        .unwrap_or(0);

    println!();
    println!("{}", "Summary".bold());
    for report in &summary.stages {
        let padded = format!("{:<8}", report.status.as_str());
        let status = match report.status {
            StageStatus::Done => padded.as_str().green(),
            StageStatus::Error if report.allow_failure => padded.as_str().yellow(),
            StageStatus::Error => padded.as_str().red(),
            StageStatus::Canceled => padded.as_str().yellow(),
            _ => padded.as_str().dimmed(),
        };
        let exit = match report.exit_code {
            Some(code) if code != 0 => format!(" (exit {code})"),
            _ => String::new(),
        };
        println!(
            "  {:<width$}  {}  {}{}",
            report.name,
            status,
            format_duration(report.duration),
            exit
        );
    }
}
