// tests/shell_pipeline.rs
#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use taskpipe::exec::{ExecutorBackend, ShellExecutor};
use taskpipe::output::{MemoryBuffer, OutputConfig, SharedWriter, TaskOutput};
use taskpipe::scheduler::{ExecutionGraph, Scheduler, Stage, StageStatus};
use taskpipe::types::OutputFormat;
use taskpipe_test_utils::builders::{PipelineConfigBuilder, StageConfigBuilder};
use taskpipe_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::test]
async fn shell_pipeline_end_to_end() -> TestResult {
    init_tracing();

    let workdir = tempfile::tempdir()?;
    let cfg = PipelineConfigBuilder::new()
        .with_name("e2e")
        .with_default_dir(workdir.path().to_str().unwrap())
        .with_default_variable("greeting", "hello")
        .with_stage(
            "write",
            StageConfigBuilder::new("echo {{ greeting }} > note.txt; echo written; echo warned >&2")
                .build(),
        )
        .with_stage(
            "read",
            StageConfigBuilder::new("cat note.txt; echo \"mode=$MODE\"")
                .env("MODE", "test")
                .after("write")
                .build(),
        )
        .with_stage(
            "gated",
            StageConfigBuilder::new("echo should not run")
                .condition("test -f does-not-exist")
                .after("write")
                .build(),
        )
        .with_stage(
            "fails",
            StageConfigBuilder::new("exit 4")
                .allow_failure(true)
                .after("read")
                .build(),
        )
        .build();
    let graph = ExecutionGraph::from_config(&cfg)?;

    let buf = MemoryBuffer::new();
    let output = Arc::new(TaskOutput::new(
        OutputFormat::Prefixed,
        OutputConfig::to_writer(SharedWriter::new(buf.clone())),
    ));
    let executor: Arc<dyn ExecutorBackend> = Arc::new(ShellExecutor::new());
    let scheduler = Scheduler::new(executor, Arc::clone(&output));

    let summary = with_timeout(scheduler.schedule(&graph)).await?;

    assert!(summary.is_success());
    assert_eq!(summary.status_of("write"), Some(StageStatus::Done));
    assert_eq!(summary.status_of("read"), Some(StageStatus::Done));
    assert_eq!(summary.status_of("gated"), Some(StageStatus::Skipped));
    assert_eq!(summary.status_of("fails"), Some(StageStatus::Error));
    assert_eq!(summary.get("fails").unwrap().exit_code, Some(4));

    let read = summary.get("read").unwrap();
    assert_eq!(read.output, b"hello\nmode=test\n");

    let write = graph.require("write")?;
    assert_eq!(write.log.stdout.contents(), b"written\n");
    assert_eq!(write.log.stderr.contents(), b"warned\n");

    let text = buf.contents_lossy();
    assert!(text.contains("Running stage read\n"));
    assert!(text.contains("read  | hello\n"));
    assert!(text.contains("Finished stage fails (error) in "));
    assert!(!text.contains("should not run"));
    assert!(output.is_closed());
    Ok(())
}

#[tokio::test]
async fn cancel_stops_commands_started_by_the_shell() -> TestResult {
    init_tracing();

    let graph = ExecutionGraph::new(
        "cancel-shell",
        vec![Stage::new("slow", "sleep 5; echo done")],
    )?;
    let output = Arc::new(TaskOutput::new(
        OutputFormat::Raw,
        OutputConfig::to_writer(SharedWriter::new(MemoryBuffer::new())),
    ));
    let executor: Arc<dyn ExecutorBackend> = Arc::new(ShellExecutor::new());
    let scheduler = Arc::new(Scheduler::new(executor, output));

    let run = {
        let scheduler = Arc::clone(&scheduler);
        let graph = Arc::clone(&graph);
        tokio::spawn(async move { scheduler.schedule(&graph).await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    let cancelled_at = Instant::now();
    scheduler.cancel();

    let summary = with_timeout(run).await??;
    assert!(
        cancelled_at.elapsed() < Duration::from_secs(2),
        "run took {:?} to stop after cancel",
        cancelled_at.elapsed()
    );
    assert_eq!(summary.status_of("slow"), Some(StageStatus::Canceled));
    assert!(summary.get("slow").unwrap().output.is_empty());
    Ok(())
}
