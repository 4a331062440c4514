// tests/scheduler.rs

use std::io;
use std::sync::Arc;
use std::time::Duration;

use taskpipe::exec::ExecutorBackend;
use taskpipe::output::{DecoratedOutputWriter, OutputConfig, SharedWriter, TaskOutput};
use taskpipe::scheduler::{ExecutionGraph, RunSummary, Scheduler, Stage, StageStatus};
use taskpipe_test_utils::fake_executor::{FakeExecutor, FakeProcess};
use taskpipe_test_utils::recording::{Event, RecordingDecorator};
use taskpipe_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn std::error::Error>>;

struct Harness {
    executor: Arc<FakeExecutor>,
    recorder: Arc<RecordingDecorator>,
    output: Arc<TaskOutput>,
}

impl Harness {
    fn new(executor: FakeExecutor) -> Self {
        let recorder = RecordingDecorator::new();
        let output = {
            let recorder = Arc::clone(&recorder);
            Arc::new(TaskOutput::with_decorator(
                &OutputConfig::to_writer(SharedWriter::new(io::sink())),
                move |_, _| recorder as Arc<dyn DecoratedOutputWriter>,
            ))
        };
        Self {
            executor: Arc::new(executor),
            recorder,
            output,
        }
    }

    fn scheduler(&self) -> Scheduler {
        let executor: Arc<dyn ExecutorBackend> = self.executor.clone();
        Scheduler::new(executor, Arc::clone(&self.output))
    }

    async fn run(&self, graph: &Arc<ExecutionGraph>) -> RunSummary {
        with_timeout(self.scheduler().schedule(graph))
            .await
            .expect("schedule failed")
    }
}

fn statuses(summary: &RunSummary) -> Vec<(String, StageStatus)> {
    summary
        .stages
        .iter()
        .map(|r| (r.name.clone(), r.status))
        .collect()
}

#[tokio::test]
async fn chain_runs_in_dependency_order() -> TestResult {
    init_tracing();

    let graph = ExecutionGraph::new(
        "chain",
        vec![
            Stage::new("c", "echo c").after("b"),
            Stage::new("a", "echo a"),
            Stage::new("b", "echo b").after("a"),
        ],
    )?;
    let harness = Harness::new(
        FakeExecutor::new()
            .with_process("a", FakeProcess::success().with_stdout("from a\n"))
            .with_process("b", FakeProcess::success().with_stderr("warn b\n")),
    );

    let summary = harness.run(&graph).await;

    assert!(summary.is_success());
    assert_eq!(harness.executor.spawned(), vec!["a", "b", "c"]);
    assert_eq!(
        statuses(&summary),
        vec![
            ("a".to_string(), StageStatus::Done),
            ("b".to_string(), StageStatus::Done),
            ("c".to_string(), StageStatus::Done),
        ]
    );
    assert_eq!(summary.get("a").unwrap().output, b"from a\n");
    assert_eq!(summary.get("b").unwrap().output, b"warn b\n");
    assert_eq!(summary.get("a").unwrap().exit_code, Some(0));
    assert!(graph.is_done());
    assert!(harness.output.is_closed());

    // Every stage run is wrapped in exactly one header and footer.
    let events = harness.recorder.events();
    for name in ["a", "b", "c"] {
        let header = events.iter().position(|e| *e == Event::Header(name.into()));
        let footer = events.iter().position(|e| *e == Event::Footer(name.into()));
        assert!(header.is_some() && footer.is_some() && header < footer);
    }
    Ok(())
}

#[tokio::test]
async fn independent_stages_run_concurrently() -> TestResult {
    init_tracing();

    let graph = ExecutionGraph::new(
        "fan-out",
        vec![
            Stage::new("slow1", "sleep"),
            Stage::new("slow2", "sleep"),
            Stage::new("join", "true").after("slow1").after("slow2"),
        ],
    )?;
    let delay = Duration::from_millis(300);
    let harness = Harness::new(
        FakeExecutor::new()
            .with_process("slow1", FakeProcess::success().with_delay(delay))
            .with_process("slow2", FakeProcess::success().with_delay(delay)),
    );

    let started = std::time::Instant::now();
    let summary = harness.run(&graph).await;

    assert!(summary.is_success());
    assert!(started.elapsed() < Duration::from_millis(550));
    assert_eq!(harness.executor.spawned().last().map(String::as_str), Some("join"));
    Ok(())
}

#[tokio::test]
async fn failure_skips_dependents_and_cancels_the_rest() -> TestResult {
    init_tracing();

    let graph = ExecutionGraph::new(
        "failing",
        vec![
            Stage::new("broken", "exit 2"),
            Stage::new("after_broken", "true").after("broken"),
            Stage::new("deeper", "true").after("after_broken"),
            Stage::new("long", "sleep 30"),
            Stage::new("after_long", "true").after("long"),
        ],
    )?;
    let harness = Harness::new(
        FakeExecutor::new()
            .with_process(
                "broken",
                FakeProcess::failing(2).with_delay(Duration::from_millis(50)),
            )
            .with_process("long", FakeProcess::hanging()),
    );

    let summary = harness.run(&graph).await;

    assert!(!summary.is_success());
    assert_eq!(summary.status_of("broken"), Some(StageStatus::Error));
    assert_eq!(summary.get("broken").unwrap().exit_code, Some(2));
    assert_eq!(summary.status_of("after_broken"), Some(StageStatus::Skipped));
    assert_eq!(summary.status_of("deeper"), Some(StageStatus::Skipped));
    assert_eq!(summary.status_of("long"), Some(StageStatus::Canceled));
    assert_eq!(summary.status_of("after_long"), Some(StageStatus::Canceled));

    let spawned = harness.executor.spawned();
    assert!(!spawned.contains(&"after_broken".to_string()));
    assert!(!spawned.contains(&"after_long".to_string()));
    Ok(())
}

#[tokio::test]
async fn allowed_failure_lets_dependents_run() -> TestResult {
    init_tracing();

    let graph = ExecutionGraph::new(
        "tolerant",
        vec![
            Stage::new("flaky", "exit 1").with_allow_failure(true),
            Stage::new("next", "true").after("flaky"),
        ],
    )?;
    let harness = Harness::new(FakeExecutor::new().with_process("flaky", FakeProcess::failing(1)));

    let summary = harness.run(&graph).await;

    assert!(summary.is_success());
    assert_eq!(summary.status_of("flaky"), Some(StageStatus::Error));
    assert_eq!(summary.status_of("next"), Some(StageStatus::Done));
    Ok(())
}

#[tokio::test]
async fn false_condition_skips_without_blocking_dependents() -> TestResult {
    init_tracing();

    let graph = ExecutionGraph::new(
        "conditional",
        vec![
            Stage::new("deploy", "deploy.sh").with_condition("test \"$BRANCH\" = main"),
            Stage::new("notify", "notify.sh").after("deploy"),
        ],
    )?;
    let harness = Harness::new(FakeExecutor::new().with_condition("deploy", false));

    let summary = harness.run(&graph).await;

    assert!(summary.is_success());
    assert_eq!(summary.status_of("deploy"), Some(StageStatus::Skipped));
    assert_eq!(summary.status_of("notify"), Some(StageStatus::Done));
    assert_eq!(harness.executor.spawned(), vec!["notify"]);

    // Skipped stages never touch the output.
    assert!(!harness
        .recorder
        .events()
        .contains(&Event::Header("deploy".into())));
    Ok(())
}

#[tokio::test]
async fn condition_and_spawn_errors_fail_the_stage() -> TestResult {
    init_tracing();

    let graph = ExecutionGraph::new(
        "errors",
        vec![
            Stage::new("cond", "true")
                .with_condition("broken")
                .with_allow_failure(true),
            Stage::new("nospawn", "true").after("cond"),
            Stage::new("never", "true").after("nospawn"),
        ],
    )?;
    let harness = Harness::new(
        FakeExecutor::new()
            .with_failing_condition("cond")
            .with_spawn_error("nospawn"),
    );

    let summary = harness.run(&graph).await;

    assert!(!summary.is_success());
    assert_eq!(summary.status_of("cond"), Some(StageStatus::Error));
    assert_eq!(summary.status_of("nospawn"), Some(StageStatus::Error));
    assert_eq!(summary.get("nospawn").unwrap().exit_code, None);
    assert_eq!(summary.status_of("never"), Some(StageStatus::Skipped));
    Ok(())
}

#[tokio::test]
async fn executor_error_is_a_stage_error() -> TestResult {
    init_tracing();

    let graph = ExecutionGraph::new("exec-error", vec![Stage::new("boom", "true")])?;
    let harness = Harness::new(FakeExecutor::new().with_process("boom", FakeProcess::erroring("wait failed")));

    let summary = harness.run(&graph).await;

    assert_eq!(summary.status_of("boom"), Some(StageStatus::Error));
    assert!(!summary.is_success());
    Ok(())
}

#[tokio::test]
async fn external_cancel_stops_running_and_waiting_stages() -> TestResult {
    init_tracing();

    let graph = ExecutionGraph::new(
        "cancelled",
        vec![
            Stage::new("server", "serve"),
            Stage::new("client", "curl").after("server"),
        ],
    )?;
    let harness = Harness::new(FakeExecutor::new().with_process("server", FakeProcess::hanging()));
    let scheduler = Arc::new(harness.scheduler());

    let run = {
        let scheduler = Arc::clone(&scheduler);
        let graph = Arc::clone(&graph);
        tokio::spawn(async move { scheduler.schedule(&graph).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(graph.stage("server").unwrap().read_status(), StageStatus::Running);
    scheduler.cancel();

    let summary = with_timeout(run).await??;
    assert!(scheduler.is_cancelled());
    assert_eq!(summary.status_of("server"), Some(StageStatus::Canceled));
    assert_eq!(summary.status_of("client"), Some(StageStatus::Canceled));
    assert!(!summary.is_success());
    assert!(harness.output.is_closed());
    Ok(())
}

#[tokio::test]
async fn slow_condition_check_runs_alongside_other_stages() -> TestResult {
    init_tracing();

    let graph = ExecutionGraph::new(
        "gated",
        vec![
            Stage::new("deploy", "ship").with_condition("check-release"),
            Stage::new("lint", "lint"),
        ],
    )?;
    let harness = Harness::new(
        FakeExecutor::new().with_condition_delay("deploy", Duration::from_secs(3)),
    );
    let scheduler = Arc::new(harness.scheduler());

    let run = {
        let scheduler = Arc::clone(&scheduler);
        let graph = Arc::clone(&graph);
        tokio::spawn(async move { scheduler.schedule(&graph).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(graph.stage("lint").unwrap().read_status(), StageStatus::Done);
    assert_eq!(graph.stage("deploy").unwrap().read_status(), StageStatus::Waiting);

    let started = std::time::Instant::now();
    scheduler.cancel();
    let summary = with_timeout(run).await??;

    assert!(
        started.elapsed() < Duration::from_secs(1),
        "cancel waited for the condition check: {:?}",
        started.elapsed()
    );
    assert_eq!(summary.status_of("deploy"), Some(StageStatus::Canceled));
    assert_eq!(summary.status_of("lint"), Some(StageStatus::Done));
    assert_eq!(harness.executor.spawned(), vec!["lint"]);
    Ok(())
}

#[tokio::test]
async fn durations_cover_the_stage_run() -> TestResult {
    init_tracing();

    let graph = ExecutionGraph::new("timed", vec![Stage::new("wait", "sleep")])?;
    let harness = Harness::new(FakeExecutor::new().with_process(
        "wait",
        FakeProcess::success().with_delay(Duration::from_millis(120)),
    ));

    let summary = harness.run(&graph).await;

    let report = summary.get("wait").unwrap();
    assert!(report.duration.num_milliseconds() >= 100);
    let stage = graph.stage("wait").unwrap();
    assert!(stage.start().is_some() && stage.end().is_some());
    Ok(())
}
