//! Process-level tests: real pipelines of `/bin/sh` and coreutils.

use crate::cancellation::{CancelReason, CancellationToken};
use crate::core::{ExitClass, TimeoutScope};
use crate::events::{CollectingEventSink, EventSink, PipelineEvent};
use async_trait::async_trait;
use crate::pipeline::{InputSource, PipelineRunner, TERMINATION_GRACE};
use crate::stages::StageDescriptor;
use crate::testing::{
    assert_collateral, assert_no_sink, assert_primary_failure, assert_succeeded, TestPipeline,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::{Duration, Instant};

const HANG_GUARD: Duration = Duration::from_secs(30);

fn runner_with_events() -> (PipelineRunner, Arc<CollectingEventSink>) {
    let events = Arc::new(CollectingEventSink::new());
    (PipelineRunner::new().with_event_sink(events.clone()), events)
}

fn expected_seq(n: usize) -> String {
    (1..=n).map(|i| format!("{i}\n")).collect()
}

#[tokio::test]
async fn test_all_success_any_length() {
    let dir = tempfile::tempdir().unwrap();

    for len in 1..=4 {
        let path = dir.path().join(format!("seq-{len}.txt"));
        let mut pipeline = TestPipeline::new().sh("seq 1 1000");
        for _ in 1..len {
            pipeline = pipeline.stage(StageDescriptor::new("cat"));
        }
        let spec = pipeline.output(&path).build();

        let result = PipelineRunner::new().run(&spec).await.unwrap();

        assert_succeeded(&result);
        assert_eq!(result.outcomes.len(), len);
        assert!(result.sink_finalized);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), expected_seq(1000));
    }
}

#[tokio::test]
async fn test_collateral_broken_pipe_is_suppressed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let spec = TestPipeline::new()
        .stage(StageDescriptor::new("yes"))
        .sh("head -c 100 >/dev/null; exit 3")
        .stage(StageDescriptor::new("cat"))
        .output(&path)
        .build();

    let result = PipelineRunner::new().run(&spec).await.unwrap();

    assert_primary_failure(&result, 1);
    assert_collateral(&result, &[0]);
    assert_eq!(result.outcomes[0].exit_class, ExitClass::BrokenPipe);
    assert_eq!(result.outcomes[1].exit_class, ExitClass::NonZeroExit { code: 3 });
    assert_eq!(result.outcomes[2].exit_class, ExitClass::Success);
    assert_no_sink(&path);
}

#[tokio::test]
async fn test_cleanup_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.bin");
    let (runner, events) = runner_with_events();
    let spec = TestPipeline::new()
        .sh("seq 1 100000")
        .sh("cat; exit 1")
        .output(&path)
        .build();

    let result = runner.run(&spec).await.unwrap();

    assert_primary_failure(&result, 1);
    assert!(result.sink_finalized);
    assert!(result.cleanup_errors.is_empty());
    assert_no_sink(&path);
    assert_eq!(events.events_of_type("sink.removed").len(), 1);
}

#[tokio::test]
async fn test_cleanup_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let (runner, events) = runner_with_events();
    let spec = TestPipeline::new()
        .sh("seq 1 1000")
        .sh(&format!(
            "cat >/dev/null; rm -f '{p}'; mkdir '{p}'; touch '{p}/x'; exit 1",
            p = path.display()
        ))
        .output(&path)
        .build();

    let result = runner.run(&spec).await.unwrap();

    assert!(!result.success);
    assert_primary_failure(&result, 1);
    assert!(!result.sink_finalized);
    assert_eq!(result.cleanup_errors.len(), 1);
    assert_eq!(result.cleanup_errors[0].path, path);
    assert_eq!(events.events_of_type("sink.cleanup_failed").len(), 1);
    assert!(events.events_of_type("sink.removed").is_empty());
}

#[tokio::test]
async fn test_no_deadlock_under_backpressure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("count.txt");
    let spec = TestPipeline::new()
        .sh(
            "i=0; while [ $i -lt 3000 ]; do echo \"progress: block $i of the stream\" >&2; \
             i=$((i+1)); done; seq 1 200000",
        )
        .sh("sleep 0.3; cat")
        .stage(StageDescriptor::new("wc").arg("-l"))
        .output(&path)
        .build()
        .with_diagnostics_limit(4096);

    let result = tokio::time::timeout(HANG_GUARD, PipelineRunner::new().run(&spec))
        .await
        .expect("pipeline hung")
        .unwrap();

    assert_succeeded(&result);
    assert!(result.outcomes[0].diagnostics_dropped > 0);
    assert!(result.outcomes[0]
        .diagnostics
        .ends_with("progress: block 2999 of the stream"));
    assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "200000");
}

#[tokio::test]
async fn test_stage_timeout_enforced() {
    let limit = Duration::from_millis(300);
    let spec = TestPipeline::new()
        .stage(StageDescriptor::new("sleep").arg("30"))
        .stage_timeout(limit)
        .build();

    let started = Instant::now();
    let result = PipelineRunner::new().run(&spec).await.unwrap();

    assert_primary_failure(&result, 0);
    assert_eq!(
        result.outcomes[0].exit_class,
        ExitClass::Timeout {
            scope: TimeoutScope::Stage
        }
    );
    assert!(started.elapsed() < limit + TERMINATION_GRACE);
}

#[tokio::test]
async fn test_stage_timeout_stops_forked_helpers() {
    let limit = Duration::from_millis(300);
    let spec = TestPipeline::new()
        .sh("sleep 30; echo done")
        .stage(StageDescriptor::new("cat"))
        .stage_timeout(limit)
        .build();

    let started = Instant::now();
    let result = tokio::time::timeout(HANG_GUARD, PipelineRunner::new().run(&spec))
        .await
        .expect("pipeline hung")
        .unwrap();

    assert_eq!(
        result.outcomes[0].exit_class,
        ExitClass::Timeout {
            scope: TimeoutScope::Stage
        }
    );
    // The forked sleep died with the shell, so stderr closed without the grace wait.
    assert!(started.elapsed() < TERMINATION_GRACE);
    assert!(result.outcomes[0]
        .notes
        .iter()
        .all(|note| !note.contains("still open")));
}

/// Delays every `stage.spawned` event, stretching the launch phase.
struct SlowSpawnEvents {
    delay: Duration,
}

#[async_trait]
impl EventSink for SlowSpawnEvents {
    async fn emit(&self, event: &PipelineEvent) {
        if matches!(event, PipelineEvent::StageSpawned { .. }) {
            tokio::time::sleep(self.delay).await;
        }
    }

    fn try_emit(&self, _event: &PipelineEvent) {}
}

#[tokio::test]
async fn test_overall_deadline_covers_launch_phase() {
    let runner = PipelineRunner::new().with_event_sink(Arc::new(SlowSpawnEvents {
        delay: Duration::from_millis(600),
    }));
    let spec = TestPipeline::new()
        .stage(StageDescriptor::new("sleep").arg("30"))
        .stage(StageDescriptor::new("cat"))
        .overall_timeout(Duration::from_millis(300))
        .build();

    let result = tokio::time::timeout(HANG_GUARD, runner.run(&spec))
        .await
        .expect("pipeline hung")
        .unwrap();

    assert_eq!(
        result.outcomes[0].exit_class,
        ExitClass::Timeout {
            scope: TimeoutScope::Pipeline
        }
    );
    assert_eq!(result.outcomes[1].exit_class, ExitClass::NotStarted);
    assert_primary_failure(&result, 0);
}

#[tokio::test]
async fn test_overall_deadline_stops_every_stage() {
    let (runner, events) = runner_with_events();
    let spec = TestPipeline::new()
        .stage(StageDescriptor::new("sleep").arg("30"))
        .stage(StageDescriptor::new("sleep").arg("30"))
        .overall_timeout(Duration::from_millis(300))
        .build();

    let result = tokio::time::timeout(HANG_GUARD, runner.run(&spec))
        .await
        .expect("pipeline hung")
        .unwrap();

    let deadline = ExitClass::Timeout {
        scope: TimeoutScope::Pipeline,
    };
    assert_eq!(result.outcomes[0].exit_class, deadline);
    assert_eq!(result.outcomes[1].exit_class, deadline);
    assert_primary_failure(&result, 0);
    assert_eq!(events.events_of_type("pipeline.cancelled").len(), 1);
    assert_eq!(events.events_of_type("stage.terminating").len(), 2);
}

#[tokio::test]
async fn test_caller_cancel() {
    let spec = TestPipeline::new()
        .stage(StageDescriptor::new("sleep").arg("30"))
        .stage(StageDescriptor::new("cat"))
        .build();
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel(CancelReason::requested("operator abort"));
    });

    let result = tokio::time::timeout(HANG_GUARD, PipelineRunner::new().run_with_cancel(&spec, token))
        .await
        .expect("pipeline hung")
        .unwrap();

    assert_eq!(result.outcomes[0].exit_class, ExitClass::Cancelled);
    assert_primary_failure(&result, 0);
}

#[tokio::test]
async fn test_cancelled_before_launch_starts_nothing() {
    let spec = TestPipeline::new().sh("exit 0").sh("exit 0").build();
    let token = CancellationToken::new();
    token.cancel(CancelReason::requested("shutdown"));

    let result = PipelineRunner::new().run_with_cancel(&spec, token).await.unwrap();

    assert!(result
        .outcomes
        .iter()
        .all(|o| o.exit_class == ExitClass::NotStarted));
    assert_primary_failure(&result, 0);
}

#[tokio::test]
async fn test_spawn_failure_stops_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let (runner, events) = runner_with_events();
    let spec = TestPipeline::new()
        .sh("seq 1 100000")
        .stage(StageDescriptor::new("/nonexistent/pipechain-missing-tool"))
        .stage(StageDescriptor::new("cat"))
        .output(&path)
        .build();

    let result = tokio::time::timeout(HANG_GUARD, runner.run(&spec))
        .await
        .expect("pipeline hung")
        .unwrap();

    assert_primary_failure(&result, 1);
    assert_eq!(result.outcomes[1].exit_class, ExitClass::SpawnFailure);
    assert!(result.outcomes[1].diagnostics.contains("pipechain-missing-tool"));
    assert_eq!(result.outcomes[2].exit_class, ExitClass::NotStarted);
    assert_collateral(&result, &[0, 2]);
    assert_no_sink(&path);
    assert_eq!(events.events_of_type("stage.launch_failed").len(), 1);
    assert_eq!(events.events_of_type("stage.spawned").len(), 1);
}

#[tokio::test]
async fn test_monitor_passthrough_is_byte_exact() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("plain.txt");
    let monitored = dir.path().join("monitored.txt");

    let without = TestPipeline::new()
        .sh("seq 1 50000")
        .stage(StageDescriptor::new("tr").args(["0-9", "a-j"]))
        .output(&plain)
        .build();
    let with = TestPipeline::new()
        .sh("seq 1 50000")
        .stage(StageDescriptor::monitor("cat"))
        .stage(StageDescriptor::new("tr").args(["0-9", "a-j"]))
        .output(&monitored)
        .build();

    let runner = PipelineRunner::new();
    assert_succeeded(&runner.run(&without).await.unwrap());
    assert_succeeded(&runner.run(&with).await.unwrap());

    assert_eq!(std::fs::read(&plain).unwrap(), std::fs::read(&monitored).unwrap());
}

#[tokio::test]
async fn test_monitor_failure_is_never_primary() {
    let spec = TestPipeline::new()
        .sh("seq 1 10")
        .monitor("cat; exit 5")
        .stage(StageDescriptor::new("cat"))
        .build();

    let result = PipelineRunner::new().run(&spec).await.unwrap();

    assert!(!result.success);
    assert!(result.primary_failure.is_none());
    assert_eq!(result.faults().count(), 1);
}

#[tokio::test]
async fn test_existing_sink_rejected_before_launch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("existing.bin");
    std::fs::write(&path, b"previous export").unwrap();
    let (runner, events) = runner_with_events();
    let spec = TestPipeline::new().sh("echo new").output(&path).build();

    let err = runner.run(&spec).await.unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(std::fs::read(&path).unwrap(), b"previous export");
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_sink_parent_directories_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exports/vm-100/disk-0.raw");
    let spec = TestPipeline::new().sh("echo disk").output(&path).build();

    let result = PipelineRunner::new().run(&spec).await.unwrap();

    assert_succeeded(&result);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "disk\n");
}

#[tokio::test]
async fn test_primary_failure_carries_diagnostics() {
    let spec = TestPipeline::new()
        .sh("echo 'cannot open tank/vm-100-disk-0@s1: dataset does not exist' >&2; exit 1")
        .stage(StageDescriptor::new("cat"))
        .build();

    let result = PipelineRunner::new().run(&spec).await.unwrap();

    assert_primary_failure(&result, 0);
    let primary = result.primary_failure.as_ref().unwrap();
    assert_eq!(
        primary.diagnostics,
        "cannot open tank/vm-100-disk-0@s1: dataset does not exist"
    );
    assert!(result.summary().contains("dataset does not exist"));
}

#[tokio::test]
async fn test_input_file_feeds_first_stage() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    std::fs::write(&input, "restore me\n").unwrap();

    let spec = TestPipeline::new()
        .stage(StageDescriptor::new("tr").args(["a-z", "A-Z"]))
        .output(&output)
        .build()
        .with_input(InputSource::File(input));

    let result = PipelineRunner::new().run(&spec).await.unwrap();

    assert_succeeded(&result);
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "RESTORE ME\n");
}

#[test]
fn test_run_blocking() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blocking.txt");
    let spec = TestPipeline::new()
        .sh("seq 1 3")
        .stage(StageDescriptor::new("cat"))
        .output(&path)
        .build();

    let result = PipelineRunner::new().run_blocking(&spec).unwrap();

    assert_succeeded(&result);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\n2\n3\n");
}

#[tokio::test]
async fn test_event_order() {
    let (runner, events) = runner_with_events();
    let spec = TestPipeline::new().sh("echo hi").stage(StageDescriptor::new("cat")).build();

    let result = runner.run(&spec).await.unwrap();
    assert_succeeded(&result);

    let types = events.event_types();
    assert_eq!(types.first(), Some(&"pipeline.started"));
    assert_eq!(types.last(), Some(&"pipeline.finished"));
    assert_eq!(&types[1..3], &["stage.spawned", "stage.spawned"]);
    assert_eq!(events.events_of_type("stage.finished").len(), 2);
    assert!(events
        .events()
        .iter()
        .all(|e| e.run_id() == result.run_id));
}
