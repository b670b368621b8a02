use std::collections::BTreeSet;
use std::sync::Arc;

use cadence::engine::PipelineScheduler;
use cadence::errors::{CadenceError, Result};
use cadence::pipeline::{IterationGenerator, PipelineFactory};
use cadence::status::StatusManager;
use cadence::types::{SequenceNumber, Status};
use cadence_test_utils::builders::{ConfigFileBuilder, PipelineConfigBuilder, TaskConfigBuilder};
use cadence_test_utils::fake_task::{Behaviour, FixedIteration, ScriptedTasks};
use cadence_test_utils::{factory, init_tracing, wait_until, with_timeout};

#[derive(Debug)]
struct BrokenIteration;

impl IterationGenerator for BrokenIteration {
    fn current_iteration_number(&self) -> Result<SequenceNumber> {
        Err(CadenceError::ConfigError("no clock".into()))
    }
}

struct Fixture {
    tasks: ScriptedTasks,
    status: StatusManager,
    factory: Arc<PipelineFactory>,
    iteration: FixedIteration,
    scheduler: PipelineScheduler,
}

/// Pipeline `p` with one task that blocks, so instances stay incomplete.
fn fixture(lookback: u32, current: SequenceNumber) -> Fixture {
    init_tracing();
    let cfg = ConfigFileBuilder::new()
        .with_pipeline(
            "p",
            PipelineConfigBuilder::new(&["A"])
                .lookback(lookback)
                .interval("10ms")
                .build(),
        )
        .with_task("A", TaskConfigBuilder::new().build())
        .build();

    let tasks = ScriptedTasks::new();
    tasks.set("A", Behaviour::Block);
    let status = StatusManager::in_memory();
    let factory = factory(&cfg, tasks.registry(&["A"]), &status);
    let iteration = FixedIteration::new(current);
    let pipeline_type = factory.registry().pipeline_type("p").unwrap();
    let scheduler = PipelineScheduler::new(pipeline_type, factory.clone())
        .unwrap()
        .with_iteration_generator(Arc::new(iteration.clone()));

    Fixture {
        tasks,
        status,
        factory,
        iteration,
        scheduler,
    }
}

fn set(seqs: &[SequenceNumber]) -> BTreeSet<SequenceNumber> {
    seqs.iter().copied().collect()
}

#[tokio::test]
async fn window_covers_lookback_and_current() {
    let mut f = fixture(2, 5);

    f.scheduler.schedule_pass();

    assert_eq!(f.scheduler.tracked_sequence_numbers(), set(&[3, 4, 5]));
    assert_eq!(f.scheduler.active_executors(), set(&[3, 4, 5]));
    for seq in [3, 4, 5] {
        assert!(f.factory.is_cached("p", seq));
    }

    f.scheduler.shutdown();
}

#[tokio::test]
async fn sequence_number_leaving_window_is_retired() {
    let mut f = fixture(2, 4);
    f.scheduler.schedule_pass();
    assert_eq!(f.scheduler.tracked_sequence_numbers(), set(&[2, 3, 4]));

    let retired = f.scheduler.executor(2).cloned().unwrap();
    wait_until(|| f.status.is_task_running("A", 2)).await;

    f.iteration.set(5);
    f.scheduler.schedule_pass();

    assert_eq!(f.scheduler.tracked_sequence_numbers(), set(&[3, 4, 5]));
    assert_eq!(f.scheduler.active_executors(), set(&[3, 4, 5]));
    assert!(retired.is_aborted());
    assert!(retired.task_scheduler().is_aborted());
    assert!(!f.factory.is_cached("p", 2));

    // Abandoned, not failed: no terminal status was written for 2.
    assert_eq!(f.status.task_status("A", 2), Status::InProgress);

    f.scheduler.shutdown();
}

#[tokio::test]
async fn completed_instances_get_no_executor() {
    let mut f = fixture(2, 5);
    f.status
        .commit_task_status("A", 4, Status::Success, true)
        .unwrap();

    f.scheduler.schedule_pass();

    assert_eq!(f.scheduler.tracked_sequence_numbers(), set(&[3, 4, 5]));
    assert_eq!(f.scheduler.active_executors(), set(&[3, 5]));
    assert!(f.status.is_pipeline_complete("p", 4));

    // Still tracked on the next pass, still no executor.
    f.scheduler.schedule_pass();
    assert_eq!(f.scheduler.active_executors(), set(&[3, 5]));

    f.scheduler.shutdown();
}

#[tokio::test]
async fn repeated_passes_keep_one_executor_per_instance() {
    let mut f = fixture(0, 7);

    f.scheduler.schedule_pass();
    let first = f.scheduler.executor(7).cloned().unwrap();
    for _ in 0..3 {
        f.scheduler.schedule_pass();
    }
    let current = f.scheduler.executor(7).cloned().unwrap();

    assert!(Arc::ptr_eq(&first, &current));
    assert_eq!(f.scheduler.active_executors(), set(&[7]));

    wait_until(|| f.tasks.count("A") == 1).await;
    f.scheduler.shutdown();
}

#[tokio::test]
async fn executor_is_reaped_once_its_instance_completes() {
    let mut f = fixture(0, 1);
    f.scheduler.schedule_pass();
    let executor = f.scheduler.executor(1).cloned().unwrap();

    f.tasks.release();
    wait_until(|| f.status.is_task_complete("A", 1)).await;
    wait_until(|| executor.is_aborted()).await;

    f.scheduler.schedule_pass();
    assert!(f.scheduler.active_executors().is_empty());
    assert_eq!(f.scheduler.tracked_sequence_numbers(), set(&[1]));
}

#[tokio::test]
async fn iteration_errors_skip_the_pass() {
    let f = fixture(2, 5);
    let mut scheduler = f.scheduler.with_iteration_generator(Arc::new(BrokenIteration));

    scheduler.schedule_pass();
    assert!(scheduler.tracked_sequence_numbers().is_empty());
}

#[tokio::test]
async fn run_loop_stops_on_abort() {
    let mut f = fixture(1, 3);
    let abort = f.scheduler.abort_handle();

    let handle = tokio::spawn(async move {
        f.scheduler.run().await;
        f.scheduler.shutdown();
        f.scheduler
    });

    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    abort.abort();

    let scheduler = with_timeout(handle).await.unwrap();
    assert_eq!(scheduler.tracked_sequence_numbers(), set(&[2, 3]));
    assert!(scheduler.active_executors().is_empty());
}
