// src/engine/task_scheduler.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::{Readiness, ReadinessCheck};
use crate::engine::{RunOptions, TaskCompletion, TaskName, TaskOutcome};
use crate::exec::{TaskExecutor, WorkerPool};
use crate::pipeline::ExecutablePipeline;
use crate::registry::Registry;
use crate::status::StatusManager;
use crate::task::ExecutableTask;

type RunningTasks = HashMap<TaskName, TaskExecutor>;

/// Per-instance tick logic.
///
/// `run` is called once per tick and is idempotent: a task is submitted
/// only if it is not running, not complete, its declared dependencies allow
/// it and its own dynamic dependencies hold. Finished submissions come back
/// as [`TaskCompletion`] messages and are applied by `handle_completion`.
pub struct TaskScheduler {
    pipeline: Arc<ExecutablePipeline>,
    registry: Arc<Registry>,
    status: StatusManager,
    options: RunOptions,
    pool: WorkerPool,
    running: Arc<Mutex<RunningTasks>>,
    completions_tx: mpsc::UnboundedSender<TaskCompletion>,
    completions_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<TaskCompletion>>,
    submissions: AtomicU64,
    aborted: AtomicBool,
}

impl TaskScheduler {
    pub fn new(
        pipeline: Arc<ExecutablePipeline>,
        registry: Arc<Registry>,
        status: StatusManager,
        options: RunOptions,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::new(pipeline.pipeline_type().threads);
        Self {
            pipeline,
            registry,
            status,
            options,
            pool,
            running: Arc::new(Mutex::new(HashMap::new())),
            completions_tx,
            completions_rx: tokio::sync::Mutex::new(completions_rx),
            submissions: AtomicU64::new(0),
            aborted: AtomicBool::new(false),
        }
    }

    pub fn pipeline(&self) -> &Arc<ExecutablePipeline> {
        &self.pipeline
    }

    /// One scheduling tick. Returns how many tasks were submitted.
    pub fn run(&self) -> usize {
        if self.aborted.load(Ordering::SeqCst) {
            return 0;
        }

        self.drain_completions();

        let seq = self.pipeline.sequence_number();
        let graph = self.pipeline.task_graph();
        let completion = self.pipeline.task_completion_map();
        let readiness = ReadinessCheck::new(&self.status, seq, &completion, self.options.overwrite);

        debug!(pipeline = %self.pipeline, tasks = graph.len(), "scheduling tasks");

        let mut submitted = 0;
        for name in graph.tasks() {
            if self.is_task_running(name) {
                continue;
            }
            if self.status.is_task_complete(name, seq) {
                continue;
            }

            match readiness.evaluate(name, graph.dependencies_of(name)) {
                Readiness::Ready => {}
                Readiness::Waiting { .. } | Readiness::Blocked { .. } => continue,
            }

            // Live read: a completion applied since the snapshot must count.
            if self.options.adhoc && self.pipeline.is_task_marked_complete(name) {
                continue;
            }

            if self.status.is_task_in_error(name, seq) {
                debug!(task = %name, sequence_number = seq, "task is in ERROR; skipping");
                continue;
            }

            if self.status.is_task_running(name, seq) {
                warn!(
                    task = %name,
                    sequence_number = seq,
                    "IN_PROGRESS marker without a running executor; treating as stale and resubmitting"
                );
            }

            let Some(task) = self.prepare(name) else {
                continue;
            };

            if self.submit(task) {
                submitted += 1;
            }
        }

        debug!(pipeline = %self.pipeline, submitted, "scheduling tick finished");
        submitted
    }

    /// Build the executable task and check its dynamic dependencies.
    fn prepare(&self, name: &str) -> Option<ExecutableTask> {
        let seq = self.pipeline.sequence_number();
        let task_type = self.pipeline.task_graph().task_type(name)?.clone();

        let instance = match self.registry.create_task(name) {
            Ok(instance) => instance,
            Err(e) => {
                warn!(task = %name, sequence_number = seq, error = %e, "cannot create task");
                return None;
            }
        };

        let mut task = ExecutableTask::new(task_type, instance, seq, self.status.clone());
        if let Some(args) = self.options.task_args.get(name) {
            task.parameterize(args);
        }
        task.set_adhoc(self.options.adhoc);

        if let Err(e) = task.init() {
            warn!(task = %name, sequence_number = seq, error = %e, "task init failed; retrying next tick");
            return None;
        }

        if !task.check_dependencies() {
            debug!(task = %name, sequence_number = seq, "dynamic dependencies not met");
            return None;
        }

        Some(task)
    }

    fn submit(&self, task: ExecutableTask) -> bool {
        let mut running = self.lock_running();
        if running.contains_key(task.name()) {
            return false;
        }

        let name = task.name().to_string();
        let submission = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            pipeline = %self.pipeline,
            task = %name,
            submission,
            adhoc = task.is_adhoc(),
            "submitting task"
        );

        let executor = TaskExecutor::submit(&self.pool, task, submission, self.completions_tx.clone());
        running.insert(name, executor);
        true
    }

    /// Bookkeeping for one finished submission.
    ///
    /// The in-memory mark lands before the registry entry is released, so a
    /// concurrent tick never sees the task as neither running nor done.
    pub fn handle_completion(&self, completion: TaskCompletion) {
        match &completion.outcome {
            TaskOutcome::Success => self.pipeline.mark_task_complete(&completion.task),
            TaskOutcome::Failed(_) if self.options.adhoc => {
                self.pipeline.mark_task_complete(&completion.task)
            }
            TaskOutcome::Failed(_) | TaskOutcome::Aborted => {}
        }

        {
            let mut running = self.lock_running();
            let current = running
                .get(&completion.task)
                .is_some_and(|e| e.submission() == completion.submission);
            if current {
                running.remove(&completion.task);
            }
        }

        self.pipeline.update_pipeline_completion();
    }

    /// Wait for the next completion message.
    pub async fn next_completion(&self) -> Option<TaskCompletion> {
        self.completions_rx.lock().await.recv().await
    }

    /// Apply every completion already queued. Skipped when a bookkeeping
    /// task is currently waiting on the channel.
    pub fn drain_completions(&self) -> usize {
        let Ok(mut rx) = self.completions_rx.try_lock() else {
            return 0;
        };
        let mut drained = Vec::new();
        while let Ok(completion) = rx.try_recv() {
            drained.push(completion);
        }
        drop(rx);

        let count = drained.len();
        for completion in drained {
            self.handle_completion(completion);
        }
        count
    }

    pub fn is_task_running(&self, name: &str) -> bool {
        self.lock_running().contains_key(name)
    }

    pub fn running_tasks(&self) -> Vec<TaskName> {
        let mut names: Vec<_> = self.lock_running().keys().cloned().collect();
        names.sort();
        names
    }

    /// Cooperatively cancel one running task.
    pub fn abort_task(&self, name: &str) {
        if let Some(executor) = self.lock_running().get_mut(name) {
            info!(pipeline = %self.pipeline, task = %name, "aborting task");
            executor.abort();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Stop scheduling and cancel all queued and in-flight work.
    pub fn abort(&self) {
        if self.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(pipeline = %self.pipeline, "shutting down task scheduler");
        self.pool.shutdown_now();

        let mut running = self.lock_running();
        for (_, executor) in running.drain() {
            executor.force_abort();
        }
    }

    fn lock_running(&self) -> MutexGuard<'_, RunningTasks> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("pipeline", &self.pipeline)
            .field("options", &self.options)
            .field("aborted", &self.aborted.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
