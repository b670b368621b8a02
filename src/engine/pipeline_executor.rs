// src/engine/pipeline_executor.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::{RunOptions, TaskScheduler};
use crate::errors::Result;
use crate::pipeline::{ExecutablePipeline, PipelineFactory, PipelineType};
use crate::types::SequenceNumber;

/// Drives one pipeline instance until it is complete.
///
/// `run` spawns a fixed-delay ticker that calls [`TaskScheduler::run`] and
/// a bookkeeping task that applies completion messages, then waits for the
/// instance to report complete.
pub struct PipelineExecutor {
    pipeline: Arc<ExecutablePipeline>,
    scheduler: Arc<TaskScheduler>,
    interval: Duration,
    wake: Arc<Notify>,
    aborted: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PipelineExecutor {
    pub fn new(
        factory: &PipelineFactory,
        pipeline_type: &Arc<PipelineType>,
        sequence_number: SequenceNumber,
        options: RunOptions,
    ) -> Result<Self> {
        let pipeline = factory.get_executable_pipeline(pipeline_type, sequence_number)?;
        let scheduler = Arc::new(TaskScheduler::new(
            pipeline.clone(),
            factory.registry().clone(),
            factory.status().clone(),
            options,
        ));

        Ok(Self {
            pipeline,
            scheduler,
            interval: pipeline_type.interval,
            wake: Arc::new(Notify::new()),
            aborted: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn pipeline(&self) -> &Arc<ExecutablePipeline> {
        &self.pipeline
    }

    pub fn task_scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    pub async fn run(self: Arc<Self>) {
        info!(
            pipeline = %self.pipeline,
            interval_ms = self.interval.as_millis() as u64,
            "starting pipeline executor"
        );

        self.pipeline.update_pipeline_completion();

        let ticker = {
            let scheduler = self.scheduler.clone();
            let interval = self.interval;
            tokio::spawn(async move {
                while !scheduler.is_aborted() {
                    scheduler.run();
                    tokio::time::sleep(interval).await;
                }
            })
        };

        let bookkeeping = {
            let scheduler = self.scheduler.clone();
            let pipeline = self.pipeline.clone();
            let wake = self.wake.clone();
            tokio::spawn(async move {
                while let Some(completion) = scheduler.next_completion().await {
                    debug!(pipeline = %pipeline, task = %completion.task, outcome = ?completion.outcome, "task completion");
                    scheduler.handle_completion(completion);
                    if pipeline.is_completed() {
                        wake.notify_one();
                    }
                }
            })
        };

        {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            if self.is_aborted() {
                ticker.abort();
                bookkeeping.abort();
            } else {
                workers.extend([ticker, bookkeeping]);
            }
        }

        while !self.pipeline.is_completed() && !self.aborted.load(Ordering::SeqCst) {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.wake.notified() => {
                    debug!(pipeline = %self.pipeline, "executor woken; re-checking completion");
                }
            }
        }

        self.abort();
    }

    /// Stop the task scheduler (force-cancelling its work) and both worker
    /// tasks. Idempotent.
    pub fn abort(&self) {
        if self.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(pipeline = %self.pipeline, "shutting down pipeline executor");

        self.scheduler.abort();
        for worker in self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            worker.abort();
        }
        self.wake.notify_one();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("pipeline", &self.pipeline)
            .field("interval", &self.interval)
            .field("aborted", &self.is_aborted())
            .finish_non_exhaustive()
    }
}
