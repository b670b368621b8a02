// src/engine/pipeline_scheduler.rs

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{PipelineExecutor, RunOptions};
use crate::errors::Result;
use crate::pipeline::{ExecutablePipeline, IterationGenerator, PipelineFactory, PipelineType};
use crate::types::SequenceNumber;

/// Cloneable handle that stops a [`PipelineScheduler`] loop.
///
/// The pass in flight finishes first; only the sleep between passes is cut
/// short.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

struct ActiveExecutor {
    executor: Arc<PipelineExecutor>,
    handle: JoinHandle<()>,
}

impl ActiveExecutor {
    fn stop(self) {
        self.executor.abort();
        self.handle.abort();
    }
}

/// Keeps the window `[current - lookback, current]` of one pipeline type
/// scheduled.
///
/// Every tracked, incomplete sequence number inside the window has exactly
/// one running [`PipelineExecutor`]. Numbers leaving the window are retired
/// whether or not they completed.
pub struct PipelineScheduler {
    pipeline_type: Arc<PipelineType>,
    factory: Arc<PipelineFactory>,
    generator: Arc<dyn IterationGenerator>,
    abort: AbortHandle,
    instances: HashMap<SequenceNumber, Option<Arc<ExecutablePipeline>>>,
    executors: HashMap<SequenceNumber, ActiveExecutor>,
}

impl PipelineScheduler {
    pub fn new(pipeline_type: Arc<PipelineType>, factory: Arc<PipelineFactory>) -> Result<Self> {
        let generator = factory.iteration_generator(&pipeline_type)?;
        Ok(Self {
            pipeline_type,
            factory,
            generator,
            abort: AbortHandle::default(),
            instances: HashMap::new(),
            executors: HashMap::new(),
        })
    }

    /// Replace the iteration generator chosen from config.
    pub fn with_iteration_generator(mut self, generator: Arc<dyn IterationGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Loop until aborted, one pass per pipeline interval.
    pub async fn run(&mut self) {
        info!(pipeline = %self.pipeline_type.name, "launching pipeline scheduler");

        while !self.abort.is_aborted() {
            self.schedule_pass();

            tokio::select! {
                _ = tokio::time::sleep(self.pipeline_type.interval) => {}
                _ = self.abort.wake.notified() => {}
            }
        }

        info!(pipeline = %self.pipeline_type.name, "pipeline scheduler stopped");
    }

    /// One scheduling pass over the window.
    pub fn schedule_pass(&mut self) {
        let name = self.pipeline_type.name.clone();
        let current = match self.generator.current_iteration_number() {
            Ok(current) => current,
            Err(e) => {
                warn!(pipeline = %name, error = %e, "cannot determine current iteration; skipping pass");
                return;
            }
        };

        let oldest = current - i64::from(self.pipeline_type.lookback);
        let window: HashSet<SequenceNumber> = (oldest..=current).collect();
        for seq in &window {
            self.instances.entry(*seq).or_insert(None);
        }

        let tracked: Vec<SequenceNumber> = self.instances.keys().copied().collect();
        for seq in tracked {
            if !window.contains(&seq) {
                self.retire(seq);
                continue;
            }

            debug!(pipeline = %name, sequence_number = seq, "attempting to run instance");

            let Some(instance) = self.instance(seq) else {
                continue;
            };

            instance.update_pipeline_completion();

            if instance.is_completed() {
                if let Some(active) = self.executors.remove(&seq) {
                    debug!(pipeline = %name, sequence_number = seq, "reaping executor of completed instance");
                    active.stop();
                }
                continue;
            }

            if let Some(active) = self.executors.get(&seq) {
                if !active.handle.is_finished() {
                    continue;
                }
                warn!(pipeline = %name, sequence_number = seq, "executor stopped before instance completed; restarting");
                if let Some(active) = self.executors.remove(&seq) {
                    active.stop();
                }
            }

            self.spawn_executor(seq);
        }
    }

    fn instance(&mut self, seq: SequenceNumber) -> Option<Arc<ExecutablePipeline>> {
        if let Some(Some(existing)) = self.instances.get(&seq) {
            return Some(existing.clone());
        }

        match self
            .factory
            .get_executable_pipeline(&self.pipeline_type, seq)
        {
            Ok(instance) => {
                info!(pipeline = %self.pipeline_type.name, sequence_number = seq, "created pipeline instance");
                self.instances.insert(seq, Some(instance.clone()));
                Some(instance)
            }
            Err(e) => {
                warn!(pipeline = %self.pipeline_type.name, sequence_number = seq, error = %e, "cannot create pipeline instance");
                None
            }
        }
    }

    fn spawn_executor(&mut self, seq: SequenceNumber) {
        let executor = match PipelineExecutor::new(
            &self.factory,
            &self.pipeline_type,
            seq,
            RunOptions::default(),
        ) {
            Ok(executor) => Arc::new(executor),
            Err(e) => {
                warn!(pipeline = %self.pipeline_type.name, sequence_number = seq, error = %e, "cannot create pipeline executor");
                return;
            }
        };

        debug!(pipeline = %self.pipeline_type.name, sequence_number = seq, "scheduling pipeline instance");
        let handle = tokio::spawn(executor.clone().run());
        self.executors
            .insert(seq, ActiveExecutor { executor, handle });
    }

    fn retire(&mut self, seq: SequenceNumber) {
        info!(pipeline = %self.pipeline_type.name, sequence_number = seq, "removing instance from pipeline queue");
        self.instances.remove(&seq);
        if let Some(active) = self.executors.remove(&seq) {
            active.stop();
        }
        self.factory
            .expire_sequence_number(&self.pipeline_type.name, seq);
    }

    /// Stop every executor. Tracking is kept so a later `run` resumes.
    pub fn shutdown(&mut self) {
        for (seq, active) in self.executors.drain() {
            debug!(pipeline = %self.pipeline_type.name, sequence_number = seq, "stopping executor");
            active.stop();
        }
    }

    pub fn tracked_sequence_numbers(&self) -> BTreeSet<SequenceNumber> {
        self.instances.keys().copied().collect()
    }

    /// Sequence numbers with a live executor.
    pub fn active_executors(&self) -> BTreeSet<SequenceNumber> {
        self.executors
            .iter()
            .filter(|(_, active)| !active.handle.is_finished())
            .map(|(seq, _)| *seq)
            .collect()
    }

    pub fn executor(&self, seq: SequenceNumber) -> Option<&Arc<PipelineExecutor>> {
        self.executors.get(&seq).map(|active| &active.executor)
    }
}

impl std::fmt::Debug for PipelineScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineScheduler")
            .field("pipeline", &self.pipeline_type.name)
            .field("tracked", &self.tracked_sequence_numbers())
            .field("executors", &self.executors.len())
            .finish_non_exhaustive()
    }
}
