// src/pipeline/factory.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::dag::TaskGraph;
use crate::errors::Result;
use crate::pipeline::iteration::{self, IterationGenerator};
use crate::pipeline::{ExecutablePipeline, PipelineType};
use crate::registry::Registry;
use crate::status::StatusManager;
use crate::types::SequenceNumber;

/// Creates executable pipelines and caches them per (pipeline, sequence
/// number) so the scheduler and the executor of one instance share it.
#[derive(Debug)]
pub struct PipelineFactory {
    registry: Arc<Registry>,
    status: StatusManager,
    instances: Mutex<HashMap<(String, SequenceNumber), Arc<ExecutablePipeline>>>,
}

impl PipelineFactory {
    pub fn new(registry: Arc<Registry>, status: StatusManager) -> Self {
        Self {
            registry,
            status,
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn status(&self) -> &StatusManager {
        &self.status
    }

    pub fn get_executable_pipeline(
        &self,
        pipeline: &Arc<PipelineType>,
        sequence_number: SequenceNumber,
    ) -> Result<Arc<ExecutablePipeline>> {
        let key = (pipeline.name.clone(), sequence_number);
        if let Some(existing) = self.lock().get(&key) {
            return Ok(existing.clone());
        }

        let graph = TaskGraph::build(&pipeline.tasks, self.registry.task_types())?;
        let instance = Arc::new(ExecutablePipeline::new(
            pipeline.clone(),
            sequence_number,
            graph,
            self.status.clone(),
        ));
        debug!(pipeline = %pipeline.name, sequence_number, "created executable pipeline");

        Ok(self.lock().entry(key).or_insert(instance).clone())
    }

    pub fn iteration_generator(
        &self,
        pipeline: &PipelineType,
    ) -> Result<Arc<dyn IterationGenerator>> {
        iteration::for_pipeline(pipeline, &self.status)
    }

    /// Forget the cached instance for a sequence number that left the window.
    pub fn expire_sequence_number(&self, pipeline: &str, sequence_number: SequenceNumber) {
        if self
            .lock()
            .remove(&(pipeline.to_string(), sequence_number))
            .is_some()
        {
            debug!(pipeline = %pipeline, sequence_number, "expired executable pipeline");
        }
    }

    pub fn is_cached(&self, pipeline: &str, sequence_number: SequenceNumber) -> bool {
        self.lock()
            .contains_key(&(pipeline.to_string(), sequence_number))
    }

    fn lock(
        &self,
    ) -> MutexGuard<'_, HashMap<(String, SequenceNumber), Arc<ExecutablePipeline>>> {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
