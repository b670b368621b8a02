// src/pipeline/executable.rs

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info};

use crate::dag::TaskGraph;
use crate::pipeline::PipelineType;
use crate::status::StatusManager;
use crate::types::{SequenceNumber, Status};

#[derive(Debug, Default)]
struct CompletionState {
    /// Task name → complete, as of the last refresh.
    completion: HashMap<String, bool>,
    /// Tasks finished during this run without a durable SUCCESS (adhoc).
    marked: HashSet<String>,
    completed: bool,
    committed: bool,
}

/// One (pipeline type, sequence number) instance.
///
/// Shared between the pipeline scheduler, its executor and the task
/// scheduler's bookkeeping; all mutable state sits behind one short-lived
/// lock.
pub struct ExecutablePipeline {
    pipeline_type: Arc<PipelineType>,
    sequence_number: SequenceNumber,
    graph: TaskGraph,
    status: StatusManager,
    state: Mutex<CompletionState>,
}

impl ExecutablePipeline {
    pub fn new(
        pipeline_type: Arc<PipelineType>,
        sequence_number: SequenceNumber,
        graph: TaskGraph,
        status: StatusManager,
    ) -> Self {
        let completion = graph.tasks().map(|t| (t.to_string(), false)).collect();
        Self {
            pipeline_type,
            sequence_number,
            graph,
            status,
            state: Mutex::new(CompletionState {
                completion,
                ..CompletionState::default()
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.pipeline_type.name
    }

    pub fn pipeline_type(&self) -> &Arc<PipelineType> {
        &self.pipeline_type
    }

    pub fn sequence_number(&self) -> SequenceNumber {
        self.sequence_number
    }

    pub fn task_graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Re-derive the completion map from the store and the tasks marked
    /// complete in memory. Commits the pipeline's SUCCESS marker the first
    /// time every task is durably complete.
    pub fn update_pipeline_completion(&self) {
        let durable: HashMap<String, bool> = self
            .graph
            .tasks()
            .map(|t| {
                (
                    t.to_string(),
                    self.status.is_task_complete(t, self.sequence_number),
                )
            })
            .collect();
        let all_durable = durable.values().all(|done| *done);

        let newly_complete = {
            let mut state = self.lock();
            for (task, done) in durable {
                let done = done || state.marked.contains(&task);
                state.completion.insert(task, done);
            }
            let was_complete = state.completed;
            state.completed = state.completion.values().all(|done| *done);
            debug!(
                pipeline = %self.name(),
                sequence_number = self.sequence_number,
                completed = state.completed,
                "refreshed pipeline completion"
            );
            state.completed && !was_complete
        };

        if newly_complete {
            info!(pipeline = %self.name(), sequence_number = self.sequence_number, "pipeline instance complete");
        }

        if all_durable && !self.lock().committed {
            match self
                .status
                .commit_pipeline_status(self.name(), self.sequence_number, Status::Success)
            {
                Ok(()) => self.lock().committed = true,
                Err(e) => error!(
                    pipeline = %self.name(),
                    sequence_number = self.sequence_number,
                    error = %e,
                    "failed to commit pipeline SUCCESS"
                ),
            }
        }
    }

    /// Record a task as complete for this run only.
    pub fn mark_task_complete(&self, task: &str) {
        let mut state = self.lock();
        state.marked.insert(task.to_string());
        state.completion.insert(task.to_string(), true);
    }

    pub fn is_task_marked_complete(&self, task: &str) -> bool {
        self.lock().completion.get(task).copied().unwrap_or(false)
    }

    /// Snapshot of the completion map.
    pub fn task_completion_map(&self) -> HashMap<String, bool> {
        self.lock().completion.clone()
    }

    pub fn is_completed(&self) -> bool {
        self.lock().completed
    }

    fn lock(&self) -> MutexGuard<'_, CompletionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for ExecutablePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name(), self.sequence_number)
    }
}

impl fmt::Debug for ExecutablePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutablePipeline")
            .field("pipeline", &self.pipeline_type.name)
            .field("sequence_number", &self.sequence_number)
            .field("tasks", &self.graph.len())
            .finish_non_exhaustive()
    }
}
