// src/task/dependency.rs

use std::fmt::Debug;
use std::sync::Arc;

use crate::config::RequirementConfig;
use crate::status::StatusManager;
use crate::types::SequenceNumber;

/// "Is this condition satisfied for sequence number N?"
///
/// Never cached: every scheduling tick asks again so the answer follows the
/// live store.
pub trait Dependency: Send + Sync + Debug {
    fn check(&self, status: &StatusManager, sequence_number: SequenceNumber) -> bool;
}

/// Another task is SUCCESS at `sequence_number + offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDependency {
    pub task: String,
    pub offset: i64,
}

impl TaskDependency {
    pub fn new(task: impl Into<String>, offset: i64) -> Self {
        Self {
            task: task.into(),
            offset,
        }
    }
}

impl Dependency for TaskDependency {
    fn check(&self, status: &StatusManager, sequence_number: SequenceNumber) -> bool {
        status.is_task_complete(&self.task, sequence_number + self.offset)
    }
}

/// A whole pipeline instance is complete at `sequence_number + offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDependency {
    pub pipeline: String,
    pub offset: i64,
}

impl PipelineDependency {
    pub fn new(pipeline: impl Into<String>, offset: i64) -> Self {
        Self {
            pipeline: pipeline.into(),
            offset,
        }
    }
}

impl Dependency for PipelineDependency {
    fn check(&self, status: &StatusManager, sequence_number: SequenceNumber) -> bool {
        status.is_pipeline_complete(&self.pipeline, sequence_number + self.offset)
    }
}

/// Turn a validated `requires = [...]` entry into a dependency object.
pub fn from_requirement(req: &RequirementConfig) -> Option<Arc<dyn Dependency>> {
    match (&req.task, &req.pipeline) {
        (Some(task), None) => Some(Arc::new(TaskDependency::new(task.clone(), req.offset))),
        (None, Some(pipeline)) => Some(Arc::new(PipelineDependency::new(
            pipeline.clone(),
            req.offset,
        ))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;

    #[test]
    fn offset_dependency_looks_at_previous_iteration() {
        let status = StatusManager::in_memory();
        let dep = TaskDependency::new("load", -1);

        assert!(!dep.check(&status, 10));
        status
            .commit_task_status("load", 9, Status::Success, true)
            .unwrap();
        assert!(dep.check(&status, 10));
        assert!(!dep.check(&status, 11));
    }

    #[test]
    fn first_iteration_offset_reads_sentinel_as_unsatisfied() {
        let status = StatusManager::in_memory();
        let dep = TaskDependency::new("load", -1);
        assert!(!dep.check(&status, 0));
    }

    #[test]
    fn pipeline_dependency_uses_pipeline_markers() {
        let status = StatusManager::in_memory();
        let dep = PipelineDependency::new("upstream", 0);

        status
            .commit_task_status("upstream", 5, Status::Success, true)
            .unwrap();
        assert!(!dep.check(&status, 5));

        status
            .commit_pipeline_status("upstream", 5, Status::Success)
            .unwrap();
        assert!(dep.check(&status, 5));
    }
}
