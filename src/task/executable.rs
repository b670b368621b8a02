// src/task/executable.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::errors::{CadenceError, Result};
use crate::status::StatusManager;
use crate::task::{Context, Task, TaskType};
use crate::types::{SequenceNumber, Status};

/// Argument key that switches a task into adhoc mode when set to `"true"`.
pub const ADHOC_ARG: &str = "adhoc";

/// A task bound to one sequence number for one scheduling attempt.
///
/// Owns the status-transition protocol around a single execution:
///
/// 1. commit IN_PROGRESS (overwriting stale markers)
/// 2. run `exec`
/// 3. failure: remove IN_PROGRESS, commit ERROR unless adhoc, return error
/// 4. success: commit SUCCESS (overwrite), remove IN_PROGRESS
pub struct ExecutableTask {
    task_type: Arc<TaskType>,
    task: Arc<dyn Task>,
    sequence_number: SequenceNumber,
    status: StatusManager,
    args: BTreeMap<String, String>,
    adhoc: bool,
}

impl ExecutableTask {
    pub fn new(
        task_type: Arc<TaskType>,
        task: Arc<dyn Task>,
        sequence_number: SequenceNumber,
        status: StatusManager,
    ) -> Self {
        let args = task_type.args.clone();
        Self {
            task_type,
            task,
            sequence_number,
            status,
            args,
            adhoc: false,
        }
    }

    /// Merge run-request arguments over the task type's defaults.
    pub fn parameterize(&mut self, args: &BTreeMap<String, String>) {
        for (key, value) in args {
            if key == ADHOC_ARG && value.eq_ignore_ascii_case("true") {
                self.adhoc = true;
            }
            self.args.insert(key.clone(), value.clone());
        }
    }

    pub fn set_adhoc(&mut self, adhoc: bool) {
        self.adhoc = self.adhoc || adhoc;
    }

    pub fn is_adhoc(&self) -> bool {
        self.adhoc
    }

    pub fn name(&self) -> &str {
        &self.task_type.name
    }

    pub fn sequence_number(&self) -> SequenceNumber {
        self.sequence_number
    }

    pub fn context(&self) -> Context {
        Context::new(
            self.task_type.name.clone(),
            self.sequence_number,
            self.args.clone(),
            self.adhoc,
        )
    }

    /// Run the task's `init` hook.
    pub fn init(&self) -> Result<()> {
        self.task
            .init(&self.context())
            .map_err(|e| CadenceError::TaskFailed {
                task: self.name().to_string(),
                sequence_number: self.sequence_number,
                message: format!("init failed: {e:#}"),
            })
    }

    /// Pure read: true when the task declares no dynamic dependencies or
    /// all of them hold for this sequence number.
    pub fn check_dependencies(&self) -> bool {
        self.task
            .dependencies(self.sequence_number)
            .iter()
            .all(|dep| dep.check(&self.status, self.sequence_number))
    }

    pub async fn execute(&self) -> Result<()> {
        let name = self.name();
        let seq = self.sequence_number;

        self.status
            .commit_task_status(name, seq, Status::InProgress, true)?;

        info!(task = %name, sequence_number = seq, adhoc = self.adhoc, "executing task");

        let ctx = self.context();
        if let Err(e) = self.task.exec(&ctx).await {
            if let Err(remove_err) = self.status.remove_in_progress_task_status(name, seq) {
                warn!(task = %name, sequence_number = seq, error = %remove_err, "failed to remove IN_PROGRESS marker");
            }
            if !self.adhoc {
                if let Err(commit_err) = self.status.commit_task_status(name, seq, Status::Error, true)
                {
                    error!(task = %name, sequence_number = seq, error = %commit_err, "failed to commit ERROR status");
                }
            }
            return Err(CadenceError::TaskFailed {
                task: name.to_string(),
                sequence_number: seq,
                message: format!("{e:#}"),
            });
        }

        self.status
            .commit_task_status(name, seq, Status::Success, true)?;
        self.status.remove_in_progress_task_status(name, seq)?;

        Ok(())
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_task_complete(self.name(), self.sequence_number)
    }

    pub fn is_running(&self) -> bool {
        self.status.is_task_running(self.name(), self.sequence_number)
    }

    pub fn has_error(&self) -> bool {
        self.status.is_task_in_error(self.name(), self.sequence_number)
    }
}

impl fmt::Display for ExecutableTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name(), self.sequence_number)
    }
}

impl fmt::Debug for ExecutableTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableTask")
            .field("task_type", &self.task_type)
            .field("sequence_number", &self.sequence_number)
            .field("args", &self.args)
            .field("adhoc", &self.adhoc)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{MemoryStatusStore, StatusManager};
    use crate::task::{BoxFuture, Dependency, TaskDependency};
    use crate::types::Criticality;

    struct Outcome {
        fail: bool,
        deps: Vec<Arc<dyn Dependency>>,
    }

    impl Task for Outcome {
        fn exec<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async move {
                if self.fail {
                    anyhow::bail!("boom");
                }
                Ok(())
            })
        }

        fn dependencies(&self, _seq: SequenceNumber) -> Vec<Arc<dyn Dependency>> {
            self.deps.clone()
        }
    }

    fn task_type() -> Arc<TaskType> {
        Arc::new(TaskType {
            name: "A".into(),
            criticality: Criticality::Low,
            dependencies: Vec::new(),
            args: BTreeMap::from([("region".to_string(), "eu".to_string())]),
        })
    }

    fn setup(fail: bool) -> (MemoryStatusStore, StatusManager, ExecutableTask) {
        let store = MemoryStatusStore::new();
        let status = StatusManager::new(Arc::new(store.clone()));
        let task = Arc::new(Outcome {
            fail,
            deps: Vec::new(),
        });
        let exec = ExecutableTask::new(task_type(), task, 7, status.clone());
        (store, status, exec)
    }

    #[tokio::test]
    async fn success_leaves_only_success_marker() {
        let (store, status, exec) = setup(false);
        status
            .commit_task_status("A", 7, Status::InProgress, false)
            .unwrap();

        exec.execute().await.unwrap();

        assert_eq!(store.markers("task/A", 7), vec![Status::Success]);
        assert!(exec.is_completed());
        assert!(!exec.is_running());
    }

    #[tokio::test]
    async fn failure_commits_error_and_surfaces_task_failed() {
        let (store, _status, exec) = setup(true);

        let err = exec.execute().await.unwrap_err();

        assert!(matches!(err, CadenceError::TaskFailed { ref task, sequence_number: 7, .. } if task == "A"));
        assert_eq!(store.markers("task/A", 7), vec![Status::Error]);
        assert!(exec.has_error());
    }

    #[tokio::test]
    async fn adhoc_failure_leaves_no_marker() {
        let (store, _status, mut exec) = setup(true);
        exec.parameterize(&BTreeMap::from([(ADHOC_ARG.to_string(), "true".to_string())]));
        assert!(exec.is_adhoc());

        assert!(exec.execute().await.is_err());
        assert!(store.markers("task/A", 7).is_empty());
    }

    #[test]
    fn parameterize_overlays_type_args() {
        let (_store, _status, mut exec) = setup(false);
        exec.parameterize(&BTreeMap::from([("region".to_string(), "us".to_string())]));

        let ctx = exec.context();
        assert_eq!(ctx.arg("region"), Some("us"));
        assert!(!ctx.is_adhoc());
        assert_eq!(exec.to_string(), "A:7");
    }

    #[test]
    fn check_dependencies_requires_every_dependency() {
        let status = StatusManager::in_memory();
        let task = Arc::new(Outcome {
            fail: false,
            deps: vec![
                Arc::new(TaskDependency::new("X", 0)),
                Arc::new(TaskDependency::new("Y", -1)),
            ],
        });
        let exec = ExecutableTask::new(task_type(), task, 7, status.clone());

        assert!(!exec.check_dependencies());
        status.commit_task_status("X", 7, Status::Success, true).unwrap();
        assert!(!exec.check_dependencies());
        status.commit_task_status("Y", 6, Status::Success, true).unwrap();
        assert!(exec.check_dependencies());
    }
}
