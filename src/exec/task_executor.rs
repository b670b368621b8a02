// src/exec/task_executor.rs

use std::fmt;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{TaskCompletion, TaskOutcome};
use crate::exec::WorkerPool;
use crate::task::ExecutableTask;
use crate::types::SequenceNumber;

/// Handle for one in-flight submission of a task.
///
/// - `cancel` asks the worker to drop the exec future at its next await
///   point (cooperative abort).
/// - `handle` is the Tokio task on the worker pool; aborting it is the
///   forced path.
pub struct TaskExecutor {
    task: String,
    sequence_number: SequenceNumber,
    submission: u64,
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TaskExecutor {
    /// Submit `task` to `pool`. Exactly one [`TaskCompletion`] is sent on
    /// `completions` unless the submission is force-aborted or the pool is
    /// shut down before it starts.
    pub fn submit(
        pool: &WorkerPool,
        task: ExecutableTask,
        submission: u64,
        completions: mpsc::UnboundedSender<TaskCompletion>,
    ) -> Self {
        let name = task.name().to_string();
        let sequence_number = task.sequence_number();
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        let task_name = name.clone();
        let handle = pool.spawn(async move {
            let outcome = tokio::select! {
                result = task.execute() => match result {
                    Ok(()) => TaskOutcome::Success,
                    Err(e) => TaskOutcome::Failed(e.to_string()),
                },
                Ok(()) = cancel_rx => TaskOutcome::Aborted,
            };

            match &outcome {
                TaskOutcome::Success => {
                    info!(task = %task_name, sequence_number, "task succeeded")
                }
                TaskOutcome::Failed(message) => {
                    warn!(task = %task_name, sequence_number, error = %message, "task failed")
                }
                TaskOutcome::Aborted => {
                    info!(task = %task_name, sequence_number, "task aborted")
                }
            }

            if completions
                .send(TaskCompletion {
                    task: task_name.clone(),
                    submission,
                    outcome,
                })
                .is_err()
            {
                debug!(task = %task_name, sequence_number, "completion receiver gone");
            }
        });

        Self {
            task: name,
            sequence_number,
            submission,
            cancel: Some(cancel_tx),
            handle,
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn submission(&self) -> u64 {
        self.submission
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cooperative cancel. The submission still reports `Aborted`.
    pub fn abort(&mut self) {
        match self.cancel.take() {
            Some(cancel) => {
                if cancel.send(()).is_err() {
                    debug!(task = %self.task, sequence_number = self.sequence_number, "task already finished while cancelling");
                }
            }
            None => {
                debug!(task = %self.task, sequence_number = self.sequence_number, "cancel already requested");
            }
        }
    }

    /// Stop the worker task outright; no completion is reported.
    pub fn force_abort(&self) {
        self.handle.abort();
    }
}

impl fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("task", &self.task)
            .field("sequence_number", &self.sequence_number)
            .field("submission", &self.submission)
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::status::StatusManager;
    use crate::task::{BoxFuture, Context, Task, TaskType};
    use crate::types::{Criticality, Status};

    struct Sleeper;

    impl Task for Sleeper {
        fn exec<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(())
            })
        }
    }

    fn executable(status: &StatusManager) -> ExecutableTask {
        let ty = Arc::new(TaskType {
            name: "slow".into(),
            criticality: Criticality::Low,
            dependencies: Vec::new(),
            args: BTreeMap::new(),
        });
        ExecutableTask::new(ty, Arc::new(Sleeper), 2, status.clone())
    }

    #[tokio::test]
    async fn cooperative_abort_reports_aborted_and_leaves_in_progress() {
        let status = StatusManager::in_memory();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut executor = TaskExecutor::submit(&WorkerPool::new(0), executable(&status), 9, tx);

        while !status.is_task_running("slow", 2) {
            tokio::task::yield_now().await;
        }
        executor.abort();

        let completion = rx.recv().await.unwrap();
        assert_eq!(completion.task, "slow");
        assert_eq!(completion.submission, 9);
        assert_eq!(completion.outcome, TaskOutcome::Aborted);
        assert_eq!(status.task_status("slow", 2), Status::InProgress);
    }

    #[tokio::test]
    async fn force_abort_sends_nothing() {
        let status = StatusManager::in_memory();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let executor = TaskExecutor::submit(&WorkerPool::new(1), executable(&status), 1, tx);

        executor.force_abort();
        assert!(rx.recv().await.is_none());
    }
}
