// src/engine/mod.rs

//! Orchestration engine.
//!
//! Three nested polling loops:
//! - [`pipeline_scheduler`]: one per pipeline type, keeps the window of
//!   active sequence numbers and one executor per incomplete instance.
//! - [`pipeline_executor`]: one per active instance, ticks its task
//!   scheduler until the instance is complete.
//! - [`task_scheduler`]: one per instance, submits ready tasks to the
//!   instance's worker pool and tracks what is running.
//!
//! Siblings only learn about each other through the status store.

use std::collections::{BTreeMap, HashMap};

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// How one submission of a task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed(String),
    /// Cancelled before finishing; no terminal status was committed.
    Aborted,
}

/// Message sent by a finished submission to its task scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCompletion {
    pub task: TaskName,
    /// Distinguishes a stale completion from the current registry entry.
    pub submission: u64,
    pub outcome: TaskOutcome,
}

/// Per-run request flags.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// One-shot run: failures are not persisted, completion is tracked in
    /// memory.
    pub adhoc: bool,
    /// Gate readiness on the in-memory completion map only.
    pub overwrite: bool,
    /// Run-request arguments per task, overlaid on the task type's args.
    pub task_args: HashMap<TaskName, BTreeMap<String, String>>,
}

pub mod pipeline_executor;
pub mod pipeline_scheduler;
pub mod task_scheduler;

pub use pipeline_executor::PipelineExecutor;
pub use pipeline_scheduler::{AbortHandle, PipelineScheduler};
pub use task_scheduler::TaskScheduler;
