// src/task/mod.rs

//! Units of work.
//!
//! - [`Task`] is the user-supplied implementation.
//! - [`TaskType`] is the immutable descriptor built from config.
//! - [`dependency`] holds the dynamic `Dependency` capability objects.
//! - [`executable`] binds a task to a sequence number and owns the status
//!   transitions around one execution.
//! - [`registry`] maps task names to factories.

pub mod dependency;
pub mod executable;
pub mod registry;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::TaskConfig;
use crate::types::{Criticality, SequenceNumber};

pub use dependency::{Dependency, PipelineDependency, TaskDependency};
pub use executable::ExecutableTask;
pub use registry::TaskRegistry;

/// Boxed, sendable future returned by [`Task::exec`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Immutable task descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskType {
    pub name: String,
    pub criticality: Criticality,
    /// Declared dependency task names (`after = [...]`).
    pub dependencies: Vec<String>,
    /// Default arguments, overlaid by run-request arguments.
    pub args: BTreeMap<String, String>,
}

impl TaskType {
    pub fn from_config(name: impl Into<String>, cfg: &TaskConfig) -> Self {
        Self {
            name: name.into(),
            criticality: cfg.criticality,
            dependencies: cfg.after.clone(),
            args: cfg.args.clone(),
        }
    }
}

/// What a task sees while it runs.
#[derive(Debug, Clone)]
pub struct Context {
    task: String,
    sequence_number: SequenceNumber,
    args: BTreeMap<String, String>,
    adhoc: bool,
}

impl Context {
    pub fn new(
        task: impl Into<String>,
        sequence_number: SequenceNumber,
        args: BTreeMap<String, String>,
        adhoc: bool,
    ) -> Self {
        Self {
            task: task.into(),
            sequence_number,
            args,
            adhoc,
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task
    }

    pub fn sequence_number(&self) -> SequenceNumber {
        self.sequence_number
    }

    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }

    pub fn args(&self) -> &BTreeMap<String, String> {
        &self.args
    }

    pub fn is_adhoc(&self) -> bool {
        self.adhoc
    }
}

/// User-supplied unit of work.
///
/// A fresh instance is created for every scheduling attempt; `init` runs once
/// on that instance before its dependencies are consulted. `exec` signals
/// failure by returning an error. Dropping the `exec` future is how a run is
/// cancelled, so implementations should make re-entry idempotent.
pub trait Task: Send + Sync {
    fn init(&self, _ctx: &Context) -> anyhow::Result<()> {
        Ok(())
    }

    fn exec<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Extra conditions for `sequence_number`, evaluated fresh every tick.
    fn dependencies(&self, _sequence_number: SequenceNumber) -> Vec<Arc<dyn Dependency>> {
        Vec::new()
    }
}
