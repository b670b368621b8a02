// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`pool`] bounds how many submissions of one instance run at once.
//! - [`task_executor`] runs one submission and reports a completion
//!   message back to its task scheduler.
//! - [`command`] is the built-in shell command task.

pub mod command;
pub mod pool;
pub mod task_executor;

pub use command::CommandTask;
pub use pool::WorkerPool;
pub use task_executor::TaskExecutor;
