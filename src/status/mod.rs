// src/status/mod.rs

//! Durable task / pipeline status.
//!
//! - [`StatusStore`] is the backend contract: presence markers keyed by
//!   (identifier, sequence number), single-key atomic, not transactional.
//! - [`StatusManager`] is the typed façade every other component goes
//!   through. It is cheap to clone and is passed explicitly to whoever
//!   needs it.
//! - [`memory`] and [`file`] are the two bundled backends.

pub mod file;
pub mod memory;

use std::fmt::Debug;
use std::io;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::errors::{CadenceError, Result};
use crate::types::{SequenceNumber, Status};

pub use file::FileStatusStore;
pub use memory::MemoryStatusStore;

/// Backend contract for the durable status record.
///
/// Implementations must read any negative sequence number as
/// [`Status::Default`].
pub trait StatusStore: Send + Sync + Debug {
    /// Persist `status` for the key. With `overwrite`, every existing marker
    /// of the key is removed first.
    fn commit_status(
        &self,
        identifier: &str,
        sequence_number: SequenceNumber,
        status: Status,
        time: DateTime<Utc>,
        overwrite: bool,
    ) -> io::Result<()>;

    /// Remove a single marker. Removing an absent marker is not an error.
    fn remove_status(
        &self,
        identifier: &str,
        sequence_number: SequenceNumber,
        status: Status,
    ) -> io::Result<()>;

    /// Authoritative status of the key (see [`Status::resolve`]).
    fn check_status(&self, identifier: &str, sequence_number: SequenceNumber)
    -> io::Result<Status>;

    /// Highest sequence number with any marker for `identifier`, or 0.
    fn current_iteration_number(&self, identifier: &str) -> io::Result<SequenceNumber>;

    fn clear_all_statuses(&self, identifier: &str, sequence_number: SequenceNumber)
    -> io::Result<()>;

    /// Latest commit time over all markers of the key.
    fn last_update_time(
        &self,
        identifier: &str,
        sequence_number: SequenceNumber,
    ) -> io::Result<Option<DateTime<Utc>>>;

    /// Commit time of one marker, if present.
    fn status_update_time(
        &self,
        identifier: &str,
        sequence_number: SequenceNumber,
        status: Status,
    ) -> io::Result<Option<DateTime<Utc>>>;
}

/// Typed queries and commits over a shared [`StatusStore`].
///
/// Read paths never fail: store errors are logged and read as "not found"
/// so polling loops degrade instead of halting. Write paths return errors
/// to the caller.
#[derive(Debug, Clone)]
pub struct StatusManager {
    store: Arc<dyn StatusStore>,
}

impl StatusManager {
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        Self { store }
    }

    /// Convenience for tests and `storage = "memory"`.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStatusStore::new()))
    }

    /// Store identifier used for a task's markers.
    pub fn task_identifier(task: &str) -> String {
        format!("task/{task}")
    }

    /// Store identifier used for a pipeline's markers.
    pub fn pipeline_identifier(pipeline: &str) -> String {
        format!("pipeline/{pipeline}")
    }

    pub fn task_status(&self, task: &str, sequence_number: SequenceNumber) -> Status {
        self.read_status(&Self::task_identifier(task), sequence_number)
    }

    pub fn is_task_complete(&self, task: &str, sequence_number: SequenceNumber) -> bool {
        self.task_status(task, sequence_number) == Status::Success
    }

    pub fn is_task_in_error(&self, task: &str, sequence_number: SequenceNumber) -> bool {
        self.task_status(task, sequence_number) == Status::Error
    }

    pub fn is_task_running(&self, task: &str, sequence_number: SequenceNumber) -> bool {
        self.task_status(task, sequence_number) == Status::InProgress
    }

    pub fn commit_task_status(
        &self,
        task: &str,
        sequence_number: SequenceNumber,
        status: Status,
        overwrite: bool,
    ) -> Result<()> {
        let identifier = Self::task_identifier(task);
        debug!(task = %task, sequence_number, %status, overwrite, "committing task status");
        self.store
            .commit_status(&identifier, sequence_number, status, Utc::now(), overwrite)
            .map_err(|source| store_error(identifier, sequence_number, source))
    }

    pub fn remove_in_progress_task_status(
        &self,
        task: &str,
        sequence_number: SequenceNumber,
    ) -> Result<()> {
        let identifier = Self::task_identifier(task);
        self.store
            .remove_status(&identifier, sequence_number, Status::InProgress)
            .map_err(|source| store_error(identifier, sequence_number, source))
    }

    /// Drop every marker of a task. This is how an operator releases a task
    /// stuck in ERROR.
    pub fn clear_task_status(&self, task: &str, sequence_number: SequenceNumber) -> Result<()> {
        let identifier = Self::task_identifier(task);
        self.store
            .clear_all_statuses(&identifier, sequence_number)
            .map_err(|source| store_error(identifier, sequence_number, source))
    }

    pub fn task_last_update_time(
        &self,
        task: &str,
        sequence_number: SequenceNumber,
    ) -> Option<DateTime<Utc>> {
        let identifier = Self::task_identifier(task);
        match self.store.last_update_time(&identifier, sequence_number) {
            Ok(time) => time,
            Err(e) => {
                warn!(identifier = %identifier, sequence_number, error = %e, "failed to read update time");
                None
            }
        }
    }

    pub fn is_pipeline_complete(&self, pipeline: &str, sequence_number: SequenceNumber) -> bool {
        self.read_status(&Self::pipeline_identifier(pipeline), sequence_number) == Status::Success
    }

    pub fn commit_pipeline_status(
        &self,
        pipeline: &str,
        sequence_number: SequenceNumber,
        status: Status,
    ) -> Result<()> {
        let identifier = Self::pipeline_identifier(pipeline);
        self.store
            .commit_status(&identifier, sequence_number, status, Utc::now(), true)
            .map_err(|source| store_error(identifier, sequence_number, source))
    }

    /// Highest sequence number with a pipeline marker (0 when none).
    pub fn current_iteration_number_for_pipeline(&self, pipeline: &str) -> Result<SequenceNumber> {
        let identifier = Self::pipeline_identifier(pipeline);
        self.store
            .current_iteration_number(&identifier)
            .map_err(|source| store_error(identifier, -1, source))
    }

    fn read_status(&self, identifier: &str, sequence_number: SequenceNumber) -> Status {
        match self.store.check_status(identifier, sequence_number) {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    identifier = %identifier,
                    sequence_number,
                    error = %e,
                    "status read failed; treating as DEFAULT"
                );
                Status::Default
            }
        }
    }
}

fn store_error(identifier: String, sequence_number: SequenceNumber, source: io::Error) -> CadenceError {
    CadenceError::StatusStore {
        identifier,
        sequence_number,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct BrokenStore;

    impl StatusStore for BrokenStore {
        fn commit_status(
            &self,
            _: &str,
            _: SequenceNumber,
            _: Status,
            _: DateTime<Utc>,
            _: bool,
        ) -> io::Result<()> {
            Err(io::Error::other("disk on fire"))
        }

        fn remove_status(&self, _: &str, _: SequenceNumber, _: Status) -> io::Result<()> {
            Err(io::Error::other("disk on fire"))
        }

        fn check_status(&self, _: &str, _: SequenceNumber) -> io::Result<Status> {
            Err(io::Error::other("disk on fire"))
        }

        fn current_iteration_number(&self, _: &str) -> io::Result<SequenceNumber> {
            Err(io::Error::other("disk on fire"))
        }

        fn clear_all_statuses(&self, _: &str, _: SequenceNumber) -> io::Result<()> {
            Err(io::Error::other("disk on fire"))
        }

        fn last_update_time(
            &self,
            _: &str,
            _: SequenceNumber,
        ) -> io::Result<Option<DateTime<Utc>>> {
            Err(io::Error::other("disk on fire"))
        }

        fn status_update_time(
            &self,
            _: &str,
            _: SequenceNumber,
            _: Status,
        ) -> io::Result<Option<DateTime<Utc>>> {
            Err(io::Error::other("disk on fire"))
        }
    }

    #[test]
    fn read_errors_degrade_to_default() {
        let status = StatusManager::new(Arc::new(BrokenStore));
        assert_eq!(status.task_status("A", 3), Status::Default);
        assert!(!status.is_task_complete("A", 3));
        assert!(!status.is_task_in_error("A", 3));
        assert!(status.task_last_update_time("A", 3).is_none());
    }

    #[test]
    fn write_errors_are_surfaced() {
        let status = StatusManager::new(Arc::new(BrokenStore));
        let err = status
            .commit_task_status("A", 3, Status::Success, true)
            .unwrap_err();
        match err {
            CadenceError::StatusStore {
                identifier,
                sequence_number,
                ..
            } => {
                assert_eq!(identifier, "task/A");
                assert_eq!(sequence_number, 3);
            }
            other => panic!("expected StatusStore error, got {other:?}"),
        }
    }

    #[test]
    fn task_and_pipeline_markers_do_not_collide() {
        let status = StatusManager::in_memory();
        status.commit_task_status("daily", 1, Status::Success, true).unwrap();
        assert!(status.is_task_complete("daily", 1));
        assert!(!status.is_pipeline_complete("daily", 1));
    }
}
