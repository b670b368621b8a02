// src/status/memory.rs

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::StatusStore;
use crate::types::{SequenceNumber, Status};

type Markers = HashMap<Status, DateTime<Utc>>;

/// In-process status store. Clones share the same markers.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatusStore {
    entries: Arc<Mutex<HashMap<(String, SequenceNumber), Markers>>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw markers present for a key, in no particular order.
    pub fn markers(&self, identifier: &str, sequence_number: SequenceNumber) -> Vec<Status> {
        let Ok(entries) = self.lock() else {
            return Vec::new();
        };
        entries
            .get(&(identifier.to_string(), sequence_number))
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, HashMap<(String, SequenceNumber), Markers>>> {
        self.entries
            .lock()
            .map_err(|_| io::Error::other("memory status store lock poisoned"))
    }
}

impl StatusStore for MemoryStatusStore {
    fn commit_status(
        &self,
        identifier: &str,
        sequence_number: SequenceNumber,
        status: Status,
        time: DateTime<Utc>,
        overwrite: bool,
    ) -> io::Result<()> {
        if status == Status::Default {
            return Ok(());
        }
        let mut entries = self.lock()?;
        let markers = entries
            .entry((identifier.to_string(), sequence_number))
            .or_default();
        if overwrite {
            markers.clear();
        }
        markers.insert(status, time);
        Ok(())
    }

    fn remove_status(
        &self,
        identifier: &str,
        sequence_number: SequenceNumber,
        status: Status,
    ) -> io::Result<()> {
        let mut entries = self.lock()?;
        let key = (identifier.to_string(), sequence_number);
        if let Some(markers) = entries.get_mut(&key) {
            markers.remove(&status);
            if markers.is_empty() {
                entries.remove(&key);
            }
        }
        Ok(())
    }

    fn check_status(
        &self,
        identifier: &str,
        sequence_number: SequenceNumber,
    ) -> io::Result<Status> {
        if sequence_number < 0 {
            return Ok(Status::Default);
        }
        let entries = self.lock()?;
        Ok(entries
            .get(&(identifier.to_string(), sequence_number))
            .map(|m| Status::resolve(m.keys().copied()))
            .unwrap_or(Status::Default))
    }

    fn current_iteration_number(&self, identifier: &str) -> io::Result<SequenceNumber> {
        let entries = self.lock()?;
        Ok(entries
            .keys()
            .filter(|(id, _)| id == identifier)
            .map(|(_, seq)| *seq)
            .max()
            .unwrap_or(0)
            .max(0))
    }

    fn clear_all_statuses(
        &self,
        identifier: &str,
        sequence_number: SequenceNumber,
    ) -> io::Result<()> {
        let mut entries = self.lock()?;
        entries.remove(&(identifier.to_string(), sequence_number));
        Ok(())
    }

    fn last_update_time(
        &self,
        identifier: &str,
        sequence_number: SequenceNumber,
    ) -> io::Result<Option<DateTime<Utc>>> {
        let entries = self.lock()?;
        Ok(entries
            .get(&(identifier.to_string(), sequence_number))
            .and_then(|m| m.values().max().copied()))
    }

    fn status_update_time(
        &self,
        identifier: &str,
        sequence_number: SequenceNumber,
        status: Status,
    ) -> io::Result<Option<DateTime<Utc>>> {
        let entries = self.lock()?;
        Ok(entries
            .get(&(identifier.to_string(), sequence_number))
            .and_then(|m| m.get(&status).copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrite_commit_replaces_every_marker() {
        let store = MemoryStatusStore::new();
        store
            .commit_status("task/A", 4, Status::InProgress, Utc::now(), false)
            .unwrap();
        store
            .commit_status("task/A", 4, Status::Error, Utc::now(), false)
            .unwrap();
        store
            .commit_status("task/A", 4, Status::Success, Utc::now(), true)
            .unwrap();

        assert_eq!(store.markers("task/A", 4), vec![Status::Success]);
    }

    #[test]
    fn sentinel_sequence_number_reads_default() {
        let store = MemoryStatusStore::new();
        store
            .commit_status("task/A", -1, Status::Success, Utc::now(), true)
            .unwrap();
        assert_eq!(store.check_status("task/A", -1).unwrap(), Status::Default);
    }

    #[test]
    fn current_iteration_is_max_sequence_for_identifier() {
        let store = MemoryStatusStore::new();
        assert_eq!(store.current_iteration_number("pipeline/p").unwrap(), 0);

        for seq in [3, 9, 5] {
            store
                .commit_status("pipeline/p", seq, Status::Success, Utc::now(), true)
                .unwrap();
        }
        store
            .commit_status("pipeline/other", 40, Status::Success, Utc::now(), true)
            .unwrap();

        assert_eq!(store.current_iteration_number("pipeline/p").unwrap(), 9);
    }
}
