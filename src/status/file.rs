// src/status/file.rs

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::StatusStore;
use crate::types::{SequenceNumber, Status};

/// Status store backed by empty marker files:
/// `<root>/<identifier>/<sequence_number>/<MARKER>`.
///
/// A marker's modification time is its commit time.
#[derive(Debug, Clone)]
pub struct FileStatusStore {
    root: PathBuf,
}

impl FileStatusStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn identifier_dir(&self, identifier: &str) -> PathBuf {
        self.root.join(identifier)
    }

    fn status_dir(&self, identifier: &str, sequence_number: SequenceNumber) -> PathBuf {
        self.identifier_dir(identifier)
            .join(sequence_number.to_string())
    }

    fn marker_path(
        &self,
        identifier: &str,
        sequence_number: SequenceNumber,
        status: Status,
    ) -> Option<PathBuf> {
        status
            .marker()
            .map(|m| self.status_dir(identifier, sequence_number).join(m))
    }
}

impl StatusStore for FileStatusStore {
    fn commit_status(
        &self,
        identifier: &str,
        sequence_number: SequenceNumber,
        status: Status,
        time: DateTime<Utc>,
        overwrite: bool,
    ) -> io::Result<()> {
        let Some(path) = self.marker_path(identifier, sequence_number, status) else {
            return Ok(());
        };
        let dir = self.status_dir(identifier, sequence_number);

        if overwrite {
            remove_dir_if_exists(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        let file = fs::File::create(&path)?;
        file.set_modified(SystemTime::from(time))?;
        debug!(path = %path.display(), "created status marker");
        Ok(())
    }

    fn remove_status(
        &self,
        identifier: &str,
        sequence_number: SequenceNumber,
        status: Status,
    ) -> io::Result<()> {
        let Some(path) = self.marker_path(identifier, sequence_number, status) else {
            return Ok(());
        };
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        }

        // An emptied key must not keep counting towards the current iteration.
        let dir = self.status_dir(identifier, sequence_number);
        if fs::read_dir(&dir)?.next().is_none() {
            match fs::remove_dir(&dir) {
                Ok(()) => debug!(path = %dir.display(), "removed empty status directory"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
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

        let mut present = Vec::new();
        for status in [Status::Success, Status::Error, Status::InProgress] {
            if let Some(path) = self.marker_path(identifier, sequence_number, status) {
                if path.try_exists()? {
                    present.push(status);
                }
            }
        }
        Ok(Status::resolve(present))
    }

    fn current_iteration_number(&self, identifier: &str) -> io::Result<SequenceNumber> {
        let dir = self.identifier_dir(identifier);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut max_seq = 0;
        for entry in entries {
            let entry = entry?;
            let Some(seq) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<SequenceNumber>().ok())
            else {
                continue;
            };
            max_seq = max_seq.max(seq);
        }
        Ok(max_seq)
    }

    fn clear_all_statuses(
        &self,
        identifier: &str,
        sequence_number: SequenceNumber,
    ) -> io::Result<()> {
        remove_dir_if_exists(&self.status_dir(identifier, sequence_number))
    }

    fn last_update_time(
        &self,
        identifier: &str,
        sequence_number: SequenceNumber,
    ) -> io::Result<Option<DateTime<Utc>>> {
        let dir = self.status_dir(identifier, sequence_number);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut latest: Option<SystemTime> = None;
        for entry in entries {
            let modified = entry?.metadata()?.modified()?;
            latest = Some(latest.map_or(modified, |t| t.max(modified)));
        }
        Ok(latest.map(DateTime::<Utc>::from))
    }

    fn status_update_time(
        &self,
        identifier: &str,
        sequence_number: SequenceNumber,
        status: Status,
    ) -> io::Result<Option<DateTime<Utc>>> {
        let Some(path) = self.marker_path(identifier, sequence_number, status) else {
            return Ok(None);
        };
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(DateTime::<Utc>::from(meta.modified()?))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
