// src/types.rs

//! Small shared value types: sequence numbers, task status, criticality and
//! the string-backed enums used by the config file.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Iteration index of one pipeline instance (e.g. a day or batch id).
pub type SequenceNumber = i64;

/// Sentinel meaning "no prior state"; status reads for it are always
/// [`Status::Default`].
pub const NO_SEQUENCE: SequenceNumber = -1;

/// Durable status of a task (or pipeline) for one sequence number.
///
/// `Default` is the absence of any marker and is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Default,
    InProgress,
    Success,
    Error,
}

impl Status {
    /// Persisted marker name, or `None` for [`Status::Default`].
    pub fn marker(self) -> Option<&'static str> {
        match self {
            Status::Default => None,
            Status::InProgress => Some("IN_PROGRESS"),
            Status::Success => Some("SUCCESS"),
            Status::Error => Some("ERROR"),
        }
    }

    pub fn from_marker(marker: &str) -> Option<Status> {
        match marker {
            "IN_PROGRESS" => Some(Status::InProgress),
            "SUCCESS" => Some(Status::Success),
            "ERROR" => Some(Status::Error),
            _ => None,
        }
    }

    /// Pick the authoritative status out of a set of coexisting markers.
    ///
    /// A crash between a terminal commit and the IN_PROGRESS removal leaves
    /// both behind; terminal markers win.
    pub fn resolve(markers: impl IntoIterator<Item = Status>) -> Status {
        let mut seen_error = false;
        let mut seen_progress = false;

        for status in markers {
            match status {
                Status::Success => return Status::Success,
                Status::Error => seen_error = true,
                Status::InProgress => seen_progress = true,
                Status::Default => {}
            }
        }

        if seen_error {
            Status::Error
        } else if seen_progress {
            Status::InProgress
        } else {
            Status::Default
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.marker().unwrap_or("DEFAULT"))
    }
}

/// Whether an upstream task's ERROR blocks its dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    /// ERROR blocks every dependent until it is cleared externally.
    High,
    /// ERROR is absorbed; dependents proceed.
    Low,
}

impl Default for Criticality {
    fn default() -> Self {
        Criticality::Low
    }
}

impl FromStr for Criticality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Criticality::High),
            "low" => Ok(Criticality::Low),
            other => Err(format!(
                "invalid criticality: {other} (expected \"high\" or \"low\")"
            )),
        }
    }
}

/// Backend used for the durable status store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusStorageMode {
    /// Marker files under `[config].storage_root`.
    File,
    /// Process memory only (lost on restart).
    Memory,
}

impl Default for StatusStorageMode {
    fn default() -> Self {
        StatusStorageMode::File
    }
}

/// How a pipeline computes its current iteration number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IterationMode {
    /// Last persisted pipeline sequence number + 1.
    Status,
    /// `floor(unix_time / period)`.
    Clock,
}

impl Default for IterationMode {
    fn default() -> Self {
        IterationMode::Status
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_markers_win_over_in_progress() {
        assert_eq!(
            Status::resolve([Status::InProgress, Status::Success]),
            Status::Success
        );
        assert_eq!(
            Status::resolve([Status::InProgress, Status::Error]),
            Status::Error
        );
        assert_eq!(Status::resolve([Status::InProgress]), Status::InProgress);
        assert_eq!(Status::resolve([]), Status::Default);
    }

    #[test]
    fn parse_duration_accepts_known_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn criticality_from_str_is_case_insensitive() {
        assert_eq!("HIGH".parse::<Criticality>(), Ok(Criticality::High));
        assert!("medium".parse::<Criticality>().is_err());
    }
}
