// src/pipeline/iteration.rs

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::errors::{CadenceError, Result};
use crate::pipeline::PipelineType;
use crate::status::StatusManager;
use crate::types::{IterationMode, SequenceNumber};

/// Produces the current iteration number of one pipeline type.
///
/// One generator per pipeline type, shared across its instances.
pub trait IterationGenerator: Send + Sync + Debug {
    fn current_iteration_number(&self) -> Result<SequenceNumber>;
}

/// Last persisted pipeline sequence number + 1.
#[derive(Debug, Clone)]
pub struct StatusIteration {
    pipeline: String,
    status: StatusManager,
}

impl StatusIteration {
    pub fn new(pipeline: impl Into<String>, status: StatusManager) -> Self {
        Self {
            pipeline: pipeline.into(),
            status,
        }
    }
}

impl IterationGenerator for StatusIteration {
    fn current_iteration_number(&self) -> Result<SequenceNumber> {
        Ok(self
            .status
            .current_iteration_number_for_pipeline(&self.pipeline)?
            + 1)
    }
}

/// `floor(unix_seconds / period)`.
#[derive(Debug, Clone)]
pub struct ClockIteration {
    period: Duration,
}

impl ClockIteration {
    pub fn new(period: Duration) -> Result<Self> {
        if period.as_secs() == 0 {
            return Err(CadenceError::ConfigError(
                "clock iteration period must be at least one second".to_string(),
            ));
        }
        Ok(Self { period })
    }

    pub fn iteration_at(&self, unix_seconds: i64) -> SequenceNumber {
        unix_seconds.div_euclid(self.period.as_secs() as i64)
    }
}

impl IterationGenerator for ClockIteration {
    fn current_iteration_number(&self) -> Result<SequenceNumber> {
        Ok(self.iteration_at(Utc::now().timestamp()))
    }
}

/// Generator selected by the pipeline's `iteration` setting.
pub fn for_pipeline(
    pipeline: &PipelineType,
    status: &StatusManager,
) -> Result<Arc<dyn IterationGenerator>> {
    Ok(match pipeline.iteration {
        IterationMode::Status => Arc::new(StatusIteration::new(&pipeline.name, status.clone())),
        IterationMode::Clock => Arc::new(ClockIteration::new(pipeline.period)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;

    #[test]
    fn status_iteration_starts_after_last_pipeline_marker() {
        let status = StatusManager::in_memory();
        let iter = StatusIteration::new("nightly", status.clone());

        assert_eq!(iter.current_iteration_number().unwrap(), 1);

        status
            .commit_pipeline_status("nightly", 4, Status::Success)
            .unwrap();
        assert_eq!(iter.current_iteration_number().unwrap(), 5);

        // Task markers do not move the pipeline forward.
        status
            .commit_task_status("nightly", 9, Status::Success, true)
            .unwrap();
        assert_eq!(iter.current_iteration_number().unwrap(), 5);
    }

    #[test]
    fn clock_iteration_divides_by_period() {
        let daily = ClockIteration::new(Duration::from_secs(86_400)).unwrap();
        assert_eq!(daily.iteration_at(0), 0);
        assert_eq!(daily.iteration_at(86_399), 0);
        assert_eq!(daily.iteration_at(86_400), 1);
        assert_eq!(daily.iteration_at(1_700_000_000), 19_675);
    }

    #[test]
    fn sub_second_clock_period_is_rejected() {
        assert!(ClockIteration::new(Duration::from_millis(500)).is_err());
    }
}
