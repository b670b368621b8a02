// src/pipeline/mod.rs

//! Pipeline descriptors and per-sequence-number instances.
//!
//! - [`PipelineType`] is the immutable descriptor built from config.
//! - [`iteration`] produces the current iteration number for a pipeline.
//! - [`executable`] is one (pipeline, sequence number) instance.
//! - [`factory`] creates and caches instances.

pub mod executable;
pub mod factory;
pub mod iteration;

use std::time::Duration;

use crate::config::PipelineConfig;
use crate::errors::{CadenceError, Result};
use crate::types::{IterationMode, parse_duration};

pub use executable::ExecutablePipeline;
pub use factory::PipelineFactory;
pub use iteration::{ClockIteration, IterationGenerator, StatusIteration};

/// Immutable pipeline descriptor.
///
/// All pipelines share the process-wide status backend chosen in
/// `[config]`, so the descriptor carries no store reference of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineType {
    pub name: String,
    pub interval: Duration,
    pub lookback: u32,
    /// Worker pool size per instance; 0 means unbounded.
    pub threads: usize,
    pub iteration: IterationMode,
    pub period: Duration,
    pub admin: Option<String>,
    pub tasks: Vec<String>,
}

impl PipelineType {
    pub fn from_config(name: impl Into<String>, cfg: &PipelineConfig) -> Result<Self> {
        let name = name.into();
        let interval = parse_duration(&cfg.interval).map_err(|e| {
            CadenceError::ConfigError(format!("pipeline '{name}' has invalid interval: {e}"))
        })?;
        let period = parse_duration(&cfg.period).map_err(|e| {
            CadenceError::ConfigError(format!("pipeline '{name}' has invalid period: {e}"))
        })?;

        Ok(Self {
            name,
            interval,
            lookback: cfg.lookback,
            threads: cfg.threads,
            iteration: cfg.iteration,
            period,
            admin: cfg.admin.clone(),
            tasks: cfg.tasks.clone(),
        })
    }
}
