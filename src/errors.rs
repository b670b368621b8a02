// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::types::SequenceNumber;

#[derive(Error, Debug)]
pub enum CadenceError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Status store error for {identifier}:{sequence_number}: {source}")]
    StatusStore {
        identifier: String,
        sequence_number: SequenceNumber,
        #[source]
        source: std::io::Error,
    },

    #[error("Task {task}:{sequence_number} failed: {message}")]
    TaskFailed {
        task: String,
        sequence_number: SequenceNumber,
        message: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CadenceError>;
