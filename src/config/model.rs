// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::types::{Criticality, IterationMode, StatusStorageMode};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// storage = "file"
/// storage_root = ".cadence/status"
///
/// [pipeline.nightly]
/// interval = "30s"
/// lookback = 2
/// threads = 4
/// tasks = ["extract", "load"]
///
/// [task.extract]
/// cmd = "./extract.sh"
/// criticality = "high"
///
/// [task.load]
/// cmd = "./load.sh"
/// after = ["extract"]
/// requires = [{ task = "load", offset = -1 }]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Global settings from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// All pipelines from `[pipeline.<name>]`.
    #[serde(default)]
    pub pipeline: BTreeMap<String, PipelineConfig>,

    /// All tasks from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>`, so holders can rely on
/// every reference resolving and the task graph being acyclic.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub pipeline: BTreeMap<String, PipelineConfig>,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        pipeline: BTreeMap<String, PipelineConfig>,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self {
            config,
            pipeline,
            task,
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// `"file"` (default) or `"memory"`.
    #[serde(default)]
    pub storage: StatusStorageMode,

    /// Root directory of the file status store.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(".cadence/status")
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            storage: StatusStorageMode::default(),
            storage_root: default_storage_root(),
        }
    }
}

/// `[pipeline.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Polling interval, e.g. `"30s"`.
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Number of prior sequence numbers kept active next to the current one.
    #[serde(default)]
    pub lookback: u32,

    /// Worker pool size per instance; 0 means unbounded.
    #[serde(default)]
    pub threads: usize,

    #[serde(default)]
    pub iteration: IterationMode,

    /// Clock period for `iteration = "clock"`.
    #[serde(default = "default_period")]
    pub period: String,

    /// Contact for the pipeline owner. Informational only.
    #[serde(default)]
    pub admin: Option<String>,

    /// Task names making up the pipeline's graph.
    #[serde(default)]
    pub tasks: Vec<String>,
}

fn default_interval() -> String {
    "60s".to_string()
}

fn default_period() -> String {
    "24h".to_string()
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    /// Shell command run by the built-in command task.
    ///
    /// Tasks without `cmd` need a factory registered in code.
    #[serde(default)]
    pub cmd: Option<String>,

    #[serde(default)]
    pub criticality: Criticality,

    /// Declared dependency task types within the same pipeline.
    #[serde(default)]
    pub after: Vec<String>,

    /// Opaque key/value arguments handed to the task.
    #[serde(default)]
    pub args: BTreeMap<String, String>,

    /// Extra conditions checked every tick, possibly against other
    /// pipelines or offset sequence numbers.
    #[serde(default)]
    pub requires: Vec<RequirementConfig>,
}

/// One entry of `requires = [...]`.
///
/// Exactly one of `task` / `pipeline` must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RequirementConfig {
    #[serde(default)]
    pub task: Option<String>,

    #[serde(default)]
    pub pipeline: Option<String>,

    /// Added to the sequence number being scheduled.
    #[serde(default)]
    pub offset: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            lookback: 0,
            threads: 0,
            iteration: IterationMode::default(),
            period: default_period(),
            admin: None,
            tasks: Vec::new(),
        }
    }
}
