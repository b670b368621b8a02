use std::collections::BTreeMap;

use cadence::config::{
    ConfigFile, ConfigSection, PipelineConfig, RawConfigFile, RequirementConfig, TaskConfig,
};
use cadence::errors::Result;
use cadence::types::{Criticality, IterationMode, StatusStorageMode};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection {
                    storage: StatusStorageMode::Memory,
                    ..ConfigSection::default()
                },
                pipeline: BTreeMap::new(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_pipeline(mut self, name: &str, pipeline: PipelineConfig) -> Self {
        self.config.pipeline.insert(name.to_string(), pipeline);
        self
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `PipelineConfig`.
pub struct PipelineConfigBuilder {
    pipeline: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new(tasks: &[&str]) -> Self {
        Self {
            pipeline: PipelineConfig {
                interval: "10ms".to_string(),
                tasks: tasks.iter().map(|t| t.to_string()).collect(),
                ..PipelineConfig::default()
            },
        }
    }

    pub fn interval(mut self, interval: &str) -> Self {
        self.pipeline.interval = interval.to_string();
        self
    }

    pub fn lookback(mut self, lookback: u32) -> Self {
        self.pipeline.lookback = lookback;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.pipeline.threads = threads;
        self
    }

    pub fn clock(mut self, period: &str) -> Self {
        self.pipeline.iteration = IterationMode::Clock;
        self.pipeline.period = period.to_string();
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.pipeline
    }
}

/// Builder for `TaskConfig`.
#[derive(Default)]
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.task.cmd = Some(cmd.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn high(mut self) -> Self {
        self.task.criticality = Criticality::High;
        self
    }

    pub fn arg(mut self, key: &str, value: &str) -> Self {
        self.task.args.insert(key.to_string(), value.to_string());
        self
    }

    pub fn requires_task(mut self, task: &str, offset: i64) -> Self {
        self.task.requires.push(RequirementConfig {
            task: Some(task.to_string()),
            pipeline: None,
            offset,
        });
        self
    }

    pub fn requires_pipeline(mut self, pipeline: &str, offset: i64) -> Self {
        self.task.requires.push(RequirementConfig {
            task: None,
            pipeline: Some(pipeline.to_string()),
            offset,
        });
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
