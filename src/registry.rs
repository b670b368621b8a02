// src/registry.rs

//! Name → descriptor and name → factory tables built once at startup.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::ConfigFile;
use crate::errors::{CadenceError, Result};
use crate::exec::CommandTask;
use crate::pipeline::PipelineType;
use crate::task::{Task, TaskRegistry, TaskType};

/// Immutable pipeline and task descriptors plus the task factories.
#[derive(Debug, Clone)]
pub struct Registry {
    pipelines: BTreeMap<String, Arc<PipelineType>>,
    tasks: BTreeMap<String, Arc<TaskType>>,
    factories: TaskRegistry,
}

impl Registry {
    /// Build descriptors from a validated config.
    ///
    /// Tasks with a `cmd` get a shell-command factory unless `factories`
    /// already has one under that name. Every task listed by a pipeline must
    /// end up with a factory.
    pub fn from_config(cfg: &ConfigFile, mut factories: TaskRegistry) -> Result<Self> {
        let mut tasks = BTreeMap::new();
        for (name, task_cfg) in &cfg.task {
            tasks.insert(name.clone(), Arc::new(TaskType::from_config(name, task_cfg)));

            if factories.contains(name) {
                debug!(task = %name, "using registered task factory");
                continue;
            }
            if let Some(cmd) = &task_cfg.cmd {
                let cmd = cmd.clone();
                let requires = task_cfg.requires.clone();
                factories.register(name.clone(), move || -> Arc<dyn Task> {
                    Arc::new(CommandTask::with_requirements(cmd.clone(), &requires))
                });
            }
        }

        let mut pipelines = BTreeMap::new();
        for (name, pipeline_cfg) in &cfg.pipeline {
            for task in &pipeline_cfg.tasks {
                if !factories.contains(task) {
                    return Err(CadenceError::ConfigError(format!(
                        "task '{task}' in pipeline '{name}' has no `cmd` and no registered factory"
                    )));
                }
            }
            pipelines.insert(
                name.clone(),
                Arc::new(PipelineType::from_config(name, pipeline_cfg)?),
            );
        }

        Ok(Self {
            pipelines,
            tasks,
            factories,
        })
    }

    pub fn pipeline_type(&self, name: &str) -> Result<Arc<PipelineType>> {
        self.pipelines
            .get(name)
            .cloned()
            .ok_or_else(|| CadenceError::PipelineNotFound(name.to_string()))
    }

    pub fn task_type(&self, name: &str) -> Result<Arc<TaskType>> {
        self.tasks
            .get(name)
            .cloned()
            .ok_or_else(|| CadenceError::TaskNotFound(name.to_string()))
    }

    pub fn task_types(&self) -> &BTreeMap<String, Arc<TaskType>> {
        &self.tasks
    }

    /// Fresh task instance for one scheduling attempt.
    pub fn create_task(&self, name: &str) -> Result<Arc<dyn Task>> {
        self.factories
            .create(name)
            .ok_or_else(|| CadenceError::TaskNotFound(name.to_string()))
    }

    pub fn pipelines(&self) -> impl Iterator<Item = &Arc<PipelineType>> {
        self.pipelines.values()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::{ConfigSection, PipelineConfig, TaskConfig};
    use crate::task::{BoxFuture, Context};

    struct Noop;

    impl Task for Noop {
        fn exec<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn config(cmd: Option<&str>) -> ConfigFile {
        ConfigFile::new_unchecked(
            ConfigSection::default(),
            BTreeMap::from([(
                "nightly".to_string(),
                PipelineConfig {
                    tasks: vec!["A".into()],
                    ..PipelineConfig::default()
                },
            )]),
            BTreeMap::from([(
                "A".to_string(),
                TaskConfig {
                    cmd: cmd.map(str::to_string),
                    ..TaskConfig::default()
                },
            )]),
        )
    }

    #[test]
    fn cmd_tasks_get_a_factory() {
        let registry = Registry::from_config(&config(Some("true")), TaskRegistry::new()).unwrap();
        assert!(registry.create_task("A").is_ok());
        assert_eq!(registry.pipeline_type("nightly").unwrap().tasks, vec!["A"]);
        assert!(matches!(
            registry.pipeline_type("weekly"),
            Err(CadenceError::PipelineNotFound(_))
        ));
    }

    #[test]
    fn tasks_without_cmd_need_a_registered_factory() {
        let err = Registry::from_config(&config(None), TaskRegistry::new()).unwrap_err();
        assert!(matches!(err, CadenceError::ConfigError(msg) if msg.contains("'A'")));

        let mut factories = TaskRegistry::new();
        factories.register("A", || -> Arc<dyn Task> { Arc::new(Noop) });
        let registry = Registry::from_config(&config(None), factories).unwrap();
        assert!(registry.create_task("A").is_ok());
        assert!(registry.create_task("B").is_err());
    }
}
