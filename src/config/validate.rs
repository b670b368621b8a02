// src/config/validate.rs

use std::collections::HashSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{CadenceError, Result};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = CadenceError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.pipeline, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_pipelines(cfg)?;
    validate_pipelines(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_requirements(cfg)?;
    validate_pipeline_membership(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_pipelines(cfg: &RawConfigFile) -> Result<()> {
    if cfg.pipeline.is_empty() {
        return Err(CadenceError::ConfigError(
            "config must contain at least one [pipeline.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_pipelines(cfg: &RawConfigFile) -> Result<()> {
    for (name, pipeline) in cfg.pipeline.iter() {
        if pipeline.tasks.is_empty() {
            return Err(CadenceError::ConfigError(format!(
                "pipeline '{}' must list at least one task in `tasks`",
                name
            )));
        }

        let mut seen = HashSet::new();
        for task in pipeline.tasks.iter() {
            if !cfg.task.contains_key(task) {
                return Err(CadenceError::ConfigError(format!(
                    "pipeline '{}' references unknown task '{}'",
                    name, task
                )));
            }
            if !seen.insert(task.as_str()) {
                return Err(CadenceError::ConfigError(format!(
                    "pipeline '{}' lists task '{}' more than once",
                    name, task
                )));
            }
        }

        for (field, value) in [("interval", &pipeline.interval), ("period", &pipeline.period)] {
            let duration = parse_duration(value).map_err(|e| {
                CadenceError::ConfigError(format!("[pipeline.{}].{}: {}", name, field, e))
            })?;
            if duration.is_zero() {
                return Err(CadenceError::ConfigError(format!(
                    "[pipeline.{}].{} must be greater than zero",
                    name, field
                )));
            }
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(CadenceError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(CadenceError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_requirements(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for req in task.requires.iter() {
            match (&req.task, &req.pipeline) {
                (Some(target), None) => {
                    if !cfg.task.contains_key(target) {
                        return Err(CadenceError::ConfigError(format!(
                            "task '{}' requires unknown task '{}'",
                            name, target
                        )));
                    }
                    if target == name && req.offset == 0 {
                        return Err(CadenceError::ConfigError(format!(
                            "task '{}' cannot require itself at offset 0",
                            name
                        )));
                    }
                }
                (None, Some(target)) => {
                    if !cfg.pipeline.contains_key(target) {
                        return Err(CadenceError::ConfigError(format!(
                            "task '{}' requires unknown pipeline '{}'",
                            name, target
                        )));
                    }
                }
                _ => {
                    return Err(CadenceError::ConfigError(format!(
                        "task '{}': each `requires` entry needs exactly one of `task` or `pipeline`",
                        name
                    )));
                }
            }
        }
    }
    Ok(())
}

/// A task's `after` targets must be scheduled by every pipeline the task
/// belongs to, otherwise the dependent could never become ready.
fn validate_pipeline_membership(cfg: &RawConfigFile) -> Result<()> {
    for (pipeline_name, pipeline) in cfg.pipeline.iter() {
        for task_name in pipeline.tasks.iter() {
            let Some(task) = cfg.task.get(task_name) else {
                continue;
            };
            for dep in task.after.iter() {
                if !pipeline.tasks.contains(dep) {
                    return Err(CadenceError::ConfigError(format!(
                        "task '{}' depends on '{}', which is not part of pipeline '{}'",
                        task_name, dep, pipeline_name
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task
    // For:
    //   [task.B]
    //   after = ["A"]
    // we add edge A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(CadenceError::DagCycle(format!(
                "cycle detected in task DAG involving task '{}'",
                node
            )))
        }
    }
}
