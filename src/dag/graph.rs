// src/dag/graph.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::errors::{CadenceError, Result};
use crate::task::TaskType;

#[derive(Debug, Clone)]
struct GraphNode {
    task_type: Arc<TaskType>,
    /// Declared dependencies (`after`) as resolved task types.
    deps: Vec<Arc<TaskType>>,
}

/// Task dependency graph of one pipeline instance.
///
/// Built once per executable pipeline from validated config; acyclicity is
/// already guaranteed by `config::validate`, so only adjacency is kept.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: HashMap<String, GraphNode>,
}

impl TaskGraph {
    /// Graph over `tasks`, resolving every name against `task_types`.
    pub fn build(tasks: &[String], task_types: &BTreeMap<String, Arc<TaskType>>) -> Result<Self> {
        let lookup = |name: &str| {
            task_types
                .get(name)
                .cloned()
                .ok_or_else(|| CadenceError::TaskNotFound(name.to_string()))
        };

        let mut nodes = HashMap::with_capacity(tasks.len());
        for name in tasks {
            let task_type = lookup(name)?;
            let deps = task_type
                .dependencies
                .iter()
                .map(|dep| lookup(dep))
                .collect::<Result<Vec<_>>>()?;
            nodes.insert(name.clone(), GraphNode { task_type, deps });
        }

        Ok(Self { nodes })
    }

    /// All task names. Order is unspecified.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn task_type(&self, name: &str) -> Option<&Arc<TaskType>> {
        self.nodes.get(name).map(|n| &n.task_type)
    }

    pub fn dependencies_of(&self, name: &str) -> &[Arc<TaskType>] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
