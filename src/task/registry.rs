// src/task/registry.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::task::Task;

/// Builds a fresh task instance for one scheduling attempt.
pub type TaskFactory = Arc<dyn Fn() -> Arc<dyn Task> + Send + Sync>;

/// Explicit name → factory table.
///
/// Library users register their own tasks here; tasks declared with `cmd`
/// in the config get a shell-command factory when the [`crate::registry::Registry`]
/// is built, unless a factory was registered under the same name.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    factories: HashMap<String, TaskFactory>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Task> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn create(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.factories.get(name).map(|factory| factory())
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("TaskRegistry")
            .field("tasks", &names)
            .finish()
    }
}
