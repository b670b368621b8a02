use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use cadence::errors::Result;
use cadence::pipeline::IterationGenerator;
use cadence::task::{BoxFuture, Context, Dependency, Task, TaskRegistry};
use cadence::types::SequenceNumber;
use tokio::sync::watch;

/// What a scripted task does when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Succeed,
    Fail,
    /// Wait until [`ScriptedTasks::release`] is called, then succeed.
    Block,
}

#[derive(Default)]
struct State {
    behaviours: HashMap<String, Behaviour>,
    dependencies: HashMap<String, Vec<Arc<dyn Dependency>>>,
    executions: Vec<(String, SequenceNumber)>,
    contexts: Vec<Context>,
}

/// Shared script for a set of fake tasks.
///
/// - every task succeeds unless told otherwise
/// - every `exec` call is recorded with its context
/// - behaviour can be changed between ticks
#[derive(Clone)]
pub struct ScriptedTasks {
    state: Arc<Mutex<State>>,
    released: Arc<watch::Sender<bool>>,
}

impl ScriptedTasks {
    pub fn new() -> Self {
        let (released, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(State::default())),
            released: Arc::new(released),
        }
    }

    pub fn set(&self, task: &str, behaviour: Behaviour) -> &Self {
        self.state
            .lock()
            .unwrap()
            .behaviours
            .insert(task.to_string(), behaviour);
        self
    }

    pub fn add_dependency(&self, task: &str, dependency: Arc<dyn Dependency>) -> &Self {
        self.state
            .lock()
            .unwrap()
            .dependencies
            .entry(task.to_string())
            .or_default()
            .push(dependency);
        self
    }

    /// Let every blocked task finish.
    pub fn release(&self) {
        self.released.send_replace(true);
    }

    pub fn executions(&self) -> Vec<(String, SequenceNumber)> {
        self.state.lock().unwrap().executions.clone()
    }

    pub fn count(&self, task: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .executions
            .iter()
            .filter(|(name, _)| name == task)
            .count()
    }

    pub fn last_context(&self, task: &str) -> Option<Context> {
        self.state
            .lock()
            .unwrap()
            .contexts
            .iter()
            .rev()
            .find(|ctx| ctx.task_name() == task)
            .cloned()
    }

    /// Registry with one scripted factory per name.
    pub fn registry(&self, names: &[&str]) -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        for name in names {
            let script = self.clone();
            let name = name.to_string();
            registry.register(name.clone(), move || -> Arc<dyn Task> {
                Arc::new(ScriptedTask {
                    name: name.clone(),
                    script: script.clone(),
                })
            });
        }
        registry
    }

    fn behaviour(&self, task: &str) -> Behaviour {
        self.state
            .lock()
            .unwrap()
            .behaviours
            .get(task)
            .copied()
            .unwrap_or(Behaviour::Succeed)
    }
}

impl Default for ScriptedTasks {
    fn default() -> Self {
        Self::new()
    }
}

struct ScriptedTask {
    name: String,
    script: ScriptedTasks,
}

impl Task for ScriptedTask {
    fn exec<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            {
                let mut state = self.script.state.lock().unwrap();
                state
                    .executions
                    .push((self.name.clone(), ctx.sequence_number()));
                state.contexts.push(ctx.clone());
            }

            match self.script.behaviour(&self.name) {
                Behaviour::Succeed => Ok(()),
                Behaviour::Fail => anyhow::bail!("scripted failure of {}", self.name),
                Behaviour::Block => {
                    let mut released = self.script.released.subscribe();
                    let _ = released.wait_for(|r| *r).await;
                    Ok(())
                }
            }
        })
    }

    fn dependencies(&self, _sequence_number: SequenceNumber) -> Vec<Arc<dyn Dependency>> {
        self.script
            .state
            .lock()
            .unwrap()
            .dependencies
            .get(&self.name)
            .cloned()
            .unwrap_or_default()
    }
}

/// Iteration generator whose value tests move by hand.
#[derive(Debug, Clone, Default)]
pub struct FixedIteration {
    current: Arc<AtomicI64>,
}

impl FixedIteration {
    pub fn new(current: SequenceNumber) -> Self {
        Self {
            current: Arc::new(AtomicI64::new(current)),
        }
    }

    pub fn set(&self, current: SequenceNumber) {
        self.current.store(current, Ordering::SeqCst);
    }
}

impl IterationGenerator for FixedIteration {
    fn current_iteration_number(&self) -> Result<SequenceNumber> {
        Ok(self.current.load(Ordering::SeqCst))
    }
}
