// src/dag/readiness.rs

//! Declared-dependency readiness for one task at one sequence number.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::status::StatusManager;
use crate::task::TaskType;
use crate::types::{Criticality, SequenceNumber, Status};

/// Outcome of evaluating a task's declared dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// A dependency has not finished yet; ask again next tick.
    Waiting { dependency: String },
    /// A HIGH-criticality dependency is in ERROR. Stays blocked until an
    /// operator clears that status.
    Blocked { dependency: String },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// Inputs shared by every readiness decision of one tick.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessCheck<'a> {
    status: &'a StatusManager,
    sequence_number: SequenceNumber,
    completion: &'a HashMap<String, bool>,
    ignore_task_complete: bool,
}

impl<'a> ReadinessCheck<'a> {
    pub fn new(
        status: &'a StatusManager,
        sequence_number: SequenceNumber,
        completion: &'a HashMap<String, bool>,
        ignore_task_complete: bool,
    ) -> Self {
        Self {
            status,
            sequence_number,
            completion,
            ignore_task_complete,
        }
    }

    /// Overwrite mode looks only at the in-memory completion map. Normal
    /// mode reads the store: ERROR on a LOW dependency is absorbed, ERROR on
    /// a HIGH dependency blocks, anything else must be SUCCESS.
    pub fn evaluate(&self, task: &str, deps: &[Arc<TaskType>]) -> Readiness {
        for dep in deps {
            if self.ignore_task_complete {
                if !self.completion.get(&dep.name).copied().unwrap_or(false) {
                    debug!(
                        task = %task,
                        dependency = %dep.name,
                        sequence_number = self.sequence_number,
                        "dependency not marked complete for this run"
                    );
                    return Readiness::Waiting {
                        dependency: dep.name.clone(),
                    };
                }
                continue;
            }

            match self.status.task_status(&dep.name, self.sequence_number) {
                Status::Success => {}
                Status::Error => {
                    if dep.criticality == Criticality::High {
                        debug!(
                            task = %task,
                            dependency = %dep.name,
                            sequence_number = self.sequence_number,
                            "blocked by HIGH-criticality dependency in ERROR"
                        );
                        return Readiness::Blocked {
                            dependency: dep.name.clone(),
                        };
                    }
                }
                _ => {
                    debug!(
                        task = %task,
                        dependency = %dep.name,
                        sequence_number = self.sequence_number,
                        "dependency not complete"
                    );
                    return Readiness::Waiting {
                        dependency: dep.name.clone(),
                    };
                }
            }
        }

        Readiness::Ready
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn dep(name: &str, criticality: Criticality) -> Arc<TaskType> {
        Arc::new(TaskType {
            name: name.to_string(),
            criticality,
            dependencies: Vec::new(),
            args: BTreeMap::new(),
        })
    }

    #[test]
    fn no_dependencies_is_ready() {
        let status = StatusManager::in_memory();
        let completion = HashMap::new();
        let check = ReadinessCheck::new(&status, 1, &completion, false);
        assert_eq!(check.evaluate("A", &[]), Readiness::Ready);
    }

    #[test]
    fn low_error_is_absorbed_high_error_blocks() {
        let status = StatusManager::in_memory();
        let completion = HashMap::new();
        status.commit_task_status("L", 10, Status::Error, true).unwrap();
        status.commit_task_status("H", 10, Status::Error, true).unwrap();
        let check = ReadinessCheck::new(&status, 10, &completion, false);

        assert!(check.evaluate("C", &[dep("L", Criticality::Low)]).is_ready());
        assert_eq!(
            check.evaluate("C", &[dep("H", Criticality::High)]),
            Readiness::Blocked {
                dependency: "H".into()
            }
        );
    }

    #[test]
    fn in_progress_dependency_waits() {
        let status = StatusManager::in_memory();
        let completion = HashMap::new();
        status
            .commit_task_status("A", 3, Status::InProgress, true)
            .unwrap();
        let check = ReadinessCheck::new(&status, 3, &completion, false);
        assert_eq!(
            check.evaluate("B", &[dep("A", Criticality::Low)]),
            Readiness::Waiting {
                dependency: "A".into()
            }
        );
    }

    #[test]
    fn overwrite_mode_ignores_the_store() {
        let status = StatusManager::in_memory();
        status.commit_task_status("A", 3, Status::Success, true).unwrap();

        let mut completion = HashMap::from([("A".to_string(), false)]);
        let deps = [dep("A", Criticality::Low)];

        assert!(!ReadinessCheck::new(&status, 3, &completion, true)
            .evaluate("B", &deps)
            .is_ready());

        completion.insert("A".into(), true);
        status.clear_task_status("A", 3).unwrap();
        assert!(ReadinessCheck::new(&status, 3, &completion, true)
            .evaluate("B", &deps)
            .is_ready());
    }
}
