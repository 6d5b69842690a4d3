// src/dag/state_manager.rs

//! Per-run state transitions for tasks in the scheduler.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::DependencyGraph;
use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo};
use crate::engine::TaskName;

/// Manages state transitions for tasks.
pub struct StateManager<'a> {
    graph: &'a DependencyGraph,
    tasks: &'a mut HashMap<TaskName, TaskInfo>,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a DependencyGraph, tasks: &'a mut HashMap<TaskName, TaskInfo>) -> Self {
        Self { graph, tasks }
    }

    /// Whether every graph predecessor of the task has completed.
    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        let ro = ReadOnlyStateManager::new(self.tasks);
        ro.deps_satisfied_for_info(info)
    }

    /// Mark every pending dependent (transitively) of `failed_task` as
    /// `Withheld`.
    ///
    /// Returns the names newly withheld; the failed task itself is not
    /// included.
    pub fn mark_dependents_withheld(&mut self, failed_task: &str) -> Vec<TaskName> {
        let mut stack: Vec<TaskName> = self.graph.dependents_of(failed_task);
        let mut newly_withheld = Vec::new();

        while let Some(name) = stack.pop() {
            if let Some(info) = self.tasks.get_mut(&name) {
                match info.run_state {
                    Some(RunState::Pending) => {
                        info.run_state = Some(RunState::Withheld);
                        debug!(
                            task = %info.name,
                            upstream = %failed_task,
                            "withholding dependent due to upstream failure"
                        );
                        newly_withheld.push(info.name.clone());
                        stack.extend(self.graph.dependents_of(&name));
                    }
                    Some(RunState::Running) => {
                        // Cannot happen for a dependent of an unfinished task.
                        warn!(task = %info.name, "dependent already running");
                    }
                    _ => {}
                }
            }
        }

        newly_withheld
    }

    /// Mark every still-pending task as `Withheld`.
    pub fn withhold_all_pending(&mut self) -> Vec<TaskName> {
        let mut withheld = Vec::new();
        for info in self.tasks.values_mut() {
            if info.run_state == Some(RunState::Pending) {
                info.run_state = Some(RunState::Withheld);
                withheld.push(info.name.clone());
            }
        }
        withheld
    }

    /// Collect tasks that are `Pending` with every predecessor completed,
    /// mark them `Running`, and return them as `ScheduledTask`s.
    pub fn collect_new_ready_tasks(&mut self) -> Vec<ScheduledTask> {
        let candidates: Vec<TaskName> = self
            .tasks
            .values()
            .filter(|info| {
                info.run_state == Some(RunState::Pending) && self.deps_satisfied_for_info(info)
            })
            .map(|info| info.name.clone())
            .collect();

        let mut ready = Vec::with_capacity(candidates.len());
        for name in candidates {
            if let Some(info) = self.tasks.get_mut(&name) {
                info!(task = %info.name, "dependencies satisfied; scheduling task");
                info.run_state = Some(RunState::Running);
                ready.push(ScheduledTask::from_task_info(info));
            }
        }

        ready
    }
}

/// Read-only view for checking dependency satisfaction through a shared
/// reference to the tasks map.
pub struct ReadOnlyStateManager<'a> {
    tasks: &'a HashMap<TaskName, TaskInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(tasks: &'a HashMap<TaskName, TaskInfo>) -> Self {
        Self { tasks }
    }

    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        info.deps.iter().all(|dep_name| match self.tasks.get(dep_name) {
            Some(dep) => dep.run_state == Some(RunState::Completed),
            None => {
                warn!(
                    task = %info.name,
                    dep = %dep_name,
                    "dependency missing from tasks map"
                );
                false
            }
        })
    }
}
