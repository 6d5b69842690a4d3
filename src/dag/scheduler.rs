// src/dag/scheduler.rs

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::graph::DependencyGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo, TaskRunState};
use crate::engine::{TaskName, TaskOutcome};

/// Scheduler holds the assembled graph plus mutable run state.
///
/// It is responsible for:
/// - deciding when a task is ready (every producer it waits for completed)
/// - marking tasks as completed or failed
/// - withholding the dependents of a failed task
#[derive(Debug)]
pub struct Scheduler {
    graph: DependencyGraph,
    tasks: HashMap<TaskName, TaskInfo>,
    started: bool,
}

/// Final tally of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: Vec<TaskName>,
    pub failed: Vec<(TaskName, String)>,
    pub withheld: Vec<TaskName>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.withheld.is_empty()
    }
}

impl Scheduler {
    /// Construct a scheduler over an assembled graph.
    pub fn new(graph: DependencyGraph) -> Self {
        let mut tasks = HashMap::new();
        for node in graph.tasks() {
            let deps = graph.dependencies_of(node.name());
            tasks.insert(node.name().to_string(), TaskInfo::new(node.clone(), deps));
        }

        Self {
            graph,
            tasks,
            started: false,
        }
    }

    /// Whether the run has started and every task is terminal.
    pub fn is_finished(&self) -> bool {
        self.started
            && self
                .tasks
                .values()
                .all(|info| info.run_state.is_some_and(RunState::is_terminal))
    }

    /// Read-only view of the given task's run state.
    pub fn run_state_of(&self, task: &str) -> Option<TaskRunState> {
        let info = self.tasks.get(task)?;
        Some(info.run_state.into())
    }

    /// Whether every predecessor of `task` has completed.
    ///
    /// Returns `None` if the task is unknown.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        let info = self.tasks.get(task)?;
        let mgr = ReadOnlyStateManager::new(&self.tasks);
        Some(mgr.deps_satisfied_for_info(info))
    }

    /// Mark every task pending and return those with nothing to wait for.
    pub fn start(&mut self) -> Vec<ScheduledTask> {
        self.step_start().newly_scheduled
    }

    /// Handle completion of a task with a concrete outcome.
    pub fn handle_completion(&mut self, task: &str, outcome: TaskOutcome) -> Vec<ScheduledTask> {
        self.completion_step_internal(task, outcome).newly_scheduled
    }

    /// Manual-step variant of `start` that returns a rich [`SchedulerStep`].
    pub fn step_start(&mut self) -> SchedulerStep {
        if self.started {
            warn!("scheduler: start called twice; ignoring");
            return SchedulerStep {
                newly_scheduled: Vec::new(),
                newly_withheld: Vec::new(),
                run_just_finished: false,
            };
        }
        self.started = true;

        for info in self.tasks.values_mut() {
            info.run_state = Some(RunState::Pending);
        }
        debug!(tasks = self.tasks.len(), "scheduler: starting run");

        let mut manager = StateManager::new(&self.graph, &mut self.tasks);
        let newly_scheduled = manager.collect_new_ready_tasks();

        SchedulerStep {
            newly_scheduled,
            newly_withheld: Vec::new(),
            run_just_finished: self.is_finished(),
        }
    }

    /// Manual-step variant of `handle_completion` that returns a rich
    /// [`SchedulerStep`].
    pub fn step_completion(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        self.completion_step_internal(task, outcome)
    }

    /// Stop scheduling: every task still pending becomes withheld. Tasks
    /// already running are unaffected.
    pub fn withhold_pending(&mut self) -> Vec<TaskName> {
        let mut manager = StateManager::new(&self.graph, &mut self.tasks);
        let withheld = manager.withhold_all_pending();
        if !withheld.is_empty() {
            info!(count = withheld.len(), "scheduler: withholding pending tasks");
        }
        withheld
    }

    /// Sorted tally of terminal states.
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for info in self.tasks.values() {
            match info.run_state {
                Some(RunState::Completed) => summary.completed.push(info.name.clone()),
                Some(RunState::Failed) => summary.failed.push((
                    info.name.clone(),
                    info.error.clone().unwrap_or_default(),
                )),
                Some(RunState::Withheld) => summary.withheld.push(info.name.clone()),
                _ => {}
            }
        }
        summary.completed.sort();
        summary.failed.sort();
        summary.withheld.sort();
        summary
    }

    fn completion_step_internal(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        let mut newly_scheduled = Vec::new();
        let mut newly_withheld = Vec::new();

        match self.tasks.get_mut(task) {
            Some(info) if info.run_state != Some(RunState::Running) => {
                warn!(
                    task = %info.name,
                    state = ?info.run_state,
                    "completion for task that is not running; ignoring"
                );
            }
            Some(info) => match outcome {
                TaskOutcome::Success => {
                    info.run_state = Some(RunState::Completed);
                    debug!(task = %info.name, "task completed successfully");
                    let mut manager = StateManager::new(&self.graph, &mut self.tasks);
                    newly_scheduled.extend(manager.collect_new_ready_tasks());
                }
                TaskOutcome::Failed(message) => {
                    info.run_state = Some(RunState::Failed);
                    warn!(
                        task = %info.name,
                        error = %message,
                        "task failed; withholding dependents"
                    );
                    info.error = Some(message);
                    let mut manager = StateManager::new(&self.graph, &mut self.tasks);
                    newly_withheld = manager.mark_dependents_withheld(task);
                }
            },
            None => {
                warn!(task = %task, "completion for unknown task; ignoring");
            }
        }

        let run_just_finished = self.is_finished();
        if run_just_finished {
            info!("scheduler: all tasks terminal; run finished");
        }

        SchedulerStep {
            newly_scheduled,
            newly_withheld,
            run_just_finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::graph::assemble;
    use crate::dag::node::{Artifact, TaskAction, TaskNode};

    fn task(name: &str, targets: &[&str], deps: &[&str]) -> TaskNode {
        TaskNode::new(
            name,
            Some(TaskAction::shell("true")),
            targets.iter().map(|t| Artifact::new(*t)),
            deps.iter().map(|d| Artifact::new(*d)),
        )
    }

    fn diamond() -> Scheduler {
        let (dag, _) = assemble(vec![
            task("a", &["/a"], &[]),
            task("b", &["/b"], &["/a"]),
            task("c", &["/c"], &["/a"]),
            task("d", &[], &["/b", "/c"]),
        ])
        .unwrap();
        Scheduler::new(dag)
    }

    fn names(step: &[ScheduledTask]) -> Vec<String> {
        let mut v: Vec<String> = step.iter().map(|t| t.name.clone()).collect();
        v.sort();
        v
    }

    #[test]
    fn diamond_runs_in_dependency_order() {
        let mut s = diamond();
        assert_eq!(s.run_state_of("a"), Some(TaskRunState::NotStarted));

        assert_eq!(names(&s.start()), vec!["a"]);
        assert_eq!(
            names(&s.handle_completion("a", TaskOutcome::Success)),
            vec!["b", "c"]
        );
        assert!(s.handle_completion("b", TaskOutcome::Success).is_empty());
        assert_eq!(s.deps_satisfied("d"), Some(false));

        let step = s.step_completion("c", TaskOutcome::Success);
        assert_eq!(names(&step.newly_scheduled), vec!["d"]);
        assert!(!step.run_just_finished);

        let step = s.step_completion("d", TaskOutcome::Success);
        assert!(step.run_just_finished);
        assert!(s.summary().is_success());
    }

    #[test]
    fn failure_withholds_downstream_only() {
        let mut s = diamond();
        s.start();
        s.handle_completion("a", TaskOutcome::Success);

        let step = s.step_completion("b", TaskOutcome::Failed("boom".into()));
        assert_eq!(step.newly_withheld, vec!["d".to_string()]);
        assert_eq!(s.run_state_of("c"), Some(TaskRunState::Running));

        let step = s.step_completion("c", TaskOutcome::Success);
        assert!(step.newly_scheduled.is_empty());
        assert!(step.run_just_finished);

        let summary = s.summary();
        assert_eq!(summary.completed, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(summary.failed, vec![("b".to_string(), "boom".to_string())]);
        assert_eq!(summary.withheld, vec!["d".to_string()]);
    }

    #[test]
    fn withhold_pending_leaves_running_tasks() {
        let mut s = diamond();
        s.start();
        let mut withheld = s.withhold_pending();
        withheld.sort();
        assert_eq!(withheld, vec!["b", "c", "d"]);
        assert_eq!(s.run_state_of("a"), Some(TaskRunState::Running));
        assert!(!s.is_finished());

        s.handle_completion("a", TaskOutcome::Success);
        assert!(s.is_finished());
    }

    #[test]
    fn stray_completion_is_ignored() {
        let mut s = diamond();
        s.start();
        let step = s.step_completion("d", TaskOutcome::Success);
        assert!(step.newly_scheduled.is_empty());
        assert_eq!(s.run_state_of("d"), Some(TaskRunState::Pending));
        assert!(s.step_completion("nope", TaskOutcome::Success).newly_scheduled.is_empty());
    }
}
