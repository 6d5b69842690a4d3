// src/dag/task_info.rs

//! Task metadata and per-run state.

use crate::dag::node::TaskNode;
use crate::engine::TaskName;

/// Per-run state of a task (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Waiting on graph predecessors.
    Pending,
    /// Handed to a worker; its job is being submitted or is running.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with a fatal error.
    Failed,
    /// Never dispatched: an upstream task failed or the run was interrupted.
    Withheld,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::Withheld)
    }
}

/// Public, read-only view of a task's state.
///
/// Exposed for tests and diagnostics without leaking the internal
/// `RunState` type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    /// The run has not been started yet.
    NotStarted,
    Pending,
    Running,
    Completed,
    Failed,
    Withheld,
}

impl From<Option<RunState>> for TaskRunState {
    fn from(state: Option<RunState>) -> Self {
        match state {
            None => TaskRunState::NotStarted,
            Some(RunState::Pending) => TaskRunState::Pending,
            Some(RunState::Running) => TaskRunState::Running,
            Some(RunState::Completed) => TaskRunState::Completed,
            Some(RunState::Failed) => TaskRunState::Failed,
            Some(RunState::Withheld) => TaskRunState::Withheld,
        }
    }
}

/// Static task information derived from the graph, plus run state.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: TaskName,
    pub node: TaskNode,
    /// Direct graph predecessors, root excluded.
    pub deps: Vec<TaskName>,
    pub run_state: Option<RunState>,
    /// Terminal error message, if the task failed.
    pub error: Option<String>,
}

impl TaskInfo {
    pub fn new(node: TaskNode, deps: Vec<TaskName>) -> Self {
        Self {
            name: node.name().to_string(),
            node,
            deps,
            run_state: None,
            error: None,
        }
    }
}

/// A task the scheduler wants a worker to execute now.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub name: TaskName,
    pub node: TaskNode,
}

impl ScheduledTask {
    pub fn from_task_info(info: &TaskInfo) -> Self {
        Self {
            name: info.name.clone(),
            node: info.node.clone(),
        }
    }
}
