// src/report.rs

//! Progress reporting hooks.

use tracing::{info, warn};

use crate::dag::TaskNode;
use crate::engine::TaskOutcome;

/// Receives progress notifications from the runner.
pub trait Reporter: Send + Sync {
    /// A task is about to be executed.
    fn execute_task(&self, task: &TaskNode);

    /// A task reached a terminal outcome.
    fn task_finished(&self, _task: &TaskNode, _outcome: &TaskOutcome) {}
}

/// Reports through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn execute_task(&self, task: &TaskNode) {
        if task.has_action() {
            info!(task = %task.name(), "executing task");
        } else {
            info!(task = %task.name(), "task has no action; nothing to submit");
        }
    }

    fn task_finished(&self, task: &TaskNode, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Success => info!(task = %task.name(), "task completed"),
            TaskOutcome::Failed(reason) => {
                warn!(task = %task.name(), error = %reason, "task failed")
            }
        }
    }
}
