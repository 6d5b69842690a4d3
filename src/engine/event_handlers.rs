// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::{info, warn};

use crate::dag::{ScheduledTask, Scheduler};
use crate::engine::{TaskName, TaskOutcome};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the worker pool.
    DispatchTasks(Vec<ScheduledTask>),
    /// Every task is terminal; the runtime can stop.
    RequestExit,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Start the run: dispatch every task with nothing to wait for.
pub fn handle_start(scheduler: &mut Scheduler) -> CoreStep {
    let step = scheduler.step_start();
    let mut commands = Vec::new();

    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }

    finish_step(commands, step.run_just_finished)
}

/// Handle a task completion event.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    task: TaskName,
    outcome: TaskOutcome,
) -> CoreStep {
    let step = scheduler.step_completion(&task, outcome);
    let mut commands = Vec::new();

    if !step.newly_withheld.is_empty() {
        warn!(
            task = %task,
            withheld = ?step.newly_withheld,
            "withholding dependents of failed task"
        );
    }
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }

    finish_step(commands, step.run_just_finished)
}

/// Handle a shutdown request: nothing new is released, tasks in flight are
/// waited for.
pub fn handle_shutdown(scheduler: &mut Scheduler) -> CoreStep {
    let withheld = scheduler.withhold_pending();
    info!(
        withheld = withheld.len(),
        "shutdown requested; waiting for running tasks"
    );
    finish_step(Vec::new(), scheduler.is_finished())
}

fn finish_step(mut commands: Vec<CoreCommand>, finished: bool) -> CoreStep {
    if finished {
        commands.push(CoreCommand::RequestExit);
    }
    CoreStep {
        commands,
        keep_running: !finished,
    }
}
