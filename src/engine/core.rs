// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - handing `ScheduledTask`s to the worker pool
//!
//! The core is unit tested without any Tokio, channels, filesystem, or
//! processes.

use crate::dag::{RunSummary, Scheduler, TaskRunState};
use crate::engine::RuntimeEvent;
use crate::engine::event_handlers::{
    CoreStep, handle_shutdown, handle_start, handle_task_completion,
};

/// Pure core runtime state.
///
/// It owns the DAG scheduler and has **no** channels, no Tokio types, and
/// does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    shutdown_requested: bool,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            shutdown_requested: false,
        }
    }

    /// Begin the run.
    pub fn start(&mut self) -> CoreStep {
        handle_start(&mut self.scheduler)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskCompleted { task, outcome } => {
                handle_task_completion(&mut self.scheduler, task, outcome)
            }
            RuntimeEvent::ShutdownRequested => {
                self.shutdown_requested = true;
                handle_shutdown(&mut self.scheduler)
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// Expose a task's state (for tests).
    pub fn run_state_of(&self, task: &str) -> Option<TaskRunState> {
        self.scheduler.run_state_of(task)
    }

    pub fn summary(&self) -> RunSummary {
        self.scheduler.summary()
    }
}
