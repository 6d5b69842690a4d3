// src/dag/scheduler_step.rs

//! Result type returned by manual scheduler steps.

use crate::dag::ScheduledTask;
use crate::engine::TaskName;

/// Rich result of a single scheduler step, used in tests that drive the
/// scheduler without the async runtime.
#[derive(Debug, Clone)]
pub struct SchedulerStep {
    /// Tasks that became ready and were marked `Running`.
    pub newly_scheduled: Vec<ScheduledTask>,

    /// Tasks withheld by this step because an upstream task failed.
    pub newly_withheld: Vec<TaskName>,

    /// Whether this step moved every task into a terminal state.
    pub run_just_finished: bool,
}
