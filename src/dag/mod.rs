// src/dag/mod.rs

//! Task graph construction, pruning and scheduling.
//!
//! - [`node`] defines tasks and the artifacts linking them.
//! - [`graph`] assembles tasks into a dependency graph hanging off a
//!   synthetic root.
//! - [`prune`] removes tasks from a graph or from a descriptor list.
//! - [`scheduler`] contains the run state machine that decides which tasks
//!   are ready, and withholds dependents of failed tasks.
//! - [`task_info`] provides task metadata and scheduled task types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod node;
pub mod path_utils;
pub mod prune;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::{DependencyGraph, ROOT, assemble};
pub use node::{Artifact, TaskAction, TaskNode};
pub use prune::{NameGlobFilter, TaskDescriptor, TaskFilter, filter_tree, filter_tree_from, prune};
pub use scheduler::{RunSummary, Scheduler};
pub use scheduler_step::SchedulerStep;
pub use task_info::{ScheduledTask, TaskRunState};
