// src/exec/mod.rs

//! Task execution layer.
//!
//! Runs the tasks the scheduler releases on a fixed pool of workers, each
//! handing its task to a [`GridRunner`](crate::grid::GridRunner), and
//! reports outcomes back to the orchestration runtime via `RuntimeEvent`s.
//!
//! - [`backend`] defines the `ExecutorBackend` trait and the pool-backed
//!   implementation.
//! - [`executor_loop`] spawns the workers.
//! - [`task_runner`] runs one task on a worker.

pub mod backend;
pub mod executor_loop;
pub mod task_runner;

pub use backend::{ExecutorBackend, PoolExecutorBackend};
