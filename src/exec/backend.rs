// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! production worker pool in [`executor_loop`](super::executor_loop).
//!
//! - `PoolExecutorBackend` is the implementation used by `gridrun`. It
//!   forwards scheduled tasks to a fixed pool of workers, each running one
//!   task at a time through a [`GridRunner`].
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were scheduled and directly emits `TaskCompleted` events.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::errors::{Error, Result};
use crate::grid::{GridBackend, GridRunner};

use super::executor_loop::spawn_worker_pool;

/// Trait abstracting how scheduled tasks are executed.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Executor backend backed by a fixed-size worker pool.
pub struct PoolExecutorBackend {
    tx: mpsc::UnboundedSender<ScheduledTask>,
}

impl PoolExecutorBackend {
    /// Start `workers` workers executing tasks through `runner` and
    /// reporting to `runtime_tx`.
    pub fn new<B>(
        runner: Arc<GridRunner<B>>,
        workers: usize,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
    ) -> Self
    where
        B: GridBackend + 'static,
    {
        let tx = spawn_worker_pool(runner, workers, runtime_tx);
        Self { tx }
    }
}

impl ExecutorBackend for PoolExecutorBackend {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();

        Box::pin(async move {
            for task in tasks {
                tx.send(task)
                    .map_err(|e| Error::msg(format!("worker pool is gone: {e}")))?;
            }
            Ok(())
        })
    }
}
