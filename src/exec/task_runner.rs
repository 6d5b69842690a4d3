// src/exec/task_runner.rs

//! Runs a single scheduled task on a worker.

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::grid::{GridBackend, GridRunner};

/// Execute one task through `runner` and report its outcome to the runtime.
pub async fn run_task<B: GridBackend>(
    runner: &GridRunner<B>,
    task: ScheduledTask,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    worker: usize,
) {
    debug!(task = %task.name, worker, "worker picked up task");

    let outcome = match runner.execute_task(&task.node).await {
        Ok(()) => TaskOutcome::Success,
        Err(err) => {
            error!(task = %task.name, worker, error = %err, "task execution error");
            TaskOutcome::Failed(err.to_string())
        }
    };

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            task: task.name.clone(),
            outcome,
        })
        .await
        .is_err()
    {
        debug!(task = %task.name, "runtime gone; dropping completion");
    }
}
