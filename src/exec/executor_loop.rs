// src/exec/executor_loop.rs

//! Fixed-size worker pool executing scheduled tasks.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::exec::task_runner::run_task;
use crate::grid::{GridBackend, GridRunner};

/// Spawn `workers` workers sharing one task queue.
///
/// Each worker takes one task at a time and holds it for the whole
/// submit/wait lifetime of its job, so at most `workers` jobs are in flight.
/// The queue is unbounded; dispatching never waits on the workers.
pub fn spawn_worker_pool<B>(
    runner: Arc<GridRunner<B>>,
    workers: usize,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> mpsc::UnboundedSender<ScheduledTask>
where
    B: GridBackend + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<ScheduledTask>();
    let rx = Arc::new(Mutex::new(rx));
    let workers = workers.max(1);

    info!(workers, "starting worker pool");
    for worker in 0..workers {
        let rx = Arc::clone(&rx);
        let runner = Arc::clone(&runner);
        let runtime_tx = runtime_tx.clone();

        tokio::spawn(async move {
            loop {
                let next = rx.lock().await.recv().await;
                match next {
                    Some(task) => run_task(&runner, task, &runtime_tx, worker).await,
                    None => break,
                }
            }
            debug!(worker, "worker finished (queue closed)");
        });
    }

    tx
}
