// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod grid;
pub mod logging;
pub mod perf;
pub mod report;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::{
    DependencyGraph, NameGlobFilter, RunSummary, Scheduler, TaskFilter, TaskNode, assemble,
    filter_tree_from,
};
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent};
use crate::exec::PoolExecutorBackend;
use crate::grid::{
    DummyBackend, FinishSummary, GridBackend, GridRunner, GridSettings, LsfBackend, SgeBackend,
    SlurmBackend,
};
use crate::perf::{HistoryPredictor, PerformancePredictor, StaticPredictor};
use crate::report::{LogReporter, Reporter};
use crate::types::BackendKind;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - exclusion filtering and graph assembly
/// - the backend selected in `[config]`
/// - scheduler / runtime / worker pool
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<RunSummary> {
    let mut cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    apply_overrides(&mut cfg, &args);

    let (graph, tasks) = build_pipeline(&cfg, &args.exclude)?;
    let predictor = build_predictor(&cfg)?;

    if args.dry_run {
        print_dry_run(&cfg, &graph, &tasks, predictor.as_ref());
        return Ok(RunSummary::default());
    }

    let settings = grid_settings(&cfg);
    let reporter: Arc<dyn Reporter> = Arc::new(LogReporter);
    let workers = cfg.config.threads;

    let (summary, _usage) = match cfg.config.backend {
        BackendKind::Dummy => {
            run_pipeline(DummyBackend::new(), settings, graph, predictor, reporter, workers).await?
        }
        BackendKind::Slurm => {
            run_pipeline(SlurmBackend::new(), settings, graph, predictor, reporter, workers).await?
        }
        BackendKind::Lsf => {
            run_pipeline(LsfBackend::new(), settings, graph, predictor, reporter, workers).await?
        }
        BackendKind::Sge => {
            run_pipeline(SgeBackend::new(), settings, graph, predictor, reporter, workers).await?
        }
    };

    Ok(summary)
}

/// Command-line values win over the file.
pub fn apply_overrides(cfg: &mut ConfigFile, args: &CliArgs) {
    if let Some(backend) = args.backend {
        cfg.config.backend = backend;
    }
    if let Some(threads) = args.threads {
        cfg.config.threads = threads as usize;
    }
    if let Some(partition) = &args.partition {
        cfg.config.partition = partition.clone();
    }
}

/// Apply `exclude` globs to the configured tasks and assemble what is left.
///
/// Excluding a task also drops every task downstream of it.
pub fn build_pipeline(
    cfg: &ConfigFile,
    exclude: &[String],
) -> crate::errors::Result<(DependencyGraph, Vec<TaskNode>)> {
    let descriptors = cfg.descriptors();
    let total = descriptors.len();

    let kept = if exclude.is_empty() {
        descriptors
            .into_iter()
            .map(|d| d.normalize(&cfg.base_dir))
            .collect()
    } else {
        let filter = NameGlobFilter::new(exclude)?;
        let filters: [&dyn TaskFilter; 1] = [&filter];
        filter_tree_from(&cfg.base_dir, descriptors, &filters)
    };

    if kept.len() < total {
        info!(
            excluded = total - kept.len(),
            remaining = kept.len(),
            "excluded tasks from the run"
        );
    }

    let nodes = kept
        .into_iter()
        .map(|d| d.into_task_node(&cfg.base_dir))
        .collect();
    assemble(nodes)
}

/// History-backed when `[config].performance_file` is set, defaults otherwise.
pub fn build_predictor(cfg: &ConfigFile) -> crate::errors::Result<Box<dyn PerformancePredictor>> {
    let fallback = StaticPredictor::new(cfg.default_request());
    match cfg.performance_path() {
        Some(path) => {
            debug!(path = %path.display(), "using recorded task performance");
            Ok(Box::new(HistoryPredictor::load(path, fallback)?))
        }
        None => Ok(Box::new(fallback)),
    }
}

pub fn grid_settings(cfg: &ConfigFile) -> GridSettings {
    GridSettings {
        partition: cfg.config.partition.clone(),
        tmpdir: cfg.tmpdir(),
        extra_args: cfg.config.extra_grid_args.clone(),
        max_attempts: cfg.config.max_attempts,
        ..GridSettings::default()
    }
}

/// Run an assembled graph to completion on `backend`, then collect usage.
///
/// Returns once every task is terminal. A Ctrl-C stops new tasks from being
/// released; jobs already submitted are waited for.
pub async fn run_pipeline<B>(
    backend: B,
    settings: GridSettings,
    graph: DependencyGraph,
    predictor: Box<dyn PerformancePredictor>,
    reporter: Arc<dyn Reporter>,
    workers: usize,
) -> Result<(RunSummary, FinishSummary)>
where
    B: GridBackend + 'static,
{
    let runner = Arc::new(GridRunner::new(backend, settings, predictor, reporter));
    runner
        .prepare()
        .await
        .with_context(|| format!("preparing the {} backend", runner.backend().name()))?;

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = PoolExecutorBackend::new(Arc::clone(&runner), workers, rt_tx.clone());

    // Ctrl-C → stop releasing tasks.
    let ctrl_c = {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        })
    };
    drop(rt_tx);

    let core = CoreRuntime::new(Scheduler::new(graph));
    let runtime = Runtime::new(core, rt_rx, executor);
    let result = runtime.run().await;
    ctrl_c.abort();
    let summary = result?;

    let usage = runner.finish().await;
    log_summary(&summary, &usage);
    Ok((summary, usage))
}

fn log_summary(summary: &RunSummary, usage: &FinishSummary) {
    info!(
        completed = summary.completed.len(),
        failed = summary.failed.len(),
        withheld = summary.withheld.len(),
        jobs = usage.jobs,
        "run finished"
    );
    for (task, reason) in &summary.failed {
        warn!(task = %task, error = %reason, "failed");
    }
    if !summary.withheld.is_empty() {
        warn!(tasks = ?summary.withheld, "not run because an upstream task failed");
    }
}

/// Print tasks, their dependencies and predicted requests.
fn print_dry_run(
    cfg: &ConfigFile,
    graph: &DependencyGraph,
    tasks: &[TaskNode],
    predictor: &dyn PerformancePredictor,
) {
    println!("gridrun dry-run");
    println!("  config.backend = {}", cfg.config.backend);
    if !cfg.config.partition.is_empty() {
        println!("  config.partition = {}", cfg.config.partition);
    }
    println!("  config.threads = {}", cfg.config.threads);
    println!("  config.max_attempts = {}", cfg.config.max_attempts);
    println!();

    println!("tasks ({}):", tasks.len());
    for task in tasks {
        let request = predictor.predict(task).clamped();
        println!("  - {}", task.name());
        match task.action() {
            Some(action) => println!("      cmd: {}", action.command),
            None => println!("      cmd: (none)"),
        }
        let after = graph.dependencies_of(task.name());
        if !after.is_empty() {
            println!("      after: {:?}", after);
        }
        println!(
            "      request: mem={}MB time={}min threads={}",
            request.memory_mb, request.time_minutes, request.threads
        );
    }

    debug!("dry-run complete (no execution)");
}
