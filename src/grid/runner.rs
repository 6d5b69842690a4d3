// src/grid/runner.rs

//! Submit/retry engine shared by every backend.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::dag::TaskNode;
use crate::engine::TaskOutcome;
use crate::errors::{GridError, Result};
use crate::grid::backend::{FailureAction, GridBackend, JobUsage, SubmitRequest};
use crate::grid::shell::wait_for_targets;
use crate::perf::{PerformancePredictor, PerformanceSample, ResourceRequest};
use crate::report::Reporter;

/// Maximum number of job IDs passed to one `job_stats` query.
pub const STATS_BATCH: usize = 100;

/// Submission settings that do not vary per task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSettings {
    pub partition: String,
    pub tmpdir: PathBuf,
    pub extra_args: String,
    /// Submissions allowed per task, counting the first.
    pub max_attempts: u32,
    /// How often to look for a finished job's targets.
    pub settle_tries: u32,
    pub settle_interval: Duration,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            partition: String::new(),
            tmpdir: std::env::temp_dir(),
            extra_args: String::new(),
            max_attempts: 10,
            settle_tries: 3,
            settle_interval: Duration::from_secs(1),
        }
    }
}

/// What `finish` managed to collect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinishSummary {
    /// Job IDs recorded during the run.
    pub jobs: usize,
    /// `job_stats` queries issued.
    pub batches: usize,
    /// Samples handed to the predictor.
    pub samples: usize,
    /// Errors from accounting queries or saving the predictor.
    pub errors: Vec<String>,
}

/// Executes tasks as jobs on one backend, escalating resources on
/// recoverable failures, and feeds observed usage back to the predictor.
pub struct GridRunner<B> {
    backend: B,
    settings: GridSettings,
    predictor: Mutex<Box<dyn PerformancePredictor>>,
    reporter: Arc<dyn Reporter>,
    id_task_map: Mutex<BTreeMap<String, TaskNode>>,
}

impl<B: GridBackend> GridRunner<B> {
    pub fn new(
        backend: B,
        settings: GridSettings,
        predictor: Box<dyn PerformancePredictor>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            backend,
            settings,
            predictor: Mutex::new(predictor),
            reporter,
            id_task_map: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &GridSettings {
        &self.settings
    }

    /// Check the backend's environment; see [`GridBackend::prepare`].
    pub async fn prepare(&self) -> Result<()> {
        debug!(backend = self.backend.name(), "preparing backend");
        self.backend.prepare().await
    }

    /// Job IDs recorded so far, in sorted order, with their task names.
    pub async fn recorded_jobs(&self) -> Vec<(String, String)> {
        self.id_task_map
            .lock()
            .await
            .iter()
            .map(|(id, task)| (id.clone(), task.name().to_string()))
            .collect()
    }

    /// Run one task to completion.
    ///
    /// Tasks without an action complete immediately without a submission.
    /// Safe to call concurrently for distinct tasks.
    pub async fn execute_task(&self, task: &TaskNode) -> Result<()> {
        let request = self.predictor.lock().await.predict(task).clamped();
        self.reporter.execute_task(task);

        let result = if task.has_action() {
            match self.submit_with_retry(task, request).await {
                Ok(job_id) => {
                    self.id_task_map
                        .lock()
                        .await
                        .insert(job_id, task.clone());
                    Ok(())
                }
                Err(e) => Err(e),
            }
        } else {
            Ok(())
        };

        let outcome = match &result {
            Ok(()) => TaskOutcome::Success,
            Err(e) => TaskOutcome::Failed(e.to_string()),
        };
        self.reporter.task_finished(task, &outcome);
        result
    }

    async fn submit_with_retry(&self, task: &TaskNode, request: ResourceRequest) -> Result<String> {
        let backend = self.backend.name();
        let mut attempt: u32 = 1;
        let mut mem = request.memory_mb;
        let mut time = request.time_minutes;

        loop {
            let submit = SubmitRequest {
                partition: self.settings.partition.clone(),
                mem_mb: mem,
                time_min: time,
                threads: request.threads,
                tmpdir: self.settings.tmpdir.clone(),
                extra_args: self.settings.extra_args.clone(),
            };

            info!(
                task = %task.name(),
                backend,
                attempt,
                mem_mb = mem,
                time_min = time,
                threads = request.threads,
                "submitting job"
            );
            let submission = self.backend.communicate(task, &submit).await?;

            if submission.succeeded() {
                let job_id = self.backend.find_job_id(&submission)?;
                info!(task = %task.name(), backend, job_id = %job_id, "job finished");
                if !submission.job_output.is_empty() {
                    debug!(task = %task.name(), output = %submission.job_output, "job output");
                }
                wait_for_targets(task, self.settings.settle_tries, self.settings.settle_interval)
                    .await;
                return Ok(job_id);
            }

            match self
                .backend
                .handle_failure(&submission, attempt, mem, time)
            {
                FailureAction::Retry { mem_mb, time_min } => {
                    if attempt >= self.settings.max_attempts {
                        error!(
                            task = %task.name(),
                            backend,
                            attempts = attempt,
                            "giving up after repeated resource failures"
                        );
                        return Err(GridError::AttemptsExhausted {
                            task: task.name().to_string(),
                            attempts: attempt,
                            last: Box::new(submission.to_error()),
                        });
                    }
                    warn!(
                        task = %task.name(),
                        backend,
                        attempt,
                        exit_code = submission.return_code,
                        new_mem_mb = mem_mb.max(1),
                        new_time_min = time_min.max(1),
                        "job hit a resource limit; resubmitting"
                    );
                    attempt += 1;
                    mem = mem_mb.max(1);
                    time = time_min.max(1);
                }
                FailureAction::Fatal(err) => {
                    debug!(
                        task = %task.name(),
                        backend,
                        exit_code = submission.return_code,
                        "job failed"
                    );
                    return Err(err);
                }
            }
        }
    }

    /// Collect usage for every recorded job and hand it to the predictor.
    ///
    /// Job IDs are queried in sorted batches of [`STATS_BATCH`]. Failures are
    /// logged and returned in the summary; they never affect task results.
    pub async fn finish(&self) -> FinishSummary {
        let jobs: Vec<(String, TaskNode)> = self
            .id_task_map
            .lock()
            .await
            .iter()
            .map(|(id, task)| (id.clone(), task.clone()))
            .collect();

        let mut summary = FinishSummary {
            jobs: jobs.len(),
            ..FinishSummary::default()
        };
        let mut predictor = self.predictor.lock().await;

        for chunk in jobs.chunks(STATS_BATCH) {
            let ids: Vec<String> = chunk.iter().map(|(id, _)| id.clone()).collect();
            summary.batches += 1;

            match self.backend.job_stats(&ids).await {
                Ok(mut usage) => {
                    usage.sort_by(|a, b| a.job_id.cmp(&b.job_id));
                    let paired = pair_usage(chunk, &usage);
                    if paired.len() < chunk.len() {
                        debug!(
                            requested = chunk.len(),
                            returned = paired.len(),
                            "some jobs have no usage record"
                        );
                    }
                    for (task, row) in paired {
                        predictor.update(PerformanceSample::from_usage(task, row));
                        summary.samples += 1;
                    }
                }
                Err(e) => {
                    warn!(
                        backend = self.backend.name(),
                        jobs = ids.len(),
                        error = %e,
                        "failed to collect job usage"
                    );
                    summary.errors.push(e.to_string());
                }
            }
        }

        if let Err(e) = predictor.save() {
            warn!(error = %e, "failed to save performance data");
            summary.errors.push(e.to_string());
        }

        info!(
            jobs = summary.jobs,
            samples = summary.samples,
            "collected job usage"
        );
        summary
    }
}

/// Pair tasks with usage rows by job ID. Both slices must be sorted by job
/// ID; jobs without a row and rows without a job are skipped.
pub fn pair_usage<'a>(
    jobs: &'a [(String, TaskNode)],
    usage: &'a [JobUsage],
) -> Vec<(&'a TaskNode, &'a JobUsage)> {
    debug_assert!(jobs.windows(2).all(|w| w[0].0 <= w[1].0));
    debug_assert!(usage.windows(2).all(|w| w[0].job_id <= w[1].job_id));

    let mut paired = Vec::with_capacity(jobs.len().min(usage.len()));
    let (mut i, mut j) = (0, 0);
    while i < jobs.len() && j < usage.len() {
        match jobs[i].0.cmp(&usage[j].job_id) {
            std::cmp::Ordering::Equal => {
                paired.push((&jobs[i].1, &usage[j]));
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
        }
    }
    paired
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(id: &str, rss: f64) -> JobUsage {
        JobUsage {
            job_id: id.to_string(),
            max_rss_mb: rss,
            cpu_hours: 0.0,
            wall_hours: 0.0,
        }
    }

    fn job(id: &str, task: &str) -> (String, TaskNode) {
        (id.to_string(), TaskNode::new(task, None, [], []))
    }

    #[test]
    fn pairing_is_a_zip_when_nothing_is_missing() {
        let jobs = vec![job("1", "a"), job("2", "b"), job("3", "c")];
        let rows = vec![usage("1", 1.0), usage("2", 2.0), usage("3", 3.0)];
        let paired = pair_usage(&jobs, &rows);
        let names: Vec<(&str, f64)> = paired
            .iter()
            .map(|(t, u)| (t.name(), u.max_rss_mb))
            .collect();
        assert_eq!(names, vec![("a", 1.0), ("b", 2.0), ("c", 3.0)]);
    }

    #[test]
    fn pairing_skips_missing_rows_and_strays() {
        let jobs = vec![job("10", "a"), job("11", "b"), job("12", "c")];
        let rows = vec![usage("10", 1.0), usage("115", 9.0), usage("12", 3.0)];
        let paired = pair_usage(&jobs, &rows);
        let names: Vec<&str> = paired.iter().map(|(t, _)| t.name()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(paired[1].1.max_rss_mb, 3.0);
    }
}
