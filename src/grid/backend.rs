// src/grid/backend.rs

//! Batch-system backend abstraction.
//!
//! [`GridRunner`](super::runner::GridRunner) talks to a `GridBackend` instead
//! of to `srun`/`bsub`/`qsub` directly. Each backend knows how to turn one
//! task into a blocking submission command, how to read the job ID and usage
//! numbers back out of the batch system, and which failures are worth
//! retrying with a bigger request.
//!
//! Tests provide their own implementation that never spawns a process.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::dag::TaskNode;
use crate::errors::{GridError, Result};

/// Boxed future returned by the async backend operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything a backend needs to submit one attempt of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub partition: String,
    pub mem_mb: u64,
    pub time_min: u64,
    pub threads: u64,
    /// Where submission scripts and job output files are written.
    pub tmpdir: PathBuf,
    /// Raw arguments inserted before the script path.
    pub extra_args: String,
}

/// Result of one blocking submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    /// The exact command line that was run.
    pub command: String,
    /// What the submission tool printed.
    pub stdout: String,
    pub stderr: String,
    pub return_code: i32,
    /// Output the job itself wrote, when the batch system redirects it to a
    /// file instead of relaying it through the submission tool.
    pub job_output: String,
}

impl Submission {
    pub fn succeeded(&self) -> bool {
        self.return_code == 0
    }

    /// Everything captured for this submission, for pattern matching.
    pub fn combined(&self) -> String {
        let mut all = String::with_capacity(
            self.stdout.len() + self.stderr.len() + self.job_output.len() + 2,
        );
        all.push_str(&self.stdout);
        all.push('\n');
        all.push_str(&self.stderr);
        all.push('\n');
        all.push_str(&self.job_output);
        all
    }

    /// Fatal error describing this submission.
    pub fn to_error(&self) -> GridError {
        let mut stderr = self.stderr.clone();
        if !self.job_output.is_empty() {
            stderr.push_str(&self.job_output);
        }
        GridError::job_failed(&self.command, self.return_code, &self.stdout, &stderr)
    }
}

/// What to do after a failed submission.
#[derive(Debug)]
pub enum FailureAction {
    /// Resubmit with the given (escalated) request.
    Retry { mem_mb: u64, time_min: u64 },
    /// Give up on the task.
    Fatal(GridError),
}

/// Resource usage of one finished job as reported by the batch system.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUsage {
    pub job_id: String,
    pub max_rss_mb: f64,
    pub cpu_hours: f64,
    pub wall_hours: f64,
}

/// Trait abstracting one batch system.
pub trait GridBackend: Send + Sync {
    /// Short name used in log fields.
    fn name(&self) -> &'static str;

    /// Check the environment before anything is submitted.
    fn prepare(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Submit `task` and block until the job has finished.
    ///
    /// A non-zero `return_code` in the returned [`Submission`] is a job
    /// failure; `Err` is reserved for failing to run the submission at all.
    fn communicate<'a>(
        &'a self,
        task: &'a TaskNode,
        request: &'a SubmitRequest,
    ) -> BoxFuture<'a, Result<Submission>>;

    /// Extract the job ID from a successful submission.
    fn find_job_id(&self, submission: &Submission) -> Result<String>;

    /// Usage rows for finished jobs. Rows may come back in any order, and
    /// jobs the batch system cannot (or will not) account for are omitted.
    fn job_stats<'a>(&'a self, job_ids: &'a [String]) -> BoxFuture<'a, Result<Vec<JobUsage>>>;

    /// Classify a failed submission made on attempt `attempt` (1-based) with
    /// `mem_mb`/`time_min`.
    fn handle_failure(
        &self,
        submission: &Submission,
        attempt: u32,
        mem_mb: u64,
        time_min: u64,
    ) -> FailureAction;
}
