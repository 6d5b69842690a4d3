// src/grid/dummy.rs

//! Local backend: runs every job on this machine under `/usr/bin/time`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{LazyLock, Mutex};

use regex::Regex;
use tracing::debug;

use crate::dag::TaskNode;
use crate::errors::{GridError, Result};
use crate::grid::backend::{
    BoxFuture, FailureAction, GridBackend, JobUsage, Submission, SubmitRequest,
};
use crate::grid::opts::shell_quote;
use crate::grid::shell;

const TIME_FORMAT: &str = "TASK_PERFORMANCE %e %M %S %U";

static PERF_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"TASK_PERFORMANCE ([\d.]+) ([\d.]+) ([\d.]+) ([\d.]+)").unwrap()
});

/// Runs jobs locally and reads their usage from GNU `time`.
///
/// Job IDs come from a counter starting at 1. Usage is parsed when the job
/// ID is assigned and served back from memory by `job_stats`. Every failure
/// is fatal.
pub struct DummyBackend {
    counter: AtomicU64,
    usage: Mutex<HashMap<String, JobUsage>>,
}

impl DummyBackend {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
            usage: Mutex::new(HashMap::new()),
        }
    }

    /// The command that runs `script`.
    pub fn command_line(script: &str) -> String {
        format!("/usr/bin/time -f {} {script} -r", shell_quote(TIME_FORMAT))
    }

    /// Parse the `TASK_PERFORMANCE` line written by `time` into usage for
    /// `job_id`.
    pub fn parse_performance(&self, job_id: &str, stderr: &str) -> Result<JobUsage> {
        let caps = PERF_LINE.captures(stderr).ok_or_else(|| {
            GridError::ParseError("no TASK_PERFORMANCE line in job stderr".to_string())
        })?;

        let field = |i: usize| -> Result<f64> {
            caps[i]
                .parse::<f64>()
                .map_err(|e| GridError::ParseError(format!("bad TASK_PERFORMANCE field: {e}")))
        };
        let (elapsed, max_kb, sys, user) = (field(1)?, field(2)?, field(3)?, field(4)?);

        Ok(JobUsage {
            job_id: job_id.to_string(),
            max_rss_mb: max_kb / 1024.0,
            cpu_hours: (sys + user) / 3600.0,
            wall_hours: elapsed / 3600.0,
        })
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GridBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "dummy"
    }

    fn communicate<'a>(
        &'a self,
        task: &'a TaskNode,
        request: &'a SubmitRequest,
    ) -> BoxFuture<'a, Result<Submission>> {
        Box::pin(async move {
            let script = task.submission_script(&request.tmpdir)?;
            let cmd = Self::command_line(&shell_quote(&script.to_string_lossy()));
            shell::run(&cmd).await
        })
    }

    fn find_job_id(&self, submission: &Submission) -> Result<String> {
        let id = self.counter.fetch_add(1, Ordering::SeqCst).to_string();
        let usage = self.parse_performance(&id, &submission.stderr)?;
        debug!(job_id = %id, max_rss_mb = usage.max_rss_mb, "recorded local job usage");
        self.usage
            .lock()
            .map_err(|_| anyhow::anyhow!("usage table lock poisoned"))?
            .insert(id.clone(), usage);
        Ok(id)
    }

    fn job_stats<'a>(&'a self, job_ids: &'a [String]) -> BoxFuture<'a, Result<Vec<JobUsage>>> {
        Box::pin(async move {
            let table = self
                .usage
                .lock()
                .map_err(|_| anyhow::anyhow!("usage table lock poisoned"))?;
            Ok(job_ids
                .iter()
                .filter_map(|id| table.get(id).cloned())
                .collect())
        })
    }

    fn handle_failure(
        &self,
        submission: &Submission,
        _attempt: u32,
        _mem_mb: u64,
        _time_min: u64,
    ) -> FailureAction {
        FailureAction::Fatal(submission.to_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wraps_script_in_time() {
        assert_eq!(
            DummyBackend::command_line("/tmp/x.sh"),
            "/usr/bin/time -f 'TASK_PERFORMANCE %e %M %S %U' /tmp/x.sh -r"
        );
    }

    #[test]
    fn performance_line_is_converted_to_mb_and_hours() {
        let b = DummyBackend::new();
        let u = b
            .parse_performance("7", "some noise\nTASK_PERFORMANCE 36.00 2048 1.50 5.70\n")
            .unwrap();
        assert_eq!(u.job_id, "7");
        assert_eq!(u.max_rss_mb, 2.0);
        assert!((u.cpu_hours - 7.2 / 3600.0).abs() < 1e-12);
        assert_eq!(u.wall_hours, 0.01);
    }

    #[test]
    fn job_ids_count_up_and_usage_is_served_back() {
        let b = DummyBackend::new();
        let sub = Submission {
            stderr: "TASK_PERFORMANCE 1 1024 0 0".into(),
            ..Submission::default()
        };
        assert_eq!(b.find_job_id(&sub).unwrap(), "1");
        assert_eq!(b.find_job_id(&sub).unwrap(), "2");

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let ids = vec!["2".to_string(), "99".to_string()];
        let rows = rt.block_on(b.job_stats(&ids)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].job_id, "2");
    }

    #[test]
    fn missing_performance_line_is_a_parse_error() {
        let b = DummyBackend::new();
        let err = b.find_job_id(&Submission::default()).unwrap_err();
        assert!(matches!(err, GridError::ParseError(_)));
    }

    #[test]
    fn every_failure_is_fatal() {
        let b = DummyBackend::new();
        let sub = Submission {
            command: "x".into(),
            return_code: 1,
            ..Submission::default()
        };
        assert!(matches!(
            b.handle_failure(&sub, 1, 10, 10),
            FailureAction::Fatal(GridError::JobFailed { code: 1, .. })
        ));
    }

    #[tokio::test]
    #[ignore = "needs GNU time at /usr/bin/time"]
    async fn runs_a_real_job() {
        use crate::dag::TaskAction;

        let dir = tempfile::tempdir().unwrap();
        let b = DummyBackend::new();
        let task = TaskNode::new("echo", Some(TaskAction::shell("echo hi")), [], []);
        let req = SubmitRequest {
            partition: String::new(),
            mem_mb: 1,
            time_min: 1,
            threads: 1,
            tmpdir: dir.path().to_path_buf(),
            extra_args: String::new(),
        };
        let sub = b.communicate(&task, &req).await.unwrap();
        assert!(sub.succeeded(), "{sub:?}");
        assert_eq!(sub.stdout.trim(), "hi");
        assert_eq!(b.find_job_id(&sub).unwrap(), "1");
    }
}
