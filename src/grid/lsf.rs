// src/grid/lsf.rs

//! LSF backend: `bsub -K` for submission, `bjobs` for accounting.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::dag::TaskNode;
use crate::errors::{GridError, Result};
use crate::grid::backend::{
    BoxFuture, FailureAction, GridBackend, JobUsage, Submission, SubmitRequest,
};
use crate::grid::escalation::{escalate_memory, escalate_time};
use crate::grid::opts::{OptValue, cmd_opts, push_extra, shell_quote};
use crate::grid::shell;

static JOB_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Job <(\d+)>").unwrap());

const BJOBS_FORMAT: &str =
    r#"jobid cpu_used max_mem run_time exit_code exit_reason stat delimiter="|""#;

#[derive(Debug, Clone, Copy, Default)]
pub struct LsfBackend;

impl LsfBackend {
    pub fn new() -> Self {
        Self
    }

    /// The `bsub` command that runs `script` with `request`, writing the job's
    /// own output to `job_output`.
    pub fn command_line(script: &str, job_output: &str, request: &SubmitRequest) -> String {
        let rusage = format!(
            "span[hosts=1] rusage[mem={}:duration={}]",
            request.mem_mb, request.time_min
        );
        let mut opts = vec![
            ("R", OptValue::from(shell_quote(&rusage))),
            ("o", OptValue::from(job_output)),
            ("n", OptValue::from(request.threads)),
        ];
        if !request.partition.is_empty() {
            opts.push(("q", OptValue::from(request.partition.as_str())));
        }

        let mut cmd = format!("bsub -K -r {}", cmd_opts(&opts));
        push_extra(&mut cmd, &request.extra_args);
        cmd.push_str(&format!(" {script} -r"));
        cmd
    }

    pub fn parse_job_id(stdout: &str) -> Result<String> {
        JOB_ID
            .captures(stdout)
            .map(|c| c[1].to_string())
            .ok_or_else(|| GridError::ParseError("no job ID in bsub output".to_string()))
    }

    pub fn bjobs_command(job_ids: &[String]) -> String {
        format!(
            "bjobs -noheader -o {} {}",
            shell_quote(BJOBS_FORMAT),
            job_ids.join(" ")
        )
    }

    /// Parse `bjobs` rows. Only jobs in state `DONE` with no exit code and no
    /// exit reason count. Rows come back sorted by job ID.
    pub fn parse_bjobs(output: &str) -> Vec<JobUsage> {
        let mut rows: Vec<JobUsage> = output
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() {
                    return None;
                }
                let row = parse_bjobs_row(line);
                if row.is_none() {
                    debug!(line, "skipping bjobs row");
                }
                row
            })
            .collect();
        rows.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        rows
    }
}

fn parse_bjobs_row(line: &str) -> Option<JobUsage> {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    let [id, cpu, mem, run, exit_code, exit_reason, stat] = fields.as_slice() else {
        return None;
    };
    if *stat != "DONE" || *exit_code != "-" || *exit_reason != "-" {
        return None;
    }

    Some(JobUsage {
        job_id: id.to_string(),
        max_rss_mb: parse_memory_mb(mem)?,
        cpu_hours: leading_number(cpu)? / 3600.0,
        wall_hours: leading_number(run)? / 3600.0,
    })
}

/// `"12.5 second(s)"` -> `12.5`.
fn leading_number(s: &str) -> Option<f64> {
    s.split_whitespace().next()?.parse().ok()
}

/// `"35 Mbytes"` -> `35.0`. LSF prints `-` when it has no figure.
fn parse_memory_mb(s: &str) -> Option<f64> {
    if s == "-" {
        return Some(0.0);
    }
    let mut parts = s.split_whitespace();
    let value: f64 = parts.next()?.parse().ok()?;
    let factor = match parts.next()?.to_ascii_lowercase().as_str() {
        "kbytes" => 1.0 / 1024.0,
        "mbytes" => 1.0,
        "gbytes" => 1024.0,
        "tbytes" => 1024.0 * 1024.0,
        _ => return None,
    };
    Some(value * factor)
}

impl GridBackend for LsfBackend {
    fn name(&self) -> &'static str {
        "lsf"
    }

    fn communicate<'a>(
        &'a self,
        task: &'a TaskNode,
        request: &'a SubmitRequest,
    ) -> BoxFuture<'a, Result<Submission>> {
        Box::pin(async move {
            let script = task.submission_script(&request.tmpdir)?;
            let out_path = shell::job_output_path(&request.tmpdir, ".out")?;
            let cmd = Self::command_line(
                &shell_quote(&script.to_string_lossy()),
                &shell_quote(&out_path.to_string_lossy()),
                request,
            );

            let mut sub = shell::run(&cmd).await?;
            sub.job_output = shell::read_job_output(&out_path).await;
            Ok(sub)
        })
    }

    fn find_job_id(&self, submission: &Submission) -> Result<String> {
        Self::parse_job_id(&submission.stdout)
    }

    fn job_stats<'a>(&'a self, job_ids: &'a [String]) -> BoxFuture<'a, Result<Vec<JobUsage>>> {
        Box::pin(async move {
            if job_ids.is_empty() {
                return Ok(Vec::new());
            }
            // bjobs exits non-zero when some IDs have been forgotten, but
            // still prints the rows it knows.
            let sub = shell::run(&Self::bjobs_command(job_ids)).await?;
            if !sub.succeeded() && sub.stdout.trim().is_empty() {
                return Err(sub.to_error());
            }
            Ok(Self::parse_bjobs(&sub.stdout))
        })
    }

    fn handle_failure(
        &self,
        submission: &Submission,
        attempt: u32,
        mem_mb: u64,
        time_min: u64,
    ) -> FailureAction {
        let all = submission.combined();
        if all.contains("TERM_MEMLIMIT") {
            FailureAction::Retry {
                mem_mb: escalate_memory(mem_mb * 1024, attempt),
                time_min,
            }
        } else if all.contains("TERM_RUNLIMIT") {
            FailureAction::Retry {
                mem_mb,
                time_min: escalate_time(time_min, attempt),
            }
        } else {
            FailureAction::Fatal(submission.to_error())
        }
    }
}
