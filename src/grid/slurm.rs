// src/grid/slurm.rs

//! Slurm backend: `srun` for submission, `sacct` for accounting.

use std::collections::BTreeMap;
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

static JOB_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"launching (\d+).(\d+) on host").unwrap());

static MEMORY_USED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"memory limit \((\d+) > \d+\)").unwrap());

static TIME_LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)due to time limit").unwrap());

const MEMORY_EXCEEDED: &str = "Exceeded job memory limit";

const SACCT_FORMAT: &str = "JobID,MaxRSS,TotalCPU,Elapsed,ExitCode,State";

#[derive(Debug, Clone, Copy, Default)]
pub struct SlurmBackend;

impl SlurmBackend {
    pub fn new() -> Self {
        Self
    }

    /// The `srun` command that runs `script` with `request`.
    pub fn command_line(script: &str, request: &SubmitRequest) -> String {
        let mut opts = vec![
            ("mem", OptValue::from(request.mem_mb)),
            ("time", OptValue::from(request.time_min)),
            ("export", OptValue::from("ALL")),
        ];
        if !request.partition.is_empty() {
            opts.push(("partition", OptValue::from(request.partition.as_str())));
        }
        opts.push(("cpus-per-task", OptValue::from(request.threads)));

        let mut cmd = format!("srun -v {}", cmd_opts(&opts));
        push_extra(&mut cmd, &request.extra_args);
        cmd.push_str(&format!(" {script} -r"));
        cmd
    }

    pub fn parse_job_id(stderr: &str) -> Result<String> {
        JOB_ID
            .captures(stderr)
            .map(|c| c[1].to_string())
            .ok_or_else(|| GridError::ParseError("no job ID in srun output".to_string()))
    }

    pub fn sacct_command(job_ids: &[String]) -> String {
        format!("sacct --format {SACCT_FORMAT} -P -j {}", job_ids.join(","))
    }

    /// Parse `sacct -P` output. Only rows in state `COMPLETED` with exit
    /// code `0:0` count; job steps (`123.batch`, `123.0`) are folded onto
    /// their job, keeping the largest resident size. Jobs whose own row is
    /// missing or unsuccessful are dropped. Rows come back sorted by job ID.
    pub fn parse_sacct(output: &str) -> Vec<JobUsage> {
        let mut jobs: BTreeMap<String, (bool, JobUsage)> = BTreeMap::new();

        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("JobID") {
                continue;
            }
            let fields: Vec<&str> = line.split('|').collect();
            if fields.len() < 6 {
                debug!(line, "skipping short sacct row");
                continue;
            }
            let (id, rss, cpu, elapsed, exit, state) =
                (fields[0], fields[1], fields[2], fields[3], fields[4], fields[5]);
            if state != "COMPLETED" || exit != "0:0" {
                continue;
            }

            let (Some(rss_mb), Some(cpu_s), Some(wall_s)) =
                (parse_memory_mb(rss), parse_duration(cpu), parse_duration(elapsed))
            else {
                debug!(line, "skipping unparseable sacct row");
                continue;
            };

            let (base, is_step) = match id.split_once('.') {
                Some((base, _)) => (base, true),
                None => (id, false),
            };
            let (seen_parent, usage) = jobs.entry(base.to_string()).or_insert_with(|| {
                (
                    false,
                    JobUsage {
                        job_id: base.to_string(),
                        max_rss_mb: 0.0,
                        cpu_hours: 0.0,
                        wall_hours: 0.0,
                    },
                )
            });
            *seen_parent |= !is_step;
            usage.max_rss_mb = usage.max_rss_mb.max(rss_mb);
            usage.cpu_hours = usage.cpu_hours.max(cpu_s / 3600.0);
            usage.wall_hours = usage.wall_hours.max(wall_s / 3600.0);
        }

        jobs.into_values()
            .filter_map(|(seen_parent, usage)| seen_parent.then_some(usage))
            .collect()
    }
}

/// `MaxRSS` value in MB. Bare numbers are bytes; empty means not reported.
fn parse_memory_mb(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return Some(0.0);
    }
    let (num, factor) = match s.chars().last()? {
        'K' | 'k' => (&s[..s.len() - 1], 1.0 / 1024.0),
        'M' | 'm' => (&s[..s.len() - 1], 1.0),
        'G' | 'g' => (&s[..s.len() - 1], 1024.0),
        'T' | 't' => (&s[..s.len() - 1], 1024.0 * 1024.0),
        _ => (s, 1.0 / (1024.0 * 1024.0)),
    };
    num.parse::<f64>().ok().map(|n| n * factor)
}

/// Slurm duration (`[D-][HH:]MM:SS[.mmm]`) in seconds.
fn parse_duration(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (days, clock) = match s.split_once('-') {
        Some((d, rest)) => (d.parse::<f64>().ok()?, rest),
        None => (0.0, s),
    };
    let parts = clock
        .split(':')
        .map(|p| p.parse::<f64>().ok())
        .collect::<Option<Vec<f64>>>()?;
    let secs = match parts.as_slice() {
        [h, m, sec] => h * 3600.0 + m * 60.0 + sec,
        [m, sec] => m * 60.0 + sec,
        [sec] => *sec,
        _ => return None,
    };
    Some(days * 86400.0 + secs)
}

impl GridBackend for SlurmBackend {
    fn name(&self) -> &'static str {
        "slurm"
    }

    fn communicate<'a>(
        &'a self,
        task: &'a TaskNode,
        request: &'a SubmitRequest,
    ) -> BoxFuture<'a, Result<Submission>> {
        Box::pin(async move {
            let script = task.submission_script(&request.tmpdir)?;
            let cmd = Self::command_line(&shell_quote(&script.to_string_lossy()), request);
            shell::run(&cmd).await
        })
    }

    fn find_job_id(&self, submission: &Submission) -> Result<String> {
        Self::parse_job_id(&submission.stderr)
    }

    fn job_stats<'a>(&'a self, job_ids: &'a [String]) -> BoxFuture<'a, Result<Vec<JobUsage>>> {
        Box::pin(async move {
            if job_ids.is_empty() {
                return Ok(Vec::new());
            }
            let sub = shell::run(&Self::sacct_command(job_ids)).await?;
            if !sub.succeeded() {
                return Err(sub.to_error());
            }
            Ok(Self::parse_sacct(&sub.stdout))
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
        let mut retry = None;

        if all.contains(MEMORY_EXCEEDED) {
            let used_kb = MEMORY_USED
                .captures(&all)
                .and_then(|c| c[1].parse::<u64>().ok())
                .unwrap_or(mem_mb * 1024);
            retry = Some((escalate_memory(used_kb, attempt), time_min));
        }
        if TIME_LIMIT.is_match(&all) {
            let mem = retry.map_or(mem_mb, |(m, _)| m);
            retry = Some((mem, escalate_time(time_min, attempt)));
        }

        match retry {
            Some((mem_mb, time_min)) => FailureAction::Retry { mem_mb, time_min },
            None => FailureAction::Fatal(submission.to_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn request() -> SubmitRequest {
        SubmitRequest {
            partition: "general".into(),
            mem_mb: 2048,
            time_min: 90,
            threads: 4,
            tmpdir: PathBuf::from("/tmp"),
            extra_args: "--qos=low".into(),
        }
    }

    #[test]
    fn command_line_has_options_then_extra_then_script() {
        assert_eq!(
            SlurmBackend::command_line("/tmp/s.sh", &request()),
            "srun -v --mem=2048 --time=90 --export=ALL --partition=general \
             --cpus-per-task=4 --qos=low /tmp/s.sh -r"
        );
    }

    #[test]
    fn job_id_comes_from_launch_line() {
        let err = "srun: jobid 123: nodes(1):`node7', cpu counts: 1(x1)\n\
                   srun: launching 123.4 on host foo, 1 tasks: 0\n";
        assert_eq!(SlurmBackend::parse_job_id(err).unwrap(), "123");
        assert!(matches!(
            SlurmBackend::parse_job_id("nothing here"),
            Err(GridError::ParseError(_))
        ));
    }

    #[test]
    fn sacct_rows_fold_steps_and_skip_failures() {
        let out = "JobID|MaxRSS|TotalCPU|Elapsed|ExitCode|State\n\
                   200||00:30.000|00:01:00|0:0|COMPLETED\n\
                   200.batch|2048K|00:30.000|00:01:00|0:0|COMPLETED\n\
                   200.0|4096K|00:10.000|00:00:40|0:0|COMPLETED\n\
                   201||01:00:00|1-00:00:00|1:0|FAILED\n\
                   202||garbage|00:00:01|0:0|COMPLETED\n\
                   203.batch|1M|00:01.000|00:00:01|0:0|COMPLETED\n";
        let rows = SlurmBackend::parse_sacct(out);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].job_id, "200");
        assert_eq!(rows[0].max_rss_mb, 4.0);
        assert_eq!(rows[0].wall_hours, 60.0 / 3600.0);
        assert_eq!(rows[0].cpu_hours, 30.0 / 3600.0);
    }

    #[test]
    fn durations_parse_in_all_shapes() {
        assert_eq!(parse_duration("00:01.500"), Some(1.5));
        assert_eq!(parse_duration("01:02:03"), Some(3723.0));
        assert_eq!(parse_duration("2-00:00:10"), Some(172_810.0));
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn memory_failure_escalates_from_used_amount() {
        let sub = Submission {
            return_code: 1,
            stderr: "slurmstepd: error: Exceeded job memory limit at some point.\n\
                     Job 5 exceeded memory limit (2048000 > 1024000), being killed"
                .into(),
            ..Submission::default()
        };
        match SlurmBackend.handle_failure(&sub, 1, 1000, 60) {
            FailureAction::Retry { mem_mb, time_min } => {
                assert_eq!(mem_mb, 2600);
                assert_eq!(time_min, 60);
            }
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[test]
    fn time_failure_escalates_time_only() {
        let sub = Submission {
            return_code: 1,
            stderr: "slurmstepd: *** JOB 9 CANCELLED AT 2020 DUE TO TIME LIMIT ***".into(),
            ..Submission::default()
        };
        match SlurmBackend.handle_failure(&sub, 10, 500, 60) {
            FailureAction::Retry { mem_mb, time_min } => {
                assert_eq!(mem_mb, 500);
                assert_eq!(time_min, 256);
            }
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[test]
    fn other_failures_are_fatal() {
        let sub = Submission {
            command: "srun ...".into(),
            return_code: 2,
            stderr: "srun: error: invalid partition".into(),
            ..Submission::default()
        };
        assert!(matches!(
            SlurmBackend.handle_failure(&sub, 1, 1, 1),
            FailureAction::Fatal(GridError::JobFailed { code: 2, .. })
        ));
    }
}
