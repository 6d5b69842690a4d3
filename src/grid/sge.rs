// src/grid/sge.rs

//! SGE backend: `qsub -sync y` for submission, `qacct` for accounting.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::dag::TaskNode;
use crate::errors::{GridError, Result};
use crate::grid::backend::{
    BoxFuture, FailureAction, GridBackend, JobUsage, Submission, SubmitRequest,
};
use crate::grid::opts::{push_extra, shell_quote};
use crate::grid::shell;

static JOB_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Your job (\d+) ").unwrap());

/// Submits through `qsub` into a parallel environment that keeps all slots
/// of a job on one host.
#[derive(Debug, Default)]
pub struct SgeBackend {
    parallel_env: OnceCell<String>,
}

impl SgeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `name` instead of discovering a parallel environment.
    pub fn with_parallel_env(name: impl Into<String>) -> Self {
        Self {
            parallel_env: OnceCell::new_with(Some(name.into())),
        }
    }

    /// The discovered (or configured) parallel environment, looked up once.
    pub async fn parallel_env(&self) -> Result<&str> {
        let name = self
            .parallel_env
            .get_or_try_init(find_suitable_pe)
            .await?;
        Ok(name.as_str())
    }

    /// The `qsub` command that runs `script` with `request`. SGE applies the
    /// memory limit per slot, so the request is divided by the thread count.
    pub fn command_line(
        script: &str,
        pe: &str,
        stdout_file: &str,
        stderr_file: &str,
        request: &SubmitRequest,
    ) -> String {
        let threads = request.threads.max(1);
        let mem_per_slot = (request.mem_mb / threads).max(1);

        let mut cmd = format!(
            "qsub -R y -b y -sync y -pe {pe} {threads} -cwd -l 'm_mem_free={mem_per_slot}M'"
        );
        if !request.partition.is_empty() {
            cmd.push_str(&format!(" -q {}", request.partition));
        }
        cmd.push_str(&format!(" -V -o {stdout_file} -e {stderr_file}"));
        push_extra(&mut cmd, &request.extra_args);
        cmd.push_str(&format!(" {script} -r"));
        cmd
    }

    pub fn parse_job_id(stdout: &str) -> Result<String> {
        JOB_ID
            .captures(stdout)
            .map(|c| c[1].to_string())
            .ok_or_else(|| GridError::ParseError("no job ID in qsub output".to_string()))
    }

    /// Parse `qacct -j <id>` output. Only jobs with `failed 0` and
    /// `exit_status 0` count.
    pub fn parse_qacct(job_id: &str, output: &str) -> Option<JobUsage> {
        let fields: HashMap<&str, &str> = output
            .lines()
            .filter_map(|line| {
                let mut kv = line.splitn(2, char::is_whitespace);
                let key = kv.next()?.trim();
                let value = kv.next()?.trim();
                (!key.is_empty()).then_some((key, value))
            })
            .collect();

        let first_word = |key: &str| fields.get(key).and_then(|v| v.split_whitespace().next());
        if first_word("failed")? != "0" || first_word("exit_status")? != "0" {
            return None;
        }

        Some(JobUsage {
            job_id: job_id.to_string(),
            max_rss_mb: parse_memory_mb(first_word("maxvmem")?)?,
            cpu_hours: parse_seconds(first_word("cpu")?)? / 3600.0,
            wall_hours: parse_seconds(first_word("ru_wallclock")?)? / 3600.0,
        })
    }
}

/// Whether `qconf -sp` output shows `allocation_rule $pe_slots`.
pub fn allocates_pe_slots(pe_description: &str) -> bool {
    pe_description
        .lines()
        .any(|line| line.split_whitespace().eq(["allocation_rule", "$pe_slots"]))
}

async fn find_suitable_pe() -> Result<String> {
    let list = shell::run("qconf -spl").await?;
    let names: Vec<&str> = list.stdout.split_whitespace().collect();
    if !list.succeeded() || names.is_empty() {
        return Err(GridError::Environment(
            "unable to find any SGE parallel environment names; make sure the SGE \
             tools (qconf) are installed, this host can reach the cluster, and \
             parallel environments are enabled"
                .to_string(),
        ));
    }

    for name in names {
        let desc = shell::run(&format!("qconf -sp {}", shell_quote(name))).await?;
        if desc.succeeded() && allocates_pe_slots(&desc.stdout) {
            info!(pe = %name, "using SGE parallel environment");
            return Ok(name.to_string());
        }
        debug!(pe = %name, "parallel environment does not allocate $pe_slots");
    }

    Err(GridError::Environment(
        "unable to find a suitable SGE parallel environment; ask your system \
         administrator for one with `allocation_rule` set to `$pe_slots`"
            .to_string(),
    ))
}

/// `maxvmem` in MB. Bare numbers are bytes.
fn parse_memory_mb(s: &str) -> Option<f64> {
    let (num, factor) = match s.chars().last()? {
        'B' | 'b' => (&s[..s.len() - 1], 1.0 / (1024.0 * 1024.0)),
        'K' | 'k' => (&s[..s.len() - 1], 1.0 / 1024.0),
        'M' | 'm' => (&s[..s.len() - 1], 1.0),
        'G' | 'g' => (&s[..s.len() - 1], 1024.0),
        'T' | 't' => (&s[..s.len() - 1], 1024.0 * 1024.0),
        _ => (s, 1.0 / (1024.0 * 1024.0)),
    };
    num.parse::<f64>().ok().map(|n| n * factor)
}

/// `"12.5"` or `"12.5s"` -> `12.5`.
fn parse_seconds(s: &str) -> Option<f64> {
    s.trim_end_matches('s').parse().ok()
}

impl GridBackend for SgeBackend {
    fn name(&self) -> &'static str {
        "sge"
    }

    fn prepare(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.parallel_env().await?;
            Ok(())
        })
    }

    fn communicate<'a>(
        &'a self,
        task: &'a TaskNode,
        request: &'a SubmitRequest,
    ) -> BoxFuture<'a, Result<Submission>> {
        Box::pin(async move {
            let pe = self.parallel_env().await?;
            let script = task.submission_script(&request.tmpdir)?;
            let out_path = shell::job_output_path(&request.tmpdir, ".out")?;
            let err_path = shell::job_output_path(&request.tmpdir, ".err")?;

            let cmd = Self::command_line(
                &shell_quote(&script.to_string_lossy()),
                pe,
                &shell_quote(&out_path.to_string_lossy()),
                &shell_quote(&err_path.to_string_lossy()),
                request,
            );

            let mut sub = shell::run(&cmd).await?;
            let mut job_output = shell::read_job_output(&out_path).await;
            job_output.push_str(&shell::read_job_output(&err_path).await);
            sub.job_output = job_output;
            Ok(sub)
        })
    }

    fn find_job_id(&self, submission: &Submission) -> Result<String> {
        Self::parse_job_id(&submission.stdout)
    }

    fn job_stats<'a>(&'a self, job_ids: &'a [String]) -> BoxFuture<'a, Result<Vec<JobUsage>>> {
        Box::pin(async move {
            let mut rows = Vec::with_capacity(job_ids.len());
            for id in job_ids {
                let sub = shell::run(&format!("qacct -j {}", shell_quote(id))).await?;
                match Self::parse_qacct(id, &sub.stdout) {
                    Some(row) => rows.push(row),
                    None => debug!(job_id = %id, "no usable qacct record"),
                }
            }
            rows.sort_by(|a, b| a.job_id.cmp(&b.job_id));
            Ok(rows)
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
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn memory_is_split_across_slots() {
        let req = SubmitRequest {
            partition: "all.q".into(),
            mem_mb: 8000,
            time_min: 60,
            threads: 4,
            tmpdir: PathBuf::from("/tmp"),
            extra_args: "-P proj".into(),
        };
        assert_eq!(
            SgeBackend::command_line("/tmp/s.sh", "smp", "/tmp/o", "/tmp/e", &req),
            "qsub -R y -b y -sync y -pe smp 4 -cwd -l 'm_mem_free=2000M' -q all.q -V \
             -o /tmp/o -e /tmp/e -P proj /tmp/s.sh -r"
        );

        let tiny = SubmitRequest {
            mem_mb: 2,
            threads: 8,
            ..req
        };
        assert!(
            SgeBackend::command_line("s", "smp", "o", "e", &tiny).contains("m_mem_free=1M")
        );
    }

    #[test]
    fn job_id_comes_from_stdout() {
        let out = "Your job 91011 (\"gridrun-abc.sh\") has been submitted\n\
                   Job 91011 exited with exit code 0.\n";
        assert_eq!(SgeBackend::parse_job_id(out).unwrap(), "91011");
        assert!(SgeBackend::parse_job_id("Your job").is_err());
    }

    #[test]
    fn pe_slots_rule_is_detected() {
        let smp = "pe_name            smp\nslots              999\nallocation_rule    $pe_slots\n";
        let mpi = "pe_name            mpi\nallocation_rule    $fill_up\n";
        assert!(allocates_pe_slots(smp));
        assert!(!allocates_pe_slots(mpi));
    }

    #[test]
    fn qacct_record_is_parsed() {
        let out = "==============================================================\n\
                   qname        all.q\n\
                   jobnumber    42\n\
                   failed       0    \n\
                   exit_status  0\n\
                   ru_wallclock 36s\n\
                   cpu          7.200s\n\
                   maxvmem      1.500G\n";
        let row = SgeBackend::parse_qacct("42", out).unwrap();
        assert_eq!(row.max_rss_mb, 1536.0);
        assert_eq!(row.wall_hours, 0.01);
        assert_eq!(row.cpu_hours, 7.2 / 3600.0);
    }

    #[test]
    fn failed_or_unknown_jobs_have_no_usage() {
        let failed = "failed       100 : assumedly after job\nexit_status  137\n\
                      ru_wallclock 1\ncpu 1\nmaxvmem 1M\n";
        assert!(SgeBackend::parse_qacct("1", failed).is_none());
        assert!(SgeBackend::parse_qacct("1", "error: job id 1 not found\n").is_none());
    }

    #[tokio::test]
    async fn configured_parallel_env_skips_discovery() {
        let b = SgeBackend::with_parallel_env("smp");
        assert_eq!(b.parallel_env().await.unwrap(), "smp");
        b.prepare().await.unwrap();
    }
}
