// src/grid/shell.rs

//! Running submission and accounting commands.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use tempfile::TempPath;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::dag::TaskNode;
use crate::errors::Result;
use crate::grid::backend::Submission;

/// Run `command` through `/bin/sh -c` and wait for it, capturing both
/// streams.
pub async fn run(command: &str) -> Result<Submission> {
    debug!(cmd = %command, "running command");

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("spawning `{command}`"))?;

    let submission = Submission {
        command: command.to_string(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        return_code: output.status.code().unwrap_or(-1),
        job_output: String::new(),
    };

    debug!(
        cmd = %command,
        exit_code = submission.return_code,
        "command exited"
    );
    Ok(submission)
}

/// A fresh, empty job output file in `tmpdir`. The file is removed when the
/// returned handle is dropped.
pub fn job_output_path(tmpdir: &Path, suffix: &str) -> Result<TempPath> {
    let path = tempfile::Builder::new()
        .prefix("gridrun-job-")
        .suffix(suffix)
        .tempfile_in(tmpdir)
        .with_context(|| format!("creating job output file in {:?}", tmpdir))?
        .into_temp_path();
    Ok(path)
}

/// Contents of a job output file. Read problems are folded into the text so
/// they show up wherever the output is reported.
pub async fn read_job_output(path: &Path) -> String {
    match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            debug!(path = ?path, error = %e, "could not read job output file");
            format!("gridrun: could not read job output {:?}: {e}\n", path)
        }
    }
}

/// Wait up to `tries` × `interval` for every target of `task` to appear.
///
/// Shared filesystems can show a job's outputs some time after the job has
/// been reported finished. Returns whether all targets were seen.
pub async fn wait_for_targets(task: &TaskNode, tries: u32, interval: Duration) -> bool {
    for attempt in 0..tries {
        if all_targets_exist(task).await {
            return true;
        }
        if attempt + 1 < tries {
            tokio::time::sleep(interval).await;
        }
    }

    let present = all_targets_exist(task).await;
    if !present {
        warn!(task = %task.name(), "targets still missing after job finished");
    }
    present
}

async fn all_targets_exist(task: &TaskNode) -> bool {
    for target in task.targets() {
        match tokio::fs::try_exists(target.as_str()).await {
            Ok(true) => {}
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{Artifact, TaskAction};

    #[tokio::test]
    async fn run_captures_streams_and_exit_code() {
        let sub = run("echo out; echo err >&2; exit 3").await.unwrap();
        assert_eq!(sub.stdout.trim(), "out");
        assert_eq!(sub.stderr.trim(), "err");
        assert_eq!(sub.return_code, 3);
        assert!(!sub.succeeded());
    }

    #[tokio::test]
    async fn job_output_files_are_read_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = job_output_path(dir.path(), ".out").unwrap();
        std::fs::write(&path, "hello").unwrap();

        assert_eq!(read_job_output(&path).await, "hello");
        let kept = path.to_path_buf();
        drop(path);
        assert!(!kept.exists());
        assert_eq!(read_job_output(&kept).await, "");
    }

    #[tokio::test]
    async fn missing_targets_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present");
        std::fs::write(&present, "").unwrap();

        let ok = TaskNode::new(
            "ok",
            Some(TaskAction::shell("true")),
            [Artifact::from_path(dir.path(), "present")],
            [],
        );
        assert!(wait_for_targets(&ok, 3, Duration::ZERO).await);

        let missing = TaskNode::new(
            "missing",
            Some(TaskAction::shell("true")),
            [Artifact::from_path(dir.path(), "absent")],
            [],
        );
        assert!(!wait_for_targets(&missing, 2, Duration::ZERO).await);
    }
}
