// src/perf/history.rs

//! JSON-file backed predictor.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dag::TaskNode;
use crate::errors::Result;
use crate::perf::{PerformancePredictor, PerformanceSample, ResourceRequest, StaticPredictor, hint};

/// Multiplier applied to the largest resident size seen so far.
const MEMORY_HEADROOM: f64 = 1.2;

/// Multiplier applied to the longest wall time seen so far.
const TIME_HEADROOM: f64 = 1.5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    tasks: BTreeMap<String, TaskHistory>,
}

/// Largest usage observed for one task across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskHistory {
    pub max_rss_mb: f64,
    pub cpu_hours: f64,
    pub wall_hours: f64,
    pub runs: u32,
}

/// Sizes requests from the usage of earlier runs of the same task name.
///
/// Explicit `mem`/`time`/`threads` task fields still win; tasks never seen
/// before get the fallback predictor's answer.
#[derive(Debug)]
pub struct HistoryPredictor {
    path: PathBuf,
    fallback: StaticPredictor,
    history: HistoryFile,
    dirty: bool,
}

impl HistoryPredictor {
    /// Load the history at `path`. A missing file starts an empty history.
    pub fn load(path: impl Into<PathBuf>, fallback: StaticPredictor) -> Result<Self> {
        let path = path.into();
        let history = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?path, "no performance history yet");
                HistoryFile::default()
            }
            Err(e) => return Err(e.into()),
        };

        debug!(
            path = ?path,
            tasks = history.tasks.len(),
            "loaded performance history"
        );
        Ok(Self {
            path,
            fallback,
            history,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry(&self, task: &str) -> Option<&TaskHistory> {
        self.history.tasks.get(task)
    }
}

impl PerformancePredictor for HistoryPredictor {
    fn predict(&self, task: &TaskNode) -> ResourceRequest {
        let base = self.fallback.predict(task);
        let Some(seen) = self.history.tasks.get(task.name()) else {
            return base;
        };

        let memory = hint(task, "mem").unwrap_or((seen.max_rss_mb * MEMORY_HEADROOM).ceil());
        let time = hint(task, "time").unwrap_or((seen.wall_hours * 60.0 * TIME_HEADROOM).ceil());
        ResourceRequest::new(memory, time, base.threads as f64)
    }

    fn update(&mut self, sample: PerformanceSample) {
        let entry = self.history.tasks.entry(sample.task).or_default();
        entry.max_rss_mb = entry.max_rss_mb.max(sample.max_rss_mb);
        entry.cpu_hours = entry.cpu_hours.max(sample.cpu_hours);
        entry.wall_hours = entry.wall_hours.max(sample.wall_hours);
        entry.runs += 1;
        self.dirty = true;
    }

    fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating directory for {:?}", self.path))?;

        // Write next to the destination and rename, so a crash never leaves
        // a truncated history behind.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.history)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("saving performance history to {:?}", self.path))?;

        self.dirty = false;
        info!(
            path = ?self.path,
            tasks = self.history.tasks.len(),
            "saved performance history"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(task: &str, rss: f64, wall: f64) -> PerformanceSample {
        PerformanceSample {
            task: task.to_string(),
            max_rss_mb: rss,
            cpu_hours: wall / 2.0,
            wall_hours: wall,
        }
    }

    #[test]
    fn unseen_tasks_use_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let p = HistoryPredictor::load(dir.path().join("perf.json"), StaticPredictor::default())
            .unwrap();
        let r = p.predict(&TaskNode::new("new", None, [], []));
        assert_eq!(r.memory_mb, 1024);
        assert_eq!(r.time_minutes, 60);
    }

    #[test]
    fn samples_survive_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/perf.json");

        let mut p = HistoryPredictor::load(&path, StaticPredictor::default()).unwrap();
        p.update(sample("align", 1000.0, 2.0));
        p.update(sample("align", 500.0, 1.0));
        p.save().unwrap();

        let p = HistoryPredictor::load(&path, StaticPredictor::default()).unwrap();
        let seen = p.entry("align").unwrap();
        assert_eq!(seen.runs, 2);
        assert_eq!(seen.max_rss_mb, 1000.0);

        let r = p.predict(&TaskNode::new("align", None, [], []));
        assert_eq!(r.memory_mb, 1200);
        assert_eq!(r.time_minutes, 180);
        assert_eq!(r.threads, 1);
    }

    #[test]
    fn corrupt_history_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perf.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(HistoryPredictor::load(&path, StaticPredictor::default()).is_err());
    }
}
