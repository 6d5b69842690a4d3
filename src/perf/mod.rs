// src/perf/mod.rs

//! Resource prediction.
//!
//! A [`PerformancePredictor`] proposes how much memory, time and how many
//! threads a task should ask for, and learns from the usage of jobs that
//! finished.
//!
//! - [`StaticPredictor`] always proposes the configured defaults, adjusted by
//!   per-task hints.
//! - [`HistoryPredictor`] remembers observed usage in a JSON file and sizes
//!   later requests from it.

pub mod history;
pub mod static_predictor;

pub use history::HistoryPredictor;
pub use static_predictor::StaticPredictor;

use crate::dag::TaskNode;
use crate::errors::Result;
use crate::grid::JobUsage;
use crate::grid::escalation::at_least_one;

/// Resources requested for one job. Every field is at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRequest {
    pub memory_mb: u64,
    pub time_minutes: u64,
    pub threads: u64,
}

impl ResourceRequest {
    /// Build a request, clamping every field to at least 1.
    pub fn new(memory_mb: f64, time_minutes: f64, threads: f64) -> Self {
        Self {
            memory_mb: at_least_one(memory_mb),
            time_minutes: at_least_one(time_minutes),
            threads: at_least_one(threads),
        }
    }

    /// Same request with every field clamped to at least 1.
    pub fn clamped(self) -> Self {
        Self {
            memory_mb: self.memory_mb.max(1),
            time_minutes: self.time_minutes.max(1),
            threads: self.threads.max(1),
        }
    }
}

/// Observed usage of one successful task.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSample {
    pub task: String,
    pub max_rss_mb: f64,
    pub cpu_hours: f64,
    pub wall_hours: f64,
}

impl PerformanceSample {
    pub fn from_usage(task: &TaskNode, usage: &JobUsage) -> Self {
        Self {
            task: task.name().to_string(),
            max_rss_mb: usage.max_rss_mb,
            cpu_hours: usage.cpu_hours,
            wall_hours: usage.wall_hours,
        }
    }
}

/// Trait abstracting resource prediction.
pub trait PerformancePredictor: Send {
    /// Propose a request for `task`.
    fn predict(&self, task: &TaskNode) -> ResourceRequest;

    /// Learn from a finished job.
    fn update(&mut self, sample: PerformanceSample);

    /// Persist whatever was learned.
    fn save(&mut self) -> Result<()>;
}

/// Read an integer hint such as `mem = 4096` from a task's extra fields.
pub(crate) fn hint(task: &TaskNode, key: &str) -> Option<f64> {
    match task.extra_field(key)? {
        toml::Value::Integer(i) => Some(*i as f64),
        toml::Value::Float(f) => Some(*f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_clamped_to_one() {
        let r = ResourceRequest::new(0.0, -3.0, 2.5);
        assert_eq!(
            r,
            ResourceRequest {
                memory_mb: 1,
                time_minutes: 1,
                threads: 2
            }
        );

        let raw = ResourceRequest {
            memory_mb: 0,
            time_minutes: 5,
            threads: 0,
        };
        assert_eq!(raw.clamped().memory_mb, 1);
        assert_eq!(raw.clamped().threads, 1);
    }
}
