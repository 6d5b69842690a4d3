// src/perf/static_predictor.rs

use tracing::trace;

use crate::dag::TaskNode;
use crate::errors::Result;
use crate::perf::{PerformancePredictor, PerformanceSample, ResourceRequest, hint};

/// Proposes the configured defaults, overridden per task by `mem`, `time`
/// and `threads` extra fields.
#[derive(Debug, Clone)]
pub struct StaticPredictor {
    defaults: ResourceRequest,
}

impl StaticPredictor {
    pub fn new(defaults: ResourceRequest) -> Self {
        Self {
            defaults: defaults.clamped(),
        }
    }

    pub fn defaults(&self) -> ResourceRequest {
        self.defaults
    }
}

impl Default for StaticPredictor {
    fn default() -> Self {
        Self::new(ResourceRequest {
            memory_mb: 1024,
            time_minutes: 60,
            threads: 1,
        })
    }
}

impl PerformancePredictor for StaticPredictor {
    fn predict(&self, task: &TaskNode) -> ResourceRequest {
        let d = self.defaults;
        ResourceRequest::new(
            hint(task, "mem").unwrap_or(d.memory_mb as f64),
            hint(task, "time").unwrap_or(d.time_minutes as f64),
            hint(task, "threads").unwrap_or(d.threads as f64),
        )
    }

    fn update(&mut self, sample: PerformanceSample) {
        trace!(task = %sample.task, "static predictor ignores samples");
    }

    fn save(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn task_hints_override_defaults() {
        let mut fields = BTreeMap::new();
        fields.insert("mem".to_string(), toml::Value::Integer(8000));
        fields.insert("threads".to_string(), toml::Value::Integer(0));
        fields.insert("time".to_string(), toml::Value::String("soon".into()));
        let task = TaskNode::new("big", None, [], []).with_extra_fields(fields);

        let r = StaticPredictor::default().predict(&task);
        assert_eq!(r.memory_mb, 8000);
        // Non-numeric hints fall back, non-positive ones clamp.
        assert_eq!(r.time_minutes, 60);
        assert_eq!(r.threads, 1);
    }
}
