use std::sync::{Arc, Mutex};

use gridrun::dag::TaskNode;
use gridrun::engine::TaskOutcome;
use gridrun::errors::Result;
use gridrun::perf::{PerformancePredictor, PerformanceSample, ResourceRequest};
use gridrun::report::Reporter;

/// Predicts a fixed request and records everything it learns.
///
/// Clones share their records, so a test can keep one handle and give the
/// other to the runner.
#[derive(Debug, Clone)]
pub struct RecordingPredictor {
    request: ResourceRequest,
    samples: Arc<Mutex<Vec<PerformanceSample>>>,
    saves: Arc<Mutex<usize>>,
}

impl RecordingPredictor {
    pub fn new(memory_mb: u64, time_minutes: u64, threads: u64) -> Self {
        Self {
            request: ResourceRequest {
                memory_mb,
                time_minutes,
                threads,
            },
            samples: Arc::new(Mutex::new(Vec::new())),
            saves: Arc::new(Mutex::new(0)),
        }
    }

    pub fn samples(&self) -> Vec<PerformanceSample> {
        self.samples.lock().unwrap().clone()
    }

    pub fn saves(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

impl PerformancePredictor for RecordingPredictor {
    fn predict(&self, _task: &TaskNode) -> ResourceRequest {
        self.request
    }

    fn update(&mut self, sample: PerformanceSample) {
        self.samples.lock().unwrap().push(sample);
    }

    fn save(&mut self) -> Result<()> {
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

/// Reporter event as recorded by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reported {
    Started(String),
    Succeeded(String),
    Failed(String),
}

/// Records every report in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    events: Arc<Mutex<Vec<Reported>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Reported> {
        self.events.lock().unwrap().clone()
    }

    /// Names of tasks reported as started, in order.
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Reported::Started(name) => Some(name),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn execute_task(&self, task: &TaskNode) {
        self.events
            .lock()
            .unwrap()
            .push(Reported::Started(task.name().to_string()));
    }

    fn task_finished(&self, task: &TaskNode, outcome: &TaskOutcome) {
        let name = task.name().to_string();
        let event = match outcome {
            TaskOutcome::Success => Reported::Succeeded(name),
            TaskOutcome::Failed(_) => Reported::Failed(name),
        };
        self.events.lock().unwrap().push(event);
    }
}
