use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use gridrun::dag::TaskNode;
use gridrun::errors::{GridError, Result};
use gridrun::grid::{BoxFuture, FailureAction, GridBackend, JobUsage, Submission, SubmitRequest};

/// Exit code the fake uses for "ran out of memory"; retried with double the
/// memory.
pub const OUT_OF_MEMORY: i32 = 137;

/// What one scripted submission does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeOutcome {
    Success,
    OutOfMemory,
    Fail(i32),
}

/// One recorded submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeSubmission {
    pub task: String,
    pub request: SubmitRequest,
}

/// A grid backend that never spawns a process.
///
/// - each task's submissions follow its script, then succeed
/// - successful jobs get IDs 1, 2, 3, ... in completion order
/// - `job_stats` reports the numeric job ID as the job's MB, so a sample
///   shows which job it came from, and records the size of each query
pub struct FakeBackend {
    scripts: Mutex<HashMap<String, VecDeque<FakeOutcome>>>,
    submissions: Mutex<Vec<FakeSubmission>>,
    stats_batches: Mutex<Vec<usize>>,
    missing_usage: HashSet<String>,
    fail_stats: bool,
    delay: Duration,
    next_id: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
            stats_batches: Mutex::new(Vec::new()),
            missing_usage: HashSet::new(),
            fail_stats: false,
            delay: Duration::ZERO,
            next_id: AtomicU64::new(1),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Queue outcomes for `task`'s first submissions.
    pub fn script(self, task: &str, outcomes: &[FakeOutcome]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(task.to_string(), outcomes.iter().copied().collect());
        self
    }

    /// Every job takes `delay` to "run".
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Leave job `id` out of usage answers, as accounting sometimes does.
    pub fn without_usage_for(mut self, id: &str) -> Self {
        self.missing_usage.insert(id.to_string());
        self
    }

    /// Make every usage query fail.
    pub fn failing_stats(mut self) -> Self {
        self.fail_stats = true;
        self
    }

    pub fn submissions(&self) -> Vec<FakeSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submissions_for(&self, task: &str) -> Vec<SubmitRequest> {
        self.submissions()
            .into_iter()
            .filter(|s| s.task == task)
            .map(|s| s.request)
            .collect()
    }

    pub fn stats_batches(&self) -> Vec<usize> {
        self.stats_batches.lock().unwrap().clone()
    }

    /// Highest number of jobs that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, task: &str) -> FakeOutcome {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(task)
            .and_then(VecDeque::pop_front)
            .unwrap_or(FakeOutcome::Success)
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GridBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn communicate<'a>(
        &'a self,
        task: &'a TaskNode,
        request: &'a SubmitRequest,
    ) -> BoxFuture<'a, Result<Submission>> {
        Box::pin(async move {
            self.submissions.lock().unwrap().push(FakeSubmission {
                task: task.name().to_string(),
                request: request.clone(),
            });

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let command = format!("fake-submit {}", task.name());
            let submission = match self.next_outcome(task.name()) {
                FakeOutcome::Success => {
                    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                    Submission {
                        command,
                        stdout: format!("job {id}\n"),
                        ..Submission::default()
                    }
                }
                FakeOutcome::OutOfMemory => Submission {
                    command,
                    stderr: "out of memory\n".to_string(),
                    return_code: OUT_OF_MEMORY,
                    ..Submission::default()
                },
                FakeOutcome::Fail(code) => Submission {
                    command,
                    stderr: "boom\n".to_string(),
                    return_code: code,
                    ..Submission::default()
                },
            };
            Ok(submission)
        })
    }

    fn find_job_id(&self, submission: &Submission) -> Result<String> {
        submission
            .stdout
            .trim()
            .strip_prefix("job ")
            .map(str::to_string)
            .ok_or_else(|| GridError::ParseError(submission.stdout.clone()))
    }

    fn job_stats<'a>(&'a self, job_ids: &'a [String]) -> BoxFuture<'a, Result<Vec<JobUsage>>> {
        Box::pin(async move {
            self.stats_batches.lock().unwrap().push(job_ids.len());
            if self.fail_stats {
                return Err(GridError::ParseError("accounting unavailable".to_string()));
            }
            // Reverse order: callers must not rely on the backend sorting.
            Ok(job_ids
                .iter()
                .rev()
                .filter(|id| !self.missing_usage.contains(*id))
                .map(|id| JobUsage {
                    job_id: id.clone(),
                    max_rss_mb: id.parse().unwrap_or(0.0),
                    cpu_hours: 0.1,
                    wall_hours: 0.1,
                })
                .collect())
        })
    }

    fn handle_failure(
        &self,
        submission: &Submission,
        _attempt: u32,
        mem_mb: u64,
        time_min: u64,
    ) -> FailureAction {
        if submission.return_code == OUT_OF_MEMORY {
            FailureAction::Retry {
                mem_mb: mem_mb * 2,
                time_min,
            }
        } else {
            FailureAction::Fatal(submission.to_error())
        }
    }
}
