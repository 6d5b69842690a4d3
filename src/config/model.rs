// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dag::TaskDescriptor;
use crate::dag::path_utils::absolute_from;
use crate::perf::ResourceRequest;
use crate::types::BackendKind;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// backend = "slurm"
/// partition = "general"
/// threads = 4
///
/// [defaults]
/// mem = 1024
/// time = 60
///
/// [task.align]
/// cmd = "bwa mem ref.fa reads.fq > aln.sam"
/// targets = ["aln.sam"]
/// deps = ["reads.fq"]
/// ```
///
/// All sections are optional and have reasonable defaults. This is the
/// unvalidated form; see [`ConfigFile`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    /// Run configuration from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Fallback resource request from `[defaults]`.
    #[serde(default)]
    pub defaults: DefaultsSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfigSection {
    /// Batch system to submit to.
    #[serde(default)]
    pub backend: BackendKind,

    /// Partition / queue name passed to the batch system. Empty means the
    /// batch system's default.
    #[serde(default)]
    pub partition: String,

    /// Number of tasks executed concurrently.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Where submission scripts and job output files go. Defaults to the
    /// system temp directory.
    #[serde(default)]
    pub tmpdir: Option<PathBuf>,

    /// Raw arguments added to every submission command.
    #[serde(default)]
    pub extra_grid_args: String,

    /// Submissions allowed per task, counting the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// JSON file remembering observed usage. Without one, every task gets
    /// `[defaults]` (or its own hints).
    #[serde(default)]
    pub performance_file: Option<PathBuf>,
}

fn default_threads() -> usize {
    1
}

fn default_max_attempts() -> u32 {
    10
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            partition: String::new(),
            threads: default_threads(),
            tmpdir: None,
            extra_grid_args: String::new(),
            max_attempts: default_max_attempts(),
            performance_file: None,
        }
    }
}

/// `[defaults]` section: the request used when nothing better is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DefaultsSection {
    /// Memory in MB.
    #[serde(default = "default_mem")]
    pub mem: i64,

    /// Wall-clock limit in minutes.
    #[serde(default = "default_time")]
    pub time: i64,

    #[serde(default = "default_task_threads")]
    pub threads: i64,
}

fn default_mem() -> i64 {
    1024
}

fn default_time() -> i64 {
    60
}

fn default_task_threads() -> i64 {
    1
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            mem: default_mem(),
            time: default_time(),
            threads: default_task_threads(),
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskConfig {
    /// Shell command to run. A task without one only groups its deps.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Files this task produces.
    #[serde(default)]
    pub targets: Vec<String>,

    /// Files this task consumes.
    #[serde(default, alias = "file_dep")]
    pub deps: Vec<String>,

    /// Everything else (`mem`, `time`, `threads` hints and free-form
    /// metadata), kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

/// Validated configuration.
///
/// Build through [`ConfigFile::from_raw`] or `TryFrom<RawConfigFile>`, which
/// check the invariants the rest of the crate relies on.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub defaults: DefaultsSection,
    pub task: BTreeMap<String, TaskConfig>,
    /// Directory relative paths are resolved against.
    pub base_dir: PathBuf,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, base_dir: PathBuf) -> Self {
        Self {
            config: raw.config,
            defaults: raw.defaults,
            task: raw.task,
            base_dir,
        }
    }

    /// Task descriptors in name order, paths not yet normalized.
    pub fn descriptors(&self) -> Vec<TaskDescriptor> {
        self.task
            .iter()
            .map(|(name, tc)| TaskDescriptor {
                name: name.clone(),
                cmd: tc.cmd.clone(),
                targets: tc.targets.clone(),
                file_dep: tc.deps.clone(),
                fields: tc.extra.clone(),
            })
            .collect()
    }

    /// `[defaults]` as a request.
    pub fn default_request(&self) -> ResourceRequest {
        ResourceRequest::new(
            self.defaults.mem as f64,
            self.defaults.time as f64,
            self.defaults.threads as f64,
        )
    }

    pub fn tmpdir(&self) -> PathBuf {
        match &self.config.tmpdir {
            Some(dir) => self.resolve(dir),
            None => std::env::temp_dir(),
        }
    }

    pub fn performance_path(&self) -> Option<PathBuf> {
        self.config
            .performance_file
            .as_deref()
            .map(|p| self.resolve(p))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        absolute_from(&self.base_dir, path)
    }
}
