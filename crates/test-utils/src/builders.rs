#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use gridrun::config::{ConfigFile, ConfigSection, DefaultsSection, RawConfigFile, TaskConfig};
use gridrun::dag::{Artifact, TaskAction, TaskNode};
use gridrun::types::BackendKind;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Relative paths resolve against `/pipeline` unless [`base_dir`] says
/// otherwise.
///
/// [`base_dir`]: ConfigFileBuilder::base_dir
pub struct ConfigFileBuilder {
    config: RawConfigFile,
    base_dir: PathBuf,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                defaults: DefaultsSection::default(),
                task: BTreeMap::new(),
            },
            base_dir: PathBuf::from("/pipeline"),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.config.backend = backend;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.config.config.threads = threads;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.config.max_attempts = attempts;
        self
    }

    pub fn defaults(mut self, mem: i64, time: i64, threads: i64) -> Self {
        self.config.defaults = DefaultsSection { mem, time, threads };
        self
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::from_raw(self.config, self.base_dir)
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: Some(cmd.to_string()),
                targets: vec![],
                deps: vec![],
                extra: BTreeMap::new(),
            },
        }
    }

    /// A task that only groups its dependencies.
    pub fn without_action() -> Self {
        let mut builder = Self::new("");
        builder.task.cmd = None;
        builder
    }

    pub fn target(mut self, path: &str) -> Self {
        self.task.targets.push(path.to_string());
        self
    }

    pub fn dep(mut self, path: &str) -> Self {
        self.task.deps.push(path.to_string());
        self
    }

    pub fn hint(mut self, key: &str, value: i64) -> Self {
        self.task
            .extra
            .insert(key.to_string(), toml::Value::Integer(value));
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Builder for a `TaskNode` with absolute artifact names.
pub struct TaskNodeBuilder {
    name: String,
    cmd: Option<String>,
    targets: Vec<String>,
    deps: Vec<String>,
    extra: BTreeMap<String, toml::Value>,
}

impl TaskNodeBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cmd: Some(format!("echo {name}")),
            targets: vec![],
            deps: vec![],
            extra: BTreeMap::new(),
        }
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.cmd = Some(cmd.to_string());
        self
    }

    pub fn no_action(mut self) -> Self {
        self.cmd = None;
        self
    }

    pub fn target(mut self, artifact: &str) -> Self {
        self.targets.push(artifact.to_string());
        self
    }

    pub fn dep(mut self, artifact: &str) -> Self {
        self.deps.push(artifact.to_string());
        self
    }

    pub fn hint(mut self, key: &str, value: i64) -> Self {
        self.extra.insert(key.to_string(), toml::Value::Integer(value));
        self
    }

    pub fn build(self) -> TaskNode {
        TaskNode::new(
            self.name,
            self.cmd.map(TaskAction::shell),
            self.targets.into_iter().map(Artifact::new),
            self.deps.into_iter().map(Artifact::new),
        )
        .with_extra_fields(self.extra)
    }
}

/// Nodes for a straight chain `t0 -> t1 -> ... -> t{n-1}` linked through
/// `/chain/<i>.out` artifacts.
pub fn chain(n: usize) -> Vec<TaskNode> {
    (0..n)
        .map(|i| {
            let mut b = TaskNodeBuilder::new(&format!("t{i}")).target(&format!("/chain/{i}.out"));
            if i > 0 {
                b = b.dep(&format!("/chain/{}.out", i - 1));
            }
            b.build()
        })
        .collect()
}
