// src/dag/node.rs

//! The schedulable unit: [`TaskNode`] and the [`Artifact`]s it links through.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::Context;

use crate::dag::path_utils::absolute_from;
use crate::errors::Result;
use crate::grid::opts::shell_quote;

/// Opaque identifier for something a task produces or requires.
///
/// Canonically a normalized absolute path, but the graph only ever compares
/// artifacts for equality; they are never dereferenced.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Artifact(String);

impl Artifact {
    pub fn new(id: impl Into<String>) -> Self {
        Artifact(id.into())
    }

    /// Normalize `path` against `base` (see [`absolute_from`]).
    pub fn from_path(base: &Path, path: impl AsRef<Path>) -> Self {
        let abs = absolute_from(base, path.as_ref());
        Artifact(abs.to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What running a task means: a shell command, optionally run from a
/// specific directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAction {
    pub command: String,
    pub workdir: Option<PathBuf>,
}

impl TaskAction {
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            workdir: None,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }
}

/// A single schedulable unit.
///
/// Identity is the `name` alone: two nodes with the same name are equal and
/// hash identically whatever their other fields. The only mutable state is
/// the submission script, written on first access and shared by clones.
#[derive(Clone)]
pub struct TaskNode {
    name: String,
    action: Option<TaskAction>,
    targets: BTreeSet<Artifact>,
    deps: BTreeSet<Artifact>,
    extra_fields: BTreeMap<String, toml::Value>,
    script: Arc<OnceLock<PathBuf>>,
}

impl TaskNode {
    pub fn new(
        name: impl Into<String>,
        action: Option<TaskAction>,
        targets: impl IntoIterator<Item = Artifact>,
        deps: impl IntoIterator<Item = Artifact>,
    ) -> Self {
        Self {
            name: name.into(),
            action,
            targets: targets.into_iter().collect(),
            deps: deps.into_iter().collect(),
            extra_fields: BTreeMap::new(),
            script: Arc::new(OnceLock::new()),
        }
    }

    /// The synthetic root vertex: empty name, no action, targets or deps.
    pub fn root() -> Self {
        Self::new(String::new(), None, [], [])
    }

    pub fn with_extra_fields(mut self, fields: BTreeMap<String, toml::Value>) -> Self {
        self.extra_fields = fields;
        self
    }

    /// Identity key used for every set/map membership test.
    pub fn key(&self) -> &str {
        &self.name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_root(&self) -> bool {
        self.name.is_empty()
    }

    pub fn action(&self) -> Option<&TaskAction> {
        self.action.as_ref()
    }

    pub fn has_action(&self) -> bool {
        self.action.is_some()
    }

    pub fn targets(&self) -> &BTreeSet<Artifact> {
        &self.targets
    }

    pub fn deps(&self) -> &BTreeSet<Artifact> {
        &self.deps
    }

    pub fn extra_fields(&self) -> &BTreeMap<String, toml::Value> {
        &self.extra_fields
    }

    pub fn extra_field(&self, key: &str) -> Option<&toml::Value> {
        self.extra_fields.get(key)
    }

    /// Path of the stand-alone script that runs this task's action.
    ///
    /// The script is written into `tmpdir` on first call and memoized; later
    /// calls return the cached path without touching the filesystem. Backends
    /// invoke it as `<script> -r`.
    pub fn submission_script(&self, tmpdir: &Path) -> Result<PathBuf> {
        if let Some(path) = self.script.get() {
            return Ok(path.clone());
        }

        let action = self.action.as_ref().ok_or_else(|| {
            anyhow::anyhow!("task '{}' has no action to submit", self.name)
        })?;

        let path = tmpdir.join(format!("gridrun-{}.sh", self.script_digest(action)));
        fs::create_dir_all(tmpdir)
            .with_context(|| format!("creating tmpdir {:?}", tmpdir))?;
        fs::write(&path, self.render_script(action))
            .with_context(|| format!("writing submission script {:?}", path))?;
        make_executable(&path)?;

        // Concurrent first calls write identical content to the same path, so
        // whichever `set` wins is fine.
        let _ = self.script.set(path);
        Ok(self.script.get().cloned().unwrap_or_default())
    }

    fn script_digest(&self, action: &TaskAction) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.name.as_bytes());
        hasher.update(&[0]);
        hasher.update(action.command.as_bytes());
        if let Some(dir) = &action.workdir {
            hasher.update(&[0]);
            hasher.update(dir.to_string_lossy().as_bytes());
        }
        hasher.finalize().to_hex()[..16].to_string()
    }

    fn render_script(&self, action: &TaskAction) -> String {
        let mut script = String::from("#!/bin/sh\n");
        script.push_str(&format!("# gridrun task: {}\n", self.name));
        script.push_str("if [ \"$1\" != \"-r\" ]; then\n");
        script.push_str("    echo \"usage: $0 -r\" >&2\n");
        script.push_str("    exit 2\n");
        script.push_str("fi\n");
        if let Some(dir) = &action.workdir {
            script.push_str(&format!("cd {} || exit 1\n", shell_quote(&dir.to_string_lossy())));
        }
        script.push_str(&format!("exec /bin/sh -c {}\n", shell_quote(&action.command)));
        script
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("marking {:?} executable", path))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

impl PartialEq for TaskNode {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for TaskNode {}

impl Hash for TaskNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("name", &self.name)
            .field("action", &self.action)
            .field("targets", &self.targets)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskNode: {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn equality_and_hash_use_name_only() {
        let a = TaskNode::new("align", Some(TaskAction::shell("true")), [Artifact::new("x")], []);
        let b = TaskNode::new("align", None, [], [Artifact::new("y")]);
        assert_eq!(a, b);

        let set: HashSet<TaskNode> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn root_is_empty() {
        let root = TaskNode::root();
        assert!(root.is_root());
        assert!(!root.has_action());
        assert!(root.targets().is_empty() && root.deps().is_empty());
    }

    #[test]
    fn submission_script_is_written_once_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        let task = TaskNode::new("t", Some(TaskAction::shell("echo 'hi'")), [], []);

        let first = task.submission_script(dir.path()).unwrap();
        let contents = fs::read_to_string(&first).unwrap();
        assert!(contents.starts_with("#!/bin/sh\n"));
        assert!(contents.contains("exec /bin/sh -c 'echo '\\''hi'\\'''"));

        // Removing the file does not trigger a rewrite: the path is memoized,
        // and clones share the cache.
        fs::remove_file(&first).unwrap();
        let second = task.clone().submission_script(dir.path()).unwrap();
        assert_eq!(first, second);
        assert!(!second.exists());
    }

    #[test]
    fn task_without_action_has_no_script() {
        let dir = tempfile::tempdir().unwrap();
        let task = TaskNode::new("noop", None, [], []);
        assert!(task.submission_script(dir.path()).is_err());
    }
}
