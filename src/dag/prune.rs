// src/dag/prune.rs

//! Removing tasks from a graph.
//!
//! - [`prune`] deletes a set of nodes from an assembled [`DependencyGraph`],
//!   only cutting a node once every predecessor it has is also being cut.
//! - [`filter_tree`] drops task descriptors matching any filter, together
//!   with everything that (transitively) depends on them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;
use tracing::debug;

use crate::dag::graph::DependencyGraph;
use crate::dag::node::{Artifact, TaskAction, TaskNode};
use crate::dag::path_utils::absolute_from;
use crate::errors::{GridError, Result};

/// Remove `nodes_to_prune` from `dag`.
///
/// Nodes are taken from the pending set one at a time. A node is deleted,
/// together with its predecessors, only if all of those predecessors are
/// themselves part of the prune request (or it has none). Otherwise it is
/// left in place, since a surviving producer still feeds it, and the walk
/// moves on. Terminates once the pending set is empty. Checking against the
/// whole request rather than what is still pending keeps the result
/// independent of pop order.
///
/// Returns the names that were actually removed.
pub fn prune<I, S>(dag: &mut DependencyGraph, nodes_to_prune: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let requested: HashSet<String> = nodes_to_prune.into_iter().map(Into::into).collect();
    let mut pending = requested.clone();
    let mut removed = Vec::new();

    while let Some(name) = pending.iter().next().cloned() {
        pending.remove(&name);

        let parents: Vec<String> = dag
            .predecessors(&name)
            .into_iter()
            .map(|n| n.name().to_string())
            .collect();

        if parents.iter().all(|p| requested.contains(p)) {
            for victim in std::iter::once(name.clone()).chain(parents) {
                pending.remove(&victim);
                if dag.remove(&victim).is_some() {
                    removed.push(victim);
                }
            }
        } else {
            debug!(task = %name, "not pruning: a predecessor survives");
        }
    }

    removed
}

/// Dict-like task record as handed over by a pipeline loader.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    pub name: String,
    pub cmd: Option<String>,
    pub targets: Vec<String>,
    pub file_dep: Vec<String>,
    /// Everything else the loader knew about the task.
    pub fields: BTreeMap<String, toml::Value>,
}

impl TaskDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cmd: None,
            targets: Vec::new(),
            file_dep: Vec::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Rewrite `targets` and `file_dep` as normalized absolute paths so that
    /// producers and consumers match up by string equality.
    pub fn normalize(mut self, base: &Path) -> Self {
        let abs = |p: &String| -> String {
            absolute_from(base, Path::new(p)).to_string_lossy().into_owned()
        };
        self.targets = self.targets.iter().map(abs).collect();
        self.file_dep = self.file_dep.iter().map(abs).collect();
        self
    }

    /// Turn the descriptor into a schedulable node. The action, if any, runs
    /// from `workdir`.
    pub fn into_task_node(self, workdir: &Path) -> TaskNode {
        let action = self
            .cmd
            .map(|cmd| TaskAction::shell(cmd).in_dir(workdir.to_path_buf()));
        TaskNode::new(
            self.name,
            action,
            self.targets.iter().map(|t| Artifact::from_path(workdir, t)),
            self.file_dep.iter().map(|d| Artifact::from_path(workdir, d)),
        )
        .with_extra_fields(self.fields)
    }
}

/// Predicate deciding whether a descriptor is excluded.
pub trait TaskFilter {
    fn matches(&self, task: &TaskDescriptor) -> bool;
}

impl<F> TaskFilter for F
where
    F: Fn(&TaskDescriptor) -> bool,
{
    fn matches(&self, task: &TaskDescriptor) -> bool {
        self(task)
    }
}

/// Matches tasks whose name matches any of a set of glob patterns.
#[derive(Debug, Clone)]
pub struct NameGlobFilter {
    set: GlobSet,
}

impl NameGlobFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pat in patterns {
            let glob = Glob::new(pat.as_ref()).map_err(|e| {
                GridError::ConfigError(format!("invalid exclude pattern '{}': {e}", pat.as_ref()))
            })?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| GridError::ConfigError(format!("building exclude patterns: {e}")))?;
        Ok(Self { set })
    }
}

impl TaskFilter for NameGlobFilter {
    fn matches(&self, task: &TaskDescriptor) -> bool {
        self.set.is_match(&task.name)
    }
}

/// Drop descriptors matched by any of `filters`, plus every descriptor that
/// depends on a dropped one, directly or transitively.
///
/// Paths are normalized against the current working directory first. The
/// kept descriptors are returned in input order; callers should rely on
/// membership only.
pub fn filter_tree(task_dicts: Vec<TaskDescriptor>, filters: &[&dyn TaskFilter]) -> Vec<TaskDescriptor> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    filter_tree_from(&cwd, task_dicts, filters)
}

/// [`filter_tree`] with an explicit base directory for relative paths.
pub fn filter_tree_from(
    base: &Path,
    task_dicts: Vec<TaskDescriptor>,
    filters: &[&dyn TaskFilter],
) -> Vec<TaskDescriptor> {
    let task_dicts: Vec<TaskDescriptor> =
        task_dicts.into_iter().map(|t| t.normalize(base)).collect();

    let excluded = {
        let graph = assemble_descriptors(&task_dicts);
        let mut excluded: HashSet<&str> = HashSet::new();

        for task in task_dicts.iter() {
            if excluded.contains(task.name.as_str()) {
                continue;
            }
            if filters.iter().any(|f| f.matches(task)) {
                debug!(task = %task.name, "excluded by filter");
                let mut dfs = Dfs::new(&graph, task.name.as_str());
                while let Some(name) = dfs.next(&graph) {
                    excluded.insert(name);
                }
                excluded.insert(task.name.as_str());
            }
        }

        excluded
            .into_iter()
            .map(str::to_string)
            .collect::<HashSet<String>>()
    };

    task_dicts
        .into_iter()
        .filter(|t| !excluded.contains(&t.name))
        .collect()
}

/// Edges run from a descriptor to every descriptor consuming one of its
/// targets.
fn assemble_descriptors(task_dicts: &[TaskDescriptor]) -> DiGraphMap<&str, ()> {
    let mut by_dep: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in task_dicts {
        for dep in task.file_dep.iter() {
            by_dep.entry(dep.as_str()).or_default().push(task.name.as_str());
        }
    }

    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for task in task_dicts {
        graph.add_node(task.name.as_str());
        for target in task.targets.iter() {
            for child in by_dep.get(target.as_str()).into_iter().flatten() {
                graph.add_edge(task.name.as_str(), *child, ());
            }
        }
    }
    graph
}
