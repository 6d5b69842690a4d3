// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use tracing::debug;

use crate::dag::node::{Artifact, TaskNode};
use crate::errors::{GridError, Result};

/// Name of the synthetic root vertex.
pub const ROOT: &str = "";

/// Dependency graph over [`TaskNode`]s plus one synthetic root.
///
/// Edge `u -> v` means "v depends on something u produces"; an edge from the
/// root means "v has no known producer in this graph". Vertices are keyed by
/// [`TaskNode::key`]. Backed by a `StableDiGraph` so that pruning does not
/// invalidate the indices held in `index`.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: StableDiGraph<TaskNode, ()>,
    index: HashMap<String, NodeIndex>,
    root: NodeIndex,
}

/// Build a `DependencyGraph` from an unordered collection of tasks.
///
/// Returns the graph together with the same node collection.
///
/// Fails if two tasks share a name, a task has an empty name (reserved for
/// the root), or the artifact links form a cycle.
pub fn assemble(tasks: Vec<TaskNode>) -> Result<(DependencyGraph, Vec<TaskNode>)> {
    let mut dag = DependencyGraph::empty();
    for task in tasks.iter() {
        if task.is_root() {
            return Err(GridError::ConfigError(
                "task names must not be empty".to_string(),
            ));
        }
        if dag.index.contains_key(task.key()) {
            return Err(GridError::DuplicateTask(task.name().to_string()));
        }
        let idx = dag.graph.add_node(task.clone());
        dag.index.insert(task.key().to_string(), idx);
    }

    let by_dep = index_by(&tasks, TaskNode::deps);
    let by_target = index_by(&tasks, TaskNode::targets);
    for task in tasks.iter() {
        // `t` produces something each child depends on.
        for child in search(task.targets(), &by_dep) {
            dag.link(task.key(), child.key());
        }

        // Many tasks may share one producer; fan-in from several producers of
        // the same artifact is legal too.
        let parents = search(task.deps(), &by_target);
        if parents.is_empty() {
            dag.link(ROOT, task.key());
        } else {
            for parent in parents {
                dag.link(parent.key(), task.key());
            }
        }
    }

    if let Err(cycle) = toposort(&dag.graph, None) {
        let name = dag.graph[cycle.node_id()].name().to_string();
        return Err(GridError::DagCycle(format!(
            "cycle detected in task DAG involving task '{}'",
            name
        )));
    }

    debug!(
        tasks = tasks.len(),
        edges = dag.edge_count(),
        "assembled dependency graph"
    );

    Ok((dag, tasks))
}

/// Index `tasks` by every artifact in the set selected by `key`.
fn index_by<'a>(
    tasks: &'a [TaskNode],
    key: impl Fn(&TaskNode) -> &std::collections::BTreeSet<Artifact>,
) -> HashMap<&'a Artifact, Vec<&'a TaskNode>> {
    let mut idx: HashMap<&Artifact, Vec<&TaskNode>> = HashMap::new();
    for task in tasks {
        for artifact in key(task) {
            idx.entry(artifact).or_default().push(task);
        }
    }
    idx
}

/// All tasks indexed under any of `using`, deduplicated.
fn search<'a>(
    using: &std::collections::BTreeSet<Artifact>,
    idx: &HashMap<&Artifact, Vec<&'a TaskNode>>,
) -> Vec<&'a TaskNode> {
    let mut seen = HashSet::new();
    let mut hits = Vec::new();
    for artifact in using {
        for task in idx.get(artifact).into_iter().flatten() {
            if seen.insert(task.key()) {
                hits.push(*task);
            }
        }
    }
    hits
}

impl DependencyGraph {
    fn empty() -> Self {
        let mut graph = StableDiGraph::new();
        let root = graph.add_node(TaskNode::root());
        let mut index = HashMap::new();
        index.insert(ROOT.to_string(), root);
        Self { graph, index, root }
    }

    /// Add `from -> to`, collapsing duplicates.
    fn link(&mut self, from: &str, to: &str) {
        if let (Some(&a), Some(&b)) = (self.index.get(from), self.index.get(to)) {
            self.graph.update_edge(a, b, ());
        }
    }

    /// The synthetic root vertex.
    pub fn root(&self) -> &TaskNode {
        &self.graph[self.root]
    }

    /// All task vertices, excluding the root.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.graph
            .node_indices()
            .filter(move |&i| i != self.root)
            .map(move |i| &self.graph[i])
    }

    /// Number of task vertices, excluding the root.
    pub fn task_count(&self) -> usize {
        self.graph.node_count() - 1
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, name: &str) -> bool {
        name != ROOT && self.index.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Option<&TaskNode> {
        self.index.get(name).map(|&i| &self.graph[i])
    }

    /// Whether the edge `from -> to` exists. Use [`ROOT`] for the root.
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&a), Some(&b)) => self.graph.contains_edge(a, b),
            _ => false,
        }
    }

    /// Whether the task hangs directly off the root.
    pub fn is_root_child(&self, name: &str) -> bool {
        self.has_edge(ROOT, name)
    }

    /// Graph predecessors of `name`, including the root if linked to it.
    pub fn predecessors(&self, name: &str) -> Vec<&TaskNode> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Graph successors of `name`.
    pub fn successors(&self, name: &str) -> Vec<&TaskNode> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Names of the tasks `name` waits for (predecessors minus the root).
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.predecessors(name)
            .into_iter()
            .filter(|n| !n.is_root())
            .map(|n| n.name().to_string())
            .collect()
    }

    /// Names of the tasks waiting for `name`.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.successors(name)
            .into_iter()
            .map(|n| n.name().to_string())
            .collect()
    }

    /// Every task reachable from `name` (not including `name` itself).
    pub fn descendants(&self, name: &str) -> HashSet<String> {
        let mut out = HashSet::new();
        let mut stack = self.dependents_of(name);
        while let Some(current) = stack.pop() {
            if out.insert(current.clone()) {
                stack.extend(self.dependents_of(&current));
            }
        }
        out
    }

    /// Remove a task vertex and its edges. The root cannot be removed.
    pub(crate) fn remove(&mut self, name: &str) -> Option<TaskNode> {
        if name == ROOT {
            return None;
        }
        let idx = self.index.remove(name)?;
        self.graph.remove_node(idx)
    }

    fn neighbors(&self, name: &str, dir: Direction) -> Vec<&TaskNode> {
        match self.index.get(name) {
            Some(&idx) => self
                .graph
                .neighbors_directed(idx, dir)
                .map(|i| &self.graph[i])
                .collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::node::TaskAction;

    fn task(name: &str, targets: &[&str], deps: &[&str]) -> TaskNode {
        TaskNode::new(
            name,
            Some(TaskAction::shell(format!("echo {name}"))),
            targets.iter().map(|t| Artifact::new(*t)),
            deps.iter().map(|d| Artifact::new(*d)),
        )
    }

    #[test]
    fn lone_task_hangs_off_root() {
        let (dag, nodes) = assemble(vec![task("solo", &[], &[])]).unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(dag.is_root_child("solo"));
        assert_eq!(dag.edge_count(), 1);
    }

    #[test]
    fn fan_in_links_every_producer() {
        let (dag, _) = assemble(vec![
            task("p1", &["/shared"], &[]),
            task("p2", &["/shared"], &[]),
            task("c", &[], &["/shared"]),
        ])
        .unwrap();

        assert!(dag.has_edge("p1", "c"));
        assert!(dag.has_edge("p2", "c"));
        assert!(!dag.is_root_child("c"));
        let mut deps = dag.dependencies_of("c");
        deps.sort();
        assert_eq!(deps, vec!["p1".to_string(), "p2".to_string()]);
    }

    #[test]
    fn duplicate_edges_collapse() {
        // Two shared artifacts still yield a single a -> b edge.
        let (dag, _) = assemble(vec![
            task("a", &["/x", "/y"], &[]),
            task("b", &[], &["/x", "/y"]),
        ])
        .unwrap();
        assert_eq!(dag.successors("a").len(), 1);
        assert_eq!(dag.edge_count(), 2); // root -> a, a -> b
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = assemble(vec![task("a", &[], &[]), task("a", &["/t"], &[])]).unwrap_err();
        assert!(matches!(err, GridError::DuplicateTask(name) if name == "a"));
    }

    #[test]
    fn cycles_are_rejected() {
        let err = assemble(vec![
            task("a", &["/a"], &["/b"]),
            task("b", &["/b"], &["/a"]),
        ])
        .unwrap_err();
        assert!(matches!(err, GridError::DagCycle(_)));
    }

    #[test]
    fn descendants_are_transitive() {
        let (dag, _) = assemble(vec![
            task("a", &["/a"], &[]),
            task("b", &["/b"], &["/a"]),
            task("c", &[], &["/b"]),
            task("d", &[], &[]),
        ])
        .unwrap();
        let d = dag.descendants("a");
        assert_eq!(d.len(), 2);
        assert!(d.contains("b") && d.contains("c"));
    }
}
