//! Dependency graph of tasks with cycle-safe mutation and topological
//! scheduling primitives.
//!
//! The graph is the single shared mutable structure during execution and the
//! only object requiring synchronization: reads take the read lock, mutations
//! take the write lock, and no method calls another locking method
//! re-entrantly. Nodes live in an arena keyed by string id; dependency and
//! dependent lists are kept as bidirectional mirrors.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OrchestratorError, Result};

/// Stored node status. "Ready" is derived (see [`DependencyGraph::executable_nodes`]),
/// never stored. Transitions are monotonic: Pending -> Executing -> {Completed, Failed};
/// the orchestrator enforces the ordering, the graph only checks existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Completed | NodeStatus::Failed)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "pending"),
            NodeStatus::Executing => write!(f, "executing"),
            NodeStatus::Completed => write!(f, "completed"),
            NodeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A task node: one unit of work bound to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: String,
    /// Target agent name.
    pub agent: String,
    pub parameters: Value,
    /// Ids this node depends on.
    pub dependencies: Vec<String>,
    /// Inverse edges, mirror of `dependencies`.
    pub dependents: Vec<String>,
    /// Higher wins the tie-break within a stage.
    pub priority: i32,
    /// Stage index assigned by the optimizer.
    pub stage: Option<usize>,
    pub status: NodeStatus,
}

/// Per-status node counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub executing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Read-only aggregate over the graph, for scheduler observability and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub max_dependencies: usize,
    pub max_dependents: usize,
    pub avg_dependencies: f64,
    pub avg_dependents: f64,
    pub status_counts: StatusCounts,
}

#[derive(Debug, Default)]
struct GraphInner {
    nodes: HashMap<String, TaskNode>,
    /// Insertion order; drives deterministic iteration and sort tie-breaks.
    order: Vec<String>,
}

impl GraphInner {
    /// Depth-first reachability over dependency edges.
    fn reachable(&self, start: &str, target: &str) -> bool {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(id) {
                for dep in &node.dependencies {
                    stack.push(dep.as_str());
                }
            }
        }
        false
    }

    fn frontier(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| {
                let node = &self.nodes[*id];
                node.status == NodeStatus::Pending
                    && node.dependencies.iter().all(|dep| {
                        self.nodes
                            .get(dep)
                            .map(|d| d.status == NodeStatus::Completed)
                            .unwrap_or(false)
                    })
            })
            .cloned()
            .collect()
    }
}

/// Mutation-safe DAG of [`TaskNode`]s.
#[derive(Debug)]
pub struct DependencyGraph {
    inner: RwLock<GraphInner>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(GraphInner::default()),
        }
    }

    /// Insert a node with no edges. Fails with `DuplicateId` if the id exists.
    pub fn add_node(&self, id: &str, agent: &str, parameters: Value) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.nodes.contains_key(id) {
            return Err(OrchestratorError::DuplicateId(id.to_string()));
        }
        inner.nodes.insert(
            id.to_string(),
            TaskNode {
                id: id.to_string(),
                agent: agent.to_string(),
                parameters,
                dependencies: Vec::new(),
                dependents: Vec::new(),
                priority: 0,
                stage: None,
                status: NodeStatus::Pending,
            },
        );
        inner.order.push(id.to_string());
        Ok(())
    }

    pub fn set_priority(&self, id: &str, priority: i32) -> Result<()> {
        let mut inner = self.inner.write();
        let node = inner
            .nodes
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::NotFound(format!("node '{}'", id)))?;
        node.priority = priority;
        Ok(())
    }

    /// Record that `from` depends on `to`. Runs a reachability check from
    /// `to` back to `from` before mutating: if a path exists the edge would
    /// close a cycle, the call fails and the graph is left unchanged.
    pub fn add_dependency(&self, from: &str, to: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.nodes.contains_key(from) {
            return Err(OrchestratorError::NotFound(format!("node '{}'", from)));
        }
        if !inner.nodes.contains_key(to) {
            return Err(OrchestratorError::NotFound(format!("node '{}'", to)));
        }
        if from == to || inner.reachable(to, from) {
            return Err(OrchestratorError::Cycle {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        // Idempotent: the mirror invariant guarantees the inverse edge exists too.
        if inner.nodes[from].dependencies.iter().any(|d| d == to) {
            return Ok(());
        }
        inner
            .nodes
            .get_mut(from)
            .expect("checked above")
            .dependencies
            .push(to.to_string());
        inner
            .nodes
            .get_mut(to)
            .expect("checked above")
            .dependents
            .push(from.to_string());
        Ok(())
    }

    /// Kahn's algorithm. Ties among equally-ready nodes break by insertion
    /// order, so the sort is deterministic for identical input. Fails with
    /// `Cycle` if the result covers fewer nodes than the graph holds.
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        let inner = self.inner.read();
        let mut in_degree: HashMap<&str, usize> = inner
            .order
            .iter()
            .map(|id| (id.as_str(), inner.nodes[id].dependencies.len()))
            .collect();

        let mut queue: VecDeque<&str> = inner
            .order
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree[id] == 0)
            .collect();

        let mut sorted = Vec::with_capacity(inner.nodes.len());
        while let Some(id) = queue.pop_front() {
            sorted.push(id.to_string());
            for dependent in &inner.nodes[id].dependents {
                let degree = in_degree
                    .get_mut(dependent.as_str())
                    .expect("mirror invariant");
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependent.as_str());
                }
            }
        }

        if sorted.len() < inner.nodes.len() {
            let blocked = inner
                .order
                .iter()
                .find(|id| !sorted.contains(*id))
                .cloned()
                .unwrap_or_default();
            return Err(OrchestratorError::Cycle {
                from: blocked.clone(),
                to: blocked,
            });
        }
        Ok(sorted)
    }

    /// The scheduling frontier: every `Pending` node whose dependencies are
    /// all `Completed`. Recomputed on every call, never cached.
    pub fn executable_nodes(&self) -> Vec<String> {
        self.inner.read().frontier()
    }

    /// Frontier read plus `Executing` mark under a single write lock, so two
    /// dispatch loops can never claim the same node. Claims at most `limit`
    /// nodes, preferring higher priority, then insertion order.
    pub fn claim_executable(&self, limit: usize) -> Vec<String> {
        if limit == 0 {
            return Vec::new();
        }
        let mut inner = self.inner.write();
        let mut ready = inner.frontier();
        ready.sort_by_key(|id| {
            let priority = inner.nodes[id].priority;
            let position = inner.order.iter().position(|o| o == id).unwrap_or(0);
            (std::cmp::Reverse(priority), position)
        });
        ready.truncate(limit);
        for id in &ready {
            inner.nodes.get_mut(id).expect("frontier ids exist").status =
                NodeStatus::Executing;
        }
        ready
    }

    /// Direct status write; existence check only. The orchestrator enforces
    /// the monotonic transition order.
    pub fn mark_status(&self, id: &str, status: NodeStatus) -> Result<()> {
        let mut inner = self.inner.write();
        let node = inner
            .nodes
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::NotFound(format!("node '{}'", id)))?;
        node.status = status;
        Ok(())
    }

    pub fn assign_stage(&self, id: &str, stage: usize) -> Result<()> {
        let mut inner = self.inner.write();
        let node = inner
            .nodes
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::NotFound(format!("node '{}'", id)))?;
        node.stage = Some(stage);
        Ok(())
    }

    pub fn get_node(&self, id: &str) -> Option<TaskNode> {
        self.inner.read().nodes.get(id).cloned()
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> Vec<TaskNode> {
        let inner = self.inner.read();
        inner.order.iter().map(|id| inner.nodes[id].clone()).collect()
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn all_terminal(&self) -> bool {
        self.inner
            .read()
            .nodes
            .values()
            .all(|n| n.status.is_terminal())
    }

    pub fn remaining(&self) -> usize {
        self.inner
            .read()
            .nodes
            .values()
            .filter(|n| !n.status.is_terminal())
            .count()
    }

    /// Check referenced ids exist, the bidirectional mirror invariant holds,
    /// and no cycle exists. Used after construction and after cloning.
    pub fn validate(&self) -> Result<()> {
        {
            let inner = self.inner.read();
            for node in inner.nodes.values() {
                for dep in &node.dependencies {
                    let target = inner.nodes.get(dep).ok_or_else(|| {
                        OrchestratorError::Validation(format!(
                            "node '{}' depends on unknown node '{}'",
                            node.id, dep
                        ))
                    })?;
                    if !target.dependents.iter().any(|d| d == &node.id) {
                        return Err(OrchestratorError::Validation(format!(
                            "edge '{}' -> '{}' is missing its inverse",
                            node.id, dep
                        )));
                    }
                }
                for dependent in &node.dependents {
                    let source = inner.nodes.get(dependent).ok_or_else(|| {
                        OrchestratorError::Validation(format!(
                            "node '{}' lists unknown dependent '{}'",
                            node.id, dependent
                        ))
                    })?;
                    if !source.dependencies.iter().any(|d| d == &node.id) {
                        return Err(OrchestratorError::Validation(format!(
                            "inverse edge '{}' -> '{}' is missing its forward edge",
                            dependent, node.id
                        )));
                    }
                }
            }
        }
        self.topological_sort().map(|_| ())
    }

    /// Deep copy with a fresh node arena: re-adds nodes and edges rather than
    /// sharing node storage, so the clone is independently mutable.
    pub fn clone_graph(&self) -> DependencyGraph {
        let inner = self.inner.read();
        let clone = DependencyGraph::new();
        for id in &inner.order {
            let node = &inner.nodes[id];
            clone
                .add_node(&node.id, &node.agent, node.parameters.clone())
                .expect("source ids are unique");
            clone
                .set_priority(&node.id, node.priority)
                .expect("just inserted");
        }
        for id in &inner.order {
            let node = &inner.nodes[id];
            for dep in &node.dependencies {
                clone
                    .add_dependency(&node.id, dep)
                    .expect("source graph is acyclic");
            }
            clone
                .mark_status(&node.id, node.status)
                .expect("just inserted");
            if let Some(stage) = node.stage {
                clone.assign_stage(&node.id, stage).expect("just inserted");
            }
        }
        clone
    }

    pub fn stats(&self) -> GraphStats {
        let inner = self.inner.read();
        let total = inner.nodes.len();
        let mut counts = StatusCounts::default();
        let mut max_deps = 0usize;
        let mut max_dependents = 0usize;
        let mut sum_deps = 0usize;
        let mut sum_dependents = 0usize;
        for node in inner.nodes.values() {
            match node.status {
                NodeStatus::Pending => counts.pending += 1,
                NodeStatus::Executing => counts.executing += 1,
                NodeStatus::Completed => counts.completed += 1,
                NodeStatus::Failed => counts.failed += 1,
            }
            max_deps = max_deps.max(node.dependencies.len());
            max_dependents = max_dependents.max(node.dependents.len());
            sum_deps += node.dependencies.len();
            sum_dependents += node.dependents.len();
        }
        let denominator = total.max(1) as f64;
        GraphStats {
            total_nodes: total,
            max_dependencies: max_deps,
            max_dependents,
            avg_dependencies: sum_deps as f64 / denominator,
            avg_dependents: sum_dependents as f64 / denominator,
            status_counts: counts,
        }
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph_with(ids: &[&str]) -> DependencyGraph {
        let graph = DependencyGraph::new();
        for id in ids {
            graph.add_node(id, "echo", json!({})).unwrap();
        }
        graph
    }

    #[test]
    fn graph_is_debug_formattable() {
        // unwrap_err on Result<DependencyGraph> needs Debug on the Ok type
        let graph = graph_with(&["a"]);
        let rendered = format!("{:?}", graph);
        assert!(rendered.contains("GraphInner"));
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let graph = graph_with(&["a"]);
        let err = graph.add_node("a", "echo", json!({})).unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateId(_)));
    }

    #[test]
    fn cycle_rejected_and_graph_unchanged() {
        let graph = graph_with(&["a", "b"]);
        graph.add_dependency("a", "b").unwrap();
        let err = graph.add_dependency("b", "a").unwrap_err();
        assert!(matches!(err, OrchestratorError::Cycle { .. }));

        // exactly the edge a -> b remains
        let a = graph.get_node("a").unwrap();
        let b = graph.get_node("b").unwrap();
        assert_eq!(a.dependencies, vec!["b".to_string()]);
        assert!(a.dependents.is_empty());
        assert_eq!(b.dependents, vec!["a".to_string()]);
        assert!(b.dependencies.is_empty());
    }

    #[test]
    fn transitive_cycle_is_rejected() {
        let graph = graph_with(&["a", "b", "c"]);
        graph.add_dependency("a", "b").unwrap();
        graph.add_dependency("b", "c").unwrap();
        assert!(matches!(
            graph.add_dependency("c", "a"),
            Err(OrchestratorError::Cycle { .. })
        ));
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let graph = graph_with(&["a"]);
        assert!(matches!(
            graph.add_dependency("a", "a"),
            Err(OrchestratorError::Cycle { .. })
        ));
    }

    #[test]
    fn topological_sort_is_deterministic_and_respects_edges() {
        let graph = graph_with(&["a", "b", "c"]);
        graph.add_dependency("c", "a").unwrap();
        graph.add_dependency("c", "b").unwrap();

        let sorted = graph.topological_sort().unwrap();
        assert_eq!(sorted.len(), 3);
        let pos = |id: &str| sorted.iter().position(|s| s == id).unwrap();
        assert!(pos("c") > pos("a"));
        assert!(pos("c") > pos("b"));
        // insertion-order tie-break: a before b every time
        assert_eq!(sorted, vec!["a", "b", "c"]);
        assert_eq!(sorted, graph.topological_sort().unwrap());
    }

    #[test]
    fn frontier_tracks_completion() {
        let graph = graph_with(&["a", "b", "c"]);
        graph.add_dependency("b", "a").unwrap();
        graph.add_dependency("c", "b").unwrap();

        assert_eq!(graph.executable_nodes(), vec!["a"]);
        graph.mark_status("a", NodeStatus::Completed).unwrap();
        assert_eq!(graph.executable_nodes(), vec!["b"]);
        graph.mark_status("b", NodeStatus::Executing).unwrap();
        // executing nodes never reappear on the frontier
        assert!(graph.executable_nodes().is_empty());
        graph.mark_status("b", NodeStatus::Failed).unwrap();
        // c's dependency failed, so c is blocked forever
        assert!(graph.executable_nodes().is_empty());
    }

    #[test]
    fn claim_marks_executing_under_one_lock() {
        let graph = graph_with(&["a", "b"]);
        let first = graph.claim_executable(usize::MAX);
        assert_eq!(first.len(), 2);
        // a second claim sees nothing: the nodes are already Executing
        assert!(graph.claim_executable(usize::MAX).is_empty());
    }

    #[test]
    fn claim_prefers_priority_then_insertion_order() {
        let graph = graph_with(&["low", "high", "mid"]);
        graph.set_priority("high", 10).unwrap();
        graph.set_priority("mid", 5).unwrap();
        let claimed = graph.claim_executable(2);
        assert_eq!(claimed, vec!["high", "mid"]);
    }

    #[test]
    fn clone_is_independent() {
        let graph = graph_with(&["a", "b"]);
        graph.add_dependency("b", "a").unwrap();
        let clone = graph.clone_graph();
        clone.mark_status("a", NodeStatus::Completed).unwrap();

        assert_eq!(graph.get_node("a").unwrap().status, NodeStatus::Pending);
        assert_eq!(clone.get_node("a").unwrap().status, NodeStatus::Completed);
        assert!(clone.validate().is_ok());
    }

    #[test]
    fn stats_aggregate() {
        let graph = graph_with(&["a", "b", "c"]);
        graph.add_dependency("c", "a").unwrap();
        graph.add_dependency("c", "b").unwrap();
        graph.mark_status("a", NodeStatus::Completed).unwrap();

        let stats = graph.stats();
        assert_eq!(stats.total_nodes, 3);
        assert_eq!(stats.max_dependencies, 2);
        assert_eq!(stats.max_dependents, 1);
        assert_eq!(stats.status_counts.completed, 1);
        assert_eq!(stats.status_counts.pending, 2);
        assert!((stats.avg_dependencies - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn dependency_on_unknown_node_is_not_found() {
        let graph = graph_with(&["a"]);
        assert!(matches!(
            graph.add_dependency("a", "ghost"),
            Err(OrchestratorError::NotFound(_))
        ));
    }
}
