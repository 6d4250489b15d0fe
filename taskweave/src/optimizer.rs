//! Converts a raw dependency graph into a staged execution plan.
//!
//! Level 0 holds the nodes with no dependencies; level k holds nodes whose
//! dependencies all sit in levels below k. Each level becomes a stage: tasks
//! inside a stage carry no ordering constraint among themselves. Stages are
//! a scheduling hint for batch sizing; the orchestrator dispatches from the
//! live frontier, not stage barriers.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::graph::DependencyGraph;

/// A group of task ids safe to run concurrently.
#[derive(Debug, Clone, Serialize)]
pub struct Stage {
    pub index: usize,
    pub task_ids: Vec<String>,
}

/// Staged plan over a dependency graph.
pub struct ExecutionPlan {
    pub id: String,
    pub graph: Arc<DependencyGraph>,
    pub stages: Vec<Stage>,
    pub context: Arc<ExecutionContext>,
}

impl ExecutionPlan {
    /// Flattened task ids in stage order. Re-sorting this list yields a valid
    /// topological order of the input graph.
    pub fn task_ids(&self) -> Vec<String> {
        self.stages
            .iter()
            .flat_map(|s| s.task_ids.iter().cloned())
            .collect()
    }

    /// Size of the widest stage, the orchestrator's dispatch batch hint.
    pub fn max_stage_width(&self) -> usize {
        self.stages.iter().map(|s| s.task_ids.len()).max().unwrap_or(0)
    }
}

/// Computes topological levels and stage assignments.
pub struct PlanOptimizer;

impl PlanOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// Stage the graph. Reorders within a stage only (priority descending,
    /// then insertion order), never across stages.
    pub fn optimize(
        &self,
        graph: DependencyGraph,
        context: Arc<ExecutionContext>,
    ) -> Result<ExecutionPlan> {
        let sorted = graph.topological_sort()?;

        // insertion positions for the in-stage tie-break
        let positions: HashMap<String, usize> = graph
            .nodes()
            .into_iter()
            .enumerate()
            .map(|(i, node)| (node.id, i))
            .collect();

        let mut levels: HashMap<String, usize> = HashMap::new();
        for id in &sorted {
            let node = graph.get_node(id).expect("sorted ids exist");
            let level = node
                .dependencies
                .iter()
                .map(|dep| levels[dep] + 1)
                .max()
                .unwrap_or(0);
            levels.insert(id.clone(), level);
        }

        let stage_count = levels.values().copied().max().map_or(0, |m| m + 1);
        let mut stages: Vec<Stage> = (0..stage_count)
            .map(|index| Stage {
                index,
                task_ids: Vec::new(),
            })
            .collect();
        for id in &sorted {
            stages[levels[id]].task_ids.push(id.clone());
        }

        for stage in &mut stages {
            stage.task_ids.sort_by_key(|id| {
                let priority = graph.get_node(id).map(|n| n.priority).unwrap_or(0);
                (std::cmp::Reverse(priority), positions[id])
            });
            for id in &stage.task_ids {
                graph.assign_stage(id, stage.index)?;
            }
        }

        let plan = ExecutionPlan {
            id: Uuid::new_v4().to_string(),
            graph: Arc::new(graph),
            stages,
            context,
        };
        debug!(plan_id = %plan.id, stages = plan.stages.len(), "execution plan staged");
        Ok(plan)
    }
}

impl Default for PlanOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextManager;
    use serde_json::json;

    fn context() -> Arc<ExecutionContext> {
        ContextManager::new().create_context("test", None)
    }

    fn diamond() -> DependencyGraph {
        // a -> (b, c) -> d   (d depends on b and c, which depend on a)
        let graph = DependencyGraph::new();
        for id in ["a", "b", "c", "d"] {
            graph.add_node(id, "echo", json!({})).unwrap();
        }
        graph.add_dependency("b", "a").unwrap();
        graph.add_dependency("c", "a").unwrap();
        graph.add_dependency("d", "b").unwrap();
        graph.add_dependency("d", "c").unwrap();
        graph
    }

    #[test]
    fn diamond_graph_stages_into_three_levels() {
        let plan = PlanOptimizer::new().optimize(diamond(), context()).unwrap();
        assert_eq!(plan.stages.len(), 3);
        assert_eq!(plan.stages[0].task_ids, vec!["a"]);
        assert_eq!(plan.stages[1].task_ids.len(), 2);
        assert_eq!(plan.stages[2].task_ids, vec!["d"]);
        assert_eq!(plan.max_stage_width(), 2);
    }

    #[test]
    fn stage_assignment_written_back_to_nodes() {
        let plan = PlanOptimizer::new().optimize(diamond(), context()).unwrap();
        assert_eq!(plan.graph.get_node("a").unwrap().stage, Some(0));
        assert_eq!(plan.graph.get_node("d").unwrap().stage, Some(2));
    }

    #[test]
    fn priority_breaks_ties_within_a_stage() {
        let graph = DependencyGraph::new();
        for id in ["first", "second", "third"] {
            graph.add_node(id, "echo", json!({})).unwrap();
        }
        graph.set_priority("third", 100).unwrap();

        let plan = PlanOptimizer::new().optimize(graph, context()).unwrap();
        assert_eq!(plan.stages.len(), 1);
        assert_eq!(plan.stages[0].task_ids, vec!["third", "first", "second"]);
    }

    #[test]
    fn flattened_order_respects_every_edge() {
        let plan = PlanOptimizer::new().optimize(diamond(), context()).unwrap();
        let flat = plan.task_ids();
        let pos = |id: &str| flat.iter().position(|t| t == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }
}
