//! Maps a classified intent onto a dependency graph of agent-bound tasks.
//!
//! Each primary intent tag has a fixed template: one or more task skeletons
//! naming a target agent and any intra-template dependencies. Template bugs
//! should never produce cycles, but edge insertion checks unconditionally.

use serde_json::json;
use tracing::debug;

use crate::agent::AgentRegistry;
use crate::error::{OrchestratorError, Result};
use crate::graph::DependencyGraph;
use crate::intent::{Intent, GENERAL_INTENT};

struct TaskTemplate {
    id: &'static str,
    agent: &'static str,
    depends_on: &'static [&'static str],
    priority: i32,
}

struct IntentTemplate {
    tag: &'static str,
    tasks: &'static [TaskTemplate],
}

static TEMPLATES: &[IntentTemplate] = &[
    IntentTemplate {
        tag: "file_operation",
        tasks: &[
            TaskTemplate {
                id: "scan_targets",
                agent: "file_operations",
                depends_on: &[],
                priority: 10,
            },
            TaskTemplate {
                id: "apply_changes",
                agent: "file_operations",
                depends_on: &["scan_targets"],
                priority: 5,
            },
        ],
    },
    IntentTemplate {
        tag: "code_analysis",
        tasks: &[
            TaskTemplate {
                id: "collect_sources",
                agent: "file_operations",
                depends_on: &[],
                priority: 10,
            },
            TaskTemplate {
                id: "review_code",
                agent: "code_review",
                depends_on: &["collect_sources"],
                priority: 5,
            },
        ],
    },
    IntentTemplate {
        tag: "search",
        tasks: &[TaskTemplate {
            id: "run_search",
            agent: "search",
            depends_on: &[],
            priority: 10,
        }],
    },
    IntentTemplate {
        tag: GENERAL_INTENT,
        tasks: &[TaskTemplate {
            id: "respond",
            agent: "echo",
            depends_on: &[],
            priority: 0,
        }],
    },
];

/// Builds execution graphs from intents and the agent registry.
pub struct ExecutionGraphBuilder;

impl ExecutionGraphBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Instantiate the template for `intent.primary` into a fresh graph.
    /// Fails with `NotFound` when no template exists for the tag or when a
    /// template names an unregistered agent.
    pub fn build_graph(&self, intent: &Intent, registry: &AgentRegistry) -> Result<DependencyGraph> {
        let template = TEMPLATES
            .iter()
            .find(|t| t.tag == intent.primary)
            .ok_or_else(|| {
                OrchestratorError::NotFound(format!(
                    "no task template for intent '{}'",
                    intent.primary
                ))
            })?;

        let graph = DependencyGraph::new();
        for task in template.tasks {
            if !registry.contains(task.agent) {
                return Err(OrchestratorError::NotFound(format!(
                    "agent '{}' required by intent '{}' is not registered",
                    task.agent, intent.primary
                )));
            }
            let parameters = json!({
                "intent": intent.primary,
                "secondary": intent.secondary,
                "entities": intent.entities,
            });
            graph.add_node(task.id, task.agent, parameters)?;
            graph.set_priority(task.id, task.priority)?;
        }
        for task in template.tasks {
            for dep in task.depends_on {
                graph.add_dependency(task.id, dep)?;
            }
        }

        graph.validate()?;
        debug!(
            intent = %intent.primary,
            nodes = graph.node_count(),
            "execution graph built"
        );
        Ok(graph)
    }
}

impl Default for ExecutionGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{CodeReviewAgent, EchoAgent, FileOperationsAgent, SearchAgent};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn full_registry() -> AgentRegistry {
        let registry = AgentRegistry::new();
        registry.register(Arc::new(SearchAgent::new())).unwrap();
        registry
            .register(Arc::new(FileOperationsAgent::new()))
            .unwrap();
        registry.register(Arc::new(CodeReviewAgent::new())).unwrap();
        registry.register(Arc::new(EchoAgent)).unwrap();
        registry
    }

    fn intent(primary: &str) -> Intent {
        Intent {
            primary: primary.to_string(),
            secondary: Vec::new(),
            entities: HashMap::new(),
        }
    }

    #[test]
    fn file_operation_template_wires_dependencies() {
        let builder = ExecutionGraphBuilder::new();
        let graph = builder
            .build_graph(&intent("file_operation"), &full_registry())
            .unwrap();

        assert_eq!(graph.node_count(), 2);
        let apply = graph.get_node("apply_changes").unwrap();
        assert_eq!(apply.dependencies, vec!["scan_targets".to_string()]);
        assert_eq!(apply.agent, "file_operations");
        assert_eq!(graph.executable_nodes(), vec!["scan_targets"]);
    }

    #[test]
    fn unknown_intent_tag_is_not_found() {
        let builder = ExecutionGraphBuilder::new();
        let err = builder
            .build_graph(&intent("interpretive_dance"), &full_registry())
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
    }

    #[test]
    fn missing_agent_is_not_found() {
        let registry = AgentRegistry::new();
        registry.register(Arc::new(EchoAgent)).unwrap();
        let builder = ExecutionGraphBuilder::new();
        let err = builder
            .build_graph(&intent("search"), &registry)
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
    }

    #[test]
    fn every_template_builds_against_the_full_registry() {
        let builder = ExecutionGraphBuilder::new();
        let registry = full_registry();
        for tag in ["file_operation", "code_analysis", "search", GENERAL_INTENT] {
            let graph = builder.build_graph(&intent(tag), &registry).unwrap();
            assert!(graph.validate().is_ok(), "template '{}' must validate", tag);
            assert!(graph.node_count() >= 1);
        }
    }
}
