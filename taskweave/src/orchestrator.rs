//! Core coordinator: agent registry access, confidence-based routing, and
//! the plan execution loop.
//!
//! Dispatch discipline is a dynamic frontier. Whenever a task completes the
//! frontier is recomputed and newly unblocked nodes dispatch immediately; the
//! optimizer's stages only size the in-flight batch. Claiming a node and
//! marking it `Executing` happen under one graph write lock, so concurrent
//! execute calls never dispatch a node twice.

use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use futures::Future;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::agent::{Agent, AgentRegistry, AgentRequest};
use crate::builder::ExecutionGraphBuilder;
use crate::context::{ContextManager, ExecutionContext};
use crate::error::{OrchestratorError, Result};
use crate::graph::{DependencyGraph, NodeStatus};
use crate::intent::{Intent, IntentAnalyzer};
use crate::optimizer::{ExecutionPlan, PlanOptimizer};
use crate::settings::OrchestratorConfig;

/// How a routing query was resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Selected agent name.
    pub provider: String,
    /// Intent tag that drove the query.
    pub matched_rule: String,
    /// True when only a low-confidence catch-all volunteered.
    pub is_default: bool,
    pub confidence: f64,
}

/// Confidence at or below which a route counts as a default fallback.
const DEFAULT_ROUTE_FLOOR: f64 = 0.5;

/// One per-agent response in a task result's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub task_id: String,
    pub agent_name: String,
    pub success: bool,
    pub summary: String,
    /// Total attempts, including the first.
    pub attempts: u32,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResultStatus {
    Completed,
    PartiallyCompleted,
    Failed,
}

/// Aggregated outcome of one orchestration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Request id, unique per execute call.
    pub id: String,
    /// Joined summaries of the completed tasks.
    pub result: String,
    /// Ordered per-agent responses, in completion order.
    pub history: Vec<AgentResponse>,
    pub status: TaskResultStatus,
    pub duration_ms: u64,
}

/// Drives a request from classification through plan completion.
pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    analyzer: IntentAnalyzer,
    builder: ExecutionGraphBuilder,
    optimizer: PlanOptimizer,
    contexts: Arc<ContextManager>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(registry: Arc<AgentRegistry>, config: OrchestratorConfig) -> Self {
        Self {
            registry,
            analyzer: IntentAnalyzer::new(),
            builder: ExecutionGraphBuilder::new(),
            optimizer: PlanOptimizer::new(),
            contexts: Arc::new(ContextManager::new()),
            config,
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn context_manager(&self) -> &ContextManager {
        &self.contexts
    }

    /// Register an agent. Fails with a duplicate-name error if taken.
    pub fn register_agent(&self, agent: Arc<dyn Agent>) -> Result<()> {
        info!(agent = agent.name(), "registering agent");
        self.registry.register(agent)
    }

    pub fn list_agents(&self) -> Vec<Arc<dyn Agent>> {
        self.registry.agents()
    }

    /// Classify a query without executing it.
    pub fn analyze_intent(&self, query: &str) -> Result<Intent> {
        self.analyzer.analyze(query)
    }

    /// Select the registered agent with the highest confidence for the
    /// context's request. Ties go to the earliest-registered agent.
    #[instrument(skip(self, ctx, intent), fields(intent = %intent.primary))]
    pub fn route(&self, ctx: &ExecutionContext, intent: &Intent) -> Result<RoutingDecision> {
        let prompt = ctx.original_request.as_str();
        let mut best: Option<(String, f64)> = None;
        for agent in self.registry.agents() {
            let (can, raw) = agent.can_handle(prompt);
            if !can {
                continue;
            }
            let confidence = raw.clamp(0.0, 1.0);
            if raw != confidence {
                warn!(agent = agent.name(), raw, "confidence outside [0,1], clamped");
            }
            // strict comparison keeps registration order on ties
            if best.as_ref().map(|(_, c)| confidence > *c).unwrap_or(true) {
                best = Some((agent.name().to_string(), confidence));
            }
        }
        let (provider, confidence) = best.ok_or_else(|| {
            OrchestratorError::NotFound(format!(
                "no registered agent can handle intent '{}'",
                intent.primary
            ))
        })?;
        debug!(provider = %provider, confidence, "routing decision");
        Ok(RoutingDecision {
            provider,
            matched_rule: intent.primary.clone(),
            is_default: confidence <= DEFAULT_ROUTE_FLOOR,
            confidence,
        })
    }

    /// Run a free-form request end to end: classify, build, stage, execute.
    pub async fn execute(&self, request: &str) -> Result<TaskResult> {
        self.execute_with_session(request, None).await
    }

    /// Like [`Self::execute`], but keyed to a session so shared context data
    /// carries across requests.
    #[instrument(skip(self, request))]
    pub async fn execute_with_session(
        &self,
        request: &str,
        session_id: Option<&str>,
    ) -> Result<TaskResult> {
        if request.trim().is_empty() {
            return Err(OrchestratorError::Validation(
                "request must not be empty".to_string(),
            ));
        }

        let intent = self.analyzer.analyze(request)?;
        let ctx = self.contexts.create_context(request, session_id);
        let graph = self.builder.build_graph(&intent, &self.registry)?;
        let plan = self.optimizer.optimize(graph, ctx)?;
        info!(
            plan_id = %plan.id,
            request_id = %plan.context.request_id,
            intent = %intent.primary,
            tasks = plan.graph.node_count(),
            stages = plan.stages.len(),
            "executing plan"
        );
        self.run_plan(plan).await
    }

    /// The orchestration loop. One iteration is one scheduling pass that
    /// claims a non-empty frontier batch; completions re-enter the loop
    /// immediately, so nothing waits on a nominal stage boundary.
    async fn run_plan(&self, plan: ExecutionPlan) -> Result<TaskResult> {
        let graph = plan.graph.clone();
        let ctx = plan.context.clone();
        let started = Instant::now();
        let batch_hint = plan
            .max_stage_width()
            .max(1)
            .min(self.config.max_concurrent_tasks);

        let mut in_flight: FuturesUnordered<
            Pin<Box<dyn Future<Output = AgentResponse> + Send + '_>>,
        > = FuturesUnordered::new();
        let mut history: Vec<AgentResponse> = Vec::new();
        let mut iterations = 0usize;
        let mut iterations_exceeded = false;

        loop {
            let canceled = ctx.is_canceled();

            if !canceled && !iterations_exceeded {
                let capacity = batch_hint.saturating_sub(in_flight.len());
                if capacity > 0 {
                    if iterations >= self.config.max_iterations {
                        if !graph.executable_nodes().is_empty() {
                            iterations_exceeded = true;
                        }
                    } else {
                        let claimed = graph.claim_executable(capacity);
                        if !claimed.is_empty() {
                            iterations += 1;
                            debug!(iteration = iterations, batch = claimed.len(), "dispatching frontier batch");
                            for task_id in claimed {
                                in_flight.push(Box::pin(self.dispatch_task(
                                    task_id,
                                    graph.clone(),
                                    ctx.clone(),
                                )));
                            }
                        }
                    }
                }
            }

            if in_flight.is_empty() {
                if graph.all_terminal() {
                    break;
                }
                if canceled || iterations_exceeded {
                    // remaining pending nodes will never run
                    self.fail_remaining(&graph);
                    break;
                }
                if graph
                    .nodes()
                    .iter()
                    .any(|n| n.status == NodeStatus::Failed)
                {
                    // descendants of a failed node are permanently blocked
                    self.fail_remaining(&graph);
                    break;
                }
                return Err(OrchestratorError::StuckPlan {
                    remaining: graph.remaining(),
                });
            }

            if let Some(response) = in_flight.next().await {
                let status = if response.success {
                    NodeStatus::Completed
                } else {
                    NodeStatus::Failed
                };
                graph.mark_status(&response.task_id, status)?;
                history.push(response);
            }
        }

        let result = self.aggregate(&ctx, history, graph.node_count(), started);
        if ctx.is_canceled() {
            return Err(OrchestratorError::Canceled);
        }
        if iterations_exceeded {
            warn!(request_id = %ctx.request_id, iterations, "iteration budget exhausted");
            let mut result = result;
            result.status = TaskResultStatus::Failed;
            return Err(OrchestratorError::MaxIterationsExceeded {
                iterations: self.config.max_iterations,
                result: Box::new(result),
            });
        }
        info!(
            request_id = %ctx.request_id,
            status = ?result.status,
            duration_ms = result.duration_ms,
            "plan finished"
        );
        Ok(result)
    }

    /// Execute one node with retry and timeout. Retries reuse the identical
    /// parameters; cancellation fails the task without consuming a retry.
    async fn dispatch_task(
        &self,
        task_id: String,
        graph: Arc<DependencyGraph>,
        ctx: Arc<ExecutionContext>,
    ) -> AgentResponse {
        let started = Instant::now();
        let node = match graph.get_node(&task_id) {
            Some(node) => node,
            None => {
                return AgentResponse {
                    task_id,
                    agent_name: String::new(),
                    success: false,
                    summary: "task vanished from the graph".to_string(),
                    attempts: 0,
                    duration_ms: 0,
                }
            }
        };
        let agent = match self.registry.get(&node.agent) {
            Some(agent) => agent,
            None => {
                return AgentResponse {
                    task_id,
                    agent_name: node.agent,
                    success: false,
                    summary: "target agent is not registered".to_string(),
                    attempts: 0,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        };

        let task_timeout = Duration::from_secs(self.config.task_timeout_seconds);
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            if ctx.is_canceled() {
                return AgentResponse {
                    task_id,
                    agent_name: node.agent,
                    success: false,
                    summary: "canceled".to_string(),
                    attempts,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
            }

            let request = AgentRequest {
                prompt: ctx.original_request.clone(),
                parameters: node.parameters.clone(),
                context: ctx.clone(),
            };
            let outcome = timeout(task_timeout, agent.execute(request)).await;

            let failure = match outcome {
                Ok(Ok(result)) if result.success => {
                    debug!(task = %task_id, agent = %node.agent, attempts, "task completed");
                    return AgentResponse {
                        task_id,
                        agent_name: node.agent,
                        success: true,
                        summary: result.summary,
                        attempts,
                        duration_ms: started.elapsed().as_millis() as u64,
                    };
                }
                Ok(Ok(result)) => result.summary,
                Ok(Err(err)) => OrchestratorError::TaskExecution {
                    task_id: task_id.clone(),
                    agent: node.agent.clone(),
                    source: err,
                }
                .to_string(),
                Err(_) => OrchestratorError::Timeout {
                    task_id: task_id.clone(),
                    timeout_secs: self.config.task_timeout_seconds,
                }
                .to_string(),
            };

            if ctx.is_canceled() || attempts > self.config.max_retries {
                warn!(task = %task_id, agent = %node.agent, attempts, error = %failure, "task failed");
                return AgentResponse {
                    task_id,
                    agent_name: node.agent,
                    success: false,
                    summary: failure,
                    attempts,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
            }
            warn!(task = %task_id, agent = %node.agent, attempt = attempts, error = %failure, "retrying task");
        }
    }

    fn fail_remaining(&self, graph: &DependencyGraph) {
        for node in graph.nodes() {
            if !node.status.is_terminal() {
                let _ = graph.mark_status(&node.id, NodeStatus::Failed);
            }
        }
    }

    fn aggregate(
        &self,
        ctx: &ExecutionContext,
        history: Vec<AgentResponse>,
        node_count: usize,
        started: Instant,
    ) -> TaskResult {
        let completed = history.iter().filter(|r| r.success).count();
        let failed = history.len() - completed;

        let status = if failed == 0 && completed == node_count {
            TaskResultStatus::Completed
        } else if completed > 0 {
            TaskResultStatus::PartiallyCompleted
        } else {
            TaskResultStatus::Failed
        };

        let result = history
            .iter()
            .filter(|r| r.success)
            .map(|r| r.summary.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        TaskResult {
            id: ctx.request_id.clone(),
            result,
            history,
            status,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}
