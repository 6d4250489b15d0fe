//! Agent capability contract and the built-in demo agents.
//!
//! The engine only depends on the three-method [`Agent`] contract; concrete
//! agents (file operations, search, code review backed by real tools) live
//! outside the core. The built-ins here report graded keyword confidence and
//! produce deterministic summaries, which is enough for routing, planning
//! and tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::context::ExecutionContext;

/// A unit of work request handed to an agent.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// The prompt or task description the agent should attempt.
    pub prompt: String,
    /// Structured parameters from the task template.
    pub parameters: Value,
    /// Per-request context (shared data, cancellation).
    pub context: Arc<ExecutionContext>,
}

/// Agent execution outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub metadata: AgentMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub agent_name: String,
    pub files_processed: u64,
}

impl AgentResult {
    pub fn success(agent_name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            success: true,
            summary: summary.into(),
            details: None,
            metadata: AgentMetadata {
                agent_name: agent_name.into(),
                files_processed: 0,
            },
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// The sole coupling point between the engine and concrete agents.
///
/// Identity is the name, unique within a registry. Confidence returned by
/// `can_handle` must lie in `[0.0, 1.0]`.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this agent can attempt the prompt, and with what confidence.
    fn can_handle(&self, prompt: &str) -> (bool, f64);

    async fn execute(&self, request: AgentRequest) -> Result<AgentResult>;
}

#[derive(Default)]
struct RegistryInner {
    agents: std::collections::HashMap<String, Arc<dyn Agent>>,
    /// Registration order; routing ties break on it.
    order: Vec<String>,
}

/// Explicit agent registry, constructed once and injected wherever agents
/// are looked up. No global state.
pub struct AgentRegistry {
    inner: parking_lot::RwLock<RegistryInner>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            inner: parking_lot::RwLock::new(RegistryInner::default()),
        }
    }

    /// Register an agent. Fails if the name is taken; identity is the name.
    pub fn register(&self, agent: Arc<dyn Agent>) -> crate::error::Result<()> {
        let mut inner = self.inner.write();
        let name = agent.name().to_string();
        if inner.agents.contains_key(&name) {
            return Err(crate::error::OrchestratorError::DuplicateName(name));
        }
        inner.order.push(name.clone());
        inner.agents.insert(name, agent);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.inner.read().agents.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().agents.contains_key(name)
    }

    /// Agents in registration order.
    pub fn agents(&self) -> Vec<Arc<dyn Agent>> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .map(|name| inner.agents[name].clone())
            .collect()
    }

    /// Agent names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().agents.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Graded confidence from keyword hits: one hit clears the routing floor,
/// additional hits raise the score toward the cap.
fn keyword_confidence(prompt: &str, keywords: &[&str]) -> (bool, f64) {
    let lowered = prompt.to_lowercase();
    let hits = keywords.iter().filter(|k| lowered.contains(**k)).count();
    if hits == 0 {
        return (false, 0.0);
    }
    let confidence = (0.7 + 0.15 * hits as f64).min(0.95);
    (true, confidence)
}

// --- Built-in agents ---

/// Content and code search.
pub struct SearchAgent {
    request_count: AtomicU64,
}

impl SearchAgent {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
        }
    }
}

impl Default for SearchAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for SearchAgent {
    fn name(&self) -> &str {
        "search"
    }

    fn can_handle(&self, prompt: &str) -> (bool, f64) {
        keyword_confidence(prompt, &["search", "find", "look for", "grep", "locate"])
    }

    async fn execute(&self, request: AgentRequest) -> Result<AgentResult> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if request.context.is_canceled() {
            return Err(anyhow!("search canceled"));
        }
        info!(prompt = %request.prompt, "search agent executing");
        Ok(
            AgentResult::success(self.name(), format!("search completed: {}", request.prompt))
                .with_details(request.parameters),
        )
    }
}

/// File create/read/write/move operations.
pub struct FileOperationsAgent {
    request_count: AtomicU64,
}

impl FileOperationsAgent {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
        }
    }
}

impl Default for FileOperationsAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for FileOperationsAgent {
    fn name(&self) -> &str {
        "file_operations"
    }

    fn can_handle(&self, prompt: &str) -> (bool, f64) {
        keyword_confidence(
            prompt,
            &[
                "file", "read", "write", "create", "delete", "move", "copy", "rename",
                "directory",
            ],
        )
    }

    async fn execute(&self, request: AgentRequest) -> Result<AgentResult> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if request.context.is_canceled() {
            return Err(anyhow!("file operation canceled"));
        }
        info!(prompt = %request.prompt, "file operations agent executing");
        let mut result = AgentResult::success(
            self.name(),
            format!("file operations completed: {}", request.prompt),
        );
        result.metadata.files_processed = request
            .parameters
            .get("paths")
            .and_then(Value::as_array)
            .map(|paths| paths.len() as u64)
            .unwrap_or(0);
        Ok(result)
    }
}

/// Source review and analysis.
pub struct CodeReviewAgent {
    request_count: AtomicU64,
}

impl CodeReviewAgent {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
        }
    }
}

impl Default for CodeReviewAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for CodeReviewAgent {
    fn name(&self) -> &str {
        "code_review"
    }

    fn can_handle(&self, prompt: &str) -> (bool, f64) {
        keyword_confidence(
            prompt,
            &["review", "analyze", "lint", "refactor", "audit", "quality"],
        )
    }

    async fn execute(&self, request: AgentRequest) -> Result<AgentResult> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if request.context.is_canceled() {
            return Err(anyhow!("code review canceled"));
        }
        info!(prompt = %request.prompt, "code review agent executing");
        Ok(AgentResult::success(
            self.name(),
            format!("code review completed: {}", request.prompt),
        ))
    }
}

/// Fallback that accepts everything with low confidence. Useful in tests and
/// as a last-resort route for prompts no specialist matches.
pub struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        "echo"
    }

    fn can_handle(&self, _prompt: &str) -> (bool, f64) {
        (true, 0.1)
    }

    async fn execute(&self, request: AgentRequest) -> Result<AgentResult> {
        Ok(AgentResult::success(
            self.name(),
            format!("echo: {}", request.prompt),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextManager;
    use serde_json::json;

    fn request(prompt: &str) -> AgentRequest {
        let manager = ContextManager::new();
        AgentRequest {
            prompt: prompt.to_string(),
            parameters: json!({}),
            context: manager.create_context(prompt, None),
        }
    }

    #[test]
    fn search_agent_confidence_clears_routing_floor() {
        let agent = SearchAgent::new();
        let (ok, confidence) = agent.can_handle("search for all TODO comments in the project");
        assert!(ok);
        assert!(confidence >= 0.8);
        assert!(confidence <= 1.0);
    }

    #[test]
    fn file_agent_rejects_unrelated_prompt() {
        let agent = FileOperationsAgent::new();
        let (ok, confidence) = agent.can_handle("summarize the meeting notes");
        assert!(!ok);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn confidence_is_capped() {
        let agent = FileOperationsAgent::new();
        let (_, confidence) =
            agent.can_handle("create a file, write it, copy it, move it, delete the directory");
        assert!(confidence <= 1.0);
    }

    #[tokio::test]
    async fn echo_agent_roundtrip() {
        let agent = EchoAgent;
        let result = agent.execute(request("hello")).await.unwrap();
        assert!(result.success);
        assert!(result.summary.contains("hello"));
        assert_eq!(result.metadata.agent_name, "echo");
    }

    #[tokio::test]
    async fn canceled_context_aborts_execution() {
        let agent = SearchAgent::new();
        let req = request("search something");
        req.context.cancel();
        assert!(agent.execute(req).await.is_err());
    }

    #[test]
    fn registry_rejects_duplicate_names_and_keeps_order() {
        let registry = AgentRegistry::new();
        registry.register(Arc::new(SearchAgent::new())).unwrap();
        registry.register(Arc::new(EchoAgent)).unwrap();
        assert!(registry.register(Arc::new(SearchAgent::new())).is_err());

        assert_eq!(registry.names(), vec!["search", "echo"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("echo"));
        assert!(registry.get("missing").is_none());
    }
}
