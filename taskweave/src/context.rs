//! Per-request execution context and the manager that owns it.
//!
//! One [`ExecutionContext`] is created per orchestration request and threaded
//! through planning and execution. Shared data is guarded by its own lock,
//! independent of the graph lock, because concurrently running tasks read and
//! write it outside the scheduler's critical section.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Shared state for a single orchestration request.
#[derive(Debug)]
pub struct ExecutionContext {
    pub session_id: String,
    pub request_id: String,
    pub original_request: String,
    pub created_at: DateTime<Utc>,
    shared_data: RwLock<HashMap<String, Value>>,
    cancel: CancellationToken,
}

impl ExecutionContext {
    fn new(session_id: String, original_request: &str, seed: HashMap<String, Value>) -> Self {
        Self {
            session_id,
            request_id: Uuid::new_v4().to_string(),
            original_request: original_request.to_string(),
            created_at: Utc::now(),
            shared_data: RwLock::new(seed),
            cancel: CancellationToken::new(),
        }
    }

    pub fn set_shared(&self, key: impl Into<String>, value: Value) {
        self.shared_data.write().insert(key.into(), value);
    }

    pub fn get_shared(&self, key: &str) -> Option<Value> {
        self.shared_data.read().get(key).cloned()
    }

    /// Snapshot of the shared map, used for session continuity.
    pub fn shared_snapshot(&self) -> HashMap<String, Value> {
        self.shared_data.read().clone()
    }

    /// Signal cancellation: the orchestrator stops dispatching new frontier
    /// nodes and in-flight agents are expected to return promptly.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Creates and owns execution contexts, optionally keyed by session id so a
/// caller can carry shared data across requests.
pub struct ContextManager {
    sessions: DashMap<String, Arc<ExecutionContext>>,
}

impl ContextManager {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Create a fresh context for a request. With a session id, shared data
    /// from the session's previous context seeds the new one and the session
    /// entry is kept alive; without one the context is anonymous and dropped
    /// when the orchestration call returns.
    pub fn create_context(
        &self,
        original_request: &str,
        session_id: Option<&str>,
    ) -> Arc<ExecutionContext> {
        match session_id {
            Some(session) => {
                let seed = self
                    .sessions
                    .get(session)
                    .map(|prior| prior.shared_snapshot())
                    .unwrap_or_default();
                let ctx = Arc::new(ExecutionContext::new(
                    session.to_string(),
                    original_request,
                    seed,
                ));
                self.sessions.insert(session.to_string(), ctx.clone());
                ctx
            }
            None => Arc::new(ExecutionContext::new(
                Uuid::new_v4().to_string(),
                original_request,
                HashMap::new(),
            )),
        }
    }

    pub fn get_session(&self, session_id: &str) -> Option<Arc<ExecutionContext>> {
        self.sessions.get(session_id).map(|c| c.clone())
    }

    pub fn drop_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn anonymous_contexts_are_independent() {
        let manager = ContextManager::new();
        let a = manager.create_context("req a", None);
        let b = manager.create_context("req b", None);
        assert_ne!(a.request_id, b.request_id);
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(manager.session_count(), 0);
    }

    #[test]
    fn session_carries_shared_data_forward() {
        let manager = ContextManager::new();
        let first = manager.create_context("first", Some("sess-1"));
        first.set_shared("cursor", json!(42));

        let second = manager.create_context("second", Some("sess-1"));
        assert_eq!(second.get_shared("cursor"), Some(json!(42)));
        assert_ne!(first.request_id, second.request_id);
        assert_eq!(second.session_id, "sess-1");

        manager.drop_session("sess-1");
        assert!(manager.get_session("sess-1").is_none());
    }

    #[test]
    fn cancellation_is_observable() {
        let manager = ContextManager::new();
        let ctx = manager.create_context("req", None);
        assert!(!ctx.is_canceled());
        ctx.cancel();
        assert!(ctx.is_canceled());
        assert!(ctx.cancellation_token().is_cancelled());
    }
}
