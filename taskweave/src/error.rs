//! Error types shared across the orchestration engine.
//!
//! Structural errors (validation, cycles, duplicates, unknown names) are
//! fatal and never retried; task execution errors are retried by the
//! orchestrator up to its configured retry budget.

use thiserror::Error;

use crate::orchestrator::TaskResult;

/// Orchestration error kinds
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("adding dependency '{from}' -> '{to}' would create a cycle")]
    Cycle { from: String, to: String },

    #[error("graph already contains a node with id '{0}'")]
    DuplicateId(String),

    #[error("an agent named '{0}' is already registered")]
    DuplicateName(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("task '{task_id}' failed on agent '{agent}': {source}")]
    TaskExecution {
        task_id: String,
        agent: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("max iterations ({iterations}) exceeded before the plan reached a terminal state")]
    MaxIterationsExceeded {
        iterations: usize,
        /// Partial result at the moment the budget ran out (status Failed).
        result: Box<TaskResult>,
    },

    #[error("task '{task_id}' timed out after {timeout_secs}s")]
    Timeout { task_id: String, timeout_secs: u64 },

    #[error("execution canceled")]
    Canceled,

    #[error("plan is stuck: no executable nodes but {remaining} node(s) not terminal")]
    StuckPlan { remaining: usize },
}

impl OrchestratorError {
    /// Structural errors are returned immediately and never retried.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Cycle { .. }
                | Self::DuplicateId(_)
                | Self::DuplicateName(_)
                | Self::NotFound(_)
        )
    }
}

pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;
