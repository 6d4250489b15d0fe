//! Taskweave - Core Library
//!
//! A multi-agent task orchestration engine: requests are classified into
//! intents, expanded into dependency graphs, staged, and executed across
//! registered agents with retry, timeout, and cancellation support.

pub mod agent;
pub mod batch;
pub mod builder;
pub mod cli;
pub mod context;
pub mod error;
pub mod graph;
pub mod intent;
pub mod optimizer;
pub mod orchestrator;
pub mod settings;
pub mod telemetry;

pub use agent::{Agent, AgentRegistry, AgentRequest, AgentResult};
pub use context::{ContextManager, ExecutionContext};
pub use error::{OrchestratorError, Result};
pub use graph::{DependencyGraph, NodeStatus, TaskNode};
pub use orchestrator::{Orchestrator, TaskResult, TaskResultStatus};
