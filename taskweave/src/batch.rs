//! Batch front end: run a TOML file of pre-configured requests through the
//! orchestrator, with a printed summary and optional JSON results output.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::agent::{
    AgentRegistry, CodeReviewAgent, EchoAgent, FileOperationsAgent, SearchAgent,
};
use crate::orchestrator::{Orchestrator, TaskResultStatus};
use crate::settings::Settings;

/// Batch job configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub job: JobMetadata,
    pub requests: Vec<RequestConfig>,
    #[serde(default)]
    pub settings: BatchSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Identifier used in the summary output.
    pub id: String,
    /// Free-form request routed through intent classification.
    pub request: String,
    /// Requests sharing a session see each other's shared context data.
    pub session: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Where to write JSON results, if anywhere.
    pub output_file: Option<PathBuf>,
    /// Stop at the first failed request.
    #[serde(default)]
    pub fail_fast: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            output_file: None,
            fail_fast: false,
        }
    }
}

/// Outcome of one request in the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub id: String,
    pub success: bool,
    pub summary: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    PartialSuccess,
    Failed,
}

/// Complete batch execution result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub job_name: String,
    pub status: BatchStatus,
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub total_duration_ms: u64,
    pub outcomes: Vec<RequestOutcome>,
}

/// Execute a batch job from a configuration file.
#[instrument(skip(settings))]
pub async fn run(config_path: PathBuf, settings: Settings) -> Result<()> {
    info!("starting batch execution from {:?}", config_path);

    let config = load_batch_config(&config_path)
        .context("failed to load batch configuration")?;
    info!("loaded batch job: {}", config.job.name);

    let output_file = config.settings.output_file.clone();
    let orchestrator = Arc::new(default_orchestrator(&settings)?);

    let result = execute_batch(&orchestrator, config).await;
    print_batch_summary(&result);

    if let Some(ref path) = output_file {
        save_batch_results(&result, path).context("failed to save batch results")?;
    }

    match result.status {
        BatchStatus::Success => Ok(()),
        BatchStatus::PartialSuccess => {
            warn!("batch completed with some failures");
            Ok(())
        }
        BatchStatus::Failed => {
            error!("batch execution failed");
            Err(anyhow!("batch job '{}' failed", result.job_name))
        }
    }
}

/// Build an orchestrator with the built-in agents registered.
pub fn default_orchestrator(settings: &Settings) -> Result<Orchestrator> {
    let registry = Arc::new(AgentRegistry::new());
    let orchestrator = Orchestrator::new(registry, settings.orchestrator.clone());
    orchestrator.register_agent(Arc::new(SearchAgent::new()))?;
    orchestrator.register_agent(Arc::new(FileOperationsAgent::new()))?;
    orchestrator.register_agent(Arc::new(CodeReviewAgent::new()))?;
    orchestrator.register_agent(Arc::new(EchoAgent))?;
    Ok(orchestrator)
}

fn load_batch_config(config_path: &Path) -> Result<BatchConfig> {
    let contents = std::fs::read_to_string(config_path)
        .with_context(|| format!("failed to read config file: {:?}", config_path))?;
    let config: BatchConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse TOML config: {:?}", config_path))?;
    validate_batch_config(&config)?;
    Ok(config)
}

fn validate_batch_config(config: &BatchConfig) -> Result<()> {
    if config.requests.is_empty() {
        return Err(anyhow!("batch configuration must contain at least one request"));
    }
    let mut ids = std::collections::HashSet::new();
    for req in &config.requests {
        if !ids.insert(&req.id) {
            return Err(anyhow!("duplicate request id: {}", req.id));
        }
        if req.request.trim().is_empty() {
            return Err(anyhow!("request '{}' has an empty prompt", req.id));
        }
    }
    Ok(())
}

/// Requests run in file order so shared sessions observe earlier results.
async fn execute_batch(orchestrator: &Orchestrator, config: BatchConfig) -> BatchResult {
    let start_time = Instant::now();
    let total_requests = config.requests.len();
    let fail_fast = config.settings.fail_fast;
    let mut outcomes = Vec::with_capacity(total_requests);

    for req in config.requests {
        info!(request = %req.id, "executing batch request");
        let started = Instant::now();
        let outcome = match orchestrator
            .execute_with_session(&req.request, req.session.as_deref())
            .await
        {
            Ok(task) => RequestOutcome {
                id: req.id,
                success: task.status == TaskResultStatus::Completed,
                summary: task.result,
                duration_ms: task.duration_ms,
            },
            Err(err) => RequestOutcome {
                id: req.id,
                success: false,
                summary: err.to_string(),
                duration_ms: started.elapsed().as_millis() as u64,
            },
        };
        let failed = !outcome.success;
        outcomes.push(outcome);
        if failed && fail_fast {
            warn!("failing fast after request failure");
            break;
        }
    }

    let successful_requests = outcomes.iter().filter(|o| o.success).count();
    let failed_requests = outcomes.len() - successful_requests;
    let status = if failed_requests == 0 && successful_requests == total_requests {
        BatchStatus::Success
    } else if successful_requests > 0 {
        BatchStatus::PartialSuccess
    } else {
        BatchStatus::Failed
    };

    BatchResult {
        job_name: config.job.name,
        status,
        total_requests,
        successful_requests,
        failed_requests,
        total_duration_ms: start_time.elapsed().as_millis() as u64,
        outcomes,
    }
}

fn print_batch_summary(result: &BatchResult) {
    println!("\nBatch job: {}", result.job_name);
    println!("Status:    {:?}", result.status);
    println!(
        "Requests:  {} total, {} succeeded, {} failed",
        result.total_requests, result.successful_requests, result.failed_requests
    );
    println!("Duration:  {} ms", result.total_duration_ms);
    for outcome in &result.outcomes {
        let mark = if outcome.success { "ok" } else { "FAILED" };
        println!("  [{}] {} ({} ms)", mark, outcome.id, outcome.duration_ms);
    }
}

fn save_batch_results(result: &BatchResult, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write results to {:?}", path))?;
    info!("batch results written to {:?}", path);
    Ok(())
}
