//! Configuration management with environment variable support and validation.

use anyhow::{anyhow, Result};
use config::{Config, Environment};
use serde::{Deserialize, Serialize};

/// Orchestrator tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Scheduling passes allowed before the plan is declared livelocked.
    pub max_iterations: usize,
    /// Retries per task after the initial attempt, identical parameters.
    pub max_retries: u32,
    /// Upper bound on concurrently executing tasks.
    pub max_concurrent_tasks: usize,
    /// Per-task execution timeout.
    pub task_timeout_seconds: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            max_retries: 2,
            max_concurrent_tasks: 4,
            task_timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Main settings structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load settings from the embedded defaults, an optional local `config`
    /// file, and `TASKWEAVE__`-prefixed environment variables.
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("TASKWEAVE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.max_iterations == 0 {
            return Err(anyhow!("orchestrator.max_iterations cannot be 0"));
        }
        if self.orchestrator.max_concurrent_tasks == 0 {
            return Err(anyhow!("orchestrator.max_concurrent_tasks cannot be 0"));
        }
        if self.orchestrator.task_timeout_seconds == 0 {
            return Err(anyhow!("orchestrator.task_timeout_seconds cannot be 0"));
        }
        match self.logging.format.as_str() {
            "json" | "text" => {}
            other => return Err(anyhow!("unknown logging.format '{}'", other)),
        }
        Ok(())
    }
}
