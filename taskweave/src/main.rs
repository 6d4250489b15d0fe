//! Main entry point for the Taskweave CLI.

use anyhow::Result;
use clap::Parser;
use taskweave::{batch, cli, settings::Settings, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let settings = Settings::load()?;
    telemetry::init(&settings.logging)?;

    match args.command {
        cli::Commands::Analyze { query } => {
            let orchestrator = batch::default_orchestrator(&settings)?;
            let intent = orchestrator.analyze_intent(&query)?;
            let ctx = orchestrator
                .context_manager()
                .create_context(&query, None);
            let decision = orchestrator.route(&ctx, &intent)?;
            println!("{}", serde_json::to_string_pretty(&intent)?);
            println!("{}", serde_json::to_string_pretty(&decision)?);
            Ok(())
        }
        cli::Commands::Run { request, session } => {
            let orchestrator = batch::default_orchestrator(&settings)?;
            let result = orchestrator
                .execute_with_session(&request, session.as_deref())
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        cli::Commands::Batch { config } => batch::run(config, settings).await,
    }
}
