use portfolio_assistant::{agent::Orchestrator, api::start_server, config::AssistantConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AssistantConfig::from_env()?;

    info!("Portfolio Assistant - API Server");
    info!("Port: {}", config.port);

    let orchestrator = Arc::new(Orchestrator::from_config(&config)?);

    info!(providers = ?orchestrator.providers(), "Orchestrator initialized");

    start_server(orchestrator, config.port).await?;

    Ok(())
}
