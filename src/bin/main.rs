use portfolio_assistant::{agent::Orchestrator, config::AssistantConfig, QueryContext};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Runs one message against a fresh guest session and prints the result.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let message = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if message.trim().is_empty() {
        eprintln!("usage: assistant <message>");
        eprintln!("  e.g. assistant add 100 shares of AAPL at \\$150 per share");
        std::process::exit(2);
    }

    let config = AssistantConfig::from_env()?;
    let orchestrator = Orchestrator::from_config(&config)?;

    let context = QueryContext::guest(Uuid::new_v4().to_string());
    info!(
        session = ?context.guest_session_id,
        "Running query against a guest session"
    );

    let result = orchestrator.process_query(&message, &context).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
