//! MCP Agent - command line entry point
//!
//! Connects to the configured tool server, asks one question and prints the
//! outcome.

use mcp_agent::{AgentOutcome, Config, Session};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_QUESTION: &str = "What is the main finding of the data?";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mcp_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: model={}, tool server={}:{}",
        config.model, config.mcp_host, config.mcp_port
    );

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let question = if question.trim().is_empty() {
        DEFAULT_QUESTION.to_string()
    } else {
        question
    };

    let session = Session::connect(&config).await?;

    let cancel = session.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown requested, abandoning the current step");
            cancel.cancel();
        }
    });

    let outcome = session.ask(&question).await;
    session.shutdown().await;

    println!("{}", outcome);
    if let AgentOutcome::Failed { stage, .. } = &outcome {
        error!("Run failed during {}", stage);
        std::process::exit(1);
    }

    Ok(())
}
