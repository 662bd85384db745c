//! agentrun - Supervise coding-agent CLIs and normalize their output streams

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize logging; stdout carries the event stream
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentrun=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Starting agentrun v{}", env!("CARGO_PKG_VERSION"));

    // Run CLI
    let code = agentrun::cli::run()?;
    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}
