mod bot;
mod config;
mod platform;
mod transit;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,transtgo=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Optional config file; the environment always wins
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Bot token: {}", config.masked_token());
    info!("  Webhook host: {}", config.webhook.host);
    info!("  Listen address: {}", config.listen_addr());
    info!("  Transit API: {}", config.transit.base_url);

    let state = Arc::new(AppState::new(config)?);

    info!("Bot is starting...");
    platform::telegram::run(state).await?;

    Ok(())
}
