mod chunk;
mod classify;
mod clock;
mod config;
mod dispatch;
mod fetch;
mod llm;
mod platform;
mod skills;
mod state;
mod trigger;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::clock::HttpDateSource;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::fetch::{ContentFetcher, HttpFetcher};
use crate::llm::LlmClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fortunebot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Model: {}", config.llm.model);
    info!(
        "  Trigger keyword in private chat: {:?}",
        config.dispatch.trigger_keyword
    );
    if let Some(alias) = config.dispatch.aliases.first() {
        info!(
            "  Trigger phrase in group chat: {} {}",
            alias, config.dispatch.trigger_keyword
        );
    }

    let llm = Arc::new(LlmClient::new(config.llm.clone()));
    let fetcher: Arc<dyn ContentFetcher> = Arc::new(HttpFetcher::new());
    let dates = Arc::new(HttpDateSource::new(
        fetcher.clone(),
        config.providers.time_url.clone(),
    ));

    let dispatcher = Arc::new(Dispatcher::new(&config, llm, fetcher, dates));

    // One completion round-trip to surface a bad key or URL immediately.
    dispatcher.startup_probe().await;

    // Run the Telegram bot
    info!("Bot is starting...");
    platform::telegram::run(dispatcher, &config.telegram.bot_token).await?;

    Ok(())
}
