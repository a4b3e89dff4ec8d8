mod classify;
mod config;
mod conversation;
mod handler;
mod history;
mod llm;
mod observe;
mod platform;
mod prompt;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::handler::MessageHandler;
use crate::history::SqliteHistoryStore;
use crate::llm::AnthropicClient;
use crate::observe::TracingObserver;
use crate::platform::telegram::TelegramPlatform;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaybot=debug".into()),
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
    info!("  Standard model: {}", config.llm.standard.model);
    info!("  Cost-efficient model: {}", config.llm.cost_efficient.model);
    info!("  History window: {} turns", config.history.max_turns);

    let history = SqliteHistoryStore::open(&config.history.database_path, config.history.max_turns)?;

    let bot = Bot::new(&config.telegram.bot_token);
    let platform = Arc::new(TelegramPlatform::new(bot.clone()));
    let llm = Arc::new(AnthropicClient::new(config.llm.clone()));

    let handler = Arc::new(MessageHandler::new(
        config,
        platform.clone(),
        llm,
        Arc::new(history),
        Arc::new(TracingObserver),
    ));

    // Run the Telegram bot
    info!("Bot is starting...");
    platform::telegram::run(handler, platform, bot).await?;

    Ok(())
}
