use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use feedrelay::bot::{self, CommandHandler};
use feedrelay::config::Config;
use feedrelay::context::AppContext;
use feedrelay::feed::{http_client, HttpFeedFetcher};
use feedrelay::scheduler::Poller;
use feedrelay::storage::open_store;
use feedrelay::transport::{connect, TelegramTransport};

#[derive(Parser, Debug)]
#[command(name = "feedrelay", about = "Relays new RSS/Atom entries to Telegram chats")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, short, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log_level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    tracing::debug!(config = ?config, "Loaded configuration");

    let kv = open_store(&config.database_path)
        .await
        .context("Failed to open subscription store")?;

    let client = http_client(config.allow_private_hosts).context("Failed to build HTTP client")?;
    let telegram = TelegramTransport::new(
        connect(&config.bot_token(), &config.api_url).context("Invalid api_url")?,
    );

    let me = telegram
        .identity()
        .await
        .context("Logging in failed, check bot token")?;
    tracing::info!(username = %me.username, id = me.id, "Starting bot");

    let ctx = Arc::new(AppContext::new(
        config,
        kv,
        Arc::new(HttpFeedFetcher::new(client)),
        Arc::new(telegram.clone()),
    ));
    let poller = Poller::new(ctx.clone());
    let handler = Arc::new(CommandHandler::new(ctx.clone(), poller.clone(), me));

    tokio::select! {
        _ = poller.run() => {}
        _ = bot::run_updates(telegram, handler) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}
