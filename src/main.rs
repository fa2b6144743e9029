// This is the entry point of the channel moderation bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (transport-agnostic)
// - `infra/` = Implementations of core traits (SQLite, in-memory)
// - `transport/` = Chat adapters (handlers, console driver)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Hand inbound events to the transport

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;
#[path = "transport/transport_layer.rs"]
mod transport;

mod config;

use crate::config::BotConfig;
use crate::core::moderation::ModerationService;
use crate::core::voting::VoteService;
use crate::infra::storage::SqliteChannelStore;
use crate::transport::handlers::ChannelHandlers;
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Make sure the folder holding a file-backed SQLite database exists.
fn ensure_database_dir(database_url: &str) -> anyhow::Result<()> {
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path == ":memory:" {
        return Ok(());
    }
    if let Some(dir) = Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = BotConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        warning_limit = config.moderation.warning_limit,
        per_minute = config.moderation.rate_limits.per_minute,
        per_hour = config.moderation.rate_limits.per_hour,
        per_day = config.moderation.rate_limits.per_day,
        admins = config.admin_ids.len(),
        "Configuration loaded"
    );

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Both services share one store; the pool inside is cheap to clone.

    ensure_database_dir(&config.database_url)?;
    let store = SqliteChannelStore::new(
        &config.database_url,
        config.max_connections,
        config.store_timeout(),
    )
    .await
    .with_context(|| format!("Failed to open store at {}", config.database_url))?;

    let moderation = Arc::new(ModerationService::new(
        store.clone(),
        config.moderation.clone(),
    ));
    let voting = Arc::new(VoteService::new(store));
    let handlers = Arc::new(ChannelHandlers::new(
        moderation,
        voting,
        config.admin_ids.iter().copied(),
    ));

    println!("🤖 Bot is ready! Type `<user_id>[@name] <message>` or `<user_id> /help`.");
    transport::console::run(handlers).await?;
    println!("👋 Bye!");
    Ok(())
}
