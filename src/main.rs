//! anime-relay bot binary
//!
//! Reads configuration from the environment (and `.env`), logs in to offsite
//! storage when credentials are present, then serves the chat bot and the
//! liveness endpoint until SIGTERM/SIGINT.

use anime_relay::cleanup::purge_stale_workspaces;
use anime_relay::fetch::CliFetchTool;
use anime_relay::offsite::{MegaCliStorage, NoOpStorage, OffsiteStorage};
use anime_relay::transport::TelegramTransport;
use anime_relay::{Bot, Config, health, shutdown_signal};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Time jobs get to clean up after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,anime_relay=debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();

    let config = Config::from_env()?;
    config.validate()?;

    let purged = purge_stale_workspaces(&config.fetch.workspace_root).await;
    if purged > 0 {
        tracing::info!(purged, "removed workspaces left by a previous run");
    }

    let fetch = CliFetchTool::from_config(&config.fetch);
    if !fetch.is_available() {
        tracing::warn!(
            script = ?fetch.script_path(),
            interpreter = ?config.fetch.interpreter,
            "fetch tool not found, every download will fail until it is installed"
        );
    }

    let offsite = connect_offsite(&config).await;
    let transport = Arc::new(TelegramTransport::new(&config.telegram, config.retry.clone())?);
    let bot = Arc::new(Bot::new(&config, transport, Arc::new(fetch), offsite));

    let shutdown = bot.shutdown_token();
    let health_shutdown = shutdown.clone();
    let health_config = config.health.clone();
    let registry = bot.registry().clone();
    let health = tokio::spawn(async move {
        let stop = async move { health_shutdown.cancelled().await };
        if let Err(e) = health::serve(&health_config, registry, stop).await {
            tracing::error!(error = %e, "liveness endpoint failed");
        }
    });

    let loop_bot = bot.clone();
    let update_loop = tokio::spawn(async move { loop_bot.run().await });

    shutdown_signal().await;
    bot.shutdown(SHUTDOWN_GRACE).await;

    update_loop.await.ok();
    health.await.ok();
    tracing::info!("shutdown complete");
    Ok(())
}

/// Log in to offsite storage, or fall back to a storage that rejects every
/// upload. Login problems never stop the bot.
async fn connect_offsite(config: &Config) -> Arc<dyn OffsiteStorage> {
    if !config.offsite.has_credentials() {
        tracing::info!("offsite storage disabled (MEGA_EMAIL/MEGA_PASS not set)");
        return Arc::new(NoOpStorage);
    }

    let storage = MegaCliStorage::from_config(&config.offsite);
    storage.start_server();
    match storage.ensure_session().await {
        Ok(()) => tracing::info!(account = %config.offsite.email, "offsite storage logged in"),
        Err(e) => tracing::error!(
            error = %e,
            "OFFSITE LOGIN FAILED: uploads to offsite storage will fail until this is fixed"
        ),
    }
    Arc::new(storage)
}
