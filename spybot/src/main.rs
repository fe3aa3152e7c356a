use std::sync::Arc;

use anyhow::Context;
use spybot::commands::{CommandListener, OperatorGuard, SubscriptionManager};
use spybot::config::AppConfig;
use spybot::database::{self, repositories::SqlxStateRepository};
use spybot::notification::telegram::{TelegramConfig, TelegramTransport};
use spybot::scheduler::Scheduler;
use spybot::store::WatermarkStore;
use spybot::{logging, panic_hook};
use spybot_sources::{LeetCodeClient, LichessClient, default_client, install_rustls_provider};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let _log_guard = logging::init_logging(&config.log_dir)?;
    panic_hook::install(&config.log_dir);
    install_rustls_provider();

    // Initialize database
    let pool = database::init_pool(&config.database_url)
        .await
        .with_context(|| format!("failed to open {}", config.database_url))?;
    database::run_migrations(&pool).await?;

    let repo = Arc::new(SqlxStateRepository::new(pool.clone()));
    let store = Arc::new(WatermarkStore::new(repo));
    let loaded = store.hydrate().await?;
    info!("Loaded {} subscriptions", loaded);

    let http = default_client().context("failed to build HTTP client")?;
    let leetcode =
        Arc::new(LeetCodeClient::new(http.clone()).with_snapshot_depth(config.snapshot_depth));
    let lichess = Arc::new(LichessClient::new(http.clone()));
    let telegram = Arc::new(TelegramTransport::new(
        TelegramConfig::new(config.telegram_token.clone()),
        http,
    ));

    let shutdown = CancellationToken::new();
    logging::start_retention_cleanup(&config.log_dir, shutdown.child_token());

    let scheduler = Arc::new(Scheduler::new(
        config.scheduler_config(),
        store.clone(),
        telegram.clone(),
        leetcode,
        lichess,
        shutdown.child_token(),
    ));
    scheduler.restore().await;

    let manager = Arc::new(SubscriptionManager::new(
        store,
        scheduler.clone(),
        OperatorGuard::new(&config.owner_username),
        config.default_accounts.clone(),
    ));
    let listener = CommandListener::new(telegram.clone(), telegram, manager, config.default_source);
    let listener_task = tokio::spawn(listener.run(shutdown.child_token()));

    info!("spybot started");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");

    shutdown.cancel();
    scheduler.shutdown();
    if let Err(e) = listener_task.await {
        error!("Command listener task failed: {}", e);
    }
    pool.close().await;

    info!("spybot stopped");
    Ok(())
}
