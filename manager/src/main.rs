// File: manager/src/main.rs
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use queue_manager::alerts::{AlertEvaluationEngine, AlertScheduler};
use queue_manager::config::ConfigManager;
use queue_manager::connection::ConnectionManager;
use queue_manager::constants::{defaults, notifications};
use queue_manager::database::Database;
use queue_manager::queue::RedisProviderFactory;
use queue_manager::services::{spawn_status_sync, ConnectionService, NotificationService};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with reduced verbosity
    let env_filter = EnvFilter::from_default_env()
        .add_directive("queue_manager=info".parse()?)
        .add_directive("tokio_cron_scheduler=warn".parse()?)
        .add_directive("redis=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("sqlx=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting Queue Manager");

    // Load configuration
    let config_dir = std::env::var("QUEUE_MANAGER_CONFIG_DIR")
        .unwrap_or_else(|_| defaults::CONFIG_DIR.to_string());
    let config_manager = ConfigManager::new(config_dir).await?;
    let config = config_manager.get_current_config();

    // Initialize database
    let database = Arc::new(Database::new(&config.database_path).await?);
    info!("Database initialized at {}", config.database_path);

    // Connection layer
    let factory = Arc::new(RedisProviderFactory::with_settings(config.link_settings()));
    let connection_manager = Arc::new(
        ConnectionManager::new(factory, config.reconnect.strategy())
            .with_test_timeout(config.connection_test_timeout()),
    );
    let status_sync = spawn_status_sync(&connection_manager, database.clone()).await;

    let connection_service = ConnectionService::new(database.clone(), connection_manager.clone());
    connection_service
        .seed_from_config(&config_manager.connection_configs())
        .await?;
    let connected = connection_service.load_stored_connections().await?;
    info!(
        "Connection manager ready: {}/{} connections up",
        connected,
        connection_manager.list_statuses().await.len()
    );

    // Notification delivery
    let notification_service = Arc::new(
        NotificationService::new(
            config.notifications.webhook_url.clone(),
            config.notifications.sender.clone(),
        )?
        .with_retry(
            config.notifications.delivery_attempts,
            notifications::DELIVERY_BACKOFF,
        ),
    );
    if notification_service.is_enabled() {
        info!(
            "Notifications enabled with webhook: {}",
            notification_service.get_webhook_url()
        );
    } else {
        warn!("No notification webhook configured in main.toml, alert notifications will be dropped");
    }

    let (notification_tx, notification_rx) = mpsc::unbounded_channel();
    let notification_worker = notification_service.spawn_worker(notification_rx);

    // Alert evaluation
    let engine = Arc::new(AlertEvaluationEngine::new(
        database.clone(),
        connection_manager.clone(),
        notification_tx,
    ));
    let mut scheduler = AlertScheduler::new(engine, config.alert_interval()).await?;
    scheduler.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    if let Err(e) = scheduler.shutdown().await {
        error!("Failed to stop alert scheduler: {}", e);
    }
    drop(scheduler);

    connection_manager.shutdown().await;
    status_sync.abort();

    // Give queued notifications a bounded window to drain
    match tokio::time::timeout(notifications::WEBHOOK_TIMEOUT, notification_worker).await {
        Ok(Err(e)) => error!("Notification worker ended abnormally: {}", e),
        Ok(Ok(())) => {}
        Err(_) => warn!("Notification worker still busy at shutdown, abandoning queue"),
    }

    info!("Queue Manager stopped");
    Ok(())
}
