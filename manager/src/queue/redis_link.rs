//! Shared Redis connection handling for both queue adapters
//!
//! A [`RedisLink`] owns the multiplexed connection, runs a periodic PING
//! health check and reports transport-level changes as [`AdapterEvent`]s.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::detector::KeyspaceScanner;
use super::{AdapterEvent, AdapterEventSender};
use crate::connection::ConnectionConfig;
use crate::constants::redis as redis_constants;
use crate::errors::{QueueError, QueueResult};

pub type RedisConnection = redis::aio::ConnectionManager;

/// Build `redis[s]://[user:pass@]host:port/db` with percent-encoded credentials
pub fn build_redis_url(config: &ConnectionConfig) -> String {
    let scheme = if config.tls { "rediss" } else { "redis" };

    let auth = match (config.username.as_deref(), config.password.as_deref()) {
        (Some(user), Some(pass)) if !user.is_empty() => format!(
            "{}:{}@",
            urlencoding::encode(user),
            urlencoding::encode(pass)
        ),
        (_, Some(pass)) if !pass.is_empty() => format!(":{}@", urlencoding::encode(pass)),
        (Some(user), None) if !user.is_empty() => format!("{}@", urlencoding::encode(user)),
        _ => String::new(),
    };

    format!(
        "{}://{}{}:{}/{}",
        scheme, auth, config.host, config.port, config.database
    )
}

pub fn build_client(config: &ConnectionConfig) -> QueueResult<redis::Client> {
    let url = build_redis_url(config);

    let client = match config.ca_cert.as_deref().filter(|_| config.tls) {
        Some(ca_cert) => redis::Client::build_with_tls(
            url.as_str(),
            redis::TlsCertificates {
                client_tls: None,
                root_cert: Some(ca_cert.as_bytes().to_vec()),
            },
        ),
        None => redis::Client::open(url.as_str()),
    };

    client.map_err(|e| QueueError::InvalidUrl {
        reason: e.to_string(),
    })
}

/// Open and verify a connection within `limit`
pub async fn open_connection(
    config: &ConnectionConfig,
    limit: Duration,
) -> QueueResult<RedisConnection> {
    let client = build_client(config)?;

    let connect = async {
        let mut conn = client.get_connection_manager().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok::<_, QueueError>(conn)
    };

    timeout(limit, connect)
        .await
        .map_err(|_| QueueError::Timeout {
            operation: format!("connecting to {}", config.display_address()),
        })?
}

/// Collect every key matching `pattern` using incremental SCAN
pub async fn scan_keys(conn: &mut RedisConnection, pattern: &str) -> QueueResult<Vec<String>> {
    let mut cursor: u64 = 0;
    let mut keys = Vec::new();

    loop {
        let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(redis_constants::SCAN_COUNT)
            .query_async(conn)
            .await?;

        keys.extend(batch);
        cursor = next;
        if cursor == 0 {
            break;
        }
    }

    Ok(keys)
}

#[async_trait]
impl KeyspaceScanner for RedisConnection {
    async fn has_keys(&self, pattern: &str) -> QueueResult<bool> {
        let mut conn = self.clone();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(redis_constants::SCAN_COUNT)
                .query_async(&mut conn)
                .await?;

            if !batch.is_empty() {
                return Ok(true);
            }
            cursor = next;
            if cursor == 0 {
                return Ok(false);
            }
        }
    }
}

/// Timing knobs for a live adapter link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub connect_timeout: Duration,
    pub health_interval: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            connect_timeout: redis_constants::CONNECT_TIMEOUT,
            health_interval: redis_constants::HEALTH_CHECK_INTERVAL,
        }
    }
}

pub struct RedisLink {
    config: ConnectionConfig,
    connection: RwLock<Option<RedisConnection>>,
    connected: AtomicBool,
    events: Option<AdapterEventSender>,
    health_task: Mutex<Option<JoinHandle<()>>>,
    settings: LinkSettings,
}

impl RedisLink {
    pub fn new(
        config: ConnectionConfig,
        events: Option<AdapterEventSender>,
        settings: LinkSettings,
    ) -> Self {
        Self {
            config,
            connection: RwLock::new(None),
            connected: AtomicBool::new(false),
            events,
            health_task: Mutex::new(None),
            settings,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn prefix(&self) -> &str {
        self.config.prefix()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn connect(self: &Arc<Self>) -> QueueResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        let conn = open_connection(&self.config, self.settings.connect_timeout).await?;
        *self.connection.write().await = Some(conn);
        self.connected.store(true, Ordering::SeqCst);

        info!(
            "Connected to {} (prefix '{}')",
            self.config.display_address(),
            self.prefix()
        );

        let handle = tokio::spawn(Self::health_loop(
            Arc::downgrade(self),
            self.settings.health_interval,
        ));
        if let Some(previous) = self.health_task.lock().await.replace(handle) {
            previous.abort();
        }

        Ok(())
    }

    pub async fn disconnect(&self) -> QueueResult<()> {
        self.connected.store(false, Ordering::SeqCst);

        if let Some(handle) = self.health_task.lock().await.take() {
            handle.abort();
        }
        self.connection.write().await.take();

        debug!("Disconnected from {}", self.config.display_address());
        Ok(())
    }

    /// Clone of the live connection handle
    pub async fn conn(&self) -> QueueResult<RedisConnection> {
        if !self.is_connected() {
            return Err(QueueError::NotConnected);
        }
        self.connection
            .read()
            .await
            .clone()
            .ok_or(QueueError::NotConnected)
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let ping = async {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, QueueError>(())
        };
        timeout(redis_constants::CONNECTION_TEST_TIMEOUT, ping)
            .await
            .map_err(|_| QueueError::Timeout {
                operation: "health check".to_string(),
            })?
    }

    fn emit(&self, event: AdapterEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    async fn health_loop(link: Weak<Self>, interval: Duration) {
        let mut failures: u32 = 0;

        loop {
            tokio::time::sleep(interval).await;

            let Some(link) = link.upgrade() else {
                break;
            };
            if !link.is_connected() {
                break;
            }

            match link.ping().await {
                Ok(()) => {
                    if failures > 0 {
                        info!(
                            "Health check recovered for {} after {} failures",
                            link.config.display_address(),
                            failures
                        );
                        link.emit(AdapterEvent::Reconnected);
                    }
                    failures = 0;
                    link.emit(AdapterEvent::HealthCheck { at: Utc::now() });
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        "Health check {}/{} failed for {}: {}",
                        failures,
                        redis_constants::HEALTH_CHECK_FAILURES_BEFORE_DISCONNECT,
                        link.config.display_address(),
                        e
                    );

                    if failures >= redis_constants::HEALTH_CHECK_FAILURES_BEFORE_DISCONNECT {
                        link.connected.store(false, Ordering::SeqCst);
                        link.connection.write().await.take();
                        link.emit(AdapterEvent::Disconnected {
                            reason: e.to_string(),
                        });
                        break;
                    }
                    if failures == 1 {
                        link.emit(AdapterEvent::Reconnecting);
                    }
                }
            }
        }
    }
}
