// File: manager/src/config/mod.rs
pub mod manager;
pub mod secrets;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use manager::ConfigManager;
pub use secrets::ConnectionSecrets;

use crate::connection::{ConnectionConfig, RetryStrategy};
use crate::constants::{alerts, defaults, notifications, redis, retry};
use crate::queue::LinkSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_alert_interval")]
    pub alert_interval_seconds: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_connection_test_timeout")]
    pub connection_test_timeout_seconds: u64,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_seconds: u64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    // Populated from config/connections/*.toml
    #[serde(skip)]
    pub connections: HashMap<String, ConnectionEntry>,
}

fn default_database_path() -> String {
    defaults::DATABASE_PATH.to_string()
}

fn default_alert_interval() -> u64 {
    alerts::EVALUATION_INTERVAL.as_secs()
}

fn default_connect_timeout() -> u64 {
    redis::CONNECT_TIMEOUT.as_secs()
}

fn default_connection_test_timeout() -> u64 {
    redis::CONNECTION_TEST_TIMEOUT.as_secs()
}

fn default_health_check_interval() -> u64 {
    redis::HEALTH_CHECK_INTERVAL.as_secs()
}

impl Config {
    pub fn alert_interval(&self) -> Duration {
        Duration::from_secs(self.alert_interval_seconds.max(1))
    }

    pub fn connection_test_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_test_timeout_seconds.max(1))
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_seconds.max(1)),
            health_interval: Duration::from_secs(self.health_check_interval_seconds.max(1)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: retry::MAX_ATTEMPTS,
            base_delay_ms: retry::BASE_DELAY.as_millis() as u64,
            max_delay_ms: retry::MAX_DELAY.as_millis() as u64,
        }
    }
}

impl ReconnectConfig {
    pub fn strategy(&self) -> RetryStrategy {
        RetryStrategy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Empty disables delivery
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default = "default_sender")]
    pub sender: String,
    #[serde(default = "default_delivery_attempts")]
    pub delivery_attempts: u32,
}

fn default_sender() -> String {
    notifications::DEFAULT_SENDER.to_string()
}

fn default_delivery_attempts() -> u32 {
    notifications::DELIVERY_ATTEMPTS
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            sender: default_sender(),
            delivery_attempts: default_delivery_attempts(),
        }
    }
}

/// One connection as declared in a `config/connections/<group>.toml` file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEntry {
    #[serde(default = "default_workspace")]
    pub workspace_id: String,
    pub name: Option<String>,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub database: i64,
    pub username: Option<String>,
    #[serde(default)]
    pub tls: bool,
    /// Path to a PEM CA certificate, read at load time
    pub ca_cert_path: Option<String>,
    pub prefix: Option<String>,
    // Resolved from secrets.toml or the CA file, never read from the file itself
    #[serde(skip)]
    pub password: Option<String>,
    #[serde(skip)]
    pub ca_cert: Option<String>,
}

impl ConnectionEntry {
    pub fn to_connection_config(&self, id: &str) -> ConnectionConfig {
        ConnectionConfig {
            id: id.to_string(),
            workspace_id: self.workspace_id.clone(),
            name: self.name.clone().unwrap_or_else(|| id.to_string()),
            host: self.host.clone(),
            port: self.port,
            database: self.database,
            username: self.username.clone(),
            password: self.password.clone(),
            tls: self.tls,
            ca_cert: self.ca_cert.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

fn default_workspace() -> String {
    "default".to_string()
}

fn default_port() -> u16 {
    redis::DEFAULT_PORT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionsFile {
    pub connections: HashMap<String, ConnectionEntry>,
}
