//! Connection lifecycle management
//!
//! A [`ConnectionManager`] owns one [`ManagedConnection`] per configured
//! backend. Each managed connection runs its own state machine with
//! exponential reconnect backoff and reports every transition as a
//! [`ConnectionEvent`].

pub mod managed;
pub mod manager;
pub mod retry;

pub use managed::{ConnectionListener, ManagedConnection};
pub use manager::ConnectionManager;
pub use retry::RetryStrategy;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::redis;

/// Network coordinates and identity of one backend instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub database: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: bool,
    /// PEM-encoded CA certificate used to verify the server
    #[serde(default)]
    pub ca_cert: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
}

fn default_port() -> u16 {
    redis::DEFAULT_PORT
}

impl ConnectionConfig {
    pub fn prefix(&self) -> &str {
        self.prefix
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(redis::DEFAULT_PREFIX)
    }

    pub fn display_address(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "connecting" => Some(ConnectionState::Connecting),
            "connected" => Some(ConnectionState::Connected),
            "disconnected" => Some(ConnectionState::Disconnected),
            "reconnecting" => Some(ConnectionState::Reconnecting),
            "error" => Some(ConnectionState::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only projection of a managed connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub id: String,
    pub workspace_id: String,
    pub state: ConnectionState,
    pub error: Option<String>,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_health_check_at: Option<DateTime<Utc>>,
    pub reconnect_attempts: u32,
    pub next_reconnect_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    pub success: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

impl ConnectionTestResult {
    pub fn ok(latency_ms: u64) -> Self {
        Self {
            success: true,
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            latency_ms: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionEvent {
    Connected {
        connection_id: String,
    },
    Disconnected {
        connection_id: String,
    },
    Error {
        connection_id: String,
        error: String,
    },
    Reconnecting {
        connection_id: String,
        attempt: u32,
    },
    StateChanged {
        connection_id: String,
        state: ConnectionState,
    },
}

impl ConnectionEvent {
    pub fn connection_id(&self) -> &str {
        match self {
            ConnectionEvent::Connected { connection_id }
            | ConnectionEvent::Disconnected { connection_id }
            | ConnectionEvent::Error { connection_id, .. }
            | ConnectionEvent::Reconnecting { connection_id, .. }
            | ConnectionEvent::StateChanged { connection_id, .. } => connection_id,
        }
    }
}
