//! Database record types (entities).
//!
//! Alerts are stored as [`Alert`](crate::alerts::Alert) directly; this module
//! holds the connection row and the filters used by list queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::{AlertStatus, AlertType};
use crate::connection::{ConnectionConfig, ConnectionState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub host: String,
    pub port: i64,
    pub database: i64,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: bool,
    pub ca_cert: Option<String>,
    pub prefix: Option<String>,
    pub status: String,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectionRecord {
    pub fn from_config(config: &ConnectionConfig, now: DateTime<Utc>) -> Self {
        Self {
            id: config.id.clone(),
            workspace_id: config.workspace_id.clone(),
            name: config.name.clone(),
            host: config.host.clone(),
            port: i64::from(config.port),
            database: config.database,
            username: config.username.clone(),
            password: config.password.clone(),
            tls: config.tls,
            ca_cert: config.ca_cert.clone(),
            prefix: config.prefix.clone(),
            status: ConnectionState::Disconnected.to_string(),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            id: self.id.clone(),
            workspace_id: self.workspace_id.clone(),
            name: self.name.clone(),
            host: self.host.clone(),
            port: u16::try_from(self.port).unwrap_or(crate::constants::redis::DEFAULT_PORT),
            database: self.database,
            username: self.username.clone(),
            password: self.password.clone(),
            tls: self.tls,
            ca_cert: self.ca_cert.clone(),
            prefix: self.prefix.clone(),
        }
    }

    pub fn state(&self) -> Option<ConnectionState> {
        ConnectionState::parse(&self.status)
    }
}

/// Optional filters for alert listings; `None` matches everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertFilter {
    pub connection_id: Option<String>,
    pub queue_name: Option<String>,
    pub status: Option<AlertStatus>,
    #[serde(rename = "type")]
    pub alert_type: Option<AlertType>,
    pub enabled: Option<bool>,
}
