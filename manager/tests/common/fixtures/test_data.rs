//! Common test data and constants

use chrono::{DateTime, Utc};
use queue_manager::alerts::{Alert, AlertConfig, AlertStatus, AlertType};
use queue_manager::connection::{ConnectionConfig, RetryStrategy};
use std::time::Duration;
use uuid::Uuid;

/// Generate a random job ID for testing
pub fn random_job_id() -> String {
    Uuid::new_v4().to_string()
}

/// Get current timestamp for testing
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Common test connection ids
pub mod connections {
    pub const PRIMARY: &str = "test-conn-1";
    pub const SECONDARY: &str = "test-conn-2";
}

/// Common test queue names
pub mod queues {
    pub const EMAILS: &str = "emails";
    pub const REPORTS: &str = "reports";
}

pub fn connection_config(id: &str) -> ConnectionConfig {
    ConnectionConfig {
        id: id.to_string(),
        workspace_id: "default".to_string(),
        name: format!("{} name", id),
        host: "127.0.0.1".to_string(),
        port: 6379,
        database: 0,
        username: None,
        password: None,
        tls: false,
        ca_cert: None,
        prefix: None,
    }
}

/// Fast backoff for tests running on paused time
pub fn fast_retry(max_attempts: u32) -> RetryStrategy {
    RetryStrategy::new(
        max_attempts,
        Duration::from_millis(100),
        Duration::from_secs(5),
    )
}

pub fn alert(connection_id: &str, queue: &str, alert_type: AlertType, config: AlertConfig) -> Alert {
    let created = Utc::now();
    Alert {
        id: Uuid::new_v4().to_string(),
        connection_id: connection_id.to_string(),
        name: format!("{} on {}", alert_type.label(), queue),
        description: None,
        queue_name: queue.to_string(),
        alert_type,
        config,
        recipients: vec!["ops@example.com".to_string()],
        cooldown_minutes: 15,
        enabled: true,
        status: AlertStatus::Ok,
        last_triggered_at: None,
        last_resolved_at: None,
        last_checked_at: None,
        last_value: None,
        created_at: created,
        updated_at: created,
    }
}
