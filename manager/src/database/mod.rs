//! Database layer for the queue manager.
//!
//! This module provides SQLite persistence for:
//! - Connection configurations and their last observed status
//! - Alerts and their evaluation state
//! - Alert history (append-only transition log)
//!
//! The module is organized into submodules:
//! - `records` - Record types and filters
//! - `connections` - Connection CRUD and status mirroring
//! - `alerts` - Alert CRUD, history, and the engine's `AlertStore`

mod alerts;
mod connections;
mod records;

pub use records::*;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, error, info};

/// Schema steps applied in order on every startup; each is idempotent
const SCHEMA: &[(&str, &str)] = &[
    (
        "connections table",
        r#"
        CREATE TABLE IF NOT EXISTS connections (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL,
            name TEXT NOT NULL,
            host TEXT NOT NULL,
            port INTEGER NOT NULL DEFAULT 6379,
            database INTEGER NOT NULL DEFAULT 0,
            username TEXT,
            password TEXT,
            tls BOOLEAN NOT NULL DEFAULT 0,
            ca_cert TEXT,
            prefix TEXT,
            status TEXT NOT NULL DEFAULT 'disconnected',
            last_error TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "alerts table",
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id TEXT PRIMARY KEY,
            connection_id TEXT NOT NULL REFERENCES connections(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            description TEXT,
            queue_name TEXT NOT NULL,
            alert_type TEXT NOT NULL,
            config TEXT NOT NULL,
            recipients TEXT NOT NULL,
            cooldown_minutes INTEGER NOT NULL DEFAULT 15,
            enabled BOOLEAN NOT NULL DEFAULT 1,
            status TEXT NOT NULL DEFAULT 'OK',
            last_triggered_at DATETIME,
            last_resolved_at DATETIME,
            last_checked_at DATETIME,
            last_value REAL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "alerts index",
        "CREATE INDEX IF NOT EXISTS idx_alerts_connection ON alerts(connection_id, queue_name)",
    ),
    (
        "alert_history table",
        r#"
        CREATE TABLE IF NOT EXISTS alert_history (
            id TEXT PRIMARY KEY,
            alert_id TEXT NOT NULL REFERENCES alerts(id) ON DELETE CASCADE,
            status TEXT NOT NULL,
            value REAL NOT NULL,
            message TEXT NOT NULL,
            created_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "alert_history index",
        "CREATE INDEX IF NOT EXISTS idx_alert_history_alert_time ON alert_history(alert_id, created_at DESC)",
    ),
];

pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Expose pool for integration test queries
    #[allow(dead_code)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Open (creating if needed) the SQLite file at `database_path`
    pub async fn new(database_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create database directory {:?}", parent)
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", database_path))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database at {}", database_path))?;

        info!("Opened alert database at {}", database_path);
        Self::from_pool(pool).await
    }

    /// Private in-memory database, used by tests and dry runs
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let database = Self { pool };
        database.apply_schema().await?;

        let row = sqlx::query("SELECT COUNT(*) AS count FROM alerts")
            .fetch_one(&database.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        info!("Database ready ({} alerts stored)", count);
        Ok(database)
    }

    async fn apply_schema(&self) -> Result<()> {
        for &(step, sql) in SCHEMA {
            debug!("Applying schema step: {}", step);
            if let Err(e) = sqlx::query(sql).execute(&self.pool).await {
                error!("Schema step '{}' failed: {}", step, e);
                return Err(e.into());
            }
        }
        Ok(())
    }
}
