//! Test database utilities for in-memory SQLite testing

use anyhow::Result;
use queue_manager::connection::ConnectionConfig;
use queue_manager::database::{ConnectionRecord, Database};
use std::ops::Deref;
use std::sync::Arc;

/// In-memory database with the production schema
pub struct TestDatabase {
    database: Arc<Database>,
}

impl TestDatabase {
    /// Create a new in-memory test database
    pub async fn new() -> Result<Self> {
        Ok(Self {
            database: Arc::new(Database::in_memory().await?),
        })
    }

    pub fn shared(&self) -> Arc<Database> {
        self.database.clone()
    }

    /// Insert a connection row so alerts can reference it
    pub async fn with_connection(&self, config: &ConnectionConfig) -> Result<()> {
        self.database
            .upsert_connection(&ConnectionRecord::from_config(config, chrono::Utc::now()))
            .await
    }

    /// Clear all data from tables (useful between tests)
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM alert_history")
            .execute(self.database.pool())
            .await?;
        sqlx::query("DELETE FROM alerts")
            .execute(self.database.pool())
            .await?;
        sqlx::query("DELETE FROM connections")
            .execute(self.database.pool())
            .await?;
        Ok(())
    }
}

impl Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.database
    }
}
