// File: manager/src/services/connection_service.rs
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::connection::{
    ConnectionConfig, ConnectionManager, ConnectionStatus, ConnectionTestResult,
};
use crate::database::{ConnectionRecord, Database};
use crate::errors::{ConfigError, ConnectionError, ManagerError};

/// Keeps the persisted connection table and the live manager in step
pub struct ConnectionService {
    database: Arc<Database>,
    manager: Arc<ConnectionManager>,
}

impl ConnectionService {
    pub fn new(database: Arc<Database>, manager: Arc<ConnectionManager>) -> Self {
        Self { database, manager }
    }

    /// Upsert connections declared in config files; existing rows keep their status
    pub async fn seed_from_config(&self, configs: &[ConnectionConfig]) -> Result<usize, ManagerError> {
        let now = Utc::now();
        for config in configs {
            validate_config(config)?;
            self.database
                .upsert_connection(&ConnectionRecord::from_config(config, now))
                .await?;
        }

        if !configs.is_empty() {
            info!("Seeded {} connections from configuration", configs.len());
        }
        Ok(configs.len())
    }

    /// Register every stored connection with the manager
    ///
    /// Returns the number of connections that reached `connected`.
    pub async fn load_stored_connections(&self) -> Result<usize, ManagerError> {
        let records = self.database.get_all_connections().await?;
        let mut connected = 0;

        for record in records {
            let config = record.to_config();
            match self.manager.add_connection(config).await {
                Ok(status) if status.state == crate::connection::ConnectionState::Connected => {
                    connected += 1;
                }
                Ok(status) => {
                    warn!(
                        "Connection {} started in state {}: {}",
                        status.id,
                        status.state,
                        status.error.as_deref().unwrap_or("no error reported")
                    );
                }
                Err(ConnectionError::AlreadyExists { id }) => {
                    warn!("Connection {} is already registered, skipping", id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!("Loaded stored connections, {} connected", connected);
        Ok(connected)
    }

    pub async fn create_connection(
        &self,
        config: ConnectionConfig,
    ) -> Result<ConnectionStatus, ManagerError> {
        validate_config(&config)?;
        if self.database.get_connection_by_id(&config.id).await?.is_some() {
            return Err(ConnectionError::AlreadyExists { id: config.id }.into());
        }

        self.database
            .upsert_connection(&ConnectionRecord::from_config(&config, Utc::now()))
            .await?;
        Ok(self.manager.add_connection(config).await?)
    }

    pub async fn update_connection(
        &self,
        config: ConnectionConfig,
    ) -> Result<ConnectionStatus, ManagerError> {
        validate_config(&config)?;
        if self.database.get_connection_by_id(&config.id).await?.is_none() {
            return Err(ConnectionError::NotFound { id: config.id }.into());
        }

        self.database
            .upsert_connection(&ConnectionRecord::from_config(&config, Utc::now()))
            .await?;

        if self.manager.contains(&config.id).await {
            Ok(self.manager.update_connection(config).await?)
        } else {
            Ok(self.manager.add_connection(config).await?)
        }
    }

    /// Remove a connection; its alerts are deleted with it
    pub async fn delete_connection(&self, id: &str) -> Result<(), ManagerError> {
        let stored = self.database.delete_connection(id).await?;

        match self.manager.remove_connection(id).await {
            Ok(()) => {}
            Err(ConnectionError::NotFound { .. }) if stored => {}
            Err(e) => return Err(e.into()),
        }

        info!("Deleted connection {}", id);
        Ok(())
    }

    pub async fn test_connection(
        &self,
        config: &ConnectionConfig,
    ) -> Result<ConnectionTestResult, ManagerError> {
        validate_config(config)?;
        Ok(self.manager.test_connection(config).await)
    }

    pub async fn reconnect(&self, id: &str) -> Result<ConnectionStatus, ManagerError> {
        Ok(self.manager.reconnect(id).await?)
    }

    pub async fn list_statuses(&self) -> Vec<ConnectionStatus> {
        self.manager.list_statuses().await
    }
}

fn validate_config(config: &ConnectionConfig) -> Result<(), ConfigError> {
    if config.id.trim().is_empty() {
        return Err(ConfigError::MissingRequired {
            field: "id".to_string(),
        });
    }
    if config.host.trim().is_empty() {
        return Err(ConfigError::MissingRequired {
            field: "host".to_string(),
        });
    }
    if config.port == 0 {
        return Err(ConfigError::InvalidValue {
            field: "port".to_string(),
            reason: "must be between 1 and 65535".to_string(),
        });
    }
    if config.database < 0 {
        return Err(ConfigError::InvalidValue {
            field: "database".to_string(),
            reason: "must not be negative".to_string(),
        });
    }
    Ok(())
}
