// File: manager/src/config/manager.rs
use super::{Config, ConnectionSecrets, ConnectionsFile};
use crate::connection::ConnectionConfig;
use anyhow::{anyhow, Result};
use glob::glob;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

pub struct ConfigManager {
    current_config: Arc<Config>,
}

impl ConfigManager {
    pub async fn new(config_dir: String) -> Result<Self> {
        let config = Self::load_configuration(&config_dir).await?;
        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    /// Declared connections, ordered by id
    pub fn connection_configs(&self) -> Vec<ConnectionConfig> {
        let mut configs: Vec<ConnectionConfig> = self
            .current_config
            .connections
            .iter()
            .map(|(id, entry)| entry.to_connection_config(id))
            .collect();
        configs.sort_by(|a, b| a.id.cmp(&b.id));
        configs
    }

    async fn load_configuration(config_dir: &str) -> Result<Config> {
        let main_config_path = format!("{}/main.toml", config_dir);
        let main_config_content = fs::read_to_string(&main_config_path)
            .await
            .map_err(|e| anyhow!("Failed to read main config {}: {}", main_config_path, e))?;

        let mut config: Config = toml::from_str(&main_config_content)
            .map_err(|e| anyhow!("Failed to parse main config: {}", e))?;

        let secrets = ConnectionSecrets::load(&Path::new(config_dir).join("secrets.toml")).await?;

        // Load per-group connection files
        let pattern = format!("{}/connections/*.toml", config_dir);
        let mut all_connections = HashMap::new();

        for entry in glob(&pattern).map_err(|e| anyhow!("Glob pattern error: {}", e))? {
            let path = entry.map_err(|e| anyhow!("Glob entry error: {}", e))?;
            debug!("Loading connection config: {}", path.display());

            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;

            let file: ConnectionsFile = toml::from_str(&content)
                .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;

            for (id, mut connection) in file.connections {
                if all_connections.contains_key(&id) {
                    return Err(anyhow!(
                        "Connection '{}' is declared more than once (last seen in {})",
                        id,
                        path.display()
                    ));
                }

                secrets.apply(&id, &mut connection);

                if let Some(ca_path) = &connection.ca_cert_path {
                    let resolved = Path::new(config_dir).join(ca_path);
                    let pem = fs::read_to_string(&resolved).await.map_err(|e| {
                        anyhow!(
                            "Failed to read CA certificate {} for '{}': {}",
                            resolved.display(),
                            id,
                            e
                        )
                    })?;
                    connection.ca_cert = Some(pem);
                }

                all_connections.insert(id, connection);
            }
        }

        for id in secrets.unused(&all_connections) {
            warn!("secrets.toml has a password for undeclared connection '{}'", id);
        }
        config.connections = all_connections;

        info!(
            "Loaded configuration: {} connections, alert interval {}s",
            config.connections.len(),
            config.alert_interval_seconds
        );

        Ok(config)
    }
}
