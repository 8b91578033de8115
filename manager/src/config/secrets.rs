//! Connection passwords kept outside the connection files.
//!
//! `config/secrets.toml` maps connection ids to passwords and should stay out
//! of version control:
//!
//! ```toml
//! [connections]
//! production-redis = "secret-password-1"
//! staging-redis = "secret-password-2"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use super::ConnectionEntry;

#[derive(Debug, Deserialize, Default)]
pub struct ConnectionSecrets {
    #[serde(default)]
    connections: HashMap<String, String>,
}

impl ConnectionSecrets {
    /// A missing file yields no secrets; a malformed one is an error
    pub async fn load(path: &Path) -> Result<Self> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            warn!(
                "No secrets file at {}, connections will authenticate without a password",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read secrets file {}", path.display()))?;
        let secrets: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse secrets file {}", path.display()))?;

        debug!("Loaded {} connection secrets", secrets.connections.len());
        Ok(secrets)
    }

    pub fn password(&self, connection_id: &str) -> Option<&str> {
        self.connections.get(connection_id).map(String::as_str)
    }

    /// Fill in the password of a declared connection
    pub fn apply(&self, connection_id: &str, entry: &mut ConnectionEntry) {
        entry.password = self.password(connection_id).map(str::to_string);
        if entry.password.is_none() && entry.username.is_some() {
            warn!(
                "Connection '{}' has a username but no password in secrets.toml",
                connection_id
            );
        }
    }

    /// Ids with a password but no declared connection
    pub fn unused<'a>(&'a self, declared: &HashMap<String, ConnectionEntry>) -> Vec<&'a str> {
        let mut unused: Vec<&str> = self
            .connections
            .keys()
            .filter(|id| !declared.contains_key(*id))
            .map(String::as_str)
            .collect();
        unused.sort_unstable();
        unused
    }
}
