use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::bull::new_bull_service;
use super::bullmq::new_bullmq_service;
use super::capabilities::ProviderType;
use super::detector::{detect_provider, DetectionConfidence};
use super::redis_link::{open_connection, LinkSettings, RedisLink};
use super::{AdapterEventSender, QueueService};
use crate::connection::ConnectionConfig;

/// Builds queue adapters for connections
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// Adapter for a known variant. Performs no I/O.
    fn create_by_type(
        &self,
        provider_type: ProviderType,
        config: &ConnectionConfig,
        events: Option<AdapterEventSender>,
    ) -> Arc<dyn QueueService>;

    /// Detect the variant behind `config` and build the matching adapter
    async fn create(
        &self,
        config: &ConnectionConfig,
        events: AdapterEventSender,
    ) -> Arc<dyn QueueService>;

    /// Drop anything cached for a connection id
    async fn forget(&self, _connection_id: &str) {}
}

/// Factory backed by real Redis connections
///
/// High-confidence detections are cached per connection id so reconnects
/// skip the keyspace scan.
#[derive(Default)]
pub struct RedisProviderFactory {
    detections: RwLock<HashMap<String, ProviderType>>,
    settings: LinkSettings,
}

impl RedisProviderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: LinkSettings) -> Self {
        Self {
            detections: RwLock::new(HashMap::new()),
            settings,
        }
    }

    async fn detect(&self, config: &ConnectionConfig) -> ProviderType {
        if let Some(cached) = self.detections.read().await.get(&config.id) {
            return *cached;
        }

        let conn = match open_connection(config, self.settings.connect_timeout).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(
                    "Detection connection to {} failed, defaulting to bullmq: {}",
                    config.display_address(),
                    e
                );
                return ProviderType::BullMq;
            }
        };

        let detection = detect_provider(&conn, config.prefix()).await;
        info!(
            "Detected provider for connection {}: {} ({:?} confidence from {:?})",
            config.id, detection.provider_type, detection.confidence, detection.detected_from
        );

        if detection.confidence == DetectionConfidence::High {
            self.detections
                .write()
                .await
                .insert(config.id.clone(), detection.provider_type);
        }
        detection.provider_type
    }
}

#[async_trait]
impl ProviderFactory for RedisProviderFactory {
    fn create_by_type(
        &self,
        provider_type: ProviderType,
        config: &ConnectionConfig,
        events: Option<AdapterEventSender>,
    ) -> Arc<dyn QueueService> {
        let link = Arc::new(RedisLink::new(config.clone(), events, self.settings));
        match provider_type {
            ProviderType::Bull => Arc::new(new_bull_service(link)),
            ProviderType::BullMq => Arc::new(new_bullmq_service(link)),
        }
    }

    async fn create(
        &self,
        config: &ConnectionConfig,
        events: AdapterEventSender,
    ) -> Arc<dyn QueueService> {
        let provider_type = self.detect(config).await;
        self.create_by_type(provider_type, config, Some(events))
    }

    async fn forget(&self, connection_id: &str) {
        self.detections.write().await.remove(connection_id);
    }
}
