//! Provider factory handing out shared fake queue services

use async_trait::async_trait;
use queue_manager::connection::ConnectionConfig;
use queue_manager::queue::{
    AdapterEvent, AdapterEventSender, ProviderFactory, ProviderType, QueueService,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::fake_queue::FakeQueueService;

/// Every connection id maps to one long-lived [`FakeQueueService`], so tests
/// can seed data before or after the manager connects.
#[derive(Default)]
pub struct FakeProviderFactory {
    services: Mutex<HashMap<String, Arc<FakeQueueService>>>,
    senders: Mutex<HashMap<String, AdapterEventSender>>,
    forgotten: Mutex<Vec<String>>,
    created: Mutex<HashMap<String, u32>>,
}

impl FakeProviderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service(&self, connection_id: &str) -> Arc<FakeQueueService> {
        self.services
            .lock()
            .unwrap()
            .entry(connection_id.to_string())
            .or_insert_with(|| Arc::new(FakeQueueService::new(ProviderType::BullMq)))
            .clone()
    }

    /// Push an adapter event to the most recent adapter for a connection
    pub fn emit(&self, connection_id: &str, event: AdapterEvent) -> bool {
        self.senders
            .lock()
            .unwrap()
            .get(connection_id)
            .map(|sender| sender.send(event).is_ok())
            .unwrap_or(false)
    }

    /// How many adapters were handed out for a connection
    pub fn created(&self, connection_id: &str) -> u32 {
        self.created
            .lock()
            .unwrap()
            .get(connection_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn forgotten(&self) -> Vec<String> {
        self.forgotten.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderFactory for FakeProviderFactory {
    fn create_by_type(
        &self,
        _provider_type: ProviderType,
        config: &ConnectionConfig,
        events: Option<AdapterEventSender>,
    ) -> Arc<dyn QueueService> {
        *self
            .created
            .lock()
            .unwrap()
            .entry(config.id.clone())
            .or_default() += 1;
        if let Some(events) = events {
            self.senders
                .lock()
                .unwrap()
                .insert(config.id.clone(), events);
        }
        self.service(&config.id)
    }

    async fn create(
        &self,
        config: &ConnectionConfig,
        events: AdapterEventSender,
    ) -> Arc<dyn QueueService> {
        self.create_by_type(ProviderType::BullMq, config, Some(events))
    }

    async fn forget(&self, connection_id: &str) {
        self.forgotten
            .lock()
            .unwrap()
            .push(connection_id.to_string());
    }
}
