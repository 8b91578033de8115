use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use super::managed::{ConnectionListener, ManagedConnection};
use super::retry::RetryStrategy;
use super::{
    ConnectionConfig, ConnectionEvent, ConnectionState, ConnectionStatus, ConnectionTestResult,
};
use crate::constants::redis as redis_constants;
use crate::errors::ConnectionError;
use crate::queue::{ProviderFactory, ProviderType, QueueService};

/// Fans connection events out to every subscriber, in emission order
#[derive(Default)]
struct EventHub {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ConnectionEvent>>>,
}

impl EventHub {
    async fn subscribe(&self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().await.push(tx);
        rx
    }

    async fn emit(&self, events: Vec<ConnectionEvent>) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|subscriber| {
            events
                .iter()
                .all(|event| subscriber.send(event.clone()).is_ok())
        });
    }
}

#[async_trait]
impl ConnectionListener for EventHub {
    async fn on_state_change(&self, status: ConnectionStatus) {
        let connection_id = status.id.clone();
        let mut events = vec![ConnectionEvent::StateChanged {
            connection_id: connection_id.clone(),
            state: status.state,
        }];
        match status.state {
            ConnectionState::Connected => events.push(ConnectionEvent::Connected { connection_id }),
            ConnectionState::Disconnected => {
                events.push(ConnectionEvent::Disconnected { connection_id })
            }
            ConnectionState::Reconnecting => events.push(ConnectionEvent::Reconnecting {
                connection_id,
                attempt: status.reconnect_attempts,
            }),
            ConnectionState::Connecting | ConnectionState::Error => {}
        }
        self.emit(events).await;
    }

    async fn on_error(&self, connection_id: &str, error: &str) {
        self.emit(vec![ConnectionEvent::Error {
            connection_id: connection_id.to_string(),
            error: error.to_string(),
        }])
        .await;
    }
}

/// Owns every managed connection of the process
pub struct ConnectionManager {
    connections: RwLock<HashMap<String, Arc<ManagedConnection>>>,
    factory: Arc<dyn ProviderFactory>,
    retry: RetryStrategy,
    events: Arc<EventHub>,
    test_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(factory: Arc<dyn ProviderFactory>, retry: RetryStrategy) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            factory,
            retry,
            events: Arc::new(EventHub::default()),
            test_timeout: redis_constants::CONNECTION_TEST_TIMEOUT,
        }
    }

    pub fn with_test_timeout(mut self, test_timeout: Duration) -> Self {
        self.test_timeout = test_timeout;
        self
    }

    fn build(&self, config: ConnectionConfig) -> Arc<ManagedConnection> {
        ManagedConnection::new(
            config,
            self.factory.clone(),
            self.retry,
            self.events.clone(),
        )
    }

    async fn lookup(&self, id: &str) -> Result<Arc<ManagedConnection>, ConnectionError> {
        self.connections
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ConnectionError::NotFound { id: id.to_string() })
    }

    /// Register a connection and attempt the first connect
    ///
    /// A failed first connect is not an error here: the connection is kept
    /// in `error` state with a reconnect scheduled.
    #[instrument(skip(self, config), fields(connection_id = %config.id))]
    pub async fn add_connection(
        &self,
        config: ConnectionConfig,
    ) -> Result<ConnectionStatus, ConnectionError> {
        let managed = {
            let mut connections = self.connections.write().await;
            if connections.contains_key(&config.id) {
                return Err(ConnectionError::AlreadyExists { id: config.id });
            }
            let managed = self.build(config);
            connections.insert(managed.id().to_string(), managed.clone());
            managed
        };

        info!("Added connection {}", managed.id());
        managed.connect().await;
        Ok(managed.status().await)
    }

    /// Replace the configuration of an existing connection
    #[instrument(skip(self, config), fields(connection_id = %config.id))]
    pub async fn update_connection(
        &self,
        config: ConnectionConfig,
    ) -> Result<ConnectionStatus, ConnectionError> {
        let id = config.id.clone();
        let replacement = self.build(config);
        let previous = {
            let mut connections = self.connections.write().await;
            match connections.get_mut(&id) {
                Some(slot) => std::mem::replace(slot, replacement.clone()),
                None => return Err(ConnectionError::NotFound { id }),
            }
        };

        previous.disconnect().await;
        self.factory.forget(&id).await;
        info!("Updated connection {}", id);

        replacement.connect().await;
        Ok(replacement.status().await)
    }

    #[instrument(skip(self))]
    pub async fn remove_connection(&self, id: &str) -> Result<(), ConnectionError> {
        let managed = self
            .connections
            .write()
            .await
            .remove(id)
            .ok_or_else(|| ConnectionError::NotFound { id: id.to_string() })?;

        managed.disconnect().await;
        self.factory.forget(id).await;
        info!("Removed connection {}", id);
        Ok(())
    }

    /// Live queue service for a connection, only while connected
    pub async fn get_connection(&self, id: &str) -> Option<Arc<dyn QueueService>> {
        let managed = self.connections.read().await.get(id).cloned()?;
        managed.queue_service().await
    }

    pub async fn get_status(&self, id: &str) -> Option<ConnectionStatus> {
        let managed = self.connections.read().await.get(id).cloned()?;
        Some(managed.status().await)
    }

    pub async fn get_config(&self, id: &str) -> Option<ConnectionConfig> {
        self.connections
            .read()
            .await
            .get(id)
            .map(|managed| managed.config().clone())
    }

    pub async fn list_statuses(&self) -> Vec<ConnectionStatus> {
        let connections: Vec<Arc<ManagedConnection>> =
            self.connections.read().await.values().cloned().collect();
        let mut statuses = join_all(connections.iter().map(|managed| managed.status())).await;
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.connections.read().await.contains_key(id)
    }

    /// Try a configuration with a throwaway adapter; nothing is registered
    #[instrument(skip(self, config), fields(address = %config.display_address()))]
    pub async fn test_connection(&self, config: &ConnectionConfig) -> ConnectionTestResult {
        let service = self
            .factory
            .create_by_type(ProviderType::BullMq, config, None);
        let started = Instant::now();

        let result = match timeout(self.test_timeout, service.connect()).await {
            Ok(Ok(())) => ConnectionTestResult::ok(started.elapsed().as_millis() as u64),
            Ok(Err(e)) => ConnectionTestResult::failed(e.to_string()),
            Err(_) => ConnectionTestResult::failed(format!(
                "Connection timed out after {}ms",
                self.test_timeout.as_millis()
            )),
        };

        if let Err(e) = service.disconnect().await {
            warn!("Failed to close test connection: {}", e);
        }
        result
    }

    /// Operator-initiated reconnect with a fresh attempt budget
    #[instrument(skip(self))]
    pub async fn reconnect(&self, id: &str) -> Result<ConnectionStatus, ConnectionError> {
        let managed = self.lookup(id).await?;
        managed.reconnect().await;
        Ok(managed.status().await)
    }

    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        self.events.subscribe().await
    }

    pub async fn shutdown(&self) {
        let connections: Vec<Arc<ManagedConnection>> = self
            .connections
            .write()
            .await
            .drain()
            .map(|(_, managed)| managed)
            .collect();

        info!("Shutting down {} connections", connections.len());
        join_all(connections.iter().map(|managed| managed.disconnect())).await;
    }
}
