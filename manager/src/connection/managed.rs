use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::retry::RetryStrategy;
use super::{ConnectionConfig, ConnectionState, ConnectionStatus};
use crate::queue::{AdapterEvent, ProviderFactory, QueueService};

/// Receives every state transition and error of a managed connection
///
/// Called while the connection's internal lock is held, so calls arrive in
/// transition order. Implementations must not call back into the connection.
#[async_trait]
pub trait ConnectionListener: Send + Sync {
    async fn on_state_change(&self, status: ConnectionStatus);

    async fn on_error(&self, connection_id: &str, error: &str);
}

struct Inner {
    state: ConnectionState,
    provider: Option<Arc<dyn QueueService>>,
    last_error: Option<String>,
    last_connected_at: Option<DateTime<Utc>>,
    last_health_check_at: Option<DateTime<Utc>>,
    reconnect_attempts: u32,
    next_reconnect_at: Option<DateTime<Utc>>,
    reconnect_timer: Option<JoinHandle<()>>,
    intentional_disconnect: bool,
    /// Bumped on every connect attempt and teardown; results and adapter
    /// events tagged with an older generation are discarded.
    generation: u64,
}

/// Per-connection state machine with exponential reconnect
pub struct ManagedConnection {
    config: ConnectionConfig,
    factory: Arc<dyn ProviderFactory>,
    retry: RetryStrategy,
    listener: Arc<dyn ConnectionListener>,
    inner: Mutex<Inner>,
    self_ref: Weak<ManagedConnection>,
}

impl ManagedConnection {
    pub fn new(
        config: ConnectionConfig,
        factory: Arc<dyn ProviderFactory>,
        retry: RetryStrategy,
        listener: Arc<dyn ConnectionListener>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            config,
            factory,
            retry,
            listener,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                provider: None,
                last_error: None,
                last_connected_at: None,
                last_health_check_at: None,
                reconnect_attempts: 0,
                next_reconnect_at: None,
                reconnect_timer: None,
                intentional_disconnect: false,
                generation: 0,
            }),
            self_ref: self_ref.clone(),
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    pub async fn status(&self) -> ConnectionStatus {
        let inner = self.inner.lock().await;
        self.snapshot(&inner)
    }

    /// The live adapter, only while connected
    pub async fn queue_service(&self) -> Option<Arc<dyn QueueService>> {
        let inner = self.inner.lock().await;
        match inner.state {
            ConnectionState::Connected => inner.provider.clone(),
            _ => None,
        }
    }

    pub async fn connect(&self) {
        let generation = {
            let mut inner = self.inner.lock().await;
            if matches!(
                inner.state,
                ConnectionState::Connected | ConnectionState::Connecting
            ) {
                return;
            }

            inner.intentional_disconnect = false;
            inner.generation += 1;
            // A timer that fired has already released its handle
            if let Some(timer) = inner.reconnect_timer.take() {
                timer.abort();
            }
            inner.next_reconnect_at = None;
            self.set_state(&mut inner, ConnectionState::Connecting).await;
            inner.generation
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let service = self.factory.create(&self.config, events_tx).await;
        let result = service.connect().await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            drop(inner);
            debug!(
                "Discarding stale connect result for {} (generation {})",
                self.config.id, generation
            );
            let _ = service.disconnect().await;
            return;
        }

        match result {
            Ok(()) => {
                let previous = inner.provider.replace(service);
                let now = Utc::now();
                inner.last_connected_at = Some(now);
                inner.last_health_check_at = Some(now);
                inner.reconnect_attempts = 0;
                inner.last_error = None;
                self.set_state(&mut inner, ConnectionState::Connected).await;
                drop(inner);

                info!(
                    "Connection {} established to {}",
                    self.config.id,
                    self.config.display_address()
                );
                self.spawn_event_forwarder(events_rx, generation);

                if let Some(previous) = previous {
                    let _ = previous.disconnect().await;
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Connection {} failed: {}", self.config.id, message);
                inner.last_error = Some(message.clone());
                self.set_state(&mut inner, ConnectionState::Error).await;
                self.listener.on_error(&self.config.id, &message).await;
                self.schedule_reconnect(&mut inner).await;
            }
        }
    }

    pub async fn disconnect(&self) {
        let provider = {
            let mut inner = self.inner.lock().await;
            inner.intentional_disconnect = true;
            inner.generation += 1;
            if let Some(timer) = inner.reconnect_timer.take() {
                timer.abort();
            }
            inner.next_reconnect_at = None;
            let provider = inner.provider.take();
            self.set_state(&mut inner, ConnectionState::Disconnected).await;
            provider
        };

        if let Some(provider) = provider {
            if let Err(e) = provider.disconnect().await {
                debug!("Ignoring disconnect error on {}: {}", self.config.id, e);
            }
        }
        info!("Connection {} disconnected", self.config.id);
    }

    /// Operator-initiated reconnect: resets the attempt counter
    pub async fn reconnect(&self) {
        self.disconnect().await;
        self.inner.lock().await.reconnect_attempts = 0;
        self.connect().await;
    }

    fn snapshot(&self, inner: &Inner) -> ConnectionStatus {
        ConnectionStatus {
            id: self.config.id.clone(),
            workspace_id: self.config.workspace_id.clone(),
            state: inner.state,
            error: inner.last_error.clone(),
            last_connected_at: inner.last_connected_at,
            last_health_check_at: inner.last_health_check_at,
            reconnect_attempts: inner.reconnect_attempts,
            next_reconnect_at: inner.next_reconnect_at,
        }
    }

    async fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        if inner.state == state {
            return;
        }
        debug!(
            "Connection {} state {} -> {}",
            self.config.id, inner.state, state
        );
        inner.state = state;
        self.listener.on_state_change(self.snapshot(inner)).await;
    }

    async fn schedule_reconnect(&self, inner: &mut Inner) {
        if inner.intentional_disconnect {
            return;
        }

        if !self.retry.should_retry(inner.reconnect_attempts) {
            error!(
                "Connection {} reached max reconnect attempts ({}), waiting for manual reconnect",
                self.config.id, inner.reconnect_attempts
            );
            return;
        }

        inner.reconnect_attempts += 1;
        let delay = self.retry.get_delay(inner.reconnect_attempts);
        inner.next_reconnect_at =
            Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero()));

        info!(
            "Scheduling reconnect attempt {} for {} in {}ms",
            inner.reconnect_attempts,
            self.config.id,
            delay.as_millis()
        );
        self.set_state(inner, ConnectionState::Reconnecting).await;

        if let Some(previous) = inner
            .reconnect_timer
            .replace(tokio::spawn(delayed_connect(self.self_ref.clone(), delay)))
        {
            previous.abort();
        }
    }

    fn spawn_event_forwarder(
        &self,
        mut events: mpsc::UnboundedReceiver<AdapterEvent>,
        generation: u64,
    ) {
        let connection = self.self_ref.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(connection) = connection.upgrade() else {
                    break;
                };
                if !connection.handle_adapter_event(generation, event).await {
                    break;
                }
            }
        });
    }

    /// Returns false once the adapter behind `generation` is no longer current
    async fn handle_adapter_event(&self, generation: u64, event: AdapterEvent) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.intentional_disconnect {
            return false;
        }

        match event {
            AdapterEvent::HealthCheck { at } => {
                inner.last_health_check_at = Some(at);
                true
            }
            AdapterEvent::Reconnecting => {
                warn!("Connection {} lost transport, retrying", self.config.id);
                self.set_state(&mut inner, ConnectionState::Reconnecting).await;
                true
            }
            AdapterEvent::Reconnected => {
                inner.last_connected_at = Some(Utc::now());
                inner.reconnect_attempts = 0;
                inner.last_error = None;
                self.set_state(&mut inner, ConnectionState::Connected).await;
                true
            }
            AdapterEvent::Disconnected { reason } => {
                warn!("Connection {} dropped: {}", self.config.id, reason);
                let provider = self.drop_provider(&mut inner, reason).await;
                drop(inner);
                if let Some(provider) = provider {
                    let _ = provider.disconnect().await;
                }
                false
            }
            AdapterEvent::Error { message } => {
                error!("Connection {} adapter error: {}", self.config.id, message);
                self.listener.on_error(&self.config.id, &message).await;
                let provider = self.drop_provider(&mut inner, message).await;
                drop(inner);
                if let Some(provider) = provider {
                    let _ = provider.disconnect().await;
                }
                false
            }
        }
    }

    async fn drop_provider(
        &self,
        inner: &mut Inner,
        reason: String,
    ) -> Option<Arc<dyn QueueService>> {
        inner.last_error = Some(reason);
        inner.generation += 1;
        let provider = inner.provider.take();
        self.set_state(inner, ConnectionState::Error).await;
        self.schedule_reconnect(inner).await;
        provider
    }
}

fn delayed_connect(connection: Weak<ManagedConnection>, delay: Duration) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        tokio::time::sleep(delay).await;
        if let Some(connection) = connection.upgrade() {
            // Detach ourselves so connect() cannot abort the running task
            drop(connection.inner.lock().await.reconnect_timer.take());
            connection.connect().await;
        }
    })
}

impl Drop for ManagedConnection {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.get_mut().reconnect_timer.take() {
            timer.abort();
        }
    }
}
