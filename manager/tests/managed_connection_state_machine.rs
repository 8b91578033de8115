//! Integration tests for the per-connection state machine
//!
//! These run on paused tokio time so reconnect backoff elapses instantly,
//! and observe transitions through the connection manager's event stream.

mod common;

use async_trait::async_trait;
use common::fixtures::*;
use queue_manager::connection::{
    ConnectionEvent, ConnectionListener, ConnectionManager, ConnectionState, ConnectionStatus,
    ManagedConnection,
};
use queue_manager::queue::AdapterEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn manager(factory: &Arc<FakeProviderFactory>, max_attempts: u32) -> ConnectionManager {
    ConnectionManager::new(factory.clone(), fast_retry(max_attempts))
}

/// Drain every state change currently queued
fn drain_states(events: &mut UnboundedReceiver<ConnectionEvent>) -> Vec<ConnectionState> {
    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ConnectionEvent::StateChanged { state, .. } = event {
            states.push(state);
        }
    }
    states
}

fn drain_events(events: &mut UnboundedReceiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

struct SilentListener;

#[async_trait]
impl ConnectionListener for SilentListener {
    async fn on_state_change(&self, _status: ConnectionStatus) {}

    async fn on_error(&self, _connection_id: &str, _error: &str) {}
}

async fn settle(duration: Duration) {
    tokio::time::sleep(duration).await;
    // Let spawned tasks observe the advanced clock
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_successful_connect_emits_connecting_then_connected() {
    let factory = Arc::new(FakeProviderFactory::new());
    let manager = manager(&factory, 5);
    let mut events = manager.subscribe().await;

    let status = manager
        .add_connection(connection_config(connections::PRIMARY))
        .await
        .unwrap();

    assert_eq!(status.state, ConnectionState::Connected);
    assert!(status.last_connected_at.is_some());
    assert_eq!(status.reconnect_attempts, 0);
    assert_eq!(
        drain_states(&mut events),
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );
    assert!(manager.get_connection(connections::PRIMARY).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_failures_back_off_then_recover() {
    let factory = Arc::new(FakeProviderFactory::new());
    factory.service(connections::PRIMARY).fail_next_connects(3);
    let manager = manager(&factory, 10);
    let mut events = manager.subscribe().await;

    let status = manager
        .add_connection(connection_config(connections::PRIMARY))
        .await
        .unwrap();
    assert_eq!(status.state, ConnectionState::Reconnecting);
    assert_eq!(status.reconnect_attempts, 1);
    assert!(status.error.is_some());
    assert!(manager.get_connection(connections::PRIMARY).await.is_none());

    // Failures land at 0ms, 100ms and 300ms
    settle(Duration::from_millis(350)).await;
    let status = manager.get_status(connections::PRIMARY).await.unwrap();
    assert_eq!(status.state, ConnectionState::Reconnecting);
    assert_eq!(status.reconnect_attempts, 3);

    let states = drain_states(&mut events);
    assert_eq!(states.len(), 9);
    assert_eq!(
        states,
        [
            ConnectionState::Connecting,
            ConnectionState::Error,
            ConnectionState::Reconnecting,
        ]
        .repeat(3)
    );

    // Third delay is base * 4, so the next attempt runs at 700ms
    settle(Duration::from_millis(340)).await;
    assert_eq!(
        manager.get_status(connections::PRIMARY).await.unwrap().state,
        ConnectionState::Reconnecting
    );
    settle(Duration::from_millis(20)).await;

    let status = manager.get_status(connections::PRIMARY).await.unwrap();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.reconnect_attempts, 0);
    assert_eq!(status.error, None);
    assert_eq!(factory.service(connections::PRIMARY).connect_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts() {
    let factory = Arc::new(FakeProviderFactory::new());
    factory.service(connections::PRIMARY).fail_next_connects(100);
    let manager = manager(&factory, 2);

    manager
        .add_connection(connection_config(connections::PRIMARY))
        .await
        .unwrap();
    settle(Duration::from_secs(10)).await;

    let status = manager.get_status(connections::PRIMARY).await.unwrap();
    assert_eq!(status.state, ConnectionState::Error);
    assert_eq!(status.reconnect_attempts, 2);
    assert_eq!(status.next_reconnect_at, None);
    // Initial attempt plus two retries
    assert_eq!(factory.service(connections::PRIMARY).connect_calls(), 3);

    // Manual reconnect starts a fresh budget
    factory.service(connections::PRIMARY).fail_next_connects(0);
    let status = manager.reconnect(connections::PRIMARY).await.unwrap();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.reconnect_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_error_events_carry_the_failure_message() {
    let factory = Arc::new(FakeProviderFactory::new());
    factory.service(connections::PRIMARY).fail_next_connects(1);
    let manager = manager(&factory, 3);
    let mut events = manager.subscribe().await;

    manager
        .add_connection(connection_config(connections::PRIMARY))
        .await
        .unwrap();

    let mut saw_error = false;
    let mut saw_reconnecting = false;
    while let Ok(event) = events.try_recv() {
        match event {
            ConnectionEvent::Error { error, .. } => {
                assert!(error.contains("fake backend"), "unexpected error: {}", error);
                saw_error = true;
            }
            ConnectionEvent::Reconnecting { attempt, .. } => {
                assert_eq!(attempt, 1);
                saw_reconnecting = true;
            }
            _ => {}
        }
    }
    assert!(saw_error && saw_reconnecting);
}

#[tokio::test(start_paused = true)]
async fn test_adapter_disconnect_triggers_reconnect() {
    let factory = Arc::new(FakeProviderFactory::new());
    let manager = manager(&factory, 5);
    manager
        .add_connection(connection_config(connections::PRIMARY))
        .await
        .unwrap();
    let mut events = manager.subscribe().await;

    assert!(factory.emit(
        connections::PRIMARY,
        AdapterEvent::Disconnected {
            reason: "health check failed".to_string(),
        },
    ));
    settle(Duration::from_millis(1)).await;

    let status = manager.get_status(connections::PRIMARY).await.unwrap();
    assert_eq!(status.state, ConnectionState::Reconnecting);
    assert_eq!(status.error.as_deref(), Some("health check failed"));
    assert!(manager.get_connection(connections::PRIMARY).await.is_none());

    settle(Duration::from_millis(100)).await;
    assert_eq!(
        manager.get_status(connections::PRIMARY).await.unwrap().state,
        ConnectionState::Connected
    );
    assert_eq!(
        drain_states(&mut events),
        vec![
            ConnectionState::Error,
            ConnectionState::Reconnecting,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_intentional_disconnect_cancels_pending_reconnect() {
    let factory = Arc::new(FakeProviderFactory::new());
    factory.service(connections::PRIMARY).fail_next_connects(1);
    let manager = manager(&factory, 5);

    manager
        .add_connection(connection_config(connections::PRIMARY))
        .await
        .unwrap();
    manager.remove_connection(connections::PRIMARY).await.unwrap();

    settle(Duration::from_secs(5)).await;
    assert_eq!(factory.service(connections::PRIMARY).connect_calls(), 1);
    assert!(manager.get_status(connections::PRIMARY).await.is_none());
    assert_eq!(factory.forgotten(), vec![connections::PRIMARY.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_during_slow_connect_discards_the_stale_attempt() {
    let factory = Arc::new(FakeProviderFactory::new());
    let service = factory.service(connections::PRIMARY);
    service.set_connect_delay(Duration::from_secs(1));
    let manager = Arc::new(manager(&factory, 5));
    let mut events = manager.subscribe().await;

    let adding = tokio::spawn({
        let manager = manager.clone();
        async move {
            manager
                .add_connection(connection_config(connections::PRIMARY))
                .await
        }
    });
    settle(Duration::from_millis(100)).await;
    assert_eq!(
        manager.get_status(connections::PRIMARY).await.unwrap().state,
        ConnectionState::Connecting
    );

    // The first connect resolves at 1000ms, the second at 1100ms
    let reconnecting = tokio::spawn({
        let manager = manager.clone();
        async move { manager.reconnect(connections::PRIMARY).await }
    });
    settle(Duration::from_millis(950)).await;
    adding.await.unwrap().unwrap();
    assert_eq!(service.disconnect_calls(), 1);
    assert_eq!(
        manager.get_status(connections::PRIMARY).await.unwrap().state,
        ConnectionState::Connecting
    );

    settle(Duration::from_millis(100)).await;
    let status = reconnecting.await.unwrap().unwrap();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(factory.created(connections::PRIMARY), 2);
    assert_eq!(service.connect_calls(), 2);
    assert_eq!(service.disconnect_calls(), 1);
    assert!(manager.get_connection(connections::PRIMARY).await.is_some());
    assert_eq!(
        drain_states(&mut events),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_adapter_transport_retries_are_mirrored() {
    let factory = Arc::new(FakeProviderFactory::new());
    let manager = manager(&factory, 5);
    manager
        .add_connection(connection_config(connections::PRIMARY))
        .await
        .unwrap();
    let mut events = manager.subscribe().await;

    assert!(factory.emit(connections::PRIMARY, AdapterEvent::Reconnecting));
    settle(Duration::from_millis(1)).await;

    let status = manager.get_status(connections::PRIMARY).await.unwrap();
    assert_eq!(status.state, ConnectionState::Reconnecting);
    assert_eq!(status.reconnect_attempts, 0);
    assert!(manager.get_connection(connections::PRIMARY).await.is_none());

    assert!(factory.emit(connections::PRIMARY, AdapterEvent::Reconnected));
    settle(Duration::from_millis(1)).await;

    let status = manager.get_status(connections::PRIMARY).await.unwrap();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.error, None);
    assert!(manager.get_connection(connections::PRIMARY).await.is_some());
    // The adapter recovered on its own; no new adapter was created
    assert_eq!(factory.created(connections::PRIMARY), 1);
    assert_eq!(factory.service(connections::PRIMARY).connect_calls(), 1);

    let id = connections::PRIMARY.to_string();
    assert_eq!(
        drain_events(&mut events),
        vec![
            ConnectionEvent::StateChanged {
                connection_id: id.clone(),
                state: ConnectionState::Reconnecting,
            },
            ConnectionEvent::Reconnecting {
                connection_id: id.clone(),
                attempt: 0,
            },
            ConnectionEvent::StateChanged {
                connection_id: id.clone(),
                state: ConnectionState::Connected,
            },
            ConnectionEvent::Connected { connection_id: id },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_cancels_the_pending_timer() {
    let factory = Arc::new(FakeProviderFactory::new());
    let service = factory.service(connections::PRIMARY);
    service.fail_next_connects(2);
    let connection = ManagedConnection::new(
        connection_config(connections::PRIMARY),
        factory.clone(),
        fast_retry(5),
        Arc::new(SilentListener),
    );

    // Fails at 0ms and schedules a retry for 100ms
    connection.connect().await;
    assert_eq!(connection.state().await, ConnectionState::Reconnecting);

    // Fails again at 50ms; the next retry moves to 250ms
    settle(Duration::from_millis(50)).await;
    connection.connect().await;
    assert_eq!(connection.status().await.reconnect_attempts, 2);

    settle(Duration::from_millis(100)).await;
    assert_eq!(service.connect_calls(), 2);
    assert_eq!(connection.state().await, ConnectionState::Reconnecting);

    settle(Duration::from_millis(110)).await;
    assert_eq!(service.connect_calls(), 3);
    assert_eq!(connection.state().await, ConnectionState::Connected);
}
