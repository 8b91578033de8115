// File: manager/src/services/status_sync.rs
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState};
use crate::database::Database;

/// Persist connection state transitions to the connections table
///
/// The last error is kept per connection so a later `error` state row
/// carries the message that caused it.
pub async fn spawn_status_sync(
    manager: &ConnectionManager,
    database: Arc<Database>,
) -> JoinHandle<()> {
    let events = manager.subscribe().await;
    tokio::spawn(run(events, database))
}

async fn run(mut events: mpsc::UnboundedReceiver<ConnectionEvent>, database: Arc<Database>) {
    let mut last_errors: HashMap<String, String> = HashMap::new();

    while let Some(event) = events.recv().await {
        let (id, state, error) = match event {
            ConnectionEvent::Error {
                connection_id,
                error,
            } => {
                last_errors.insert(connection_id.clone(), error.clone());
                (connection_id, ConnectionState::Error, Some(error))
            }
            ConnectionEvent::StateChanged {
                connection_id,
                state,
            } => {
                if matches!(
                    state,
                    ConnectionState::Connected | ConnectionState::Disconnected
                ) {
                    last_errors.remove(&connection_id);
                }
                let error = last_errors.get(&connection_id).cloned();
                (connection_id, state, error)
            }
            // Covered by the StateChanged event emitted alongside
            ConnectionEvent::Connected { .. }
            | ConnectionEvent::Disconnected { .. }
            | ConnectionEvent::Reconnecting { .. } => continue,
        };

        debug!("Persisting state {} for connection {}", state, id);
        if let Err(e) = database
            .update_connection_status(&id, state, error.as_deref())
            .await
        {
            warn!("Failed to persist status for connection {}: {}", id, e);
        }
    }

    debug!("Connection event stream closed, status sync exiting");
}
