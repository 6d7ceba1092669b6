//! Best-effort fan-out of server messages to every live connection

use crate::client_manager::Client;
use crate::store::SessionStore;
use log::{debug, error, warn};
use shared::ServerMessage;
use std::sync::Arc;

/// Delivery counts for one broadcast
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
    /// Clients that already had a newer state update
    pub superseded: usize,
}

/// Sends `message` to every connection registered at the time of the call.
///
/// The connection list is copied under the store lock and the lock is released
/// before any send. A failed send is logged and skipped; it neither aborts the
/// remaining sends nor removes the connection, which is left to that
/// connection's own receive loop.
pub async fn broadcast(store: &SessionStore, message: &ServerMessage) -> BroadcastReport {
    let clients = store.connections();
    send_to_all(&clients, message).await
}

/// Sends the current state as a `game_update` to every connection.
///
/// The snapshot and its version are read together, so a client that already
/// received a newer update skips this one instead of moving back in time.
pub async fn broadcast_update(store: &SessionStore) -> BroadcastReport {
    let (version, state) = store.versioned_snapshot();
    let clients = store.connections();
    let message = ServerMessage::GameUpdate { state };
    let mut report = BroadcastReport::default();

    let payload = match message.to_bytes() {
        Ok(payload) => payload,
        Err(e) => {
            error!("Failed to encode state update: {}", e);
            report.failed = clients.len();
            return report;
        }
    };

    for client in &clients {
        match client.send_update(version, &payload).await {
            Ok(true) => report.delivered += 1,
            Ok(false) => report.superseded += 1,
            Err(e) => {
                warn!("Failed to send update to client {}: {}", client.id, e);
                report.failed += 1;
            }
        }
    }

    debug!(
        "Broadcast update v{} to {} of {} clients",
        version,
        report.delivered,
        clients.len()
    );
    report
}

pub async fn send_to_all(clients: &[Arc<Client>], message: &ServerMessage) -> BroadcastReport {
    let mut report = BroadcastReport::default();

    let payload = match message.to_bytes() {
        Ok(payload) => payload,
        Err(e) => {
            error!("Failed to encode {} broadcast: {}", message.kind(), e);
            report.failed = clients.len();
            return report;
        }
    };

    for client in clients {
        match client.send_payload(&payload).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!("Failed to send {} to client {}: {}", message.kind(), client.id, e);
                report.failed += 1;
            }
        }
    }

    debug!(
        "Broadcast {} to {} of {} clients",
        message.kind(),
        report.delivered,
        clients.len()
    );
    report
}
