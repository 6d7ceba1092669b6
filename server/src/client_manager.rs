//! Live connection registry for the session server
//!
//! This module tracks every accepted TCP connection, including:
//! - Sequential participant id assignment starting at 1
//! - The write half of each socket, serialized behind its own async mutex
//! - Point-in-time copies of the connection list for broadcasting
//!
//! The registry itself is not synchronized. It lives inside the session store,
//! whose lock guards roster, game data and connections together.

use crate::error::ServerError;
use log::debug;
use shared::{write_frame, ServerMessage};
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Outgoing half of a participant's socket
pub type FrameWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A connected participant
///
/// Each client carries:
/// - Its participant id and peer address
/// - The time it connected
/// - The socket write half used for every outgoing frame
/// - The version of the last state update written to it
pub struct Client {
    /// Participant id assigned in connection order
    pub id: u32,
    /// Peer address, for logging
    pub addr: SocketAddr,
    /// When the connection was accepted
    pub connected_at: Instant,
    writer: Mutex<ClientWriter>,
}

struct ClientWriter {
    sink: FrameWriter,
    /// Highest state version already sent. Updates below it are stale.
    last_update: u64,
}

impl Client {
    /// Creates a client around the write half of an accepted socket
    pub fn new(id: u32, addr: SocketAddr, writer: FrameWriter) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            writer: Mutex::new(ClientWriter {
                sink: writer,
                last_update: 0,
            }),
        }
    }

    /// Encodes and sends one message to this client
    pub async fn send(&self, message: &ServerMessage) -> Result<(), ServerError> {
        let payload = message.to_bytes()?;
        self.send_payload(&payload).await
    }

    /// Sends an already encoded envelope
    ///
    /// Frames from concurrent senders never interleave: the writer lock is
    /// held for the whole frame.
    pub async fn send_payload(&self, payload: &[u8]) -> Result<(), ServerError> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer.sink, payload).await?;
        Ok(())
    }

    /// Sends an encoded `game_update` taken at store version `version`.
    ///
    /// Connection tasks broadcast concurrently, so an older snapshot can reach
    /// the writer after a newer one. Such an update is dropped and `Ok(false)`
    /// is returned, which keeps every participant on the latest state.
    pub async fn send_update(&self, version: u64, payload: &[u8]) -> Result<bool, ServerError> {
        let mut writer = self.writer.lock().await;
        if version < writer.last_update {
            debug!(
                "Skipping stale update v{} for client {} (already at v{})",
                version, self.id, writer.last_update
            );
            return Ok(false);
        }
        write_frame(&mut *writer.sink, payload).await?;
        writer.last_update = version;
        Ok(true)
    }

    /// Shuts down the write direction, which the peer sees as end of stream
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.sink.shutdown().await {
            debug!("Error closing client {}: {}", self.id, e);
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

/// Registry of active connections keyed by participant id
///
/// Ids are never reused within a server run: a participant that reconnects
/// gets the next id, not its old one.
#[derive(Debug)]
pub struct ClientManager {
    /// Connected clients ordered by id
    clients: BTreeMap<u32, Arc<Client>>,
    /// Next id to hand out
    next_client_id: u32,
}

impl ClientManager {
    /// Creates an empty registry. The first client gets id 1.
    pub fn new() -> Self {
        Self {
            clients: BTreeMap::new(),
            next_client_id: 1,
        }
    }

    /// Registers a new connection under the next sequential id
    pub fn add_client(&mut self, addr: SocketAddr, writer: FrameWriter) -> Arc<Client> {
        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let client = Arc::new(Client::new(client_id, addr, writer));
        self.clients.insert(client_id, Arc::clone(&client));
        client
    }

    /// Removes a connection. Returns false if it was already gone.
    pub fn remove_client(&mut self, client_id: u32) -> bool {
        self.clients.remove(&client_id).is_some()
    }

    pub fn contains(&self, client_id: u32) -> bool {
        self.clients.contains_key(&client_id)
    }

    /// Copies the current connection list
    ///
    /// Callers iterate the copy after releasing the store lock, so sends
    /// never happen while the lock is held.
    pub fn get_clients(&self) -> Vec<Arc<Client>> {
        self.clients.values().cloned().collect()
    }

    /// Removes and returns every connection
    pub fn drain(&mut self) -> Vec<Arc<Client>> {
        std::mem::take(&mut self.clients).into_values().collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}
