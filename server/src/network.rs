//! Server network layer: TCP acceptor and one receive task per connection

use crate::broadcast::{broadcast, broadcast_update};
use crate::client_manager::Client;
use crate::error::ServerError;
use crate::store::SessionStore;
use log::{debug, error, info, warn};
use shared::{
    envelope_type, read_frame, ClientMessage, ServerMessage, DEFAULT_HOST, DEFAULT_PORT,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on, `host:port`
    pub addr: String,
    /// Send an `ack` to the sender after each processed message
    pub send_acks: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT),
            send_acks: true,
        }
    }
}

/// Lifecycle of one participant connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    Identified,
    Active,
    Closed,
}

/// State shared by the acceptor and every connection task
#[derive(Clone)]
struct ServerContext {
    store: Arc<SessionStore>,
    running: Arc<AtomicBool>,
    shutdown: watch::Receiver<bool>,
    send_acks: bool,
}

impl ServerContext {
    fn is_stopping(&self) -> bool {
        !self.running.load(Ordering::SeqCst) || *self.shutdown.borrow()
    }
}

pub struct Server {
    config: ServerConfig,
    local_addr: SocketAddr,
    store: Arc<SessionStore>,
    running: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    listener: Option<TcpListener>,
    acceptor: Option<JoinHandle<()>>,
}

impl Server {
    /// Binds the listening socket. Nothing is accepted until `start`.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Server {
            config,
            local_addr,
            store: Arc::new(SessionStore::new()),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            listener: Some(listener),
            acceptor: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn store(&self) -> Arc<SessionStore> {
        Arc::clone(&self.store)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawns the acceptor task
    pub fn start(&mut self) -> Result<(), ServerError> {
        let listener = self.listener.take().ok_or(ServerError::AlreadyStarted)?;
        self.running.store(true, Ordering::SeqCst);

        let ctx = ServerContext {
            store: Arc::clone(&self.store),
            running: Arc::clone(&self.running),
            shutdown: self.shutdown_tx.subscribe(),
            send_acks: self.config.send_acks,
        };

        info!("Server listening on {}", self.local_addr);
        self.acceptor = Some(tokio::spawn(accept_loop(listener, ctx)));
        Ok(())
    }

    /// Stops accepting, closes every connection and then the listener.
    ///
    /// Pending outbound frames are not drained.
    pub async fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping server");

        for client in self.store.drain_connections() {
            client.close().await;
        }

        let _ = self.shutdown_tx.send(true);
        if let Some(acceptor) = self.acceptor.take() {
            if let Err(e) = acceptor.await {
                error!("Acceptor task failed: {}", e);
            }
        }
        info!("Server stopped");
    }
}

async fn accept_loop(listener: TcpListener, ctx: ServerContext) {
    let mut shutdown = ctx.shutdown.clone();

    while !ctx.is_stopping() {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => on_accept(&ctx, stream, addr).await,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            },
        }
    }

    debug!("Acceptor exiting, closing listener");
}

/// Registers the connection, identifies it, sends the current state and
/// hands it to its own receive task.
async fn on_accept(ctx: &ServerContext, stream: TcpStream, addr: SocketAddr) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
    }
    let (reader, writer) = stream.into_split();

    let registration = ctx.store.accept_connection(addr, Box::new(writer));
    let mut conn = Connection {
        client: registration.client,
        state: ConnectionState::Accepted,
    };
    info!("Client {} connected from {}", conn.client.id, addr);

    if let Err(e) = greet(ctx, &mut conn).await {
        warn!("Failed to greet client {}: {}", conn.client.id, e);
        conn.close(&ctx.store).await;
        return;
    }

    tokio::spawn(receive_loop(ctx.clone(), conn, reader));

    if registration.active_connections == 2 {
        info!("Two participants connected, starting game");
        broadcast(&ctx.store, &ServerMessage::GameStart).await;
    }
}

async fn greet(ctx: &ServerContext, conn: &mut Connection) -> Result<(), ServerError> {
    conn.client
        .send(&ServerMessage::Connection { id: conn.client.id })
        .await?;
    conn.transition(ConnectionState::Identified);

    let (version, state) = ctx.store.versioned_snapshot();
    let update = ServerMessage::GameUpdate { state }.to_bytes()?;
    conn.client.send_update(version, &update).await?;
    conn.transition(ConnectionState::Active);
    Ok(())
}

struct Connection {
    client: Arc<Client>,
    state: ConnectionState,
}

impl Connection {
    fn transition(&mut self, next: ConnectionState) {
        debug!("Client {}: {:?} -> {:?}", self.client.id, self.state, next);
        self.state = next;
    }

    async fn close(&mut self, store: &SessionStore) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.transition(ConnectionState::Closed);
        store.remove_connection(self.client.id);
        self.client.close().await;
        info!(
            "Client {} closed after {:?}",
            self.client.id,
            self.client.connected_at.elapsed()
        );
    }
}

async fn receive_loop(ctx: ServerContext, mut conn: Connection, mut reader: OwnedReadHalf) {
    let mut shutdown = ctx.shutdown.clone();
    let id = conn.client.id;

    while !ctx.is_stopping() {
        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            frame = read_frame(&mut reader) => frame,
        };

        match frame {
            Ok(payload) => handle_payload(&ctx, &conn.client, &payload).await,
            Err(e) if e.is_disconnect() => {
                info!("Client {} disconnected", id);
                break;
            }
            Err(e) => {
                warn!("Dropping client {}: {}", id, e);
                break;
            }
        }
    }

    conn.close(&ctx.store).await;
}

async fn handle_payload(ctx: &ServerContext, client: &Client, payload: &[u8]) {
    let message = match ClientMessage::from_bytes(payload) {
        Ok(message) => message,
        Err(e) => {
            debug!("Ignoring undecodable message from client {}: {}", client.id, e);
            return;
        }
    };
    debug!("Client {} sent {}", client.id, message.kind());

    let kind = match message {
        ClientMessage::Unknown => envelope_type(payload).unwrap_or_else(|| "unknown".to_string()),
        _ => message.kind().to_string(),
    };
    match message {
        ClientMessage::Action { data } => {
            let outcome = ctx.store.merge_action(client.id, data);
            if outcome.host_started_game {
                broadcast(&ctx.store, &ServerMessage::GameStart).await;
            }
            broadcast_update(&ctx.store).await;
        }
        ClientMessage::Chat { message } => {
            let chat = ServerMessage::Chat {
                sender_id: client.id,
                message,
            };
            broadcast(&ctx.store, &chat).await;
        }
        ClientMessage::Unknown => {
            warn!("Ignoring unknown message type {:?} from client {}", kind, client.id);
        }
    }

    if ctx.send_acks {
        let ack = ServerMessage::Ack { message_type: kind };
        if let Err(e) = client.send(&ack).await {
            debug!("Failed to ack client {}: {}", client.id, e);
        }
    }
}
