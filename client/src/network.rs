//! Client session: connection lifecycle, background receive task, automatic
//! reconnection and event dispatch to registered observers

use crate::events::{dispatch, EventKind, ObserverId, ObserverRegistry, SessionEvent};
use log::{debug, error, info, warn};
use shared::{
    lock_unpoisoned, read_frame, write_frame, ClientMessage, FrameError, ServerMessage, StateMap,
    CONNECT_TIMEOUT, MAX_RECONNECT_ATTEMPTS, PING_SENTINEL, PROBE_TIMEOUT, READ_IDLE_TIMEOUT,
    RECONNECT_DELAY,
};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Limit on establishing a TCP connection
    pub connect_timeout: Duration,
    /// How long the receive task waits for data before re-checking the
    /// session state. Expiry is not an error.
    pub read_idle_timeout: Duration,
    /// Reconnect cycles the receive task tries before giving up
    pub max_reconnect_attempts: u32,
    /// Pause between failed reconnect cycles
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            read_idle_timeout: READ_IDLE_TIMEOUT,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// The live receive task and the channel used to hand it a fresh socket
/// after a reconnect
struct ReceiveTask {
    handle: JoinHandle<()>,
    readers: mpsc::UnboundedSender<OwnedReadHalf>,
}

struct Inner {
    config: ClientConfig,
    target: Mutex<Option<String>>,
    state: Mutex<SessionState>,
    closing: AtomicBool,
    /// Set while the receive task runs its reconnect cycle. Cleared together
    /// with `state` under its lock when the session ends.
    recovering: AtomicBool,
    client_id: Mutex<Option<u32>>,
    last_state: Mutex<Option<StateMap>>,
    observers: Mutex<ObserverRegistry>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    receiver: Mutex<Option<ReceiveTask>>,
}

/// Handle to one client session. Clones share the same connection.
#[derive(Clone)]
pub struct ClientSession {
    inner: Arc<Inner>,
}

enum Incoming {
    Frame(Result<Vec<u8>, FrameError>),
    FreshReader(Option<OwnedReadHalf>),
    Stopped,
}

impl ClientSession {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                target: Mutex::new(None),
                state: Mutex::new(SessionState::Disconnected),
                closing: AtomicBool::new(false),
                recovering: AtomicBool::new(false),
                client_id: Mutex::new(None),
                last_state: Mutex::new(None),
                observers: Mutex::new(ObserverRegistry::new()),
                writer: tokio::sync::Mutex::new(None),
                receiver: Mutex::new(None),
            }),
        }
    }

    pub fn register<F>(&self, kind: EventKind, observer: F) -> ObserverId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        lock_unpoisoned(&self.inner.observers).register(kind, observer)
    }

    pub fn unregister(&self, kind: EventKind, id: ObserverId) -> bool {
        lock_unpoisoned(&self.inner.observers).unregister(kind, id)
    }

    /// Participant id assigned by the server, once known
    pub fn client_id(&self) -> Option<u32> {
        *lock_unpoisoned(&self.inner.client_id)
    }

    pub fn state(&self) -> SessionState {
        *lock_unpoisoned(&self.inner.state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Most recent state mapping received in a `game_update`
    pub fn last_state(&self) -> Option<StateMap> {
        lock_unpoisoned(&self.inner.last_state).clone()
    }

    /// Ends the session and reports whether `disconnect` observers still
    /// need to hear about it. Only the first caller after a live or
    /// recovering session gets true.
    fn finish(&self) -> bool {
        let mut current = lock_unpoisoned(&self.inner.state);
        let was_recovering = self.inner.recovering.swap(false, Ordering::SeqCst);
        let was_live = *current != SessionState::Disconnected;
        *current = SessionState::Disconnected;
        was_live || was_recovering
    }

    fn set_state(&self, state: SessionState) {
        let mut current = lock_unpoisoned(&self.inner.state);
        if *current != state {
            debug!("Session {:?} -> {:?}", *current, state);
            *current = state;
        }
    }

    /// Connects to the server and starts the background receive task.
    ///
    /// Returns false if the server could not be reached within the connect
    /// timeout. Never panics on network failure.
    pub async fn connect(&self, host: &str, port: u16) -> bool {
        let addr = format!("{}:{}", host, port);
        *lock_unpoisoned(&self.inner.target) = Some(addr.clone());
        self.inner.closing.store(false, Ordering::SeqCst);
        self.set_state(SessionState::Connecting);
        info!("Connecting to {}", addr);

        let stream = match open_stream(&addr, self.inner.config.connect_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to connect to {}: {}", addr, e);
                self.set_state(SessionState::Disconnected);
                return false;
            }
        };

        let (reader, writer) = stream.into_split();
        *self.inner.writer.lock().await = Some(writer);
        self.set_state(SessionState::Connected);
        self.attach_reader(reader);
        info!("Connected to {}", addr);
        true
    }

    /// Makes sure a usable connection exists.
    ///
    /// A session that believes it is connected is probed by writing the ping
    /// sentinel; if that fails, or the session was not connected, a fresh
    /// connection is opened. The receive task is restarted only if the old
    /// one is no longer alive.
    pub async fn reconnect(&self) -> bool {
        if self.inner.closing.load(Ordering::SeqCst) {
            debug!("Session closed locally, not reconnecting");
            return false;
        }
        let target = lock_unpoisoned(&self.inner.target).clone();
        let Some(target) = target else {
            warn!("Cannot reconnect before the first connect");
            return false;
        };

        let mut writer = self.inner.writer.lock().await;

        if self.is_connected() {
            if let Some(live) = writer.as_mut() {
                match timeout(PROBE_TIMEOUT, write_frame(live, PING_SENTINEL)).await {
                    Ok(Ok(())) => {
                        debug!("Connection probe succeeded");
                        return true;
                    }
                    Ok(Err(e)) => warn!("Connection probe failed: {}", e),
                    Err(_) => warn!("Connection probe timed out"),
                }
            }
            *writer = None;
        }

        self.set_state(SessionState::Reconnecting);
        match open_stream(&target, self.inner.config.connect_timeout).await {
            Ok(_) if self.inner.closing.load(Ordering::SeqCst) => {
                debug!("Session closed while reconnecting, dropping new connection");
                self.set_state(SessionState::Disconnected);
                false
            }
            Ok(stream) => {
                let (reader, fresh_writer) = stream.into_split();
                *writer = Some(fresh_writer);
                self.set_state(SessionState::Connected);
                drop(writer);
                self.attach_reader(reader);
                info!("Reconnected to {}", target);
                true
            }
            Err(e) => {
                warn!("Reconnect to {} failed: {}", target, e);
                *writer = None;
                // A running reconnect cycle decides when the session is lost
                let mut state = lock_unpoisoned(&self.inner.state);
                *state = if self.inner.recovering.load(Ordering::SeqCst) {
                    SessionState::Reconnecting
                } else {
                    SessionState::Disconnected
                };
                false
            }
        }
    }

    /// Closes the connection, stops the receive task and notifies the
    /// `disconnect` observers.
    pub async fn disconnect(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        let notify = self.finish();

        let task = lock_unpoisoned(&self.inner.receiver).take();
        if let Some(task) = task {
            task.handle.abort();
        }

        let writer = self.inner.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!("Error closing connection: {}", e);
            }
        }

        if notify {
            info!("Disconnected from server");
            self.emit(SessionEvent::Disconnect);
        }
    }

    pub async fn send_action(&self, fragment: StateMap) -> bool {
        self.send_message(&ClientMessage::Action { data: fragment })
            .await
    }

    pub async fn send_chat(&self, text: &str) -> bool {
        self.send_message(&ClientMessage::Chat {
            message: text.to_string(),
        })
        .await
    }

    /// Sends one envelope, reconnecting first if needed. A transient failure
    /// (broken pipe, reset, aborted) gets one reconnect and one retry.
    pub async fn send_message(&self, message: &ClientMessage) -> bool {
        let payload = match message.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode {}: {}", message.kind(), e);
                return false;
            }
        };

        if !self.is_connected() {
            info!("Not connected, reconnecting before sending {}", message.kind());
            if !self.reconnect().await {
                return false;
            }
        }

        match self.write_payload(&payload).await {
            Ok(()) => true,
            Err(e) if e.is_disconnect() => {
                warn!("Send failed ({}), reconnecting and retrying once", e);
                if !self.reconnect().await {
                    return false;
                }
                match self.write_payload(&payload).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Retry of {} failed: {}", message.kind(), e);
                        false
                    }
                }
            }
            Err(e) => {
                error!("Failed to send {}: {}", message.kind(), e);
                false
            }
        }
    }

    async fn write_payload(&self, payload: &[u8]) -> Result<(), FrameError> {
        let mut writer = self.inner.writer.lock().await;
        match writer.as_mut() {
            Some(live) => write_frame(live, payload).await,
            None => Err(FrameError::Disconnected),
        }
    }

    /// Gives a freshly opened read half to the running receive task, or
    /// starts a new task if none is alive.
    fn attach_reader(&self, reader: OwnedReadHalf) {
        let mut receiver = lock_unpoisoned(&self.inner.receiver);

        let reader = match receiver.as_ref() {
            Some(task) if !task.handle.is_finished() => match task.readers.send(reader) {
                Ok(()) => return,
                Err(mpsc::error::SendError(reader)) => reader,
            },
            _ => reader,
        };

        let (readers_tx, readers_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(receive_loop(self.clone(), reader, readers_rx));
        *receiver = Some(ReceiveTask {
            handle,
            readers: readers_tx,
        });
    }

    fn handle_message(&self, message: ServerMessage) {
        match message {
            ServerMessage::Connection { id } => {
                info!("Assigned participant id {}", id);
                *lock_unpoisoned(&self.inner.client_id) = Some(id);
                self.emit(SessionEvent::Connection { id });
            }
            ServerMessage::GameStart => {
                info!("Game starting");
                self.emit(SessionEvent::GameStart);
            }
            ServerMessage::GameUpdate { state } => {
                debug!("Received game update with {} keys", state.len());
                *lock_unpoisoned(&self.inner.last_state) = Some(state.clone());
                self.emit(SessionEvent::GameUpdate { state });
            }
            ServerMessage::Chat { sender_id, message } => {
                self.emit(SessionEvent::Chat { sender_id, message });
            }
            ServerMessage::Ack { message_type } => {
                debug!("Server acknowledged {}", message_type);
            }
            ServerMessage::Unknown => {
                warn!("Ignoring unknown message type from server");
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        let observers = lock_unpoisoned(&self.inner.observers).observers_for(event.kind());
        dispatch(&observers, &event);
    }

    /// Runs the bounded reconnect cycle after the receive task lost its
    /// connection. Returns false once the session is given up.
    async fn recover(&self) -> bool {
        {
            let mut writer = self.inner.writer.lock().await;
            *writer = None;
        }
        {
            let mut state = lock_unpoisoned(&self.inner.state);
            if *state == SessionState::Disconnected && self.inner.closing.load(Ordering::SeqCst) {
                return false;
            }
            self.inner.recovering.store(true, Ordering::SeqCst);
            *state = SessionState::Reconnecting;
        }

        let attempts = self.inner.config.max_reconnect_attempts;
        for attempt in 1..=attempts {
            if self.inner.closing.load(Ordering::SeqCst) {
                return false;
            }
            info!("Reconnect attempt {}/{}", attempt, attempts);
            if self.reconnect().await {
                self.inner.recovering.store(false, Ordering::SeqCst);
                return true;
            }
            if attempt < attempts {
                sleep(self.inner.config.reconnect_delay).await;
            }
        }

        error!("Connection lost after {} reconnect attempts", attempts);
        if self.finish() {
            self.emit(SessionEvent::Disconnect);
        }
        false
    }
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

async fn open_stream(addr: &str, limit: Duration) -> io::Result<TcpStream> {
    let stream = timeout(limit, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connecting to {} timed out", addr),
            )
        })??;
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY: {}", e);
    }
    Ok(stream)
}

async fn receive_loop(
    session: ClientSession,
    mut reader: OwnedReadHalf,
    mut readers: mpsc::UnboundedReceiver<OwnedReadHalf>,
) {
    debug!("Receive task started");
    let idle = session.inner.config.read_idle_timeout;

    loop {
        if session.state() == SessionState::Disconnected {
            break;
        }

        // The read future survives idle ticks so a slow frame is never cut
        // in half.
        let incoming = {
            let read = read_frame(&mut reader);
            tokio::pin!(read);
            loop {
                tokio::select! {
                    biased;
                    fresh = readers.recv() => break Incoming::FreshReader(fresh),
                    frame = &mut read => break Incoming::Frame(frame),
                    _ = sleep(idle) => {
                        if session.state() == SessionState::Disconnected {
                            break Incoming::Stopped;
                        }
                        debug!("No data from server for {:?}", idle);
                    }
                }
            }
        };

        let failure = match incoming {
            Incoming::Stopped | Incoming::FreshReader(None) => break,
            Incoming::FreshReader(Some(fresh)) => {
                reader = fresh;
                continue;
            }
            Incoming::Frame(Ok(payload)) => match ServerMessage::from_bytes(&payload) {
                Ok(message) => {
                    session.handle_message(message);
                    continue;
                }
                Err(e) => e.to_string(),
            },
            Incoming::Frame(Err(e)) => e.to_string(),
        };

        warn!("Lost server connection: {}", failure);
        if !session.recover().await {
            break;
        }
    }

    // A reconnect may have handed over a socket while this task was exiting.
    readers.close();
    let mut orphan = None;
    while let Ok(fresh) = readers.try_recv() {
        orphan = Some(fresh);
    }
    if let Some(fresh) = orphan {
        if session.is_connected() {
            session.attach_reader(fresh);
        }
    }
    debug!("Receive task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn fast_config() -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_secs(1),
            read_idle_timeout: Duration::from_millis(200),
            max_reconnect_attempts: 2,
            reconnect_delay: Duration::from_millis(50),
        }
    }

    fn record_events(session: &ClientSession) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        for kind in [
            EventKind::Connection,
            EventKind::GameStart,
            EventKind::GameUpdate,
            EventKind::Chat,
            EventKind::Disconnect,
        ] {
            let tx = tx.clone();
            session.register(kind, move |event| {
                let _ = tx.send(event.clone());
            });
        }
        rx
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn send(stream: &mut TcpStream, message: &ServerMessage) {
        write_frame(stream, &message.to_bytes().unwrap()).await.unwrap();
    }

    async fn listen() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_idle_timeout, Duration::from_secs(10));
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_connect_fails_without_server() {
        let (listener, addr) = listen().await;
        drop(listener);

        let session = ClientSession::new(fast_config());
        assert!(!session.connect("127.0.0.1", addr.port()).await);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.client_id().is_none());
    }

    #[tokio::test]
    async fn test_reconnect_before_connect_fails() {
        let session = ClientSession::new(fast_config());
        assert!(!session.reconnect().await);
    }

    #[tokio::test]
    async fn test_dispatches_server_messages() {
        let (listener, addr) = listen().await;
        let (done_tx, done_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut state = StateMap::new();
            state.insert("hp".to_string(), json!(3));

            send(&mut stream, &ServerMessage::Connection { id: 7 }).await;
            send(&mut stream, &ServerMessage::GameUpdate { state }).await;
            send(
                &mut stream,
                &ServerMessage::Ack {
                    message_type: "action".to_string(),
                },
            )
            .await;
            write_frame(&mut stream, br#"{"type":"mystery"}"#).await.unwrap();
            send(
                &mut stream,
                &ServerMessage::Chat {
                    sender_id: 2,
                    message: "hi".to_string(),
                },
            )
            .await;
            let _ = done_rx.await;
        });

        let session = ClientSession::new(fast_config());
        let mut events = record_events(&session);
        assert!(session.connect("127.0.0.1", addr.port()).await);
        assert!(session.is_connected());

        assert_eq!(next_event(&mut events).await, SessionEvent::Connection { id: 7 });
        match next_event(&mut events).await {
            SessionEvent::GameUpdate { state } => assert_eq!(state["hp"], json!(3)),
            other => panic!("Expected game update, got {:?}", other),
        }
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::Chat {
                sender_id: 2,
                message: "hi".to_string()
            }
        );

        assert_eq!(session.client_id(), Some(7));
        assert_eq!(session.last_state().unwrap()["hp"], json!(3));
        assert!(session.is_connected());

        session.disconnect().await;
        let _ = done_tx.send(());
    }

    #[tokio::test]
    async fn test_panicking_observer_keeps_receive_task_alive() {
        let (listener, addr) = listen().await;
        let (done_tx, done_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            send(&mut stream, &ServerMessage::GameStart).await;
            send(&mut stream, &ServerMessage::Connection { id: 1 }).await;
            let _ = done_rx.await;
        });

        let session = ClientSession::new(fast_config());
        session.register(EventKind::GameStart, |_| panic!("observer failure"));
        let mut events = record_events(&session);
        assert!(session.connect("127.0.0.1", addr.port()).await);

        assert_eq!(next_event(&mut events).await, SessionEvent::GameStart);
        assert_eq!(next_event(&mut events).await, SessionEvent::Connection { id: 1 });
        assert!(session.is_connected());

        session.disconnect().await;
        let _ = done_tx.send(());
    }

    #[tokio::test]
    async fn test_send_action_and_chat_are_framed() {
        let (listener, addr) = listen().await;
        let (got_tx, got_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let first = read_frame(&mut stream).await.unwrap();
            let second = read_frame(&mut stream).await.unwrap();
            let _ = got_tx.send((
                ClientMessage::from_bytes(&first).unwrap(),
                ClientMessage::from_bytes(&second).unwrap(),
            ));
        });

        let session = ClientSession::new(fast_config());
        assert!(session.connect("127.0.0.1", addr.port()).await);

        let mut fragment = StateMap::new();
        fragment.insert("ready".to_string(), json!(true));
        assert!(session.send_action(fragment.clone()).await);
        assert!(session.send_chat("good luck").await);

        let (first, second) = timeout(Duration::from_secs(5), got_rx).await.unwrap().unwrap();
        assert_eq!(first, ClientMessage::Action { data: fragment });
        assert_eq!(
            second,
            ClientMessage::Chat {
                message: "good luck".to_string()
            }
        );

        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_reconnect_probes_live_connection() {
        let (listener, addr) = listen().await;
        let (got_tx, got_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let probe = read_frame(&mut stream).await.unwrap();
            let _ = got_tx.send(probe);
            // Keep the connection open until the test ends
            let _ = read_frame(&mut stream).await;
        });

        let session = ClientSession::new(fast_config());
        assert!(session.connect("127.0.0.1", addr.port()).await);
        assert!(session.reconnect().await);
        assert!(session.is_connected());

        let probe = timeout(Duration::from_secs(5), got_rx).await.unwrap().unwrap();
        assert_eq!(probe, PING_SENTINEL);

        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_recovers_when_server_drops_connection() {
        let (listener, addr) = listen().await;
        let (done_tx, done_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let (mut first, _) = listener.accept().await.unwrap();
            send(&mut first, &ServerMessage::Connection { id: 1 }).await;
            drop(first);

            let (mut second, _) = listener.accept().await.unwrap();
            send(&mut second, &ServerMessage::Connection { id: 2 }).await;
            let _ = done_rx.await;
        });

        let session = ClientSession::new(fast_config());
        let mut events = record_events(&session);
        assert!(session.connect("127.0.0.1", addr.port()).await);

        assert_eq!(next_event(&mut events).await, SessionEvent::Connection { id: 1 });
        assert_eq!(next_event(&mut events).await, SessionEvent::Connection { id: 2 });
        assert_eq!(session.client_id(), Some(2));
        assert!(session.is_connected());

        session.disconnect().await;
        let _ = done_tx.send(());
    }

    #[tokio::test]
    async fn test_gives_up_and_reports_disconnect() {
        let (listener, addr) = listen().await;

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            drop(listener);
            send(&mut stream, &ServerMessage::Connection { id: 1 }).await;
        });

        let session = ClientSession::new(fast_config());
        let mut events = record_events(&session);
        assert!(session.connect("127.0.0.1", addr.port()).await);

        assert_eq!(next_event(&mut events).await, SessionEvent::Connection { id: 1 });
        assert_eq!(next_event(&mut events).await, SessionEvent::Disconnect);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_between_reconnect_attempts_notifies_once() {
        let (listener, addr) = listen().await;

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            drop(listener);
            send(&mut stream, &ServerMessage::Connection { id: 1 }).await;
        });

        let session = ClientSession::new(ClientConfig {
            max_reconnect_attempts: 3,
            reconnect_delay: Duration::from_millis(500),
            ..fast_config()
        });
        let mut events = record_events(&session);
        assert!(session.connect("127.0.0.1", addr.port()).await);
        assert_eq!(next_event(&mut events).await, SessionEvent::Connection { id: 1 });

        timeout(Duration::from_secs(5), async {
            while session.state() != SessionState::Reconnecting {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session never started reconnecting");

        // First attempt was refused; the cycle is waiting for the next one
        sleep(Duration::from_millis(100)).await;
        assert_eq!(session.state(), SessionState::Reconnecting);

        session.disconnect().await;
        assert_eq!(next_event(&mut events).await, SessionEvent::Disconnect);
        assert_eq!(session.state(), SessionState::Disconnected);

        // The stopped cycle does not report a second time
        sleep(Duration::from_millis(1500)).await;
        assert!(events.try_recv().is_err());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_explicit_disconnect() {
        let (listener, addr) = listen().await;
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = read_frame(&mut stream).await;
        });

        let session = ClientSession::new(fast_config());
        let mut events = record_events(&session);
        assert!(session.connect("127.0.0.1", addr.port()).await);

        session.disconnect().await;
        assert_eq!(next_event(&mut events).await, SessionEvent::Disconnect);
        assert!(!session.is_connected());

        // Closed sessions do not reconnect behind the caller's back
        assert!(!session.send_chat("anyone?").await);

        // A second disconnect is quiet
        session.disconnect().await;
        assert!(timeout(Duration::from_millis(200), events.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_unregistered_observer_is_not_called() {
        let (listener, addr) = listen().await;
        let (done_tx, done_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            send(&mut stream, &ServerMessage::GameStart).await;
            send(&mut stream, &ServerMessage::Connection { id: 1 }).await;
            let _ = done_rx.await;
        });

        let session = ClientSession::new(fast_config());
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let id = session.register(EventKind::GameStart, move |_| {
            flag.store(true, Ordering::SeqCst);
        });
        assert!(session.unregister(EventKind::GameStart, id));

        let mut events = record_events(&session);
        assert!(session.connect("127.0.0.1", addr.port()).await);
        assert_eq!(next_event(&mut events).await, SessionEvent::GameStart);
        assert!(!called.load(Ordering::SeqCst));

        session.disconnect().await;
        let _ = done_tx.send(());
    }
}
