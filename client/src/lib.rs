//! # Duel Session Client
//!
//! Participant side of the duel protocol. A `ClientSession` owns one TCP
//! connection to the server, sends `action` and `chat` envelopes and turns
//! everything the server pushes into events for registered observers.
//!
//! ## Module Organization
//!
//! ### Events (`events`)
//! Event types and the per-kind observer registry:
//! - `connection` when the server assigns the participant id
//! - `game_start`, `game_update` and `chat` as they arrive
//! - `disconnect` once the session is closed or cannot be recovered
//!
//! ### Network (`network`)
//! Connection lifecycle and the background receive task:
//! - Connect with a timeout, never panicking on network failure
//! - Probe-then-reconnect before sends when the link looks dead
//! - Bounded reconnect cycle when the receive task loses the server
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::{ClientSession, EventKind, SessionEvent};
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = ClientSession::default();
//!     session.register(EventKind::GameUpdate, |event| {
//!         if let SessionEvent::GameUpdate { state } = event {
//!             println!("state has {} keys", state.len());
//!         }
//!     });
//!
//!     if session.connect("127.0.0.1", 5555).await {
//!         session.send_chat("hello").await;
//!     }
//! }
//! ```

pub mod events;
pub mod network;

pub use events::{EventKind, ObserverId, SessionEvent};
pub use network::{ClientConfig, ClientSession, SessionState};
