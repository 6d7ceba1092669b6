//! # Duel Session Server
//!
//! Authoritative relay for a two-participant duel. The server does not run
//! game rules: it keeps one merged state mapping, fans every change out to all
//! connected participants and decides when the game starts.
//!
//! ## Module Organization
//!
//! ### Session Store (`store`)
//! The single mutex-guarded source of truth:
//! - Merged state mapping built from participant action fragments
//! - Participant roster with ready flags, host first
//! - Registry of live connections
//!
//! ### Client Manager (`client_manager`)
//! Per-connection bookkeeping: sequential participant ids, socket write halves
//! and copies of the connection list for fan-out.
//!
//! ### Broadcast (`broadcast`)
//! Best-effort delivery of one message to every live connection. A slow or
//! broken peer never stops the others from receiving it.
//!
//! ### Network (`network`)
//! TCP acceptor plus one receive task per connection. Incoming `action`
//! messages are merged and rebroadcast as `game_update`, `chat` messages are
//! relayed with the sender id, and `game_start` goes out when the second
//! participant connects or the host starts the game.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::bind(ServerConfig::default()).await?;
//!     server.start()?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod client_manager;
pub mod error;
pub mod network;
pub mod store;

pub use error::ServerError;
pub use network::{Server, ServerConfig};
pub use store::SessionStore;
