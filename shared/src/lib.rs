//! Protocol pieces shared by the duel server and client: framing, message
//! envelopes, the snapshot format and the game model it is built from.

pub mod codec;
pub mod framing;
pub mod game;
pub mod message;
pub mod snapshot;

pub use framing::{read_frame, write_frame, FrameError, MAX_FRAME_SIZE};
pub use message::{
    envelope_type, ClientMessage, ProtocolError, ServerMessage, StateMap, PING_SENTINEL,
};
pub use snapshot::{PlayerEntry, Snapshot};

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5555;

/// Participant id given to the first connection. Only the host may start the game.
pub const HOST_ID: u32 = 1;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(10);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;
pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Locks a std mutex, recovering the data if a panicking holder poisoned it.
pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
