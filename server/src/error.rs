use shared::{FrameError, ProtocolError};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("server is already running")]
    AlreadyStarted,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl ServerError {
    /// True when the peer is gone rather than the message being bad
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ServerError::Frame(e) if e.is_disconnect())
    }
}
