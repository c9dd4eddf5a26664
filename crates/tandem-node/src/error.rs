//! Host error types.

use std::path::PathBuf;

use tandem_core::SessionError;
use thiserror::Error;

/// Errors that stop a host.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The session halted on a protocol violation.
    #[error("session halted: {0}")]
    Session(#[from] SessionError),

    /// Sending on a transport that is not connected.
    #[error("transport not connected")]
    NotConnected,

    /// The other end of the transport is gone.
    #[error("transport closed: {0}")]
    TransportClosed(String),

    /// A session log could not be written.
    #[error("failed to write session log {path}: {source}")]
    LogWrite {
        /// Target file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The host is gone; its command channel is closed.
    #[error("host stopped")]
    HostStopped,

    /// Invalid configuration or command-line arguments.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for host operations.
pub type Result<T> = std::result::Result<T, NodeError>;
