//! Codec error types.

use thiserror::Error;

use crate::header::ProtocolKind;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while framing or unframing a message.
///
/// None of these are transient. A peer that produces one is either running a
/// different protocol version or sending a corrupted stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes than the fixed header.
    #[error("message too short: expected at least {expected} bytes, got {actual}")]
    Truncated {
        /// Minimum size (the header)
        expected: usize,
        /// Bytes actually received
        actual: usize,
    },

    /// Protocol tag outside the registered set.
    #[error("unknown protocol tag {0}")]
    UnknownProtocol(u8),

    /// Sender byte that does not name a role.
    #[error("invalid sender role {0}")]
    InvalidRole(u8),

    /// Body does not decode as the type expected for its protocol.
    #[error("malformed {protocol:?} body: {reason}")]
    MalformedMessage {
        /// Protocol of the offending message
        protocol: ProtocolKind,
        /// Decoder diagnostic
        reason: String,
    },

    /// Body could not be serialized.
    #[error("CBOR encoding failed: {0}")]
    CborEncode(String),
}
