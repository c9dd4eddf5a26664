//! Error types for the session layer.
//!
//! Two tiers. Fatal errors are protocol-invariant violations: the router halts
//! and the host surfaces an alert. Everything else (a local command the role
//! may not issue, a transport hiccup) is recoverable.

use tandem_proto::{AppId, ProtocolError, ProtocolKind, Role, SystemAction};
use thiserror::Error;

use crate::app::Lifecycle;

/// Errors raised by the session router.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Wire-level decode failure
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Protocol tag that this build decodes but does not handle
    #[error("unsupported protocol: {0:?}")]
    UnsupportedProtocol(ProtocolKind),

    /// App registry used before `Login` built it
    #[error("app registry not loaded, cannot show app {app_id}")]
    RegistryNotLoaded {
        /// App that was requested
        app_id: AppId,
    },

    /// App id outside the registry
    #[error("unknown app id {app_id}, {registered} apps registered")]
    UnknownApp {
        /// Requested id
        app_id: AppId,
        /// Registry size
        registered: usize,
    },

    /// App name not present in the registry
    #[error("unknown app name {0:?}")]
    UnknownAppName(String),

    /// Show requested while another app is still shown
    #[error("app {active} still shown, cannot show app {requested}")]
    AppAlreadyActive {
        /// Currently shown app
        active: AppId,
        /// App that was requested
        requested: AppId,
    },

    /// HandShake arrived with no app shown
    #[error("handshake for app {app_id} with no active app")]
    HandshakeWithoutApp {
        /// App named by the handshake
        app_id: AppId,
    },

    /// HandShake for a different app than the one shown
    #[error("handshake mismatch: expected app {expected}, got app {actual}")]
    HandshakeMismatch {
        /// Locally shown app
        expected: AppId,
        /// App named by the handshake
        actual: AppId,
    },

    /// Lifecycle transition not allowed from the current state
    #[error("app {app_id}: cannot {operation} while {state:?}")]
    LifecycleViolation {
        /// App involved
        app_id: AppId,
        /// State it was in
        state: Lifecycle,
        /// Attempted transition
        operation: &'static str,
    },

    /// System action sent by a role that may not send it
    #[error("{action:?} not accepted from {sender:?}")]
    RoleViolation {
        /// Offending action
        action: SystemAction,
        /// Sender role from the header
        sender: Role,
    },

    /// Router constructed without a concrete role
    #[error("session role must be Therapist or Patient")]
    UnassignedRole,

    /// Sketch stream out of order
    #[error("sketch violation: {0}")]
    SketchViolation(String),

    /// A mini-app callback failed
    #[error("app {app_id} failed: {source}")]
    App {
        /// App whose callback failed
        app_id: AppId,
        /// Underlying error
        #[source]
        source: AppError,
    },

    /// Local command not available to this role
    #[error("{operation} not permitted for {role:?}")]
    NotPermitted {
        /// Rejected command
        operation: &'static str,
        /// Local role
        role: Role,
    },

    /// Therapist side could not accept a connection
    #[error("listen failed: {reason}")]
    ListenFailed {
        /// Transport-provided reason
        reason: String,
    },

    /// Router halted by an earlier fatal error
    #[error("session halted: {cause}")]
    Halted {
        /// Display of the error that halted the session
        cause: String,
    },
}

impl SessionError {
    /// Returns true if this error halts the session.
    ///
    /// Everything except a rejected local command is fatal: a peer that sends
    /// out-of-order or malformed traffic cannot be resynchronized in place.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NotPermitted { .. })
    }
}

/// Errors raised by mini-app callbacks.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    /// Body failed to encode or decode
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Content the app needs was not found during load
    #[error("missing content: {0}")]
    MissingContent(String),

    /// Message or input does not fit the app's current state
    #[error("invalid state: {0}")]
    InvalidState(String),
}
