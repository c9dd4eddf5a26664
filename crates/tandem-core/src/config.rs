//! Session configuration.

use std::time::Duration;

use tandem_proto::Role;

/// Delay between patient reconnect attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Frames that must pass after enabling cursor sharing before moves are sent.
pub const DEFAULT_CURSOR_FRAME_THRESHOLD: u32 = 5;

/// Per-router settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Local role, fixed for the life of the router.
    pub role: Role,
    /// Replay our own broadcasts into the local inbound queue.
    pub local_echo: bool,
    /// Delay before an echoed message is processed. Zero means it is processed
    /// in the same `handle` call that sent it.
    pub echo_delay: Duration,
    /// Patient reconnect backoff.
    pub retry_delay: Duration,
    /// See [`DEFAULT_CURSOR_FRAME_THRESHOLD`].
    pub cursor_frame_threshold: u32,
}

impl SessionConfig {
    /// Defaults for the given role.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            local_echo: true,
            echo_delay: Duration::ZERO,
            retry_delay: DEFAULT_RETRY_DELAY,
            cursor_frame_threshold: DEFAULT_CURSOR_FRAME_THRESHOLD,
        }
    }

    /// Therapist defaults.
    pub fn therapist() -> Self {
        Self::new(Role::Therapist)
    }

    /// Patient defaults.
    pub fn patient() -> Self {
        Self::new(Role::Patient)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::therapist()
    }
}
