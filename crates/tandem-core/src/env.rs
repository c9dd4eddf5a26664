//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from system resources (time, entropy, wall clock).
//! The simulation harness supplies a virtual clock and a seeded RNG; the host
//! binary supplies the real ones.

use std::{
    ops::{Add, Sub},
    time::Duration,
};

/// Time, entropy and sleeping, as seen by the session layer.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - Given the same construction seed, a simulated environment yields the same
///   `random_bytes` sequence
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    ///
    /// Production uses `std::time::Instant`; simulation uses a virtual instant
    /// advanced by the test.
    type Instant: Copy
        + Ord
        + Send
        + Sync
        + std::fmt::Debug
        + Sub<Output = Duration>
        + Add<Duration, Output = Self::Instant>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only host loops call this. The router never sleeps.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the buffer with random bytes.
    ///
    /// Used for values that are local to one peer, such as a fresh session
    /// seed. Shared randomness goes through [`crate::LockstepRng`] instead.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Seconds since the Unix epoch, for human-readable log timestamps.
    fn wall_clock_secs(&self) -> u64;

    /// Random `u32`, the width of a lockstep seed.
    fn random_u32(&self) -> u32 {
        let mut bytes = [0u8; 4];
        self.random_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }
}
