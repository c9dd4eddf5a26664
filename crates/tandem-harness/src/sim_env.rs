//! Simulated environment: virtual clock and seeded entropy.

use std::{
    future::Future,
    ops::{Add, Sub},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tandem_core::Environment;

/// Wall-clock second at which every simulation starts (2024-01-01 09:00 UTC).
const WALL_CLOCK_START: u64 = 1_704_099_600;

/// Point on the virtual timeline, measured from the start of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time since the simulation started.
    pub fn elapsed(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

#[derive(Debug)]
struct SimState {
    now: Duration,
    rng: ChaCha8Rng,
}

/// Deterministic [`Environment`].
///
/// Clones share one clock and one RNG stream, so two routers built from
/// clones of the same `SimEnv` see the same time. Time only moves when the
/// test calls [`SimEnv::advance`] (or awaits `sleep`).
#[derive(Debug, Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Environment at time zero with RNG seeded by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        let state = SimState { now: Duration::ZERO, rng: ChaCha8Rng::seed_from_u64(seed) };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Move the clock forward and return the new time.
    pub fn advance(&self, by: Duration) -> SimInstant {
        let mut state = self.lock();
        state.now += by;
        SimInstant(state.now)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.lock().now)
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }

    fn wall_clock_secs(&self) -> u64 {
        WALL_CLOCK_START + self.lock().now.as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_clock() {
        let env = SimEnv::with_seed(1);
        let other = env.clone();

        env.advance(Duration::from_millis(250));
        assert_eq!(other.now().elapsed(), Duration::from_millis(250));
        assert_eq!(other.now() - SimInstant::default(), Duration::from_millis(250));
    }

    #[test]
    fn same_seed_same_entropy() {
        let a = SimEnv::with_seed(7);
        let b = SimEnv::with_seed(7);
        assert_eq!(a.random_u32(), b.random_u32());
        assert_ne!(a.random_u32(), SimEnv::with_seed(8).random_u32());
    }

    #[test]
    fn wall_clock_follows_virtual_time() {
        let env = SimEnv::default();
        let start = env.wall_clock_secs();
        env.advance(Duration::from_secs(90));
        assert_eq!(env.wall_clock_secs(), start + 90);
    }
}
