//! Real clock and OS entropy for production hosts.
//!
//! Time comes from `std::time::Instant`, session seeds from getrandom, and
//! log timestamps from the system wall clock. Nothing here is reproducible;
//! simulations use the harness environment instead.

use std::time::Duration;

use tandem_core::Environment;

/// Production environment.
///
/// # Panics
///
/// `random_bytes` panics if the OS RNG fails. Session seeds cannot be drawn
/// without it, and the failure means the OS itself is unhealthy.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG is available");
    }

    fn wall_clock_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_differ() {
        let env = SystemEnv::new();
        let seeds: Vec<u32> = (0..4).map(|_| env.random_u32()).collect();
        assert!(seeds.windows(2).any(|pair| pair[0] != pair[1]));
    }

    #[test]
    fn wall_clock_is_after_2020() {
        assert!(SystemEnv::new().wall_clock_secs() > 1_577_836_800);
    }

    #[tokio::test]
    async fn sleep_waits() {
        let env = SystemEnv::new();

        let start = env.now();
        env.sleep(Duration::from_millis(20)).await;

        assert!(env.now() - start >= Duration::from_millis(20));
    }
}
