//! Host configuration.

use std::{path::PathBuf, time::Duration};

use tandem_core::SessionConfig;

/// Frames per second of the host loop.
pub const DEFAULT_FRAME_RATE: u32 = 60;

/// Everything a [`crate::Host`] needs besides its transport and apps.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Router configuration, including the local role
    pub session: SessionConfig,
    /// Ticks per second
    pub frame_rate: u32,
    /// Directory for session logs; `None` disables persisting them
    pub log_dir: Option<PathBuf>,
}

impl NodeConfig {
    /// Config for `session` at the default frame rate, without logs.
    pub fn new(session: SessionConfig) -> Self {
        Self { session, frame_rate: DEFAULT_FRAME_RATE, log_dir: None }
    }

    /// Time between ticks. A zero frame rate is treated as one.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_interval_follows_rate() {
        let mut config = NodeConfig::default();
        assert_eq!(config.frame_interval(), Duration::from_secs(1) / 60);

        config.frame_rate = 0;
        assert_eq!(config.frame_interval(), Duration::from_secs(1));
    }
}
