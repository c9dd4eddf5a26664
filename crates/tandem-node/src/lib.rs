//! Tokio host for tandem sessions.
//!
//! Wraps [`tandem_core`]'s action-based [`Router`](tandem_core::Router) with
//! real I/O: a fixed-rate frame loop, a [`Transport`] to the other peer, the
//! system clock and OS entropy, and session logs on disk.
//!
//! # Components
//!
//! - [`Host`]: frame loop executing router actions
//! - [`Transport`] / [`ChannelTransport`]: link to the peer
//! - [`SystemEnv`]: production environment (real time, OS RNG)
//! - [`LogWriter`]: appends app session logs to files

#![forbid(unsafe_code)]

mod config;
mod error;
mod host;
mod log_writer;
mod system_env;
mod transport;

pub use config::{DEFAULT_FRAME_RATE, NodeConfig};
pub use error::{NodeError, Result};
pub use host::{ActionReceiver, CommandSender, Host};
pub use log_writer::LogWriter;
pub use system_env::SystemEnv;
pub use transport::{ChannelTransport, Transport, TransportEvent};
