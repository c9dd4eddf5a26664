//! Deterministic simulation harness for the tandem session layer.
//!
//! Runs a therapist and a patient [`tandem_core::Router`] against each other
//! in memory, on a virtual clock with seeded entropy, so whole sessions
//! (login, open, handshake, disconnect, restore) replay identically from a
//! seed.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks behavioral properties of a
//! [`SessionSnapshot`] after each step. Use
//! [`InvariantRegistry::standard()`] at any point and
//! [`InvariantRegistry::converged()`] once the link is up and every message
//! has been delivered.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod peer_pair;
pub mod recorder;
pub mod sim_env;

pub use invariants::{
    ActiveAppsAgree, Invariant, InvariantRegistry, InvariantResult, LockstepState, NotHalted,
    PeerSnapshot, SessionSnapshot, SingleShownApp, Violation,
};
pub use peer_pair::{PairResult, PeerFailure, PeerPair};
pub use recorder::{
    Callback, DRAWS_ON_SHOW, Entry, Journal, RecorderApp, RecorderState, recorder_registry,
};
pub use sim_env::{SimEnv, SimInstant};
