//! Session layer for a two-peer therapist/patient session.
//!
//! The [`Router`] is a pure state machine: events in, actions out. It owns
//! the mini-app registry and lifecycle, the lockstep RNG that keeps both
//! peers' randomness identical, and a cooperative scheduler for delayed work.
//! Time, entropy and I/O come from the host through [`Environment`] and
//! [`SessionAction`]s, so the same code runs under the real runtime and in
//! deterministic simulation.
//!
//! # Components
//!
//! - [`Router`]: protocol dispatch, lifecycle, restore and login handshake
//! - [`MiniApp`] / [`AppContext`]: the contract between the router and apps
//! - [`LockstepRng`]: seeded draws shared in lockstep by both peers
//! - [`Scheduler`] / [`Debouncer`]: delayed actions fired from `Tick`
//! - [`SketchBoard`], [`CursorShare`], [`IndicatorFade`]: shared overlays
//! - [`SessionLog`]: per-app human-readable session log

#![forbid(unsafe_code)]

pub mod app;
pub mod config;
pub mod env;
pub mod error;
pub mod event;
pub mod pointer;
pub mod rng;
pub mod router;
pub mod scheduler;
pub mod sketch;
pub mod stats;

pub use app::{AppContext, AppInput, AppRegistry, AppSlot, AppTimer, Lifecycle, MiniApp};
pub use config::SessionConfig;
pub use env::Environment;
pub use error::{AppError, SessionError};
pub use event::{ConnectionStatus, SessionAction, SessionEvent};
pub use pointer::{CursorShare, IndicatorFade, IndicatorFrame};
pub use rng::LockstepRng;
pub use router::Router;
pub use scheduler::{ActionHandle, Debounced, Debouncer, Fired, Owner, Scheduler};
pub use sketch::{Point, SketchBoard};
pub use stats::SessionLog;
