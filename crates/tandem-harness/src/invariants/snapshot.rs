//! Observable state snapshots for invariant checking.

use bytes::Bytes;
use tandem_core::{Environment, Lifecycle, Router};
use tandem_proto::{AppId, Role};

use crate::PeerPair;

/// Snapshot of both peers at one point in time.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    /// Per-peer state.
    pub peers: Vec<PeerSnapshot>,
    /// Whether the link between them is up.
    pub linked: bool,
}

impl SessionSnapshot {
    /// Snapshot with no peers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot of a single router.
    pub fn single(peer: PeerSnapshot) -> Self {
        Self { peers: vec![peer], linked: false }
    }

    /// Snapshot of a connected (or disconnected) pair.
    pub fn of_pair(pair: &PeerPair) -> Self {
        Self {
            peers: vec![PeerSnapshot::of(pair.therapist()), PeerSnapshot::of(pair.patient())],
            linked: pair.is_linked(),
        }
    }

    /// Peer with `role`, if present.
    pub fn peer(&self, role: Role) -> Option<&PeerSnapshot> {
        self.peers.iter().find(|peer| peer.role == role)
    }
}

/// Observable state of one router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    /// Local role
    pub role: Role,
    /// Shown app
    pub active_app: Option<AppId>,
    /// Lifecycle per app id; empty before the registry is built
    pub lifecycles: Vec<Lifecycle>,
    /// Current lockstep seed
    pub random_seed: u32,
    /// Draws since the last reseed
    pub draw_count: u64,
    /// Transport connected
    pub connected: bool,
    /// Halt cause, if halted
    pub halted: Option<String>,
    /// Restore snapshot of the active app
    pub app_state: Option<Bytes>,
}

impl PeerSnapshot {
    /// Capture `router`.
    pub fn of<E: Environment>(router: &Router<E>) -> Self {
        Self {
            role: router.role(),
            active_app: router.active_app(),
            lifecycles: router.registry().slots().iter().map(tandem_core::AppSlot::state).collect(),
            random_seed: router.random_seed(),
            draw_count: router.draw_count(),
            connected: router.is_connected(),
            halted: router.halted().map(str::to_owned),
            app_state: router.restore_state().ok().flatten(),
        }
    }

    /// Ids currently in `Shown`.
    pub fn shown(&self) -> Vec<AppId> {
        self.lifecycles
            .iter()
            .enumerate()
            .filter(|(_, state)| **state == Lifecycle::Shown)
            .filter_map(|(index, _)| AppId::try_from(index).ok())
            .collect()
    }
}
