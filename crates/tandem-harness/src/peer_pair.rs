//! Two routers joined by an in-memory link.
//!
//! Stands in for the transport: `Send` actions from one peer are queued for
//! the other and delivered by [`PeerPair::pump`]. The link can be cut and
//! restored to exercise disconnect and restore. Every other action is kept
//! per peer so tests can assert on what the host would have seen.

use std::{collections::VecDeque, time::Duration};

use bytes::Bytes;
use tandem_core::{AppRegistry, Router, SessionAction, SessionConfig, SessionError, SessionEvent};
use tandem_proto::Role;
use tracing::trace;

use crate::sim_env::SimEnv;

/// Upper bound on deliveries per `pump`, to catch message storms.
const MAX_DELIVERIES: usize = 10_000;

/// A router error tagged with the peer that raised it.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerFailure {
    /// Peer whose router failed
    pub role: Role,
    /// The error
    pub error: SessionError,
}

impl std::fmt::Display for PeerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.role, self.error)
    }
}

impl std::error::Error for PeerFailure {}

/// Result alias for pair operations.
pub type PairResult<T = ()> = Result<T, PeerFailure>;

/// Therapist and patient routers on a shared virtual clock.
pub struct PeerPair {
    env: SimEnv,
    therapist: Router<SimEnv>,
    patient: Router<SimEnv>,
    linked: bool,
    to_therapist: VecDeque<Bytes>,
    to_patient: VecDeque<Bytes>,
    therapist_seen: Vec<SessionAction>,
    patient_seen: Vec<SessionAction>,
}

impl std::fmt::Debug for PeerPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerPair")
            .field("therapist", &self.therapist)
            .field("patient", &self.patient)
            .field("linked", &self.linked)
            .field("in_flight", &(self.to_therapist.len() + self.to_patient.len()))
            .finish_non_exhaustive()
    }
}

impl PeerPair {
    /// Build both peers with default configs. `registry` is called once per
    /// peer and must register the same apps in the same order.
    pub fn new(seed: u64, registry: impl Fn() -> AppRegistry) -> PairResult<Self> {
        Self::with_configs(seed, SessionConfig::therapist(), SessionConfig::patient(), registry)
    }

    /// Build both peers with explicit configs.
    pub fn with_configs(
        seed: u64,
        therapist: SessionConfig,
        patient: SessionConfig,
        registry: impl Fn() -> AppRegistry,
    ) -> PairResult<Self> {
        let env = SimEnv::with_seed(seed);
        let therapist = Router::new(env.clone(), therapist, registry())
            .map_err(|error| PeerFailure { role: Role::Therapist, error })?;
        let patient = Router::new(env.clone(), patient, registry())
            .map_err(|error| PeerFailure { role: Role::Patient, error })?;

        Ok(Self {
            env,
            therapist,
            patient,
            linked: false,
            to_therapist: VecDeque::new(),
            to_patient: VecDeque::new(),
            therapist_seen: Vec::new(),
            patient_seen: Vec::new(),
        })
    }

    /// Bring the link up, notify both peers and deliver the login exchange.
    pub fn connect(&mut self) -> PairResult {
        self.linked = true;
        self.patient_event(SessionEvent::Connected)?;
        self.therapist_event(SessionEvent::Connected)?;
        self.pump()
    }

    /// Cut the link. Messages in flight are lost.
    pub fn disconnect(&mut self, reason: &str) -> PairResult {
        self.linked = false;
        self.to_therapist.clear();
        self.to_patient.clear();
        self.therapist_event(SessionEvent::Disconnected { reason: reason.to_owned() })?;
        self.patient_event(SessionEvent::Disconnected { reason: reason.to_owned() })
    }

    /// Feed an event to the therapist. Outgoing messages are queued, not
    /// delivered; call [`PeerPair::pump`].
    pub fn therapist_event(&mut self, event: SessionEvent<crate::SimInstant>) -> PairResult {
        let actions = self
            .therapist
            .handle(event)
            .map_err(|error| PeerFailure { role: Role::Therapist, error })?;
        self.route(Role::Therapist, actions);
        Ok(())
    }

    /// Feed an event to the patient.
    pub fn patient_event(&mut self, event: SessionEvent<crate::SimInstant>) -> PairResult {
        let actions =
            self.patient.handle(event).map_err(|error| PeerFailure { role: Role::Patient, error })?;
        self.route(Role::Patient, actions);
        Ok(())
    }

    /// Feed an event to one peer and deliver everything that follows.
    pub fn run(&mut self, role: Role, event: SessionEvent<crate::SimInstant>) -> PairResult {
        match role {
            Role::Patient => self.patient_event(event)?,
            Role::Therapist | Role::Unassigned => self.therapist_event(event)?,
        }
        self.pump()
    }

    /// Deliver queued messages, one per side in turn, until both queues are
    /// empty.
    pub fn pump(&mut self) -> PairResult {
        for _ in 0..MAX_DELIVERIES {
            let mut delivered = false;
            if let Some(bytes) = self.to_patient.pop_front() {
                self.patient_event(SessionEvent::MessageReceived(bytes))?;
                delivered = true;
            }
            if let Some(bytes) = self.to_therapist.pop_front() {
                self.therapist_event(SessionEvent::MessageReceived(bytes))?;
                delivered = true;
            }
            if !delivered {
                return Ok(());
            }
        }
        Err(PeerFailure {
            role: Role::Unassigned,
            error: SessionError::Halted { cause: "message storm".into() },
        })
    }

    /// Advance the clock, tick both peers and deliver the fallout.
    pub fn tick(&mut self, by: Duration) -> PairResult {
        let now = self.env.advance(by);
        self.therapist_event(SessionEvent::Tick { now })?;
        self.patient_event(SessionEvent::Tick { now })?;
        self.pump()
    }

    /// Therapist router.
    pub fn therapist(&self) -> &Router<SimEnv> {
        &self.therapist
    }

    /// Patient router.
    pub fn patient(&self) -> &Router<SimEnv> {
        &self.patient
    }

    /// Router for `role` (the therapist for `Unassigned`).
    pub fn peer(&self, role: Role) -> &Router<SimEnv> {
        match role {
            Role::Patient => &self.patient,
            Role::Therapist | Role::Unassigned => &self.therapist,
        }
    }

    /// Shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Whether the link is up.
    pub fn is_linked(&self) -> bool {
        self.linked
    }

    /// Non-`Send` actions a peer emitted since the last call.
    pub fn take_seen(&mut self, role: Role) -> Vec<SessionAction> {
        match role {
            Role::Patient => std::mem::take(&mut self.patient_seen),
            Role::Therapist | Role::Unassigned => std::mem::take(&mut self.therapist_seen),
        }
    }

    fn route(&mut self, from: Role, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::Send(bytes) => {
                    if !self.linked {
                        trace!(?from, "link down, message dropped");
                        continue;
                    }
                    match from.peer() {
                        Role::Therapist => self.to_therapist.push_back(bytes),
                        Role::Patient | Role::Unassigned => self.to_patient.push_back(bytes),
                    }
                },
                other => match from {
                    Role::Patient => self.patient_seen.push(other),
                    Role::Therapist | Role::Unassigned => self.therapist_seen.push(other),
                },
            }
        }
    }
}
