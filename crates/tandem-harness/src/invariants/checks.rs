//! Standard invariant checks.

use tandem_proto::Role;

use super::{Invariant, InvariantResult, SessionSnapshot, Violation};

/// At most one app is `Shown`, and it is the active app.
///
/// Catches showing a second app before hiding the first, and the router
/// losing track of which app it showed.
pub struct SingleShownApp;

impl Invariant for SingleShownApp {
    fn name(&self) -> &'static str {
        "single_shown_app"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        for peer in &state.peers {
            let shown = peer.shown();
            let consistent = match peer.active_app {
                Some(active) => shown == [active],
                None => shown.is_empty(),
            };
            if !consistent {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{:?}: active_app {:?} but shown {:?}",
                        peer.role, peer.active_app, shown
                    ),
                });
            }
        }
        Ok(())
    }
}

/// No peer has halted.
pub struct NotHalted;

impl Invariant for NotHalted {
    fn name(&self) -> &'static str {
        "not_halted"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        match state.peers.iter().find(|peer| peer.halted.is_some()) {
            Some(peer) => Err(Violation {
                invariant: self.name(),
                message: format!(
                    "{:?} halted: {}",
                    peer.role,
                    peer.halted.as_deref().unwrap_or_default()
                ),
            }),
            None => Ok(()),
        }
    }
}

/// With the link up and all messages delivered, both peers show the same
/// app with the same seed.
pub struct ActiveAppsAgree;

impl Invariant for ActiveAppsAgree {
    fn name(&self) -> &'static str {
        "active_apps_agree"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let therapist = state.peer(Role::Therapist);
        let (Some(therapist), Some(patient)) = (therapist, state.peer(Role::Patient)) else {
            return Ok(());
        };
        if !state.linked {
            return Ok(());
        }
        if therapist.active_app != patient.active_app {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "therapist shows {:?}, patient shows {:?}",
                    therapist.active_app, patient.active_app
                ),
            });
        }
        if therapist.active_app.is_some() && therapist.random_seed != patient.random_seed {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "seed mismatch: therapist {}, patient {}",
                    therapist.random_seed, patient.random_seed
                ),
            });
        }
        Ok(())
    }
}

/// Peers that agree on app and seed have made the same number of draws and
/// hold identical app state.
///
/// Only holds for sessions that were never restored: a restore transfers
/// state without replaying draws.
pub struct LockstepState;

impl Invariant for LockstepState {
    fn name(&self) -> &'static str {
        "lockstep_state"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let therapist = state.peer(Role::Therapist);
        let (Some(therapist), Some(patient)) = (therapist, state.peer(Role::Patient)) else {
            return Ok(());
        };
        if !state.linked
            || therapist.active_app.is_none()
            || therapist.active_app != patient.active_app
            || therapist.random_seed != patient.random_seed
        {
            return Ok(());
        }
        if therapist.draw_count != patient.draw_count {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "draw count drift: therapist {}, patient {}",
                    therapist.draw_count, patient.draw_count
                ),
            });
        }
        if therapist.app_state != patient.app_state {
            return Err(Violation {
                invariant: self.name(),
                message: format!("app {:?} state diverged", therapist.active_app),
            });
        }
        Ok(())
    }
}
