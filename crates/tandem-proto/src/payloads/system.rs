//! Session control messages.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::{AppId, Message, MessageHeader, ProtocolKind, Role, errors::Result};

/// What a `System` message asks the receiver to do.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
pub enum SystemAction {
    /// Close the active app, adopt the seed, show `app_id`.
    Open = 0,
    /// Close the active app.
    Close = 1,
    /// Adopt the seed and build the app registry.
    Login = 2,
    /// Toggle the orientation of the therapist's video.
    FlipTherapistVideo = 3,
    /// Toggle the orientation of the patient's video.
    FlipPatientVideo = 4,
    /// Joining peer has shown `app_id` and is ready.
    HandShake = 5,
}

/// Body of every `System` protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMessage {
    /// App addressed by the action (0 when unused).
    pub app_id: AppId,
    /// Requested action.
    pub action: SystemAction,
    /// Seed for the lockstep RNG (meaningful for `Open` and `Login`).
    pub random_seed: u32,
}

impl SystemMessage {
    /// Open `app_id` with a fresh shared seed.
    pub const fn open(app_id: AppId, random_seed: u32) -> Self {
        Self { app_id, action: SystemAction::Open, random_seed }
    }

    /// Close `app_id`.
    pub const fn close(app_id: AppId) -> Self {
        Self { app_id, action: SystemAction::Close, random_seed: 0 }
    }

    /// Hand the current seed to a (re)joining patient.
    pub const fn login(random_seed: u32) -> Self {
        Self { app_id: 0, action: SystemAction::Login, random_seed }
    }

    /// Acknowledge that `app_id` is shown.
    pub const fn handshake(app_id: AppId) -> Self {
        Self { app_id, action: SystemAction::HandShake, random_seed: 0 }
    }

    /// Video flip request for the given action.
    pub const fn flip(action: SystemAction) -> Self {
        Self { app_id: 0, action, random_seed: 0 }
    }

    /// Frame this body as a `System` message from `sender`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn into_message(self, sender: Role) -> Result<Message> {
        Message::with_body(MessageHeader::new(ProtocolKind::System, sender, self.app_id), &self)
    }
}
