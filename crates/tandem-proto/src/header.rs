//! Fixed 3-byte message header.
//!
//! The header is raw binary, never CBOR: `[protocol, sender, app_id]`. Keeping
//! it out of the body serializer means dispatch keeps working when a body
//! schema changes, and a peer can reject an unknown protocol without touching
//! the body at all.

use serde_repr::{Deserialize_repr, Serialize_repr};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::errors::{ProtocolError, Result};

/// Index of a mini-app in the session registry.
///
/// Assigned in registration order and stable for the life of a session.
pub type AppId = u8;

/// Which side of the session a process plays.
///
/// The therapist owns the random seed and the restore state; the patient
/// joins, adopts the seed and acknowledges every app it shows.
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize_repr, Deserialize_repr,
)]
pub enum Role {
    /// Drives the session (listening side).
    Therapist = 0,
    /// Follows the session (calling side).
    Patient = 1,
    /// Role not chosen yet.
    Unassigned = 2,
}

impl Role {
    /// Parse a sender byte.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Therapist),
            1 => Some(Self::Patient),
            2 => Some(Self::Unassigned),
            _ => None,
        }
    }

    /// Wire value.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// The other side of the session.
    pub const fn peer(self) -> Self {
        match self {
            Self::Therapist => Self::Patient,
            Self::Patient => Self::Therapist,
            Self::Unassigned => Self::Unassigned,
        }
    }
}

/// How the router interprets a message body.
///
/// The set is closed: an unknown tag is a version mismatch, not something to
/// skip over.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolKind {
    /// Body belongs to the active mini-app.
    App = 0,
    /// Session control (`SystemMessage`).
    System = 1,
    /// Snapshot for a joining peer.
    Restore = 2,
    /// Reserved; never produced.
    Audio = 3,
    /// Shared sketch board stroke (`SketchMessage`).
    Sketch = 4,
    /// Click ripple at a point (`PointerMessage`).
    MouseIndicator = 5,
    /// One-shot parameters handed to a freshly opened app.
    AppParams = 6,
    /// Remote cursor position (`PointerMessage`).
    Cursor = 7,
}

impl ProtocolKind {
    /// Every registered protocol, in tag order.
    pub const ALL: [Self; 8] = [
        Self::App,
        Self::System,
        Self::Restore,
        Self::Audio,
        Self::Sketch,
        Self::MouseIndicator,
        Self::AppParams,
        Self::Cursor,
    ];

    /// Parse a protocol tag.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::App),
            1 => Some(Self::System),
            2 => Some(Self::Restore),
            3 => Some(Self::Audio),
            4 => Some(Self::Sketch),
            5 => Some(Self::MouseIndicator),
            6 => Some(Self::AppParams),
            7 => Some(Self::Cursor),
            _ => None,
        }
    }

    /// Wire value.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Raw header layout. All fields are single bytes, so every 3-byte pattern is
/// a valid `RawHeader`; semantic validation happens in
/// [`MessageHeader::from_bytes`].
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
struct RawHeader {
    protocol: u8,
    sender: u8,
    app_id: u8,
}

/// Validated message header.
///
/// # Invariants
///
/// - Every header a router emits carries the local role as `sender`.
/// - `protocol` and `sender` always hold registered values; raw bytes that do
///   not are rejected by [`MessageHeader::from_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHeader {
    /// How to interpret the body.
    pub protocol: ProtocolKind,
    /// Role of the peer that produced the message.
    pub sender: Role,
    /// Addressed mini-app (0 when the protocol is app-independent).
    pub app_id: AppId,
}

impl MessageHeader {
    /// Encoded size.
    pub const SIZE: usize = 3;

    /// Create a header.
    pub const fn new(protocol: ProtocolKind, sender: Role, app_id: AppId) -> Self {
        Self { protocol, sender, app_id }
    }

    /// Parse the header prefix of a message. Bytes past the header are not
    /// inspected.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Truncated` if fewer than [`Self::SIZE`] bytes
    /// - `ProtocolError::UnknownProtocol` for an unregistered protocol tag
    /// - `ProtocolError::InvalidRole` for an unknown sender byte
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (raw, _) = RawHeader::ref_from_prefix(bytes).map_err(|_| {
            ProtocolError::Truncated { expected: Self::SIZE, actual: bytes.len() }
        })?;

        let protocol = ProtocolKind::from_u8(raw.protocol)
            .ok_or(ProtocolError::UnknownProtocol(raw.protocol))?;
        let sender = Role::from_u8(raw.sender).ok_or(ProtocolError::InvalidRole(raw.sender))?;

        Ok(Self { protocol, sender, app_id: raw.app_id })
    }

    /// Serialize to the 3 wire bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let raw = RawHeader {
            protocol: self.protocol.to_u8(),
            sender: self.sender.to_u8(),
            app_id: self.app_id,
        };
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(raw.as_bytes());
        out
    }

    /// True if the message came from the other peer rather than being a local
    /// echo of our own send.
    pub fn is_remote(&self, local: Role) -> bool {
        self.sender != local
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    impl Arbitrary for Role {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
            prop_oneof![Just(Self::Therapist), Just(Self::Patient), Just(Self::Unassigned)].boxed()
        }
    }

    impl Arbitrary for MessageHeader {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
            (prop::sample::select(ProtocolKind::ALL.to_vec()), any::<Role>(), any::<u8>())
                .prop_map(|(protocol, sender, app_id)| Self::new(protocol, sender, app_id))
                .boxed()
        }
    }

    proptest! {
        #[test]
        fn header_round_trip(header in any::<MessageHeader>()) {
            let bytes = header.to_bytes();
            prop_assert_eq!(MessageHeader::from_bytes(&bytes).unwrap(), header);
        }

        #[test]
        fn trailing_body_is_not_inspected(
            header in any::<MessageHeader>(),
            body in any::<Vec<u8>>(),
        ) {
            let mut bytes = header.to_bytes().to_vec();
            bytes.extend_from_slice(&body);
            prop_assert_eq!(MessageHeader::from_bytes(&bytes).unwrap(), header);
        }

        #[test]
        fn unregistered_tags_rejected(tag in 8u8..=255) {
            let result = MessageHeader::from_bytes(&[tag, 0, 0]);
            prop_assert_eq!(result, Err(ProtocolError::UnknownProtocol(tag)));
        }
    }

    #[test]
    fn wire_layout() {
        let header = MessageHeader::new(ProtocolKind::AppParams, Role::Patient, 9);
        assert_eq!(header.to_bytes(), [6, 1, 9]);
    }

    #[test]
    fn reject_short_header() {
        assert_eq!(
            MessageHeader::from_bytes(&[1, 0]),
            Err(ProtocolError::Truncated { expected: 3, actual: 2 })
        );
        assert_eq!(
            MessageHeader::from_bytes(&[]),
            Err(ProtocolError::Truncated { expected: 3, actual: 0 })
        );
    }

    #[test]
    fn reject_unknown_protocol_before_sender() {
        assert_eq!(MessageHeader::from_bytes(&[99, 7, 0]), Err(ProtocolError::UnknownProtocol(99)));
    }

    #[test]
    fn reject_unknown_sender() {
        assert_eq!(MessageHeader::from_bytes(&[0, 3, 0]), Err(ProtocolError::InvalidRole(3)));
    }

    #[test]
    fn remote_check_compares_sender_with_local_role() {
        let header = MessageHeader::new(ProtocolKind::App, Role::Therapist, 0);
        assert!(!header.is_remote(Role::Therapist));
        assert!(header.is_remote(Role::Patient));
    }

    #[test]
    fn peer_roles() {
        assert_eq!(Role::Therapist.peer(), Role::Patient);
        assert_eq!(Role::Patient.peer(), Role::Therapist);
        assert_eq!(Role::Unassigned.peer(), Role::Unassigned);
    }
}
