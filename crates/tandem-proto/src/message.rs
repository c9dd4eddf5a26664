//! Header plus body, the unit the transport carries.
//!
//! Layout on the wire: `[MessageHeader: 3 bytes][body: CBOR, rest of message]`.
//!
//! Bodies are CBOR-encoded structs with no variant tag; the header's protocol
//! (and, for app traffic, the app id) already says which type to expect. A
//! struct with no fields encodes to zero bytes, so pure signal messages are
//! exactly the header.

use bytes::{BufMut, Bytes};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    MessageHeader, ProtocolKind,
    errors::{ProtocolError, Result},
};

/// CBOR encoding of an empty map (a struct with no fields).
const EMPTY_MAP: &[u8] = &[0xa0];

/// A framed message: validated header and the raw body bytes.
///
/// Holds the body undecoded. The router dispatches on the header and leaves
/// body decoding to whoever knows the type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Fixed header.
    pub header: MessageHeader,
    /// Body bytes (CBOR, possibly empty).
    pub body: Bytes,
}

impl Message {
    /// Wrap already-encoded body bytes.
    pub fn new(header: MessageHeader, body: impl Into<Bytes>) -> Self {
        Self { header, body: body.into() }
    }

    /// Header-only message.
    pub fn signal(header: MessageHeader) -> Self {
        Self { header, body: Bytes::new() }
    }

    /// Serialize `body` and attach it to `header`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn with_body<T: Serialize>(header: MessageHeader, body: &T) -> Result<Self> {
        Ok(Self { header, body: encode_body(body)? })
    }

    /// Write `[header][body]` into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.body);
    }

    /// Wire bytes of this message.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = Vec::with_capacity(self.wire_len());
        self.encode(&mut buf);
        Bytes::from(buf)
    }

    /// Size on the wire.
    pub fn wire_len(&self) -> usize {
        MessageHeader::SIZE + self.body.len()
    }

    /// Parse wire bytes. The body is copied out but not decoded.
    ///
    /// # Errors
    ///
    /// Any header error from [`MessageHeader::from_bytes`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (header, body) = decode(bytes)?;
        Ok(Self { header, body: Bytes::copy_from_slice(body) })
    }

    /// Decode the body as `T`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MalformedMessage` if the body is not a valid `T` or
    ///   bytes remain after it
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T> {
        decode_cbor(self.header.protocol, &self.body)
    }
}

/// Encode `header` and `body` into wire bytes.
///
/// # Errors
///
/// - `ProtocolError::CborEncode` if the body cannot be serialized
pub fn encode<T: Serialize>(header: MessageHeader, body: &T) -> Result<Bytes> {
    Ok(Message::with_body(header, body)?.to_bytes())
}

/// Split wire bytes into the header and the untouched body.
///
/// Works without knowing the body type, which is what dispatch needs.
///
/// # Errors
///
/// Any header error from [`MessageHeader::from_bytes`].
pub fn decode(bytes: &[u8]) -> Result<(MessageHeader, &[u8])> {
    let header = MessageHeader::from_bytes(bytes)?;
    let body = bytes.get(MessageHeader::SIZE..).unwrap_or_default();
    Ok((header, body))
}

/// Strip the header from wire bytes and decode the remainder as `T`.
///
/// # Errors
///
/// - Header errors from [`MessageHeader::from_bytes`]
/// - `ProtocolError::MalformedMessage` if the body does not match `T`
pub fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (header, body) = decode(bytes)?;
    decode_cbor(header.protocol, body)
}

/// Serialize a body without a header.
///
/// Used where the header is built elsewhere, such as mini-app restore state
/// that the router frames itself.
///
/// # Errors
///
/// - `ProtocolError::CborEncode` if serialization fails
pub fn encode_body<T: Serialize>(body: &T) -> Result<Bytes> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(body, &mut buf)
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;

    if buf == EMPTY_MAP {
        buf.clear();
    }
    Ok(Bytes::from(buf))
}

fn decode_cbor<T: DeserializeOwned>(protocol: ProtocolKind, body: &[u8]) -> Result<T> {
    let mut reader = if body.is_empty() { EMPTY_MAP } else { body };

    let value = ciborium::de::from_reader(&mut reader)
        .map_err(|e| ProtocolError::MalformedMessage { protocol, reason: e.to_string() })?;

    if !reader.is_empty() {
        return Err(ProtocolError::MalformedMessage {
            protocol,
            reason: format!("{} trailing bytes", reader.len()),
        });
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::{Role, SystemAction, SystemMessage};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Signal {}

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Answer {
        index: u32,
        text: String,
    }

    fn app_header() -> MessageHeader {
        MessageHeader::new(ProtocolKind::App, Role::Therapist, 2)
    }

    #[test]
    fn signal_is_header_only() {
        let wire = encode(app_header(), &Signal {}).unwrap();
        assert_eq!(hex::encode(&wire), "000002");

        let decoded: Signal = decode_body(&wire).unwrap();
        assert_eq!(decoded, Signal {});
    }

    #[test]
    fn header_decodes_without_body_type() {
        let answer = Answer { index: 3, text: "cat".into() };
        let wire = encode(app_header(), &answer).unwrap();

        let (header, body) = decode(&wire).unwrap();
        assert_eq!(header, app_header());
        assert_eq!(body.len(), wire.len() - MessageHeader::SIZE);

        let decoded: Answer = decode_body(&wire).unwrap();
        assert_eq!(decoded, answer);
    }

    #[test]
    fn system_message_wire_bytes() {
        let msg = SystemMessage::open(2, 42);
        let header = MessageHeader::new(ProtocolKind::System, Role::Therapist, 2);
        let wire = encode(header, &msg).unwrap();

        // header, then map(3) {"app_id": 2, "action": 0, "random_seed": 42}
        assert_eq!(&wire[..3], &[1, 0, 2]);
        let decoded: SystemMessage = decode_body(&wire).unwrap();
        assert_eq!(decoded.action, SystemAction::Open);
        assert_eq!(decoded.random_seed, 42);
    }

    #[test]
    fn trailing_bytes_are_malformed() {
        let body = Answer { index: 1, text: "a".into() };
        let mut wire = encode(app_header(), &body).unwrap().to_vec();
        wire.push(0x00);

        let result: Result<Answer> = decode_body(&wire);
        assert!(matches!(
            result,
            Err(ProtocolError::MalformedMessage { protocol: ProtocolKind::App, ref reason })
                if reason == "1 trailing bytes"
        ));
    }

    #[test]
    fn wrong_body_type_is_malformed() {
        let wire = encode(app_header(), &Answer { index: 1, text: "a".into() }).unwrap();
        let result: Result<SystemMessage> = decode_body(&wire);
        assert!(matches!(result, Err(ProtocolError::MalformedMessage { .. })));
    }

    #[test]
    fn empty_body_is_malformed_for_required_fields() {
        let wire = Message::signal(app_header()).to_bytes();
        let result: Result<Answer> = decode_body(&wire);
        assert!(matches!(result, Err(ProtocolError::MalformedMessage { .. })));
    }

    #[test]
    fn garbage_body_is_malformed() {
        let wire = [0u8, 0, 0, 0xff, 0xff];
        let result: Result<Answer> = decode_body(&wire);
        assert!(matches!(result, Err(ProtocolError::MalformedMessage { .. })));
    }

    #[test]
    fn unknown_protocol_fails_before_body() {
        let wire = [99u8, 0, 0, 0xa0];
        assert_eq!(Message::decode(&wire), Err(ProtocolError::UnknownProtocol(99)));
    }

    #[test]
    fn message_decode_keeps_body_raw() {
        let wire = encode(app_header(), &Answer { index: 7, text: "dog".into() }).unwrap();
        let message = Message::decode(&wire).unwrap();
        assert_eq!(message.to_bytes(), wire);
        assert_eq!(message.wire_len(), wire.len());
        assert_eq!(message.decode_body::<Answer>().unwrap().index, 7);
    }
}
