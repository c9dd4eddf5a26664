//! Wire format for the tandem session protocol.
//!
//! Every message is a fixed 3-byte header followed by a CBOR body. The header
//! carries the protocol kind, the sender's role and the addressed app id, so a
//! peer can dispatch a message before it knows what type the body has.
//!
//! There is no length prefix: the transport delivers whole messages, and the
//! body runs to the end of the message.

#![forbid(unsafe_code)]

pub mod errors;
pub mod header;
pub mod message;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use header::{AppId, MessageHeader, ProtocolKind, Role};
pub use message::{Message, decode, decode_body, encode, encode_body};
pub use payloads::{PointerMessage, SketchAction, SketchMessage, SystemAction, SystemMessage};
