//! Typed bodies for the session-level protocols.
//!
//! App and Restore bodies are owned by each mini-app and never appear here.
//! What lives here are the bodies the router itself decodes: session control
//! (`System`), pointer overlays (`Cursor`, `MouseIndicator`) and the shared
//! sketch board (`Sketch`).

pub mod pointer;
pub mod sketch;
pub mod system;

pub use pointer::PointerMessage;
pub use sketch::{SketchAction, SketchMessage};
pub use system::{SystemAction, SystemMessage};
