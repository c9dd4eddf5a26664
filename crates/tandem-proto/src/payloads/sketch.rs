//! Shared sketch board strokes.
//!
//! Each peer draws its own line; the sender in the message header says whose
//! line a point belongs to. `target` is only meaningful for `EraseAll` and
//! `Toggle`, which can act on either side's board.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::Role;

/// Sketch board operation.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
pub enum SketchAction {
    /// Append a point to the sender's current line.
    AddPoint = 0,
    /// Drop the sender's unfinished line.
    DiscardLine = 1,
    /// Commit the sender's current line to its undo stack.
    EndOfLine = 2,
    /// Remove the sender's most recent committed line.
    UndoLastLine = 3,
    /// Remove every committed line drawn by `target`.
    EraseAll = 4,
    /// Show or hide the board on the `target` side.
    Toggle = 5,
}

/// Body of a `Sketch` protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SketchMessage {
    /// Operation.
    pub action: SketchAction,
    /// Point x (for `AddPoint`).
    pub x: f32,
    /// Point y (for `AddPoint`).
    pub y: f32,
    /// Side acted on (for `EraseAll` and `Toggle`).
    pub target: Role,
}

impl SketchMessage {
    /// Stroke point.
    pub const fn point(x: f32, y: f32) -> Self {
        Self { action: SketchAction::AddPoint, x, y, target: Role::Unassigned }
    }

    /// Action that needs no coordinates.
    pub const fn action(action: SketchAction, target: Role) -> Self {
        Self { action, x: 0.0, y: 0.0, target }
    }
}
