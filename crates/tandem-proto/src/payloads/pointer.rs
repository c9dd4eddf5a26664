//! Pointer overlay bodies (`Cursor` and `MouseIndicator`).

use serde::{Deserialize, Serialize};

/// A point in the shared board's world coordinates.
///
/// `(-1, -1)` is reserved: on the `Cursor` protocol it hides the remote
/// cursor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerMessage {
    /// Horizontal position.
    pub x: f32,
    /// Vertical position.
    pub y: f32,
}

impl PointerMessage {
    /// The "hide cursor" sentinel.
    pub const HIDDEN: Self = Self { x: -1.0, y: -1.0 };

    /// Pointer at `(x, y)`.
    pub const fn at(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// True for the hide sentinel.
    #[allow(clippy::float_cmp)]
    pub fn is_hidden(&self) -> bool {
        self.x == -1.0 && self.y == -1.0
    }
}
