//! Shared sketch board.
//!
//! Each peer can draw over the shared screen. Points stream in one
//! `AddPoint` at a time and are grouped into lines by `EndOfLine`; the board
//! keeps a separate line-in-progress and undo stack per role so the two
//! peers can draw at the same time.

use tandem_proto::{Role, SketchAction, SketchMessage};

use crate::error::SessionError;

/// One sketch point in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Horizontal position
    pub x: f32,
    /// Vertical position
    pub y: f32,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Layer {
    current: Option<Vec<Point>>,
    lines: Vec<Vec<Point>>,
}

/// Lines drawn by both roles, plus the local enable flag.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SketchBoard {
    therapist: Layer,
    patient: Layer,
    enabled: bool,
}

impl SketchBoard {
    /// Empty, disabled board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a sketch message from `sender`.
    ///
    /// `Toggle`, `UndoLastLine` and `EraseAll` act on the role named by
    /// `target`. `Toggle` only flips the enable flag when `target` is the
    /// local role.
    ///
    /// # Errors
    ///
    /// - `SketchViolation` for `EndOfLine` with no line in progress, or a
    ///   sender or target that is `Unassigned` where a role is required
    pub fn apply(
        &mut self,
        sender: Role,
        local: Role,
        message: &SketchMessage,
    ) -> Result<(), SessionError> {
        match message.action {
            SketchAction::AddPoint => {
                let point = Point { x: message.x, y: message.y };
                self.layer_mut(sender)?.current.get_or_insert_with(Vec::new).push(point);
            },
            SketchAction::DiscardLine => {
                self.layer_mut(sender)?.current = None;
            },
            SketchAction::EndOfLine => {
                let layer = self.layer_mut(sender)?;
                let line = layer.current.take().ok_or_else(|| {
                    SessionError::SketchViolation(format!(
                        "end of line from {sender:?} with no line in progress"
                    ))
                })?;
                layer.lines.push(line);
            },
            SketchAction::UndoLastLine => {
                self.layer_mut(message.target)?.lines.pop();
            },
            SketchAction::EraseAll => {
                let layer = self.layer_mut(message.target)?;
                layer.lines.clear();
                layer.current = None;
            },
            SketchAction::Toggle => {
                if message.target == local {
                    self.enabled = !self.enabled;
                }
            },
        }
        Ok(())
    }

    /// Whether the local user is currently drawing.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Finished lines drawn by `role`.
    pub fn lines(&self, role: Role) -> &[Vec<Point>] {
        self.layer(role).map_or(&[], |layer| layer.lines.as_slice())
    }

    /// Line `role` is drawing right now.
    pub fn current_line(&self, role: Role) -> Option<&[Point]> {
        self.layer(role).and_then(|layer| layer.current.as_deref())
    }

    fn layer(&self, role: Role) -> Option<&Layer> {
        match role {
            Role::Therapist => Some(&self.therapist),
            Role::Patient => Some(&self.patient),
            Role::Unassigned => None,
        }
    }

    fn layer_mut(&mut self, role: Role) -> Result<&mut Layer, SessionError> {
        match role {
            Role::Therapist => Ok(&mut self.therapist),
            Role::Patient => Ok(&mut self.patient),
            Role::Unassigned => {
                Err(SessionError::SketchViolation("sketch addressed to unassigned role".into()))
            },
        }
    }
}
