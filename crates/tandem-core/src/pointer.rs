//! Pointer overlays: the therapist's shared cursor and the click indicator.

use std::time::Duration;

/// Throttle for sharing the local cursor.
///
/// Sharing starts a few frames after it is enabled, so the first position the
/// peer sees is one the user actually moved to. After that a move is sent only
/// when the position changed.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorShare {
    enabled: bool,
    frames: u32,
    last: Option<(f32, f32)>,
    threshold: u32,
}

impl CursorShare {
    /// Disabled throttle that waits `threshold` frames after enabling.
    pub fn new(threshold: u32) -> Self {
        Self { enabled: false, frames: 0, last: None, threshold }
    }

    /// Flip sharing on or off. Returns the new state.
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.frames = 0;
        self.last = None;
        self.enabled
    }

    /// Whether sharing is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Count one frame.
    pub fn tick(&mut self) {
        if self.enabled {
            self.frames = self.frames.saturating_add(1);
        }
    }

    /// Record a pointer move. Returns true if it should be sent.
    #[allow(clippy::float_cmp)]
    pub fn moved(&mut self, x: f32, y: f32) -> bool {
        if !self.enabled || self.frames <= self.threshold {
            return false;
        }
        if self.last == Some((x, y)) {
            return false;
        }
        self.last = Some((x, y));
        true
    }
}

/// One frame of the click-indicator animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorFrame {
    /// Animation this frame belongs to
    pub id: u64,
    /// Horizontal position
    pub x: f32,
    /// Vertical position
    pub y: f32,
    /// Ring scale, shrinking from 5 towards 1
    pub scale: f32,
    /// Opacity, rising to 1
    pub alpha: f32,
}

/// Fade state of a click indicator.
///
/// Advanced one step per scheduled action; several can run at once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorFade {
    id: u64,
    x: f32,
    y: f32,
    step: u32,
}

impl IndicatorFade {
    /// Steps in one animation.
    pub const STEPS: u32 = 20;

    /// Time between steps.
    pub const STEP_INTERVAL: Duration = Duration::from_millis(10);

    /// New animation at `(x, y)`, before its first step.
    pub fn new(id: u64, x: f32, y: f32) -> Self {
        Self { id, x, y, step: 0 }
    }

    /// Animation id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Advance one step. Returns the frame to draw, or `None` once the
    /// animation is over.
    pub fn advance(&mut self) -> Option<IndicatorFrame> {
        if self.step >= Self::STEPS {
            return None;
        }
        self.step += 1;
        let step = self.step as f32;
        Some(IndicatorFrame {
            id: self.id,
            x: self.x,
            y: self.y,
            scale: 0.2f32.mul_add(-step, 5.0),
            alpha: (0.1 * step).min(1.0),
        })
    }
}
