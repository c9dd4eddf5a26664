//! Router inputs and outputs.
//!
//! The host feeds [`SessionEvent`]s in and executes the [`SessionAction`]s
//! that come back. The router itself performs no I/O.

use std::time::Duration;

use bytes::Bytes;
use tandem_proto::{AppId, PointerMessage, Role, SketchMessage};

use crate::{app::AppInput, pointer::IndicatorFrame};

/// Everything that can happen to a session.
#[derive(Debug, Clone)]
pub enum SessionEvent<I = std::time::Instant> {
    /// Frame boundary. Fires due timers, drains the inbound queue and runs
    /// the active app's `on_tick`.
    Tick {
        /// Current time
        now: I,
    },

    /// Transport delivered a whole message.
    MessageReceived(Bytes),

    /// Transport connected to the peer.
    Connected,

    /// Transport lost the peer.
    Disconnected {
        /// Transport-provided reason
        reason: String,
    },

    /// Transport failed to connect (patient) or listen (therapist).
    ConnectFailed {
        /// Transport-provided reason
        reason: String,
    },

    /// Therapist opens an app. A missing seed is drawn locally.
    OpenApp {
        /// App to open
        app_id: AppId,
        /// Lockstep seed for the app
        seed: Option<u32>,
    },

    /// Close the active app.
    CloseApp,

    /// Flip the therapist's own video.
    FlipLocalVideo,

    /// Flip the patient's video.
    FlipRemoteVideo,

    /// Start or stop sharing the therapist's cursor.
    ToggleCursorSharing,

    /// Local pointer moved.
    PointerMoved {
        /// Horizontal position
        x: f32,
        /// Vertical position
        y: f32,
    },

    /// Local pointer clicked.
    PointerClicked {
        /// Horizontal position
        x: f32,
        /// Vertical position
        y: f32,
    },

    /// Local sketch stroke or command.
    SendSketch(SketchMessage),

    /// Local input for the active app.
    AppInput(AppInput),
}

/// Connection state reported to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Peer connected.
    Connected,
    /// Peer gone.
    Disconnected {
        /// Transport-provided reason
        reason: String,
    },
    /// Connection failed; retrying.
    Retrying {
        /// Transport-provided reason
        reason: String,
        /// Delay before the next attempt
        after: Duration,
    },
}

/// Side effects for the host to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Send these bytes to the peer.
    Send(Bytes),

    /// (Re)connect the transport.
    Connect,

    /// Append an app's session log to persistent storage.
    PersistLog {
        /// App the log belongs to
        app_id: AppId,
        /// Registered name of the app
        app_name: String,
        /// Rendered log text
        contents: String,
    },

    /// Connection state changed.
    Status(ConnectionStatus),

    /// Video orientation changed.
    VideoOrientation {
        /// Local video mirrored
        local_flipped: bool,
        /// Remote video mirrored
        remote_flipped: bool,
    },

    /// Show the remote cursor here, or hide it with `None`.
    Cursor(Option<PointerMessage>),

    /// Draw one frame of a click indicator.
    Indicator(IndicatorFrame),

    /// Click indicator animation finished.
    IndicatorDone {
        /// Animation id
        id: u64,
    },

    /// Play the click sound.
    PlayClickSound,

    /// The sketch board changed; redraw it.
    SketchChanged {
        /// Role whose stroke changed the board
        sender: Role,
    },

    /// An app became the active screen.
    AppShown {
        /// App shown
        app_id: AppId,
        /// Instance id of this showing
        instance_id: u64,
    },

    /// The active app was hidden.
    AppHidden {
        /// App hidden
        app_id: AppId,
    },
}
