//! Mini-app lifecycle.
//!
//! A mini-app is one screen of the shared session (a word game, a card
//! deck). Both peers register the same apps in the same order, so an
//! [`AppId`](tandem_proto::AppId) names the same app on either side. The router owns every
//! instance and drives it through [`Lifecycle`]:
//!
//! ```text
//! Unloaded --load--> Loaded --show--> Shown <--show/hide--> Hidden
//! ```
//!
//! Instances are never destroyed; a hidden app keeps its state and is shown
//! again by the next `Open` that names it.
//!
//! Apps never touch the router directly. Each callback gets an
//! [`AppContext`] that queues requests (send, schedule, open another app)
//! which the router executes after the callback returns.

mod context;
mod registry;
mod slot;

use bytes::Bytes;
pub use context::AppContext;
pub(crate) use context::AppRequest;
pub use registry::{AppFactory, AppRegistry};
pub use slot::{AppSlot, Lifecycle};
use tandem_proto::Message;

use crate::error::AppError;

/// Payload of a delayed action scheduled by an app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppTimer {
    /// Plain timer from [`AppContext::schedule`].
    Token(u32),
    /// Idle commit from [`AppContext::debounce`].
    Commit {
        /// Debounce key (usually the edited field)
        key: String,
    },
}

/// Local user input forwarded to the active app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppInput {
    /// A named button was pressed.
    Button(String),
    /// A text field changed.
    Text {
        /// Field name
        field: String,
        /// Full field contents after the edit
        text: String,
    },
    /// An item was picked by index.
    Pick(u32),
}

/// Capability set of a mini-app.
///
/// Only `on_show` is required; every other callback defaults to doing
/// nothing. Callbacks run on both peers for the same session events, so
/// anything random must go through [`AppContext::draw`].
///
/// Messages an app sends are echoed back to it (see
/// [`crate::SessionConfig::local_echo`]). Apps that must not apply their own
/// broadcasts twice filter with [`AppContext::is_remote`].
pub trait MiniApp: Send {
    /// First show only. Load content; failure halts the session.
    fn on_load(&mut self, _ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        Ok(())
    }

    /// App becomes the active screen.
    fn on_show(&mut self, ctx: &mut AppContext<'_>) -> Result<(), AppError>;

    /// App stops being the active screen. Pending timers are cancelled by
    /// the router right after this returns.
    fn on_hide(&mut self, _ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        Ok(())
    }

    /// App-protocol message addressed to this app (remote or echoed).
    fn on_message(
        &mut self,
        _ctx: &mut AppContext<'_>,
        _message: &Message,
    ) -> Result<(), AppError> {
        Ok(())
    }

    /// Parameters passed by the app that opened this one.
    fn on_params(&mut self, _ctx: &mut AppContext<'_>, _message: &Message) -> Result<(), AppError> {
        Ok(())
    }

    /// Snapshot that lets a reconnecting patient catch up. `None` means the
    /// app has nothing to restore.
    fn restore_state(&self) -> Result<Option<Bytes>, AppError> {
        Ok(None)
    }

    /// Apply a snapshot produced by the therapist's `restore_state`.
    fn on_restore_state(
        &mut self,
        _ctx: &mut AppContext<'_>,
        _message: &Message,
    ) -> Result<(), AppError> {
        Ok(())
    }

    /// The patient finished showing this app.
    fn on_client_ready(&mut self, _ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        Ok(())
    }

    /// A timer scheduled by this app fired.
    fn on_timer(&mut self, _ctx: &mut AppContext<'_>, _timer: AppTimer) -> Result<(), AppError> {
        Ok(())
    }

    /// Local user input.
    fn on_input(&mut self, _ctx: &mut AppContext<'_>, _input: AppInput) -> Result<(), AppError> {
        Ok(())
    }

    /// Once per frame while shown.
    fn on_tick(&mut self, _ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        Ok(())
    }

    /// The transport dropped while this app was shown.
    fn on_disconnect(&mut self, _ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        Ok(())
    }
}

