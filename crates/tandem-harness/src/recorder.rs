//! Instrumented mini-app for simulation tests.
//!
//! Records every lifecycle callback into a shared [`Journal`] and keeps a
//! small piece of synchronized state (lockstep draws plus notes exchanged
//! over the App protocol) that can be compared across peers.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tandem_core::{AppContext, AppError, AppInput, AppRegistry, AppTimer, MiniApp};
use tandem_proto::{AppId, Message, Role, encode_body};

/// Draws made by every recorder on show.
pub const DRAWS_ON_SHOW: usize = 3;

/// Lifecycle callback seen by a recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callback {
    /// `on_load`
    Load,
    /// `on_show`
    Show,
    /// `on_hide`
    Hide,
    /// `on_message`
    Message,
    /// `on_params`
    Params,
    /// `on_restore_state`
    Restore,
    /// `on_client_ready`
    ClientReady,
    /// `on_timer`
    Timer,
    /// `on_disconnect`
    Disconnect,
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Peer the callback ran on
    pub role: Role,
    /// App that received it
    pub app_id: AppId,
    /// Callback
    pub callback: Callback,
}

/// Shared, append-only record of recorder callbacks across both peers.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl Journal {
    /// Empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, role: Role, app_id: AppId, callback: Callback) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Entry { role, app_id, callback });
    }

    /// Copy of every entry so far.
    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// How many times `callback` ran on `role` for `app_id`.
    pub fn count(&self, role: Role, app_id: AppId, callback: Callback) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.role == role && e.app_id == app_id && e.callback == callback)
            .count()
    }
}

/// Synchronized state of a recorder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderState {
    /// Lockstep draws from the latest showing
    pub draws: Vec<i32>,
    /// Notes received over the App protocol, in order
    pub notes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Note {
    text: String,
}

/// The instrumented app.
#[derive(Debug)]
pub struct RecorderApp {
    journal: Journal,
    state: RecorderState,
}

impl RecorderApp {
    /// Recorder writing to `journal`.
    pub fn new(journal: Journal) -> Self {
        Self { journal, state: RecorderState::default() }
    }

    /// Current synchronized state.
    pub fn state(&self) -> &RecorderState {
        &self.state
    }

    fn record(&self, ctx: &AppContext<'_>, callback: Callback) {
        self.journal.record(ctx.role(), ctx.app_id(), callback);
    }
}

impl MiniApp for RecorderApp {
    fn on_load(&mut self, ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        self.record(ctx, Callback::Load);
        Ok(())
    }

    fn on_show(&mut self, ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        self.record(ctx, Callback::Show);
        self.state.draws = (0..DRAWS_ON_SHOW).map(|_| ctx.draw(0, 1000)).collect();
        ctx.log(format!("draws {:?}", self.state.draws));
        Ok(())
    }

    fn on_hide(&mut self, ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        self.record(ctx, Callback::Hide);
        Ok(())
    }

    fn on_message(&mut self, ctx: &mut AppContext<'_>, message: &Message) -> Result<(), AppError> {
        self.record(ctx, Callback::Message);
        let note: Note = message.decode_body()?;
        self.state.notes.push(note.text);
        Ok(())
    }

    fn on_params(&mut self, ctx: &mut AppContext<'_>, message: &Message) -> Result<(), AppError> {
        self.record(ctx, Callback::Params);
        let note: Note = message.decode_body()?;
        self.state.notes.push(format!("param:{}", note.text));
        Ok(())
    }

    fn restore_state(&self) -> Result<Option<Bytes>, AppError> {
        Ok(Some(encode_body(&self.state)?))
    }

    fn on_restore_state(
        &mut self,
        ctx: &mut AppContext<'_>,
        message: &Message,
    ) -> Result<(), AppError> {
        self.record(ctx, Callback::Restore);
        self.state = message.decode_body()?;
        Ok(())
    }

    fn on_client_ready(&mut self, ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        self.record(ctx, Callback::ClientReady);
        Ok(())
    }

    fn on_timer(&mut self, ctx: &mut AppContext<'_>, _timer: AppTimer) -> Result<(), AppError> {
        self.record(ctx, Callback::Timer);
        Ok(())
    }

    fn on_input(&mut self, ctx: &mut AppContext<'_>, input: AppInput) -> Result<(), AppError> {
        match input {
            AppInput::Text { text, .. } => ctx.send(&Note { text }),
            AppInput::Button(target) => {
                ctx.open_app_with_params(target, &Note { text: "handoff".into() })
            },
            AppInput::Pick(delay_ms) => {
                ctx.schedule(std::time::Duration::from_millis(u64::from(delay_ms)), delay_ms);
                Ok(())
            },
        }
    }

    fn on_disconnect(&mut self, ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        self.record(ctx, Callback::Disconnect);
        Ok(())
    }
}

/// Registry of `count` recorders named `recorder-0`, `recorder-1`, ... sharing
/// `journal`.
pub fn recorder_registry(count: usize, journal: &Journal) -> AppRegistry {
    (0..count).fold(AppRegistry::new(), |registry, index| {
        let journal = journal.clone();
        registry.register(format!("recorder-{index}"), move || RecorderApp::new(journal.clone()))
    })
}
