//! Prompt board with shared text fields.
//!
//! The therapist steps through a list of prompt words while both peers type
//! associations into a fixed row of fields. An edit is broadcast once the
//! field has been idle for [`COMMIT_DELAY`]; each side applies only the
//! other side's commits, since its own field already shows what was typed.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tandem_core::{AppContext, AppError, AppInput, AppTimer, MiniApp};
use tandem_proto::{Message, Role, encode_body};
use tracing::debug;

/// Fields per prompt.
pub const FIELD_COUNT: usize = 6;

/// Idle time before a field edit is broadcast.
pub const COMMIT_DELAY: Duration = Duration::from_millis(300);

const DEFAULT_PROMPTS: [&str; 9] =
    ["throw", "drive", "eat", "measure", "deliver", "read", "wash", "watch", "chop"];

/// Synchronized board state. Doubles as the restore snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardState {
    /// Index of the current prompt
    pub prompt: u32,
    /// Field contents, [`FIELD_COUNT`] entries
    pub fields: Vec<String>,
}

impl BoardState {
    fn reset(&mut self, prompt: u32) {
        self.prompt = prompt;
        self.fields = vec![String::new(); FIELD_COUNT];
    }

    fn field_mut(&mut self, index: u32) -> Result<&mut String, AppError> {
        self.fields
            .get_mut(index as usize)
            .ok_or_else(|| AppError::InvalidState(format!("field {index} out of range")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum BoardMessage {
    ChangePrompt { index: u32 },
    UpdateField { index: u32, text: String },
}

fn field_index(key: &str) -> Result<u32, AppError> {
    key.parse::<u32>()
        .ok()
        .filter(|index| (*index as usize) < FIELD_COUNT)
        .ok_or_else(|| AppError::InvalidState(format!("unknown field {key:?}")))
}

/// The word board app.
///
/// Input: `Text { field: "0".."5" }` edits a field, `Button("next")` and
/// `Pick(index)` change the prompt (therapist only).
#[derive(Debug)]
pub struct WordBoard {
    prompts: Vec<String>,
    state: BoardState,
}

impl Default for WordBoard {
    fn default() -> Self {
        Self::with_prompts(DEFAULT_PROMPTS.iter().map(|p| (*p).to_owned()).collect())
    }
}

impl WordBoard {
    /// Board with the built-in prompt list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Board over `prompts`. An empty list fails to load.
    pub fn with_prompts(prompts: Vec<String>) -> Self {
        Self { prompts, state: BoardState::default() }
    }

    /// Current state.
    pub fn state(&self) -> &BoardState {
        &self.state
    }

    /// Current prompt word.
    pub fn prompt(&self) -> Option<&str> {
        self.prompts.get(self.state.prompt as usize).map(String::as_str)
    }

    fn check_prompt(&self, index: u32) -> Result<(), AppError> {
        if (index as usize) < self.prompts.len() {
            Ok(())
        } else {
            Err(AppError::InvalidState(format!(
                "prompt {index} out of range ({} prompts)",
                self.prompts.len()
            )))
        }
    }

    fn request_prompt(&self, ctx: &mut AppContext<'_>, index: u32) -> Result<(), AppError> {
        if ctx.role() != Role::Therapist || self.check_prompt(index).is_err() {
            debug!(index, role = ?ctx.role(), "prompt change ignored");
            return Ok(());
        }
        ctx.send(&BoardMessage::ChangePrompt { index })
    }

    fn open_prompt_section(&self, ctx: &mut AppContext<'_>) {
        ctx.push_section("prompt", &[self.prompt().unwrap_or_default()]);
    }
}

impl MiniApp for WordBoard {
    fn on_load(&mut self, _ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        if self.prompts.is_empty() {
            return Err(AppError::MissingContent("word board prompts".into()));
        }
        Ok(())
    }

    fn on_show(&mut self, ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        self.state.reset(0);
        self.open_prompt_section(ctx);
        Ok(())
    }

    fn on_hide(&mut self, ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        ctx.pop_section();
        Ok(())
    }

    fn on_message(&mut self, ctx: &mut AppContext<'_>, message: &Message) -> Result<(), AppError> {
        match message.decode_body()? {
            BoardMessage::ChangePrompt { index } => {
                self.check_prompt(index)?;
                self.state.reset(index);
                ctx.pop_section();
                self.open_prompt_section(ctx);
            },
            BoardMessage::UpdateField { index, text } => {
                if ctx.is_remote(&message.header) {
                    *self.state.field_mut(index)? = text;
                }
            },
        }
        Ok(())
    }

    fn restore_state(&self) -> Result<Option<Bytes>, AppError> {
        Ok(Some(encode_body(&self.state)?))
    }

    fn on_restore_state(
        &mut self,
        _ctx: &mut AppContext<'_>,
        message: &Message,
    ) -> Result<(), AppError> {
        let state: BoardState = message.decode_body()?;
        self.check_prompt(state.prompt)?;
        if state.fields.len() != FIELD_COUNT {
            return Err(AppError::InvalidState(format!(
                "restore carries {} fields, expected {FIELD_COUNT}",
                state.fields.len()
            )));
        }
        self.state = state;
        Ok(())
    }

    fn on_timer(&mut self, ctx: &mut AppContext<'_>, timer: AppTimer) -> Result<(), AppError> {
        let AppTimer::Commit { key } = timer else {
            return Ok(());
        };
        let index = field_index(&key)?;
        let text = self.state.field_mut(index)?.clone();
        ctx.log(format!("field {index}: {text}"));
        ctx.send(&BoardMessage::UpdateField { index, text })
    }

    fn on_input(&mut self, ctx: &mut AppContext<'_>, input: AppInput) -> Result<(), AppError> {
        match input {
            AppInput::Text { field, text } => {
                let Ok(index) = field_index(&field) else {
                    debug!(%field, "edit to unknown field ignored");
                    return Ok(());
                };
                *self.state.field_mut(index)? = text;
                ctx.debounce(field, COMMIT_DELAY);
                Ok(())
            },
            AppInput::Button(name) if name == "next" => {
                self.request_prompt(ctx, self.state.prompt + 1)
            },
            AppInput::Pick(index) => self.request_prompt(ctx, index),
            AppInput::Button(name) => {
                debug!(%name, "unknown button");
                Ok(())
            },
        }
    }
}
