//! Review of the cards sorted in the deck app.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tandem_core::{AppContext, AppError, AppInput, MiniApp};
use tandem_proto::{Message, encode_body};
use tracing::debug;

/// Parameters the opening app hands over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewParams {
    /// Card names, in the order they were placed
    pub cards: Vec<String>,
}

/// Synchronized review state, also the restore snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewState {
    /// Cards under review
    pub cards: Vec<String>,
    /// Index of the card both peers are looking at
    pub focus: u32,
}

#[derive(Debug, Serialize, Deserialize)]
enum ReviewMessage {
    Focus { index: u32 },
}

/// Steps through the cards received as parameters. `Button("next")` and
/// `Pick(index)` move the shared focus from either side.
#[derive(Debug, Default)]
pub struct CardReview {
    state: ReviewState,
}

impl CardReview {
    /// Empty review; cards arrive through `on_params`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> &ReviewState {
        &self.state
    }

    fn request_focus(&self, ctx: &mut AppContext<'_>, index: u32) -> Result<(), AppError> {
        if index as usize >= self.state.cards.len() {
            debug!(index, cards = self.state.cards.len(), "focus out of range");
            return Ok(());
        }
        ctx.send(&ReviewMessage::Focus { index })
    }
}

impl MiniApp for CardReview {
    fn on_show(&mut self, ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        self.state = ReviewState::default();
        ctx.push_section("review", &[]);
        Ok(())
    }

    fn on_params(&mut self, ctx: &mut AppContext<'_>, message: &Message) -> Result<(), AppError> {
        let params: ReviewParams = message.decode_body()?;
        ctx.log(format!("cards: {}", params.cards.join(", ")));
        self.state = ReviewState { cards: params.cards, focus: 0 };
        Ok(())
    }

    fn on_message(&mut self, ctx: &mut AppContext<'_>, message: &Message) -> Result<(), AppError> {
        let ReviewMessage::Focus { index } = message.decode_body()?;
        let card = self
            .state
            .cards
            .get(index as usize)
            .ok_or_else(|| AppError::InvalidState(format!("no card at {index}")))?;
        ctx.log(format!("focus {card}"));
        self.state.focus = index;
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
        self.state = message.decode_body()?;
        Ok(())
    }

    fn on_input(&mut self, ctx: &mut AppContext<'_>, input: AppInput) -> Result<(), AppError> {
        match input {
            AppInput::Button(name) if name == "next" => {
                self.request_focus(ctx, self.state.focus + 1)
            },
            AppInput::Pick(index) => self.request_focus(ctx, index),
            other => {
                debug!(?other, "input ignored");
                Ok(())
            },
        }
    }
}
