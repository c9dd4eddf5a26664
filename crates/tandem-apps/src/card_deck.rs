//! Card sorting deck.
//!
//! The deck is shuffled in lockstep on every show, so both peers hold the
//! same order without exchanging it. Placing moves the top card onto one of
//! [`STACKS`] answer stacks and taking back returns a stack's top card to the
//! deck. Both moves are broadcast and applied on each side, echo included.
//! `Button("continue")` opens the review app with the placed cards.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tandem_core::{AppContext, AppError, AppInput, MiniApp};
use tandem_proto::{Message, encode_body};
use tracing::debug;

use crate::{CARD_REVIEW, card_review::ReviewParams};

/// Answer stacks.
pub const STACKS: usize = 2;

const DEFAULT_CARDS: [&str; 12] = [
    "apple",
    "banana",
    "book",
    "butterfly",
    "cat",
    "computer",
    "dog",
    "elephant",
    "sun",
    "telephone",
    "tree",
    "umbrella",
];

/// Card positions. Cards are indices into the deck's card list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckState {
    /// Undealt cards; the last one is on top
    pub deck: Vec<u32>,
    /// Answer stacks, top card last
    pub stacks: [Vec<u32>; STACKS],
    /// Cards currently on a stack, in placement order
    pub placed: Vec<u32>,
}

impl DeckState {
    fn deal(order: Vec<u32>) -> Self {
        Self { deck: order, ..Self::default() }
    }

    /// Move the top card onto `stack`.
    pub fn place(&mut self, stack: usize) -> Result<u32, AppError> {
        let target = stack_mut(&mut self.stacks, stack)?;
        let card = self.deck.pop().ok_or_else(|| AppError::InvalidState("deck is empty".into()))?;
        target.push(card);
        self.placed.push(card);
        Ok(card)
    }

    /// Return the top card of `stack` to the deck.
    pub fn take_back(&mut self, stack: usize) -> Result<u32, AppError> {
        let source = stack_mut(&mut self.stacks, stack)?;
        let card =
            source.pop().ok_or_else(|| AppError::InvalidState(format!("stack {stack} is empty")))?;
        if let Some(position) = self.placed.iter().rposition(|placed| *placed == card) {
            self.placed.remove(position);
        }
        self.deck.push(card);
        Ok(card)
    }

    fn cards(&self) -> impl Iterator<Item = u32> + '_ {
        self.deck.iter().chain(self.stacks.iter().flatten()).copied()
    }
}

fn stack_mut(stacks: &mut [Vec<u32>; STACKS], stack: usize) -> Result<&mut Vec<u32>, AppError> {
    stacks.get_mut(stack).ok_or_else(|| AppError::InvalidState(format!("no stack {stack}")))
}

/// Stack named on the wire. An index past [`STACKS`] is a peer bug, not a
/// race, and fails the app.
fn wire_stack(stack: u32) -> Result<usize, AppError> {
    let index = stack as usize;
    if index < STACKS {
        Ok(index)
    } else {
        Err(AppError::InvalidState(format!("no stack {stack}")))
    }
}

#[derive(Debug, Serialize, Deserialize)]
enum DeckMessage {
    Place { stack: u32 },
    TakeBack { stack: u32 },
}

/// The deck app.
///
/// Input: `Pick(stack)` places the top card, `Button("return-N")` takes the
/// top card of stack `N` back, `Button("continue")` hands the placed cards
/// to the review app.
#[derive(Debug)]
pub struct CardDeck {
    cards: Vec<String>,
    state: DeckState,
}

impl Default for CardDeck {
    fn default() -> Self {
        Self::with_cards(DEFAULT_CARDS.iter().map(|c| (*c).to_owned()).collect())
    }
}

impl CardDeck {
    /// Deck of the built-in cards.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deck of `cards`.
    pub fn with_cards(cards: Vec<String>) -> Self {
        Self { cards, state: DeckState::default() }
    }

    /// Current positions.
    pub fn state(&self) -> &DeckState {
        &self.state
    }

    /// Name of card `index`.
    pub fn card_name(&self, index: u32) -> Option<&str> {
        self.cards.get(index as usize).map(String::as_str)
    }

    fn placed_names(&self) -> Vec<String> {
        let names = self.state.placed.iter().filter_map(|card| self.card_name(*card));
        names.map(str::to_owned).collect()
    }
}

impl MiniApp for CardDeck {
    fn on_load(&mut self, _ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        if self.cards.is_empty() {
            return Err(AppError::MissingContent("deck cards".into()));
        }
        Ok(())
    }

    fn on_show(&mut self, ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        let order = ctx.randomize((0..self.cards.len() as u32).collect());
        self.state = DeckState::deal(order);
        ctx.push_section("deck", &[]);
        ctx.log(format!("dealt {} cards", self.cards.len()));
        Ok(())
    }

    fn on_hide(&mut self, ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        ctx.pop_section();
        Ok(())
    }

    fn on_message(&mut self, ctx: &mut AppContext<'_>, message: &Message) -> Result<(), AppError> {
        let (moved, arrow, stack) = match message.decode_body()? {
            DeckMessage::Place { stack } => (self.state.place(wire_stack(stack)?), "->", stack),
            DeckMessage::TakeBack { stack } => {
                (self.state.take_back(wire_stack(stack)?), "<-", stack)
            },
        };
        // Both peers may move the last card at once; the later move finds
        // nothing to take on either side.
        match moved {
            Ok(card) => {
                let name = self.card_name(card).unwrap_or("?");
                ctx.log(format!("{name} {arrow} stack {stack}"));
            },
            Err(error) => debug!(%error, "move skipped"),
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
        let state: DeckState = message.decode_body()?;
        if let Some(card) = state.cards().find(|card| *card as usize >= self.cards.len()) {
            return Err(AppError::InvalidState(format!("restore names unknown card {card}")));
        }
        self.state = state;
        Ok(())
    }

    fn on_input(&mut self, ctx: &mut AppContext<'_>, input: AppInput) -> Result<(), AppError> {
        match input {
            AppInput::Pick(stack) => {
                if self.state.deck.is_empty() || stack as usize >= STACKS {
                    debug!(stack, remaining = self.state.deck.len(), "nothing to place");
                    return Ok(());
                }
                ctx.send(&DeckMessage::Place { stack })
            },
            AppInput::Button(name) if name == "continue" => {
                let params = ReviewParams { cards: self.placed_names() };
                ctx.open_app_with_params(CARD_REVIEW, &params)
            },
            AppInput::Button(name) => {
                let stack = name.strip_prefix("return-").and_then(|n| n.parse::<u32>().ok());
                match stack {
                    Some(stack)
                        if self.state.stacks.get(stack as usize).is_some_and(|s| !s.is_empty()) =>
                    {
                        ctx.send(&DeckMessage::TakeBack { stack })
                    },
                    _ => {
                        debug!(%name, "button ignored");
                        Ok(())
                    },
                }
            },
            AppInput::Text { .. } => Ok(()),
        }
    }
}
