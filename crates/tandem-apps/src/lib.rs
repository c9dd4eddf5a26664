//! Reference mini-apps.
//!
//! Small but complete apps that exercise the lifecycle contract of
//! [`tandem_core::MiniApp`]: lockstep shuffles, debounced edits, params
//! handed between apps, patient-clocked timers and restore snapshots. Each
//! app keeps its synchronized state in one serde struct that is also its
//! restore snapshot, so two peers can be compared field by field.

#![forbid(unsafe_code)]

pub mod card_deck;
pub mod card_review;
pub mod timed_trial;
pub mod word_board;

pub use card_deck::{CardDeck, DeckState};
pub use card_review::{CardReview, ReviewParams, ReviewState};
use tandem_core::AppRegistry;
pub use timed_trial::{Phase, TimedTrial, TrialState};
pub use word_board::{BoardState, WordBoard};

/// Registered name of [`WordBoard`].
pub const WORD_BOARD: &str = "word-board";
/// Registered name of [`CardDeck`].
pub const CARD_DECK: &str = "card-deck";
/// Registered name of [`CardReview`].
pub const CARD_REVIEW: &str = "card-review";
/// Registered name of [`TimedTrial`].
pub const TIMED_TRIAL: &str = "timed-trial";

/// Every reference app, in a fixed order so both peers agree on app ids.
pub fn registry() -> AppRegistry {
    AppRegistry::new()
        .register(WORD_BOARD, WordBoard::new)
        .register(CARD_DECK, CardDeck::new)
        .register(CARD_REVIEW, CardReview::new)
        .register(TIMED_TRIAL, TimedTrial::new)
}
