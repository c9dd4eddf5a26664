//! Timed answer trials.
//!
//! A run is [`TRIALS`] rounds. Each round opens an answer period of
//! [`ANSWER_PERIOD`], then reveals the result for [`REVEAL_PERIOD`] before
//! the next round. The patient side owns the clock: only it schedules the
//! period timers, and it broadcasts `Reveal` and `Next` when they fire, so
//! both peers change phase on the same message. Hiding the app drops the
//! timers; a restored patient re-arms the one its phase needs.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tandem_core::{AppContext, AppError, AppInput, AppTimer, MiniApp};
use tandem_proto::{Message, Role, encode_body};
use tracing::debug;

/// Rounds per run.
pub const TRIALS: u32 = 5;

/// Time the patient has to answer.
pub const ANSWER_PERIOD: Duration = Duration::from_secs(5);

/// Time the result stays up before the next round.
pub const REVEAL_PERIOD: Duration = Duration::from_secs(2);

const ANSWER_TIMER: u32 = 1;
const NEXT_TIMER: u32 = 2;

/// Side that runs the period timers.
const CLOCK_OWNER: Role = Role::Patient;

/// Where a run is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// No run in progress
    #[default]
    Idle,
    /// Waiting for the patient's answer
    Answering,
    /// Showing the round's result
    Revealing,
    /// All rounds done
    Finished,
}

/// Synchronized run state, also the restore snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialState {
    /// Current phase
    pub phase: Phase,
    /// Zero-based round
    pub trial: u32,
    /// Answer given in the current round, if any
    pub pending: Option<bool>,
    /// Outcome of each finished round; `None` means no answer in time
    pub answers: Vec<Option<bool>>,
}

impl TrialState {
    fn start() -> Self {
        Self { phase: Phase::Answering, ..Self::default() }
    }

    /// Record an answer. Only the first answer of a round counts.
    pub fn answer(&mut self, correct: bool) -> bool {
        if self.phase != Phase::Answering || self.pending.is_some() {
            return false;
        }
        self.pending = Some(correct);
        true
    }

    /// Close the answer period. Returns the round's outcome.
    pub fn reveal(&mut self) -> Option<Option<bool>> {
        if self.phase != Phase::Answering {
            return None;
        }
        let outcome = self.pending.take();
        self.answers.push(outcome);
        self.phase = Phase::Revealing;
        Some(outcome)
    }

    /// Move past a revealed round.
    pub fn advance(&mut self) -> Phase {
        if self.phase == Phase::Revealing {
            self.trial += 1;
            self.phase = if self.trial >= TRIALS { Phase::Finished } else { Phase::Answering };
        }
        self.phase
    }

    /// Rounds answered correctly.
    pub fn score(&self) -> usize {
        self.answers.iter().filter(|answer| **answer == Some(true)).count()
    }
}

#[derive(Debug, Serialize, Deserialize)]
enum TrialMessage {
    Start,
    Answer { correct: bool },
    Reveal,
    Next,
    Stop,
}

/// The trial app.
///
/// Input: `Button("start")` and `Button("stop")` (therapist),
/// `Button("correct")` and `Button("wrong")` (patient).
#[derive(Debug, Default)]
pub struct TimedTrial {
    state: TrialState,
}

impl TimedTrial {
    /// Idle trial.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> &TrialState {
        &self.state
    }

    /// Arm the timer the current phase needs, on the clock owner only.
    fn arm(&self, ctx: &mut AppContext<'_>) {
        if ctx.role() != CLOCK_OWNER {
            return;
        }
        match self.state.phase {
            Phase::Answering => ctx.schedule(ANSWER_PERIOD, ANSWER_TIMER),
            Phase::Revealing => ctx.schedule(REVEAL_PERIOD, NEXT_TIMER),
            Phase::Idle | Phase::Finished => {},
        }
    }
}

impl MiniApp for TimedTrial {
    fn on_show(&mut self, _ctx: &mut AppContext<'_>) -> Result<(), AppError> {
        self.state = TrialState::default();
        Ok(())
    }

    fn on_message(&mut self, ctx: &mut AppContext<'_>, message: &Message) -> Result<(), AppError> {
        match message.decode_body()? {
            TrialMessage::Start => {
                ctx.cancel_timers();
                if matches!(self.state.phase, Phase::Answering | Phase::Revealing) {
                    ctx.pop_section();
                }
                self.state = TrialState::start();
                ctx.push_section("trials", &[]);
                self.arm(ctx);
            },
            TrialMessage::Answer { correct } => {
                if !self.state.answer(correct) {
                    debug!(phase = ?self.state.phase, "late or repeated answer ignored");
                }
            },
            TrialMessage::Reveal => match self.state.reveal() {
                Some(outcome) => {
                    let result = match outcome {
                        Some(true) => "correct",
                        Some(false) => "wrong",
                        None => "no answer",
                    };
                    ctx.log(format!("trial {}: {result}", self.state.trial + 1));
                    self.arm(ctx);
                },
                None => debug!(phase = ?self.state.phase, "reveal out of phase"),
            },
            TrialMessage::Next => {
                if self.state.phase != Phase::Revealing {
                    debug!(phase = ?self.state.phase, "next out of phase");
                    return Ok(());
                }
                if self.state.advance() == Phase::Finished {
                    ctx.log(format!("score {}/{TRIALS}", self.state.score()));
                    ctx.pop_section();
                } else {
                    self.arm(ctx);
                }
            },
            TrialMessage::Stop => {
                ctx.cancel_timers();
                if matches!(self.state.phase, Phase::Answering | Phase::Revealing) {
                    ctx.log("stopped");
                    ctx.pop_section();
                }
                self.state = TrialState::default();
            },
        }
        Ok(())
    }

    fn on_timer(&mut self, ctx: &mut AppContext<'_>, timer: AppTimer) -> Result<(), AppError> {
        match (timer, self.state.phase) {
            (AppTimer::Token(ANSWER_TIMER), Phase::Answering) => ctx.send(&TrialMessage::Reveal),
            (AppTimer::Token(NEXT_TIMER), Phase::Revealing) => ctx.send(&TrialMessage::Next),
            (timer, phase) => {
                debug!(?timer, ?phase, "stale timer");
                Ok(())
            },
        }
    }

    fn on_input(&mut self, ctx: &mut AppContext<'_>, input: AppInput) -> Result<(), AppError> {
        let AppInput::Button(name) = input else {
            return Ok(());
        };
        let message = match (ctx.role(), name.as_str()) {
            (Role::Therapist, "start") => TrialMessage::Start,
            (Role::Therapist, "stop") => TrialMessage::Stop,
            (Role::Patient, "correct") if self.state.phase == Phase::Answering => {
                TrialMessage::Answer { correct: true }
            },
            (Role::Patient, "wrong") if self.state.phase == Phase::Answering => {
                TrialMessage::Answer { correct: false }
            },
            (role, _) => {
                debug!(?role, %name, "button ignored");
                return Ok(());
            },
        };
        ctx.send(&message)
    }

    fn restore_state(&self) -> Result<Option<Bytes>, AppError> {
        Ok(Some(encode_body(&self.state)?))
    }

    fn on_restore_state(
        &mut self,
        ctx: &mut AppContext<'_>,
        message: &Message,
    ) -> Result<(), AppError> {
        self.state = message.decode_body()?;
        self.arm(ctx);
        Ok(())
    }
}
