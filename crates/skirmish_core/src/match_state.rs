//! Match phases and win-condition evaluation.
//!
//! The phase only ever moves one step forward along
//! `WaitingForPlayers -> GameActive -> GameEnding -> GameEnded`.
//! [`MatchState::reset`] is the single way back to the start, and it is
//! driven from outside the tick (a lobby restarting the match).
//!
//! A participant is *eliminated* when it has no living units and cannot
//! afford the cheapest unit. Once the start grace period has run out, the
//! match is decided as soon as at most one participant is left standing:
//! one survivor wins, zero survivors is a draw.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::components::PlayerId;
use crate::math::Millis;

/// Phase of the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum MatchPhase {
    /// Lobby; waiting for a start command.
    #[default]
    WaitingForPlayers,
    /// Match in progress.
    GameActive,
    /// Result decided, end grace period running.
    GameEnding,
    /// Terminal.
    GameEnded,
}

impl MatchPhase {
    /// The only phase this one may advance to.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::WaitingForPlayers => Some(Self::GameActive),
            Self::GameActive => Some(Self::GameEnding),
            Self::GameEnding => Some(Self::GameEnded),
            Self::GameEnded => None,
        }
    }
}

/// How a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchOutcome {
    /// A single participant survived.
    Winner(PlayerId),
    /// Every participant was eliminated in the same evaluation.
    Draw,
}

impl MatchOutcome {
    /// The winning player, if any.
    #[must_use]
    pub const fn winner(self) -> Option<PlayerId> {
        match self {
            Self::Winner(player) => Some(player),
            Self::Draw => None,
        }
    }
}

/// Events emitted by phase changes, for broadcast and presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchEvent {
    /// A start command was accepted; gameplay is enabled for everyone.
    MatchStarted {
        /// Player who issued the start command.
        issuer: PlayerId,
    },
    /// The phase advanced.
    PhaseChanged {
        /// Previous phase.
        from: MatchPhase,
        /// New phase.
        to: MatchPhase,
    },
    /// The win condition fired; the end grace period has begun.
    OutcomeDecided(MatchOutcome),
    /// One-shot notification that the match is over.
    VictoryDeclared(MatchOutcome),
}

/// A participant's standing, as computed after the tick's mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerStanding {
    /// The participant.
    pub player: PlayerId,
    /// Living units.
    pub alive_units: u32,
    /// Whether available resources meet the cheapest-unit floor.
    pub can_afford_cheapest: bool,
}

impl PlayerStanding {
    /// No units and no means to make one.
    #[must_use]
    pub const fn is_eliminated(&self) -> bool {
        self.alive_units == 0 && !self.can_afford_cheapest
    }
}

/// The match state machine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchState {
    phase: MatchPhase,
    start_timer: Millis,
    end_timer: Millis,
    outcome: Option<MatchOutcome>,
    /// Players present when the match started, in id order.
    participants: Vec<PlayerId>,
}

impl MatchState {
    /// Fresh state in `WaitingForPlayers`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Remaining start grace.
    #[must_use]
    pub const fn start_timer(&self) -> Millis {
        self.start_timer
    }

    /// Remaining end grace.
    #[must_use]
    pub const fn end_timer(&self) -> Millis {
        self.end_timer
    }

    /// Decided outcome, once the win condition has fired.
    #[must_use]
    pub const fn outcome(&self) -> Option<MatchOutcome> {
        self.outcome
    }

    /// Winning player, if the match was won outright.
    #[must_use]
    pub fn winner(&self) -> Option<PlayerId> {
        self.outcome.and_then(MatchOutcome::winner)
    }

    /// Players who were in the match when it started.
    #[must_use]
    pub fn participants(&self) -> &[PlayerId] {
        &self.participants
    }

    /// Begin the match.
    ///
    /// Returns `None`, changing nothing, unless the phase is
    /// `WaitingForPlayers`.
    pub fn start(
        &mut self,
        issuer: PlayerId,
        mut participants: Vec<PlayerId>,
        start_grace: Millis,
    ) -> Option<[MatchEvent; 2]> {
        if self.phase != MatchPhase::WaitingForPlayers {
            return None;
        }
        participants.sort_unstable();
        participants.dedup();
        self.participants = participants;
        self.start_timer = start_grace;
        self.end_timer = 0;
        self.outcome = None;
        let changed = self.advance();
        info!(?issuer, participants = self.participants.len(), "Match started");
        Some([MatchEvent::MatchStarted { issuer }, changed])
    }

    /// Run one tick of phase logic against post-apply standings.
    ///
    /// Participants missing from `standings` (disconnected) count as
    /// eliminated.
    pub fn evaluate(
        &mut self,
        standings: &[PlayerStanding],
        elapsed: Millis,
        end_grace: Millis,
    ) -> Vec<MatchEvent> {
        let mut events = Vec::new();
        match self.phase {
            MatchPhase::WaitingForPlayers | MatchPhase::GameEnded => {}
            MatchPhase::GameActive => {
                if self.start_timer > 0 {
                    self.start_timer = self.start_timer.saturating_sub(elapsed);
                    return events;
                }
                let Some(outcome) = self.decide(standings) else {
                    return events;
                };
                self.outcome = Some(outcome);
                self.end_timer = end_grace;
                info!(?outcome, "Match outcome decided");
                events.push(MatchEvent::OutcomeDecided(outcome));
                events.push(self.advance());
            }
            MatchPhase::GameEnding => {
                self.end_timer = self.end_timer.saturating_sub(elapsed);
                if self.end_timer == 0 {
                    events.push(self.advance());
                    if let Some(outcome) = self.outcome {
                        info!(?outcome, "Match ended");
                        events.push(MatchEvent::VictoryDeclared(outcome));
                    }
                }
            }
        }
        events
    }

    /// Return to `WaitingForPlayers`, clearing timers and the result.
    pub fn reset(&mut self) {
        info!(from = ?self.phase, "Match reset");
        *self = Self::default();
    }

    fn decide(&self, standings: &[PlayerStanding]) -> Option<MatchOutcome> {
        if self.participants.len() < 2 {
            return None;
        }
        let mut survivors = self.participants.iter().copied().filter(|player| {
            standings
                .iter()
                .find(|s| s.player == *player)
                .is_some_and(|s| !s.is_eliminated())
        });
        match (survivors.next(), survivors.next()) {
            (None, _) => Some(MatchOutcome::Draw),
            (Some(winner), None) => Some(MatchOutcome::Winner(winner)),
            (Some(_), Some(_)) => None,
        }
    }

    fn advance(&mut self) -> MatchEvent {
        let from = self.phase;
        // Callers only advance from non-terminal phases.
        let to = from.next().unwrap_or(from);
        self.phase = to;
        info!(?from, ?to, "Match phase changed");
        MatchEvent::PhaseChanged { from, to }
    }
}
