//! Error types for the simulation core.
//!
//! Rejected client commands are not errors at this level; they are reported
//! as [`RejectReason`](crate::command::RejectReason) values in the tick
//! events and otherwise dropped. [`GameError`] covers configuration problems,
//! misuse of the lifecycle API, and broken internal invariants.

use thiserror::Error;

use crate::components::{BuildingId, PlayerId};
use crate::economy::LedgerError;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for the simulation core.
#[derive(Debug, Error)]
pub enum GameError {
    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path (or label) of the data that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Configuration parsed but is not usable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A player with this id is already connected.
    #[error("Player {0:?} is already connected")]
    DuplicatePlayer(PlayerId),

    /// Unknown player.
    #[error("Unknown player: {0:?}")]
    UnknownPlayer(PlayerId),

    /// Unknown building.
    #[error("Unknown building: {0:?}")]
    UnknownBuilding(BuildingId),

    /// No production data registered under this unit type key.
    #[error("Unknown unit type: {0}")]
    UnknownUnitType(String),

    /// A ledger operation broke the reservation invariant. This is a logic
    /// defect in the core, never a consequence of client input.
    #[error("Ledger invariant violated at tick {tick}: {source}")]
    LedgerViolation {
        /// Tick during which the violation was detected.
        tick: u64,
        /// The ledger operation that failed.
        #[source]
        source: LedgerError,
    },

    /// Some other internal invariant was broken.
    #[error("Invariant violation at tick {tick}: {detail}")]
    InvariantViolation {
        /// Tick during which the violation was detected.
        tick: u64,
        /// What went wrong.
        detail: String,
    },

    /// Serialization of simulation state or a replay failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Replay does not reproduce the recorded final state.
    #[error("Replay desync at tick {tick}: recorded hash {recorded}, replayed hash {replayed}")]
    ReplayDesync {
        /// Final tick of the replay.
        tick: u64,
        /// Hash stored in the replay.
        recorded: u64,
        /// Hash produced by re-running it.
        replayed: u64,
    },
}

impl GameError {
    /// Whether the error means the simulation state can no longer be
    /// trusted.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::LedgerViolation { .. } | Self::InvariantViolation { .. }
        )
    }
}
