//! # Skirmish Core
//!
//! Authoritative simulation core for a skirmish game server.
//!
//! This crate contains **only** deterministic logic:
//! - No networking
//! - No file IO outside the replay helpers
//! - No system randomness
//! - No floating-point math (integer milliseconds and fixed-point)
//!
//! Clients never touch game state directly. They submit requests, the
//! server validates them once per tick into a mutation log, and the log is
//! applied at a single commit point before production, health and the
//! match phase machine run.
//!
//! ## Crate Structure
//!
//! - [`economy`] - Resource ledger with reserve/commit/release
//! - [`production`] - Buildings and their FIFO production queues
//! - [`health`] - Discrete health stages and the stage speed table
//! - [`command`] - Client commands and same-tick validation
//! - [`mutation`] - The per-tick mutation log
//! - [`match_state`] - Match phases and win-condition evaluation
//! - [`simulation`] - Core simulation loop and lifecycle API
//! - [`snapshot`] - Publishable state views
//! - [`replay`] - Recording and verifying matches
//! - [`config`] - RON configuration

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod command;
pub mod components;
pub mod config;
pub mod economy;
pub mod error;
pub mod health;
pub mod match_state;
pub mod math;
pub mod mutation;
pub mod player;
pub mod production;
pub mod replay;
pub mod simulation;
pub mod snapshot;
pub mod unit;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::command::{ClientCommand, CommandRequest, RejectReason, Rejection, TickInput};
    pub use crate::components::{BuildingId, PlayerId, Stance, UnitId};
    pub use crate::config::{GameConfig, GameConfigData, MatchRules, UnitProductionData};
    pub use crate::economy::{LedgerError, ResourceKind, ResourceLedger, Resources};
    pub use crate::error::{GameError, Result};
    pub use crate::health::{HealthStage, HealthStageTable, StageTransition};
    pub use crate::match_state::{MatchEvent, MatchOutcome, MatchPhase};
    pub use crate::math::{Fixed, Millis, Vec2Fixed};
    pub use crate::simulation::{Action, Simulation, TickEvents, TICK_DURATION_MS, TICK_RATE};
    pub use crate::snapshot::StateSnapshot;
}
