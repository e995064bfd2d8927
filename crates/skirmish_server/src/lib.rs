//! # Skirmish Dedicated Server
//!
//! Headless host for a single match.
//!
//! Runs the authoritative simulation on a fixed tick interval, feeding it
//! the actions that arrive on an inbox channel and publishing a state
//! snapshot after every tick. Transport and lobby handling live elsewhere;
//! they talk to the server through a [`ServerHandle`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod host;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use skirmish_core::prelude::*;
use std::result::Result;
use thiserror::Error;

pub use host::{GameServer, ServerHandle, ServerMessage, ServerSummary, StopReason};

/// Errors raised by the server crate.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Reading or writing a file failed.
    #[error("Failed to access '{}': {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Error from the simulation core.
    #[error(transparent)]
    Game(#[from] GameError),

    /// Tick rate outside the supported range.
    #[error("Invalid tick rate {0}: must be between 1 and 1000")]
    InvalidTickRate(u32),

    /// Snapshot encoding failed.
    #[error("Failed to encode snapshot: {0}")]
    Json(#[from] serde_json::Error),

    /// The server loop is no longer running.
    #[error("Server has stopped")]
    Stopped,
}

/// Server runtime settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// RON game configuration file.
    pub config_path: PathBuf,
    /// Ticks per second.
    pub tick_rate: u32,
    /// Stop after this many ticks.
    pub max_ticks: Option<u64>,
    /// Wait for the wall clock between ticks. When off, ticks run back to
    /// back.
    pub paced: bool,
    /// Record a replay of the run.
    pub record_replay: bool,
    /// Capacity of the action inbox.
    pub inbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/default.ron"),
            tick_rate: TICK_RATE,
            max_ticks: None,
            paced: true,
            record_replay: false,
            inbox_capacity: 1024,
        }
    }
}

impl ServerConfig {
    /// Simulated milliseconds per tick.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidTickRate`] unless the rate is in
    /// `1..=1000`.
    pub fn tick_ms(&self) -> Result<Millis, ServerError> {
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(ServerError::InvalidTickRate(self.tick_rate));
        }
        Ok(1000 / self.tick_rate)
    }
}

/// A parsed game configuration together with its source text.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Validated configuration.
    pub config: Arc<GameConfig>,
    /// RON source, kept for replays.
    pub source: String,
    /// Where it came from.
    pub label: String,
}

/// Read and validate a RON game configuration file.
///
/// # Errors
///
/// Returns [`ServerError::Io`] if the file cannot be read and
/// [`ServerError::Game`] if it does not parse or validate.
pub fn load_config(path: &Path) -> Result<LoadedConfig, ServerError> {
    let source = std::fs::read_to_string(path).map_err(|source| ServerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let label = path.display().to_string();
    let config = GameConfig::from_ron_str(&source, &label)?;
    tracing::debug!(path = %label, units = config.unit_ids().count(), "Loaded game config");
    Ok(LoadedConfig {
        config: Arc::new(config),
        source,
        label,
    })
}

/// Actions that seat `players` players, give each one building and start
/// the match.
///
/// Player ids run from 1. Every building produces the first configured unit
/// type, and players are spread along the diagonal 100 units apart.
#[must_use]
pub fn bootstrap_actions(config: &GameConfig, players: u32) -> Vec<Action> {
    let Some(unit_type) = config.unit_ids().next() else {
        return Vec::new();
    };

    let mut actions = Vec::new();
    for n in 1..=players {
        actions.push(Action::Connect(PlayerId(n)));
    }
    for n in 1..=players {
        let offset = i32::try_from(n).unwrap_or(i32::MAX / 100).saturating_mul(100);
        actions.push(Action::PlaceBuilding {
            owner: PlayerId(n),
            position: Vec2Fixed::from_ints(offset, offset),
            unit_type: unit_type.to_owned(),
        });
    }
    if players > 0 {
        actions.push(Action::Input(TickInput::Command(CommandRequest::new(
            PlayerId(1),
            ClientCommand::StartMatch,
        ))));
    }
    actions
}
