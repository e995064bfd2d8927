//! Replay system for recording and playing back matches.
//!
//! A replay stores the configuration source, the simulation state when
//! recording began, and every [`Action`] performed afterwards tagged with
//! the tick that followed it. Performing the same actions before the same
//! ticks reproduces the match exactly, which [`ReplayPlayer::verify`]
//! checks against the recorded final state hash.
//!
//! Lifecycle actions that failed while recording fail identically on
//! playback, so their errors are logged and skipped.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::command::TickInput;
use crate::config::GameConfig;
use crate::error::{GameError, Result};
use crate::math::Millis;
use crate::simulation::{Action, Simulation};

/// A single recorded action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayRecord {
    /// Tick that ran after the action.
    pub tick: u64,
    /// The action.
    pub action: Action,
}

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Complete replay data structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Scenario identifier or name.
    pub scenario_id: String,
    /// RON configuration the match ran with.
    pub config_source: String,
    /// Elapsed time passed to every tick.
    pub tick_ms: Millis,
    /// Serialized simulation state when recording began.
    pub initial_state: Vec<u8>,
    /// Actions in submission order.
    pub records: Vec<ReplayRecord>,
    /// Tick count when recording stopped.
    pub final_tick: u64,
    /// Final state hash for verification.
    pub final_hash: u64,
}

impl Replay {
    /// Start a replay from the current state of `initial`.
    ///
    /// # Errors
    /// Returns an error if the simulation state cannot be serialized.
    pub fn new(
        scenario_id: impl Into<String>,
        config_source: impl Into<String>,
        tick_ms: Millis,
        initial: &Simulation,
    ) -> Result<Self> {
        Ok(Self {
            version: REPLAY_VERSION,
            scenario_id: scenario_id.into(),
            config_source: config_source.into(),
            tick_ms,
            initial_state: initial.serialize()?,
            records: Vec::new(),
            final_tick: initial.current_tick(),
            final_hash: initial.state_hash(),
        })
    }

    /// Record an action performed before `tick`.
    pub fn record(&mut self, tick: u64, action: Action) {
        self.records.push(ReplayRecord { tick, action });
    }

    /// Record an input consumed by `tick`.
    pub fn record_input(&mut self, tick: u64, input: TickInput) {
        self.record(tick, Action::Input(input));
    }

    /// Finalize the replay with end-of-match state.
    pub fn finalize(&mut self, final_tick: u64, final_hash: u64) {
        self.final_tick = final_tick;
        self.final_hash = final_hash;
    }

    /// Encode with bincode.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::Serialization(format!("Failed to serialize replay: {e}")))
    }

    /// Decode from bincode, checking the format version.
    ///
    /// # Errors
    /// Returns an error if deserialization fails or the version differs.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let replay: Self = bincode::deserialize(bytes)
            .map_err(|e| GameError::Serialization(format!("Failed to deserialize replay: {e}")))?;

        if replay.version != REPLAY_VERSION {
            return Err(GameError::Serialization(format!(
                "Replay version mismatch: expected {}, got {}",
                REPLAY_VERSION, replay.version
            )));
        }
        Ok(replay)
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), bytes)
            .map_err(|e| GameError::Serialization(format!("Failed to write replay file: {e}")))
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    /// Returns an error if file reading or deserialization fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| GameError::Serialization(format!("Failed to read replay file: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Rebuild the simulation as it was when recording began.
    ///
    /// # Errors
    /// Returns an error if the configuration or state cannot be restored.
    pub fn restore_initial_state(&self) -> Result<Simulation> {
        let config = GameConfig::from_ron_str(&self.config_source, &self.scenario_id)?;
        Simulation::deserialize(Arc::new(config), &self.initial_state)
    }

    /// Actions performed before a specific tick.
    #[must_use]
    pub fn records_at_tick(&self, tick: u64) -> Vec<&ReplayRecord> {
        self.records.iter().filter(|r| r.tick == tick).collect()
    }

    /// Total number of recorded actions.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

/// Replay playback controller.
#[derive(Debug)]
pub struct ReplayPlayer {
    replay: Replay,
    simulation: Simulation,
    /// Index into the action stream.
    record_index: usize,
}

impl ReplayPlayer {
    /// Create a new replay player from a replay.
    ///
    /// # Errors
    /// Returns an error if the initial state cannot be restored.
    pub fn new(replay: Replay) -> Result<Self> {
        let simulation = replay.restore_initial_state()?;
        Ok(Self {
            replay,
            simulation,
            record_index: 0,
        })
    }

    /// Advance playback by one tick.
    ///
    /// Returns `true` while there are more ticks to play.
    ///
    /// # Errors
    /// Propagates fatal simulation errors.
    pub fn advance(&mut self) -> Result<bool> {
        if self.is_finished() {
            return Ok(false);
        }

        let tick = self.simulation.current_tick();
        while let Some(record) = self.replay.records.get(self.record_index) {
            if record.tick > tick {
                break;
            }
            if record.tick < tick {
                warn!(recorded = record.tick, tick, "Skipping action recorded for a past tick");
            } else if let Err(e) = self.simulation.perform(&record.action) {
                if e.is_fatal() {
                    return Err(e);
                }
                debug!(tick, error = %e, "Recorded action failed again");
            }
            self.record_index += 1;
        }

        self.simulation.tick(self.replay.tick_ms)?;
        Ok(!self.is_finished())
    }

    /// Seek to a specific tick, restarting from the initial state.
    ///
    /// # Errors
    /// Returns an error if state restoration fails.
    pub fn seek(&mut self, target_tick: u64) -> Result<()> {
        self.simulation = self.replay.restore_initial_state()?;
        self.record_index = 0;
        while self.simulation.current_tick() < target_tick && self.advance()? {}
        Ok(())
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.simulation.current_tick()
    }

    /// Current simulation state.
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// The replay being played.
    #[must_use]
    pub const fn replay(&self) -> &Replay {
        &self.replay
    }

    /// Check if playback reached the recorded final tick.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.simulation.current_tick() >= self.replay.final_tick
    }

    /// Progress as a percentage (0-100).
    #[must_use]
    pub fn progress_percent(&self) -> u32 {
        if self.replay.final_tick == 0 {
            100
        } else {
            let done = self.simulation.current_tick().min(self.replay.final_tick);
            u32::try_from(done * 100 / self.replay.final_tick).unwrap_or(100)
        }
    }

    /// Play to the end and compare the final state hash.
    ///
    /// # Errors
    /// Returns [`GameError::ReplayDesync`] on a hash mismatch.
    pub fn verify(&mut self) -> Result<()> {
        self.seek(self.replay.final_tick)?;
        let replayed = self.simulation.state_hash();
        if replayed != self.replay.final_hash {
            return Err(GameError::ReplayDesync {
                tick: self.replay.final_tick,
                recorded: self.replay.final_hash,
                replayed,
            });
        }
        debug!(tick = self.replay.final_tick, hash = replayed, "Replay verified");
        Ok(())
    }
}
