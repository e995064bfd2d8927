//! Publishable views of the simulation state.
//!
//! Snapshots are plain serde data taken between ticks. Downstream
//! replication encodes them however it likes; the server emits JSON.

use serde::{Deserialize, Serialize};

use crate::components::{BuildingId, PlayerId, Stance, UnitId};
use crate::economy::Resources;
use crate::health::HealthStage;
use crate::match_state::{MatchOutcome, MatchPhase};
use crate::math::{fixed_serde, Fixed, Millis, Vec2Fixed};
use crate::simulation::Simulation;

/// Per-player economy and score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Player id.
    pub id: PlayerId,
    /// Total balance.
    pub balance: Resources,
    /// Balance minus reservations.
    pub available: Resources,
    /// Held for queued productions.
    pub reserved: Resources,
    /// Cumulative score.
    pub score: u64,
    /// Living units.
    pub alive_units: u32,
    /// Whether gameplay is enabled.
    pub gameplay_enabled: bool,
}

/// Per-building production view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingSnapshot {
    /// Building id.
    pub id: BuildingId,
    /// Owning player.
    pub owner: PlayerId,
    /// Unit type produced.
    pub unit_type: String,
    /// Entries queued, active one included.
    pub queue_len: usize,
    /// Whether a production is counting down.
    pub active: bool,
    /// Progress of the active production (0-100).
    pub progress_percent: u32,
    /// Rally point, if set.
    pub rally_point: Option<Vec2Fixed>,
}

/// Per-unit view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    /// Unit id.
    pub id: UnitId,
    /// Owning player.
    pub owner: PlayerId,
    /// World position.
    pub position: Vec2Fixed,
    /// Current health stage.
    pub stage: HealthStage,
    /// Speed multiplier from the stage table.
    #[serde(with = "fixed_serde")]
    pub speed_multiplier: Fixed,
    /// Combat posture.
    pub stance: Stance,
}

/// Match phase view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    /// Current phase.
    pub phase: MatchPhase,
    /// Remaining start grace.
    pub start_timer_ms: Millis,
    /// Remaining end grace.
    pub end_timer_ms: Millis,
    /// Winner, if decided outright.
    pub winner: Option<PlayerId>,
    /// Decided outcome, draws included.
    pub outcome: Option<MatchOutcome>,
}

/// Everything a client needs to render the match after a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Ticks completed.
    pub tick: u64,
    /// Players, ascending id.
    pub players: Vec<PlayerSnapshot>,
    /// Buildings, ascending id.
    pub buildings: Vec<BuildingSnapshot>,
    /// Units, ascending id.
    pub units: Vec<UnitSnapshot>,
    /// Match state.
    #[serde(rename = "match")]
    pub match_state: MatchSnapshot,
}

impl StateSnapshot {
    /// Capture the current state of `sim`.
    #[must_use]
    pub fn capture(sim: &Simulation) -> Self {
        let world = sim.world();

        let players = world
            .players
            .values()
            .map(|p| PlayerSnapshot {
                id: p.id,
                balance: p.ledger.balance(),
                available: p.ledger.available(),
                reserved: p.ledger.reserved(),
                score: p.score,
                alive_units: p.alive_units,
                gameplay_enabled: p.gameplay_enabled,
            })
            .collect();

        let buildings = world
            .buildings
            .iter()
            .map(|(&id, b)| BuildingSnapshot {
                id,
                owner: b.owner,
                unit_type: b.unit_type.clone(),
                queue_len: b.queue.len(),
                active: b.is_producing(),
                progress_percent: b.queue.active().map_or(0, |p| p.percentage()),
                rally_point: b.rally_point,
            })
            .collect();

        let units = world
            .units
            .iter()
            .map(|(&id, u)| UnitSnapshot {
                id,
                owner: u.owner,
                position: u.position,
                stage: u.health.stage(),
                speed_multiplier: u.speed_multiplier,
                stance: u.stance,
            })
            .collect();

        let state = sim.match_state();
        Self {
            tick: sim.current_tick(),
            players,
            buildings,
            units,
            match_state: MatchSnapshot {
                phase: state.phase(),
                start_timer_ms: state.start_timer(),
                end_timer_ms: state.end_timer(),
                winner: state.winner(),
                outcome: state.outcome(),
            },
        }
    }

    /// Look up a player's entry.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&PlayerSnapshot> {
        self.players.iter().find(|p| p.id == id)
    }
}
