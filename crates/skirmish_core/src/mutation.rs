//! The per-tick mutation log.
//!
//! Validated inputs become [`Mutation`] records appended to a
//! [`MutationLog`]. The log is applied once per tick, in recorded order, and
//! that is the only place client intent reaches the live state.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::components::{BuildingId, PlayerId, Stance, UnitId};
use crate::config::GameConfig;
use crate::economy::Resources;
use crate::error::{GameError, Result};
use crate::match_state::MatchState;
use crate::math::{Millis, Vec2Fixed};
use crate::production::PendingProduction;
use crate::simulation::TickEvents;
use crate::unit::Unit;
use crate::world::World;

/// One state change, already validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    /// Move the match to `GameActive` and enable gameplay for everyone.
    StartMatch {
        /// Player who asked.
        issuer: PlayerId,
    },
    /// Reserve `cost` from `owner` and queue a production at `building`.
    EnqueueProduction {
        /// Producing building.
        building: BuildingId,
        /// Paying player.
        owner: PlayerId,
        /// Cost snapshot to reserve.
        cost: Resources,
        /// Countdown length.
        build_time: Millis,
    },
    /// Create a unit immediately.
    SpawnUnit {
        /// Owner of the new unit.
        owner: PlayerId,
        /// Where it appears.
        position: Vec2Fixed,
    },
    /// Assign a stance.
    SetStance {
        /// Target unit.
        unit: UnitId,
        /// New stance.
        stance: Stance,
    },
    /// Assign a rally point.
    SetRallyPoint {
        /// Target building.
        building: BuildingId,
        /// New rally point.
        position: Vec2Fixed,
    },
    /// Add to a unit's pending health delta.
    AdjustHealth {
        /// Target unit.
        unit: UnitId,
        /// Stage steps.
        delta: i32,
    },
}

/// A mutation with its position in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    /// Index within the tick's log.
    pub sequence: u32,
    /// The change.
    pub mutation: Mutation,
}

/// Append-only list of a tick's accepted mutations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationLog {
    records: Vec<MutationRecord>,
}

impl MutationLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mutation.
    pub fn push(&mut self, mutation: Mutation) {
        let sequence = u32::try_from(self.records.len()).unwrap_or(u32::MAX);
        self.records.push(MutationRecord { sequence, mutation });
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if nothing was accepted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in order.
    pub fn iter(&self) -> impl Iterator<Item = &MutationRecord> {
        self.records.iter()
    }

    /// Apply every record, in order, to the live state.
    ///
    /// Validation has already guaranteed each record applies cleanly, so
    /// any failure here is a defect and is returned as a fatal error.
    pub fn apply(
        self,
        world: &mut World,
        match_state: &mut MatchState,
        config: &GameConfig,
        tick: u64,
        events: &mut TickEvents,
    ) -> Result<()> {
        for record in self.records {
            trace!(tick, sequence = record.sequence, mutation = ?record.mutation, "Applying");
            apply_one(record.mutation, world, match_state, config, tick, events)?;
        }
        Ok(())
    }
}

fn apply_one(
    mutation: Mutation,
    world: &mut World,
    match_state: &mut MatchState,
    config: &GameConfig,
    tick: u64,
    events: &mut TickEvents,
) -> Result<()> {
    let violation = |detail: String| GameError::InvariantViolation { tick, detail };

    match mutation {
        Mutation::StartMatch { issuer } => {
            let participants = world.players.keys().copied().collect();
            let started = match_state
                .start(issuer, participants, config.rules().start_grace_ms)
                .ok_or_else(|| violation("start applied outside WaitingForPlayers".to_owned()))?;
            for player in world.players.values_mut() {
                player.gameplay_enabled = true;
            }
            events.match_events.extend(started);
        }

        Mutation::EnqueueProduction {
            building,
            owner,
            cost,
            build_time,
        } => {
            let player = world
                .players
                .get_mut(&owner)
                .ok_or_else(|| violation(format!("production owner {owner:?} vanished")))?;
            let record = world
                .buildings
                .get_mut(building)
                .ok_or_else(|| violation(format!("building {building:?} vanished")))?;
            if record.queue.is_full() {
                return Err(violation(format!("queue of {building:?} overfilled")));
            }
            player
                .ledger
                .reserve_cost(&cost)
                .map_err(|source| GameError::LedgerViolation { tick, source })?;
            let production =
                PendingProduction::new(building, owner, record.spawn_position(), build_time, cost);
            record
                .queue
                .push(production)
                .map_err(|_| violation(format!("queue of {building:?} overfilled")))?;
            events.queued.push(building);
        }

        Mutation::SpawnUnit { owner, position } => {
            let stage = config.rules().default_stage;
            let unit = world
                .units
                .insert_with(|_| Unit::new(owner, position, stage));
            events.spawned.push(unit);
        }

        Mutation::SetStance { unit, stance } => {
            let record = world
                .units
                .get_mut(unit)
                .ok_or_else(|| violation(format!("unit {unit:?} vanished")))?;
            record.stance = stance;
        }

        Mutation::SetRallyPoint { building, position } => {
            let record = world
                .buildings
                .get_mut(building)
                .ok_or_else(|| violation(format!("building {building:?} vanished")))?;
            record.set_rally_point(position);
        }

        Mutation::AdjustHealth { unit, delta } => {
            let record = world
                .units
                .get_mut(unit)
                .ok_or_else(|| violation(format!("unit {unit:?} vanished")))?;
            record.health.accumulate(delta);
        }
    }
    Ok(())
}
