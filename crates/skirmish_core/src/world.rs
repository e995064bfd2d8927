//! The live entity store mutated by the tick.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{BuildingId, EntityStorage, PlayerId, UnitId};
use crate::player::Player;
use crate::production::Building;
use crate::unit::Unit;

/// Every player, building and unit in the match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct World {
    /// Connected players by id.
    pub players: BTreeMap<PlayerId, Player>,
    /// Placed buildings.
    pub buildings: EntityStorage<BuildingId, Building>,
    /// Live units.
    pub units: EntityStorage<UnitId, Unit>,
}

impl World {
    /// Create an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `player` owns `building`.
    #[must_use]
    pub fn owns_building(&self, player: PlayerId, building: BuildingId) -> bool {
        self.buildings
            .get(building)
            .is_some_and(|b| b.owner == player)
    }

    /// Buildings owned by `player`, ascending id.
    #[must_use]
    pub fn buildings_of(&self, player: PlayerId) -> Vec<BuildingId> {
        self.buildings
            .iter()
            .filter(|(_, b)| b.owner == player)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Living units per player.
    #[must_use]
    pub fn alive_unit_counts(&self) -> BTreeMap<PlayerId, u32> {
        let mut counts = BTreeMap::new();
        for (_, unit) in self.units.iter().filter(|(_, u)| u.is_alive()) {
            *counts.entry(unit.owner).or_insert(0) += 1;
        }
        counts
    }
}
