//! Unit records.

use serde::{Deserialize, Serialize};

use crate::components::{PlayerId, Stance};
use crate::health::{HealthStage, HealthStageTable, UnitHealth};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// A live unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Owning player.
    pub owner: PlayerId,
    /// World position.
    pub position: Vec2Fixed,
    /// Combat posture.
    pub stance: Stance,
    /// Health stage machine.
    pub health: UnitHealth,
    /// Movement speed multiplier derived from the health stage.
    #[serde(with = "fixed_serde")]
    pub speed_multiplier: Fixed,
}

impl Unit {
    /// Create a unit at `stage` with the default stance and full speed.
    #[must_use]
    pub fn new(owner: PlayerId, position: Vec2Fixed, stage: HealthStage) -> Self {
        Self {
            owner,
            position,
            stance: Stance::default(),
            health: UnitHealth::new(stage),
            speed_multiplier: Fixed::from_num(1),
        }
    }

    /// Whether the unit counts towards its owner's alive total.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        !self.health.stage().is_dead()
    }

    /// Recompute the speed multiplier. Without a table the current value
    /// is kept.
    pub fn refresh_speed(&mut self, table: Option<&HealthStageTable>) {
        if let Some(table) = table {
            self.speed_multiplier = table.speed_multiplier(self.health.stage());
        }
    }
}
