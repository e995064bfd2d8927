//! Discrete health stages.
//!
//! Units do not carry hit points. Combat moves them up and down a five-step
//! ladder by integer deltas, and the stage alone drives the unit's movement
//! speed through a [`HealthStageTable`].

use serde::{Deserialize, Serialize};

use crate::components::UnitId;
use crate::error::{GameError, Result};
use crate::math::{percent_to_multiplier, Fixed, Millis};

/// Health stage, totally ordered from `Dead` to `Healthy`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum HealthStage {
    /// Terminal stage; arms the despawn countdown.
    Dead = 0,
    /// One hit from death.
    Critical = 1,
    /// Badly hurt.
    Wounded = 2,
    /// Scratched.
    Grazed = 3,
    /// Full health.
    #[default]
    Healthy = 4,
}

impl HealthStage {
    /// Every stage, lowest first.
    pub const ALL: [Self; 5] = [
        Self::Dead,
        Self::Critical,
        Self::Wounded,
        Self::Grazed,
        Self::Healthy,
    ];

    /// Numeric level (0..=4).
    #[must_use]
    pub const fn level(self) -> i32 {
        self as i32
    }

    /// Stage for a level, clamped into `[Dead, Healthy]`.
    #[must_use]
    pub const fn from_level_clamped(level: i64) -> Self {
        match level {
            i64::MIN..=0 => Self::Dead,
            1 => Self::Critical,
            2 => Self::Wounded,
            3 => Self::Grazed,
            _ => Self::Healthy,
        }
    }

    /// Stage reached by moving `delta` steps from `self`, clamped.
    #[must_use]
    pub const fn offset(self, delta: i32) -> Self {
        Self::from_level_clamped(self.level() as i64 + delta as i64)
    }

    /// Whether this is the terminal stage.
    #[must_use]
    pub const fn is_dead(self) -> bool {
        matches!(self, Self::Dead)
    }
}

/// One stage change, recorded when it happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    /// The unit that changed.
    pub unit: UnitId,
    /// Stage before the change.
    pub from: HealthStage,
    /// Stage after the change.
    pub to: HealthStage,
}

impl StageTransition {
    /// True when this transition is the one that killed the unit.
    #[must_use]
    pub const fn is_death(&self) -> bool {
        self.to.is_dead() && !self.from.is_dead()
    }
}

/// Per-unit health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitHealth {
    stage: HealthStage,
    previous_stage: HealthStage,
    /// Net delta accumulated since the last application.
    pending_delta: i32,
    /// Remaining grace time before removal, once dead.
    despawn_timer: Option<Millis>,
}

impl UnitHealth {
    /// New health state at `stage`.
    #[must_use]
    pub const fn new(stage: HealthStage) -> Self {
        Self {
            stage,
            previous_stage: stage,
            pending_delta: 0,
            despawn_timer: None,
        }
    }

    /// Current stage.
    #[must_use]
    pub const fn stage(&self) -> HealthStage {
        self.stage
    }

    /// Stage before the most recent transition.
    #[must_use]
    pub const fn previous_stage(&self) -> HealthStage {
        self.previous_stage
    }

    /// Net delta waiting to be applied.
    #[must_use]
    pub const fn pending_delta(&self) -> i32 {
        self.pending_delta
    }

    /// Remaining despawn grace, if the countdown is armed.
    #[must_use]
    pub const fn despawn_timer(&self) -> Option<Millis> {
        self.despawn_timer
    }

    /// Add to the delta that the next [`apply_pending`](Self::apply_pending)
    /// will apply.
    pub fn accumulate(&mut self, delta: i32) {
        self.pending_delta = self.pending_delta.saturating_add(delta);
    }

    /// Apply the accumulated delta and reset it to zero.
    pub fn apply_pending(&mut self, unit: UnitId, despawn_delay: Millis) -> Option<StageTransition> {
        let delta = std::mem::take(&mut self.pending_delta);
        self.apply_delta(unit, delta, despawn_delay)
    }

    /// Move the stage by `delta`, clamped to `[Dead, Healthy]`.
    ///
    /// A zero delta is skipped entirely. A clamped delta that leaves the
    /// stage where it was still records `previous_stage` but reports no
    /// transition. Entering `Dead` from any other stage arms the despawn
    /// countdown; once armed it is never disarmed.
    pub fn apply_delta(
        &mut self,
        unit: UnitId,
        delta: i32,
        despawn_delay: Millis,
    ) -> Option<StageTransition> {
        if delta == 0 {
            return None;
        }

        let from = self.stage;
        let to = from.offset(delta);
        self.previous_stage = from;
        self.stage = to;
        if from == to {
            return None;
        }

        let transition = StageTransition { unit, from, to };
        if transition.is_death() && self.despawn_timer.is_none() {
            self.despawn_timer = Some(despawn_delay);
        }
        Some(transition)
    }

    /// Advance the despawn countdown.
    ///
    /// Returns `true` once the countdown has elapsed and the unit should be
    /// removed.
    pub fn tick_despawn(&mut self, elapsed: Millis) -> bool {
        match self.despawn_timer.as_mut() {
            Some(remaining) => {
                *remaining = remaining.saturating_sub(elapsed);
                *remaining == 0
            }
            None => false,
        }
    }
}

/// One row of the stage table as written in data files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStageRow {
    /// Stage this row configures.
    pub stage: HealthStage,
    /// Movement speed multiplier in percent (100 = normal speed).
    pub speed_percent: u32,
}

/// Largest accepted `speed_percent` (ten times normal speed).
pub const MAX_SPEED_PERCENT: u32 = 1000;

/// Immutable stage to speed-multiplier lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStageTable {
    multipliers: [Fixed; 5],
}

impl HealthStageTable {
    /// Build a table from data rows.
    ///
    /// # Errors
    ///
    /// Returns an error if a stage is missing or listed twice, or if a
    /// speed exceeds [`MAX_SPEED_PERCENT`].
    pub fn from_rows(rows: &[HealthStageRow]) -> Result<Self> {
        let mut multipliers: [Option<Fixed>; 5] = [None; 5];
        for row in rows {
            let slot = &mut multipliers[row.stage as usize];
            if slot.is_some() {
                return Err(GameError::InvalidConfig(format!(
                    "health stage {:?} listed more than once",
                    row.stage
                )));
            }
            if row.speed_percent > MAX_SPEED_PERCENT {
                return Err(GameError::InvalidConfig(format!(
                    "health stage {:?} speed {}% exceeds {MAX_SPEED_PERCENT}%",
                    row.stage, row.speed_percent
                )));
            }
            *slot = Some(percent_to_multiplier(row.speed_percent));
        }

        let mut table = [Fixed::ZERO; 5];
        for stage in HealthStage::ALL {
            table[stage as usize] = multipliers[stage as usize].ok_or_else(|| {
                GameError::InvalidConfig(format!("health stage {stage:?} has no speed row"))
            })?;
        }
        Ok(Self { multipliers: table })
    }

    /// Speed multiplier for a stage.
    #[must_use]
    pub fn speed_multiplier(&self, stage: HealthStage) -> Fixed {
        self.multipliers[stage as usize]
    }
}
