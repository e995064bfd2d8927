//! Fixed-point math and time units.
//!
//! Multipliers and positions are fixed-point; every countdown in the
//! simulation (production, despawn, match grace periods) is whole
//! milliseconds. Identical command streams therefore produce bit-identical
//! state on every host.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// 32 integer bits, 32 fractional bits.
pub type Fixed = I32F32;

/// Simulation time in whole milliseconds.
pub type Millis = u32;

/// Convert an integer percentage (100 = 1.0) to a fixed multiplier.
#[must_use]
pub fn percent_to_multiplier(percent: u32) -> Fixed {
    Fixed::from_num(percent) / Fixed::from_num(100)
}

/// Fixed-point 2D position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

impl Vec2Fixed {
    /// Origin.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from whole-number coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Hash the raw bit pattern of both coordinates.
    pub fn hash_bits<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_i64(self.x.to_bits());
        state.write_i64(self.y.to_bits());
    }
}

/// Serde support for fixed-point numbers.
///
/// Values travel as their raw `i64` bit pattern so replays and snapshots
/// keep exact precision.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bits.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bits.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}
