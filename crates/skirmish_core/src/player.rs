//! Per-player records.

use serde::{Deserialize, Serialize};

use crate::components::PlayerId;
use crate::economy::{ResourceLedger, Resources};

/// A connected player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Player id.
    pub id: PlayerId,
    /// Balances and reservations.
    pub ledger: ResourceLedger,
    /// Cumulative score: total resources spent on completed units.
    pub score: u64,
    /// Units owned that are not dead. Refreshed every tick.
    pub alive_units: u32,
    /// Whether available resources meet the cheapest-unit floor. Refreshed
    /// every tick.
    pub can_afford_cheapest: bool,
    /// Set when the match starts; cleared on reset.
    pub gameplay_enabled: bool,
}

impl Player {
    /// Create a player with a starting balance.
    #[must_use]
    pub const fn new(id: PlayerId, starting: Resources) -> Self {
        Self {
            id,
            ledger: ResourceLedger::new(starting),
            score: 0,
            alive_units: 0,
            can_afford_cheapest: false,
            gameplay_enabled: false,
        }
    }
}
