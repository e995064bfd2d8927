//! Resource ledger with a reserve/commit/release protocol.
//!
//! A production does not spend resources when it is queued. It *reserves*
//! them: the amount leaves `available` but stays in `balance` until the
//! production completes (`commit`) or is cancelled (`release`). The ledger
//! only ever touches a single player's numbers, so no cross-player
//! coordination is required. The one invariant it guards is
//! `reserved <= balance` for every resource kind.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The two resource kinds a player stockpiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Raw material gathered from the map.
    Feedstock,
    /// Power produced by generators.
    Energy,
}

impl ResourceKind {
    /// Every resource kind, in ledger order.
    pub const ALL: [Self; 2] = [Self::Feedstock, Self::Energy];
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Feedstock => write!(f, "feedstock"),
            Self::Energy => write!(f, "energy"),
        }
    }
}

/// An amount of each resource kind (a cost, a balance, a reservation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resources {
    /// Feedstock amount.
    #[serde(default)]
    pub feedstock: u32,
    /// Energy amount.
    #[serde(default)]
    pub energy: u32,
}

impl Resources {
    /// Nothing of anything.
    pub const ZERO: Self = Self {
        feedstock: 0,
        energy: 0,
    };

    /// Create a resource bundle.
    #[must_use]
    pub const fn new(feedstock: u32, energy: u32) -> Self {
        Self { feedstock, energy }
    }

    /// Amount of one kind.
    #[must_use]
    pub const fn get(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::Feedstock => self.feedstock,
            ResourceKind::Energy => self.energy,
        }
    }

    fn get_mut(&mut self, kind: ResourceKind) -> &mut u32 {
        match kind {
            ResourceKind::Feedstock => &mut self.feedstock,
            ResourceKind::Energy => &mut self.energy,
        }
    }

    /// Sum over all kinds (used for scoring).
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.feedstock as u64 + self.energy as u64
    }

    /// True when every kind is at least the matching amount in `floor`.
    #[must_use]
    pub fn covers(&self, floor: &Self) -> bool {
        ResourceKind::ALL
            .iter()
            .all(|&kind| self.get(kind) >= floor.get(kind))
    }
}

/// Ledger failures.
///
/// `InsufficientResources` is an ordinary rejection. The other variants mean
/// the caller asked to spend or free more than it had reserved, which valid
/// call sequences never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Not enough unreserved balance.
    #[error("insufficient {kind}: requested {requested}, available {available}")]
    InsufficientResources {
        /// Resource kind.
        kind: ResourceKind,
        /// Amount requested.
        requested: u32,
        /// Amount available.
        available: u32,
    },

    /// Commit larger than the outstanding reservation.
    #[error("commit of {amount} {kind} exceeds reservation of {reserved}")]
    CommitExceedsReservation {
        /// Resource kind.
        kind: ResourceKind,
        /// Amount being committed.
        amount: u32,
        /// Outstanding reservation.
        reserved: u32,
    },

    /// Release larger than the outstanding reservation.
    #[error("release of {amount} {kind} exceeds reservation of {reserved}")]
    ReleaseExceedsReservation {
        /// Resource kind.
        kind: ResourceKind,
        /// Amount being released.
        amount: u32,
        /// Outstanding reservation.
        reserved: u32,
    },
}

impl LedgerError {
    /// True for the programming-error class (commit/release overdraw).
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::InsufficientResources { .. })
    }
}

/// A single player's balances and reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceLedger {
    balance: Resources,
    reserved: Resources,
}

impl ResourceLedger {
    /// Create a ledger with a starting balance and nothing reserved.
    #[must_use]
    pub const fn new(balance: Resources) -> Self {
        Self {
            balance,
            reserved: Resources::ZERO,
        }
    }

    /// Total stockpile, including reserved amounts.
    #[must_use]
    pub const fn balance(&self) -> Resources {
        self.balance
    }

    /// Amounts earmarked for pending productions.
    #[must_use]
    pub const fn reserved(&self) -> Resources {
        self.reserved
    }

    /// Unreserved stockpile.
    #[must_use]
    pub fn available(&self) -> Resources {
        Resources::new(
            self.available_of(ResourceKind::Feedstock),
            self.available_of(ResourceKind::Energy),
        )
    }

    /// Unreserved stockpile of one kind.
    #[must_use]
    pub const fn available_of(&self, kind: ResourceKind) -> u32 {
        // reserved <= balance always holds, so this cannot underflow.
        self.balance.get(kind) - self.reserved.get(kind)
    }

    /// Check whether `cost` could be reserved right now.
    #[must_use]
    pub fn can_afford(&self, cost: &Resources) -> bool {
        self.available().covers(cost)
    }

    /// Earmark `amount` of `kind`.
    ///
    /// Leaves the ledger untouched on failure.
    pub fn reserve(&mut self, kind: ResourceKind, amount: u32) -> Result<(), LedgerError> {
        let available = self.available_of(kind);
        if amount > available {
            return Err(LedgerError::InsufficientResources {
                kind,
                requested: amount,
                available,
            });
        }
        *self.reserved.get_mut(kind) += amount;
        Ok(())
    }

    /// Spend `amount` of `kind` out of an existing reservation.
    pub fn commit(&mut self, kind: ResourceKind, amount: u32) -> Result<(), LedgerError> {
        let reserved = self.reserved.get(kind);
        if amount > reserved {
            return Err(LedgerError::CommitExceedsReservation {
                kind,
                amount,
                reserved,
            });
        }
        *self.reserved.get_mut(kind) -= amount;
        *self.balance.get_mut(kind) -= amount;
        Ok(())
    }

    /// Return `amount` of `kind` from a reservation to the available pool.
    pub fn release(&mut self, kind: ResourceKind, amount: u32) -> Result<(), LedgerError> {
        let reserved = self.reserved.get(kind);
        if amount > reserved {
            return Err(LedgerError::ReleaseExceedsReservation {
                kind,
                amount,
                reserved,
            });
        }
        *self.reserved.get_mut(kind) -= amount;
        Ok(())
    }

    /// Reserve a multi-kind cost. All kinds succeed or nothing changes.
    pub fn reserve_cost(&mut self, cost: &Resources) -> Result<(), LedgerError> {
        for kind in ResourceKind::ALL {
            let available = self.available_of(kind);
            if cost.get(kind) > available {
                return Err(LedgerError::InsufficientResources {
                    kind,
                    requested: cost.get(kind),
                    available,
                });
            }
        }
        for kind in ResourceKind::ALL {
            self.reserve(kind, cost.get(kind))?;
        }
        Ok(())
    }

    /// Commit a multi-kind reservation. All kinds succeed or nothing changes.
    pub fn commit_cost(&mut self, cost: &Resources) -> Result<(), LedgerError> {
        for kind in ResourceKind::ALL {
            let reserved = self.reserved.get(kind);
            if cost.get(kind) > reserved {
                return Err(LedgerError::CommitExceedsReservation {
                    kind,
                    amount: cost.get(kind),
                    reserved,
                });
            }
        }
        for kind in ResourceKind::ALL {
            self.commit(kind, cost.get(kind))?;
        }
        Ok(())
    }

    /// Release a multi-kind reservation. All kinds succeed or nothing changes.
    pub fn release_cost(&mut self, cost: &Resources) -> Result<(), LedgerError> {
        for kind in ResourceKind::ALL {
            let reserved = self.reserved.get(kind);
            if cost.get(kind) > reserved {
                return Err(LedgerError::ReleaseExceedsReservation {
                    kind,
                    amount: cost.get(kind),
                    reserved,
                });
            }
        }
        for kind in ResourceKind::ALL {
            self.release(kind, cost.get(kind))?;
        }
        Ok(())
    }

    /// Credit income. Saturates instead of wrapping.
    pub fn deposit(&mut self, kind: ResourceKind, amount: u32) {
        let balance = self.balance.get_mut(kind);
        *balance = balance.saturating_add(amount);
    }
}
