//! Buildings and their production queues.
//!
//! Every queued production already holds a ledger reservation for its cost.
//! Only the head of the queue counts down; entries behind it wait with
//! their reservation intact. When the head finishes, the simulation commits
//! its reservation and spawns the unit, and the next entry starts a fresh
//! countdown.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::components::{BuildingId, PlayerId};
use crate::config::UnitProduction;
use crate::economy::Resources;
use crate::math::{Millis, Vec2Fixed};

/// A unit being (or waiting to be) produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingProduction {
    /// Building producing the unit.
    pub building: BuildingId,
    /// Player who paid for it.
    pub owner: PlayerId,
    /// Where the unit will appear.
    pub spawn_position: Vec2Fixed,
    /// Countdown left. Always `<= total`.
    pub remaining: Millis,
    /// Full countdown length.
    pub total: Millis,
    /// Cost snapshot reserved at enqueue time.
    pub reserved: Resources,
}

impl PendingProduction {
    /// Create a production with a full countdown.
    #[must_use]
    pub const fn new(
        building: BuildingId,
        owner: PlayerId,
        spawn_position: Vec2Fixed,
        total: Millis,
        reserved: Resources,
    ) -> Self {
        Self {
            building,
            owner,
            spawn_position,
            remaining: total,
            total,
            reserved,
        }
    }

    /// Check whether the countdown has run out.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    /// Progress as a percentage (0-100).
    #[must_use]
    pub fn percentage(&self) -> u32 {
        if self.total == 0 {
            100
        } else {
            ((self.total - self.remaining) as u64 * 100 / self.total as u64) as u32
        }
    }
}

/// FIFO of pending productions for one building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionQueue {
    queue: VecDeque<PendingProduction>,
    max_len: usize,
}

impl ProductionQueue {
    /// Create an empty queue holding at most `max_len` entries.
    #[must_use]
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            max_len,
        }
    }

    /// Check if the queue is full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.max_len
    }

    /// Check if the queue is empty (the building is idle).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of entries, active one included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn max_len(&self) -> usize {
        self.max_len
    }

    /// The entry currently counting down.
    #[must_use]
    pub fn active(&self) -> Option<&PendingProduction> {
        self.queue.front()
    }

    /// All entries in enqueue order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingProduction> {
        self.queue.iter()
    }

    /// Append an entry. Callers check [`is_full`](Self::is_full) first;
    /// an entry pushed onto a full queue is handed back.
    pub fn push(&mut self, production: PendingProduction) -> Result<(), PendingProduction> {
        if self.is_full() {
            return Err(production);
        }
        self.queue.push_back(production);
        Ok(())
    }

    /// Count the active entry down by `elapsed`.
    ///
    /// Returns the finished entry, already removed from the queue, when the
    /// countdown reaches zero. The entry behind it becomes active but does
    /// not start counting until the next call.
    pub fn advance(&mut self, elapsed: Millis) -> Option<PendingProduction> {
        let active = self.queue.front_mut()?;
        active.remaining = active.remaining.saturating_sub(elapsed);
        if active.is_complete() {
            self.queue.pop_front()
        } else {
            None
        }
    }

    /// Point every queued entry at a new spawn position.
    pub fn retarget(&mut self, spawn_position: Vec2Fixed) {
        for entry in &mut self.queue {
            entry.spawn_position = spawn_position;
        }
    }

    /// Remove every entry, active one first, in enqueue order.
    pub fn drain_all(&mut self) -> Vec<PendingProduction> {
        self.queue.drain(..).collect()
    }
}

/// A production building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    /// Player who owns the building.
    pub owner: PlayerId,
    /// World position.
    pub position: Vec2Fixed,
    /// Unit type key this building produces.
    pub unit_type: String,
    /// Cost and duration of one unit, fixed at placement.
    pub production: UnitProduction,
    /// Where produced units appear; the building position when unset.
    pub rally_point: Option<Vec2Fixed>,
    /// Pending productions.
    pub queue: ProductionQueue,
}

impl Building {
    /// Create an idle building.
    #[must_use]
    pub fn new(
        owner: PlayerId,
        position: Vec2Fixed,
        unit_type: impl Into<String>,
        production: UnitProduction,
        max_queue_len: usize,
    ) -> Self {
        Self {
            owner,
            position,
            unit_type: unit_type.into(),
            production,
            rally_point: None,
            queue: ProductionQueue::with_max_len(max_queue_len),
        }
    }

    /// Where a unit finished right now would appear.
    #[must_use]
    pub fn spawn_position(&self) -> Vec2Fixed {
        self.rally_point.unwrap_or(self.position)
    }

    /// Set the rally point and redirect queued productions to it.
    pub fn set_rally_point(&mut self, point: Vec2Fixed) {
        self.rally_point = Some(point);
        self.queue.retarget(point);
    }

    /// Whether a production is currently counting down.
    #[must_use]
    pub fn is_producing(&self) -> bool {
        !self.queue.is_empty()
    }
}
