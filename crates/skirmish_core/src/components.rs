//! Identifiers, shared enums and entity storage.
//!
//! Entities live in [`EntityStorage`] arenas keyed by stable integer ids.
//! Ids are handed out monotonically and never reused, so a stale id held by
//! a client simply fails to resolve instead of aliasing a newer entity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier of a connected player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

/// Identifier of a placed building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildingId(pub u64);

/// Identifier of a live unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub u64);

impl From<u64> for BuildingId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<u64> for UnitId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Combat posture a unit's owner can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Stance {
    /// Engage anything in range and pursue.
    #[default]
    Aggressive,
    /// Return fire, do not pursue.
    Defensive,
    /// Never move from the current position.
    HoldGround,
}

/// Arena of entity records keyed by a stable id.
///
/// Iteration is always in ascending id order, which keeps every system
/// that walks the arena deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityStorage<K: Ord, T> {
    /// Records by id.
    entries: BTreeMap<K, T>,
    /// Next raw id to assign.
    next_id: u64,
}

impl<K, T> EntityStorage<K, T>
where
    K: Copy + Ord + From<u64>,
{
    /// Create empty storage. The first id handed out is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Insert a record built from its freshly allocated id.
    pub fn insert_with(&mut self, build: impl FnOnce(K) -> T) -> K {
        let id = K::from(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, build(id));
        id
    }

    /// Remove a record.
    pub fn remove(&mut self, id: K) -> Option<T> {
        self.entries.remove(&id)
    }

    /// Get a record.
    #[must_use]
    pub fn get(&self, id: K) -> Option<&T> {
        self.entries.get(&id)
    }

    /// Get a record mutably.
    pub fn get_mut(&mut self, id: K) -> Option<&mut T> {
        self.entries.get_mut(&id)
    }

    /// Check whether a record exists.
    #[must_use]
    pub fn contains(&self, id: K) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<K> {
        self.entries.keys().copied().collect()
    }

    /// Iterate in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &T)> {
        self.entries.iter()
    }

    /// Iterate mutably in ascending id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut T)> {
        self.entries.iter_mut()
    }

    /// Keep only the records for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &mut T) -> bool) {
        self.entries.retain(|id, record| keep(id, record));
    }
}

impl<K, T> Default for EntityStorage<K, T>
where
    K: Copy + Ord + From<u64>,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_never_reused() {
        let mut storage: EntityStorage<UnitId, &str> = EntityStorage::new();
        let a = storage.insert_with(|_| "a");
        let b = storage.insert_with(|_| "b");
        assert_eq!(a, UnitId(1));
        assert_eq!(b, UnitId(2));

        storage.remove(a);
        let c = storage.insert_with(|_| "c");
        assert_eq!(c, UnitId(3));
        assert!(storage.get(a).is_none());
    }

    #[test]
    fn test_iteration_is_sorted() {
        let mut storage: EntityStorage<BuildingId, u32> = EntityStorage::new();
        for n in 0..5 {
            storage.insert_with(|_| n);
        }
        storage.remove(BuildingId(2));
        assert_eq!(
            storage.ids(),
            vec![BuildingId(1), BuildingId(3), BuildingId(4), BuildingId(5)]
        );
    }

    #[test]
    fn test_insert_with_sees_own_id() {
        let mut storage: EntityStorage<UnitId, UnitId> = EntityStorage::new();
        let id = storage.insert_with(|id| id);
        assert_eq!(storage.get(id), Some(&id));
    }
}
