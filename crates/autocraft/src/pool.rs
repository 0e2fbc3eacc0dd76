//! # Resource Pool
//!
//! The shared storage every demand in a job draws from. The resolver never
//! touches a pool directly while resolving: it works on a snapshot (see
//! [`crate::inventory::ResolutionInventory`]) and only the assignment pass moves
//! real resources.
//!
//! [`MemoryPool`] is a bounded in-memory pool with a fixed number of type slots,
//! used by hosts without their own storage and by tests.

use std::collections::BTreeMap;

use crate::resource::{Actionable, ActorContext, ResourceAmount, ResourceKey};

/// Real extract/inject primitives backing a resolution.
pub trait ResourcePool {
    /// Removes up to `request.amount` of `request.key`, returning how much was (or would be) removed.
    fn extract(&mut self, request: &ResourceAmount, mode: Actionable, actor: &ActorContext) -> i64;

    /// Stores up to `offer.amount` of `offer.key`, returning how much was (or would be) accepted.
    fn inject(&mut self, offer: &ResourceAmount, mode: Actionable, actor: &ActorContext) -> i64;

    /// Everything currently stored.
    fn stored(&self) -> Vec<ResourceAmount>;
}

/// Default number of distinct resource types a [`MemoryPool`] can hold.
pub const DEFAULT_TYPE_SLOTS: usize = 63;

/// A bounded in-memory pool.
///
/// Each distinct resource type occupies one slot; amounts per type are unbounded.
#[derive(Clone, Debug)]
pub struct MemoryPool {
    stored: BTreeMap<ResourceKey, i64>,
    type_slots: usize,
}

impl MemoryPool {
    /// Creates an empty pool with the default number of type slots.
    #[must_use]
    pub fn new() -> Self {
        Self::with_type_slots(DEFAULT_TYPE_SLOTS)
    }

    /// Creates an empty pool holding at most `type_slots` resource types.
    #[must_use]
    pub fn with_type_slots(type_slots: usize) -> Self {
        Self {
            stored: BTreeMap::new(),
            type_slots,
        }
    }

    /// Returns the amount stored for `key`.
    #[must_use]
    pub fn count(&self, key: &ResourceKey) -> i64 {
        self.stored.get(key).copied().unwrap_or(0)
    }

    /// Returns the number of resource types stored.
    #[inline]
    #[must_use]
    pub fn used_slots(&self) -> usize {
        self.stored.len()
    }

    /// Checks if no new resource type fits.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.stored.len() >= self.type_slots
    }

    /// Adds resources directly, bypassing actor bookkeeping.
    ///
    /// Returns the amount accepted.
    pub fn insert(&mut self, key: ResourceKey, amount: i64) -> i64 {
        self.inject(&key.amount(amount), Actionable::Modulate, &ActorContext::SYSTEM)
    }

    /// Creates a snapshot of the pool for before/after comparison.
    #[must_use]
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            stored: self.stored.clone(),
        }
    }

    /// Restores the pool from a snapshot.
    pub fn restore(&mut self, snapshot: &PoolSnapshot) {
        self.stored.clone_from(&snapshot.stored);
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourcePool for MemoryPool {
    fn extract(&mut self, request: &ResourceAmount, mode: Actionable, _actor: &ActorContext) -> i64 {
        if request.amount <= 0 {
            return 0;
        }
        let Some(stored) = self.stored.get_mut(&request.key) else {
            return 0;
        };
        let taken = (*stored).min(request.amount);
        if mode == Actionable::Modulate {
            *stored -= taken;
            if *stored == 0 {
                self.stored.remove(&request.key);
            }
        }
        taken
    }

    fn inject(&mut self, offer: &ResourceAmount, mode: Actionable, _actor: &ActorContext) -> i64 {
        if offer.amount <= 0 {
            return 0;
        }
        if !self.stored.contains_key(&offer.key) && self.is_full() {
            return 0;
        }
        if mode == Actionable::Modulate {
            *self.stored.entry(offer.key).or_insert(0) += offer.amount;
        }
        offer.amount
    }

    fn stored(&self) -> Vec<ResourceAmount> {
        self.stored
            .iter()
            .map(|(&key, &amount)| ResourceAmount::new(key, amount))
            .collect()
    }
}

/// Snapshot of pool contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolSnapshot {
    stored: BTreeMap<ResourceKey, i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const IRON: ResourceKey = ResourceKey::item(1);
    const COAL: ResourceKey = ResourceKey::item(2);

    #[test]
    fn test_extract_modulate_and_simulate() {
        let mut pool = MemoryPool::new();
        pool.insert(IRON, 10);

        let actor = ActorContext::new(7);
        assert_eq!(pool.extract(&IRON.amount(4), Actionable::Simulate, &actor), 4);
        assert_eq!(pool.count(&IRON), 10);

        assert_eq!(pool.extract(&IRON.amount(4), Actionable::Modulate, &actor), 4);
        assert_eq!(pool.count(&IRON), 6);

        assert_eq!(pool.extract(&IRON.amount(100), Actionable::Modulate, &actor), 6);
        assert_eq!(pool.used_slots(), 0);
        assert_eq!(pool.extract(&COAL.amount(1), Actionable::Modulate, &actor), 0);
    }

    #[test]
    fn test_type_slots_limit_injection() {
        let mut pool = MemoryPool::with_type_slots(1);
        assert_eq!(pool.insert(IRON, 5), 5);
        assert!(pool.is_full());
        assert_eq!(pool.insert(COAL, 5), 0);
        assert_eq!(pool.insert(IRON, 5), 5);
        assert_eq!(pool.count(&IRON), 10);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut pool = MemoryPool::new();
        pool.insert(IRON, 50);
        let snapshot = pool.snapshot();

        pool.insert(COAL, 30);
        pool.extract(&IRON.amount(20), Actionable::Modulate, &ActorContext::SYSTEM);
        assert_ne!(pool.snapshot(), snapshot);

        pool.restore(&snapshot);
        assert_eq!(pool.count(&IRON), 50);
        assert_eq!(pool.count(&COAL), 0);
    }
}
