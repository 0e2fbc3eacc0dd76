//! # Resource Types
//!
//! Resource identities, amounts and the ordered amount lists every other module
//! works with.
//!
//! A [`ResourceKey`] is an item type plus a variant (damage value, fluid
//! temperature, ...). Keys with the same item but a different variant are
//! *fuzzy-equivalent*: substitutes and damageable outputs match on the item alone.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Unique identifier for an item type.
pub type ItemId = u32;

/// Identity of a resource type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    /// The item type.
    pub item: ItemId,
    /// Variant of the item, 0 for the plain item.
    #[serde(default)]
    pub variant: u32,
}

impl ResourceKey {
    /// Creates a key for the plain variant of an item.
    #[inline]
    #[must_use]
    pub const fn item(item: ItemId) -> Self {
        Self { item, variant: 0 }
    }

    /// Creates a key for a specific variant of an item.
    #[inline]
    #[must_use]
    pub const fn variant(item: ItemId, variant: u32) -> Self {
        Self { item, variant }
    }

    /// True when both keys name the same item, whatever the variant.
    #[inline]
    #[must_use]
    pub const fn fuzzy_eq(&self, other: &Self) -> bool {
        self.item == other.item
    }

    /// Every key of `item`, as a key range.
    #[must_use]
    pub const fn variants_of(item: ItemId) -> RangeInclusive<Self> {
        Self::variant(item, 0)..=Self::variant(item, u32::MAX)
    }

    /// Pairs this key with an amount.
    #[inline]
    #[must_use]
    pub const fn amount(self, amount: i64) -> ResourceAmount {
        ResourceAmount { key: self, amount }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variant == 0 {
            write!(f, "#{}", self.item)
        } else {
            write!(f, "#{}@{}", self.item, self.variant)
        }
    }
}

/// A quantity of one resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceAmount {
    /// The resource.
    #[serde(flatten)]
    pub key: ResourceKey,
    /// How much of it. Negative only inside ledger replay.
    pub amount: i64,
}

impl ResourceAmount {
    /// Creates a new resource amount.
    #[inline]
    #[must_use]
    pub const fn new(key: ResourceKey, amount: i64) -> Self {
        Self { key, amount }
    }

    /// Returns the same resource with a different amount.
    #[inline]
    #[must_use]
    pub const fn with_amount(self, amount: i64) -> Self {
        Self {
            key: self.key,
            amount,
        }
    }

    /// Returns the same resource with the amount negated.
    #[inline]
    #[must_use]
    pub const fn negated(self) -> Self {
        self.with_amount(-self.amount)
    }
}

impl fmt::Display for ResourceAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.amount, self.key)
    }
}

/// Whether an operation mutates state or only computes what it would do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Actionable {
    /// Compute feasibility, leave no trace.
    Simulate,
    /// Perform the movement.
    Modulate,
}

/// Opaque identity of whoever asked for the work.
///
/// Threaded through every call for auditing. The resolver only ever logs it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ActorContext(u64);

impl ActorContext {
    /// The actor used for work the engine does on its own behalf.
    pub const SYSTEM: Self = Self(0);

    /// Creates an actor token from a raw id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor:{}", self.0)
    }
}

/// Amounts per resource, ordered by key.
///
/// Adding a negative amount subtracts. Entries that drop to zero or below stay
/// in the map but are skipped by [`ResourceList::iter`] and by equality.
#[derive(Clone, Debug, Default)]
pub struct ResourceList {
    entries: BTreeMap<ResourceKey, i64>,
}

impl ResourceList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delta` to the amount stored for `key`.
    pub fn add(&mut self, key: ResourceKey, delta: i64) {
        *self.entries.entry(key).or_insert(0) += delta;
    }

    /// Adds a resource amount.
    pub fn add_amount(&mut self, amount: ResourceAmount) {
        self.add(amount.key, amount.amount);
    }

    /// Returns the amount stored for `key` (0 if absent).
    #[must_use]
    pub fn get(&self, key: &ResourceKey) -> i64 {
        self.entries.get(key).copied().unwrap_or(0)
    }

    /// Removes up to `amount` of `key`, returning how much was removed.
    pub fn take(&mut self, key: &ResourceKey, amount: i64) -> i64 {
        if amount <= 0 {
            return 0;
        }
        match self.entries.get_mut(key) {
            Some(stored) if *stored > 0 => {
                let taken = (*stored).min(amount);
                *stored -= taken;
                taken
            }
            _ => 0,
        }
    }

    /// Iterates over entries with a positive amount, in key order.
    pub fn iter(&self) -> impl Iterator<Item = ResourceAmount> + '_ {
        self.entries
            .iter()
            .filter(|(_, &amount)| amount > 0)
            .map(|(&key, &amount)| ResourceAmount::new(key, amount))
    }

    /// Raw entries for every variant of `item`.
    pub fn variants(&self, item: ItemId) -> impl Iterator<Item = (ResourceKey, i64)> + '_ {
        self.entries
            .range(ResourceKey::variants_of(item))
            .map(|(&key, &amount)| (key, amount))
    }

    /// Iterates over every raw entry, including zero and negative ones.
    pub fn raw_entries(&self) -> impl Iterator<Item = (ResourceKey, i64)> + '_ {
        self.entries.iter().map(|(&key, &amount)| (key, amount))
    }

    /// Collects the positive entries.
    #[must_use]
    pub fn to_vec(&self) -> Vec<ResourceAmount> {
        self.iter().collect()
    }

    /// True when no entry is positive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Sum of all positive entries.
    #[must_use]
    pub fn total(&self) -> i64 {
        self.iter().map(|a| a.amount).sum()
    }
}

impl PartialEq for ResourceList {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for ResourceList {}

impl FromIterator<ResourceAmount> for ResourceList {
    fn from_iter<I: IntoIterator<Item = ResourceAmount>>(iter: I) -> Self {
        let mut list = Self::new();
        for amount in iter {
            list.add_amount(amount);
        }
        list
    }
}
