//! # Resolution Inventory
//!
//! Transactional view of a pool snapshot used while resolving.
//!
//! The inventory is a stack of overlays on top of an immutable base snapshot.
//! The bottom overlay (the root) is always present; [`ResolutionInventory::branch`]
//! pushes a new one. Every mutation lands in the innermost overlay, and reads sum
//! the base with every overlay. Closing a branch either merges its deltas into
//! the overlay below ([`commit`](ResolutionInventory::commit)) or drops them
//! ([`discard`](ResolutionInventory::discard)).
//!
//! Branches are strictly nested: only the innermost open branch can be closed.
//! Memory is bounded by the deltas, never by copies of the pool.
//!
//! ```text
//! base snapshot   [ 4 R ][ 64 A ]
//! root overlay    [ -4 R ]
//! branch #3       [ +3 R ][ -2 A ]      <- innermost, receives mutations
//! visible         [ 3 R ][ 62 A ]
//! ```

use std::collections::BTreeMap;

use crate::error::{BranchFailure, ConsistencyError, ResolveError, ResolveResult};
use crate::pool::ResourcePool;
use crate::resource::{Actionable, ActorContext, ResourceAmount, ResourceKey, ResourceList};

/// Handle of an open branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BranchId(u32);

impl BranchId {
    /// The root overlay. It can never be committed or discarded.
    pub const ROOT: Self = Self(0);

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Clone, Debug)]
struct Overlay {
    id: BranchId,
    deltas: BTreeMap<ResourceKey, i64>,
}

impl Overlay {
    fn new(id: BranchId) -> Self {
        Self {
            id,
            deltas: BTreeMap::new(),
        }
    }
}

/// Overlay stack over a pool snapshot.
#[derive(Clone, Debug)]
pub struct ResolutionInventory {
    base: ResourceList,
    /// `layers[0]` is the root overlay.
    layers: Vec<Overlay>,
    next_branch: u32,
}

impl ResolutionInventory {
    /// Creates an inventory over a base list.
    #[must_use]
    pub fn new(base: ResourceList) -> Self {
        Self {
            base,
            layers: vec![Overlay::new(BranchId::ROOT)],
            next_branch: 1,
        }
    }

    /// Creates an inventory over the current contents of a pool.
    #[must_use]
    pub fn snapshot(pool: &dyn ResourcePool) -> Self {
        Self::new(pool.stored().into_iter().collect())
    }

    /// The snapshot this inventory was created from.
    #[must_use]
    pub fn base(&self) -> &ResourceList {
        &self.base
    }

    /// Amount of `key` visible through every open overlay.
    #[must_use]
    pub fn amount(&self, key: &ResourceKey) -> i64 {
        self.base.get(key)
            + self
                .layers
                .iter()
                .filter_map(|layer| layer.deltas.get(key))
                .sum::<i64>()
    }

    /// Everything visible through every open overlay.
    #[must_use]
    pub fn list(&self) -> ResourceList {
        let mut list = self.base.clone();
        for layer in &self.layers {
            for (&key, &delta) in &layer.deltas {
                list.add(key, delta);
            }
        }
        list
    }

    /// Visible entries fuzzy-equivalent to `key`.
    #[must_use]
    pub fn find_fuzzy(&self, key: &ResourceKey) -> Vec<ResourceAmount> {
        let mut found: BTreeMap<ResourceKey, i64> = self.base.variants(key.item).collect();
        for layer in &self.layers {
            for (&variant, &delta) in layer.deltas.range(ResourceKey::variants_of(key.item)) {
                *found.entry(variant).or_insert(0) += delta;
            }
        }
        found
            .into_iter()
            .filter(|&(_, amount)| amount > 0)
            .map(|(variant, amount)| variant.amount(amount))
            .collect()
    }

    /// Removes up to `amount` of `key`, returning how much was (or would be) removed.
    pub fn extract(&mut self, key: &ResourceKey, amount: i64, mode: Actionable) -> i64 {
        if amount <= 0 {
            return 0;
        }
        let taken = self.amount(key).clamp(0, amount);
        if taken > 0 && mode == Actionable::Modulate {
            self.record(*key, -taken);
        }
        taken
    }

    /// Stores `amount` of `key`, returning how much was (or would be) accepted.
    pub fn inject(&mut self, key: &ResourceKey, amount: i64, mode: Actionable) -> i64 {
        if amount <= 0 {
            return 0;
        }
        if mode == Actionable::Modulate {
            self.record(*key, amount);
        }
        amount
    }

    fn record(&mut self, key: ResourceKey, delta: i64) {
        if let Some(top) = self.layers.last_mut() {
            *top.deltas.entry(key).or_insert(0) += delta;
        }
    }

    /// Opens a nested branch. Mutations go to it until it is closed.
    pub fn branch(&mut self) -> BranchId {
        let id = BranchId(self.next_branch);
        self.next_branch += 1;
        self.layers.push(Overlay::new(id));
        tracing::trace!(branch = id.0, depth = self.open_branches(), "branch opened");
        id
    }

    /// Number of open branches above the root overlay.
    #[must_use]
    pub fn open_branches(&self) -> usize {
        self.layers.len() - 1
    }

    fn close(&mut self, branch: BranchId) -> Result<Overlay, ConsistencyError> {
        let top = self.layers.last().map_or(BranchId::ROOT, |layer| layer.id);
        if self.layers.len() < 2 {
            return Err(ConsistencyError::NoOpenBranch(branch.0));
        }
        if top != branch {
            return Err(ConsistencyError::BranchOrder {
                expected: top.0,
                found: branch.0,
            });
        }
        self.layers.pop().ok_or(ConsistencyError::NoOpenBranch(branch.0))
    }

    /// Merges the innermost branch into its parent.
    ///
    /// # Errors
    ///
    /// Returns a [`ConsistencyError`] if `branch` is not the innermost open branch
    /// or the merge would leave a negative amount visible. After a negative
    /// balance the inventory must not be used for the attempt any more.
    pub fn commit(&mut self, branch: BranchId) -> Result<(), ConsistencyError> {
        let overlay = self.close(branch)?;
        let parent = self
            .layers
            .last_mut()
            .ok_or(ConsistencyError::NoOpenBranch(branch.0))?;
        for (&key, &delta) in &overlay.deltas {
            *parent.deltas.entry(key).or_insert(0) += delta;
        }
        for &key in overlay.deltas.keys() {
            let visible = self.amount(&key);
            if visible < 0 {
                return Err(ConsistencyError::NegativeBalance {
                    resource: key,
                    amount: visible,
                });
            }
        }
        tracing::trace!(branch = branch.0, changes = overlay.deltas.len(), "branch committed");
        Ok(())
    }

    /// Drops the innermost branch and everything it recorded.
    ///
    /// # Errors
    ///
    /// Returns a [`ConsistencyError`] if `branch` is not the innermost open branch.
    pub fn discard(&mut self, branch: BranchId) -> Result<(), ConsistencyError> {
        self.close(branch)?;
        tracing::trace!(branch = branch.0, "branch discarded");
        Ok(())
    }

    /// Drops every open branch, innermost first, returning how many were open.
    ///
    /// Used when an attempt was abandoned without unwinding its branches.
    pub fn rollback_open_branches(&mut self) -> usize {
        let open = self.open_branches();
        self.layers.truncate(1);
        if open > 0 {
            tracing::trace!(open, "abandoned branches dropped");
        }
        open
    }

    /// Changes recorded in the root overlay, relative to the snapshot.
    #[must_use]
    pub fn net_changes(&self) -> Vec<ResourceAmount> {
        self.layers[0]
            .deltas
            .iter()
            .filter(|(_, &delta)| delta != 0)
            .map(|(&key, &delta)| ResourceAmount::new(key, delta))
            .collect()
    }

    /// Applies the root overlay to a real pool, all or nothing.
    ///
    /// Every movement is first simulated against the pool; nothing is moved
    /// unless all of them would succeed. Afterwards the snapshot reflects the
    /// flushed changes and the root overlay is empty.
    ///
    /// # Errors
    ///
    /// - `Consistency(OpenBranches)` if a branch is still open
    /// - `Branch` if the pool no longer holds something to extract
    /// - `Consistency(PoolRejected)` if the pool refuses an injection, or a
    ///   movement it accepted in simulation
    pub fn flush_into(&mut self, pool: &mut dyn ResourcePool, actor: &ActorContext) -> ResolveResult<()> {
        if self.open_branches() > 0 {
            return Err(ConsistencyError::OpenBranches(self.open_branches()).into());
        }
        let changes = self.net_changes();

        for change in &changes {
            let wanted = change.amount.abs();
            let moved = if change.amount < 0 {
                pool.extract(&change.with_amount(wanted), Actionable::Simulate, actor)
            } else {
                pool.inject(change, Actionable::Simulate, actor)
            };
            if moved != wanted {
                return Err(if change.amount < 0 {
                    ResolveError::Branch(BranchFailure {
                        resource: change.key,
                        amount_short: wanted - moved,
                    })
                } else {
                    ConsistencyError::PoolRejected {
                        resource: change.key,
                        expected: wanted,
                        moved,
                    }
                    .into()
                });
            }
        }

        for change in &changes {
            let wanted = change.amount.abs();
            let moved = if change.amount < 0 {
                pool.extract(&change.with_amount(wanted), Actionable::Modulate, actor)
            } else {
                pool.inject(change, Actionable::Modulate, actor)
            };
            if moved != wanted {
                return Err(ConsistencyError::PoolRejected {
                    resource: change.key,
                    expected: wanted,
                    moved,
                }
                .into());
            }
            self.base.add_amount(*change);
        }

        self.layers[0].deltas.clear();
        tracing::debug!(%actor, changes = changes.len(), "inventory flushed into pool");
        Ok(())
    }
}
