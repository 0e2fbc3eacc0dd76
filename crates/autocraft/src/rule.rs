//! # Production Rules
//!
//! A production rule maps inputs to outputs. Two kinds exist:
//!
//! 1. **Crafting rules** (`craftable`): inputs sit in numbered slots, may be
//!    sparse, and may accept substitutes.
//! 2. **Processing rules**: an unordered bag of inputs handed to a machine.
//!
//! ## Example
//!
//! ```rust,ignore
//! let plank = ProductionRule::crafting(
//!     1,
//!     "Planks".to_string(),
//!     vec![Some(ResourceKey::item(LOG).amount(1))],
//!     vec![ResourceKey::item(PLANK).amount(4)],
//! )?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ResolveError, ResolveResult};
use crate::resource::{ResourceAmount, ResourceKey};

/// Unique identifier for a production rule.
pub type RuleId = u32;

/// Predicate deciding whether a resource may go into a slot of a rule.
#[derive(Clone)]
pub struct SlotFilter(Arc<dyn Fn(usize, &ResourceKey) -> bool + Send + Sync>);

impl SlotFilter {
    /// Wraps a predicate.
    pub fn new(filter: impl Fn(usize, &ResourceKey) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(filter))
    }

    /// Evaluates the predicate.
    #[inline]
    #[must_use]
    pub fn accepts(&self, slot: usize, key: &ResourceKey) -> bool {
        (self.0)(slot, key)
    }
}

impl fmt::Debug for SlotFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SlotFilter(..)")
    }
}

/// A production rule.
#[derive(Clone, Debug)]
pub struct ProductionRule {
    /// Unique rule identifier.
    pub id: RuleId,
    /// Human-readable name.
    pub name: String,
    /// Inputs by slot. `None` marks an empty slot.
    sparse_inputs: Vec<Option<ResourceAmount>>,
    /// Inputs with equal keys merged, in first-appearance order.
    inputs: Vec<ResourceAmount>,
    /// Items produced by one craft.
    outputs: Vec<ResourceAmount>,
    craftable: bool,
    substitutable: bool,
    /// Extra accepted resources per slot.
    substitutes: BTreeMap<usize, Vec<ResourceKey>>,
    slot_filter: Option<SlotFilter>,
}

impl ProductionRule {
    /// Creates a crafting rule with slotted, possibly sparse inputs.
    ///
    /// # Errors
    ///
    /// Returns error if the rule has no inputs or outputs, or a non-positive amount.
    pub fn crafting(
        id: RuleId,
        name: String,
        sparse_inputs: Vec<Option<ResourceAmount>>,
        outputs: Vec<ResourceAmount>,
    ) -> ResolveResult<Self> {
        Self::build(id, name, sparse_inputs, outputs, true)
    }

    /// Creates a processing rule with an unordered list of inputs.
    ///
    /// # Errors
    ///
    /// Returns error if the rule has no inputs or outputs, or a non-positive amount.
    pub fn processing(
        id: RuleId,
        name: String,
        inputs: Vec<ResourceAmount>,
        outputs: Vec<ResourceAmount>,
    ) -> ResolveResult<Self> {
        Self::build(id, name, inputs.into_iter().map(Some).collect(), outputs, false)
    }

    fn build(
        id: RuleId,
        name: String,
        sparse_inputs: Vec<Option<ResourceAmount>>,
        outputs: Vec<ResourceAmount>,
        craftable: bool,
    ) -> ResolveResult<Self> {
        if sparse_inputs.iter().all(Option::is_none) {
            return Err(ResolveError::InvalidConfig(format!(
                "rule {id} must have at least one input"
            )));
        }
        if outputs.is_empty() {
            return Err(ResolveError::InvalidConfig(format!(
                "rule {id} must have at least one output"
            )));
        }
        if let Some(bad) = sparse_inputs
            .iter()
            .flatten()
            .chain(outputs.iter())
            .find(|a| a.amount <= 0)
        {
            return Err(ResolveError::InvalidConfig(format!(
                "rule {id} has non-positive amount {bad}"
            )));
        }

        let mut inputs: Vec<ResourceAmount> = Vec::new();
        for part in sparse_inputs.iter().flatten() {
            match inputs.iter_mut().find(|i| i.key == part.key) {
                Some(existing) => existing.amount += part.amount,
                None => inputs.push(*part),
            }
        }

        Ok(Self {
            id,
            name,
            sparse_inputs,
            inputs,
            outputs,
            craftable,
            substitutable: false,
            substitutes: BTreeMap::new(),
            slot_filter: None,
        })
    }

    /// Declares extra resources accepted in a slot and marks the rule substitutable.
    #[must_use]
    pub fn with_substitutes(mut self, slot: usize, keys: Vec<ResourceKey>) -> Self {
        self.substitutable = true;
        self.substitutes.entry(slot).or_default().extend(keys);
        self
    }

    /// Marks the rule substitutable without declaring extra resources.
    ///
    /// Fuzzy-equivalent variants of each slot's own input are then accepted.
    #[must_use]
    pub const fn substitutable(mut self) -> Self {
        self.substitutable = true;
        self
    }

    /// Installs a slot-validity predicate.
    #[must_use]
    pub fn with_slot_filter(mut self, filter: SlotFilter) -> Self {
        self.slot_filter = Some(filter);
        self
    }

    /// True for slotted crafting rules.
    #[inline]
    #[must_use]
    pub const fn is_craftable(&self) -> bool {
        self.craftable
    }

    /// True when slots accept substitutes.
    #[inline]
    #[must_use]
    pub const fn can_substitute(&self) -> bool {
        self.substitutable
    }

    /// Inputs by slot.
    #[must_use]
    pub fn sparse_inputs(&self) -> &[Option<ResourceAmount>] {
        &self.sparse_inputs
    }

    /// Inputs with equal keys merged.
    #[must_use]
    pub fn inputs(&self) -> &[ResourceAmount] {
        &self.inputs
    }

    /// Outputs of one craft.
    #[must_use]
    pub fn outputs(&self) -> &[ResourceAmount] {
        &self.outputs
    }

    /// True when `key` is among the inputs or outputs.
    #[must_use]
    pub fn mentions(&self, key: &ResourceKey) -> bool {
        self.inputs.iter().chain(self.outputs.iter()).any(|a| a.key == *key)
    }

    /// Resources accepted in `slot`: the slot's own input first, then substitutes.
    #[must_use]
    pub fn substitute_inputs(&self, slot: usize) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self
            .sparse_inputs
            .get(slot)
            .copied()
            .flatten()
            .map(|a| a.key)
            .into_iter()
            .collect();
        if let Some(extra) = self.substitutes.get(&slot) {
            keys.extend(extra.iter().copied());
        }
        keys
    }

    /// Whether `key` may be placed in `slot`.
    ///
    /// Uses the installed predicate if any. Otherwise the slot accepts its own
    /// input and, for substitutable rules, anything fuzzy-equivalent to one of
    /// its substitute inputs.
    #[must_use]
    pub fn is_valid_for_slot(&self, slot: usize, key: &ResourceKey) -> bool {
        if let Some(filter) = &self.slot_filter {
            return filter.accepts(slot, key);
        }
        let accepted = self.substitute_inputs(slot);
        if self.substitutable {
            accepted.iter().any(|k| k.fuzzy_eq(key))
        } else {
            accepted.first() == Some(key)
        }
    }
}
