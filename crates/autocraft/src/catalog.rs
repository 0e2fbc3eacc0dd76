//! # Resource Catalog
//!
//! The catalog answers the questions the resolver asks about resources:
//! can it be emitted, which rules produce it, does consuming it leave a
//! container behind, is it damageable.
//!
//! [`StaticCatalog`] is the data-driven implementation. Rules are defined in
//! TOML files:
//!
//! ```toml
//! emittable = [{ item = 90 }]
//! damageable = [40]
//!
//! [[containers]]
//! full = { item = 10 }
//! empty = { item = 11 }
//!
//! [[rules]]
//! id = 1
//! name = "Planks"
//! kind = "crafting"
//! inputs = [{ slot = 0, item = 1, amount = 1 }]
//! outputs = [{ item = 2, amount = 4 }]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{ResolveError, ResolveResult};
use crate::resource::{ItemId, ResourceAmount, ResourceKey};
use crate::rule::{ProductionRule, RuleId};

/// Where a resource is being requested from.
#[derive(Clone, Copy, Debug)]
pub struct SlotContext<'a> {
    /// The rule that consumes the resource.
    pub rule: &'a ProductionRule,
    /// The slot of that rule, if it is slotted.
    pub slot: Option<usize>,
}

/// Source of truth about resources and the rules that produce them.
pub trait ResourceCatalog {
    /// Whether the resource can be synthesized from nothing on demand.
    fn can_emit(&self, resource: &ResourceKey) -> bool;

    /// Rules able to produce `resource`, in preference order.
    ///
    /// `context` is `None` for a top-level request.
    fn rules_for(
        &self,
        resource: &ResourceKey,
        context: Option<SlotContext<'_>>,
    ) -> Vec<Arc<ProductionRule>>;

    /// What consuming one `resource` leaves behind, if anything.
    fn container_remainder(&self, _resource: &ResourceKey) -> Option<ResourceKey> {
        None
    }

    /// Whether variants of `item` are wear levels of one product.
    fn is_damageable(&self, _item: ItemId) -> bool {
        false
    }
}

/// An in-memory catalog built from rule definitions.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    /// Rules in declaration order.
    rules: Vec<Arc<ProductionRule>>,
    emittable: BTreeSet<ResourceKey>,
    damageable: BTreeSet<ItemId>,
    /// Full resource -> what is left after consuming it.
    containers: BTreeMap<ResourceKey, ResourceKey>,
}

impl StaticCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule.
    ///
    /// # Errors
    ///
    /// Returns error if the rule ID already exists.
    pub fn add_rule(&mut self, rule: ProductionRule) -> ResolveResult<()> {
        if self.rules.iter().any(|r| r.id == rule.id) {
            return Err(ResolveError::InvalidConfig(format!(
                "rule ID {} already exists",
                rule.id
            )));
        }
        self.rules.push(Arc::new(rule));
        Ok(())
    }

    /// Declares a resource emittable.
    pub fn set_emittable(&mut self, key: ResourceKey) {
        self.emittable.insert(key);
    }

    /// Declares an item damageable.
    pub fn set_damageable(&mut self, item: ItemId) {
        self.damageable.insert(item);
    }

    /// Declares that consuming `full` leaves `empty` behind.
    pub fn set_container(&mut self, full: ResourceKey, empty: ResourceKey) {
        self.containers.insert(full, empty);
    }

    /// Gets a rule by ID.
    #[must_use]
    pub fn rule(&self, id: RuleId) -> Option<&Arc<ProductionRule>> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Parses a catalog from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` on malformed TOML or invalid rules.
    pub fn from_toml_str(text: &str) -> ResolveResult<Self> {
        let file: CatalogFile =
            toml::from_str(text).map_err(|e| ResolveError::InvalidConfig(e.to_string()))?;

        let mut catalog = Self::new();
        for key in file.emittable {
            catalog.set_emittable(key);
        }
        for item in file.damageable {
            catalog.set_damageable(item);
        }
        for container in file.containers {
            catalog.set_container(container.full, container.empty);
        }
        for def in file.rules {
            catalog.add_rule(def.into_rule()?)?;
        }
        Ok(catalog)
    }

    /// Loads a catalog from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the file cannot be read or parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> ResolveResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ResolveError::InvalidConfig(format!("{}: {e}", path.as_ref().display()))
        })?;
        Self::from_toml_str(&text)
    }
}

impl ResourceCatalog for StaticCatalog {
    fn can_emit(&self, resource: &ResourceKey) -> bool {
        self.emittable.contains(resource)
    }

    fn rules_for(
        &self,
        resource: &ResourceKey,
        _context: Option<SlotContext<'_>>,
    ) -> Vec<Arc<ProductionRule>> {
        let fuzzy = self.damageable.contains(&resource.item);
        self.rules
            .iter()
            .filter(|rule| {
                rule.outputs()
                    .iter()
                    .any(|out| out.key == *resource || (fuzzy && out.key.fuzzy_eq(resource)))
            })
            .cloned()
            .collect()
    }

    fn container_remainder(&self, resource: &ResourceKey) -> Option<ResourceKey> {
        self.containers.get(resource).copied()
    }

    fn is_damageable(&self, item: ItemId) -> bool {
        self.damageable.contains(&item)
    }
}

// ============================================================================
// TOML schema
// ============================================================================

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    emittable: Vec<ResourceKey>,
    #[serde(default)]
    damageable: Vec<ItemId>,
    #[serde(default)]
    containers: Vec<ContainerDef>,
    #[serde(default)]
    rules: Vec<RuleDef>,
}

#[derive(Deserialize)]
struct ContainerDef {
    full: ResourceKey,
    empty: ResourceKey,
}

#[derive(Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum RuleKind {
    #[default]
    Crafting,
    Processing,
}

#[derive(Deserialize)]
struct AmountDef {
    #[serde(default)]
    slot: Option<usize>,
    item: ItemId,
    #[serde(default)]
    variant: u32,
    amount: i64,
}

impl AmountDef {
    const fn resource(&self) -> ResourceAmount {
        ResourceKey::variant(self.item, self.variant).amount(self.amount)
    }
}

#[derive(Deserialize)]
struct SubstituteDef {
    slot: usize,
    items: Vec<ResourceKey>,
}

#[derive(Deserialize)]
struct RuleDef {
    id: RuleId,
    name: String,
    #[serde(default)]
    kind: RuleKind,
    #[serde(default)]
    substitutable: bool,
    inputs: Vec<AmountDef>,
    outputs: Vec<AmountDef>,
    #[serde(default)]
    substitutes: Vec<SubstituteDef>,
}

impl RuleDef {
    fn into_rule(self) -> ResolveResult<ProductionRule> {
        let outputs = self.outputs.iter().map(AmountDef::resource).collect();

        let mut rule = if self.kind == RuleKind::Processing {
            let inputs = self.inputs.iter().map(AmountDef::resource).collect();
            ProductionRule::processing(self.id, self.name, inputs, outputs)?
        } else {
            let mut sparse: Vec<Option<ResourceAmount>> = Vec::new();
            for input in &self.inputs {
                let slot = input.slot.unwrap_or(sparse.len());
                if sparse.len() <= slot {
                    sparse.resize(slot + 1, None);
                }
                if sparse[slot].is_some() {
                    return Err(ResolveError::InvalidConfig(format!(
                        "rule {} fills slot {slot} twice",
                        self.id
                    )));
                }
                sparse[slot] = Some(input.resource());
            }
            ProductionRule::crafting(self.id, self.name, sparse, outputs)?
        };

        if self.substitutable {
            rule = rule.substitutable();
        }
        for sub in self.substitutes {
            rule = rule.with_substitutes(sub.slot, sub.items);
        }
        Ok(rule)
    }
}
