//! # Demand Tree
//!
//! The production plan for one request, stored as an arena.
//!
//! Two kinds of entries alternate down the tree:
//!
//! ```text
//! DemandNode (10 x R)                      <- root, no parent
//!   ├── ProductionStep (2 A -> 3 R)        <- one candidate rule
//!   │     └── DemandNode (2 x A, slot 0)   <- per-craft input
//!   └── ProductionStep (1 B -> 1 R)
//!         └── DemandNode (1 x B, slot 0)
//! ```
//!
//! The arena owns every entry. Parent links are plain [`NodeId`] / [`StepId`]
//! handles used only for lookups, so the tree holds no reference cycles.
//!
//! ## Cycle Avoidance
//!
//! A rule is rejected for a node when it mentions the target of any strict
//! ancestor node, checked by walking the parent chain when the tree is built.
//! Every chain of nodes therefore names each resource at most once below the
//! root, which bounds the depth by the number of resource types.

use std::sync::Arc;

use crate::catalog::{ResourceCatalog, SlotContext};
use crate::config::ResolverConfig;
use crate::error::ConsistencyError;
use crate::resource::{ResourceAmount, ResourceKey, ResourceList};
use crate::rule::ProductionRule;

/// Handle of a demand node in a [`DemandTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

/// Handle of a production step in a [`DemandTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(u32);

impl NodeId {
    #[inline]
    const fn index(self) -> usize {
        self.0 as usize
    }
}

impl StepId {
    #[inline]
    const fn index(self) -> usize {
        self.0 as usize
    }
}

// ============================================================================
// Reservation ledger
// ============================================================================

/// Record of what a node assumed it took from the pool.
///
/// Entries are only ever appended. Rolling a request back appends the negated
/// entries instead of deleting the originals, so the ledger keeps the full
/// history and [`ReservationLedger::net`] gives what is still reserved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReservationLedger {
    entries: Vec<ResourceAmount>,
}

impl ReservationLedger {
    /// Appends a reservation.
    pub fn record(&mut self, reservation: ResourceAmount) {
        self.entries.push(reservation);
    }

    /// Appends the negation of each given reservation.
    pub fn replay_negated(&mut self, reservations: &[ResourceAmount]) {
        self.entries
            .extend(reservations.iter().map(|r| r.negated()));
    }

    /// Every entry in recording order, negated ones included.
    #[must_use]
    pub fn entries(&self) -> &[ResourceAmount] {
        &self.entries
    }

    /// Positive net reservation per resource.
    #[must_use]
    pub fn net(&self) -> ResourceList {
        self.entries.iter().copied().collect()
    }

    /// Forgets every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ============================================================================
// Tree entries
// ============================================================================

/// A requested resource at one position of the tree.
#[derive(Clone, Debug)]
pub struct DemandNode {
    pub(crate) target: ResourceKey,
    pub(crate) parent: Option<StepId>,
    pub(crate) slot: Option<usize>,
    pub(crate) can_emit: bool,
    pub(crate) steps: Vec<StepId>,

    // Per-attempt accounting
    pub(crate) bytes: u64,
    pub(crate) missing: i64,
    pub(crate) emitted: i64,
    /// Set once the pool could not cover a request; later extractions are no
    /// longer counted as coming from the pool.
    pub(crate) exhausted: bool,
    pub(crate) simulate: bool,
    pub(crate) pool_sourced: ReservationLedger,
}

impl DemandNode {
    /// The requested resource.
    #[must_use]
    pub const fn target(&self) -> ResourceKey {
        self.target
    }

    /// The step consuming this node, `None` at the top.
    #[must_use]
    pub const fn parent(&self) -> Option<StepId> {
        self.parent
    }

    /// Slot in the parent rule, for slotted rules.
    #[must_use]
    pub const fn slot(&self) -> Option<usize> {
        self.slot
    }

    /// Whether the catalog can emit this resource.
    #[must_use]
    pub const fn can_emit(&self) -> bool {
        self.can_emit
    }

    /// Candidate steps in catalog order.
    #[must_use]
    pub fn steps(&self) -> &[StepId] {
        &self.steps
    }

    /// Bytes measured during the last attempt.
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Amount that could not be supplied in simulate mode.
    #[must_use]
    pub const fn missing(&self) -> i64 {
        self.missing
    }

    /// Amount satisfied by emission.
    #[must_use]
    pub const fn emitted(&self) -> i64 {
        self.emitted
    }

    /// Whether the pool was found insufficient for this node.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Whether the node runs in simulate mode.
    #[must_use]
    pub const fn is_simulating(&self) -> bool {
        self.simulate
    }

    /// Reservations this node recorded against the pool.
    #[must_use]
    pub const fn pool_sourced(&self) -> &ReservationLedger {
        &self.pool_sourced
    }
}

/// One production rule applied some number of times.
#[derive(Clone, Debug)]
pub struct ProductionStep {
    pub(crate) rule: Arc<ProductionRule>,
    pub(crate) parent: NodeId,
    /// Child node and the amount of it one craft consumes.
    pub(crate) inputs: Vec<(NodeId, i64)>,
    pub(crate) limit_one_per_cycle: bool,
    pub(crate) recycles_containers: bool,

    // Per-attempt accounting
    pub(crate) crafts: i64,
    pub(crate) applications: u32,
    pub(crate) bytes: u64,
    pub(crate) possible: bool,
}

impl ProductionStep {
    /// The rule applied by this step.
    #[must_use]
    pub fn rule(&self) -> &Arc<ProductionRule> {
        &self.rule
    }

    /// The node this step produces for.
    #[must_use]
    pub const fn parent(&self) -> NodeId {
        self.parent
    }

    /// Child nodes with their per-craft amounts.
    #[must_use]
    pub fn inputs(&self) -> &[(NodeId, i64)] {
        &self.inputs
    }

    /// Whether the step must run one craft at a time.
    #[must_use]
    pub const fn limit_one_per_cycle(&self) -> bool {
        self.limit_one_per_cycle
    }

    /// Whether consumed inputs leave containers to put back.
    #[must_use]
    pub const fn recycles_containers(&self) -> bool {
        self.recycles_containers
    }

    /// Crafts executed during the last attempt.
    #[must_use]
    pub const fn crafts(&self) -> i64 {
        self.crafts
    }

    /// Number of times the step was applied during the last attempt.
    #[must_use]
    pub const fn applications(&self) -> u32 {
        self.applications
    }

    /// Container bytes charged during the last attempt.
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.bytes
    }

    /// How many crafts to request for `remaining` when one craft yields `per_craft`.
    #[must_use]
    pub const fn get_times(&self, remaining: i64, per_craft: i64) -> i64 {
        if self.limit_one_per_cycle || per_craft <= 0 {
            return 1;
        }
        remaining / per_craft + if remaining % per_craft != 0 { 1 } else { 0 }
    }
}

/// Counters of one subtree, taken before a speculative craft.
#[derive(Debug, Default)]
pub(crate) struct AccountingSnapshot {
    /// (node, bytes, missing, emitted)
    nodes: Vec<(NodeId, u64, i64, i64)>,
    /// (step, crafts, applications, bytes)
    steps: Vec<(StepId, i64, u32, u64)>,
}

// ============================================================================
// Plan
// ============================================================================

/// What an attempt used, produced and lacked.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolutionPlan {
    /// Resources that could not be supplied.
    pub missing: Vec<ResourceAmount>,
    /// Resources that will be crafted or emitted.
    pub producible: Vec<ResourceAmount>,
    /// Resources that will be taken from the pool.
    pub from_pool: Vec<ResourceAmount>,
    /// Total cost of the plan.
    pub bytes: u64,
}

impl ResolutionPlan {
    /// True when nothing is missing.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

// ============================================================================
// Tree
// ============================================================================

/// Arena holding every node and step of one request.
#[derive(Clone, Debug)]
pub struct DemandTree {
    nodes: Vec<DemandNode>,
    steps: Vec<ProductionStep>,
    root: NodeId,
}

impl DemandTree {
    /// Builds the full tree for `target` from the catalog.
    #[must_use]
    pub fn build(catalog: &dyn ResourceCatalog, target: ResourceKey) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            steps: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.add_node(catalog, target, None, None);
        tracing::debug!(
            %target,
            nodes = tree.nodes.len(),
            steps = tree.steps.len(),
            "demand tree built"
        );
        tree
    }

    fn add_node(
        &mut self,
        catalog: &dyn ResourceCatalog,
        target: ResourceKey,
        parent: Option<StepId>,
        slot: Option<usize>,
    ) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        let can_emit = catalog.can_emit(&target);
        self.nodes.push(DemandNode {
            target,
            parent,
            slot,
            can_emit,
            steps: Vec::new(),
            bytes: 0,
            missing: 0,
            emitted: 0,
            exhausted: false,
            simulate: false,
            pool_sourced: ReservationLedger::default(),
        });

        // Emitted resources are never crafted.
        if can_emit {
            return id;
        }

        let rules = {
            let context = parent.map(|step| SlotContext {
                rule: &self.steps[step.index()].rule,
                slot,
            });
            catalog.rules_for(&target, context)
        };
        for rule in rules {
            if self.allows_rule(id, &rule) {
                let step = self.add_step(catalog, rule, id);
                self.nodes[id.index()].steps.push(step);
            }
        }
        id
    }

    /// True when `rule` mentions no strict ancestor of `node`.
    fn allows_rule(&self, node: NodeId, rule: &ProductionRule) -> bool {
        let mut cursor = self.nodes[node.index()].parent;
        while let Some(step) = cursor {
            let ancestor = &self.nodes[self.steps[step.index()].parent.index()];
            if rule.mentions(&ancestor.target) {
                return false;
            }
            cursor = ancestor.parent;
        }
        true
    }

    fn add_step(
        &mut self,
        catalog: &dyn ResourceCatalog,
        rule: Arc<ProductionRule>,
        parent: NodeId,
    ) -> StepId {
        let id = StepId(u32::try_from(self.steps.len()).unwrap_or(u32::MAX));

        let mut limit_one_per_cycle = false;
        let mut recycles_containers = false;
        for part in rule.inputs() {
            // Catalytic rule: a craft must see the previous craft's output.
            if rule.outputs().iter().any(|out| out.key == part.key) {
                limit_one_per_cycle = true;
            }
            if rule.is_craftable() && catalog.container_remainder(&part.key).is_some() {
                limit_one_per_cycle = true;
                recycles_containers = true;
            }
        }

        // (key, per-craft amount, slot)
        let mut children: Vec<(ResourceKey, i64, Option<usize>)> = Vec::new();
        if rule.is_craftable() && recycles_containers {
            for (slot, part) in rule.sparse_inputs().iter().enumerate() {
                if let Some(part) = part {
                    children.push((part.key, part.amount, Some(slot)));
                }
            }
        } else if rule.is_craftable() {
            for part in rule.inputs() {
                let first_slot = rule
                    .sparse_inputs()
                    .iter()
                    .position(|p| p.is_some_and(|p| p.key == part.key));
                if let Some(slot) = first_slot {
                    children.push((part.key, part.amount, Some(slot)));
                }
            }
        } else {
            for part in rule.inputs() {
                children.push((part.key, part.amount, None));
            }
        }

        self.steps.push(ProductionStep {
            rule,
            parent,
            inputs: Vec::with_capacity(children.len()),
            limit_one_per_cycle,
            recycles_containers,
            crafts: 0,
            applications: 0,
            bytes: 0,
            possible: true,
        });

        for (key, per_craft, slot) in children {
            let child = self.add_node(catalog, key, Some(id), slot);
            self.steps[id.index()].inputs.push((child, per_craft));
        }
        id
    }

    /// The top-level node.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Target of the top-level node.
    #[must_use]
    pub fn target(&self) -> ResourceKey {
        self.node(self.root).target
    }

    /// Looks up a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &DemandNode {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut DemandNode {
        &mut self.nodes[id.index()]
    }

    /// Looks up a step.
    #[must_use]
    pub fn step(&self, id: StepId) -> &ProductionStep {
        &self.steps[id.index()]
    }

    pub(crate) fn step_mut(&mut self, id: StepId) -> &mut ProductionStep {
        &mut self.steps[id.index()]
    }

    /// Every node with its handle.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &DemandNode)> {
        (0u32..).map(NodeId).zip(self.nodes.iter())
    }

    /// Every step with its handle.
    pub fn steps(&self) -> impl Iterator<Item = (StepId, &ProductionStep)> {
        (0u32..).map(StepId).zip(self.steps.iter())
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Strict ancestors of a node, nearest first.
    #[must_use]
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.node(node).parent;
        while let Some(step) = cursor {
            let parent = self.step(step).parent;
            out.push(parent);
            cursor = self.node(parent).parent;
        }
        out
    }

    /// Clears all per-attempt accounting and sets the simulate flag everywhere.
    pub fn reset(&mut self, simulate: bool) {
        for node in &mut self.nodes {
            node.simulate = simulate;
            node.bytes = 0;
            node.missing = 0;
            node.emitted = 0;
            node.exhausted = false;
            node.pool_sourced.clear();
        }
        for step in &mut self.steps {
            step.crafts = 0;
            step.applications = 0;
            step.bytes = 0;
            step.possible = true;
        }
    }

    /// Saves the per-attempt counters of `step` and everything below it.
    pub(crate) fn save_accounting(&self, step: StepId) -> AccountingSnapshot {
        let mut snapshot = AccountingSnapshot::default();
        let mut pending = vec![step];
        while let Some(id) = pending.pop() {
            let s = self.step(id);
            snapshot.steps.push((id, s.crafts, s.applications, s.bytes));
            for &(child, _) in &s.inputs {
                let n = self.node(child);
                snapshot.nodes.push((child, n.bytes, n.missing, n.emitted));
                pending.extend_from_slice(&n.steps);
            }
        }
        snapshot
    }

    /// Puts back counters saved by [`DemandTree::save_accounting`].
    ///
    /// Reservation ledgers are left alone; they roll back by negated replay.
    pub(crate) fn restore_accounting(&mut self, snapshot: AccountingSnapshot) {
        for (id, crafts, applications, bytes) in snapshot.steps {
            let s = self.step_mut(id);
            s.crafts = crafts;
            s.applications = applications;
            s.bytes = bytes;
        }
        for (id, bytes, missing, emitted) in snapshot.nodes {
            let n = self.node_mut(id);
            n.bytes = bytes;
            n.missing = missing;
            n.emitted = emitted;
        }
    }

    /// The output of `step` that satisfies `wanted`, with its per-craft amount.
    ///
    /// Exact key first. Otherwise an output of the same item is accepted when the
    /// item is damageable, since its variants are wear levels of one product.
    pub(crate) fn amount_crafted(
        &self,
        catalog: &dyn ResourceCatalog,
        step: StepId,
        wanted: &ResourceKey,
    ) -> Result<ResourceAmount, ConsistencyError> {
        let rule = &self.step(step).rule;
        rule.outputs()
            .iter()
            .find(|out| out.key == *wanted)
            .or_else(|| {
                rule.outputs().iter().find(|out| {
                    out.key.fuzzy_eq(wanted) && catalog.is_damageable(wanted.item)
                })
            })
            .copied()
            .ok_or(ConsistencyError::UnmatchedOutput {
                rule: rule.id,
                resource: *wanted,
            })
    }

    /// Total cost of the last attempt, summed bottom-up.
    #[must_use]
    pub fn report_cost(&self, config: &ResolverConfig) -> u64 {
        self.node_cost(self.root, config)
    }

    fn node_cost(&self, id: NodeId, config: &ResolverConfig) -> u64 {
        let node = self.node(id);
        let below: u64 = node
            .steps
            .iter()
            .map(|&step| self.step_cost(step, config))
            .sum();
        below + config.node_overhead_bytes + node.bytes
    }

    fn step_cost(&self, id: StepId, config: &ResolverConfig) -> u64 {
        let step = self.step(id);
        let below: u64 = step
            .inputs
            .iter()
            .map(|&(child, _)| self.node_cost(child, config))
            .sum();
        below + config.step_overhead_bytes + step.crafts.unsigned_abs() + step.bytes
    }

    /// Summarizes the last attempt.
    #[must_use]
    pub fn plan(&self, config: &ResolverConfig) -> ResolutionPlan {
        let mut missing = ResourceList::new();
        let mut producible = ResourceList::new();
        let mut from_pool = ResourceList::new();

        for node in &self.nodes {
            if node.missing > 0 {
                missing.add(node.target, node.missing);
            }
            if node.emitted > 0 {
                producible.add(node.target, node.emitted);
            }
            for reserved in node.pool_sourced.net().iter() {
                from_pool.add_amount(reserved);
            }
        }
        for step in &self.steps {
            if step.crafts > 0 {
                for out in step.rule.outputs() {
                    producible.add(out.key, out.amount.saturating_mul(step.crafts));
                }
            }
        }

        ResolutionPlan {
            missing: missing.to_vec(),
            producible: producible.to_vec(),
            from_pool: from_pool.to_vec(),
            bytes: self.report_cost(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;

    const R: ResourceKey = ResourceKey::item(1);
    const A: ResourceKey = ResourceKey::item(2);
    const B: ResourceKey = ResourceKey::item(3);
    const BUCKET: ResourceKey = ResourceKey::item(4);
    const WATER: ResourceKey = ResourceKey::item(5);

    fn cyclic_catalog() -> StaticCatalog {
        let mut catalog = StaticCatalog::new();
        // A -> R, B -> A, A -> B: B and A feed each other.
        catalog
            .add_rule(ProductionRule::processing(1, "R".into(), vec![A.amount(2)], vec![R.amount(3)]).unwrap())
            .unwrap();
        catalog
            .add_rule(ProductionRule::processing(2, "A".into(), vec![B.amount(1)], vec![A.amount(1)]).unwrap())
            .unwrap();
        catalog
            .add_rule(ProductionRule::processing(3, "B".into(), vec![A.amount(1)], vec![B.amount(1)]).unwrap())
            .unwrap();
        catalog
    }

    #[test]
    fn test_build_rejects_ancestor_rules() {
        let catalog = cyclic_catalog();
        let tree = DemandTree::build(&catalog, R);

        // R <- rule1 <- A <- rule2 <- B; rule3 for B mentions A, an ancestor.
        assert_eq!(tree.step_count(), 2);
        assert_eq!(tree.node_count(), 3);

        for (id, node) in tree.nodes() {
            for &step in node.steps() {
                let rule = tree.step(step).rule();
                for ancestor in tree.ancestors(id) {
                    assert!(!rule.mentions(&tree.node(ancestor).target()));
                }
            }
        }
    }

    #[test]
    fn test_self_referential_rule_allowed_at_top() {
        let mut catalog = StaticCatalog::new();
        catalog
            .add_rule(
                ProductionRule::processing(1, "Grow".into(), vec![R.amount(1), A.amount(1)], vec![R.amount(2)])
                    .unwrap(),
            )
            .unwrap();
        let tree = DemandTree::build(&catalog, R);

        let root = tree.node(tree.root());
        assert_eq!(root.steps().len(), 1);
        let step = tree.step(root.steps()[0]);
        assert!(step.limit_one_per_cycle());
        assert!(!step.recycles_containers());

        // The R input may not be crafted again below itself.
        let (child, per_craft) = step.inputs()[0];
        assert_eq!(tree.node(child).target(), R);
        assert_eq!(per_craft, 1);
        assert!(tree.node(child).steps().is_empty());
    }

    #[test]
    fn test_emittable_nodes_have_no_steps() {
        let mut catalog = cyclic_catalog();
        catalog.set_emittable(A);
        let tree = DemandTree::build(&catalog, R);
        assert_eq!(tree.node_count(), 2);
        let root = tree.node(tree.root());
        let child = tree.step(root.steps()[0]).inputs()[0].0;
        assert!(tree.node(child).can_emit());
        assert!(tree.node(child).steps().is_empty());
    }

    #[test]
    fn test_container_inputs_get_one_child_per_slot() {
        let mut catalog = StaticCatalog::new();
        catalog.set_container(WATER, BUCKET);
        catalog
            .add_rule(
                ProductionRule::crafting(
                    1,
                    "Clay".into(),
                    vec![Some(WATER.amount(1)), Some(A.amount(1)), Some(A.amount(1))],
                    vec![B.amount(1)],
                )
                .unwrap(),
            )
            .unwrap();
        let tree = DemandTree::build(&catalog, B);
        let step = tree.step(tree.node(tree.root()).steps()[0]);

        assert!(step.limit_one_per_cycle());
        assert!(step.recycles_containers());
        let slots: Vec<Option<usize>> = step.inputs().iter().map(|&(n, _)| tree.node(n).slot()).collect();
        assert_eq!(slots, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_crafting_inputs_condensed_to_first_slot() {
        let mut catalog = StaticCatalog::new();
        catalog
            .add_rule(
                ProductionRule::crafting(
                    1,
                    "Sticks".into(),
                    vec![None, Some(A.amount(1)), None, Some(A.amount(1))],
                    vec![B.amount(4)],
                )
                .unwrap(),
            )
            .unwrap();
        let tree = DemandTree::build(&catalog, B);
        let step = tree.step(tree.node(tree.root()).steps()[0]);

        assert_eq!(step.inputs().len(), 1);
        let (child, per_craft) = step.inputs()[0];
        assert_eq!(per_craft, 2);
        assert_eq!(tree.node(child).slot(), Some(1));
    }

    #[test]
    fn test_get_times() {
        let catalog = cyclic_catalog();
        let tree = DemandTree::build(&catalog, R);
        let step = tree.step(tree.node(tree.root()).steps()[0]);
        assert_eq!(step.get_times(6, 3), 2);
        assert_eq!(step.get_times(7, 3), 3);
        assert_eq!(step.get_times(1, 3), 1);
    }

    #[test]
    fn test_amount_crafted_damageable_fallback() {
        let mut catalog = StaticCatalog::new();
        catalog.set_damageable(A.item);
        catalog
            .add_rule(
                ProductionRule::processing(1, "Tool".into(), vec![B.amount(1)], vec![ResourceKey::variant(A.item, 0).amount(1)])
                    .unwrap(),
            )
            .unwrap();
        let worn = ResourceKey::variant(A.item, 7);
        let tree = DemandTree::build(&catalog, worn);
        let step = tree.node(tree.root()).steps()[0];

        let made = tree.amount_crafted(&catalog, step, &worn).unwrap();
        assert_eq!(made, A.amount(1));

        let err = tree.amount_crafted(&catalog, step, &R).unwrap_err();
        assert_eq!(err, ConsistencyError::UnmatchedOutput { rule: 1, resource: R });
    }

    #[test]
    fn test_ledger_replay_keeps_history() {
        let mut ledger = ReservationLedger::default();
        ledger.record(A.amount(4));
        ledger.record(B.amount(1));
        ledger.replay_negated(&[A.amount(4)]);

        assert_eq!(ledger.entries().len(), 3);
        assert_eq!(ledger.entries()[2], A.amount(-4));
        assert_eq!(ledger.net().to_vec(), vec![B.amount(1)]);
    }

    #[test]
    fn test_cost_of_untouched_tree_is_overheads() {
        let catalog = cyclic_catalog();
        let tree = DemandTree::build(&catalog, R);
        let config = ResolverConfig::default();
        // 3 nodes and 2 steps at 8 bytes each.
        assert_eq!(tree.report_cost(&config), 40);
        assert!(tree.plan(&config).is_complete());
    }
}
