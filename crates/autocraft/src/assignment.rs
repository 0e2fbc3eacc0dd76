//! # Execution Assignment
//!
//! Hands a solved tree to a worker.
//!
//! The tree is walked a second time using only what the resolution recorded:
//! net pool reservations per node, emitted amounts and craft counts. Nothing
//! from the resolution inventory is reused, since the pool may have changed in
//! the meantime.
//!
//! ## Guarantees
//!
//! - **Pool**: all or nothing. Reservations are taken from a fresh snapshot
//!   and only flushed into the real pool once every one of them succeeded.
//! - **Worker**: registrations made before a failure stay; callers reset the
//!   worker and retry the whole assignment.

use std::sync::Arc;

use crate::error::{BranchFailure, ResolveError, ResolveResult};
use crate::inventory::ResolutionInventory;
use crate::job::ResolvedTree;
use crate::pool::ResourcePool;
use crate::resource::{Actionable, ActorContext, ResourceAmount, ResourceList};
use crate::rule::{ProductionRule, RuleId};
use crate::tree::NodeId;

/// The private buffer and execution queue a plan is assigned to.
pub trait ExecutionWorker {
    /// Bytes the worker can still take on.
    fn available_bytes(&self) -> u64;

    /// Moves a resource into the worker's private buffer.
    fn deposit(&mut self, resource: ResourceAmount, actor: &ActorContext);

    /// Allows the worker to emit a resource.
    fn add_emit_credit(&mut self, resource: ResourceAmount, actor: &ActorContext);

    /// Queues `crafts` runs of `rule`.
    fn queue_crafts(&mut self, rule: Arc<ProductionRule>, crafts: i64, actor: &ActorContext);
}

/// In-memory worker.
#[derive(Debug, Default)]
pub struct MemoryWorker {
    capacity_bytes: u64,
    used_bytes: u64,
    buffer: ResourceList,
    emit_credits: ResourceList,
    queue: Vec<(Arc<ProductionRule>, i64)>,
}

impl MemoryWorker {
    /// Creates an idle worker with the given capacity.
    #[must_use]
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            capacity_bytes,
            ..Self::default()
        }
    }

    /// Marks `bytes` of the capacity as taken.
    pub fn reserve_bytes(&mut self, bytes: u64) {
        self.used_bytes = self.used_bytes.saturating_add(bytes);
    }

    /// Resources deposited so far.
    #[must_use]
    pub const fn buffer(&self) -> &ResourceList {
        &self.buffer
    }

    /// Emit credits registered so far.
    #[must_use]
    pub const fn emit_credits(&self) -> &ResourceList {
        &self.emit_credits
    }

    /// Queued rules with their craft counts, in assignment order.
    #[must_use]
    pub fn queue(&self) -> &[(Arc<ProductionRule>, i64)] {
        &self.queue
    }

    /// Forgets everything assigned, keeping the capacity.
    pub fn reset(&mut self) {
        self.used_bytes = 0;
        self.buffer = ResourceList::new();
        self.emit_credits = ResourceList::new();
        self.queue.clear();
    }
}

impl ExecutionWorker for MemoryWorker {
    fn available_bytes(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.used_bytes)
    }

    fn deposit(&mut self, resource: ResourceAmount, _actor: &ActorContext) {
        self.buffer.add_amount(resource);
    }

    fn add_emit_credit(&mut self, resource: ResourceAmount, _actor: &ActorContext) {
        self.emit_credits.add_amount(resource);
    }

    fn queue_crafts(&mut self, rule: Arc<ProductionRule>, crafts: i64, _actor: &ActorContext) {
        self.queue.push((rule, crafts));
    }
}

/// What an assignment registered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssignmentReceipt {
    /// Resources moved from the pool into the worker.
    pub deposited: Vec<ResourceAmount>,
    /// Emit credits granted.
    pub emit_credits: Vec<ResourceAmount>,
    /// Queued rules with craft counts.
    pub queued: Vec<(RuleId, i64)>,
    /// Capacity the plan needs.
    pub bytes: u64,
}

/// Commits a solved tree against `pool` and registers it with `worker`.
///
/// # Errors
///
/// - `InsufficientCapacity` if the worker cannot hold the plan
/// - `Branch` if the pool no longer holds a reserved resource
/// - `Consistency` if the pool refuses the final flush
pub fn assign_to_worker(
    resolved: &ResolvedTree,
    pool: &mut dyn ResourcePool,
    worker: &mut dyn ExecutionWorker,
    actor: &ActorContext,
) -> ResolveResult<AssignmentReceipt> {
    let required = resolved.bytes();
    let available = worker.available_bytes();
    if available < required {
        tracing::warn!(required, available, %actor, "worker too small for plan");
        return Err(ResolveError::InsufficientCapacity {
            required,
            available,
        });
    }

    let tree = resolved.tree();
    let mut fresh = ResolutionInventory::snapshot(pool);
    let mut deposited = ResourceList::new();
    let mut receipt = AssignmentReceipt {
        bytes: required,
        ..AssignmentReceipt::default()
    };

    // Pre-order walk: a node, then its steps, then their inputs.
    let mut pending: Vec<NodeId> = vec![tree.root()];
    while let Some(id) = pending.pop() {
        let node = tree.node(id);

        for reservation in node.pool_sourced().net().iter() {
            let taken = fresh.extract(&reservation.key, reservation.amount, Actionable::Modulate);
            if taken != reservation.amount {
                tracing::warn!(
                    resource = %reservation.key,
                    wanted = reservation.amount,
                    taken,
                    %actor,
                    "pool changed since resolution"
                );
                return Err(BranchFailure {
                    resource: reservation.key,
                    amount_short: reservation.amount - taken,
                }
                .into());
            }
            worker.deposit(reservation, actor);
            deposited.add_amount(reservation);
        }

        if node.emitted() > 0 {
            let credit = node.target().amount(node.emitted());
            worker.add_emit_credit(credit, actor);
            receipt.emit_credits.push(credit);
        }

        // Reversed so the first step's inputs are visited first.
        for &step_id in node.steps().iter().rev() {
            let step = tree.step(step_id);
            pending.extend(step.inputs().iter().rev().map(|&(child, _)| child));
        }
        for &step_id in node.steps() {
            let step = tree.step(step_id);
            if step.crafts() > 0 {
                worker.queue_crafts(Arc::clone(step.rule()), step.crafts(), actor);
                receipt.queued.push((step.rule().id, step.crafts()));
            }
        }
    }

    fresh.flush_into(pool, actor)?;
    receipt.deposited = deposited.to_vec();
    tracing::debug!(
        deposited = receipt.deposited.len(),
        queued = receipt.queued.len(),
        bytes = required,
        %actor,
        "plan assigned to worker"
    );
    Ok(receipt)
}
