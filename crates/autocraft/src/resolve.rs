//! # Demand Resolution
//!
//! The mutually recursive `resolve` (demand node) and `apply` (production step)
//! passes over a [`DemandTree`].
//!
//! Both return boxed futures so the whole call chain can be suspended at a
//! checkpoint and resumed on a later tick with every partial result intact.
//! Nothing here blocks: a pending checkpoint simply returns `Pending` up the
//! chain to the task driver in [`crate::job`].
//!
//! ## Resolution order for one node
//!
//! 1. Extract what the inventory already holds (substitutes included).
//! 2. Emit the rest if the catalog allows it.
//! 3. Otherwise craft: one candidate loops in batches, several candidates
//!    are tried one craft at a time, each craft on its own branch.
//! 4. Still short: record the shortage (simulate) or roll back the pool
//!    reservations made at or below the node for this request, and fail the
//!    branch.
//!
//! ## Reservation frames
//!
//! Each `resolve` call opens a frame listing the pool reservations made by its
//! request, its own and those of every child request that succeeded. A
//! successful request hands its frame to the caller's frame. A failed request,
//! or a discarded candidate branch, releases the reservations it made.

use futures::future::{FutureExt, LocalBoxFuture};

use crate::catalog::ResourceCatalog;
use crate::error::{BranchFailure, ResolveError, ResolveResult};
use crate::inventory::ResolutionInventory;
use crate::job::JobControl;
use crate::resource::{Actionable, ActorContext, ResourceAmount, ResourceKey, ResourceList};
use crate::tree::{DemandTree, NodeId, StepId};

/// Pool reservations made by one request, with the node that made each.
type ReservationFrame = Vec<(NodeId, ResourceAmount)>;

/// Everything one resolution pass reads and mutates.
pub(crate) struct ResolveContext<'a> {
    tree: &'a mut DemandTree,
    inventory: &'a mut ResolutionInventory,
    /// Job-wide copy of the pool used to guess what comes from the pool.
    reservations: &'a mut ResourceList,
    catalog: &'a dyn ResourceCatalog,
    control: &'a JobControl,
    actor: ActorContext,
    /// One frame per `resolve` call in progress, innermost last.
    frames: Vec<ReservationFrame>,
}

impl<'a> ResolveContext<'a> {
    pub(crate) fn new(
        tree: &'a mut DemandTree,
        inventory: &'a mut ResolutionInventory,
        reservations: &'a mut ResourceList,
        catalog: &'a dyn ResourceCatalog,
        control: &'a JobControl,
        actor: ActorContext,
    ) -> Self {
        Self {
            tree,
            inventory,
            reservations,
            catalog,
            control,
            actor,
            frames: Vec::new(),
        }
    }

    /// Supplies `requested` of the node's target into the current branch, then
    /// takes it back out for the caller.
    ///
    /// Returns the resource actually used, which may be a substitute.
    pub(crate) fn resolve<'s>(
        &'s mut self,
        node: NodeId,
        requested: i64,
    ) -> LocalBoxFuture<'s, ResolveResult<ResourceAmount>> {
        async move {
            self.frames.push(ReservationFrame::new());
            let outcome = self.request(node, requested).await;
            let frame = self.frames.pop().unwrap_or_default();

            match &outcome {
                Ok(_) => {
                    if let Some(caller) = self.frames.last_mut() {
                        caller.extend(frame);
                    }
                }
                Err(ResolveError::Branch(_)) => self.release(frame),
                // Fatal errors unwind the whole attempt; the next one resets the tree.
                Err(_) => {}
            }
            outcome
        }
        .boxed_local()
    }

    async fn request(&mut self, node: NodeId, requested: i64) -> ResolveResult<ResourceAmount> {
        self.control.checkpoint().await?;

        let target = self.tree.node(node).target();
        let mut remaining = requested;
        let mut used = target;

        for candidate in self.match_set(node) {
            let got = self.inventory.extract(&candidate, remaining, Actionable::Modulate);
            if got > 0 {
                self.reserve(node, candidate.amount(got));
                self.tree.node_mut(node).bytes += got.unsigned_abs();
                remaining -= got;
                used = candidate;
            }
            if remaining == 0 {
                return Ok(used.amount(requested));
            }
        }

        if self.tree.node(node).can_emit() {
            let n = self.tree.node_mut(node);
            n.emitted += remaining;
            n.bytes += remaining.unsigned_abs();
            tracing::trace!(resource = %target, amount = remaining, "emitted");
            return Ok(target.amount(requested));
        }

        self.tree.node_mut(node).exhausted = true;

        let steps = self.tree.node(node).steps().to_vec();
        if let &[step] = steps.as_slice() {
            // A failing single candidate still has to roll back its reservations.
            match self.produce_batched(node, step, &mut remaining, &mut used).await {
                Ok(()) | Err(ResolveError::Branch(_)) => {}
                Err(e) => return Err(e),
            }
        } else if steps.len() > 1 {
            self.produce_split(node, &steps, &mut remaining, &mut used).await?;
        }

        if remaining <= 0 {
            return Ok(used.amount(requested));
        }

        if self.tree.node(node).is_simulating() {
            let n = self.tree.node_mut(node);
            n.missing += remaining;
            n.bytes += remaining.unsigned_abs();
            return Ok(target.amount(remaining));
        }

        tracing::trace!(
            resource = %target,
            short = remaining,
            actor = %self.actor,
            "branch failed"
        );
        Err(BranchFailure {
            resource: target,
            amount_short: remaining,
        }
        .into())
    }

    /// Runs `step` `times` times: resolves every input, puts back container
    /// remainders, then injects the outputs.
    pub(crate) fn apply<'s>(
        &'s mut self,
        step: StepId,
        times: i64,
    ) -> LocalBoxFuture<'s, ResolveResult<()>> {
        async move {
            self.control.checkpoint().await?;
            self.tree.step_mut(step).applications += 1;

            let inputs = self.tree.step(step).inputs().to_vec();
            let recycles = self.tree.step(step).recycles_containers();
            for (child, per_craft) in inputs {
                let wanted = per_craft
                    .checked_mul(times)
                    .ok_or(ResolveError::ArithmeticOverflow)?;
                let used = self.resolve(child, wanted).await?;

                if recycles {
                    if let Some(container) = self.catalog.container_remainder(&used.key) {
                        self.inventory.inject(&container, wanted, Actionable::Modulate);
                        self.tree.step_mut(step).bytes += 1;
                    }
                }
            }

            let outputs = self.tree.step(step).rule().outputs().to_vec();
            for out in outputs {
                let made = out
                    .amount
                    .checked_mul(times)
                    .ok_or(ResolveError::ArithmeticOverflow)?;
                self.inventory.inject(&out.key, made, Actionable::Modulate);
            }

            self.tree.step_mut(step).crafts += times;
            Ok(())
        }
        .boxed_local()
    }

    /// Keys to extract directly, in order.
    fn match_set(&self, node: NodeId) -> Vec<ResourceKey> {
        let n = self.tree.node(node);
        let target = n.target();
        let (Some(parent), Some(slot)) = (n.parent(), n.slot()) else {
            return vec![target];
        };
        let rule = self.tree.step(parent).rule();
        if !rule.is_craftable() {
            return vec![target];
        }

        let mut keys: Vec<ResourceKey> = Vec::new();
        if rule.can_substitute() {
            for substitute in rule.substitute_inputs(slot) {
                for found in self.inventory.find_fuzzy(&substitute) {
                    if !keys.contains(&found.key) {
                        keys.push(found.key);
                    }
                }
            }
        } else if self.inventory.amount(&target) > 0 {
            keys.push(target);
        }
        keys.retain(|key| rule.is_valid_for_slot(slot, key));
        keys
    }

    /// Counts an extraction against the pool while the node still believes
    /// the pool supplies it.
    fn reserve(&mut self, node: NodeId, extracted: ResourceAmount) {
        if self.tree.node(node).is_exhausted() {
            return;
        }
        let taken = self.reservations.take(&extracted.key, extracted.amount);
        if taken > 0 {
            let reservation = extracted.with_amount(taken);
            self.tree.node_mut(node).pool_sourced.record(reservation);
            if let Some(frame) = self.frames.last_mut() {
                frame.push((node, reservation));
            }
        }
    }

    /// Reservations recorded in the current frame so far.
    fn frame_mark(&self) -> usize {
        self.frames.last().map_or(0, Vec::len)
    }

    /// Hands back everything the current frame reserved since `mark`.
    fn release_since(&mut self, mark: usize) {
        let released = match self.frames.last_mut() {
            Some(frame) if frame.len() > mark => frame.split_off(mark),
            _ => return,
        };
        self.release(released);
    }

    /// Returns reservations to the job-wide list and records their negation
    /// in the ledger of the node that made them.
    fn release(&mut self, frame: ReservationFrame) {
        for (owner, reservation) in frame {
            self.reservations.add_amount(reservation);
            self.tree
                .node_mut(owner)
                .pool_sourced
                .replay_negated(&[reservation]);
        }
    }

    /// Single candidate: craft as many as needed per round until satisfied.
    async fn produce_batched(
        &mut self,
        node: NodeId,
        step: StepId,
        remaining: &mut i64,
        used: &mut ResourceKey,
    ) -> ResolveResult<()> {
        let target = self.tree.node(node).target();
        while self.tree.step(step).possible && *remaining > 0 {
            let made = self.tree.amount_crafted(self.catalog, step, &target)?;
            let times = self.tree.step(step).get_times(*remaining, made.amount);
            self.apply(step, times).await?;

            let got = self.inventory.extract(&made.key, *remaining, Actionable::Modulate);
            if got > 0 {
                self.tree.node_mut(node).bytes += got.unsigned_abs();
                *remaining -= got;
                *used = made.key;
            } else {
                self.tree.step_mut(step).possible = false;
            }
        }
        Ok(())
    }

    /// Several candidates: one craft at a time on a nested branch, so demand
    /// can be split across rules.
    async fn produce_split(
        &mut self,
        node: NodeId,
        steps: &[StepId],
        remaining: &mut i64,
        used: &mut ResourceKey,
    ) -> ResolveResult<()> {
        let target = self.tree.node(node).target();
        for &step in steps {
            let made = self.tree.amount_crafted(self.catalog, step, &target)?;
            while self.tree.step(step).possible && *remaining > 0 {
                let saved = self.tree.save_accounting(step);
                let mark = self.frame_mark();
                let branch = self.inventory.branch();

                match self.apply(step, 1).await {
                    Ok(()) => {}
                    Err(ResolveError::Branch(failure)) => {
                        self.inventory.discard(branch)?;
                        self.tree.restore_accounting(saved);
                        self.release_since(mark);
                        tracing::trace!(
                            rule = self.tree.step(step).rule().id,
                            %failure,
                            "candidate step failed, trying next"
                        );
                        break;
                    }
                    Err(e) => {
                        self.inventory.discard(branch)?;
                        self.release_since(mark);
                        return Err(e);
                    }
                }

                let got = self.inventory.extract(&made.key, *remaining, Actionable::Modulate);
                if got > 0 {
                    self.inventory.commit(branch)?;
                    self.tree.node_mut(node).bytes += got.unsigned_abs();
                    *remaining -= got;
                    *used = made.key;
                } else {
                    self.inventory.discard(branch)?;
                    self.tree.restore_accounting(saved);
                    self.release_since(mark);
                    self.tree.step_mut(step).possible = false;
                }
            }
        }
        Ok(())
    }
}
