//! # Resolution Jobs
//!
//! A [`ResolutionJob`] drives top-level attempts against one pool snapshot.
//!
//! ## Cooperative Execution
//!
//! A resolution may span many host ticks. Every entry into `resolve` and
//! `apply` awaits a checkpoint that consumes one unit of the tick budget:
//!
//! - budget spent or job paused: the checkpoint returns `Pending` and the
//!   whole call chain stays suspended with its state intact
//! - job cancelled: the checkpoint fails with [`ResolveError::Cancelled`] and
//!   the attempt unwinds, discarding every open branch
//!
//! The host owns a [`ResolutionTask`] and calls [`ResolutionTask::tick`] once
//! per tick. No executor or thread is involved.
//!
//! ```rust,ignore
//! let mut job = ResolutionJob::new(&catalog, &pool, config)?;
//! let handle = job.handle();
//! let mut task = job.start_resolution(target, 64, actor);
//! let outcome = loop {
//!     if let Some(outcome) = task.tick() {
//!         break outcome;
//!     }
//!     // other tick work; handle.pause() / handle.cancel() may be called here
//! };
//! ```

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::future::{FutureExt, LocalBoxFuture};
use futures::task::noop_waker_ref;

use crate::catalog::ResourceCatalog;
use crate::config::ResolverConfig;
use crate::error::{ConsistencyError, ResolveError, ResolveResult};
use crate::inventory::ResolutionInventory;
use crate::pool::ResourcePool;
use crate::resolve::ResolveContext;
use crate::resource::{ActorContext, ResourceAmount, ResourceKey};
use crate::tree::{DemandTree, ResolutionPlan};

// ============================================================================
// Control block
// ============================================================================

/// Pause/cancel flags and tick budget shared by a job, its task and handles.
#[derive(Debug, Default)]
pub(crate) struct JobControl {
    paused: Cell<bool>,
    cancelled: Cell<bool>,
    budget: Cell<u32>,
    suspensions: Cell<u64>,
    checkpoints: Cell<u64>,
}

impl JobControl {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Clears flags and counters for a new attempt.
    fn start(&self) {
        self.paused.set(false);
        self.cancelled.set(false);
        self.suspensions.set(0);
        self.checkpoints.set(0);
    }

    pub(crate) fn set_budget(&self, budget: u32) {
        self.budget.set(budget);
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.set(true);
    }

    fn resume(&self) {
        self.paused.set(false);
    }

    /// Suspension point awaited on every entry into `resolve` and `apply`.
    pub(crate) fn checkpoint(&self) -> Checkpoint<'_> {
        Checkpoint { control: self }
    }
}

/// Future that passes once the job may make progress.
pub(crate) struct Checkpoint<'a> {
    control: &'a JobControl,
}

impl Future for Checkpoint<'_> {
    type Output = ResolveResult<()>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let control = self.control;
        if control.cancelled.get() {
            return Poll::Ready(Err(ResolveError::Cancelled));
        }
        let budget = control.budget.get();
        if control.paused.get() || budget == 0 {
            control.suspensions.set(control.suspensions.get() + 1);
            return Poll::Pending;
        }
        control.budget.set(budget - 1);
        control.checkpoints.set(control.checkpoints.get() + 1);
        Poll::Ready(Ok(()))
    }
}

/// Polls a boxed future once.
///
/// The host re-polls every tick, so the waker is a no-op.
pub(crate) fn poll_once<T>(future: &mut LocalBoxFuture<'_, T>) -> Poll<T> {
    let mut cx = Context::from_waker(noop_waker_ref());
    future.poll_unpin(&mut cx)
}

/// Host-side controls of a job.
///
/// Handles are cheap to clone and stay valid while a task is running.
#[derive(Clone, Debug)]
pub struct JobHandle(Rc<JobControl>);

impl JobHandle {
    /// Suspends the running task at its next checkpoint.
    pub fn pause(&self) {
        self.0.paused.set(true);
    }

    /// Lets a paused task continue on the next tick.
    pub fn resume(&self) {
        self.0.resume();
    }

    /// Asks the running task to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// Checks if the job is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.0.paused.get()
    }

    /// Checks if cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.get()
    }

    /// Times the current task was suspended.
    #[must_use]
    pub fn suspensions(&self) -> u64 {
        self.0.suspensions.get()
    }

    /// Checkpoints the current task has passed.
    #[must_use]
    pub fn checkpoints(&self) -> u64 {
        self.0.checkpoints.get()
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// A fully resolved request, ready for assignment.
#[derive(Debug)]
pub struct ResolvedTree {
    tree: DemandTree,
    request: ResourceAmount,
    bytes: u64,
}

impl ResolvedTree {
    /// The solved tree with its ledgers and craft counts.
    #[must_use]
    pub const fn tree(&self) -> &DemandTree {
        &self.tree
    }

    /// What was requested.
    #[must_use]
    pub const fn request(&self) -> ResourceAmount {
        self.request
    }

    /// Cost reported after resolution.
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Summary of the solved tree.
    #[must_use]
    pub fn plan(&self, config: &ResolverConfig) -> ResolutionPlan {
        self.tree.plan(config)
    }
}

/// Result of [`ResolutionJob::request_resolution`].
#[derive(Debug)]
pub enum Resolution {
    /// The request can be met.
    Success(ResolvedTree),
    /// The request cannot be met; the plan lists what is missing.
    Shortage(ResolutionPlan),
}

impl Resolution {
    /// Checks if the request can be met.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the resolved tree on success.
    #[must_use]
    pub fn into_resolved(self) -> Option<ResolvedTree> {
        match self {
            Self::Success(resolved) => Some(resolved),
            Self::Shortage(_) => None,
        }
    }

    /// Returns the shortage plan on failure.
    #[must_use]
    pub fn into_shortage(self) -> Option<ResolutionPlan> {
        match self {
            Self::Success(_) => None,
            Self::Shortage(plan) => Some(plan),
        }
    }
}

// ============================================================================
// Job
// ============================================================================

/// Orchestrates resolution attempts against one pool snapshot.
///
/// Successful requests are committed into the job's inventory, so later
/// requests of the same job see what earlier ones used. The real pool is only
/// touched by [`crate::assignment::assign_to_worker`].
pub struct ResolutionJob<'c> {
    catalog: &'c dyn ResourceCatalog,
    inventory: ResolutionInventory,
    config: ResolverConfig,
    control: Rc<JobControl>,
    /// Kept between attempts on the same target.
    tree: Option<DemandTree>,
    /// Cost of the last finished attempt.
    last_cost: Option<u64>,
}

impl<'c> ResolutionJob<'c> {
    /// Creates a job over the current contents of `pool`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration is invalid.
    pub fn new(
        catalog: &'c dyn ResourceCatalog,
        pool: &dyn ResourcePool,
        config: ResolverConfig,
    ) -> ResolveResult<Self> {
        config.validate()?;
        Ok(Self {
            catalog,
            inventory: ResolutionInventory::snapshot(pool),
            config,
            control: Rc::new(JobControl::new()),
            tree: None,
            last_cost: None,
        })
    }

    /// Host-side controls for this job's tasks.
    #[must_use]
    pub fn handle(&self) -> JobHandle {
        JobHandle(Rc::clone(&self.control))
    }

    /// The job's view of the pool.
    #[must_use]
    pub const fn inventory(&self) -> &ResolutionInventory {
        &self.inventory
    }

    /// The resolver settings.
    #[must_use]
    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// The tree kept from the last shortage or simulation, if any.
    #[must_use]
    pub const fn tree(&self) -> Option<&DemandTree> {
        self.tree.as_ref()
    }

    /// Cost of the last finished attempt.
    ///
    /// After a success this equals [`ResolvedTree::bytes`]; after a shortage or
    /// simulation it is the plan's cost. `None` while an attempt is in flight
    /// or after one was abandoned.
    #[must_use]
    pub const fn report_cost(&self) -> Option<u64> {
        self.last_cost
    }

    /// Starts a real attempt. Nothing runs until the task is ticked.
    pub fn start_resolution(
        &mut self,
        target: ResourceKey,
        amount: i64,
        actor: ActorContext,
    ) -> ResolutionTask<'_, Resolution> {
        self.begin();
        let control = Rc::clone(&self.control);
        let budget = self.config.checkpoints_per_tick;
        let future = self.run_request(target, amount, actor).boxed_local();
        ResolutionTask {
            future: Some(future),
            control,
            budget,
        }
    }

    /// Starts a simulated attempt. Nothing runs until the task is ticked.
    pub fn start_simulation(
        &mut self,
        target: ResourceKey,
        amount: i64,
        actor: ActorContext,
    ) -> ResolutionTask<'_, ResolutionPlan> {
        self.begin();
        let control = Rc::clone(&self.control);
        let budget = self.config.checkpoints_per_tick;
        let future = self.run_simulation(target, amount, actor).boxed_local();
        ResolutionTask {
            future: Some(future),
            control,
            budget,
        }
    }

    /// Resolves `amount` of `target` in one go.
    ///
    /// # Errors
    ///
    /// Returns any error other than a branch failure; shortages are reported as
    /// [`Resolution::Shortage`].
    pub fn request_resolution(
        &mut self,
        target: ResourceKey,
        amount: i64,
        actor: ActorContext,
    ) -> ResolveResult<Resolution> {
        self.start_resolution(target, amount, actor).run_to_completion()
    }

    /// Plans `amount` of `target` without failing on shortages.
    ///
    /// Against an unchanged job the result is always the same.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a non-positive amount, or a consistency or
    /// overflow error from the attempt.
    pub fn simulate_resolution(
        &mut self,
        target: ResourceKey,
        amount: i64,
        actor: ActorContext,
    ) -> ResolveResult<ResolutionPlan> {
        self.start_simulation(target, amount, actor).run_to_completion()
    }

    fn begin(&mut self) {
        let abandoned = self.inventory.rollback_open_branches();
        if abandoned > 0 {
            tracing::warn!(abandoned, "previous attempt was dropped mid-flight");
        }
        self.control.start();
        self.last_cost = None;
    }

    fn take_tree(&mut self, target: ResourceKey) -> DemandTree {
        match self.tree.take() {
            Some(tree) if tree.target() == target => tree,
            _ => DemandTree::build(self.catalog, target),
        }
    }

    async fn run_request(
        &mut self,
        target: ResourceKey,
        amount: i64,
        actor: ActorContext,
    ) -> ResolveResult<Resolution> {
        check_amount(amount)?;
        tracing::debug!(%target, amount, %actor, "resolution requested");

        let control = Rc::clone(&self.control);
        let mut tree = self.take_tree(target);
        tree.reset(false);
        let mut reservations = self.inventory.list();
        let root = tree.root();

        let branch = self.inventory.branch();
        let outcome = ResolveContext::new(&mut tree, &mut self.inventory, &mut reservations, self.catalog, &control, actor)
            .resolve(root, amount)
            .await;

        match outcome {
            Ok(_) => {
                self.inventory.commit(branch)?;
                let bytes = tree.report_cost(&self.config);
                self.last_cost = Some(bytes);
                tracing::debug!(%target, amount, bytes, %actor, "resolution succeeded");
                Ok(Resolution::Success(ResolvedTree {
                    tree,
                    request: target.amount(amount),
                    bytes,
                }))
            }
            Err(ResolveError::Branch(failure)) => {
                self.inventory.discard(branch)?;
                self.tree = Some(tree);
                tracing::warn!(%target, amount, %failure, %actor, "resolution short, planning shortage");
                let plan = self.run_simulation(target, amount, actor).await?;
                Ok(Resolution::Shortage(plan))
            }
            Err(e) => {
                self.inventory.discard(branch)?;
                self.tree = Some(tree);
                tracing::debug!(%target, error = %e, %actor, "resolution abandoned");
                Err(e)
            }
        }
    }

    async fn run_simulation(
        &mut self,
        target: ResourceKey,
        amount: i64,
        actor: ActorContext,
    ) -> ResolveResult<ResolutionPlan> {
        check_amount(amount)?;

        let control = Rc::clone(&self.control);
        let mut tree = self.take_tree(target);
        tree.reset(true);
        let mut scratch = ResolutionInventory::new(self.inventory.list());
        let mut reservations = scratch.list();
        let root = tree.root();

        let outcome = ResolveContext::new(&mut tree, &mut scratch, &mut reservations, self.catalog, &control, actor)
            .resolve(root, amount)
            .await;

        let plan = outcome.map(|_| tree.plan(&self.config));
        self.tree = Some(tree);
        let plan = plan?;
        self.last_cost = Some(plan.bytes);
        tracing::debug!(
            %target,
            amount,
            missing = plan.missing.len(),
            bytes = plan.bytes,
            %actor,
            "simulation finished"
        );
        Ok(plan)
    }
}

fn check_amount(amount: i64) -> ResolveResult<()> {
    if amount <= 0 {
        return Err(ResolveError::InvalidConfig(format!(
            "requested amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

// ============================================================================
// Task
// ============================================================================

/// An attempt in flight, driven by the host tick loop.
///
/// Borrows its job until finished or dropped. Dropping an unfinished task
/// abandons the attempt; the job drops its leftover branches on the next start.
pub struct ResolutionTask<'j, T> {
    future: Option<LocalBoxFuture<'j, ResolveResult<T>>>,
    control: Rc<JobControl>,
    budget: u32,
}

impl<T> ResolutionTask<'_, T> {
    /// Host-side controls of the owning job.
    #[must_use]
    pub fn handle(&self) -> JobHandle {
        JobHandle(Rc::clone(&self.control))
    }

    /// Checks if the result was already returned.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.future.is_none()
    }

    /// Runs until the configured checkpoint budget is spent.
    ///
    /// Returns the result exactly once, on the tick the attempt finishes.
    pub fn tick(&mut self) -> Option<ResolveResult<T>> {
        self.tick_with_budget(self.budget)
    }

    /// Runs until `budget` checkpoints have passed or the attempt finishes.
    pub fn tick_with_budget(&mut self, budget: u32) -> Option<ResolveResult<T>> {
        let future = self.future.as_mut()?;
        self.control.set_budget(budget);
        match poll_once(future) {
            Poll::Ready(result) => {
                self.future = None;
                Some(result)
            }
            Poll::Pending => {
                tracing::trace!(
                    checkpoints = self.control.checkpoints.get(),
                    "resolution suspended"
                );
                None
            }
        }
    }

    /// Resumes the task if paused and ticks it until it finishes.
    ///
    /// # Errors
    ///
    /// Returns the attempt's error, or `TaskFinished` if the result was
    /// already taken by [`ResolutionTask::tick`].
    pub fn run_to_completion(mut self) -> ResolveResult<T> {
        if self.is_finished() {
            return Err(ConsistencyError::TaskFinished.into());
        }
        loop {
            self.control.resume();
            if let Some(result) = self.tick() {
                return result;
            }
        }
    }
}
