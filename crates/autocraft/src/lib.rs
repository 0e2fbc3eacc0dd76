//! # AUTOCRAFT Demand Resolution
//!
//! Recursive crafting-demand resolution for automated production networks.
//!
//! Given a target resource and amount, the resolver decides whether the demand
//! can be met from a shared pool, by emitting, or by recursively applying
//! production rules to make missing intermediates. The outcome is either a
//! solved tree that can be assigned to a worker, or a plan listing what is
//! missing.
//!
//! ## Design Principles
//!
//! 1. **Integers only** - All quantities are `i64`, all costs are `u64`
//! 2. **Acyclic by construction** - Rules that mention an ancestor's resource are never added
//! 3. **Transactional exploration** - Alternatives run on nested overlays, never on the pool
//! 4. **Cooperative execution** - Resolution suspends at checkpoints and resumes on the next tick
//! 5. **External configuration** - Rule catalogs and resolver settings load from TOML
//!
//! ## Thread Safety
//!
//! Everything runs on the owning tick thread. Jobs and tasks are `!Send`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use autocraft::{assign_to_worker, ActorContext, MemoryWorker, ResolutionJob, StaticCatalog};
//!
//! let catalog = StaticCatalog::from_toml_file("data/rules.toml")?;
//! let mut job = ResolutionJob::new(&catalog, &pool, ResolverConfig::default())?;
//!
//! match job.request_resolution(ResourceKey::item(PISTON), 16, actor)? {
//!     Resolution::Success(resolved) => {
//!         let mut worker = MemoryWorker::new(4096);
//!         assign_to_worker(&resolved, &mut pool, &mut worker, &actor)?;
//!     }
//!     Resolution::Shortage(plan) => show_missing(&plan.missing),
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod assignment;
pub mod catalog;
pub mod config;
pub mod error;
pub mod inventory;
pub mod job;
pub mod pool;
mod resolve;
pub mod resource;
pub mod rule;
pub mod tree;

pub use assignment::{assign_to_worker, AssignmentReceipt, ExecutionWorker, MemoryWorker};
pub use catalog::{ResourceCatalog, SlotContext, StaticCatalog};
pub use config::ResolverConfig;
pub use error::{BranchFailure, ConsistencyError, ResolveError, ResolveResult};
pub use inventory::{BranchId, ResolutionInventory};
pub use job::{JobHandle, Resolution, ResolutionJob, ResolutionTask, ResolvedTree};
pub use pool::{MemoryPool, PoolSnapshot, ResourcePool};
pub use resource::{Actionable, ActorContext, ItemId, ResourceAmount, ResourceKey, ResourceList};
pub use rule::{ProductionRule, RuleId, SlotFilter};
pub use tree::{DemandNode, DemandTree, NodeId, ProductionStep, ReservationLedger, ResolutionPlan, StepId};
