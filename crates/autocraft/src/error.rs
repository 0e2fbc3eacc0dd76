//! # Resolution Error Types
//!
//! All errors that can occur while building, resolving or assigning a demand tree.
//!
//! Only [`BranchFailure`] is expected during normal operation: it is raised when
//! one branch of the tree cannot be satisfied and is recovered by trying the next
//! production step. Everything else ends the attempt.

use thiserror::Error;

use crate::resource::ResourceKey;
use crate::rule::RuleId;

/// A demand that could not be met on the current branch.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("branch failure: short {amount_short} of {resource}")]
pub struct BranchFailure {
    /// The resource that could not be supplied.
    pub resource: ResourceKey,
    /// How much of it was still missing.
    pub amount_short: i64,
}

/// A broken invariant of the branch discipline or of the tree itself.
///
/// These are never retried: the attempt that observed one is abandoned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    /// A branch was committed or discarded out of nesting order.
    #[error("branch {found} is not the innermost open branch (expected {expected})")]
    BranchOrder {
        /// The innermost open branch.
        expected: u32,
        /// The branch that was passed in.
        found: u32,
    },

    /// Commit or discard was requested but no branch is open.
    #[error("no open branch to close (branch {0})")]
    NoOpenBranch(u32),

    /// A commit would leave a negative amount visible.
    #[error("commit would leave {amount} of {resource}")]
    NegativeBalance {
        /// The resource that went negative.
        resource: ResourceKey,
        /// The resulting amount.
        amount: i64,
    },

    /// The inventory still has open branches where none are allowed.
    #[error("{0} branch(es) still open")]
    OpenBranches(usize),

    /// A production step does not produce the resource its node asked for.
    #[error("rule {rule} produces nothing matching {resource}")]
    UnmatchedOutput {
        /// The rule of the step.
        rule: RuleId,
        /// The resource the node wanted.
        resource: ResourceKey,
    },

    /// A resolution task was driven again after its result was taken.
    #[error("resolution task already finished")]
    TaskFinished,

    /// The real pool refused a movement it had just accepted in simulation.
    #[error("pool moved {moved} of {resource}, expected {expected}")]
    PoolRejected {
        /// The resource being moved.
        resource: ResourceKey,
        /// The amount that should have moved.
        expected: i64,
        /// The amount that actually moved.
        moved: i64,
    },
}

/// Errors that can occur in the resolver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A branch could not be satisfied.
    #[error(transparent)]
    Branch(#[from] BranchFailure),

    /// The branch/commit discipline was violated.
    #[error("consistency error: {0}")]
    Consistency(#[from] ConsistencyError),

    /// The job was cancelled at a checkpoint.
    #[error("resolution cancelled")]
    Cancelled,

    /// The worker cannot hold the plan.
    #[error("worker capacity too small: need {required} bytes, have {available}")]
    InsufficientCapacity {
        /// Bytes required by the plan.
        required: u64,
        /// Bytes the worker has free.
        available: u64,
    },

    /// Arithmetic overflow while scaling amounts.
    #[error("arithmetic overflow in demand calculation")]
    ArithmeticOverflow,

    /// Invalid rule, catalog or resolver configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ResolveError {
    /// Returns the branch failure if this is one.
    #[must_use]
    pub const fn as_branch_failure(&self) -> Option<&BranchFailure> {
        match self {
            Self::Branch(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Result type for resolver operations.
pub type ResolveResult<T> = Result<T, ResolveError>;
