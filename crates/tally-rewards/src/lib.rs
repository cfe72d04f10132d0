//! # tally-rewards
//!
//! Reward pools, the reward controller, and the booster.
//!
//! Pools turn balance-change events and elapsed ticks into per-participant
//! accrued amounts. The controller owns an ordered set of pools, drains them
//! on claim, splits the result into an immediately claimable part and a
//! frozen part that melts down linearly, and mints the claimable part through
//! the reward token ledger. The booster wraps a controller and pays a
//! separate boost emission capped by the work done in boosted pools.
//!
//! ## Modules
//!
//! - [`pool`] — The pool capability interface and its variants
//! - [`freeze`] — Freeze/melt-down schedule and frozen buckets
//! - [`permit`] — Signed permit claims
//! - [`controller`] — The reward controller
//! - [`booster`] — Boost emission on top of a controller

pub mod booster;
pub mod controller;
pub mod freeze;
pub mod permit;
pub mod pool;

use tally_locker::LockerError;
use tally_types::ledger::LedgerError;
use tally_types::math::MathError;
use tally_types::{ErrorClass, PoolId, Tick, U256};

pub use booster::{Booster, BoosterParams};
pub use controller::{ClaimOutcome, ClaimableReward, RewardController};
pub use freeze::{FreezeSchedule, FreezeSource};
pub use permit::PermitClaim;
pub use pool::{PoolKind, RewardPool, RewardSource};

/// Error types for reward operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewardError {
    /// The `(provider, token)` pair is not registered with the pool.
    #[error("unauthorized reward provider")]
    UnauthorizedProvider,

    /// Caller is not the controller admin.
    #[error("caller is not the admin")]
    Unauthorized,

    /// The pool is paused.
    #[error("pool is paused")]
    PoolPaused,

    /// Claims are paused controller-wide.
    #[error("rewards are paused")]
    RewardsPaused,

    /// Team roster changes are closed once the pool has unlocked.
    #[error("lockup active: roster fixed since tick {unlocked_at}")]
    LockupActive {
        /// Tick the team pool unlocked at.
        unlocked_at: Tick,
    },

    /// The pool's cumulative credit limit would be exceeded.
    #[error("insufficient pool balance: {available} left, {required} requested")]
    InsufficientPoolBalance {
        /// Credit still available.
        available: U256,
        /// Credit requested.
        required: U256,
    },

    /// A fixed-credit pool received a decreasing balance.
    #[error("withdrawal not allowed")]
    WithdrawalNotAllowed,

    /// Permit signature does not match (wrong key, nonce, or fields).
    #[error("invalid permit signature")]
    InvalidSignature,

    /// Permit deadline has passed.
    #[error("permit expired at {deadline}, current tick {current}")]
    InvalidTime {
        /// Permit deadline.
        deadline: Tick,
        /// The current tick.
        current: Tick,
    },

    /// Team shares would exceed 100%.
    #[error("invalid share: roster total would be {total} bps")]
    InvalidShare {
        /// Roster total after the change.
        total: u32,
    },

    /// Percentage above 100%.
    #[error("invalid percentage: {0} bps")]
    InvalidPercentage(u32),

    /// No pool registered under this id.
    #[error("unknown pool {0}")]
    UnknownPool(PoolId),

    /// The pool variant does not support this operation.
    #[error("operation not supported by {kind} pool")]
    UnsupportedOperation {
        /// Variant name.
        kind: &'static str,
    },

    /// Amount is zero.
    #[error("amount is zero")]
    ZeroAmount,

    /// Fixed-point arithmetic failed.
    #[error(transparent)]
    Math(#[from] MathError),

    /// The reward token ledger rejected an operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A locker pool rejected an operation.
    #[error(transparent)]
    Locker(#[from] LockerError),
}

impl RewardError {
    /// Taxonomy class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnauthorizedProvider | Self::Unauthorized => ErrorClass::Authorization,
            Self::PoolPaused | Self::RewardsPaused => ErrorClass::State,
            Self::LockupActive { .. } | Self::InvalidTime { .. } => ErrorClass::Timing,
            Self::InvalidSignature => ErrorClass::Replay,
            Self::Math(_) => ErrorClass::Arithmetic,
            Self::Locker(inner) => inner.class(),
            Self::InsufficientPoolBalance { .. }
            | Self::WithdrawalNotAllowed
            | Self::InvalidShare { .. }
            | Self::InvalidPercentage(_)
            | Self::UnknownPool(_)
            | Self::UnsupportedOperation { .. }
            | Self::ZeroAmount
            | Self::Ledger(_) => ErrorClass::Validation,
        }
    }
}

/// Convenience result type for reward operations.
pub type Result<T> = std::result::Result<T, RewardError>;
