//! # tally-locker
//!
//! Time-locked vaults for the reward token.
//!
//! Locking an amount for a period grants a reward weight of
//! `amount * period / max_period` until the lock expires. The linear locker
//! keeps that weight flat; the decaying locker pays each interval in
//! proportion to a linearly decreasing instantaneous weight. Both are reward
//! pools in their own right: the locker integrates its emission rate over the
//! total locked weight, dropping each lock's weight at its expiry tick.
//!
//! ## Modules
//!
//! - [`decay`] — Closed-form decay curve math
//! - [`position`] — Lock positions and period clamping
//! - [`accumulator`] — Reward-per-weight accumulator with scheduled expiries
//! - [`locker`] — The lock/redeem/accrual state machine

pub mod accumulator;
pub mod decay;
pub mod locker;
pub mod position;

use tally_types::ledger::LedgerError;
use tally_types::math::MathError;
use tally_types::{ErrorClass, Tick};

pub use locker::{LockReceipt, LockerMode, TokenLocker};
pub use position::{LockPosition, LockerParams};

/// Error types for locker operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockerError {
    /// Lock amount is zero.
    #[error("lock amount is zero")]
    ZeroAmount,

    /// The caller has no lock position.
    #[error("no active lock")]
    NoActiveLock,

    /// The lock has not expired yet.
    #[error("lock not yet available: expires at {expiry}, current tick {current}")]
    NotYetAvailable {
        /// Expiry tick of the lock.
        expiry: Tick,
        /// The current tick.
        current: Tick,
    },

    /// Rounding the expiry moved the period outside the caller's tolerance.
    #[error("lock period slippage: requested {requested}, actual {actual}, tolerance {slippage_bps} bps")]
    LockSlippage {
        /// Requested period (after clamping).
        requested: u64,
        /// Period after expiry rounding.
        actual: u64,
        /// Accepted deviation in basis points.
        slippage_bps: u32,
    },

    /// A decay interval is empty or lies outside the lock.
    #[error("invalid decay interval: lock [{start}, {end}], interval [{from}, {to}]")]
    InvalidInterval {
        /// Lock start.
        start: Tick,
        /// Lock end.
        end: Tick,
        /// Interval start.
        from: Tick,
        /// Interval end.
        to: Tick,
    },

    /// Locker parameters are inconsistent.
    #[error("invalid locker parameters: {0}")]
    InvalidParams(String),

    /// Fixed-point arithmetic failed.
    #[error(transparent)]
    Math(#[from] MathError),

    /// The token ledger rejected a transfer.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl LockerError {
    /// Taxonomy class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotYetAvailable { .. } => ErrorClass::Timing,
            Self::Math(_) => ErrorClass::Arithmetic,
            Self::ZeroAmount
            | Self::NoActiveLock
            | Self::LockSlippage { .. }
            | Self::InvalidInterval { .. }
            | Self::InvalidParams(_)
            | Self::Ledger(_) => ErrorClass::Validation,
        }
    }
}

/// Convenience result type for locker operations.
pub type Result<T> = std::result::Result<T, LockerError>;
