//! # tally-vault
//!
//! Staking/slashing vault over an interest-bearing underlying asset.
//!
//! Stakers deposit underlying and receive shares. The exchange rate between
//! shares and underlying follows the vault's underlying balance: it rises as
//! the underlying's normalized index grows and falls when a slasher removes
//! underlying to socialize a loss. Redemption requires a cooldown followed by
//! a limited unstake window.
//!
//! ## Modules
//!
//! - [`cooldown`] — Cooldown window checks and merging on transfer
//! - [`vault`] — The vault state machine

pub mod cooldown;
pub mod vault;

use tally_types::ledger::LedgerError;
use tally_types::math::MathError;
use tally_types::{ErrorClass, Tick, U256};

pub use cooldown::CooldownParams;
pub use vault::{RedeemReceipt, StakeReceipt, StakeVault, VaultParams};

/// Error types for vault operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    /// Cooldown requested with no shares.
    #[error("cannot start cooldown with zero balance")]
    InvalidBalanceOnCooldown,

    /// Redemption before the cooldown has elapsed (or without a cooldown).
    #[error("insufficient cooldown: redeemable from {ready_at:?}, current tick {current}")]
    InsufficientCooldown {
        /// First tick at which redemption opens, if a cooldown was started.
        ready_at: Option<Tick>,
        /// The current tick.
        current: Tick,
    },

    /// Redemption after the unstake window closed.
    #[error("unstake window finished at {closed_at}, current tick {current}")]
    UnstakeWindowFinished {
        /// First tick after the window.
        closed_at: Tick,
        /// The current tick.
        current: Tick,
    },

    /// Caller is not the slasher.
    #[error("caller is not the slasher")]
    NotSlasher,

    /// Caller is not the vault admin.
    #[error("caller is not the vault admin")]
    Unauthorized,

    /// The vault is paused.
    #[error("vault is paused")]
    VaultPaused,

    /// Amount is zero.
    #[error("amount is zero")]
    ZeroAmount,

    /// Not enough shares.
    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance {
        /// Shares held.
        available: U256,
        /// Shares requested.
        required: U256,
    },

    /// Slashing cap above 100%.
    #[error("invalid slashing percentage: {0} bps")]
    InvalidPercentage(u32),

    /// The underlying index may only grow.
    #[error("index {new} below current index {current}")]
    InvalidIndex {
        /// Index currently applied.
        current: U256,
        /// Rejected index.
        new: U256,
    },

    /// Fixed-point arithmetic failed.
    #[error(transparent)]
    Math(#[from] MathError),

    /// The underlying ledger rejected a transfer.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl VaultError {
    /// Taxonomy class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotSlasher | Self::Unauthorized => ErrorClass::Authorization,
            Self::VaultPaused => ErrorClass::State,
            Self::InsufficientCooldown { .. } | Self::UnstakeWindowFinished { .. } => {
                ErrorClass::Timing
            }
            Self::Math(_) => ErrorClass::Arithmetic,
            Self::InvalidBalanceOnCooldown
            | Self::ZeroAmount
            | Self::InsufficientBalance { .. }
            | Self::InvalidPercentage(_)
            | Self::InvalidIndex { .. }
            | Self::Ledger(_) => ErrorClass::Validation,
        }
    }
}

/// Convenience result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
