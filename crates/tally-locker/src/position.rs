//! Lock positions and period planning.
//!
//! ## Period rules
//!
//! 1. The requested period is clamped to `[min_period, max_period]`.
//! 2. The expiry `now + period` is rounded up to the next multiple of
//!    `period_granularity` (down, if rounding up would exceed `max_period`).
//! 3. If the resulting period deviates from the clamped request by more than
//!    the caller's slippage tolerance, the lock is rejected.

use serde::{Deserialize, Serialize};
use tally_types::math::{self, PERCENTAGE_FACTOR};
use tally_types::{Address, Tick, U256};

use crate::{LockerError, Result};

/// Ticks per week at one tick per second.
pub const WEEK: u64 = 7 * 24 * 3600;

/// Default maximum lock period (208 weeks).
pub const MAX_LOCKER_PERIOD: u64 = 208 * WEEK;

/// Period bounds and expiry rounding for a locker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockerParams {
    /// Shortest accepted lock period.
    pub min_period: u64,
    /// Longest accepted lock period; a lock of this length gets full weight.
    pub max_period: u64,
    /// Expiries are aligned to multiples of this many ticks.
    pub period_granularity: u64,
}

impl Default for LockerParams {
    fn default() -> Self {
        Self {
            min_period: WEEK,
            max_period: MAX_LOCKER_PERIOD,
            period_granularity: WEEK,
        }
    }
}

impl LockerParams {
    /// Check that the bounds are consistent.
    ///
    /// # Errors
    ///
    /// - [`LockerError::InvalidParams`] if a bound is zero or `min > max`
    pub fn validate(&self) -> Result<()> {
        if self.min_period == 0 || self.period_granularity == 0 {
            return Err(LockerError::InvalidParams(
                "min_period and period_granularity must be non-zero".to_string(),
            ));
        }
        if self.min_period > self.max_period {
            return Err(LockerError::InvalidParams(format!(
                "min_period {} exceeds max_period {}",
                self.min_period, self.max_period
            )));
        }
        Ok(())
    }

    /// Clamp a requested period to the accepted bounds.
    pub fn clamp_period(&self, period: u64) -> u64 {
        period.clamp(self.min_period, self.max_period)
    }

    /// Compute the expiry tick for a lock requested at `now`.
    ///
    /// # Errors
    ///
    /// - [`LockerError::LockSlippage`] if rounding moves the period further
    ///   than `slippage_bps` from the clamped request
    pub fn plan_expiry(&self, now: Tick, period: u64, slippage_bps: u32) -> Result<Tick> {
        let requested = self.clamp_period(period);
        let g = self.period_granularity;
        let raw = now.saturating_add(requested);
        let mut expiry = raw.div_ceil(g).saturating_mul(g);
        if expiry - now > self.max_period {
            expiry = raw / g * g;
        }
        // A granularity larger than the period can round the expiry back to now.
        if expiry <= now {
            expiry = raw;
        }
        let actual = expiry - now;
        let deviation = actual.abs_diff(requested);
        if u128::from(deviation) * u128::from(PERCENTAGE_FACTOR)
            > u128::from(slippage_bps) * u128::from(requested)
        {
            return Err(LockerError::LockSlippage {
                requested,
                actual,
                slippage_bps,
            });
        }
        Ok(expiry)
    }

    /// Reward weight of `amount` locked for `period` ticks.
    pub fn weight_for(&self, amount: U256, period: u64) -> Result<U256> {
        let period = period.min(self.max_period);
        Ok(math::mul_div(
            amount,
            U256::from(period),
            U256::from(self.max_period),
        )?)
    }
}

/// A single owner's lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPosition {
    /// Owner of the locked tokens.
    pub owner: Address,
    /// Underlying reward tokens held in escrow.
    pub amount: U256,
    /// Reward weight fixed at the last (re)lock.
    pub weight: U256,
    /// Tick of the last (re)lock.
    pub locked_at: Tick,
    /// Tick from which the amount can be redeemed.
    pub expiry: Tick,
    /// Whether the weight has already left the pool total after expiry.
    pub retired: bool,
}

impl LockPosition {
    /// Whether the lock can be redeemed at `now`.
    pub fn is_expired(&self, now: Tick) -> bool {
        now >= self.expiry
    }

    /// Voting weight at `now`: `amount * remaining / max_period`, zero once
    /// expired.
    pub fn voting_weight(&self, params: &LockerParams, now: Tick) -> Result<U256> {
        if self.is_expired(now) {
            return Ok(U256::zero());
        }
        params.weight_for(self.amount, self.expiry - now)
    }
}
