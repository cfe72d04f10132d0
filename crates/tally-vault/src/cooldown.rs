//! Cooldown and unstake window.
//!
//! A staker starts a cooldown at tick `c`. Redemption is allowed in
//! `[c + cooldown_period, c + cooldown_period + unstake_window)`; after that
//! the cooldown is stale and must be restarted.
//!
//! ## Merging on transfer
//!
//! Shares moving into an account must not let the receiver skip a cooldown:
//!
//! - A receiver with no shares inherits the sender's cooldown if it is still
//!   valid, otherwise none.
//! - A receiver with shares but no valid cooldown keeps none.
//! - Otherwise the receiver's cooldown becomes the share-weighted average of
//!   its own and the sender's effective cooldown (the sender's own if valid,
//!   else `now`), rounded up.

use serde::{Deserialize, Serialize};
use tally_types::math;
use tally_types::{Tick, U256};

use crate::{Result, VaultError};

/// Default cooldown period (10 days at one tick per second).
pub const COOLDOWN_PERIOD: u64 = 10 * 24 * 3600;

/// Default unstake window (2 days at one tick per second).
pub const UNSTAKE_WINDOW: u64 = 2 * 24 * 3600;

/// Cooldown timing parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownParams {
    /// Ticks between starting a cooldown and the window opening.
    pub cooldown_period: u64,
    /// Ticks the window stays open.
    pub unstake_window: u64,
}

impl Default for CooldownParams {
    fn default() -> Self {
        Self {
            cooldown_period: COOLDOWN_PERIOD,
            unstake_window: UNSTAKE_WINDOW,
        }
    }
}

impl CooldownParams {
    /// First tick at which a cooldown started at `start` allows redemption.
    pub fn opens_at(&self, start: Tick) -> Tick {
        start.saturating_add(self.cooldown_period)
    }

    /// First tick after the unstake window of a cooldown started at `start`.
    pub fn closes_at(&self, start: Tick) -> Tick {
        self.opens_at(start).saturating_add(self.unstake_window)
    }

    /// Whether a cooldown started at `start` has not yet gone stale.
    pub fn is_valid(&self, start: Tick, now: Tick) -> bool {
        now < self.closes_at(start)
    }

    /// Check that redemption is allowed at `now`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InsufficientCooldown`] if no cooldown was started or it
    ///   has not elapsed
    /// - [`VaultError::UnstakeWindowFinished`] if the window has closed
    pub fn check_redeemable(&self, start: Option<Tick>, now: Tick) -> Result<()> {
        let Some(start) = start else {
            return Err(VaultError::InsufficientCooldown {
                ready_at: None,
                current: now,
            });
        };
        if now < self.opens_at(start) {
            return Err(VaultError::InsufficientCooldown {
                ready_at: Some(self.opens_at(start)),
                current: now,
            });
        }
        if now >= self.closes_at(start) {
            return Err(VaultError::UnstakeWindowFinished {
                closed_at: self.closes_at(start),
                current: now,
            });
        }
        Ok(())
    }

    /// Receiver cooldown after `amount` shares arrive.
    ///
    /// * `sender` - Cooldown of the sender (`None` for a fresh stake)
    /// * `receiver` - Cooldown of the receiver before the transfer
    /// * `receiver_balance` - Receiver shares before the transfer
    pub fn merge(
        &self,
        now: Tick,
        sender: Option<Tick>,
        amount: U256,
        receiver: Option<Tick>,
        receiver_balance: U256,
    ) -> Result<Option<Tick>> {
        let sender_valid = sender.filter(|&c| self.is_valid(c, now));
        if receiver_balance.is_zero() {
            return Ok(sender_valid);
        }
        let Some(receiver) = receiver.filter(|&c| self.is_valid(c, now)) else {
            return Ok(None);
        };
        let sender_effective = sender_valid.unwrap_or(now);
        if sender_effective == receiver {
            return Ok(Some(receiver));
        }
        let weighted = math::add(
            math::mul(amount, U256::from(sender_effective))?,
            math::mul(receiver_balance, U256::from(receiver))?,
        )?;
        let total = math::add(amount, receiver_balance)?;
        let merged = math::mul_div_up(weighted, U256::one(), total)?;
        // A weighted average of two u64 ticks fits in u64.
        Ok(Some(merged.low_u64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CooldownParams {
        CooldownParams {
            cooldown_period: 100,
            unstake_window: 20,
        }
    }

    #[test]
    fn test_window_bounds() {
        let p = params();
        assert!(matches!(
            p.check_redeemable(Some(10), 109),
            Err(VaultError::InsufficientCooldown { ready_at: Some(110), .. })
        ));
        p.check_redeemable(Some(10), 110).expect("opens");
        p.check_redeemable(Some(10), 129).expect("last tick");
        assert!(matches!(
            p.check_redeemable(Some(10), 130),
            Err(VaultError::UnstakeWindowFinished { closed_at: 130, .. })
        ));
    }

    #[test]
    fn test_no_cooldown() {
        assert!(matches!(
            params().check_redeemable(None, 1_000),
            Err(VaultError::InsufficientCooldown { ready_at: None, .. })
        ));
    }

    #[test]
    fn test_merge_into_empty_receiver_inherits_valid() {
        let p = params();
        let merged = p
            .merge(50, Some(40), U256::from(10), None, U256::zero())
            .expect("merge");
        assert_eq!(merged, Some(40));
    }

    #[test]
    fn test_merge_into_empty_receiver_drops_stale() {
        let p = params();
        let merged = p
            .merge(500, Some(40), U256::from(10), Some(450), U256::zero())
            .expect("merge");
        assert_eq!(merged, None);
    }

    #[test]
    fn test_merge_receiver_without_cooldown_keeps_none() {
        let p = params();
        let merged = p
            .merge(50, Some(40), U256::from(10), None, U256::from(10))
            .expect("merge");
        assert_eq!(merged, None);
    }

    #[test]
    fn test_merge_weighted_average() {
        let p = params();
        // Receiver cooldown later than sender's: average by share amounts.
        let merged = p
            .merge(50, Some(20), U256::from(30), Some(40), U256::from(10))
            .expect("merge");
        // (30*20 + 10*40) / 40 = 25
        assert_eq!(merged, Some(25));
    }

    #[test]
    fn test_merge_stale_sender_counts_as_now() {
        let p = params();
        // Sender's cooldown at 0 is stale at 200; receiver's at 150 is valid.
        let merged = p
            .merge(200, Some(0), U256::from(10), Some(150), U256::from(10))
            .expect("merge");
        assert_eq!(merged, Some(175));
    }

    #[test]
    fn test_merge_rounds_up() {
        let p = params();
        let merged = p
            .merge(50, Some(21), U256::from(1), Some(40), U256::from(1))
            .expect("merge");
        // (21 + 40) / 2 = 30.5 -> 31
        assert_eq!(merged, Some(31));
    }
}
