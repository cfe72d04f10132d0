//! Fixed-credit pool for migrated balances.
//!
//! Each reported balance increase is credited once at `reward_per_unit`
//! (ray-scaled) with no time component. Balances may only grow, and the
//! cumulative credit is capped by `reward_limit`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tally_types::math;
use tally_types::{Address, BalanceUpdate, Tick, U256};

use super::RewardSource;
use crate::{Result, RewardError};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Credit {
    pending: U256,
    since: Tick,
}

/// One-shot credit per balance increase.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZombiePool {
    reward_per_unit: U256,
    reward_limit: U256,
    total_credited: U256,
    credits: BTreeMap<Address, Credit>,
}

impl ZombiePool {
    /// Create a pool.
    pub fn new(reward_per_unit: U256, reward_limit: U256) -> Self {
        Self {
            reward_per_unit,
            reward_limit,
            total_credited: U256::zero(),
            credits: BTreeMap::new(),
        }
    }

    /// Credit still available under the limit.
    pub fn remaining(&self) -> U256 {
        self.reward_limit.saturating_sub(self.total_credited)
    }

    /// Cumulative credit granted.
    pub fn total_credited(&self) -> U256 {
        self.total_credited
    }
}

impl RewardSource for ZombiePool {
    fn kind(&self) -> &'static str {
        "zombie"
    }

    fn rate(&self) -> U256 {
        self.reward_per_unit
    }

    fn participants(&self) -> Vec<Address> {
        self.credits.keys().copied().collect()
    }

    fn set_rate(&mut self, rate: U256, _now: Tick) -> Result<()> {
        self.reward_per_unit = rate;
        Ok(())
    }

    fn on_balance_update(&mut self, update: &BalanceUpdate, now: Tick) -> Result<()> {
        if update.after < update.before {
            return Err(RewardError::WithdrawalNotAllowed);
        }
        let credit = math::ray_mul(update.after - update.before, self.reward_per_unit)?;
        if credit.is_zero() {
            return Ok(());
        }
        let available = self.remaining();
        if credit > available {
            return Err(RewardError::InsufficientPoolBalance {
                available,
                required: credit,
            });
        }
        self.total_credited = math::add(self.total_credited, credit)?;
        let entry = self.credits.entry(update.user).or_insert_with(|| Credit {
            pending: U256::zero(),
            since: now,
        });
        entry.pending = math::add(entry.pending, credit)?;
        Ok(())
    }

    fn calc_reward_for(&self, user: &Address, now: Tick) -> Result<(U256, Tick)> {
        Ok(self
            .credits
            .get(user)
            .map(|c| (c.pending, c.since))
            .unwrap_or((U256::zero(), now)))
    }

    fn claim_reward_for(&mut self, user: &Address, now: Tick) -> Result<U256> {
        let Some(credit) = self.credits.get_mut(user) else {
            return Ok(U256::zero());
        };
        credit.since = now;
        Ok(std::mem::take(&mut credit.pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::math::RAY;

    const ALICE: Address = [0x01; 32];

    fn update(before: u64, after: u64) -> BalanceUpdate {
        BalanceUpdate {
            user: ALICE,
            before: U256::from(before),
            after: U256::from(after),
            total_after: U256::from(after),
        }
    }

    #[test]
    fn test_credit_once_per_increase() {
        let mut pool = ZombiePool::new(RAY * 2, U256::from(1_000));
        pool.on_balance_update(&update(0, 100), 3).expect("credit");
        // Time does not add anything.
        assert_eq!(pool.calc_reward_for(&ALICE, 500).expect("calc"), (U256::from(200), 3));
        pool.on_balance_update(&update(100, 150), 4).expect("credit");
        assert_eq!(pool.claim_reward_for(&ALICE, 5).expect("claim"), U256::from(300));
        assert!(pool.claim_reward_for(&ALICE, 5).expect("again").is_zero());
    }

    #[test]
    fn test_withdrawal_rejected() {
        let mut pool = ZombiePool::new(RAY, U256::from(1_000));
        pool.on_balance_update(&update(0, 100), 0).expect("credit");
        assert_eq!(
            pool.on_balance_update(&update(100, 50), 1),
            Err(RewardError::WithdrawalNotAllowed)
        );
    }

    #[test]
    fn test_limit_enforced() {
        let mut pool = ZombiePool::new(RAY, U256::from(150));
        pool.on_balance_update(&update(0, 100), 0).expect("credit");
        let err = pool.on_balance_update(&update(100, 200), 1).expect_err("cap");
        assert_eq!(
            err,
            RewardError::InsufficientPoolBalance {
                available: U256::from(50),
                required: U256::from(100),
            }
        );
        assert_eq!(pool.total_credited(), U256::from(100));
    }
}
