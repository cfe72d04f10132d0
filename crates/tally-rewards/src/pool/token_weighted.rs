//! Token-weighted pool.
//!
//! Classic reward-per-share accumulator. Every update first integrates
//! `rate × elapsed × RAY / total_staked` into the accumulator using the total
//! as it was before the change, then credits the user against its old
//! balance, then applies the new balance and total. Both divisions round
//! down, so dust stays in the pool.
//!
//! Emission during ticks with nothing staked is not banked.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tally_types::math::{self, RAY};
use tally_types::{short_hex, Address, BalanceUpdate, Tick, U256};

use super::RewardSource;
use crate::Result;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Account {
    balance: U256,
    checkpoint: U256,
    pending: U256,
    since: Tick,
}

/// Emission shared pro rata over reported balances.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenWeightedPool {
    rate: U256,
    reward_per_share: U256,
    total_staked: U256,
    last_update: Tick,
    accounts: BTreeMap<Address, Account>,
}

impl TokenWeightedPool {
    /// Create a pool emitting `rate` per tick from `now`.
    pub fn new(rate: U256, now: Tick) -> Self {
        Self {
            rate,
            reward_per_share: U256::zero(),
            total_staked: U256::zero(),
            last_update: now,
            accounts: BTreeMap::new(),
        }
    }

    /// Balance recorded for `user`.
    pub fn balance_of(&self, user: &Address) -> U256 {
        self.accounts.get(user).map(|a| a.balance).unwrap_or_default()
    }

    /// Sum of all recorded balances.
    pub fn total_staked(&self) -> U256 {
        self.total_staked
    }

    /// Accumulator value (ray-scaled reward per unit of balance).
    pub fn reward_per_share(&self) -> U256 {
        self.reward_per_share
    }

    fn reward_per_share_at(&self, now: Tick) -> Result<U256> {
        if now <= self.last_update || self.total_staked.is_zero() || self.rate.is_zero() {
            return Ok(self.reward_per_share);
        }
        let emitted = math::mul(self.rate, U256::from(now - self.last_update))?;
        let delta = math::mul_div(emitted, RAY, self.total_staked)?;
        Ok(math::add(self.reward_per_share, delta)?)
    }

    fn settle(&mut self, now: Tick) -> Result<()> {
        self.reward_per_share = self.reward_per_share_at(now)?;
        self.last_update = self.last_update.max(now);
        Ok(())
    }

    fn earned(account: &Account, reward_per_share: U256) -> Result<U256> {
        let delta = reward_per_share.saturating_sub(account.checkpoint);
        let credit = math::mul_div(account.balance, delta, RAY)?;
        Ok(math::add(account.pending, credit)?)
    }

    fn settle_account(&mut self, user: &Address, now: Tick) -> Result<&mut Account> {
        self.settle(now)?;
        let rps = self.reward_per_share;
        let account = self.accounts.entry(*user).or_insert_with(|| Account {
            checkpoint: rps,
            since: now,
            ..Account::default()
        });
        account.pending = Self::earned(account, rps)?;
        account.checkpoint = rps;
        Ok(account)
    }
}

impl RewardSource for TokenWeightedPool {
    fn kind(&self) -> &'static str {
        "token-weighted"
    }

    fn rate(&self) -> U256 {
        self.rate
    }

    fn participants(&self) -> Vec<Address> {
        self.accounts.keys().copied().collect()
    }

    fn set_rate(&mut self, rate: U256, now: Tick) -> Result<()> {
        self.settle(now)?;
        self.rate = rate;
        Ok(())
    }

    fn on_balance_update(&mut self, update: &BalanceUpdate, now: Tick) -> Result<()> {
        let account = self.settle_account(&update.user, now)?;
        if account.balance != update.before {
            tracing::debug!(
                user = %short_hex(&update.user),
                recorded = %account.balance,
                reported = %update.before,
                "token-weighted: reported balance differs from record"
            );
        }
        account.balance = update.after;
        self.total_staked = update.total_after;
        Ok(())
    }

    fn calc_reward_for(&self, user: &Address, now: Tick) -> Result<(U256, Tick)> {
        let Some(account) = self.accounts.get(user) else {
            return Ok((U256::zero(), now));
        };
        let amount = Self::earned(account, self.reward_per_share_at(now)?)?;
        Ok((amount, account.since))
    }

    fn claim_reward_for(&mut self, user: &Address, now: Tick) -> Result<U256> {
        if !self.accounts.contains_key(user) {
            return Ok(U256::zero());
        }
        let account = self.settle_account(user, now)?;
        let amount = std::mem::take(&mut account.pending);
        account.since = now;
        Ok(amount)
    }
}
