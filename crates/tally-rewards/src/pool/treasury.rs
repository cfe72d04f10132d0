//! Treasury pool: a flat per-tick emission to one address, independent of
//! any stake.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tally_types::math;
use tally_types::{short_hex, Address, Tick, U256};

use super::RewardSource;
use crate::Result;

/// Flat emission to the current treasury address.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreasuryPool {
    rate: U256,
    treasury: Address,
    last_update: Tick,
    since: Tick,
    accrued: BTreeMap<Address, U256>,
}

impl TreasuryPool {
    /// Create a pool emitting `rate` per tick to `treasury` from `now`.
    pub fn new(rate: U256, treasury: Address, now: Tick) -> Self {
        Self {
            rate,
            treasury,
            last_update: now,
            since: now,
            accrued: BTreeMap::new(),
        }
    }

    /// Current treasury address.
    pub fn treasury(&self) -> &Address {
        &self.treasury
    }

    /// Redirect future emission. Emission up to `now` stays with the previous
    /// treasury.
    pub fn set_treasury(&mut self, treasury: Address, now: Tick) -> Result<()> {
        self.settle(now)?;
        tracing::info!(
            from = %short_hex(&self.treasury),
            to = %short_hex(&treasury),
            "treasury: address changed"
        );
        self.treasury = treasury;
        self.since = now;
        Ok(())
    }

    fn unsettled(&self, now: Tick) -> Result<U256> {
        if now <= self.last_update {
            return Ok(U256::zero());
        }
        Ok(math::mul(self.rate, U256::from(now - self.last_update))?)
    }

    fn settle(&mut self, now: Tick) -> Result<()> {
        let emitted = self.unsettled(now)?;
        if !emitted.is_zero() {
            let entry = self.accrued.entry(self.treasury).or_default();
            *entry = math::add(*entry, emitted)?;
        }
        self.last_update = self.last_update.max(now);
        Ok(())
    }
}

impl RewardSource for TreasuryPool {
    fn kind(&self) -> &'static str {
        "treasury"
    }

    fn rate(&self) -> U256 {
        self.rate
    }

    fn participants(&self) -> Vec<Address> {
        let mut users: Vec<Address> = self.accrued.keys().copied().collect();
        if !self.accrued.contains_key(&self.treasury) {
            users.push(self.treasury);
        }
        users
    }

    fn set_rate(&mut self, rate: U256, now: Tick) -> Result<()> {
        self.settle(now)?;
        self.rate = rate;
        Ok(())
    }

    fn calc_reward_for(&self, user: &Address, now: Tick) -> Result<(U256, Tick)> {
        let mut amount = self.accrued.get(user).copied().unwrap_or_default();
        if user == &self.treasury {
            amount = math::add(amount, self.unsettled(now)?)?;
            return Ok((amount, self.since));
        }
        Ok((amount, now))
    }

    fn claim_reward_for(&mut self, user: &Address, now: Tick) -> Result<U256> {
        self.settle(now)?;
        if user == &self.treasury {
            self.since = now;
        }
        Ok(self.accrued.remove(user).unwrap_or_default())
    }
}
