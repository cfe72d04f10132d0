//! Locker pools: a [`TokenLocker`] seen through the pool interface.
//!
//! Balances are not reported by providers; they come from `lock` and
//! `redeem`, which the controller routes here with the reward token ledger.

use serde::{Deserialize, Serialize};
use tally_locker::{LockReceipt, LockerMode, LockerParams, TokenLocker};
use tally_types::ledger::TokenLedger;
use tally_types::{Address, Tick, U256};

use super::RewardSource;
use crate::Result;

/// Wrapper giving a locker the pool interface.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockerPool {
    locker: TokenLocker,
}

impl LockerPool {
    /// Create a locker pool.
    pub fn new(
        mode: LockerMode,
        params: LockerParams,
        escrow: Address,
        rate: U256,
        now: Tick,
    ) -> Result<Self> {
        Ok(Self {
            locker: TokenLocker::new(mode, params, escrow, rate, now)?,
        })
    }

    /// The underlying locker.
    pub fn locker(&self) -> &TokenLocker {
        &self.locker
    }

    /// Lock `amount` of `owner` for `period` ticks.
    pub fn lock(
        &mut self,
        ledger: &mut dyn TokenLedger,
        owner: Address,
        amount: U256,
        period: u64,
        slippage_bps: u32,
        now: Tick,
    ) -> Result<LockReceipt> {
        Ok(self.locker.lock(ledger, owner, amount, period, slippage_bps, now)?)
    }

    /// Return `owner`'s expired lock to `to`.
    pub fn redeem(
        &mut self,
        ledger: &mut dyn TokenLedger,
        owner: Address,
        to: Address,
        now: Tick,
    ) -> Result<U256> {
        Ok(self.locker.redeem(ledger, owner, to, now)?)
    }
}

impl RewardSource for LockerPool {
    fn kind(&self) -> &'static str {
        match self.locker.mode() {
            LockerMode::Linear => "locker",
            LockerMode::Decaying => "decaying-locker",
        }
    }

    fn rate(&self) -> U256 {
        self.locker.rate()
    }

    fn participants(&self) -> Vec<Address> {
        self.locker.owners().copied().collect()
    }

    fn set_rate(&mut self, rate: U256, now: Tick) -> Result<()> {
        Ok(self.locker.set_rate(rate, now)?)
    }

    fn calc_reward_for(&self, user: &Address, now: Tick) -> Result<(U256, Tick)> {
        Ok(self.locker.calc_reward_for(user, now)?)
    }

    fn claim_reward_for(&mut self, user: &Address, now: Tick) -> Result<U256> {
        Ok(self.locker.claim_reward_for(user, now)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RewardError;
    use tally_locker::LockerError;
    use tally_types::ledger::InMemoryLedger;
    use tally_types::BalanceUpdate;

    const ESCROW: Address = [0xEE; 32];
    const ALICE: Address = [0x01; 32];

    fn params() -> LockerParams {
        LockerParams {
            min_period: 10,
            max_period: 100,
            period_granularity: 10,
        }
    }

    #[test]
    fn test_locker_pool_accrues_through_interface() {
        let mut pool =
            LockerPool::new(LockerMode::Linear, params(), ESCROW, U256::from(10), 0).expect("pool");
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&ALICE, U256::from(1_000)).expect("mint");
        pool.lock(&mut ledger, ALICE, U256::from(1_000), 100, 0, 0)
            .expect("lock");
        let source: &mut dyn RewardSource = &mut pool;
        assert_eq!(source.kind(), "locker");
        assert_eq!(source.claim_reward_for(&ALICE, 20).expect("claim"), U256::from(200));
    }

    #[test]
    fn test_locker_errors_surface() {
        let mut pool =
            LockerPool::new(LockerMode::Decaying, params(), ESCROW, U256::one(), 0).expect("pool");
        let mut ledger = InMemoryLedger::new();
        let err = pool.redeem(&mut ledger, ALICE, ALICE, 5).expect_err("no lock");
        assert_eq!(err, RewardError::Locker(LockerError::NoActiveLock));

        let update = BalanceUpdate {
            user: ALICE,
            before: U256::zero(),
            after: U256::one(),
            total_after: U256::one(),
        };
        assert_eq!(
            pool.on_balance_update(&update, 0),
            Err(RewardError::UnsupportedOperation { kind: "decaying-locker" })
        );
    }
}
