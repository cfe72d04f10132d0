//! Boost emission on top of a reward controller.
//!
//! One registered pool is designated the boost pool. Other pools may carry a
//! boost factor (bps, a multiplier that may exceed 10000). On claim, the
//! reward drained from each boosted pool is the participant's work there, and
//! the boost limit is `Σ work × factor / 10000`. The participant receives the lesser of its
//! boost-pool accrual and that limit; the rest becomes excess, which can be
//! swept to a configured target after a grace period.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tally_crypto::ed25519::Signature;
use tally_types::ledger::TokenLedger;
use tally_types::math;
use tally_types::{short_hex, Address, PoolId, Tick, U256};
use tracing::{debug, info};

use crate::controller::{Accrual, ClaimOutcome, ClaimableReward, RewardController};
use crate::permit::PermitClaim;
use crate::{Result, RewardError};

/// Booster settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoosterParams {
    /// Minimum ticks between two excess sweeps.
    pub grace_period: u64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            grace_period: 86_400,
        }
    }
}

/// A controller plus boost accounting.
pub struct Booster<L: TokenLedger> {
    controller: RewardController<L>,
    params: BoosterParams,
    boost_pool: Option<PoolId>,
    factors: BTreeMap<PoolId, u32>,
    excess: U256,
    excess_target: Option<Address>,
    excess_enabled: bool,
    last_sweep: Tick,
}

impl<L: TokenLedger> Booster<L> {
    /// Wrap `controller`.
    pub fn new(controller: RewardController<L>, params: BoosterParams) -> Self {
        let last_sweep = controller.now();
        Self {
            controller,
            params,
            boost_pool: None,
            factors: BTreeMap::new(),
            excess: U256::zero(),
            excess_target: None,
            excess_enabled: false,
            last_sweep,
        }
    }

    /// The wrapped controller.
    pub fn controller(&self) -> &RewardController<L> {
        &self.controller
    }

    /// The wrapped controller, mutably. Claims must go through the booster.
    pub fn controller_mut(&mut self) -> &mut RewardController<L> {
        &mut self.controller
    }

    /// Booster settings.
    pub fn params(&self) -> &BoosterParams {
        &self.params
    }

    /// The boost emission pool, if designated.
    pub fn boost_pool(&self) -> Option<PoolId> {
        self.boost_pool
    }

    /// Boost factor of `pool` in bps (0 if not boosted).
    pub fn boost_factor(&self, pool: PoolId) -> u32 {
        self.factors.get(&pool).copied().unwrap_or(0)
    }

    /// Boost emission withheld so far and not yet swept.
    pub fn excess(&self) -> U256 {
        self.excess
    }

    /// Designate the boost emission pool.
    pub fn set_boost_pool(&mut self, caller: &Address, id: PoolId) -> Result<()> {
        self.controller.ensure_admin(caller)?;
        if self.controller.pool(id).is_none() {
            return Err(RewardError::UnknownPool(id));
        }
        self.factors.remove(&id);
        self.boost_pool = Some(id);
        info!(pool = id, "booster: boost pool set");
        Ok(())
    }

    /// Set the boost factor of `pool` in bps of its work. Zero removes it.
    pub fn set_boost_factor(&mut self, caller: &Address, pool: PoolId, bps: u32) -> Result<()> {
        self.controller.ensure_admin(caller)?;
        if self.controller.pool(pool).is_none() {
            return Err(RewardError::UnknownPool(pool));
        }
        if Some(pool) == self.boost_pool {
            return Err(RewardError::UnsupportedOperation { kind: "boost" });
        }
        if bps == 0 {
            self.factors.remove(&pool);
        } else {
            self.factors.insert(pool, bps);
        }
        info!(pool, bps, "booster: boost factor set");
        Ok(())
    }

    /// Where swept excess goes, and whether sweeping is on.
    pub fn set_boost_excess_target(
        &mut self,
        caller: &Address,
        target: Option<Address>,
        enabled: bool,
    ) -> Result<()> {
        self.controller.ensure_admin(caller)?;
        self.excess_target = target;
        self.excess_enabled = enabled;
        info!(
            target = ?target.as_ref().map(short_hex),
            enabled,
            "booster: excess target set"
        );
        Ok(())
    }

    /// What `user` could claim now, including its capped boost.
    pub fn claimable_reward(&self, user: &Address) -> Result<ClaimableReward> {
        let now = self.controller.now();
        let Some(boost_id) = self.live_boost_pool() else {
            return self.controller.claimable_reward(user);
        };
        let (accruals, _) = self.boosted_accruals(user, boost_id, now)?;
        self.controller.preview_split(user, &accruals, now)
    }

    /// Claim for `user` with boost.
    ///
    /// # Errors
    ///
    /// - [`RewardError::RewardsPaused`] if claims are paused
    pub fn claim_reward(&mut self, user: &Address) -> Result<ClaimOutcome> {
        self.controller.ensure_claims_open()?;
        let now = self.controller.now();
        let Some(boost_id) = self.live_boost_pool() else {
            return self.controller.claim_reward(user);
        };

        let (accruals, withheld) = self.boosted_accruals(user, boost_id, now)?;
        let excess = math::add(self.excess, withheld)?;
        let outcome = self.controller.settle_claim(user, &accruals, now)?;
        self.excess = excess;
        Ok(outcome)
    }

    /// Apply a signed permit, then claim for the spender with boost.
    pub fn claim_reward_by_permit(
        &mut self,
        id: PoolId,
        claim: &PermitClaim,
        signature: &Signature,
    ) -> Result<ClaimOutcome> {
        self.controller.ensure_claims_open()?;
        self.controller.redeem_permit(id, claim, signature)?;
        self.claim_reward(&claim.spender)
    }

    /// Mint accumulated excess to the target. Returns the amount minted;
    /// zero when disabled, without a target, or inside the grace period.
    pub fn sweep_boost_excess(&mut self) -> Result<U256> {
        let now = self.controller.now();
        let target = match self.excess_target {
            Some(target) if self.excess_enabled => target,
            _ => return Ok(U256::zero()),
        };
        if now < self.last_sweep.saturating_add(self.params.grace_period) {
            debug!(
                next = self.last_sweep.saturating_add(self.params.grace_period),
                tick = now,
                "booster: sweep inside grace period"
            );
            return Ok(U256::zero());
        }
        let amount = std::mem::take(&mut self.excess);
        self.last_sweep = now;
        if !amount.is_zero() {
            self.controller.ledger_mut().mint(&target, amount)?;
        }
        info!(target = %short_hex(&target), %amount, tick = now, "booster: excess swept");
        Ok(amount)
    }

    fn live_boost_pool(&self) -> Option<PoolId> {
        self.boost_pool
            .filter(|id| self.controller.pool(*id).is_some())
    }

    /// Accruals of `user` with the boost pool capped, and the boost withheld.
    fn boosted_accruals(&self, user: &Address, boost_id: PoolId, now: Tick) -> Result<(Vec<Accrual>, U256)> {
        let mut pending = self.controller.accrued_by_pool(user, now, Some(boost_id))?;
        let limit = self.boost_limit(&pending)?;
        let available = self.controller.pending_in(boost_id, user, now)?;
        let boost = available.min(limit);
        debug!(
            user = %short_hex(user),
            %available,
            %limit,
            %boost,
            "booster: boost capped"
        );
        if !boost.is_zero() {
            pending.push((boost_id, boost));
        }
        Ok((self.controller.accruals_for(user, &pending, now), available - boost))
    }

    fn boost_limit(&self, work: &[(PoolId, U256)]) -> Result<U256> {
        let mut limit = U256::zero();
        for (id, amount) in work {
            if let Some(bps) = self.factors.get(id) {
                limit = math::add(limit, math::percent_mul(*amount, *bps)?)?;
            }
        }
        Ok(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freeze::FreezeSchedule;
    use crate::pool::RewardPool;
    use tally_types::clock::ManualClock;
    use tally_types::ledger::InMemoryLedger;
    use tally_types::{BalanceUpdate, TokenId};

    const ADMIN: Address = [0xAD; 32];
    const PROVIDER: Address = [0x50; 32];
    const TOKEN: TokenId = [0x70; 32];
    const ALICE: Address = [0x01; 32];
    const SINK: Address = [0x5E; 32];

    struct Fixture {
        booster: Booster<InMemoryLedger>,
        clock: ManualClock,
        work_pool: PoolId,
        boost_pool: PoolId,
    }

    fn setup(grace_period: u64) -> Fixture {
        let clock = ManualClock::new(0);
        let mut controller = RewardController::new(
            clock.shared(),
            InMemoryLedger::new(),
            ADMIN,
            FreezeSchedule::default(),
        )
        .expect("controller");
        let work_pool = controller
            .add_reward_pool(&ADMIN, RewardPool::token_weighted("work", U256::from(100), 0))
            .expect("work");
        let boost_pool = controller
            .add_reward_pool(&ADMIN, RewardPool::token_weighted("boost", U256::from(1_000), 0))
            .expect("boost");
        for id in [work_pool, boost_pool] {
            controller
                .add_reward_provider(&ADMIN, id, PROVIDER, TOKEN)
                .expect("provider");
        }
        let mut booster = Booster::new(controller, BoosterParams { grace_period });
        booster.set_boost_pool(&ADMIN, boost_pool).expect("boost pool");
        booster.set_boost_factor(&ADMIN, work_pool, 5_000).expect("factor");
        Fixture {
            booster,
            clock,
            work_pool,
            boost_pool,
        }
    }

    fn stake(booster: &mut Booster<InMemoryLedger>, id: PoolId, amount: u64) {
        let update = BalanceUpdate {
            user: ALICE,
            before: U256::zero(),
            after: U256::from(amount),
            total_after: U256::from(amount),
        };
        booster
            .controller_mut()
            .handle_balance_update(&PROVIDER, id, &TOKEN, &update)
            .expect("stake");
    }

    #[test]
    fn test_boost_capped_by_work() {
        let mut f = setup(0);
        stake(&mut f.booster, f.work_pool, 10);
        stake(&mut f.booster, f.boost_pool, 10);
        f.clock.mine_ticks(10);

        let preview = f.booster.claimable_reward(&ALICE).expect("preview");
        assert_eq!(preview.claimable, U256::from(1_000 + 500));

        let outcome = f.booster.claim_reward(&ALICE).expect("claim");
        assert_eq!(outcome.claimed, U256::from(1_500));
        assert_eq!(f.booster.excess(), U256::from(9_500));
    }

    #[test]
    fn test_factor_above_one_multiplies_work() {
        let mut f = setup(0);
        f.booster.set_boost_factor(&ADMIN, f.work_pool, 20_000).expect("2x");
        assert_eq!(f.booster.boost_factor(f.work_pool), 20_000);
        stake(&mut f.booster, f.work_pool, 10);
        stake(&mut f.booster, f.boost_pool, 10);
        f.clock.mine_ticks(10);

        // Work 1000, limit 2000 out of 10000 boost accrued.
        let outcome = f.booster.claim_reward(&ALICE).expect("claim");
        assert_eq!(outcome.claimed, U256::from(1_000 + 2_000));
        assert_eq!(f.booster.excess(), U256::from(8_000));
    }

    #[test]
    fn test_zero_work_zero_boost() {
        let mut f = setup(0);
        stake(&mut f.booster, f.boost_pool, 10);
        f.clock.mine_ticks(10);
        let outcome = f.booster.claim_reward(&ALICE).expect("claim");
        assert!(outcome.claimed.is_zero());
        assert_eq!(f.booster.excess(), U256::from(10_000));
    }

    #[test]
    fn test_sweep_respects_target_and_grace() {
        let mut f = setup(50);
        stake(&mut f.booster, f.boost_pool, 10);
        f.clock.mine_ticks(10);
        f.booster.claim_reward(&ALICE).expect("claim");

        // Disabled by default.
        assert!(f.booster.sweep_boost_excess().expect("disabled").is_zero());
        f.booster
            .set_boost_excess_target(&ADMIN, Some(SINK), true)
            .expect("target");
        assert!(f.booster.sweep_boost_excess().expect("grace").is_zero());

        f.clock.mine_to_tick(50);
        let swept = f.booster.sweep_boost_excess().expect("sweep");
        assert_eq!(swept, U256::from(10_000));
        assert_eq!(f.booster.controller().ledger().balance_of(&SINK), swept);
        assert!(f.booster.excess().is_zero());
    }

    #[test]
    fn test_admin_checks() {
        let mut f = setup(0);
        assert_eq!(
            f.booster.set_boost_factor(&ALICE, f.work_pool, 1),
            Err(RewardError::Unauthorized)
        );
        assert_eq!(
            f.booster.set_boost_pool(&ADMIN, 99),
            Err(RewardError::UnknownPool(99))
        );
    }

    #[test]
    fn test_without_boost_pool_claims_plainly() {
        let mut f = setup(0);
        f.booster
            .controller_mut()
            .remove_reward_pool(&ADMIN, f.boost_pool)
            .expect("remove");
        stake(&mut f.booster, f.work_pool, 10);
        f.clock.mine_ticks(10);
        assert_eq!(
            f.booster.claim_reward(&ALICE).expect("claim").claimed,
            U256::from(1_000)
        );
        assert_eq!(f.booster.boost_factor(f.work_pool), 5_000);
    }
}
