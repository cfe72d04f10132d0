//! The reward controller.
//!
//! Owns an ordered set of pools (ids are assigned in registration order), the
//! freeze/melt-down schedule, every participant's frozen buckets, and the
//! authoritative claimed ledger. It is the only path through which pool
//! state changes: balance updates, locks, permits and admin changes are all
//! routed here.
//!
//! ## Claim flow
//!
//! 1. Read every pool's pending reward for the participant. Parts recorded
//!    before a freeze percentage change keep the percentage they accrued
//!    under; the rest uses the current one.
//! 2. On a staged copy of the participant's frozen buckets, release what is
//!    due and split each pending part; frozen parts vest from the tick they
//!    accrued.
//! 3. Mint the claimable total through the reward token ledger.
//! 4. Drain the pools and put the staged buckets in place.
//!
//! Nothing is mutated before step 3, so a failed claim leaves no trace.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tally_crypto::ed25519::Signature;
use tally_locker::LockReceipt;
use tally_types::clock::SharedClock;
use tally_types::ledger::TokenLedger;
use tally_types::math::{self, PERCENTAGE_FACTOR};
use tally_types::{short_hex, Address, BalanceUpdate, PoolId, Tick, TokenId, U256};
use tracing::{debug, info, warn};

use crate::freeze::{self, FreezeSchedule, FreezeSource, FrozenBalances, FrozenBuckets, Tranche};
use crate::permit::PermitClaim;
use crate::pool::{PoolKind, RewardPool};
use crate::{Result, RewardError};

/// Claimable and frozen reward of a participant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimableReward {
    /// Payable now.
    pub claimable: U256,
    /// Frozen, releasing toward the melt-down tick.
    pub extra: U256,
}

/// Result of a claim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimOutcome {
    /// Amount minted by this claim.
    pub claimed: U256,
    /// Amount still frozen after this claim.
    pub frozen: U256,
    /// Cumulative amount minted to the participant.
    pub total_claimed: U256,
}

/// Pending reward of one pool, split under one freeze percentage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Accrual {
    pub pool: PoolId,
    pub amount: U256,
    pub percentage: u32,
    pub accrued_at: Tick,
}

/// A claim computed against staged buckets.
struct ClaimPlan {
    buckets: FrozenBuckets,
    claimable: U256,
}

/// Aggregates pools, applies the freeze schedule, and pays out.
pub struct RewardController<L: TokenLedger> {
    clock: SharedClock,
    ledger: L,
    admin: Address,
    schedule: FreezeSchedule,
    paused: bool,
    base_rate: Option<U256>,
    pools: BTreeMap<PoolId, RewardPool>,
    next_pool_id: PoolId,
    frozen: FrozenBalances,
    tranches: BTreeMap<(Address, PoolId), Vec<Tranche>>,
    claimed: BTreeMap<Address, U256>,
}

impl<L: TokenLedger> RewardController<L> {
    /// Create a controller paying out through `ledger`.
    ///
    /// # Errors
    ///
    /// - [`RewardError::InvalidPercentage`] if the schedule is invalid
    pub fn new(clock: SharedClock, ledger: L, admin: Address, schedule: FreezeSchedule) -> Result<Self> {
        schedule.validate()?;
        Ok(Self {
            clock,
            ledger,
            admin,
            schedule,
            paused: false,
            base_rate: None,
            pools: BTreeMap::new(),
            next_pool_id: 0,
            frozen: FrozenBalances::new(),
            tranches: BTreeMap::new(),
            claimed: BTreeMap::new(),
        })
    }

    /// The current tick.
    pub fn now(&self) -> Tick {
        self.clock.current_tick()
    }

    /// Reward token ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Reward token ledger, mutably.
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// Controller admin.
    pub fn admin(&self) -> &Address {
        &self.admin
    }

    /// Controller-wide freeze schedule.
    pub fn schedule(&self) -> &FreezeSchedule {
        &self.schedule
    }

    /// Whether claims are paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Base rate shared out by baseline percentages, if set.
    pub fn base_rate(&self) -> Option<U256> {
        self.base_rate
    }

    /// Registered pool by id.
    pub fn pool(&self, id: PoolId) -> Option<&RewardPool> {
        self.pools.get(&id)
    }

    /// Registered pools in registration order.
    pub fn pools(&self) -> impl Iterator<Item = (PoolId, &RewardPool)> {
        self.pools.iter().map(|(id, pool)| (*id, pool))
    }

    /// Cumulative amount minted to `user`.
    pub fn claimed_total(&self, user: &Address) -> U256 {
        self.claimed.get(user).copied().unwrap_or_default()
    }

    /// Amount frozen for `user` as of its last claim.
    pub fn frozen_balance(&self, user: &Address) -> U256 {
        self.frozen.frozen_of(user)
    }

    /// Register a pool. Returns its id.
    pub fn add_reward_pool(&mut self, caller: &Address, mut pool: RewardPool) -> Result<PoolId> {
        self.ensure_admin(caller)?;
        let now = self.now();
        if let (Some(base), Some(bps)) = (self.base_rate, pool.baseline_percentage()) {
            pool.set_rate(math::percent_mul(base, bps)?, now)?;
        }
        let id = self.next_pool_id;
        self.next_pool_id += 1;
        info!(pool = id, name = pool.name(), kind = pool.kind_name(), "controller: pool added");
        self.pools.insert(id, pool);
        Ok(id)
    }

    /// Unregister a pool. Amounts already claimed are unaffected; anything
    /// still pending in the pool is no longer reachable.
    pub fn remove_reward_pool(&mut self, caller: &Address, id: PoolId) -> Result<RewardPool> {
        self.ensure_admin(caller)?;
        let pool = self.pools.remove(&id).ok_or(RewardError::UnknownPool(id))?;
        self.tranches.retain(|(_, pool_id), _| *pool_id != id);
        warn!(pool = id, name = pool.name(), "controller: pool removed");
        Ok(pool)
    }

    /// Route a balance update from `provider` to pool `id`.
    pub fn handle_balance_update(
        &mut self,
        provider: &Address,
        id: PoolId,
        token: &TokenId,
        update: &BalanceUpdate,
    ) -> Result<()> {
        let now = self.now();
        self.pool_mut(id)?.handle_balance_update(provider, token, update, now)
    }

    /// Route a scaled balance update from `provider` to pool `id`.
    pub fn handle_scaled_balance_update(
        &mut self,
        provider: &Address,
        id: PoolId,
        token: &TokenId,
        update: &BalanceUpdate,
        index: U256,
    ) -> Result<()> {
        let now = self.now();
        self.pool_mut(id)?
            .handle_scaled_balance_update(provider, token, update, index, now)
    }

    /// Pending reward of `user` in pool `id`.
    pub fn calc_reward_for(&self, id: PoolId, user: &Address) -> Result<(U256, Tick)> {
        self.pool_ref(id)?.calc_reward_for(user, self.now())
    }

    /// What `user` could claim now, and what would stay frozen.
    pub fn claimable_reward(&self, user: &Address) -> Result<ClaimableReward> {
        let now = self.now();
        let pending = self.accrued_by_pool(user, now, None)?;
        self.preview_split(user, &self.accruals_for(user, &pending, now), now)
    }

    /// Claim for `user`: drain every pool, freeze per schedule, mint the
    /// claimable part.
    ///
    /// # Errors
    ///
    /// - [`RewardError::RewardsPaused`] if claims are paused
    pub fn claim_reward(&mut self, user: &Address) -> Result<ClaimOutcome> {
        self.ensure_claims_open()?;
        let now = self.now();
        let pending = self.accrued_by_pool(user, now, None)?;
        let accruals = self.accruals_for(user, &pending, now);
        self.settle_claim(user, &accruals, now)
    }

    /// Lock reward tokens of `owner` in locker pool `id`.
    pub fn lock(
        &mut self,
        id: PoolId,
        owner: Address,
        amount: U256,
        period: u64,
        slippage_bps: u32,
    ) -> Result<LockReceipt> {
        let now = self.now();
        let pool = self.pools.get_mut(&id).ok_or(RewardError::UnknownPool(id))?;
        if pool.is_paused() {
            return Err(RewardError::PoolPaused);
        }
        let kind = pool.kind_name();
        match pool.kind_mut() {
            PoolKind::Locker(locker) | PoolKind::DecayingLocker(locker) => {
                locker.lock(&mut self.ledger, owner, amount, period, slippage_bps, now)
            }
            _ => Err(RewardError::UnsupportedOperation { kind }),
        }
    }

    /// Return `owner`'s expired lock in pool `id` to `to`.
    pub fn redeem_lock(&mut self, id: PoolId, owner: Address, to: Address) -> Result<U256> {
        let now = self.now();
        let pool = self.pools.get_mut(&id).ok_or(RewardError::UnknownPool(id))?;
        let kind = pool.kind_name();
        match pool.kind_mut() {
            PoolKind::Locker(locker) | PoolKind::DecayingLocker(locker) => {
                locker.redeem(&mut self.ledger, owner, to, now)
            }
            _ => Err(RewardError::UnsupportedOperation { kind }),
        }
    }

    /// Apply a signed permit to pool `id` without claiming.
    pub fn redeem_permit(
        &mut self,
        id: PoolId,
        claim: &PermitClaim,
        signature: &Signature,
    ) -> Result<U256> {
        let now = self.now();
        let pool = self.pool_mut(id)?;
        if pool.is_paused() {
            return Err(RewardError::PoolPaused);
        }
        let kind = pool.kind_name();
        match pool.kind_mut() {
            PoolKind::PermitFreezer(inner) => inner.redeem_permit(claim, signature, now),
            _ => Err(RewardError::UnsupportedOperation { kind }),
        }
    }

    /// Apply a signed permit to pool `id`, then claim for the spender.
    pub fn claim_reward_by_permit(
        &mut self,
        id: PoolId,
        claim: &PermitClaim,
        signature: &Signature,
    ) -> Result<ClaimOutcome> {
        self.ensure_claims_open()?;
        self.redeem_permit(id, claim, signature)?;
        self.claim_reward(&claim.spender)
    }

    /// Set the controller-wide freeze percentage. Applies to reward accrued
    /// from now on; what is already pending keeps the old percentage and
    /// existing buckets keep their amounts.
    pub fn set_freeze_percentage(&mut self, caller: &Address, bps: u32) -> Result<()> {
        self.ensure_admin(caller)?;
        if bps > PERCENTAGE_FACTOR {
            return Err(RewardError::InvalidPercentage(bps));
        }
        if bps != self.schedule.freeze_percentage {
            let following: Vec<PoolId> = self
                .pools
                .iter()
                .filter(|(_, pool)| pool.freeze_percentage().is_none())
                .map(|(id, _)| *id)
                .collect();
            self.record_tranches(&following)?;
        }
        self.schedule.freeze_percentage = bps;
        info!(bps, "controller: freeze percentage changed");
        Ok(())
    }

    /// Set the controller-wide melt-down tick.
    pub fn set_melt_down_at(&mut self, caller: &Address, tick: Tick) -> Result<()> {
        self.ensure_admin(caller)?;
        self.schedule.melt_down_at = tick;
        info!(tick, "controller: melt-down tick changed");
        Ok(())
    }

    /// Pause or resume claims.
    pub fn set_paused(&mut self, caller: &Address, paused: bool) -> Result<()> {
        self.ensure_admin(caller)?;
        self.paused = paused;
        warn!(paused, "controller: claims pause flag changed");
        Ok(())
    }

    /// Change the rate of pool `id`.
    pub fn set_pool_rate(&mut self, caller: &Address, id: PoolId, rate: U256) -> Result<()> {
        self.ensure_admin(caller)?;
        let now = self.now();
        self.pool_mut(id)?.set_rate(rate, now)
    }

    /// Pause or resume balance updates of pool `id`.
    pub fn set_pool_paused(&mut self, caller: &Address, id: PoolId, paused: bool) -> Result<()> {
        self.ensure_admin(caller)?;
        self.pool_mut(id)?.set_paused(paused);
        Ok(())
    }

    /// Authorize `provider` to report `token` balances to pool `id`.
    pub fn add_reward_provider(
        &mut self,
        caller: &Address,
        id: PoolId,
        provider: Address,
        token: TokenId,
    ) -> Result<()> {
        self.ensure_admin(caller)?;
        self.pool_mut(id)?.add_reward_provider(provider, token);
        Ok(())
    }

    /// Revoke a provider of pool `id`.
    pub fn remove_reward_provider(
        &mut self,
        caller: &Address,
        id: PoolId,
        provider: &Address,
        token: &TokenId,
    ) -> Result<bool> {
        self.ensure_admin(caller)?;
        Ok(self.pool_mut(id)?.remove_reward_provider(provider, token))
    }

    /// Override (or clear the override of) the freeze percentage of pool `id`.
    pub fn set_pool_freeze_percentage(
        &mut self,
        caller: &Address,
        id: PoolId,
        bps: Option<u32>,
    ) -> Result<()> {
        self.ensure_admin(caller)?;
        if let Some(value) = bps.filter(|v| *v > PERCENTAGE_FACTOR) {
            return Err(RewardError::InvalidPercentage(value));
        }
        let current = self.freeze_percentage_of(id);
        if bps.unwrap_or(self.schedule.freeze_percentage) != current {
            self.record_tranches(&[id])?;
        }
        self.pool_mut(id)?.set_freeze_percentage(bps)
    }

    /// Override (or clear the override of) the melt-down tick of pool `id`.
    pub fn set_pool_melt_down_at(
        &mut self,
        caller: &Address,
        id: PoolId,
        tick: Option<Tick>,
    ) -> Result<()> {
        self.ensure_admin(caller)?;
        self.pool_mut(id)?.set_melt_down_at(tick);
        Ok(())
    }

    /// Give pool `id` a share of the base rate.
    pub fn set_baseline_percentage(
        &mut self,
        caller: &Address,
        id: PoolId,
        bps: Option<u32>,
    ) -> Result<()> {
        self.ensure_admin(caller)?;
        let now = self.now();
        let base = self.base_rate;
        let pool = self.pool_mut(id)?;
        if let PoolKind::PermitFreezer(_) = pool.kind() {
            return Err(RewardError::UnsupportedOperation {
                kind: pool.kind_name(),
            });
        }
        pool.set_baseline_percentage(bps)?;
        if let (Some(base), Some(bps)) = (base, bps) {
            pool.set_rate(math::percent_mul(base, bps)?, now)?;
        }
        Ok(())
    }

    /// Set the base rate and re-rate every pool with a baseline percentage.
    pub fn set_base_rate(&mut self, caller: &Address, rate: U256) -> Result<()> {
        self.ensure_admin(caller)?;
        let now = self.now();
        let mut rerated = Vec::new();
        for (id, pool) in &self.pools {
            if let Some(bps) = pool.baseline_percentage() {
                rerated.push((*id, math::percent_mul(rate, bps)?));
            }
        }
        for (id, pool_rate) in rerated {
            self.pool_mut(id)?.set_rate(pool_rate, now)?;
        }
        self.base_rate = Some(rate);
        info!(%rate, "controller: base rate changed");
        Ok(())
    }

    /// Add or re-share a member of team pool `id`.
    pub fn set_team_member(
        &mut self,
        caller: &Address,
        id: PoolId,
        member: Address,
        share_bps: u32,
    ) -> Result<()> {
        self.ensure_admin(caller)?;
        let now = self.now();
        let pool = self.pool_mut(id)?;
        let kind = pool.kind_name();
        match pool.kind_mut() {
            PoolKind::Team(team) => team.set_member(member, share_bps, now),
            _ => Err(RewardError::UnsupportedOperation { kind }),
        }
    }

    /// Remove a member of team pool `id`, forfeiting its pending reward.
    pub fn remove_team_member(&mut self, caller: &Address, id: PoolId, member: &Address) -> Result<()> {
        self.ensure_admin(caller)?;
        let now = self.now();
        let pool = self.pool_mut(id)?;
        let kind = pool.kind_name();
        match pool.kind_mut() {
            PoolKind::Team(team) => team.remove_member(member, now)?,
            _ => return Err(RewardError::UnsupportedOperation { kind }),
        }
        self.tranches.remove(&(*member, id));
        Ok(())
    }

    /// Redirect treasury pool `id` to `treasury`.
    pub fn set_treasury(&mut self, caller: &Address, id: PoolId, treasury: Address) -> Result<()> {
        self.ensure_admin(caller)?;
        let now = self.now();
        let pool = self.pool_mut(id)?;
        let kind = pool.kind_name();
        match pool.kind_mut() {
            PoolKind::Treasury(inner) => inner.set_treasury(treasury, now),
            _ => Err(RewardError::UnsupportedOperation { kind }),
        }
    }

    /// Authorize `signer` to issue permits for pool `id`.
    pub fn add_permit_signer(&mut self, caller: &Address, id: PoolId, signer: Address) -> Result<()> {
        self.ensure_admin(caller)?;
        let pool = self.pool_mut(id)?;
        let kind = pool.kind_name();
        match pool.kind_mut() {
            PoolKind::PermitFreezer(inner) => {
                inner.add_signer(signer);
                Ok(())
            }
            _ => Err(RewardError::UnsupportedOperation { kind }),
        }
    }

    pub(crate) fn ensure_admin(&self, caller: &Address) -> Result<()> {
        if caller != &self.admin {
            return Err(RewardError::Unauthorized);
        }
        Ok(())
    }

    pub(crate) fn ensure_claims_open(&self) -> Result<()> {
        if self.paused {
            return Err(RewardError::RewardsPaused);
        }
        Ok(())
    }

    /// Pending reward of `user` per pool, skipping `skip`.
    pub(crate) fn accrued_by_pool(
        &self,
        user: &Address,
        now: Tick,
        skip: Option<PoolId>,
    ) -> Result<Vec<(PoolId, U256)>> {
        let mut accrued = Vec::with_capacity(self.pools.len());
        for (id, pool) in &self.pools {
            if Some(*id) == skip {
                continue;
            }
            let (amount, _) = pool.calc_reward_for(user, now)?;
            if !amount.is_zero() {
                accrued.push((*id, amount));
            }
        }
        Ok(accrued)
    }

    /// Split `pending` into accruals: recorded tranches first, at the
    /// percentage they accrued under, then the rest at the current one.
    pub(crate) fn accruals_for(&self, user: &Address, pending: &[(PoolId, U256)], now: Tick) -> Vec<Accrual> {
        let mut accruals = Vec::with_capacity(pending.len());
        for (id, amount) in pending {
            let mut rest = *amount;
            for tranche in self.tranches.get(&(*user, *id)).into_iter().flatten() {
                let take = tranche.amount.min(rest);
                if take.is_zero() {
                    break;
                }
                accruals.push(Accrual {
                    pool: *id,
                    amount: take,
                    percentage: tranche.percentage,
                    accrued_at: tranche.accrued_at,
                });
                rest -= take;
            }
            if !rest.is_zero() {
                accruals.push(Accrual {
                    pool: *id,
                    amount: rest,
                    percentage: self.freeze_percentage_of(*id),
                    accrued_at: now,
                });
            }
        }
        accruals
    }

    /// Pending reward of `user` in a single pool.
    pub(crate) fn pending_in(&self, id: PoolId, user: &Address, now: Tick) -> Result<U256> {
        Ok(self.pool_ref(id)?.calc_reward_for(user, now)?.0)
    }

    /// Split of `accruals` plus existing buckets, without mutating.
    pub(crate) fn preview_split(
        &self,
        user: &Address,
        accruals: &[Accrual],
        now: Tick,
    ) -> Result<ClaimableReward> {
        let plan = self.plan_claim(user, accruals, now)?;
        Ok(ClaimableReward {
            claimable: plan.claimable,
            extra: plan.buckets.total(),
        })
    }

    /// Freeze and pay out `accruals` for `user`, then drain every pool.
    pub(crate) fn settle_claim(
        &mut self,
        user: &Address,
        accruals: &[Accrual],
        now: Tick,
    ) -> Result<ClaimOutcome> {
        let plan = self.plan_claim(user, accruals, now)?;
        let total_claimed = math::add(self.claimed_total(user), plan.claimable)?;
        if !plan.claimable.is_zero() {
            self.ledger.mint(user, plan.claimable)?;
        }

        // Draining repeats the arithmetic the plan already ran.
        for (id, pool) in self.pools.iter_mut() {
            let amount = pool.claim_reward_for(user, now)?;
            if !amount.is_zero() {
                debug!(pool = *id, user = %short_hex(user), %amount, "controller: drained pool");
            }
        }
        self.tranches.retain(|(owner, _), _| owner != user);
        let frozen = plan.buckets.total();
        self.frozen.replace(user, plan.buckets);
        self.claimed.insert(*user, total_claimed);

        info!(
            user = %short_hex(user),
            claimed = %plan.claimable,
            %frozen,
            tick = now,
            "controller: reward claimed"
        );
        Ok(ClaimOutcome {
            claimed: plan.claimable,
            frozen,
            total_claimed,
        })
    }

    fn plan_claim(&self, user: &Address, accruals: &[Accrual], now: Tick) -> Result<ClaimPlan> {
        let melt = |source: FreezeSource| melt_down_for(&self.pools, &self.schedule, source);
        let mut buckets = self.frozen.buckets_of(user);
        let mut claimable = buckets.release(&melt, now)?;
        for accrual in accruals {
            let source = self.freeze_source(accrual.pool);
            let (free, frozen) = freeze::split(accrual.amount, accrual.percentage)?;
            let due = buckets.freeze(source, frozen, melt(source), accrual.accrued_at, now)?;
            claimable = math::add(claimable, math::add(free, due)?)?;
        }
        Ok(ClaimPlan { buckets, claimable })
    }

    /// Record every participant's pending reward in `ids` as a tranche under
    /// the pool's current freeze percentage.
    fn record_tranches(&mut self, ids: &[PoolId]) -> Result<()> {
        let now = self.now();
        let mut recorded = Vec::new();
        for id in ids {
            let pool = self.pool_ref(*id)?;
            let percentage = self.freeze_percentage_of(*id);
            for user in pool.participants() {
                let (pending, _) = pool.calc_reward_for(&user, now)?;
                let covered = self
                    .tranches
                    .get(&(user, *id))
                    .into_iter()
                    .flatten()
                    .fold(U256::zero(), |acc, t| acc.saturating_add(t.amount));
                if pending > covered {
                    let tranche = Tranche {
                        amount: pending - covered,
                        percentage,
                        accrued_at: now,
                    };
                    recorded.push(((user, *id), tranche));
                }
            }
        }
        debug!(pools = ids.len(), tranches = recorded.len(), tick = now, "controller: pending reward recorded");
        for (key, tranche) in recorded {
            self.tranches.entry(key).or_default().push(tranche);
        }
        Ok(())
    }

    fn freeze_source(&self, id: PoolId) -> FreezeSource {
        match self.pools.get(&id) {
            Some(pool) if pool.has_freeze_override() => FreezeSource::Pool(id),
            _ => FreezeSource::Global,
        }
    }

    fn freeze_percentage_of(&self, id: PoolId) -> u32 {
        self.pools
            .get(&id)
            .and_then(RewardPool::freeze_percentage)
            .unwrap_or(self.schedule.freeze_percentage)
    }

    fn pool_ref(&self, id: PoolId) -> Result<&RewardPool> {
        self.pools.get(&id).ok_or(RewardError::UnknownPool(id))
    }

    fn pool_mut(&mut self, id: PoolId) -> Result<&mut RewardPool> {
        self.pools.get_mut(&id).ok_or(RewardError::UnknownPool(id))
    }
}

/// Melt-down tick a frozen bucket of `source` follows. Buckets of removed
/// pools fall back to the controller-wide tick.
fn melt_down_for(
    pools: &BTreeMap<PoolId, RewardPool>,
    schedule: &FreezeSchedule,
    source: FreezeSource,
) -> Tick {
    match source {
        FreezeSource::Global => schedule.melt_down_at,
        FreezeSource::Pool(id) => pools
            .get(&id)
            .and_then(RewardPool::melt_down_at)
            .unwrap_or(schedule.melt_down_at),
    }
}
