//! Reward pools.
//!
//! Every pool variant implements [`RewardSource`], the single capability
//! interface the controller drives. [`RewardPool`] wraps a variant with the
//! state every pool shares (pause flag, registered providers, baseline and
//! freeze overrides) and runs the authorization and pause checks before
//! dispatching to the variant.
//!
//! ## Variants
//!
//! - [`token_weighted`] — Emission shared pro rata over reported balances
//! - [`team`] — Fixed roster of shares, paying only after an unlock tick
//! - [`zombie`] — One-shot credit per balance increase, capped
//! - [`treasury`] — Flat emission to a single treasury address
//! - [`permit_freezer`] — Credits granted by signed permits
//! - [`locker`] — Linear or decaying token locker

pub mod locker;
pub mod permit_freezer;
pub mod team;
pub mod token_weighted;
pub mod treasury;
pub mod zombie;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tally_locker::{LockerMode, LockerParams};
use tally_types::math::{self, PERCENTAGE_FACTOR};
use tally_types::{short_hex, Address, BalanceUpdate, Tick, TokenId, U256};

use crate::{Result, RewardError};

pub use locker::LockerPool;
pub use permit_freezer::PermitFreezerPool;
pub use team::TeamPool;
pub use token_weighted::TokenWeightedPool;
pub use treasury::TreasuryPool;
pub use zombie::ZombiePool;

/// Accrual interface shared by every pool variant.
///
/// Reads never mutate state; every mutation settles the variant's
/// accumulator up to `now` before changing any balance.
pub trait RewardSource {
    /// Variant name, for errors and logs.
    fn kind(&self) -> &'static str;

    /// Emission rate per tick (or per unit for fixed-credit variants).
    fn rate(&self) -> U256;

    /// Every address that may have pending reward.
    fn participants(&self) -> Vec<Address>;

    /// Change the rate from `now` on, settling first.
    fn set_rate(&mut self, rate: U256, now: Tick) -> Result<()>;

    /// Apply a reported balance change.
    fn on_balance_update(&mut self, update: &BalanceUpdate, now: Tick) -> Result<()> {
        let _ = (update, now);
        Err(RewardError::UnsupportedOperation { kind: self.kind() })
    }

    /// Accrued but unclaimed reward of `user` and the tick it has been
    /// accruing since.
    fn calc_reward_for(&self, user: &Address, now: Tick) -> Result<(U256, Tick)>;

    /// Settle and zero `user`'s pending reward, returning it.
    fn claim_reward_for(&mut self, user: &Address, now: Tick) -> Result<U256>;
}

/// The closed set of pool variants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PoolKind {
    /// See [`TokenWeightedPool`].
    TokenWeighted(TokenWeightedPool),
    /// See [`TeamPool`].
    Team(TeamPool),
    /// See [`ZombiePool`].
    Zombie(ZombiePool),
    /// See [`TreasuryPool`].
    Treasury(TreasuryPool),
    /// See [`PermitFreezerPool`].
    PermitFreezer(PermitFreezerPool),
    /// A [`LockerPool`] with flat weight.
    Locker(LockerPool),
    /// A [`LockerPool`] with decaying weight.
    DecayingLocker(LockerPool),
}

impl PoolKind {
    fn source(&self) -> &dyn RewardSource {
        match self {
            Self::TokenWeighted(p) => p,
            Self::Team(p) => p,
            Self::Zombie(p) => p,
            Self::Treasury(p) => p,
            Self::PermitFreezer(p) => p,
            Self::Locker(p) | Self::DecayingLocker(p) => p,
        }
    }

    fn source_mut(&mut self) -> &mut dyn RewardSource {
        match self {
            Self::TokenWeighted(p) => p,
            Self::Team(p) => p,
            Self::Zombie(p) => p,
            Self::Treasury(p) => p,
            Self::PermitFreezer(p) => p,
            Self::Locker(p) | Self::DecayingLocker(p) => p,
        }
    }
}

/// A pool variant plus the state shared by all pools.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RewardPool {
    name: String,
    paused: bool,
    providers: BTreeSet<(Address, TokenId)>,
    baseline_bps: Option<u32>,
    freeze_percentage: Option<u32>,
    melt_down_at: Option<Tick>,
    kind: PoolKind,
}

impl RewardPool {
    /// Wrap a variant.
    pub fn new(name: impl Into<String>, kind: PoolKind) -> Self {
        Self {
            name: name.into(),
            paused: false,
            providers: BTreeSet::new(),
            baseline_bps: None,
            freeze_percentage: None,
            melt_down_at: None,
            kind,
        }
    }

    /// Token-weighted pool emitting `rate` per tick.
    pub fn token_weighted(name: impl Into<String>, rate: U256, now: Tick) -> Self {
        Self::new(name, PoolKind::TokenWeighted(TokenWeightedPool::new(rate, now)))
    }

    /// Team pool emitting `rate` per tick to its roster after `unlocked_at`.
    pub fn team(name: impl Into<String>, rate: U256, unlocked_at: Tick) -> Self {
        Self::new(name, PoolKind::Team(TeamPool::new(rate, unlocked_at)))
    }

    /// Fixed-credit pool paying `reward_per_unit` (ray) per unit of balance
    /// increase, up to `reward_limit` in total.
    pub fn zombie(name: impl Into<String>, reward_per_unit: U256, reward_limit: U256) -> Self {
        Self::new(name, PoolKind::Zombie(ZombiePool::new(reward_per_unit, reward_limit)))
    }

    /// Treasury pool emitting `rate` per tick to `treasury`.
    pub fn treasury(name: impl Into<String>, rate: U256, treasury: Address, now: Tick) -> Self {
        Self::new(name, PoolKind::Treasury(TreasuryPool::new(rate, treasury, now)))
    }

    /// Permit-credited pool.
    pub fn permit_freezer(name: impl Into<String>, pool: PermitFreezerPool) -> Self {
        Self::new(name, PoolKind::PermitFreezer(pool))
    }

    /// Locker pool holding locked tokens under `escrow`.
    pub fn locker(
        name: impl Into<String>,
        mode: LockerMode,
        params: LockerParams,
        escrow: Address,
        rate: U256,
        now: Tick,
    ) -> Result<Self> {
        let pool = LockerPool::new(mode, params, escrow, rate, now)?;
        let kind = match mode {
            LockerMode::Linear => PoolKind::Locker(pool),
            LockerMode::Decaying => PoolKind::DecayingLocker(pool),
        };
        Ok(Self::new(name, kind))
    }

    /// Pool name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Variant name.
    pub fn kind_name(&self) -> &'static str {
        self.kind.source().kind()
    }

    /// The wrapped variant.
    pub fn kind(&self) -> &PoolKind {
        &self.kind
    }

    /// The wrapped variant, mutably. Variant-specific admin operations go
    /// through here.
    pub fn kind_mut(&mut self) -> &mut PoolKind {
        &mut self.kind
    }

    /// Apply a balance change reported by `provider` for `token`.
    ///
    /// # Errors
    ///
    /// - [`RewardError::UnauthorizedProvider`] if the pair is not registered
    /// - [`RewardError::PoolPaused`] if the pool is paused
    pub fn handle_balance_update(
        &mut self,
        provider: &Address,
        token: &TokenId,
        update: &BalanceUpdate,
        now: Tick,
    ) -> Result<()> {
        if !self.providers.contains(&(*provider, *token)) {
            return Err(RewardError::UnauthorizedProvider);
        }
        if self.paused {
            return Err(RewardError::PoolPaused);
        }
        tracing::trace!(
            pool = %self.name,
            user = %short_hex(&update.user),
            before = %update.before,
            after = %update.after,
            total = %update.total_after,
            "pool: balance update"
        );
        self.kind.source_mut().on_balance_update(update, now)
    }

    /// Apply a balance change expressed in scaled units, normalizing every
    /// amount by the ray-scaled `index` first.
    pub fn handle_scaled_balance_update(
        &mut self,
        provider: &Address,
        token: &TokenId,
        update: &BalanceUpdate,
        index: U256,
        now: Tick,
    ) -> Result<()> {
        let normalized = BalanceUpdate {
            user: update.user,
            before: math::ray_mul(update.before, index)?,
            after: math::ray_mul(update.after, index)?,
            total_after: math::ray_mul(update.total_after, index)?,
        };
        self.handle_balance_update(provider, token, &normalized, now)
    }

    /// Accrued but unclaimed reward of `user`.
    pub fn calc_reward_for(&self, user: &Address, now: Tick) -> Result<(U256, Tick)> {
        self.kind.source().calc_reward_for(user, now)
    }

    /// Settle and zero `user`'s pending reward.
    pub fn claim_reward_for(&mut self, user: &Address, now: Tick) -> Result<U256> {
        self.kind.source_mut().claim_reward_for(user, now)
    }

    /// Every address that may have pending reward here.
    pub fn participants(&self) -> Vec<Address> {
        self.kind.source().participants()
    }

    /// Emission rate.
    pub fn rate(&self) -> U256 {
        self.kind.source().rate()
    }

    /// Change the emission rate from `now` on.
    pub fn set_rate(&mut self, rate: U256, now: Tick) -> Result<()> {
        self.kind.source_mut().set_rate(rate, now)?;
        tracing::info!(pool = %self.name, %rate, tick = now, "pool: rate changed");
        Ok(())
    }

    /// Whether balance updates are currently rejected.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Pause or resume balance updates.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        tracing::warn!(pool = %self.name, paused, "pool: pause flag changed");
    }

    /// Authorize `provider` to report balances of `token`.
    pub fn add_reward_provider(&mut self, provider: Address, token: TokenId) {
        self.providers.insert((provider, token));
        tracing::info!(
            pool = %self.name,
            provider = %short_hex(&provider),
            token = %short_hex(&token),
            "pool: reward provider added"
        );
    }

    /// Revoke a provider. Returns whether it was registered.
    pub fn remove_reward_provider(&mut self, provider: &Address, token: &TokenId) -> bool {
        let removed = self.providers.remove(&(*provider, *token));
        if removed {
            tracing::info!(
                pool = %self.name,
                provider = %short_hex(provider),
                "pool: reward provider removed"
            );
        }
        removed
    }

    /// Whether `provider` may report balances of `token`.
    pub fn is_provider(&self, provider: &Address, token: &TokenId) -> bool {
        self.providers.contains(&(*provider, *token))
    }

    /// Share of the controller base rate this pool receives, if any.
    pub fn baseline_percentage(&self) -> Option<u32> {
        self.baseline_bps
    }

    /// Set or clear the baseline percentage.
    pub fn set_baseline_percentage(&mut self, bps: Option<u32>) -> Result<()> {
        self.baseline_bps = check_bps(bps)?;
        Ok(())
    }

    /// Pool-specific freeze percentage, overriding the controller's.
    pub fn freeze_percentage(&self) -> Option<u32> {
        self.freeze_percentage
    }

    /// Set or clear the pool freeze percentage.
    pub fn set_freeze_percentage(&mut self, bps: Option<u32>) -> Result<()> {
        self.freeze_percentage = check_bps(bps)?;
        tracing::info!(pool = %self.name, ?bps, "pool: freeze percentage changed");
        Ok(())
    }

    /// Pool-specific melt-down tick, overriding the controller's.
    pub fn melt_down_at(&self) -> Option<Tick> {
        self.melt_down_at
    }

    /// Set or clear the pool melt-down tick.
    pub fn set_melt_down_at(&mut self, tick: Option<Tick>) {
        self.melt_down_at = tick;
        tracing::info!(pool = %self.name, ?tick, "pool: melt-down tick changed");
    }

    /// Whether the pool carries its own freeze schedule.
    pub fn has_freeze_override(&self) -> bool {
        self.freeze_percentage.is_some() || self.melt_down_at.is_some()
    }
}

fn check_bps(bps: Option<u32>) -> Result<Option<u32>> {
    match bps {
        Some(value) if value > PERCENTAGE_FACTOR => Err(RewardError::InvalidPercentage(value)),
        other => Ok(other),
    }
}
