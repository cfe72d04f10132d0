//! Freeze/melt-down schedule.
//!
//! `freeze_percentage` of every newly accrued amount is withheld into a
//! frozen bucket instead of being paid. A bucket frozen at `T0` releases
//! linearly until the melt-down tick `M` of its source:
//!
//! ```text
//! released(T) = amount × min(1, (T − T0) / (M − T0))     (all of it if T0 ≥ M)
//! ```
//!
//! `M` is read at evaluation time, so moving the melt-down tick reshapes the
//! remaining release without touching what was already paid. Releasing part
//! of a bucket restarts it at `T` with the remainder, which keeps the
//! schedule linear toward the same `M`. Buckets are keyed by source: the
//! controller-wide schedule or a pool with its own override.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tally_types::math::{self, PERCENTAGE_FACTOR};
use tally_types::{Address, PoolId, Tick, U256};

use crate::{Result, RewardError};

/// Controller-wide freeze settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeSchedule {
    /// Share of newly drained reward that is frozen, in basis points.
    pub freeze_percentage: u32,
    /// Tick at which frozen reward is fully released.
    pub melt_down_at: Tick,
}

impl FreezeSchedule {
    /// Validate the percentage.
    pub fn validate(&self) -> Result<()> {
        if self.freeze_percentage > PERCENTAGE_FACTOR {
            return Err(RewardError::InvalidPercentage(self.freeze_percentage));
        }
        Ok(())
    }
}

/// Which schedule a frozen bucket follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FreezeSource {
    /// The controller-wide schedule.
    Global,
    /// A pool with its own freeze override.
    Pool(PoolId),
}

/// Reward withheld at `frozen_at`, releasing toward the source's melt-down.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenBucket {
    /// Amount still frozen.
    pub amount: U256,
    /// Tick the remaining amount started vesting from.
    pub frozen_at: Tick,
}

impl FrozenBucket {
    /// Amount released by `now` under melt-down tick `melt_down_at`.
    pub fn released_at(&self, melt_down_at: Tick, now: Tick) -> Result<U256> {
        if self.amount.is_zero() || (now <= self.frozen_at && self.frozen_at < melt_down_at) {
            return Ok(U256::zero());
        }
        if now >= melt_down_at || self.frozen_at >= melt_down_at {
            return Ok(self.amount);
        }
        Ok(math::mul_div(
            self.amount,
            U256::from(now - self.frozen_at),
            U256::from(melt_down_at - self.frozen_at),
        )?)
    }

    /// Release what is due at `now` and restart the remainder from `now`.
    pub fn release(&mut self, melt_down_at: Tick, now: Tick) -> Result<U256> {
        let released = self.released_at(melt_down_at, now)?;
        self.amount -= released;
        self.frozen_at = self.frozen_at.max(now);
        Ok(released)
    }
}

/// Split `amount` into `(claimable, frozen)` at `percentage` bps.
pub fn split(amount: U256, percentage: u32) -> Result<(U256, U256)> {
    let frozen = math::percent_mul(amount, percentage)?;
    Ok((amount - frozen, frozen))
}

/// Pending pool reward recorded under a freeze percentage that has since
/// changed. It is split at `percentage` when claimed, vesting from
/// `accrued_at`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tranche {
    /// Reward accrued under `percentage`.
    pub amount: U256,
    /// Freeze percentage in force while it accrued.
    pub percentage: u32,
    /// Tick the tranche was recorded.
    pub accrued_at: Tick,
}

/// One participant's frozen buckets, by source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenBuckets {
    buckets: BTreeMap<FreezeSource, FrozenBucket>,
}

impl FrozenBuckets {
    /// Total still frozen, ignoring anything due.
    pub fn total(&self) -> U256 {
        self.buckets
            .values()
            .fold(U256::zero(), |acc, b| acc.saturating_add(b.amount))
    }

    /// Whether nothing is frozen.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Release everything due at `now`.
    pub fn release(&mut self, melt_down_for: &dyn Fn(FreezeSource) -> Tick, now: Tick) -> Result<U256> {
        let mut released = U256::zero();
        for (source, bucket) in self.buckets.iter_mut() {
            released = math::add(released, bucket.release(melt_down_for(*source), now)?)?;
        }
        self.buckets.retain(|_, b| !b.amount.is_zero());
        Ok(released)
    }

    /// Freeze `amount` accrued at `accrued_at` under `source`. The part that
    /// has already vested by `now` is returned instead of stored; the rest
    /// joins the source's bucket and vests from `now`.
    ///
    /// Due amounts in the existing bucket must have been released first.
    pub fn freeze(
        &mut self,
        source: FreezeSource,
        amount: U256,
        melt_down_at: Tick,
        accrued_at: Tick,
        now: Tick,
    ) -> Result<U256> {
        let vesting = FrozenBucket {
            amount,
            frozen_at: accrued_at,
        };
        let due = vesting.released_at(melt_down_at, now)?;
        let rest = amount - due;
        if rest.is_zero() {
            return Ok(due);
        }
        let bucket = self.buckets.entry(source).or_insert(FrozenBucket {
            amount: U256::zero(),
            frozen_at: now,
        });
        bucket.amount = math::add(bucket.amount, rest)?;
        bucket.frozen_at = bucket.frozen_at.max(now);
        Ok(due)
    }
}

/// Frozen buckets of every participant.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FrozenBalances {
    buckets: BTreeMap<Address, FrozenBuckets>,
}

impl FrozenBalances {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total still frozen for `user`, ignoring anything due.
    pub fn frozen_of(&self, user: &Address) -> U256 {
        self.buckets
            .get(user)
            .map(FrozenBuckets::total)
            .unwrap_or_default()
    }

    /// A copy of `user`'s buckets to stage a claim on.
    pub fn buckets_of(&self, user: &Address) -> FrozenBuckets {
        self.buckets.get(user).cloned().unwrap_or_default()
    }

    /// Replace `user`'s buckets with a staged copy.
    pub fn replace(&mut self, user: &Address, buckets: FrozenBuckets) {
        if buckets.is_empty() {
            self.buckets.remove(user);
        } else {
            self.buckets.insert(*user, buckets);
        }
    }
}
