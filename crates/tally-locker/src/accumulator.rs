//! Reward-per-weight accumulator with scheduled expiries.
//!
//! Locks stop earning at their expiry tick even if nobody touches the locker
//! then. The accumulator keeps the weight leaving the total at each future
//! expiry and, when it advances past one, integrates up to exactly that tick,
//! removes the weight, and snapshots the accumulator value so that holders of
//! the expired locks can be settled later against the value at their expiry.
//!
//! Next to reward per weight `R` it integrates `S = Σ ΔR × (a + b)` over every
//! settled interval `[a, b]`, twice the time-weighted `∫ t dR`. Decaying locks
//! price their credit from the two deltas, so a holder's reward depends only on
//! the accumulator's history and not on when the holder settles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tally_types::math::{self, RAY};
use tally_types::{Tick, U256};

use crate::Result;

/// Weight scheduled to leave the total at one tick.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryBucket {
    /// Sum of the weights of locks expiring at this tick.
    pub weight: U256,
    /// Number of locks expiring at this tick.
    pub holders: u32,
}

/// Accumulator state at one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorPoint {
    /// Reward per unit of weight, ray-scaled.
    pub reward_per_weight: U256,
    /// `Σ ΔR × (a + b)` over the integrated intervals.
    pub time_weighted: U256,
}

impl AccumulatorPoint {
    /// Componentwise `self - earlier`.
    pub fn since(&self, earlier: &AccumulatorPoint) -> AccumulatorPoint {
        AccumulatorPoint {
            reward_per_weight: self.reward_per_weight.saturating_sub(earlier.reward_per_weight),
            time_weighted: self.time_weighted.saturating_sub(earlier.time_weighted),
        }
    }
}

/// Accumulator value frozen at a past expiry tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirySnapshot {
    /// Accumulator at the expiry tick.
    pub point: AccumulatorPoint,
    /// Expired locks not yet settled against this snapshot.
    pub holders: u32,
}

/// The locker's reward-per-weight accumulator.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WeightAccumulator {
    rate: U256,
    point: AccumulatorPoint,
    total_weight: U256,
    last_update: Tick,
    pending_expiries: BTreeMap<Tick, ExpiryBucket>,
    snapshots: BTreeMap<Tick, ExpirySnapshot>,
}

impl WeightAccumulator {
    /// Create an accumulator emitting `rate` per tick from `now`.
    pub fn new(rate: U256, now: Tick) -> Self {
        Self {
            rate,
            last_update: now,
            ..Self::default()
        }
    }

    /// Emission rate per tick.
    pub fn rate(&self) -> U256 {
        self.rate
    }

    /// Total weight currently earning.
    pub fn total_weight(&self) -> U256 {
        self.total_weight
    }

    /// Reward per weight as of the last update.
    pub fn reward_per_weight(&self) -> U256 {
        self.point.reward_per_weight
    }

    /// Full accumulator state as of the last update.
    pub fn point(&self) -> AccumulatorPoint {
        self.point
    }

    /// Tick of the last update.
    pub fn last_update(&self) -> Tick {
        self.last_update
    }

    /// Change the emission rate after settling up to `now`.
    pub fn set_rate(&mut self, rate: U256, now: Tick) -> Result<()> {
        self.advance(now)?;
        self.rate = rate;
        Ok(())
    }

    /// Settle the accumulator up to `now`, retiring every expiry on the way.
    pub fn advance(&mut self, now: Tick) -> Result<()> {
        while let Some((&expiry, _)) = self.pending_expiries.first_key_value() {
            if expiry > now {
                break;
            }
            self.integrate(expiry)?;
            if let Some(bucket) = self.pending_expiries.remove(&expiry) {
                self.total_weight = self.total_weight.saturating_sub(bucket.weight);
                self.snapshots.insert(
                    expiry,
                    ExpirySnapshot {
                        point: self.point,
                        holders: bucket.holders,
                    },
                );
                tracing::trace!(
                    expiry,
                    retired = %bucket.weight,
                    total = %self.total_weight,
                    "locker: retired expiring weight"
                );
            }
        }
        self.integrate(now)
    }

    /// Accumulator state at `tick` without mutating state.
    ///
    /// Ticks before the last update resolve only at recorded expiry
    /// snapshots; any other past tick yields the state at the last update.
    pub fn point_at(&self, tick: Tick) -> Result<AccumulatorPoint> {
        if tick < self.last_update {
            return Ok(self
                .snapshots
                .get(&tick)
                .map(|s| s.point)
                .unwrap_or(self.point));
        }
        let mut point = self.point;
        let mut total = self.total_weight;
        let mut last = self.last_update;
        for (&expiry, bucket) in self.pending_expiries.range(..=tick) {
            point = step(point, self.rate, total, last, expiry)?;
            total = total.saturating_sub(bucket.weight);
            last = expiry;
        }
        step(point, self.rate, total, last, tick)
    }

    /// Add `weight` to the total until `expiry`.
    pub fn add_weight(&mut self, weight: U256, expiry: Tick) -> Result<()> {
        self.total_weight = math::add(self.total_weight, weight)?;
        let bucket = self.pending_expiries.entry(expiry).or_default();
        bucket.weight = math::add(bucket.weight, weight)?;
        bucket.holders += 1;
        Ok(())
    }

    /// Remove a still-pending `weight` scheduled for `expiry`.
    pub fn remove_weight(&mut self, weight: U256, expiry: Tick) {
        self.total_weight = self.total_weight.saturating_sub(weight);
        if let Some(bucket) = self.pending_expiries.get_mut(&expiry) {
            bucket.weight = bucket.weight.saturating_sub(weight);
            bucket.holders = bucket.holders.saturating_sub(1);
            if bucket.holders == 0 {
                self.pending_expiries.remove(&expiry);
            }
        }
    }

    /// Consume one holder's claim on the snapshot at `expiry`, returning the
    /// accumulator value there. Snapshots are dropped once every holder has
    /// been settled.
    pub fn take_snapshot(&mut self, expiry: Tick) -> Option<AccumulatorPoint> {
        let snapshot = self.snapshots.get_mut(&expiry)?;
        let value = snapshot.point;
        snapshot.holders = snapshot.holders.saturating_sub(1);
        if snapshot.holders == 0 {
            self.snapshots.remove(&expiry);
        }
        Some(value)
    }

    fn integrate(&mut self, to: Tick) -> Result<()> {
        self.point = step(self.point, self.rate, self.total_weight, self.last_update, to)?;
        self.last_update = self.last_update.max(to);
        Ok(())
    }
}

/// Advance `point` over `[from, to]` at `rate * RAY / total` per tick.
/// Unchanged while nothing is locked.
fn step(point: AccumulatorPoint, rate: U256, total: U256, from: Tick, to: Tick) -> Result<AccumulatorPoint> {
    if to <= from || total.is_zero() || rate.is_zero() {
        return Ok(point);
    }
    let emitted = math::mul(rate, U256::from(to - from))?;
    let delta = math::mul_div(emitted, RAY, total)?;
    let span = U256::from(from) + U256::from(to);
    Ok(AccumulatorPoint {
        reward_per_weight: math::add(point.reward_per_weight, delta)?,
        time_weighted: math::add(point.time_weighted, math::mul(delta, span)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_single_weight() {
        let mut acc = WeightAccumulator::new(U256::from(100), 0);
        acc.add_weight(U256::from(10), 1_000).expect("add");
        acc.advance(20).expect("advance");
        // 100 * 20 / 10 per unit of weight
        assert_eq!(acc.reward_per_weight(), RAY * 200);
    }

    #[test]
    fn test_expiry_retires_weight() {
        let mut acc = WeightAccumulator::new(U256::from(100), 0);
        acc.add_weight(U256::from(10), 5).expect("add");
        acc.advance(50).expect("advance");
        // Only 5 ticks were earned before the lock expired.
        assert_eq!(acc.reward_per_weight(), RAY * 50);
        assert_eq!(acc.total_weight(), U256::zero());
        let snapshot = acc.take_snapshot(5).expect("snapshot");
        assert_eq!(snapshot.reward_per_weight, RAY * 50);
        assert_eq!(snapshot.time_weighted, RAY * 50 * 5);
        assert_eq!(acc.take_snapshot(5), None);
    }

    #[test]
    fn test_projection_matches_advance() {
        let mut acc = WeightAccumulator::new(U256::from(7), 0);
        acc.add_weight(U256::from(3), 10).expect("add a");
        acc.add_weight(U256::from(4), 30).expect("add b");
        let projected = acc.point_at(40).expect("project");
        acc.advance(40).expect("advance");
        assert_eq!(projected, acc.point());
    }

    #[test]
    fn test_remove_pending_weight() {
        let mut acc = WeightAccumulator::new(U256::from(1), 0);
        acc.add_weight(U256::from(3), 10).expect("add");
        acc.remove_weight(U256::from(3), 10);
        assert_eq!(acc.total_weight(), U256::zero());
        acc.advance(20).expect("advance");
        assert_eq!(acc.reward_per_weight(), U256::zero());
    }

    #[test]
    fn test_set_rate_settles_first() {
        let mut acc = WeightAccumulator::new(U256::from(10), 0);
        acc.add_weight(U256::from(1), 1_000).expect("add");
        acc.set_rate(U256::from(20), 10).expect("rate");
        acc.advance(20).expect("advance");
        assert_eq!(acc.reward_per_weight(), RAY * 300);
    }

    #[test]
    fn test_time_weighted_independent_of_split() {
        let mut whole = WeightAccumulator::new(U256::from(10), 0);
        whole.add_weight(U256::from(5), 1_000).expect("add");
        whole.advance(40).expect("advance");

        let mut split = whole.clone();
        split.point = AccumulatorPoint::default();
        split.last_update = 0;
        for t in [7, 19, 33, 40] {
            split.advance(t).expect("advance");
        }
        assert_eq!(split.point(), whole.point());
        // 2 RAY per tick: ΔR = 80 RAY, S = 80 RAY × (0 + 40).
        assert_eq!(whole.point().time_weighted, RAY * 80 * 40);
    }
}
