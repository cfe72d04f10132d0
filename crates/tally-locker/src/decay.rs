//! Decay curve for the decaying locker.
//!
//! The instantaneous weight of a lock over `[start, end]` falls linearly:
//!
//! ```text
//! w(t) = (end - t) / (end - start)
//! ```
//!
//! so it is 1 at `start`, 1/2 at the midpoint and 0 at `end`. Two closed forms
//! are derived from it:
//!
//! - [`calc_decay_for_reward`] — the mean of `w` over `[from, to]`; the reward
//!   factor applied to an interval's undecayed credit. Over the whole lock it
//!   is exactly `HALF_RAY`.
//! - [`calc_decay_integral`] — the share of the total area under `w`
//!   attributable to `[from, to]`, computed as `F(from) - F(to)` with
//!   `F(t) = (end - t)^2 / (end - start)^2`. Because every interval is a
//!   difference of the same floored `F`, adjacent intervals sum exactly and
//!   the whole lock is exactly `RAY`.
//!
//! [`calc_decayed_credit`] applies the curve to reward actually emitted while
//! the pool total changes: with `ΔR` and `ΔS` the accumulator deltas since the
//! lock started,
//!
//! ```text
//! credit = weight × ∫ w(t) dR = weight × (2 × end × ΔR − ΔS) / (2 × (end − start) × RAY)
//! ```

use tally_types::math::{self, RAY};
use tally_types::{Tick, U256};

use crate::accumulator::AccumulatorPoint;
use crate::{LockerError, Result};

fn check_interval(start: Tick, end: Tick, from: Tick, to: Tick) -> Result<()> {
    if start >= end || from < start || to > end || from > to {
        return Err(LockerError::InvalidInterval {
            start,
            end,
            from,
            to,
        });
    }
    Ok(())
}

/// Instantaneous ray-scaled weight at tick `t`.
///
/// # Errors
///
/// - [`LockerError::InvalidInterval`] if `t` lies outside `[start, end]`
pub fn decay_weight_at(start: Tick, end: Tick, t: Tick) -> Result<U256> {
    check_interval(start, end, t, t)?;
    Ok(math::mul_div(
        U256::from(end - t),
        RAY,
        U256::from(end - start),
    )?)
}

/// Mean ray-scaled weight over `[from, to]` within the lock `[start, end]`.
///
/// `(2 * end - from - to) / (2 * (end - start))`. An empty interval yields the
/// instantaneous weight at that tick.
///
/// # Errors
///
/// - [`LockerError::InvalidInterval`] if the interval is not inside the lock
pub fn calc_decay_for_reward(start: Tick, end: Tick, from: Tick, to: Tick) -> Result<U256> {
    check_interval(start, end, from, to)?;
    let numerator = U256::from(end - from) + U256::from(end - to);
    let denominator = U256::from(end - start) * 2;
    Ok(math::mul_div(numerator, RAY, denominator)?)
}

/// Ray-scaled share of the lock's total decay-weighted area in `[from, to]`.
///
/// # Errors
///
/// - [`LockerError::InvalidInterval`] if the interval is not inside the lock
pub fn calc_decay_integral(start: Tick, end: Tick, from: Tick, to: Tick) -> Result<U256> {
    check_interval(start, end, from, to)?;
    let upper = remaining_area(start, end, from)?;
    let lower = remaining_area(start, end, to)?;
    Ok(math::sub(upper, lower)?)
}

/// Decay-weighted credit of `weight` locked over `[start, end]`, given the
/// accumulator movement `delta` since `start`. `delta` must not extend past
/// `end`.
///
/// # Errors
///
/// - [`LockerError::InvalidInterval`] if `start >= end`
pub fn calc_decayed_credit(
    weight: U256,
    start: Tick,
    end: Tick,
    delta: &AccumulatorPoint,
) -> Result<U256> {
    check_interval(start, end, start, end)?;
    let full = math::mul(delta.reward_per_weight, U256::from(end) * 2)?;
    let numerator = math::sub(full, delta.time_weighted)?;
    let denominator = math::mul(U256::from(end - start) * 2, RAY)?;
    Ok(math::mul_div(weight, numerator, denominator)?)
}

/// `F(t) = (end - t)^2 * RAY / (end - start)^2`, floored.
fn remaining_area(start: Tick, end: Tick, t: Tick) -> Result<U256> {
    let left = u128::from(end - t);
    let width = u128::from(end - start);
    Ok(math::mul_div(
        U256::from(left * left),
        RAY,
        U256::from(width * width),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::math::HALF_RAY;

    #[test]
    fn test_full_interval_mean_is_half() {
        for (s, w) in [(0u64, 10u64), (100, 7), (1_000_000, 3_600 * 24 * 365)] {
            assert_eq!(
                calc_decay_for_reward(s, s + w, s, s + w).expect("decay"),
                HALF_RAY,
                "start {s} width {w}"
            );
        }
    }

    #[test]
    fn test_midpoint_weight_is_half() {
        assert_eq!(decay_weight_at(100, 300, 200).expect("weight"), HALF_RAY);
        assert_eq!(decay_weight_at(100, 300, 100).expect("weight"), RAY);
        assert_eq!(decay_weight_at(100, 300, 300).expect("weight"), U256::zero());
    }

    #[test]
    fn test_integral_whole_lock_is_ray() {
        assert_eq!(calc_decay_integral(5, 17, 5, 17).expect("integral"), RAY);
    }

    #[test]
    fn test_integral_first_half_is_three_quarters() {
        let first = calc_decay_integral(0, 100, 0, 50).expect("first half");
        assert_eq!(first, RAY / 4 * 3);
    }

    #[test]
    fn test_integral_additivity() {
        let (s, e) = (10u64, 1_013u64);
        for (a, b, c) in [(10, 11, 1_013), (17, 500, 900), (400, 401, 402), (10, 10, 10)] {
            let ab = calc_decay_integral(s, e, a, b).expect("ab");
            let bc = calc_decay_integral(s, e, b, c).expect("bc");
            let ac = calc_decay_integral(s, e, a, c).expect("ac");
            assert_eq!(ab + bc, ac, "a={a} b={b} c={c}");
        }
    }

    #[test]
    fn test_mean_decreases_over_time() {
        let early = calc_decay_for_reward(0, 100, 0, 10).expect("early");
        let late = calc_decay_for_reward(0, 100, 90, 100).expect("late");
        assert!(early > late);
        assert_eq!(late, RAY / 20);
    }

    #[test]
    fn test_decayed_credit_matches_mean_at_constant_rate() {
        // 1 RAY per tick from 0 to 50 within a 100-tick lock.
        let delta = AccumulatorPoint {
            reward_per_weight: RAY * 50,
            time_weighted: RAY * 50 * 50,
        };
        let credit = calc_decayed_credit(U256::from(1_000), 0, 100, &delta).expect("credit");
        let mean = calc_decay_for_reward(0, 100, 0, 50).expect("mean");
        assert_eq!(credit, math::mul_div(U256::from(50_000), mean, RAY).expect("scaled"));
        assert_eq!(credit, U256::from(37_500));
    }

    #[test]
    fn test_invalid_intervals() {
        assert!(calc_decay_for_reward(10, 10, 10, 10).is_err());
        assert!(calc_decay_for_reward(10, 20, 5, 15).is_err());
        assert!(calc_decay_for_reward(10, 20, 15, 25).is_err());
        assert!(calc_decay_integral(10, 20, 16, 15).is_err());
        assert!(decay_weight_at(10, 20, 21).is_err());
        assert!(calc_decayed_credit(U256::one(), 5, 5, &AccumulatorPoint::default()).is_err());
    }
}
