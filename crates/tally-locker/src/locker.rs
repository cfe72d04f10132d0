//! Lock/redeem state machine and per-owner reward accrual.
//!
//! Each owner has at most one [`LockPosition`]. Locking again merges into it:
//! the amounts add up, the expiry becomes the later of the two, and the weight
//! is recomputed against the period remaining from now.
//!
//! Reward settlement always happens before a position changes, so weight
//! changes never apply retroactively. A position's credit is always computed
//! in total from the accumulator point at which it was opened, and only the
//! increment over what was already credited is paid out; settling more or
//! less often never changes the sum.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tally_types::ledger::TokenLedger;
use tally_types::math::{self, RAY};
use tally_types::{short_hex, Address, Tick, U256};

use crate::accumulator::{AccumulatorPoint, WeightAccumulator};
use crate::decay;
use crate::position::{LockPosition, LockerParams};
use crate::{LockerError, Result};

/// How a lock's reward weight evolves over its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockerMode {
    /// Flat weight until expiry.
    Linear,
    /// Weight falls linearly to zero at expiry.
    Decaying,
}

/// Outcome of a successful lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockReceipt {
    /// Total amount now locked by the owner.
    pub amount: U256,
    /// Reward weight of the merged position.
    pub weight: U256,
    /// Expiry of the merged position.
    pub expiry: Tick,
}

/// Per-owner accrual record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct OwnerAccrual {
    pending: U256,
    since: Tick,
    /// Accumulator when the current position was opened.
    opened: AccumulatorPoint,
    /// Undecayed reward of the current position settled so far.
    earned: U256,
    /// Reward of the current position credited to `pending` so far.
    credited: U256,
}

/// Settlement of a position up to some tick, relative to its accrual record.
struct Settlement {
    credit: U256,
    withheld: U256,
    earned: U256,
    credited: U256,
}

/// A token locker that is also a reward pool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenLocker {
    mode: LockerMode,
    params: LockerParams,
    escrow: Address,
    positions: BTreeMap<Address, LockPosition>,
    accruals: BTreeMap<Address, OwnerAccrual>,
    accumulator: WeightAccumulator,
    total_locked: U256,
    excess: U256,
}

impl TokenLocker {
    /// Create a locker.
    ///
    /// * `escrow` - Ledger account that holds locked tokens
    /// * `rate` - Reward emitted per tick across all locked weight
    ///
    /// # Errors
    ///
    /// - [`LockerError::InvalidParams`] if `params` are inconsistent
    pub fn new(
        mode: LockerMode,
        params: LockerParams,
        escrow: Address,
        rate: U256,
        now: Tick,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            mode,
            params,
            escrow,
            positions: BTreeMap::new(),
            accruals: BTreeMap::new(),
            accumulator: WeightAccumulator::new(rate, now),
            total_locked: U256::zero(),
            excess: U256::zero(),
        })
    }

    /// Lock `amount` tokens owned by `owner` for `period` ticks.
    ///
    /// # Errors
    ///
    /// - [`LockerError::ZeroAmount`] if `amount` is zero
    /// - [`LockerError::LockSlippage`] if expiry rounding exceeds `slippage_bps`
    /// - [`LockerError::Ledger`] if the owner cannot fund the lock
    pub fn lock(
        &mut self,
        ledger: &mut dyn TokenLedger,
        owner: Address,
        amount: U256,
        period: u64,
        slippage_bps: u32,
        now: Tick,
    ) -> Result<LockReceipt> {
        if amount.is_zero() {
            return Err(LockerError::ZeroAmount);
        }
        let planned_expiry = self.params.plan_expiry(now, period, slippage_bps)?;
        let available = ledger.balance_of(&owner);
        if available < amount {
            return Err(LockerError::Ledger(
                tally_types::ledger::LedgerError::InsufficientBalance {
                    available,
                    required: amount,
                },
            ));
        }

        self.settle(&owner, now)?;

        let (total_amount, expiry) = match self.positions.get(&owner) {
            Some(existing) => {
                if !existing.retired {
                    self.accumulator
                        .remove_weight(existing.weight, existing.expiry);
                }
                let expiry = if existing.retired {
                    planned_expiry
                } else {
                    existing.expiry.max(planned_expiry)
                };
                (math::add(existing.amount, amount)?, expiry)
            }
            None => (amount, planned_expiry),
        };
        let weight = self.params.weight_for(total_amount, expiry - now)?;

        ledger.transfer(&owner, &self.escrow, amount)?;
        self.accumulator.add_weight(weight, expiry)?;
        let opened = self.accumulator.point();
        if let Some(accrual) = self.accruals.get_mut(&owner) {
            accrual.opened = opened;
            accrual.earned = U256::zero();
            accrual.credited = U256::zero();
        }
        self.total_locked = math::add(self.total_locked, amount)?;
        self.positions.insert(
            owner,
            LockPosition {
                owner,
                amount: total_amount,
                weight,
                locked_at: now,
                expiry,
                retired: false,
            },
        );

        tracing::info!(
            owner = %short_hex(&owner),
            %amount,
            %total_amount,
            %weight,
            expiry,
            mode = ?self.mode,
            "locker: locked"
        );

        Ok(LockReceipt {
            amount: total_amount,
            weight,
            expiry,
        })
    }

    /// Return the owner's locked tokens to `to` after expiry.
    ///
    /// Accrued reward stays claimable after the position is cleared.
    ///
    /// # Errors
    ///
    /// - [`LockerError::NoActiveLock`] if `owner` has no position
    /// - [`LockerError::NotYetAvailable`] before the expiry tick
    pub fn redeem(
        &mut self,
        ledger: &mut dyn TokenLedger,
        owner: Address,
        to: Address,
        now: Tick,
    ) -> Result<U256> {
        let position = self.positions.get(&owner).ok_or(LockerError::NoActiveLock)?;
        if !position.is_expired(now) {
            return Err(LockerError::NotYetAvailable {
                expiry: position.expiry,
                current: now,
            });
        }
        let amount = position.amount;

        self.settle(&owner, now)?;
        ledger.transfer(&self.escrow, &to, amount)?;
        self.positions.remove(&owner);
        self.total_locked = self.total_locked.saturating_sub(amount);

        tracing::info!(
            owner = %short_hex(&owner),
            to = %short_hex(&to),
            %amount,
            "locker: redeemed"
        );
        Ok(amount)
    }

    /// Accrued but unclaimed reward of `owner` and the tick it has been
    /// accruing since. Never mutates state.
    pub fn calc_reward_for(&self, owner: &Address, now: Tick) -> Result<(U256, Tick)> {
        let accrual = self.accruals.get(owner).cloned().unwrap_or_default();
        let Some(position) = self.positions.get(owner) else {
            return Ok((accrual.pending, accrual.since));
        };
        if position.retired {
            return Ok((accrual.pending, accrual.since));
        }
        let end_point = self.accumulator.point_at(now.min(position.expiry))?;
        let settlement = self.settlement(position, &accrual, &end_point)?;
        Ok((math::add(accrual.pending, settlement.credit)?, accrual.since))
    }

    /// Settle and zero the owner's pending reward.
    pub fn claim_reward_for(&mut self, owner: &Address, now: Tick) -> Result<U256> {
        self.settle(owner, now)?;
        let Some(accrual) = self.accruals.get_mut(owner) else {
            return Ok(U256::zero());
        };
        let amount = std::mem::take(&mut accrual.pending);
        accrual.since = now;
        Ok(amount)
    }

    /// Change the emission rate from `now` on.
    pub fn set_rate(&mut self, rate: U256, now: Tick) -> Result<()> {
        self.accumulator.set_rate(rate, now)
    }

    /// Emission rate per tick.
    pub fn rate(&self) -> U256 {
        self.accumulator.rate()
    }

    /// Every owner with a lock or an accrual record.
    pub fn owners(&self) -> impl Iterator<Item = &Address> {
        self.accruals.keys()
    }

    /// The owner's lock, if any.
    pub fn lock_of(&self, owner: &Address) -> Option<&LockPosition> {
        self.positions.get(owner)
    }

    /// Shrinking voting weight of `owner` at `now`.
    pub fn voting_weight(&self, owner: &Address, now: Tick) -> Result<U256> {
        match self.positions.get(owner) {
            Some(position) => position.voting_weight(&self.params, now),
            None => Ok(U256::zero()),
        }
    }

    /// Sum of all locked underlying amounts.
    pub fn total_locked(&self) -> U256 {
        self.total_locked
    }

    /// Total reward weight currently earning (as of the last settle).
    pub fn total_weight(&self) -> U256 {
        self.accumulator.total_weight()
    }

    /// Reward withheld by decay so far.
    pub fn excess(&self) -> U256 {
        self.excess
    }

    /// Locker mode.
    pub fn mode(&self) -> LockerMode {
        self.mode
    }

    /// Period parameters.
    pub fn params(&self) -> &LockerParams {
        &self.params
    }

    /// Escrow account holding locked tokens.
    pub fn escrow(&self) -> Address {
        self.escrow
    }

    fn settle(&mut self, owner: &Address, now: Tick) -> Result<()> {
        self.accumulator.advance(now)?;
        let current = self.accumulator.point();
        let mut accrual = self.accruals.get(owner).cloned().unwrap_or_else(|| OwnerAccrual {
            since: now,
            opened: current,
            ..OwnerAccrual::default()
        });

        if let Some(position) = self.positions.get(owner).filter(|p| !p.retired).cloned() {
            let expired = position.is_expired(now);
            let end_point = if expired {
                self.accumulator
                    .take_snapshot(position.expiry)
                    .unwrap_or(current)
            } else {
                current
            };
            let settlement = self.settlement(&position, &accrual, &end_point)?;
            accrual.pending = math::add(accrual.pending, settlement.credit)?;
            accrual.earned = settlement.earned;
            accrual.credited = settlement.credited;
            self.excess = math::add(self.excess, settlement.withheld)?;
            if expired {
                if let Some(p) = self.positions.get_mut(owner) {
                    p.retired = true;
                }
            }
            tracing::trace!(
                owner = %short_hex(owner),
                credit = %settlement.credit,
                withheld = %settlement.withheld,
                expired,
                "locker: settled owner"
            );
        }
        self.accruals.insert(*owner, accrual);
        Ok(())
    }

    /// Totals of `position` at `end_point` and the increment over `accrual`.
    fn settlement(
        &self,
        position: &LockPosition,
        accrual: &OwnerAccrual,
        end_point: &AccumulatorPoint,
    ) -> Result<Settlement> {
        let delta = end_point.since(&accrual.opened);
        let earned = math::mul_div(position.weight, delta.reward_per_weight, RAY)?;
        let credited = match self.mode {
            LockerMode::Linear => earned,
            LockerMode::Decaying => {
                decay::calc_decayed_credit(position.weight, position.locked_at, position.expiry, &delta)?
            }
        };
        let withheld_total = earned.saturating_sub(credited);
        let withheld_before = accrual.earned.saturating_sub(accrual.credited);
        Ok(Settlement {
            credit: credited.saturating_sub(accrual.credited),
            withheld: withheld_total.saturating_sub(withheld_before),
            earned,
            credited,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::ledger::InMemoryLedger;

    const ESCROW: Address = [0xEE; 32];
    const ALICE: Address = [0x01; 32];
    const BOB: Address = [0x02; 32];

    fn params() -> LockerParams {
        LockerParams {
            min_period: 10,
            max_period: 100,
            period_granularity: 10,
        }
    }

    fn setup(mode: LockerMode, rate: u64) -> (TokenLocker, InMemoryLedger) {
        let locker =
            TokenLocker::new(mode, params(), ESCROW, U256::from(rate), 0).expect("locker");
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&ALICE, U256::from(10_000)).expect("mint alice");
        ledger.mint(&BOB, U256::from(10_000)).expect("mint bob");
        (locker, ledger)
    }

    #[test]
    fn test_lock_moves_tokens_to_escrow() {
        let (mut locker, mut ledger) = setup(LockerMode::Linear, 0);
        let receipt = locker
            .lock(&mut ledger, ALICE, U256::from(1_000), 100, 0, 0)
            .expect("lock");
        assert_eq!(receipt.weight, U256::from(1_000));
        assert_eq!(receipt.expiry, 100);
        assert_eq!(ledger.balance_of(&ESCROW), U256::from(1_000));
        assert_eq!(ledger.balance_of(&ALICE), U256::from(9_000));
        assert_eq!(locker.total_locked(), U256::from(1_000));
    }

    #[test]
    fn test_lock_zero_rejected() {
        let (mut locker, mut ledger) = setup(LockerMode::Linear, 0);
        let err = locker
            .lock(&mut ledger, ALICE, U256::zero(), 100, 0, 0)
            .expect_err("zero");
        assert_eq!(err, LockerError::ZeroAmount);
    }

    #[test]
    fn test_lock_period_clamped_to_minimum() {
        let (mut locker, mut ledger) = setup(LockerMode::Linear, 0);
        let receipt = locker
            .lock(&mut ledger, ALICE, U256::from(1_000), 1, 0, 0)
            .expect("lock");
        assert_eq!(receipt.expiry, 10);
        assert_eq!(receipt.weight, U256::from(100));
    }

    #[test]
    fn test_redeem_before_expiry_fails() {
        let (mut locker, mut ledger) = setup(LockerMode::Linear, 0);
        locker
            .lock(&mut ledger, ALICE, U256::from(500), 50, 0, 0)
            .expect("lock");
        let err = locker.redeem(&mut ledger, ALICE, ALICE, 49).expect_err("early");
        assert!(matches!(err, LockerError::NotYetAvailable { expiry: 50, .. }));
        let amount = locker.redeem(&mut ledger, ALICE, BOB, 50).expect("redeem");
        assert_eq!(amount, U256::from(500));
        assert_eq!(ledger.balance_of(&BOB), U256::from(10_500));
        assert!(locker.lock_of(&ALICE).is_none());
    }

    #[test]
    fn test_redeem_without_lock() {
        let (mut locker, mut ledger) = setup(LockerMode::Linear, 0);
        assert_eq!(
            locker.redeem(&mut ledger, ALICE, ALICE, 10),
            Err(LockerError::NoActiveLock)
        );
    }

    #[test]
    fn test_relock_merges() {
        let (mut locker, mut ledger) = setup(LockerMode::Linear, 0);
        locker
            .lock(&mut ledger, ALICE, U256::from(100), 50, 0, 0)
            .expect("first");
        let receipt = locker
            .lock(&mut ledger, ALICE, U256::from(100), 20, 0, 10)
            .expect("second");
        // Later expiry wins; weight recomputed on the remaining 40 ticks.
        assert_eq!(receipt.expiry, 50);
        assert_eq!(receipt.amount, U256::from(200));
        assert_eq!(receipt.weight, U256::from(80));
        assert_eq!(locker.total_weight(), U256::from(80));
    }

    #[test]
    fn test_linear_accrual_stops_at_expiry() {
        let (mut locker, mut ledger) = setup(LockerMode::Linear, 10);
        locker
            .lock(&mut ledger, ALICE, U256::from(1_000), 20, 0, 0)
            .expect("lock");
        let (pending, since) = locker.calc_reward_for(&ALICE, 100).expect("calc");
        assert_eq!(pending, U256::from(200));
        assert_eq!(since, 0);
        assert_eq!(locker.claim_reward_for(&ALICE, 100).expect("claim"), U256::from(200));
        assert_eq!(locker.claim_reward_for(&ALICE, 100).expect("again"), U256::zero());
    }

    #[test]
    fn test_linear_split_by_weight() {
        let (mut locker, mut ledger) = setup(LockerMode::Linear, 30);
        locker
            .lock(&mut ledger, ALICE, U256::from(1_000), 100, 0, 0)
            .expect("alice");
        locker
            .lock(&mut ledger, BOB, U256::from(1_000), 50, 0, 0)
            .expect("bob");
        // Weights 1000 vs 500 until tick 50.
        let alice = locker.claim_reward_for(&ALICE, 50).expect("alice");
        let bob = locker.claim_reward_for(&BOB, 50).expect("bob");
        assert_eq!(alice, U256::from(1_000));
        assert_eq!(bob, U256::from(500));
    }

    #[test]
    fn test_calc_matches_claim_after_expiry() {
        let (mut locker, mut ledger) = setup(LockerMode::Linear, 9);
        locker
            .lock(&mut ledger, ALICE, U256::from(300), 30, 0, 0)
            .expect("alice");
        locker
            .lock(&mut ledger, BOB, U256::from(300), 60, 0, 0)
            .expect("bob");
        let (calc, _) = locker.calc_reward_for(&ALICE, 80).expect("calc");
        let claimed = locker.claim_reward_for(&ALICE, 80).expect("claim");
        assert_eq!(calc, claimed);
    }

    #[test]
    fn test_decaying_pays_half_over_full_lock() {
        let (mut locker, mut ledger) = setup(LockerMode::Decaying, 10);
        locker
            .lock(&mut ledger, ALICE, U256::from(1_000), 100, 0, 0)
            .expect("lock");
        let claimed = locker.claim_reward_for(&ALICE, 100).expect("claim");
        assert_eq!(claimed, U256::from(500));
        assert_eq!(locker.excess(), U256::from(500));
    }

    #[test]
    fn test_decaying_early_interval_pays_more() {
        let (mut locker, mut ledger) = setup(LockerMode::Decaying, 10);
        locker
            .lock(&mut ledger, ALICE, U256::from(1_000), 100, 0, 0)
            .expect("lock");
        let first = locker.claim_reward_for(&ALICE, 50).expect("first half");
        let second = locker.claim_reward_for(&ALICE, 100).expect("second half");
        assert_eq!(first, U256::from(375));
        assert_eq!(second, U256::from(125));
    }

    fn decaying_pair(alice_claims_midway: bool) -> (U256, U256) {
        let (mut locker, mut ledger) = setup(LockerMode::Decaying, 1_000);
        locker
            .lock(&mut ledger, ALICE, U256::from(1_000), 100, 0, 0)
            .expect("alice");
        let mut claimed = U256::zero();
        if alice_claims_midway {
            claimed += locker.claim_reward_for(&ALICE, 50).expect("midway");
        }
        locker
            .lock(&mut ledger, BOB, U256::from(1_000), 50, 0, 50)
            .expect("bob");
        claimed += locker.claim_reward_for(&ALICE, 100).expect("end");
        (claimed, locker.excess())
    }

    #[test]
    fn test_decaying_claims_independent_of_timing() {
        let (split, _) = decaying_pair(true);
        let (whole, excess) = decaying_pair(false);
        assert_eq!(split, whole);
        // 50 ticks alone, then a third of 1000/tick for 50 ticks.
        assert_eq!(whole, U256::from(45_833));
        assert_eq!(excess, U256::from(83_333 - 45_833));
    }

    #[test]
    fn test_decaying_calc_matches_claim() {
        let (mut locker, mut ledger) = setup(LockerMode::Decaying, 7);
        locker
            .lock(&mut ledger, ALICE, U256::from(900), 100, 0, 0)
            .expect("alice");
        locker
            .lock(&mut ledger, BOB, U256::from(400), 30, 0, 20)
            .expect("bob");
        for t in [35, 60, 100] {
            let (calc, _) = locker.calc_reward_for(&ALICE, t).expect("calc");
            let claimed = locker.claim_reward_for(&ALICE, t).expect("claim");
            assert_eq!(calc, claimed, "tick {t}");
        }
    }

    #[test]
    fn test_voting_weight() {
        let (mut locker, mut ledger) = setup(LockerMode::Linear, 0);
        locker
            .lock(&mut ledger, ALICE, U256::from(1_000), 100, 0, 0)
            .expect("lock");
        assert_eq!(locker.voting_weight(&ALICE, 25).expect("w"), U256::from(750));
        assert_eq!(locker.voting_weight(&BOB, 25).expect("w"), U256::zero());
    }
}
