//! Team pool.
//!
//! A fixed roster of members, each holding a share in basis points. Members
//! earn `rate × ticks × share / 10000` for ticks after `unlocked_at`. The
//! roster may only change before the unlock tick; removing a member drops
//! whatever it had pending.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tally_types::math::{self, PERCENTAGE_FACTOR};
use tally_types::{short_hex, Address, Tick, U256};

use super::RewardSource;
use crate::{Result, RewardError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Member {
    share_bps: u32,
    pending: U256,
    last_update: Tick,
    since: Tick,
}

/// Roster-based pool with a lockup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TeamPool {
    rate: U256,
    unlocked_at: Tick,
    members: BTreeMap<Address, Member>,
    total_share: u32,
}

impl TeamPool {
    /// Create a pool emitting `rate` per tick from `unlocked_at`.
    pub fn new(rate: U256, unlocked_at: Tick) -> Self {
        Self {
            rate,
            unlocked_at,
            members: BTreeMap::new(),
            total_share: 0,
        }
    }

    /// Tick from which members earn.
    pub fn unlocked_at(&self) -> Tick {
        self.unlocked_at
    }

    /// Share of `member` in basis points (0 if not on the roster).
    pub fn share_of(&self, member: &Address) -> u32 {
        self.members.get(member).map(|m| m.share_bps).unwrap_or(0)
    }

    /// Sum of all shares.
    pub fn total_share(&self) -> u32 {
        self.total_share
    }

    /// Add `member` or change its share.
    ///
    /// # Errors
    ///
    /// - [`RewardError::LockupActive`] at or after the unlock tick
    /// - [`RewardError::InvalidShare`] if the roster total would exceed 100%
    pub fn set_member(&mut self, member: Address, share_bps: u32, now: Tick) -> Result<()> {
        self.ensure_roster_open(now)?;
        let current = self.share_of(&member);
        let total = (self.total_share - current).saturating_add(share_bps);
        if total > PERCENTAGE_FACTOR {
            return Err(RewardError::InvalidShare { total });
        }
        self.members
            .entry(member)
            .and_modify(|m| m.share_bps = share_bps)
            .or_insert(Member {
                share_bps,
                pending: U256::zero(),
                last_update: now,
                since: now,
            });
        self.total_share = total;
        tracing::info!(member = %short_hex(&member), share_bps, total, "team: member set");
        Ok(())
    }

    /// Remove `member`, forfeiting any pending reward.
    pub fn remove_member(&mut self, member: &Address, now: Tick) -> Result<()> {
        self.ensure_roster_open(now)?;
        if let Some(removed) = self.members.remove(member) {
            self.total_share -= removed.share_bps;
            tracing::warn!(
                member = %short_hex(member),
                forfeited = %removed.pending,
                "team: member removed"
            );
        }
        Ok(())
    }

    fn ensure_roster_open(&self, now: Tick) -> Result<()> {
        if now >= self.unlocked_at {
            return Err(RewardError::LockupActive {
                unlocked_at: self.unlocked_at,
            });
        }
        Ok(())
    }

    fn earned(&self, member: &Member, now: Tick) -> Result<U256> {
        let from = member.last_update.max(self.unlocked_at);
        if now <= from || member.share_bps == 0 {
            return Ok(member.pending);
        }
        let emitted = math::mul(self.rate, U256::from(now - from))?;
        let credit = math::percent_mul(emitted, member.share_bps)?;
        Ok(math::add(member.pending, credit)?)
    }

    fn settle_all(&mut self, now: Tick) -> Result<()> {
        let settled = self
            .members
            .iter()
            .map(|(addr, m)| Ok((*addr, self.earned(m, now)?)))
            .collect::<Result<Vec<_>>>()?;
        for (addr, pending) in settled {
            if let Some(member) = self.members.get_mut(&addr) {
                member.pending = pending;
                member.last_update = member.last_update.max(now);
            }
        }
        Ok(())
    }
}

impl RewardSource for TeamPool {
    fn kind(&self) -> &'static str {
        "team"
    }

    fn rate(&self) -> U256 {
        self.rate
    }

    fn participants(&self) -> Vec<Address> {
        self.members.keys().copied().collect()
    }

    fn set_rate(&mut self, rate: U256, now: Tick) -> Result<()> {
        self.settle_all(now)?;
        self.rate = rate;
        Ok(())
    }

    fn calc_reward_for(&self, user: &Address, now: Tick) -> Result<(U256, Tick)> {
        match self.members.get(user) {
            Some(member) => Ok((self.earned(member, now)?, member.since)),
            None => Ok((U256::zero(), now)),
        }
    }

    fn claim_reward_for(&mut self, user: &Address, now: Tick) -> Result<U256> {
        let Some(member) = self.members.get(user) else {
            return Ok(U256::zero());
        };
        let amount = self.earned(member, now)?;
        if let Some(member) = self.members.get_mut(user) {
            member.pending = U256::zero();
            member.last_update = member.last_update.max(now);
            member.since = now;
        }
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = [0x01; 32];
    const BOB: Address = [0x02; 32];

    #[test]
    fn test_full_share_after_unlock() {
        let mut pool = TeamPool::new(U256::from(100), 10);
        pool.set_member(ALICE, 10_000, 0).expect("member");
        assert!(pool.calc_reward_for(&ALICE, 10).expect("calc").0.is_zero());
        let claimed = pool.claim_reward_for(&ALICE, 25).expect("claim");
        // 15 ticks after unlock at full share.
        assert_eq!(claimed, U256::from(1_500));
    }

    #[test]
    fn test_partial_share() {
        let mut pool = TeamPool::new(U256::from(100), 0);
        assert!(matches!(
            pool.set_member(ALICE, 2_500, 0),
            Err(RewardError::LockupActive { unlocked_at: 0 })
        ));

        let mut pool = TeamPool::new(U256::from(100), 5);
        pool.set_member(ALICE, 2_500, 1).expect("alice");
        pool.set_member(BOB, 7_500, 1).expect("bob");
        assert_eq!(pool.claim_reward_for(&ALICE, 9).expect("alice"), U256::from(100));
        assert_eq!(pool.claim_reward_for(&BOB, 9).expect("bob"), U256::from(300));
    }

    #[test]
    fn test_roster_cannot_exceed_full_share() {
        let mut pool = TeamPool::new(U256::from(1), 10);
        pool.set_member(ALICE, 6_000, 0).expect("alice");
        let err = pool.set_member(BOB, 5_000, 0).expect_err("over");
        assert_eq!(err, RewardError::InvalidShare { total: 11_000 });
        // Lowering an existing share is fine.
        pool.set_member(ALICE, 5_000, 0).expect("lower");
        pool.set_member(BOB, 5_000, 0).expect("bob");
        assert_eq!(pool.total_share(), 10_000);
    }

    #[test]
    fn test_roster_fixed_after_unlock() {
        let mut pool = TeamPool::new(U256::from(1), 10);
        pool.set_member(ALICE, 5_000, 0).expect("alice");
        assert!(matches!(
            pool.set_member(BOB, 1_000, 10),
            Err(RewardError::LockupActive { .. })
        ));
        assert!(matches!(
            pool.remove_member(&ALICE, 11),
            Err(RewardError::LockupActive { .. })
        ));
    }

    #[test]
    fn test_removed_member_earns_nothing() {
        let mut pool = TeamPool::new(U256::from(100), 10);
        pool.set_member(ALICE, 10_000, 0).expect("alice");
        pool.remove_member(&ALICE, 5).expect("remove");
        assert!(pool.claim_reward_for(&ALICE, 50).expect("claim").is_zero());
        assert_eq!(pool.total_share(), 0);
    }

    #[test]
    fn test_rate_change_settles_members() {
        let mut pool = TeamPool::new(U256::from(10), 5);
        pool.set_member(ALICE, 10_000, 0).expect("alice");
        pool.set_rate(U256::from(20), 10).expect("rate");
        assert_eq!(
            pool.calc_reward_for(&ALICE, 20).expect("calc").0,
            U256::from(50 + 200)
        );
    }
}
