//! Permit-credited pool.
//!
//! Rewards are not emitted over time; a registered signer grants them one
//! permit at a time. Each redeemed permit bumps the spender's nonce.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tally_crypto::ed25519::Signature;
use tally_crypto::typed_data::SigningDomain;
use tally_types::math;
use tally_types::{short_hex, Address, Tick, U256};

use super::RewardSource;
use crate::permit::PermitClaim;
use crate::{Result, RewardError};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Credit {
    pending: U256,
    since: Tick,
}

/// Pool credited by signed permits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PermitFreezerPool {
    domain: SigningDomain,
    signers: BTreeSet<Address>,
    nonces: BTreeMap<Address, U256>,
    reward_limit: U256,
    total_credited: U256,
    credits: BTreeMap<Address, Credit>,
}

impl PermitFreezerPool {
    /// Create a pool verifying permits under `domain`, granting at most
    /// `reward_limit` in total.
    pub fn new(domain: SigningDomain, reward_limit: U256) -> Self {
        Self {
            domain,
            signers: BTreeSet::new(),
            nonces: BTreeMap::new(),
            reward_limit,
            total_credited: U256::zero(),
            credits: BTreeMap::new(),
        }
    }

    /// Signing domain permits must be bound to.
    pub fn domain(&self) -> &SigningDomain {
        &self.domain
    }

    /// Authorize `signer` to issue permits.
    pub fn add_signer(&mut self, signer: Address) {
        self.signers.insert(signer);
        tracing::info!(signer = %short_hex(&signer), "permit: signer added");
    }

    /// Revoke a signer.
    pub fn remove_signer(&mut self, signer: &Address) -> bool {
        self.signers.remove(signer)
    }

    /// Current permit nonce of `spender`.
    pub fn nonce_of(&self, spender: &Address) -> U256 {
        self.nonces.get(spender).copied().unwrap_or_default()
    }

    /// Credit still available under the limit.
    pub fn remaining(&self) -> U256 {
        self.reward_limit.saturating_sub(self.total_credited)
    }

    /// Verify and apply a permit.
    ///
    /// # Errors
    ///
    /// - [`RewardError::InvalidTime`] if `now` is past the deadline
    /// - [`RewardError::UnauthorizedProvider`] if the provider is not a signer
    /// - [`RewardError::InvalidSignature`] on any signature mismatch
    /// - [`RewardError::InsufficientPoolBalance`] if the limit would be exceeded
    pub fn redeem_permit(
        &mut self,
        claim: &PermitClaim,
        signature: &Signature,
        now: Tick,
    ) -> Result<U256> {
        if now > claim.deadline {
            return Err(RewardError::InvalidTime {
                deadline: claim.deadline,
                current: now,
            });
        }
        if !self.signers.contains(&claim.provider) {
            return Err(RewardError::UnauthorizedProvider);
        }
        let nonce = self.nonce_of(&claim.spender);
        claim.verify(&self.domain, nonce, signature)?;
        let available = self.remaining();
        if claim.value > available {
            return Err(RewardError::InsufficientPoolBalance {
                available,
                required: claim.value,
            });
        }
        let next_nonce = math::add(nonce, U256::one())?;
        let credit = self.credits.entry(claim.spender).or_insert_with(|| Credit {
            pending: U256::zero(),
            since: now,
        });
        credit.pending = math::add(credit.pending, claim.value)?;
        self.total_credited = math::add(self.total_credited, claim.value)?;
        self.nonces.insert(claim.spender, next_nonce);

        tracing::info!(
            provider = %short_hex(&claim.provider),
            spender = %short_hex(&claim.spender),
            value = %claim.value,
            %nonce,
            "permit: redeemed"
        );
        Ok(claim.value)
    }
}

impl RewardSource for PermitFreezerPool {
    fn kind(&self) -> &'static str {
        "permit-freezer"
    }

    fn rate(&self) -> U256 {
        U256::zero()
    }

    fn participants(&self) -> Vec<Address> {
        self.credits.keys().copied().collect()
    }

    fn set_rate(&mut self, _rate: U256, _now: Tick) -> Result<()> {
        Err(RewardError::UnsupportedOperation { kind: self.kind() })
    }

    fn calc_reward_for(&self, user: &Address, now: Tick) -> Result<(U256, Tick)> {
        Ok(self
            .credits
            .get(user)
            .map(|c| (c.pending, c.since))
            .unwrap_or((U256::zero(), now)))
    }

    fn claim_reward_for(&mut self, user: &Address, now: Tick) -> Result<U256> {
        let Some(credit) = self.credits.get_mut(user) else {
            return Ok(U256::zero());
        };
        credit.since = now;
        Ok(std::mem::take(&mut credit.pending))
    }
}
