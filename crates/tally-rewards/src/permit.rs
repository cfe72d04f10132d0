//! Signed permit claims.
//!
//! A provider authorizes `value` of reward for `spender` by signing the
//! typed-data digest of `(provider, spender, value, nonce, deadline)` bound
//! to the pool's signing domain. The nonce is the spender's current permit
//! nonce, so each permit redeems at most once.
//!
//! ```text
//! struct_hash = derive_key("Tally v1 permit-claim",
//!     provider || spender || BE256(value) || BE256(nonce) || BE256(deadline))
//! digest      = H(0x19 || 0x01 || domain_separator || struct_hash)
//! ```

use serde::{Deserialize, Serialize};
use tally_crypto::blake3::contexts;
use tally_crypto::ed25519::{self, Signature, SigningKey};
use tally_crypto::typed_data::{self, SigningDomain, Word};
use tally_types::{Address, Tick, U256};

use crate::{Result, RewardError};

/// The signed fields of a permit, minus the nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitClaim {
    /// Signer; its address is its Ed25519 public key.
    pub provider: Address,
    /// Participant credited.
    pub spender: Address,
    /// Reward amount.
    pub value: U256,
    /// Last tick at which the permit is accepted.
    pub deadline: Tick,
}

impl PermitClaim {
    /// Struct hash under `nonce`.
    pub fn struct_hash(&self, nonce: U256) -> Word {
        typed_data::struct_hash(
            contexts::PERMIT_CLAIM,
            &[
                self.provider,
                self.spender,
                u256_word(self.value),
                u256_word(nonce),
                typed_data::u64_word(self.deadline),
            ],
        )
    }

    /// Digest signed by the provider.
    pub fn digest(&self, domain: &SigningDomain, nonce: U256) -> Word {
        typed_data::digest(&domain.separator(), &self.struct_hash(nonce))
    }

    /// Sign the permit.
    pub fn sign(&self, key: &SigningKey, domain: &SigningDomain, nonce: U256) -> Signature {
        key.sign(&self.digest(domain, nonce))
    }

    /// Check `signature` against the provider key.
    ///
    /// # Errors
    ///
    /// - [`RewardError::InvalidSignature`] on any mismatch
    pub fn verify(&self, domain: &SigningDomain, nonce: U256, signature: &Signature) -> Result<()> {
        ed25519::verify(&self.provider, &self.digest(domain, nonce), signature)
            .map_err(|_| RewardError::InvalidSignature)
    }
}

/// Big-endian 32-byte encoding of a `U256`.
pub fn u256_word(value: U256) -> Word {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}
