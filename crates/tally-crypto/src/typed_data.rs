//! Domain-separated typed-data digests.
//!
//! A signed message is bound to a signing domain so a signature produced for
//! one deployment can never be replayed against another.
//!
//! ```text
//! domain_separator = derive_key("Tally v1 permit-domain",
//!                               H(name) || H(version) || BE256(chain_id) || verifying_contract)
//! struct_hash      = derive_key(type_context, word_0 || word_1 || ... )
//! digest           = H(0x19 || 0x01 || domain_separator || struct_hash)
//! ```
//!
//! `H` is plain BLAKE3 and every word is exactly 32 bytes, big-endian for
//! integers.

use serde::{Deserialize, Serialize};

use crate::blake3;

/// A 32-byte encoded field.
pub type Word = [u8; 32];

/// The signing domain a typed message is bound to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningDomain {
    /// Human-readable name of the signing component.
    pub name: String,
    /// Version string of the message format.
    pub version: String,
    /// Chain (or deployment) identifier.
    pub chain_id: u64,
    /// Address of the component that verifies the signature.
    pub verifying_contract: [u8; 32],
}

impl SigningDomain {
    /// Compute the domain separator.
    pub fn separator(&self) -> Word {
        let mut input = Vec::with_capacity(128);
        input.extend_from_slice(&blake3::hash(self.name.as_bytes()));
        input.extend_from_slice(&blake3::hash(self.version.as_bytes()));
        input.extend_from_slice(&u64_word(self.chain_id));
        input.extend_from_slice(&self.verifying_contract);
        blake3::derive_key(blake3::contexts::PERMIT_DOMAIN, &input)
    }
}

/// Hash an ordered list of 32-byte words under a type context.
pub fn struct_hash(type_context: &str, words: &[Word]) -> Word {
    let mut input = Vec::with_capacity(words.len() * 32);
    for word in words {
        input.extend_from_slice(word);
    }
    blake3::derive_key(type_context, &input)
}

/// Final digest that is signed: `H(0x19 || 0x01 || separator || struct_hash)`.
pub fn digest(domain_separator: &Word, struct_hash: &Word) -> Word {
    let mut input = [0u8; 66];
    input[0] = 0x19;
    input[1] = 0x01;
    input[2..34].copy_from_slice(domain_separator);
    input[34..].copy_from_slice(struct_hash);
    blake3::hash(&input)
}

/// Big-endian 32-byte encoding of a `u64`.
pub fn u64_word(value: u64) -> Word {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}
