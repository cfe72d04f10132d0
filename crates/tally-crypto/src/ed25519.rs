//! Ed25519 permit signatures.
//!
//! A permit signer's engine address is its 32-byte verifying key, so a
//! signature is checked against the address carried in the permit itself and
//! no key registry is needed beyond the pool's list of allowed signers.
//! Signers only ever sign 32-byte typed-data digests.

use ed25519_dalek::Signer;
use zeroize::Zeroize;

use crate::typed_data::Word;
use crate::{CryptoError, Result};

/// A permit signer's private key.
#[derive(Clone)]
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl SigningKey {
    /// Random key from the OS RNG.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Key from a 32-byte seed. The caller's copy is left untouched; the
    /// local copy is wiped.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let mut local = *seed;
        let inner = ed25519_dalek::SigningKey::from_bytes(&local);
        local.zeroize();
        Self { inner }
    }

    /// Engine address of this key.
    pub fn address(&self) -> [u8; 32] {
        self.inner.verifying_key().to_bytes()
    }

    /// Sign a typed-data digest.
    pub fn sign(&self, digest: &Word) -> Signature {
        Signature {
            inner: self.inner.sign(digest),
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("address", &hex_prefix(&self.address()))
            .finish()
    }
}

/// A signature over a permit digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    inner: ed25519_dalek::Signature,
}

impl Signature {
    /// Signature from its 64-byte encoding.
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self {
            inner: ed25519_dalek::Signature::from_bytes(bytes),
        }
    }

    /// The 64-byte encoding.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }
}

/// A signer: its key and the address it signs as.
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub signing_key: SigningKey,
}

impl KeyPair {
    /// Random signer.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(),
        }
    }

    /// Signer derived from a 32-byte seed.
    pub fn from_bytes(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_seed(seed),
        }
    }

    /// Engine address of this signer.
    pub fn address(&self) -> [u8; 32] {
        self.signing_key.address()
    }
}

/// Check `signature` over `digest` against the signer `address`.
///
/// Uses strict verification, so malleated or small-order signatures are
/// rejected.
///
/// # Errors
///
/// - [`CryptoError::InvalidInput`] if `address` is not a valid public key
/// - [`CryptoError::SignatureVerification`] if the signature does not match
pub fn verify(address: &[u8; 32], digest: &Word, signature: &Signature) -> Result<()> {
    let key = ed25519_dalek::VerifyingKey::from_bytes(address)
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
    key.verify_strict(digest, &signature.inner)
        .map_err(|_| CryptoError::SignatureVerification)
}

fn hex_prefix(address: &[u8; 32]) -> String {
    address[..4].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: Word = [0xD1; 32];

    #[test]
    fn test_sign_verify_digest() {
        let kp = KeyPair::generate();
        let sig = kp.signing_key.sign(&DIGEST);
        verify(&kp.address(), &DIGEST, &sig).expect("valid signature");
    }

    #[test]
    fn test_other_digest_rejected() {
        let kp = KeyPair::from_bytes(&[7u8; 32]);
        let sig = kp.signing_key.sign(&DIGEST);
        assert!(matches!(
            verify(&kp.address(), &[0xD2; 32], &sig),
            Err(CryptoError::SignatureVerification)
        ));
    }

    #[test]
    fn test_other_signer_rejected() {
        let alice = KeyPair::from_bytes(&[1u8; 32]);
        let bob = KeyPair::from_bytes(&[2u8; 32]);
        let sig = alice.signing_key.sign(&DIGEST);
        assert!(verify(&bob.address(), &DIGEST, &sig).is_err());
    }

    #[test]
    fn test_signature_bytes_roundtrip() {
        let kp = KeyPair::from_bytes(&[3u8; 32]);
        let sig = kp.signing_key.sign(&DIGEST);
        let restored = Signature::from_bytes(&sig.to_bytes());
        assert_eq!(sig, restored);
        verify(&kp.address(), &DIGEST, &restored).expect("restored signature");
    }

    #[test]
    fn test_seed_determines_address() {
        let seed = [42u8; 32];
        assert_eq!(KeyPair::from_bytes(&seed).address(), KeyPair::from_bytes(&seed).address());
        assert_ne!(
            KeyPair::from_bytes(&seed).address(),
            KeyPair::from_bytes(&[43u8; 32]).address()
        );
        // The caller's seed survives.
        assert_eq!(seed, [42u8; 32]);
    }

    #[test]
    fn test_debug_hides_key() {
        let kp = KeyPair::from_bytes(&[9u8; 32]);
        let shown = format!("{:?}", kp.signing_key);
        assert!(shown.contains(&hex_prefix(&kp.address())));
        assert!(!shown.contains("inner"));
    }
}
