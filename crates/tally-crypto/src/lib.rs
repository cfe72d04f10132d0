//! # tally-crypto
//!
//! Hashing and signatures behind Tally's signed permit claims and derived
//! escrow accounts.
//!
//! ## Modules
//!
//! - [`blake3`] — Context-separated BLAKE3 hashing and account derivation
//! - [`ed25519`] — Permit signatures, verified against the signer's address
//! - [`typed_data`] — Signing domains and typed-data digests

pub mod blake3;
pub mod ed25519;
pub mod typed_data;

/// Error types for permit cryptography.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The signature does not match the digest and signer.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Malformed key or signature bytes.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
