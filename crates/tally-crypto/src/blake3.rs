//! Context-separated BLAKE3.
//!
//! Everything Tally derives goes through BLAKE3's key-derivation mode under
//! one of the registered [`contexts`], so a permit digest can never equal an
//! escrow account address even when the inputs coincide. Plain [`hash`] is
//! only used for the name and version fields inside a signing domain.

/// Registered derivation contexts.
pub mod contexts {
    /// Signing domain separator.
    pub const PERMIT_DOMAIN: &str = "Tally v1 permit-domain";
    /// Permit claim struct hash.
    pub const PERMIT_CLAIM: &str = "Tally v1 permit-claim";
    /// Escrow and verifying accounts of named pools.
    pub const POOL_ACCOUNT: &str = "Tally v1 pool-account";
    /// Staking vault accounts.
    pub const VAULT_ACCOUNT: &str = "Tally v1 vault-account";

    /// Every registered context.
    pub const ALL_CONTEXTS: &[&str] = &[PERMIT_DOMAIN, PERMIT_CLAIM, POOL_ACCOUNT, VAULT_ACCOUNT];
}

/// BLAKE3 of `data`.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// `derive_key(context, material)`.
///
/// `context` should be one of [`contexts`]; see [`is_registered_context`].
pub fn derive_key(context: &str, material: &[u8]) -> [u8; 32] {
    ::blake3::derive_key(context, material)
}

/// Whether `context` is one of [`contexts::ALL_CONTEXTS`].
pub fn is_registered_context(context: &str) -> bool {
    contexts::ALL_CONTEXTS.contains(&context)
}

/// Ledger address of a named engine component.
///
/// Locker escrows, vaults and permit verifying contracts hold or sign as an
/// address nobody has a key for.
pub fn derive_account(context: &str, label: &[u8]) -> [u8; 32] {
    derive_key(context, label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_contexts_prefixed() {
        for ctx in contexts::ALL_CONTEXTS {
            assert!(ctx.starts_with("Tally v1 "), "bad context: {ctx}");
            assert!(is_registered_context(ctx));
        }
        assert!(!is_registered_context("Tally v1 unknown"));
    }

    #[test]
    fn test_derive_key_matches_hasher() {
        let mut hasher = ::blake3::Hasher::new_derive_key(contexts::POOL_ACCOUNT);
        hasher.update(b"locker");
        assert_eq!(
            derive_key(contexts::POOL_ACCOUNT, b"locker"),
            *hasher.finalize().as_bytes()
        );
    }

    #[test]
    fn test_contexts_separate_outputs() {
        let a = derive_key(contexts::PERMIT_DOMAIN, b"same input");
        let b = derive_key(contexts::PERMIT_CLAIM, b"same input");
        assert_ne!(a, b);
        assert_ne!(a, hash(b"same input"));
    }

    #[test]
    fn test_accounts_differ_by_label_and_kind() {
        let locker = derive_account(contexts::POOL_ACCOUNT, b"locker-1");
        assert_ne!(locker, derive_account(contexts::POOL_ACCOUNT, b"locker-2"));
        assert_ne!(locker, derive_account(contexts::VAULT_ACCOUNT, b"locker-1"));
    }
}
