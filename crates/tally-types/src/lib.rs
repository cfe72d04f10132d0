//! # tally-types
//!
//! Shared domain types used across the Tally workspace.
//!
//! ## Modules
//!
//! - [`clock`] — Tick source abstraction and the manual test clock
//! - [`math`] — 256-bit ray/wad fixed-point arithmetic
//! - [`ledger`] — Token ledger primitive (mint/burn/transfer)

pub mod clock;
pub mod ledger;
pub mod math;

pub use primitive_types::{U256, U512};

/// Discrete time unit every accrual is computed against (block number or
/// equivalent logical clock).
pub type Tick = u64;

/// Opaque participant key. For permit signers this is the Ed25519 public key.
pub type Address = [u8; 32];

/// Identifier of a token reported by a reward provider.
pub type TokenId = [u8; 32];

/// Identifier assigned to a pool by the controller that owns it.
pub type PoolId = u32;

/// The all-zero address. Never a valid participant.
pub const ZERO_ADDRESS: Address = [0u8; 32];

/// Error taxonomy shared by all domain error enums.
///
/// Every error is raised before any accumulator is mutated, so the class only
/// tells the caller how to recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorClass {
    /// Unregistered provider, non-admin caller, non-slasher caller.
    Authorization,
    /// Pool, controller or vault paused. Recoverable by toggling the flag.
    State,
    /// Cooldown, unstake window, lock expiry, lockup, permit deadline.
    Timing,
    /// Malformed or out-of-range input.
    Validation,
    /// Permit nonce reuse or signature mismatch.
    Replay,
    /// Overflow in fixed-point arithmetic.
    Arithmetic,
}

/// A change of one participant's weighted balance, as reported to a pool by a
/// reward provider.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BalanceUpdate {
    /// Participant whose balance changed.
    pub user: Address,
    /// Balance before the change.
    pub before: U256,
    /// Balance after the change.
    pub after: U256,
    /// Provider-wide total after the change.
    pub total_after: U256,
}

/// Short hex rendering of an address for log fields.
pub fn short_hex(addr: &Address) -> String {
    hex::encode(&addr[..4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hex() {
        let mut addr = ZERO_ADDRESS;
        addr[0] = 0xAB;
        addr[3] = 0x01;
        assert_eq!(short_hex(&addr), "ab000001");
    }
}
