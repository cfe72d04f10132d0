//! Token ledger primitive.
//!
//! The engine never holds token balances itself; reward minting, locker
//! escrow, and vault custody all go through a [`TokenLedger`]. The
//! [`InMemoryLedger`] is the reference implementation used in tests and by the
//! replay tool.

use std::collections::BTreeMap;

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::{short_hex, Address};

/// Errors raised by a token ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The source account does not hold enough tokens.
    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance {
        /// Balance held by the source account.
        available: U256,
        /// Amount requested.
        required: U256,
    },

    /// Total supply would exceed 256 bits.
    #[error("total supply overflow")]
    SupplyOverflow,
}

/// Convenience result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Mint/burn/transfer over a single token.
pub trait TokenLedger {
    /// Balance held by `who`.
    fn balance_of(&self, who: &Address) -> U256;

    /// Total amount in circulation.
    fn total_supply(&self) -> U256;

    /// Create `amount` new tokens owned by `to`.
    fn mint(&mut self, to: &Address, amount: U256) -> Result<()>;

    /// Destroy `amount` tokens owned by `from`.
    fn burn(&mut self, from: &Address, amount: U256) -> Result<()>;

    /// Move `amount` tokens from `from` to `to`.
    fn transfer(&mut self, from: &Address, to: &Address, amount: U256) -> Result<()>;
}

/// In-memory ledger keyed by address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryLedger {
    balances: BTreeMap<Address, U256>,
    total_supply: U256,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterate over all non-zero balances.
    pub fn holders(&self) -> impl Iterator<Item = (&Address, &U256)> {
        self.balances.iter().filter(|(_, b)| !b.is_zero())
    }
}

impl TokenLedger for InMemoryLedger {
    fn balance_of(&self, who: &Address) -> U256 {
        self.balances.get(who).copied().unwrap_or_default()
    }

    fn total_supply(&self) -> U256 {
        self.total_supply
    }

    fn mint(&mut self, to: &Address, amount: U256) -> Result<()> {
        let total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::SupplyOverflow)?;
        let balance = self.balance_of(to);
        // Any balance is bounded by total supply, so this cannot overflow.
        self.balances.insert(*to, balance.saturating_add(amount));
        self.total_supply = total_supply;
        tracing::trace!(to = %short_hex(to), %amount, "ledger: mint");
        Ok(())
    }

    fn burn(&mut self, from: &Address, amount: U256) -> Result<()> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                available: balance,
                required: amount,
            });
        }
        self.balances.insert(*from, balance - amount);
        self.total_supply = self.total_supply.saturating_sub(amount);
        Ok(())
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: U256) -> Result<()> {
        let from_balance = self.balance_of(from);
        if from_balance < amount {
            return Err(LedgerError::InsufficientBalance {
                available: from_balance,
                required: amount,
            });
        }
        if from == to {
            return Ok(());
        }
        self.balances.insert(*from, from_balance - amount);
        let to_balance = self.balance_of(to);
        self.balances.insert(*to, to_balance.saturating_add(amount));
        tracing::trace!(
            from = %short_hex(from),
            to = %short_hex(to),
            %amount,
            "ledger: transfer"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = [0x01; 32];
    const BOB: Address = [0x02; 32];

    #[test]
    fn test_mint_and_transfer() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&ALICE, U256::from(100)).expect("mint");
        ledger
            .transfer(&ALICE, &BOB, U256::from(40))
            .expect("transfer");
        assert_eq!(ledger.balance_of(&ALICE), U256::from(60));
        assert_eq!(ledger.balance_of(&BOB), U256::from(40));
        assert_eq!(ledger.total_supply(), U256::from(100));
    }

    #[test]
    fn test_transfer_insufficient() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&ALICE, U256::from(10)).expect("mint");
        let err = ledger
            .transfer(&ALICE, &BOB, U256::from(11))
            .expect_err("should fail");
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(ledger.balance_of(&ALICE), U256::from(10));
    }

    #[test]
    fn test_burn() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&ALICE, U256::from(10)).expect("mint");
        ledger.burn(&ALICE, U256::from(4)).expect("burn");
        assert_eq!(ledger.balance_of(&ALICE), U256::from(6));
        assert_eq!(ledger.total_supply(), U256::from(6));
        assert!(ledger.burn(&ALICE, U256::from(7)).is_err());
    }

    #[test]
    fn test_self_transfer_is_noop() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&ALICE, U256::from(5)).expect("mint");
        ledger.transfer(&ALICE, &ALICE, U256::from(5)).expect("self");
        assert_eq!(ledger.balance_of(&ALICE), U256::from(5));
    }

    #[test]
    fn test_holders_skip_zero() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&ALICE, U256::from(5)).expect("mint");
        ledger.transfer(&ALICE, &BOB, U256::from(5)).expect("move all");
        let holders: Vec<_> = ledger.holders().map(|(a, _)| *a).collect();
        assert_eq!(holders, vec![BOB]);
    }
}
