//! The staking/slashing vault.
//!
//! Shares are claims on the vault's underlying balance held in the ledger
//! under the vault's custody account. The exchange rate is
//! `underlying × RAY / total_shares`, so underlying growth from the index and
//! underlying removed by slashing are spread across every staker at once
//! without touching individual positions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tally_types::ledger::TokenLedger;
use tally_types::math::{self, PERCENTAGE_FACTOR, RAY};
use tally_types::{short_hex, Address, BalanceUpdate, Tick, U256};
use tracing::{debug, info, warn};

use crate::cooldown::CooldownParams;
use crate::{Result, VaultError};

/// Default cap on a single slash, in basis points of the underlying.
pub const MAX_SLASHABLE_BPS: u32 = 3_000;

/// Vault configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultParams {
    /// Cooldown and unstake window.
    pub cooldown: CooldownParams,
    /// Largest fraction of the underlying one slash may remove.
    pub max_slashable_bps: u32,
}

impl Default for VaultParams {
    fn default() -> Self {
        Self {
            cooldown: CooldownParams::default(),
            max_slashable_bps: MAX_SLASHABLE_BPS,
        }
    }
}

/// Result of a stake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeReceipt {
    /// Shares minted to the receiver.
    pub shares: U256,
    /// Share balance changes, to be forwarded to reward pools.
    pub updates: Vec<BalanceUpdate>,
}

/// Result of a redemption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemReceipt {
    /// Shares burned.
    pub shares: U256,
    /// Underlying paid out.
    pub underlying: U256,
    /// Share balance changes, to be forwarded to reward pools.
    pub updates: Vec<BalanceUpdate>,
}

/// Staking vault over one underlying token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StakeVault {
    admin: Address,
    slasher: Address,
    account: Address,
    params: VaultParams,
    shares: BTreeMap<Address, U256>,
    cooldowns: BTreeMap<Address, Tick>,
    total_shares: U256,
    paused: bool,
    index: U256,
}

impl StakeVault {
    /// Create a vault holding its underlying under `account`.
    ///
    /// The underlying index starts at `RAY`.
    pub fn new(admin: Address, slasher: Address, account: Address, params: VaultParams) -> Result<Self> {
        if params.max_slashable_bps > PERCENTAGE_FACTOR {
            return Err(VaultError::InvalidPercentage(params.max_slashable_bps));
        }
        Ok(Self {
            admin,
            slasher,
            account,
            params,
            shares: BTreeMap::new(),
            cooldowns: BTreeMap::new(),
            total_shares: U256::zero(),
            paused: false,
            index: RAY,
        })
    }

    /// Ledger account holding the underlying.
    pub fn account(&self) -> &Address {
        &self.account
    }

    /// Vault configuration.
    pub fn params(&self) -> &VaultParams {
        &self.params
    }

    /// Shares held by `who`.
    pub fn shares_of(&self, who: &Address) -> U256 {
        self.shares.get(who).copied().unwrap_or_default()
    }

    /// Total shares outstanding.
    pub fn total_shares(&self) -> U256 {
        self.total_shares
    }

    /// Tick at which `who` started its cooldown, if any.
    pub fn cooldown_of(&self, who: &Address) -> Option<Tick> {
        self.cooldowns.get(who).copied()
    }

    /// Whether the vault is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Current slasher.
    pub fn slasher(&self) -> &Address {
        &self.slasher
    }

    /// Last underlying index applied.
    pub fn index(&self) -> U256 {
        self.index
    }

    /// Underlying per share, ray-scaled. `RAY` while no shares exist.
    pub fn exchange_rate(&self, ledger: &dyn TokenLedger) -> Result<U256> {
        if self.total_shares.is_zero() {
            return Ok(RAY);
        }
        Ok(math::mul_div(ledger.balance_of(&self.account), RAY, self.total_shares)?)
    }

    /// Underlying currently backing `who`'s shares.
    pub fn balance_of_underlying(&self, ledger: &dyn TokenLedger, who: &Address) -> Result<U256> {
        self.underlying_for(ledger, self.shares_of(who))
    }

    /// Pull `amount` of underlying from `caller` and mint shares to `to`.
    ///
    /// The receiver's cooldown is merged as if the shares came from a sender
    /// without a cooldown, so topping up pushes a running cooldown later.
    pub fn stake(
        &mut self,
        ledger: &mut dyn TokenLedger,
        caller: &Address,
        to: &Address,
        amount: U256,
        referral_code: u16,
        now: Tick,
    ) -> Result<StakeReceipt> {
        self.ensure_active()?;
        if amount.is_zero() {
            return Err(VaultError::ZeroAmount);
        }
        let underlying = ledger.balance_of(&self.account);
        let minted = if self.total_shares.is_zero() || underlying.is_zero() {
            amount
        } else {
            math::mul_div(amount, self.total_shares, underlying)?
        };
        if minted.is_zero() {
            return Err(VaultError::ZeroAmount);
        }
        let before = self.shares_of(to);
        let after = math::add(before, minted)?;
        let total_after = math::add(self.total_shares, minted)?;
        let cooldown = self
            .params
            .cooldown
            .merge(now, None, minted, self.cooldown_of(to), before)?;

        ledger.transfer(caller, &self.account, amount)?;

        self.shares.insert(*to, after);
        self.total_shares = total_after;
        self.set_cooldown(to, cooldown);

        info!(
            to = %short_hex(to),
            %amount,
            shares = %minted,
            referral_code,
            "vault: staked"
        );
        Ok(StakeReceipt {
            shares: minted,
            updates: vec![BalanceUpdate {
                user: *to,
                before,
                after,
                total_after,
            }],
        })
    }

    /// Start the cooldown for `caller`.
    pub fn cooldown(&mut self, caller: &Address, now: Tick) -> Result<()> {
        if self.shares_of(caller).is_zero() {
            return Err(VaultError::InvalidBalanceOnCooldown);
        }
        self.cooldowns.insert(*caller, now);
        debug!(caller = %short_hex(caller), tick = now, "vault: cooldown started");
        Ok(())
    }

    /// Burn `shares` of `caller` and pay the underlying to `to`.
    ///
    /// `U256::MAX` redeems every share held.
    pub fn redeem(
        &mut self,
        ledger: &mut dyn TokenLedger,
        caller: &Address,
        to: &Address,
        shares: U256,
        now: Tick,
    ) -> Result<RedeemReceipt> {
        self.ensure_active()?;
        let held = self.shares_of(caller);
        let shares = if shares == U256::MAX { held } else { shares };
        self.check_redeem(caller, held, shares, now)?;
        let underlying = self.underlying_for(ledger, shares)?;
        self.burn_and_pay(ledger, caller, to, held, shares, underlying)
    }

    /// Pay exactly `amount` of underlying to `to`, burning the shares it
    /// takes (rounded up).
    ///
    /// `U256::MAX` redeems every share held.
    pub fn redeem_underlying(
        &mut self,
        ledger: &mut dyn TokenLedger,
        caller: &Address,
        to: &Address,
        amount: U256,
        now: Tick,
    ) -> Result<RedeemReceipt> {
        if amount == U256::MAX {
            return self.redeem(ledger, caller, to, U256::MAX, now);
        }
        self.ensure_active()?;
        if amount.is_zero() {
            return Err(VaultError::ZeroAmount);
        }
        let held = self.shares_of(caller);
        let underlying = ledger.balance_of(&self.account);
        if self.total_shares.is_zero() || underlying.is_zero() {
            return Err(VaultError::InsufficientBalance {
                available: U256::zero(),
                required: amount,
            });
        }
        let shares = math::mul_div_up(amount, self.total_shares, underlying)?;
        self.check_redeem(caller, held, shares, now)?;
        self.burn_and_pay(ledger, caller, to, held, shares, amount)
    }

    /// Move up to `max_amount` of underlying to `destination`.
    ///
    /// The amount is capped at `max_slashable_bps` of the underlying. When
    /// the capped amount falls below `min_amount` nothing moves and 0 is
    /// returned.
    pub fn slash_underlying(
        &mut self,
        ledger: &mut dyn TokenLedger,
        caller: &Address,
        destination: &Address,
        min_amount: U256,
        max_amount: U256,
    ) -> Result<U256> {
        if caller != &self.slasher {
            return Err(VaultError::NotSlasher);
        }
        let underlying = ledger.balance_of(&self.account);
        let cap = math::percent_mul(underlying, self.params.max_slashable_bps)?;
        let amount = max_amount.min(cap);
        if amount.is_zero() || amount < min_amount {
            debug!(%amount, %min_amount, "vault: slash below floor, skipped");
            return Ok(U256::zero());
        }
        ledger.transfer(&self.account, destination, amount)?;
        warn!(
            destination = %short_hex(destination),
            %amount,
            remaining = %(underlying - amount),
            "vault: slashed underlying"
        );
        Ok(amount)
    }

    /// Move `shares` from `from` to `to`, merging cooldowns.
    ///
    /// `U256::MAX` moves every share held.
    pub fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        shares: U256,
        now: Tick,
    ) -> Result<Vec<BalanceUpdate>> {
        self.ensure_active()?;
        let from_before = self.shares_of(from);
        let shares = if shares == U256::MAX { from_before } else { shares };
        if shares.is_zero() {
            return Err(VaultError::ZeroAmount);
        }
        if shares > from_before {
            return Err(VaultError::InsufficientBalance {
                available: from_before,
                required: shares,
            });
        }
        if from == to {
            return Ok(Vec::new());
        }
        let from_after = from_before - shares;
        let to_before = self.shares_of(to);
        let to_after = math::add(to_before, shares)?;
        let to_cooldown = self.params.cooldown.merge(
            now,
            self.cooldown_of(from),
            shares,
            self.cooldown_of(to),
            to_before,
        )?;

        self.shares.insert(*from, from_after);
        self.shares.insert(*to, to_after);
        self.set_cooldown(to, to_cooldown);
        if from_after.is_zero() {
            self.shares.remove(from);
            self.cooldowns.remove(from);
        }

        debug!(
            from = %short_hex(from),
            to = %short_hex(to),
            %shares,
            "vault: shares transferred"
        );
        Ok(vec![
            BalanceUpdate {
                user: *from,
                before: from_before,
                after: from_after,
                total_after: self.total_shares,
            },
            BalanceUpdate {
                user: *to,
                before: to_before,
                after: to_after,
                total_after: self.total_shares,
            },
        ])
    }

    /// Apply a new normalized index of the underlying, minting the growth
    /// into the vault account. Returns the amount minted.
    pub fn accrue_index(
        &mut self,
        ledger: &mut dyn TokenLedger,
        caller: &Address,
        new_index: U256,
    ) -> Result<U256> {
        self.ensure_admin(caller)?;
        if new_index < self.index {
            return Err(VaultError::InvalidIndex {
                current: self.index,
                new: new_index,
            });
        }
        let underlying = ledger.balance_of(&self.account);
        let growth = math::mul_div(underlying, new_index - self.index, self.index)?;
        if !growth.is_zero() {
            ledger.mint(&self.account, growth)?;
        }
        self.index = new_index;
        debug!(index = %new_index, %growth, "vault: index accrued");
        Ok(growth)
    }

    /// Pause or resume staking, redemption and transfers.
    pub fn set_paused(&mut self, caller: &Address, paused: bool) -> Result<()> {
        self.ensure_admin(caller)?;
        self.paused = paused;
        warn!(paused, "vault: pause flag changed");
        Ok(())
    }

    /// Replace the slasher.
    pub fn set_slasher(&mut self, caller: &Address, slasher: Address) -> Result<()> {
        self.ensure_admin(caller)?;
        self.slasher = slasher;
        info!(slasher = %short_hex(&slasher), "vault: slasher changed");
        Ok(())
    }

    /// Change the per-slash cap.
    pub fn set_max_slashable_bps(&mut self, caller: &Address, bps: u32) -> Result<()> {
        self.ensure_admin(caller)?;
        if bps > PERCENTAGE_FACTOR {
            return Err(VaultError::InvalidPercentage(bps));
        }
        self.params.max_slashable_bps = bps;
        info!(bps, "vault: max slashable percentage changed");
        Ok(())
    }

    fn underlying_for(&self, ledger: &dyn TokenLedger, shares: U256) -> Result<U256> {
        if self.total_shares.is_zero() {
            return Ok(U256::zero());
        }
        Ok(math::mul_div(shares, ledger.balance_of(&self.account), self.total_shares)?)
    }

    fn check_redeem(&self, caller: &Address, held: U256, shares: U256, now: Tick) -> Result<()> {
        if shares.is_zero() {
            return Err(VaultError::ZeroAmount);
        }
        self.params.cooldown.check_redeemable(self.cooldown_of(caller), now)?;
        if shares > held {
            return Err(VaultError::InsufficientBalance {
                available: held,
                required: shares,
            });
        }
        Ok(())
    }

    fn burn_and_pay(
        &mut self,
        ledger: &mut dyn TokenLedger,
        caller: &Address,
        to: &Address,
        held: U256,
        shares: U256,
        underlying: U256,
    ) -> Result<RedeemReceipt> {
        let after = held - shares;
        let total_after = math::sub(self.total_shares, shares)?;
        if !underlying.is_zero() {
            ledger.transfer(&self.account, to, underlying)?;
        }

        self.total_shares = total_after;
        if after.is_zero() {
            self.shares.remove(caller);
            self.cooldowns.remove(caller);
        } else {
            self.shares.insert(*caller, after);
        }

        info!(
            caller = %short_hex(caller),
            to = %short_hex(to),
            %shares,
            %underlying,
            "vault: redeemed"
        );
        Ok(RedeemReceipt {
            shares,
            underlying,
            updates: vec![BalanceUpdate {
                user: *caller,
                before: held,
                after,
                total_after,
            }],
        })
    }

    fn set_cooldown(&mut self, who: &Address, cooldown: Option<Tick>) {
        match cooldown {
            Some(tick) => self.cooldowns.insert(*who, tick),
            None => self.cooldowns.remove(who),
        };
    }

    fn ensure_active(&self) -> Result<()> {
        if self.paused {
            return Err(VaultError::VaultPaused);
        }
        Ok(())
    }

    fn ensure_admin(&self, caller: &Address) -> Result<()> {
        if caller != &self.admin {
            return Err(VaultError::Unauthorized);
        }
        Ok(())
    }
}
