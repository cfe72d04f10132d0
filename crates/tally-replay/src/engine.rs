//! Deterministic replay of a script against a booster-wrapped controller and
//! a staking vault.
//!
//! Rejected operations do not abort the replay: they are recorded in the
//! report with their error class, the way a reverted transaction leaves the
//! chain untouched and moves on.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_with::hex::Hex;
use serde_with::{serde_as, DisplayFromStr};
use tally_crypto::blake3::{self, contexts};
use tally_crypto::ed25519::KeyPair;
use tally_crypto::typed_data::SigningDomain;
use tally_locker::LockerMode;
use tally_rewards::pool::PermitFreezerPool;
use tally_rewards::{Booster, PermitClaim, PoolKind, RewardController, RewardError, RewardPool};
use tally_types::clock::{ManualClock, TickSource};
use tally_types::ledger::{InMemoryLedger, LedgerError, TokenLedger};
use tally_types::{short_hex, Address, BalanceUpdate, ErrorClass, PoolId, Tick, TokenId, U256};
use tally_vault::{StakeVault, VaultError};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::script::{Action, PoolSpec, Script};

/// Fatal replay errors. Domain rejections are not fatal.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// An event is scheduled before the current tick.
    #[error("event {index} at tick {tick} is before the current tick {current}")]
    TickRegression {
        /// Position of the event in the script.
        index: usize,
        /// Tick the event asked for.
        tick: Tick,
        /// Tick the clock is at.
        current: Tick,
    },

    /// Engine setup failed.
    #[error("engine setup failed: {0}")]
    Setup(String),
}

/// A rejected operation.
#[derive(Debug, thiserror::Error)]
enum OpError {
    #[error(transparent)]
    Reward(#[from] RewardError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("vault is not bound to a pool")]
    VaultUnbound,
}

impl OpError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Reward(e) => e.class(),
            Self::Vault(e) => e.class(),
            Self::Ledger(_) | Self::VaultUnbound => ErrorClass::Validation,
        }
    }
}

/// A rejected event, as reported.
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    /// Position of the event in the script.
    pub index: usize,
    /// Tick it was applied at.
    pub tick: Tick,
    /// Operation name.
    pub op: &'static str,
    /// Error taxonomy class.
    pub class: ErrorClass,
    /// Error message.
    pub error: String,
}

/// A successful claim, as reported.
#[serde_as]
#[derive(Debug, Clone, Serialize)]
pub struct ClaimRecord {
    /// Tick of the claim.
    pub tick: Tick,
    /// Claimant.
    #[serde_as(as = "Hex")]
    pub user: Address,
    /// Minted by this claim.
    #[serde_as(as = "DisplayFromStr")]
    pub claimed: U256,
    /// Still frozen afterwards.
    #[serde_as(as = "DisplayFromStr")]
    pub frozen: U256,
    /// Cumulative minted to the claimant.
    #[serde_as(as = "DisplayFromStr")]
    pub total_claimed: U256,
}

/// A registered pool at the end of the replay.
#[serde_as]
#[derive(Debug, Clone, Serialize)]
pub struct PoolSummary {
    /// Pool id.
    pub id: PoolId,
    /// Pool name.
    pub name: String,
    /// Variant name.
    pub kind: &'static str,
    /// Emission rate.
    #[serde_as(as = "DisplayFromStr")]
    pub rate: U256,
    /// Whether balance updates are rejected.
    pub paused: bool,
}

/// Vault state at the end of the replay.
#[serde_as]
#[derive(Debug, Clone, Serialize)]
pub struct VaultSummary {
    /// Outstanding shares.
    #[serde_as(as = "DisplayFromStr")]
    pub total_shares: U256,
    /// Underlying held by the vault.
    #[serde_as(as = "DisplayFromStr")]
    pub underlying: U256,
    /// Ray-scaled underlying per share.
    #[serde_as(as = "DisplayFromStr")]
    pub exchange_rate: U256,
    /// Pool share changes are forwarded to.
    pub bound_pool: Option<PoolId>,
}

/// Outcome of a replay.
#[serde_as]
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Tick after the last event.
    pub final_tick: Tick,
    /// Events accepted.
    pub applied: usize,
    /// Events rejected.
    pub failures: Vec<Failure>,
    /// Every successful claim, in order.
    pub claims: Vec<ClaimRecord>,
    /// Reward token balances, keyed by hex address.
    #[serde_as(as = "BTreeMap<_, DisplayFromStr>")]
    pub balances: BTreeMap<String, U256>,
    /// Reward token supply.
    #[serde_as(as = "DisplayFromStr")]
    pub total_supply: U256,
    /// Boost emission withheld and not yet swept.
    #[serde_as(as = "DisplayFromStr")]
    pub boost_excess: U256,
    /// Registered pools.
    pub pools: Vec<PoolSummary>,
    /// Staking vault.
    pub vault: VaultSummary,
}

/// Replay engine state.
pub struct Engine {
    config: EngineConfig,
    clock: ManualClock,
    admin: Address,
    booster: Booster<InMemoryLedger>,
    underlying: InMemoryLedger,
    vault: StakeVault,
    vault_token: TokenId,
    vault_pool: Option<PoolId>,
    claims: Vec<ClaimRecord>,
    failures: Vec<Failure>,
    applied: usize,
}

impl Engine {
    /// Build an engine at tick 0 with `admin` as admin and slasher.
    pub fn new(config: EngineConfig, admin: Address) -> Result<Self, ReplayError> {
        let clock = ManualClock::new(0);
        let controller = RewardController::new(
            clock.shared(),
            InMemoryLedger::new(),
            admin,
            config.freeze_schedule(),
        )
        .map_err(|e| ReplayError::Setup(e.to_string()))?;
        let mut booster = Booster::new(controller, config.booster_params());
        if let Some(rate) = config.controller.base_rate {
            booster
                .controller_mut()
                .set_base_rate(&admin, U256::from(rate))
                .map_err(|e| ReplayError::Setup(e.to_string()))?;
        }
        let vault_account = blake3::derive_account(contexts::VAULT_ACCOUNT, b"staking-vault");
        let vault = StakeVault::new(admin, admin, vault_account, config.vault_params())
            .map_err(|e| ReplayError::Setup(e.to_string()))?;
        Ok(Self {
            clock,
            admin,
            booster,
            underlying: InMemoryLedger::new(),
            vault,
            vault_token: blake3::derive_account(contexts::VAULT_ACCOUNT, b"staking-vault-shares"),
            vault_pool: None,
            claims: Vec::new(),
            failures: Vec::new(),
            applied: 0,
            config,
        })
    }

    /// Replay every event of `script`.
    pub fn run(&mut self, script: &Script) -> Result<(), ReplayError> {
        for (index, event) in script.events.iter().enumerate() {
            let current = self.clock.current_tick();
            if event.tick < current {
                return Err(ReplayError::TickRegression {
                    index,
                    tick: event.tick,
                    current,
                });
            }
            let tick = self.clock.mine_to_tick(event.tick);
            let op = event.action.name();
            match self.apply(&event.action) {
                Ok(()) => {
                    self.applied += 1;
                    debug!(index, tick, op, "replay: applied");
                }
                Err(e) => {
                    warn!(index, tick, op, error = %e, "replay: rejected");
                    self.failures.push(Failure {
                        index,
                        tick,
                        op,
                        class: e.class(),
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            applied = self.applied,
            rejected = self.failures.len(),
            tick = self.clock.current_tick(),
            "replay: finished"
        );
        Ok(())
    }

    /// Snapshot the outcome.
    pub fn report(&self) -> Report {
        let controller = self.booster.controller();
        let ledger = controller.ledger();
        let balances = ledger
            .holders()
            .map(|(addr, balance)| (hex::encode(addr), *balance))
            .collect();
        let pools = controller
            .pools()
            .map(|(id, pool)| PoolSummary {
                id,
                name: pool.name().to_string(),
                kind: pool.kind_name(),
                rate: pool.rate(),
                paused: pool.is_paused(),
            })
            .collect();
        Report {
            final_tick: self.clock.current_tick(),
            applied: self.applied,
            failures: self.failures.clone(),
            claims: self.claims.clone(),
            balances,
            total_supply: ledger.total_supply(),
            boost_excess: self.booster.excess(),
            pools,
            vault: VaultSummary {
                total_shares: self.vault.total_shares(),
                underlying: self.underlying.balance_of(self.vault.account()),
                exchange_rate: self.vault.exchange_rate(&self.underlying).unwrap_or_default(),
                bound_pool: self.vault_pool,
            },
        }
    }

    fn now(&self) -> Tick {
        self.clock.current_tick()
    }

    fn apply(&mut self, action: &Action) -> Result<(), OpError> {
        let admin = self.admin;
        let now = self.now();
        match action {
            Action::AddPool {
                name,
                pool,
                baseline_bps,
            } => {
                let mut pool = self.build_pool(name, pool)?;
                pool.set_baseline_percentage(*baseline_bps)?;
                self.controller().add_reward_pool(&admin, pool)?;
            }
            Action::RemovePool { pool } => {
                self.controller().remove_reward_pool(&admin, *pool)?;
                if self.vault_pool == Some(*pool) {
                    self.vault_pool = None;
                }
            }
            Action::AddProvider {
                pool,
                provider,
                token,
            } => self
                .controller()
                .add_reward_provider(&admin, *pool, *provider, *token)?,
            Action::SetRate { pool, rate } => {
                self.controller().set_pool_rate(&admin, *pool, rate.0)?
            }
            Action::SetPoolPaused { pool, paused } => {
                self.controller().set_pool_paused(&admin, *pool, *paused)?
            }
            Action::SetPaused { paused } => self.controller().set_paused(&admin, *paused)?,
            Action::SetFreezePercentage { bps } => {
                self.controller().set_freeze_percentage(&admin, *bps)?
            }
            Action::SetMeltDownAt { melt_down_at } => {
                self.controller().set_melt_down_at(&admin, *melt_down_at)?
            }
            Action::SetPoolFreeze {
                pool,
                bps,
                melt_down_at,
            } => {
                self.controller()
                    .set_pool_freeze_percentage(&admin, *pool, *bps)?;
                self.controller()
                    .set_pool_melt_down_at(&admin, *pool, *melt_down_at)?;
            }
            Action::SetBaseline { pool, bps } => {
                self.controller().set_baseline_percentage(&admin, *pool, *bps)?
            }
            Action::SetBaseRate { rate } => self.controller().set_base_rate(&admin, rate.0)?,
            Action::SetTeamMember {
                pool,
                member,
                share_bps,
            } => self
                .controller()
                .set_team_member(&admin, *pool, *member, *share_bps)?,
            Action::RemoveTeamMember { pool, member } => {
                self.controller().remove_team_member(&admin, *pool, member)?
            }
            Action::SetTreasury { pool, treasury } => {
                self.controller().set_treasury(&admin, *pool, *treasury)?
            }
            Action::BalanceUpdate {
                pool,
                provider,
                token,
                user,
                before,
                after,
                total_after,
            } => {
                let update = BalanceUpdate {
                    user: *user,
                    before: before.0,
                    after: after.0,
                    total_after: total_after.0,
                };
                self.controller()
                    .handle_balance_update(provider, *pool, token, &update)?;
            }
            Action::Claim { user } => {
                let outcome = self.booster.claim_reward(user)?;
                self.claims.push(ClaimRecord {
                    tick: now,
                    user: *user,
                    claimed: outcome.claimed,
                    frozen: outcome.frozen,
                    total_claimed: outcome.total_claimed,
                });
            }
            Action::AddPermitSigner { pool, seed } => {
                let signer = KeyPair::from_bytes(seed).address();
                self.controller().add_permit_signer(&admin, *pool, signer)?;
            }
            Action::Permit {
                pool,
                seed,
                spender,
                value,
                deadline,
                nonce,
            } => {
                let signer = KeyPair::from_bytes(seed);
                let claim = PermitClaim {
                    provider: signer.address(),
                    spender: *spender,
                    value: value.0,
                    deadline: *deadline,
                };
                let (domain, current_nonce) = self.permit_domain(*pool, spender)?;
                let nonce = nonce.map(|n| n.0).unwrap_or(current_nonce);
                let signature = claim.sign(&signer.signing_key, &domain, nonce);
                let outcome = self.booster.claim_reward_by_permit(*pool, &claim, &signature)?;
                self.claims.push(ClaimRecord {
                    tick: now,
                    user: *spender,
                    claimed: outcome.claimed,
                    frozen: outcome.frozen,
                    total_claimed: outcome.total_claimed,
                });
            }
            Action::Mint { to, amount } => self.controller().ledger_mut().mint(to, amount.0)?,
            Action::Lock {
                pool,
                owner,
                amount,
                period,
                slippage_bps,
            } => {
                self.controller()
                    .lock(*pool, *owner, amount.0, *period, *slippage_bps)?;
            }
            Action::RedeemLock { pool, owner, to } => {
                self.controller().redeem_lock(*pool, *owner, *to)?;
            }
            Action::SetBoostPool { pool } => self.booster.set_boost_pool(&admin, *pool)?,
            Action::SetBoostFactor { pool, bps } => {
                self.booster.set_boost_factor(&admin, *pool, *bps)?
            }
            Action::SetExcessTarget { target, enabled } => {
                self.booster.set_boost_excess_target(&admin, *target, *enabled)?
            }
            Action::SweepExcess => {
                self.booster.sweep_boost_excess()?;
            }
            Action::BindVault { pool } => {
                let account = *self.vault.account();
                let token = self.vault_token;
                self.controller()
                    .add_reward_provider(&admin, *pool, account, token)?;
                self.vault_pool = Some(*pool);
            }
            Action::MintUnderlying { to, amount } => self.underlying.mint(to, amount.0)?,
            Action::Stake { user, amount } => {
                self.bound_pool()?;
                let receipt = self
                    .vault
                    .stake(&mut self.underlying, user, user, amount.0, 0, now)?;
                self.forward(&receipt.updates)?;
            }
            Action::Cooldown { user } => self.vault.cooldown(user, now)?,
            Action::Redeem { user, shares } => {
                self.bound_pool()?;
                let shares = shares.map(|s| s.0).unwrap_or(U256::MAX);
                let receipt = self
                    .vault
                    .redeem(&mut self.underlying, user, user, shares, now)?;
                self.forward(&receipt.updates)?;
            }
            Action::TransferShares { from, to, shares } => {
                self.bound_pool()?;
                let updates = self.vault.transfer(from, to, shares.0, now)?;
                self.forward(&updates)?;
            }
            Action::Slash {
                destination,
                max_amount,
            } => {
                self.vault.slash_underlying(
                    &mut self.underlying,
                    &admin,
                    destination,
                    U256::zero(),
                    max_amount.0,
                )?;
            }
            Action::AccrueIndex { index } => {
                self.vault
                    .accrue_index(&mut self.underlying, &admin, index.0)?;
            }
        }
        Ok(())
    }

    fn controller(&mut self) -> &mut RewardController<InMemoryLedger> {
        self.booster.controller_mut()
    }

    fn build_pool(&self, name: &str, spec: &PoolSpec) -> Result<RewardPool, OpError> {
        let now = self.now();
        let pool = match spec {
            PoolSpec::TokenWeighted { rate } => RewardPool::token_weighted(name, rate.0, now),
            PoolSpec::Team { rate, unlocked_at } => RewardPool::team(name, rate.0, *unlocked_at),
            PoolSpec::Zombie {
                reward_per_unit,
                reward_limit,
            } => RewardPool::zombie(name, reward_per_unit.0, reward_limit.0),
            PoolSpec::Treasury { rate, treasury } => {
                RewardPool::treasury(name, rate.0, *treasury, now)
            }
            PoolSpec::PermitFreezer { reward_limit } => {
                let domain = SigningDomain {
                    name: "PermitFreezerRewardPool".to_string(),
                    version: "1".to_string(),
                    chain_id: self.config.controller.chain_id,
                    verifying_contract: pool_account(name),
                };
                RewardPool::permit_freezer(name, PermitFreezerPool::new(domain, reward_limit.0))
            }
            PoolSpec::Locker { rate, decaying } => {
                let mode = if *decaying {
                    LockerMode::Decaying
                } else {
                    LockerMode::Linear
                };
                RewardPool::locker(
                    name,
                    mode,
                    self.config.locker_params(),
                    pool_account(name),
                    rate.0,
                    now,
                )?
            }
        };
        Ok(pool)
    }

    fn permit_domain(
        &self,
        id: PoolId,
        spender: &Address,
    ) -> Result<(SigningDomain, U256), OpError> {
        let pool = self
            .booster
            .controller()
            .pool(id)
            .ok_or(RewardError::UnknownPool(id))?;
        match pool.kind() {
            PoolKind::PermitFreezer(inner) => Ok((inner.domain().clone(), inner.nonce_of(spender))),
            _ => Err(RewardError::UnsupportedOperation {
                kind: pool.kind_name(),
            }
            .into()),
        }
    }

    /// Share changes must have somewhere to go before the vault moves.
    fn bound_pool(&self) -> Result<PoolId, OpError> {
        self.vault_pool.ok_or(OpError::VaultUnbound)
    }

    fn forward(&mut self, updates: &[BalanceUpdate]) -> Result<(), OpError> {
        let pool = self.bound_pool()?;
        let provider = *self.vault.account();
        let token = self.vault_token;
        for update in updates {
            debug!(user = %short_hex(&update.user), pool, "replay: forwarding share update");
            self.controller()
                .handle_balance_update(&provider, pool, &token, update)?;
        }
        Ok(())
    }
}

/// Escrow/verifying address of a named pool.
fn pool_account(name: &str) -> Address {
    blake3::derive_account(contexts::POOL_ACCOUNT, name.as_bytes())
}
