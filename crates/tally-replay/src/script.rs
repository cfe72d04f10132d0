//! JSON event scripts.
//!
//! A script names the admin and lists events in tick order. Addresses and
//! token ids are hex strings. Amounts are JSON integers or, when they do not
//! fit in 64 bits (rays), decimal strings.

use serde::{Deserialize, Serialize};
use serde_with::hex::Hex;
use serde_with::serde_as;
use tally_types::{Address, PoolId, Tick, TokenId, U256};

/// A 256-bit amount written as a JSON integer or a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawAmount", into = "RawAmount")]
pub struct Amount(pub U256);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Int(u64),
    Dec(String),
}

impl TryFrom<RawAmount> for Amount {
    type Error = String;

    fn try_from(raw: RawAmount) -> Result<Self, Self::Error> {
        match raw {
            RawAmount::Int(value) => Ok(Self(U256::from(value))),
            RawAmount::Dec(text) => U256::from_dec_str(&text)
                .map(Self)
                .map_err(|e| format!("invalid amount {text:?}: {e:?}")),
        }
    }
}

impl From<Amount> for RawAmount {
    fn from(amount: Amount) -> Self {
        Self::Dec(amount.0.to_string())
    }
}

impl From<Amount> for U256 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// A complete replay script.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    /// Admin of the controller, booster and vault; also the slasher.
    #[serde_as(as = "Hex")]
    pub admin: Address,
    /// Events, applied in order. Ticks must never go backwards.
    pub events: Vec<Event>,
}

/// One scripted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Tick the event happens at.
    pub tick: Tick,
    /// What happens.
    #[serde(flatten)]
    pub action: Action,
}

/// Pool to register.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PoolSpec {
    TokenWeighted {
        rate: Amount,
    },
    Team {
        rate: Amount,
        unlocked_at: Tick,
    },
    Zombie {
        /// Ray-scaled credit per unit of balance increase.
        reward_per_unit: Amount,
        reward_limit: Amount,
    },
    Treasury {
        rate: Amount,
        #[serde_as(as = "Hex")]
        treasury: Address,
    },
    PermitFreezer {
        reward_limit: Amount,
    },
    Locker {
        rate: Amount,
        #[serde(default)]
        decaying: bool,
    },
}

/// Scripted operations.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    // Controller administration
    AddPool {
        name: String,
        #[serde(flatten)]
        pool: PoolSpec,
        #[serde(default)]
        baseline_bps: Option<u32>,
    },
    RemovePool {
        pool: PoolId,
    },
    AddProvider {
        pool: PoolId,
        #[serde_as(as = "Hex")]
        provider: Address,
        #[serde_as(as = "Hex")]
        token: TokenId,
    },
    SetRate {
        pool: PoolId,
        rate: Amount,
    },
    SetPoolPaused {
        pool: PoolId,
        paused: bool,
    },
    SetPaused {
        paused: bool,
    },
    SetFreezePercentage {
        bps: u32,
    },
    SetMeltDownAt {
        melt_down_at: Tick,
    },
    SetPoolFreeze {
        pool: PoolId,
        #[serde(default)]
        bps: Option<u32>,
        #[serde(default)]
        melt_down_at: Option<Tick>,
    },
    SetBaseline {
        pool: PoolId,
        bps: Option<u32>,
    },
    SetBaseRate {
        rate: Amount,
    },
    SetTeamMember {
        pool: PoolId,
        #[serde_as(as = "Hex")]
        member: Address,
        share_bps: u32,
    },
    RemoveTeamMember {
        pool: PoolId,
        #[serde_as(as = "Hex")]
        member: Address,
    },
    SetTreasury {
        pool: PoolId,
        #[serde_as(as = "Hex")]
        treasury: Address,
    },

    // Balance reports and claims
    BalanceUpdate {
        pool: PoolId,
        #[serde_as(as = "Hex")]
        provider: Address,
        #[serde_as(as = "Hex")]
        token: TokenId,
        #[serde_as(as = "Hex")]
        user: Address,
        before: Amount,
        after: Amount,
        total_after: Amount,
    },
    Claim {
        #[serde_as(as = "Hex")]
        user: Address,
    },

    // Permits. The signer key is derived from a 32-byte seed.
    AddPermitSigner {
        pool: PoolId,
        #[serde_as(as = "Hex")]
        seed: [u8; 32],
    },
    Permit {
        pool: PoolId,
        #[serde_as(as = "Hex")]
        seed: [u8; 32],
        #[serde_as(as = "Hex")]
        spender: Address,
        value: Amount,
        deadline: Tick,
        /// Sign over this nonce instead of the spender's current one.
        #[serde(default)]
        nonce: Option<Amount>,
    },

    // Reward token and lockers
    Mint {
        #[serde_as(as = "Hex")]
        to: Address,
        amount: Amount,
    },
    Lock {
        pool: PoolId,
        #[serde_as(as = "Hex")]
        owner: Address,
        amount: Amount,
        period: u64,
        #[serde(default)]
        slippage_bps: u32,
    },
    RedeemLock {
        pool: PoolId,
        #[serde_as(as = "Hex")]
        owner: Address,
        #[serde_as(as = "Hex")]
        to: Address,
    },

    // Booster
    SetBoostPool {
        pool: PoolId,
    },
    SetBoostFactor {
        pool: PoolId,
        bps: u32,
    },
    SetExcessTarget {
        #[serde_as(as = "Option<Hex>")]
        target: Option<Address>,
        enabled: bool,
    },
    SweepExcess,

    // Staking vault. Share changes are forwarded to the bound pool.
    BindVault {
        pool: PoolId,
    },
    MintUnderlying {
        #[serde_as(as = "Hex")]
        to: Address,
        amount: Amount,
    },
    Stake {
        #[serde_as(as = "Hex")]
        user: Address,
        amount: Amount,
    },
    Cooldown {
        #[serde_as(as = "Hex")]
        user: Address,
    },
    Redeem {
        #[serde_as(as = "Hex")]
        user: Address,
        /// Shares to redeem; omitted means all.
        #[serde(default)]
        shares: Option<Amount>,
    },
    TransferShares {
        #[serde_as(as = "Hex")]
        from: Address,
        #[serde_as(as = "Hex")]
        to: Address,
        shares: Amount,
    },
    Slash {
        #[serde_as(as = "Hex")]
        destination: Address,
        max_amount: Amount,
    },
    AccrueIndex {
        /// New ray-scaled normalized index.
        index: Amount,
    },
}

impl Action {
    /// Operation name, as written in scripts.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddPool { .. } => "add_pool",
            Self::RemovePool { .. } => "remove_pool",
            Self::AddProvider { .. } => "add_provider",
            Self::SetRate { .. } => "set_rate",
            Self::SetPoolPaused { .. } => "set_pool_paused",
            Self::SetPaused { .. } => "set_paused",
            Self::SetFreezePercentage { .. } => "set_freeze_percentage",
            Self::SetMeltDownAt { .. } => "set_melt_down_at",
            Self::SetPoolFreeze { .. } => "set_pool_freeze",
            Self::SetBaseline { .. } => "set_baseline",
            Self::SetBaseRate { .. } => "set_base_rate",
            Self::SetTeamMember { .. } => "set_team_member",
            Self::RemoveTeamMember { .. } => "remove_team_member",
            Self::SetTreasury { .. } => "set_treasury",
            Self::BalanceUpdate { .. } => "balance_update",
            Self::Claim { .. } => "claim",
            Self::AddPermitSigner { .. } => "add_permit_signer",
            Self::Permit { .. } => "permit",
            Self::Mint { .. } => "mint",
            Self::Lock { .. } => "lock",
            Self::RedeemLock { .. } => "redeem_lock",
            Self::SetBoostPool { .. } => "set_boost_pool",
            Self::SetBoostFactor { .. } => "set_boost_factor",
            Self::SetExcessTarget { .. } => "set_excess_target",
            Self::SweepExcess => "sweep_excess",
            Self::BindVault { .. } => "bind_vault",
            Self::MintUnderlying { .. } => "mint_underlying",
            Self::Stake { .. } => "stake",
            Self::Cooldown { .. } => "cooldown",
            Self::Redeem { .. } => "redeem",
            Self::TransferShares { .. } => "transfer_shares",
            Self::Slash { .. } => "slash",
            Self::AccrueIndex { .. } => "accrue_index",
        }
    }
}

/// Parse a script from JSON.
pub fn parse(json: &str) -> serde_json::Result<Script> {
    serde_json::from_str(json)
}
