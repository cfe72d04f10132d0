//! Engine configuration file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tally_locker::LockerParams;
use tally_rewards::{BoosterParams, FreezeSchedule};
use tally_vault::{CooldownParams, VaultParams};

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Reward controller settings.
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Booster settings.
    #[serde(default)]
    pub booster: BoosterConfig,
    /// Token locker settings.
    #[serde(default)]
    pub locker: LockerConfig,
    /// Staking vault settings.
    #[serde(default)]
    pub vault: VaultConfig,
    /// Advanced settings.
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Reward controller configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Share of drained reward that is frozen, in bps.
    #[serde(default)]
    pub freeze_percentage: u32,
    /// Tick at which frozen reward is fully released.
    #[serde(default)]
    pub melt_down_at: u64,
    /// Base rate shared out by pool baseline percentages.
    #[serde(default)]
    pub base_rate: Option<u64>,
    /// Chain identifier permit domains are bound to.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
}

/// Booster configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoosterConfig {
    /// Minimum ticks between two excess sweeps.
    #[serde(default = "default_grace_period")]
    pub grace_period: u64,
}

/// Token locker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockerConfig {
    /// Shortest lock, in ticks.
    #[serde(default = "default_min_period")]
    pub min_period: u64,
    /// Longest lock, in ticks.
    #[serde(default = "default_max_period")]
    pub max_period: u64,
    /// Expiries are rounded up to a multiple of this.
    #[serde(default = "default_period_granularity")]
    pub period_granularity: u64,
}

/// Staking vault configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Ticks between starting a cooldown and the unstake window opening.
    #[serde(default = "default_cooldown_period")]
    pub cooldown_period: u64,
    /// Ticks the unstake window stays open.
    #[serde(default = "default_unstake_window")]
    pub unstake_window: u64,
    /// Largest share of the vault a single slash may take, in bps.
    #[serde(default = "default_max_slashable_bps")]
    pub max_slashable_bps: u32,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Pretty-print the JSON report.
    #[serde(default = "default_true")]
    pub pretty_report: bool,
}

// Default value functions

fn default_chain_id() -> u64 {
    1
}

fn default_grace_period() -> u64 {
    BoosterParams::default().grace_period
}

fn default_min_period() -> u64 {
    LockerParams::default().min_period
}

fn default_max_period() -> u64 {
    LockerParams::default().max_period
}

fn default_period_granularity() -> u64 {
    LockerParams::default().period_granularity
}

fn default_cooldown_period() -> u64 {
    CooldownParams::default().cooldown_period
}

fn default_unstake_window() -> u64 {
    CooldownParams::default().unstake_window
}

fn default_max_slashable_bps() -> u32 {
    VaultParams::default().max_slashable_bps
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for BoosterConfig {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
        }
    }
}

impl Default for LockerConfig {
    fn default() -> Self {
        Self {
            min_period: default_min_period(),
            max_period: default_max_period(),
            period_granularity: default_period_granularity(),
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            cooldown_period: default_cooldown_period(),
            unstake_window: default_unstake_window(),
            max_slashable_bps: default_max_slashable_bps(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            pretty_report: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `path`, or from `TALLY_CONFIG` when `path` is
    /// `None`.
    ///
    /// Falls back to defaults if no file is given or the file does not exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(config_path) = path.map(Path::to_path_buf).or_else(Self::env_path) else {
            return Ok(Self::default());
        };
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: EngineConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    fn env_path() -> Option<PathBuf> {
        std::env::var("TALLY_CONFIG").ok().map(PathBuf::from)
    }

    /// Freeze schedule for the controller.
    pub fn freeze_schedule(&self) -> FreezeSchedule {
        FreezeSchedule {
            freeze_percentage: self.controller.freeze_percentage,
            melt_down_at: self.controller.melt_down_at,
        }
    }

    /// Booster parameters.
    pub fn booster_params(&self) -> BoosterParams {
        BoosterParams {
            grace_period: self.booster.grace_period,
        }
    }

    /// Locker parameters shared by every locker pool.
    pub fn locker_params(&self) -> LockerParams {
        LockerParams {
            min_period: self.locker.min_period,
            max_period: self.locker.max_period,
            period_granularity: self.locker.period_granularity,
        }
    }

    /// Vault parameters.
    pub fn vault_params(&self) -> VaultParams {
        VaultParams {
            cooldown: CooldownParams {
                cooldown_period: self.vault.cooldown_period,
                unstake_window: self.vault.unstake_window,
            },
            max_slashable_bps: self.vault.max_slashable_bps,
        }
    }
}
