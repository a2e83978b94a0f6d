//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section carries serde defaults so a minimal file (agent name
//! plus one venue) is enough to start a paper session.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::engine::blocks::BlockConfig;
use crate::engine::executor::RouterConfig;
use crate::engine::momentum::MomentumConfig;
use crate::engine::scanner::ScannerConfig;
use crate::engine::scheduler::SchedulerConfig;
use crate::engine::validator::ValidatorConfig;
use crate::signals::SignalsConfig;
use crate::strategy::cost::CostConfig;
use crate::strategy::gate::GateConfig;
use crate::strategy::paths::LedgerConfig;
use crate::types::AssetRegistry;
use crate::venues::minimums::MinimumConfig;
use crate::venues::VenueConfig;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub momentum: MomentumConfig,
    #[serde(default)]
    pub cost: CostConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub minimums: MinimumConfig,
    #[serde(default)]
    pub blocks: BlockConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub venues: Vec<VenueConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Pause between the end of one cycle and the start of the next.
    #[serde(default = "default_cycle_delay_ms")]
    pub cycle_delay_ms: u64,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default = "default_ledger_file")]
    pub ledger_file: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

fn default_cycle_delay_ms() -> u64 {
    5_000
}

fn default_state_file() -> String {
    "hopper_state.json".to_string()
}

fn default_ledger_file() -> String {
    "hopper_paths.json".to_string()
}

fn default_audit_file() -> String {
    "hopper_audit.jsonl".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AssetsConfig {
    pub stablecoins: Vec<String>,
    pub majors: Vec<String>,
    pub memes: Vec<String>,
    /// Hop asset for conversions without a direct pair.
    pub intermediate: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        let s = |v: &[&str]| v.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        Self {
            stablecoins: s(&["USDT", "USDC", "DAI", "FDUSD", "USD"]),
            majors: s(&["BTC", "ETH"]),
            memes: s(&["DOGE", "SHIB", "PEPE", "BONK", "WIF", "FLOKI"]),
            intermediate: "USDT".to_string(),
        }
    }
}

impl AssetsConfig {
    pub fn registry(&self) -> AssetRegistry {
        AssetRegistry::new(&self.stablecoins, &self.majors, &self.memes, &self.intermediate)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8088,
        }
    }
}

/// Structured configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("no enabled venues configured")]
    NoVenues,

    #[error("duplicate venue name: {0}")]
    DuplicateVenue(String),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the engine unsafe or meaningless.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let enabled: Vec<_> = self.venues.iter().filter(|v| v.enabled).collect();
        if enabled.is_empty() {
            return Err(ConfigError::NoVenues);
        }
        let mut seen = std::collections::HashSet::new();
        for v in &self.venues {
            if !seen.insert(v.name.as_str()) {
                return Err(ConfigError::DuplicateVenue(v.name.clone()));
            }
            if !(0.0..0.1).contains(&v.taker_fee_pct) {
                return Err(invalid("venues.taker_fee_pct", format!("{} out of [0, 0.1)", v.taker_fee_pct)));
            }
            for pair in &v.pairs {
                pair.parse::<crate::types::Pair>()
                    .map_err(|e| invalid("venues.pairs", e.to_string()))?;
            }
        }
        if !(0.5..=1.0).contains(&self.router.safety_fraction) {
            return Err(invalid("router.safety_fraction", "must be within [0.5, 1.0]"));
        }
        if self.gate.epsilon_usd < 0.0 {
            return Err(invalid("gate.epsilon_usd", "must be non-negative"));
        }
        if self.gate.max_spread_pct <= 0.0 {
            return Err(invalid("gate.max_spread_pct", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.gate.min_p_win) {
            return Err(invalid("gate.min_p_win", "must be a probability"));
        }
        if self.ledger.block_threshold == 0 {
            return Err(invalid("ledger.block_threshold", "must be at least 1"));
        }
        if self.validator.pnl_floor >= self.validator.pnl_ceiling {
            return Err(invalid("validator.pnl_floor", "must be below pnl_ceiling"));
        }
        if self.momentum.window_secs <= self.momentum.min_elapsed_secs {
            return Err(invalid("momentum.window_secs", "must exceed min_elapsed_secs"));
        }
        if self.cost.monte_carlo.enabled && self.cost.monte_carlo.samples == 0 {
            return Err(invalid("cost.monte_carlo.samples", "must be positive when enabled"));
        }
        Ok(())
    }
}
