//! Venue integrations.
//!
//! Defines the `VenueClient` trait (the boundary to per-exchange
//! clients), per-venue configuration, and the built-in paper venue.
//! Real exchange clients live outside this crate and are wired in by
//! implementing `VenueClient`.

pub mod minimums;
pub mod paper;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{canonical, Balances, OrderAck, Pair, PriceTick, Side, SymbolFilters};

/// Abstraction over a trading venue.
///
/// Implementors provide balances, quotes, symbol filters and order
/// placement. Every call is wrapped in a timeout by the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Current holdings per asset.
    async fn get_balances(&self) -> Result<Balances>;

    /// Latest quote for a pair.
    async fn get_ticker(&self, pair: &Pair) -> Result<PriceTick>;

    /// Published minimum quantity/notional and step size for a pair.
    async fn get_symbol_filters(&self, pair: &Pair) -> Result<SymbolFilters>;

    /// Submit a market order for `quantity` of the pair's base asset.
    /// Returns the venue's raw acknowledgement.
    async fn place_order(&self, pair: &Pair, side: Side, quantity: f64) -> Result<OrderAck>;
}

/// Which client implementation a configured venue needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueKind {
    /// In-memory simulated venue, always available.
    #[default]
    Paper,
    /// Client supplied by the embedding application.
    External,
}

impl VenueKind {
    /// Whether this binary carries a client for the kind.
    pub fn has_builtin_client(&self) -> bool {
        matches!(self, VenueKind::Paper)
    }
}

/// JSON field names used by a venue's order acknowledgements.
/// Dotted names address nested objects (`"fills.0.price"`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FillFields {
    pub order_id: String,
    pub filled_qty: String,
    pub avg_price: String,
    pub fee_usd: String,
}

impl Default for FillFields {
    fn default() -> Self {
        Self {
            order_id: "orderId".to_string(),
            filled_qty: "executedQty".to_string(),
            avg_price: "avgPrice".to_string(),
            fee_usd: "feeUsd".to_string(),
        }
    }
}

/// Settings for the built-in paper venue.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    /// Starting holdings.
    pub balances: HashMap<String, f64>,
    /// Starting mid prices keyed by pair symbol.
    pub prices: HashMap<String, f64>,
    /// Quoted bid/ask spread around the mid.
    pub spread_pct: f64,
    /// Adverse price move applied to every fill.
    pub slippage_pct: f64,
    /// Maximum random mid move per ticker request.
    pub drift_pct: f64,
    pub step_size: f64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            balances: HashMap::new(),
            prices: HashMap::new(),
            spread_pct: 0.0008,
            slippage_pct: 0.0005,
            drift_pct: 0.002,
            step_size: 0.000_001,
        }
    }
}

/// One configured venue.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    pub name: String,
    #[serde(default)]
    pub kind: VenueKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_taker_fee")]
    pub taker_fee_pct: f64,
    #[serde(default = "default_min_notional")]
    pub min_notional_usd: f64,
    #[serde(default)]
    pub pairs: Vec<String>,
    /// Static per-asset minimum order quantities.
    #[serde(default)]
    pub min_qty: HashMap<String, f64>,
    #[serde(default)]
    pub fill_fields: FillFields,
    #[serde(default)]
    pub paper: PaperConfig,
}

fn default_enabled() -> bool {
    true
}

fn default_taker_fee() -> f64 {
    0.001
}

fn default_min_notional() -> f64 {
    10.0
}

impl VenueConfig {
    /// Configured pairs; malformed entries are rejected by config validation.
    pub fn parsed_pairs(&self) -> Vec<Pair> {
        self.pairs.iter().filter_map(|p| p.parse().ok()).collect()
    }

    pub fn static_min_qty(&self, asset: &str) -> f64 {
        let asset = canonical(asset);
        self.min_qty
            .iter()
            .find(|(k, _)| canonical(k) == asset)
            .map(|(_, v)| *v)
            .unwrap_or(0.0)
    }
}

/// A configured venue paired with its client.
#[derive(Clone)]
pub struct VenueHandle {
    pub config: VenueConfig,
    pub client: Arc<dyn VenueClient>,
}

impl VenueHandle {
    pub fn new(config: VenueConfig, client: Arc<dyn VenueClient>) -> Self {
        Self { config, client }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
}

impl std::fmt::Debug for VenueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueHandle")
            .field("name", &self.config.name)
            .field("kind", &self.config.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn venue_toml(extra: &str) -> VenueConfig {
        toml::from_str(&format!("name = \"v\"\npairs = [\"ETH/USDT\", \"bad\"]\n{extra}")).unwrap()
    }

    #[test]
    fn test_venue_defaults() {
        let v = venue_toml("");
        assert_eq!(v.kind, VenueKind::Paper);
        assert!(v.enabled);
        assert_eq!(v.taker_fee_pct, 0.001);
        assert_eq!(v.min_notional_usd, 10.0);
        assert_eq!(v.fill_fields, FillFields::default());
    }

    #[test]
    fn test_parsed_pairs_skips_malformed() {
        let v = venue_toml("");
        assert_eq!(v.parsed_pairs(), vec![Pair::new("ETH", "USDT")]);
    }

    #[test]
    fn test_static_min_qty_case_insensitive() {
        let v = venue_toml("[min_qty]\neth = 0.005\n");
        assert_eq!(v.static_min_qty("ETH"), 0.005);
        assert_eq!(v.static_min_qty("BTC"), 0.0);
    }

    #[test]
    fn test_kind_capabilities() {
        assert!(VenueKind::Paper.has_builtin_client());
        assert!(!VenueKind::External.has_builtin_client());
        let v = venue_toml("kind = \"external\"");
        assert_eq!(v.kind, VenueKind::External);
    }
}
