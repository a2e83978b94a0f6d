//! Shared types for the HOPPER engine.
//!
//! These types form the data model used across all modules.
//! They are kept free of engine logic so that venue, strategy,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// Canonical asset symbol (upper-case, trimmed).
pub type Asset = String;

/// Per-venue holdings keyed by asset.
pub type Balances = HashMap<Asset, f64>;

/// Normalise a raw symbol into its canonical form.
pub fn canonical(symbol: &str) -> Asset {
    symbol.trim().to_uppercase()
}

/// Volatility class used by the spread table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    Stablecoin,
    Major,
    Altcoin,
    Meme,
}

impl AssetClass {
    /// Classes whose conversions are charged spread on both legs.
    pub fn is_high_volatility(&self) -> bool {
        matches!(self, AssetClass::Meme)
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetClass::Stablecoin => write!(f, "stablecoin"),
            AssetClass::Major => write!(f, "major"),
            AssetClass::Altcoin => write!(f, "altcoin"),
            AssetClass::Meme => write!(f, "meme"),
        }
    }
}

/// Read-only registry classifying every known asset.
///
/// Built once by the composition root from `[assets]` and passed by
/// reference; anything not listed is an altcoin.
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    stablecoins: HashSet<Asset>,
    majors: HashSet<Asset>,
    memes: HashSet<Asset>,
    intermediate: Asset,
}

impl AssetRegistry {
    pub fn new(
        stablecoins: &[String],
        majors: &[String],
        memes: &[String],
        intermediate: &str,
    ) -> Self {
        Self {
            stablecoins: stablecoins.iter().map(|s| canonical(s)).collect(),
            majors: majors.iter().map(|s| canonical(s)).collect(),
            memes: memes.iter().map(|s| canonical(s)).collect(),
            intermediate: canonical(intermediate),
        }
    }

    pub fn classify(&self, asset: &str) -> AssetClass {
        let asset = canonical(asset);
        if self.stablecoins.contains(&asset) {
            AssetClass::Stablecoin
        } else if self.majors.contains(&asset) {
            AssetClass::Major
        } else if self.memes.contains(&asset) {
            AssetClass::Meme
        } else {
            AssetClass::Altcoin
        }
    }

    pub fn is_stablecoin(&self, asset: &str) -> bool {
        self.classify(asset) == AssetClass::Stablecoin
    }

    /// The fixed hop asset used when no direct pair exists.
    pub fn intermediate(&self) -> &str {
        &self.intermediate
    }

    pub fn stablecoins(&self) -> impl Iterator<Item = &Asset> {
        self.stablecoins.iter()
    }
}

impl Default for AssetRegistry {
    fn default() -> Self {
        let s = |v: &[&str]| v.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        Self::new(
            &s(&["USDT", "USDC", "DAI", "FDUSD", "USD"]),
            &s(&["BTC", "ETH"]),
            &s(&["DOGE", "SHIB", "PEPE", "BONK", "WIF", "FLOKI"]),
            "USDT",
        )
    }
}

// ---------------------------------------------------------------------------
// Pairs, sides, ticks
// ---------------------------------------------------------------------------

/// A trading pair: `base` priced in `quote`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pair {
    pub base: Asset,
    pub quote: Asset,
}

impl Pair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: canonical(base),
            quote: canonical(quote),
        }
    }

    pub fn contains(&self, asset: &str) -> bool {
        self.base == asset || self.quote == asset
    }

    /// The side of the pair opposite `asset`, if `asset` is in the pair.
    pub fn counter(&self, asset: &str) -> Option<&Asset> {
        if self.base == asset {
            Some(&self.quote)
        } else if self.quote == asset {
            Some(&self.base)
        } else {
            None
        }
    }

    /// Order side that spends `asset`.
    pub fn side_spending(&self, asset: &str) -> Option<Side> {
        if self.base == asset {
            Some(Side::Sell)
        } else if self.quote == asset {
            Some(Side::Buy)
        } else {
            None
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for Pair {
    type Err = anyhow::Error;

    /// Accepts `BASE/QUOTE` or `BASE-QUOTE`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(['/', '-']);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(b), Some(q), None) if !b.trim().is_empty() && !q.trim().is_empty() => {
                Ok(Pair::new(b, q))
            }
            _ => Err(anyhow::anyhow!("Invalid pair symbol: {s}")),
        }
    }
}

/// Order direction, always expressed against the pair's base asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// One quote snapshot for a pair on a venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTick {
    pub venue: String,
    pub pair: Pair,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    /// 24h volume in quote units.
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

impl PriceTick {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Relative bid/ask spread (0.01 = 1%).
    pub fn spread_pct(&self) -> f64 {
        let mid = self.mid();
        if mid <= 0.0 {
            return f64::INFINITY;
        }
        (self.ask - self.bid) / mid
    }

    /// A tick is usable only with positive, uncrossed quotes.
    pub fn is_valid(&self) -> bool {
        self.bid.is_finite() && self.ask.is_finite() && self.bid > 0.0 && self.ask >= self.bid
    }
}

/// Venue-published trading limits for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymbolFilters {
    pub min_qty: f64,
    pub min_notional: f64,
    /// Quantity increment; 0 means unrestricted.
    pub step_size: f64,
}

impl Default for SymbolFilters {
    fn default() -> Self {
        Self {
            min_qty: 0.0,
            min_notional: 0.0,
            step_size: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Venue snapshot
// ---------------------------------------------------------------------------

/// Balances and quotes for one venue, captured once per cycle.
///
/// Scanning treats a snapshot as read-only.
#[derive(Debug, Clone)]
pub struct VenueSnapshot {
    pub venue: String,
    pub balances: Balances,
    pub tickers: HashMap<Pair, PriceTick>,
    pub taken_at: DateTime<Utc>,
}

impl VenueSnapshot {
    pub fn new(venue: &str) -> Self {
        Self {
            venue: venue.to_string(),
            balances: HashMap::new(),
            tickers: HashMap::new(),
            taken_at: Utc::now(),
        }
    }

    /// Find a listed pair joining `a` and `b`, in either orientation.
    pub fn find_pair(&self, a: &str, b: &str) -> Option<&Pair> {
        self.tickers
            .keys()
            .find(|p| (p.base == a && p.quote == b) || (p.base == b && p.quote == a))
    }

    pub fn ticker(&self, pair: &Pair) -> Option<&PriceTick> {
        self.tickers.get(pair).filter(|t| t.is_valid())
    }

    /// Every asset that appears in at least one listed pair.
    pub fn tradable_assets(&self) -> BTreeSet<Asset> {
        self.tickers
            .keys()
            .flat_map(|p| [p.base.clone(), p.quote.clone()])
            .collect()
    }

    /// USD price for an asset. Stablecoins are 1.0; others are priced
    /// through a stablecoin-quoted pair, directly or one hop away.
    pub fn usd_price(&self, asset: &str, registry: &AssetRegistry) -> Option<f64> {
        if registry.is_stablecoin(asset) {
            return Some(1.0);
        }
        let direct = self.tickers.values().find(|t| {
            t.is_valid() && t.pair.base == asset && registry.is_stablecoin(&t.pair.quote)
        });
        if let Some(t) = direct {
            return Some(t.mid());
        }
        // One hop: asset/X where X has a stablecoin quote.
        self.tickers
            .values()
            .filter(|t| t.is_valid() && t.pair.base == asset)
            .find_map(|t| {
                let quote_usd = self.tickers.values().find(|q| {
                    q.is_valid() && q.pair.base == t.pair.quote && registry.is_stablecoin(&q.pair.quote)
                })?;
                Some(t.mid() * quote_usd.mid())
            })
    }

    /// USD prices for every tradable or held asset that can be priced.
    pub fn usd_prices(&self, registry: &AssetRegistry) -> HashMap<Asset, f64> {
        let mut assets = self.tradable_assets();
        assets.extend(self.balances.keys().cloned());
        assets
            .into_iter()
            .filter_map(|a| self.usd_price(&a, registry).map(|p| (a, p)))
            .collect()
    }

    pub fn balance(&self, asset: &str) -> f64 {
        self.balances.get(asset).copied().unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Key for historical learning: (source, target, venue).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathKey {
    pub source: Asset,
    pub target: Asset,
    pub venue: String,
}

impl PathKey {
    pub fn new(source: &str, target: &str, venue: &str) -> Self {
        Self {
            source: canonical(source),
            target: canonical(target),
            venue: venue.to_string(),
        }
    }

    pub fn reverse(&self) -> Self {
        Self {
            source: self.target.clone(),
            target: self.source.clone(),
            venue: self.venue.clone(),
        }
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}->{}", self.venue, self.source, self.target)
    }
}

/// Win/loss history for one path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathStats {
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub consecutive_losses: u32,
    pub total_profit: f64,
    /// Cycle at which a loss-streak block lifts.
    #[serde(default)]
    pub blocked_until: Option<u64>,
    /// Cycle at which a block mirrored from the reverse path lifts.
    #[serde(default)]
    pub mirrored_until: Option<u64>,
    /// EWMA of observed slippage (fraction of notional).
    #[serde(default)]
    pub slippage_mean: f64,
    /// EWMA variance of observed slippage.
    #[serde(default)]
    pub slippage_var: f64,
    #[serde(default)]
    pub slippage_samples: u64,
    /// Outlier results excluded from the aggregates above.
    #[serde(default)]
    pub anomalies: u64,
}

impl PathStats {
    /// Fraction of trades won; `None` before the first trade.
    pub fn win_rate(&self) -> Option<f64> {
        if self.trades == 0 {
            None
        } else {
            Some(self.wins as f64 / self.trades as f64)
        }
    }
}

impl fmt::Display for PathStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trades={} W{}/L{} streak={} profit=${:.2}",
            self.trades, self.wins, self.losses, self.consecutive_losses, self.total_profit,
        )?;
        if let Some(until) = self.blocked_until {
            write!(f, " blocked_until={until}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Opportunities
// ---------------------------------------------------------------------------

/// How a conversion reaches its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    Direct { pair: Pair },
    Via { intermediate: Asset, first: Pair, second: Pair },
}

impl Route {
    pub fn legs(&self) -> usize {
        match self {
            Route::Direct { .. } => 1,
            Route::Via { .. } => 2,
        }
    }

    pub fn pairs(&self) -> Vec<&Pair> {
        match self {
            Route::Direct { pair } => vec![pair],
            Route::Via { first, second, .. } => vec![first, second],
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Direct { pair } => write!(f, "{pair}"),
            Route::Via { intermediate, first, second } => {
                write!(f, "{first} -> {second} (via {intermediate})")
            }
        }
    }
}

/// Fee/spread/slippage decomposition of a trade's expected cost.
/// All components are fractions of notional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub fee_pct: f64,
    pub spread_pct: f64,
    pub slippage_pct: f64,
    pub buffer_pct: f64,
    pub total_pct: f64,
}

impl CostBreakdown {
    pub fn total_usd(&self, notional: f64) -> f64 {
        self.total_pct * notional
    }
}

impl fmt::Display for CostBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fee={:.3}% spread={:.3}% slip={:.3}% buf={:.3}% total={:.3}%",
            self.fee_pct * 100.0,
            self.spread_pct * 100.0,
            self.slippage_pct * 100.0,
            self.buffer_pct * 100.0,
            self.total_pct * 100.0,
        )
    }
}

/// A candidate conversion found during one scan cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOpportunity {
    pub venue: String,
    pub source: Asset,
    pub target: Asset,
    pub route: Route,
    /// Quantity of `source` to convert.
    pub amount: f64,
    /// USD value of `amount`.
    pub from_value: f64,
    /// Base-asset quantity of the first leg.
    pub first_leg_qty: f64,
    pub source_price_usd: f64,
    pub target_price_usd: f64,
    pub source_momentum: f64,
    pub target_momentum: f64,
    /// Measured spread of each leg's pair.
    pub leg_spreads: Vec<(Pair, f64)>,
    pub forecast_gross_edge: f64,
    pub cost: CostBreakdown,
    /// Conservative cost in USD.
    pub estimated_cost: f64,
    pub net_edge: f64,
    /// Monte-Carlo probability of positive net profit, when enabled.
    pub p_win: Option<f64>,
    pub combined_score: f64,
    pub cycle: u64,
}

impl ConversionOpportunity {
    pub fn path_key(&self) -> PathKey {
        PathKey::new(&self.source, &self.target, &self.venue)
    }

    pub fn max_spread_pct(&self) -> f64 {
        self.leg_spreads.iter().map(|(_, s)| *s).fold(0.0, f64::max)
    }

    pub fn first_pair(&self) -> &Pair {
        match &self.route {
            Route::Direct { pair } => pair,
            Route::Via { first, .. } => first,
        }
    }
}

impl fmt::Display for ConversionOpportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} -> {} ${:.2} | gross=${:.4} cost=${:.4} net=${:.4} score={:.3}",
            self.venue,
            self.source,
            self.target,
            self.from_value,
            self.forecast_gross_edge,
            self.estimated_cost,
            self.net_edge,
            self.combined_score,
        )
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// One atomic order inside an execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub pair: Pair,
    pub venue: String,
    pub side: Side,
    /// Base-asset quantity.
    pub quantity: f64,
    /// Quote price the leg was planned against (bid for sells, ask for buys).
    pub reference_price: f64,
    pub asset_in: Asset,
    pub asset_out: Asset,
    /// Planned USD notional.
    pub notional_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub venue: String,
    pub legs: Vec<Leg>,
}

/// Raw acknowledgement returned by a venue for a submitted order.
/// Field names inside `payload` are venue specific.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub venue: String,
    pub pair: Pair,
    pub side: Side,
    pub requested_qty: f64,
    pub payload: serde_json::Value,
}

/// A parsed order fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFill {
    pub order_id: String,
    pub venue: String,
    pub pair: Pair,
    pub side: Side,
    pub filled_qty: f64,
    pub avg_price: f64,
    pub fee_usd: f64,
    pub timestamp: DateTime<Utc>,
}

impl OrderFill {
    /// Quote amount exchanged.
    pub fn quote_amount(&self) -> f64 {
        self.filled_qty * self.avg_price
    }

    /// Signed balance changes caused by this fill (fees excluded).
    pub fn flows(&self) -> [(Asset, f64); 2] {
        let quote = self.quote_amount();
        match self.side {
            Side::Buy => [
                (self.pair.base.clone(), self.filled_qty),
                (self.pair.quote.clone(), -quote),
            ],
            Side::Sell => [
                (self.pair.base.clone(), -self.filled_qty),
                (self.pair.quote.clone(), quote),
            ],
        }
    }
}

impl fmt::Display for OrderFill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {:.8} @ {:.8} (fee ${:.4}) [{}]",
            self.venue, self.side, self.pair, self.filled_qty, self.avg_price, self.fee_usd, self.order_id,
        )
    }
}

/// Reference to the opportunity a result was produced for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityRef {
    pub venue: String,
    pub source: Asset,
    pub target: Asset,
    pub amount: f64,
    pub from_value: f64,
    pub forecast_gross_edge: f64,
    pub forecast_net_edge: f64,
    pub cycle: u64,
}

impl From<&ConversionOpportunity> for OpportunityRef {
    fn from(o: &ConversionOpportunity) -> Self {
        Self {
            venue: o.venue.clone(),
            source: o.source.clone(),
            target: o.target.clone(),
            amount: o.amount,
            from_value: o.from_value,
            forecast_gross_edge: o.forecast_gross_edge,
            forecast_net_edge: o.net_edge,
            cycle: o.cycle,
        }
    }
}

/// Audit record for one executed (or attempted) opportunity.
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub id: String,
    pub opportunity: OpportunityRef,
    pub fills: Vec<OrderFill>,
    pub sold_value: f64,
    pub bought_value: f64,
    pub fees_usd: f64,
    /// P&L before outlier clamping.
    pub raw_pnl: f64,
    pub realized_pnl: f64,
    pub verified: bool,
    pub outlier: bool,
    pub discrepancy_pct: f64,
    pub discrepancy_flagged: bool,
    pub failure: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ConversionResult {
    pub fn path_key(&self) -> PathKey {
        PathKey::new(&self.opportunity.source, &self.opportunity.target, &self.opportunity.venue)
    }

    pub fn order_ids(&self) -> Vec<&str> {
        self.fills.iter().map(|f| f.order_id.as_str()).collect()
    }
}

impl fmt::Display for ConversionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} -> {} pnl=${:.4} forecast=${:.4} verified={} outlier={} drift={:.1}%",
            self.opportunity.venue,
            self.opportunity.source,
            self.opportunity.target,
            self.realized_pnl,
            self.opportunity.forecast_net_edge,
            self.verified,
            self.outlier,
            self.discrepancy_pct,
        )
    }
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Persistent session counters, saved after each cycle.
///
/// `cycle_count` must survive restarts because ledger block windows
/// are measured in cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub cycle_count: u64,
    pub executions: u64,
    pub verified: u64,
    pub wins: u64,
    pub losses: u64,
    pub outliers: u64,
    pub realized_pnl: f64,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            cycle_count: 0,
            executions: 0,
            verified: 0,
            wins: 0,
            losses: 0,
            outliers: 0,
            realized_pnl: 0.0,
            start_time: Utc::now(),
            last_cycle_at: None,
        }
    }

    /// Win rate as a percentage. Returns 0.0 if nothing was executed.
    pub fn win_rate(&self) -> f64 {
        let resolved = self.wins + self.losses;
        if resolved == 0 {
            0.0
        } else {
            (self.wins as f64 / resolved as f64) * 100.0
        }
    }

    /// Fold an execution result into the counters.
    pub fn record(&mut self, result: &ConversionResult, win_threshold: f64) {
        self.executions += 1;
        if result.verified {
            self.verified += 1;
        }
        if result.outlier {
            self.outliers += 1;
            if result.verified {
                return;
            }
        }
        self.realized_pnl += result.realized_pnl;
        if result.verified && result.realized_pnl >= win_threshold {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.start_time
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycles={} executions={} (W{}/L{}) win_rate={:.1}% pnl=${:.2} outliers={}",
            self.cycle_count,
            self.executions,
            self.wins,
            self.losses,
            self.win_rate(),
            self.realized_pnl,
            self.outliers,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures raised while talking to venues or executing a plan.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TradeError {
    #[error("Network error ({venue}): {message}")]
    Network { venue: String, message: String },

    #[error("Minimum not met on {venue} {pair}: notional ${notional:.2} (min ${min_notional:.2}), qty {quantity} (min {min_qty})")]
    MinimumNotMet {
        venue: String,
        pair: Pair,
        notional: f64,
        min_notional: f64,
        quantity: f64,
        min_qty: f64,
    },

    #[error("Insufficient balance on {venue}: need {needed:.8} {asset}, have {available:.8}")]
    InsufficientBalance {
        venue: String,
        asset: Asset,
        needed: f64,
        available: f64,
    },

    #[error("Partial fill on {venue} {pair}: filled {filled} of {requested}")]
    PartialFill {
        venue: String,
        pair: Pair,
        filled: f64,
        requested: f64,
    },

    #[error("Order rejected on {venue} {pair}: {message}")]
    OrderRejected {
        venue: String,
        pair: Pair,
        message: String,
    },

    #[error("No route from {from} to {to} on {venue}")]
    NoRoute { venue: String, from: Asset, to: Asset },

    #[error("Data anomaly: {0}")]
    DataAnomaly(String),
}

impl TradeError {
    /// Transient failures worth retrying on a later cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TradeError::Network { .. })
    }

    /// Rejections raised before any order could reach the venue.
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self,
            TradeError::MinimumNotMet { .. }
                | TradeError::InsufficientBalance { .. }
                | TradeError::NoRoute { .. }
        )
    }

    /// A venue rejection whose message says the order was under a size
    /// or notional floor.
    pub fn is_minimum_rejection(&self) -> bool {
        const MARKERS: [&str; 5] = ["notional", "lot_size", "minimum", "too small", "min qty"];
        match self {
            TradeError::MinimumNotMet { .. } => true,
            TradeError::OrderRejected { message, .. } => {
                let message = message.to_ascii_lowercase();
                MARKERS.iter().any(|m| message.contains(m))
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
