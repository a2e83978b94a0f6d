//! Scheduler / dispatcher.
//!
//! Owns every piece of mutable engine state and drives one cycle at a
//! time: snapshot venues concurrently, feed momentum, scan, rank, gate,
//! and commit at most one execution per venue. Scanning works on
//! read-only snapshots; balances, ledger, blocks and the in-flight set
//! are only written from the commit step.

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::engine::blocks::BlockBook;
use crate::engine::executor::ExecutionRouter;
use crate::engine::momentum::MomentumTracker;
use crate::engine::scanner::{OpportunityScanner, ScanInputs};
use crate::engine::validator::OrderValidator;
use crate::signals::SignalRegistry;
use crate::storage::AuditLog;
use crate::strategy::cost::CostEstimator;
use crate::strategy::gate::{GateRejection, ProfitGate};
use crate::strategy::paths::PathLedger;
use crate::types::{
    Asset, AssetRegistry, Balances, ConversionOpportunity, ConversionResult, OrderFill, Side, SessionState,
    TradeError, VenueSnapshot,
};
use crate::venues::minimums::MinimumBook;
use crate::venues::VenueHandle;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// One venue per cycle, its best opportunity only.
    #[default]
    RoundRobin,
    /// Every venue per cycle, first approved opportunity across all.
    Race,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ranking {
    #[default]
    NetEdge,
    CombinedScore,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub enabled: bool,
    /// Conversions per chain, the first one included.
    pub max_hops: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_hops: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub policy: Policy,
    pub ranking: Ranking,
    /// Timeout for each venue call while snapshotting.
    pub request_timeout_ms: u64,
    pub chain: ChainConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: Policy::RoundRobin,
            ranking: Ranking::NetEdge,
            request_timeout_ms: 5_000,
            chain: ChainConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Reachability of one venue as of the latest cycle that polled it.
#[derive(Debug, Clone, Serialize)]
pub struct VenueHealth {
    pub name: String,
    pub reachable: bool,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_ok: Option<DateTime<Utc>>,
    pub pairs_quoted: usize,
}

impl VenueHealth {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reachable: false,
            consecutive_failures: 0,
            last_error: None,
            last_ok: None,
            pairs_quoted: 0,
        }
    }
}

/// Per-cycle counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub venues_scanned: usize,
    pub venues_reachable: usize,
    pub opportunities: usize,
    pub approvals: usize,
    pub rejections: BTreeMap<String, u64>,
    pub executions: usize,
    pub verified: usize,
    pub chain_hops: usize,
    pub realized_pnl: f64,
}

impl CycleReport {
    fn reject(&mut self, kind: &str) {
        *self.rejections.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn total_rejections(&self) -> u64 {
        self.rejections.values().sum()
    }
}

/// Short label for a router error, used in the rejection counters.
fn error_kind(e: &TradeError) -> &'static str {
    match e {
        TradeError::Network { .. } => "network",
        TradeError::MinimumNotMet { .. } => "minimum_not_met",
        TradeError::InsufficientBalance { .. } => "insufficient_balance",
        TradeError::PartialFill { .. } => "partial_fill",
        TradeError::OrderRejected { .. } => "order_rejected",
        TradeError::NoRoute { .. } => "no_route",
        TradeError::DataAnomaly(_) => "data_anomaly",
    }
}

/// Sort best first by the configured key; ties fall back to net edge.
pub fn rank(opps: &mut [ConversionOpportunity], ranking: Ranking) {
    let key = |o: &ConversionOpportunity| match ranking {
        Ranking::NetEdge => o.net_edge,
        Ranking::CombinedScore => o.combined_score,
    };
    opps.sort_by(|a, b| key(b).total_cmp(&key(a)).then(b.net_edge.total_cmp(&a.net_edge)));
}

/// Sleep `delay` after a cycle has finished. Returns false if
/// `shutdown` resolves first.
pub async fn pause_between_cycles<F>(delay: Duration, shutdown: &mut F) -> bool
where
    F: Future + Unpin,
{
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown => false,
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    config: SchedulerConfig,
    venues: Vec<VenueHandle>,
    registry: AssetRegistry,
    momentum: MomentumTracker,
    scanner: OpportunityScanner,
    cost: CostEstimator,
    gate: ProfitGate,
    router: ExecutionRouter,
    validator: OrderValidator,
    signals: SignalRegistry,
    ledger: PathLedger,
    minimums: MinimumBook,
    blocks: BlockBook,
    audit: Option<AuditLog>,
    state: SessionState,
    cursor: usize,
    in_flight: HashSet<String>,
    balances: HashMap<String, Balances>,
    health: BTreeMap<String, VenueHealth>,
}

impl Scheduler {
    /// Wire every engine component from configuration.
    pub fn new(
        cfg: &AppConfig,
        venues: Vec<VenueHandle>,
        ledger: PathLedger,
        state: SessionState,
        audit: Option<AuditLog>,
    ) -> Result<Self> {
        let registry = cfg.assets.registry();
        let signals = SignalRegistry::from_config(&cfg.signals)?;
        let configs: Vec<_> = venues.iter().map(|v| v.config.clone()).collect();
        let health = venues
            .iter()
            .map(|v| (v.name().to_string(), VenueHealth::new(v.name())))
            .collect();
        let cost = CostEstimator::new(cfg.cost.clone(), registry.clone());
        let gate = ProfitGate::new(cfg.gate.clone(), cost.monte_carlo_enabled());

        Ok(Self {
            config: cfg.scheduler.clone(),
            momentum: MomentumTracker::new(cfg.momentum.clone()),
            scanner: OpportunityScanner::new(cfg.scanner.clone(), registry.clone()),
            cost,
            gate,
            router: ExecutionRouter::new(cfg.router.clone(), registry.clone()),
            validator: OrderValidator::new(cfg.validator.clone(), registry.clone()),
            signals,
            ledger,
            minimums: MinimumBook::from_venues(cfg.minimums.clone(), &configs),
            blocks: BlockBook::new(cfg.blocks.clone()),
            audit,
            state,
            cursor: 0,
            in_flight: HashSet::new(),
            balances: HashMap::new(),
            health,
            venues,
            registry,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn ledger(&self) -> &PathLedger {
        &self.ledger
    }

    pub fn momentum(&self) -> &MomentumTracker {
        &self.momentum
    }

    pub fn minimums(&self) -> &MinimumBook {
        &self.minimums
    }

    pub fn blocks(&self) -> &BlockBook {
        &self.blocks
    }

    pub fn venue_health(&self) -> Vec<VenueHealth> {
        self.health.values().cloned().collect()
    }

    /// Cached balances for a venue as of the last snapshot plus commits since.
    pub fn balances(&self, venue: &str) -> Option<&Balances> {
        self.balances.get(venue)
    }

    /// Persist the ledger. Called on shutdown and by tests.
    pub fn flush(&mut self) -> Result<()> {
        self.ledger.save()
    }

    // -- Snapshots ---------------------------------------------------------

    async fn snapshot_venue(venue: VenueHandle, timeout: Duration) -> Result<VenueSnapshot, TradeError> {
        let name = venue.name().to_string();
        let network = |message: String| TradeError::Network {
            venue: name.clone(),
            message,
        };

        let balances = tokio::time::timeout(timeout, venue.client.get_balances())
            .await
            .map_err(|_| network("get_balances timed out".to_string()))?
            .map_err(|e| network(format!("get_balances: {e}")))?;

        let pairs = venue.config.parsed_pairs();
        let ticks = join_all(
            pairs
                .iter()
                .map(|p| tokio::time::timeout(timeout, venue.client.get_ticker(p))),
        )
        .await;

        let mut snapshot = VenueSnapshot::new(&name);
        snapshot.balances = balances;
        for (pair, result) in pairs.iter().zip(ticks) {
            match result {
                Ok(Ok(tick)) if tick.is_valid() => {
                    snapshot.tickers.insert(pair.clone(), tick);
                }
                Ok(Ok(_)) => debug!(venue = %name, %pair, "Invalid quote, skipping pair"),
                Ok(Err(e)) => debug!(venue = %name, %pair, error = %e, "Ticker failed, skipping pair"),
                Err(_) => debug!(venue = %name, %pair, "Ticker timed out, skipping pair"),
            }
        }
        if snapshot.tickers.is_empty() && !pairs.is_empty() {
            return Err(network("no pair could be quoted".to_string()));
        }
        Ok(snapshot)
    }

    /// Fetch snapshots for the chosen venues concurrently; unreachable
    /// venues are skipped for this cycle.
    async fn snapshot_venues(&mut self, indices: &[usize]) -> Vec<(usize, VenueSnapshot)> {
        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        let results = join_all(
            indices
                .iter()
                .map(|&i| Self::snapshot_venue(self.venues[i].clone(), timeout)),
        )
        .await;

        let mut out = Vec::new();
        for (&i, result) in indices.iter().zip(results) {
            let name = self.venues[i].name().to_string();
            let health = self
                .health
                .entry(name.clone())
                .or_insert_with(|| VenueHealth::new(&name));
            match result {
                Ok(snapshot) => {
                    health.reachable = true;
                    health.consecutive_failures = 0;
                    health.last_error = None;
                    health.last_ok = Some(Utc::now());
                    health.pairs_quoted = snapshot.tickers.len();
                    self.balances.insert(name, snapshot.balances.clone());
                    out.push((i, snapshot));
                }
                Err(e) => {
                    health.reachable = false;
                    health.consecutive_failures += 1;
                    health.last_error = Some(e.to_string());
                    warn!(venue = %name, error = %e, retryable = e.is_retryable(), "Venue skipped this cycle");
                }
            }
        }
        out
    }

    /// Feed one price per asset (averaged across venues) into momentum.
    fn observe_prices(&self, snapshots: &[(usize, VenueSnapshot)]) -> HashMap<String, HashMap<Asset, f64>> {
        let mut by_venue = HashMap::new();
        let mut merged: HashMap<Asset, (f64, u32)> = HashMap::new();
        for (_, snapshot) in snapshots {
            let prices = snapshot.usd_prices(&self.registry);
            for (asset, price) in &prices {
                let e = merged.entry(asset.clone()).or_insert((0.0, 0));
                e.0 += price;
                e.1 += 1;
            }
            by_venue.insert(snapshot.venue.clone(), prices);
        }
        for (asset, (sum, n)) in merged {
            if !self.registry.is_stablecoin(&asset) {
                self.momentum.update(&asset, sum / n as f64);
            }
        }
        by_venue
    }

    fn scan_snapshot(&self, idx: usize, snapshot: &VenueSnapshot, cycle: u64) -> Vec<ConversionOpportunity> {
        let inputs = ScanInputs {
            momentum: &self.momentum,
            ledger: &self.ledger,
            blocks: &self.blocks,
            minimums: &self.minimums,
            cost: &self.cost,
            signals: &self.signals,
            fee_pct: self.venues[idx].config.taker_fee_pct,
            cycle,
        };
        self.scanner.scan(snapshot, &inputs)
    }

    // -- Cycle -------------------------------------------------------------

    /// Run one full cycle. Errors are absorbed into the report; the
    /// process keeps going.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.state.cycle_count += 1;
        self.state.last_cycle_at = Some(Utc::now());
        let cycle = self.state.cycle_count;
        let mut report = CycleReport {
            cycle,
            ..Default::default()
        };

        let lifted = self.ledger.expire_blocks(cycle);
        if lifted > 0 {
            info!(cycle, lifted, "Path blocks expired");
        }
        self.blocks.expire(cycle);
        self.minimums.expire(cycle);

        if self.venues.is_empty() {
            error!(alert = true, cycle, "No venues configured");
            return report;
        }

        let indices: Vec<usize> = match self.config.policy {
            Policy::RoundRobin => {
                let i = self.cursor % self.venues.len();
                self.cursor = (i + 1) % self.venues.len();
                vec![i]
            }
            Policy::Race => (0..self.venues.len()).collect(),
        };
        report.venues_scanned = indices.len();

        let snapshots = self.snapshot_venues(&indices).await;
        report.venues_reachable = snapshots.len();
        if snapshots.is_empty() {
            error!(
                alert = true,
                cycle,
                venues = report.venues_scanned,
                "No venue reachable this cycle"
            );
            return report;
        }

        let prices = self.observe_prices(&snapshots);

        let mut candidates: Vec<ConversionOpportunity> = snapshots
            .iter()
            .flat_map(|(i, s)| self.scan_snapshot(*i, s, cycle))
            .collect();
        report.opportunities = candidates.len();
        rank(&mut candidates, self.config.ranking);

        if self.config.policy == Policy::RoundRobin {
            candidates.retain(|o| !self.blocks.recently_attempted(&o.venue, &o.source, &o.target, cycle));
            candidates.truncate(1);
        }

        for opp in candidates {
            if self.blocks.recently_attempted(&opp.venue, &opp.source, &opp.target, cycle) {
                report.reject("anti_repeat");
                continue;
            }
            if self.in_flight.contains(&opp.venue) {
                continue;
            }
            if let Err(rejection) = self.check_gate(&opp, cycle) {
                report.reject(rejection.kind());
                continue;
            }
            report.approvals += 1;

            let Some(idx) = self.venues.iter().position(|v| v.name() == opp.venue) else {
                continue;
            };
            let empty = HashMap::new();
            let venue_prices = prices.get(&opp.venue).unwrap_or(&empty);
            let result = self.commit(idx, &opp, venue_prices, cycle, &mut report).await;

            if let Some(result) = result {
                if self.config.policy == Policy::Race && self.config.chain.enabled && result.verified {
                    if let Some((_, snapshot)) = snapshots.iter().find(|(i, _)| *i == idx) {
                        self.chain(idx, &opp, &result, snapshot, venue_prices, cycle, &mut report)
                            .await;
                    }
                }
            }
            break;
        }

        info!(
            cycle,
            venues = report.venues_scanned,
            reachable = report.venues_reachable,
            opportunities = report.opportunities,
            approvals = report.approvals,
            rejections = report.total_rejections(),
            executions = report.executions,
            blocked_paths = self.ledger.blocked_count(cycle),
            pnl = format!("${:.4}", report.realized_pnl),
            "Cycle complete"
        );
        report
    }

    /// Gate an opportunity and turn the rejection into block bookkeeping.
    fn check_gate(&mut self, opp: &ConversionOpportunity, cycle: u64) -> Result<(), GateRejection> {
        let limits = self.minimums.limits(&opp.venue, opp.first_pair(), cycle);
        match self.gate.approve(opp, &limits) {
            Ok(()) => {
                self.blocks.clear_too_small(&opp.venue, &opp.source);
                Ok(())
            }
            Err(rejection) => {
                match &rejection {
                    GateRejection::SpreadTooHigh { asset, .. } => {
                        self.blocks.mark_spread(&opp.venue, asset, cycle);
                    }
                    GateRejection::BelowMinimum { .. } => {
                        self.blocks.record_too_small(&opp.venue, &opp.source, cycle);
                        self.blocks.mark_attempt(&opp.venue, &opp.source, &opp.target, cycle);
                    }
                    _ => {}
                }
                debug!(opportunity = %opp, reason = %rejection, "Gate rejected");
                Err(rejection)
            }
        }
    }

    /// Route, reconcile and book one approved opportunity. Returns the
    /// result when at least one order reached the venue.
    async fn commit(
        &mut self,
        idx: usize,
        opp: &ConversionOpportunity,
        prices: &HashMap<Asset, f64>,
        cycle: u64,
        report: &mut CycleReport,
    ) -> Option<ConversionResult> {
        let venue = self.venues[idx].clone();
        let name = venue.name().to_string();
        if !self.in_flight.insert(name.clone()) {
            return None;
        }
        info!(opportunity = %opp, route = %opp.route, "Executing");
        let exec = self.router.execute(&venue, opp, &self.minimums, cycle).await;
        self.in_flight.remove(&name);

        for (pair, filters) in &exec.fetched_filters {
            self.minimums.update_live(&name, pair, *filters);
        }
        match &exec.error {
            Some(TradeError::MinimumNotMet { pair, notional, .. }) => {
                self.minimums.record_rejection(&name, pair, *notional, cycle);
            }
            Some(e @ TradeError::OrderRejected { pair, .. }) if e.is_minimum_rejection() => {
                let notional = exec
                    .plan
                    .as_ref()
                    .and_then(|p| p.legs.iter().find(|l| &l.pair == pair))
                    .map(|l| l.notional_usd)
                    .unwrap_or(0.0);
                self.minimums.record_rejection(&name, pair, notional, cycle);
            }
            _ => {}
        }

        if !exec.reached_venue() {
            if let Some(e) = &exec.error {
                report.reject(error_kind(e));
                warn!(venue = %name, error = %e, pre_execution = e.is_pre_execution(), "Execution aborted before submission");
            }
            self.blocks.mark_attempt(&name, &opp.source, &opp.target, cycle);
            return None;
        }

        for fill in &exec.fills {
            self.minimums.record_success(&name, &fill.pair);
        }
        self.apply_fills(&name, &exec.fills, venue.config.taker_fee_pct);

        let recon = self.validator.reconcile(opp, &exec, prices);
        self.validator
            .apply(&recon, &mut self.ledger, &mut self.state, self.audit.as_ref(), cycle);

        report.executions += 1;
        report.realized_pnl += recon.result.realized_pnl;
        if recon.result.verified {
            report.verified += 1;
        } else {
            if let Some(e) = &exec.error {
                report.reject(error_kind(e));
            }
            self.blocks.mark_attempt(&name, &opp.source, &opp.target, cycle);
        }
        Some(recon.result)
    }

    /// Apply fill flows to the cached balances; the fee comes out of the
    /// received asset.
    fn apply_fills(&mut self, venue: &str, fills: &[OrderFill], fee_pct: f64) {
        let balances = self.balances.entry(venue.to_string()).or_default();
        for fill in fills {
            let received = match fill.side {
                Side::Buy => &fill.pair.base,
                Side::Sell => &fill.pair.quote,
            };
            for (asset, delta) in fill.flows() {
                let delta = if &asset == received { delta * (1.0 - fee_pct) } else { delta };
                let entry = balances.entry(asset).or_insert(0.0);
                *entry = (*entry + delta).max(0.0);
            }
        }
    }

    /// Keep hopping from the newly acquired asset on the same venue while
    /// the chain's cumulative P&L stays non-negative.
    #[allow(clippy::too_many_arguments)]
    async fn chain(
        &mut self,
        idx: usize,
        first: &ConversionOpportunity,
        first_result: &ConversionResult,
        snapshot: &VenueSnapshot,
        prices: &HashMap<Asset, f64>,
        cycle: u64,
        report: &mut CycleReport,
    ) {
        let mut cumulative = first_result.realized_pnl;
        let mut holding = first.target.clone();
        let mut hops = 1;

        while hops < self.config.chain.max_hops && cumulative >= 0.0 {
            let mut view = snapshot.clone();
            if let Some(cached) = self.balances.get(&view.venue) {
                view.balances = cached.clone();
            }
            view.balances.retain(|asset, _| *asset == holding);

            let mut next_opps = self.scan_snapshot(idx, &view, cycle);
            rank(&mut next_opps, self.config.ranking);
            let mut next = None;
            for opp in next_opps {
                if opp.target == first.source
                    || self.blocks.recently_attempted(&opp.venue, &opp.source, &opp.target, cycle)
                {
                    continue;
                }
                match self.check_gate(&opp, cycle) {
                    Ok(()) => {
                        next = Some(opp);
                        break;
                    }
                    Err(rejection) => report.reject(rejection.kind()),
                }
            }
            let Some(next) = next else {
                debug!(hops, holding = %holding, "Chain ended: no approved hop");
                break;
            };
            report.approvals += 1;

            let Some(result) = self.commit(idx, &next, prices, cycle, report).await else {
                break;
            };
            hops += 1;
            report.chain_hops += 1;
            cumulative += result.realized_pnl;
            info!(hops, cumulative = format!("${:.4}", cumulative), to = %next.target, "Chain hop");
            if !result.verified {
                break;
            }
            holding = next.target.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::paths::LedgerConfig;
    use crate::types::{CostBreakdown, Pair, Route};
    use crate::venues::paper::PaperVenue;
    use std::sync::Arc;

    const CONFIG: &str = r#"
[agent]
name = "test"

[scheduler]
policy = "race"

[momentum]
min_elapsed_secs = 1

[signals]
signals = []
adjusters = []

[[venues]]
name = "paper"
taker_fee_pct = 0.001
min_notional_usd = 10.0
pairs = ["ETH/USDT", "BTC/USDT"]

[venues.paper]
spread_pct = 0.0004
slippage_pct = 0.0
drift_pct = 0.0
step_size = 0.0001

[venues.paper.balances]
USDT = 1000.0

[venues.paper.prices]
"ETH/USDT" = 2000.0
"BTC/USDT" = 60000.0
"#;

    fn scheduler(toml: &str) -> Scheduler {
        let cfg = AppConfig::parse(toml).unwrap();
        let registry = cfg.assets.registry();
        let venues = cfg
            .venues
            .iter()
            .map(|v| {
                let client = PaperVenue::from_config(v, &registry).unwrap();
                VenueHandle::new(v.clone(), Arc::new(client))
            })
            .collect();
        Scheduler::new(&cfg, venues, PathLedger::new(LedgerConfig::default()), SessionState::new(), None).unwrap()
    }

    fn opp(net: f64, score: f64) -> ConversionOpportunity {
        let pair = Pair::new("ETH", "USDT");
        ConversionOpportunity {
            venue: "paper".into(),
            source: "USDT".into(),
            target: "ETH".into(),
            route: Route::Direct { pair: pair.clone() },
            amount: 100.0,
            from_value: 100.0,
            first_leg_qty: 0.05,
            source_price_usd: 1.0,
            target_price_usd: 2000.0,
            source_momentum: 0.0,
            target_momentum: 0.01,
            leg_spreads: vec![(pair, 0.001)],
            forecast_gross_edge: net + 0.5,
            cost: CostBreakdown::default(),
            estimated_cost: 0.5,
            net_edge: net,
            p_win: None,
            combined_score: score,
            cycle: 1,
        }
    }

    #[test]
    fn test_rank_by_key() {
        let mut v = vec![opp(1.0, 0.1), opp(3.0, 0.0), opp(2.0, 0.9)];
        rank(&mut v, Ranking::NetEdge);
        assert_eq!(v.iter().map(|o| o.net_edge).collect::<Vec<_>>(), vec![3.0, 2.0, 1.0]);
        rank(&mut v, Ranking::CombinedScore);
        assert_eq!(v[0].net_edge, 2.0);
    }

    #[test]
    fn test_policy_deserialize() {
        let cfg: SchedulerConfig = toml::from_str("policy = \"race\"\nranking = \"combined_score\"").unwrap();
        assert_eq!(cfg.policy, Policy::Race);
        assert_eq!(cfg.ranking, Ranking::CombinedScore);
        assert!(!cfg.chain.enabled);
    }

    #[tokio::test]
    async fn test_pause_runs_full_delay() {
        let mut never = std::future::pending::<()>();
        let start = std::time::Instant::now();
        assert!(pause_between_cycles(Duration::from_millis(30), &mut never).await);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_pause_yields_to_shutdown() {
        let mut stop = std::future::ready(());
        let start = std::time::Instant::now();
        assert!(!pause_between_cycles(Duration::from_secs(60), &mut stop).await);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cold_cycle_finds_nothing() {
        let mut s = scheduler(CONFIG);
        let report = s.run_cycle().await;
        assert_eq!(report.cycle, 1);
        assert_eq!(report.venues_reachable, 1);
        // one price sample per asset: no momentum yet
        assert_eq!(report.opportunities, 0);
        assert_eq!(s.state().cycle_count, 1);
        assert!(s.venue_health()[0].reachable);
    }

    #[tokio::test]
    async fn test_momentum_drives_one_execution() {
        let mut s = scheduler(CONFIG);
        // ETH rose 1% over the last 30 seconds
        s.momentum()
            .update_at("ETH", 1980.0, Utc::now() - chrono::Duration::seconds(30));

        let report = s.run_cycle().await;
        assert!(report.opportunities >= 1);
        assert_eq!(report.executions, 1);
        assert_eq!(report.verified, 1);
        assert_eq!(s.state().executions, 1);

        let balances = s.balances("paper").unwrap();
        assert!(balances.get("ETH").copied().unwrap_or(0.0) > 0.0);
        assert!(balances["USDT"] < 1000.0);

        let key = crate::types::PathKey::new("USDT", "ETH", "paper");
        assert_eq!(s.ledger().stats(&key).unwrap().trades, 1);
    }

    #[tokio::test]
    async fn test_below_minimum_rejection_starts_cooldown() {
        let toml = CONFIG.replace("USDT = 1000.0", "USDT = 12.0") + "\n[venues.min_qty]\nETH = 1.0\n";
        let mut s = scheduler(&toml);
        s.momentum()
            .update_at("ETH", 1900.0, Utc::now() - chrono::Duration::seconds(30));

        let first = s.run_cycle().await;
        assert_eq!(first.executions, 0);
        assert_eq!(first.rejections.get("below_minimum"), Some(&1));

        let second = s.run_cycle().await;
        assert_eq!(second.executions, 0);
        assert_eq!(second.rejections.get("anti_repeat"), Some(&1));
        assert_eq!(s.state().executions, 0);
    }
}
