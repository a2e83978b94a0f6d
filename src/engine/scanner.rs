//! Opportunity scanner.
//!
//! For one venue snapshot, enumerates every conversion from a held asset
//! worth at least the venue minimum notional into each other tradable
//! asset, reached directly or through the configured intermediate.
//! Blocked paths and blocked sources are skipped. Each candidate gets a
//! combined score (momentum, path history, auxiliary signals) and a
//! conservative forecast gross edge; non-positive edges are dropped.
//!
//! Scanning is read-only over snapshot, ledger, blocks and minimums.

use serde::Deserialize;
use tracing::debug;

use crate::engine::blocks::BlockBook;
use crate::engine::momentum::MomentumTracker;
use crate::signals::{SignalContext, SignalRegistry};
use crate::strategy::cost::{CostEstimator, CostRequest};
use crate::strategy::paths::PathLedger;
use crate::types::{Asset, AssetRegistry, ConversionOpportunity, Pair, PathKey, Route, VenueSnapshot};
use crate::venues::minimums::MinimumBook;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub momentum_weight: f64,
    pub history_weight: f64,
    /// Momentum edge (per minute) that maps to a normalized score of 1.
    pub momentum_scale: f64,
    /// Minutes the momentum edge is assumed to persist.
    pub horizon_minutes: f64,
    /// Fraction of the projected edge kept as the forecast.
    pub haircut: f64,
    /// Fraction of a holding offered for conversion.
    pub max_fraction: f64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            momentum_weight: 1.0,
            history_weight: 0.2,
            momentum_scale: 0.01,
            horizon_minutes: 5.0,
            haircut: 0.5,
            max_fraction: 1.0,
        }
    }
}

/// Read-only collaborators consulted during a scan.
pub struct ScanInputs<'a> {
    pub momentum: &'a MomentumTracker,
    pub ledger: &'a PathLedger,
    pub blocks: &'a BlockBook,
    pub minimums: &'a MinimumBook,
    pub cost: &'a CostEstimator,
    pub signals: &'a SignalRegistry,
    pub fee_pct: f64,
    pub cycle: u64,
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub struct OpportunityScanner {
    config: ScannerConfig,
    registry: AssetRegistry,
}

impl OpportunityScanner {
    pub fn new(config: ScannerConfig, registry: AssetRegistry) -> Self {
        Self { config, registry }
    }

    /// Find the route from `source` to `target`: a direct pair, else two
    /// legs through the intermediate asset.
    pub fn route(&self, snapshot: &VenueSnapshot, source: &str, target: &str) -> Option<Route> {
        let usable = |p: &Pair| snapshot.ticker(p).is_some();
        if let Some(pair) = snapshot.find_pair(source, target).filter(|p| usable(*p)) {
            return Some(Route::Direct { pair: pair.clone() });
        }
        let via = self.registry.intermediate();
        if source == via || target == via {
            return None;
        }
        let first = snapshot.find_pair(source, via).filter(|p| usable(*p))?;
        let second = snapshot.find_pair(via, target).filter(|p| usable(*p))?;
        Some(Route::Via {
            intermediate: via.to_string(),
            first: first.clone(),
            second: second.clone(),
        })
    }

    /// Every emitted opportunity for one venue, unsorted.
    pub fn scan(&self, snapshot: &VenueSnapshot, inputs: &ScanInputs<'_>) -> Vec<ConversionOpportunity> {
        let venue = snapshot.venue.as_str();
        let prices = snapshot.usd_prices(&self.registry);
        let min_notional = inputs.minimums.venue_min_notional(venue);
        let targets = snapshot.tradable_assets();

        let mut held: Vec<(&Asset, f64)> = snapshot
            .balances
            .iter()
            .filter(|(_, amt)| **amt > 0.0)
            .map(|(a, amt)| (a, *amt))
            .collect();
        held.sort_by(|a, b| a.0.cmp(b.0));

        let mut out = Vec::new();
        let mut skipped_blocked = 0usize;

        for (source, balance) in held {
            let Some(&source_price) = prices.get(source) else {
                continue;
            };
            let amount = balance * self.config.max_fraction.clamp(0.0, 1.0);
            let from_value = amount * source_price;
            if from_value < min_notional || from_value <= 0.0 {
                continue;
            }
            if let Some(reason) = inputs.blocks.source_block(venue, source, inputs.cycle) {
                debug!(venue, source = %source, %reason, "Source blocked, skipping");
                continue;
            }

            for target in targets.iter().filter(|t| *t != source) {
                let key = PathKey::new(source, target, venue);
                if inputs.ledger.is_blocked(&key, inputs.cycle).is_blocked() {
                    skipped_blocked += 1;
                    continue;
                }
                let Some(&target_price) = prices.get(target) else {
                    continue;
                };
                let Some(route) = self.route(snapshot, source, target) else {
                    continue;
                };
                if route
                    .pairs()
                    .iter()
                    .any(|p| inputs.minimums.is_blocked(venue, p, inputs.cycle))
                {
                    continue;
                }
                if let Some(opp) = self.evaluate(
                    snapshot,
                    inputs,
                    source,
                    target,
                    route,
                    amount,
                    from_value,
                    source_price,
                    target_price,
                ) {
                    out.push(opp);
                }
            }
        }

        debug!(venue, found = out.len(), skipped_blocked, "Venue scan complete");
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn evaluate(
        &self,
        snapshot: &VenueSnapshot,
        inputs: &ScanInputs<'_>,
        source: &str,
        target: &str,
        route: Route,
        amount: f64,
        from_value: f64,
        source_price: f64,
        target_price: f64,
    ) -> Option<ConversionOpportunity> {
        let source_momentum = inputs.momentum.momentum(source);
        let target_momentum = inputs.momentum.momentum(target);
        let edge_per_min = target_momentum - source_momentum;

        let gross = from_value * edge_per_min * self.config.horizon_minutes * self.config.haircut;
        if !gross.is_finite() || gross <= 0.0 {
            return None;
        }

        let leg_spreads: Vec<(Pair, f64)> = route
            .pairs()
            .into_iter()
            .filter_map(|p| snapshot.ticker(p).map(|t| (p.clone(), t.spread_pct())))
            .collect();
        let measured: Vec<f64> = leg_spreads.iter().map(|(_, s)| *s).collect();

        let first = route.pairs()[0].clone();
        let first_leg_qty = if first.base == source {
            amount
        } else {
            // buying the base with `source` as quote
            let ask = snapshot.ticker(&first).map(|t| t.ask).unwrap_or(0.0);
            if ask <= 0.0 {
                return None;
            }
            amount / ask
        };

        let key = PathKey::new(source, target, &snapshot.venue);
        let stats = inputs.ledger.stats(&key);
        let request = CostRequest {
            fee_pct: inputs.fee_pct,
            source,
            target,
            notional_usd: from_value,
            legs: route.legs(),
            measured_spreads: &measured,
        };
        let cost = inputs.cost.assess(&request, stats, gross);

        let momentum_term = (edge_per_min / self.config.momentum_scale).clamp(-1.0, 1.0);
        let history_term = stats
            .and_then(|s| s.win_rate())
            .map(|wr| wr - 0.5)
            .unwrap_or(0.0);

        let mut opp = ConversionOpportunity {
            venue: snapshot.venue.clone(),
            source: source.to_string(),
            target: target.to_string(),
            route,
            amount,
            from_value,
            first_leg_qty,
            source_price_usd: source_price,
            target_price_usd: target_price,
            source_momentum,
            target_momentum,
            leg_spreads,
            forecast_gross_edge: gross,
            cost: cost.breakdown,
            estimated_cost: cost.conservative_usd,
            net_edge: gross - cost.conservative_usd,
            p_win: cost.p_win(),
            combined_score: self.config.momentum_weight * momentum_term
                + self.config.history_weight * history_term,
            cycle: inputs.cycle,
        };

        let ctx = SignalContext {
            opportunity: &opp,
            snapshot,
            registry: &self.registry,
        };
        let signal_term = inputs.signals.weighted_score(&ctx);
        let adjustment = inputs.signals.adjustment(&opp);
        opp.combined_score += signal_term + adjustment;
        Some(opp)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
