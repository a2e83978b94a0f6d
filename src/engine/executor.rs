//! Execution router.
//!
//! Turns an approved opportunity into concrete orders on its venue.
//! Live balances and symbol filters are fetched immediately before
//! submission; every leg is validated against its minimums first, so a
//! plan with any failing leg submits nothing. Legs run in order and a
//! later leg is re-sized from the earlier leg's actual proceeds.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine::validator::parse_fill;
use crate::types::{
    AssetRegistry, ConversionOpportunity, ExecutionPlan, Leg, OrderAck, OrderFill, Pair, PriceTick, Route, Side,
    SymbolFilters, TradeError,
};
use crate::venues::minimums::MinimumBook;
use crate::venues::VenueHandle;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Fraction of the live balance a leg may spend.
    pub safety_fraction: f64,
    /// Fills below this share of the requested quantity abort the plan.
    pub min_fill_ratio: f64,
    /// Timeout for each venue call made while executing.
    pub order_timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            safety_fraction: 0.97,
            min_fill_ratio: 0.9,
            order_timeout_ms: 10_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Execution result
// ---------------------------------------------------------------------------

/// Everything that happened while routing one opportunity.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub plan: Option<ExecutionPlan>,
    pub acks: Vec<OrderAck>,
    pub fills: Vec<OrderFill>,
    /// Filters fetched from the venue during this attempt.
    pub fetched_filters: Vec<(Pair, SymbolFilters)>,
    /// Orders handed to the venue, accepted or not.
    pub submitted: usize,
    pub error: Option<TradeError>,
}

impl ExecutionReport {
    /// Whether at least one order reached the venue.
    pub fn reached_venue(&self) -> bool {
        self.submitted > 0
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.fills.is_empty()
    }

    fn fail(mut self, error: TradeError) -> Self {
        self.error = Some(error);
        self
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Round `qty` down to a multiple of `step` using decimal arithmetic.
pub fn round_to_step(qty: f64, step: f64) -> f64 {
    if step <= 0.0 || !qty.is_finite() || qty <= 0.0 {
        return qty.max(0.0);
    }
    let (Some(q), Some(s)) = (Decimal::from_f64(qty), Decimal::from_f64(step)) else {
        return 0.0;
    };
    if s.is_zero() {
        return qty;
    }
    ((q / s).floor() * s).to_f64().unwrap_or(0.0)
}

/// Size one leg spending `amount_in` of `asset_in` against a quote,
/// rejecting it when it falls below the pair's limits.
pub fn plan_leg(
    venue: &str,
    pair: &Pair,
    asset_in: &str,
    amount_in: f64,
    tick: &PriceTick,
    limits: &SymbolFilters,
    usd_per_unit_in: f64,
) -> Result<Leg, TradeError> {
    let side = pair.side_spending(asset_in).ok_or_else(|| TradeError::NoRoute {
        venue: venue.to_string(),
        from: asset_in.to_string(),
        to: pair.to_string(),
    })?;
    let asset_out = pair.counter(asset_in).cloned().unwrap_or_default();

    let (raw_qty, reference_price) = match side {
        Side::Sell => (amount_in, tick.bid),
        Side::Buy => (amount_in / tick.ask, tick.ask),
    };
    let quantity = round_to_step(raw_qty, limits.step_size);
    let spent_units = match side {
        Side::Sell => quantity,
        Side::Buy => quantity * reference_price,
    };
    let notional_usd = spent_units * usd_per_unit_in;

    if quantity <= 0.0 || quantity < limits.min_qty || notional_usd < limits.min_notional {
        return Err(TradeError::MinimumNotMet {
            venue: venue.to_string(),
            pair: pair.clone(),
            notional: notional_usd,
            min_notional: limits.min_notional,
            quantity,
            min_qty: limits.min_qty,
        });
    }

    Ok(Leg {
        pair: pair.clone(),
        venue: venue.to_string(),
        side,
        quantity,
        reference_price,
        asset_in: asset_in.to_string(),
        asset_out,
        notional_usd,
    })
}

/// Units of `asset_out` a leg is expected to deliver before fees.
fn expected_out(leg: &Leg) -> f64 {
    match leg.side {
        Side::Sell => leg.quantity * leg.reference_price,
        Side::Buy => leg.quantity,
    }
}

/// Units of the pair's counter asset a fill actually delivered before fees.
fn fill_proceeds(fill: &OrderFill) -> f64 {
    match fill.side {
        Side::Sell => fill.quote_amount(),
        Side::Buy => fill.filled_qty,
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub struct ExecutionRouter {
    config: RouterConfig,
    registry: AssetRegistry,
}

struct LegInputs {
    pair: Pair,
    tick: PriceTick,
    limits: SymbolFilters,
}

impl ExecutionRouter {
    pub fn new(config: RouterConfig, registry: AssetRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    async fn timed<T, F>(&self, venue: &str, what: &str, fut: F) -> Result<anyhow::Result<T>, TradeError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        tokio::time::timeout(Duration::from_millis(self.config.order_timeout_ms), fut)
            .await
            .map_err(|_| TradeError::Network {
                venue: venue.to_string(),
                message: format!("{what} timed out after {}ms", self.config.order_timeout_ms),
            })
    }

    /// Venue read that treats any failure as a network error.
    async fn fetch<T, F>(&self, venue: &str, what: &str, fut: F) -> Result<T, TradeError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        self.timed(venue, what, fut).await?.map_err(|e| TradeError::Network {
            venue: venue.to_string(),
            message: format!("{what}: {e}"),
        })
    }

    /// Route an approved opportunity. Never panics and never returns
    /// early without a report; failures are carried in `report.error`.
    pub async fn execute(
        &self,
        venue: &VenueHandle,
        opp: &ConversionOpportunity,
        minimums: &MinimumBook,
        cycle: u64,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        let name = venue.name();
        let fee = venue.config.taker_fee_pct;

        // Live balance
        let balances = match self.fetch(name, "get_balances", venue.client.get_balances()).await {
            Ok(b) => b,
            Err(e) => return report.fail(e),
        };
        let available = balances.get(&opp.source).copied().unwrap_or(0.0);
        let spend = opp.amount.min(available * self.config.safety_fraction);
        if spend.is_nan() || spend <= 0.0 {
            return report.fail(TradeError::InsufficientBalance {
                venue: name.to_string(),
                asset: opp.source.clone(),
                needed: opp.amount,
                available,
            });
        }

        // Live quotes and filters per leg
        let mut inputs = Vec::with_capacity(opp.route.legs());
        for pair in opp.route.pairs() {
            let tick = match self.fetch(name, "get_ticker", venue.client.get_ticker(pair)).await {
                Ok(t) if t.is_valid() => t,
                Ok(_) => {
                    return report.fail(TradeError::DataAnomaly(format!("{name} {pair}: invalid quote")));
                }
                Err(e) => return report.fail(e),
            };
            let fetched = match self
                .fetch(name, "get_symbol_filters", venue.client.get_symbol_filters(pair))
                .await
            {
                Ok(f) => f,
                Err(e) => return report.fail(e),
            };
            report.fetched_filters.push((pair.clone(), fetched));
            inputs.push(LegInputs {
                pair: pair.clone(),
                tick,
                limits: minimums.merge(name, pair, fetched, cycle),
            });
        }

        // Validate the whole plan before anything is sent
        let plan = match self.build_plan(name, opp, spend, fee, &inputs) {
            Ok(p) => p,
            Err(e) => {
                info!(venue = name, opportunity = %opp, error = %e, "Plan rejected before submission");
                return report.fail(e);
            }
        };
        debug!(venue = name, legs = plan.legs.len(), route = %opp.route, "Execution plan built");
        report.plan = Some(plan.clone());

        let mut next_leg = plan.legs.first().cloned();
        let mut index = 0;
        while let Some(leg) = next_leg.take() {
            let fill = match self.submit(venue, &leg, &mut report).await {
                Ok(f) => f,
                Err(e) => return report.fail(e),
            };

            if fill.filled_qty < leg.quantity * self.config.min_fill_ratio {
                warn!(
                    venue = name,
                    pair = %leg.pair,
                    filled = fill.filled_qty,
                    requested = leg.quantity,
                    "Partial fill, aborting remaining legs"
                );
                let err = TradeError::PartialFill {
                    venue: name.to_string(),
                    pair: leg.pair.clone(),
                    filled: fill.filled_qty,
                    requested: leg.quantity,
                };
                report.fills.push(fill);
                return report.fail(err);
            }

            let proceeds = fill_proceeds(&fill);
            let usd_per_unit = if proceeds > 0.0 {
                leg.notional_usd / proceeds
            } else {
                0.0
            };
            report.fills.push(fill);
            index += 1;

            // Re-size the next leg from what actually arrived
            if let Some(next) = inputs.get(index) {
                let amount = proceeds * (1.0 - fee) * self.config.safety_fraction;
                let usd = self.unit_usd(&leg.asset_out, usd_per_unit);
                match plan_leg(name, &next.pair, &leg.asset_out, amount, &next.tick, &next.limits, usd) {
                    Ok(resized) => {
                        if let Some(p) = report.plan.as_mut() {
                            if let Some(slot) = p.legs.get_mut(index) {
                                *slot = resized.clone();
                            }
                        }
                        next_leg = Some(resized);
                    }
                    Err(e) => {
                        warn!(venue = name, error = %e, "Follow-up leg fell below minimum after fill");
                        return report.fail(e);
                    }
                }
            }
        }

        info!(
            venue = name,
            route = %opp.route,
            orders = report.fills.len(),
            "Execution complete"
        );
        report
    }

    fn unit_usd(&self, asset: &str, implied: f64) -> f64 {
        if self.registry.is_stablecoin(asset) {
            1.0
        } else {
            implied
        }
    }

    fn build_plan(
        &self,
        venue: &str,
        opp: &ConversionOpportunity,
        spend: f64,
        fee: f64,
        inputs: &[LegInputs],
    ) -> Result<ExecutionPlan, TradeError> {
        let mut legs = Vec::with_capacity(inputs.len());
        let mut asset_in = opp.source.clone();
        let mut amount_in = spend;
        let mut usd_per_unit = opp.source_price_usd;

        for input in inputs {
            let leg = plan_leg(
                venue,
                &input.pair,
                &asset_in,
                amount_in,
                &input.tick,
                &input.limits,
                usd_per_unit,
            )?;
            let out = expected_out(&leg);
            let implied = if out > 0.0 { leg.notional_usd / out } else { 0.0 };
            usd_per_unit = self.unit_usd(&leg.asset_out, implied);
            amount_in = out * (1.0 - fee) * self.config.safety_fraction;
            asset_in = leg.asset_out.clone();
            legs.push(leg);
        }

        if let Route::Via { .. } = opp.route {
            if asset_in != opp.target {
                return Err(TradeError::NoRoute {
                    venue: venue.to_string(),
                    from: opp.source.clone(),
                    to: opp.target.clone(),
                });
            }
        }

        Ok(ExecutionPlan {
            venue: venue.to_string(),
            legs,
        })
    }

    async fn submit(
        &self,
        venue: &VenueHandle,
        leg: &Leg,
        report: &mut ExecutionReport,
    ) -> Result<OrderFill, TradeError> {
        let name = venue.name();
        report.submitted += 1;
        let ack = self
            .timed(name, "place_order", venue.client.place_order(&leg.pair, leg.side, leg.quantity))
            .await?
            .map_err(|e| TradeError::OrderRejected {
                venue: name.to_string(),
                pair: leg.pair.clone(),
                message: e.to_string(),
            })?;
        let fill = parse_fill(&ack, &venue.config.fill_fields)?;
        report.acks.push(ack);
        info!(fill = %fill, "Order filled");
        Ok(fill)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
