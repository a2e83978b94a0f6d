//! Order validation and P&L reconciliation.
//!
//! Parses raw venue acknowledgements into fills, computes realized P&L
//! from aggregated asset flows, clamps anomalous results, and feeds the
//! outcome back into the path ledger, the session counters and the
//! audit log.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::engine::executor::ExecutionReport;
use crate::storage::AuditLog;
use crate::strategy::paths::PathLedger;
use crate::types::{
    Asset, AssetRegistry, ConversionOpportunity, ConversionResult, OpportunityRef, OrderAck, OrderFill, SessionState,
    Side, TradeError,
};
use crate::venues::FillFields;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Realized P&L below this is treated as a data anomaly.
    pub pnl_floor: f64,
    /// Realized P&L above this is treated as a data anomaly.
    pub pnl_ceiling: f64,
    /// Relative gap between realized and forecast net edge that is flagged.
    pub discrepancy_tolerance_pct: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            pnl_floor: -200.0,
            pnl_ceiling: 500.0,
            discrepancy_tolerance_pct: 100.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Fill parsing
// ---------------------------------------------------------------------------

/// Look up a possibly dotted field; numeric segments index arrays.
fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(payload, |current, part| match current {
        Value::Object(map) => map.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// A number or a numeric string.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Parse a venue acknowledgement using the venue's field mapping.
pub fn parse_fill(ack: &OrderAck, fields: &FillFields) -> Result<OrderFill, TradeError> {
    let anomaly = |what: &str| {
        TradeError::DataAnomaly(format!("{} {} ack: {what}", ack.venue, ack.pair))
    };

    let order_id = match lookup(&ack.payload, &fields.order_id) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(anomaly(&format!("missing order id field '{}'", fields.order_id))),
    };

    let filled_qty = lookup(&ack.payload, &fields.filled_qty)
        .and_then(as_number)
        .ok_or_else(|| anomaly(&format!("missing filled quantity field '{}'", fields.filled_qty)))?;
    if filled_qty < 0.0 {
        return Err(anomaly("negative filled quantity"));
    }

    let avg_price = match lookup(&ack.payload, &fields.avg_price).and_then(as_number) {
        Some(p) if p > 0.0 => p,
        _ if filled_qty == 0.0 => 0.0,
        _ => return Err(anomaly(&format!("missing average price field '{}'", fields.avg_price))),
    };

    let fee_usd = lookup(&ack.payload, &fields.fee_usd)
        .and_then(as_number)
        .unwrap_or(0.0)
        .max(0.0);

    Ok(OrderFill {
        order_id,
        venue: ack.venue.clone(),
        pair: ack.pair.clone(),
        side: ack.side,
        filled_qty,
        avg_price,
        fee_usd,
        timestamp: Utc::now(),
    })
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// A result plus the slippage observed while producing it.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub result: ConversionResult,
    /// Mean adverse slippage across filled legs versus their reference price.
    pub slippage: Option<f64>,
}

pub struct OrderValidator {
    config: ValidatorConfig,
    registry: AssetRegistry,
}

impl OrderValidator {
    pub fn new(config: ValidatorConfig, registry: AssetRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    fn usd_price(&self, asset: &str, opp: &ConversionOpportunity, prices: &HashMap<Asset, f64>) -> f64 {
        if asset == opp.source {
            opp.source_price_usd
        } else if asset == opp.target {
            opp.target_price_usd
        } else if let Some(p) = prices.get(asset) {
            *p
        } else if self.registry.is_stablecoin(asset) {
            1.0
        } else {
            warn!(asset, "No USD price for flow, valuing at zero");
            0.0
        }
    }

    /// Build the result for an execution attempt that reached the venue.
    pub fn reconcile(
        &self,
        opp: &ConversionOpportunity,
        report: &ExecutionReport,
        prices: &HashMap<Asset, f64>,
    ) -> Reconciliation {
        let fills = &report.fills;
        let expected_legs = opp.route.legs();

        let failure = if let Some(e) = &report.error {
            Some(e.to_string())
        } else if fills.len() < expected_legs {
            Some(format!("missing leg: {} of {} filled", fills.len(), expected_legs))
        } else if fills.iter().any(|f| f.filled_qty <= 0.0) {
            Some("zero-quantity fill".to_string())
        } else {
            None
        };

        let mut flows: HashMap<Asset, f64> = HashMap::new();
        for fill in fills {
            for (asset, delta) in fill.flows() {
                *flows.entry(asset).or_insert(0.0) += delta;
            }
        }
        let (mut sold_value, mut bought_value) = (0.0, 0.0);
        for (asset, delta) in &flows {
            let value = delta * self.usd_price(asset, opp, prices);
            if value < 0.0 {
                sold_value -= value;
            } else {
                bought_value += value;
            }
        }
        let fees_usd: f64 = fills.iter().map(|f| f.fee_usd).sum();
        let raw_pnl = bought_value - sold_value - fees_usd;

        let outlier =
            !raw_pnl.is_finite() || raw_pnl < self.config.pnl_floor || raw_pnl > self.config.pnl_ceiling;
        let realized_pnl = if outlier { 0.0 } else { raw_pnl };
        if outlier {
            let e = TradeError::DataAnomaly(format!(
                "P&L ${raw_pnl:.2} outside [{}, {}] for {}",
                self.config.pnl_floor,
                self.config.pnl_ceiling,
                opp.path_key()
            ));
            warn!(error = %e, "Clamping anomalous P&L to zero");
        }

        let verified = failure.is_none();
        let forecast = opp.net_edge;
        let discrepancy_pct = if forecast.abs() > 1e-9 {
            (realized_pnl - forecast) / forecast.abs() * 100.0
        } else {
            0.0
        };
        let discrepancy_flagged =
            verified && !outlier && discrepancy_pct.abs() > self.config.discrepancy_tolerance_pct;

        let slippage = self.observed_slippage(report);

        let result = ConversionResult {
            id: uuid::Uuid::new_v4().to_string(),
            opportunity: OpportunityRef::from(opp),
            fills: fills.clone(),
            sold_value,
            bought_value,
            fees_usd,
            raw_pnl,
            realized_pnl,
            verified,
            outlier,
            discrepancy_pct,
            discrepancy_flagged,
            failure,
            recorded_at: Utc::now(),
        };
        Reconciliation { result, slippage }
    }

    fn observed_slippage(&self, report: &ExecutionReport) -> Option<f64> {
        let plan = report.plan.as_ref()?;
        let samples: Vec<f64> = report
            .fills
            .iter()
            .zip(plan.legs.iter())
            .filter(|(f, leg)| f.filled_qty > 0.0 && f.avg_price > 0.0 && leg.reference_price > 0.0)
            .map(|(f, leg)| match f.side {
                Side::Buy => (f.avg_price - leg.reference_price) / leg.reference_price,
                Side::Sell => (leg.reference_price - f.avg_price) / leg.reference_price,
            })
            .collect();
        if samples.is_empty() {
            None
        } else {
            Some(samples.iter().sum::<f64>() / samples.len() as f64)
        }
    }

    /// Feed a reconciled result into the ledger, the session counters
    /// and the audit log.
    pub fn apply(
        &self,
        recon: &Reconciliation,
        ledger: &mut PathLedger,
        session: &mut SessionState,
        audit: Option<&AuditLog>,
        cycle: u64,
    ) {
        let result = &recon.result;
        let key = result.path_key();

        // A failed execution is a loss even when its P&L is also anomalous.
        if result.outlier {
            ledger.record_anomaly(&key);
        }
        if !result.verified {
            ledger.record_failure(&key, cycle);
        } else if !result.outlier {
            ledger.record_result(&key, result.realized_pnl, cycle);
        }
        if let Some(slip) = recon.slippage.filter(|_| !result.outlier) {
            ledger.record_slippage(&key, slip);
        }

        session.record(result, ledger.config().win_threshold_usd);

        if let Some(audit) = audit {
            if let Err(e) = audit.append(result) {
                error!(error = %e, "Failed to append audit record");
            }
        }

        if result.verified {
            info!(
                path = %key,
                pnl = format!("${:.4}", result.realized_pnl),
                forecast = format!("${:.4}", result.opportunity.forecast_net_edge),
                drift = format!("{:.1}%", result.discrepancy_pct),
                flagged = result.discrepancy_flagged,
                outlier = result.outlier,
                orders = ?result.order_ids(),
                "Conversion reconciled"
            );
        } else {
            warn!(
                path = %key,
                failure = result.failure.as_deref().unwrap_or("unknown"),
                orders = ?result.order_ids(),
                "Conversion unverified, recorded as loss"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
