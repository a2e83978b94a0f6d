//! Profit gate.
//!
//! The single check every opportunity passes before it may be
//! scheduled. Minimums are enforced first regardless of profit, then
//! the spread ceiling, then the conservative net edge (and P-win in
//! Monte-Carlo mode). Decides only; never mutates state.

use serde::Deserialize;
use tracing::debug;

use crate::types::{Asset, ConversionOpportunity, Pair, SymbolFilters};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum conservative net profit in USD.
    pub epsilon_usd: f64,
    /// Hard ceiling on any leg's measured spread.
    pub max_spread_pct: f64,
    /// Minimum P-win when Monte-Carlo costing is on.
    pub min_p_win: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            epsilon_usd: 0.05,
            max_spread_pct: 0.05,
            min_p_win: 0.6,
        }
    }
}

/// Why the gate refused an opportunity.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GateRejection {
    #[error("below minimum on {pair}: notional ${notional:.2} (min ${min_notional:.2}), qty {quantity} (min {min_qty})")]
    BelowMinimum {
        pair: Pair,
        notional: f64,
        min_notional: f64,
        quantity: f64,
        min_qty: f64,
    },

    #[error("spread {spread_pct:.4} on {pair} exceeds {max_pct:.4} (source {asset})")]
    SpreadTooHigh {
        asset: Asset,
        pair: Pair,
        spread_pct: f64,
        max_pct: f64,
    },

    #[error("cost ${cost:.4} leaves net ${net:.4} of gross ${gross:.4}, below epsilon ${epsilon:.4}")]
    CostExceedsEdge {
        gross: f64,
        cost: f64,
        net: f64,
        epsilon: f64,
    },

    #[error("P-win {p_win:.3} below {min:.3}")]
    WinProbabilityTooLow { p_win: f64, min: f64 },
}

impl GateRejection {
    /// Short label used for cycle counters.
    pub fn kind(&self) -> &'static str {
        match self {
            GateRejection::BelowMinimum { .. } => "below_minimum",
            GateRejection::SpreadTooHigh { .. } => "spread_too_high",
            GateRejection::CostExceedsEdge { .. } => "cost_exceeds_edge",
            GateRejection::WinProbabilityTooLow { .. } => "p_win_too_low",
        }
    }
}

pub struct ProfitGate {
    config: GateConfig,
    monte_carlo: bool,
}

impl ProfitGate {
    pub fn new(config: GateConfig, monte_carlo: bool) -> Self {
        Self { config, monte_carlo }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Approve an opportunity against the effective limits of its first leg.
    pub fn approve(&self, opp: &ConversionOpportunity, limits: &SymbolFilters) -> Result<(), GateRejection> {
        // (a) minimums, independent of profit
        if opp.from_value < limits.min_notional || opp.first_leg_qty < limits.min_qty {
            return Err(GateRejection::BelowMinimum {
                pair: opp.first_pair().clone(),
                notional: opp.from_value,
                min_notional: limits.min_notional,
                quantity: opp.first_leg_qty,
                min_qty: limits.min_qty,
            });
        }

        // (b) spread ceiling on every leg
        if let Some((pair, spread)) = opp
            .leg_spreads
            .iter()
            .find(|(_, s)| !s.is_finite() || *s > self.config.max_spread_pct)
        {
            return Err(GateRejection::SpreadTooHigh {
                asset: opp.source.clone(),
                pair: pair.clone(),
                spread_pct: *spread,
                max_pct: self.config.max_spread_pct,
            });
        }

        // (c) conservative net edge
        let net = opp.forecast_gross_edge - opp.estimated_cost;
        if !net.is_finite() || net < self.config.epsilon_usd {
            return Err(GateRejection::CostExceedsEdge {
                gross: opp.forecast_gross_edge,
                cost: opp.estimated_cost,
                net,
                epsilon: self.config.epsilon_usd,
            });
        }

        if self.monte_carlo {
            let p_win = opp.p_win.unwrap_or(0.0);
            if p_win < self.config.min_p_win {
                return Err(GateRejection::WinProbabilityTooLow {
                    p_win,
                    min: self.config.min_p_win,
                });
            }
        }

        debug!(opportunity = %opp, "Gate approved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CostBreakdown, Route};

    fn opp(gross: f64, cost: f64) -> ConversionOpportunity {
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
            forecast_gross_edge: gross,
            cost: CostBreakdown::default(),
            estimated_cost: cost,
            net_edge: gross - cost,
            p_win: None,
            combined_score: 0.5,
            cycle: 1,
        }
    }

    fn limits(min_notional: f64, min_qty: f64) -> SymbolFilters {
        SymbolFilters {
            min_qty,
            min_notional,
            step_size: 0.0001,
        }
    }

    #[test]
    fn test_approves_clear_edge() {
        let gate = ProfitGate::new(GateConfig::default(), false);
        assert!(gate.approve(&opp(1.0, 0.6), &limits(10.0, 0.001)).is_ok());
    }

    #[test]
    fn test_minimum_checked_before_profit() {
        let gate = ProfitGate::new(GateConfig::default(), false);
        let err = gate.approve(&opp(100.0, 0.1), &limits(150.0, 0.0)).unwrap_err();
        assert_eq!(err.kind(), "below_minimum");
        let err = gate.approve(&opp(100.0, 0.1), &limits(10.0, 0.1)).unwrap_err();
        assert!(matches!(err, GateRejection::BelowMinimum { .. }));
    }

    #[test]
    fn test_spread_ceiling_names_source() {
        let gate = ProfitGate::new(GateConfig::default(), false);
        let mut o = opp(1.0, 0.1);
        o.leg_spreads[0].1 = 0.08;
        match gate.approve(&o, &limits(10.0, 0.0)) {
            Err(GateRejection::SpreadTooHigh { asset, .. }) => assert_eq!(asset, "USDT"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cost_exceeds_edge() {
        let gate = ProfitGate::new(GateConfig::default(), false);
        // net 0.04 < epsilon 0.05
        let err = gate.approve(&opp(0.64, 0.6), &limits(10.0, 0.0)).unwrap_err();
        assert_eq!(err.kind(), "cost_exceeds_edge");
        // exactly epsilon passes
        assert!(gate.approve(&opp(0.65, 0.6), &limits(10.0, 0.0)).is_ok());
    }

    #[test]
    fn test_p_win_required_in_monte_carlo_mode() {
        let gate = ProfitGate::new(GateConfig::default(), true);
        let mut o = opp(1.0, 0.1);
        assert!(matches!(
            gate.approve(&o, &limits(10.0, 0.0)),
            Err(GateRejection::WinProbabilityTooLow { .. })
        ));
        o.p_win = Some(0.75);
        assert!(gate.approve(&o, &limits(10.0, 0.0)).is_ok());
    }
}
