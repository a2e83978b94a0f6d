//! Trade cost estimation.
//!
//! Deterministic mode sums taker fees, an asset-class spread table
//! (overridden by wider measured spreads), historical slippage for the
//! path and a fixed safety buffer. Monte-Carlo mode perturbs spread and
//! slippage with a seeded RNG and reports mean, median and an upper
//! percentile plus the probability that a given gross edge survives.
//!
//! Every function here is pure over its inputs and the ledger stats.

use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use crate::types::{AssetClass, AssetRegistry, CostBreakdown, PathStats};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Spread charged per asset class, as a fraction of notional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpreadTable {
    pub stablecoin: f64,
    pub major: f64,
    pub altcoin: f64,
    pub meme: f64,
}

impl Default for SpreadTable {
    fn default() -> Self {
        Self {
            stablecoin: 0.0005,
            major: 0.001,
            altcoin: 0.003,
            meme: 0.008,
        }
    }
}

impl SpreadTable {
    pub fn for_class(&self, class: AssetClass) -> f64 {
        match class {
            AssetClass::Stablecoin => self.stablecoin,
            AssetClass::Major => self.major,
            AssetClass::Altcoin => self.altcoin,
            AssetClass::Meme => self.meme,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    pub enabled: bool,
    pub samples: usize,
    /// Upper percentile used as the conservative cost (0.9 = p90).
    pub percentile: f64,
    pub seed: u64,
    /// Relative standard deviation applied to the spread component.
    pub spread_jitter: f64,
    /// Slippage standard deviation for paths with fewer than two samples.
    pub default_slippage_std: f64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            samples: 1_000,
            percentile: 0.9,
            seed: 42,
            spread_jitter: 0.25,
            default_slippage_std: 0.002,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    pub spreads: SpreadTable,
    /// Slippage assumed for a path with no recorded samples.
    pub default_slippage_pct: f64,
    pub buffer_pct: f64,
    pub monte_carlo: MonteCarloConfig,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            spreads: SpreadTable::default(),
            default_slippage_pct: 0.003,
            buffer_pct: 0.001,
            monte_carlo: MonteCarloConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

/// Inputs for one cost estimate.
#[derive(Debug, Clone)]
pub struct CostRequest<'a> {
    pub fee_pct: f64,
    pub source: &'a str,
    pub target: &'a str,
    pub notional_usd: f64,
    pub legs: usize,
    /// Measured spread of each execution leg, if quotes were available.
    pub measured_spreads: &'a [f64],
}

/// Summary of the Monte-Carlo cost distribution (fractions of notional).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloCost {
    pub mean_pct: f64,
    pub p50_pct: f64,
    pub percentile_pct: f64,
    /// Fraction of samples where the gross edge exceeded the sampled cost.
    pub p_win: f64,
}

impl MonteCarloCost {
    /// A zero-variance distribution sitting on one total.
    pub fn point(total_pct: f64, notional_usd: f64, gross_edge_usd: f64) -> Self {
        Self {
            mean_pct: total_pct,
            p50_pct: total_pct,
            percentile_pct: total_pct,
            p_win: if gross_edge_usd - total_pct * notional_usd > 0.0 { 1.0 } else { 0.0 },
        }
    }
}

/// Full estimate handed to the scanner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostAssessment {
    pub breakdown: CostBreakdown,
    pub monte_carlo: Option<MonteCarloCost>,
    /// Conservative cost in USD.
    pub conservative_usd: f64,
}

impl CostAssessment {
    pub fn p_win(&self) -> Option<f64> {
        self.monte_carlo.map(|m| m.p_win)
    }
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

pub struct CostEstimator {
    config: CostConfig,
    registry: AssetRegistry,
}

impl CostEstimator {
    pub fn new(config: CostConfig, registry: AssetRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &CostConfig {
        &self.config
    }

    pub fn monte_carlo_enabled(&self) -> bool {
        self.config.monte_carlo.enabled
    }

    /// Spread from the class table: the wider side normally, both sides
    /// when either asset is high-volatility.
    pub fn table_spread(&self, source: &str, target: &str) -> f64 {
        let a = self.registry.classify(source);
        let b = self.registry.classify(target);
        let sa = self.config.spreads.for_class(a);
        let sb = self.config.spreads.for_class(b);
        if a.is_high_volatility() || b.is_high_volatility() {
            sa + sb
        } else {
            sa.max(sb)
        }
    }

    fn slippage(&self, stats: Option<&PathStats>) -> f64 {
        match stats {
            Some(s) if s.slippage_samples > 0 => s.slippage_mean.max(0.0),
            _ => self.config.default_slippage_pct,
        }
    }

    /// Deterministic cost breakdown.
    pub fn estimate(&self, req: &CostRequest<'_>, stats: Option<&PathStats>) -> CostBreakdown {
        let fee_pct = req.fee_pct * req.legs.max(1) as f64;
        let measured: f64 = req.measured_spreads.iter().filter(|s| s.is_finite()).sum();
        let spread_pct = self.table_spread(req.source, req.target).max(measured);
        let slippage_pct = self.slippage(stats);
        let buffer_pct = self.config.buffer_pct;

        CostBreakdown {
            fee_pct,
            spread_pct,
            slippage_pct,
            buffer_pct,
            total_pct: fee_pct + spread_pct + slippage_pct + buffer_pct,
        }
    }

    /// Sample the cost distribution around a deterministic breakdown.
    pub fn simulate(
        &self,
        base: &CostBreakdown,
        stats: Option<&PathStats>,
        notional_usd: f64,
        gross_edge_usd: f64,
    ) -> MonteCarloCost {
        let mc = &self.config.monte_carlo;
        let Ok(standard) = Normal::new(0.0, 1.0) else {
            return MonteCarloCost::point(base.total_pct, notional_usd, gross_edge_usd);
        };
        let n = mc.samples.max(1);
        let mut rng = StdRng::seed_from_u64(mc.seed);

        let slip_std = match stats {
            Some(s) if s.slippage_samples >= 2 => s.slippage_var.max(0.0).sqrt(),
            _ => mc.default_slippage_std,
        };

        let mut totals = Vec::with_capacity(n);
        let mut wins = 0usize;
        for _ in 0..n {
            let spread = (base.spread_pct * (1.0 + mc.spread_jitter * standard.sample(&mut rng))).max(0.0);
            let slippage = (base.slippage_pct + slip_std * standard.sample(&mut rng)).max(0.0);
            let total = base.fee_pct + spread + slippage + base.buffer_pct;
            if gross_edge_usd - total * notional_usd > 0.0 {
                wins += 1;
            }
            totals.push(total);
        }
        totals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        MonteCarloCost {
            mean_pct: totals.iter().sum::<f64>() / n as f64,
            p50_pct: percentile(&totals, 0.5),
            percentile_pct: percentile(&totals, mc.percentile),
            p_win: wins as f64 / n as f64,
        }
    }

    /// Deterministic estimate, plus the Monte-Carlo distribution when
    /// enabled. The conservative cost is the larger of the deterministic
    /// total and the sampled percentile.
    pub fn assess(&self, req: &CostRequest<'_>, stats: Option<&PathStats>, gross_edge_usd: f64) -> CostAssessment {
        let breakdown = self.estimate(req, stats);
        let deterministic_usd = breakdown.total_usd(req.notional_usd);

        if !self.config.monte_carlo.enabled {
            return CostAssessment {
                breakdown,
                monte_carlo: None,
                conservative_usd: deterministic_usd,
            };
        }

        let mc = self.simulate(&breakdown, stats, req.notional_usd, gross_edge_usd);
        CostAssessment {
            breakdown,
            monte_carlo: Some(mc),
            conservative_usd: deterministic_usd.max(mc.percentile_pct * req.notional_usd),
        }
    }
}

/// Nearest-rank percentile of sorted values.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p.clamp(0.0, 1.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator(mc: bool) -> CostEstimator {
        let mut config = CostConfig::default();
        config.monte_carlo.enabled = mc;
        CostEstimator::new(config, AssetRegistry::default())
    }

    fn request<'a>(source: &'a str, target: &'a str, spreads: &'a [f64]) -> CostRequest<'a> {
        CostRequest {
            fee_pct: 0.001,
            source,
            target,
            notional_usd: 100.0,
            legs: 1,
            measured_spreads: spreads,
        }
    }

    #[test]
    fn test_table_spread_rules() {
        let e = estimator(false);
        // max of stablecoin and major
        assert_eq!(e.table_spread("USDT", "ETH"), 0.001);
        assert_eq!(e.table_spread("SOL", "BTC"), 0.003);
        // meme on either side charges both
        assert!((e.table_spread("USDT", "DOGE") - 0.0085).abs() < 1e-12);
    }

    #[test]
    fn test_unseen_path_uses_default_slippage() {
        let e = estimator(false);
        let c = e.estimate(&request("USDT", "ETH", &[]), None);
        assert_eq!(c.slippage_pct, 0.003);
        assert_eq!(c.fee_pct, 0.001);
        assert!((c.total_pct - (0.001 + 0.001 + 0.003 + 0.001)).abs() < 1e-12);
        assert!((c.total_usd(100.0) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_history_slippage_and_leg_fees() {
        let e = estimator(false);
        let stats = PathStats {
            slippage_mean: 0.0004,
            slippage_samples: 5,
            ..Default::default()
        };
        let mut req = request("SOL", "ETH", &[]);
        req.legs = 2;
        let c = e.estimate(&req, Some(&stats));
        assert_eq!(c.slippage_pct, 0.0004);
        assert_eq!(c.fee_pct, 0.002);
    }

    #[test]
    fn test_wider_measured_spread_overrides_table() {
        let e = estimator(false);
        let c = e.estimate(&request("USDT", "ETH", &[0.004, 0.002]), None);
        assert!((c.spread_pct - 0.006).abs() < 1e-12);
        let c = e.estimate(&request("USDT", "ETH", &[0.0002]), None);
        assert_eq!(c.spread_pct, 0.001);
    }

    #[test]
    fn test_monte_carlo_deterministic_for_fixed_seed() {
        let e = estimator(true);
        let req = request("USDT", "ETH", &[]);
        let a = e.assess(&req, None, 1.0);
        let b = e.assess(&req, None, 1.0);
        assert_eq!(a, b);
        let mc = a.monte_carlo.unwrap();
        assert!(mc.p50_pct <= mc.percentile_pct);
        assert!(a.conservative_usd >= a.breakdown.total_usd(100.0));
        assert!((0.0..=1.0).contains(&mc.p_win));
    }

    #[test]
    fn test_p_win_extremes() {
        let e = estimator(true);
        let req = request("USDT", "ETH", &[]);
        assert_eq!(e.assess(&req, None, 50.0).p_win(), Some(1.0));
        assert_eq!(e.assess(&req, None, 0.0).p_win(), Some(0.0));
    }

    #[test]
    fn test_deterministic_mode_has_no_p_win() {
        let e = estimator(false);
        let a = e.assess(&request("USDT", "ETH", &[]), None, 1.0);
        assert!(a.p_win().is_none());
        assert!((a.conservative_usd - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_point_distribution() {
        let p = MonteCarloCost::point(0.006, 100.0, 1.0);
        assert_eq!(p.p50_pct, 0.006);
        assert_eq!(p.percentile_pct, 0.006);
        assert_eq!(p.p_win, 1.0);
        assert_eq!(MonteCarloCost::point(0.006, 100.0, 0.5).p_win, 0.0);
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        assert_eq!(percentile(&v, 0.9), 9.0);
        assert_eq!(percentile(&v, 0.5), 5.0);
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }
}
