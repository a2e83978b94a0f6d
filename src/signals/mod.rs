//! Auxiliary score inputs.
//!
//! Two seams feed the scanner's combined score beyond momentum and path
//! history:
//!
//! - `Signal`: an opaque input scored in [0, 1], contributing
//!   `weight × score`.
//! - `ScoreAdjuster`: a versioned rule returning a signed score delta.
//!
//! Both come from a fixed catalogue compiled into the binary. Config
//! selects entries by name (and version for adjusters); unknown entries
//! are rejected at startup.

use anyhow::{bail, Result};
use serde::Deserialize;
use tracing::info;

use crate::types::{AssetRegistry, ConversionOpportunity, VenueSnapshot};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// What a signal may look at.
pub struct SignalContext<'a> {
    pub opportunity: &'a ConversionOpportunity,
    pub snapshot: &'a VenueSnapshot,
    pub registry: &'a AssetRegistry,
}

pub trait Signal: Send + Sync {
    fn name(&self) -> &str;

    /// Score in [0, 1]; out-of-range values are clamped by the registry.
    fn score(&self, ctx: &SignalContext<'_>) -> f64;
}

pub trait ScoreAdjuster: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> u32;

    /// Signed delta added to the combined score.
    fn evaluate(&self, opportunity: &ConversionOpportunity) -> f64;
}

// ---------------------------------------------------------------------------
// Catalogue
// ---------------------------------------------------------------------------

/// Liquidity of the first leg's pair, log-scaled 24h quote volume.
struct Liquidity;

impl Signal for Liquidity {
    fn name(&self) -> &str {
        "liquidity"
    }

    fn score(&self, ctx: &SignalContext<'_>) -> f64 {
        let pair = ctx.opportunity.first_pair();
        let Some(tick) = ctx.snapshot.ticker(pair) else {
            return 0.0;
        };
        let quote_usd = ctx.snapshot.usd_price(&pair.quote, ctx.registry).unwrap_or(0.0);
        let volume_usd = tick.volume * quote_usd;
        if volume_usd <= 1.0 {
            return 0.0;
        }
        // $1B/day saturates
        (volume_usd.log10() / 9.0).clamp(0.0, 1.0)
    }
}

/// Tightness of the widest leg spread; 1% or wider scores 0.
struct SpreadQuality;

impl Signal for SpreadQuality {
    fn name(&self) -> &str {
        "spread_quality"
    }

    fn score(&self, ctx: &SignalContext<'_>) -> f64 {
        (1.0 - ctx.opportunity.max_spread_pct() / 0.01).clamp(0.0, 1.0)
    }
}

/// Favors rotating out of a falling asset into a rising one and
/// penalizes buying into a falling target.
struct TrendAgreementV1;

impl ScoreAdjuster for TrendAgreementV1 {
    fn name(&self) -> &str {
        "trend_agreement"
    }

    fn version(&self) -> u32 {
        1
    }

    fn evaluate(&self, opp: &ConversionOpportunity) -> f64 {
        if opp.target_momentum < 0.0 {
            -0.05
        } else if opp.target_momentum > 0.0 && opp.source_momentum < 0.0 {
            0.05
        } else {
            0.0
        }
    }
}

/// Penalizes opportunities whose cost eats most of the gross edge.
struct CostDragV1;

impl ScoreAdjuster for CostDragV1 {
    fn name(&self) -> &str {
        "cost_drag"
    }

    fn version(&self) -> u32 {
        1
    }

    fn evaluate(&self, opp: &ConversionOpportunity) -> f64 {
        if opp.forecast_gross_edge <= 0.0 {
            return 0.0;
        }
        let ratio = opp.estimated_cost / opp.forecast_gross_edge;
        -(0.1 * ratio).clamp(0.0, 0.1)
    }
}

fn catalogue_signal(name: &str) -> Option<Box<dyn Signal>> {
    match name {
        "liquidity" => Some(Box::new(Liquidity)),
        "spread_quality" => Some(Box::new(SpreadQuality)),
        _ => None,
    }
}

fn catalogue_adjuster(name: &str, version: u32) -> Option<Box<dyn ScoreAdjuster>> {
    match (name, version) {
        ("trend_agreement", 1) => Some(Box::new(TrendAgreementV1)),
        ("cost_drag", 1) => Some(Box::new(CostDragV1)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SignalEntry {
    pub name: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdjusterEntry {
    pub name: String,
    pub version: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalsConfig {
    pub signals: Vec<SignalEntry>,
    pub adjusters: Vec<AdjusterEntry>,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            signals: vec![
                SignalEntry {
                    name: "liquidity".to_string(),
                    weight: 0.05,
                },
                SignalEntry {
                    name: "spread_quality".to_string(),
                    weight: 0.05,
                },
            ],
            adjusters: vec![AdjusterEntry {
                name: "trend_agreement".to_string(),
                version: 1,
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered, validated set of signals and adjusters.
#[derive(Default)]
pub struct SignalRegistry {
    signals: Vec<(Box<dyn Signal>, f64)>,
    adjusters: Vec<Box<dyn ScoreAdjuster>>,
}

impl SignalRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolve config entries against the catalogue.
    pub fn from_config(config: &SignalsConfig) -> Result<Self> {
        let mut registry = Self::empty();
        for entry in &config.signals {
            if !entry.weight.is_finite() || entry.weight < 0.0 {
                bail!("Signal '{}' has invalid weight {}", entry.name, entry.weight);
            }
            let Some(signal) = catalogue_signal(&entry.name) else {
                bail!("Unknown signal '{}'", entry.name);
            };
            registry.signals.push((signal, entry.weight));
        }
        for entry in &config.adjusters {
            let Some(adjuster) = catalogue_adjuster(&entry.name, entry.version) else {
                bail!("Unknown score adjuster '{}' v{}", entry.name, entry.version);
            };
            registry.adjusters.push(adjuster);
        }
        info!(
            signals = registry.signals.len(),
            adjusters = registry.adjusters.len(),
            "Signal registry ready"
        );
        Ok(registry)
    }

    pub fn with_signal(mut self, signal: Box<dyn Signal>, weight: f64) -> Self {
        self.signals.push((signal, weight));
        self
    }

    pub fn with_adjuster(mut self, adjuster: Box<dyn ScoreAdjuster>) -> Self {
        self.adjusters.push(adjuster);
        self
    }

    /// Σ weight × clamped score.
    pub fn weighted_score(&self, ctx: &SignalContext<'_>) -> f64 {
        self.signals
            .iter()
            .map(|(s, w)| {
                let score = s.score(ctx);
                let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
                w * score
            })
            .sum()
    }

    /// Σ adjuster deltas; non-finite deltas count as zero.
    pub fn adjustment(&self, opportunity: &ConversionOpportunity) -> f64 {
        self.adjusters
            .iter()
            .map(|a| a.evaluate(opportunity))
            .filter(|d| d.is_finite())
            .sum()
    }

    pub fn names(&self) -> Vec<String> {
        self.signals
            .iter()
            .map(|(s, _)| s.name().to_string())
            .chain(self.adjusters.iter().map(|a| format!("{}@v{}", a.name(), a.version())))
            .collect()
    }
}
