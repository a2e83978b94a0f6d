//! Rolling per-asset momentum.
//!
//! Keeps a short time-ordered price history per asset and reports the
//! fractional change per minute across the window. Histories live in a
//! sharded concurrent map, so updates for different assets never
//! contend.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::VecDeque;

use crate::types::{canonical, Asset};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    /// History retained per asset.
    pub window_secs: u64,
    /// Below this span between oldest and newest sample, momentum is 0.
    pub min_elapsed_secs: u64,
    /// Cap on |momentum| (fraction per minute).
    pub max_abs_per_min: f64,
    /// Hard bound on samples kept per asset.
    pub max_samples: usize,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            min_elapsed_secs: 5,
            max_abs_per_min: 0.05,
            max_samples: 512,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: DateTime<Utc>,
    price: f64,
}

pub struct MomentumTracker {
    config: MomentumConfig,
    history: DashMap<Asset, VecDeque<Sample>>,
}

impl MomentumTracker {
    pub fn new(config: MomentumConfig) -> Self {
        Self {
            config,
            history: DashMap::new(),
        }
    }

    /// Record a price observed now.
    pub fn update(&self, asset: &str, price: f64) {
        self.update_at(asset, price, Utc::now());
    }

    /// Record a price observed at `at`. Out-of-order samples are dropped.
    pub fn update_at(&self, asset: &str, price: f64, at: DateTime<Utc>) {
        if !price.is_finite() || price <= 0.0 {
            return;
        }
        let window = Duration::seconds(self.config.window_secs as i64);
        let mut samples = self.history.entry(canonical(asset)).or_default();
        if let Some(last) = samples.back() {
            if at < last.at {
                return;
            }
        }
        samples.push_back(Sample { at, price });
        let cutoff = at - window;
        while samples.front().map(|s| s.at < cutoff).unwrap_or(false) {
            samples.pop_front();
        }
        while samples.len() > self.config.max_samples.max(2) {
            samples.pop_front();
        }
    }

    /// Fractional change per minute between the oldest in-window sample
    /// and the newest, clamped to the configured cap.
    pub fn momentum(&self, asset: &str) -> f64 {
        let Some(samples) = self.history.get(&canonical(asset)) else {
            return 0.0;
        };
        let (Some(first), Some(last)) = (samples.front(), samples.back()) else {
            return 0.0;
        };
        if samples.len() < 2 {
            return 0.0;
        }
        let elapsed_ms = (last.at - first.at).num_milliseconds();
        if elapsed_ms < (self.config.min_elapsed_secs as i64) * 1000 || elapsed_ms <= 0 {
            return 0.0;
        }
        let change = (last.price - first.price) / first.price;
        let per_minute = change / (elapsed_ms as f64 / 60_000.0);
        let cap = self.config.max_abs_per_min.abs();
        per_minute.clamp(-cap, cap)
    }

    pub fn sample_count(&self, asset: &str) -> usize {
        self.history.get(&canonical(asset)).map(|s| s.len()).unwrap_or(0)
    }

    /// Latest recorded price for an asset.
    pub fn last_price(&self, asset: &str) -> Option<f64> {
        self.history
            .get(&canonical(asset))
            .and_then(|s| s.back().map(|x| x.price))
    }
}
