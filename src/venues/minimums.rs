//! Minimum order book-keeping.
//!
//! Merges three sources of per-pair minimums: the static per-asset
//! table from config, filters last fetched from the venue, and
//! minimums learned from repeated "below minimum" rejections. Also
//! tracks per-pair rejection counters and the temporary pre-execution
//! block they trigger (distinct from the path ledger's loss blocks).

use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::VenueConfig;
use crate::types::{Pair, SymbolFilters};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MinimumConfig {
    /// Rejections on one pair before it is blocked and its minimum raised.
    pub rejection_threshold: u32,
    /// Length of the pre-execution block.
    pub block_cycles: u64,
    /// Multiplier applied to the rejected notional to form a learned minimum.
    pub learned_bump: f64,
    /// Cycles a learned minimum stays in force.
    pub learned_ttl_cycles: u64,
}

impl Default for MinimumConfig {
    fn default() -> Self {
        Self {
            rejection_threshold: 3,
            block_cycles: 10,
            learned_bump: 1.25,
            learned_ttl_cycles: 500,
        }
    }
}

type PairKey = (String, Pair);

#[derive(Debug, Clone, Copy)]
struct Learned {
    min_notional: f64,
    expires_at: u64,
}

#[derive(Debug, Clone, Copy)]
struct StaticLimits {
    min_notional: f64,
}

pub struct MinimumBook {
    config: MinimumConfig,
    statics: HashMap<String, StaticLimits>,
    static_qty: HashMap<(String, String), f64>,
    live: HashMap<PairKey, SymbolFilters>,
    learned: HashMap<PairKey, Learned>,
    rejections: HashMap<PairKey, u32>,
    blocked: HashMap<PairKey, u64>,
}

impl MinimumBook {
    pub fn new(config: MinimumConfig) -> Self {
        Self {
            config,
            statics: HashMap::new(),
            static_qty: HashMap::new(),
            live: HashMap::new(),
            learned: HashMap::new(),
            rejections: HashMap::new(),
            blocked: HashMap::new(),
        }
    }

    /// Build a book seeded with every venue's static table.
    pub fn from_venues(config: MinimumConfig, venues: &[VenueConfig]) -> Self {
        let mut book = Self::new(config);
        for v in venues {
            book.register_venue(v);
        }
        book
    }

    pub fn register_venue(&mut self, venue: &VenueConfig) {
        self.statics.insert(
            venue.name.clone(),
            StaticLimits {
                min_notional: venue.min_notional_usd,
            },
        );
        for pair in venue.parsed_pairs() {
            let qty = venue.static_min_qty(&pair.base);
            if qty > 0.0 {
                self.static_qty.insert((venue.name.clone(), pair.base.clone()), qty);
            }
        }
    }

    /// Venue-wide minimum notional from the static table.
    pub fn venue_min_notional(&self, venue: &str) -> f64 {
        self.statics.get(venue).map(|s| s.min_notional).unwrap_or(0.0)
    }

    /// Effective limits for a pair: the strictest of static, live and
    /// unexpired learned values.
    pub fn limits(&self, venue: &str, pair: &Pair, cycle: u64) -> SymbolFilters {
        let key = (venue.to_string(), pair.clone());
        let live = self.live.get(&key).copied().unwrap_or_default();
        let static_qty = self
            .static_qty
            .get(&(venue.to_string(), pair.base.clone()))
            .copied()
            .unwrap_or(0.0);
        let learned = self
            .learned
            .get(&key)
            .filter(|l| cycle < l.expires_at)
            .map(|l| l.min_notional)
            .unwrap_or(0.0);

        SymbolFilters {
            min_qty: live.min_qty.max(static_qty),
            min_notional: live.min_notional.max(self.venue_min_notional(venue)).max(learned),
            step_size: live.step_size,
        }
    }

    /// Merge live filters into explicitly provided ones.
    pub fn merge(&self, venue: &str, pair: &Pair, fetched: SymbolFilters, cycle: u64) -> SymbolFilters {
        let known = self.limits(venue, pair, cycle);
        SymbolFilters {
            min_qty: known.min_qty.max(fetched.min_qty),
            min_notional: known.min_notional.max(fetched.min_notional),
            step_size: if fetched.step_size > 0.0 { fetched.step_size } else { known.step_size },
        }
    }

    pub fn update_live(&mut self, venue: &str, pair: &Pair, filters: SymbolFilters) {
        self.live.insert((venue.to_string(), pair.clone()), filters);
    }

    /// Count a below-minimum rejection. Past the threshold the pair is
    /// blocked and a learned minimum above both the attempted notional
    /// and the limit already in force is recorded. Returns true when
    /// the block was triggered.
    pub fn record_rejection(&mut self, venue: &str, pair: &Pair, attempted_notional: f64, cycle: u64) -> bool {
        let known = self.limits(venue, pair, cycle).min_notional;
        let key = (venue.to_string(), pair.clone());
        let count = self.rejections.entry(key.clone()).or_insert(0);
        *count += 1;
        debug!(venue, %pair, count = *count, "Minimum rejection recorded");
        if *count < self.config.rejection_threshold {
            return false;
        }
        self.rejections.remove(&key);

        let until = cycle + self.config.block_cycles;
        self.blocked.insert(key.clone(), until);

        let bumped = known.max(attempted_notional) * self.config.learned_bump;
        let entry = self.learned.entry(key).or_insert(Learned {
            min_notional: 0.0,
            expires_at: 0,
        });
        entry.min_notional = entry.min_notional.max(bumped);
        entry.expires_at = cycle + self.config.learned_ttl_cycles;

        warn!(
            venue,
            %pair,
            blocked_until = until,
            learned_min_notional = format!("${:.2}", entry.min_notional),
            "Pair blocked after repeated minimum rejections"
        );
        true
    }

    /// A successful submission clears the rejection counter.
    pub fn record_success(&mut self, venue: &str, pair: &Pair) {
        self.rejections.remove(&(venue.to_string(), pair.clone()));
    }

    pub fn is_blocked(&self, venue: &str, pair: &Pair, cycle: u64) -> bool {
        self.blocked
            .get(&(venue.to_string(), pair.clone()))
            .map(|until| cycle < *until)
            .unwrap_or(false)
    }

    pub fn rejection_count(&self, venue: &str, pair: &Pair) -> u32 {
        self.rejections
            .get(&(venue.to_string(), pair.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Drop expired blocks and learned minimums.
    pub fn expire(&mut self, cycle: u64) {
        self.blocked.retain(|_, until| cycle < *until);
        self.learned.retain(|_, l| cycle < l.expires_at);
    }
}
