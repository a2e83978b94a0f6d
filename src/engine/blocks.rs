//! Source-level and anti-repeat blocks.
//!
//! Two kinds of short-lived cycle-based blocks owned by the scheduler:
//! per (venue, asset) source blocks ("too small repeatedly", "spread too
//! high") and the anti-repeat cooldown on (venue, source, target)
//! triples that just failed a soft rejection.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::types::{canonical, Asset};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    /// Below-minimum rejections of a source before it is blocked.
    pub too_small_threshold: u32,
    /// Length of a "too small" source block.
    pub too_small_cycles: u64,
    /// Length of a "spread too high" source block.
    pub spread_cycles: u64,
    /// Cooldown on a (venue, source, target) after a soft rejection.
    pub anti_repeat_cycles: u64,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            too_small_threshold: 3,
            too_small_cycles: 20,
            spread_cycles: 10,
            anti_repeat_cycles: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Block book
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceBlockReason {
    TooSmall,
    SpreadTooHigh,
}

impl fmt::Display for SourceBlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceBlockReason::TooSmall => write!(f, "too small repeatedly"),
            SourceBlockReason::SpreadTooHigh => write!(f, "spread too high"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SourceBlock {
    reason: SourceBlockReason,
    until: u64,
}

type SourceKey = (String, Asset);
type TripleKey = (String, Asset, Asset);

#[derive(Debug, Default)]
pub struct BlockBook {
    config: BlockConfig,
    sources: HashMap<SourceKey, SourceBlock>,
    too_small: HashMap<SourceKey, u32>,
    attempts: HashMap<TripleKey, u64>,
}

impl BlockBook {
    pub fn new(config: BlockConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    fn source_key(venue: &str, asset: &str) -> SourceKey {
        (venue.to_string(), canonical(asset))
    }

    /// Active block on a source asset, if any.
    pub fn source_block(&self, venue: &str, asset: &str, cycle: u64) -> Option<SourceBlockReason> {
        self.sources
            .get(&Self::source_key(venue, asset))
            .filter(|b| cycle < b.until)
            .map(|b| b.reason)
    }

    /// Block a source whose pair spread exceeded the gate maximum.
    pub fn mark_spread(&mut self, venue: &str, asset: &str, cycle: u64) {
        let until = cycle + self.config.spread_cycles;
        debug!(venue, asset, until, "Source blocked: spread too high");
        self.sources.insert(
            Self::source_key(venue, asset),
            SourceBlock {
                reason: SourceBlockReason::SpreadTooHigh,
                until,
            },
        );
    }

    /// Count a below-minimum rejection of a source. Returns true when the
    /// count reached the threshold and the source was blocked.
    pub fn record_too_small(&mut self, venue: &str, asset: &str, cycle: u64) -> bool {
        let key = Self::source_key(venue, asset);
        let count = self.too_small.entry(key.clone()).or_insert(0);
        *count += 1;
        if *count < self.config.too_small_threshold {
            return false;
        }
        self.too_small.remove(&key);
        let until = cycle + self.config.too_small_cycles;
        debug!(venue, asset, until, "Source blocked: too small repeatedly");
        self.sources.insert(
            key,
            SourceBlock {
                reason: SourceBlockReason::TooSmall,
                until,
            },
        );
        true
    }

    /// A source that cleared its minimums starts counting from zero again.
    pub fn clear_too_small(&mut self, venue: &str, asset: &str) {
        self.too_small.remove(&Self::source_key(venue, asset));
    }

    /// Start the anti-repeat cooldown for a triple.
    pub fn mark_attempt(&mut self, venue: &str, source: &str, target: &str, cycle: u64) {
        self.attempts.insert(
            (venue.to_string(), canonical(source), canonical(target)),
            cycle + self.config.anti_repeat_cycles,
        );
    }

    pub fn recently_attempted(&self, venue: &str, source: &str, target: &str, cycle: u64) -> bool {
        self.attempts
            .get(&(venue.to_string(), canonical(source), canonical(target)))
            .map(|until| cycle < *until)
            .unwrap_or(false)
    }

    /// Drop blocks and cooldowns that have lifted.
    pub fn expire(&mut self, cycle: u64) {
        self.sources.retain(|_, b| cycle < b.until);
        self.attempts.retain(|_, until| cycle < *until);
    }

    pub fn active_source_blocks(&self) -> usize {
        self.sources.len()
    }
}
