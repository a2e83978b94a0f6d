//! Path ledger.
//!
//! Per (source, target, venue) win/loss history with streak-based
//! temporary blocking. A path that loses `block_threshold` times in a
//! row is blocked for `cooldown_cycles`; on expiry it gets a fresh
//! trial with a reset streak. With mirroring on, the reverse path is
//! held for the same window, and a win on either direction lifts the
//! mirrored hold. Also keeps the slippage EWMA used by the cost
//! estimator. Backed by a JSON snapshot.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::storage;
use crate::types::{PathKey, PathStats};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Minimum USD P&L counted as a win.
    pub win_threshold_usd: f64,
    /// Consecutive losses that trigger a block.
    pub block_threshold: u32,
    /// Length of a loss-streak block.
    pub cooldown_cycles: u64,
    /// Block B->A on the same venue whenever A->B is blocked.
    pub mirror_reverse: bool,
    /// Save the snapshot after this many recorded results (0 = only on flush).
    pub autosave_every: u64,
    /// EWMA smoothing factor for slippage.
    pub slippage_alpha: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            win_threshold_usd: 0.01,
            block_threshold: 3,
            cooldown_cycles: 50,
            mirror_reverse: true,
            autosave_every: 10,
            slippage_alpha: 0.2,
        }
    }
}

// ---------------------------------------------------------------------------
// Block status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Open,
    LossStreak { until: u64 },
    Mirrored { until: u64 },
}

impl BlockStatus {
    pub fn is_blocked(&self) -> bool {
        !matches!(self, BlockStatus::Open)
    }
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockStatus::Open => write!(f, "open"),
            BlockStatus::LossStreak { until } => write!(f, "loss streak, blocked until cycle {until}"),
            BlockStatus::Mirrored { until } => {
                write!(f, "reverse path blocked, mirrored until cycle {until}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct LedgerEntry {
    key: PathKey,
    stats: PathStats,
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerSnapshot {
    saved_at: DateTime<Utc>,
    paths: Vec<LedgerEntry>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct PathLedger {
    config: LedgerConfig,
    paths: HashMap<PathKey, PathStats>,
    file: Option<PathBuf>,
    unsaved: u64,
}

impl PathLedger {
    /// In-memory ledger with no backing file.
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            paths: HashMap::new(),
            file: None,
            unsaved: 0,
        }
    }

    /// Ledger backed by `file`, loading any existing snapshot.
    pub fn open(config: LedgerConfig, file: impl AsRef<Path>) -> Result<Self> {
        let file = file.as_ref().to_path_buf();
        let mut ledger = Self::new(config);
        if let Some(snapshot) = storage::load_json::<LedgerSnapshot>(&file)? {
            ledger.paths = snapshot.paths.into_iter().map(|e| (e.key, e.stats)).collect();
            info!(
                path = %file.display(),
                paths = ledger.paths.len(),
                saved_at = %snapshot.saved_at,
                "Path ledger loaded"
            );
        }
        ledger.file = Some(file);
        Ok(ledger)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn stats(&self, key: &PathKey) -> Option<&PathStats> {
        self.paths.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathKey, &PathStats)> {
        self.paths.iter()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn is_blocked(&self, key: &PathKey, cycle: u64) -> BlockStatus {
        let Some(stats) = self.paths.get(key) else {
            return BlockStatus::Open;
        };
        if let Some(until) = stats.blocked_until.filter(|u| cycle < *u) {
            return BlockStatus::LossStreak { until };
        }
        if let Some(until) = stats.mirrored_until.filter(|u| cycle < *u) {
            return BlockStatus::Mirrored { until };
        }
        BlockStatus::Open
    }

    pub fn blocked_count(&self, cycle: u64) -> usize {
        self.paths
            .keys()
            .filter(|k| self.is_blocked(k, cycle).is_blocked())
            .count()
    }

    /// Lift every block whose window has passed. Expired loss-streak
    /// blocks also reset the streak.
    pub fn expire_blocks(&mut self, cycle: u64) -> usize {
        let mut lifted = 0;
        for (key, stats) in self.paths.iter_mut() {
            if Self::expire_one(key, stats, cycle) {
                lifted += 1;
            }
        }
        lifted
    }

    fn expire_one(key: &PathKey, stats: &mut PathStats, cycle: u64) -> bool {
        let mut lifted = false;
        if stats.blocked_until.is_some_and(|u| cycle >= u) {
            stats.blocked_until = None;
            stats.consecutive_losses = 0;
            lifted = true;
            info!(path = %key, cycle, "Path block expired, fresh trial");
        }
        if stats.mirrored_until.is_some_and(|u| cycle >= u) {
            stats.mirrored_until = None;
            lifted = true;
        }
        lifted
    }

    /// Record a completed conversion. Returns true if this result
    /// started a new block.
    pub fn record_result(&mut self, key: &PathKey, pnl: f64, cycle: u64) -> bool {
        let win = pnl >= self.config.win_threshold_usd;
        self.record(key, pnl, win, cycle)
    }

    /// Record an execution failure as a zero-P&L loss.
    pub fn record_failure(&mut self, key: &PathKey, cycle: u64) -> bool {
        self.record(key, 0.0, false, cycle)
    }

    fn record(&mut self, key: &PathKey, pnl: f64, win: bool, cycle: u64) -> bool {
        let threshold = self.config.block_threshold;
        let cooldown = self.config.cooldown_cycles;

        let stats = self.paths.entry(key.clone()).or_default();
        Self::expire_one(key, stats, cycle);

        stats.trades += 1;
        stats.total_profit += pnl;

        let mut new_block = None;
        if win {
            stats.wins += 1;
            stats.consecutive_losses = 0;
            stats.blocked_until = None;
            stats.mirrored_until = None;
        } else {
            stats.losses += 1;
            stats.consecutive_losses += 1;
            if stats.consecutive_losses >= threshold && stats.blocked_until.is_none() {
                let until = cycle + cooldown;
                stats.blocked_until = Some(until);
                new_block = Some(until);
            }
        }
        debug!(path = %key, pnl, win, stats = %stats, "Path result recorded");

        if win && self.config.mirror_reverse {
            if let Some(reverse) = self.paths.get_mut(&key.reverse()) {
                reverse.mirrored_until = None;
            }
        }

        if let Some(until) = new_block {
            warn!(
                path = %key,
                streak = threshold,
                until,
                "Path blocked after consecutive losses"
            );
            if self.config.mirror_reverse {
                let reverse = self.paths.entry(key.reverse()).or_default();
                reverse.mirrored_until = Some(reverse.mirrored_until.map_or(until, |u| u.max(until)));
            }
        }

        self.note_change();
        new_block.is_some()
    }

    /// Count an outlier result without touching the aggregates.
    pub fn record_anomaly(&mut self, key: &PathKey) {
        let stats = self.paths.entry(key.clone()).or_default();
        stats.anomalies += 1;
        warn!(path = %key, anomalies = stats.anomalies, "Anomalous result excluded from learning");
    }

    /// Fold an observed slippage fraction into the path's EWMA.
    pub fn record_slippage(&mut self, key: &PathKey, pct: f64) {
        if !pct.is_finite() {
            return;
        }
        let alpha = self.config.slippage_alpha.clamp(0.0, 1.0);
        let stats = self.paths.entry(key.clone()).or_default();
        if stats.slippage_samples == 0 {
            stats.slippage_mean = pct;
            stats.slippage_var = 0.0;
        } else {
            let diff = pct - stats.slippage_mean;
            let incr = alpha * diff;
            stats.slippage_mean += incr;
            stats.slippage_var = (1.0 - alpha) * (stats.slippage_var + diff * incr);
        }
        stats.slippage_samples += 1;
    }

    fn note_change(&mut self) {
        self.unsaved += 1;
        let every = self.config.autosave_every;
        if every > 0 && self.unsaved >= every {
            if let Err(e) = self.save() {
                warn!(error = %e, "Path ledger autosave failed");
            }
        }
    }

    /// Write the snapshot, if the ledger has a backing file.
    pub fn save(&mut self) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let mut paths: Vec<LedgerEntry> = self
            .paths
            .iter()
            .map(|(k, s)| LedgerEntry {
                key: k.clone(),
                stats: s.clone(),
            })
            .collect();
        paths.sort_by(|a, b| a.key.cmp(&b.key));
        let snapshot = LedgerSnapshot {
            saved_at: Utc::now(),
            paths,
        };
        storage::save_json(&snapshot, file)?;
        debug!(path = %file.display(), paths = self.paths.len(), "Path ledger saved");
        self.unsaved = 0;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
