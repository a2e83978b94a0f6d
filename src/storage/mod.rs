//! Persistence layer.
//!
//! JSON snapshots (session state, path ledger) and the append-only
//! JSONL audit log of conversion results. Everything is reloaded at
//! startup.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::{ConversionResult, SessionState};

/// Default state file path.
const DEFAULT_STATE_FILE: &str = "hopper_state.json";

// ---------------------------------------------------------------------------
// Generic JSON snapshots
// ---------------------------------------------------------------------------

/// Write `value` as pretty JSON, replacing the file atomically via a
/// temporary sibling.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise snapshot")?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Load a JSON snapshot. Returns None if the file doesn't exist.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Delete a file if present.
pub fn delete_file(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to delete {}", path.display()))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Save session state to a JSON file.
pub fn save_state(state: &SessionState, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    save_json(state, Path::new(path)).context("Failed to save session state")?;
    debug!(path, cycle = state.cycle_count, "State saved");
    Ok(())
}

/// Load session state from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_state(path: Option<&str>) -> Result<Option<SessionState>> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    let Some(state) = load_json::<SessionState>(Path::new(path))? else {
        info!(path, "No saved state found, starting fresh");
        return Ok(None);
    };

    info!(
        path,
        cycle_count = state.cycle_count,
        executions = state.executions,
        pnl = format!("${:.2}", state.realized_pnl),
        "State loaded from disk"
    );
    Ok(Some(state))
}

/// Delete the state file (for testing or reset).
pub fn delete_state(path: Option<&str>) -> Result<()> {
    delete_file(Path::new(path.unwrap_or(DEFAULT_STATE_FILE)))
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

/// Append-only JSONL log of conversion results.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one result as a single JSON line.
    pub fn append(&self, result: &ConversionResult) -> Result<()> {
        let line = serde_json::to_string(result).context("Failed to serialise result")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open audit log {}", self.path.display()))?;
        writeln!(file, "{line}").context("Failed to append to audit log")?;
        Ok(())
    }

    /// Reload every result. Malformed lines are skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<ConversionResult>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Failed to open audit log {}", self.path.display()))?;
        let mut results = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.context("Failed to read audit log line")?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ConversionResult>(&line) {
                Ok(r) => results.push(r),
                Err(e) => warn!(line = idx + 1, error = %e, "Skipping malformed audit record"),
            }
        }
        Ok(results)
    }

    /// The most recent `n` results, oldest first.
    pub fn tail(&self, n: usize) -> Result<Vec<ConversionResult>> {
        let mut all = self.load_all()?;
        let skip = all.len().saturating_sub(n);
        Ok(all.split_off(skip))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
