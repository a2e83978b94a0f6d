//! Status API route handlers.
//!
//! All endpoints return JSON. The scheduler publishes a snapshot after
//! every cycle; handlers only ever read it.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::engine::scheduler::{CycleReport, Scheduler, VenueHealth};
use crate::storage::AuditLog;
use crate::strategy::paths::PathLedger;
use crate::types::{Asset, ConversionResult, PathStats, SessionState};

const DEFAULT_AUDIT_LIMIT: usize = 50;
const MAX_AUDIT_LIMIT: usize = 500;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub agent: String,
    pub session: RwLock<SessionState>,
    pub last_cycle: RwLock<Option<CycleReport>>,
    pub paths: RwLock<Vec<PathView>>,
    pub venues: RwLock<Vec<VenueHealth>>,
    audit: Option<AuditLog>,
}

impl DashboardState {
    pub fn new(agent: impl Into<String>, session: SessionState, audit: Option<AuditLog>) -> Self {
        Self {
            agent: agent.into(),
            session: RwLock::new(session),
            last_cycle: RwLock::new(None),
            paths: RwLock::new(Vec::new()),
            venues: RwLock::new(Vec::new()),
            audit,
        }
    }

    /// Replace the snapshot with the scheduler's view after a cycle.
    pub async fn publish(&self, scheduler: &Scheduler, report: &CycleReport) {
        let session = scheduler.state().clone();
        let paths = PathView::collect(scheduler.ledger(), session.cycle_count);
        *self.session.write().await = session;
        *self.last_cycle.write().await = Some(report.clone());
        *self.paths.write().await = paths;
        *self.venues.write().await = scheduler.venue_health();
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub agent: String,
    pub cycle_count: u64,
    pub executions: u64,
    pub verified: u64,
    pub wins: u64,
    pub losses: u64,
    pub outliers: u64,
    pub win_rate: f64,
    pub realized_pnl: f64,
    pub uptime_secs: i64,
    pub last_cycle: Option<CycleReport>,
}

/// One ledger path as shown to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct PathView {
    pub venue: String,
    pub source: Asset,
    pub target: Asset,
    pub status: String,
    pub stats: PathStats,
}

impl PathView {
    /// Every known path, most traded first.
    pub fn collect(ledger: &PathLedger, cycle: u64) -> Vec<PathView> {
        let mut views: Vec<PathView> = ledger
            .iter()
            .map(|(key, stats)| PathView {
                venue: key.venue.clone(),
                source: key.source.clone(),
                target: key.target.clone(),
                status: ledger.is_blocked(key, cycle).to_string(),
                stats: stats.clone(),
            })
            .collect();
        views.sort_by(|a, b| {
            b.stats
                .trades
                .cmp(&a.stats.trades)
                .then_with(|| (&a.venue, &a.source, &a.target).cmp(&(&b.venue, &b.source, &b.target)))
        });
        views
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let session = state.session.read().await;
    let last_cycle = state.last_cycle.read().await.clone();
    Json(StatusResponse {
        agent: state.agent.clone(),
        cycle_count: session.cycle_count,
        executions: session.executions,
        verified: session.verified,
        wins: session.wins,
        losses: session.losses,
        outliers: session.outliers,
        win_rate: session.win_rate(),
        realized_pnl: session.realized_pnl,
        uptime_secs: session.uptime().num_seconds(),
        last_cycle,
    })
}

/// GET /api/paths
pub async fn get_paths(State(state): State<AppState>) -> Json<Vec<PathView>> {
    Json(state.paths.read().await.clone())
}

/// GET /api/venues
pub async fn get_venues(State(state): State<AppState>) -> Json<Vec<VenueHealth>> {
    Json(state.venues.read().await.clone())
}

/// GET /api/audit?limit=N
pub async fn get_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<ConversionResult>>, StatusCode> {
    let Some(audit) = state.audit.clone() else {
        return Ok(Json(Vec::new()));
    };
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).min(MAX_AUDIT_LIMIT);
    let records = tokio::task::spawn_blocking(move || audit.tail(limit))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|e| {
            warn!(error = %e, "Audit log read failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(records))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
