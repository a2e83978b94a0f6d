//! HOPPER: cost-gated multi-venue asset conversion engine.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the session and path ledger from disk, and runs the
//! scheduler loop with graceful shutdown.

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use hopper::config::AppConfig;
use hopper::dashboard::{self, DashboardState};
use hopper::engine::scheduler::{pause_between_cycles, Scheduler};
use hopper::storage::{self, AuditLog};
use hopper::strategy::paths::PathLedger;
use hopper::types::SessionState;
use hopper::venues::paper::PaperVenue;
use hopper::venues::VenueHandle;

const BANNER: &str = r#"
 _   _  ___  ____  ____  _____ ____
| | | |/ _ \|  _ \|  _ \| ____|  _ \
| |_| | | | | |_) | |_) |  _| | |_) |
|  _  | |_| |  __/|  __/| |___|  _ <
|_| |_|\___/|_|   |_|   |_____|_| \_\

  Cost-gated multi-venue asset conversion
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let path = std::env::var("HOPPER_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = AppConfig::load(&path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        cycle_delay_ms = cfg.agent.cycle_delay_ms,
        policy = ?cfg.scheduler.policy,
        venues = cfg.venues.len(),
        "HOPPER starting up"
    );

    // -- Restore or create state -----------------------------------------

    let state = match storage::load_state(Some(cfg.agent.state_file.as_str()))? {
        Some(s) => {
            info!(cycles = s.cycle_count, executions = s.executions, "Resumed from saved state");
            s
        }
        None => SessionState::new(),
    };
    let ledger = PathLedger::open(cfg.ledger.clone(), &cfg.agent.ledger_file)?;
    let audit = AuditLog::new(&cfg.agent.audit_file);

    // -- Venues ----------------------------------------------------------

    let venues = build_venues(&cfg)?;
    if venues.is_empty() {
        bail!("No usable venues configured");
    }

    let mut scheduler = Scheduler::new(&cfg, venues, ledger, state.clone(), Some(audit.clone()))?;

    let status = Arc::new(DashboardState::new(cfg.agent.name.clone(), state, Some(audit)));
    if cfg.dashboard.enabled {
        if let Err(e) = dashboard::spawn_dashboard(status.clone(), cfg.dashboard.port).await {
            warn!(error = %e, "Status API disabled");
        }
    }

    // -- Main loop -------------------------------------------------------

    let delay = Duration::from_millis(cfg.agent.cycle_delay_ms);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        delay_ms = cfg.agent.cycle_delay_ms,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        let report = scheduler.run_cycle().await;
        if let Err(e) = storage::save_state(scheduler.state(), Some(cfg.agent.state_file.as_str())) {
            error!(error = %e, "Failed to save state");
        }
        status.publish(&scheduler, &report).await;

        if !pause_between_cycles(delay, &mut shutdown).await {
            info!("Shutdown signal received.");
            break;
        }
    }

    // -- Shutdown --------------------------------------------------------

    if let Err(e) = scheduler.flush() {
        error!(error = %e, "Failed to save path ledger");
    }
    storage::save_state(scheduler.state(), Some(cfg.agent.state_file.as_str()))?;

    let s = scheduler.state();
    info!(
        cycles = s.cycle_count,
        executions = s.executions,
        win_rate = format!("{:.1}%", s.win_rate()),
        pnl = format!("${:.4}", s.realized_pnl),
        "HOPPER shut down cleanly."
    );

    Ok(())
}

/// Instantiate a client for every enabled venue this binary can drive.
fn build_venues(cfg: &AppConfig) -> Result<Vec<VenueHandle>> {
    let registry = cfg.assets.registry();
    let (usable, skipped): (Vec<_>, Vec<_>) = cfg
        .venues
        .iter()
        .filter(|v| v.enabled)
        .partition(|v| v.kind.has_builtin_client());

    for v in skipped {
        warn!(venue = %v.name, kind = ?v.kind, "No built-in client for venue kind, skipping");
    }

    let mut venues = Vec::new();
    for v in usable {
        let client = PaperVenue::from_config(v, &registry)?;
        info!(venue = %v.name, pairs = v.pairs.len(), "Paper venue ready");
        venues.push(VenueHandle::new(v.clone(), Arc::new(client)));
    }
    Ok(venues)
}

/// Initialise the tracing subscriber.
///
/// Uses `RUST_LOG` env var for filtering (default: `hopper=info`).
/// Set `HOPPER_LOG_JSON=1` for JSON output.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hopper=info"));

    if std::env::var("HOPPER_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
