//! End-to-end scenarios driving the scheduler against the mock venue.

use chrono::{Duration, Utc};
use std::sync::Arc;

use hopper::config::AppConfig;
use hopper::engine::scheduler::Scheduler;
use hopper::storage::AuditLog;
use hopper::strategy::paths::{BlockStatus, PathLedger};
use hopper::types::{PathKey, SessionState};
use hopper::venues::VenueHandle;

use crate::mock_venue::{FillMode, MockVenue};

const BASE_CONFIG: &str = r#"
[agent]
name = "HOPPER-IT"

[scheduler]
policy = "race"

[momentum]
min_elapsed_secs = 1

[ledger]
block_threshold = 3
cooldown_cycles = 2
autosave_every = 0

[signals]
signals = []
adjusters = []

[[venues]]
name = "mock"
kind = "external"
taker_fee_pct = 0.001
min_notional_usd = 10.0
pairs = ["ETH/USDT", "SOL/USDT", "BTC/USDT"]
"#;

fn mock() -> MockVenue {
    MockVenue::new("mock")
        .with_price("ETH/USDT", 2000.0)
        .with_price("SOL/USDT", 100.0)
        .with_price("BTC/USDT", 60_000.0)
}

fn build(venue: Arc<MockVenue>, audit: Option<AuditLog>) -> Scheduler {
    let cfg = AppConfig::parse(BASE_CONFIG).unwrap();
    let ledger = PathLedger::new(cfg.ledger.clone());
    let handle = VenueHandle::new(cfg.venues[0].clone(), venue);
    Scheduler::new(&cfg, vec![handle], ledger, SessionState::new(), audit).unwrap()
}

/// Seed a price 30 seconds ago so the next cycle sees a trend.
fn seed(s: &Scheduler, asset: &str, price: f64) {
    s.momentum()
        .update_at(asset, price, Utc::now() - Duration::seconds(30));
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("hopper-it-{}-{name}", uuid::Uuid::new_v4()))
}

// ---------------------------------------------------------------------------
// Scenario A: fresh path, positive momentum
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_a_weak_momentum_does_not_clear_cost() {
    let venue = Arc::new(mock().with_balance("USDT", 100.0));
    let mut s = build(venue.clone(), None);
    // +0.05% over 30s: gross ≈ $0.25 against ≈ $0.60 of conservative cost
    seed(&s, "ETH", 1999.0);

    let report = s.run_cycle().await;
    assert_eq!(report.opportunities, 1);
    assert_eq!(report.approvals, 0);
    assert_eq!(report.rejections.get("cost_exceeds_edge"), Some(&1));
    assert!(venue.orders().is_empty());
}

#[tokio::test]
async fn scenario_a_strong_momentum_executes_once() {
    let venue = Arc::new(mock().with_balance("USDT", 1000.0));
    let mut s = build(venue.clone(), None);
    seed(&s, "ETH", 1980.0);

    let report = s.run_cycle().await;
    assert_eq!(report.approvals, 1);
    assert_eq!(report.executions, 1);
    assert_eq!(report.verified, 1);

    let orders = venue.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].pair.to_string(), "ETH/USDT");
    // at most 97% of the live balance
    assert!(orders[0].quantity * 2000.4 <= 970.0 + 1e-6);

    let stats = s.ledger().stats(&PathKey::new("USDT", "ETH", "mock")).unwrap();
    assert_eq!(stats.trades, 1);
    assert_eq!(stats.slippage_samples, 1);
}

// ---------------------------------------------------------------------------
// Scenario B: loss streak blocks a path, expiry retries it
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_b_three_losses_block_then_retry() {
    let venue = Arc::new(mock().with_balance("USDT", 1000.0));
    venue.set_fill_mode(FillMode::Slipped(0.01));
    let mut s = build(venue.clone(), None);
    seed(&s, "ETH", 1900.0);
    let key = PathKey::new("USDT", "ETH", "mock");

    for cycle in 1..=3 {
        let report = s.run_cycle().await;
        assert_eq!(report.executions, 1, "cycle {cycle}");
        assert!(report.realized_pnl < 0.0);
    }
    let stats = s.ledger().stats(&key).unwrap();
    assert_eq!(stats.losses, 3);
    assert_eq!(
        s.ledger().is_blocked(&key, 3),
        BlockStatus::LossStreak { until: 5 }
    );
    // the reverse direction is held back too
    assert!(s.ledger().is_blocked(&key.reverse(), 3).is_blocked());

    let blocked = s.run_cycle().await;
    assert_eq!(blocked.cycle, 4);
    assert_eq!(blocked.executions, 0);
    assert_eq!(venue.orders().len(), 3);

    let retried = s.run_cycle().await;
    assert_eq!(retried.cycle, 5);
    assert_eq!(retried.executions, 1);
    assert_eq!(venue.orders().len(), 4);
    let stats = s.ledger().stats(&key).unwrap();
    assert_eq!(stats.consecutive_losses, 1);
    assert!(stats.blocked_until.is_none());
}

// ---------------------------------------------------------------------------
// Scenario C: second leg below minimum
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_c_second_leg_below_minimum_sends_nothing() {
    // ~$20 of ETH clears ETH/USDT but the SOL leg needs $50
    let venue = Arc::new(
        mock()
            .with_balance("ETH", 0.01)
            .with_filters("SOL/USDT", 0.01, 50.0, 0.01),
    );
    let mut s = build(venue.clone(), None);
    seed(&s, "SOL", 95.0);

    let report = s.run_cycle().await;
    assert_eq!(report.approvals, 1);
    assert_eq!(report.executions, 0);
    assert_eq!(report.rejections.get("minimum_not_met"), Some(&1));
    assert!(venue.orders().is_empty());

    // soft rejection: no ledger loss, one strike on the pair
    assert!(s.ledger().stats(&PathKey::new("ETH", "SOL", "mock")).is_none());
    assert_eq!(s.state().executions, 0);
    assert_eq!(
        s.minimums()
            .rejection_count("mock", &"SOL/USDT".parse().unwrap()),
        1
    );

    // the triple cools down instead of being hammered
    let next = s.run_cycle().await;
    assert_eq!(next.rejections.get("anti_repeat"), Some(&1));
    assert!(venue.orders().is_empty());
}

// ---------------------------------------------------------------------------
// Scenario D: zero-quantity fill
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_d_zero_fill_is_a_loss_and_cycle_continues() {
    let audit_path = temp_path("audit.jsonl");
    let venue = Arc::new(mock().with_balance("USDT", 1000.0));
    venue.set_fill_mode(FillMode::Zero);
    let mut s = build(venue.clone(), Some(AuditLog::new(&audit_path)));
    seed(&s, "ETH", 1980.0);

    let report = s.run_cycle().await;
    assert_eq!(report.executions, 1);
    assert_eq!(report.verified, 0);
    assert_eq!(report.realized_pnl, 0.0);
    assert_eq!(venue.orders().len(), 1);

    let stats = s.ledger().stats(&PathKey::new("USDT", "ETH", "mock")).unwrap();
    assert_eq!(stats.losses, 1);
    assert_eq!(stats.consecutive_losses, 1);
    assert_eq!(s.state().losses, 1);

    let records = AuditLog::new(&audit_path).load_all().unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].verified);
    assert!(records[0].failure.is_some());

    let next = s.run_cycle().await;
    assert_eq!(next.cycle, 2);
    assert_eq!(next.venues_reachable, 1);

    let _ = std::fs::remove_file(&audit_path);
}

// ---------------------------------------------------------------------------
// Operational behaviour
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_venue_does_not_stop_the_loop() {
    let venue = Arc::new(mock().with_balance("USDT", 1000.0));
    venue.set_error("simulated outage");
    let mut s = build(venue.clone(), None);

    let report = s.run_cycle().await;
    assert_eq!(report.venues_reachable, 0);
    assert_eq!(report.executions, 0);
    let health = s.venue_health();
    assert!(!health[0].reachable);
    assert_eq!(health[0].consecutive_failures, 1);

    venue.clear_error();
    let report = s.run_cycle().await;
    assert_eq!(report.venues_reachable, 1);
    assert!(s.venue_health()[0].reachable);
}

#[tokio::test]
async fn ledger_survives_restart() {
    let file = temp_path("paths.json");
    let cfg = AppConfig::parse(BASE_CONFIG).unwrap();
    let venue = Arc::new(mock().with_balance("USDT", 1000.0));
    venue.set_fill_mode(FillMode::Zero);

    let ledger = PathLedger::open(cfg.ledger.clone(), &file).unwrap();
    let handle = VenueHandle::new(cfg.venues[0].clone(), venue.clone());
    let mut s = Scheduler::new(&cfg, vec![handle], ledger, SessionState::new(), None).unwrap();
    seed(&s, "ETH", 1980.0);
    s.run_cycle().await;
    s.flush().unwrap();

    let reloaded = PathLedger::open(cfg.ledger.clone(), &file).unwrap();
    let stats = reloaded.stats(&PathKey::new("USDT", "ETH", "mock")).unwrap();
    assert_eq!(stats.losses, 1);

    let _ = std::fs::remove_file(&file);
}
