//! Scheduling across venues, chained hops, and minimums learned from
//! venue rejections.

use chrono::{Duration, Utc};
use std::sync::Arc;

use hopper::config::AppConfig;
use hopper::engine::scheduler::Scheduler;
use hopper::strategy::paths::PathLedger;
use hopper::types::{Pair, SessionState, Side};
use hopper::venues::VenueHandle;

use crate::mock_venue::{FillMode, MockVenue};

const TWO_VENUES: &str = r#"
[agent]
name = "HOPPER-MV"

[scheduler]
policy = "round_robin"

[momentum]
min_elapsed_secs = 1

[ledger]
autosave_every = 0

[signals]
signals = []
adjusters = []

[[venues]]
name = "alpha"
kind = "external"
taker_fee_pct = 0.001
min_notional_usd = 10.0
pairs = ["ETH/USDT"]

[[venues]]
name = "beta"
kind = "external"
taker_fee_pct = 0.001
min_notional_usd = 10.0
pairs = ["ETH/USDT"]
"#;

const CHAIN: &str = r#"
[agent]
name = "HOPPER-CHAIN"

[scheduler]
policy = "race"

[scheduler.chain]
enabled = true
max_hops = 3

[momentum]
min_elapsed_secs = 1

[ledger]
autosave_every = 0

[signals]
signals = []
adjusters = []

[[venues]]
name = "mock"
kind = "external"
taker_fee_pct = 0.001
min_notional_usd = 10.0
pairs = ["ETH/USDT", "SOL/ETH"]
"#;

const SINGLE: &str = r#"
[agent]
name = "HOPPER-MIN"

[scheduler]
policy = "race"

[momentum]
min_elapsed_secs = 1

[ledger]
autosave_every = 0

[signals]
signals = []
adjusters = []

[[venues]]
name = "mock"
kind = "external"
taker_fee_pct = 0.001
min_notional_usd = 10.0
pairs = ["ETH/USDT"]
"#;

fn build(toml: &str, venues: Vec<Arc<MockVenue>>) -> Scheduler {
    let cfg = AppConfig::parse(toml).unwrap();
    let handles = cfg
        .venues
        .iter()
        .zip(venues)
        .map(|(v, client)| VenueHandle::new(v.clone(), client))
        .collect();
    Scheduler::new(&cfg, handles, PathLedger::new(cfg.ledger.clone()), SessionState::new(), None).unwrap()
}

fn seed(s: &Scheduler, asset: &str, price: f64) {
    s.momentum()
        .update_at(asset, price, Utc::now() - Duration::seconds(30));
}

fn eth_venue(name: &str, usdt: f64) -> Arc<MockVenue> {
    Arc::new(
        MockVenue::new(name)
            .with_price("ETH/USDT", 2000.0)
            .with_balance("USDT", usdt),
    )
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn round_robin_visits_venues_in_turn() {
    let alpha = eth_venue("alpha", 1000.0);
    let beta = eth_venue("beta", 1000.0);
    let mut s = build(TWO_VENUES, vec![alpha.clone(), beta.clone()]);

    let first = s.run_cycle().await;
    assert_eq!(first.venues_scanned, 1);
    assert_eq!((alpha.balance_polls(), beta.balance_polls()), (1, 0));

    s.run_cycle().await;
    assert_eq!((alpha.balance_polls(), beta.balance_polls()), (1, 1));

    // an unreachable venue still uses up its turn
    beta.set_error("simulated outage");
    s.run_cycle().await;
    s.run_cycle().await;
    assert_eq!(alpha.balance_polls(), 2);
    let health = s.venue_health();
    assert_eq!(health[1].name, "beta");
    assert!(!health[1].reachable);

    beta.clear_error();
    s.run_cycle().await;
    s.run_cycle().await;
    assert_eq!((alpha.balance_polls(), beta.balance_polls()), (3, 2));
}

#[tokio::test]
async fn race_executes_best_opportunity_across_venues() {
    let alpha = eth_venue("alpha", 300.0);
    let beta = eth_venue("beta", 1000.0);
    let toml = TWO_VENUES.replace("round_robin", "race");
    let mut s = build(&toml, vec![alpha.clone(), beta.clone()]);
    seed(&s, "ETH", 1980.0);

    let report = s.run_cycle().await;
    assert_eq!(report.venues_scanned, 2);
    assert_eq!(report.venues_reachable, 2);
    assert_eq!(report.opportunities, 2);
    assert_eq!(report.executions, 1);
    // the larger holding projects the larger net edge
    assert!(alpha.orders().is_empty());
    assert_eq!(beta.orders().len(), 1);
}

#[tokio::test]
async fn race_falls_back_when_best_venue_is_down() {
    let alpha = eth_venue("alpha", 300.0);
    let beta = eth_venue("beta", 1000.0);
    beta.set_error("simulated outage");
    let toml = TWO_VENUES.replace("round_robin", "race");
    let mut s = build(&toml, vec![alpha.clone(), beta.clone()]);
    seed(&s, "ETH", 1980.0);

    let report = s.run_cycle().await;
    assert_eq!(report.venues_reachable, 1);
    assert_eq!(report.executions, 1);
    assert_eq!(alpha.orders().len(), 1);
}

// ---------------------------------------------------------------------------
// Chains
// ---------------------------------------------------------------------------

/// USDT can only reach SOL through ETH; SOL is rising faster than ETH.
fn chain_venue(mode: FillMode) -> Arc<MockVenue> {
    let venue = MockVenue::new("mock")
        .with_price("ETH/USDT", 2000.0)
        .with_price("SOL/ETH", 0.05)
        .with_balance("USDT", 1000.0)
        .with_settlement();
    venue.set_fill_mode(mode);
    Arc::new(venue)
}

fn seed_chain(s: &Scheduler) {
    seed(s, "ETH", 1980.0);
    seed(s, "SOL", 98.5);
}

#[tokio::test]
async fn chain_follows_acquired_asset_until_no_hop_clears() {
    // fills slightly better than the touch keep the chain's P&L positive
    let venue = chain_venue(FillMode::Slipped(-0.001));
    let mut s = build(CHAIN, vec![venue.clone()]);
    seed_chain(&s);

    let report = s.run_cycle().await;
    assert_eq!(report.executions, 2);
    assert_eq!(report.verified, 2);
    assert_eq!(report.chain_hops, 1);
    assert!(report.realized_pnl > 0.0);

    let orders = venue.orders();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].pair, Pair::new("ETH", "USDT"));
    assert_eq!(orders[1].pair, Pair::new("SOL", "ETH"));
    assert_eq!(orders[1].side, Side::Buy);
    assert!(venue.balance("SOL") > 9.0);
}

#[tokio::test]
async fn chain_stops_at_max_hops() {
    let venue = chain_venue(FillMode::Slipped(-0.001));
    let toml = CHAIN.replace("max_hops = 3", "max_hops = 1");
    let mut s = build(&toml, vec![venue.clone()]);
    seed_chain(&s);

    let report = s.run_cycle().await;
    assert_eq!(report.executions, 1);
    assert_eq!(report.chain_hops, 0);
    assert_eq!(venue.orders().len(), 1);
}

#[tokio::test]
async fn chain_stops_when_cumulative_pnl_turns_negative() {
    let venue = chain_venue(FillMode::Slipped(0.001));
    let mut s = build(CHAIN, vec![venue.clone()]);
    seed_chain(&s);

    let report = s.run_cycle().await;
    assert_eq!(report.executions, 1);
    assert_eq!(report.verified, 1);
    assert!(report.realized_pnl < 0.0);
    assert_eq!(report.chain_hops, 0);
    assert_eq!(venue.orders().len(), 1);
}

// ---------------------------------------------------------------------------
// Minimums learned from venue rejections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn venue_minimum_rejection_raises_learned_limit() {
    let venue = eth_venue("mock", 1000.0);
    venue.reject_orders("Filter failure: MIN_NOTIONAL");
    let toml = format!("{SINGLE}\n[minimums]\nrejection_threshold = 1\n");
    let mut s = build(&toml, vec![venue.clone()]);
    seed(&s, "ETH", 1980.0);
    let pair = Pair::new("ETH", "USDT");

    let report = s.run_cycle().await;
    assert_eq!(report.rejections.get("order_rejected"), Some(&1));
    assert!(s.minimums().is_blocked("mock", &pair, 1));
    // learned from the ~$970 order the venue refused
    assert!(s.minimums().limits("mock", &pair, 1).min_notional > 1000.0);

    let next = s.run_cycle().await;
    assert_eq!(next.opportunities, 0);
    assert!(venue.orders().is_empty());
}

#[tokio::test]
async fn unrelated_venue_rejection_is_not_a_minimum_strike() {
    let venue = eth_venue("mock", 1000.0);
    venue.reject_orders("market closed");
    let mut s = build(SINGLE, vec![venue.clone()]);
    seed(&s, "ETH", 1980.0);

    let report = s.run_cycle().await;
    assert_eq!(report.rejections.get("order_rejected"), Some(&1));
    let pair = Pair::new("ETH", "USDT");
    assert_eq!(s.minimums().rejection_count("mock", &pair), 0);
    assert_eq!(s.minimums().limits("mock", &pair, 1).min_notional, 10.0);
}
