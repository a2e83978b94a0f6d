//! Mock venue for integration testing.
//!
//! A deterministic `VenueClient`: balances and mid prices are whatever
//! the test sets, quotes never drift, and every order is recorded.
//! Fill behaviour is switchable so tests can force slippage, zero
//! fills, order rejections or outages. With settlement on, fills move
//! the mock's own balances.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

use hopper::types::*;
use hopper::venues::VenueClient;

/// How submitted orders are filled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillMode {
    /// Fill everything at the touch.
    Full,
    /// Fill everything at the touch moved against us by this fraction.
    Slipped(f64),
    /// Acknowledge with zero executed quantity.
    Zero,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedOrder {
    pub pair: Pair,
    pub side: Side,
    pub quantity: f64,
}

pub struct MockVenue {
    name: String,
    spread_pct: f64,
    balances: Mutex<Balances>,
    mids: Mutex<HashMap<Pair, f64>>,
    filters: Mutex<HashMap<Pair, SymbolFilters>>,
    fill_mode: Mutex<FillMode>,
    orders: Mutex<Vec<RecordedOrder>>,
    /// If set, all operations will return this error.
    force_error: Mutex<Option<String>>,
    /// If set, only `place_order` returns this error.
    order_rejection: Mutex<Option<String>>,
    settle: bool,
    balance_polls: Mutex<u32>,
}

impl MockVenue {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            spread_pct: 0.0004,
            balances: Mutex::new(HashMap::new()),
            mids: Mutex::new(HashMap::new()),
            filters: Mutex::new(HashMap::new()),
            fill_mode: Mutex::new(FillMode::Full),
            orders: Mutex::new(Vec::new()),
            force_error: Mutex::new(None),
            order_rejection: Mutex::new(None),
            settle: false,
            balance_polls: Mutex::new(0),
        }
    }

    pub fn with_settlement(mut self) -> Self {
        self.settle = true;
        self
    }

    pub fn with_price(self, pair: &str, mid: f64) -> Self {
        self.mids.lock().unwrap().insert(pair.parse().unwrap(), mid);
        self
    }

    pub fn with_balance(self, asset: &str, amount: f64) -> Self {
        self.balances.lock().unwrap().insert(canonical(asset), amount);
        self
    }

    pub fn with_filters(self, pair: &str, min_qty: f64, min_notional: f64, step_size: f64) -> Self {
        self.filters.lock().unwrap().insert(
            pair.parse().unwrap(),
            SymbolFilters {
                min_qty,
                min_notional,
                step_size,
            },
        );
        self
    }

    pub fn set_fill_mode(&self, mode: FillMode) {
        *self.fill_mode.lock().unwrap() = mode;
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn reject_orders(&self, msg: &str) {
        *self.order_rejection.lock().unwrap() = Some(msg.to_string());
    }

    /// Number of `get_balances` calls served.
    pub fn balance_polls(&self) -> u32 {
        *self.balance_polls.lock().unwrap()
    }

    pub fn balance(&self, asset: &str) -> f64 {
        self.balances.lock().unwrap().get(&canonical(asset)).copied().unwrap_or(0.0)
    }

    pub fn orders(&self) -> Vec<RecordedOrder> {
        self.orders.lock().unwrap().clone()
    }

    fn check_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(err) => Err(anyhow!("{}", err)),
            None => Ok(()),
        }
    }

    fn touch(&self, pair: &Pair) -> Result<(f64, f64)> {
        let mid = *self
            .mids
            .lock()
            .unwrap()
            .get(pair)
            .ok_or_else(|| anyhow!("{}: unknown pair {pair}", self.name))?;
        let half = self.spread_pct / 2.0;
        Ok((mid * (1.0 - half), mid * (1.0 + half)))
    }
}

#[async_trait]
impl VenueClient for MockVenue {
    async fn get_balances(&self) -> Result<Balances> {
        self.check_error()?;
        *self.balance_polls.lock().unwrap() += 1;
        Ok(self.balances.lock().unwrap().clone())
    }

    async fn get_ticker(&self, pair: &Pair) -> Result<PriceTick> {
        self.check_error()?;
        let (bid, ask) = self.touch(pair)?;
        Ok(PriceTick {
            venue: self.name.clone(),
            pair: pair.clone(),
            bid,
            ask,
            last: (bid + ask) / 2.0,
            volume: 5_000_000.0,
            timestamp: Utc::now(),
        })
    }

    async fn get_symbol_filters(&self, pair: &Pair) -> Result<SymbolFilters> {
        self.check_error()?;
        Ok(self
            .filters
            .lock()
            .unwrap()
            .get(pair)
            .copied()
            .unwrap_or(SymbolFilters {
                min_qty: 0.0,
                min_notional: 10.0,
                step_size: 0.0001,
            }))
    }

    async fn place_order(&self, pair: &Pair, side: Side, quantity: f64) -> Result<OrderAck> {
        self.check_error()?;
        if let Some(msg) = self.order_rejection.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", msg));
        }
        let (bid, ask) = self.touch(pair)?;
        self.orders.lock().unwrap().push(RecordedOrder {
            pair: pair.clone(),
            side,
            quantity,
        });

        let touch = match side {
            Side::Buy => ask,
            Side::Sell => bid,
        };
        let mode = *self.fill_mode.lock().unwrap();
        let (filled, price) = match mode {
            FillMode::Full => (quantity, touch),
            FillMode::Slipped(pct) => match side {
                Side::Buy => (quantity, touch * (1.0 + pct)),
                Side::Sell => (quantity, touch * (1.0 - pct)),
            },
            FillMode::Zero => (0.0, 0.0),
        };
        let payload = match mode {
            FillMode::Full => json!({"orderId": "mock-1", "executedQty": filled, "avgPrice": price}),
            FillMode::Slipped(_) => {
                json!({"orderId": "mock-1", "executedQty": filled.to_string(), "avgPrice": price})
            }
            FillMode::Zero => json!({"orderId": "mock-1", "executedQty": "0"}),
        };

        if self.settle && filled > 0.0 {
            let mut balances = self.balances.lock().unwrap();
            let (base_delta, quote_delta) = match side {
                Side::Buy => (filled, -filled * price),
                Side::Sell => (-filled, filled * price),
            };
            *balances.entry(pair.base.clone()).or_insert(0.0) += base_delta;
            *balances.entry(pair.quote.clone()).or_insert(0.0) += quote_delta;
        }

        Ok(OrderAck {
            venue: self.name.clone(),
            pair: pair.clone(),
            side,
            requested_qty: quantity,
            payload,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_quotes_and_records() {
        let venue = MockVenue::new("mock").with_price("ETH/USDT", 2000.0);
        let pair = Pair::new("ETH", "USDT");
        let tick = venue.get_ticker(&pair).await.unwrap();
        assert!((tick.mid() - 2000.0).abs() < 1e-9);

        venue.place_order(&pair, Side::Buy, 0.5).await.unwrap();
        assert_eq!(venue.orders().len(), 1);
        assert_eq!(venue.orders()[0].side, Side::Buy);
    }

    #[tokio::test]
    async fn test_mock_zero_fill_payload() {
        let venue = MockVenue::new("mock").with_price("ETH/USDT", 2000.0);
        venue.set_fill_mode(FillMode::Zero);
        let ack = venue
            .place_order(&Pair::new("ETH", "USDT"), Side::Sell, 1.0)
            .await
            .unwrap();
        assert_eq!(ack.payload["executedQty"], "0");
    }

    #[tokio::test]
    async fn test_mock_settlement_moves_balances() {
        let venue = MockVenue::new("mock")
            .with_price("ETH/USDT", 2000.0)
            .with_balance("USDT", 1000.0)
            .with_settlement();
        venue.place_order(&Pair::new("ETH", "USDT"), Side::Buy, 0.1).await.unwrap();
        assert_eq!(venue.balance("ETH"), 0.1);
        assert!((venue.balance("USDT") - (1000.0 - 0.1 * 2000.4)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_mock_order_rejection_leaves_reads_working() {
        let venue = MockVenue::new("mock")
            .with_price("ETH/USDT", 2000.0)
            .with_balance("USDT", 10.0);
        venue.reject_orders("Filter failure: MIN_NOTIONAL");
        tokio_test::assert_ok!(venue.get_balances().await);
        tokio_test::assert_err!(venue.place_order(&Pair::new("ETH", "USDT"), Side::Buy, 0.001).await);
        assert!(venue.orders().is_empty());
        assert_eq!(venue.balance_polls(), 1);
    }

    #[tokio::test]
    async fn test_mock_forced_error() {
        let venue = MockVenue::new("mock").with_balance("USDT", 10.0);
        venue.set_error("simulated disconnect");
        tokio_test::assert_err!(venue.get_balances().await);
        venue.clear_error();
        let balances = tokio_test::assert_ok!(venue.get_balances().await);
        assert_eq!(balances["USDT"], 10.0);
    }
}
