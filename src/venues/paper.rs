//! Paper venue.
//!
//! In-memory simulated exchange used for dry runs and tests. Quotes
//! wander around configured mid prices; market orders fill immediately
//! at the touch plus configured slippage, with the taker fee deducted
//! from the received asset.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use super::{FillFields, VenueClient, VenueConfig};
use crate::types::{canonical, AssetRegistry, Balances, OrderAck, Pair, PriceTick, Side, SymbolFilters};

pub struct PaperVenue {
    name: String,
    fee_pct: f64,
    spread_pct: f64,
    slippage_pct: f64,
    drift_pct: f64,
    min_notional: f64,
    fields: FillFields,
    registry: AssetRegistry,
    filters: HashMap<Pair, SymbolFilters>,
    balances: Mutex<Balances>,
    mids: Mutex<HashMap<Pair, f64>>,
}

impl PaperVenue {
    pub fn from_config(config: &VenueConfig, registry: &AssetRegistry) -> Result<Self> {
        let mut mids = HashMap::new();
        for (symbol, price) in &config.paper.prices {
            let pair: Pair = symbol.parse()?;
            if *price <= 0.0 {
                bail!("Paper price for {pair} must be positive");
            }
            mids.insert(pair, *price);
        }
        let filters = config
            .parsed_pairs()
            .into_iter()
            .map(|p| {
                let f = SymbolFilters {
                    min_qty: config.static_min_qty(&p.base),
                    min_notional: config.min_notional_usd,
                    step_size: config.paper.step_size,
                };
                (p, f)
            })
            .collect();
        let balances = config
            .paper
            .balances
            .iter()
            .map(|(a, v)| (canonical(a), *v))
            .collect();

        Ok(Self {
            name: config.name.clone(),
            fee_pct: config.taker_fee_pct,
            spread_pct: config.paper.spread_pct,
            slippage_pct: config.paper.slippage_pct,
            drift_pct: config.paper.drift_pct,
            min_notional: config.min_notional_usd,
            fields: config.fill_fields.clone(),
            registry: registry.clone(),
            filters,
            balances: Mutex::new(balances),
            mids: Mutex::new(mids),
        })
    }

    /// Override a mid price (tests and replays).
    pub fn set_price(&self, pair: &Pair, mid: f64) {
        if let Ok(mut mids) = self.mids.lock() {
            mids.insert(pair.clone(), mid);
        }
    }

    fn lock_err<T>(_: T) -> anyhow::Error {
        anyhow!("paper venue state poisoned")
    }

    fn quote_usd(&self, quote: &str, mids: &HashMap<Pair, f64>) -> f64 {
        if self.registry.is_stablecoin(quote) {
            return 1.0;
        }
        mids.iter()
            .find(|(p, _)| p.base == quote && self.registry.is_stablecoin(&p.quote))
            .map(|(_, m)| *m)
            .unwrap_or(0.0)
    }
}

/// Write `value` under a possibly dotted field name.
fn put_field(root: &mut Map<String, Value>, path: &str, value: Value) {
    let mut parts = path.split('.').peekable();
    let mut current = root;
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            current.insert(part.to_string(), value);
            return;
        }
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        match entry {
            Value::Object(map) => current = map,
            _ => return,
        }
    }
}

#[async_trait]
impl VenueClient for PaperVenue {
    async fn get_balances(&self) -> Result<Balances> {
        let balances = self.balances.lock().map_err(Self::lock_err)?;
        Ok(balances.clone())
    }

    async fn get_ticker(&self, pair: &Pair) -> Result<PriceTick> {
        let mut mids = self.mids.lock().map_err(Self::lock_err)?;
        let mid = mids
            .get_mut(pair)
            .ok_or_else(|| anyhow!("{}: unknown pair {pair}", self.name))?;
        if self.drift_pct > 0.0 {
            let step = rand::thread_rng().gen_range(-self.drift_pct..=self.drift_pct);
            *mid *= 1.0 + step;
        }
        let half = self.spread_pct / 2.0;
        Ok(PriceTick {
            venue: self.name.clone(),
            pair: pair.clone(),
            bid: *mid * (1.0 - half),
            ask: *mid * (1.0 + half),
            last: *mid,
            volume: 1_000_000.0,
            timestamp: Utc::now(),
        })
    }

    async fn get_symbol_filters(&self, pair: &Pair) -> Result<SymbolFilters> {
        Ok(self.filters.get(pair).copied().unwrap_or(SymbolFilters {
            min_qty: 0.0,
            min_notional: self.min_notional,
            step_size: 0.0,
        }))
    }

    async fn place_order(&self, pair: &Pair, side: Side, quantity: f64) -> Result<OrderAck> {
        if quantity <= 0.0 || !quantity.is_finite() {
            bail!("{}: invalid quantity {quantity}", self.name);
        }
        let mids = self.mids.lock().map_err(Self::lock_err)?;
        let mid = *mids
            .get(pair)
            .ok_or_else(|| anyhow!("{}: unknown pair {pair}", self.name))?;
        let half = self.spread_pct / 2.0;
        let price = match side {
            Side::Buy => mid * (1.0 + half) * (1.0 + self.slippage_pct),
            Side::Sell => mid * (1.0 - half) * (1.0 - self.slippage_pct),
        };
        let quote_amount = quantity * price;
        let quote_usd = self.quote_usd(&pair.quote, &mids);
        drop(mids);

        let mut balances = self.balances.lock().map_err(Self::lock_err)?;
        let (spend_asset, spend, recv_asset, recv) = match side {
            Side::Buy => (&pair.quote, quote_amount, &pair.base, quantity),
            Side::Sell => (&pair.base, quantity, &pair.quote, quote_amount),
        };
        let available = balances.get(spend_asset).copied().unwrap_or(0.0);
        if available + 1e-12 < spend {
            bail!(
                "{}: insufficient {spend_asset} balance: need {spend:.8}, have {available:.8}",
                self.name
            );
        }
        let fee_in_recv = recv * self.fee_pct;
        *balances.entry(spend_asset.clone()).or_insert(0.0) -= spend;
        *balances.entry(recv_asset.clone()).or_insert(0.0) += recv - fee_in_recv;
        drop(balances);

        let fee_usd = quote_amount * self.fee_pct * quote_usd;
        let order_id = format!("paper-{}", uuid::Uuid::new_v4());
        debug!(venue = %self.name, %pair, %side, quantity, price, "Paper fill");

        let mut payload = Map::new();
        put_field(&mut payload, &self.fields.order_id, json!(order_id));
        put_field(&mut payload, &self.fields.filled_qty, json!(quantity.to_string()));
        put_field(&mut payload, &self.fields.avg_price, json!(price));
        put_field(&mut payload, &self.fields.fee_usd, json!(fee_usd));

        Ok(OrderAck {
            venue: self.name.clone(),
            pair: pair.clone(),
            side,
            requested_qty: quantity,
            payload: Value::Object(payload),
        })
    }
}
