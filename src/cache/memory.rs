//! DashMap-backed durability cache
//!
//! Orders are keyed by order id, fills by deduplication key, candles by
//! `(symbol, exchange, interval, timestamp)`, so re-flushing the same
//! record is an overwrite. Writing a record identical to the stored one
//! counts as skipped.
//!
//! Writes are rejected item by item until [`DurabilityCache::init`] has
//! run, and again after [`DurabilityCache::close`].

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{DurabilityCache, FlushResult, candle_key, fill_key};
use crate::core_types::{OrderId, TimestampMs};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Fill, OhlcCandle, Order};

type CandleKey = (String, String, String, TimestampMs);

const NOT_READY: &str = "cache not initialized";

#[derive(Debug, Default)]
pub struct MemoryCache {
    ready: AtomicBool,
    orders: DashMap<OrderId, Order>,
    fills: DashMap<String, Fill>,
    candles: DashMap<CandleKey, OhlcCandle>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn fill_count(&self) -> usize {
        self.fills.len()
    }

    pub fn candle_count(&self) -> usize {
        self.candles.len()
    }

    fn upsert<K, V>(map: &DashMap<K, V>, key: K, value: &V, result: &mut FlushResult)
    where
        K: std::hash::Hash + Eq,
        V: Clone + PartialEq,
    {
        let unchanged = map.get(&key).is_some_and(|existing| *existing == *value);
        if unchanged {
            result.skipped += 1;
            return;
        }
        map.insert(key, value.clone());
        result.success += 1;
    }

    fn ensure_ready(&self) -> LedgerResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(LedgerError::Cache(NOT_READY.into()))
        }
    }
}

#[async_trait]
impl DurabilityCache for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn init(&self) -> LedgerResult<()> {
        self.ready.store(true, Ordering::Release);
        tracing::info!(cache = self.name(), "Durability cache initialized");
        Ok(())
    }

    async fn close(&self) -> LedgerResult<()> {
        self.ready.store(false, Ordering::Release);
        tracing::info!(cache = self.name(), "Durability cache closed");
        Ok(())
    }

    async fn flush_orders(&self, orders: &[Order]) -> LedgerResult<FlushResult> {
        let mut result = FlushResult::default();
        for order in orders {
            if !self.is_ready() {
                result.record_failure(&order.order_id, NOT_READY);
                continue;
            }
            Self::upsert(&self.orders, order.order_id.clone(), order, &mut result);
        }
        Ok(result)
    }

    async fn flush_fills(&self, fills: &[Fill]) -> LedgerResult<FlushResult> {
        let mut result = FlushResult::default();
        for fill in fills {
            let key = fill_key(fill);
            if !self.is_ready() {
                result.record_failure(key, NOT_READY);
                continue;
            }
            Self::upsert(&self.fills, key, fill, &mut result);
        }
        Ok(result)
    }

    async fn flush_ohlc(&self, candles: &[OhlcCandle]) -> LedgerResult<FlushResult> {
        let mut result = FlushResult::default();
        for candle in candles {
            if !self.is_ready() {
                result.record_failure(candle_key(candle), NOT_READY);
                continue;
            }
            Self::upsert(&self.candles, candle.key(), candle, &mut result);
        }
        Ok(result)
    }

    async fn get_all_orders(&self) -> LedgerResult<Vec<Order>> {
        self.ensure_ready()?;
        let mut orders: Vec<Order> = self.orders.iter().map(|e| e.value().clone()).collect();
        orders.sort_by(|a, b| {
            (a.created_at, &a.order_id).cmp(&(b.created_at, &b.order_id))
        });
        Ok(orders)
    }

    async fn get_all_fills(&self) -> LedgerResult<Vec<Fill>> {
        self.ensure_ready()?;
        let mut fills: Vec<Fill> = self.fills.iter().map(|e| e.value().clone()).collect();
        fills.sort_by(|a, b| (a.timestamp, &a.exec_id).cmp(&(b.timestamp, &b.exec_id)));
        Ok(fills)
    }

    async fn get_ohlc_candles(&self, interval: &str) -> LedgerResult<Vec<OhlcCandle>> {
        self.ensure_ready()?;
        let mut candles: Vec<OhlcCandle> = self
            .candles
            .iter()
            .filter(|e| e.value().interval == interval)
            .map(|e| e.value().clone())
            .collect();
        candles.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(candles)
    }
}
