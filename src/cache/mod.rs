//! Durability cache tier
//!
//! Fast, possibly volatile persistence between the in-memory ledger and the
//! relational store. The flush pipeline writes drained pending batches here;
//! the migration engine reads full snapshots back.
//!
//! Adapters are constructed explicitly and given an `init`/`close`
//! lifecycle; there is no process-wide client.

pub mod memory;

pub use memory::MemoryCache;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::LedgerResult;
use crate::models::{Fill, OhlcCandle, Order, deduplication_key};

/// Storage key of a fill: its deduplication key, derived if unset
pub fn fill_key(fill: &Fill) -> String {
    if fill.deduplication_key.is_empty() {
        deduplication_key(&fill.session_id, &fill.exec_id)
    } else {
        fill.deduplication_key.clone()
    }
}

/// Storage key of a candle as reported in [`FlushFailure::key`]
pub fn candle_key(candle: &OhlcCandle) -> String {
    format!(
        "{}:{}:{}:{}",
        candle.symbol, candle.exchange, candle.interval, candle.timestamp
    )
}

/// One item that could not be written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlushFailure {
    /// Storage key of the item (order id, dedup key, candle key)
    pub key: String,
    pub error: String,
}

/// Outcome of a batch upsert, item by item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushResult {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<FlushFailure>,
}

impl FlushResult {
    /// Whole batch failed before any item was attempted
    pub fn batch_failed(items: usize, error: impl Into<String>) -> Self {
        Self {
            failed: items,
            errors: vec![FlushFailure {
                key: "*".to_string(),
                error: error.into(),
            }],
            ..Default::default()
        }
    }

    pub fn record_failure(&mut self, key: impl Into<String>, error: impl Into<String>) {
        self.failed += 1;
        self.errors.push(FlushFailure {
            key: key.into(),
            error: error.into(),
        });
    }

    pub fn merge(&mut self, other: FlushResult) {
        self.success += other.success;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }

    /// Nothing failed
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// Keys reported as failed (`"*"` means the whole batch)
    pub fn failed_keys(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(|e| e.key.as_str())
    }
}

/// Batch upsert / snapshot read contract of the cache tier
///
/// Upserts are idempotent. Partial success is reported through
/// [`FlushResult`]; `Err` means the adapter could not process the batch
/// at all.
#[async_trait]
pub trait DurabilityCache: Send + Sync {
    /// Adapter name for logging
    fn name(&self) -> &'static str;

    async fn init(&self) -> LedgerResult<()>;

    async fn close(&self) -> LedgerResult<()>;

    async fn flush_orders(&self, orders: &[Order]) -> LedgerResult<FlushResult>;

    async fn flush_fills(&self, fills: &[Fill]) -> LedgerResult<FlushResult>;

    async fn flush_ohlc(&self, candles: &[OhlcCandle]) -> LedgerResult<FlushResult>;

    /// Full read; migration only, never on the ingestion path
    async fn get_all_orders(&self) -> LedgerResult<Vec<Order>>;

    /// Full read; migration only, never on the ingestion path
    async fn get_all_fills(&self) -> LedgerResult<Vec<Fill>>;

    async fn get_ohlc_candles(&self, interval: &str) -> LedgerResult<Vec<OhlcCandle>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_result_merge() {
        let mut total = FlushResult {
            success: 2,
            ..Default::default()
        };
        let mut other = FlushResult::default();
        other.record_failure("O9", "boom");
        other.skipped = 1;
        total.merge(other);

        assert_eq!(total.success, 2);
        assert_eq!(total.failed, 1);
        assert_eq!(total.skipped, 1);
        assert!(!total.is_complete());
        assert_eq!(total.failed_keys().collect::<Vec<_>>(), vec!["O9"]);
    }

    #[test]
    fn test_batch_failed() {
        let r = FlushResult::batch_failed(3, "connection refused");
        assert_eq!(r.failed, 3);
        assert_eq!(r.success, 0);
        assert_eq!(r.errors[0].key, "*");
    }
}
