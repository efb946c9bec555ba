//! Flush Pipeline - pending queues to the durability cache
//!
//! Each cycle drains all three pending queues under one store lock, writes
//! the batches to the cache concurrently, and puts every item the cache
//! rejected back at the front of its queue. The live maps are never
//! scanned, so a flushed record is only re-sent after it changes again.

use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashSet;
use serde::Serialize;
use tokio::time::MissedTickBehavior;

use super::ShutdownSignal;
use crate::cache::{DurabilityCache, FlushResult, candle_key, fill_key};
use crate::error::LedgerResult;
use crate::store::{SharedStateStore, lock_store};

/// Outcome of one flush cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlushCycleReport {
    pub orders: FlushResult,
    pub fills: FlushResult,
    pub ohlc: FlushResult,
    /// Items put back on the pending queues
    pub requeued: usize,
}

impl FlushCycleReport {
    pub fn is_empty(&self) -> bool {
        let attempted = |r: &FlushResult| r.success + r.failed + r.skipped;
        attempted(&self.orders) + attempted(&self.fills) + attempted(&self.ohlc) == 0
    }

    pub fn is_complete(&self) -> bool {
        self.orders.is_complete() && self.fills.is_complete() && self.ohlc.is_complete()
    }
}

pub struct FlushPipeline {
    store: SharedStateStore,
    cache: Arc<dyn DurabilityCache>,
    batch_size: Option<usize>,
}

impl FlushPipeline {
    pub fn new(store: SharedStateStore, cache: Arc<dyn DurabilityCache>) -> Self {
        Self {
            store,
            cache,
            batch_size: None,
        }
    }

    /// Cap the items drained per queue per cycle
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = (batch_size > 0).then_some(batch_size);
        self
    }

    /// Drain, write, requeue failures
    pub async fn flush_once(&self) -> FlushCycleReport {
        let (orders, fills, candles) = {
            let mut store = lock_store(&self.store);
            (
                store.take_pending_orders(self.batch_size),
                store.take_pending_fills(self.batch_size),
                store.take_pending_ohlc(self.batch_size),
            )
        };
        if orders.is_empty() && fills.is_empty() && candles.is_empty() {
            return FlushCycleReport::default();
        }

        let (order_res, fill_res, ohlc_res) = futures::join!(
            self.cache.flush_orders(&orders),
            self.cache.flush_fills(&fills),
            self.cache.flush_ohlc(&candles),
        );
        let mut report = FlushCycleReport {
            orders: self.settle(order_res, orders.len(), "orders"),
            fills: self.settle(fill_res, fills.len(), "fills"),
            ohlc: self.settle(ohlc_res, candles.len(), "ohlc"),
            requeued: 0,
        };

        let failed_orders = retain_failed(orders, &report.orders, |o| o.order_id.clone());
        let failed_fills = retain_failed(fills, &report.fills, fill_key);
        let failed_candles = retain_failed(candles, &report.ohlc, candle_key);
        report.requeued = failed_orders.len() + failed_fills.len() + failed_candles.len();

        if report.requeued > 0 {
            let mut store = lock_store(&self.store);
            store.requeue_orders(failed_orders);
            store.requeue_fills(failed_fills);
            store.requeue_ohlc(failed_candles);
            tracing::warn!(
                cache = self.cache.name(),
                requeued = report.requeued,
                "Flush incomplete, failed items requeued"
            );
        }

        tracing::debug!(
            orders = report.orders.success,
            fills = report.fills.success,
            ohlc = report.ohlc.success,
            skipped = report.orders.skipped + report.fills.skipped + report.ohlc.skipped,
            "Flush cycle complete"
        );
        report
    }

    /// Flush every `every` until shutdown, then flush once more
    pub async fn run(&self, every: Duration, mut shutdown: ShutdownSignal) {
        tracing::info!(cache = self.cache.name(), interval = ?every, "Flush pipeline started");
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush_once().await;
                }
                _ = shutdown.wait() => break,
            }
        }

        let last = self.flush_once().await;
        tracing::info!(
            complete = last.is_complete(),
            requeued = last.requeued,
            "Flush pipeline stopped after final flush"
        );
    }

    fn settle(&self, result: LedgerResult<FlushResult>, items: usize, entity: &str) -> FlushResult {
        match result {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(cache = self.cache.name(), entity, error = %e, "Cache flush failed");
                FlushResult::batch_failed(items, e.to_string())
            }
        }
    }
}

/// Items the cache reported as failed (all of them for a batch failure)
fn retain_failed<T>(items: Vec<T>, result: &FlushResult, key: impl Fn(&T) -> String) -> Vec<T> {
    if result.failed == 0 {
        return Vec::new();
    }
    let failed: FxHashSet<&str> = result.failed_keys().collect();
    if failed.contains("*") {
        return items;
    }
    items
        .into_iter()
        .filter(|item| failed.contains(key(item).as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::error::LedgerError;
    use crate::flush::shutdown_channel;
    use crate::models::{Fill, OhlcCandle, Order};
    use crate::store::{StateStore, shared};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn candle(ts: i64) -> OhlcCandle {
        OhlcCandle {
            symbol: "BTC/USD".into(),
            exchange: "kraken".into(),
            interval: "1m".into(),
            timestamp: ts,
            open: Decimal::ONE,
            high: Decimal::ONE,
            low: Decimal::ONE,
            close: Decimal::ONE,
            volume: Decimal::ZERO,
            is_complete: false,
        }
    }

    fn seeded_store() -> SharedStateStore {
        let store = shared(StateStore::new());
        {
            let mut s = lock_store(&store);
            s.add_order(Order::new("O1", "BTC/USD").with_session("S1")).unwrap();
            s.add_order(Order::new("O2", "BTC/USD").with_session("S1")).unwrap();
            s.add_fill(Fill::new("O1", "E1").with_session("S1")).unwrap();
            s.add_ohlc(candle(60_000)).unwrap();
        }
        store
    }

    /// Fails order batches while `down` is set
    #[derive(Default)]
    struct FlakyCache {
        inner: MemoryCache,
        down: AtomicBool,
    }

    #[async_trait]
    impl DurabilityCache for FlakyCache {
        fn name(&self) -> &'static str {
            "flaky"
        }
        async fn init(&self) -> LedgerResult<()> {
            self.inner.init().await
        }
        async fn close(&self) -> LedgerResult<()> {
            self.inner.close().await
        }
        async fn flush_orders(&self, orders: &[Order]) -> LedgerResult<FlushResult> {
            if self.down.load(Ordering::SeqCst) {
                return Err(LedgerError::Cache("timeout".into()));
            }
            self.inner.flush_orders(orders).await
        }
        async fn flush_fills(&self, fills: &[Fill]) -> LedgerResult<FlushResult> {
            self.inner.flush_fills(fills).await
        }
        async fn flush_ohlc(&self, candles: &[OhlcCandle]) -> LedgerResult<FlushResult> {
            self.inner.flush_ohlc(candles).await
        }
        async fn get_all_orders(&self) -> LedgerResult<Vec<Order>> {
            self.inner.get_all_orders().await
        }
        async fn get_all_fills(&self) -> LedgerResult<Vec<Fill>> {
            self.inner.get_all_fills().await
        }
        async fn get_ohlc_candles(&self, interval: &str) -> LedgerResult<Vec<OhlcCandle>> {
            self.inner.get_ohlc_candles(interval).await
        }
    }

    #[tokio::test]
    async fn test_flush_moves_pending_to_cache() {
        let store = seeded_store();
        let cache = Arc::new(MemoryCache::new());
        cache.init().await.unwrap();
        let pipeline = FlushPipeline::new(store.clone(), cache.clone());

        let report = pipeline.flush_once().await;
        assert!(report.is_complete());
        assert_eq!(report.orders.success, 2);
        assert_eq!(report.fills.success, 1);
        assert_eq!(report.ohlc.success, 1);
        assert_eq!(cache.order_count(), 2);

        let stats = lock_store(&store).stats();
        assert_eq!(stats.pending_orders, 0);
        assert_eq!(stats.pending_fills, 0);
        assert_eq!(stats.pending_ohlc, 0);

        // Nothing new: nothing re-sent
        assert!(pipeline.flush_once().await.is_empty());
    }

    #[tokio::test]
    async fn test_batch_failure_requeues_whole_batch() {
        let store = seeded_store();
        let cache = Arc::new(FlakyCache::default());
        cache.init().await.unwrap();
        cache.down.store(true, Ordering::SeqCst);
        let pipeline = FlushPipeline::new(store.clone(), cache.clone());

        let report = pipeline.flush_once().await;
        assert_eq!(report.orders.failed, 2);
        assert_eq!(report.fills.success, 1);
        assert_eq!(report.requeued, 2);
        assert_eq!(lock_store(&store).stats().pending_orders, 2);

        cache.down.store(false, Ordering::SeqCst);
        let report = pipeline.flush_once().await;
        assert_eq!(report.orders.success, 2);
        assert_eq!(report.requeued, 0);
        assert_eq!(cache.inner.order_count(), 2);
    }

    #[tokio::test]
    async fn test_item_failures_requeued_by_key() {
        let store = seeded_store();
        // Never initialized: every item fails individually
        let cache = Arc::new(MemoryCache::new());
        let pipeline = FlushPipeline::new(store.clone(), cache.clone());

        let report = pipeline.flush_once().await;
        assert_eq!(report.requeued, 4);
        let stats = lock_store(&store).stats();
        assert_eq!(stats.pending_orders, 2);
        assert_eq!(stats.pending_fills, 1);
        assert_eq!(stats.pending_ohlc, 1);
    }

    #[tokio::test]
    async fn test_batch_size_limits_drain() {
        let store = seeded_store();
        let cache = Arc::new(MemoryCache::new());
        cache.init().await.unwrap();
        let pipeline = FlushPipeline::new(store.clone(), cache.clone()).with_batch_size(1);

        let report = pipeline.flush_once().await;
        assert_eq!(report.orders.success, 1);
        assert_eq!(lock_store(&store).stats().pending_orders, 1);
    }

    #[tokio::test]
    async fn test_run_flushes_on_shutdown() {
        let store = shared(StateStore::new());
        let cache = Arc::new(MemoryCache::new());
        cache.init().await.unwrap();
        let pipeline = Arc::new(FlushPipeline::new(store.clone(), cache.clone()));
        let (trigger, signal) = shutdown_channel();

        let runner = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.run(Duration::from_secs(3600), signal).await })
        };
        // Let the immediate first tick pass
        tokio::time::sleep(Duration::from_millis(20)).await;

        lock_store(&store)
            .add_order(Order::new("O9", "ETH/USD").with_session("S1"))
            .unwrap();
        trigger.request_shutdown();
        tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(cache.order_count(), 1);
    }
}
