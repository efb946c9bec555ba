//! Audit Log Recovery
//!
//! Rebuilds the in-memory ledger from the append-only audit log after a
//! restart, optionally backfilling the durability cache.
//!
//! # Recovery Flow
//!
//! 1. Fetch the full ordered session history from the audit log
//! 2. Orders: keep the last entry per order id, materialize, `add_order`
//! 3. Fills: normalize, drop entries without order id / exec id, `add_fill`
//!    (exec id dedup makes a second replay a no-op)
//! 4. Optionally push exactly the newly added records to the cache
//!
//! Recovery is exclusive: it must complete before the session accepts live
//! events. A cache backfill failure never undoes the rebuild; it is reported
//! so the flush alone can be re-run.

use std::sync::Arc;

use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::audit::{AuditHistory, AuditLog, AuditRecord};
use crate::cache::{DurabilityCache, FlushResult};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Fill, Order};
use crate::store::{SharedStateStore, StateStore, lock_store};

// ============================================================
// OPTIONS / RESULTS
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct RebuildOptions {
    /// Restrict replay to one UTC day partition
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct RecoveryOptions {
    pub date: Option<NaiveDate>,
    /// Push the rebuilt records to the durability cache
    pub flush_to_cache: bool,
}

/// What a rebuild actually put into memory
///
/// Counts describe records added to the store, not raw log entries;
/// skipped and duplicate entries are excluded from both counts and lists.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RebuildResult {
    pub session_id: String,
    pub orders_added_count: usize,
    pub fills_added_count: usize,
    pub orders_added: Vec<Order>,
    pub fills_added: Vec<Fill>,
    /// Raw order / fill entries read from the log
    pub order_records_read: usize,
    pub fill_records_read: usize,
    /// Order entries that could not be materialized or stored
    pub orders_failed: usize,
    /// Fill entries without order id / exec id, or rejected by the store
    pub fills_skipped: usize,
    /// Fill entries whose exec id was already in the ledger
    pub fills_duplicate: usize,
}

/// Per-entity outcome of the cache backfill
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheFlushReport {
    pub orders: FlushResult,
    pub fills: FlushResult,
}

impl CacheFlushReport {
    pub fn is_complete(&self) -> bool {
        self.orders.is_complete() && self.fills.is_complete()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    pub rebuild: RebuildResult,
    /// `None` when no backfill was requested or no cache is configured
    pub cache_flush: Option<CacheFlushReport>,
}

impl RecoveryReport {
    /// Memory rebuilt and, if requested, every record reached the cache
    pub fn is_complete(&self) -> bool {
        self.cache_flush
            .as_ref()
            .is_none_or(CacheFlushReport::is_complete)
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`AuditRecovery`]
///
/// The audit log and state store are required; `build` fails with
/// `LedgerError::Config` if either is missing.
#[derive(Default)]
pub struct AuditRecoveryBuilder {
    audit_log: Option<Arc<dyn AuditLog>>,
    store: Option<SharedStateStore>,
    cache: Option<Arc<dyn DurabilityCache>>,
}

impl AuditRecoveryBuilder {
    pub fn audit_log(mut self, audit_log: Arc<dyn AuditLog>) -> Self {
        self.audit_log = Some(audit_log);
        self
    }

    pub fn store(mut self, store: SharedStateStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn DurabilityCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> LedgerResult<AuditRecovery> {
        let audit_log = self
            .audit_log
            .ok_or_else(|| LedgerError::Config("audit log reader is required".into()))?;
        let store = self
            .store
            .ok_or_else(|| LedgerError::Config("state store is required".into()))?;
        Ok(AuditRecovery {
            audit_log,
            store,
            cache: self.cache,
        })
    }
}

// ============================================================
// RECOVERY ENGINE
// ============================================================

pub struct AuditRecovery {
    audit_log: Arc<dyn AuditLog>,
    store: SharedStateStore,
    cache: Option<Arc<dyn DurabilityCache>>,
}

impl AuditRecovery {
    pub fn builder() -> AuditRecoveryBuilder {
        AuditRecoveryBuilder::default()
    }

    pub fn store(&self) -> &SharedStateStore {
        &self.store
    }

    /// Replay the session's audit history into the state store
    ///
    /// # Errors
    /// Only an audit log read failure; individual bad records are logged
    /// and skipped.
    pub async fn rebuild_memory_from_audit(
        &self,
        session_id: &str,
        options: &RebuildOptions,
    ) -> LedgerResult<RebuildResult> {
        tracing::info!(session_id = %session_id, date = ?options.date, "Rebuilding memory from audit log");

        let history = self
            .audit_log
            .recover_session_data(session_id, options.date)
            .await?;

        let result = {
            let mut store = lock_store(&self.store);
            apply_history(&mut store, session_id, &history)
        };

        tracing::info!(
            session_id = %session_id,
            order_records = result.order_records_read,
            fill_records = result.fill_records_read,
            orders_added = result.orders_added_count,
            fills_added = result.fills_added_count,
            orders_failed = result.orders_failed,
            fills_skipped = result.fills_skipped,
            fills_duplicate = result.fills_duplicate,
            "Audit replay complete"
        );
        Ok(result)
    }

    /// Rebuild memory, then optionally backfill the cache
    ///
    /// Cache failures are caught per entity type and reported in
    /// [`RecoveryReport::cache_flush`]; they never fail the recovery.
    pub async fn recover_from_audit_log(
        &self,
        session_id: &str,
        options: &RecoveryOptions,
    ) -> LedgerResult<RecoveryReport> {
        let rebuild = self
            .rebuild_memory_from_audit(session_id, &RebuildOptions { date: options.date })
            .await?;

        let cache_flush = match (&self.cache, options.flush_to_cache) {
            (Some(cache), true) => Some(self.backfill(cache.as_ref(), &rebuild).await),
            (None, true) => {
                tracing::warn!(session_id = %session_id, "Cache backfill requested but no cache configured");
                None
            }
            _ => None,
        };

        let report = RecoveryReport {
            rebuild,
            cache_flush,
        };
        if !report.is_complete() {
            tracing::warn!(
                session_id = %session_id,
                "Recovery finished with cache backfill failures; memory state is intact"
            );
        }
        Ok(report)
    }

    async fn backfill(&self, cache: &dyn DurabilityCache, rebuild: &RebuildResult) -> CacheFlushReport {
        let orders = match cache.flush_orders(&rebuild.orders_added).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(cache = cache.name(), error = %e, "Order backfill failed");
                FlushResult::batch_failed(rebuild.orders_added.len(), e.to_string())
            }
        };
        let fills = match cache.flush_fills(&rebuild.fills_added).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(cache = cache.name(), error = %e, "Fill backfill failed");
                FlushResult::batch_failed(rebuild.fills_added.len(), e.to_string())
            }
        };

        tracing::info!(
            cache = cache.name(),
            orders_ok = orders.success,
            orders_failed = orders.failed,
            fills_ok = fills.success,
            fills_failed = fills.failed,
            "Cache backfill complete"
        );
        CacheFlushReport { orders, fills }
    }
}

/// Apply a fetched history to the store (caller holds the lock)
fn apply_history(store: &mut StateStore, session_id: &str, history: &AuditHistory) -> RebuildResult {
    let mut result = RebuildResult {
        session_id: session_id.to_string(),
        order_records_read: history.orders.len(),
        fill_records_read: history.fills.len(),
        ..Default::default()
    };

    for record in latest_per_order(&history.orders, &mut result) {
        let order = match record.to_order(session_id) {
            Ok(order) => order,
            Err(e) => {
                result.orders_failed += 1;
                tracing::warn!(error = %e, "Skipping unusable order record");
                continue;
            }
        };
        match store.add_order(order) {
            Ok(order) => result.orders_added.push(order),
            Err(e) => {
                result.orders_failed += 1;
                tracing::warn!(error = %e, "Failed to restore order");
            }
        }
    }

    for record in &history.fills {
        let fill = match record.to_fill(session_id) {
            Ok(fill) => fill,
            Err(e) => {
                result.fills_skipped += 1;
                tracing::debug!(error = %e, "Skipping fill record without dedup identity");
                continue;
            }
        };
        match store.add_fill(fill) {
            Ok(Some(fill)) => result.fills_added.push(fill),
            Ok(None) => result.fills_duplicate += 1,
            Err(e) => {
                result.fills_skipped += 1;
                tracing::warn!(error = %e, "Failed to restore fill");
            }
        }
    }

    result.orders_added_count = result.orders_added.len();
    result.fills_added_count = result.fills_added.len();
    result
}

/// Last record per order id, in order of first appearance
///
/// Records without an order id are counted as failed.
fn latest_per_order<'a>(records: &'a [AuditRecord], result: &mut RebuildResult) -> Vec<&'a AuditRecord> {
    let mut slots: FxHashMap<String, usize> = FxHashMap::default();
    let mut latest: Vec<&AuditRecord> = Vec::new();

    for record in records {
        let Some(order_id) = record.order_id() else {
            result.orders_failed += 1;
            tracing::warn!(event = ?record.event(), "Order record without orderId skipped");
            continue;
        };
        match slots.get(&order_id) {
            Some(&slot) => latest[slot] = record,
            None => {
                slots.insert(order_id, latest.len());
                latest.push(record);
            }
        }
    }
    latest
}

// ============================================================
// Unit Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::cache::MemoryCache;
    use crate::models::{OhlcCandle, OrderStatus};
    use crate::store::shared;
    use async_trait::async_trait;
    use serde_json::json;

    struct DownCache;

    #[async_trait]
    impl DurabilityCache for DownCache {
        fn name(&self) -> &'static str {
            "down"
        }
        async fn init(&self) -> LedgerResult<()> {
            Ok(())
        }
        async fn close(&self) -> LedgerResult<()> {
            Ok(())
        }
        async fn flush_orders(&self, _: &[Order]) -> LedgerResult<FlushResult> {
            Err(LedgerError::Cache("connection refused".into()))
        }
        async fn flush_fills(&self, fills: &[Fill]) -> LedgerResult<FlushResult> {
            Ok(FlushResult {
                success: fills.len(),
                ..Default::default()
            })
        }
        async fn flush_ohlc(&self, _: &[OhlcCandle]) -> LedgerResult<FlushResult> {
            Ok(FlushResult::default())
        }
        async fn get_all_orders(&self) -> LedgerResult<Vec<Order>> {
            Ok(Vec::new())
        }
        async fn get_all_fills(&self) -> LedgerResult<Vec<Fill>> {
            Ok(Vec::new())
        }
        async fn get_ohlc_candles(&self, _: &str) -> LedgerResult<Vec<OhlcCandle>> {
            Ok(Vec::new())
        }
    }

    fn record(value: serde_json::Value) -> AuditRecord {
        AuditRecord::from_value(value).unwrap()
    }

    /// Scenario log: O1 OPEN then FILLED, one fill E1
    fn scenario_log() -> Arc<MemoryAuditLog> {
        let log = MemoryAuditLog::new();
        log.push_order_record("S1", record(json!({"orderData": {"orderId": "O1", "status": "OPEN"}, "timestamp": 1})))
            .unwrap();
        log.push_order_record("S1", record(json!({"orderData": {"orderId": "O1", "status": "FILLED"}, "timestamp": 2})))
            .unwrap();
        log.push_fill_record("S1", record(json!({"fillData": {"orderId": "O1", "execID": "E1"}, "timestamp": 2})))
            .unwrap();
        Arc::new(log)
    }

    fn engine(log: Arc<MemoryAuditLog>) -> AuditRecovery {
        AuditRecovery::builder()
            .audit_log(log)
            .store(shared(StateStore::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_missing_collaborators_is_config_error() {
        let err = AuditRecovery::builder()
            .store(shared(StateStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, LedgerError::Config(_)));

        let err = AuditRecovery::builder()
            .audit_log(Arc::new(MemoryAuditLog::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, LedgerError::Config(_)));
    }

    #[tokio::test]
    async fn test_last_event_wins() {
        let recovery = engine(scenario_log());
        let result = recovery
            .rebuild_memory_from_audit("S1", &RebuildOptions::default())
            .await
            .unwrap();

        assert_eq!(result.orders_added_count, 1);
        assert_eq!(result.fills_added_count, 1);
        assert_eq!(result.order_records_read, 2);

        let store = lock_store(recovery.store());
        let order = store.get_order("O1").unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.session_id, "S1");
        assert_eq!(store.get_fill("O1-E1").unwrap().deduplication_key, "S1_E1");
    }

    #[tokio::test]
    async fn test_replay_twice_converges() {
        let recovery = engine(scenario_log());
        let first = recovery
            .rebuild_memory_from_audit("S1", &RebuildOptions::default())
            .await
            .unwrap();
        let second = recovery
            .rebuild_memory_from_audit("S1", &RebuildOptions::default())
            .await
            .unwrap();

        assert_eq!(first.fills_added_count, 1);
        assert_eq!(second.fills_added_count, 0);
        assert_eq!(second.fills_duplicate, 1);

        let store = lock_store(recovery.store());
        let stats = store.stats();
        assert_eq!(stats.orders_in_memory, 1);
        assert_eq!(stats.fills_in_memory, 1);
        assert_eq!(store.get_order("O1").unwrap().status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_untrustworthy_fills_are_skipped() {
        let log = MemoryAuditLog::new();
        log.push_fill_record("S1", record(json!({"fillData": {"execID": "E1"}}))).unwrap();
        log.push_fill_record("S1", record(json!({"orderId": "O1"}))).unwrap();
        log.push_fill_record("S1", record(json!({"orderId": "O1", "execID": "E2", "quantity": 1, "price": 5})))
            .unwrap();

        let recovery = engine(Arc::new(log));
        let result = recovery
            .rebuild_memory_from_audit("S1", &RebuildOptions::default())
            .await
            .unwrap();
        assert_eq!(result.fills_skipped, 2);
        assert_eq!(result.fills_added_count, 1);
        assert_eq!(result.fills_added[0].fill_id, "O1-E2");
        assert_eq!(result.fills_added[0].total, rust_decimal::Decimal::from(5));
    }

    #[tokio::test]
    async fn test_bad_order_record_does_not_abort() {
        let log = MemoryAuditLog::new();
        log.push_order_record("S1", record(json!({"event": "order_created", "symbol": "BTC/USD"})))
            .unwrap();
        log.push_order_record("S1", record(json!({"orderData": {"orderId": "O2"}, "event": "order_cancelled"})))
            .unwrap();

        let recovery = engine(Arc::new(log));
        let result = recovery
            .rebuild_memory_from_audit("S1", &RebuildOptions::default())
            .await
            .unwrap();
        assert_eq!(result.orders_failed, 1);
        assert_eq!(result.orders_added_count, 1);

        let store = lock_store(recovery.store());
        assert_eq!(
            store.get_order("O2").unwrap().status,
            OrderStatus::Event("order_cancelled".into())
        );
    }

    #[tokio::test]
    async fn test_backfill_pushes_new_records() {
        let cache = Arc::new(MemoryCache::new());
        cache.init().await.unwrap();
        let recovery = AuditRecovery::builder()
            .audit_log(scenario_log())
            .store(shared(StateStore::new()))
            .cache(cache.clone())
            .build()
            .unwrap();

        let report = recovery
            .recover_from_audit_log(
                "S1",
                &RecoveryOptions {
                    date: None,
                    flush_to_cache: true,
                },
            )
            .await
            .unwrap();
        assert!(report.is_complete());
        let flush = report.cache_flush.unwrap();
        assert_eq!(flush.orders.success, 1);
        assert_eq!(flush.fills.success, 1);
        assert_eq!(cache.order_count(), 1);
        assert_eq!(cache.fill_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_failure_is_reported_not_raised() {
        let recovery = AuditRecovery::builder()
            .audit_log(scenario_log())
            .store(shared(StateStore::new()))
            .cache(Arc::new(DownCache))
            .build()
            .unwrap();

        let report = recovery
            .recover_from_audit_log(
                "S1",
                &RecoveryOptions {
                    date: None,
                    flush_to_cache: true,
                },
            )
            .await
            .unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.rebuild.orders_added_count, 1);
        let flush = report.cache_flush.as_ref().unwrap();
        assert_eq!(flush.orders.failed, 1);
        assert_eq!(flush.orders.errors[0].error, "Cache error: connection refused");
        assert_eq!(flush.fills.success, 1);

        // Memory rebuild stands
        assert!(lock_store(recovery.store()).get_order("O1").is_some());
    }

    #[tokio::test]
    async fn test_no_backfill_without_request() {
        let cache = Arc::new(MemoryCache::new());
        cache.init().await.unwrap();
        let recovery = AuditRecovery::builder()
            .audit_log(scenario_log())
            .store(shared(StateStore::new()))
            .cache(cache.clone())
            .build()
            .unwrap();
        let report = recovery
            .recover_from_audit_log("S1", &RecoveryOptions::default())
            .await
            .unwrap();
        assert!(report.cache_flush.is_none());
        assert_eq!(cache.order_count(), 0);
    }
}
