//! End-to-end ledger scenarios: ingestion, restart recovery, flush and
//! migration across all tiers.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;

use exec_ledger::audit::{AuditLog, AuditRecord, JsonlAuditLog, MemoryAuditLog};
use exec_ledger::cache::{DurabilityCache, MemoryCache};
use exec_ledger::flush::FlushPipeline;
use exec_ledger::models::{Fill, Order, OrderPatch, OrderStatus};
use exec_ledger::recovery::{AuditRecovery, RebuildOptions, RecoveryOptions};
use exec_ledger::relational::{MemoryRelationalStore, MigrationEngine, RelationalStore};
use exec_ledger::store::{StateStore, lock_store, shared};

fn test_dir(name: &str) -> String {
    let dir = format!("target/test_ledger_{}_{}", name, std::process::id());
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn scenario_duplicate_execution_is_ignored() {
    let mut store = StateStore::new();
    store.add_order(Order::new("O1", "BTC/USD")).unwrap();

    let first = store
        .add_fill(Fill::new("O1", "E1").with_fill_id("F1"))
        .unwrap();
    let second = store
        .add_fill(Fill::new("O1", "E1").with_fill_id("F2"))
        .unwrap();

    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(store.all_fills().len(), 1);
    assert_eq!(store.stats().duplicate_fills_skipped, 1);
}

#[tokio::test]
async fn scenario_replay_wrapped_log() {
    let log = MemoryAuditLog::new();
    for (status, ts) in [("OPEN", 1), ("FILLED", 2)] {
        let record = AuditRecord::from_value(
            json!({"orderData": {"orderId": "O1", "status": status}, "timestamp": ts}),
        )
        .unwrap();
        log.push_order_record("S1", record).unwrap();
    }
    let fill = AuditRecord::from_value(
        json!({"fillData": {"orderId": "O1", "execID": "E1"}, "timestamp": 2}),
    )
    .unwrap();
    log.push_fill_record("S1", fill).unwrap();

    let recovery = AuditRecovery::builder()
        .audit_log(Arc::new(log))
        .store(shared(StateStore::new()))
        .build()
        .unwrap();
    let result = recovery
        .rebuild_memory_from_audit("S1", &RebuildOptions::default())
        .await
        .unwrap();

    assert_eq!(result.orders_added_count, 1);
    assert_eq!(result.fills_added_count, 1);
    assert_eq!(
        lock_store(recovery.store()).get_order("O1").unwrap().status,
        OrderStatus::Filled
    );
}

/// Live session writes the audit log, process "restarts", a fresh store
/// is rebuilt from disk and matches the pre-crash ledger.
#[tokio::test]
async fn restart_rebuilds_ledger_from_jsonl() {
    let dir = test_dir("restart");
    let log = Arc::new(JsonlAuditLog::new(&dir));

    // --- Live session ---
    let mut live = StateStore::new();
    let order = live
        .add_order(Order::new("O1", "BTC/USD").with_session("S1"))
        .unwrap();
    log.log_order_event("order_created", &order).await.unwrap();

    let order = live
        .update_order("O1", OrderPatch::exchange_order_id("X-77"))
        .unwrap();
    log.log_order_event("order_acknowledged", &order).await.unwrap();

    for exec in ["E1", "E2"] {
        let fill = Fill::new("O1", exec)
            .with_session("S1")
            .with_execution(Decimal::ONE, Decimal::from(42_000));
        if let Some(fill) = live.add_fill(fill).unwrap() {
            log.log_fill_event(&fill).await.unwrap();
        }
    }
    let order = live
        .update_order("O1", OrderPatch::status(OrderStatus::Filled))
        .unwrap();
    log.log_order_event("order_filled", &order).await.unwrap();

    // --- Restart ---
    let recovery = AuditRecovery::builder()
        .audit_log(log.clone())
        .store(shared(StateStore::new()))
        .build()
        .unwrap();
    let first = recovery
        .rebuild_memory_from_audit("S1", &RebuildOptions::default())
        .await
        .unwrap();
    let second = recovery
        .rebuild_memory_from_audit("S1", &RebuildOptions::default())
        .await
        .unwrap();

    assert_eq!(first.orders_added_count, 1);
    assert_eq!(first.fills_added_count, 2);
    assert_eq!(second.fills_added_count, 0);
    assert_eq!(second.fills_duplicate, 2);

    {
        let rebuilt = lock_store(recovery.store());
        let order = rebuilt.get_order_by_exchange_id("X-77").unwrap();
        assert_eq!(order.order_id, "O1");
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(rebuilt.all_fills().len(), live.all_fills().len());
        assert_eq!(
            rebuilt.get_fill_by_exec_id("E2").unwrap().total,
            Decimal::from(42_000)
        );
    }

    let _ = std::fs::remove_dir_all(&dir);
}

/// memory → cache → relational, then migrate again: same row counts
#[tokio::test]
async fn tiers_converge_and_migration_is_idempotent() {
    let store = shared(StateStore::new());
    {
        let mut s = lock_store(&store);
        s.add_order(Order::new("O1", "BTC/USD").with_session("S1")).unwrap();
        s.add_order(Order::new("O2", "ETH/USD").with_session("S1")).unwrap();
        s.add_fill(Fill::new("O1", "E1").with_session("S1")).unwrap();
        s.add_fill(Fill::new("O2", "E2").with_session("S1")).unwrap();
        s.update_order("O1", OrderPatch::status(OrderStatus::Filled));
    }

    let cache = Arc::new(MemoryCache::new());
    cache.init().await.unwrap();
    let pipeline = FlushPipeline::new(store.clone(), cache.clone());
    let cycle = pipeline.flush_once().await;
    assert!(cycle.is_complete());
    assert_eq!(cache.order_count(), 2);
    assert_eq!(cache.fill_count(), 2);

    let relational = Arc::new(MemoryRelationalStore::new());
    let engine = MigrationEngine::new(relational.clone());
    let once = engine.migrate_from_cache(cache.as_ref(), "S1").await;
    let counts_once = relational.row_counts().await.unwrap();
    let twice = engine.migrate_from_cache(cache.as_ref(), "S1").await;
    let counts_twice = relational.row_counts().await.unwrap();

    assert!(once.is_complete());
    assert_eq!(once.orders.success, 2);
    assert_eq!(once.fills.success, 2);
    assert_eq!(twice.orders, once.orders);
    assert_eq!(counts_once, counts_twice);
    assert_eq!(relational.order("O1").unwrap().status, OrderStatus::Filled);
}

/// Cache down during recovery: memory stands, the report says what to
/// re-flush, and the flush pipeline catches up once the cache is back.
#[tokio::test]
async fn recovery_survives_cache_outage() {
    let log = Arc::new(MemoryAuditLog::new());
    let order = Order::new("O1", "BTC/USD")
        .with_session("S1")
        .with_status(OrderStatus::Open);
    log.log_order_event("order_opened", &order).await.unwrap();
    log.log_fill_event(&Fill::new("O1", "E1").with_session("S1"))
        .await
        .unwrap();

    // Not initialized yet: every write fails item by item
    let cache = Arc::new(MemoryCache::new());
    let store = shared(StateStore::new());
    let recovery = AuditRecovery::builder()
        .audit_log(log)
        .store(store.clone())
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

    assert!(!report.is_complete());
    assert_eq!(report.rebuild.orders_added_count, 1);
    let flush = report.cache_flush.as_ref().unwrap();
    assert_eq!(flush.orders.failed, 1);
    assert_eq!(flush.fills.failed, 1);
    assert_eq!(lock_store(&store).get_order("O1").unwrap().status, OrderStatus::Open);

    cache.init().await.unwrap();
    let cycle = FlushPipeline::new(store.clone(), cache.clone())
        .flush_once()
        .await;
    assert!(cycle.is_complete());
    assert_eq!(cache.order_count(), 1);
    assert_eq!(cache.fill_count(), 1);
}
