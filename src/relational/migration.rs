//! Cache → relational migration
//!
//! Reads a full session snapshot from the durability cache and upserts it
//! into the store of record. Idempotence comes from the storage keys, so
//! the same snapshot may be migrated any number of times.
//!
//! Nothing here returns an error: cache read failures and per-row write
//! failures are counted in the [`MigrationReport`] and logged.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::Serialize;

use super::{RelationalStore, SessionRecord};
use crate::cache::{DurabilityCache, candle_key};
use crate::error::LedgerResult;
use crate::models::{Fill, Order, deduplication_key, derive_fill_id};

/// Candle interval migrated when none is configured
pub const DEFAULT_INTERVAL: &str = "1m";

// ============================================================
// REPORT
// ============================================================

/// Per-entity outcome; `skipped` is only used for fills
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationError {
    /// "sessions", "orders", "fills" or "ohlc"
    pub entity: &'static str,
    /// Row key, or `"*"` when the snapshot could not be read
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub session_id: String,
    pub sessions: EntityCounts,
    pub orders: EntityCounts,
    pub fills: EntityCounts,
    pub ohlc: EntityCounts,
    pub errors: Vec<MigrationError>,
}

impl MigrationReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    fn fail(&mut self, entity: &'static str, key: impl Into<String>, error: impl ToString) {
        let counts = match entity {
            "sessions" => &mut self.sessions,
            "orders" => &mut self.orders,
            "fills" => &mut self.fills,
            _ => &mut self.ohlc,
        };
        counts.failed += 1;
        self.errors.push(MigrationError {
            entity,
            key: key.into(),
            error: error.to_string(),
        });
    }
}

// ============================================================
// ENGINE
// ============================================================

pub struct MigrationEngine {
    store: Arc<dyn RelationalStore>,
    intervals: Vec<String>,
}

impl MigrationEngine {
    pub fn new(store: Arc<dyn RelationalStore>) -> Self {
        Self {
            store,
            intervals: vec![DEFAULT_INTERVAL.to_string()],
        }
    }

    /// Candle intervals to migrate (empty keeps the default)
    pub fn with_intervals(mut self, intervals: Vec<String>) -> Self {
        if !intervals.is_empty() {
            self.intervals = intervals;
        }
        self
    }

    pub fn store(&self) -> &Arc<dyn RelationalStore> {
        &self.store
    }

    /// Migrate the session's cache snapshot into the relational store
    pub async fn migrate_from_cache(
        &self,
        cache: &dyn DurabilityCache,
        session_id: &str,
    ) -> MigrationReport {
        let mut report = MigrationReport {
            session_id: session_id.to_string(),
            ..Default::default()
        };
        tracing::info!(
            session_id = %session_id,
            cache = cache.name(),
            store = self.store.name(),
            "Migration started"
        );

        // --- Snapshot ---
        let orders = read_or_report(cache.get_all_orders().await, &mut report, "orders");
        let orders = session_orders(orders, session_id);

        let fills = read_or_report(cache.get_all_fills().await, &mut report, "fills");
        let fills = session_fills(fills, session_id, &mut report);

        let mut candles = Vec::new();
        for interval in &self.intervals {
            candles.extend(read_or_report(
                cache.get_ohlc_candles(interval).await,
                &mut report,
                "ohlc",
            ));
        }

        // --- Upserts: session row first ---
        let session = session_record(session_id, &orders, &fills);
        match self.store.upsert_session(&session).await {
            Ok(()) => report.sessions.success += 1,
            Err(e) => report.fail("sessions", session_id, e),
        }

        for order in &orders {
            match self.store.upsert_order(order).await {
                Ok(()) => report.orders.success += 1,
                Err(e) => report.fail("orders", &order.order_id, e),
            }
        }
        for fill in &fills {
            match self.store.upsert_fill(fill).await {
                Ok(()) => report.fills.success += 1,
                Err(e) => report.fail("fills", &fill.exec_id, e),
            }
        }
        for candle in &candles {
            match self.store.upsert_candle(candle).await {
                Ok(()) => report.ohlc.success += 1,
                Err(e) => report.fail("ohlc", candle_key(candle), e),
            }
        }

        for error in &report.errors {
            tracing::warn!(
                entity = error.entity,
                key = %error.key,
                error = %error.error,
                "Migration item failed"
            );
        }
        tracing::info!(
            session_id = %session_id,
            orders_ok = report.orders.success,
            orders_failed = report.orders.failed,
            fills_ok = report.fills.success,
            fills_failed = report.fills.failed,
            fills_skipped = report.fills.skipped,
            ohlc_ok = report.ohlc.success,
            ohlc_failed = report.ohlc.failed,
            "Migration complete"
        );
        report
    }
}

// ============================================================
// NORMALIZATION
// ============================================================

fn read_or_report<T>(read: LedgerResult<Vec<T>>, report: &mut MigrationReport, entity: &'static str) -> Vec<T> {
    match read {
        Ok(items) => items,
        Err(e) => {
            tracing::error!(entity, error = %e, "Cache snapshot read failed");
            report.fail(entity, "*", e);
            Vec::new()
        }
    }
}

/// Orders of this session; a missing session id is taken to be this one
fn session_orders(orders: Vec<Order>, session_id: &str) -> Vec<Order> {
    orders
        .into_iter()
        .filter_map(|mut order| {
            if order.session_id.is_empty() {
                order.session_id = session_id.to_string();
            }
            (order.session_id == session_id).then_some(order)
        })
        .collect()
}

/// Fills of this session, normalized; unusable or repeated fills are skipped
fn session_fills(fills: Vec<Fill>, session_id: &str, report: &mut MigrationReport) -> Vec<Fill> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut out = Vec::with_capacity(fills.len());

    for mut fill in fills {
        if fill.session_id.is_empty() {
            fill.session_id = session_id.to_string();
        }
        if fill.session_id != session_id {
            continue;
        }
        if fill.exec_id.is_empty() {
            report.fills.skipped += 1;
            tracing::warn!(fill_id = %fill.fill_id, "Fill without execID not migrated");
            continue;
        }

        fill.deduplication_key = deduplication_key(&fill.session_id, &fill.exec_id);
        if !seen.insert(fill.deduplication_key.clone()) {
            report.fills.skipped += 1;
            continue;
        }
        if fill.fill_id.is_empty() {
            fill.fill_id = derive_fill_id(&fill.order_id, &fill.exec_id);
        }
        if fill.total.is_zero() {
            fill.total = fill.quantity * fill.price;
        }
        out.push(fill);
    }
    out
}

fn session_record(session_id: &str, orders: &[Order], fills: &[Fill]) -> SessionRecord {
    let starts = orders
        .iter()
        .map(|o| o.created_at)
        .chain(fills.iter().map(|f| f.timestamp));
    let ends = orders
        .iter()
        .map(|o| o.updated_at)
        .chain(fills.iter().map(|f| f.timestamp));

    SessionRecord {
        session_id: session_id.to_string(),
        order_count: orders.len() as u64,
        fill_count: fills.len() as u64,
        first_event_at: starts.min(),
        last_event_at: ends.max(),
    }
}
