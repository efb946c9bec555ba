//! StateStore - in-memory ledger for one trading session
//!
//! Holds orders, fills and OHLC candles, plus one pending-write queue per
//! entity type for the flush pipeline.
//!
//! # Thread Safety
//! Single writer per session. All mutation takes `&mut self`; share it
//! across tasks through [`super::SharedStateStore`].
//!
//! # Idempotence
//! Fills are deduplicated by `exec_id` for the lifetime of the store.
//! A redelivered or replayed execution is a no-op that returns `None`.

use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::Serialize;

use super::index::ExchangeIdIndex;
use super::pending::PendingQueue;
use crate::core_types::{ExecId, FillId, OrderId, TimestampMs, now_ms};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Fill, OhlcCandle, Order, OrderPatch, deduplication_key};

// ============================================================
// STATS
// ============================================================

/// Point-in-time counters reported by [`StateStore::stats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub orders_in_memory: usize,
    pub fills_in_memory: usize,
    pub ohlc_in_buffer: usize,
    pub pending_orders: usize,
    pub pending_fills: usize,
    pub pending_ohlc: usize,
    pub orders_processed: u64,
    pub fills_processed: u64,
    pub ohlc_processed: u64,
    pub duplicate_fills_skipped: u64,
    pub orders_evicted: u64,
}

#[derive(Debug, Default)]
struct Counters {
    orders_processed: u64,
    fills_processed: u64,
    ohlc_processed: u64,
    duplicate_fills_skipped: u64,
    orders_evicted: u64,
}

// ============================================================
// STATE STORE
// ============================================================

#[derive(Debug, Default)]
pub struct StateStore {
    orders: FxHashMap<OrderId, Order>,
    exchange_index: ExchangeIdIndex,

    fills: FxHashMap<FillId, Fill>,
    exec_index: FxHashMap<ExecId, FillId>,

    ohlc_buffer: Vec<OhlcCandle>,

    pending_orders: PendingQueue<Order>,
    pending_fills: PendingQueue<Fill>,
    pending_ohlc: PendingQueue<OhlcCandle>,

    counters: Counters,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --------------------------------------------------------
    // Orders
    // --------------------------------------------------------

    /// Insert (or replace) an order and queue it for flushing
    ///
    /// # Errors
    /// `Validation` if `order_id` is empty.
    pub fn add_order(&mut self, order: Order) -> LedgerResult<Order> {
        if order.order_id.is_empty() {
            return Err(LedgerError::validation("orderId"));
        }

        let previous_exchange_id = self
            .orders
            .get(&order.order_id)
            .and_then(|o| o.exchange_order_id.clone());
        self.exchange_index.reindex(
            &order.order_id,
            previous_exchange_id.as_deref(),
            order.exchange_order_id.as_deref(),
        );

        self.orders.insert(order.order_id.clone(), order.clone());
        self.pending_orders.push(order.clone());
        self.counters.orders_processed += 1;

        tracing::trace!(order_id = %order.order_id, status = %order.status, "Order added");
        Ok(order)
    }

    #[inline]
    pub fn get_order(&self, order_id: &str) -> Option<&Order> {
        self.orders.get(order_id)
    }

    pub fn get_order_by_exchange_id(&self, exchange_order_id: &str) -> Option<&Order> {
        self.exchange_index
            .get(exchange_order_id)
            .and_then(|order_id| self.orders.get(order_id))
    }

    /// Merge `patch` into a stored order
    ///
    /// Returns `None` (and logs a warning) when `order_id` is unknown.
    /// Callers must check the result; this path never fails.
    pub fn update_order(&mut self, order_id: &str, patch: OrderPatch) -> Option<Order> {
        let Some(order) = self.orders.get_mut(order_id) else {
            tracing::warn!(order_id = %order_id, "Order not found for update");
            return None;
        };

        let old_exchange_id = order.exchange_order_id.clone();
        patch.apply_to(order);
        order.updated_at = now_ms();

        if order.exchange_order_id != old_exchange_id {
            self.exchange_index.reindex(
                order_id,
                old_exchange_id.as_deref(),
                order.exchange_order_id.as_deref(),
            );
        }

        let merged = order.clone();
        self.pending_orders.push(merged.clone());
        Some(merged)
    }

    /// All orders in memory, in no particular order
    pub fn all_orders(&self) -> Vec<&Order> {
        self.orders.values().collect()
    }

    // --------------------------------------------------------
    // Fills
    // --------------------------------------------------------

    /// Insert a fill unless its `exec_id` has been seen before
    ///
    /// Returns `Ok(None)` for a duplicate execution: the expected signal for
    /// exchange redelivery or log replay, counted in `duplicate_fills_skipped`.
    ///
    /// # Errors
    /// `Validation` if `fill_id` or `exec_id` is empty; `Conflict` if a new
    /// `exec_id` arrives under a `fill_id` already held by another execution.
    pub fn add_fill(&mut self, mut fill: Fill) -> LedgerResult<Option<Fill>> {
        if fill.fill_id.is_empty() {
            return Err(LedgerError::validation("fillId"));
        }
        if fill.exec_id.is_empty() {
            return Err(LedgerError::validation("execID"));
        }

        if let Some(existing_fill_id) = self.exec_index.get(&fill.exec_id) {
            self.counters.duplicate_fills_skipped += 1;
            tracing::warn!(
                exec_id = %fill.exec_id,
                fill_id = %fill.fill_id,
                existing_fill_id = %existing_fill_id,
                "Duplicate execution skipped"
            );
            return Ok(None);
        }

        // A different execution reusing a stored fill_id would orphan the
        // exec index entry of the first one.
        if let Some(existing) = self.fills.get(&fill.fill_id) {
            tracing::warn!(
                fill_id = %fill.fill_id,
                exec_id = %fill.exec_id,
                existing_exec_id = %existing.exec_id,
                "Fill id already bound to another execution"
            );
            return Err(LedgerError::Conflict(format!(
                "fill_id {} already bound to execID {}",
                fill.fill_id, existing.exec_id
            )));
        }

        if fill.deduplication_key.is_empty() {
            fill.deduplication_key = deduplication_key(&fill.session_id, &fill.exec_id);
        }

        self.exec_index
            .insert(fill.exec_id.clone(), fill.fill_id.clone());
        self.fills.insert(fill.fill_id.clone(), fill.clone());
        self.pending_fills.push(fill.clone());
        self.counters.fills_processed += 1;

        tracing::trace!(fill_id = %fill.fill_id, exec_id = %fill.exec_id, "Fill added");
        Ok(Some(fill))
    }

    #[inline]
    pub fn get_fill(&self, fill_id: &str) -> Option<&Fill> {
        self.fills.get(fill_id)
    }

    pub fn get_fill_by_exec_id(&self, exec_id: &str) -> Option<&Fill> {
        self.exec_index
            .get(exec_id)
            .and_then(|fill_id| self.fills.get(fill_id))
    }

    /// All fills in memory, in no particular order
    pub fn all_fills(&self) -> Vec<&Fill> {
        self.fills.values().collect()
    }

    // --------------------------------------------------------
    // OHLC
    // --------------------------------------------------------

    /// Append a candle to the buffer and the pending queue
    ///
    /// # Errors
    /// `Validation` if `timestamp` is not set (zero or negative).
    pub fn add_ohlc(&mut self, candle: OhlcCandle) -> LedgerResult<()> {
        if candle.timestamp <= 0 {
            return Err(LedgerError::validation("timestamp"));
        }
        self.ohlc_buffer.push(candle.clone());
        self.pending_ohlc.push(candle);
        self.counters.ohlc_processed += 1;
        Ok(())
    }

    /// Candles in insertion order
    pub fn ohlc_buffer(&self) -> &[OhlcCandle] {
        &self.ohlc_buffer
    }

    // --------------------------------------------------------
    // Pending queues (flush pipeline)
    // --------------------------------------------------------

    /// Remove and return up to `limit` pending orders (all when `None`)
    pub fn take_pending_orders(&mut self, limit: Option<usize>) -> Vec<Order> {
        self.pending_orders.take(limit)
    }

    /// Remove and return up to `limit` pending fills (all when `None`)
    pub fn take_pending_fills(&mut self, limit: Option<usize>) -> Vec<Fill> {
        self.pending_fills.take(limit)
    }

    /// Remove and return up to `limit` pending candles (all when `None`)
    ///
    /// Drained candles are also cleared from the buffer: candles are flushed
    /// and cleared as a batch.
    pub fn take_pending_ohlc(&mut self, limit: Option<usize>) -> Vec<OhlcCandle> {
        let batch = self.pending_ohlc.take(limit);
        // Buffer and queue hold the same candles in the same order
        let drained = batch.len().min(self.ohlc_buffer.len());
        self.ohlc_buffer.drain(..drained);
        batch
    }

    /// Return orders whose downstream write failed to the front of the queue
    pub fn requeue_orders(&mut self, orders: Vec<Order>) {
        self.pending_orders.requeue_front(orders);
    }

    pub fn requeue_fills(&mut self, fills: Vec<Fill>) {
        self.pending_fills.requeue_front(fills);
    }

    /// Requeued candles are restored to the front of the buffer too
    pub fn requeue_ohlc(&mut self, candles: Vec<OhlcCandle>) {
        self.ohlc_buffer.splice(0..0, candles.iter().cloned());
        self.pending_ohlc.requeue_front(candles);
    }

    // --------------------------------------------------------
    // Retention / stats / reset
    // --------------------------------------------------------

    /// Evict terminal orders not updated within `max_age`
    ///
    /// Non-terminal orders are never evicted. Returns the eviction count.
    pub fn cleanup(&mut self, max_age: Duration) -> usize {
        self.cleanup_at(now_ms(), max_age)
    }

    /// [`Self::cleanup`] against an explicit clock
    pub fn cleanup_at(&mut self, now: TimestampMs, max_age: Duration) -> usize {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);

        let expired: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| o.status.is_terminal() && now.saturating_sub(o.updated_at) > max_age_ms)
            .map(|o| o.order_id.clone())
            .collect();

        for order_id in &expired {
            if let Some(order) = self.orders.remove(order_id)
                && let Some(exchange_id) = order.exchange_order_id.as_deref()
            {
                self.exchange_index.unlink(order_id, exchange_id);
            }
        }

        let evicted = expired.len();
        self.counters.orders_evicted += evicted as u64;
        if evicted > 0 {
            tracing::info!(evicted, max_age_ms, "Evicted terminal orders");
        }
        evicted
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            orders_in_memory: self.orders.len(),
            fills_in_memory: self.fills.len(),
            ohlc_in_buffer: self.ohlc_buffer.len(),
            pending_orders: self.pending_orders.len(),
            pending_fills: self.pending_fills.len(),
            pending_ohlc: self.pending_ohlc.len(),
            orders_processed: self.counters.orders_processed,
            fills_processed: self.counters.fills_processed,
            ohlc_processed: self.counters.ohlc_processed,
            duplicate_fills_skipped: self.counters.duplicate_fills_skipped,
            orders_evicted: self.counters.orders_evicted,
        }
    }

    /// Clear everything and zero counters
    ///
    /// Cold start / test setup only; recovery never calls this.
    pub fn reset(&mut self) {
        *self = Self::default();
        tracing::info!("State store reset");
    }
}

// ============================================================
// Unit Tests
// ============================================================
