//! In-process relational store
//!
//! Same keys and upsert semantics as the PostgreSQL tables, held in
//! ordered maps. Used for embedding without a database and in tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{RelationalStore, RowCounts, SessionRecord};
use crate::core_types::{ExecId, OrderId, SessionId, TimestampMs};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Fill, OhlcCandle, Order};

type CandleKey = (String, String, String, TimestampMs);

#[derive(Debug, Default)]
struct Tables {
    sessions: BTreeMap<SessionId, SessionRecord>,
    orders: BTreeMap<OrderId, Order>,
    fills: BTreeMap<ExecId, Fill>,
    ohlc: BTreeMap<CandleKey, OhlcCandle>,
}

#[derive(Debug, Default)]
pub struct MemoryRelationalStore {
    tables: Mutex<Tables>,
}

impl MemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> LedgerResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| LedgerError::Config("relational store lock poisoned".into()))
    }

    pub fn session(&self, session_id: &str) -> Option<SessionRecord> {
        self.tables().ok()?.sessions.get(session_id).cloned()
    }

    pub fn order(&self, order_id: &str) -> Option<Order> {
        self.tables().ok()?.orders.get(order_id).cloned()
    }

    pub fn fill(&self, exec_id: &str) -> Option<Fill> {
        self.tables().ok()?.fills.get(exec_id).cloned()
    }
}

#[async_trait]
impl RelationalStore for MemoryRelationalStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upsert_session(&self, session: &SessionRecord) -> LedgerResult<()> {
        self.tables()?
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn upsert_order(&self, order: &Order) -> LedgerResult<()> {
        self.tables()?
            .orders
            .insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn upsert_fill(&self, fill: &Fill) -> LedgerResult<()> {
        let mut tables = self.tables()?;
        // deduplication_key is unique across rows
        let clash = tables
            .fills
            .values()
            .any(|f| f.deduplication_key == fill.deduplication_key && f.exec_id != fill.exec_id);
        if clash {
            return Err(LedgerError::Conflict(format!(
                "deduplication_key {}",
                fill.deduplication_key
            )));
        }
        tables.fills.insert(fill.exec_id.clone(), fill.clone());
        Ok(())
    }

    async fn upsert_candle(&self, candle: &OhlcCandle) -> LedgerResult<()> {
        self.tables()?.ohlc.insert(candle.key(), candle.clone());
        Ok(())
    }

    async fn row_counts(&self) -> LedgerResult<RowCounts> {
        let tables = self.tables()?;
        Ok(RowCounts {
            sessions: tables.sessions.len() as u64,
            orders: tables.orders.len() as u64,
            fills: tables.fills.len() as u64,
            ohlc: tables.ohlc.len() as u64,
        })
    }
}
