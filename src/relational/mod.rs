//! Relational store of record
//!
//! Permanent storage behind the durability cache. Every write is an
//! upsert keyed by the record's natural key, so the migration engine can
//! re-read a whole cache snapshot and write it again without growing the
//! tables.
//!
//! | Table         | Key                                   |
//! |---------------|---------------------------------------|
//! | `sessions_tb` | `session_id`                          |
//! | `orders_tb`   | `order_id`                            |
//! | `fills_tb`    | `exec_id` (unique `deduplication_key`) |
//! | `ohlc_tb`     | `(symbol, exchange, interval, ts)`    |

pub mod memory;
pub mod migration;
pub mod pg;

pub use memory::MemoryRelationalStore;
pub use migration::{EntityCounts, MigrationEngine, MigrationError, MigrationReport};
pub use pg::PgRelationalStore;

use async_trait::async_trait;
use serde::Serialize;

use crate::core_types::{SessionId, TimestampMs};
use crate::error::LedgerResult;
use crate::models::{Fill, OhlcCandle, Order};

/// One row of `sessions_tb`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub order_count: u64,
    pub fill_count: u64,
    /// Earliest order creation / fill time in the snapshot
    pub first_event_at: Option<TimestampMs>,
    /// Latest order update / fill time in the snapshot
    pub last_event_at: Option<TimestampMs>,
}

/// Row count per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    pub sessions: u64,
    pub orders: u64,
    pub fills: u64,
    pub ohlc: u64,
}

/// Idempotent single-row upserts into the store of record
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Store name for logging
    fn name(&self) -> &'static str;

    async fn upsert_session(&self, session: &SessionRecord) -> LedgerResult<()>;

    async fn upsert_order(&self, order: &Order) -> LedgerResult<()>;

    /// Keyed by `exec_id`
    async fn upsert_fill(&self, fill: &Fill) -> LedgerResult<()>;

    async fn upsert_candle(&self, candle: &OhlcCandle) -> LedgerResult<()>;

    async fn row_counts(&self) -> LedgerResult<RowCounts>;
}
