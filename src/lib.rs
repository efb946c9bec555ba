//! exec-ledger - Order/Fill Ledger with Audit-Log Recovery
//!
//! In-memory ledger of orders, fills and OHLC candles for one trading
//! session, reconciled through a durability cache into a relational store
//! of record, and rebuilt from an append-only audit log after a restart.
//!
//! ```text
//! live events ──▶ StateStore ──drain──▶ DurabilityCache ──migrate──▶ RelationalStore
//!                     ▲
//!   AuditLog ──replay─┘ (AuditRecovery, optional cache backfill)
//! ```
//!
//! # Modules
//!
//! - [`core_types`] - Identifier and timestamp aliases
//! - [`models`] - Order, Fill, OhlcCandle
//! - [`store`] - StateStore, pending queues, exchange-id index
//! - [`audit`] - Audit log contract, JSONL and in-memory logs
//! - [`recovery`] - Audit log replay into the store
//! - [`cache`] - Durability cache contract and DashMap adapter
//! - [`relational`] - Relational store (PostgreSQL / memory) and migration
//! - [`flush`] - Flush pipeline, retention sweeper, migration scheduler

// Core types - must be first!
pub mod core_types;

pub mod error;
pub mod models;

// Ledger
pub mod store;

// Persistence tiers
pub mod audit;
pub mod cache;
pub mod db;
pub mod relational;

// Recovery and background work
pub mod flush;
pub mod recovery;

// Service plumbing
pub mod config;
pub mod logging;

// Convenient re-exports at crate root
pub use audit::{AuditLog, AuditRecord, JsonlAuditLog, MemoryAuditLog};
pub use cache::{DurabilityCache, FlushResult, MemoryCache};
pub use core_types::{ExecId, FillId, OrderId, SessionId, TimestampMs};
pub use error::{LedgerError, LedgerResult};
pub use flush::{
    FlushPipeline, MigrationScheduler, RetentionSweeper, ShutdownSignal, shutdown_channel,
};
pub use models::{Fill, OhlcCandle, Order, OrderPatch, OrderStatus, OrderType, Side};
pub use recovery::{AuditRecovery, RebuildOptions, RebuildResult, RecoveryOptions, RecoveryReport};
pub use relational::{
    MemoryRelationalStore, MigrationEngine, MigrationReport, PgRelationalStore, RelationalStore,
};
pub use store::{SharedStateStore, StateStore, StoreStats};
