//! Append-only audit log (source of truth for recovery)
//!
//! The service writes every order/fill event through [`AuditLog`]; after a
//! restart [`crate::recovery::AuditRecovery`] reads the session history back.
//! The state store never writes to the audit log itself.

pub mod jsonl;
pub mod memory;
pub mod record;

pub use jsonl::JsonlAuditLog;
pub use memory::MemoryAuditLog;
pub use record::{AuditRecord, RECOVERY_SOURCE, WrappedRecord};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::core_types::TimestampMs;
use crate::error::LedgerResult;
use crate::models::{Fill, Order};

/// Event name written by [`AuditLog::log_fill_event`]
pub const FILL_EVENT: &str = "fill";

/// Full ordered event history of one session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditHistory {
    /// Order entries in log order
    pub orders: Vec<AuditRecord>,
    /// Fill entries in log order
    pub fills: Vec<AuditRecord>,
}

impl AuditHistory {
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty() && self.fills.is_empty()
    }
}

/// Append-only audit log contract
///
/// Entries are totally ordered per session: the last entry for an order
/// is its most recent known state.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append an order event (`event` names the transition, e.g. "order_filled")
    async fn log_order_event(&self, event: &str, order: &Order) -> LedgerResult<()>;

    /// Append a fill event
    async fn log_fill_event(&self, fill: &Fill) -> LedgerResult<()>;

    /// Read the session history, optionally restricted to one UTC day
    async fn recover_session_data(
        &self,
        session_id: &str,
        date: Option<NaiveDate>,
    ) -> LedgerResult<AuditHistory>;
}

/// UTC day a record belongs to (today when it carries no timestamp)
pub(crate) fn partition_date(ts: Option<TimestampMs>) -> NaiveDate {
    ts.and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
        .date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_date() {
        let date = partition_date(Some(1_704_067_200_000));
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(partition_date(None), Utc::now().date_naive());
    }
}
