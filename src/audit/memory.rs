//! In-process audit log
//!
//! Keeps records in append order per session. Used for embedding and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::record::AuditRecord;
use super::{AuditHistory, AuditLog, FILL_EVENT, partition_date};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Fill, Order};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Order,
    Fill,
}

#[derive(Debug, Clone)]
struct Entry {
    kind: EntryKind,
    date: NaiveDate,
    record: AuditRecord,
}

#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    sessions: Mutex<HashMap<String, Vec<Entry>>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw order record (wrapped or flat), as older writers did
    pub fn push_order_record(&self, session_id: &str, record: AuditRecord) -> LedgerResult<()> {
        self.push(session_id, EntryKind::Order, record)
    }

    /// Append a raw fill record (wrapped or flat)
    pub fn push_fill_record(&self, session_id: &str, record: AuditRecord) -> LedgerResult<()> {
        self.push(session_id, EntryKind::Fill, record)
    }

    /// Number of records held for `session_id`
    pub fn len(&self, session_id: &str) -> usize {
        self.sessions
            .lock()
            .map(|s| s.get(session_id).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn push(&self, session_id: &str, kind: EntryKind, record: AuditRecord) -> LedgerResult<()> {
        let date = partition_date(record.timestamp_ms());
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| LedgerError::AuditLog("audit log lock poisoned".into()))?;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .push(Entry { kind, date, record });
        Ok(())
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn log_order_event(&self, event: &str, order: &Order) -> LedgerResult<()> {
        let record = AuditRecord::order_event(event, order)?;
        self.push(&order.session_id, EntryKind::Order, record)
    }

    async fn log_fill_event(&self, fill: &Fill) -> LedgerResult<()> {
        let record = AuditRecord::fill_event(FILL_EVENT, fill)?;
        self.push(&fill.session_id, EntryKind::Fill, record)
    }

    async fn recover_session_data(
        &self,
        session_id: &str,
        date: Option<NaiveDate>,
    ) -> LedgerResult<AuditHistory> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| LedgerError::AuditLog("audit log lock poisoned".into()))?;

        let mut history = AuditHistory::default();
        let entries = sessions.get(session_id).map(Vec::as_slice).unwrap_or(&[]);
        for entry in entries.iter().filter(|e| date.is_none_or(|d| e.date == d)) {
            match entry.kind {
                EntryKind::Order => history.orders.push(entry.record.clone()),
                EntryKind::Fill => history.fills.push(entry.record.clone()),
            }
        }
        Ok(history)
    }
}
