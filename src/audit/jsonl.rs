//! JSON-lines audit log
//!
//! One append-only file per session per UTC day:
//!
//! ```text
//! {dir}/{session_id}/2024-01-01.jsonl
//! {"kind":"order","event":"order_filled","timestamp":1704067200000,"orderData":{...}}
//! {"kind":"fill","event":"fill","timestamp":1704067200001,"fillData":{...}}
//! ```
//!
//! Lines that fail to parse are logged and skipped on read; the rest of the
//! partition still replays.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::record::AuditRecord;
use super::{AuditHistory, AuditLog, FILL_EVENT, partition_date};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Fill, Order};

const PARTITION_EXT: &str = "jsonl";

/// On-disk line: the record fields plus a `kind` discriminator
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum AuditLine {
    Order(Map<String, Value>),
    Fill(Map<String, Value>),
}

pub struct JsonlAuditLog {
    dir: PathBuf,
    // Serializes appends so lines never interleave
    write_lock: Mutex<()>,
}

impl JsonlAuditLog {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.dir.join(sanitize(session_id))
    }

    fn partition_path(&self, session_id: &str, date: NaiveDate) -> PathBuf {
        self.session_dir(session_id)
            .join(format!("{}.{}", date.format("%Y-%m-%d"), PARTITION_EXT))
    }

    async fn append(&self, session_id: &str, record: AuditRecord, fill: bool) -> LedgerResult<()> {
        let date = partition_date(record.timestamp_ms());
        let path = self.partition_path(session_id, date);

        let Value::Object(mut fields) = serde_json::to_value(&record)? else {
            return Err(LedgerError::AuditLog("audit record is not an object".into()));
        };
        if fill && let Some(data) = fields.remove("orderData") {
            fields.insert("fillData".to_string(), data);
        }
        let line = if fill {
            AuditLine::Fill(fields)
        } else {
            AuditLine::Order(fields)
        };
        let mut bytes = serde_json::to_vec(&line)?;
        bytes.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }

    /// Partitions to read, oldest first
    async fn partitions(
        &self,
        session_id: &str,
        date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<PathBuf>> {
        if let Some(date) = date {
            let path = self.partition_path(session_id, date);
            return Ok(if fs::try_exists(&path).await? {
                vec![path]
            } else {
                Vec::new()
            });
        }

        let session_dir = self.session_dir(session_id);
        if !fs::try_exists(&session_dir).await? {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        let mut entries = fs::read_dir(&session_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == PARTITION_EXT) {
                paths.push(path);
            }
        }
        // YYYY-MM-DD names sort chronologically
        paths.sort();
        Ok(paths)
    }
}

#[async_trait]
impl AuditLog for JsonlAuditLog {
    async fn log_order_event(&self, event: &str, order: &Order) -> LedgerResult<()> {
        let record = AuditRecord::order_event(event, order)?;
        self.append(&order.session_id, record, false).await
    }

    async fn log_fill_event(&self, fill: &Fill) -> LedgerResult<()> {
        let record = AuditRecord::fill_event(FILL_EVENT, fill)?;
        self.append(&fill.session_id, record, true).await
    }

    async fn recover_session_data(
        &self,
        session_id: &str,
        date: Option<NaiveDate>,
    ) -> LedgerResult<AuditHistory> {
        let mut history = AuditHistory::default();

        for path in self.partitions(session_id, date).await? {
            let content = fs::read_to_string(&path).await?;
            for (line_no, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let parsed = serde_json::from_str::<AuditLine>(line)
                    .map_err(LedgerError::from)
                    .and_then(|l| match l {
                    AuditLine::Order(fields) => {
                        AuditRecord::from_value(Value::Object(fields)).map(|r| (false, r))
                    }
                    AuditLine::Fill(fields) => {
                        AuditRecord::from_value(Value::Object(fields)).map(|r| (true, r))
                    }
                });
                match parsed {
                    Ok((false, record)) => history.orders.push(record),
                    Ok((true, record)) => history.fills.push(record),
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            line = line_no + 1,
                            error = %e,
                            "Skipping unreadable audit line"
                        );
                    }
                }
            }
        }

        tracing::debug!(
            session_id = %session_id,
            orders = history.orders.len(),
            fills = history.fills.len(),
            "Audit history loaded"
        );
        Ok(history)
    }
}

/// Keep session ids from escaping the log directory
fn sanitize(session_id: &str) -> String {
    session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}
