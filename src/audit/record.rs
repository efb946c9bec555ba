//! Audit record normalization
//!
//! Audit entries come in two shapes:
//!
//! ```text
//! Wrapped: {"event": "order_filled", "timestamp": 1700000000000, "orderData": {...}}
//! Flat:    {"orderId": "O1", "status": "FILLED", "timestamp": ...}
//! ```
//!
//! [`AuditRecord`] captures both, and [`AuditRecord::to_order`] /
//! [`AuditRecord::to_fill`] turn either into the canonical ledger types.
//! Nothing outside this module reads raw record fields.

use std::str::FromStr;

use chrono::DateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core_types::{TimestampMs, now_ms};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Fill, Order, OrderStatus, OrderType, Side, deduplication_key, derive_fill_id};

/// Source tag stamped on fills rebuilt from the audit log without one
pub const RECOVERY_SOURCE: &str = "audit_recovery";

// Accepted key spellings, camelCase first
const ORDER_ID: &[&str] = &["orderId", "order_id"];
const CLIENT_ORDER_ID: &[&str] = &["clientOrderId", "client_order_id", "clOrdID"];
const EXCHANGE_ORDER_ID: &[&str] = &["exchangeOrderId", "exchange_order_id"];
const SESSION_ID: &[&str] = &["sessionId", "session_id"];
const EXEC_ID: &[&str] = &["execID", "execId", "exec_id"];
const FILL_ID: &[&str] = &["fillId", "fill_id"];
const SIZE: &[&str] = &["size", "amount", "orderQty", "quantity"];
const QUANTITY: &[&str] = &["quantity", "qty", "lastQty", "size", "amount"];
const PRICE: &[&str] = &["price", "lastPx", "avgPx"];
const ORDER_TYPE: &[&str] = &["type", "orderType", "order_type"];
const CREATED_AT: &[&str] = &["createdAt", "created_at"];
const UPDATED_AT: &[&str] = &["updatedAt", "updated_at"];

// ============================================================
// RECORD SHAPES
// ============================================================

/// `{orderData|fillData, event, timestamp}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrappedRecord {
    #[serde(
        rename = "orderData",
        alias = "fillData",
        alias = "order_data",
        alias = "fill_data"
    )]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
}

/// One audit log entry, wrapped or flat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuditRecord {
    Wrapped(WrappedRecord),
    Flat(Map<String, Value>),
}

impl AuditRecord {
    /// Parse a JSON value; anything that is not an object is rejected
    pub fn from_value(value: Value) -> LedgerResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Wrapped record for an order event, stamped now
    pub fn order_event(event: &str, order: &Order) -> LedgerResult<Self> {
        Self::wrap(event, serde_json::to_value(order)?)
    }

    /// Wrapped record for a fill event, stamped now
    pub fn fill_event(event: &str, fill: &Fill) -> LedgerResult<Self> {
        Self::wrap(event, serde_json::to_value(fill)?)
    }

    fn wrap(event: &str, payload: Value) -> LedgerResult<Self> {
        let Value::Object(data) = payload else {
            return Err(LedgerError::AuditLog("payload is not an object".into()));
        };
        Ok(AuditRecord::Wrapped(WrappedRecord {
            data,
            event: Some(event.to_string()),
            timestamp: Some(Value::from(now_ms())),
        }))
    }

    /// Record fields (the inner object for wrapped records)
    pub fn payload(&self) -> &Map<String, Value> {
        match self {
            AuditRecord::Wrapped(w) => &w.data,
            AuditRecord::Flat(map) => map,
        }
    }

    /// Event name, from the wrapper or the flat record
    pub fn event(&self) -> Option<&str> {
        match self {
            AuditRecord::Wrapped(w) => w
                .event
                .as_deref()
                .or_else(|| w.data.get("event").and_then(Value::as_str)),
            AuditRecord::Flat(map) => map.get("event").and_then(Value::as_str),
        }
    }

    /// Record timestamp in epoch ms (number or RFC 3339 string)
    pub fn timestamp_ms(&self) -> Option<TimestampMs> {
        match self {
            AuditRecord::Wrapped(w) => w
                .timestamp
                .as_ref()
                .and_then(timestamp_value)
                .or_else(|| w.data.get("timestamp").and_then(timestamp_value)),
            AuditRecord::Flat(map) => map.get("timestamp").and_then(timestamp_value),
        }
    }

    pub fn order_id(&self) -> Option<String> {
        str_field(self.payload(), ORDER_ID)
    }

    pub fn exec_id(&self) -> Option<String> {
        str_field(self.payload(), EXEC_ID)
    }

    // --------------------------------------------------------
    // Canonical conversions
    // --------------------------------------------------------

    /// Materialize the order state carried by this record
    ///
    /// Status falls back to the literal event name, then `UNKNOWN`, so a
    /// replayed order never has an empty status.
    ///
    /// # Errors
    /// `Validation` if the record has no order id.
    pub fn to_order(&self, session_id: &str) -> LedgerResult<Order> {
        let data = self.payload();
        let order_id = self
            .order_id()
            .ok_or_else(|| LedgerError::validation("orderId"))?;

        let status = match str_field(data, &["status"]) {
            Some(status) => OrderStatus::from(status),
            None => self
                .event()
                .filter(|e| !e.is_empty())
                .map(OrderStatus::from_event_name)
                .unwrap_or(OrderStatus::Unknown),
        };

        let record_ts = self.timestamp_ms();
        let created_at = ts_field(data, CREATED_AT).or(record_ts).unwrap_or_else(now_ms);
        let updated_at = ts_field(data, UPDATED_AT)
            .or(record_ts)
            .unwrap_or(created_at);

        Ok(Order {
            order_id,
            client_order_id: str_field(data, CLIENT_ORDER_ID),
            exchange_order_id: str_field(data, EXCHANGE_ORDER_ID),
            session_id: str_field(data, SESSION_ID).unwrap_or_else(|| session_id.to_string()),
            symbol: str_field(data, &["symbol"]).unwrap_or_default(),
            side: parse_field::<Side>(data, &["side"]),
            order_type: parse_field::<OrderType>(data, ORDER_TYPE),
            size: decimal_field(data, SIZE).unwrap_or_default(),
            price: decimal_field(data, PRICE),
            status,
            created_at,
            updated_at,
        })
    }

    /// Normalize this record into a canonical fill
    ///
    /// `fill_id` defaults to `"{order_id}-{exec_id}"` and `total` to
    /// `quantity * price`.
    ///
    /// # Errors
    /// `Validation` if `orderId` or `execID` is missing; such a record
    /// cannot be deduplicated.
    pub fn to_fill(&self, session_id: &str) -> LedgerResult<Fill> {
        let data = self.payload();
        let order_id = self
            .order_id()
            .ok_or_else(|| LedgerError::validation("orderId"))?;
        let exec_id = self
            .exec_id()
            .ok_or_else(|| LedgerError::validation("execID"))?;

        let session_id = str_field(data, SESSION_ID).unwrap_or_else(|| session_id.to_string());
        let quantity = decimal_field(data, QUANTITY).unwrap_or_default();
        let price = decimal_field(data, PRICE).unwrap_or_default();

        Ok(Fill {
            fill_id: str_field(data, FILL_ID).unwrap_or_else(|| derive_fill_id(&order_id, &exec_id)),
            deduplication_key: deduplication_key(&session_id, &exec_id),
            symbol: str_field(data, &["symbol"]).unwrap_or_default(),
            side: parse_field::<Side>(data, &["side"]),
            quantity,
            price,
            fee: decimal_field(data, &["fee", "commission"]).unwrap_or_default(),
            total: decimal_field(data, &["total", "cost"]).unwrap_or(quantity * price),
            timestamp: ts_field(data, &["timestamp", "transactTime"])
                .or_else(|| self.timestamp_ms())
                .unwrap_or_else(now_ms),
            source: str_field(data, &["source"]).unwrap_or_else(|| RECOVERY_SOURCE.to_string()),
            exec_id,
            order_id,
            session_id,
        })
    }
}

// ============================================================
// FIELD HELPERS
// ============================================================

/// First non-empty string (or number rendered as string) among `keys`
fn str_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match map.get(*k)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn parse_field<T: FromStr>(map: &Map<String, Value>, keys: &[&str]) -> Option<T> {
    str_field(map, keys).and_then(|s| s.parse().ok())
}

/// Decimal from a JSON number or numeric string
fn decimal_field(map: &Map<String, Value>, keys: &[&str]) -> Option<Decimal> {
    keys.iter().find_map(|k| {
        let raw = match map.get(*k)? {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.trim().to_string(),
            _ => return None,
        };
        Decimal::from_str(&raw)
            .or_else(|_| Decimal::from_scientific(&raw))
            .ok()
    })
}

fn ts_field(map: &Map<String, Value>, keys: &[&str]) -> Option<TimestampMs> {
    keys.iter().find_map(|k| map.get(*k).and_then(timestamp_value))
}

/// Epoch ms from a number, a numeric string, or an RFC 3339 string
pub(crate) fn timestamp_value(value: &Value) -> Option<TimestampMs> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok().or_else(|| {
            DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.timestamp_millis())
        }),
        _ => None,
    }
}
