// models.rs - Order, fill and candle records held by the ledger

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{ExecId, FillId, OrderId, SessionId, TimestampMs, now_ms};

/// Order side: Buy or Sell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl FromStr for Side {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "b" | "bid" => Ok(Side::Buy),
            "sell" | "s" | "ask" => Ok(Side::Sell),
            _ => Err(()),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,      // Stop-market
    StopLimit, // Stop-limit
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
            OrderType::Stop => "stop",
            OrderType::StopLimit => "stop_limit",
        }
    }
}

impl FromStr for OrderType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "market" => Ok(OrderType::Market),
            "limit" => Ok(OrderType::Limit),
            "stop" | "stop_market" => Ok(OrderType::Stop),
            "stop_limit" | "stoplimit" => Ok(OrderType::StopLimit),
            _ => Err(()),
        }
    }
}

// ============================================================
// ORDER STATUS
// ============================================================

/// Order status
///
/// Parsed case-insensitively. A status string that names no known state
/// (typically an audit event name used as a fallback during replay) is
/// kept verbatim in [`OrderStatus::Event`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    Created,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Unknown,
    /// Literal event name carried over from an audit record without a status field
    Event(String),
}

impl OrderStatus {
    /// FILLED, CANCELLED and REJECTED accept no further fills or state changes
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Open => "OPEN",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Unknown => "UNKNOWN",
            OrderStatus::Event(name) => name,
        }
    }
}

impl OrderStatus {
    /// Status for an audit event name used in place of a missing status
    ///
    /// Only an exact canonical name maps to a known state; anything else is
    /// kept verbatim.
    pub fn from_event_name(event: &str) -> Self {
        match event {
            "CREATED" => OrderStatus::Created,
            "OPEN" => OrderStatus::Open,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELLED" => OrderStatus::Cancelled,
            "REJECTED" => OrderStatus::Rejected,
            "UNKNOWN" => OrderStatus::Unknown,
            other => OrderStatus::Event(other.to_string()),
        }
    }
}

impl From<&str> for OrderStatus {
    fn from(s: &str) -> Self {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "CREATED" | "NEW" | "PENDING" => OrderStatus::Created,
            "OPEN" | "ACTIVE" => OrderStatus::Open,
            "PARTIALLY_FILLED" | "PARTIAL" | "PARTIAL_FILL" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELLED" | "CANCELED" => OrderStatus::Cancelled,
            "REJECTED" => OrderStatus::Rejected,
            "UNKNOWN" => OrderStatus::Unknown,
            _ => OrderStatus::Event(s.to_string()),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(s: String) -> Self {
        OrderStatus::from(s.as_str())
    }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Event(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================
// ORDER
// ============================================================

/// An order tracked by the ledger
///
/// `exchange_order_id` is mutable: the exchange assigns it after
/// acknowledgement, and the store keeps a secondary index on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: OrderId,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(default)]
    pub exchange_order_id: Option<String>,
    #[serde(default)]
    pub session_id: SessionId,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(rename = "type", default)]
    pub order_type: Option<OrderType>,
    #[serde(default)]
    pub size: Decimal,
    #[serde(default)]
    pub price: Option<Decimal>,
    pub status: OrderStatus,
    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
}

impl Order {
    /// Create a new order in CREATED state, stamped with the current time
    pub fn new(order_id: impl Into<OrderId>, symbol: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            order_id: order_id.into(),
            client_order_id: None,
            exchange_order_id: None,
            session_id: SessionId::new(),
            symbol: symbol.into(),
            side: None,
            order_type: None,
            size: Decimal::ZERO,
            price: None,
            status: OrderStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_exchange_order_id(mut self, exchange_order_id: impl Into<String>) -> Self {
        self.exchange_order_id = Some(exchange_order_id.into());
        self
    }

    pub fn with_limit(mut self, side: Side, size: Decimal, price: Decimal) -> Self {
        self.side = Some(side);
        self.order_type = Some(OrderType::Limit);
        self.size = size;
        self.price = Some(price);
        self
    }
}

/// Partial update merged into a stored order by `StateStore::update_order`
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub exchange_order_id: Option<String>,
    pub client_order_id: Option<String>,
    pub size: Option<Decimal>,
    pub price: Option<Decimal>,
    pub symbol: Option<String>,
    pub side: Option<Side>,
    pub order_type: Option<OrderType>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn exchange_order_id(exchange_order_id: impl Into<String>) -> Self {
        Self {
            exchange_order_id: Some(exchange_order_id.into()),
            ..Default::default()
        }
    }

    /// Merge this patch into `order` (does not touch `updated_at`)
    pub(crate) fn apply_to(self, order: &mut Order) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(id) = self.exchange_order_id {
            order.exchange_order_id = Some(id);
        }
        if let Some(id) = self.client_order_id {
            order.client_order_id = Some(id);
        }
        if let Some(size) = self.size {
            order.size = size;
        }
        if let Some(price) = self.price {
            order.price = Some(price);
        }
        if let Some(symbol) = self.symbol {
            order.symbol = symbol;
        }
        if let Some(side) = self.side {
            order.side = Some(side);
        }
        if let Some(order_type) = self.order_type {
            order.order_type = Some(order_type);
        }
    }
}

// ============================================================
// FILL
// ============================================================

/// A single exchange execution against an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    pub fill_id: FillId,
    #[serde(rename = "execID")]
    pub exec_id: ExecId,
    pub order_id: OrderId,
    #[serde(default)]
    pub session_id: SessionId,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub fee: Decimal,
    #[serde(default)]
    pub total: Decimal,
    pub timestamp: TimestampMs,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub deduplication_key: String,
}

impl Fill {
    /// Create a fill with `fill_id` derived as `"{order_id}-{exec_id}"`
    pub fn new(order_id: impl Into<OrderId>, exec_id: impl Into<ExecId>) -> Self {
        let order_id = order_id.into();
        let exec_id = exec_id.into();
        Self {
            fill_id: derive_fill_id(&order_id, &exec_id),
            exec_id,
            order_id,
            session_id: SessionId::new(),
            symbol: String::new(),
            side: None,
            quantity: Decimal::ZERO,
            price: Decimal::ZERO,
            fee: Decimal::ZERO,
            total: Decimal::ZERO,
            timestamp: now_ms(),
            source: String::new(),
            deduplication_key: String::new(),
        }
    }

    pub fn with_fill_id(mut self, fill_id: impl Into<FillId>) -> Self {
        self.fill_id = fill_id.into();
        self
    }

    pub fn with_session(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Set quantity and price; `total` becomes `quantity * price`
    pub fn with_execution(mut self, quantity: Decimal, price: Decimal) -> Self {
        self.quantity = quantity;
        self.price = price;
        self.total = quantity * price;
        self
    }
}

/// `"{order_id}-{exec_id}"`
#[inline]
pub fn derive_fill_id(order_id: &str, exec_id: &str) -> FillId {
    format!("{}-{}", order_id, exec_id)
}

/// `"{session_id}_{exec_id}"`
#[inline]
pub fn deduplication_key(session_id: &str, exec_id: &str) -> String {
    format!("{}_{}", session_id, exec_id)
}

// ============================================================
// OHLC CANDLE
// ============================================================

/// OHLC candle; `timestamp` is the bucket start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OhlcCandle {
    pub symbol: String,
    #[serde(default)]
    pub exchange: String,
    pub interval: String,
    pub timestamp: TimestampMs,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Decimal,
    #[serde(default)]
    pub is_complete: bool,
}

impl OhlcCandle {
    /// Storage key shared by the cache and relational tiers
    pub fn key(&self) -> (String, String, String, TimestampMs) {
        (
            self.symbol.clone(),
            self.exchange.clone(),
            self.interval.clone(),
            self.timestamp,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing_is_case_insensitive() {
        assert_eq!(OrderStatus::from("filled"), OrderStatus::Filled);
        assert_eq!(OrderStatus::from("Partially-Filled"), OrderStatus::PartiallyFilled);
        assert_eq!(OrderStatus::from("canceled"), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::from("NEW"), OrderStatus::Created);
    }

    #[test]
    fn test_unrecognized_status_keeps_literal() {
        let status = OrderStatus::from("order_amended");
        assert_eq!(status, OrderStatus::Event("order_amended".into()));
        assert_eq!(status.to_string(), "order_amended");
        assert!(!status.is_terminal());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::Open.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
        assert!(!OrderStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_status_serde_uses_plain_strings() {
        let json = serde_json::to_string(&OrderStatus::PartiallyFilled).unwrap();
        assert_eq!(json, "\"PARTIALLY_FILLED\"");
        let back: OrderStatus = serde_json::from_str("\"rejected\"").unwrap();
        assert_eq!(back, OrderStatus::Rejected);
    }

    #[test]
    fn test_fill_id_derivation() {
        let fill = Fill::new("O1", "E1");
        assert_eq!(fill.fill_id, "O1-E1");
        assert_eq!(deduplication_key("S1", "E1"), "S1_E1");
    }

    #[test]
    fn test_patch_leaves_unset_fields() {
        let mut order = Order::new("O1", "BTC/USD").with_exchange_order_id("X1");
        OrderPatch::status(OrderStatus::Open).apply_to(&mut order);
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.exchange_order_id.as_deref(), Some("X1"));
        assert_eq!(order.symbol, "BTC/USD");
    }

    #[test]
    fn test_order_json_uses_camel_case() {
        let order = Order::new("O1", "ETH/USD").with_session("S1");
        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["orderId"], "O1");
        assert_eq!(value["sessionId"], "S1");
        assert_eq!(value["status"], "CREATED");
    }
}
