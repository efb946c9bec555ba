//! Core types used throughout the ledger
//!
//! Identifiers arrive from exchanges and upstream services as strings,
//! so they are kept as owned `String`s rather than numeric ids.

/// Order ID - primary key of the order ledger.
///
/// # Constraints:
/// - **Required**: an order without one is rejected
/// - **Immutable**: never re-keyed once stored
pub type OrderId = String;

/// Exchange-assigned execution ID.
///
/// Globally unique per execution; this is the fill deduplication key.
pub type ExecId = String;

/// Fill ID - `"{order_id}-{exec_id}"` when the producer does not supply one
pub type FillId = String;

/// Trading session identifier
pub type SessionId = String;

/// Epoch milliseconds (UTC)
pub type TimestampMs = i64;

/// Current wall-clock time in epoch milliseconds
#[inline]
pub fn now_ms() -> TimestampMs {
    chrono::Utc::now().timestamp_millis()
}
