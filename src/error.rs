//! Ledger Error Types

use thiserror::Error;

/// Errors surfaced by the ledger, recovery and persistence layers
///
/// Soft outcomes (unknown order on update, duplicate execution) are NOT
/// errors; they are reported as `None` by the state store.
#[derive(Error, Debug)]
pub enum LedgerError {
    // === Caller defects ===
    #[error("Validation failed: missing required field '{field}'")]
    Validation { field: &'static str },

    // === Programming errors (fail fast, never retried) ===
    #[error("Configuration error: {0}")]
    Config(String),

    // === Collaborator failures ===
    #[error("Audit log error: {0}")]
    AuditLog(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Unique key conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn validation(field: &'static str) -> Self {
        LedgerError::Validation { field }
    }

    /// Stable error code for logs and reports
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation { .. } => "VALIDATION_ERROR",
            LedgerError::Config(_) => "CONFIG_ERROR",
            LedgerError::AuditLog(_) => "AUDIT_LOG_ERROR",
            LedgerError::Cache(_) => "CACHE_ERROR",
            LedgerError::Conflict(_) => "CONFLICT",
            LedgerError::Database(_) => "DATABASE_ERROR",
            LedgerError::Io(_) => "IO_ERROR",
            LedgerError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
