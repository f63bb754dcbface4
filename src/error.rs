//! Error types shared across the service layer.
//!
//! Reads and writes fail differently: callers on the read path degrade
//! `StoreError::Unavailable` to empty results, while writes propagate it.

use thiserror::Error;

/// Errors raised by a `ComplianceStore` backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store cannot be reached (missing file, dropped connection).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backing data exists but cannot be decoded.
    #[error("store data is corrupt: {0}")]
    Corrupt(String),

    /// A write would violate a data invariant.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// IO failure while persisting.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by an `AuditLog` backend.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to serialize an entry.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to append or rewrite the log.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to export entries.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors surfaced to callers of a procedure.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No user is present in the call context.
    #[error("authentication required")]
    Unauthenticated,

    /// Input violated a declared constraint. Raised before any side effect.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced id does not exist.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// The store is unreachable on a write path.
    #[error("database unavailable: {0}")]
    DatabaseUnavailable(String),

    /// Any other store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// The audit trail could not be written.
    #[error("audit log error: {0}")]
    Audit(#[from] AuditError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => ServiceError::DatabaseUnavailable(msg),
            StoreError::Constraint(msg) => ServiceError::Validation(msg),
            other => ServiceError::Storage(other.to_string()),
        }
    }
}

impl ServiceError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            resource,
            id: id.into(),
        }
    }
}

/// Reject `value` unless it lies within `min..=max`.
pub fn ensure_range<T>(field: &str, value: T, min: T, max: T) -> Result<(), ServiceError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < min || value > max {
        return Err(ServiceError::Validation(format!(
            "{} must be between {} and {} (got {})",
            field, min, max, value
        )));
    }
    Ok(())
}
