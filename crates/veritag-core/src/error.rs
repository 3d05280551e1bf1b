//! Error types and result handling for core domain operations.
//!
//! Defines the storage-facing error taxonomy. Batch-id collisions surface as
//! `Conflict` so the caller can treat a uniqueness violation as a retry
//! trigger instead of a fatal error; store unreachability surfaces as
//! `Unavailable` so a product registration can proceed without proof.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for domain and storage operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input failed format validation before reaching the store.
    #[error("validation error: {0}")]
    Validation(String),

    /// Uniqueness or foreign-key constraint violation.
    ///
    /// For batch ids this is the optimistic-write collision signal: the
    /// caller regenerates and retries once rather than failing the request.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Entity not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The relational store is unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Any other database failure.
    #[error("database error: {0}")]
    Database(String),
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates an unavailability error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Whether this error signals a uniqueness collision worth one retry.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested entity not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::Conflict(format!("unique constraint violation: {db_err}"))
            },
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                Self::Conflict(format!("foreign key constraint violation: {db_err}"))
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                Self::Unavailable("database connection failed".to_string())
            },
            _ => Self::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_identified_for_retry() {
        assert!(CoreError::conflict("duplicate batch id").is_conflict());
        assert!(!CoreError::validation("bad prefix").is_conflict());
        assert!(!CoreError::not_found("missing product").is_conflict());
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = CoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
