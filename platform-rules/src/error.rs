//! Error types for rule resolution and grant operations
//!
//! Write-path errors always reach the caller and leave the rule set unchanged.
//! Read-path errors reach the caller through [`Resolver::check`](crate::Resolver::check)
//! and are turned into `Deny` by [`Resolver::is_allowed`](crate::Resolver::is_allowed).

use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Rule store, resolver and grant manager error types.
#[derive(Debug, Error)]
pub enum RulesError {
    /// Malformed resource, operation or role id; rejected before the store is queried
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store unreachable or query/transaction failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// A write would break a rule set invariant
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// The store did not answer within the deadline; the operation was abandoned
    /// before any write was committed
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for rule operations.
pub type RulesResult<T> = Result<T, RulesError>;

impl RulesError {
    /// Check if this error should be logged at error level.
    ///
    /// Validation errors are caused by the caller and are expected.
    pub fn is_server_error(&self) -> bool {
        !matches!(self, RulesError::Validation(_))
    }

    /// Check if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RulesError::Storage(_) | RulesError::Timeout(_))
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            RulesError::Validation(_) => "VALIDATION_ERROR",
            RulesError::Storage(_) => "STORAGE_ERROR",
            RulesError::Constraint(_) => "CONSTRAINT_VIOLATION",
            RulesError::Timeout(_) => "STORE_TIMEOUT",
            RulesError::Config(_) => "CONFIG_ERROR",
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for RulesError {
    fn from(e: sqlx::Error) -> Self {
        RulesError::Storage(e.to_string())
    }
}
