//! Application-wide error types.
//!
//! Each repository has its own error enum; collaborators that only care about
//! the category of a failure convert into [`AppError`].

use thiserror::Error;

/// Result type alias using `AppError`.
pub type AppResult<T> = Result<T, AppError>;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Schema migration failed; startup must abort.
    #[error("Schema migration failed: {0}")]
    SchemaMigration(String),

    /// Authentication failed. Carries no detail about the cause.
    #[error("Authentication failed")]
    Unauthorized,

    /// Not enough stock for an outgoing movement.
    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    /// Lock contention persisted past the retry budget.
    #[error("Store busy, retry later: {0}")]
    TransientLock(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Business rule violation.
    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    /// Conflict (e.g., duplicate entry).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns true if the error must abort the process.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::SchemaMigration(_) | Self::Config(_))
    }

    /// Returns true if the caller may retry the same operation unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientLock(_))
    }

    /// Returns the stable error code for collaborators.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::SchemaMigration(_) => "SCHEMA_MIGRATION_ERROR",
            Self::Unauthorized => "AUTHENTICATION_FAILURE",
            Self::InsufficientStock(_) => "INSUFFICIENT_STOCK",
            Self::TransientLock(_) => "TRANSIENT_LOCK",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::BusinessRule(_) => "BUSINESS_RULE_VIOLATION",
            Self::Conflict(_) => "CONFLICT",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
