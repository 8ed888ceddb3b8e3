//! Rule and schedule error types

use thiserror::Error;

/// Result type for rule operations
pub type Result<T> = std::result::Result<T, RuleError>;

/// Rule and schedule errors
#[derive(Debug, Error)]
pub enum RuleError {
    /// Schedule or rule invariant violated
    #[error("Validation error: {0}")]
    Validation(String),

    /// Malformed user input (times, day names, actions)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backing store failure that is not a database error (device proxy, I/O)
    #[error("Store error: {0}")]
    Store(String),
}

impl RuleError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RuleError::Validation(msg.into())
    }
}

impl From<sqlx::Error> for RuleError {
    fn from(err: sqlx::Error) -> Self {
        RuleError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for RuleError {
    fn from(err: serde_json::Error) -> Self {
        RuleError::Serialization(err.to_string())
    }
}

impl From<RuleError> for errors::ServiceError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::Validation(msg) | RuleError::Parse(msg) => Self::Validation(msg),
            RuleError::Database(msg) | RuleError::Store(msg) => Self::Storage(msg),
            RuleError::Serialization(msg) => Self::Serialization(msg),
        }
    }
}
