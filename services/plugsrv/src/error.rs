//! Error types for the plug control service
//!
//! `TransportError` covers the HTTP leg only; `PlugSrvError` is what every
//! client operation returns. Only `TransportError::Connect` is treated as
//! "the rules service moved" and triggers port re-resolution.

use errors::ServiceError;
use plug_rules::RuleError;
use thiserror::Error;

/// Result type for plugsrv
pub type Result<T> = std::result::Result<T, PlugSrvError>;

/// HTTP-level failure talking to the device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection could not be established or was dropped mid-request
    #[error("Connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    /// Non-success HTTP status; rules calls keep the body for diagnostics
    #[error("HTTP {status} from {url}{}", body_suffix(.body))]
    Status {
        url: String,
        status: u16,
        body: Option<String>,
    },

    /// Response body could not be read
    #[error("Failed to read response from {url}: {reason}")]
    Body { url: String, reason: String },
}

fn body_suffix(body: &Option<String>) -> String {
    match body {
        Some(body) if !body.trim().is_empty() => format!(": {}", body.trim()),
        _ => String::new(),
    }
}

/// Errors returned by device operations
#[derive(Error, Debug)]
pub enum PlugSrvError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The call succeeded but the expected element was absent
    #[error("Response to {action} is missing <{tag}>")]
    ResponseFieldMissing { action: String, tag: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timeout after {secs}s waiting for {url}")]
    Timeout { url: String, secs: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl PlugSrvError {
    pub fn missing(action: &str, tag: &str) -> Self {
        PlugSrvError::ResponseFieldMissing {
            action: action.to_string(),
            tag: tag.to_string(),
        }
    }

    /// Connection-level transport failure (not an HTTP status, not a timeout)
    pub fn is_connect(&self) -> bool {
        matches!(self, PlugSrvError::Transport(TransportError::Connect { .. }))
    }
}

impl From<RuleError> for PlugSrvError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::Validation(msg) | RuleError::Parse(msg) => PlugSrvError::Validation(msg),
            other => PlugSrvError::Store(other.to_string()),
        }
    }
}

impl From<figment::Error> for PlugSrvError {
    fn from(err: figment::Error) -> Self {
        PlugSrvError::Config(err.to_string())
    }
}

impl From<PlugSrvError> for ServiceError {
    fn from(err: PlugSrvError) -> Self {
        match err {
            PlugSrvError::Transport(TransportError::Connect { url, reason }) => {
                ServiceError::ConnectionFailed {
                    endpoint: url,
                    reason,
                }
            },
            PlugSrvError::Transport(other) => ServiceError::Protocol(other.to_string()),
            PlugSrvError::ResponseFieldMissing { action, tag } => {
                ServiceError::ResponseFieldMissing { action, tag }
            },
            PlugSrvError::Validation(msg) => ServiceError::Validation(msg),
            PlugSrvError::Timeout { url, .. } => ServiceError::Timeout(url),
            PlugSrvError::Config(msg) => ServiceError::Configuration(msg),
            PlugSrvError::Store(msg) => ServiceError::Storage(msg),
        }
    }
}

/// Store-side view, for `ScheduleStore` impls backed by the device
impl From<PlugSrvError> for RuleError {
    fn from(err: PlugSrvError) -> Self {
        match err {
            PlugSrvError::Validation(msg) => RuleError::Validation(msg),
            other => RuleError::Store(other.to_string()),
        }
    }
}
