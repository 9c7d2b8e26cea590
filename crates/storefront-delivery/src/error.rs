//! Error types for resource delivery

use crate::ResourceKind;
use thiserror::Error;

/// Result type for delivery operations
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Errors that can occur while loading or laying out resources
#[derive(Error, Debug, Clone)]
pub enum DeliveryError {
    /// `load` called for an id that was never registered
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Server answered with a non-success status
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// Network connection failed
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Attempt produced no response in time
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Payload fetched but not usable as the declared kind
    #[error("Malformed {kind} payload: {message}")]
    Decode { kind: ResourceKind, message: String },

    /// Caller contract violation (e.g. non-positive item height)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Registry was shut down before the load could run
    #[error("Resource loader shut down")]
    ShutDown,
}

impl DeliveryError {
    /// Whether this failure came from a single load attempt and may be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DeliveryError::Http { .. }
                | DeliveryError::Connection(_)
                | DeliveryError::Timeout(_)
                | DeliveryError::InvalidUrl(_)
                | DeliveryError::Decode { .. }
        )
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DeliveryError::Timeout(0)
        } else if e.is_connect() {
            DeliveryError::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            DeliveryError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_builder() {
            DeliveryError::InvalidUrl(e.to_string())
        } else {
            DeliveryError::Connection(e.to_string())
        }
    }
}

impl From<url::ParseError> for DeliveryError {
    fn from(e: url::ParseError) -> Self {
        DeliveryError::InvalidUrl(e.to_string())
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(e: serde_json::Error) -> Self {
        DeliveryError::Decode {
            kind: ResourceKind::Data,
            message: e.to_string(),
        }
    }
}
