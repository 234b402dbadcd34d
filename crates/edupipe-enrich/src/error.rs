//! Enrichment collaborator error types.
//!
//! The taxonomy distinguishes transient failures (worth retrying against
//! the same collaborator) from terminal ones (malformed input, rejected
//! content, schema-violating responses) that must surface immediately.

use thiserror::Error;

/// Result type for enrichment operations.
pub type EnrichResult<T> = Result<T, EnrichError>;

/// Errors from the transcription and classification collaborators.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl EnrichError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Map an HTTP status into the matching variant.
    pub fn from_http_status(status: u16, body: String) -> Self {
        match status {
            429 => Self::RateLimited(body),
            500..=599 => Self::Upstream(format!("HTTP {}: {}", status, body)),
            _ => Self::Rejected(format!("HTTP {}: {}", status, body)),
        }
    }

    /// Whether this failure class is worth another attempt.
    ///
    /// Invalid JSON and rejected input are terminal for the attempt:
    /// retrying the identical payload cannot succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited(_) | Self::Upstream(_) | Self::Timeout(_) => true,
            Self::Network(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }
}
