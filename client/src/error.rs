//! Error types for the governance client.
//!
//! This module defines the failure taxonomy shared by the coordinator, the catalog and
//! every chain backend. Local validation failures are kept apart from backend failures so
//! callers can tell "never sent" from "sent and refused".

use thiserror::Error;

/// Main error type for governance operations
#[derive(Error, Debug)]
pub enum GovernanceError {
    /// Local, pre-submission validation failed; the backend was never contacted
    #[error("Validation error: {0}")]
    Validation(String),

    /// Backend unreachable or timed out
    #[error("Network error: {0}")]
    Network(String),

    /// The authorizing party declined the action
    #[error("Request rejected by signer: {0}")]
    Rejected(String),

    /// The backend refused the operation for a business-rule reason
    #[error("Backend rejected the operation: {reason}")]
    BackendRejected {
        /// Decoded reason string, surfaced verbatim
        reason: String,
    },

    /// A confirmed write carried no decodable event of the expected shape
    #[error("Event not found: {0}")]
    EventNotFound(String),

    /// A read referenced an organization or proposal index the backend does not know
    #[error("Not found: {0}")]
    NotFound(String),

    /// A log claimed a known event topic but its payload did not match the shape
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Invalid response from the backend
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// URL parse error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl GovernanceError {
    /// Shorthand for a business-rule rejection
    pub fn backend_rejected(reason: impl Into<String>) -> Self {
        GovernanceError::BackendRejected {
            reason: reason.into(),
        }
    }

    /// Whether repeating the same call could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, GovernanceError::Network(_))
    }

    /// Whether the failure happened before any backend call
    pub fn is_validation(&self) -> bool {
        matches!(self, GovernanceError::Validation(_))
    }
}

impl From<reqwest::Error> for GovernanceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GovernanceError::Network(format!("request timed out: {}", err))
        } else if err.is_decode() {
            GovernanceError::InvalidResponse(err.to_string())
        } else {
            GovernanceError::Network(err.to_string())
        }
    }
}

/// Result type alias for governance operations
pub type Result<T> = std::result::Result<T, GovernanceError>;

/// Error context for retryable operations
#[derive(Debug, Clone, Default)]
pub struct RetryContext {
    /// Number of attempts made
    pub attempts: usize,
    /// Last error encountered
    pub last_error: String,
    /// Total time spent waiting between attempts (in milliseconds)
    pub total_time_ms: u64,
}

impl RetryContext {
    /// Create a new retry context
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attempt
    pub fn record_attempt(&mut self, error: &str, duration_ms: u64) {
        self.attempts += 1;
        self.last_error = error.to_string();
        self.total_time_ms += duration_ms;
    }
}
