//! Error types for Tachi.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TachiError>;

/// Primary error type for all Tachi operations.
#[derive(Error, Debug)]
pub enum TachiError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    /// The response stream broke or ended before the turn terminator.
    #[error("Stream error: {0}")]
    Stream(String),

    /// A turn terminator arrived without a matching turn start.
    #[error("Malformed stream: {0}")]
    MalformedStream(String),

    #[error("Tool execution error: {tool_name} — {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Moderation error: {0}")]
    Moderation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The tool loop hit its iteration cap without reaching a final answer.
    #[error("Turn limit exceeded after {limit} turns")]
    TurnLimitExceeded { limit: usize },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Coarse classification, used for retry decisions and UI grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Server,
    Api,
    Stream,
    ToolExecution,
    Fatal,
    Unknown,
}

impl TachiError {
    /// Create an API error from a status code and body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) => ErrorCategory::Network,
            Self::Stream(_) | Self::MalformedStream(_) => ErrorCategory::Stream,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::TurnLimitExceeded { .. } => ErrorCategory::Fatal,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Server
                | ErrorCategory::Stream
        )
    }
}
