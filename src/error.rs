//! Error types for the chatgate crate

use thiserror::Error;

/// Result type for chatgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for chatgate operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error (transport failure or timeout)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream API returned an error response
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code
        status_code: u16,
        /// Error message
        message: String,
    },

    /// Authentication error
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Upstream throttled the request (HTTP 429)
    #[error("Rate limit exceeded. Please retry after {retry_after_secs} seconds")]
    RateLimit {
        /// Seconds to wait before retrying, as advertised by the upstream
        retry_after_secs: u64,
    },

    /// Unexpected response format
    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),

    /// Daily request quota for the model has been used up
    #[error("Daily quota exceeded for model {model}: {count}/{limit}")]
    QuotaExceeded {
        /// Model whose quota was hit
        model: String,
        /// Post-increment request count
        count: u64,
        /// Configured requests per day
        limit: u64,
    },

    /// Model is not present in the model catalog
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// The key pool holds no credentials at all
    #[error("No API keys configured")]
    NoApiKeys,

    /// No key became available before the wait ceiling
    #[error("No API key became available within {waited_ms} ms")]
    KeyPoolExhausted {
        /// How long the caller waited
        waited_ms: u64,
    },

    /// No rate limiter token became available before the wait ceiling
    #[error("Rate limiter wait exceeded {waited_ms} ms")]
    RateLimitWait {
        /// How long the caller waited
        waited_ms: u64,
    },

    /// Socket or other I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the failed upstream call may succeed if repeated after a backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimit { .. })
    }
}
