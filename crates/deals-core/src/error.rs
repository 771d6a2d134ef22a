//! Error types for acquisition and caching operations.
//!
//! Two layers exist on purpose. Expected per-lookup conditions (a title a
//! provider has never heard of, a throttled request) are values of
//! [`ErrorKind`] carried inside a fetch result so the fallback chain can
//! decide what to do next. Only conditions that should abort a whole run
//! travel as [`FetchError`].

use thiserror::Error;

/// Expected per-lookup outcome, carried inside a fetch result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connectivity failure or timeout. Retryable.
    Network,
    /// The provider signaled throttling. Retryable with backoff.
    RateLimited,
    /// The provider has no record for the identifier. Triggers fallback.
    NotFound,
    /// The provider answered but the body did not parse. Treated as
    /// [`Self::NotFound`] for fallback purposes.
    MalformedResponse,
    /// Every provider in the chain failed. Terminal for this identifier
    /// this run.
    Exhausted,
    /// The batch writer could not persist the record even after individual
    /// retry. Terminal, reported separately from fetch failures.
    WriteFailed,
}

impl ErrorKind {
    /// Whether the same provider may be retried within the run.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimited)
    }

    /// Stable string form used in reports and the store.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network_error",
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::MalformedResponse => "malformed_response",
            Self::Exhausted => "exhausted",
            Self::WriteFailed => "write_failed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fatal errors that abort a run.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The cache store could not be opened or could not start a transaction.
    #[error("Store error: {0}")]
    Store(String),

    /// A required provider is missing from the chain configuration.
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Http(String),

    /// Error serializing or deserializing a stored payload.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using [`FetchError`].
pub type Result<T> = std::result::Result<T, FetchError>;
