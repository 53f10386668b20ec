//! Custom error types for rustcrossref.
//!
//! This module defines all error types used throughout the crate.
//! All functions return `Result<T, CrossrefError>` instead of using `unwrap()`.

use thiserror::Error;

/// Boxed source error carried by transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for rustcrossref operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
#[derive(Debug, Error)]
pub enum CrossrefError {
    /// Network-level failure issuing the request (DNS, refused, timeout)
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// The API answered with a non-200 status
    #[error("HTTP {status} from {url}: {body}")]
    HttpStatus {
        /// Status code returned by the API
        status: u16,
        /// Final request URL
        url: String,
        /// Response body
        body: String,
    },

    /// The API answered 200 but the payload status was not "ok".
    ///
    /// Retried in place; only reaches callers as the `last_error` of
    /// [`CrossrefError::RetryExhausted`].
    #[error("Payload status {status:?} from {url}")]
    NotOk {
        /// Status field found in the payload
        status: String,
        /// Final request URL
        url: String,
        /// Raw payload
        payload: String,
    },

    /// An "ok" payload is missing or has malformed expected fields
    #[error("Parse error: {0}")]
    Parse(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Offset mode received a page that does not start where requested
    #[error("Pagination consistency error: requested offset {expected}, API reported start-index {actual}")]
    PaginationConsistency {
        /// Offset sent with the request
        expected: u64,
        /// `start-index` reported by the payload
        actual: u64,
    },

    /// Consecutive failures exceeded the configured retry policy
    #[error("Gave up after {attempts} consecutive failures, last error: {last_error}")]
    RetryExhausted {
        /// Number of consecutive failed attempts
        attempts: u32,
        /// The failure that exhausted the policy
        last_error: Box<CrossrefError>,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl CrossrefError {
    /// Wrap any error or message as a transport failure.
    pub fn transport(source: impl Into<BoxError>) -> Self {
        Self::Transport(source.into())
    }

    /// Whether the paginator retries this error with backoff and page shrink.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::HttpStatus { .. } | Self::Json(_)
        )
    }
}

impl From<reqwest::Error> for CrossrefError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(Box::new(e))
    }
}

/// Result type alias using `CrossrefError`
pub type Result<T> = std::result::Result<T, CrossrefError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| CrossrefError::Parse(msg.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(CrossrefError::transport("connection refused").is_recoverable());
        assert!(CrossrefError::HttpStatus {
            status: 500,
            url: "https://api.crossref.org/works".to_string(),
            body: String::new(),
        }
        .is_recoverable());
        assert!(!CrossrefError::PaginationConsistency {
            expected: 20,
            actual: 40
        }
        .is_recoverable());
        assert!(!CrossrefError::Parse("missing total-results".to_string()).is_recoverable());
    }

    #[test]
    fn test_ok_or_parse() {
        let missing: Option<u64> = None;
        let err = missing.ok_or_parse("missing next-cursor").unwrap_err();
        assert_eq!(err.to_string(), "Parse error: missing next-cursor");
    }
}
