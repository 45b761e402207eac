//! Error types for the LLM crate.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the LLM error type.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Error type for model backend operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider returned an error not covered by a more specific variant.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Request never completed.
    #[error("Network error: {0}")]
    Network(String),

    /// Backend is misconfigured.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Response body could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Response decoded but made no sense.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Provider throttled the request.
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        /// Provider's message.
        message: String,
        /// Delay requested via `Retry-After`, if any.
        retry_after: Option<Duration>,
    },

    /// Credentials were rejected.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A scripted backend ran out of turns, or similar internal misuse.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LlmError {
    /// Create a rate limit error.
    pub fn rate_limit(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    /// How long the provider asked us to wait, if it did.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether the same request might succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit { .. })
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs = value.trim().parse::<f64>().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(LlmError::Network("reset".into()).is_retryable());
        assert!(LlmError::rate_limit("slow down", None).is_retryable());
        assert!(!LlmError::Auth("bad key".into()).is_retryable());
        assert!(!LlmError::Backend("boom".into()).is_retryable());
    }

    #[test]
    fn test_retry_after() {
        let err = LlmError::rate_limit("slow down", parse_retry_after("2"));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after("1.5"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(LlmError::Network("x".into()).retry_after(), None);
    }

    #[test]
    fn test_display() {
        let err = LlmError::rate_limit("too many requests", None);
        assert_eq!(err.to_string(), "Rate limit exceeded: too many requests");
    }
}
