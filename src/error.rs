//! Error types for the service cache.

use crate::key::Namespace;
use std::fmt;

/// Result type for service cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the service cache.
///
/// Fetch failures never surface through this type directly: they are stored
/// as [`Outcome::Failure`](crate::cache::Outcome::Failure) in the cache.
/// Mutation failures and bookkeeping violations are returned to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The remote service failed a fetch or a write.
    ///
    /// Common causes:
    /// - Network failure or timeout
    /// - Record not found
    /// - Server-side validation rejected a write
    ///
    /// **Recovery:** Fetches are retried on the next subscribe or refresh.
    /// Writes are never retried automatically.
    TransportError(String),

    /// `unsubscribe` was called on a key with no recorded subscribers.
    ///
    /// This is a bookkeeping bug in the calling binding layer: every
    /// unsubscribe must be paired with an earlier subscribe.
    Underflow {
        /// Namespace of the offending key
        namespace: Namespace,
        /// The key that had no subscribers
        key: String,
    },

    /// A cache key could not be decoded back into query parameters or an id.
    ///
    /// Only happens for keys that were not produced by [`KeyCodec`](crate::key::KeyCodec).
    DeserializationError(String),

    /// Invalid configuration or missing runtime.
    ///
    /// Common causes:
    /// - Zero-sized event buffer
    /// - Fetch launched outside of a Tokio runtime
    ConfigError(String),

    /// Generic error with custom message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TransportError(msg) => write!(f, "Transport error: {}", msg),
            Error::Underflow { namespace, key } => write!(
                f,
                "Subscription underflow: unsubscribe({}:{}) without a matching subscribe",
                namespace, key
            ),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

// JSON only flows into the cache through key decoding; encoding cannot fail.
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::DeserializationError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::TransportError("not found".to_string());
        assert_eq!(err.to_string(), "Transport error: not found");
    }

    #[test]
    fn test_underflow_display_names_key() {
        let err = Error::Underflow {
            namespace: Namespace::Entity,
            key: "42".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Subscription underflow: unsubscribe(get:42) without a matching subscribe"
        );
    }

    #[test]
    fn test_error_from_string() {
        let err: Error = "test error".into();
        assert!(matches!(err, Error::Other(_)));
    }

    #[test]
    fn test_error_from_json_syntax() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::DeserializationError(_)));
    }

    #[test]
    fn test_error_from_json_type_mismatch() {
        let json_err = serde_json::from_str::<u64>("\"text\"").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::DeserializationError(_)));
    }
}
