//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Object does not exist
    #[display("object not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Object is held under a lease that the caller does not own
    #[display("object is leased: {_0}")]
    LeaseConflict(#[error(not(source))] String),
    /// Key is empty, contains a null byte, or falls in a reserved namespace
    #[display("invalid key: {_0:?}")]
    InvalidKey(#[error(not(source))] String),
    /// Network-related error (connection refused, DNS, credentials rejected)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The store did not answer in time
    #[display("timed out: {_0}")]
    Timeout(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_) | Self::BackendError(_))
    }

    /// Returns `true` if the store could not be reached at all, as opposed
    /// to the store answering with a refusal.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::NotFound("/a".into()), false)]
    #[case(ErrorKind::LeaseConflict("/a".into()), false)]
    #[case(ErrorKind::InvalidKey("".into()), false)]
    #[case(ErrorKind::Network("refused".into()), true)]
    #[case(ErrorKind::Timeout("copy".into()), true)]
    #[case(ErrorKind::BackendError("500".into()), true)]
    fn test_is_retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorKind::NotFound("/cux/foo.txt".into()).to_string(), "object not found: /cux/foo.txt");
        assert_eq!(ErrorKind::InvalidKey("".into()).to_string(), "invalid key: \"\"");
    }
}
