//! Error types for testunit-rs

use std::time::Duration;
use thiserror::Error;

/// Result type alias for testunit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for testunit operations
///
/// A few variants are signals rather than faults: [`Error::Skip`] and
/// [`Error::Assertion`] are how a test body reports "skipped" and "failed"
/// to the lifecycle that runs it.
#[derive(Error, Debug)]
pub enum Error {
    /// The test (or subtest, or fixture) asked to be skipped
    #[error("skipped: {reason}")]
    Skip { reason: String },

    /// An explicit assertion did not hold
    #[error("{message}")]
    Assertion { message: String },

    /// A mock verification (`assert_called_with` and friends) did not hold
    #[error("{message}")]
    Verification { message: String },

    /// A spec-constrained mock was called with arguments its signature rejects
    #[error("{message}")]
    SignatureMismatch { message: String },

    /// Attribute lookup refused by a spec or by the reserved-name rules
    #[error("{message}")]
    Attribute { message: String },

    /// A mock whose spec is not callable was called
    #[error("'{name}' object is not callable")]
    NotCallable { name: String },

    /// The side-effect sequence configured on a mock ran out of elements
    #[error("side effect sequence of '{mock}' is exhausted")]
    SideEffectExhausted { mock: String },

    /// An error raised on purpose by a mock side effect
    #[error(transparent)]
    Raised(anyhow::Error),

    /// A suspending step ran past its time budget
    #[error("test exceeded its time budget of {budget:?}")]
    Timeout { budget: Duration },

    /// Fail-fast unwinding out of a failed subtest
    #[error("run stopped after a failure")]
    Stop,

    /// Regex error
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

impl Error {
    /// Create a skip signal
    pub fn skip(reason: impl Into<String>) -> Self {
        Error::Skip {
            reason: reason.into(),
        }
    }

    /// Create an assertion failure
    pub fn assertion(message: impl Into<String>) -> Self {
        Error::Assertion {
            message: message.into(),
        }
    }

    /// Create a mock verification failure
    pub fn verification(message: impl Into<String>) -> Self {
        Error::Verification {
            message: message.into(),
        }
    }

    /// Create a signature mismatch error
    pub fn signature(message: impl Into<String>) -> Self {
        Error::SignatureMismatch {
            message: message.into(),
        }
    }

    /// Create an attribute error
    pub fn attribute(message: impl Into<String>) -> Self {
        Error::Attribute {
            message: message.into(),
        }
    }

    /// Wrap an arbitrary error as a deliberate side-effect raise
    pub fn raised(error: impl Into<anyhow::Error>) -> Self {
        Error::Raised(error.into())
    }

    /// Whether this error is the dedicated skip signal
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::Skip { .. })
    }

    /// Whether this error counts as a failure rather than an unexpected error
    pub fn is_failure(&self) -> bool {
        matches!(self, Error::Assertion { .. } | Error::Verification { .. })
    }
}
