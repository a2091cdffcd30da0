//! Error types for the api crate.

use thiserror::Error;

/// Result type alias for api operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Object model error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A duration string did not match the wire format.
    #[error("invalid duration {input:?}: {reason}")]
    InvalidDuration { input: String, reason: String },

    /// A spec failed a construction-time obligation.
    #[error("invalid spec: {reason}")]
    InvalidSpec { reason: String },
}

impl Error {
    /// Create an invalid duration error.
    pub fn invalid_duration(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid spec error.
    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            reason: reason.into(),
        }
    }
}
