//! Error types for the reconciliation engine.

use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reconciling a conditional TTL.
#[derive(Debug, Error)]
pub enum Error {
    /// The backing store failed to read or write an object.
    #[error("store error: {message}")]
    Store { message: String },

    /// A declared target could not be resolved.
    #[error("unable to resolve target {target:?}: {reason}")]
    TargetResolve { target: String, reason: String },

    /// A release teardown failed.
    #[error("unable to uninstall release {release:?}: {message}")]
    ReleaseUninstall { release: String, message: String },

    /// A deletion event could not be delivered to its sink.
    #[error("unable to deliver event to {sink}: {message}")]
    EventDelivery { sink: String, message: String },

    /// The engine was assembled without a required collaborator.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl Error {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn target_resolve(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TargetResolve {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn release_uninstall(release: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReleaseUninstall {
            release: release.into(),
            message: message.into(),
        }
    }

    pub fn event_delivery(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EventDelivery {
            sink: sink.into(),
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
