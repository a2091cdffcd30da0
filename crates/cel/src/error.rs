//! Error types for the expression extension layer.

use thiserror::Error;

/// Result type alias for extension operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the ordering extensions and the macro expander.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Macro expansion rejected the expression shape.
    #[error("macro expansion failed: {message}")]
    Expansion { message: String },

    /// Two values do not share an ordering.
    #[error("cannot compare {left} with {right}")]
    Incomparable { left: String, right: String },

    /// An order string other than "asc"/"desc" was supplied.
    #[error("unknown order: {order}")]
    UnknownOrder { order: String },

    /// A value passed to a list primitive was not a list.
    #[error("expected a list, got {kind}")]
    NotAList { kind: String },

    /// A record sorted without a key projection lacks the conventional
    /// creation timestamp field, or it failed to parse.
    #[error("record has no sortable creation timestamp: {reason}")]
    NoCreationTimestamp { reason: String },

    /// An ordered pair record is missing its `order` or `value` field.
    #[error("malformed ordered pair at element {index}")]
    MalformedPair { index: usize },

    /// A pair key does not implement the ordering capability.
    #[error("unable to build ordered pair with key of type {kind}")]
    UnorderedPairKey { kind: String },

    /// The evaluation environment could not be built.
    #[error("invalid evaluation environment: {message}")]
    Environment { message: String },
}

impl Error {
    pub fn expansion(message: impl Into<String>) -> Self {
        Self::Expansion {
            message: message.into(),
        }
    }

    pub fn incomparable(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::Incomparable {
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn unknown_order(order: impl Into<String>) -> Self {
        Self::UnknownOrder {
            order: order.into(),
        }
    }

    pub fn not_a_list(kind: impl Into<String>) -> Self {
        Self::NotAList { kind: kind.into() }
    }

    pub fn no_creation_timestamp(reason: impl Into<String>) -> Self {
        Self::NoCreationTimestamp {
            reason: reason.into(),
        }
    }

    pub fn environment(message: impl Into<String>) -> Self {
        Self::Environment {
            message: message.into(),
        }
    }
}
