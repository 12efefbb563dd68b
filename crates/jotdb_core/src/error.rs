//! Error types for the JotDB engine.

use crate::plugin::PluginError;
use jotdb_schema::SchemaError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in JotDB engine operations.
///
/// All local errors are detected before any plugin I/O is attempted for
/// the operation that raised them, so a failed operation never leaves
/// partial side effects. [`EngineError::Plugin`] is the only variant
/// that originates beyond the plugin boundary; it is propagated
/// unchanged and never retried by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A schema rule was violated. Local and recoverable: the caller
    /// can correct the input and retry.
    #[error("validation failed for property '{property}': {message}")]
    Validation {
        /// The offending property.
        property: String,
        /// What was violated.
        message: String,
    },

    /// Assignment to a readonly property.
    #[error("property '{property}' is readonly")]
    ReadonlyViolation {
        /// The property that was assigned.
        property: String,
    },

    /// Assignment to a key property after materialization.
    #[error("key property '{property}' is immutable after materialization")]
    KeyImmutable {
        /// The key property that was assigned.
        property: String,
    },

    /// Mutation of a record that has been removed.
    #[error("record has been removed")]
    RecordRemoved,

    /// Min/max aggregate over an empty sequence with no default.
    #[error("aggregate over empty sequence")]
    EmptySequence,

    /// A filter predicate references a parameter missing from its bag.
    #[error("filter references unbound parameter '{name}'")]
    UnboundParameter {
        /// The missing parameter name.
        name: String,
    },

    /// The query plan does not fit the operation it was given to.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the mismatch.
        message: String,
    },

    /// A commit was issued while another commit on the same session was
    /// in flight. Usage error; commits are not reentrant-safe.
    #[error("a commit is already in flight on this session")]
    CommitInFlight,

    /// Schema compilation or key extraction failed.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Opaque failure surfaced from a plugin's query or persist call.
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),
}

impl EngineError {
    /// Creates a validation error.
    pub fn validation(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            property: property.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid-query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }
}
