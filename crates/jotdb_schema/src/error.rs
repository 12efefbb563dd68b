//! Error types for schema compilation and key extraction.

use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur when compiling or applying a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The schema declares no key property.
    ///
    /// Every compiled schema needs at least one key property: the key
    /// properties form the record identity used for diffing and lookup.
    #[error("schema '{schema}' has no key property")]
    NoKeyProperty {
        /// Name of the schema.
        schema: String,
    },

    /// The same property name was declared twice.
    #[error("schema '{schema}' declares property '{property}' more than once")]
    DuplicateProperty {
        /// Name of the schema.
        schema: String,
        /// The duplicated property name.
        property: String,
    },

    /// Conflicting flags on one property.
    #[error("property '{property}': {message}")]
    ConflictingFlags {
        /// The offending property.
        property: String,
        /// Description of the conflict.
        message: String,
    },

    /// A record is missing a value for a key property.
    #[error("record has no value for key property '{property}'")]
    MissingKeyValue {
        /// The key property without a value.
        property: String,
    },
}

impl SchemaError {
    /// Creates a conflicting-flags error.
    pub fn conflicting_flags(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConflictingFlags {
            property: property.into(),
            message: message.into(),
        }
    }
}
