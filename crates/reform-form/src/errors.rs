//! Error type for form operations
//!
//! Validation *results* are not errors: a validator that reports a problem
//! produces a value that lands in an error map. [`FormError`] covers the
//! cases where an operation itself could not complete.

use crate::types::{ValidationCause, ValidationError};

/// Boxed error returned by user submit callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of a form operation.
#[derive(Debug, thiserror::Error)]
pub enum FormError {
    /// A synchronous validator failed instead of returning a result
    #[error("{cause} validator failed: {error}")]
    Validator {
        /// Cause of the validation pass
        cause: ValidationCause,
        /// The value the validator failed with
        error: ValidationError,
    },

    /// An array operation addressed a value that is not an array
    #[error("field `{field}` is not an array")]
    NotAnArray {
        /// Field path
        field: String,
    },

    /// An array operation addressed a missing element
    #[error("index {index} out of bounds for `{field}` (len {len})")]
    IndexOutOfBounds {
        /// Field path
        field: String,
        /// Requested index
        index: usize,
        /// Array length
        len: usize,
    },

    /// A write addressed an array index too far past the end to pad up to
    #[error("index {index} in `{path}` is too far past the end of the array (len {len})")]
    IndexTooFar {
        /// Path being written
        path: String,
        /// Requested index
        index: usize,
        /// Array length
        len: usize,
    },

    /// The submit callback failed
    #[error("submit failed: {0}")]
    Submit(#[source] BoxError),

    /// Declarative settings could not be parsed or are inconsistent
    #[error("invalid settings: {message}")]
    InvalidSettings {
        /// What was wrong
        message: String,
    },
}

impl FormError {
    /// Create a validator failure
    pub fn validator(cause: ValidationCause, error: ValidationError) -> Self {
        Self::Validator { cause, error }
    }

    /// Create a not-an-array error
    pub fn not_an_array(field: impl Into<String>) -> Self {
        Self::NotAnArray {
            field: field.into(),
        }
    }

    /// Create an out-of-bounds error
    pub fn index_out_of_bounds(field: impl Into<String>, index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds {
            field: field.into(),
            index,
            len,
        }
    }

    /// Create an index-too-far error
    pub fn index_too_far(path: impl Into<String>, index: usize, len: usize) -> Self {
        Self::IndexTooFar {
            path: path.into(),
            index,
            len,
        }
    }

    /// Create an invalid settings error
    pub fn invalid_settings(message: impl Into<String>) -> Self {
        Self::InvalidSettings {
            message: message.into(),
        }
    }
}

/// Standard result type for form operations
pub type Result<T> = std::result::Result<T, FormError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn messages_name_the_offending_field() {
        let err = FormError::index_out_of_bounds("items", 4, 2);
        assert_eq!(err.to_string(), "index 4 out of bounds for `items` (len 2)");

        let err = FormError::validator(ValidationCause::Change, json!("boom"));
        assert_eq!(err.to_string(), "change validator failed: \"boom\"");
    }

    #[test]
    fn submit_error_keeps_its_source() {
        let source: BoxError = "network down".into();
        let err = FormError::Submit(source);
        let inner = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(inner.as_deref(), Some("network down"));
    }
}
