//! Error normalisation.
//!
//! Every validator verdict is reduced to a [`FormValidationError`] before it
//! is written anywhere:
//!
//! | raw value               | normalised                      |
//! |-------------------------|---------------------------------|
//! | falsy / empty array     | no error                        |
//! | string                  | `[string]`                      |
//! | array                   | the array                       |
//! | anything else           | `["Invalid Form Values"]`       |
//!
//! Structured results normalise their `form` part the same way and each
//! field error with the field rules (any non-falsy value is wrapped in a
//! list unless it already is one).

use std::collections::BTreeMap;

use serde_json::Value;

use crate::types::{FormValidationError, ValidationError};
use crate::validator::ValidationResult;

/// Placeholder for form errors that are neither strings nor lists.
pub const INVALID_FORM_VALUES: &str = "Invalid Form Values";

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(_) => false,
    }
}

/// Normalise a form-level error value.
pub fn normalize_error_value(raw: &Value) -> Option<Vec<ValidationError>> {
    if is_falsy(raw) {
        return None;
    }
    Some(match raw {
        Value::Array(items) => items.clone(),
        Value::String(_) => vec![raw.clone()],
        _ => vec![Value::String(INVALID_FORM_VALUES.to_string())],
    })
}

/// Normalise a field-level error value.
pub fn normalize_field_error(raw: &Value) -> Option<Vec<ValidationError>> {
    if is_falsy(raw) {
        return None;
    }
    Some(match raw {
        Value::Array(items) => items.clone(),
        _ => vec![raw.clone()],
    })
}

/// Normalise a validator verdict.
pub fn normalize_form_error(raw: &ValidationResult) -> FormValidationError {
    match raw {
        ValidationResult::Valid => FormValidationError::default(),
        ValidationResult::Error(error) => FormValidationError {
            form_error: normalize_error_value(error),
            field_errors: None,
        },
        ValidationResult::Form(result) => {
            let field_errors: BTreeMap<String, Vec<ValidationError>> = result
                .fields
                .iter()
                .filter_map(|(field, error)| {
                    normalize_field_error(error).map(|errors| (field.clone(), errors))
                })
                .collect();
            FormValidationError {
                form_error: result.form.as_ref().and_then(normalize_error_value),
                field_errors: Some(field_errors),
            }
        }
    }
}
