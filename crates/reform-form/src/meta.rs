//! Per-field meta and its derivation.
//!
//! The raw [`FieldMetaBase`] lives in the base state. [`derive_field_meta`]
//! turns it into the public [`FieldMeta`], flattening the error map into an
//! `errors` list. A field whose error map `Arc` is unchanged keeps the
//! previous `errors` `Arc`, so consumers can skip work on identity.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::{ValidationError, ValidationErrorMap};

/// Raw per-field bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldMetaBase {
    /// The user interacted with the field.
    pub is_touched: bool,
    /// The field lost focus at least once.
    pub is_blurred: bool,
    /// The value was changed.
    pub is_dirty: bool,
    /// A field-level validation is running.
    pub is_validating: bool,
    /// Latest errors per cause.
    pub error_map: Arc<ValidationErrorMap>,
}

impl FieldMetaBase {
    /// Copy with `is_touched` set.
    pub fn touched(&self) -> Self {
        Self {
            is_touched: true,
            ..self.clone()
        }
    }

    /// Whether any cause currently holds a non-empty error.
    pub fn has_errors(&self) -> bool {
        self.error_map.iter().any(|(_, errors)| !errors.is_empty())
    }
}

/// Public per-field meta.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMeta {
    /// The user interacted with the field.
    pub is_touched: bool,
    /// The field lost focus at least once.
    pub is_blurred: bool,
    /// The value was changed.
    pub is_dirty: bool,
    /// A field-level validation is running.
    pub is_validating: bool,
    /// Latest errors per cause.
    pub error_map: Arc<ValidationErrorMap>,
    /// Every error across causes, flattened.
    pub errors: Arc<Vec<ValidationError>>,
    /// `!is_dirty`.
    pub is_pristine: bool,
}

impl FieldMeta {
    /// The raw meta this was derived from.
    pub fn base(&self) -> FieldMetaBase {
        FieldMetaBase {
            is_touched: self.is_touched,
            is_blurred: self.is_blurred,
            is_dirty: self.is_dirty,
            is_validating: self.is_validating,
            error_map: self.error_map.clone(),
        }
    }
}

/// Public meta for every known field.
pub type FieldMetaMap = BTreeMap<String, FieldMeta>;

/// Raw meta for every known field.
pub type FieldMetaBaseMap = BTreeMap<String, FieldMetaBase>;

fn flatten_errors(error_map: &ValidationErrorMap) -> Vec<ValidationError> {
    error_map
        .iter()
        .flat_map(|(_, errors)| errors.iter().cloned())
        .collect()
}

/// Derive public field meta.
///
/// `prev_base` and `prev` are the raw map and output of the previous run.
/// When the raw map itself is the same `Arc`, `prev` is returned as is.
pub fn derive_field_meta(
    prev_base: Option<&Arc<FieldMetaBaseMap>>,
    curr_base: &Arc<FieldMetaBaseMap>,
    prev: Option<&Arc<FieldMetaMap>>,
) -> Arc<FieldMetaMap> {
    if let (Some(prev_base), Some(prev)) = (prev_base, prev) {
        if Arc::ptr_eq(prev_base, curr_base) {
            trace!("field meta unchanged");
            return prev.clone();
        }
    }

    let mut out = FieldMetaMap::new();
    for (field, base) in curr_base.iter() {
        let previous_errors = prev_base
            .and_then(|prev_base| prev_base.get(field))
            .filter(|prev_meta| Arc::ptr_eq(&prev_meta.error_map, &base.error_map))
            .and_then(|_| prev.and_then(|prev| prev.get(field)))
            .map(|prev_meta| prev_meta.errors.clone());

        let errors = match previous_errors {
            Some(errors) => errors,
            None => {
                trace!(field = %field, "recomputing field errors");
                Arc::new(flatten_errors(&base.error_map))
            }
        };

        out.insert(
            field.clone(),
            FieldMeta {
                is_touched: base.is_touched,
                is_blurred: base.is_blurred,
                is_dirty: base.is_dirty,
                is_validating: base.is_validating,
                error_map: base.error_map.clone(),
                errors,
                is_pristine: !base.is_dirty,
            },
        );
    }
    Arc::new(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorMapKey;
    use serde_json::json;

    fn with_error(message: &str) -> FieldMetaBase {
        let mut error_map = ValidationErrorMap::default();
        error_map.set(ErrorMapKey::OnChange, Some(vec![json!(message)]));
        FieldMetaBase {
            error_map: Arc::new(error_map),
            ..FieldMetaBase::default()
        }
    }

    #[test]
    fn errors_flatten_across_causes() {
        let mut error_map = ValidationErrorMap::default();
        error_map.set(ErrorMapKey::OnChange, Some(vec![json!("a")]));
        error_map.set(ErrorMapKey::OnSubmit, Some(vec![json!("b"), json!("c")]));
        let base = Arc::new(FieldMetaBaseMap::from([(
            "name".to_string(),
            FieldMetaBase {
                is_dirty: true,
                error_map: Arc::new(error_map),
                ..FieldMetaBase::default()
            },
        )]));

        let derived = derive_field_meta(None, &base, None);
        let meta = &derived["name"];
        assert_eq!(*meta.errors, vec![json!("a"), json!("b"), json!("c")]);
        assert!(!meta.is_pristine);
    }

    #[test]
    fn unchanged_error_map_keeps_errors_identity() {
        let first = Arc::new(FieldMetaBaseMap::from([
            ("name".to_string(), with_error("short")),
            ("age".to_string(), with_error("young")),
        ]));
        let out1 = derive_field_meta(None, &first, None);

        // Touch `age` only; its error map Arc is carried over.
        let mut next = (*first).clone();
        let age = next["age"].touched();
        next.insert("age".to_string(), age);
        next.insert("name".to_string(), with_error("shorter"));
        let second = Arc::new(next);
        let out2 = derive_field_meta(Some(&first), &second, Some(&out1));

        assert!(Arc::ptr_eq(&out1["age"].errors, &out2["age"].errors));
        assert!(!Arc::ptr_eq(&out1["name"].errors, &out2["name"].errors));
        assert!(out2["age"].is_touched);
    }

    #[test]
    fn same_base_map_returns_previous_output() {
        let base = Arc::new(FieldMetaBaseMap::from([("name".to_string(), with_error("x"))]));
        let out1 = derive_field_meta(None, &base, None);
        let out2 = derive_field_meta(Some(&base), &base, Some(&out1));
        assert!(Arc::ptr_eq(&out1, &out2));
    }

    #[test]
    fn has_errors_ignores_empty_slots() {
        let mut error_map = ValidationErrorMap::default();
        error_map.set(ErrorMapKey::OnBlur, Some(Vec::new()));
        let meta = FieldMetaBase {
            error_map: Arc::new(error_map),
            ..FieldMetaBase::default()
        };
        assert!(!meta.has_errors());
        assert!(with_error("x").has_errors());
    }
}
