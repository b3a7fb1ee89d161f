//! Base form state and the public form state derived from it.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use crate::field::ValidationMetaMap;
use crate::meta::{FieldMetaBaseMap, FieldMetaMap};
use crate::options::FormTransform;
use crate::types::{ErrorMapKey, FormErrorMap, ValidationError};

/// The single source of truth for one form.
#[derive(Debug, Clone)]
pub struct BaseFormState {
    /// Current values.
    pub values: Arc<Value>,
    /// Form-level errors per cause.
    pub error_map: Arc<FormErrorMap>,
    /// Raw per-field meta.
    pub field_meta_base: Arc<FieldMetaBaseMap>,
    /// `handle_submit` is running.
    pub is_submitting: bool,
    /// The last submit attempt completed.
    pub is_submitted: bool,
    /// Number of `handle_submit` calls.
    pub submission_attempts: u32,
    /// Form-level async validation is running.
    pub is_form_validating: bool,
    /// In-flight form-level async validations.
    pub validation_meta_map: ValidationMetaMap,
}

/// Partial base state used as construction and reset defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultFormState {
    /// Initial values.
    pub values: Option<Value>,
    /// Initial form-level errors.
    pub error_map: Option<FormErrorMap>,
    /// Initial per-field meta.
    pub field_meta_base: Option<FieldMetaBaseMap>,
    /// Initial `is_submitting`.
    pub is_submitting: Option<bool>,
    /// Initial `is_submitted`.
    pub is_submitted: Option<bool>,
    /// Initial `submission_attempts`.
    pub submission_attempts: Option<u32>,
    /// Initial `is_form_validating`.
    pub is_form_validating: Option<bool>,
}

impl BaseFormState {
    /// Build a base state from optional defaults. Missing values become an
    /// empty object.
    pub fn from_defaults(defaults: Option<&DefaultFormState>, values: Option<Arc<Value>>) -> Self {
        let empty = DefaultFormState::default();
        let defaults = defaults.unwrap_or(&empty);
        Self {
            values: values
                .or_else(|| defaults.values.clone().map(Arc::new))
                .unwrap_or_else(|| Arc::new(Value::Object(Map::new()))),
            error_map: Arc::new(defaults.error_map.clone().unwrap_or_default()),
            field_meta_base: Arc::new(defaults.field_meta_base.clone().unwrap_or_default()),
            is_submitting: defaults.is_submitting.unwrap_or(false),
            is_submitted: defaults.is_submitted.unwrap_or(false),
            submission_attempts: defaults.submission_attempts.unwrap_or(0),
            is_form_validating: defaults.is_form_validating.unwrap_or(false),
            validation_meta_map: ValidationMetaMap::default(),
        }
    }

    /// Drop the form-level mount error once any field is touched.
    ///
    /// The drop is permanent. Untouching the form later does not restore
    /// the error; only a new mount validation writes the slot again.
    pub(crate) fn settle_mount_error(&mut self) {
        let has_mount_error = self
            .error_map
            .on_mount
            .as_ref()
            .is_some_and(|entry| !entry.form_errors().is_empty());
        if has_mount_error && self.field_meta_base.values().any(|meta| meta.is_touched) {
            trace!("dropping mount error after first touch");
            self.error_map = Arc::new(self.error_map.with(ErrorMapKey::OnMount, None));
        }
    }

    /// Overlay the fields `defaults` sets.
    pub(crate) fn apply_defaults(&mut self, defaults: &DefaultFormState) {
        if let Some(values) = &defaults.values {
            self.values = Arc::new(values.clone());
        }
        if let Some(error_map) = &defaults.error_map {
            self.error_map = Arc::new(error_map.clone());
        }
        if let Some(field_meta_base) = &defaults.field_meta_base {
            self.field_meta_base = Arc::new(field_meta_base.clone());
        }
        if let Some(is_submitting) = defaults.is_submitting {
            self.is_submitting = is_submitting;
        }
        if let Some(is_submitted) = defaults.is_submitted {
            self.is_submitted = is_submitted;
        }
        if let Some(attempts) = defaults.submission_attempts {
            self.submission_attempts = attempts;
        }
        if let Some(is_form_validating) = defaults.is_form_validating {
            self.is_form_validating = is_form_validating;
        }
    }
}

/// Public form state: the base state plus everything derived from it.
#[derive(Debug, Clone)]
pub struct FormState {
    /// Current values.
    pub values: Arc<Value>,
    /// Form-level errors per cause.
    pub error_map: Arc<FormErrorMap>,
    /// Raw per-field meta.
    pub field_meta_base: Arc<FieldMetaBaseMap>,
    /// `handle_submit` is running.
    pub is_submitting: bool,
    /// The last submit attempt completed.
    pub is_submitted: bool,
    /// Number of `handle_submit` calls.
    pub submission_attempts: u32,
    /// Form-level async validation is running.
    pub is_form_validating: bool,
    /// In-flight form-level async validations.
    pub validation_meta_map: ValidationMetaMap,

    /// Public per-field meta.
    pub field_meta: Arc<FieldMetaMap>,
    /// Flattened form-level errors.
    pub errors: Arc<Vec<ValidationError>>,
    /// Some field is validating.
    pub is_fields_validating: bool,
    /// No field holds an error.
    pub is_fields_valid: bool,
    /// No form-level error.
    pub is_form_valid: bool,
    /// `is_fields_valid && is_form_valid`.
    pub is_valid: bool,
    /// The form or a field is validating.
    pub is_validating: bool,
    /// Submitting is currently allowed.
    pub can_submit: bool,
    /// Some field is touched.
    pub is_touched: bool,
    /// Some field is blurred.
    pub is_blurred: bool,
    /// Some field is dirty.
    pub is_dirty: bool,
    /// `!is_dirty`.
    pub is_pristine: bool,
}

/// Remembers the dependency list the transform last ran with.
#[derive(Debug, Default)]
pub(crate) struct TransformGate {
    prev_deps: Mutex<Vec<Value>>,
}

impl TransformGate {
    /// Apply `transform` if its dependencies moved since the last run.
    fn apply(&self, transform: Option<&FormTransform>, state: FormState) -> FormState {
        let empty = Vec::new();
        let deps = transform.map_or(&empty, |transform| &transform.deps);

        let mut prev_deps = self.prev_deps.lock();
        if *prev_deps == *deps {
            return state;
        }
        *prev_deps = deps.clone();
        drop(prev_deps);

        match transform {
            Some(transform) => {
                trace!("applying form transform");
                (transform.apply)(state)
            }
            None => state,
        }
    }
}

/// Derive the public form state.
///
/// `prev_base` and `prev` come from the previous run, if any.
pub(crate) fn derive_form_state(
    prev_base: Option<&BaseFormState>,
    curr: &BaseFormState,
    field_meta: Arc<FieldMetaMap>,
    prev: Option<&FormState>,
    gate: &TransformGate,
    transform: Option<&FormTransform>,
) -> FormState {
    let metas = curr.field_meta_base.values();
    let mut is_fields_validating = false;
    let mut is_fields_valid = true;
    let mut is_touched = false;
    let mut is_blurred = false;
    let mut is_dirty = false;
    let mut field_mount_error = false;
    for meta in metas {
        is_fields_validating |= meta.is_validating;
        is_fields_valid &= !meta.has_errors();
        is_touched |= meta.is_touched;
        is_blurred |= meta.is_blurred;
        is_dirty |= meta.is_dirty;
        field_mount_error |= meta
            .error_map
            .get(ErrorMapKey::OnMount)
            .is_some_and(|errors| !errors.is_empty());
    }

    let has_on_mount_error = curr.error_map.on_mount.is_some() || field_mount_error;

    // `errors` keeps its previous `Arc` while the base error map is unchanged.
    let errors = match (prev_base, prev) {
        (Some(prev_base), Some(prev)) if Arc::ptr_eq(&prev_base.error_map, &curr.error_map) => {
            prev.errors.clone()
        }
        _ => {
            trace!("recomputing form errors");
            Arc::new(
                curr.error_map
                    .iter()
                    .flat_map(|(_, entry)| entry.form_errors().iter().cloned())
                    .collect(),
            )
        }
    };

    let is_form_valid = errors.is_empty();
    let is_valid = is_fields_valid && is_form_valid;
    let is_validating = curr.is_form_validating || is_fields_validating;
    let can_submit = (curr.submission_attempts == 0 && !is_touched && !has_on_mount_error)
        || (!is_validating && !curr.is_submitting && is_valid);

    let state = FormState {
        values: curr.values.clone(),
        error_map: curr.error_map.clone(),
        field_meta_base: curr.field_meta_base.clone(),
        is_submitting: curr.is_submitting,
        is_submitted: curr.is_submitted,
        submission_attempts: curr.submission_attempts,
        is_form_validating: curr.is_form_validating,
        validation_meta_map: curr.validation_meta_map.clone(),
        field_meta,
        errors,
        is_fields_validating,
        is_fields_valid,
        is_form_valid,
        is_valid,
        is_validating,
        can_submit,
        is_touched,
        is_blurred,
        is_dirty,
        is_pristine: !is_dirty,
    };

    gate.apply(transform, state)
}
