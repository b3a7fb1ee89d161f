//! Validation causes, error-map keys and error maps.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A validation error value. Validators may produce any shape.
pub type ValidationError = serde_json::Value;

/// The event that triggered a validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationCause {
    /// The form was mounted.
    Mount,
    /// A value changed.
    Change,
    /// A field lost focus.
    Blur,
    /// A submit was attempted.
    Submit,
    /// A server response reported errors.
    Server,
}

impl ValidationCause {
    /// The error-map slot results for this cause are written to.
    pub fn error_map_key(self) -> ErrorMapKey {
        match self {
            Self::Mount => ErrorMapKey::OnMount,
            Self::Change => ErrorMapKey::OnChange,
            Self::Blur => ErrorMapKey::OnBlur,
            Self::Submit => ErrorMapKey::OnSubmit,
            Self::Server => ErrorMapKey::OnServer,
        }
    }
}

impl fmt::Display for ValidationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mount => "mount",
            Self::Change => "change",
            Self::Blur => "blur",
            Self::Submit => "submit",
            Self::Server => "server",
        };
        f.write_str(name)
    }
}

/// A slot in an [`ErrorMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorMapKey {
    /// Errors from mount validation.
    OnMount,
    /// Errors from change validation.
    OnChange,
    /// Errors from blur validation.
    OnBlur,
    /// Errors from submit validation.
    OnSubmit,
    /// Errors reported by a server.
    OnServer,
}

impl ErrorMapKey {
    /// Every slot, in the order errors are flattened.
    pub const ALL: [ErrorMapKey; 5] = [
        Self::OnMount,
        Self::OnChange,
        Self::OnBlur,
        Self::OnSubmit,
        Self::OnServer,
    ];

    /// The cause whose results land in this slot.
    pub fn cause(self) -> ValidationCause {
        match self {
            Self::OnMount => ValidationCause::Mount,
            Self::OnChange => ValidationCause::Change,
            Self::OnBlur => ValidationCause::Blur,
            Self::OnSubmit => ValidationCause::Submit,
            Self::OnServer => ValidationCause::Server,
        }
    }
}

/// Per-cause error slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMap<E> {
    /// Mount-time error.
    #[serde(default = "none", skip_serializing_if = "Option::is_none")]
    pub on_mount: Option<E>,
    /// Change-time error.
    #[serde(default = "none", skip_serializing_if = "Option::is_none")]
    pub on_change: Option<E>,
    /// Blur-time error.
    #[serde(default = "none", skip_serializing_if = "Option::is_none")]
    pub on_blur: Option<E>,
    /// Submit-time error.
    #[serde(default = "none", skip_serializing_if = "Option::is_none")]
    pub on_submit: Option<E>,
    /// Server-reported error.
    #[serde(default = "none", skip_serializing_if = "Option::is_none")]
    pub on_server: Option<E>,
}

fn none<E>() -> Option<E> {
    None
}

impl<E> Default for ErrorMap<E> {
    fn default() -> Self {
        Self {
            on_mount: None,
            on_change: None,
            on_blur: None,
            on_submit: None,
            on_server: None,
        }
    }
}

impl<E> ErrorMap<E> {
    /// Read a slot.
    pub fn get(&self, key: ErrorMapKey) -> Option<&E> {
        match key {
            ErrorMapKey::OnMount => self.on_mount.as_ref(),
            ErrorMapKey::OnChange => self.on_change.as_ref(),
            ErrorMapKey::OnBlur => self.on_blur.as_ref(),
            ErrorMapKey::OnSubmit => self.on_submit.as_ref(),
            ErrorMapKey::OnServer => self.on_server.as_ref(),
        }
    }

    /// Mutable access to a slot.
    pub fn slot_mut(&mut self, key: ErrorMapKey) -> &mut Option<E> {
        match key {
            ErrorMapKey::OnMount => &mut self.on_mount,
            ErrorMapKey::OnChange => &mut self.on_change,
            ErrorMapKey::OnBlur => &mut self.on_blur,
            ErrorMapKey::OnSubmit => &mut self.on_submit,
            ErrorMapKey::OnServer => &mut self.on_server,
        }
    }

    /// Overwrite a slot.
    pub fn set(&mut self, key: ErrorMapKey, value: Option<E>) {
        *self.slot_mut(key) = value;
    }

    /// Occupied slots in [`ErrorMapKey::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (ErrorMapKey, &E)> {
        ErrorMapKey::ALL
            .into_iter()
            .filter_map(move |key| self.get(key).map(|value| (key, value)))
    }

    /// Whether every slot is empty.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Overwrite every slot that is occupied in `other`.
    pub fn merge(&mut self, other: ErrorMap<E>) {
        let ErrorMap {
            on_mount,
            on_change,
            on_blur,
            on_submit,
            on_server,
        } = other;
        let incoming = [
            (ErrorMapKey::OnMount, on_mount),
            (ErrorMapKey::OnChange, on_change),
            (ErrorMapKey::OnBlur, on_blur),
            (ErrorMapKey::OnSubmit, on_submit),
            (ErrorMapKey::OnServer, on_server),
        ];
        for (key, value) in incoming {
            if value.is_some() {
                self.set(key, value);
            }
        }
    }
}

impl<E: Clone> ErrorMap<E> {
    /// Copy of this map with one slot replaced.
    pub fn with(&self, key: ErrorMapKey, value: Option<E>) -> Self {
        let mut next = self.clone();
        next.set(key, value);
        next
    }
}

/// Field-level error map: each slot holds the normalised error list.
pub type ValidationErrorMap = ErrorMap<Vec<ValidationError>>;

/// Form-level error map.
pub type FormErrorMap = ErrorMap<FormErrorEntry>;

/// Per-field error maps produced by one validation pass.
pub type FieldsErrorMap = BTreeMap<String, ValidationErrorMap>;

/// A normalised validation result: the form-level error and the per-field
/// errors, each absent when clean.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormValidationError {
    /// Form-level errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_error: Option<Vec<ValidationError>>,
    /// Errors keyed by field path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<BTreeMap<String, Vec<ValidationError>>>,
}

impl FormValidationError {
    /// Whether neither a form error nor any field error is present.
    pub fn is_clean(&self) -> bool {
        self.form_error.is_none() && self.field_errors.as_ref().map_or(true, BTreeMap::is_empty)
    }
}

/// A form error-map slot value.
///
/// Validators write plain error lists. A structured entry carries per-field
/// errors alongside the form error (e.g. a server response passed to
/// `set_error_map`); only its form error counts towards the form's
/// `errors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormErrorEntry {
    /// Plain form-level errors.
    Errors(Vec<ValidationError>),
    /// A form error together with field errors.
    Structured(FormValidationError),
}

impl FormErrorEntry {
    /// The errors this entry contributes at form level.
    pub fn form_errors(&self) -> &[ValidationError] {
        match self {
            Self::Errors(errors) => errors,
            Self::Structured(structured) => structured.form_error.as_deref().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cause_and_key_mapping_is_bidirectional() {
        for key in ErrorMapKey::ALL {
            assert_eq!(key.cause().error_map_key(), key);
        }
        assert_eq!(ValidationCause::Submit.error_map_key(), ErrorMapKey::OnSubmit);
        assert_eq!(ValidationCause::Server.error_map_key(), ErrorMapKey::OnServer);
    }

    #[test]
    fn iter_skips_empty_slots_in_fixed_order() {
        let mut map = ValidationErrorMap::default();
        map.set(ErrorMapKey::OnBlur, Some(vec![json!("blur")]));
        map.set(ErrorMapKey::OnMount, Some(vec![json!("mount")]));

        let keys: Vec<_> = map.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec![ErrorMapKey::OnMount, ErrorMapKey::OnBlur]);
    }

    #[test]
    fn merge_only_overwrites_occupied_slots() {
        let mut map = FormErrorMap::default();
        map.set(ErrorMapKey::OnChange, Some(FormErrorEntry::Errors(vec![json!("a")])));

        let mut incoming = FormErrorMap::default();
        incoming.set(ErrorMapKey::OnServer, Some(FormErrorEntry::Errors(vec![json!("b")])));
        map.merge(incoming);

        assert!(map.on_change.is_some());
        assert!(map.on_server.is_some());
    }

    #[test]
    fn structured_entry_contributes_form_error_only() {
        let entry = FormErrorEntry::Structured(FormValidationError {
            form_error: Some(vec![json!("form")]),
            field_errors: Some(BTreeMap::from([("name".to_string(), vec![json!("field")])])),
        });
        assert_eq!(entry.form_errors(), &[json!("form")]);
    }

    #[test]
    fn error_map_serialises_camel_case() {
        let mut map = ValidationErrorMap::default();
        map.set(ErrorMapKey::OnChange, Some(vec![json!("too short")]));

        let encoded = serde_json::to_value(&map).unwrap();
        assert_eq!(encoded, json!({ "onChange": ["too short"] }));

        let decoded: ValidationErrorMap = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn entry_deserialises_array_as_plain_errors() {
        let entry: FormErrorEntry = serde_json::from_value(json!(["x"])).unwrap();
        assert_eq!(entry, FormErrorEntry::Errors(vec![json!("x")]));

        let entry: FormErrorEntry =
            serde_json::from_value(json!({ "formError": ["y"] })).unwrap();
        assert_eq!(entry.form_errors(), &[json!("y")]);
    }
}
