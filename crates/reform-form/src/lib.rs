//! Reform Form - Reactive Form State Engine
//!
//! Framework-agnostic form state: values, per-field meta, form- and
//! field-level validation triggered by change, blur, mount, submit and
//! server causes, and array-field mutations that keep registered fields
//! consistent.
//!
//! # Architecture
//!
//! A [`FormApi`] owns a base store holding the authoritative
//! [`BaseFormState`]. Two derived nodes sit on top of it: the public
//! [`FieldMeta`] map, and the public [`FormState`] that aggregates
//! validity, submittability and interaction flags. Both reuse previous
//! output wherever inputs did not change, so consumers can compare by
//! `Arc` identity.
//!
//! Field bindings live outside this crate. They implement [`FieldHandle`]
//! and register with [`FormApi::register_field`]; the form holds them
//! weakly and calls into them when it needs field-level validation.
//!
//! # Validation
//!
//! [`FormApi::validate`] runs the synchronous validators for a cause and,
//! unless they errored, the asynchronous ones. Async validation is
//! debounced and superseded per error-map slot: starting a new pass
//! cancels the previous one, and a cancelled pass writes nothing.

#![forbid(unsafe_code)]

pub mod errors;
pub mod field;
pub mod form;
pub mod meta;
pub mod mutations;
pub mod normalize;
pub mod options;
pub mod path;
pub mod state;
pub mod types;
pub mod validation;
pub mod validator;

pub use errors::{BoxError, FormError, Result};
pub use field::{FieldHandle, FieldInfo, Pending, ValidationMeta, ValidationMetaMap};
pub use form::FormApi;
pub use meta::{derive_field_meta, FieldMeta, FieldMetaBase, FieldMetaBaseMap, FieldMetaMap};
pub use normalize::{normalize_error_value, normalize_field_error, normalize_form_error};
pub use options::{
    FormOptions, FormSettings, FormTransform, FormValidators, SubmitArgs, SubmitFn,
    SubmitInvalidFn, UpdateMetaOptions,
};
pub use path::{
    delete_by, get_by, index_path, is_within, parse_path, render_path, set_by, PathSegment, MAX_INDEX_GAP,
};
pub use state::{BaseFormState, DefaultFormState, FormState};
pub use types::{
    ErrorMap, ErrorMapKey, FieldsErrorMap, FormErrorEntry, FormErrorMap, FormValidationError,
    ValidationCause, ValidationError, ValidationErrorMap,
};
pub use validation::SyncValidation;
pub use validator::{
    issues_to_result, FormAsyncValidator, FormValidationResult, FormValidator, SchemaIssue,
    SchemaRef, StandardSchema, ValidationResult, ValidationSignal, ValidatorAdapter,
    ValidatorOutcome,
};

pub use reform_core::{batch, MountGuard};
