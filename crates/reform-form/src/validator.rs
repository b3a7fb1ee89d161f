//! Validator contract
//!
//! A form validator is one of three shapes, resolved by explicit variant
//! rather than by probing:
//!
//! - a plain function of the current values and the form;
//! - a [`StandardSchema`] object, run through the built-in bridge;
//! - an opaque schema understood only by the configured
//!   [`ValidatorAdapter`].
//!
//! When an adapter is configured it runs every non-function validator,
//! standard schemas included.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use reform_core::WatchCancellationToken;
use serde_json::Value;

use crate::form::FormApi;
use crate::path::{render_path, PathSegment};
use crate::types::ValidationError;

/// Cancellation signal handed to async validators. Resolves once a newer
/// validation for the same slot has started.
pub type ValidationSignal = WatchCancellationToken;

/// A validator's verdict before normalisation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    /// No error.
    Valid,
    /// An error value of any shape.
    Error(ValidationError),
    /// Form-level and per-field errors reported together.
    Form(FormValidationResult),
}

impl ValidationResult {
    /// Shorthand for a single string error.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Error(Value::String(message.into()))
    }

    /// Error values for individual fields, no form-level error.
    pub fn fields<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, ValidationError)>,
        K: Into<String>,
    {
        Self::Form(FormValidationResult {
            form: None,
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        })
    }
}

/// Structured result separating the form error from field errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormValidationResult {
    /// Form-level error.
    pub form: Option<ValidationError>,
    /// Raw errors keyed by field path.
    pub fields: BTreeMap<String, ValidationError>,
}

/// `Ok` is the validator's verdict; `Err` means the validator itself
/// failed, carrying the value it failed with.
pub type ValidatorOutcome = std::result::Result<ValidationResult, ValidationError>;

/// Synchronous validator function.
pub type ValidateFn = Arc<dyn Fn(&Value, &FormApi) -> ValidatorOutcome + Send + Sync>;

/// Asynchronous validator function.
pub type AsyncValidateFn =
    Arc<dyn Fn(Arc<Value>, FormApi, ValidationSignal) -> BoxFuture<'static, ValidatorOutcome> + Send + Sync>;

/// A problem reported by a standard schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaIssue {
    /// Human-readable message.
    pub message: String,
    /// Location of the problem; empty for form-level issues.
    pub path: Vec<PathSegment>,
}

impl SchemaIssue {
    /// Issue at `path` (dot/bracket syntax, empty for the whole form).
    pub fn new(message: impl Into<String>, path: &str) -> Self {
        Self {
            message: message.into(),
            path: crate::path::parse_path(path),
        }
    }
}

/// A schema following the standard-schema contract: validation yields a
/// list of issues, empty when the value is accepted.
#[async_trait]
pub trait StandardSchema: Send + Sync {
    /// Library that produced the schema.
    fn vendor(&self) -> &str;

    /// Validate synchronously.
    fn validate(&self, value: &Value) -> Vec<SchemaIssue>;

    /// Validate asynchronously. Defaults to the synchronous check.
    async fn validate_async(&self, value: &Value) -> Vec<SchemaIssue> {
        self.validate(value)
    }
}

/// A schema as seen by a [`ValidatorAdapter`].
#[derive(Clone, Copy)]
pub enum SchemaRef<'a> {
    /// A standard schema.
    Standard(&'a dyn StandardSchema),
    /// A library-specific schema object.
    Opaque(&'a (dyn Any + Send + Sync)),
}

/// Bridge between a schema library and the validator contract.
#[async_trait]
pub trait ValidatorAdapter: Send + Sync {
    /// Run `schema` against `value`.
    fn validate(&self, value: &Value, schema: SchemaRef<'_>) -> ValidatorOutcome;

    /// Async variant. Defaults to [`ValidatorAdapter::validate`].
    async fn validate_async(&self, value: &Value, schema: SchemaRef<'_>) -> ValidatorOutcome {
        self.validate(value, schema)
    }
}

/// Synchronous form validator.
#[derive(Clone)]
pub enum FormValidator {
    /// Plain function.
    Function(ValidateFn),
    /// Standard schema.
    StandardSchema(Arc<dyn StandardSchema>),
    /// Schema only the configured adapter understands.
    AdapterManaged(Arc<dyn Any + Send + Sync>),
}

impl FormValidator {
    /// Wrap a closure.
    pub fn from_fn<F>(validate: F) -> Self
    where
        F: Fn(&Value, &FormApi) -> ValidatorOutcome + Send + Sync + 'static,
    {
        Self::Function(Arc::new(validate))
    }

    /// Wrap a standard schema.
    pub fn schema(schema: impl StandardSchema + 'static) -> Self {
        Self::StandardSchema(Arc::new(schema))
    }
}

impl fmt::Debug for FormValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("FormValidator::Function"),
            Self::StandardSchema(schema) => write!(f, "FormValidator::StandardSchema({})", schema.vendor()),
            Self::AdapterManaged(_) => f.write_str("FormValidator::AdapterManaged"),
        }
    }
}

/// Asynchronous form validator.
#[derive(Clone)]
pub enum FormAsyncValidator {
    /// Function returning a future.
    Function(AsyncValidateFn),
    /// Standard schema.
    StandardSchema(Arc<dyn StandardSchema>),
    /// Schema only the configured adapter understands.
    AdapterManaged(Arc<dyn Any + Send + Sync>),
}

impl FormAsyncValidator {
    /// Wrap an async closure.
    pub fn from_fn<F, Fut>(validate: F) -> Self
    where
        F: Fn(Arc<Value>, FormApi, ValidationSignal) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ValidatorOutcome> + Send + 'static,
    {
        Self::Function(Arc::new(
            move |value: Arc<Value>,
                  form: FormApi,
                  signal: ValidationSignal|
                  -> BoxFuture<'static, ValidatorOutcome> {
                Box::pin(validate(value, form, signal))
            },
        ))
    }

    /// Wrap a standard schema.
    pub fn schema(schema: impl StandardSchema + 'static) -> Self {
        Self::StandardSchema(Arc::new(schema))
    }
}

impl fmt::Debug for FormAsyncValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("FormAsyncValidator::Function"),
            Self::StandardSchema(schema) => {
                write!(f, "FormAsyncValidator::StandardSchema({})", schema.vendor())
            }
            Self::AdapterManaged(_) => f.write_str("FormAsyncValidator::AdapterManaged"),
        }
    }
}

const MISSING_ADAPTER: &str = "validator requires a validator adapter";

/// Convert standard-schema issues into a validation result.
///
/// Issues are grouped by rendered path; each group becomes a field error
/// listing its messages. Path-less issues form the form-level error.
pub fn issues_to_result(issues: Vec<SchemaIssue>) -> ValidationResult {
    if issues.is_empty() {
        return ValidationResult::Valid;
    }

    let mut form = Vec::new();
    let mut fields: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for issue in issues {
        if issue.path.is_empty() {
            form.push(Value::String(issue.message));
        } else {
            fields
                .entry(render_path(&issue.path))
                .or_default()
                .push(Value::String(issue.message));
        }
    }

    ValidationResult::Form(FormValidationResult {
        form: (!form.is_empty()).then_some(Value::Array(form)),
        fields: fields
            .into_iter()
            .map(|(path, messages)| (path, Value::Array(messages)))
            .collect(),
    })
}

/// Run a synchronous validator.
pub(crate) fn run_sync(
    validator: &FormValidator,
    adapter: Option<&Arc<dyn ValidatorAdapter>>,
    value: &Value,
    form: &FormApi,
) -> ValidatorOutcome {
    match (validator, adapter) {
        (FormValidator::Function(validate), _) => validate(value, form),
        (FormValidator::StandardSchema(schema), Some(adapter)) => {
            adapter.validate(value, SchemaRef::Standard(schema.as_ref()))
        }
        (FormValidator::AdapterManaged(schema), Some(adapter)) => {
            adapter.validate(value, SchemaRef::Opaque(schema.as_ref()))
        }
        (FormValidator::StandardSchema(schema), None) => Ok(issues_to_result(schema.validate(value))),
        (FormValidator::AdapterManaged(_), None) => Err(Value::String(MISSING_ADAPTER.to_string())),
    }
}

/// Run an asynchronous validator.
pub(crate) async fn run_async(
    validator: FormAsyncValidator,
    adapter: Option<Arc<dyn ValidatorAdapter>>,
    value: Arc<Value>,
    form: FormApi,
    signal: ValidationSignal,
) -> ValidatorOutcome {
    match (validator, adapter) {
        (FormAsyncValidator::Function(validate), _) => validate(value, form, signal).await,
        (FormAsyncValidator::StandardSchema(schema), Some(adapter)) => {
            adapter
                .validate_async(&value, SchemaRef::Standard(schema.as_ref()))
                .await
        }
        (FormAsyncValidator::AdapterManaged(schema), Some(adapter)) => {
            adapter
                .validate_async(&value, SchemaRef::Opaque(schema.as_ref()))
                .await
        }
        (FormAsyncValidator::StandardSchema(schema), None) => {
            Ok(issues_to_result(schema.validate_async(&value).await))
        }
        (FormAsyncValidator::AdapterManaged(_), None) => {
            Err(Value::String(MISSING_ADAPTER.to_string()))
        }
    }
}
