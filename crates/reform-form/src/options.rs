//! Form configuration
//!
//! [`FormOptions`] is the programmatic configuration: validators, callbacks
//! and the optional state transform. [`FormSettings`] is its declarative,
//! serde-backed subset, loadable from JSON and lifted into options with
//! [`FormOptions::from_settings`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{BoxError, FormError, Result};
use crate::form::FormApi;
use crate::state::{DefaultFormState, FormState};
use crate::types::ValidationCause;
use crate::validator::{FormAsyncValidator, FormValidator, ValidatorAdapter};

/// Arguments handed to submit callbacks.
#[derive(Debug, Clone)]
pub struct SubmitArgs {
    /// Values at the time of submission.
    pub value: Arc<Value>,
    /// The submitting form.
    pub form: FormApi,
}

/// Submit callback. An `Err` is rethrown from `handle_submit` as
/// [`FormError::Submit`].
pub type SubmitFn =
    Arc<dyn Fn(SubmitArgs) -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send + Sync>;

/// Called when a submit attempt finds the form invalid.
pub type SubmitInvalidFn = Arc<dyn Fn(SubmitArgs) + Send + Sync>;

/// A user transform applied to the derived form state.
///
/// It runs only on derivation cycles where `deps` differs from the list it
/// last ran with.
#[derive(Clone)]
pub struct FormTransform {
    /// Values the transform depends on.
    pub deps: Vec<Value>,
    /// Replaces the derived state.
    pub apply: Arc<dyn Fn(FormState) -> FormState + Send + Sync>,
}

impl FormTransform {
    /// Create a transform.
    pub fn new<F>(deps: Vec<Value>, apply: F) -> Self
    where
        F: Fn(FormState) -> FormState + Send + Sync + 'static,
    {
        Self {
            deps,
            apply: Arc::new(apply),
        }
    }
}

impl fmt::Debug for FormTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormTransform")
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// Form-level validators per cause.
#[derive(Debug, Clone, Default)]
pub struct FormValidators {
    /// Runs once on mount.
    pub on_mount: Option<FormValidator>,
    /// Runs on change and submit.
    pub on_change: Option<FormValidator>,
    /// Async change validator.
    pub on_change_async: Option<FormAsyncValidator>,
    /// Debounce for `on_change_async`, in milliseconds.
    pub on_change_async_debounce_ms: Option<u64>,
    /// Runs on blur and submit.
    pub on_blur: Option<FormValidator>,
    /// Async blur validator.
    pub on_blur_async: Option<FormAsyncValidator>,
    /// Debounce for `on_blur_async`, in milliseconds.
    pub on_blur_async_debounce_ms: Option<u64>,
    /// Runs on submit.
    pub on_submit: Option<FormValidator>,
    /// Async submit validator.
    pub on_submit_async: Option<FormAsyncValidator>,
}

impl FormValidators {
    /// Set the mount validator.
    pub fn with_on_mount(mut self, validator: FormValidator) -> Self {
        self.on_mount = Some(validator);
        self
    }

    /// Set the change validator.
    pub fn with_on_change(mut self, validator: FormValidator) -> Self {
        self.on_change = Some(validator);
        self
    }

    /// Set the async change validator.
    pub fn with_on_change_async(mut self, validator: FormAsyncValidator) -> Self {
        self.on_change_async = Some(validator);
        self
    }

    /// Set the async change debounce.
    pub fn with_on_change_async_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.on_change_async_debounce_ms = Some(debounce_ms);
        self
    }

    /// Set the blur validator.
    pub fn with_on_blur(mut self, validator: FormValidator) -> Self {
        self.on_blur = Some(validator);
        self
    }

    /// Set the async blur validator.
    pub fn with_on_blur_async(mut self, validator: FormAsyncValidator) -> Self {
        self.on_blur_async = Some(validator);
        self
    }

    /// Set the async blur debounce.
    pub fn with_on_blur_async_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.on_blur_async_debounce_ms = Some(debounce_ms);
        self
    }

    /// Set the submit validator.
    pub fn with_on_submit(mut self, validator: FormValidator) -> Self {
        self.on_submit = Some(validator);
        self
    }

    /// Set the async submit validator.
    pub fn with_on_submit_async(mut self, validator: FormAsyncValidator) -> Self {
        self.on_submit_async = Some(validator);
        self
    }
}

/// A sync validation step selected for a cause.
#[derive(Debug, Clone)]
pub(crate) enum SyncCheck {
    /// A configured validator; results land in `cause`'s slot.
    Configured(ValidationCause, FormValidator),
    /// Clears the server slot.
    ClearServer,
}

impl SyncCheck {
    pub(crate) fn cause(&self) -> ValidationCause {
        match self {
            Self::Configured(cause, _) => *cause,
            Self::ClearServer => ValidationCause::Server,
        }
    }
}

/// An async validation step selected for a cause.
#[derive(Debug, Clone)]
pub(crate) struct AsyncCheck {
    pub(crate) cause: ValidationCause,
    pub(crate) validator: FormAsyncValidator,
    pub(crate) debounce: Duration,
}

/// Form configuration.
#[derive(Clone, Default)]
pub struct FormOptions {
    /// Initial values. Takes precedence over `default_state.values`.
    pub default_values: Option<Arc<Value>>,
    /// Initial base state.
    pub default_state: Option<DefaultFormState>,
    /// Run async validators even when sync validation failed.
    pub async_always: bool,
    /// Debounce for async validators without their own, in milliseconds.
    pub async_debounce_ms: Option<u64>,
    /// Runs schema validators.
    pub validator_adapter: Option<Arc<dyn ValidatorAdapter>>,
    /// Form-level validators.
    pub validators: FormValidators,
    /// Submit callback.
    pub on_submit: Option<SubmitFn>,
    /// Invalid-submit callback.
    pub on_submit_invalid: Option<SubmitInvalidFn>,
    /// Derived-state transform.
    pub transform: Option<FormTransform>,
}

impl FormOptions {
    /// Options with the given default values.
    pub fn new(default_values: Value) -> Self {
        Self::default().with_default_values(default_values)
    }

    /// Lift declarative settings into options.
    pub fn from_settings(settings: FormSettings) -> Result<Self> {
        settings.validate()?;
        let FormSettings {
            default_values,
            default_state,
            async_always,
            async_debounce_ms,
            on_change_async_debounce_ms,
            on_blur_async_debounce_ms,
        } = settings;
        Ok(Self {
            default_values: default_values.map(Arc::new),
            default_state,
            async_always,
            async_debounce_ms,
            validators: FormValidators {
                on_change_async_debounce_ms,
                on_blur_async_debounce_ms,
                ..FormValidators::default()
            },
            ..Self::default()
        })
    }

    /// Set default values.
    pub fn with_default_values(mut self, values: Value) -> Self {
        self.default_values = Some(Arc::new(values));
        self
    }

    /// Set the default base state.
    pub fn with_default_state(mut self, state: DefaultFormState) -> Self {
        self.default_state = Some(state);
        self
    }

    /// Run async validators even after sync errors.
    pub fn with_async_always(mut self, async_always: bool) -> Self {
        self.async_always = async_always;
        self
    }

    /// Set the fallback async debounce.
    pub fn with_async_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.async_debounce_ms = Some(debounce_ms);
        self
    }

    /// Set the validator adapter.
    pub fn with_validator_adapter(mut self, adapter: Arc<dyn ValidatorAdapter>) -> Self {
        self.validator_adapter = Some(adapter);
        self
    }

    /// Set the validators.
    pub fn with_validators(mut self, validators: FormValidators) -> Self {
        self.validators = validators;
        self
    }

    /// Set the submit callback.
    pub fn with_on_submit<F, Fut>(mut self, on_submit: F) -> Self
    where
        F: Fn(SubmitArgs) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.on_submit = Some(Arc::new(
            move |args: SubmitArgs| -> BoxFuture<'static, std::result::Result<(), BoxError>> {
                Box::pin(on_submit(args))
            },
        ));
        self
    }

    /// Set the invalid-submit callback.
    pub fn with_on_submit_invalid<F>(mut self, on_submit_invalid: F) -> Self
    where
        F: Fn(SubmitArgs) + Send + Sync + 'static,
    {
        self.on_submit_invalid = Some(Arc::new(on_submit_invalid));
        self
    }

    /// Set the derived-state transform.
    pub fn with_transform(mut self, transform: FormTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Sync validators to run for `cause`, in order.
    ///
    /// Submit also runs the change and blur validators. Every cause except
    /// mount ends by clearing the server slot.
    pub(crate) fn sync_checks(&self, cause: ValidationCause) -> Vec<SyncCheck> {
        let v = &self.validators;
        let configured = |cause: ValidationCause, validator: &Option<FormValidator>| {
            validator
                .clone()
                .map(|validator| SyncCheck::Configured(cause, validator))
        };

        let mut checks: Vec<SyncCheck> = match cause {
            ValidationCause::Mount => {
                return configured(ValidationCause::Mount, &v.on_mount).into_iter().collect();
            }
            ValidationCause::Submit => [
                configured(ValidationCause::Change, &v.on_change),
                configured(ValidationCause::Blur, &v.on_blur),
                configured(ValidationCause::Submit, &v.on_submit),
            ]
            .into_iter()
            .flatten()
            .collect(),
            ValidationCause::Blur => configured(ValidationCause::Blur, &v.on_blur).into_iter().collect(),
            ValidationCause::Change => configured(ValidationCause::Change, &v.on_change).into_iter().collect(),
            ValidationCause::Server => Vec::new(),
        };
        checks.push(SyncCheck::ClearServer);
        checks
    }

    /// Async validators to run for `cause`.
    ///
    /// Submit runs the change and blur validators undebounced, then the
    /// submit validator. Mount and server run none.
    pub(crate) fn async_checks(&self, cause: ValidationCause) -> Vec<AsyncCheck> {
        let v = &self.validators;
        let fallback = self.async_debounce_ms.unwrap_or(0);
        let check = |cause: ValidationCause, validator: &Option<FormAsyncValidator>, debounce_ms: u64| {
            validator.clone().map(|validator| AsyncCheck {
                cause,
                validator,
                debounce: Duration::from_millis(debounce_ms),
            })
        };

        match cause {
            ValidationCause::Submit => [
                check(ValidationCause::Change, &v.on_change_async, 0),
                check(ValidationCause::Blur, &v.on_blur_async, 0),
                check(ValidationCause::Submit, &v.on_submit_async, 0),
            ]
            .into_iter()
            .flatten()
            .collect(),
            ValidationCause::Blur => check(
                ValidationCause::Blur,
                &v.on_blur_async,
                v.on_blur_async_debounce_ms.unwrap_or(fallback),
            )
            .into_iter()
            .collect(),
            ValidationCause::Change => check(
                ValidationCause::Change,
                &v.on_change_async,
                v.on_change_async_debounce_ms.unwrap_or(fallback),
            )
            .into_iter()
            .collect(),
            ValidationCause::Mount | ValidationCause::Server => Vec::new(),
        }
    }
}

impl fmt::Debug for FormOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormOptions")
            .field("default_values", &self.default_values)
            .field("default_state", &self.default_state)
            .field("async_always", &self.async_always)
            .field("async_debounce_ms", &self.async_debounce_ms)
            .field("validator_adapter", &self.validator_adapter.is_some())
            .field("validators", &self.validators)
            .field("on_submit", &self.on_submit.is_some())
            .field("on_submit_invalid", &self.on_submit_invalid.is_some())
            .field("transform", &self.transform)
            .finish()
    }
}

/// Options used by the mutation API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateMetaOptions {
    /// Leave touched/dirty flags and mount errors alone.
    pub dont_update_meta: bool,
}

/// Declarative form settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormSettings {
    /// Initial values.
    pub default_values: Option<Value>,
    /// Initial base state.
    pub default_state: Option<DefaultFormState>,
    /// Run async validators even when sync validation failed.
    pub async_always: bool,
    /// Fallback async debounce in milliseconds.
    pub async_debounce_ms: Option<u64>,
    /// Async change debounce in milliseconds.
    pub on_change_async_debounce_ms: Option<u64>,
    /// Async blur debounce in milliseconds.
    pub on_blur_async_debounce_ms: Option<u64>,
}

impl FormSettings {
    /// Parse settings from JSON and validate them.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| FormError::invalid_settings(format!("invalid JSON: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check the settings are consistent.
    pub fn validate(&self) -> Result<()> {
        let values = [
            ("defaultValues", self.default_values.as_ref()),
            (
                "defaultState.values",
                self.default_state.as_ref().and_then(|state| state.values.as_ref()),
            ),
        ];
        for (name, value) in values {
            if let Some(value) = value {
                if !value.is_object() && !value.is_array() {
                    return Err(FormError::invalid_settings(format!(
                        "{name} must be a JSON object or array"
                    )));
                }
            }
        }
        Ok(())
    }
}
