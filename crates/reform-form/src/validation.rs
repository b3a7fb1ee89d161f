//! Form-level validation orchestration.
//!
//! A pass runs the validators configured for a cause in order, normalises
//! each result and writes it into the form error map and into the error maps
//! of the fields it names. Writes only happen when a slot actually changes.
//!
//! Async passes register themselves per error-map slot; a newer pass for the
//! same slot cancels the older one, which then writes nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::future::IntoFuture;
use std::sync::Arc;

use futures::future::join_all;
use reform_core::{batch, CancellationToken};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{FormError, Result};
use crate::field::Pending;
use crate::form::FormApi;
use crate::meta::FieldMetaBase;
use crate::normalize::normalize_form_error;
use crate::options::{AsyncCheck, SyncCheck};
use crate::path::{index_path, is_within};
use crate::state::BaseFormState;
use crate::types::{
    ErrorMapKey, FieldsErrorMap, FormErrorEntry, FormValidationError, ValidationCause,
    ValidationError,
};
use crate::validator::{run_async, run_sync, ValidationResult, ValidationSignal, ValidatorAdapter};

/// Outcome of a synchronous validation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncValidation {
    /// Some validator reported a form or field error.
    pub has_errored: bool,
    /// Field errors reported during the pass, per slot.
    pub fields_error_map: FieldsErrorMap,
}

type FieldErrors = BTreeMap<String, Vec<ValidationError>>;

impl FormApi {
    /// Run the sync validators for `cause`.
    ///
    /// A validator that fails outright aborts the pass with
    /// [`FormError::Validator`]; writes from earlier validators remain.
    pub fn validate_sync(&self, cause: ValidationCause) -> Result<SyncValidation> {
        let (checks, adapter) = {
            let options = self.inner.options.read();
            (options.sync_checks(cause), options.validator_adapter.clone())
        };
        debug!(%cause, validators = checks.len(), "running sync validation");

        let mut outcome = SyncValidation::default();
        batch(|| -> Result<()> {
            for check in &checks {
                let check_cause = check.cause();
                let raw = match check {
                    SyncCheck::Configured(_, validator) => {
                        let values = self.inner.base_store.state().values.clone();
                        run_sync(validator, adapter.as_ref(), &values, self)
                            .map_err(|error| FormError::validator(check_cause, error))?
                    }
                    SyncCheck::ClearServer => ValidationResult::Valid,
                };
                let normalized = normalize_form_error(&raw);
                self.apply_validation_result(
                    check_cause.error_map_key(),
                    &normalized,
                    &mut outcome.fields_error_map,
                );
                outcome.has_errored |= !normalized.is_clean();
            }
            Ok(())
        })?;

        // A submit error goes stale once any other pass comes back clean.
        let has_submit_error = self.inner.base_store.state().error_map.on_submit.is_some();
        if has_submit_error && cause != ValidationCause::Submit && !outcome.has_errored {
            self.write_form_error(ErrorMapKey::OnSubmit, None);
        }

        Ok(outcome)
    }

    /// Run the async validators for `cause`.
    ///
    /// Every validator is registered as in flight immediately, superseding
    /// the previous one for its slot. Awaiting the result yields the field
    /// errors reported by validators that were not superseded.
    pub fn validate_async(&self, cause: ValidationCause) -> Pending<FieldsErrorMap> {
        let (checks, adapter) = {
            let options = self.inner.options.read();
            (options.async_checks(cause), options.validator_adapter.clone())
        };
        if checks.is_empty() {
            return Pending::Ready(FieldsErrorMap::new());
        }
        debug!(%cause, validators = checks.len(), "running async validation");

        let base = self.inner.base_store.state();
        if !base.is_form_validating {
            self.set_form_validating(true);
        }
        let meta_map = base.validation_meta_map.clone();

        let tasks: Vec<_> = checks
            .into_iter()
            .map(|check| {
                let key = check.cause.error_map_key();
                let (meta, signal) = meta_map.start(key);
                let form = self.clone();
                let adapter = adapter.clone();
                let meta_map = meta_map.clone();
                async move {
                    let field_errors = form.run_async_check(check, adapter, signal).await;
                    meta_map.settle(key, &meta);
                    field_errors.map(|field_errors| (key, field_errors))
                }
            })
            .collect();

        let form = self.clone();
        Pending::waiting(async move {
            let mut fields_error_map = FieldsErrorMap::new();
            for (key, field_errors) in join_all(tasks).await.into_iter().flatten() {
                for (field, errors) in field_errors {
                    fields_error_map.entry(field).or_default().set(key, Some(errors));
                }
            }
            form.set_form_validating(false);
            fields_error_map
        })
    }

    /// Sync validation, then async validation unless sync validation
    /// errored and `async_always` is off.
    pub fn validate(&self, cause: ValidationCause) -> Result<Pending<FieldsErrorMap>> {
        let SyncValidation {
            has_errored,
            fields_error_map,
        } = self.validate_sync(cause)?;

        if has_errored && !self.inner.options.read().async_always {
            return Ok(Pending::Ready(fields_error_map));
        }
        Ok(self.validate_async(cause))
    }

    /// Validate one registered field, marking it touched first.
    ///
    /// Resolves to no errors when `field` has no live handle.
    pub fn validate_field(&self, field: &str, cause: ValidationCause) -> Pending<Vec<ValidationError>> {
        let Some(handle) = self.field_handle(field) else {
            return Pending::Ready(Vec::new());
        };
        if !handle.meta().is_touched {
            handle.set_meta(&FieldMetaBase::touched);
        }
        handle.validate(cause)
    }

    /// Validate every registered field, marking each touched first.
    pub async fn validate_all_fields(&self, cause: ValidationCause) -> Vec<ValidationError> {
        let handles = self.live_handles();
        debug!(%cause, fields = handles.len(), "validating all fields");

        let pending: Vec<_> = batch(|| {
            handles
                .iter()
                .map(|handle| {
                    if !handle.meta().is_touched {
                        handle.set_meta(&FieldMetaBase::touched);
                    }
                    handle.validate(cause)
                })
                .collect()
        });
        join_all(pending.into_iter().map(IntoFuture::into_future))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Validate every registered field at or below `field[index]` and all
    /// later elements of the array at `field`.
    pub async fn validate_array_fields_starting_from(
        &self,
        field: &str,
        index: usize,
        cause: ValidationCause,
    ) -> Vec<ValidationError> {
        let last_index = match self.get_field_value(field) {
            Some(Value::Array(items)) => items.len().saturating_sub(1),
            _ => 0,
        };
        let prefixes: Vec<String> = std::iter::once(index)
            .chain(index.saturating_add(1)..=last_index)
            .map(|i| index_path(field, i))
            .collect();

        let targets: Vec<String> = self
            .inner
            .field_info
            .lock()
            .keys()
            .filter(|key| prefixes.iter().any(|prefix| is_within(key, prefix)))
            .cloned()
            .collect();
        debug!(field, index, targets = targets.len(), "cascading array validation");

        let pending: Vec<_> = batch(|| {
            targets
                .iter()
                .map(|target| self.validate_field(target, cause))
                .collect()
        });
        join_all(pending.into_iter().map(IntoFuture::into_future))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn run_async_check(
        &self,
        check: AsyncCheck,
        adapter: Option<Arc<dyn ValidatorAdapter>>,
        signal: ValidationSignal,
    ) -> Option<FieldErrors> {
        let key = check.cause.error_map_key();
        if !check.debounce.is_zero() {
            tokio::select! {
                biased;
                _ = signal.cancelled() => {}
                _ = tokio::time::sleep(check.debounce) => {}
            }
        }
        if signal.is_cancelled() {
            debug!(?key, "async validation superseded before it ran");
            return None;
        }

        let values = self.inner.base_store.state().values.clone();
        let raw = match run_async(check.validator, adapter, values, self.clone(), signal).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(cause = %check.cause, %error, "async validator failed");
                ValidationResult::Error(error)
            }
        };

        let normalized = normalize_form_error(&raw);
        let mut fields_error_map = FieldsErrorMap::new();
        batch(|| self.apply_validation_result(key, &normalized, &mut fields_error_map));
        Some(normalized.field_errors.unwrap_or_default())
    }

    /// Write one normalised result into the `key` slots.
    ///
    /// Fields this slot wrote to last time but that are absent now get
    /// their slot cleared.
    fn apply_validation_result(
        &self,
        key: ErrorMapKey,
        normalized: &FormValidationError,
        fields_error_map: &mut FieldsErrorMap,
    ) {
        let no_fields = FieldErrors::new();
        let field_errors = normalized.field_errors.as_ref().unwrap_or(&no_fields);

        let written: BTreeSet<String> = field_errors.keys().cloned().collect();
        let stale: Vec<String> = {
            let mut tracked = self.inner.form_field_errors.lock();
            let previous = tracked.insert(key, written.clone()).unwrap_or_default();
            previous.difference(&written).cloned().collect()
        };

        for (field, errors) in field_errors {
            fields_error_map
                .entry(field.clone())
                .or_default()
                .set(key, Some(errors.clone()));
            self.write_field_error(field, key, Some(errors.clone()));
        }
        for field in &stale {
            self.write_field_error(field, key, None);
        }

        let form_entry = normalized.form_error.clone().map(FormErrorEntry::Errors);
        self.write_form_error(key, form_entry);
    }

    /// Set a field's `key` slot if it differs. Unknown fields are skipped.
    fn write_field_error(&self, field: &str, key: ErrorMapKey, errors: Option<Vec<ValidationError>>) {
        let base = self.inner.base_store.state();
        let Some(meta) = base.field_meta_base.get(field) else {
            return;
        };
        if meta.error_map.get(key) == errors.as_ref() {
            return;
        }
        self.set_field_meta(field, |prev| FieldMetaBase {
            error_map: Arc::new(prev.error_map.with(key, errors)),
            ..prev
        });
    }

    fn write_form_error(&self, key: ErrorMapKey, entry: Option<FormErrorEntry>) {
        if self.inner.base_store.state().error_map.get(key) == entry.as_ref() {
            return;
        }
        self.set_base_state(|prev| BaseFormState {
            error_map: Arc::new(prev.error_map.with(key, entry)),
            ..prev.clone()
        });
    }

    fn set_form_validating(&self, is_form_validating: bool) {
        self.set_base_state(|prev| BaseFormState {
            is_form_validating,
            ..prev.clone()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{FormOptions, FormValidators};
    use crate::validator::{FormAsyncValidator, FormValidator};
    use serde_json::json;

    fn form_with(validators: FormValidators, values: Value) -> FormApi {
        FormApi::new(FormOptions::new(values).with_validators(validators))
    }

    fn name_min_length(values: &Value, _form: &FormApi) -> crate::validator::ValidatorOutcome {
        let name = values["name"].as_str().unwrap_or_default();
        if name.len() < 3 {
            Ok(ValidationResult::fields([("name", json!("too short"))]))
        } else {
            Ok(ValidationResult::Valid)
        }
    }

    #[test]
    fn sync_field_errors_are_written_and_cleared() {
        let form = form_with(
            FormValidators::default().with_on_change(FormValidator::from_fn(name_min_length)),
            json!({ "name": "a" }),
        );
        form.set_field_meta("name", |meta| meta);

        let outcome = form.validate_sync(ValidationCause::Change).unwrap();
        assert!(outcome.has_errored);
        assert_eq!(
            outcome.fields_error_map["name"].on_change,
            Some(vec![json!("too short")])
        );
        assert_eq!(
            *form.get_field_meta("name").unwrap().errors,
            vec![json!("too short")]
        );

        form.set_field_value("name", |_| json!("abcd"), Default::default()).unwrap();
        let outcome = form.validate_sync(ValidationCause::Change).unwrap();
        assert!(!outcome.has_errored);
        assert!(form.get_field_meta("name").unwrap().errors.is_empty());
        assert!(form.state().is_valid);
    }

    #[test]
    fn unchanged_results_do_not_write() {
        let form = form_with(
            FormValidators::default().with_on_change(FormValidator::from_fn(|_, _| {
                Ok(ValidationResult::message("nope"))
            })),
            json!({}),
        );
        form.validate_sync(ValidationCause::Change).unwrap();
        let version = form.inner.base_store.version();
        form.validate_sync(ValidationCause::Change).unwrap();
        assert_eq!(form.inner.base_store.version(), version);
    }

    #[test]
    fn clean_pass_clears_stale_submit_error() {
        let form = form_with(FormValidators::default(), json!({}));
        let mut error_map = crate::types::FormErrorMap::default();
        error_map.on_submit = Some(FormErrorEntry::Errors(vec![json!("server said no")]));
        error_map.on_server = Some(FormErrorEntry::Errors(vec![json!("still no")]));
        form.set_error_map(error_map);

        form.validate_sync(ValidationCause::Change).unwrap();
        let base = form.base_state();
        assert!(base.error_map.on_submit.is_none());
        assert!(base.error_map.on_server.is_none());
    }

    #[test]
    fn failing_sync_validator_is_an_error() {
        let form = form_with(
            FormValidators::default().with_on_blur(FormValidator::from_fn(|_, _| Err(json!("crashed")))),
            json!({}),
        );
        let err = form.validate_sync(ValidationCause::Blur).unwrap_err();
        assert!(matches!(err, FormError::Validator { cause: ValidationCause::Blur, .. }));
    }

    #[tokio::test]
    async fn sync_errors_short_circuit_async() {
        let form = form_with(
            FormValidators::default()
                .with_on_change(FormValidator::from_fn(|_, _| Ok(ValidationResult::message("sync"))))
                .with_on_change_async(FormAsyncValidator::from_fn(|_, _, _| async {
                    Ok(ValidationResult::message("async"))
                })),
            json!({}),
        );
        let pending = form.validate(ValidationCause::Change).unwrap();
        assert!(pending.is_ready());
        pending.await;
        assert_eq!(*form.state().errors, vec![json!("sync")]);
    }

    #[tokio::test]
    async fn async_results_land_in_their_slot() {
        let form = form_with(
            FormValidators::default().with_on_blur_async(FormAsyncValidator::from_fn(|_, _, _| async {
                Ok(ValidationResult::message("taken"))
            })),
            json!({}),
        );
        let pending = form.validate_async(ValidationCause::Blur);
        assert!(form.base_state().is_form_validating);
        pending.await;

        let base = form.base_state();
        assert!(!base.is_form_validating);
        assert_eq!(
            base.error_map.on_blur,
            Some(FormErrorEntry::Errors(vec![json!("taken")]))
        );
    }

    #[test]
    fn no_async_validators_resolve_immediately() {
        let form = form_with(FormValidators::default(), json!({}));
        let pending = form.validate_async(ValidationCause::Change);
        assert!(pending.into_ready().is_some_and(|errors| errors.is_empty()));
        assert!(!form.base_state().is_form_validating);
    }
}
