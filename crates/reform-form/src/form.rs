//! The form engine.
//!
//! [`FormApi`] owns one form: a base [`Store`], two derived nodes computed
//! from it (field meta, then the public form state), the field registry and
//! the options. Clones are handles to the same form.
//!
//! Validation lives in `validation.rs`, value mutations in `mutations.rs`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use reform_core::{batch, DeriveArgs, Derived, ListenerId, MountGuard, Store};
use serde_json::Value;
use tracing::debug;

use crate::errors::{FormError, Result};
use crate::field::{FieldHandle, FieldInfo};
use crate::meta::{derive_field_meta, FieldMeta, FieldMetaBase, FieldMetaBaseMap, FieldMetaMap};
use crate::options::{FormOptions, SubmitArgs};
use crate::path::get_by;
use crate::state::{derive_form_state, BaseFormState, FormState, TransformGate};
use crate::types::{ErrorMapKey, FormErrorMap, ValidationCause};

pub(crate) type BaseStore = Store<BaseFormState>;
type FieldMetaNode = Derived<(BaseStore,), FieldMetaMap>;
type FormStateNode = Derived<(BaseStore, FieldMetaNode), FormState>;

pub(crate) struct FormInner {
    pub(crate) options: Arc<RwLock<FormOptions>>,
    pub(crate) base_store: BaseStore,
    field_meta: FieldMetaNode,
    store: FormStateNode,
    pub(crate) field_info: Mutex<BTreeMap<String, FieldInfo>>,
    /// Fields each slot's last form-level validation wrote errors to.
    pub(crate) form_field_errors: Mutex<BTreeMap<ErrorMapKey, BTreeSet<String>>>,
}

/// Handle to a form.
#[derive(Clone)]
pub struct FormApi {
    pub(crate) inner: Arc<FormInner>,
}

impl FormApi {
    /// Create a form. Nothing is validated until [`FormApi::mount`].
    pub fn new(options: FormOptions) -> Self {
        let mut base = BaseFormState::from_defaults(
            options.default_state.as_ref(),
            options.default_values.clone(),
        );
        base.settle_mount_error();
        let base_store = Store::new(base);
        let options = Arc::new(RwLock::new(options));

        let field_meta = Derived::new(
            (base_store.clone(),),
            |args: DeriveArgs<(BaseStore,), FieldMetaMap>| {
                let (curr,) = &args.curr_dep_vals;
                let prev_base = args
                    .prev_dep_vals
                    .as_ref()
                    .map(|(prev,)| &prev.field_meta_base);
                derive_field_meta(prev_base, &curr.field_meta_base, args.prev_val.as_ref())
            },
        );

        let gate = TransformGate::default();
        let transform_options = options.clone();
        let store = Derived::new(
            (base_store.clone(), field_meta.clone()),
            move |args: DeriveArgs<(BaseStore, FieldMetaNode), FormState>| {
                let (curr, field_meta) = &args.curr_dep_vals;
                let prev_base = args.prev_dep_vals.as_ref().map(|(prev, _)| &**prev);
                let transform = transform_options.read().transform.clone();
                Arc::new(derive_form_state(
                    prev_base,
                    curr,
                    field_meta.clone(),
                    args.prev_val.as_deref(),
                    &gate,
                    transform.as_ref(),
                ))
            },
        );

        Self {
            inner: Arc::new(FormInner {
                options,
                base_store,
                field_meta,
                store,
                field_info: Mutex::new(BTreeMap::new()),
                form_field_errors: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Current options.
    pub fn options(&self) -> FormOptions {
        self.inner.options.read().clone()
    }

    /// Current public state.
    pub fn state(&self) -> Arc<FormState> {
        self.inner.store.state()
    }

    /// Current base state.
    pub fn base_state(&self) -> Arc<BaseFormState> {
        self.inner.base_store.state()
    }

    /// Listen for public state changes. Delivered while mounted.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.store.subscribe(listener)
    }

    /// Remove a listener added with [`FormApi::subscribe`].
    pub fn unsubscribe(&self, id: ListenerId) {
        self.inner.store.unsubscribe(id);
    }

    /// Start pushing state changes to subscribers and run the mount
    /// validator, if any.
    ///
    /// Dropping the returned guard unmounts.
    pub fn mount(&self) -> Result<MountGuard> {
        let guard = MountGuard::join(vec![self.inner.field_meta.mount(), self.inner.store.mount()]);
        let has_mount_validator = self.inner.options.read().validators.on_mount.is_some();
        if has_mount_validator {
            self.validate_sync(ValidationCause::Mount)?;
        }
        Ok(guard)
    }

    /// Replace the options.
    ///
    /// Changed default values or default state are applied to the base
    /// state only while no field is touched.
    pub fn update(&self, options: FormOptions) {
        let old = std::mem::replace(&mut *self.inner.options.write(), options.clone());
        let is_touched = self.state().is_touched;

        let should_update_values = options.default_values.is_some()
            && options.default_values != old.default_values
            && !is_touched;
        let should_update_state = options.default_state != old.default_state && !is_touched;
        if !should_update_values && !should_update_state {
            return;
        }

        debug!(should_update_values, should_update_state, "applying new form defaults");
        self.set_base_state(|prev| {
            let mut next = prev.clone();
            if let (true, Some(defaults)) = (should_update_state, &options.default_state) {
                next.apply_defaults(defaults);
            }
            if let (true, Some(values)) = (should_update_values, &options.default_values) {
                next.values = values.clone();
            }
            next
        });
    }

    /// Reset values and meta to the defaults.
    pub fn reset(&self) {
        self.reset_with(None, false);
    }

    /// Reset to `values`. Unless `keep_default_values` is set, `values`
    /// also become the new default values.
    pub fn reset_to(&self, values: Value, keep_default_values: bool) {
        self.reset_with(Some(Arc::new(values)), keep_default_values);
    }

    fn reset_with(&self, values: Option<Arc<Value>>, keep_default_values: bool) {
        let field_meta_base = self.reset_field_meta(&self.state().field_meta);

        if let (Some(values), false) = (&values, keep_default_values) {
            self.inner.options.write().default_values = Some(values.clone());
        }
        let options = self.options();

        let mut next = BaseFormState::from_defaults(
            options.default_state.as_ref(),
            values.or(options.default_values),
        );
        next.field_meta_base = Arc::new(field_meta_base);
        next.settle_mount_error();

        self.inner.form_field_errors.lock().clear();
        self.inner.base_store.replace(Arc::new(next));
    }

    /// Pristine raw meta for every field in `field_meta`.
    pub fn reset_field_meta(&self, field_meta: &FieldMetaMap) -> FieldMetaBaseMap {
        field_meta
            .keys()
            .map(|field| (field.clone(), FieldMetaBase::default()))
            .collect()
    }

    /// Value at `field`.
    pub fn get_field_value(&self, field: &str) -> Option<Value> {
        get_by(&self.inner.base_store.state().values, field).cloned()
    }

    /// Public meta of `field`.
    pub fn get_field_meta(&self, field: &str) -> Option<FieldMeta> {
        self.inner.field_meta.state().get(field).cloned()
    }

    /// Registry entry for `field`, created if missing.
    pub fn get_field_info(&self, field: &str) -> FieldInfo {
        self.inner
            .field_info
            .lock()
            .entry(field.to_string())
            .or_default()
            .clone()
    }

    /// Attach a live field handle to `field`. The form keeps it weakly.
    pub fn register_field(&self, field: &str, handle: &Arc<dyn FieldHandle>) {
        self.inner
            .field_info
            .lock()
            .entry(field.to_string())
            .or_default()
            .instance = Some(Arc::downgrade(handle));
    }

    /// Paths with a registry entry.
    pub fn registered_fields(&self) -> Vec<String> {
        self.inner.field_info.lock().keys().cloned().collect()
    }

    /// Live handle of `field`, if any.
    pub(crate) fn field_handle(&self, field: &str) -> Option<Arc<dyn FieldHandle>> {
        self.inner.field_info.lock().get(field).and_then(FieldInfo::handle)
    }

    /// Every live field handle.
    pub(crate) fn live_handles(&self) -> Vec<Arc<dyn FieldHandle>> {
        self.inner
            .field_info
            .lock()
            .values()
            .filter_map(FieldInfo::handle)
            .collect()
    }

    /// Commit a base-state write. Every write goes through here so a touched
    /// form never keeps its mount error.
    pub(crate) fn set_base_state<F>(&self, updater: F)
    where
        F: FnOnce(&BaseFormState) -> BaseFormState,
    {
        self.inner.base_store.set_state(|prev| {
            let mut next = updater(prev);
            next.settle_mount_error();
            next
        });
    }

    /// Fallible [`FormApi::set_base_state`]. A refused write commits
    /// nothing.
    pub(crate) fn try_set_base_state<F>(&self, updater: F) -> Result<()>
    where
        F: FnOnce(&BaseFormState) -> Result<BaseFormState>,
    {
        self.inner.base_store.try_set_state(|prev| {
            let mut next = updater(prev)?;
            next.settle_mount_error();
            Ok(next)
        })
    }

    /// Update the raw meta of `field`. Missing meta starts from the
    /// default.
    pub fn set_field_meta<F>(&self, field: &str, updater: F)
    where
        F: FnOnce(FieldMetaBase) -> FieldMetaBase,
    {
        self.set_base_state(|prev| {
            let mut metas = (*prev.field_meta_base).clone();
            let current = metas.get(field).cloned().unwrap_or_default();
            metas.insert(field.to_string(), updater(current));
            BaseFormState {
                field_meta_base: Arc::new(metas),
                ..prev.clone()
            }
        });
    }

    /// Merge `error_map` into the form-level error map. Slots empty in
    /// `error_map` are left alone.
    pub fn set_error_map(&self, error_map: FormErrorMap) {
        self.set_base_state(|prev| {
            let mut merged = (*prev.error_map).clone();
            merged.merge(error_map);
            BaseFormState {
                error_map: Arc::new(merged),
                ..prev.clone()
            }
        });
    }

    fn set_submitting(&self, is_submitting: bool) {
        self.set_base_state(|prev| BaseFormState {
            is_submitting,
            ..prev.clone()
        });
    }

    /// Validate and submit.
    ///
    /// Returns without submitting when the form cannot submit or turns out
    /// invalid; the latter calls `on_submit_invalid`. A failing submit
    /// callback is returned as [`FormError::Submit`] after `is_submitting`
    /// is reset.
    pub async fn handle_submit(&self) -> Result<()> {
        self.set_base_state(|prev| BaseFormState {
            is_submitted: false,
            submission_attempts: prev.submission_attempts + 1,
            ..prev.clone()
        });

        if !self.state().can_submit {
            debug!("submit blocked: form cannot submit");
            return Ok(());
        }

        self.set_submitting(true);

        self.validate_all_fields(ValidationCause::Submit).await;
        let form_validation = match self.validate(ValidationCause::Submit) {
            Ok(pending) => pending,
            Err(err) => {
                self.set_submitting(false);
                return Err(err);
            }
        };
        form_validation.await;

        let state = self.state();
        if !state.is_valid {
            self.set_submitting(false);
            debug!("submit blocked: form is invalid");
            let on_submit_invalid = self.inner.options.read().on_submit_invalid.clone();
            if let Some(on_submit_invalid) = on_submit_invalid {
                on_submit_invalid(SubmitArgs {
                    value: state.values.clone(),
                    form: self.clone(),
                });
            }
            return Ok(());
        }

        let handles = self.live_handles();
        batch(|| {
            for handle in &handles {
                handle.on_submit();
            }
        });

        let on_submit = self.inner.options.read().on_submit.clone();
        if let Some(on_submit) = on_submit {
            let args = SubmitArgs {
                value: state.values.clone(),
                form: self.clone(),
            };
            if let Err(err) = on_submit(args).await {
                self.set_submitting(false);
                return Err(FormError::Submit(err));
            }
        }

        batch(|| {
            self.set_base_state(|prev| BaseFormState {
                is_submitted: true,
                ..prev.clone()
            });
            self.set_submitting(false);
        });
        Ok(())
    }
}

impl fmt::Debug for FormApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("FormApi")
            .field("values", &state.values)
            .field("is_valid", &state.is_valid)
            .field("can_submit", &state.can_submit)
            .field("fields", &self.inner.field_info.lock().len())
            .finish_non_exhaustive()
    }
}
