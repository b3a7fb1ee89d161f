//! Shared helpers for reform-form integration tests.
//!
//! [`RecordingField`] stands in for a UI field binding: it validates its own
//! value with a plain rule, stores the result in its meta and records every
//! call the form makes into it.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use reform_form::{
    ErrorMapKey, FieldHandle, FieldMetaBase, FormApi, Pending, ValidationCause, ValidationError,
};
use serde_json::{json, Value};

/// Install a test subscriber once. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Rule = Box<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Field binding double.
pub struct RecordingField {
    form: FormApi,
    path: String,
    rule: Rule,
    calls: Mutex<Vec<ValidationCause>>,
    submits: AtomicUsize,
}

impl RecordingField {
    /// Causes this field was validated with, in order.
    pub fn calls(&self) -> Vec<ValidationCause> {
        self.calls.lock().clone()
    }

    /// Number of validations so far.
    pub fn validation_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of submit notifications.
    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl FieldHandle for RecordingField {
    fn validate(&self, cause: ValidationCause) -> Pending<Vec<ValidationError>> {
        self.calls.lock().push(cause);

        let value = self.form.get_field_value(&self.path).unwrap_or(Value::Null);
        let errors: Vec<ValidationError> = (self.rule)(&value)
            .map(|message| vec![json!(message)])
            .unwrap_or_default();

        let key: ErrorMapKey = cause.error_map_key();
        let slot = (!errors.is_empty()).then(|| errors.clone());
        self.form.set_field_meta(&self.path, |prev| FieldMetaBase {
            error_map: Arc::new(prev.error_map.with(key, slot)),
            ..prev
        });
        Pending::Ready(errors)
    }

    fn meta(&self) -> FieldMetaBase {
        self.form
            .get_field_meta(&self.path)
            .map(|meta| meta.base())
            .unwrap_or_default()
    }

    fn set_meta(&self, update: &dyn Fn(&FieldMetaBase) -> FieldMetaBase) {
        self.form.set_field_meta(&self.path, |prev| update(&prev));
    }

    fn on_submit(&self) {
        self.submits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Register a field at `path` validated by `rule`, the way a binding does on
/// mount: create its meta, then attach the handle.
pub fn register_field<R>(form: &FormApi, path: &str, rule: R) -> Arc<RecordingField>
where
    R: Fn(&Value) -> Option<String> + Send + Sync + 'static,
{
    let field = Arc::new(RecordingField {
        form: form.clone(),
        path: path.to_string(),
        rule: Box::new(rule),
        calls: Mutex::new(Vec::new()),
        submits: AtomicUsize::new(0),
    });
    form.set_field_meta(path, |meta| meta);
    let handle: Arc<dyn FieldHandle> = field.clone();
    form.register_field(path, &handle);
    field
}

/// A field that never reports errors.
pub fn register_plain_field(form: &FormApi, path: &str) -> Arc<RecordingField> {
    register_field(form, path, |_| None)
}
