//! Field layer seam and in-flight validation bookkeeping.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use reform_core::{CancellationSource, WatchCancellationToken};
use tracing::debug;

use crate::meta::FieldMetaBase;
use crate::types::{ErrorMap, ErrorMapKey, ValidationCause, ValidationError};

/// A result that may already be available or may still be pending.
///
/// Validation is synchronous when it can short-circuit and asynchronous
/// otherwise; callers `.await` either way.
pub enum Pending<T> {
    /// Already resolved.
    Ready(T),
    /// Still running.
    Waiting(BoxFuture<'static, T>),
}

impl<T> Pending<T> {
    /// Wrap a future.
    pub fn waiting<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self::Waiting(Box::pin(future))
    }

    /// Whether the result is already available.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The resolved value, if already available.
    pub fn into_ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Waiting(_) => None,
        }
    }
}

impl<T: Send + 'static> IntoFuture for Pending<T> {
    type Output = T;
    type IntoFuture = BoxFuture<'static, T>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Self::Ready(value) => futures::future::ready(value).boxed(),
            Self::Waiting(future) => future,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Waiting(_) => f.write_str("Waiting"),
        }
    }
}

/// A live field owned by a UI binding.
///
/// The form holds handles weakly and only calls into them; it never
/// creates them.
pub trait FieldHandle: Send + Sync {
    /// Run the field's own validation for `cause`.
    fn validate(&self, cause: ValidationCause) -> Pending<Vec<ValidationError>>;

    /// Current raw meta.
    fn meta(&self) -> FieldMetaBase;

    /// Update the raw meta.
    fn set_meta(&self, update: &dyn Fn(&FieldMetaBase) -> FieldMetaBase);

    /// Submit listener, called for every registered field right before the
    /// submit callback.
    fn on_submit(&self) {}
}

/// One outstanding async validation.
#[derive(Debug)]
pub struct ValidationMeta {
    source: CancellationSource,
}

impl ValidationMeta {
    fn new() -> Self {
        Self {
            source: CancellationSource::new(),
        }
    }

    /// Signal the validation that it has been superseded.
    pub fn cancel(&self) {
        self.source.cancel();
    }

    /// Whether the validation has been superseded.
    pub fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }
}

/// Latest in-flight validation per error-map slot.
///
/// Starting a validation for a slot cancels whatever was in flight for that
/// slot. Clones share the same map.
#[derive(Clone, Default)]
pub struct ValidationMetaMap {
    slots: Arc<Mutex<ErrorMap<Arc<ValidationMeta>>>>,
}

impl ValidationMetaMap {
    /// Supersede the slot's in-flight validation and record a new one.
    pub fn start(&self, key: ErrorMapKey) -> (Arc<ValidationMeta>, WatchCancellationToken) {
        let meta = Arc::new(ValidationMeta::new());
        let token = meta.source.token();
        let previous = self.slots.lock().slot_mut(key).replace(meta.clone());
        if let Some(previous) = previous {
            debug!(?key, "superseding in-flight validation");
            previous.cancel();
        }
        (meta, token)
    }

    /// Forget `meta` once its validation settled, unless a newer one
    /// replaced it already.
    pub fn settle(&self, key: ErrorMapKey, meta: &Arc<ValidationMeta>) {
        let mut slots = self.slots.lock();
        let slot = slots.slot_mut(key);
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, meta)) {
            *slot = None;
        }
    }

    /// The in-flight validation for `key`, if any.
    pub fn get(&self, key: ErrorMapKey) -> Option<Arc<ValidationMeta>> {
        self.slots.lock().get(key).cloned()
    }
}

impl fmt::Debug for ValidationMetaMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        let pending: Vec<ErrorMapKey> = slots.iter().map(|(key, _)| key).collect();
        f.debug_struct("ValidationMetaMap")
            .field("pending", &pending)
            .finish()
    }
}

/// Registry entry for one field path.
#[derive(Clone, Default)]
pub struct FieldInfo {
    /// The live handle, if a binding registered one.
    pub instance: Option<Weak<dyn FieldHandle>>,
    /// In-flight validations for this field.
    pub validation_meta_map: ValidationMetaMap,
}

impl FieldInfo {
    /// Upgrade the handle, if it is still alive.
    pub fn handle(&self) -> Option<Arc<dyn FieldHandle>> {
        self.instance.as_ref().and_then(Weak::upgrade)
    }
}

impl fmt::Debug for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldInfo")
            .field("live", &self.handle().is_some())
            .field("validation_meta_map", &self.validation_meta_map)
            .finish()
    }
}
