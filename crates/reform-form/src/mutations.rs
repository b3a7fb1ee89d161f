//! Value mutations.
//!
//! Array operations rewrite the array at a path in one write and then
//! revalidate the array field plus every registered field whose position
//! may have shifted.

use std::future::IntoFuture;
use std::sync::Arc;

use futures::future::join_all;
use reform_core::batch;
use serde_json::Value;
use tracing::debug;

use crate::errors::{FormError, Result};
use crate::form::FormApi;
use crate::meta::FieldMetaBase;
use crate::options::UpdateMetaOptions;
use crate::path::{delete_by, index_path, is_within, set_by};
use crate::state::BaseFormState;
use crate::types::{ErrorMapKey, ValidationCause};

impl FormApi {
    /// Replace the value at `field` with `updater(current)`.
    ///
    /// Unless `opts.dont_update_meta` is set the field becomes touched and
    /// dirty and loses its mount error. Fails with
    /// [`FormError::IndexTooFar`] when `field` addresses an array index far
    /// past the end; nothing is written then.
    pub fn set_field_value<F>(&self, field: &str, updater: F, opts: UpdateMetaOptions) -> Result<()>
    where
        F: FnOnce(&Value) -> Value,
    {
        batch(|| {
            self.try_set_base_state(|prev| {
                let mut values = (*prev.values).clone();
                set_by(&mut values, field, updater)?;
                Ok(BaseFormState {
                    values: Arc::new(values),
                    ..prev.clone()
                })
            })?;

            if !opts.dont_update_meta {
                self.set_field_meta(field, |prev| {
                    let error_map = if prev.error_map.on_mount.is_some() {
                        Arc::new(prev.error_map.with(ErrorMapKey::OnMount, None))
                    } else {
                        prev.error_map.clone()
                    };
                    FieldMetaBase {
                        is_touched: true,
                        is_dirty: true,
                        error_map,
                        ..prev
                    }
                });
            }
            Ok(())
        })
    }

    /// Remove `field` from values, meta and the registry in one go.
    pub fn delete_field(&self, field: &str) {
        debug!(field, "deleting field");
        self.set_base_state(|prev| {
            let mut values = (*prev.values).clone();
            delete_by(&mut values, field);
            let mut field_meta_base = (*prev.field_meta_base).clone();
            field_meta_base.remove(field);
            BaseFormState {
                values: Arc::new(values),
                field_meta_base: Arc::new(field_meta_base),
                ..prev.clone()
            }
        });
        self.inner.field_info.lock().remove(field);
    }

    /// Append `value` to the array at `field`. A missing array starts empty.
    pub async fn push_field_value(&self, field: &str, value: Value, opts: UpdateMetaOptions) -> Result<()> {
        let mut items = self.array_items(field)?.unwrap_or_default();
        items.push(value);
        self.set_field_value(field, move |_| Value::Array(items), opts)?;
        self.validate_field(field, ValidationCause::Change).await;
        Ok(())
    }

    /// Insert `value` at `index`, clamped to the array length.
    pub async fn insert_field_value(
        &self,
        field: &str,
        index: usize,
        value: Value,
        opts: UpdateMetaOptions,
    ) -> Result<()> {
        let mut items = self.array_items(field)?.unwrap_or_default();
        let index = index.min(items.len());
        items.insert(index, value);
        self.set_field_value(field, move |_| Value::Array(items), opts)?;
        self.validate_field(field, ValidationCause::Change).await;
        Ok(())
    }

    /// Overwrite element `index`. Out of range leaves the array as is but
    /// still revalidates.
    pub async fn replace_field_value(
        &self,
        field: &str,
        index: usize,
        value: Value,
        opts: UpdateMetaOptions,
    ) -> Result<()> {
        let mut items = self.array_items(field)?.unwrap_or_default();
        if let Some(slot) = items.get_mut(index) {
            *slot = value;
        }
        self.set_field_value(field, move |_| Value::Array(items), opts)?;

        self.validate_field(field, ValidationCause::Change).await;
        self.validate_array_fields_starting_from(field, index, ValidationCause::Change)
            .await;
        Ok(())
    }

    /// Remove element `index`.
    ///
    /// Registered fields under the array's former last element are deleted,
    /// since after the shift no element lives there. An index past the end
    /// is [`FormError::IndexOutOfBounds`] and changes nothing.
    pub async fn remove_field_value(&self, field: &str, index: usize, opts: UpdateMetaOptions) -> Result<()> {
        let mut items = self.array_items(field)?.unwrap_or_default();
        check_bounds(field, &items, [index])?;
        let last_index = items.len() - 1;
        items.remove(index);
        self.set_field_value(field, move |_| Value::Array(items), opts)?;

        let vacated = index_path(field, last_index);
        let stale: Vec<String> = self
            .inner
            .field_info
            .lock()
            .keys()
            .filter(|key| is_within(key, &vacated))
            .cloned()
            .collect();
        for stale_field in &stale {
            self.delete_field(stale_field);
        }

        self.validate_field(field, ValidationCause::Change).await;
        self.validate_array_fields_starting_from(field, index, ValidationCause::Change)
            .await;
        Ok(())
    }

    /// Swap elements `index_a` and `index_b`.
    pub async fn swap_field_values(
        &self,
        field: &str,
        index_a: usize,
        index_b: usize,
        opts: UpdateMetaOptions,
    ) -> Result<()> {
        let mut items = self.array_items(field)?.unwrap_or_default();
        check_bounds(field, &items, [index_a, index_b])?;
        items.swap(index_a, index_b);
        self.set_field_value(field, move |_| Value::Array(items), opts)?;
        self.validate_moved(field, index_a, index_b).await;
        Ok(())
    }

    /// Move element `index_a` to `index_b`, shifting the ones in between.
    pub async fn move_field_values(
        &self,
        field: &str,
        index_a: usize,
        index_b: usize,
        opts: UpdateMetaOptions,
    ) -> Result<()> {
        let mut items = self.array_items(field)?.unwrap_or_default();
        check_bounds(field, &items, [index_a, index_b])?;
        let moved = items.remove(index_a);
        items.insert(index_b, moved);
        self.set_field_value(field, move |_| Value::Array(items), opts)?;
        self.validate_moved(field, index_a, index_b).await;
        Ok(())
    }

    /// The array at `field`, or `None` if nothing is stored there.
    fn array_items(&self, field: &str) -> Result<Option<Vec<Value>>> {
        match self.get_field_value(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => Ok(Some(items)),
            Some(_) => Err(FormError::not_an_array(field)),
        }
    }

    async fn validate_moved(&self, field: &str, index_a: usize, index_b: usize) {
        let pending = batch(|| {
            vec![
                self.validate_field(field, ValidationCause::Change),
                self.validate_field(&index_path(field, index_a), ValidationCause::Change),
                self.validate_field(&index_path(field, index_b), ValidationCause::Change),
            ]
        });
        join_all(pending.into_iter().map(IntoFuture::into_future)).await;
    }
}

fn check_bounds<const N: usize>(field: &str, items: &[Value], indices: [usize; N]) -> Result<()> {
    match indices.into_iter().find(|index| *index >= items.len()) {
        Some(index) => Err(FormError::index_out_of_bounds(field, index, items.len())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::FormOptions;
    use serde_json::json;

    fn form(values: Value) -> FormApi {
        FormApi::new(FormOptions::new(values))
    }

    #[test]
    fn set_field_value_marks_meta_and_drops_mount_error() {
        let form = form(json!({ "name": "" }));
        form.set_field_meta("name", |meta| FieldMetaBase {
            error_map: Arc::new(meta.error_map.with(ErrorMapKey::OnMount, Some(vec![json!("required")]))),
            ..meta
        });

        form.set_field_value("name", |_| json!("ada"), UpdateMetaOptions::default()).unwrap();
        let meta = form.get_field_meta("name").unwrap();
        assert!(meta.is_touched && meta.is_dirty);
        assert!(meta.error_map.on_mount.is_none());
        assert_eq!(form.get_field_value("name"), Some(json!("ada")));
    }

    #[test]
    fn dont_update_meta_leaves_meta_alone() {
        let form = form(json!({}));
        form.set_field_value(
            "nested.count",
            |current| json!(current.as_u64().unwrap_or(0) + 1),
            UpdateMetaOptions { dont_update_meta: true },
        )
        .unwrap();
        assert_eq!(form.get_field_value("nested.count"), Some(json!(1)));
        assert!(form.get_field_meta("nested.count").is_none());
    }

    #[test]
    fn far_index_write_is_refused_without_side_effects() {
        let form = form(json!({ "items": [1, 2] }));
        let version = form.inner.base_store.version();

        let err = form
            .set_field_value("items[18446744073709551615]", |_| json!(0), UpdateMetaOptions::default())
            .unwrap_err();
        assert!(matches!(err, FormError::IndexTooFar { len: 2, .. }));
        assert_eq!(form.get_field_value("items"), Some(json!([1, 2])));
        assert!(form.get_field_meta("items[18446744073709551615]").is_none());
        assert_eq!(form.inner.base_store.version(), version);
    }

    #[test]
    fn delete_field_clears_value_meta_and_registry() {
        let form = form(json!({ "a": 1, "b": 2 }));
        form.set_field_value("a", |_| json!(3), UpdateMetaOptions::default()).unwrap();
        form.get_field_info("a");

        form.delete_field("a");
        assert_eq!(*form.base_state().values, json!({ "b": 2 }));
        assert!(form.get_field_meta("a").is_none());
        assert!(form.registered_fields().is_empty());
    }

    #[tokio::test]
    async fn array_operations_rewrite_the_array() {
        let form = form(json!({ "items": [1, 2, 3] }));
        let none = UpdateMetaOptions::default();

        form.push_field_value("items", json!(4), none).await.unwrap();
        form.insert_field_value("items", 99, json!(5), none).await.unwrap();
        form.insert_field_value("items", 0, json!(0), none).await.unwrap();
        assert_eq!(form.get_field_value("items"), Some(json!([0, 1, 2, 3, 4, 5])));

        form.replace_field_value("items", 1, json!(10), none).await.unwrap();
        form.remove_field_value("items", 0, none).await.unwrap();
        assert_eq!(form.get_field_value("items"), Some(json!([10, 2, 3, 4, 5])));

        form.swap_field_values("items", 0, 4, none).await.unwrap();
        assert_eq!(form.get_field_value("items"), Some(json!([5, 2, 3, 4, 10])));

        form.move_field_values("items", 4, 1, none).await.unwrap();
        assert_eq!(form.get_field_value("items"), Some(json!([5, 10, 2, 3, 4])));
    }

    #[tokio::test]
    async fn push_onto_missing_array_creates_it() {
        let form = form(json!({}));
        form.push_field_value("tags", json!("a"), UpdateMetaOptions::default())
            .await
            .unwrap();
        assert_eq!(form.get_field_value("tags"), Some(json!(["a"])));
    }

    #[tokio::test]
    async fn array_operations_reject_non_arrays() {
        let form = form(json!({ "name": "ada" }));
        let err = form
            .push_field_value("name", json!(1), UpdateMetaOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FormError::NotAnArray { .. }));
    }

    #[tokio::test]
    async fn remove_out_of_bounds_keeps_the_last_element() {
        let form = form(json!({ "items": [1, 2, 3] }));
        form.get_field_info("items[2]");

        let err = form
            .remove_field_value("items", 5, UpdateMetaOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FormError::IndexOutOfBounds { index: 5, len: 3, .. }));
        assert_eq!(form.get_field_value("items"), Some(json!([1, 2, 3])));
        assert!(form.registered_fields().contains(&"items[2]".to_string()));

        let err = form
            .remove_field_value("missing", 0, UpdateMetaOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FormError::IndexOutOfBounds { index: 0, len: 0, .. }));
    }

    #[tokio::test]
    async fn swap_out_of_bounds_is_an_error() {
        let form = form(json!({ "items": [1, 2] }));
        let err = form
            .swap_field_values("items", 0, 2, UpdateMetaOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FormError::IndexOutOfBounds { index: 2, len: 2, .. }));
        assert_eq!(form.get_field_value("items"), Some(json!([1, 2])));
    }
}
