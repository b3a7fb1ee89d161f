//! Array mutations and the revalidation cascade over registered fields.
#![allow(missing_docs)]

mod support;

use reform_form::{FormApi, FormError, FormOptions, UpdateMetaOptions, ValidationCause};
use serde_json::json;

use support::{init_tracing, register_field, register_plain_field};

fn form_with_items(items: serde_json::Value) -> FormApi {
    FormApi::new(FormOptions::new(json!({ "items": items })))
}

#[tokio::test]
async fn remove_drops_vacated_fields_and_cascades() {
    init_tracing();
    let form = form_with_items(json!([1, 2, 3]));
    let items = register_plain_field(&form, "items");
    let first = register_plain_field(&form, "items[0]");
    let second = register_field(&form, "items[1]", |value| {
        (value != &json!(3)).then(|| "expected the shifted value".to_string())
    });
    register_plain_field(&form, "items[2]");
    register_plain_field(&form, "items[2].x");

    form.remove_field_value("items", 1, UpdateMetaOptions::default())
        .await
        .unwrap();

    assert_eq!(form.get_field_value("items"), Some(json!([1, 3])));
    let registered = form.registered_fields();
    assert!(!registered.iter().any(|path| path.starts_with("items[2]")));
    assert!(form.get_field_meta("items[2].x").is_none());
    assert!(form.get_field_meta("items[2]").is_none());

    assert_eq!(items.calls(), vec![ValidationCause::Change]);
    assert_eq!(second.calls(), vec![ValidationCause::Change]);
    assert!(form.get_field_meta("items[1]").unwrap().errors.is_empty());
    assert_eq!(first.validation_count(), 0);
}

#[tokio::test]
async fn replace_cascades_from_the_index_onward() {
    init_tracing();
    let form = form_with_items(json!([{ "name": "a" }, { "name": "b" }, { "name": "c" }]));
    let names: Vec<_> = (0..3)
        .map(|i| register_plain_field(&form, &format!("items[{i}].name")))
        .collect();

    form.replace_field_value("items", 1, json!({ "name": "z" }), UpdateMetaOptions::default())
        .await
        .unwrap();

    assert_eq!(form.get_field_value("items[1].name"), Some(json!("z")));
    assert_eq!(names[0].validation_count(), 0);
    assert_eq!(names[1].validation_count(), 1);
    assert_eq!(names[2].validation_count(), 1);
}

#[tokio::test]
async fn cascade_respects_index_boundaries() {
    init_tracing();
    let form = form_with_items(json!((0..11).collect::<Vec<u32>>()));
    let one = register_plain_field(&form, "items[1]");
    let ten = register_plain_field(&form, "items[10]");

    form.replace_field_value("items", 10, json!(100), UpdateMetaOptions::default())
        .await
        .unwrap();

    assert_eq!(one.validation_count(), 0);
    assert_eq!(ten.validation_count(), 1);
}

#[tokio::test]
async fn swap_and_move_validate_only_the_two_slots() {
    init_tracing();
    let form = form_with_items(json!(["a", "b", "c", "d"]));
    let items = register_plain_field(&form, "items");
    let slots: Vec<_> = (0..4)
        .map(|i| register_plain_field(&form, &format!("items[{i}]")))
        .collect();

    form.swap_field_values("items", 0, 2, UpdateMetaOptions::default())
        .await
        .unwrap();
    assert_eq!(form.get_field_value("items"), Some(json!(["c", "b", "a", "d"])));
    let counts: Vec<usize> = slots.iter().map(|slot| slot.validation_count()).collect();
    assert_eq!(counts, vec![1, 0, 1, 0]);

    form.move_field_values("items", 3, 1, UpdateMetaOptions::default())
        .await
        .unwrap();
    assert_eq!(form.get_field_value("items"), Some(json!(["c", "d", "b", "a"])));
    let counts: Vec<usize> = slots.iter().map(|slot| slot.validation_count()).collect();
    assert_eq!(counts, vec![1, 1, 1, 1]);
    assert_eq!(items.validation_count(), 2);
}

#[tokio::test]
async fn array_mutations_touch_the_array_field() {
    init_tracing();
    let form = form_with_items(json!([]));
    register_plain_field(&form, "items");

    form.push_field_value("items", json!("x"), UpdateMetaOptions::default())
        .await
        .unwrap();

    let meta = form.get_field_meta("items").unwrap();
    assert!(meta.is_touched);
    assert!(meta.is_dirty);
    assert!(form.state().is_dirty);
}

#[tokio::test]
async fn remove_out_of_bounds_deletes_nothing() {
    init_tracing();
    let form = form_with_items(json!([1, 2, 3]));
    let last = register_plain_field(&form, "items[2]");

    let err = form
        .remove_field_value("items", 5, UpdateMetaOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, FormError::IndexOutOfBounds { index: 5, len: 3, .. }));
    assert_eq!(form.get_field_value("items"), Some(json!([1, 2, 3])));
    assert!(form.registered_fields().contains(&"items[2]".to_string()));
    assert!(form.get_field_meta("items[2]").is_some());
    assert_eq!(last.validation_count(), 0);
}

#[tokio::test]
async fn move_out_of_bounds_leaves_values_alone() {
    init_tracing();
    let form = form_with_items(json!([1, 2, 3]));
    let err = form
        .move_field_values("items", 5, 0, UpdateMetaOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FormError::IndexOutOfBounds { index: 5, len: 3, .. }));
    assert_eq!(form.get_field_value("items"), Some(json!([1, 2, 3])));
}
