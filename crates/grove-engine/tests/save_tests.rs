// Saving: validation, all-or-nothing commits, propagation through nested
// contexts and post-save visibility in sibling contexts

mod common;

use common::{item_rows, name_of, seed_items, Fixture};
use grove_core::model::Value;
use grove_core::ExErrorKind;
use std::sync::Arc;
use std::thread;

#[test]
fn test_catalog_scenario() {
    let fixture = Fixture::new();
    let catalog = fixture.catalog();

    // GIVEN a fresh store and context C1
    let c1 = catalog.new_context().unwrap();
    let item = c1.insert("Item").unwrap();
    item.set("name", "A").unwrap();
    item.set("price", 1).unwrap();

    // WHEN C1 saves
    c1.save().unwrap();

    // THEN a fetch of all Items in C2 returns exactly that item
    let c2 = catalog.new_context().unwrap();
    assert_eq!(item_rows(&c2), vec![("A".to_string(), 1)]);
}

#[test]
fn test_invalid_object_aborts_whole_save() {
    let fixture = Fixture::new();
    let catalog = fixture.catalog();
    let context = catalog.new_context().unwrap();

    for n in 0..4 {
        let item = context.insert("Item").unwrap();
        item.set("name", format!("item-{}", n)).unwrap();
    }
    // missing the required name
    context.insert("Item").unwrap();
    assert_eq!(context.pending_counts(), (5, 0, 0));

    let err = context.save().unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Validation);
    assert_eq!(err.entity(), Some("Item"));
    assert_eq!(err.attribute(), Some("name"));
    assert!(err.kind().is_recoverable());
    assert!(context.has_changes());
    assert_eq!(context.pending_counts(), (5, 0, 0));
    assert!(item_rows(&catalog.new_context().unwrap()).is_empty());
}

#[test]
fn test_save_can_be_retried_after_fixing() {
    let fixture = Fixture::new();
    let catalog = fixture.catalog();
    let context = catalog.new_context().unwrap();

    let item = context.insert("Item").unwrap();
    item.set("price", 4).unwrap();
    assert!(context.save().is_err());

    item.set("name", "Fixed").unwrap();
    context.save().unwrap();

    assert!(!context.has_changes());
    assert_eq!(
        item_rows(&catalog.new_context().unwrap()),
        vec![("Fixed".to_string(), 4)]
    );
}

#[test]
fn test_relationship_to_unsaved_target_in_other_context_fails() {
    let fixture = Fixture::new();
    let catalog = fixture.catalog();
    let elsewhere = catalog.new_context().unwrap();
    let category = elsewhere.insert("Category").unwrap().id().clone();

    let context = catalog.new_context().unwrap();
    let item = context.insert("Item").unwrap();
    item.set("name", "Lamp").unwrap();
    item.set_related_one("category", Some(&category)).unwrap();

    let err = context.save().unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Validation);
    assert_eq!(err.attribute(), Some("category"));
}

#[test]
fn test_wrong_attribute_kind_fails_validation() {
    let fixture = Fixture::new();
    let context = fixture.catalog().new_context().unwrap();

    let item = context.insert("Item").unwrap();
    item.set("name", "Lamp").unwrap();
    item.set("price", "cheap").unwrap();

    let err = context.save().unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Validation);
    assert_eq!(err.attribute(), Some("price"));
}

#[test]
fn test_unrepresentable_numbers_fail_validation() {
    let fixture = Fixture::new();
    let context = fixture.catalog().new_context().unwrap();

    let item = context.insert("Item").unwrap();
    item.set("name", "Lamp").unwrap();
    item.set("weight", f64::NAN).unwrap();
    let err = context.save().unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Validation);
    assert_eq!(err.attribute(), Some("weight"));

    item.set("weight", 2.5).unwrap();
    item.set("price", 1e30).unwrap();
    let err = context.save().unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Validation);
    assert_eq!(err.attribute(), Some("price"));

    item.set("price", 12.0).unwrap();
    context.save().unwrap();
    assert_eq!(item_rows(&context), vec![("Lamp".to_string(), 12)]);
}

#[test]
fn test_unknown_attribute_is_parameter_error() {
    let fixture = Fixture::new();
    let context = fixture.catalog().new_context().unwrap();
    let item = context.insert("Item").unwrap();

    let err = item.set("colour", "red").unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Parameter);
    assert_eq!(err.attribute(), Some("colour"));

    let err = context.insert("Invoice").unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Parameter);
}

#[test]
#[should_panic(expected = "contract violation")]
fn test_unknown_entity_panics_under_abort() {
    let fixture = Fixture::strict();
    let context = fixture.catalog().new_context().unwrap();
    let _ = context.insert("Invoice");
}

#[test]
fn test_save_in_one_context_visible_in_sibling_after_save() {
    let fixture = Fixture::new();
    let catalog = fixture.catalog();
    let a = catalog.new_context().unwrap();
    let b = catalog.new_context().unwrap();

    let item = a.insert("Item").unwrap();
    item.set("name", "Pending").unwrap();

    // not visible before the save
    assert!(item_rows(&b).is_empty());

    a.save().unwrap();
    assert_eq!(item_rows(&b), vec![("Pending".to_string(), 0)]);
}

#[test]
fn test_save_on_another_thread_visible_after_save() {
    let fixture = Fixture::new();
    let catalog = fixture.catalog();
    let reader = catalog.context_for_current_thread().unwrap();
    seed_items(&reader, &[("Chair", 40)]);
    let chair = reader
        .request("Item")
        .build()
        .and_then(|r| reader.fetch(&r).map(|results| results.ids().to_vec()))
        .unwrap()
        .remove(0);
    assert_eq!(name_of(&reader, &chair), Value::from("Chair"));

    // WHEN another thread renames the chair and saves
    let writer_catalog = Arc::clone(&catalog);
    let target = chair.clone();
    thread::spawn(move || {
        let writer = writer_catalog.context_for_current_thread().unwrap();
        writer.object(&target).unwrap().set("name", "Stool").unwrap();
        writer.save().unwrap();
    })
    .join()
    .unwrap();

    // THEN the reader merges the notification at its next operation
    assert_eq!(reader.process_pending_changes(), 1);
    assert_eq!(name_of(&reader, &chair), Value::from("Stool"));
}

#[test]
fn test_remote_delete_evicts_cached_object() {
    let fixture = Fixture::new();
    let catalog = fixture.catalog();
    let reader = catalog.new_context().unwrap();
    seed_items(&reader, &[("Desk", 200)]);
    let desk = reader
        .request("Item")
        .build()
        .and_then(|r| reader.fetch(&r).map(|results| results.ids().to_vec()))
        .unwrap()
        .remove(0);
    assert!(reader.contains(&desk).unwrap());

    let writer = catalog.new_context().unwrap();
    writer.delete(&desk).unwrap();
    writer.save().unwrap();

    assert!(!reader.contains(&desk).unwrap());
    let err = reader.object(&desk).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);
}

#[test]
fn test_nested_save_to_parent_then_save() {
    let fixture = Fixture::new();
    let catalog = fixture.catalog();
    let parent = catalog.new_context().unwrap();
    let child = parent.new_child();

    let item = child.insert("Item").unwrap();
    item.set("name", "Shelf").unwrap();
    let id = item.id().clone();

    // save_to_parent only moves the change one level up
    child.save_to_parent().unwrap();
    assert!(!child.has_changes());
    assert!(parent.has_changes());
    assert!(parent.contains(&id).unwrap());
    assert!(item_rows(&catalog.new_context().unwrap()).is_empty());

    parent.save().unwrap();
    assert!(!parent.has_changes());
    assert_eq!(
        item_rows(&catalog.new_context().unwrap()),
        vec![("Shelf".to_string(), 0)]
    );
}

#[test]
fn test_nested_save_commits_whole_chain() {
    let fixture = Fixture::new();
    let catalog = fixture.catalog();
    let parent = catalog.new_context().unwrap();
    let child = parent.new_child();

    child.insert("Item").unwrap().set("name", "Rug").unwrap();
    child.save().unwrap();

    assert!(!child.has_changes());
    assert!(!parent.has_changes());
    assert_eq!(
        item_rows(&catalog.new_context().unwrap()),
        vec![("Rug".to_string(), 0)]
    );
}

#[test]
fn test_failed_nested_save_restores_chain() {
    let fixture = Fixture::new();
    let catalog = fixture.catalog();
    let parent = catalog.new_context().unwrap();
    parent.insert("Category").unwrap().set("title", "Lighting").unwrap();
    let child = parent.new_child();
    child.insert("Item").unwrap();

    assert!(child.save().is_err());

    assert_eq!(child.pending_counts(), (1, 0, 0));
    assert_eq!(parent.pending_counts(), (1, 0, 0));
}

#[test]
fn test_nested_save_validates_ancestor_changes() {
    let fixture = Fixture::new();
    let catalog = fixture.catalog();
    let parent = catalog.new_context().unwrap();
    // a Category without its required title
    parent.insert("Category").unwrap();
    let child = parent.new_child();
    child.insert("Item").unwrap().set("name", "Lamp").unwrap();

    let err = child.save().unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Validation);
    assert_eq!(err.entity(), Some("Category"));
    assert_eq!(child.pending_counts(), (1, 0, 0));
    assert_eq!(parent.pending_counts(), (1, 0, 0));
    assert!(item_rows(&catalog.new_context().unwrap()).is_empty());
}

#[test]
fn test_delete_clears_inbound_relationships() {
    let fixture = Fixture::new();
    let catalog = fixture.catalog();
    let context = catalog.new_context().unwrap();

    let category = context.insert("Category").unwrap();
    category.set("title", "Lighting").unwrap();
    let lamp = context.insert("Item").unwrap();
    lamp.set("name", "Lamp").unwrap();
    lamp.set_related_one("category", Some(category.id())).unwrap();
    category.add_related("items", lamp.id()).unwrap();
    context.save().unwrap();

    let category_id = category.id().clone();
    let lamp_id = lamp.id().clone();
    context.delete(&category_id).unwrap();
    context.save().unwrap();

    let fresh = catalog.new_context().unwrap();
    assert_eq!(fresh.object(&lamp_id).unwrap().related_one("category").unwrap(), None);
    assert!(!fresh.contains(&category_id).unwrap());
}

#[test]
fn test_rollback_discards_pending_changes() {
    let fixture = Fixture::new();
    let catalog = fixture.catalog();
    let context = catalog.new_context().unwrap();
    seed_items(&context, &[("Vase", 15)]);

    context.insert("Item").unwrap().set("name", "Plate").unwrap();
    assert!(context.has_changes());
    context.rollback();

    assert!(!context.has_changes());
    context.save().unwrap();
    assert_eq!(item_rows(&context), vec![("Vase".to_string(), 15)]);
}

#[test]
fn test_root_context_sees_child_saves() {
    let fixture = Fixture::new();
    let catalog = fixture.catalog();
    let context = catalog.new_context().unwrap();
    seed_items(&context, &[("Mug", 8)]);

    let root = catalog.root_context().unwrap();
    let request = context.request("Item").build().unwrap();
    let rows = root.perform(|editor| editor.fetch(&request)).unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].attribute("name"), &Value::from("Mug"));
}

#[test]
fn test_root_context_usable_from_other_threads() {
    let fixture = Fixture::new();
    let catalog = fixture.catalog();
    let root = catalog.root_context().unwrap();

    let handles: Vec<_> = (0..3)
        .map(|n| {
            let root = root.clone();
            thread::spawn(move || {
                root.perform(|editor| {
                    let id = editor.insert("Item")?;
                    editor.set(&id, "name", format!("item-{}", n))
                })
                .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    root.save().unwrap();

    assert_eq!(item_rows(&catalog.new_context().unwrap()).len(), 3);
}
