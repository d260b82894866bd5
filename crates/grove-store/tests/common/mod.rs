// Shared fixtures for grove-store integration tests

#![allow(dead_code)]

use grove_core::model::{AttributeKind, EntityDescription, ModelSchema, ObjectId, ObjectSnapshot, Value};
use grove_core::ChangeSet;
use grove_store::{SqliteStore, StoreOptions};
use std::path::Path;
use std::sync::Arc;

pub fn catalog_v1() -> Arc<ModelSchema> {
    Arc::new(
        ModelSchema::new(
            "Catalog",
            vec![
                EntityDescription::new("Item")
                    .attribute("name", AttributeKind::String)
                    .optional_attribute("price", AttributeKind::Integer)
                    .optional_attribute("note", AttributeKind::String)
                    .to_one("category", "Category"),
                EntityDescription::new("Category").attribute("title", AttributeKind::String),
            ],
        )
        .unwrap(),
    )
}

pub fn item(name: &str, price: Option<i64>) -> ObjectSnapshot {
    let mut snap = ObjectSnapshot::new(ObjectId::new("Item"));
    snap.set_attribute("name", Value::from(name));
    if let Some(price) = price {
        snap.set_attribute("price", Value::from(price));
    }
    snap
}

/// Create a store at `path` holding `objects`
pub fn write_store(path: &Path, schema: Arc<ModelSchema>, objects: &[ObjectSnapshot]) {
    let mut store = SqliteStore::open(path, schema, &StoreOptions::default()).unwrap();
    let mut changes = ChangeSet::default();
    for object in objects {
        changes.inserted.insert(object.id.clone(), object.clone());
    }
    store.commit(&changes).unwrap();
}
