// Shared fixtures for grove-engine integration tests

#![allow(dead_code)]

use grove_core::model::{AttributeKind, EntityDescription, ModelSchema, Value};
use grove_core::{GroveConfig, MergePolicy, Strictness};
use grove_engine::{Context, StoreDescriptor, StoreRegistry};
use grove_store::{DirectoryBundle, NoProtection, StaticSchemaSource};
use std::sync::Arc;
use tempfile::TempDir;

/// Catalog model: Item{name, price?, weight?, category?} and Category{title}
pub fn catalog_schema() -> ModelSchema {
    ModelSchema::new(
        "Catalog",
        vec![
            EntityDescription::new("Item")
                .attribute("name", AttributeKind::String)
                .optional_attribute("price", AttributeKind::Integer)
                .optional_attribute("weight", AttributeKind::Double)
                .to_one("category", "Category"),
            EntityDescription::new("Category")
                .attribute("title", AttributeKind::String)
                .to_many("items", "Item"),
        ],
    )
    .unwrap()
}

pub struct Fixture {
    pub dir: TempDir,
    pub registry: StoreRegistry,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    pub fn with_policy(policy: MergePolicy) -> Self {
        Self::with_config(|config| config.with_merge_policy(policy))
    }

    pub fn strict() -> Self {
        Self::with_config(|config| config.with_strictness(Strictness::Abort))
    }

    pub fn with_config(adjust: impl FnOnce(GroveConfig) -> GroveConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let config = adjust(
            GroveConfig::default()
                .with_data_dir(dir.path().join("data"))
                .with_bundle_dir(dir.path().join("bundle")),
        );
        let registry = StoreRegistry::new(
            &config,
            Arc::new(StaticSchemaSource::new().with(catalog_schema())),
            Arc::new(DirectoryBundle::new(dir.path().join("bundle"))),
            Arc::new(NoProtection),
        );
        Self { dir, registry }
    }

    pub fn catalog(&self) -> Arc<StoreDescriptor> {
        self.registry.shared_for_model("Catalog").unwrap()
    }
}

/// Insert and save one Item per `(name, price)`
pub fn seed_items(context: &Context, items: &[(&str, i64)]) {
    for (name, price) in items {
        let item = context.insert("Item").unwrap();
        item.set("name", *name).unwrap();
        item.set("price", *price).unwrap();
    }
    context.save().unwrap();
}

/// `(name, price)` of every Item in `context`, ordered by name
pub fn item_rows(context: &Context) -> Vec<(String, i64)> {
    let results = context
        .request("Item")
        .sort_by("name", true)
        .build()
        .and_then(|request| context.fetch(&request).and_then(|r| r.snapshots()))
        .unwrap();
    results
        .iter()
        .map(|snapshot| {
            (
                snapshot.attribute("name").as_str().unwrap_or_default().to_string(),
                snapshot.attribute("price").as_i64().unwrap_or_default(),
            )
        })
        .collect()
}

pub fn name_of(context: &Context, id: &grove_core::ObjectId) -> Value {
    context.object(id).unwrap().get("name").unwrap()
}
