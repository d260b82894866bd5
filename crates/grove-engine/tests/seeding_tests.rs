// Pre-seeded stores: install-once semantics, bundle lookup and the
// "too late" contract once the store is open

mod common;

use common::{catalog_schema, item_rows, Fixture};
use grove_core::model::{ModelSchema, ObjectId, ObjectSnapshot, Value};
use grove_core::{ChangeSet, ExErrorKind};
use grove_engine::StoreDescriptor;
use grove_store::{SeedOutcome, SqliteStore, StoreOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Write a closed Catalog store file at `path` holding the given items
fn build_seed(path: &Path, items: &[(&str, i64)]) {
    write_items(path, catalog_schema(), items);
}

fn write_items(path: &Path, schema: ModelSchema, items: &[(&str, i64)]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let has_price = schema
        .entity("Item")
        .and_then(|e| e.attribute_named("price"))
        .is_some();
    let mut store = SqliteStore::open(path, Arc::new(schema), &StoreOptions::default()).unwrap();
    let mut changes = ChangeSet::default();
    for (name, price) in items {
        let mut snapshot = ObjectSnapshot::new(ObjectId::new("Item"));
        snapshot.set_attribute("name", Value::from(*name));
        if has_price {
            snapshot.set_attribute("price", Value::from(*price));
        }
        changes.inserted.insert(snapshot.id.clone(), snapshot);
    }
    store.commit(&changes).unwrap();
}

fn seed_file(fixture: &Fixture, items: &[(&str, i64)]) -> PathBuf {
    let path = fixture.dir.path().join("seeds").join("catalog-seed.sqlite");
    build_seed(&path, items);
    path
}

fn rows_of(catalog: &Arc<StoreDescriptor>) -> Vec<(String, i64)> {
    item_rows(&catalog.new_context().unwrap())
}

#[test]
fn test_seed_installs_when_store_missing() {
    let fixture = Fixture::new();
    let seed = seed_file(&fixture, &[("A", 1), ("B", 2)]);
    let catalog = fixture.catalog();
    assert!(!catalog.store_exists());

    let outcome = catalog.use_pre_seeded_file(&seed).unwrap();

    let size = std::fs::metadata(&seed).unwrap().len();
    assert_eq!(outcome, SeedOutcome::Installed { bytes: size });
    assert!(catalog.store_exists());
    assert_eq!(
        std::fs::read(catalog.store_path()).unwrap(),
        std::fs::read(&seed).unwrap()
    );
    assert_eq!(
        rows_of(&catalog),
        vec![("A".to_string(), 1), ("B".to_string(), 2)]
    );
}

#[test]
fn test_seed_is_noop_when_store_exists() {
    let fixture = Fixture::new();
    let seed = seed_file(&fixture, &[("Seeded", 9)]);
    let catalog = fixture.catalog();

    // GIVEN an existing store with its own content
    build_seed(catalog.store_path(), &[("Existing", 1)]);
    let before = std::fs::read(catalog.store_path()).unwrap();

    // WHEN seeding is requested
    let outcome = catalog.use_pre_seeded_file(&seed).unwrap();

    // THEN nothing changes
    assert_eq!(outcome, SeedOutcome::StoreAlreadyPresent);
    assert_eq!(std::fs::read(catalog.store_path()).unwrap(), before);
    assert_eq!(rows_of(&catalog), vec![("Existing".to_string(), 1)]);
}

#[test]
fn test_missing_seed_source() {
    let fixture = Fixture::new();
    let catalog = fixture.catalog();

    let err = catalog
        .use_pre_seeded_file(&fixture.dir.path().join("nope.sqlite"))
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::SeedSourceMissing);
    assert!(!catalog.store_exists());
}

#[test]
fn test_seed_from_bundle() {
    let fixture = Fixture::new();
    build_seed(
        &fixture.dir.path().join("bundle").join("Catalog.sqlite"),
        &[("Bundled", 3)],
    );
    let catalog = fixture.catalog();

    let outcome = catalog.use_pre_seeded_file_from_bundle().unwrap();

    assert!(matches!(outcome, SeedOutcome::Installed { .. }));
    assert_eq!(rows_of(&catalog), vec![("Bundled".to_string(), 3)]);
}

#[test]
fn test_seed_from_bundle_without_resource() {
    let fixture = Fixture::new();
    let err = fixture
        .catalog()
        .use_pre_seeded_file_from_bundle()
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::SeedNotFoundInBundle);
}

#[test]
fn test_seed_after_open_is_too_late() {
    let fixture = Fixture::new();
    let seed = seed_file(&fixture, &[("A", 1)]);
    let catalog = fixture.catalog();
    catalog.open().unwrap();

    let err = catalog.use_pre_seeded_file(&seed).unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::SeedTooLate);
    assert!(rows_of(&catalog).is_empty());
}

#[test]
fn test_double_seed_returns_already_present() {
    let fixture = Fixture::new();
    let seed = seed_file(&fixture, &[("A", 1)]);
    let catalog = fixture.catalog();

    assert!(matches!(
        catalog.use_pre_seeded_file(&seed).unwrap(),
        SeedOutcome::Installed { .. }
    ));
    assert_eq!(
        catalog.use_pre_seeded_file(&seed).unwrap(),
        SeedOutcome::StoreAlreadyPresent
    );
}

#[test]
#[should_panic(expected = "contract violation")]
fn test_seed_too_late_panics_under_abort() {
    let fixture = Fixture::strict();
    let catalog = fixture.catalog();
    catalog.open().unwrap();
    let _ = catalog.use_pre_seeded_file(Path::new("/does/not/matter.sqlite"));
}

#[test]
fn test_seeded_store_with_older_model_is_migrated() {
    let fixture = Fixture::new();
    let seed = fixture.dir.path().join("old.sqlite");
    let mut old = catalog_schema();
    for entity in old.entities.iter_mut().filter(|e| e.name == "Item") {
        entity.attributes.retain(|a| a.name != "price");
    }
    write_items(&seed, old, &[("Legacy", 0)]);
    let catalog = fixture.catalog();

    catalog.use_pre_seeded_file(&seed).unwrap();

    // price was added as optional, so existing rows simply lack it
    assert_eq!(rows_of(&catalog), vec![("Legacy".to_string(), 0)]);
}
