// Integration tests for seeding a store from a pre-built file

mod common;

use common::{catalog_v1, item, write_store};
use grove_core::model::Value;
use grove_core::ExErrorKind;
use grove_store::seed::{install_from_bundle, install_seed};
use grove_store::{DirectoryBundle, SeedOutcome, SqliteStore, StoreOptions};

#[test]
fn test_seeded_store_opens_with_seed_contents() {
    // GIVEN a bundle holding a populated Catalog store
    let bundle_dir = tempfile::tempdir().unwrap();
    let lamp = item("Lamp", Some(12));
    write_store(&bundle_dir.path().join("Catalog.sqlite"), catalog_v1(), &[lamp.clone()]);

    // WHEN it is installed into an empty data directory and opened
    let data_dir = tempfile::tempdir().unwrap();
    let target = data_dir.path().join("Catalog.sqlite");
    let outcome =
        install_from_bundle(&DirectoryBundle::new(bundle_dir.path()), "Catalog", &target).unwrap();
    let store = SqliteStore::open(&target, catalog_v1(), &StoreOptions::default()).unwrap();

    // THEN the seed's objects are visible
    assert!(matches!(outcome, SeedOutcome::Installed { bytes } if bytes > 0));
    let loaded = store.load_object(&lamp.id).unwrap().unwrap();
    assert_eq!(loaded.attribute("name"), &Value::from("Lamp"));
}

#[test]
fn test_seed_never_replaces_existing_store() {
    // GIVEN an existing store with one object
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("Catalog.sqlite");
    let existing = item("Existing", None);
    write_store(&target, catalog_v1(), &[existing.clone()]);

    // AND a seed with a different object
    let seed = dir.path().join("seed.sqlite");
    write_store(&seed, catalog_v1(), &[item("Seeded", None)]);

    // WHEN seeding
    let outcome = install_seed(&seed, &target).unwrap();

    // THEN the store is untouched
    assert_eq!(outcome, SeedOutcome::StoreAlreadyPresent);
    let store = SqliteStore::open(&target, catalog_v1(), &StoreOptions::default()).unwrap();
    assert_eq!(store.count_entity("Item").unwrap(), 1);
    assert!(store.load_object(&existing.id).unwrap().is_some());
}

#[test]
fn test_unwritable_target_is_seed_copy_error() {
    // GIVEN a valid seed and a target whose parent is a plain file
    let dir = tempfile::tempdir().unwrap();
    let seed = dir.path().join("seed.sqlite");
    write_store(&seed, catalog_v1(), &[item("Seeded", None)]);
    let blocker = dir.path().join("data");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let target = blocker.join("Catalog.sqlite");

    // WHEN seeding
    let err = install_seed(&seed, &target).unwrap_err();

    // THEN the I/O failure surfaces as SeedCopy and nothing is placed
    assert_eq!(err.kind(), ExErrorKind::SeedCopy);
    assert_eq!(err.op(), Some("create_store_dir"));
    assert!(err.message().contains("data"));
    assert_eq!(std::fs::read(&blocker).unwrap(), b"not a directory");
}
