//! SQLite-backed store for one model
//!
//! Opening runs the embedded table migrations, then the model migration,
//! then applies file protection when encryption is requested or was
//! recorded earlier. `commit` writes a whole change set in one transaction.

#![allow(clippy::result_large_err)]

use crate::db;
use crate::errors::{from_rusqlite, io_error, store_open_error, Result};
use crate::metadata::{self, StoreMetadata};
use crate::migrations::apply_migrations;
use crate::model_migration::{migrate_model, MigrationStep};
use crate::protection::{FileProtection, NoProtection};
use crate::repo::{self, SqliteRepo};
use grove_core::errors::{ExError, ExErrorKind};
use grove_core::merge::{ChangeSet, ConflictKind, MergeConflict};
use grove_core::model::{ModelSchema, ObjectId, ObjectSnapshot};
use rusqlite::{Connection, OpenFlags};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Protect the store file and record it as encrypted
    pub encrypted: bool,
    pub protection: Arc<dyn FileProtection>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            encrypted: false,
            protection: Arc::new(NoProtection),
        }
    }
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    schema: Arc<ModelSchema>,
    path: Option<PathBuf>,
    migrated: Vec<MigrationStep>,
}

impl SqliteStore {
    /// Open (creating if needed) the store file at `path`
    ///
    /// # Errors
    /// `Migration` when the stored model cannot be migrated to `schema`,
    /// otherwise `StoreOpen` wrapping the underlying failure.
    pub fn open(path: &Path, schema: Arc<ModelSchema>, options: &StoreOptions) -> Result<Self> {
        let model = schema.name.clone();
        Self::open_inner(path, schema, options).map_err(|e| store_open_error(&model, e))
    }

    fn open_inner(path: &Path, schema: Arc<ModelSchema>, options: &StoreOptions) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| io_error("create_data_dir", e))?;
        }

        let mut conn = db::open(path)?;
        db::configure(&conn)?;
        apply_migrations(&mut conn)?;
        let migrated = migrate_model(&mut conn, &schema)?;

        let encrypted = options.encrypted || metadata::is_encrypted(&conn)?;
        if encrypted {
            options.protection.protect(path)?;
            metadata::set_encrypted(&conn, true)?;
        }

        tracing::debug!(
            model = %schema.name,
            path = %path.display(),
            encrypted,
            migration_steps = migrated.len(),
            "store opened"
        );

        Ok(Self {
            conn,
            schema,
            path: Some(path.to_path_buf()),
            migrated,
        })
    }

    /// In-memory store, for tests and scratch work
    pub fn open_in_memory(schema: Arc<ModelSchema>) -> Result<Self> {
        let model = schema.name.clone();
        let open = || -> Result<Self> {
            let mut conn = db::open_in_memory()?;
            db::configure(&conn)?;
            apply_migrations(&mut conn)?;
            let migrated = migrate_model(&mut conn, &schema)?;
            Ok(Self {
                conn,
                schema: schema.clone(),
                path: None,
                migrated,
            })
        };
        open().map_err(|e| store_open_error(&model, e))
    }

    /// Read the metadata of an existing store file without opening it for
    /// writing or migrating it
    pub fn inspect(path: &Path) -> Result<StoreMetadata> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(from_rusqlite)?;
        metadata::read(&conn)
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Model migration steps applied when this store was opened
    pub fn migration_steps(&self) -> &[MigrationStep] {
        &self.migrated
    }

    pub fn metadata(&self) -> Result<StoreMetadata> {
        metadata::read(&self.conn)
    }

    pub fn is_encrypted(&self) -> Result<bool> {
        metadata::is_encrypted(&self.conn)
    }

    pub fn load_object(&self, id: &ObjectId) -> Result<Option<ObjectSnapshot>> {
        repo::load_object(&self.conn, &self.schema, id)
    }

    pub fn load_entity(&self, entity: &str) -> Result<Vec<ObjectSnapshot>> {
        repo::load_entity(&self.conn, &self.schema, entity)
    }

    pub fn count_entity(&self, entity: &str) -> Result<usize> {
        SqliteRepo::count_entity(&self.conn, entity)
    }

    /// Write `changes` in a single transaction
    ///
    /// Updates and deletes are checked against the version recorded in the
    /// change set (the version the writer read). Deleting a row that is
    /// already gone is a no-op. Returns the new version of every inserted
    /// and updated object.
    ///
    /// # Errors
    /// `MergeConflict` listing every row that moved underneath the commit;
    /// nothing is written in that case.
    pub fn commit(&mut self, changes: &ChangeSet) -> Result<BTreeMap<ObjectId, u64>> {
        let tx = self.conn.transaction().map_err(from_rusqlite)?;
        let mut versions = BTreeMap::new();
        let mut conflicts = Vec::new();

        for (id, snapshot) in &changes.inserted {
            SqliteRepo::insert(&tx, snapshot, 1)?;
            versions.insert(id.clone(), 1);
        }

        for (id, update) in &changes.updated {
            let expected = update.current.version;
            let next = expected + 1;
            if SqliteRepo::update(&tx, &update.current, expected, next)? {
                versions.insert(id.clone(), next);
                continue;
            }
            match SqliteRepo::current_version(&tx, id)? {
                Some(found) => conflicts.push(MergeConflict::version_mismatch(
                    id.clone(),
                    expected,
                    found,
                )),
                None => conflicts.push(MergeConflict::object_deleted(id.clone())),
            }
        }

        for (id, last_known) in &changes.deleted {
            if SqliteRepo::delete(&tx, id, last_known.version)? {
                continue;
            }
            if let Some(found) = SqliteRepo::current_version(&tx, id)? {
                conflicts.push(MergeConflict::version_mismatch(
                    id.clone(),
                    last_known.version,
                    found,
                ));
            }
        }

        if !conflicts.is_empty() {
            // Dropping the transaction rolls it back.
            return Err(ExError::new(ExErrorKind::MergeConflict)
                .with_op("commit_store")
                .with_message(format!(
                    "{} object(s) changed in the store since they were read",
                    conflicts.len()
                ))
                .with_conflicts(conflicts));
        }

        tx.commit().map_err(from_rusqlite)?;

        let (inserted, updated, deleted) = changes.counts();
        tracing::debug!(model = %self.schema.name, inserted, updated, deleted, "store commit");
        Ok(versions)
    }
}

/// Whether a conflict came from the store's version check
pub fn is_store_conflict(conflict: &MergeConflict) -> bool {
    matches!(conflict.kind, ConflictKind::VersionMismatch { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::merge::PendingUpdate;
    use grove_core::model::{AttributeKind, EntityDescription, Value};

    fn schema() -> Arc<ModelSchema> {
        Arc::new(
            ModelSchema::new(
                "Catalog",
                vec![EntityDescription::new("Item").attribute("name", AttributeKind::String)],
            )
            .unwrap(),
        )
    }

    fn item(name: &str) -> ObjectSnapshot {
        let mut snap = ObjectSnapshot::new(ObjectId::new("Item"));
        snap.set_attribute("name", Value::from(name));
        snap
    }

    #[test]
    fn test_commit_assigns_versions() {
        let mut store = SqliteStore::open_in_memory(schema()).unwrap();
        let snap = item("Lamp");
        let mut changes = ChangeSet::default();
        changes.inserted.insert(snap.id.clone(), snap.clone());

        let versions = store.commit(&changes).unwrap();
        assert_eq!(versions.get(&snap.id), Some(&1));

        let loaded = store.load_object(&snap.id).unwrap().unwrap();
        let mut update = PendingUpdate::begin(loaded);
        update.set_property(
            "name",
            Some(grove_core::PropertyValue::Attribute(Value::from("Desk"))),
        );
        let mut changes = ChangeSet::default();
        changes.updated.insert(snap.id.clone(), update);
        assert_eq!(store.commit(&changes).unwrap().get(&snap.id), Some(&2));
        assert_eq!(store.count_entity("Item").unwrap(), 1);
    }

    #[test]
    fn test_stale_update_is_rejected_atomically() {
        let mut store = SqliteStore::open_in_memory(schema()).unwrap();
        let existing = item("Lamp");
        let mut changes = ChangeSet::default();
        changes.inserted.insert(existing.id.clone(), existing.clone());
        store.commit(&changes).unwrap();

        // Read at version 1, but claim version 0.
        let mut stale = store.load_object(&existing.id).unwrap().unwrap();
        stale.version = 0;
        let fresh = item("Chair");
        let mut changes = ChangeSet::default();
        changes.inserted.insert(fresh.id.clone(), fresh.clone());
        changes
            .updated
            .insert(existing.id.clone(), PendingUpdate::begin(stale));

        let err = store.commit(&changes).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::MergeConflict);
        let conflicts = err.conflicts().unwrap();
        assert_eq!(conflicts.len(), 1);
        assert!(is_store_conflict(&conflicts[0]));
        // The insert in the same transaction was rolled back
        assert!(store.load_object(&fresh.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_of_missing_row_is_noop() {
        let mut store = SqliteStore::open_in_memory(schema()).unwrap();
        let mut ghost = item("Ghost");
        ghost.version = 1;
        let mut changes = ChangeSet::default();
        changes.deleted.insert(ghost.id.clone(), ghost);
        assert!(store.commit(&changes).unwrap().is_empty());
    }
}
