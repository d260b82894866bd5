//! SQLite repository implementation
//!
//! Writes object rows with optimistic version checks. Versions start at 1
//! and increase by one per committed update.

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, from_serde_json, Result};
use grove_core::model::{ObjectId, ObjectSnapshot};
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;

/// SQLite repository for object rows
pub struct SqliteRepo;

fn attributes_doc(snapshot: &ObjectSnapshot) -> Result<String> {
    serde_json::to_string(&snapshot.attributes_json())
        .map_err(|e| from_serde_json("encode_attributes", e))
}

fn relationships_doc(snapshot: &ObjectSnapshot) -> Result<String> {
    let doc: BTreeMap<&str, Vec<String>> = snapshot
        .relationships
        .iter()
        .map(|(name, targets)| (name.as_str(), targets.iter().map(ObjectId::to_uri).collect()))
        .collect();
    serde_json::to_string(&doc).map_err(|e| from_serde_json("encode_relationships", e))
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl SqliteRepo {
    /// Insert a new row at `version`
    pub fn insert(conn: &Connection, snapshot: &ObjectSnapshot, version: u64) -> Result<()> {
        let now = now_millis();
        conn.execute(
            "INSERT INTO objects (id, entity, version, attributes, relationships, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                snapshot.id.to_uri(),
                snapshot.entity(),
                version as i64,
                attributes_doc(snapshot)?,
                relationships_doc(snapshot)?,
                now,
                now,
            ],
        )
        .map_err(from_rusqlite)?;
        Ok(())
    }

    /// Overwrite a row if it is still at `expected_version`
    ///
    /// Returns false (and writes nothing) when the row moved or vanished.
    pub fn update(
        conn: &Connection,
        snapshot: &ObjectSnapshot,
        expected_version: u64,
        new_version: u64,
    ) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE objects
                 SET version = ?1, attributes = ?2, relationships = ?3, updated_at = ?4
                 WHERE id = ?5 AND version = ?6",
                rusqlite::params![
                    new_version as i64,
                    attributes_doc(snapshot)?,
                    relationships_doc(snapshot)?,
                    now_millis(),
                    snapshot.id.to_uri(),
                    expected_version as i64,
                ],
            )
            .map_err(from_rusqlite)?;
        Ok(changed == 1)
    }

    /// Delete a row if it is still at `expected_version`
    pub fn delete(conn: &Connection, id: &ObjectId, expected_version: u64) -> Result<bool> {
        let changed = conn
            .execute(
                "DELETE FROM objects WHERE id = ?1 AND version = ?2",
                rusqlite::params![id.to_uri(), expected_version as i64],
            )
            .map_err(from_rusqlite)?;
        Ok(changed == 1)
    }

    pub fn current_version(conn: &Connection, id: &ObjectId) -> Result<Option<u64>> {
        let version: Option<i64> = conn
            .query_row(
                "SELECT version FROM objects WHERE id = ?1",
                [id.to_uri()],
                |row| row.get(0),
            )
            .optional()
            .map_err(from_rusqlite)?;
        Ok(version.map(|v| v as u64))
    }

    pub fn count_entity(conn: &Connection, entity: &str) -> Result<usize> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM objects WHERE entity = ?1",
                [entity],
                |row| row.get(0),
            )
            .map_err(from_rusqlite)?;
        Ok(count as usize)
    }
}
