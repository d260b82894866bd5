//! Migration runner
//!
//! Every store carries a `store_migrations` ledger. Recorded checksums are
//! compared against the embedded SQL before anything new is applied; a
//! mismatch means the file was written by an incompatible build.

#![allow(clippy::result_large_err)]

use crate::errors::{checksum_mismatch, from_rusqlite, migration_error, Result};
use crate::migrations::checksums::compute_checksum;
use crate::migrations::embedded::{EmbeddedMigration, MIGRATIONS};
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;

const LEDGER_DDL: &str = "CREATE TABLE IF NOT EXISTS store_migrations (
    migration_id TEXT PRIMARY KEY,
    checksum TEXT NOT NULL,
    applied_at TEXT NOT NULL
)";

fn recorded_checksums(conn: &Connection) -> Result<HashMap<String, String>> {
    let mut stmt = conn
        .prepare("SELECT migration_id, checksum FROM store_migrations")
        .map_err(from_rusqlite)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(from_rusqlite)?;
    rows.collect::<rusqlite::Result<_>>().map_err(from_rusqlite)
}

/// Apply pending migrations, returning the ids applied by this call
pub fn apply_migrations(conn: &mut Connection) -> Result<Vec<&'static str>> {
    conn.execute_batch(LEDGER_DDL).map_err(from_rusqlite)?;
    let recorded = recorded_checksums(conn)?;

    let mut pending: Vec<(&EmbeddedMigration, String)> = Vec::new();
    for migration in MIGRATIONS {
        let checksum = compute_checksum(migration.sql);
        match recorded.get(migration.id) {
            Some(existing) if *existing != checksum => {
                return Err(checksum_mismatch(migration.id, existing, &checksum));
            }
            Some(_) => {}
            None => pending.push((migration, checksum)),
        }
    }

    let mut applied = Vec::with_capacity(pending.len());
    for (migration, checksum) in pending {
        let tx = conn.transaction().map_err(from_rusqlite)?;
        tx.execute_batch(migration.sql)
            .map_err(|e| migration_error(migration.id, &e.to_string()))?;
        tx.execute(
            "INSERT INTO store_migrations (migration_id, checksum, applied_at) VALUES (?1, ?2, ?3)",
            params![
                migration.id,
                checksum,
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
            ],
        )
        .map_err(from_rusqlite)?;
        tx.commit().map_err(from_rusqlite)?;

        tracing::debug!(migration_id = migration.id, "applied store migration");
        applied.push(migration.id);
    }
    Ok(applied)
}
