//! Store metadata
//!
//! Key/value facts about a store file: which model it belongs to, the
//! model schema it was last written with, and whether it is protected.

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, from_serde_json, Result};
use crate::migrations::compute_checksum;
use grove_core::errors::{ExError, ExErrorKind};
use grove_core::model::ModelSchema;
use rusqlite::{Connection, OptionalExtension};

pub const KEY_MODEL_NAME: &str = "model_name";
pub const KEY_MODEL_VERSION: &str = "model_version";
pub const KEY_MODEL_SCHEMA: &str = "model_schema";
pub const KEY_SCHEMA_DIGEST: &str = "schema_digest";
pub const KEY_ENCRYPTED: &str = "encrypted";
pub const KEY_CREATED_AT: &str = "created_at";

/// Snapshot of the metadata table
#[derive(Debug, Clone, PartialEq)]
pub struct StoreMetadata {
    pub model_name: String,
    pub model_version: u32,
    pub schema_digest: String,
    pub encrypted: bool,
    pub created_at: Option<String>,
}

pub fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM store_metadata WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .optional()
    .map_err(from_rusqlite)
}

pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO store_metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key, value],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

/// The schema recorded in the store, if any
pub fn stored_schema(conn: &Connection) -> Result<Option<ModelSchema>> {
    match get(conn, KEY_MODEL_SCHEMA)? {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| from_serde_json("read_store_schema", e)),
    }
}

/// Record `schema` as the store's current schema
pub fn record_schema(conn: &Connection, schema: &ModelSchema) -> Result<()> {
    let json = schema_json(schema)?;
    set(conn, KEY_MODEL_NAME, &schema.name)?;
    set(conn, KEY_MODEL_VERSION, &schema.version.to_string())?;
    set(conn, KEY_SCHEMA_DIGEST, &compute_checksum(&json))?;
    set(conn, KEY_MODEL_SCHEMA, &json)?;
    if get(conn, KEY_CREATED_AT)?.is_none() {
        set(conn, KEY_CREATED_AT, &chrono::Utc::now().to_rfc3339())?;
    }
    Ok(())
}

pub fn schema_json(schema: &ModelSchema) -> Result<String> {
    serde_json::to_string(schema).map_err(|e| from_serde_json("write_store_schema", e))
}

pub fn set_encrypted(conn: &Connection, encrypted: bool) -> Result<()> {
    set(conn, KEY_ENCRYPTED, if encrypted { "1" } else { "0" })
}

pub fn is_encrypted(conn: &Connection) -> Result<bool> {
    Ok(get(conn, KEY_ENCRYPTED)?.as_deref() == Some("1"))
}

pub fn read(conn: &Connection) -> Result<StoreMetadata> {
    let missing = |key: &str| {
        ExError::new(ExErrorKind::Persistence)
            .with_op("read_store_metadata")
            .with_message(format!("Store metadata is missing '{}'", key))
    };
    let model_name = get(conn, KEY_MODEL_NAME)?.ok_or_else(|| missing(KEY_MODEL_NAME))?;
    let model_version = get(conn, KEY_MODEL_VERSION)?
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| missing(KEY_MODEL_VERSION))?;
    let schema_digest = get(conn, KEY_SCHEMA_DIGEST)?.ok_or_else(|| missing(KEY_SCHEMA_DIGEST))?;
    Ok(StoreMetadata {
        model_name,
        model_version,
        schema_digest,
        encrypted: is_encrypted(conn)?,
        created_at: get(conn, KEY_CREATED_AT)?,
    })
}
