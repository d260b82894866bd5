//! Hydration layer - decodes object rows into snapshots
//!
//! Attribute JSON is read back through the model schema so that dates and
//! doubles come back as the kinds they were declared with. Null attributes
//! and empty relationships are left unset. Rows load in id order.

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, from_serde_json, Result};
use grove_core::errors::{ExError, ExErrorKind};
use grove_core::model::{ModelSchema, ObjectId, ObjectSnapshot, Value};
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

/// Raw columns of one `objects` row
#[derive(Debug, Clone)]
pub struct StoredRow {
    pub id: String,
    pub version: i64,
    pub attributes: String,
    pub relationships: String,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            version: row.get(1)?,
            attributes: row.get(2)?,
            relationships: row.get(3)?,
        })
    }
}

fn corrupt(id: &str, message: String) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_op("hydrate_object")
        .with_object_id(id)
        .with_message(message)
}

/// Decode a stored row against `schema`
pub fn decode_row(schema: &ModelSchema, row: StoredRow) -> Result<ObjectSnapshot> {
    let id = ObjectId::parse(&row.id)?;
    let entity = schema
        .entity(id.entity())
        .ok_or_else(|| corrupt(&row.id, format!("entity '{}' is not in the model", id.entity())))?;

    let attributes: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&row.attributes).map_err(|e| from_serde_json("hydrate_object", e))?;
    let relationships: BTreeMap<String, Vec<String>> =
        serde_json::from_str(&row.relationships)
            .map_err(|e| from_serde_json("hydrate_object", e))?;

    let mut snapshot = ObjectSnapshot::new(id);
    snapshot.version = row.version as u64;

    for (name, json) in &attributes {
        let Some(description) = entity.attribute_named(name) else {
            continue;
        };
        let value = Value::from_json(json, description.kind).ok_or_else(|| {
            corrupt(
                &row.id,
                format!("'{}' does not hold a {} value", name, description.kind),
            )
        })?;
        if !value.is_null() {
            snapshot.set_attribute(name.clone(), value);
        }
    }

    for (name, uris) in relationships {
        if uris.is_empty() || entity.relationship_named(&name).is_none() {
            continue;
        }
        let targets = uris
            .iter()
            .map(|uri| ObjectId::parse(uri))
            .collect::<Result<Vec<_>>>()?;
        snapshot.set_related(name, targets);
    }

    Ok(snapshot)
}

pub fn load_object(
    conn: &Connection,
    schema: &ModelSchema,
    id: &ObjectId,
) -> Result<Option<ObjectSnapshot>> {
    let row = conn
        .query_row(
            "SELECT id, version, attributes, relationships FROM objects WHERE id = ?1",
            [id.to_uri()],
            StoredRow::from_row,
        )
        .optional()
        .map_err(from_rusqlite)?;
    row.map(|r| decode_row(schema, r)).transpose()
}

pub fn load_entity(
    conn: &Connection,
    schema: &ModelSchema,
    entity: &str,
) -> Result<Vec<ObjectSnapshot>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, version, attributes, relationships FROM objects
             WHERE entity = ?1 ORDER BY id",
        )
        .map_err(from_rusqlite)?;
    let rows = stmt
        .query_map([entity], StoredRow::from_row)
        .map_err(from_rusqlite)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(from_rusqlite)?;

    rows.into_iter().map(|r| decode_row(schema, r)).collect()
}
