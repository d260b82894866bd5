//! Lightweight model migration
//!
//! When a store was last written with a different schema, compare the two
//! and either rewrite stored rows to fit the current schema or refuse to
//! open. Only changes that can be applied without guessing data are
//! accepted.

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, from_serde_json, Result};
use crate::metadata;
use grove_core::errors::{ExError, ExErrorKind};
use grove_core::model::{AttributeKind, ModelSchema, Value};
use rusqlite::{Connection, Transaction};
use thiserror::Error;

/// One row-rewriting step of a compatible migration
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationStep {
    AddEntity {
        entity: String,
    },
    RemoveEntity {
        entity: String,
    },
    /// New attribute; rows get `default` (or stay unset when `None`)
    AddAttribute {
        entity: String,
        attribute: String,
        default: Option<Value>,
    },
    RemoveAttribute {
        entity: String,
        attribute: String,
    },
    /// Attribute became required; null rows are filled with `default`
    FillRequired {
        entity: String,
        attribute: String,
        default: Value,
    },
    AddRelationship {
        entity: String,
        relationship: String,
    },
    RemoveRelationship {
        entity: String,
        relationship: String,
    },
}

/// A difference that cannot be applied automatically
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IncompatibleChange {
    #[error("store belongs to model '{stored}', not '{current}'")]
    ModelMismatch { stored: String, current: String },

    #[error("'{entity}.{attribute}' changed kind from {from} to {to}")]
    KindChanged {
        entity: String,
        attribute: String,
        from: AttributeKind,
        to: AttributeKind,
    },

    #[error("'{entity}.{attribute}' is required but has no default for existing rows")]
    RequiredWithoutDefault { entity: String, attribute: String },

    #[error("'{entity}.{relationship}' changed between to-one and to-many")]
    CardinalityChanged { entity: String, relationship: String },

    #[error("'{entity}.{relationship}' changed destination from {from} to {to}")]
    DestinationChanged {
        entity: String,
        relationship: String,
        from: String,
        to: String,
    },

    #[error("'{entity}.{relationship}' became required")]
    RelationshipRequired { entity: String, relationship: String },

    #[error("'{entity}.{property}' changed between attribute and relationship")]
    PropertyKindChanged { entity: String, property: String },
}

impl From<IncompatibleChange> for ExError {
    fn from(change: IncompatibleChange) -> Self {
        ExError::new(ExErrorKind::Migration)
            .with_op("migrate_model")
            .with_message(change.to_string())
    }
}

/// Compute the steps that turn `stored` into `current`
pub fn plan_migration(
    stored: &ModelSchema,
    current: &ModelSchema,
) -> std::result::Result<Vec<MigrationStep>, IncompatibleChange> {
    if stored.name != current.name {
        return Err(IncompatibleChange::ModelMismatch {
            stored: stored.name.clone(),
            current: current.name.clone(),
        });
    }

    let mut steps = Vec::new();

    for old in &stored.entities {
        if current.entity(&old.name).is_none() {
            steps.push(MigrationStep::RemoveEntity {
                entity: old.name.clone(),
            });
        }
    }

    for new in &current.entities {
        let Some(old) = stored.entity(&new.name) else {
            steps.push(MigrationStep::AddEntity {
                entity: new.name.clone(),
            });
            continue;
        };
        let entity = new.name.clone();

        for attr in &new.attributes {
            if old.relationship_named(&attr.name).is_some() {
                return Err(IncompatibleChange::PropertyKindChanged {
                    entity,
                    property: attr.name.clone(),
                });
            }
            match old.attribute_named(&attr.name) {
                None => {
                    let default = attr.default_value();
                    if !attr.optional && default.is_none() {
                        return Err(IncompatibleChange::RequiredWithoutDefault {
                            entity,
                            attribute: attr.name.clone(),
                        });
                    }
                    steps.push(MigrationStep::AddAttribute {
                        entity: entity.clone(),
                        attribute: attr.name.clone(),
                        default,
                    });
                }
                Some(prev) if prev.kind != attr.kind => {
                    return Err(IncompatibleChange::KindChanged {
                        entity,
                        attribute: attr.name.clone(),
                        from: prev.kind,
                        to: attr.kind,
                    });
                }
                Some(prev) if prev.optional && !attr.optional => match attr.default_value() {
                    Some(default) => steps.push(MigrationStep::FillRequired {
                        entity: entity.clone(),
                        attribute: attr.name.clone(),
                        default,
                    }),
                    None => {
                        return Err(IncompatibleChange::RequiredWithoutDefault {
                            entity,
                            attribute: attr.name.clone(),
                        })
                    }
                },
                Some(_) => {}
            }
        }

        for attr in &old.attributes {
            if new.attribute_named(&attr.name).is_none() && !new.has_property(&attr.name) {
                steps.push(MigrationStep::RemoveAttribute {
                    entity: entity.clone(),
                    attribute: attr.name.clone(),
                });
            }
        }

        for rel in &new.relationships {
            if old.attribute_named(&rel.name).is_some() {
                return Err(IncompatibleChange::PropertyKindChanged {
                    entity,
                    property: rel.name.clone(),
                });
            }
            match old.relationship_named(&rel.name) {
                None => {
                    if !rel.optional {
                        return Err(IncompatibleChange::RelationshipRequired {
                            entity,
                            relationship: rel.name.clone(),
                        });
                    }
                    steps.push(MigrationStep::AddRelationship {
                        entity: entity.clone(),
                        relationship: rel.name.clone(),
                    });
                }
                Some(prev) if prev.to_many != rel.to_many => {
                    return Err(IncompatibleChange::CardinalityChanged {
                        entity,
                        relationship: rel.name.clone(),
                    });
                }
                Some(prev) if prev.destination != rel.destination => {
                    return Err(IncompatibleChange::DestinationChanged {
                        entity,
                        relationship: rel.name.clone(),
                        from: prev.destination.clone(),
                        to: rel.destination.clone(),
                    });
                }
                Some(prev) if prev.optional && !rel.optional => {
                    return Err(IncompatibleChange::RelationshipRequired {
                        entity,
                        relationship: rel.name.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        for rel in &old.relationships {
            if !new.has_property(&rel.name) {
                steps.push(MigrationStep::RemoveRelationship {
                    entity: entity.clone(),
                    relationship: rel.name.clone(),
                });
            }
        }
    }

    Ok(steps)
}

/// Bring the store at `conn` in line with `current`.
///
/// A fresh store just records the schema. Returns the steps applied.
pub fn migrate_model(conn: &mut Connection, current: &ModelSchema) -> Result<Vec<MigrationStep>> {
    let Some(stored) = metadata::stored_schema(conn)? else {
        metadata::record_schema(conn, current)?;
        return Ok(Vec::new());
    };
    if &stored == current {
        return Ok(Vec::new());
    }

    let steps = plan_migration(&stored, current)?;

    let tx = conn.transaction().map_err(from_rusqlite)?;
    for step in &steps {
        apply_step(&tx, step)?;
    }
    metadata::record_schema(&tx, current)?;
    tx.commit().map_err(from_rusqlite)?;

    tracing::debug!(
        model = %current.name,
        from_version = stored.version,
        to_version = current.version,
        steps = steps.len(),
        "migrated store model"
    );
    Ok(steps)
}

fn apply_step(tx: &Transaction, step: &MigrationStep) -> Result<()> {
    match step {
        MigrationStep::AddEntity { .. } | MigrationStep::AddRelationship { .. } => Ok(()),
        MigrationStep::RemoveEntity { entity } => {
            tx.execute("DELETE FROM objects WHERE entity = ?1", [entity])
                .map_err(from_rusqlite)?;
            Ok(())
        }
        MigrationStep::AddAttribute {
            entity,
            attribute,
            default,
        } => match default {
            Some(value) => rewrite_column(tx, entity, "attributes", |doc| {
                doc.entry(attribute.clone()).or_insert_with(|| value.to_json());
            }),
            None => Ok(()),
        },
        MigrationStep::FillRequired {
            entity,
            attribute,
            default,
        } => rewrite_column(tx, entity, "attributes", |doc| {
            let slot = doc
                .entry(attribute.clone())
                .or_insert(serde_json::Value::Null);
            if slot.is_null() {
                *slot = default.to_json();
            }
        }),
        MigrationStep::RemoveAttribute { entity, attribute } => {
            rewrite_column(tx, entity, "attributes", |doc| {
                doc.remove(attribute);
            })
        }
        MigrationStep::RemoveRelationship {
            entity,
            relationship,
        } => rewrite_column(tx, entity, "relationships", |doc| {
            doc.remove(relationship);
        }),
    }
}

/// Rewrite the JSON document in `column` for every row of `entity`
fn rewrite_column(
    tx: &Transaction,
    entity: &str,
    column: &str,
    edit: impl Fn(&mut serde_json::Map<String, serde_json::Value>),
) -> Result<()> {
    let rows: Vec<(String, String)> = {
        let mut stmt = tx
            .prepare(&format!(
                "SELECT id, {} FROM objects WHERE entity = ?1",
                column
            ))
            .map_err(from_rusqlite)?;
        let rows = stmt
            .query_map([entity], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        rows
    };

    let update = format!("UPDATE objects SET {} = ?1 WHERE id = ?2", column);
    for (id, raw) in rows {
        let mut doc: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&raw).map_err(|e| from_serde_json("migrate_model", e))?;
        edit(&mut doc);
        let rewritten =
            serde_json::to_string(&doc).map_err(|e| from_serde_json("migrate_model", e))?;
        tx.execute(&update, rusqlite::params![rewritten, id])
            .map_err(from_rusqlite)?;
    }
    Ok(())
}
