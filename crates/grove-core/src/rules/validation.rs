//! Schema validation of pending changes before a save commits

use crate::errors::{ExError, ExErrorKind};
use crate::merge::ChangeSet;
use crate::model::{AttributeKind, ModelSchema, ObjectId, ObjectSnapshot, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("entity '{entity}' is not part of the model")]
    UnknownEntity { entity: String, object_id: String },

    #[error("'{entity}.{property}' is not declared")]
    UnknownProperty {
        entity: String,
        object_id: String,
        property: String,
    },

    #[error("'{entity}.{property}' is required")]
    MissingRequired {
        entity: String,
        object_id: String,
        property: String,
    },

    #[error("'{entity}.{property}' expects {expected}, found {found}")]
    KindMismatch {
        entity: String,
        object_id: String,
        property: String,
        expected: AttributeKind,
        found: String,
    },

    #[error("'{entity}.{property}' must be a finite number, found {found}")]
    NonFiniteNumber {
        entity: String,
        object_id: String,
        property: String,
        found: String,
    },

    #[error("'{entity}.{property}' is to-one but holds {count} targets")]
    ToOneCardinality {
        entity: String,
        object_id: String,
        property: String,
        count: usize,
    },

    #[error("'{entity}.{property}' must reference {expected}, found {found}")]
    WrongDestination {
        entity: String,
        object_id: String,
        property: String,
        expected: String,
        found: String,
    },

    #[error("'{entity}.{property}' references {target}, which does not exist")]
    DanglingReference {
        entity: String,
        object_id: String,
        property: String,
        target: String,
    },
}

impl ValidationFailure {
    fn parts(&self) -> (&str, &str, Option<&str>) {
        match self {
            ValidationFailure::UnknownEntity { entity, object_id } => (entity, object_id, None),
            ValidationFailure::UnknownProperty {
                entity,
                object_id,
                property,
            }
            | ValidationFailure::MissingRequired {
                entity,
                object_id,
                property,
            }
            | ValidationFailure::KindMismatch {
                entity,
                object_id,
                property,
                ..
            }
            | ValidationFailure::NonFiniteNumber {
                entity,
                object_id,
                property,
                ..
            }
            | ValidationFailure::ToOneCardinality {
                entity,
                object_id,
                property,
                ..
            }
            | ValidationFailure::WrongDestination {
                entity,
                object_id,
                property,
                ..
            }
            | ValidationFailure::DanglingReference {
                entity,
                object_id,
                property,
                ..
            } => (entity, object_id, Some(property)),
        }
    }
}

impl From<ValidationFailure> for ExError {
    fn from(failure: ValidationFailure) -> Self {
        let (entity, object_id, property) = failure.parts();
        let mut ex = ExError::new(ExErrorKind::Validation)
            .with_entity(entity)
            .with_object_id(object_id)
            .with_message(failure.to_string());
        if let Some(property) = property {
            ex = ex.with_attribute(property);
        }
        ex
    }
}

/// Validate every inserted and updated object in `changes`.
///
/// `exists` answers whether a relationship target is visible to the saving
/// context (and not deleted there). Objects are checked in id order, so the
/// reported failure is deterministic.
pub fn validate_changes(
    schema: &ModelSchema,
    changes: &ChangeSet,
    exists: impl Fn(&ObjectId) -> bool,
) -> Result<(), ValidationFailure> {
    let candidates = changes
        .inserted
        .values()
        .chain(changes.updated.values().map(|u| &u.current));
    for snapshot in candidates {
        validate_object(schema, snapshot, &exists)?;
    }
    Ok(())
}

pub fn validate_object(
    schema: &ModelSchema,
    snapshot: &ObjectSnapshot,
    exists: &impl Fn(&ObjectId) -> bool,
) -> Result<(), ValidationFailure> {
    let entity_name = snapshot.entity().to_string();
    let object_id = snapshot.id.to_uri();
    let entity = schema
        .entity(&entity_name)
        .ok_or_else(|| ValidationFailure::UnknownEntity {
            entity: entity_name.clone(),
            object_id: object_id.clone(),
        })?;

    let undeclared = snapshot
        .attributes
        .keys()
        .find(|name| entity.attribute_named(name).is_none())
        .or_else(|| {
            snapshot
                .relationships
                .keys()
                .find(|name| entity.relationship_named(name).is_none())
        });
    if let Some(property) = undeclared {
        return Err(ValidationFailure::UnknownProperty {
            entity: entity_name,
            object_id,
            property: property.clone(),
        });
    }

    for attribute in &entity.attributes {
        let value = snapshot.attribute(&attribute.name);
        if value.is_null() {
            if !attribute.optional {
                return Err(ValidationFailure::MissingRequired {
                    entity: entity_name,
                    object_id,
                    property: attribute.name.clone(),
                });
            }
            continue;
        }
        if value.kind() != Some(attribute.kind) {
            return Err(ValidationFailure::KindMismatch {
                entity: entity_name,
                object_id,
                property: attribute.name.clone(),
                expected: attribute.kind,
                found: describe(value),
            });
        }
        // JSON has no NaN or infinity
        if let Value::Double(d) = value {
            if !d.is_finite() {
                return Err(ValidationFailure::NonFiniteNumber {
                    entity: entity_name,
                    object_id,
                    property: attribute.name.clone(),
                    found: d.to_string(),
                });
            }
        }
    }

    for relationship in &entity.relationships {
        let targets = snapshot.related(&relationship.name);
        if targets.is_empty() && !relationship.optional {
            return Err(ValidationFailure::MissingRequired {
                entity: entity_name,
                object_id,
                property: relationship.name.clone(),
            });
        }
        if !relationship.to_many && targets.len() > 1 {
            return Err(ValidationFailure::ToOneCardinality {
                entity: entity_name,
                object_id,
                property: relationship.name.clone(),
                count: targets.len(),
            });
        }
        for target in targets {
            if target.entity() != relationship.destination {
                return Err(ValidationFailure::WrongDestination {
                    entity: entity_name,
                    object_id,
                    property: relationship.name.clone(),
                    expected: relationship.destination.clone(),
                    found: target.entity().to_string(),
                });
            }
            if !exists(target) {
                return Err(ValidationFailure::DanglingReference {
                    entity: entity_name,
                    object_id,
                    property: relationship.name.clone(),
                    target: target.to_uri(),
                });
            }
        }
    }

    Ok(())
}

fn describe(value: &Value) -> String {
    match value.kind() {
        Some(kind) => format!("{} {}", kind, value),
        None => value.to_string(),
    }
}
