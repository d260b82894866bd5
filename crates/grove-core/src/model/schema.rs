//! Model schema: entities, attributes and relationships
//!
//! A schema is loaded once per model and shared as `Arc<ModelSchema>`.
//! Names must be unique per entity across attributes and relationships so
//! that conflict detection can address both uniformly by property name.

use super::value::{AttributeKind, Value};
use crate::errors::{ExError, ExErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Structural problems in a model schema
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("model name must not be empty")]
    EmptyModelName,

    #[error("model '{model}' declares no entities")]
    NoEntities { model: String },

    #[error("entity '{entity}' is declared more than once")]
    DuplicateEntity { entity: String },

    #[error("entity '{entity}' declares property '{property}' more than once")]
    DuplicateProperty { entity: String, property: String },

    #[error("relationship '{entity}.{relationship}' targets unknown entity '{destination}'")]
    UnknownDestination {
        entity: String,
        relationship: String,
        destination: String,
    },

    #[error("default for '{entity}.{attribute}' is not a valid {kind}")]
    InvalidDefault {
        entity: String,
        attribute: String,
        kind: AttributeKind,
    },
}

impl From<SchemaError> for ExError {
    fn from(err: SchemaError) -> Self {
        let base = ExError::new(ExErrorKind::StoreOpen).with_message(err.to_string());
        match err {
            SchemaError::DuplicateEntity { entity }
            | SchemaError::NoEntities { model: entity } => base.with_entity(entity),
            SchemaError::DuplicateProperty { entity, property } => {
                base.with_entity(entity).with_attribute(property)
            }
            SchemaError::UnknownDestination {
                entity,
                relationship,
                ..
            } => base.with_entity(entity).with_attribute(relationship),
            SchemaError::InvalidDefault {
                entity, attribute, ..
            } => base.with_entity(entity).with_attribute(attribute),
            SchemaError::EmptyModelName => base,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDescription {
    pub name: String,
    pub kind: AttributeKind,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl AttributeDescription {
    /// Decoded default value, if one is declared and matches the kind
    pub fn default_value(&self) -> Option<Value> {
        self.default
            .as_ref()
            .and_then(|json| Value::from_json(json, self.kind))
    }

    /// Value a freshly inserted object starts with
    pub fn initial_value(&self) -> Value {
        self.default_value().unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDescription {
    pub name: String,
    pub destination: String,
    #[serde(default)]
    pub to_many: bool,
    #[serde(default = "default_true")]
    pub optional: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescription {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeDescription>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDescription>,
}

impl EntityDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Add a required attribute
    pub fn attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.push(AttributeDescription {
            name: name.into(),
            kind,
            optional: false,
            default: None,
        });
        self
    }

    /// Add an optional attribute
    pub fn optional_attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.push(AttributeDescription {
            name: name.into(),
            kind,
            optional: true,
            default: None,
        });
        self
    }

    /// Add a required attribute with a default value
    pub fn defaulted_attribute(
        mut self,
        name: impl Into<String>,
        kind: AttributeKind,
        default: Value,
    ) -> Self {
        self.attributes.push(AttributeDescription {
            name: name.into(),
            kind,
            optional: false,
            default: Some(default.to_json()),
        });
        self
    }

    /// Add an optional to-one relationship
    pub fn to_one(mut self, name: impl Into<String>, destination: impl Into<String>) -> Self {
        self.relationships.push(RelationshipDescription {
            name: name.into(),
            destination: destination.into(),
            to_many: false,
            optional: true,
        });
        self
    }

    /// Add a required to-one relationship
    pub fn required_to_one(
        mut self,
        name: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        self.relationships.push(RelationshipDescription {
            name: name.into(),
            destination: destination.into(),
            to_many: false,
            optional: false,
        });
        self
    }

    /// Add a to-many relationship
    pub fn to_many(mut self, name: impl Into<String>, destination: impl Into<String>) -> Self {
        self.relationships.push(RelationshipDescription {
            name: name.into(),
            destination: destination.into(),
            to_many: true,
            optional: true,
        });
        self
    }

    pub fn attribute_named(&self, name: &str) -> Option<&AttributeDescription> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn relationship_named(&self, name: &str) -> Option<&RelationshipDescription> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.attribute_named(name).is_some() || self.relationship_named(name).is_some()
    }
}

/// Immutable description of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub entities: Vec<EntityDescription>,
}

fn default_version() -> u32 {
    1
}

impl ModelSchema {
    /// Build and validate a schema
    pub fn new(
        name: impl Into<String>,
        entities: Vec<EntityDescription>,
    ) -> Result<Self, SchemaError> {
        let schema = Self {
            name: name.into(),
            version: default_version(),
            entities,
        };
        schema.validate()?;
        Ok(schema)
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDescription> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.name.as_str())
    }

    /// Relationships anywhere in the model whose destination is `entity`,
    /// as `(source entity, relationship)` pairs
    pub fn inbound_relationships<'a>(
        &'a self,
        entity: &'a str,
    ) -> impl Iterator<Item = (&'a EntityDescription, &'a RelationshipDescription)> + 'a {
        self.entities.iter().flat_map(move |source| {
            source
                .relationships
                .iter()
                .filter(move |r| r.destination == entity)
                .map(move |r| (source, r))
        })
    }

    /// Check structural consistency
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::EmptyModelName);
        }
        if self.entities.is_empty() {
            return Err(SchemaError::NoEntities {
                model: self.name.clone(),
            });
        }

        let mut entity_names = BTreeSet::new();
        for entity in &self.entities {
            if !entity_names.insert(entity.name.as_str()) {
                return Err(SchemaError::DuplicateEntity {
                    entity: entity.name.clone(),
                });
            }
        }

        for entity in &self.entities {
            let mut properties = BTreeSet::new();
            let names = entity
                .attributes
                .iter()
                .map(|a| a.name.as_str())
                .chain(entity.relationships.iter().map(|r| r.name.as_str()));
            for name in names {
                if !properties.insert(name) {
                    return Err(SchemaError::DuplicateProperty {
                        entity: entity.name.clone(),
                        property: name.to_string(),
                    });
                }
            }

            for attribute in &entity.attributes {
                if attribute.default.is_some() && attribute.default_value().is_none() {
                    return Err(SchemaError::InvalidDefault {
                        entity: entity.name.clone(),
                        attribute: attribute.name.clone(),
                        kind: attribute.kind,
                    });
                }
            }

            for relationship in &entity.relationships {
                if !entity_names.contains(relationship.destination.as_str()) {
                    return Err(SchemaError::UnknownDestination {
                        entity: entity.name.clone(),
                        relationship: relationship.name.clone(),
                        destination: relationship.destination.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
