//! Object identity and snapshots

use super::value::Value;
use crate::errors::{ExError, ExErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const URI_SCHEME: &str = "grove://";

/// Stable identifier of a persistent object
///
/// Assigned at insert time and never changes. Renders as
/// `grove://<Entity>/<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId {
    entity: String,
    key: Uuid,
}

impl ObjectId {
    /// Allocate a fresh id for `entity`
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            key: Uuid::now_v7(),
        }
    }

    pub fn from_parts(entity: impl Into<String>, key: Uuid) -> Self {
        Self {
            entity: entity.into(),
            key,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn key(&self) -> Uuid {
        self.key
    }

    pub fn to_uri(&self) -> String {
        format!("{}{}/{}", URI_SCHEME, self.entity, self.key)
    }

    /// Parse a `grove://<Entity>/<uuid>` URI
    pub fn parse(uri: &str) -> Result<Self, ExError> {
        let invalid = || {
            ExError::new(ExErrorKind::Parameter)
                .with_op("parse_object_id")
                .with_message(format!("'{}' is not an object id", uri))
        };
        let rest = uri.strip_prefix(URI_SCHEME).ok_or_else(invalid)?;
        let (entity, key) = rest.rsplit_once('/').ok_or_else(invalid)?;
        if entity.is_empty() {
            return Err(invalid());
        }
        let key = Uuid::parse_str(key).map_err(|_| invalid())?;
        Ok(Self::from_parts(entity, key))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", URI_SCHEME, self.entity, self.key)
    }
}

impl FromStr for ObjectId {
    type Err = ExError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = ExError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.to_uri()
    }
}

/// Value of a single named property
///
/// Attributes and relationships share one namespace per entity, so
/// change tracking and conflict detection address both through this type.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Attribute(Value),
    Relationship(Vec<ObjectId>),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Attribute(v) => write!(f, "{}", v),
            PropertyValue::Relationship(targets) => {
                let rendered: Vec<String> = targets.iter().map(|t| t.to_uri()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
        }
    }
}

/// Materialized state of one object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSnapshot {
    pub id: ObjectId,
    /// Durable row version; 0 until first persisted
    pub version: u64,
    pub attributes: BTreeMap<String, Value>,
    pub relationships: BTreeMap<String, Vec<ObjectId>>,
}

impl ObjectSnapshot {
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            version: 0,
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn entity(&self) -> &str {
        self.id.entity()
    }

    /// Attribute value, `Null` when unset
    pub fn attribute(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.attributes.get(name).unwrap_or(&NULL)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
    }

    /// Relationship targets, empty when unset
    pub fn related(&self, name: &str) -> &[ObjectId] {
        self.relationships
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn set_related(&mut self, name: impl Into<String>, targets: Vec<ObjectId>) {
        self.relationships.insert(name.into(), targets);
    }

    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        if let Some(v) = self.attributes.get(name) {
            return Some(PropertyValue::Attribute(v.clone()));
        }
        self.relationships
            .get(name)
            .map(|t| PropertyValue::Relationship(t.clone()))
    }

    /// Set or clear a property; `None` removes it from both maps
    pub fn set_property(&mut self, name: &str, value: Option<PropertyValue>) {
        match value {
            Some(PropertyValue::Attribute(v)) => {
                self.attributes.insert(name.to_string(), v);
            }
            Some(PropertyValue::Relationship(t)) => {
                self.relationships.insert(name.to_string(), t);
            }
            None => {
                self.attributes.remove(name);
                self.relationships.remove(name);
            }
        }
    }

    /// Names of relationships that reference `target`
    pub fn references_to(&self, target: &ObjectId) -> Vec<String> {
        self.relationships
            .iter()
            .filter(|(_, targets)| targets.contains(target))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// JSON object of attribute values, for persistence and display
    pub fn attributes_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}
