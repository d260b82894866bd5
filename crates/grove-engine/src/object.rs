//! Handles to objects inside a context

#![allow(clippy::result_large_err)]

use crate::context::Context;
use grove_core::errors::{parameter_error, Result};
use grove_core::model::{ObjectId, ObjectSnapshot, PropertyValue, Value};
use std::fmt;

/// An object as seen through one context
///
/// The handle borrows its context, so it cannot outlive it or cross to
/// another thread. Every read goes through the context, so a handle whose
/// object has been deleted (locally or by a merged save) reports
/// `NotFound`.
#[derive(Clone)]
pub struct ManagedObject<'ctx> {
    context: &'ctx Context,
    id: ObjectId,
}

impl fmt::Debug for ManagedObject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ManagedObject").field(&self.id).finish()
    }
}

impl<'ctx> ManagedObject<'ctx> {
    pub(crate) fn new(context: &'ctx Context, id: ObjectId) -> Self {
        Self { context, id }
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn context(&self) -> &'ctx Context {
        self.context
    }

    /// Current state of the object in this context
    pub fn snapshot(&self) -> Result<ObjectSnapshot> {
        self.context.snapshot_of(&self.id, "read_object")
    }

    /// Attribute value; `Null` when unset
    ///
    /// # Errors
    /// `NotFound` if the object is gone, `Parameter` if `name` is not an
    /// attribute of the entity.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.check_attribute(name, "get_attribute")?;
        Ok(self.snapshot()?.attribute(name).clone())
    }

    pub fn related(&self, name: &str) -> Result<Vec<ObjectId>> {
        self.check_relationship(name, "get_related")?;
        Ok(self.snapshot()?.related(name).to_vec())
    }

    /// Target of a to-one relationship
    pub fn related_one(&self, name: &str) -> Result<Option<ObjectId>> {
        Ok(self.related(name)?.into_iter().next())
    }

    /// Set an attribute. Values convert to the declared kind where a
    /// lossless conversion exists; anything else is caught when saving.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<&Self> {
        let kind = self.check_attribute(name, "set_attribute")?;
        let value = value.into();
        let value = value.coerce_to(kind).unwrap_or(value);
        let staged = (!value.is_null()).then_some(PropertyValue::Attribute(value));
        self.context.stage_property(&self.id, name, staged)?;
        Ok(self)
    }

    /// Replace the targets of a relationship
    pub fn set_related(&self, name: &str, targets: Vec<ObjectId>) -> Result<&Self> {
        self.check_relationship(name, "set_related")?;
        let staged = (!targets.is_empty()).then_some(PropertyValue::Relationship(targets));
        self.context.stage_property(&self.id, name, staged)?;
        Ok(self)
    }

    /// Point a to-one relationship at `target`, or clear it
    pub fn set_related_one(&self, name: &str, target: Option<&ObjectId>) -> Result<&Self> {
        self.set_related(name, target.into_iter().cloned().collect())
    }

    /// Append a target to a relationship if it is not already there
    pub fn add_related(&self, name: &str, target: &ObjectId) -> Result<&Self> {
        let mut targets = self.related(name)?;
        if !targets.contains(target) {
            targets.push(target.clone());
        }
        self.set_related(name, targets)
    }

    pub fn remove_related(&self, name: &str, target: &ObjectId) -> Result<&Self> {
        let mut targets = self.related(name)?;
        targets.retain(|t| t != target);
        self.set_related(name, targets)
    }

    pub fn delete(&self) -> Result<()> {
        self.context.delete(&self.id)
    }

    fn check_attribute(&self, name: &str, op: &str) -> Result<grove_core::AttributeKind> {
        let schema = self.context.schema();
        let kind = schema
            .entity(self.id.entity())
            .and_then(|e| e.attribute_named(name))
            .map(|a| a.kind);
        kind.ok_or_else(|| {
            self.context.escalate(
                parameter_error(
                    op,
                    format!("'{}' is not an attribute of '{}'", name, self.id.entity()),
                )
                .with_entity(self.id.entity())
                .with_attribute(name),
            )
        })
    }

    fn check_relationship(&self, name: &str, op: &str) -> Result<()> {
        let schema = self.context.schema();
        let declared = schema
            .entity(self.id.entity())
            .and_then(|e| e.relationship_named(name))
            .is_some();
        if declared {
            return Ok(());
        }
        Err(self.context.escalate(
            parameter_error(
                op,
                format!("'{}' is not a relationship of '{}'", name, self.id.entity()),
            )
            .with_entity(self.id.entity())
            .with_attribute(name),
        ))
    }
}
