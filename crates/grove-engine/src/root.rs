//! Root context handle
//!
//! The root context lives inside the store's coordinator and is guarded by
//! the store commit lock, so unlike child contexts it can be shared across
//! threads. Work on it happens inside [`RootContext::perform`], which holds
//! the lock for the whole closure.

#![allow(clippy::result_large_err)]

use crate::coordinator::{fresh_object, Coordinator, Shared};
use grove_core::errors::{object_not_found, parameter_error, Result};
use grove_core::fetch::FetchRequest;
use grove_core::merge::PendingUpdate;
use grove_core::model::{ModelSchema, ObjectId, ObjectSnapshot, PropertyValue, Value};
use grove_core::{log_op_end, log_op_error, log_op_start, Strictness};
use grove_core_types::ContextId;
use std::sync::Arc;
use std::time::Instant;

/// `Send + Sync` handle onto a store's root context
#[derive(Clone)]
pub struct RootContext {
    coordinator: Arc<Coordinator>,
}

impl std::fmt::Debug for RootContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootContext")
            .field("id", self.coordinator.root_id())
            .field("store_id", self.coordinator.store_id())
            .finish()
    }
}

impl RootContext {
    pub(crate) fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    pub fn id(&self) -> &ContextId {
        self.coordinator.root_id()
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        self.coordinator.schema()
    }

    /// Run `work` with exclusive access to the root context
    ///
    /// Saves from other contexts of this store wait until `work` returns.
    pub fn perform<R>(&self, work: impl FnOnce(&mut RootEditor<'_>) -> Result<R>) -> Result<R> {
        let mut shared = self.coordinator.lock();
        let mut editor = RootEditor {
            shared: &mut *shared,
            schema: self.coordinator.schema(),
            strictness: self.coordinator.settings().strictness,
        };
        work(&mut editor)
    }

    pub fn has_changes(&self) -> bool {
        !self.coordinator.lock().staged.is_empty()
    }

    /// Discard everything staged on the root, including changes child
    /// contexts handed over with `save_to_parent`
    pub fn rollback(&self) {
        self.coordinator.lock().staged.clear();
    }

    /// Write staged changes to the store and notify every live context
    ///
    /// # Errors
    /// `Validation` or `MergeConflict`; the staged changes survive either.
    pub fn save(&self) -> Result<()> {
        let op = "root_save";
        log_op_start!(op, context_id = %self.id());
        let start = Instant::now();

        let notification = self.coordinator.save_root().map_err(|e| {
            log_op_error!(op, e.clone(), since = start);
            e
        })?;

        let committed = notification.inserted.len()
            + notification.updated.len()
            + notification.deleted.len();
        log_op_end!(
            op,
            since = start,
            save_id = %notification.save_id,
            committed = committed
        );
        Ok(())
    }
}

/// Editing access to the root context while the commit lock is held
pub struct RootEditor<'a> {
    shared: &'a mut Shared,
    schema: &'a Arc<ModelSchema>,
    strictness: Strictness,
}

impl RootEditor<'_> {
    pub fn schema(&self) -> &Arc<ModelSchema> {
        self.schema
    }

    /// Stage a new object with declared defaults applied
    pub fn insert(&mut self, entity: &str) -> Result<ObjectId> {
        let Some(description) = self.schema.entity(entity) else {
            return Err(self.strictness.escalate(
                parameter_error(
                    "insert_object",
                    format!("Entity '{}' is not part of model '{}'", entity, self.schema.name),
                )
                .with_entity(entity),
            ));
        };
        let snapshot = fresh_object(description);
        let id = snapshot.id.clone();
        self.shared.staged.inserted.insert(id.clone(), snapshot);
        Ok(id)
    }

    /// The object as the root sees it, or `None`
    pub fn get(&self, id: &ObjectId) -> Result<Option<ObjectSnapshot>> {
        self.shared.lookup(id)
    }

    pub fn set(&mut self, id: &ObjectId, name: &str, value: impl Into<Value>) -> Result<()> {
        let kind = self
            .schema
            .entity(id.entity())
            .and_then(|e| e.attribute_named(name))
            .map(|a| a.kind)
            .ok_or_else(|| {
                self.strictness.escalate(
                    parameter_error(
                        "set_attribute",
                        format!("'{}' is not an attribute of '{}'", name, id.entity()),
                    )
                    .with_entity(id.entity())
                    .with_attribute(name),
                )
            })?;
        let value = value.into();
        let value = value.coerce_to(kind).unwrap_or(value);
        self.stage(id, name, (!value.is_null()).then_some(PropertyValue::Attribute(value)))
    }

    pub fn set_related(&mut self, id: &ObjectId, name: &str, targets: Vec<ObjectId>) -> Result<()> {
        let declared = self
            .schema
            .entity(id.entity())
            .and_then(|e| e.relationship_named(name))
            .is_some();
        if !declared {
            return Err(self.strictness.escalate(
                parameter_error(
                    "set_related",
                    format!("'{}' is not a relationship of '{}'", name, id.entity()),
                )
                .with_entity(id.entity())
                .with_attribute(name),
            ));
        }
        let value = (!targets.is_empty()).then_some(PropertyValue::Relationship(targets));
        self.stage(id, name, value)
    }

    fn stage(&mut self, id: &ObjectId, name: &str, value: Option<PropertyValue>) -> Result<()> {
        let staged = &mut self.shared.staged;
        if staged.is_deleted(id) {
            return Err(object_not_found("set_property", id.to_uri()));
        }
        if let Some(snapshot) = staged.inserted.get_mut(id) {
            snapshot.set_property(name, value);
            return Ok(());
        }
        if let Some(pending) = staged.updated.get_mut(id) {
            pending.set_property(name, value);
            if !pending.is_dirty() {
                staged.updated.remove(id);
            }
            return Ok(());
        }
        let base = self
            .shared
            .store
            .load_object(id)?
            .ok_or_else(|| object_not_found("set_property", id.to_uri()))?;
        let mut pending = PendingUpdate::begin(base);
        pending.set_property(name, value);
        if pending.is_dirty() {
            self.shared.staged.updated.insert(id.clone(), pending);
        }
        Ok(())
    }

    /// Stage a delete; relationships pointing at the object are cleared
    pub fn delete(&mut self, id: &ObjectId) -> Result<()> {
        let staged = &mut self.shared.staged;
        if staged.is_deleted(id) {
            return Err(object_not_found("delete_object", id.to_uri()));
        }
        if staged.inserted.remove(id).is_none() {
            let last_known = match staged.updated.remove(id) {
                Some(pending) => pending.base,
                None => self
                    .shared
                    .store
                    .load_object(id)?
                    .ok_or_else(|| object_not_found("delete_object", id.to_uri()))?,
            };
            self.shared.staged.deleted.insert(id.clone(), last_known);
        }

        let inbound: Vec<(String, String)> = self
            .schema
            .inbound_relationships(id.entity())
            .map(|(source, relationship)| (source.name.clone(), relationship.name.clone()))
            .collect();
        for (source, relationship) in inbound {
            for (holder, snapshot) in self.shared.entity_view(&source)? {
                let targets = snapshot.related(&relationship);
                if !targets.contains(id) {
                    continue;
                }
                let remaining: Vec<ObjectId> = targets.iter().filter(|t| *t != id).cloned().collect();
                self.set_related(&holder, &relationship, remaining)?;
            }
        }
        Ok(())
    }

    /// Ids and snapshots matching `request`, in request order
    pub fn fetch(&self, request: &FetchRequest) -> Result<Vec<ObjectSnapshot>> {
        let mut rows = self.shared.entity_view(request.entity())?;
        Ok(request
            .select(rows.values())
            .into_iter()
            .filter_map(|id| rows.remove(&id))
            .collect())
    }

    pub fn count(&self, request: &FetchRequest) -> Result<usize> {
        let rows = self.shared.entity_view(request.entity())?;
        Ok(request.count(rows.values()))
    }
}
