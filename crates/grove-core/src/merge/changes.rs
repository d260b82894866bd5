//! Pending changes and committed-change payloads

use crate::model::{ObjectId, ObjectSnapshot, PropertyValue};
use grove_core_types::{ContextId, SaveId};
use std::collections::{BTreeMap, BTreeSet};

/// Local edits to an object that exists in the parent
///
/// `base` is the object as it was read from the parent when the first edit
/// was made; it is the reference point for conflict detection.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    pub base: ObjectSnapshot,
    pub current: ObjectSnapshot,
    pub changed: BTreeSet<String>,
}

impl PendingUpdate {
    pub fn begin(base: ObjectSnapshot) -> Self {
        Self {
            current: base.clone(),
            base,
            changed: BTreeSet::new(),
        }
    }

    /// Write a property; reverting to the base value un-marks it
    pub fn set_property(&mut self, name: &str, value: Option<PropertyValue>) {
        self.current.set_property(name, value);
        if self.current.property(name) == self.base.property(name) {
            self.changed.remove(name);
        } else {
            self.changed.insert(name.to_string());
        }
    }

    pub fn is_dirty(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn id(&self) -> &ObjectId {
        &self.current.id
    }
}

/// Everything a context has staged but not yet committed to its parent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub inserted: BTreeMap<ObjectId, ObjectSnapshot>,
    pub updated: BTreeMap<ObjectId, PendingUpdate>,
    /// Deleted objects with their last known state
    pub deleted: BTreeMap<ObjectId, ObjectSnapshot>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn is_deleted(&self, id: &ObjectId) -> bool {
        self.deleted.contains_key(id)
    }

    /// The locally visible state of `id`, if this change set determines it.
    ///
    /// `Some(None)` means the object is deleted here.
    pub fn visible(&self, id: &ObjectId) -> Option<Option<&ObjectSnapshot>> {
        if self.deleted.contains_key(id) {
            return Some(None);
        }
        if let Some(snapshot) = self.inserted.get(id) {
            return Some(Some(snapshot));
        }
        self.updated.get(id).map(|u| Some(&u.current))
    }

    pub fn clear(&mut self) {
        self.inserted.clear();
        self.updated.clear();
        self.deleted.clear();
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (self.inserted.len(), self.updated.len(), self.deleted.len())
    }
}

/// A committed update as broadcast to other contexts
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedUpdate {
    pub snapshot: ObjectSnapshot,
    pub changed: BTreeSet<String>,
}

/// Broadcast after a durable save to every other live context of a store
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub save_id: SaveId,
    pub origin: ContextId,
    pub inserted: Vec<ObjectSnapshot>,
    pub updated: Vec<CommittedUpdate>,
    pub deleted: Vec<ObjectId>,
}

impl ChangeNotification {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    #[test]
    fn test_reverting_an_edit_clears_the_mark() {
        let mut base = ObjectSnapshot::new(ObjectId::new("Item"));
        base.set_attribute("name", Value::from("A"));
        let mut update = PendingUpdate::begin(base);

        update.set_property("name", Some(PropertyValue::Attribute(Value::from("B"))));
        assert!(update.is_dirty());

        update.set_property("name", Some(PropertyValue::Attribute(Value::from("A"))));
        assert!(!update.is_dirty());
    }

    #[test]
    fn test_visible_prefers_deletion() {
        let mut changes = ChangeSet::default();
        let snap = ObjectSnapshot::new(ObjectId::new("Item"));
        let id = snap.id.clone();
        changes.inserted.insert(id.clone(), snap.clone());
        assert_eq!(changes.visible(&id), Some(Some(&snap)));

        changes.deleted.insert(id.clone(), snap);
        assert_eq!(changes.visible(&id), Some(None));
        assert_eq!(changes.visible(&ObjectId::new("Item")), None);
    }
}
