//! Per-property conflict detection and resolution
//!
//! A property conflicts when the context changed it and the parent's
//! current value differs from the value the context originally read.
//! Identical edits on both sides never conflict.

use super::changes::PendingUpdate;
use super::policy::MergePolicy;
use crate::model::{ObjectId, ObjectSnapshot, PropertyValue};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    /// Both sides changed the same property to different values
    PropertyChanged,
    /// The object was deleted in the parent while edited locally
    ObjectDeleted,
    /// The stored row version moved underneath the commit
    VersionMismatch { expected: u64, found: u64 },
}

/// One unresolved clash, attached to a failed save
#[derive(Debug, Clone, PartialEq)]
pub struct MergeConflict {
    pub object_id: ObjectId,
    pub property: Option<String>,
    pub kind: ConflictKind,
    /// Value the context originally read
    pub base: Option<PropertyValue>,
    /// Value the context tried to write
    pub local: Option<PropertyValue>,
    /// Value currently in the parent
    pub current: Option<PropertyValue>,
}

impl MergeConflict {
    pub fn object_deleted(object_id: ObjectId) -> Self {
        Self {
            object_id,
            property: None,
            kind: ConflictKind::ObjectDeleted,
            base: None,
            local: None,
            current: None,
        }
    }

    pub fn version_mismatch(object_id: ObjectId, expected: u64, found: u64) -> Self {
        Self {
            object_id,
            property: None,
            kind: ConflictKind::VersionMismatch { expected, found },
            base: None,
            local: None,
            current: None,
        }
    }
}

impl fmt::Display for MergeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConflictKind::PropertyChanged => write!(
                f,
                "{}.{} changed concurrently",
                self.object_id,
                self.property.as_deref().unwrap_or("?")
            ),
            ConflictKind::ObjectDeleted => write!(f, "{} was deleted", self.object_id),
            ConflictKind::VersionMismatch { expected, found } => write!(
                f,
                "{} is at version {} (expected {})",
                self.object_id, found, expected
            ),
        }
    }
}

/// Outcome of committing one pending update into a parent
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// Write `merged` into the parent; `changed` are the properties that
    /// actually take the local value
    Apply {
        merged: ObjectSnapshot,
        changed: BTreeSet<String>,
    },
    /// Local changes discarded (object gone, store wins)
    Dropped,
    Conflicts(Vec<MergeConflict>),
}

/// Commit-side resolution: fold `update` onto the parent's current state
pub fn reconcile_update(
    update: &PendingUpdate,
    parent_current: Option<&ObjectSnapshot>,
    policy: MergePolicy,
) -> Reconciled {
    let Some(parent) = parent_current else {
        return match policy {
            MergePolicy::KeepStoreWins => Reconciled::Dropped,
            _ => Reconciled::Conflicts(vec![MergeConflict::object_deleted(update.id().clone())]),
        };
    };

    let mut merged = parent.clone();
    let mut changed = BTreeSet::new();
    let mut conflicts = Vec::new();

    for name in &update.changed {
        let base = update.base.property(name);
        let current = parent.property(name);
        let local = update.current.property(name);

        if current == base {
            merged.set_property(name, local);
            changed.insert(name.clone());
            continue;
        }
        if current == local {
            continue;
        }
        match policy {
            MergePolicy::KeepStoreWins => {}
            MergePolicy::KeepLocalWins => {
                merged.set_property(name, local);
                changed.insert(name.clone());
            }
            MergePolicy::RaiseConflict => conflicts.push(MergeConflict {
                object_id: update.id().clone(),
                property: Some(name.clone()),
                kind: ConflictKind::PropertyChanged,
                base,
                local,
                current,
            }),
        }
    }

    if conflicts.is_empty() {
        Reconciled::Apply { merged, changed }
    } else {
        Reconciled::Conflicts(conflicts)
    }
}

/// Receive-side resolution: absorb a committed update into a context that
/// has its own pending edits of the same object.
///
/// A committed version at or below the update's base is already reflected
/// in it and is ignored. Returns whether the object is still dirty
/// afterwards.
pub fn absorb_committed(
    update: &mut PendingUpdate,
    committed: &ObjectSnapshot,
    committed_changed: &BTreeSet<String>,
    policy: MergePolicy,
) -> bool {
    if committed.version <= update.base.version {
        return update.is_dirty();
    }
    for name in committed_changed {
        let incoming = committed.property(name);
        if !update.changed.contains(name) {
            update.current.set_property(name, incoming.clone());
            update.base.set_property(name, incoming);
            continue;
        }
        if update.current.property(name) == incoming {
            update.base.set_property(name, incoming);
            update.changed.remove(name);
            continue;
        }
        match policy {
            MergePolicy::KeepStoreWins => {
                update.current.set_property(name, incoming.clone());
                update.base.set_property(name, incoming);
                update.changed.remove(name);
            }
            MergePolicy::KeepLocalWins => update.base.set_property(name, incoming),
            MergePolicy::RaiseConflict => {}
        }
    }
    update.base.version = committed.version;
    update.current.version = committed.version;
    update.is_dirty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    fn attr(v: &str) -> Option<PropertyValue> {
        Some(PropertyValue::Attribute(Value::from(v)))
    }

    fn base() -> ObjectSnapshot {
        let mut snap = ObjectSnapshot::new(ObjectId::new("Item"));
        snap.set_attribute("name", Value::from("A"));
        snap.set_attribute("note", Value::from("n"));
        snap
    }

    fn edited(name: &str) -> PendingUpdate {
        let mut update = PendingUpdate::begin(base());
        update.set_property("name", attr(name));
        update
    }

    #[test]
    fn test_no_conflict_when_parent_unchanged() {
        let update = edited("B");
        let Reconciled::Apply { merged, changed } =
            reconcile_update(&update, Some(&update.base), MergePolicy::RaiseConflict)
        else {
            panic!("expected apply");
        };
        assert_eq!(merged.attribute("name"), &Value::from("B"));
        assert!(changed.contains("name"));
    }

    #[test]
    fn test_untouched_properties_take_parent_values() {
        let update = edited("B");
        let mut parent = update.base.clone();
        parent.set_attribute("note", Value::from("fresh"));
        let Reconciled::Apply { merged, .. } =
            reconcile_update(&update, Some(&parent), MergePolicy::RaiseConflict)
        else {
            panic!("expected apply");
        };
        assert_eq!(merged.attribute("note"), &Value::from("fresh"));
        assert_eq!(merged.attribute("name"), &Value::from("B"));
    }

    #[test]
    fn test_policies_on_clashing_edit() {
        let update = edited("B");
        let mut parent = update.base.clone();
        parent.set_attribute("name", Value::from("C"));

        match reconcile_update(&update, Some(&parent), MergePolicy::KeepStoreWins) {
            Reconciled::Apply { merged, changed } => {
                assert_eq!(merged.attribute("name"), &Value::from("C"));
                assert!(changed.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
        match reconcile_update(&update, Some(&parent), MergePolicy::KeepLocalWins) {
            Reconciled::Apply { merged, .. } => {
                assert_eq!(merged.attribute("name"), &Value::from("B"))
            }
            other => panic!("unexpected {:?}", other),
        }
        match reconcile_update(&update, Some(&parent), MergePolicy::RaiseConflict) {
            Reconciled::Conflicts(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].property.as_deref(), Some("name"));
                assert_eq!(conflicts[0].current, attr("C"));
                assert_eq!(conflicts[0].local, attr("B"));
                assert_eq!(conflicts[0].base, attr("A"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_identical_edits_do_not_conflict() {
        let update = edited("B");
        let mut parent = update.base.clone();
        parent.set_attribute("name", Value::from("B"));
        assert!(matches!(
            reconcile_update(&update, Some(&parent), MergePolicy::RaiseConflict),
            Reconciled::Apply { .. }
        ));
    }

    #[test]
    fn test_update_versus_delete() {
        let update = edited("B");
        assert_eq!(
            reconcile_update(&update, None, MergePolicy::KeepStoreWins),
            Reconciled::Dropped
        );
        assert!(matches!(
            reconcile_update(&update, None, MergePolicy::KeepLocalWins),
            Reconciled::Conflicts(_)
        ));
    }

    #[test]
    fn test_absorb_refreshes_untouched_properties() {
        let mut update = edited("B");
        let mut committed = update.base.clone();
        committed.version = 2;
        committed.set_attribute("note", Value::from("fresh"));
        let changed = BTreeSet::from(["note".to_string()]);

        assert!(absorb_committed(
            &mut update,
            &committed,
            &changed,
            MergePolicy::RaiseConflict
        ));
        assert_eq!(update.current.attribute("note"), &Value::from("fresh"));
        assert_eq!(update.current.attribute("name"), &Value::from("B"));
        assert_eq!(update.base.version, 2);
    }

    #[test]
    fn test_absorb_policies_on_clash() {
        let mut committed = base();
        committed.version = 1;
        committed.set_attribute("name", Value::from("C"));
        let changed = BTreeSet::from(["name".to_string()]);

        let mut store_wins = edited("B");
        assert!(!absorb_committed(
            &mut store_wins,
            &committed,
            &changed,
            MergePolicy::KeepStoreWins
        ));
        assert_eq!(store_wins.current.attribute("name"), &Value::from("C"));

        let mut local_wins = edited("B");
        assert!(absorb_committed(
            &mut local_wins,
            &committed,
            &changed,
            MergePolicy::KeepLocalWins
        ));
        assert_eq!(local_wins.current.attribute("name"), &Value::from("B"));
        assert_eq!(local_wins.base.attribute("name"), &Value::from("C"));

        let mut raise = edited("B");
        assert!(absorb_committed(
            &mut raise,
            &committed,
            &changed,
            MergePolicy::RaiseConflict
        ));
        assert_eq!(raise.base.attribute("name"), &Value::from("A"));
    }

    #[test]
    fn test_absorb_ignores_versions_already_seen() {
        let mut stored = base();
        stored.version = 3;
        let mut update = PendingUpdate::begin(stored.clone());
        update.set_property("name", attr("Mine"));

        let mut stale = stored.clone();
        stale.version = 2;
        stale.set_attribute("name", Value::from("Old"));
        stale.set_attribute("note", Value::from("old note"));
        let changed: BTreeSet<String> = ["name".to_string(), "note".to_string()].into();

        assert!(absorb_committed(&mut update, &stale, &changed, MergePolicy::KeepStoreWins));
        assert_eq!(update.current.property("name"), attr("Mine"));
        assert_eq!(update.base.property("note"), attr("n"));
        assert_eq!(update.base.version, 3);
    }
}
