//! Merge coordinator
//!
//! One per opened store. Owns the SQLite store together with the root
//! context's staged changes behind a single mutex, so at most one write
//! transaction per store is ever in flight. Child contexts commit into the
//! root through [`Coordinator::commit_from`]; after a durable commit every
//! other subscribed context receives the change notification through its
//! mailbox.

#![allow(clippy::result_large_err)]

use crate::settings::EngineSettings;
use grove_core::errors::{ExError, ExErrorKind, Result};
use grove_core::merge::{
    reconcile_update, ChangeNotification, ChangeSet, CommittedUpdate, MergeConflict, MergePolicy,
    PendingUpdate, Reconciled,
};
use grove_core::model::{EntityDescription, ModelSchema, ObjectId, ObjectSnapshot};
use grove_core::rules::validate_changes;
use grove_core_types::{ContextId, SaveId, StoreId};
use grove_store::SqliteStore;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::Sender;
use std::sync::Arc;

pub(crate) type Mailbox = Sender<Arc<ChangeNotification>>;

/// Rows of one entity keyed by id
pub(crate) type EntityRows = BTreeMap<ObjectId, ObjectSnapshot>;

/// State guarded by the store commit lock
pub(crate) struct Shared {
    pub(crate) store: SqliteStore,
    /// Root context pending changes
    pub(crate) staged: ChangeSet,
    subscribers: BTreeMap<ContextId, Mailbox>,
}

impl Shared {
    pub(crate) fn lookup(&self, id: &ObjectId) -> Result<Option<ObjectSnapshot>> {
        match self.staged.visible(id) {
            Some(visible) => Ok(visible.cloned()),
            None => self.store.load_object(id),
        }
    }

    pub(crate) fn entity_view(&self, entity: &str) -> Result<EntityRows> {
        let mut rows: EntityRows = self
            .store
            .load_entity(entity)?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        overlay(&mut rows, &self.staged, entity);
        Ok(rows)
    }

    pub(crate) fn validate_staged(&self, schema: &ModelSchema) -> Result<()> {
        validate_against(schema, &self.staged, &mut |id| {
            Ok(self.lookup(id)?.is_some())
        })
    }

    fn absorb_child(&mut self, changes: &ChangeSet, policy: MergePolicy) -> Result<()> {
        let Shared { store, staged, .. } = self;
        let conflicts = merge_into(staged, &mut |id| store.load_object(id), changes, policy)?;
        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(conflict_error(conflicts))
        }
    }

    /// Write the staged changes in one transaction and describe the result
    fn persist(&mut self, origin: &ContextId) -> Result<ChangeNotification> {
        let versions = self.store.commit(&self.staged)?;
        let stamp = |snapshot: &ObjectSnapshot| {
            let mut stamped = snapshot.clone();
            if let Some(version) = versions.get(&stamped.id) {
                stamped.version = *version;
            }
            stamped
        };
        let notification = ChangeNotification {
            save_id: SaveId::new(),
            origin: origin.clone(),
            inserted: self.staged.inserted.values().map(|s| stamp(s)).collect(),
            updated: self
                .staged
                .updated
                .values()
                .map(|u| CommittedUpdate {
                    snapshot: stamp(&u.current),
                    changed: u.changed.clone(),
                })
                .collect(),
            deleted: self.staged.deleted.keys().cloned().collect(),
        };
        self.staged.clear();
        Ok(notification)
    }

    /// Deliver to every subscriber not in `skip`; closed mailboxes are pruned
    fn broadcast(&mut self, notification: &Arc<ChangeNotification>, skip: &BTreeSet<ContextId>) {
        if notification.is_empty() {
            return;
        }
        let mut closed = Vec::new();
        for (id, mailbox) in &self.subscribers {
            if skip.contains(id) {
                continue;
            }
            if mailbox.send(Arc::clone(notification)).is_err() {
                closed.push(id.clone());
            }
        }
        for id in closed {
            tracing::debug!(context_id = %id, "pruning closed mailbox");
            self.subscribers.remove(&id);
        }
    }
}

pub(crate) struct Coordinator {
    store_id: StoreId,
    root_id: ContextId,
    schema: Arc<ModelSchema>,
    settings: EngineSettings,
    shared: Mutex<Shared>,
}

impl Coordinator {
    pub(crate) fn new(store: SqliteStore, settings: EngineSettings) -> Self {
        Self {
            store_id: StoreId::new(),
            root_id: ContextId::new(),
            schema: Arc::clone(store.schema()),
            settings,
            shared: Mutex::new(Shared {
                store,
                staged: ChangeSet::default(),
                subscribers: BTreeMap::new(),
            }),
        }
    }

    pub(crate) fn store_id(&self) -> &StoreId {
        &self.store_id
    }

    pub(crate) fn root_id(&self) -> &ContextId {
        &self.root_id
    }

    pub(crate) fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub(crate) fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock()
    }

    pub(crate) fn subscribe(&self, id: ContextId, mailbox: Mailbox) {
        self.shared.lock().subscribers.insert(id, mailbox);
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.shared.lock().subscribers.len()
    }

    pub(crate) fn lookup(&self, id: &ObjectId) -> Result<Option<ObjectSnapshot>> {
        self.shared.lock().lookup(id)
    }

    pub(crate) fn entity_view(&self, entity: &str) -> Result<EntityRows> {
        self.shared.lock().entity_view(entity)
    }

    /// Fold a child's changes into the root and, if `persist` is set, write
    /// the root to the store.
    ///
    /// On failure the root is left exactly as it was.
    pub(crate) fn commit_from(
        &self,
        changes: &ChangeSet,
        policy: MergePolicy,
        persist: bool,
        origin: &ContextId,
        skip: &BTreeSet<ContextId>,
    ) -> Result<Arc<ChangeNotification>> {
        let mut shared = self.shared.lock();
        let before = shared.staged.clone();

        let outcome = match shared.absorb_child(changes, policy) {
            Ok(()) if persist => shared
                .validate_staged(&self.schema)
                .and_then(|()| shared.persist(origin)),
            Ok(()) => Ok(empty_notification(origin)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(notification) => {
                let notification = Arc::new(notification);
                shared.broadcast(&notification, skip);
                Ok(notification)
            }
            Err(e) => {
                shared.staged = before;
                Err(e)
            }
        }
    }

    /// Validate and write the root's own staged changes
    pub(crate) fn save_root(&self) -> Result<Arc<ChangeNotification>> {
        let mut shared = self.shared.lock();
        if shared.staged.is_empty() {
            return Ok(Arc::new(empty_notification(&self.root_id)));
        }
        shared.validate_staged(&self.schema)?;
        let notification = Arc::new(shared.persist(&self.root_id)?);
        shared.broadcast(&notification, &BTreeSet::new());
        Ok(notification)
    }
}

fn empty_notification(origin: &ContextId) -> ChangeNotification {
    ChangeNotification {
        save_id: SaveId::new(),
        origin: origin.clone(),
        inserted: Vec::new(),
        updated: Vec::new(),
        deleted: Vec::new(),
    }
}

/// New instance of `description` with declared defaults applied
pub(crate) fn fresh_object(description: &EntityDescription) -> ObjectSnapshot {
    let mut snapshot = ObjectSnapshot::new(ObjectId::new(&description.name));
    for attribute in &description.attributes {
        let initial = attribute.initial_value();
        if !initial.is_null() {
            snapshot.set_attribute(attribute.name.clone(), initial);
        }
    }
    snapshot
}

pub(crate) fn conflict_error(conflicts: Vec<MergeConflict>) -> ExError {
    let summary: Vec<String> = conflicts.iter().map(ToString::to_string).collect();
    ExError::new(ExErrorKind::MergeConflict)
        .with_op("save")
        .with_message(summary.join("; "))
        .with_conflicts(conflicts)
}

/// Apply `changes` on top of `rows` for one entity
pub(crate) fn overlay(rows: &mut EntityRows, changes: &ChangeSet, entity: &str) {
    for (id, snapshot) in &changes.inserted {
        if snapshot.entity() == entity {
            rows.insert(id.clone(), snapshot.clone());
        }
    }
    for (id, update) in &changes.updated {
        if update.current.entity() == entity {
            rows.insert(id.clone(), update.current.clone());
        }
    }
    for id in changes.deleted.keys() {
        rows.remove(id);
    }
}

/// Check `changes` against the schema. `exists` resolves relationship
/// targets through the saving context.
pub(crate) fn validate_against(
    schema: &ModelSchema,
    changes: &ChangeSet,
    exists: &mut dyn FnMut(&ObjectId) -> Result<bool>,
) -> Result<()> {
    let targets: BTreeSet<&ObjectId> = changes
        .inserted
        .values()
        .chain(changes.updated.values().map(|u| &u.current))
        .flat_map(|s| s.relationships.values().flatten())
        .collect();

    let mut existing = BTreeSet::new();
    for target in targets {
        if exists(target)? {
            existing.insert(target.clone());
        }
    }

    validate_changes(schema, changes, |target| existing.contains(target))
        .map_err(|failure| ExError::from(failure).with_op("save"))
}

/// Commit `child` into `parent`.
///
/// `upstream` resolves objects the parent has not staged itself. Returns
/// the conflicts the child's merge policy did not resolve; `parent` may be
/// partially updated when conflicts are returned.
pub(crate) fn merge_into(
    parent: &mut ChangeSet,
    upstream: &mut dyn FnMut(&ObjectId) -> Result<Option<ObjectSnapshot>>,
    child: &ChangeSet,
    policy: MergePolicy,
) -> Result<Vec<MergeConflict>> {
    let mut conflicts = Vec::new();

    for (id, snapshot) in &child.inserted {
        parent.inserted.insert(id.clone(), snapshot.clone());
    }

    for (id, update) in &child.updated {
        let current = match parent.visible(id) {
            Some(visible) => visible.cloned(),
            None => upstream(id)?,
        };
        match reconcile_update(update, current.as_ref(), policy) {
            Reconciled::Apply { merged, changed } => {
                if let Some(current) = current {
                    stage_merged(parent, current, merged, &changed);
                }
            }
            Reconciled::Dropped => {
                tracing::debug!(object_id = %id, "update dropped, object deleted in parent");
            }
            Reconciled::Conflicts(mut found) => conflicts.append(&mut found),
        }
    }

    for id in child.deleted.keys() {
        if parent.inserted.remove(id).is_some() {
            continue;
        }
        let current = match parent.visible(id) {
            Some(visible) => visible.cloned(),
            None => upstream(id)?,
        };
        let base = parent.updated.remove(id).map(|pending| pending.base);
        if let Some(last_known) = base.or(current) {
            parent.deleted.insert(id.clone(), last_known);
        }
    }

    Ok(conflicts)
}

fn stage_merged(
    parent: &mut ChangeSet,
    current: ObjectSnapshot,
    merged: ObjectSnapshot,
    changed: &BTreeSet<String>,
) {
    if changed.is_empty() {
        return;
    }
    let id = merged.id.clone();
    if let Some(inserted) = parent.inserted.get_mut(&id) {
        *inserted = merged;
        return;
    }
    let pending = parent
        .updated
        .entry(id.clone())
        .or_insert_with(|| PendingUpdate::begin(current));
    for name in changed {
        pending.set_property(name, merged.property(name));
    }
    if !pending.is_dirty() {
        parent.updated.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::model::{PropertyValue, Value};

    fn snapshot(name: &str) -> ObjectSnapshot {
        let mut snap = ObjectSnapshot::new(ObjectId::new("Item"));
        snap.set_attribute("name", Value::from(name));
        snap.version = 1;
        snap
    }

    fn renamed(base: &ObjectSnapshot, name: &str) -> PendingUpdate {
        let mut update = PendingUpdate::begin(base.clone());
        update.set_property("name", Some(PropertyValue::Attribute(Value::from(name))));
        update
    }

    #[test]
    fn test_merge_into_stages_update_on_parent_base() {
        let stored = snapshot("A");
        let mut child = ChangeSet::default();
        child
            .updated
            .insert(stored.id.clone(), renamed(&stored, "B"));

        let mut parent = ChangeSet::default();
        let conflicts = merge_into(
            &mut parent,
            &mut |_| Ok(Some(stored.clone())),
            &child,
            MergePolicy::RaiseConflict,
        )
        .unwrap();

        assert!(conflicts.is_empty());
        let staged = &parent.updated[&stored.id];
        assert_eq!(staged.base, stored);
        assert_eq!(staged.current.attribute("name"), &Value::from("B"));
        assert_eq!(staged.current.version, 1);
    }

    #[test]
    fn test_merge_into_folds_delete_of_parent_insert() {
        let fresh = snapshot("new");
        let mut parent = ChangeSet::default();
        parent.inserted.insert(fresh.id.clone(), fresh.clone());
        let mut child = ChangeSet::default();
        child.deleted.insert(fresh.id.clone(), fresh.clone());

        merge_into(&mut parent, &mut |_| Ok(None), &child, MergePolicy::KeepStoreWins).unwrap();
        assert!(parent.is_empty());
    }

    #[test]
    fn test_merge_into_reports_conflicts() {
        let stored = snapshot("A");
        let mut moved = stored.clone();
        moved.set_attribute("name", Value::from("C"));
        let mut child = ChangeSet::default();
        child
            .updated
            .insert(stored.id.clone(), renamed(&stored, "B"));

        let mut parent = ChangeSet::default();
        let conflicts = merge_into(
            &mut parent,
            &mut |_| Ok(Some(moved.clone())),
            &child,
            MergePolicy::RaiseConflict,
        )
        .unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflict_error(conflicts).kind(), ExErrorKind::MergeConflict);
    }

    #[test]
    fn test_overlay() {
        let kept = snapshot("kept");
        let gone = snapshot("gone");
        let mut rows: EntityRows = [kept.clone(), gone.clone()]
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        let added = snapshot("added");
        let mut changes = ChangeSet::default();
        changes.inserted.insert(added.id.clone(), added.clone());
        changes.deleted.insert(gone.id.clone(), gone.clone());

        overlay(&mut rows, &changes, "Item");
        assert!(rows.contains_key(&kept.id));
        assert!(rows.contains_key(&added.id));
        assert!(!rows.contains_key(&gone.id));
    }
}
