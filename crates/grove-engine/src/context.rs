//! Thread-confined editing contexts
//!
//! A [`Context`] stages inserts, updates and deletes on top of its parent,
//! which is either the store's root context or another context on the same
//! thread. Reads that miss the local cache fault through the parent chain
//! down to the store. Contexts are deliberately `!Send`: move object ids
//! between threads and re-fetch them on the other side.
//!
//! Change notifications from saves made elsewhere queue up in the context's
//! mailbox and are merged at the start of its next operation.

#![allow(clippy::result_large_err)]

use crate::coordinator::{
    conflict_error, fresh_object, merge_into, overlay, validate_against, Coordinator, EntityRows,
};
use crate::fetch_exec::FetchResults;
use crate::object::ManagedObject;
use grove_core::errors::{object_not_found, parameter_error, ExError, ExErrorKind, Result};
use grove_core::fetch::{FetchRequest, FetchRequestBuilder};
use grove_core::merge::{
    absorb_committed, ChangeNotification, ChangeSet, MergePolicy, PendingUpdate,
};
use grove_core::model::{ModelSchema, ObjectId, ObjectSnapshot, PropertyValue};
use grove_core::{log_op_end, log_op_error, log_op_start};
use grove_core_types::ContextId;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Instant;

pub(crate) type StateRef = Rc<RefCell<ContextState>>;

pub(crate) struct ContextState {
    id: ContextId,
    coordinator: Arc<Coordinator>,
    parent: Option<StateRef>,
    policy: MergePolicy,
    changes: ChangeSet,
    /// Clean snapshots read from the parent chain
    cache: BTreeMap<ObjectId, ObjectSnapshot>,
    mailbox: Receiver<Arc<ChangeNotification>>,
}

impl ContextState {
    fn new(coordinator: Arc<Coordinator>, parent: Option<StateRef>, policy: MergePolicy) -> Self {
        let id = ContextId::new();
        let (sender, mailbox) = mpsc::channel();
        coordinator.subscribe(id.clone(), sender);
        Self {
            id,
            coordinator,
            parent,
            policy,
            changes: ChangeSet::default(),
            cache: BTreeMap::new(),
            mailbox,
        }
    }

    /// Merge every queued notification; returns how many there were
    pub(crate) fn drain_mailbox(&mut self) -> usize {
        let mut merged = 0;
        while let Ok(notification) = self.mailbox.try_recv() {
            self.absorb(&notification);
            merged += 1;
        }
        merged
    }

    /// Notifications can arrive after this context has already seen a newer
    /// version (its own save refreshes the cache first), so anything not
    /// newer than what is held locally is skipped.
    fn absorb(&mut self, notification: &ChangeNotification) {
        for committed in &notification.updated {
            let id = &committed.snapshot.id;
            let version = committed.snapshot.version;
            if let Some(pending) = self.changes.updated.get_mut(id) {
                let dirty = absorb_committed(
                    pending,
                    &committed.snapshot,
                    &committed.changed,
                    self.policy,
                );
                if !dirty {
                    if let Some(clean) = self.changes.updated.remove(id) {
                        self.cache.insert(id.clone(), clean.current);
                    }
                }
            } else if let Some(last_known) = self.changes.deleted.get_mut(id) {
                if version > last_known.version {
                    *last_known = committed.snapshot.clone();
                }
            } else if let Some(cached) = self.cache.get_mut(id) {
                if version > cached.version {
                    *cached = committed.snapshot.clone();
                }
            }
        }
        for id in &notification.deleted {
            self.cache.remove(id);
            self.changes.deleted.remove(id);
        }
        tracing::debug!(
            context_id = %self.id,
            save_id = %notification.save_id,
            "merged change notification"
        );
    }

    /// Refresh caches after a save this context took part in
    fn apply_committed(&mut self, notification: &ChangeNotification) {
        for snapshot in &notification.inserted {
            self.cache.insert(snapshot.id.clone(), snapshot.clone());
        }
        for committed in &notification.updated {
            self.cache
                .insert(committed.snapshot.id.clone(), committed.snapshot.clone());
        }
        for id in &notification.deleted {
            self.cache.remove(id);
        }
    }

    /// The object as seen from this context
    pub(crate) fn lookup(&mut self, id: &ObjectId) -> Result<Option<ObjectSnapshot>> {
        self.drain_mailbox();
        if let Some(visible) = self.changes.visible(id) {
            return Ok(visible.cloned());
        }
        self.upstream(id)
    }

    /// The object as seen from the parent chain, via the local cache
    fn upstream(&mut self, id: &ObjectId) -> Result<Option<ObjectSnapshot>> {
        if let Some(cached) = self.cache.get(id) {
            return Ok(Some(cached.clone()));
        }
        let found = match &self.parent {
            Some(parent) => parent.borrow_mut().lookup(id)?,
            None => self.coordinator.lookup(id)?,
        };
        if let Some(snapshot) = &found {
            self.cache.insert(id.clone(), snapshot.clone());
        }
        Ok(found)
    }

    pub(crate) fn entity_view(&mut self, entity: &str) -> Result<EntityRows> {
        self.drain_mailbox();
        let mut rows = match &self.parent {
            Some(parent) => parent.borrow_mut().entity_view(entity)?,
            None => self.coordinator.entity_view(entity)?,
        };
        for (id, snapshot) in &rows {
            if let Some(cached) = self.cache.get_mut(id) {
                *cached = snapshot.clone();
            }
        }
        overlay(&mut rows, &self.changes, entity);
        Ok(rows)
    }

    fn schema(&self) -> Arc<ModelSchema> {
        Arc::clone(self.coordinator.schema())
    }

    fn escalate(&self, err: ExError) -> ExError {
        self.coordinator.settings().strictness.escalate(err)
    }

    pub(crate) fn insert(&mut self, entity: &str) -> Result<ObjectId> {
        let schema = self.schema();
        let Some(description) = schema.entity(entity) else {
            return Err(self.escalate(
                parameter_error(
                    "insert_object",
                    format!("Entity '{}' is not part of model '{}'", entity, schema.name),
                )
                .with_entity(entity),
            ));
        };

        let snapshot = fresh_object(description);
        let id = snapshot.id.clone();
        self.changes.inserted.insert(id.clone(), snapshot);
        Ok(id)
    }

    /// Write one property; `None` clears it
    pub(crate) fn stage_property(
        &mut self,
        id: &ObjectId,
        name: &str,
        value: Option<PropertyValue>,
    ) -> Result<()> {
        self.drain_mailbox();
        if self.changes.is_deleted(id) {
            return Err(object_not_found("set_property", id.to_uri()));
        }
        if let Some(snapshot) = self.changes.inserted.get_mut(id) {
            snapshot.set_property(name, value);
            return Ok(());
        }
        if let Some(pending) = self.changes.updated.get_mut(id) {
            pending.set_property(name, value);
            if !pending.is_dirty() {
                if let Some(clean) = self.changes.updated.remove(id) {
                    self.cache.insert(id.clone(), clean.current);
                }
            }
            return Ok(());
        }

        let base = self
            .upstream(id)?
            .ok_or_else(|| object_not_found("set_property", id.to_uri()))?;
        let mut pending = PendingUpdate::begin(base);
        pending.set_property(name, value);
        if pending.is_dirty() {
            self.changes.updated.insert(id.clone(), pending);
        }
        Ok(())
    }

    pub(crate) fn delete(&mut self, id: &ObjectId) -> Result<()> {
        self.drain_mailbox();
        if self.changes.is_deleted(id) {
            return Err(object_not_found("delete_object", id.to_uri()));
        }
        if self.changes.inserted.remove(id).is_none() {
            let last_known = match self.changes.updated.remove(id) {
                Some(pending) => pending.base,
                None => self
                    .upstream(id)?
                    .ok_or_else(|| object_not_found("delete_object", id.to_uri()))?,
            };
            self.cache.remove(id);
            self.changes.deleted.insert(id.clone(), last_known);
        }
        self.nullify_references(id)
    }

    /// Remove `target` from every relationship that points at it
    fn nullify_references(&mut self, target: &ObjectId) -> Result<()> {
        let schema = self.schema();
        let inbound: Vec<(String, String)> = schema
            .inbound_relationships(target.entity())
            .map(|(source, relationship)| (source.name.clone(), relationship.name.clone()))
            .collect();

        for (source, relationship) in inbound {
            for (id, snapshot) in self.entity_view(&source)? {
                let targets = snapshot.related(&relationship);
                if !targets.contains(target) {
                    continue;
                }
                let remaining: Vec<ObjectId> =
                    targets.iter().filter(|t| *t != target).cloned().collect();
                let value = (!remaining.is_empty()).then_some(PropertyValue::Relationship(remaining));
                self.stage_property(&id, &relationship, value)?;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let schema = self.schema();
        let changes = std::mem::take(&mut self.changes);
        let outcome = validate_against(&schema, &changes, &mut |target| {
            if changes.is_deleted(target) {
                return Ok(false);
            }
            if changes.inserted.contains_key(target) {
                return Ok(true);
            }
            Ok(self.upstream(target)?.is_some())
        });
        self.changes = changes;
        outcome
    }

    /// Commit a child's changes into this context
    fn merge_from(&mut self, child: &ChangeSet, policy: MergePolicy) -> Result<()> {
        let mut staged = std::mem::take(&mut self.changes);
        let outcome = merge_into(&mut staged, &mut |id| self.upstream(id), child, policy);
        self.changes = staged;
        let conflicts = outcome?;
        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(conflict_error(conflicts))
        }
    }
}

/// Handle to a thread-confined editing context
///
/// Cloning the handle shares the context.
#[derive(Clone)]
pub struct Context {
    inner: StateRef,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("Context")
            .field("id", &state.id)
            .field("policy", &state.policy)
            .field("nested", &state.parent.is_some())
            .finish()
    }
}

/// Saved state of one context, for restoring after a failed save
type Checkpoint = (ChangeSet, BTreeMap<ObjectId, ObjectSnapshot>);

impl Context {
    /// New child of the store's root context
    pub(crate) fn attached_to_root(coordinator: Arc<Coordinator>) -> Self {
        let policy = coordinator.settings().merge_policy;
        Self {
            inner: Rc::new(RefCell::new(ContextState::new(coordinator, None, policy))),
        }
    }

    /// New child of this context, on the same thread
    pub fn new_child(&self) -> Context {
        let (coordinator, policy) = {
            let state = self.inner.borrow();
            (Arc::clone(&state.coordinator), state.policy)
        };
        Self {
            inner: Rc::new(RefCell::new(ContextState::new(
                coordinator,
                Some(Rc::clone(&self.inner)),
                policy,
            ))),
        }
    }

    pub fn id(&self) -> ContextId {
        self.inner.borrow().id.clone()
    }

    pub fn schema(&self) -> Arc<ModelSchema> {
        self.inner.borrow().schema()
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.inner.borrow().policy
    }

    pub fn set_merge_policy(&self, policy: MergePolicy) {
        self.inner.borrow_mut().policy = policy;
    }

    /// Whether this context's parent is another context rather than the root
    pub fn is_nested(&self) -> bool {
        self.inner.borrow().parent.is_some()
    }

    pub(crate) fn escalate(&self, err: ExError) -> ExError {
        self.inner.borrow().escalate(err)
    }

    /// Insert a new object of `entity`, with declared defaults applied
    ///
    /// # Errors
    /// `Parameter` if `entity` is not part of the model.
    pub fn insert(&self, entity: &str) -> Result<ManagedObject<'_>> {
        let id = self.inner.borrow_mut().insert(entity)?;
        Ok(ManagedObject::new(self, id))
    }

    /// Handle for an object visible in this context
    ///
    /// # Errors
    /// `NotFound` if the object was deleted, never existed or is unknown to
    /// the store.
    pub fn object(&self, id: &ObjectId) -> Result<ManagedObject<'_>> {
        if self.inner.borrow_mut().lookup(id)?.is_none() {
            return Err(object_not_found("object", id.to_uri()));
        }
        Ok(ManagedObject::new(self, id.clone()))
    }

    pub fn contains(&self, id: &ObjectId) -> Result<bool> {
        Ok(self.inner.borrow_mut().lookup(id)?.is_some())
    }

    /// Delete an object; relationships pointing at it are cleared
    pub fn delete(&self, id: &ObjectId) -> Result<()> {
        self.inner.borrow_mut().delete(id)
    }

    /// Start a fetch request against this context's model
    pub fn request(&self, entity: impl Into<String>) -> FetchRequestBuilder {
        FetchRequestBuilder::new(self.schema(), entity)
    }

    /// Execute a fetch request
    ///
    /// # Errors
    /// `Parameter` if the request names an entity outside this model.
    pub fn fetch(&self, request: &FetchRequest) -> Result<FetchResults<'_>> {
        let op = "fetch";
        log_op_start!(op, entity = request.entity());
        let start = Instant::now();

        let results = self.fetch_impl(request).map_err(|e| {
            log_op_error!(op, e.clone(), since = start);
            e
        })?;

        log_op_end!(op, since = start, result_len = results.len());
        Ok(results)
    }

    fn fetch_impl(&self, request: &FetchRequest) -> Result<FetchResults<'_>> {
        self.check_entity(request.entity(), "fetch")?;
        let batch_size = request
            .batch_size()
            .unwrap_or_else(|| self.inner.borrow().coordinator.settings().default_batch_size);

        let rows = self.inner.borrow_mut().entity_view(request.entity())?;
        let ids = request.select(rows.values());
        if batch_size == 0 {
            let mut state = self.inner.borrow_mut();
            for id in &ids {
                if state.changes.visible(id).is_some() {
                    continue;
                }
                if let Some(snapshot) = rows.get(id) {
                    state.cache.insert(id.clone(), snapshot.clone());
                }
            }
        }
        Ok(FetchResults::new(self, ids, batch_size))
    }

    /// Number of objects a fetch would return
    ///
    /// # Errors
    /// `FetchCount` when the store cannot be read.
    pub fn count(&self, request: &FetchRequest) -> Result<usize> {
        self.check_entity(request.entity(), "count")?;
        let rows = self
            .inner
            .borrow_mut()
            .entity_view(request.entity())
            .map_err(|e| {
                ExError::new(ExErrorKind::FetchCount)
                    .with_op("count")
                    .with_entity(request.entity())
                    .with_message(format!("Counting failed: {}", e.message()))
                    .with_source(e)
            })?;
        Ok(request.count(rows.values()))
    }

    fn check_entity(&self, entity: &str, op: &str) -> Result<()> {
        let schema = self.schema();
        if schema.entity(entity).is_some() {
            return Ok(());
        }
        Err(self.escalate(
            parameter_error(
                op,
                format!("Entity '{}' is not part of model '{}'", entity, schema.name),
            )
            .with_entity(entity),
        ))
    }

    /// Fault `ids` into the local cache
    pub(crate) fn materialize(&self, ids: &[ObjectId]) -> Result<()> {
        let mut state = self.inner.borrow_mut();
        for id in ids {
            state.lookup(id)?;
        }
        Ok(())
    }

    pub(crate) fn snapshot_of(&self, id: &ObjectId, op: &str) -> Result<ObjectSnapshot> {
        self.inner
            .borrow_mut()
            .lookup(id)?
            .ok_or_else(|| object_not_found(op, id.to_uri()))
    }

    pub(crate) fn stage_property(
        &self,
        id: &ObjectId,
        name: &str,
        value: Option<PropertyValue>,
    ) -> Result<()> {
        self.inner.borrow_mut().stage_property(id, name, value)
    }

    pub fn has_changes(&self) -> bool {
        !self.inner.borrow().changes.is_empty()
    }

    /// Pending `(inserted, updated, deleted)` counts
    pub fn pending_counts(&self) -> (usize, usize, usize) {
        self.inner.borrow().changes.counts()
    }

    /// Merge queued change notifications now; returns how many were merged
    pub fn process_pending_changes(&self) -> usize {
        self.inner.borrow_mut().drain_mailbox()
    }

    /// Discard all pending changes
    pub fn rollback(&self) {
        self.inner.borrow_mut().changes.clear();
    }

    /// Drop the cached state of one object so the next read faults it in
    pub fn refresh(&self, id: &ObjectId) {
        self.inner.borrow_mut().cache.remove(id);
    }

    /// Discard pending changes and every cached object
    pub fn reset(&self) {
        let mut state = self.inner.borrow_mut();
        state.changes.clear();
        state.cache.clear();
    }

    /// This context followed by its ancestors, root-most last
    fn chain(&self) -> Vec<StateRef> {
        let mut chain = vec![Rc::clone(&self.inner)];
        loop {
            let parent = chain
                .last()
                .and_then(|state| state.borrow().parent.clone());
            match parent {
                Some(parent) => chain.push(parent),
                None => return chain,
            }
        }
    }

    /// Commit pending changes all the way to the store
    ///
    /// # Errors
    /// - `Validation` if a pending object breaks the model's rules
    /// - `MergeConflict` if the merge policy leaves conflicts, or the store
    ///   changed underneath the commit
    ///
    /// On error every context in the chain is restored to its state before
    /// the call.
    pub fn save(&self) -> Result<()> {
        let op = "context_save";
        let context_id = self.id();
        log_op_start!(op, context_id = %context_id);
        let start = Instant::now();

        let committed = self.commit_chain(true).map_err(|e| {
            log_op_error!(op, e.clone(), since = start);
            e
        })?;

        log_op_end!(
            op,
            since = start,
            context_id = %context_id,
            committed = committed
        );
        Ok(())
    }

    /// Commit pending changes into the parent only
    pub fn save_to_parent(&self) -> Result<()> {
        let op = "context_save_to_parent";
        let context_id = self.id();
        log_op_start!(op, context_id = %context_id);
        let start = Instant::now();

        let committed = self.commit_chain(false).map_err(|e| {
            log_op_error!(op, e.clone(), since = start);
            e
        })?;

        log_op_end!(
            op,
            since = start,
            context_id = %context_id,
            committed = committed
        );
        Ok(())
    }

    /// Returns the number of objects committed
    fn commit_chain(&self, durable: bool) -> Result<usize> {
        let chain = if durable {
            self.chain()
        } else {
            vec![Rc::clone(&self.inner)]
        };
        for state in &chain {
            state.borrow_mut().drain_mailbox();
        }

        let pending = {
            let mut state = self.inner.borrow_mut();
            if state.changes.is_empty() {
                return Ok(0);
            }
            state.validate()?;
            let (inserted, updated, deleted) = state.changes.counts();
            inserted + updated + deleted
        };

        let checkpoints: Vec<Checkpoint> = chain
            .iter()
            .map(|state| {
                let state = state.borrow();
                (state.changes.clone(), state.cache.clone())
            })
            .collect();

        match self.push_up(&chain, durable) {
            Ok(notification) => {
                for state in &chain {
                    let mut state = state.borrow_mut();
                    state.changes.clear();
                    state.apply_committed(&notification);
                }
                Ok(pending)
            }
            Err(e) => {
                for (state, (changes, cache)) in chain.iter().zip(checkpoints) {
                    let mut state = state.borrow_mut();
                    state.changes = changes;
                    state.cache = cache;
                }
                Err(e)
            }
        }
    }

    fn push_up(&self, chain: &[StateRef], durable: bool) -> Result<Arc<ChangeNotification>> {
        for pair in chain.windows(2) {
            let child = pair[0].borrow();
            pair[1].borrow_mut().merge_from(&child.changes, child.policy)?;
        }

        let last = chain
            .last()
            .ok_or_else(|| ExError::new(ExErrorKind::Internal).with_op("save"))?;
        let state = last.borrow();

        match &state.parent {
            // Only a single-level save of a nested context stops here.
            Some(parent) => {
                parent.borrow_mut().merge_from(&state.changes, state.policy)?;
                Ok(Arc::new(self.committed_locally(&state.changes)))
            }
            None => {
                let skip: BTreeSet<ContextId> =
                    chain.iter().map(|s| s.borrow().id.clone()).collect();
                let notification = state.coordinator.commit_from(
                    &state.changes,
                    state.policy,
                    durable,
                    &state.id,
                    &skip,
                )?;
                if durable {
                    Ok(notification)
                } else {
                    Ok(Arc::new(self.committed_locally(&state.changes)))
                }
            }
        }
    }

    /// Notification-shaped summary of changes handed to a parent, used to
    /// refresh the child's cache
    fn committed_locally(&self, changes: &ChangeSet) -> ChangeNotification {
        ChangeNotification {
            save_id: grove_core_types::SaveId::new(),
            origin: self.id(),
            inserted: changes.inserted.values().cloned().collect(),
            updated: changes
                .updated
                .values()
                .map(|u| grove_core::merge::CommittedUpdate {
                    snapshot: u.current.clone(),
                    changed: u.changed.clone(),
                })
                .collect(),
            deleted: changes.deleted.keys().cloned().collect(),
        }
    }
}
