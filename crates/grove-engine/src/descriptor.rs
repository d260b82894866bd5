//! Store descriptors
//!
//! A [`StoreDescriptor`] is the single shared access point for one model's
//! persistent store. Seeding and encryption are configured on it before the
//! store opens; the store itself opens lazily, the first time a context or
//! the root is asked for.

#![allow(clippy::result_large_err)]

use crate::context::Context;
use crate::coordinator::Coordinator;
use crate::root::RootContext;
use crate::settings::EngineSettings;
use crate::thread_registry;
use grove_core::errors::{parameter_error, ExError, ExErrorKind, Result};
use grove_core::model::ModelSchema;
use grove_core::{log_op_end, log_op_error, log_op_start};
use grove_store::seed::{install_from_bundle, install_seed};
use grove_store::{paths, FileProtection, ResourceBundle, SeedOutcome, SqliteStore, StoreOptions};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Default)]
struct DescriptorState {
    /// Encryption requested before open
    encrypted: bool,
    seeded: bool,
    coordinator: Option<Arc<Coordinator>>,
}

pub struct StoreDescriptor {
    model: String,
    schema: Arc<ModelSchema>,
    path: PathBuf,
    settings: EngineSettings,
    bundle: Arc<dyn ResourceBundle>,
    protection: Arc<dyn FileProtection>,
    state: Mutex<DescriptorState>,
}

impl std::fmt::Debug for StoreDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreDescriptor")
            .field("model", &self.model)
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}

impl StoreDescriptor {
    pub(crate) fn new(
        schema: Arc<ModelSchema>,
        path: PathBuf,
        settings: EngineSettings,
        bundle: Arc<dyn ResourceBundle>,
        protection: Arc<dyn FileProtection>,
    ) -> Self {
        Self {
            model: schema.name.clone(),
            schema,
            path,
            settings,
            bundle,
            protection,
            state: Mutex::new(DescriptorState::default()),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub fn store_path(&self) -> &Path {
        &self.path
    }

    /// `file://` URL of the store file
    pub fn store_url(&self) -> String {
        paths::store_url(&self.path)
    }

    /// Whether the store file exists right now
    pub fn store_exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().coordinator.is_some()
    }

    /// Whether the store is (or will be opened) protected
    pub fn is_store_encrypted(&self) -> bool {
        let state = self.state.lock();
        if let Some(coordinator) = &state.coordinator {
            return coordinator
                .lock()
                .store
                .is_encrypted()
                .unwrap_or(state.encrypted);
        }
        if state.encrypted {
            return true;
        }
        self.store_exists()
            && SqliteStore::inspect(&self.path)
                .map(|meta| meta.encrypted)
                .unwrap_or(false)
    }

    /// Request file protection for the store
    ///
    /// Only effective before the store opens. Afterwards the call is a
    /// contract violation: it panics under `Strictness::Abort` and is
    /// logged and ignored otherwise.
    pub fn set_store_encrypted(&self, encrypted: bool) {
        let mut state = self.state.lock();
        if state.coordinator.is_some() {
            let err = self.settings.strictness.escalate(
                ExError::new(ExErrorKind::StoreAlreadyOpen)
                    .with_op("set_store_encrypted")
                    .with_message(format!(
                        "Store for model '{}' is already open; encryption can no longer change",
                        self.model
                    )),
            );
            tracing::warn!(model = %self.model, err_code = err.code(), "{}", err.message());
            return;
        }
        state.encrypted = encrypted;
    }

    /// Install `source` as the store file unless one already exists
    ///
    /// # Errors
    /// - `SeedTooLate` once the store is open
    /// - `SeedSourceMissing` / `SeedCopy` from the installer
    pub fn use_pre_seeded_file(&self, source: &Path) -> Result<SeedOutcome> {
        self.seed_with("use_pre_seeded_file", |target| install_seed(source, target))
    }

    /// Install `<Model>.sqlite` from the resource bundle
    ///
    /// # Errors
    /// As [`StoreDescriptor::use_pre_seeded_file`], plus
    /// `SeedNotFoundInBundle` when the bundle lacks the resource.
    pub fn use_pre_seeded_file_from_bundle(&self) -> Result<SeedOutcome> {
        let bundle = Arc::clone(&self.bundle);
        let model = self.model.clone();
        self.seed_with("use_pre_seeded_file_from_bundle", move |target| {
            install_from_bundle(bundle.as_ref(), &model, target)
        })
    }

    fn seed_with(
        &self,
        op: &'static str,
        install: impl FnOnce(&Path) -> Result<SeedOutcome>,
    ) -> Result<SeedOutcome> {
        log_op_start!(op, model = %self.model);
        let start = Instant::now();

        let outcome = self.seed_inner(op, install).map_err(|e| {
            log_op_error!(op, e.clone(), since = start);
            e
        })?;

        log_op_end!(
            op,
            since = start,
            outcome = ?outcome
        );
        Ok(outcome)
    }

    fn seed_inner(
        &self,
        op: &str,
        install: impl FnOnce(&Path) -> Result<SeedOutcome>,
    ) -> Result<SeedOutcome> {
        let mut state = self.state.lock();
        if state.coordinator.is_some() {
            return Err(self.settings.strictness.escalate(
                ExError::new(ExErrorKind::SeedTooLate)
                    .with_op(op)
                    .with_message(format!(
                        "Store for model '{}' is already open; seeding must happen first",
                        self.model
                    )),
            ));
        }
        if state.seeded {
            let err = self.settings.strictness.escalate(parameter_error(
                op,
                format!("Store for model '{}' was already seeded", self.model),
            ));
            tracing::warn!(model = %self.model, err_code = err.code(), "{}", err.message());
            return Ok(SeedOutcome::StoreAlreadyPresent);
        }

        let outcome = install(&self.path)?;
        state.seeded = true;
        Ok(outcome)
    }

    /// Open the store now. Later calls are no-ops.
    ///
    /// # Errors
    /// `StoreOpen` for an unreadable or corrupt file, `Migration` when the
    /// file's model cannot be migrated to the current one.
    pub fn open(&self) -> Result<()> {
        self.coordinator().map(|_| ())
    }

    pub(crate) fn coordinator(&self) -> Result<Arc<Coordinator>> {
        let mut state = self.state.lock();
        if let Some(coordinator) = &state.coordinator {
            return Ok(Arc::clone(coordinator));
        }

        let op = "store_open";
        log_op_start!(op, model = %self.model);
        let start = Instant::now();

        let options = StoreOptions {
            encrypted: state.encrypted,
            protection: Arc::clone(&self.protection),
        };
        let store = SqliteStore::open(&self.path, Arc::clone(&self.schema), &options).map_err(|e| {
            log_op_error!(op, e.clone(), since = start);
            e
        })?;
        let migrated = store.migration_steps().len();
        let coordinator = Arc::new(Coordinator::new(store, self.settings));

        log_op_end!(
            op,
            since = start,
            store_id = %coordinator.store_id(),
            migration_steps = migrated
        );
        state.coordinator = Some(Arc::clone(&coordinator));
        Ok(coordinator)
    }

    /// Shared handle onto the store's root context
    pub fn root_context(&self) -> Result<RootContext> {
        Ok(RootContext::new(self.coordinator()?))
    }

    /// The calling thread's context for this store
    ///
    /// Created on first use as a child of the root. The same context is
    /// returned on every call from this thread until it is discarded or the
    /// thread exits.
    pub fn context_for_current_thread(&self) -> Result<Context> {
        Ok(thread_registry::context_for(&self.coordinator()?))
    }

    /// Drop the calling thread's registered context with its pending
    /// changes; returns whether there was one
    pub fn discard_current_thread_context(&self) -> bool {
        let state = self.state.lock();
        match &state.coordinator {
            Some(coordinator) => thread_registry::discard(coordinator.store_id()),
            None => false,
        }
    }

    /// A fresh child of the root that is not registered to the thread
    pub fn new_context(&self) -> Result<Context> {
        Ok(Context::attached_to_root(self.coordinator()?))
    }

    /// Live contexts subscribed to this store's change notifications
    pub fn subscriber_count(&self) -> usize {
        let state = self.state.lock();
        state
            .coordinator
            .as_ref()
            .map_or(0, |coordinator| coordinator.subscriber_count())
    }
}
