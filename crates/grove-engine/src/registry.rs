//! Store registry
//!
//! The registry hands out one [`StoreDescriptor`] per model name. Callers
//! share the registry (it is `Send + Sync`) instead of reaching for a
//! process-wide table.

#![allow(clippy::result_large_err)]

use crate::descriptor::StoreDescriptor;
use crate::settings::EngineSettings;
use grove_core::errors::{ExError, ExErrorKind, Result};
use grove_core::GroveConfig;
use grove_store::paths::{store_path, validate_model_name};
use grove_store::{
    DirectoryBundle, FileProtection, PermissionsProtection, ResourceBundle, SchemaSource,
    YamlSchemaSource,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Default)]
struct Registered {
    descriptors: HashMap<String, Arc<StoreDescriptor>>,
    /// Entity name to owning model; the first model to claim a name keeps it
    entity_index: BTreeMap<String, String>,
}

pub struct StoreRegistry {
    data_dir: PathBuf,
    settings: EngineSettings,
    schemas: Arc<dyn SchemaSource>,
    bundle: Arc<dyn ResourceBundle>,
    protection: Arc<dyn FileProtection>,
    registered: Mutex<Registered>,
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let models: Vec<String> = self.registered.lock().descriptors.keys().cloned().collect();
        f.debug_struct("StoreRegistry")
            .field("data_dir", &self.data_dir)
            .field("models", &models)
            .finish()
    }
}

impl StoreRegistry {
    pub fn new(
        config: &GroveConfig,
        schemas: Arc<dyn SchemaSource>,
        bundle: Arc<dyn ResourceBundle>,
        protection: Arc<dyn FileProtection>,
    ) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            settings: EngineSettings::from(config),
            schemas,
            bundle,
            protection,
            registered: Mutex::new(Registered::default()),
        }
    }

    /// Registry with the filesystem collaborators: YAML schemas from the
    /// schema directory, the bundle directory, and owner-only permissions
    pub fn from_config(config: &GroveConfig) -> Self {
        Self::new(
            config,
            Arc::new(YamlSchemaSource::new(config.schema_dir())),
            Arc::new(DirectoryBundle::new(config.bundle_dir.clone())),
            Arc::new(PermissionsProtection),
        )
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    /// The descriptor for `model`, created on first request
    ///
    /// Every call with the same name returns the same descriptor. The
    /// schema is loaded here; the store file is not opened until first
    /// use.
    ///
    /// # Errors
    /// `Parameter` for an unusable model name, `StoreOpen` when the schema
    /// cannot be loaded.
    pub fn shared_for_model(&self, model: &str) -> Result<Arc<StoreDescriptor>> {
        let mut registered = self.registered.lock();
        if let Some(descriptor) = registered.descriptors.get(model) {
            return Ok(Arc::clone(descriptor));
        }

        validate_model_name(model).map_err(|e| self.settings.strictness.escalate(e))?;
        let schema = self.schemas.load(model)?;
        if schema.name != model {
            return Err(ExError::new(ExErrorKind::StoreOpen)
                .with_op("shared_for_model")
                .with_message(format!(
                    "Schema source returned model '{}' for '{}'",
                    schema.name, model
                )));
        }

        for entity in schema.entity_names() {
            registered
                .entity_index
                .entry(entity.to_string())
                .or_insert_with(|| model.to_string());
        }

        let descriptor = Arc::new(StoreDescriptor::new(
            Arc::new(schema),
            store_path(&self.data_dir, model),
            self.settings,
            Arc::clone(&self.bundle),
            Arc::clone(&self.protection),
        ));
        tracing::debug!(model, path = %descriptor.store_path().display(), "registered model");
        registered
            .descriptors
            .insert(model.to_string(), Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Register several models up front
    pub fn initialize_models(&self, models: &[&str]) -> Result<Vec<Arc<StoreDescriptor>>> {
        models
            .iter()
            .map(|model| self.shared_for_model(model))
            .collect()
    }

    /// The registered model that declares `entity`
    pub fn model_for_entity_name(&self, entity: &str) -> Option<String> {
        self.registered.lock().entity_index.get(entity).cloned()
    }

    pub fn registered_models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.registered.lock().descriptors.keys().cloned().collect();
        models.sort();
        models
    }
}
