//! Where model schemas come from

use crate::errors::Result;
use grove_core::errors::{ExError, ExErrorKind};
use grove_core::model::ModelSchema;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::PathBuf;

pub trait SchemaSource: Send + Sync + Debug {
    /// Load and validate the schema for `model`
    ///
    /// # Errors
    /// `StoreOpen` when the schema is missing, unreadable or invalid.
    fn load(&self, model: &str) -> Result<ModelSchema>;
}

fn schema_error(model: &str, message: String) -> ExError {
    ExError::new(ExErrorKind::StoreOpen)
        .with_op("load_schema")
        .with_message(format!("Model '{}': {}", model, message))
}

/// Reads `<dir>/<Model>.model.yaml`
#[derive(Debug, Clone)]
pub struct YamlSchemaSource {
    dir: PathBuf,
}

impl YamlSchemaSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn schema_path(&self, model: &str) -> PathBuf {
        self.dir.join(format!("{}.model.yaml", model))
    }
}

impl SchemaSource for YamlSchemaSource {
    fn load(&self, model: &str) -> Result<ModelSchema> {
        let path = self.schema_path(model);
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| schema_error(model, format!("cannot read {}: {}", path.display(), e)))?;
        let schema: ModelSchema = serde_yaml::from_str(&raw)
            .map_err(|e| schema_error(model, format!("invalid schema file: {}", e)))?;
        if schema.name != model {
            return Err(schema_error(
                model,
                format!("schema file declares model '{}'", schema.name),
            ));
        }
        schema.validate().map_err(ExError::from)?;
        Ok(schema)
    }
}

/// Schemas supplied in process
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaSource {
    schemas: BTreeMap<String, ModelSchema>,
}

impl StaticSchemaSource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, schema: ModelSchema) -> Self {
        self.schemas.insert(schema.name.clone(), schema);
        self
    }
}

impl SchemaSource for StaticSchemaSource {
    fn load(&self, model: &str) -> Result<ModelSchema> {
        self.schemas
            .get(model)
            .cloned()
            .ok_or_else(|| schema_error(model, "no schema registered".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
name: Catalog
version: 2
entities:
  - name: Item
    attributes:
      - { name: name, kind: string }
      - { name: price, kind: integer, optional: true }
    relationships:
      - { name: category, destination: Category }
  - name: Category
    attributes:
      - { name: title, kind: string }
"#;

    #[test]
    fn test_yaml_source_loads_schema() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Catalog.model.yaml"), CATALOG).unwrap();

        let schema = YamlSchemaSource::new(dir.path()).load("Catalog").unwrap();
        assert_eq!(schema.version, 2);
        let item = schema.entity("Item").unwrap();
        assert!(item.attribute_named("price").unwrap().optional);
        assert!(!item.relationship_named("category").unwrap().to_many);
    }

    #[test]
    fn test_yaml_source_errors_are_store_open() {
        let dir = tempfile::tempdir().unwrap();
        let source = YamlSchemaSource::new(dir.path());
        assert_eq!(source.load("Catalog").unwrap_err().kind(), ExErrorKind::StoreOpen);

        std::fs::write(dir.path().join("Catalog.model.yaml"), "name: [").unwrap();
        assert_eq!(source.load("Catalog").unwrap_err().kind(), ExErrorKind::StoreOpen);

        std::fs::write(
            dir.path().join("Catalog.model.yaml"),
            CATALOG.replace("destination: Category", "destination: Nowhere"),
        )
        .unwrap();
        assert_eq!(source.load("Catalog").unwrap_err().kind(), ExErrorKind::StoreOpen);
    }

    #[test]
    fn test_static_source() {
        let schema = ModelSchema::new(
            "Notes",
            vec![grove_core::EntityDescription::new("Note")
                .attribute("body", grove_core::AttributeKind::String)],
        )
        .unwrap();
        let source = StaticSchemaSource::new().with(schema.clone());
        assert_eq!(source.load("Notes").unwrap(), schema);
        assert!(source.load("Other").is_err());
    }
}
