//! Grove Store - SQLite persistence for the object graph
//!
//! Provides:
//! - SQLite connection management and embedded migrations
//! - Store metadata and lightweight model migration
//! - Object repository with optimistic version checks
//! - Seed installer (atomic, never overwrites)
//! - Collaborators: schema sources, resource bundles, file protection

pub mod bundle;
pub mod db;
pub mod errors;
pub mod metadata;
pub mod migrations;
pub mod model_migration;
pub mod paths;
pub mod protection;
pub mod repo;
pub mod schema_source;
pub mod seed;
pub mod store;

// Re-export key types
pub use bundle::{DirectoryBundle, ResourceBundle};
pub use errors::Result;
pub use protection::{FileProtection, NoProtection, PermissionsProtection};
pub use schema_source::{SchemaSource, StaticSchemaSource, YamlSchemaSource};
pub use seed::SeedOutcome;
pub use store::{SqliteStore, StoreOptions};
