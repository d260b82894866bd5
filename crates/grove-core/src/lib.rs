//! Grove Core - object-graph model and context semantics
//!
//! This crate provides the storage-independent half of Grove:
//! - Error facility with a stable error-kind taxonomy
//! - Structured logging facility
//! - Model schemas, attribute values, object ids and snapshots
//! - Predicate language (parse, validate, evaluate)
//! - Fetch request builder
//! - Change sets, merge policies and per-attribute conflict resolution
//! - Save-time validation against the model schema
//! - Configuration and strictness

pub mod config;
pub mod errors;
pub mod fetch;
pub mod logging_facility;
pub mod merge;
pub mod model;
pub mod predicate;
pub mod rules;

// Re-export commonly used types
pub use config::{GroveConfig, Strictness};
pub use errors::{ExError, ExErrorKind, Result};
pub use fetch::{FetchRequest, FetchRequestBuilder, SortDescriptor};
pub use merge::{ChangeNotification, ChangeSet, MergeConflict, MergePolicy};
pub use model::{
    AttributeKind, EntityDescription, ModelSchema, ObjectId, ObjectSnapshot, PropertyValue, Value,
};
pub use predicate::{Predicate, PredicateError};
pub use rules::ValidationFailure;
