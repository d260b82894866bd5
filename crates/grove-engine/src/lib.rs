//! Grove Engine - contexts, merge coordination and fetch execution
//!
//! Provides:
//! - `StoreRegistry` / `StoreDescriptor`: one shared access point per model
//! - `Context`: thread-confined editing contexts with lazy change merging
//! - `RootContext`: the `Send + Sync` handle onto a store's root context
//! - Fetch execution with paged materialization

pub mod context;
pub mod descriptor;
pub mod fetch_exec;
pub mod object;
pub mod registry;
pub mod root;
pub mod settings;

mod coordinator;
mod thread_registry;

pub use context::Context;
pub use descriptor::StoreDescriptor;
pub use fetch_exec::{FetchIter, FetchRequestBuilderExt, FetchResults};
pub use object::ManagedObject;
pub use registry::StoreRegistry;
pub use root::{RootContext, RootEditor};
pub use settings::EngineSettings;
