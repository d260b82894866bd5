//! Repository layer for persisting the object graph to SQLite

pub mod hydration;
pub mod sqlite_repo;

pub use hydration::{decode_row, load_entity, load_object, StoredRow};
pub use sqlite_repo::SqliteRepo;
