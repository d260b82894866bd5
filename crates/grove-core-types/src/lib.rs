//! Core types shared across Grove facilities
//!
//! This crate provides foundational types used by the error, logging and
//! context facilities:
//!
//! - **Correlation types**: StoreId, ContextId, SaveId
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;

pub use correlation::{ContextId, SaveId, StoreId};
