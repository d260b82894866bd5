//! Correlation types for store, context and save tracking
//!
//! Every store, every editing context and every save gets an identifier so
//! that log lines from different threads can be stitched back together.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one opened persistent store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreId(String);

impl StoreId {
    /// Generate a new random StoreId using UUIDv7
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one editing context
///
/// Contexts are compared by id when a change notification is fanned out, so
/// the originating context can skip its own broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(String);

impl ContextId {
    /// Generate a new random ContextId using UUIDv7
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one durable save, carried by its change notification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SaveId(String);

impl SaveId {
    /// Generate a new random SaveId using UUIDv7
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SaveId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SaveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_id_generation() {
        let id1 = ContextId::new();
        let id2 = ContextId::new();

        assert_ne!(id1, id2);
        assert!(!id1.as_str().is_empty());
    }

    #[test]
    fn test_context_id_display() {
        let id = ContextId::new();
        assert_eq!(format!("{}", id), id.as_str());
    }

    #[test]
    fn test_store_and_save_ids_are_unique() {
        assert_ne!(StoreId::new(), StoreId::new());
        assert_ne!(SaveId::new(), SaveId::new());
    }

    #[test]
    fn test_serialization() {
        let id = ContextId::new();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: ContextId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }
}
