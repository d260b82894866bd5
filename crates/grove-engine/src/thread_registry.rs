//! Per-thread context table
//!
//! Each thread holds at most one registered context per store. The table is
//! thread-local, so entries (and their pending changes) are dropped when the
//! thread exits.

use crate::context::Context;
use crate::coordinator::Coordinator;
use grove_core_types::StoreId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

thread_local! {
    static CONTEXTS: RefCell<HashMap<StoreId, Context>> = RefCell::new(HashMap::new());
}

/// The calling thread's context for the coordinator's store, created on
/// first use as a child of the root
pub(crate) fn context_for(coordinator: &Arc<Coordinator>) -> Context {
    CONTEXTS.with(|table| {
        let mut table = table.borrow_mut();
        table
            .entry(coordinator.store_id().clone())
            .or_insert_with(|| {
                tracing::debug!(store_id = %coordinator.store_id(), "registering thread context");
                Context::attached_to_root(Arc::clone(coordinator))
            })
            .clone()
    })
}

/// Forget the calling thread's context for `store_id`; returns whether one
/// was registered
pub(crate) fn discard(store_id: &StoreId) -> bool {
    CONTEXTS.with(|table| table.borrow_mut().remove(store_id).is_some())
}
