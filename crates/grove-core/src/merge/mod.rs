//! Change tracking and merge resolution between contexts

pub mod changes;
pub mod conflict;
pub mod policy;

pub use changes::{ChangeNotification, ChangeSet, CommittedUpdate, PendingUpdate};
pub use conflict::{absorb_committed, reconcile_update, ConflictKind, MergeConflict, Reconciled};
pub use policy::MergePolicy;
