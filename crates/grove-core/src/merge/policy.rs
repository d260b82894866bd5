use serde::{Deserialize, Serialize};
use std::fmt;

/// How a context resolves a property it changed that someone else
/// changed first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// The value already committed in the parent wins; the local edit of
    /// that property is dropped
    #[default]
    KeepStoreWins,
    /// The local value overwrites the parent's value
    KeepLocalWins,
    /// The save fails with a merge conflict listing every clash
    RaiseConflict,
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergePolicy::KeepStoreWins => "keep_store_wins",
            MergePolicy::KeepLocalWins => "keep_local_wins",
            MergePolicy::RaiseConflict => "raise_conflict",
        };
        f.write_str(name)
    }
}
