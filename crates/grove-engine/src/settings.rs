//! Engine-wide behaviour knobs taken from `GroveConfig`

use grove_core::{GroveConfig, MergePolicy, Strictness};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineSettings {
    pub strictness: Strictness,
    /// Policy new contexts start with
    pub merge_policy: MergePolicy,
    /// Page size for fetches that set none; 0 materializes everything
    pub default_batch_size: usize,
}

impl From<&GroveConfig> for EngineSettings {
    fn from(config: &GroveConfig) -> Self {
        Self {
            strictness: config.strictness,
            merge_policy: config.merge_policy,
            default_batch_size: config.default_batch_size,
        }
    }
}
