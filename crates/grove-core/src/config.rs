//! Configuration
//!
//! `GroveConfig` is read from TOML, then `GROVE_*` environment variables
//! override individual fields. Every field has a default, so an empty file
//! (or no file at all) is a valid configuration.

use crate::errors::{ExError, ExErrorKind, Result};
use crate::logging_facility::Profile;
use crate::merge::MergePolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// What happens when code violates an API contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Contract violations panic immediately
    Abort,
    /// Contract violations are returned as errors or become logged no-ops
    #[default]
    Return,
}

impl Strictness {
    /// Pass `err` through, panicking first if it is a contract violation
    /// and this is [`Strictness::Abort`].
    pub fn escalate(self, err: ExError) -> ExError {
        if self == Strictness::Abort && err.kind().is_contract_violation() {
            panic!("contract violation: {}", err);
        }
        err
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "abort" => Some(Strictness::Abort),
            "return" => Some(Strictness::Return),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GroveConfig {
    /// Directory holding `<Model>.sqlite` store files
    pub data_dir: PathBuf,
    /// Read-only resource bundle searched for seed files
    pub bundle_dir: PathBuf,
    /// Directory holding `<Model>.model.yaml`; defaults to the bundle
    pub schema_dir: Option<PathBuf>,
    pub strictness: Strictness,
    pub merge_policy: MergePolicy,
    /// Rows materialized per page when a request sets no batch size;
    /// 0 materializes everything at once
    pub default_batch_size: usize,
    pub log_profile: Profile,
}

impl Default for GroveConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("grove-data"),
            bundle_dir: PathBuf::from("bundle"),
            schema_dir: None,
            strictness: Strictness::default(),
            merge_policy: MergePolicy::default(),
            default_batch_size: 0,
            log_profile: Profile::default(),
        }
    }
}

impl GroveConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| {
            ExError::new(ExErrorKind::Config)
                .with_op("load_config")
                .with_message(format!("Invalid configuration: {}", e))
        })
    }

    /// Load `path` and apply environment overrides.
    ///
    /// A missing file yields the defaults (plus overrides).
    pub fn load(path: &Path) -> Result<Self> {
        let config = match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(ExError::new(ExErrorKind::Io)
                    .with_op("load_config")
                    .with_message(format!("Failed to read {}: {}", path.display(), e)))
            }
        };
        config.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `GROVE_*` overrides from `lookup`
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(dir) = lookup("GROVE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("GROVE_BUNDLE_DIR") {
            self.bundle_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("GROVE_SCHEMA_DIR") {
            self.schema_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = lookup("GROVE_STRICTNESS") {
            self.strictness = Strictness::parse(&raw).ok_or_else(|| {
                ExError::new(ExErrorKind::Config)
                    .with_op("load_config")
                    .with_message(format!("GROVE_STRICTNESS must be abort or return, got '{}'", raw))
            })?;
        }
        Ok(self)
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_bundle_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bundle_dir = dir.into();
        self
    }

    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    pub fn with_default_batch_size(mut self, size: usize) -> Self {
        self.default_batch_size = size;
        self
    }

    /// Effective schema directory
    pub fn schema_dir(&self) -> &Path {
        self.schema_dir.as_deref().unwrap_or(&self.bundle_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = GroveConfig::from_toml_str("").unwrap();
        assert_eq!(config, GroveConfig::default());
        assert_eq!(config.schema_dir(), Path::new("bundle"));
    }

    #[test]
    fn test_parses_all_fields() {
        let config = GroveConfig::from_toml_str(
            r#"
            data_dir = "/var/grove"
            bundle_dir = "/opt/app/bundle"
            schema_dir = "/opt/app/models"
            strictness = "abort"
            merge_policy = "raise_conflict"
            default_batch_size = 50
            log_profile = "production"
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/grove"));
        assert_eq!(config.schema_dir(), Path::new("/opt/app/models"));
        assert_eq!(config.strictness, Strictness::Abort);
        assert_eq!(config.merge_policy, MergePolicy::RaiseConflict);
        assert_eq!(config.default_batch_size, 50);
        assert_eq!(config.log_profile, Profile::Production);
    }

    #[test]
    fn test_unknown_field_is_config_error() {
        let err = GroveConfig::from_toml_str("colour = 'red'").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Config);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [("GROVE_DATA_DIR", "/tmp/x"), ("GROVE_STRICTNESS", "ABORT")]
            .into_iter()
            .collect();
        let config = GroveConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.strictness, Strictness::Abort);

        let err = GroveConfig::default()
            .with_overrides(|k| (k == "GROVE_STRICTNESS").then(|| "loud".to_string()))
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GroveConfig::load(&dir.path().join("grove.toml")).unwrap();
        assert_eq!(config.merge_policy, MergePolicy::KeepStoreWins);
    }

    #[test]
    fn test_return_strictness_passes_violations_through() {
        let err = crate::errors::parameter_error("op", "bad");
        let back = Strictness::Return.escalate(err);
        assert_eq!(back.kind(), ExErrorKind::Parameter);
    }

    #[test]
    #[should_panic(expected = "contract violation")]
    fn test_abort_strictness_panics_on_violation() {
        let _ = Strictness::Abort.escalate(crate::errors::parameter_error("op", "bad"));
    }

    #[test]
    fn test_abort_strictness_returns_runtime_errors() {
        let err = ExError::new(ExErrorKind::Validation);
        assert_eq!(Strictness::Abort.escalate(err).kind(), ExErrorKind::Validation);
    }
}
