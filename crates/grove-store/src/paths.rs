//! Store file locations

use grove_core::errors::{parameter_error, ExError};
use std::path::{Path, PathBuf};

pub const STORE_EXTENSION: &str = "sqlite";

/// Reject model names that cannot be used as a file stem
pub fn validate_model_name(model: &str) -> Result<(), ExError> {
    let bad = model.trim().is_empty()
        || model.contains(['/', '\\'])
        || model == "."
        || model == "..";
    if bad {
        return Err(parameter_error(
            "validate_model_name",
            format!("'{}' is not a usable model name", model),
        ));
    }
    Ok(())
}

/// `<Model>.sqlite`
pub fn store_file_name(model: &str) -> String {
    format!("{}.{}", model, STORE_EXTENSION)
}

/// `<data_dir>/<Model>.sqlite`
pub fn store_path(data_dir: &Path, model: &str) -> PathBuf {
    data_dir.join(store_file_name(model))
}

/// `file://` URL for a store path; relative paths are resolved against the
/// current directory
pub fn store_url(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    format!("file://{}", absolute.display())
}
