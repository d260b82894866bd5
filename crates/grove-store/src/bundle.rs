//! Read-only resource bundles that ship seed stores

use std::fmt::Debug;
use std::path::{Path, PathBuf};

pub trait ResourceBundle: Send + Sync + Debug {
    /// Path of the named resource, if the bundle contains it
    fn resource_path(&self, name: &str) -> Option<PathBuf>;
}

/// A bundle backed by a plain directory
#[derive(Debug, Clone)]
pub struct DirectoryBundle {
    root: PathBuf,
}

impl DirectoryBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceBundle for DirectoryBundle {
    fn resource_path(&self, name: &str) -> Option<PathBuf> {
        if name.contains(['/', '\\']) {
            return None;
        }
        let path = self.root.join(name);
        path.is_file().then_some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_bundle_lookup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Catalog.sqlite"), b"seed").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        let bundle = DirectoryBundle::new(dir.path());

        assert_eq!(
            bundle.resource_path("Catalog.sqlite"),
            Some(dir.path().join("Catalog.sqlite"))
        );
        assert_eq!(bundle.resource_path("Missing.sqlite"), None);
        assert_eq!(bundle.resource_path("nested"), None);
        assert_eq!(bundle.resource_path("../Catalog.sqlite"), None);
    }
}
