use std::fs;
use std::path::{Path, PathBuf};

use weft_core::BuildConfig;

/// Temporary project root; local specifiers map to files below it
pub struct TestProject {
    dir: tempfile::TempDir,
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root().join(".weft")
    }

    /// Defaults rooted at the project, cache in `<root>/.weft`
    pub fn config(&self) -> BuildConfig {
        BuildConfig::for_project(self.root())
    }

    pub fn path_of(&self, specifier: &str) -> PathBuf {
        self.root().join(specifier.trim_start_matches('/'))
    }

    pub fn write(&self, specifier: &str, source: &str) -> &Self {
        let path = self.path_of(specifier);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, source).unwrap();
        self
    }

    pub fn remove(&self, specifier: &str) {
        fs::remove_file(self.path_of(specifier)).unwrap();
    }
}
