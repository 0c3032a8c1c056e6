//! Shared test helpers for integration tests.

use std::path::{Path, PathBuf};

use plexus_core::config::AppConfig;
use plexus_core::config::plugin::PluginConfig;

/// A throwaway host project with installed plugins.
pub struct TestProject {
    /// Temporary directory holding the project; removed on drop.
    pub dir: tempfile::TempDir,
    /// Configuration pointing at the project.
    pub config: AppConfig,
}

impl TestProject {
    /// Create an empty project
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = AppConfig::default();
        config.project.root = dir.path().to_string_lossy().to_string();
        Self { dir, config }
    }

    /// Project root
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Register a plugin installed under `node_modules/<name>`
    pub fn add_plugin(&mut self, name: &str, options: Option<serde_json::Value>) -> PathBuf {
        let root = self.root().join("node_modules").join(name);
        self.config.plugins.push(PluginConfig {
            name: name.to_string(),
            root: root.to_string_lossy().to_string(),
            options,
        });
        root
    }

    /// Write a file relative to the project root
    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.root().join(relative);
        std::fs::create_dir_all(path.parent().expect("file has a parent"))
            .expect("Failed to create directories");
        std::fs::write(path, contents).expect("Failed to write file");
    }
}
