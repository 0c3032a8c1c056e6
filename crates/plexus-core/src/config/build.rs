//! Build artifact configuration.

use serde::{Deserialize, Serialize};

/// Where build artifacts are written and how validation failures are treated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Output path of the handler manifest.
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,
    /// Output path of the hooks manifest.
    #[serde(default = "default_hooks_manifest_path")]
    pub hooks_manifest_path: String,
    /// Whether a non-empty validation report fails the build.
    #[serde(default = "default_true")]
    pub strict: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            manifest_path: default_manifest_path(),
            hooks_manifest_path: default_hooks_manifest_path(),
            strict: true,
        }
    }
}

fn default_manifest_path() -> String {
    ".plexus/manifest.json".to_string()
}

fn default_hooks_manifest_path() -> String {
    ".plexus/hooks.json".to_string()
}

fn default_true() -> bool {
    true
}
