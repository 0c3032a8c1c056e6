//! Installed plugin configuration.

use serde::{Deserialize, Serialize};

/// One installed plugin package.
///
/// Plugins are listed in registration order; that order drives manifest
/// composition and hook ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Package name, e.g. `@acme/voice`.
    pub name: String,
    /// Package root directory.
    pub root: String,
    /// Plugin-scoped options handed to the plugin's handlers.
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}
