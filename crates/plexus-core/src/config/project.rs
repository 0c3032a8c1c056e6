//! Host project and plugin package layout configuration.

use serde::{Deserialize, Serialize};

/// Host project location and conventions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project root directory.
    #[serde(default = "default_root")]
    pub root: String,
    /// Namespace owning the project's route definitions.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Directory (relative to root) holding handler sources.
    #[serde(default = "default_project_source_dir")]
    pub source_dir: String,
    /// Directory (relative to root) holding route definition files.
    #[serde(default = "default_project_routes_dir")]
    pub routes_dir: String,
    /// Directory (relative to root) holding lifecycle and build hooks.
    #[serde(default = "default_project_hook_dir")]
    pub hook_dir: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            namespace: default_namespace(),
            source_dir: default_project_source_dir(),
            routes_dir: default_project_routes_dir(),
            hook_dir: default_project_hook_dir(),
        }
    }
}

/// Conventional build-output subpaths inside installed plugin packages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Directory (relative to plugin root) holding compiled handlers.
    #[serde(default = "default_plugin_source_dir")]
    pub source_dir: String,
    /// Directory (relative to plugin root) holding route definition files.
    #[serde(default = "default_plugin_routes_dir")]
    pub routes_dir: String,
    /// Candidate hook directories, probed in order; the first match wins.
    #[serde(default = "default_plugin_hook_dirs")]
    pub hook_dirs: Vec<String>,
    /// Extensions recognized for hook modules.
    #[serde(default = "default_hook_extensions")]
    pub hook_extensions: Vec<String>,
    /// Extensions recognized for handler files when a route declares none.
    #[serde(default = "default_handler_extensions")]
    pub handler_extensions: Vec<String>,
    /// Directory (relative to a source dir) grouping feature modules.
    #[serde(default = "default_modules_dir")]
    pub modules_dir: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            source_dir: default_plugin_source_dir(),
            routes_dir: default_plugin_routes_dir(),
            hook_dirs: default_plugin_hook_dirs(),
            hook_extensions: default_hook_extensions(),
            handler_extensions: default_handler_extensions(),
            modules_dir: default_modules_dir(),
        }
    }
}

fn default_root() -> String {
    ".".to_string()
}

fn default_namespace() -> String {
    "project".to_string()
}

fn default_project_source_dir() -> String {
    "src".to_string()
}

fn default_project_routes_dir() -> String {
    "config/routes".to_string()
}

fn default_project_hook_dir() -> String {
    "src/hooks".to_string()
}

fn default_plugin_source_dir() -> String {
    ".plexus/build".to_string()
}

fn default_plugin_routes_dir() -> String {
    ".plexus/build/routes".to_string()
}

fn default_plugin_hook_dirs() -> Vec<String> {
    vec![".plexus/build/hooks".to_string(), "dist/hooks".to_string()]
}

fn default_hook_extensions() -> Vec<String> {
    vec!["js".to_string(), "mjs".to_string()]
}

fn default_handler_extensions() -> Vec<String> {
    ["js", "mjs", "cjs", "ts", "tsx", "jsx"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_modules_dir() -> String {
    "modules".to_string()
}
