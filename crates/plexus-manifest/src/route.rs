//! Route definitions: declarative per-kind scanning and validation rules.
//!
//! A route definition is owned by one namespace (`project` or a plugin) and
//! describes how files of one handler kind are discovered, keyed, validated,
//! and turned into manifest metadata. Definitions are usually declared as
//! TOML files ([`RouteConfig`]); hosts may also build them in code to attach
//! a filter predicate or a custom processor.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use plexus_core::result::AppResult;

use crate::entry::ScannedEntry;

/// How keys are derived from file paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStyle {
    /// Key is the base name (optionally folding nested directories).
    #[default]
    Filename,
    /// Key joins every path segment with the route separator.
    Filepath,
}

/// Casing applied to each key segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyCasing {
    /// Keep segments as written.
    #[default]
    Preserve,
    /// Lower-case every segment.
    Lower,
    /// Convert `kebab-case` / `snake_case` segments to `camelCase`.
    Camel,
}

/// Key derivation rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyConfig {
    /// Derivation style.
    #[serde(default)]
    pub style: KeyStyle,
    /// Separator joining segments in `filepath` style.
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Segment casing.
    #[serde(default)]
    pub casing: KeyCasing,
    /// In `filename` style, fold nested directories into a camel-cased key.
    #[serde(default)]
    pub nested: bool,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            style: KeyStyle::Filename,
            separator: default_separator(),
            casing: KeyCasing::Preserve,
            nested: false,
        }
    }
}

/// Nesting rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestingConfig {
    /// Maximum number of path segments (file included); deeper files are skipped.
    #[serde(default)]
    pub max_depth: Option<usize>,
    /// Whether a directory's index file stays addressable next to children.
    #[serde(default = "default_true")]
    pub allow_index: bool,
}

impl Default for NestingConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            allow_index: true,
        }
    }
}

/// Presence requirement for an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Requirement {
    /// The export must be present.
    Required,
    /// The export may be present.
    #[default]
    Optional,
    /// The export must be absent.
    Forbidden,
}

impl Requirement {
    /// Returns the violated rule name, if any.
    pub fn check(self, present: bool) -> Option<Violation> {
        match (self, present) {
            (Self::Required, false) => Some(Violation::Missing),
            (Self::Forbidden, true) => Some(Violation::Forbidden),
            _ => None,
        }
    }
}

/// Kind of export rule violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// A required export is missing.
    Missing,
    /// A forbidden export is present.
    Forbidden,
}

/// Export requirements for handler files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRules {
    /// Rule for the default export.
    #[serde(default = "default_required")]
    pub default: Requirement,
    /// Rule for the `config` export.
    #[serde(default)]
    pub config: Requirement,
    /// Named exports recorded in the manifest when present.
    #[serde(default)]
    pub named: Vec<String>,
}

impl Default for ExportRules {
    fn default() -> Self {
        Self {
            default: Requirement::Required,
            config: Requirement::Optional,
            named: Vec::new(),
        }
    }
}

/// Serializable form of a route definition, as declared in `<kind>.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Handler kind; defaults to the definition file's stem.
    #[serde(default)]
    pub kind: Option<String>,
    /// Scan directory relative to a source dir; defaults to the kind.
    #[serde(default)]
    pub directory: Option<String>,
    /// Key derivation rules.
    #[serde(default)]
    pub key: KeyConfig,
    /// Nesting rules.
    #[serde(default)]
    pub nesting: NestingConfig,
    /// Export requirements.
    #[serde(default)]
    pub exports: ExportRules,
    /// Whether several entries may share one key.
    #[serde(default)]
    pub multiple: bool,
    /// Accepted file extensions; empty means the layout default.
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// Predicate deciding whether a file belongs to a route.
pub type RouteFilter = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Custom conversion from a scanned entry into manifest metadata.
#[async_trait]
pub trait EntryProcessor: Send + Sync {
    /// Produces the metadata stored for the entry.
    async fn process(&self, entry: &ScannedEntry) -> AppResult<serde_json::Value>;
}

/// A route definition bound to its owning namespace.
#[derive(Clone)]
pub struct RouteDefinition {
    /// Owning namespace.
    pub namespace: String,
    /// Handler kind.
    pub kind: String,
    /// Scan directory relative to a source dir.
    pub directory: String,
    /// Key derivation rules.
    pub key: KeyConfig,
    /// Nesting rules.
    pub nesting: NestingConfig,
    /// Export requirements.
    pub exports: ExportRules,
    /// Whether several entries may share one key.
    pub multiple: bool,
    /// Accepted file extensions; empty means the layout default.
    pub extensions: Vec<String>,
    /// Optional extra filter.
    pub filter: Option<RouteFilter>,
    /// Optional custom processor.
    pub processor: Option<Arc<dyn EntryProcessor>>,
}

impl std::fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("namespace", &self.namespace)
            .field("kind", &self.kind)
            .field("directory", &self.directory)
            .field("key", &self.key)
            .field("nesting", &self.nesting)
            .field("exports", &self.exports)
            .field("multiple", &self.multiple)
            .field("extensions", &self.extensions)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .field("processor", &self.processor.as_ref().map(|_| "<processor>"))
            .finish()
    }
}

impl RouteDefinition {
    /// Creates a definition scanning `<kind>/` with default rules.
    pub fn new(namespace: &str, kind: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            kind: kind.to_string(),
            directory: kind.to_string(),
            key: KeyConfig::default(),
            nesting: NestingConfig::default(),
            exports: ExportRules::default(),
            multiple: false,
            extensions: Vec::new(),
            filter: None,
            processor: None,
        }
    }

    /// Builds a definition from its declared form.
    ///
    /// `fallback_kind` is used when the declaration omits `kind`.
    pub fn from_config(namespace: &str, fallback_kind: &str, config: RouteConfig) -> Self {
        let kind = config.kind.unwrap_or_else(|| fallback_kind.to_string());
        let directory = config.directory.unwrap_or_else(|| kind.clone());
        Self {
            namespace: namespace.to_string(),
            kind,
            directory,
            key: config.key,
            nesting: config.nesting,
            exports: config.exports,
            multiple: config.multiple,
            extensions: config.extensions,
            filter: None,
            processor: None,
        }
    }

    /// Sets the scan directory.
    pub fn with_directory(mut self, directory: &str) -> Self {
        self.directory = directory.to_string();
        self
    }

    /// Switches to `filepath` keys joined by `separator`.
    pub fn with_filepath_keys(mut self, separator: &str) -> Self {
        self.key.style = KeyStyle::Filepath;
        self.key.separator = separator.to_string();
        self
    }

    /// Sets key rules.
    pub fn with_key(mut self, key: KeyConfig) -> Self {
        self.key = key;
        self
    }

    /// Sets nesting rules.
    pub fn with_nesting(mut self, nesting: NestingConfig) -> Self {
        self.nesting = nesting;
        self
    }

    /// Sets export rules.
    pub fn with_exports(mut self, exports: ExportRules) -> Self {
        self.exports = exports;
        self
    }

    /// Allows several entries per key.
    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    /// Attaches a filter predicate.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Attaches a custom processor.
    pub fn with_processor(mut self, processor: Arc<dyn EntryProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Returns `namespace:kind`.
    pub fn id(&self) -> String {
        format!("{}:{}", self.namespace, self.kind)
    }

    /// Normalized scan directory used for collision checks.
    ///
    /// Comparison is case-sensitive: `Commands` and `commands` are distinct.
    pub fn normalized_directory(&self) -> String {
        let unified = self.directory.replace('\\', "/");
        let parts: Vec<&str> = unified
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        parts.join("/")
    }

    /// Returns whether `path` passes the extension list and filter predicate.
    pub fn accepts(&self, path: &Path, default_extensions: &[String]) -> bool {
        let extensions = if self.extensions.is_empty() {
            default_extensions
        } else {
            &self.extensions
        };
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !extensions.iter().any(|e| e.trim_start_matches('.') == ext) {
            return false;
        }
        match &self.filter {
            Some(filter) => filter(path),
            None => true,
        }
    }
}

fn default_separator() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_required() -> Requirement {
    Requirement::Required
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml_config() {
        let config: RouteConfig = toml::from_str(
            r#"
directory = "./commands/"
multiple = false

[key]
style = "filepath"
separator = " "

[nesting]
max_depth = 3
allow_index = false

[exports]
config = "optional"
named = ["autocomplete"]
"#,
        )
        .expect("parse");

        let route = RouteDefinition::from_config("discord", "commands", config);
        assert_eq!(route.kind, "commands");
        assert_eq!(route.key.style, KeyStyle::Filepath);
        assert_eq!(route.key.separator, " ");
        assert_eq!(route.nesting.max_depth, Some(3));
        assert!(!route.nesting.allow_index);
        assert_eq!(route.exports.default, Requirement::Required);
        assert_eq!(route.exports.named, vec!["autocomplete".to_string()]);
        assert_eq!(route.normalized_directory(), "commands");
        assert_eq!(route.id(), "discord:commands");
    }

    #[test]
    fn test_accepts_extensions_and_filter() {
        let defaults = vec!["ts".to_string(), "js".to_string()];
        let route = RouteDefinition::new("project", "events")
            .with_filter(|p| !p.to_string_lossy().contains(".test."));

        assert!(route.accepts(Path::new("events/ready.ts"), &defaults));
        assert!(!route.accepts(Path::new("events/ready.test.ts"), &defaults));
        assert!(!route.accepts(Path::new("events/notes.md"), &defaults));

        let mut md = RouteDefinition::new("project", "docs");
        md.extensions = vec![".md".to_string()];
        assert!(md.accepts(Path::new("docs/intro.md"), &defaults));
    }

    #[test]
    fn test_requirement_check() {
        assert_eq!(Requirement::Required.check(false), Some(Violation::Missing));
        assert_eq!(Requirement::Forbidden.check(true), Some(Violation::Forbidden));
        assert_eq!(Requirement::Optional.check(true), None);
        assert_eq!(Requirement::Required.check(true), None);
    }
}
