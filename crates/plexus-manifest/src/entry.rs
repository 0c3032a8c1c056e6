//! Scanned and processed handler entries.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::inspect::ModuleExports;

/// Raw, pre-validation description of one discovered handler file.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedEntry {
    /// Derived key.
    pub key: String,
    /// File path as discovered.
    pub path: PathBuf,
    /// Path written to the manifest, relative to the project root.
    pub relative: String,
    /// Exports read from the module.
    pub exports: ModuleExports,
    /// Names of bracketed dynamic segments, in path order.
    pub params: Vec<String>,
    /// Name of the trailing catch-all segment.
    pub catch_all: Option<String>,
    /// Parent key for hierarchical (`filepath`) keys.
    pub parent: Option<String>,
    /// Owning feature module.
    pub module: Option<String>,
    /// Owning plugin; `None` for the host project.
    pub plugin: Option<String>,
}

/// Which exports a handler file provides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportsSummary {
    /// Whether a default export exists.
    pub default: bool,
    /// Whether a `config` export exists.
    pub config: bool,
    /// Recognized named exports that are present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub named: Vec<String>,
}

/// Optional annotations attached to a processed entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryExtra {
    /// Parent key for hierarchical keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Dynamic segment names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
    /// Catch-all segment name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catch_all: Option<String>,
    /// Processing failure marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EntryExtra {
    /// Returns whether no annotation is set.
    pub fn is_empty(&self) -> bool {
        self.parent.is_none()
            && self.params.is_empty()
            && self.catch_all.is_none()
            && self.error.is_none()
    }
}

/// Normalized manifest record for one handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEntry {
    /// Route key.
    pub key: String,
    /// Normalized (`/`-separated) module path.
    pub path: String,
    /// Exports summary.
    pub exports: ExportsSummary,
    /// Kind-specific metadata (the `config` export by default).
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Owning plugin; absent for the host project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    /// Owning feature module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Optional annotations.
    #[serde(default, skip_serializing_if = "EntryExtra::is_empty")]
    pub extra: EntryExtra,
}

impl ProcessedEntry {
    /// Returns whether processing failed for this entry.
    pub fn is_error(&self) -> bool {
        self.extra.error.is_some()
    }

    /// Declared dispatch priority (`metadata.priority`, default 0).
    pub fn priority(&self) -> i64 {
        self.metadata
            .get("priority")
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    }

    /// Whether the handler declares run-once frequency.
    pub fn runs_once(&self) -> bool {
        self.metadata.get("frequency").and_then(|v| v.as_str()) == Some("once")
    }
}
