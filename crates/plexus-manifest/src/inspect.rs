//! Module export inspection.
//!
//! Handler sources are compiled by an external toolchain, so the scanner
//! reads exports through the [`ModuleInspector`] seam. [`SourceInspector`]
//! prefers a `<file>.meta.json` sidecar emitted by the compiler and falls
//! back to detecting `export` declarations in the source text.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use plexus_core::result::AppResult;

/// Exports provided by one handler module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleExports {
    /// Whether a default export exists.
    #[serde(default)]
    pub default: bool,
    /// Value of the `config` export; `Some` whenever the export exists.
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    /// Named exports other than `config`.
    #[serde(default)]
    pub named: BTreeSet<String>,
}

/// Reads the exports of a handler file.
#[async_trait]
pub trait ModuleInspector: Send + Sync + std::fmt::Debug {
    /// Returns the exports of the module at `path`.
    async fn inspect(&self, path: &Path) -> AppResult<ModuleExports>;
}

static DEFAULT_EXPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)\bexport\s+default\b|\bmodule\.exports\s*=").expect("valid regex")
});

static CONFIG_EXPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)\bexport\s+(?:const|let|var)\s+config\b").expect("valid regex")
});

static NAMED_EXPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)\bexport\s+(?:async\s+)?(?:function\*?|const|let|var|class)\s+([A-Za-z_$][\w$]*)",
    )
    .expect("valid regex")
});

static EXPORT_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)\bexport\s*\{([^}]*)\}").expect("valid regex"));

/// Sidecar-first, source-text-fallback inspector.
#[derive(Debug, Default, Clone)]
pub struct SourceInspector;

impl SourceInspector {
    /// Creates a new inspector.
    pub fn new() -> Self {
        Self
    }

    /// Path of the compiler sidecar for a handler file.
    pub fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".meta.json");
        PathBuf::from(name)
    }

    /// Detects exports in module source text.
    pub fn parse_source(source: &str) -> ModuleExports {
        let mut exports = ModuleExports {
            default: DEFAULT_EXPORT.is_match(source),
            config: None,
            named: BTreeSet::new(),
        };

        if CONFIG_EXPORT.is_match(source) {
            exports.config = Some(serde_json::Value::Object(Default::default()));
        }

        for caps in NAMED_EXPORT.captures_iter(source) {
            let name = &caps[1];
            if name != "config" {
                exports.named.insert(name.to_string());
            }
        }

        for caps in EXPORT_LIST.captures_iter(source) {
            for item in caps[1].split(',') {
                let exported = match item.split_once(" as ") {
                    Some((_, alias)) => alias.trim(),
                    None => item.trim(),
                };
                match exported {
                    "" => {}
                    "default" => exports.default = true,
                    "config" => {
                        exports
                            .config
                            .get_or_insert_with(|| serde_json::Value::Object(Default::default()));
                    }
                    name => {
                        exports.named.insert(name.to_string());
                    }
                }
            }
        }

        exports
    }
}

#[async_trait]
impl ModuleInspector for SourceInspector {
    async fn inspect(&self, path: &Path) -> AppResult<ModuleExports> {
        let sidecar = Self::sidecar_path(path);
        match tokio::fs::read_to_string(&sidecar).await {
            Ok(raw) => return Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let source = tokio::fs::read_to_string(path).await?;
        Ok(Self::parse_source(&source))
    }
}
