//! Probes plugin and project hook directories for every category.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::hooks::definitions::{HookCategory, HookEntry, HookOrdering, HookSource, HooksManifest};
use crate::source::{Source, SourceSet};

/// Discovers every hook module and orders each category.
pub async fn discover_hooks(sources: &SourceSet) -> HooksManifest {
    let mut manifest = HooksManifest::new();

    for category in HookCategory::ALL {
        let plugins = sources.plugins.iter();
        let order: Vec<&Source> = match category.ordering() {
            HookOrdering::PluginsFirst => plugins.chain(std::iter::once(&sources.project)).collect(),
            HookOrdering::ProjectFirstReversed => std::iter::once(&sources.project).chain(plugins.rev()).collect(),
            HookOrdering::ProjectFirst => std::iter::once(&sources.project).chain(plugins).collect(),
        };

        let mut entries = Vec::new();
        for source in order {
            let Some(path) = find_hook(source, category, &sources.hook_extensions).await else {
                continue;
            };
            let priority = entries.len();
            debug!(namespace = %source.namespace, category = %category, priority, "Hook discovered");
            entries.push(HookEntry {
                id: format!("{}:{}", source.namespace, category),
                source: if source.is_project() {
                    HookSource::Project
                } else {
                    HookSource::Plugin
                },
                plugin: source.plugin_name().map(str::to_string),
                path: sources.manifest_path(&path),
                priority,
                phase: category.build_phase(),
            });
        }

        if !entries.is_empty() {
            manifest.set(category, entries);
        }
    }

    info!(hooks = manifest.len(), "Hook discovery complete");
    manifest
}

/// Returns the first `<dir>/<category>.<ext>` file that exists.
async fn find_hook(source: &Source, category: HookCategory, extensions: &[String]) -> Option<PathBuf> {
    for dir in &source.hook_dirs {
        for ext in extensions {
            let candidate = dir.join(format!("{}.{}", category.as_str(), ext.trim_start_matches('.')));
            if is_file(&candidate).await {
                return Some(candidate);
            }
        }
    }
    None
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
