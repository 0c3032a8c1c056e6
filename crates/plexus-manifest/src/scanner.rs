//! Directory scanner: walks a route's directory and produces scanned entries.
//!
//! Keys are derived per the route's key rules, nesting rules exclude files
//! that are too deep or shadowed index files, and bracketed segments become
//! dynamic parameters. A missing directory yields no entries. Key
//! collisions are left to the assembler.

use std::path::{Path, PathBuf};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::entry::ScannedEntry;
use crate::inspect::ModuleInspector;
use crate::route::{KeyCasing, KeyStyle, RouteDefinition};
use crate::source::relative_path;

/// Base name that marks a directory's own handler.
const INDEX_STEM: &str = "index";

/// Who owns the files under a scan root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOrigin {
    /// Owning plugin; `None` for the project.
    pub plugin: Option<String>,
    /// Owning feature module.
    pub module: Option<String>,
    /// Directory manifest paths are made relative to.
    pub base: PathBuf,
}

/// A file found under the scan root, split into path segments.
#[derive(Debug, Clone)]
struct FoundFile {
    path: PathBuf,
    /// Directory segments followed by the file stem.
    segments: Vec<String>,
}

impl FoundFile {
    fn is_index(&self) -> bool {
        self.segments.len() > 1 && self.segments.last().map(String::as_str) == Some(INDEX_STEM)
    }

    fn directory(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }
}

/// Scans `root` for files belonging to `route`.
pub async fn scan(
    route: &RouteDefinition,
    root: &Path,
    origin: &ScanOrigin,
    default_extensions: &[String],
    inspector: &dyn ModuleInspector,
) -> Vec<ScannedEntry> {
    let files = walk(root).await;
    if files.is_empty() {
        return Vec::new();
    }

    let candidates: Vec<FoundFile> = files
        .into_iter()
        .filter(|f| route.accepts(&f.path, default_extensions))
        .collect();

    let max = route.nesting.max_depth.unwrap_or(usize::MAX);
    let within_depth: Vec<&FoundFile> = candidates
        .iter()
        .filter(|file| {
            if file.segments.len() > max {
                debug!(
                    route = %route.id(),
                    path = %file.path.display(),
                    depth = file.segments.len(),
                    max_depth = max,
                    "Skipping entry nested beyond max depth"
                );
                return false;
            }
            true
        })
        .collect();

    // Only files that survive the depth limit can shadow an index.
    let kept: Vec<&FoundFile> = within_depth
        .iter()
        .copied()
        .filter(|file| {
            if file.is_index() && !route.nesting.allow_index && has_children(file, &within_depth) {
                debug!(
                    route = %route.id(),
                    path = %file.path.display(),
                    "Index file shadowed by sibling children"
                );
                return false;
            }
            true
        })
        .collect();

    let inspections = join_all(kept.iter().map(|f| inspector.inspect(&f.path))).await;

    let mut entries = Vec::with_capacity(kept.len());
    for (file, exports) in kept.into_iter().zip(inspections) {
        let exports = match exports {
            Ok(exports) => exports,
            Err(e) => {
                warn!(
                    route = %route.id(),
                    path = %file.path.display(),
                    error = %e,
                    "Unable to read handler exports, skipping"
                );
                continue;
            }
        };
        entries.push(build_entry(route, file, exports, origin));
    }
    entries
}

/// Derives the key of a file from its segments (directories + stem).
pub fn derive_key(route: &RouteDefinition, segments: &[String]) -> (String, Option<String>) {
    let is_index = segments.len() > 1 && segments.last().map(String::as_str) == Some(INDEX_STEM);
    let key_segments: Vec<String> = if is_index {
        segments[..segments.len() - 1].to_vec()
    } else {
        segments.to_vec()
    };
    let cased: Vec<String> = key_segments
        .iter()
        .map(|s| apply_casing(s, route.key.casing))
        .collect();

    match route.key.style {
        KeyStyle::Filepath => {
            let parent = if cased.len() > 1 {
                Some(cased[..cased.len() - 1].join(&route.key.separator))
            } else {
                None
            };
            (cased.join(&route.key.separator), parent)
        }
        KeyStyle::Filename if route.key.nested => {
            let mut key = String::new();
            for (i, segment) in cased.iter().enumerate() {
                if i == 0 {
                    key.push_str(segment);
                } else {
                    key.push_str(&capitalize(segment));
                }
            }
            (key, None)
        }
        KeyStyle::Filename => (cased.last().cloned().unwrap_or_default(), None),
    }
}

/// Extracts dynamic parameter names and the trailing catch-all.
pub fn dynamic_params(segments: &[String]) -> (Vec<String>, Option<String>) {
    let mut params = Vec::new();
    let mut catch_all = None;
    let last = segments.len().saturating_sub(1);
    for (i, segment) in segments.iter().enumerate() {
        let Some(inner) = segment.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
            continue;
        };
        match inner.strip_prefix("...") {
            Some(name) if i == last => catch_all = Some(name.to_string()),
            Some(name) => params.push(name.to_string()),
            None => params.push(inner.to_string()),
        }
    }
    (params, catch_all)
}

fn build_entry(
    route: &RouteDefinition,
    file: &FoundFile,
    exports: crate::inspect::ModuleExports,
    origin: &ScanOrigin,
) -> ScannedEntry {
    let (key, parent) = derive_key(route, &file.segments);
    let (params, catch_all) = dynamic_params(&file.segments);
    let relative = relative_path(&file.path, &origin.base);

    ScannedEntry {
        key,
        path: file.path.clone(),
        relative,
        exports,
        params,
        catch_all,
        parent,
        module: origin.module.clone(),
        plugin: origin.plugin.clone(),
    }
}

fn has_children(index: &FoundFile, files: &[&FoundFile]) -> bool {
    let prefix = index.directory();
    files.iter().any(|other| {
        !std::ptr::eq(*other, index)
            && other.segments.len() > prefix.len()
            && other.segments[..prefix.len()] == *prefix
    })
}

fn apply_casing(segment: &str, casing: KeyCasing) -> String {
    if segment.starts_with('[') {
        return segment.to_string();
    }
    match casing {
        KeyCasing::Preserve => segment.to_string(),
        KeyCasing::Lower => segment.to_lowercase(),
        KeyCasing::Camel => {
            let mut out = String::with_capacity(segment.len());
            let mut upper_next = false;
            for ch in segment.chars() {
                if ch == '-' || ch == '_' || ch == ' ' {
                    upper_next = !out.is_empty();
                } else if upper_next {
                    out.extend(ch.to_uppercase());
                    upper_next = false;
                } else {
                    out.push(ch);
                }
            }
            out
        }
    }
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Recursively lists files under `root`, sorted by path.
async fn walk(root: &Path) -> Vec<FoundFile> {
    let mut found = Vec::new();
    let mut pending: Vec<(PathBuf, Vec<String>)> = vec![(root.to_path_buf(), Vec::new())];

    while let Some((dir, prefix)) = pending.pop() {
        let mut listing = match tokio::fs::read_dir(&dir).await {
            Ok(listing) => listing,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %dir.display(), error = %e, "Directory unreadable, skipping");
                }
                continue;
            }
        };

        loop {
            let entry = match listing.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Directory listing interrupted");
                    break;
                }
            };
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };

            let mut segments = prefix.clone();
            if file_type.is_dir() {
                segments.push(name);
                pending.push((path, segments));
            } else if file_type.is_file() {
                let stem = Path::new(&name)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or(&name)
                    .to_string();
                segments.push(stem);
                found.push(FoundFile { path, segments });
            }
        }
    }

    found.sort_by(|a, b| a.path.cmp(&b.path));
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::SourceInspector;
    use crate::route::{KeyConfig, NestingConfig};

    const HANDLER: &str = "export default () => {}\n";

    fn exts() -> Vec<String> {
        vec!["ts".to_string(), "js".to_string()]
    }

    fn write(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, HANDLER).expect("write");
    }

    async fn keys(route: &RouteDefinition, root: &Path) -> Vec<String> {
        scan(route, root, &ScanOrigin::default(), &exts(), &SourceInspector::new())
            .await
            .into_iter()
            .map(|e| e.key)
            .collect()
    }

    #[tokio::test]
    async fn test_filepath_keys_with_space_separator() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "admin/ban.ts");
        write(temp.path(), "admin/kick.ts");
        write(temp.path(), "ping.ts");

        let route = RouteDefinition::new("project", "commands").with_filepath_keys(" ");
        let entries = scan(
            &route,
            temp.path(),
            &ScanOrigin::default(),
            &exts(),
            &SourceInspector::new(),
        )
        .await;

        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["admin ban", "admin kick", "ping"]);
        assert_eq!(entries[0].parent.as_deref(), Some("admin"));
        assert!(entries[0].relative.ends_with("admin/ban.ts"));
        assert!(entries[0].exports.default);
        assert!(entries[2].parent.is_none());
    }

    #[tokio::test]
    async fn test_max_depth_excludes_deeper_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "admin/ban.ts");
        write(temp.path(), "admin/roles/add.ts");

        let route = RouteDefinition::new("project", "commands")
            .with_filepath_keys(" ")
            .with_nesting(NestingConfig {
                max_depth: Some(2),
                allow_index: true,
            });
        assert_eq!(keys(&route, temp.path()).await, vec!["admin ban"]);
    }

    #[tokio::test]
    async fn test_index_shadowed_when_not_allowed() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "admin/index.ts");
        write(temp.path(), "admin/ban.ts");
        write(temp.path(), "help/index.ts");

        let shadowing = RouteDefinition::new("project", "commands")
            .with_filepath_keys(" ")
            .with_nesting(NestingConfig {
                max_depth: None,
                allow_index: false,
            });
        assert_eq!(keys(&shadowing, temp.path()).await, vec!["admin ban", "help"]);

        let allowing = RouteDefinition::new("project", "commands").with_filepath_keys(" ");
        assert_eq!(
            keys(&allowing, temp.path()).await,
            vec!["admin ban", "admin", "help"]
        );
    }

    #[tokio::test]
    async fn test_index_kept_when_children_are_too_deep() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "admin/index.ts");
        write(temp.path(), "admin/roles/add.ts");

        let route = RouteDefinition::new("project", "commands")
            .with_filepath_keys(" ")
            .with_nesting(NestingConfig {
                max_depth: Some(2),
                allow_index: false,
            });
        assert_eq!(keys(&route, temp.path()).await, vec!["admin"]);
    }

    #[tokio::test]
    async fn test_filename_keys_fold_nested_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "guild/member-add.ts");
        write(temp.path(), "ready.ts");

        let folded = RouteDefinition::new("project", "events").with_key(KeyConfig {
            nested: true,
            casing: KeyCasing::Camel,
            ..KeyConfig::default()
        });
        assert_eq!(
            keys(&folded, temp.path()).await,
            vec!["guildMemberAdd", "ready"]
        );

        let flat = RouteDefinition::new("project", "events");
        assert_eq!(keys(&flat, temp.path()).await, vec!["member-add", "ready"]);
    }

    #[tokio::test]
    async fn test_dynamic_params_and_catch_all() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "users/[id]/posts/[...rest].ts");

        let route = RouteDefinition::new("project", "api").with_filepath_keys("/");
        let entries = scan(
            &route,
            temp.path(),
            &ScanOrigin::default(),
            &exts(),
            &SourceInspector::new(),
        )
        .await;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "users/[id]/posts/[...rest]");
        assert_eq!(entries[0].params, vec!["id".to_string()]);
        assert_eq!(entries[0].catch_all.as_deref(), Some("rest"));
    }

    #[tokio::test]
    async fn test_missing_directory_yields_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let route = RouteDefinition::new("project", "commands");
        assert!(keys(&route, &temp.path().join("absent")).await.is_empty());
    }

    #[tokio::test]
    async fn test_filter_and_origin() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "ping.ts");
        write(temp.path(), "ping.spec.ts");
        write(temp.path(), "README.md");

        let route = RouteDefinition::new("project", "commands")
            .with_filter(|p| !p.to_string_lossy().contains(".spec."));
        let origin = ScanOrigin {
            plugin: Some("@acme/voice".to_string()),
            module: Some("fun".to_string()),
            base: temp.path().to_path_buf(),
        };
        let entries = scan(&route, temp.path(), &origin, &exts(), &SourceInspector::new()).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].relative, "ping.ts");
        assert_eq!(entries[0].plugin.as_deref(), Some("@acme/voice"));
        assert_eq!(entries[0].module.as_deref(), Some("fun"));
    }
}
