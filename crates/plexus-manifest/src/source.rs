//! Sources: the host project plus installed plugins, resolved once at bootstrap.
//!
//! Each plugin is an explicit record built from configuration in
//! registration order. Conventional subpaths (handler sources, route
//! definitions, hook candidates) come from the layout configuration.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use plexus_core::config::AppConfig;

use crate::route::{RouteConfig, RouteDefinition};

/// Who owns a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// An installed plugin package.
    Plugin {
        /// Package name.
        name: String,
    },
    /// The host project.
    Project,
}

/// One discovered source of routes and hooks.
#[derive(Debug, Clone)]
pub struct Source {
    /// Owner of this source.
    pub origin: Origin,
    /// Namespace derived from the owner.
    pub namespace: String,
    /// Package or project root.
    pub root: PathBuf,
    /// Directory holding handler sources.
    pub source_dir: PathBuf,
    /// Directory holding route definition files.
    pub routes_dir: PathBuf,
    /// Hook directories, probed in order.
    pub hook_dirs: Vec<PathBuf>,
}

impl Source {
    /// Plugin name, or `None` for the project.
    pub fn plugin_name(&self) -> Option<&str> {
        match &self.origin {
            Origin::Plugin { name } => Some(name),
            Origin::Project => None,
        }
    }

    /// Returns whether this source is the host project.
    pub fn is_project(&self) -> bool {
        self.origin == Origin::Project
    }

    /// Loads the route definitions this source declares.
    ///
    /// Every `<kind>.toml` file under the routes directory becomes one
    /// definition owned by this source's namespace. A missing directory
    /// yields nothing; unreadable or malformed files are logged and skipped.
    pub async fn route_definitions(&self) -> Vec<RouteDefinition> {
        let mut files = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.routes_dir).await {
            Ok(dir) => dir,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        namespace = %self.namespace,
                        path = %self.routes_dir.display(),
                        error = %e,
                        "Route definition directory unreadable"
                    );
                }
                return Vec::new();
            }
        };

        loop {
            match dir.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                        files.push(path);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(namespace = %self.namespace, error = %e, "Route definition listing failed");
                    break;
                }
            }
        }
        files.sort();

        let mut routes = Vec::with_capacity(files.len());
        for path in files {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let parsed = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => toml::from_str::<RouteConfig>(&raw).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match parsed {
                Ok(config) => {
                    let route = RouteDefinition::from_config(&self.namespace, stem, config);
                    debug!(route = %route.id(), directory = %route.directory, "Route definition loaded");
                    routes.push(route);
                }
                Err(error) => {
                    warn!(
                        namespace = %self.namespace,
                        path = %path.display(),
                        error = %error,
                        "Skipping malformed route definition"
                    );
                }
            }
        }
        routes
    }
}

/// The ordered set of sources: plugins in registration order, then the project.
#[derive(Debug, Clone)]
pub struct SourceSet {
    /// Installed plugins, in registration order.
    pub plugins: Vec<Source>,
    /// The host project.
    pub project: Source,
    /// Extensions recognized for handler files.
    pub handler_extensions: Vec<String>,
    /// Extensions recognized for hook modules.
    pub hook_extensions: Vec<String>,
    /// Directory name grouping feature modules inside a source dir.
    pub modules_dir: String,
}

impl SourceSet {
    /// Resolves every source from configuration.
    ///
    /// Relative plugin roots are resolved against the project root.
    pub fn from_config(config: &AppConfig) -> Self {
        let layout = &config.layout;
        let project_root = PathBuf::from(&config.project.root);

        let plugins = config
            .plugins
            .iter()
            .map(|plugin| {
                let root = project_root.join(&plugin.root);
                Source {
                    origin: Origin::Plugin {
                        name: plugin.name.clone(),
                    },
                    namespace: plugin_namespace(&plugin.name),
                    source_dir: root.join(&layout.source_dir),
                    routes_dir: root.join(&layout.routes_dir),
                    hook_dirs: layout.hook_dirs.iter().take(2).map(|d| root.join(d)).collect(),
                    root,
                }
            })
            .collect();

        let project = Source {
            origin: Origin::Project,
            namespace: config.project.namespace.clone(),
            source_dir: project_root.join(&config.project.source_dir),
            routes_dir: project_root.join(&config.project.routes_dir),
            hook_dirs: vec![project_root.join(&config.project.hook_dir)],
            root: project_root,
        };

        Self {
            plugins,
            project,
            handler_extensions: layout.handler_extensions.clone(),
            hook_extensions: layout.hook_extensions.clone(),
            modules_dir: layout.modules_dir.clone(),
        }
    }

    /// Path written to the manifests for a discovered file.
    pub fn manifest_path(&self, path: &Path) -> String {
        relative_path(path, &self.project.root)
    }

    /// Iterates plugins in registration order, then the project.
    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.plugins.iter().chain(std::iter::once(&self.project))
    }

    /// Loads every declared route definition, plugins first.
    pub async fn route_definitions(&self) -> Vec<RouteDefinition> {
        let mut routes = Vec::new();
        for source in self.iter() {
            routes.extend(source.route_definitions().await);
        }
        routes
    }

    /// Scan roots for a route directory within one source.
    ///
    /// The first root is `<source_dir>/<directory>`; each feature module
    /// under `<source_dir>/<modules_dir>/<name>/<directory>` follows in
    /// name order.
    pub async fn scan_roots(&self, source: &Source, directory: &str) -> Vec<(PathBuf, Option<String>)> {
        let mut roots = vec![(source.source_dir.join(directory), None)];
        let modules_root = source.source_dir.join(&self.modules_dir);

        let mut names = Vec::new();
        if let Ok(mut dir) = tokio::fs::read_dir(&modules_root).await {
            while let Ok(Some(entry)) = dir.next_entry().await {
                let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                if is_dir {
                    names.push(entry.file_name().to_string_lossy().to_string());
                }
            }
        }
        names.sort();

        for name in names {
            roots.push((modules_root.join(&name).join(directory), Some(name)));
        }
        roots
    }
}

/// Derives a namespace from a plugin package name.
///
/// A leading `@` is dropped and every run of non-alphanumeric characters
/// starts a new camel-cased word: `@acme/discord-voice` → `acmeDiscordVoice`.
pub fn plugin_namespace(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.trim_start_matches('@').chars() {
        if ch.is_ascii_alphanumeric() {
            if upper_next && !out.is_empty() {
                out.push(ch.to_ascii_uppercase());
            } else {
                out.push(ch);
            }
            upper_next = false;
        } else {
            upper_next = true;
        }
    }
    out
}

/// Converts a path into a `/`-separated string.
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Expresses `path` relative to `base`, `/`-separated.
///
/// Paths outside `base` climb out with `..`; paths sharing no prefix with
/// it are returned whole.
pub fn relative_path(path: &Path, base: &Path) -> String {
    if let Ok(inside) = path.strip_prefix(base) {
        return normalize_path(inside);
    }

    let path_parts: Vec<Component<'_>> = path.components().collect();
    let base_parts: Vec<Component<'_>> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 {
        return normalize_path(path);
    }

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &path_parts[common..] {
        relative.push(part.as_os_str());
    }
    normalize_path(&relative)
}
