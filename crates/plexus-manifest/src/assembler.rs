//! Manifest assembler: merges every source's entries and validates the result.
//!
//! Composition order:
//! - Route definitions from all sources are validated for directory and
//!   (namespace, kind) collisions before anything is scanned.
//! - Each route is scanned in every plugin (registration order), then in
//!   the project. Project entries override plugin entries key by key.
//! - Duplicate keys (within one source, or across plugins) and export rule
//!   violations are collected into the [`ValidationReport`] instead of
//!   failing early.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use plexus_core::result::AppResult;

use crate::entry::{ProcessedEntry, ScannedEntry};
use crate::error::{BuildIssue, ValidationReport};
use crate::inspect::ModuleInspector;
use crate::manifest::Manifest;
use crate::processor::process_entries;
use crate::route::{RouteDefinition, Violation};
use crate::scanner::{ScanOrigin, scan};
use crate::source::{Source, SourceSet};

/// Result of one assembly pass.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// The assembled manifest.
    pub manifest: Manifest,
    /// Every problem found along the way.
    pub report: ValidationReport,
}

/// Assembles the manifest from a source set.
#[derive(Debug)]
pub struct Assembler {
    /// Sources in composition order.
    sources: SourceSet,
    /// Export reader.
    inspector: Arc<dyn ModuleInspector>,
    /// Definitions supplied in code, checked after declared ones.
    extra_routes: Vec<RouteDefinition>,
}

impl Assembler {
    /// Creates an assembler.
    pub fn new(sources: SourceSet, inspector: Arc<dyn ModuleInspector>) -> Self {
        Self {
            sources,
            inspector,
            extra_routes: Vec::new(),
        }
    }

    /// Adds a route definition built in code (e.g. with a filter or processor).
    pub fn with_route(mut self, route: RouteDefinition) -> Self {
        self.extra_routes.push(route);
        self
    }

    /// Returns the source set.
    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    /// Runs discovery, processing, merging, and validation.
    pub async fn build(&self) -> AppResult<BuildOutput> {
        let mut report = ValidationReport::new();

        let mut routes = self.sources.route_definitions().await;
        routes.extend(self.extra_routes.iter().cloned());
        let routes = validate_routes(routes, &mut report);

        let mut manifest = Manifest::new();
        for route in &routes {
            manifest.ensure_kind(&route.namespace, &route.kind);

            let per_source = join_all(
                self.sources
                    .iter()
                    .map(|source| self.collect_source(route, source)),
            )
            .await;

            let mut plugin_claims: HashMap<String, String> = HashMap::new();
            for (source, entries) in self.sources.iter().zip(per_source) {
                merge_source(&mut manifest, route, source, entries, &mut plugin_claims, &mut report);
            }
        }

        info!(
            routes = routes.len(),
            entries = manifest.entry_count(),
            problems = report.len(),
            "Manifest assembled"
        );

        Ok(BuildOutput { manifest, report })
    }

    /// Scans and processes one route inside one source.
    async fn collect_source(&self, route: &RouteDefinition, source: &Source) -> Vec<(ScannedEntry, ProcessedEntry)> {
        let mut collected = Vec::new();
        for (root, module) in self.sources.scan_roots(source, &route.directory).await {
            let origin = ScanOrigin {
                plugin: source.plugin_name().map(str::to_string),
                module,
                base: self.sources.project.root.clone(),
            };
            let scanned = scan(
                route,
                &root,
                &origin,
                &self.sources.handler_extensions,
                self.inspector.as_ref(),
            )
            .await;
            let processed = process_entries(route, &scanned).await;
            collected.extend(scanned.into_iter().zip(processed));
        }
        collected
    }
}

/// Drops routes that collide with an earlier one, recording the collision.
fn validate_routes(routes: Vec<RouteDefinition>, report: &mut ValidationReport) -> Vec<RouteDefinition> {
    let mut directories: HashMap<String, String> = HashMap::new();
    let mut ids: HashSet<String> = HashSet::new();
    let mut accepted = Vec::with_capacity(routes.len());

    for route in routes {
        let id = route.id();
        if !ids.insert(id.clone()) {
            report.push(BuildIssue::DuplicateRoute {
                namespace: route.namespace.clone(),
                kind: route.kind.clone(),
            });
            continue;
        }

        let directory = route.normalized_directory();
        if let Some(first) = directories.get(&directory) {
            report.push(BuildIssue::DirectoryCollision {
                directory,
                first: first.clone(),
                second: id,
            });
            continue;
        }
        directories.insert(directory, id);
        accepted.push(route);
    }
    accepted
}

/// Merges one source's entries for a route into the manifest.
///
/// `plugin_claims` maps keys already taken by earlier plugins to the file
/// that took them. Only the project may replace such an entry.
fn merge_source(
    manifest: &mut Manifest,
    route: &RouteDefinition,
    source: &Source,
    entries: Vec<(ScannedEntry, ProcessedEntry)>,
    plugin_claims: &mut HashMap<String, String>,
    report: &mut ValidationReport,
) {
    let mut seen: HashMap<String, String> = HashMap::new();

    for (scanned, processed) in entries {
        if processed.is_error() {
            continue;
        }
        if !check_exports(route, &scanned, &processed, report) {
            continue;
        }

        if !route.multiple {
            let claimed = match seen.get(&processed.key) {
                Some(first) => Some(first),
                None if !source.is_project() => plugin_claims.get(&processed.key),
                None => None,
            };
            if let Some(first) = claimed {
                report.push(BuildIssue::DuplicateKey {
                    namespace: route.namespace.clone(),
                    kind: route.kind.clone(),
                    key: processed.key.clone(),
                    first: first.clone(),
                    second: processed.path.clone(),
                });
                continue;
            }
            seen.insert(processed.key.clone(), processed.path.clone());
        }

        let key = processed.key.clone();
        if let Some(previous) = manifest.insert(&route.namespace, &route.kind, processed, route.multiple) {
            debug!(
                route = %route.id(),
                key = %key,
                overridden = %previous.path,
                by = %source.namespace,
                "Plugin entry overridden by project"
            );
        }
    }

    if !source.is_project() {
        plugin_claims.extend(seen);
    }
}

/// Records export rule violations; returns whether the entry is valid.
fn check_exports(
    route: &RouteDefinition,
    scanned: &ScannedEntry,
    processed: &ProcessedEntry,
    report: &mut ValidationReport,
) -> bool {
    let checks = [
        ("default", route.exports.default.check(scanned.exports.default)),
        ("config", route.exports.config.check(scanned.exports.config.is_some())),
    ];

    let mut valid = true;
    for (export, violation) in checks {
        let Some(violation) = violation else {
            continue;
        };
        valid = false;
        warn!(route = %route.id(), path = %processed.path, export, ?violation, "Export rule violated");
        let (namespace, kind, export, path) = (
            route.namespace.clone(),
            route.kind.clone(),
            export.to_string(),
            processed.path.clone(),
        );
        report.push(match violation {
            Violation::Missing => BuildIssue::MissingExport {
                namespace,
                kind,
                export,
                path,
            },
            Violation::Forbidden => BuildIssue::ForbiddenExport {
                namespace,
                kind,
                export,
                path,
            },
        });
    }
    valid
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use plexus_core::config::AppConfig;
    use plexus_core::config::plugin::PluginConfig;

    use super::*;
    use crate::inspect::SourceInspector;
    use crate::route::{ExportRules, Requirement};

    const HANDLER: &str = "export default () => {}\n";

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, contents).expect("write");
    }

    fn config_with_plugins(root: &Path, plugins: &[&str]) -> AppConfig {
        let mut config = AppConfig::default();
        config.project.root = root.join("app").to_string_lossy().to_string();
        for name in plugins {
            config.plugins.push(PluginConfig {
                name: name.to_string(),
                root: root.join("plugins").join(name).to_string_lossy().to_string(),
                options: None,
            });
        }
        config
    }

    fn assembler(config: &AppConfig) -> Assembler {
        Assembler::new(SourceSet::from_config(config), Arc::new(SourceInspector::new()))
    }

    #[tokio::test]
    async fn test_project_overrides_plugin_entry() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config_with_plugins(temp.path(), &["p1"]);
        write(temp.path(), "plugins/p1/.plexus/build/routes/commands.toml", "");
        write(temp.path(), "plugins/p1/.plexus/build/commands/ping.js", HANDLER);
        write(temp.path(), "plugins/p1/.plexus/build/commands/pong.js", HANDLER);
        write(temp.path(), "app/src/commands/ping.ts", HANDLER);

        let output = assembler(&config).build().await.expect("build");
        assert!(output.report.is_empty(), "{:?}", output.report);

        let manifest = &output.manifest;
        assert_eq!(manifest.keys("p1", "commands"), vec!["ping", "pong"]);
        let ping = &manifest.get("p1", "commands", "ping").expect("ping").entries()[0];
        assert_eq!(ping.path, "src/commands/ping.ts");
        assert!(ping.plugin.is_none());
        let pong = &manifest.get("p1", "commands", "pong").expect("pong").entries()[0];
        assert_eq!(pong.plugin.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn test_directory_collision_is_fatal_and_aggregated() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config_with_plugins(temp.path(), &["p1", "p2"]);
        write(temp.path(), "plugins/p1/.plexus/build/routes/commands.toml", "");
        write(temp.path(), "plugins/p2/.plexus/build/routes/commands.toml", "");
        write(temp.path(), "app/config/routes/slash.toml", "directory = \"commands/\"\n");
        write(temp.path(), "app/src/commands/ping.ts", "export const config = {}\n");

        let output = assembler(&config).build().await.expect("build");
        let issues = &output.report.issues;
        assert!(output.report.has_fatal());
        assert_eq!(
            issues
                .iter()
                .filter(|i| matches!(i, BuildIssue::DirectoryCollision { .. }))
                .count(),
            2
        );
        assert!(issues.iter().any(|i| matches!(
            i,
            BuildIssue::MissingExport { export, .. } if export == "default"
        )));
    }

    #[tokio::test]
    async fn test_plugins_cannot_override_each_other() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config_with_plugins(temp.path(), &["p1", "p2"]);
        write(temp.path(), "plugins/p1/.plexus/build/routes/commands.toml", "");
        write(temp.path(), "plugins/p1/.plexus/build/commands/ping.js", HANDLER);
        write(temp.path(), "plugins/p2/.plexus/build/commands/ping.js", HANDLER);
        write(temp.path(), "plugins/p2/.plexus/build/commands/pong.js", HANDLER);

        let output = assembler(&config).build().await.expect("build");
        assert!(matches!(
            &output.report.issues[..],
            [BuildIssue::DuplicateKey { key, first, second, .. }]
                if key == "ping" && first.contains("p1/") && second.contains("p2/")
        ));
        assert!(!output.report.has_fatal());

        let ping = &output.manifest.get("p1", "commands", "ping").expect("ping").entries()[0];
        assert_eq!(ping.plugin.as_deref(), Some("p1"));
        let pong = &output.manifest.get("p1", "commands", "pong").expect("pong").entries()[0];
        assert_eq!(pong.plugin.as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn test_project_still_overrides_after_plugin_conflict() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config_with_plugins(temp.path(), &["p1", "p2"]);
        write(temp.path(), "plugins/p1/.plexus/build/routes/commands.toml", "");
        write(temp.path(), "plugins/p1/.plexus/build/commands/ping.js", HANDLER);
        write(temp.path(), "plugins/p2/.plexus/build/commands/ping.js", HANDLER);
        write(temp.path(), "app/src/commands/ping.ts", HANDLER);

        let output = assembler(&config).build().await.expect("build");
        assert_eq!(output.report.len(), 1);
        let ping = &output.manifest.get("p1", "commands", "ping").expect("ping").entries()[0];
        assert_eq!(ping.path, "src/commands/ping.ts");
        assert!(ping.plugin.is_none());
    }

    #[test]
    fn test_directory_collision_is_case_sensitive() {
        let mut report = ValidationReport::new();
        let routes = vec![
            RouteDefinition::new("project", "commands"),
            RouteDefinition::new("project", "slash").with_directory("Commands"),
            RouteDefinition::new("project", "legacy").with_directory("./commands/"),
        ];

        let accepted = validate_routes(routes, &mut report);
        let kinds: Vec<&str> = accepted.iter().map(|r| r.kind.as_str()).collect();
        assert_eq!(kinds, vec!["commands", "slash"]);
        assert!(matches!(
            &report.issues[..],
            [BuildIssue::DirectoryCollision { directory, second, .. }]
                if directory == "commands" && second == "project:legacy"
        ));
    }

    #[tokio::test]
    async fn test_duplicate_keys_require_multiple() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config_with_plugins(temp.path(), &[]);
        write(temp.path(), "app/config/routes/commands.toml", "");
        write(temp.path(), "app/config/routes/events.toml", "multiple = true\n");
        write(temp.path(), "app/src/commands/ping.ts", HANDLER);
        write(temp.path(), "app/src/commands/ping.js", HANDLER);
        write(temp.path(), "app/src/events/ready.ts", HANDLER);
        write(temp.path(), "app/src/modules/stats/events/ready.ts", HANDLER);

        let output = assembler(&config).build().await.expect("build");
        assert_eq!(output.report.len(), 1);
        assert!(matches!(
            &output.report.issues[0],
            BuildIssue::DuplicateKey { key, .. } if key == "ping"
        ));

        let ready = output
            .manifest
            .get("project", "events", "ready")
            .expect("ready")
            .entries()
            .to_vec();
        assert_eq!(ready.len(), 2);
        assert_eq!(ready[1].module.as_deref(), Some("stats"));
    }

    #[tokio::test]
    async fn test_forbidden_export_and_code_routes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config_with_plugins(temp.path(), &[]);
        write(temp.path(), "app/src/context/user.ts", "export default 1\nexport const config = {}\n");
        write(temp.path(), "app/src/context/message.ts", HANDLER);

        let route = RouteDefinition::new("project", "context").with_exports(ExportRules {
            config: Requirement::Forbidden,
            ..ExportRules::default()
        });
        let output = assembler(&config).with_route(route).build().await.expect("build");

        assert!(matches!(
            &output.report.issues[..],
            [BuildIssue::ForbiddenExport { export, .. }] if export == "config"
        ));
        assert_eq!(output.manifest.keys("project", "context"), vec!["message"]);
    }

    #[tokio::test]
    async fn test_rebuild_is_byte_identical() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config_with_plugins(temp.path(), &["p1", "p2"]);
        write(temp.path(), "plugins/p1/.plexus/build/routes/events.toml", "multiple = true\n");
        write(temp.path(), "plugins/p1/.plexus/build/events/ready.js", HANDLER);
        write(temp.path(), "plugins/p2/.plexus/build/events/ready.js", HANDLER);
        write(temp.path(), "plugins/p2/.plexus/build/events/messageCreate.js", HANDLER);
        write(temp.path(), "app/src/events/ready.ts", HANDLER);

        let first = assembler(&config).build().await.expect("first");
        let second = assembler(&config).build().await.expect("second");
        assert_eq!(
            first.manifest.to_json().expect("json"),
            second.manifest.to_json().expect("json")
        );

        let ready = first.manifest.get("p1", "events", "ready").expect("ready");
        let owners: Vec<Option<&str>> = ready.entries().iter().map(|e| e.plugin.as_deref()).collect();
        assert_eq!(owners, vec![Some("p1"), Some("p2"), None]);
    }
}
