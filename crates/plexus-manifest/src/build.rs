//! End-to-end build: assemble, validate, diff, and persist both manifests.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use plexus_core::config::AppConfig;
use plexus_core::error::{AppError, ErrorKind};
use plexus_core::result::AppResult;

use crate::assembler::Assembler;
use crate::error::ValidationReport;
use crate::hooks::{HooksManifest, discover_hooks};
use crate::inspect::{ModuleInspector, SourceInspector};
use crate::manifest::{Manifest, ManifestDiff};
use crate::route::RouteDefinition;
use crate::source::SourceSet;

/// What a successful build produced.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    /// The written manifest.
    pub manifest: Manifest,
    /// The written hooks manifest.
    pub hooks: HooksManifest,
    /// Non-fatal issues tolerated in non-strict mode.
    pub report: ValidationReport,
    /// Changes against the previously written manifest.
    pub diff: ManifestDiff,
    /// Where the manifest was written.
    pub manifest_path: PathBuf,
    /// Where the hooks manifest was written.
    pub hooks_path: PathBuf,
}

/// Runs a build with the source inspector and declared routes only.
pub async fn run_build(config: &AppConfig) -> AppResult<BuildSummary> {
    run_build_with(config, Arc::new(SourceInspector::new()), Vec::new()).await
}

/// Runs a build with a custom inspector and extra route definitions.
///
/// Fatal issues always fail the build; any issue fails it when
/// `build.strict` is set. Nothing is written on failure.
pub async fn run_build_with(
    config: &AppConfig,
    inspector: Arc<dyn ModuleInspector>,
    routes: Vec<RouteDefinition>,
) -> AppResult<BuildSummary> {
    let sources = SourceSet::from_config(config);
    info!(
        plugins = sources.plugins.len(),
        root = %sources.project.root.display(),
        "Starting build"
    );

    let assembler = routes
        .into_iter()
        .fold(Assembler::new(sources, inspector), Assembler::with_route);
    let output = assembler.build().await?;

    for issue in &output.report.issues {
        if issue.is_fatal() {
            error!(issue = %issue, "Build problem");
        } else {
            warn!(issue = %issue, "Build problem");
        }
    }
    if output.report.has_fatal() || (config.build.strict && !output.report.is_empty()) {
        return Err(output.report.to_error());
    }

    let root = PathBuf::from(&config.project.root);
    let manifest_path = root.join(&config.build.manifest_path);
    let hooks_path = root.join(&config.build.hooks_manifest_path);

    let previous = match Manifest::read_from(&manifest_path).await {
        Ok(previous) => previous,
        Err(e) if is_not_found(&e) => Manifest::new(),
        Err(e) => {
            warn!(
                path = %manifest_path.display(),
                error = %e,
                "Previous manifest unreadable, diffing against an empty one"
            );
            Manifest::new()
        }
    };
    let diff = output.manifest.diff(&previous);
    if diff.is_empty() {
        info!("Manifest unchanged");
    } else {
        info!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            changed = diff.changed.len(),
            "Manifest changed"
        );
    }
    output.manifest.write_to(&manifest_path).await?;

    let hooks = discover_hooks(assembler.sources()).await;
    hooks.write_to(&hooks_path).await?;

    info!(
        entries = output.manifest.entry_count(),
        hooks = hooks.len(),
        manifest = %manifest_path.display(),
        "Build complete"
    );

    Ok(BuildSummary {
        manifest: output.manifest,
        hooks,
        report: output.report,
        diff,
        manifest_path,
        hooks_path,
    })
}

fn is_not_found(err: &AppError) -> bool {
    err.kind == ErrorKind::Io
        && err
            .source
            .as_deref()
            .and_then(|source| source.downcast_ref::<std::io::Error>())
            .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound)
}
