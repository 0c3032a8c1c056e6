//! Plexus build — discovers handlers and hooks, then writes both manifests.
//!
//! Main entry point that wires configuration, logging, and the manifest
//! pipeline together.

use tracing_subscriber::{EnvFilter, fmt};

use plexus_core::config::AppConfig;
use plexus_core::error::AppError;
use plexus_manifest::{BuildSummary, run_build};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Build error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from files and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let config_dir = std::env::var("PLEXUS_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let env = std::env::var("PLEXUS_ENV").unwrap_or_else(|_| "development".to_string());

    AppConfig::load_from(&config_dir, &env)
        .map_err(|e| AppError::configuration(format!("Config load error: {}", e)))
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Run one build
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!(
        "Starting Plexus build v{} ({} plugin(s))",
        env!("CARGO_PKG_VERSION"),
        config.plugins.len()
    );

    let summary = run_build(&config).await?;
    report(&summary);

    Ok(())
}

/// Log what changed since the previous build
fn report(summary: &BuildSummary) {
    for key in &summary.diff.added {
        tracing::info!("  + {}", key);
    }
    for key in &summary.diff.removed {
        tracing::info!("  - {}", key);
    }
    for key in &summary.diff.changed {
        tracing::info!("  ~ {}", key);
    }
    if !summary.report.is_empty() {
        tracing::warn!(
            "Build finished with {} tolerated problem(s)",
            summary.report.len()
        );
    }
    tracing::info!(
        "Wrote {} and {}",
        summary.manifest_path.display(),
        summary.hooks_path.display()
    );
}
