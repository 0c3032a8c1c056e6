//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section. Every field carries a serde default so an empty configuration
//! describes a project with no plugins.

pub mod build;
pub mod logging;
pub mod plugin;
pub mod project;
pub mod runtime;

use serde::{Deserialize, Serialize};

use self::build::BuildConfig;
use self::logging::LoggingConfig;
use self::plugin::PluginConfig;
use self::project::{LayoutConfig, ProjectConfig};
use self::runtime::RuntimeConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// Top-level deserialization target for the merged TOML configuration
/// files (default.toml + environment overlay + `PLEXUS__` variables).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Host project location and conventions.
    #[serde(default)]
    pub project: ProjectConfig,
    /// Conventional subpaths inside installed plugin packages.
    #[serde(default)]
    pub layout: LayoutConfig,
    /// Installed plugins, in registration order.
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
    /// Build artifact settings.
    #[serde(default)]
    pub build: BuildConfig,
    /// Dispatch engine settings.
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges `config/default` with an environment-specific overlay and
    /// environment variables prefixed with `PLEXUS__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        Self::load_from("config", env)
    }

    /// Load configuration rooted at an explicit directory.
    pub fn load_from(dir: &str, env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(&format!("{dir}/default")).required(false))
            .add_source(config::File::with_name(&format!("{dir}/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("PLEXUS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}
