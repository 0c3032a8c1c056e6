//! Dispatch engine configuration.

use serde::{Deserialize, Serialize};

/// Dispatch engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Event names starting with this prefix are lifecycle events.
    #[serde(default = "default_lifecycle_prefix")]
    pub lifecycle_prefix: String,
    /// Deadline for lifecycle handler invocations, in milliseconds.
    #[serde(default = "default_lifecycle_timeout")]
    pub lifecycle_timeout_ms: u64,
    /// Classify a plugin's failing start handler separately.
    #[serde(default)]
    pub fail_safe: bool,
    /// Name of the start lifecycle event.
    #[serde(default = "default_start_event")]
    pub start_event: String,
    /// Route kind whose entries form the middleware chain.
    #[serde(default = "default_middleware_kind")]
    pub middleware_kind: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lifecycle_prefix: default_lifecycle_prefix(),
            lifecycle_timeout_ms: default_lifecycle_timeout(),
            fail_safe: false,
            start_event: default_start_event(),
            middleware_kind: default_middleware_kind(),
        }
    }
}

fn default_lifecycle_prefix() -> String {
    "_".to_string()
}

fn default_lifecycle_timeout() -> u64 {
    5000
}

fn default_start_event() -> String {
    "_start".to_string()
}

fn default_middleware_kind() -> String {
    "middleware".to_string()
}
