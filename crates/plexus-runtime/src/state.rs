//! Administrative state and failure diagnostics.
//!
//! Both seams front external collaborators (a persisted key-value store
//! and a diagnostics channel). In-memory implementations are provided.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Per-module enable state.
#[async_trait]
pub trait StateStore: Send + Sync + std::fmt::Debug {
    /// Returns whether handlers of a feature module may run.
    async fn is_module_enabled(&self, module: &str) -> bool;

    /// Enables or disables a feature module.
    async fn set_module_enabled(&self, module: &str, enabled: bool);
}

/// Process-local state store. Modules are enabled unless disabled.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    modules: DashMap<String, bool>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn is_module_enabled(&self, module: &str) -> bool {
        self.modules.get(module).map(|v| *v).unwrap_or(true)
    }

    async fn set_module_enabled(&self, module: &str, enabled: bool) {
        self.modules.insert(module.to_string(), enabled);
    }
}

/// How a handler failure is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// A lifecycle handler exceeded its deadline.
    Timeout,
    /// A host project handler failed.
    Host,
    /// A plugin handler failed.
    Plugin,
    /// A plugin's own start handler failed with fail-safe mode on.
    PluginStartup,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Host => "host",
            Self::Plugin => "plugin",
            Self::PluginStartup => "plugin_startup",
        };
        write!(f, "{name}")
    }
}

/// A handler failure reported to the diagnostic sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Handler key (event name).
    pub key: String,
    /// Route as `namespace:kind`.
    pub route: String,
    /// Owning plugin, if any.
    pub plugin: Option<String>,
    /// Handler module path.
    pub path: String,
    /// Classification.
    pub class: FailureClass,
    /// Failure message.
    pub message: String,
}

/// Receives handler failures.
#[async_trait]
pub trait DiagnosticSink: Send + Sync + std::fmt::Debug {
    /// Records one failure.
    async fn report(&self, diagnostic: Diagnostic);
}

/// Sink that keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct MemoryDiagnosticSink {
    diagnostics: RwLock<Vec<Diagnostic>>,
}

impl MemoryDiagnosticSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded diagnostic in arrival order.
    pub async fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.read().await.clone()
    }
}

#[async_trait]
impl DiagnosticSink for MemoryDiagnosticSink {
    async fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.write().await.push(diagnostic);
    }
}
