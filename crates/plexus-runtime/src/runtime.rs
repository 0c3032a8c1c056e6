//! Runtime facade: loads a manifest and hands out controllers.

use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use serde_json::Value;
use tracing::info;

use plexus_core::config::AppConfig;
use plexus_core::config::runtime::RuntimeConfig;
use plexus_core::error::AppError;
use plexus_core::result::AppResult;
use plexus_manifest::Manifest;

use crate::controller::{ControllerFactory, NamespaceController};
use crate::dispatcher::{DispatchEngine, DispatchReport};
use crate::module::ModuleLoader;
use crate::record::RouteId;
use crate::state::{DiagnosticSink, MemoryStateStore, StateStore};

/// Loaded handlers plus the controllers that front them.
pub struct Runtime {
    /// Dispatch engine.
    engine: DispatchEngine,
    /// Kind → custom controller factory.
    factories: DashMap<String, Arc<dyn ControllerFactory>>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("Runtime")
            .field("engine", &self.engine)
            .field("factories", &kinds)
            .finish()
    }
}

impl Runtime {
    /// Starts building a runtime over a manifest.
    pub fn builder(manifest: Manifest) -> RuntimeBuilder {
        RuntimeBuilder::new(manifest)
    }

    /// Loads the manifest written by the last build and wires plugin options.
    pub async fn load(config: &AppConfig, loader: Arc<dyn ModuleLoader>) -> AppResult<Self> {
        let path = PathBuf::from(&config.project.root).join(&config.build.manifest_path);
        let manifest = Manifest::read_from(&path).await.map_err(|e| {
            AppError::configuration(format!("Failed to read manifest {}: {e}", path.display()))
        })?;

        let mut builder = Self::builder(manifest)
            .loader(loader)
            .config(config.runtime.clone());
        for plugin in &config.plugins {
            if let Some(options) = &plugin.options {
                builder = builder.plugin_options(&plugin.name, options.clone());
            }
        }
        builder.build()
    }

    /// The dispatch engine.
    pub fn engine(&self) -> &DispatchEngine {
        &self.engine
    }

    /// The loaded manifest.
    pub fn manifest(&self) -> &Manifest {
        self.engine.manifest()
    }

    /// Base controller of a route.
    pub fn controller(&self, namespace: &str, kind: &str) -> NamespaceController {
        NamespaceController::new(self.engine.clone(), RouteId::new(namespace, kind))
    }

    /// Registers a custom controller factory for a kind.
    pub fn register_controller(&self, kind: &str, factory: Arc<dyn ControllerFactory>) {
        info!(kind, "Controller factory registered");
        self.factories.insert(kind.to_string(), factory);
    }

    /// Builds the custom controller of a route and downcasts it.
    ///
    /// Returns `None` when no factory is registered for the kind or the
    /// factory produced another type.
    pub fn custom_controller<T>(&self, namespace: &str, kind: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let factory = self.factories.get(kind)?.value().clone();
        factory
            .create(self.controller(namespace, kind))
            .downcast::<T>()
            .ok()
    }

    /// Dispatches an event on one route.
    pub async fn dispatch(&self, namespace: &str, kind: &str, event: &str, args: Vec<Value>) -> DispatchReport {
        self.engine
            .dispatch(&RouteId::new(namespace, kind), event, args)
            .await
    }

    /// Dispatches an event on every route that has handlers for it.
    ///
    /// Reports come back in manifest order.
    pub async fn emit_all(&self, event: &str, args: Vec<Value>) -> Vec<DispatchReport> {
        let routes: Vec<RouteId> = self
            .manifest()
            .iter()
            .filter(|(address, _)| address.key == event)
            .map(|(address, _)| RouteId::new(&address.namespace, &address.kind))
            .collect();

        join_all(
            routes
                .iter()
                .map(|route| self.engine.dispatch(route, event, args.clone())),
        )
        .await
    }

    /// Fires the start lifecycle event everywhere.
    pub async fn start(&self) -> Vec<DispatchReport> {
        let event = self.engine.config().start_event.clone();
        let reports = self.emit_all(&event, Vec::new()).await;
        let failures: usize = reports.iter().map(DispatchReport::failures).sum();
        info!(event = %event, routes = reports.len(), failures, "Start event dispatched");
        reports
    }

    /// Enables or disables a feature module.
    pub async fn set_module_enabled(&self, module: &str, enabled: bool) {
        self.engine.state().set_module_enabled(module, enabled).await;
        info!(module, enabled, "Module state changed");
    }
}

/// Collects the collaborators of a [`Runtime`].
pub struct RuntimeBuilder {
    manifest: Manifest,
    loader: Option<Arc<dyn ModuleLoader>>,
    state: Arc<dyn StateStore>,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
    plugin_options: HashMap<String, Value>,
    factories: Vec<(String, Arc<dyn ControllerFactory>)>,
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    /// Starts with an in-memory state store and default settings.
    pub fn new(manifest: Manifest) -> Self {
        Self {
            manifest,
            loader: None,
            state: Arc::new(MemoryStateStore::new()),
            diagnostics: None,
            plugin_options: HashMap::new(),
            factories: Vec::new(),
            config: RuntimeConfig::default(),
        }
    }

    /// Sets the module loader (required).
    pub fn loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Sets the state store.
    pub fn state_store(mut self, state: Arc<dyn StateStore>) -> Self {
        self.state = state;
        self
    }

    /// Sets the diagnostic sink.
    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// Sets the options passed to a plugin's handlers.
    pub fn plugin_options(mut self, plugin: &str, options: Value) -> Self {
        self.plugin_options.insert(plugin.to_string(), options);
        self
    }

    /// Registers a custom controller factory for a kind.
    pub fn controller_factory(mut self, kind: &str, factory: Arc<dyn ControllerFactory>) -> Self {
        self.factories.push((kind.to_string(), factory));
        self
    }

    /// Sets the runtime settings.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> AppResult<Runtime> {
        let loader = self
            .loader
            .ok_or_else(|| AppError::configuration("A module loader is required"))?;

        let entries = self.manifest.entry_count();
        let engine = DispatchEngine::with_parts(
            Arc::new(self.manifest),
            loader,
            self.state,
            self.diagnostics,
            self.plugin_options,
            self.config,
        );
        info!(entries, middleware = engine.middleware().len(), "Runtime loaded");

        Ok(Runtime {
            engine,
            factories: self.factories.into_iter().collect(),
        })
    }
}
