//! Dispatch engine: runs every handler of an event as an isolated task.
//!
//! For each dispatch:
//! - Records for the event are resolved and stable-sorted by priority.
//! - Each record runs in its own task: import, enable checks, middleware,
//!   run-once claim, then invocation.
//! - Lifecycle events (prefixed, `_` by default) race the invocation
//!   against a deadline; losing tasks keep running detached.
//! - Failures and timeouts are classified, logged, and reported to the
//!   diagnostic sink. Nothing is propagated to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinError;
use tracing::{debug, error, warn};

use plexus_core::config::runtime::RuntimeConfig;
use plexus_manifest::Manifest;
use plexus_manifest::processor::panic_message;

use crate::middleware::{MiddlewareChain, MiddlewareOutcome};
use crate::module::{HandlerCall, ModuleLoader};
use crate::record::{HandlerId, HandlerRecord, RecordTable, RouteId};
use crate::state::{Diagnostic, DiagnosticSink, FailureClass, MemoryStateStore, StateStore};

/// Why a handler was not invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The owning feature module is disabled in the state store.
    ModuleDisabled,
    /// The handler's `enabled` flag is off.
    HandlerDisabled,
    /// A middleware aborted the handler.
    Middleware {
        /// Key of the aborting middleware.
        by: String,
    },
    /// A run-once handler already fired.
    AlreadyFired,
}

/// Final state of one handler in a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// The handler returned a value.
    Resolved(Value),
    /// The handler was not invoked.
    Skipped(SkipReason),
    /// The handler errored, panicked, or could not be loaded.
    Failed {
        /// Classification.
        class: FailureClass,
        /// Failure message.
        message: String,
    },
    /// A lifecycle handler missed its deadline.
    TimedOut,
}

impl HandlerOutcome {
    /// Returns the resolved value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Resolved(value) => Some(value),
            _ => None,
        }
    }
}

/// One handler's line in a [`DispatchReport`].
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerReport {
    /// Record id.
    pub id: HandlerId,
    /// Owning plugin.
    pub plugin: Option<String>,
    /// Module path.
    pub path: String,
    /// Final state.
    pub outcome: HandlerOutcome,
}

/// Per-handler outcomes of one dispatch, in priority order.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    /// Dispatched route.
    pub route: RouteId,
    /// Dispatched event.
    pub event: String,
    /// Outcomes in priority order.
    pub handlers: Vec<HandlerReport>,
}

impl DispatchReport {
    /// Returns whether no handler matched.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Values of every resolved handler, in priority order.
    pub fn values(&self) -> Vec<&Value> {
        self.handlers.iter().filter_map(|h| h.outcome.value()).collect()
    }

    /// Number of failed or timed-out handlers.
    pub fn failures(&self) -> usize {
        self.handlers
            .iter()
            .filter(|h| matches!(h.outcome, HandlerOutcome::Failed { .. } | HandlerOutcome::TimedOut))
            .count()
    }
}

/// Shared engine state.
#[derive(Debug)]
struct EngineInner {
    manifest: Arc<Manifest>,
    records: RecordTable,
    loader: Arc<dyn ModuleLoader>,
    state: Arc<dyn StateStore>,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
    plugin_options: HashMap<String, Value>,
    middleware: MiddlewareChain,
    config: RuntimeConfig,
}

/// Runs handlers from a loaded manifest. Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct DispatchEngine {
    inner: Arc<EngineInner>,
}

impl DispatchEngine {
    /// Creates an engine with an in-memory state store and no diagnostic sink.
    pub fn new(manifest: Arc<Manifest>, loader: Arc<dyn ModuleLoader>, config: RuntimeConfig) -> Self {
        Self::with_parts(
            manifest,
            loader,
            Arc::new(MemoryStateStore::new()),
            None,
            HashMap::new(),
            config,
        )
    }

    /// Creates an engine from every collaborator.
    ///
    /// The middleware chain is materialized here from every route whose
    /// kind is `config.middleware_kind`.
    pub fn with_parts(
        manifest: Arc<Manifest>,
        loader: Arc<dyn ModuleLoader>,
        state: Arc<dyn StateStore>,
        diagnostics: Option<Arc<dyn DiagnosticSink>>,
        plugin_options: HashMap<String, Value>,
        config: RuntimeConfig,
    ) -> Self {
        let records = RecordTable::new();
        let mut middleware = Vec::new();
        for namespace in manifest.namespaces() {
            let route = RouteId::new(namespace, &config.middleware_kind);
            for key in manifest.keys(namespace, &config.middleware_kind) {
                middleware.extend(records.resolve(&manifest, &route, &key));
            }
        }
        debug!(middleware = middleware.len(), "Dispatch engine ready");

        Self {
            inner: Arc::new(EngineInner {
                manifest,
                records,
                loader,
                state,
                diagnostics,
                plugin_options,
                middleware: MiddlewareChain::new(middleware),
                config,
            }),
        }
    }

    /// The loaded manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.inner.manifest
    }

    /// The module loader.
    pub fn loader(&self) -> &dyn ModuleLoader {
        self.inner.loader.as_ref()
    }

    /// The state store.
    pub fn state(&self) -> &Arc<dyn StateStore> {
        &self.inner.state
    }

    /// The global middleware chain.
    pub fn middleware(&self) -> &MiddlewareChain {
        &self.inner.middleware
    }

    /// Runtime settings.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Records of a route key, created on first use.
    pub fn resolve(&self, route: &RouteId, key: &str) -> Vec<Arc<HandlerRecord>> {
        self.inner.records.resolve(&self.inner.manifest, route, key)
    }

    /// Looks up a record by id.
    pub fn record(&self, id: HandlerId) -> Option<Arc<HandlerRecord>> {
        self.inner.records.get(id)
    }

    /// Dispatches an event to every handler of a route key.
    ///
    /// Resolves once every handler settled (or, for lifecycle events,
    /// timed out). An unknown event yields an empty report.
    pub async fn dispatch(&self, route: &RouteId, event: &str, args: Vec<Value>) -> DispatchReport {
        let mut records = self.resolve(route, event);
        if records.is_empty() {
            debug!(route = %route, event, "No handlers for event");
            return DispatchReport {
                route: route.clone(),
                event: event.to_string(),
                handlers: Vec::new(),
            };
        }
        records.sort_by_key(|r| r.priority());

        let prefix = &self.inner.config.lifecycle_prefix;
        let lifecycle = !prefix.is_empty() && event.starts_with(prefix.as_str());
        debug!(route = %route, event, handlers = records.len(), lifecycle, "Dispatching event");

        let tasks: Vec<_> = records
            .iter()
            .map(|record| {
                let inner = self.inner.clone();
                let record = record.clone();
                let event = event.to_string();
                let args = args.clone();
                tokio::spawn(async move { inner.run_handler(&record, &event, args, lifecycle).await })
            })
            .collect();

        let mut handlers = Vec::with_capacity(records.len());
        for (record, task) in records.iter().zip(tasks) {
            let outcome = match task.await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(message)) => HandlerOutcome::Failed {
                    class: self.inner.classify(record, event),
                    message,
                },
                Err(join) => HandlerOutcome::Failed {
                    class: self.inner.classify(record, event),
                    message: join_message(join),
                },
            };
            self.inner.settle(record, event, &outcome).await;
            handlers.push(HandlerReport {
                id: record.id(),
                plugin: record.plugin().map(str::to_string),
                path: record.entry().path.clone(),
                outcome,
            });
        }

        DispatchReport {
            route: route.clone(),
            event: event.to_string(),
            handlers,
        }
    }
}

impl EngineInner {
    /// Options configured for a plugin.
    fn options_for(&self, plugin: Option<&str>) -> Option<Value> {
        plugin.and_then(|name| self.plugin_options.get(name).cloned())
    }

    /// Runs one handler up to settlement; `Err` carries a failure message.
    async fn run_handler(
        &self,
        record: &HandlerRecord,
        event: &str,
        args: Vec<Value>,
        lifecycle: bool,
    ) -> Result<HandlerOutcome, String> {
        let handler = record
            .default_export(self.loader.as_ref())
            .await
            .map_err(|e| e.to_string())?;

        if let Some(module) = record.module_name() {
            if !self.state.is_module_enabled(module).await {
                debug!(key = %record.key(), module, "Module disabled, skipping handler");
                return Ok(HandlerOutcome::Skipped(SkipReason::ModuleDisabled));
            }
        }
        if !record.is_enabled() {
            debug!(key = %record.key(), path = %record.entry().path, "Handler disabled, skipping");
            return Ok(HandlerOutcome::Skipped(SkipReason::HandlerDisabled));
        }

        if record.route().kind != self.config.middleware_kind {
            let payload = Value::Array(args.clone());
            let outcome = self
                .middleware
                .execute(self.loader.as_ref(), &payload, record, |plugin| self.options_for(plugin))
                .await;
            if let MiddlewareOutcome::Abort { by, .. } = outcome {
                debug!(key = %record.key(), middleware = %by, "Handler skipped by middleware");
                return Ok(HandlerOutcome::Skipped(SkipReason::Middleware { by }));
            }
        }

        if record.runs_once() && !record.try_fire_once() {
            debug!(key = %record.key(), "Run-once handler already fired");
            return Ok(HandlerOutcome::Skipped(SkipReason::AlreadyFired));
        }

        let call = HandlerCall {
            event: event.to_string(),
            args,
            plugin_options: self.options_for(record.plugin()),
        };
        let task = tokio::spawn(async move { handler.call(call).await });

        let joined = if lifecycle {
            let deadline = Duration::from_millis(self.config.lifecycle_timeout_ms);
            match tokio::time::timeout(deadline, task).await {
                Ok(joined) => joined,
                Err(_) => return Ok(HandlerOutcome::TimedOut),
            }
        } else {
            task.await
        };

        match joined {
            Ok(Ok(value)) => Ok(HandlerOutcome::Resolved(value)),
            Ok(Err(e)) => Err(e.to_string()),
            Err(join) => Err(join_message(join)),
        }
    }

    fn classify(&self, record: &HandlerRecord, event: &str) -> FailureClass {
        match record.plugin() {
            None => FailureClass::Host,
            Some(_) if self.config.fail_safe && event == self.config.start_event => FailureClass::PluginStartup,
            Some(_) => FailureClass::Plugin,
        }
    }

    /// Logs a settled outcome and reports failures.
    async fn settle(&self, record: &HandlerRecord, event: &str, outcome: &HandlerOutcome) {
        let (class, message) = match outcome {
            HandlerOutcome::Resolved(_) => {
                debug!(route = %record.route(), event, id = %record.id(), "Handler resolved");
                return;
            }
            HandlerOutcome::Skipped(_) => return,
            HandlerOutcome::TimedOut => {
                let message = format!(
                    "Lifecycle handler did not settle within {} ms",
                    self.config.lifecycle_timeout_ms
                );
                warn!(
                    route = %record.route(),
                    event,
                    path = %record.entry().path,
                    plugin = record.plugin().unwrap_or("-"),
                    "{message}"
                );
                (FailureClass::Timeout, message)
            }
            HandlerOutcome::Failed { class, message } => {
                if *class == FailureClass::PluginStartup {
                    warn!(
                        route = %record.route(),
                        event,
                        path = %record.entry().path,
                        plugin = record.plugin().unwrap_or("-"),
                        error = %message,
                        "Plugin failed to start, continuing in fail-safe mode"
                    );
                } else {
                    error!(
                        route = %record.route(),
                        event,
                        path = %record.entry().path,
                        plugin = record.plugin().unwrap_or("-"),
                        class = %class,
                        error = %message,
                        "Handler failed"
                    );
                }
                (*class, message.clone())
            }
        };

        if let Some(sink) = &self.diagnostics {
            sink.report(Diagnostic {
                key: record.key().to_string(),
                route: record.route().to_string(),
                plugin: record.plugin().map(str::to_string),
                path: record.entry().path.clone(),
                class,
                message,
            })
            .await;
        }
    }
}

fn join_message(err: JoinError) -> String {
    if err.is_panic() {
        panic_message(err.into_panic().as_ref())
    } else {
        "handler task cancelled".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use plexus_core::error::AppError;
    use plexus_manifest::{EntryExtra, ExportsSummary, ProcessedEntry};

    use super::*;
    use crate::module::{HandlerModule, StaticModuleLoader};
    use crate::state::MemoryDiagnosticSink;

    fn entry(key: &str, path: &str, metadata: Value, plugin: Option<&str>) -> ProcessedEntry {
        ProcessedEntry {
            key: key.to_string(),
            path: path.to_string(),
            exports: ExportsSummary::default(),
            metadata,
            plugin: plugin.map(str::to_string),
            module: None,
            extra: EntryExtra::default(),
        }
    }

    fn value(v: Value) -> HandlerModule {
        HandlerModule::from_fn(move |_| {
            let v = v.clone();
            async move { Ok(v) }
        })
    }

    fn pending() -> HandlerModule {
        HandlerModule::from_fn(|_| futures::future::pending::<plexus_core::result::AppResult<Value>>())
    }

    fn events() -> RouteId {
        RouteId::new("project", "events")
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let mut manifest = Manifest::new();
        manifest.insert("project", "events", entry("ready", "boom.ts", Value::Null, Some("p1")), true);
        manifest.insert("project", "events", entry("ready", "ok.ts", Value::Null, None), true);
        manifest.insert("project", "events", entry("ready", "empty.ts", Value::Null, None), true);

        let loader = Arc::new(StaticModuleLoader::new());
        loader.register(
            "boom.ts",
            HandlerModule::from_fn(|call: HandlerCall| async move {
                if call.args.is_empty() {
                    panic!("handler exploded");
                }
                Ok(Value::Null)
            }),
        );
        loader.register("ok.ts", value(serde_json::json!("fine")));
        loader.register("empty.ts", HandlerModule::new());

        let sink = Arc::new(MemoryDiagnosticSink::new());
        let engine = DispatchEngine::with_parts(
            Arc::new(manifest),
            loader,
            Arc::new(MemoryStateStore::new()),
            Some(sink.clone()),
            HashMap::new(),
            RuntimeConfig::default(),
        );

        let report = engine.dispatch(&events(), "ready", vec![]).await;
        assert_eq!(report.handlers.len(), 3);
        assert_eq!(report.values(), vec![&serde_json::json!("fine")]);
        assert_eq!(report.failures(), 2);
        assert!(matches!(
            &report.handlers[0].outcome,
            HandlerOutcome::Failed { class: FailureClass::Plugin, message } if message.contains("handler exploded")
        ));
        assert!(matches!(
            &report.handlers[2].outcome,
            HandlerOutcome::Failed { class: FailureClass::Host, message } if message.contains("no default export")
        ));

        let diagnostics = sink.diagnostics().await;
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].plugin.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn test_priority_order_and_unknown_event() {
        let mut manifest = Manifest::new();
        manifest.insert("project", "events", entry("ready", "late.ts", serde_json::json!({ "priority": 10 }), None), true);
        manifest.insert("project", "events", entry("ready", "a.ts", Value::Null, None), true);
        manifest.insert("project", "events", entry("ready", "early.ts", serde_json::json!({ "priority": -5 }), None), true);
        manifest.insert("project", "events", entry("ready", "b.ts", Value::Null, None), true);

        let loader = Arc::new(StaticModuleLoader::new());
        for name in ["late", "a", "early", "b"] {
            loader.register(&format!("{name}.ts"), value(serde_json::json!(name)));
        }
        let engine = DispatchEngine::new(Arc::new(manifest), loader, RuntimeConfig::default());

        let report = engine.dispatch(&events(), "ready", vec![]).await;
        let order: Vec<&Value> = report.values();
        assert_eq!(
            order,
            vec![
                &serde_json::json!("early"),
                &serde_json::json!("a"),
                &serde_json::json!("b"),
                &serde_json::json!("late")
            ]
        );
        assert!(engine.dispatch(&events(), "missing", vec![]).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_timeout_only_bounds_lifecycle_events() {
        let mut manifest = Manifest::new();
        manifest.insert("project", "events", entry("_start", "stuck.ts", Value::Null, Some("p1")), false);
        manifest.insert("project", "events", entry("ready", "stuck.ts", Value::Null, None), false);

        let loader = Arc::new(StaticModuleLoader::new());
        loader.register("stuck.ts", pending());
        let sink = Arc::new(MemoryDiagnosticSink::new());
        let engine = DispatchEngine::with_parts(
            Arc::new(manifest),
            loader,
            Arc::new(MemoryStateStore::new()),
            Some(sink.clone()),
            HashMap::new(),
            RuntimeConfig::default(),
        );

        let started = tokio::time::Instant::now();
        let report = engine.dispatch(&events(), "_start", vec![]).await;
        assert_eq!(report.handlers[0].outcome, HandlerOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(5000));
        assert_eq!(sink.diagnostics().await[0].class, FailureClass::Timeout);

        let bounded = tokio::time::timeout(
            Duration::from_secs(60),
            engine.dispatch(&events(), "ready", vec![]),
        )
        .await;
        assert!(bounded.is_err(), "non-lifecycle dispatch must not time out");
    }

    #[tokio::test]
    async fn test_fail_safe_startup_classification() {
        let mut manifest = Manifest::new();
        manifest.insert("project", "events", entry("_start", "fail.ts", Value::Null, Some("p1")), false);
        let loader = Arc::new(StaticModuleLoader::new());
        loader.register(
            "fail.ts",
            HandlerModule::from_fn(|_| async { Err(AppError::plugin("missing token")) }),
        );
        let config = RuntimeConfig {
            fail_safe: true,
            ..RuntimeConfig::default()
        };
        let engine = DispatchEngine::new(Arc::new(manifest), loader, config);

        let report = engine.dispatch(&events(), "_start", vec![]).await;
        assert!(matches!(
            &report.handlers[0].outcome,
            HandlerOutcome::Failed { class: FailureClass::PluginStartup, .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_once_fires_exactly_once() {
        let mut manifest = Manifest::new();
        manifest.insert(
            "project",
            "events",
            entry("ready", "once.ts", serde_json::json!({ "frequency": "once" }), None),
            false,
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = Arc::new(StaticModuleLoader::new());
        let counter = calls.clone();
        loader.register(
            "once.ts",
            HandlerModule::from_fn(move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                }
            }),
        );
        let engine = DispatchEngine::new(Arc::new(manifest), loader, RuntimeConfig::default());

        let dispatches: Vec<_> = (0..16)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.dispatch(&events(), "ready", vec![]).await })
            })
            .collect();
        let mut resolved = 0;
        for dispatch in dispatches {
            let report = dispatch.await.expect("join");
            resolved += report.values().len();
        }

        let again = engine.dispatch(&events(), "ready", vec![]).await;
        assert_eq!(again.handlers[0].outcome, HandlerOutcome::Skipped(SkipReason::HandlerDisabled));
        assert_eq!(resolved, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!engine.resolve(&events(), "ready")[0].is_enabled());
    }

    #[tokio::test]
    async fn test_middleware_and_module_state_skip_handlers() {
        let mut manifest = Manifest::new();
        let mut guarded = entry("ping", "ping.ts", Value::Null, None);
        guarded.module = Some("fun".to_string());
        manifest.insert("project", "commands", guarded, false);
        manifest.insert("project", "commands", entry("ban", "ban.ts", Value::Null, None), false);
        manifest.insert("project", "middleware", entry("guard", "guard.ts", Value::Null, None), false);

        let loader = Arc::new(StaticModuleLoader::new());
        loader.register("ping.ts", value(serde_json::json!("pong")));
        loader.register("ban.ts", value(serde_json::json!("banned")));
        loader.register(
            "guard.ts",
            HandlerModule::from_fn(|call: HandlerCall| async move {
                let key = call.args[0]["record"]["key"].as_str().unwrap_or_default().to_string();
                Ok(serde_json::json!({ "abort": key == "ban" }))
            }),
        );
        let state = Arc::new(MemoryStateStore::new());
        let engine = DispatchEngine::with_parts(
            Arc::new(manifest),
            loader,
            state.clone(),
            None,
            HashMap::new(),
            RuntimeConfig::default(),
        );
        let commands = RouteId::new("project", "commands");

        assert_eq!(engine.middleware().len(), 1);
        let ban = engine.dispatch(&commands, "ban", vec![]).await;
        assert_eq!(
            ban.handlers[0].outcome,
            HandlerOutcome::Skipped(SkipReason::Middleware { by: "guard".to_string() })
        );
        let ping = engine.dispatch(&commands, "ping", vec![]).await;
        assert_eq!(ping.values(), vec![&serde_json::json!("pong")]);

        state.set_module_enabled("fun", false).await;
        let ping = engine.dispatch(&commands, "ping", vec![]).await;
        assert_eq!(ping.handlers[0].outcome, HandlerOutcome::Skipped(SkipReason::ModuleDisabled));
    }

    #[tokio::test]
    async fn test_plugin_options_are_passed() {
        let mut manifest = Manifest::new();
        manifest.insert("p1", "commands", entry("ping", "ping.js", Value::Null, Some("p1")), false);
        let loader = Arc::new(StaticModuleLoader::new());
        loader.register(
            "ping.js",
            HandlerModule::from_fn(|call: HandlerCall| async move { Ok(call.plugin_options.unwrap_or(Value::Null)) }),
        );
        let options = HashMap::from([("p1".to_string(), serde_json::json!({ "prefix": "!" }))]);
        let engine = DispatchEngine::with_parts(
            Arc::new(manifest),
            loader,
            Arc::new(MemoryStateStore::new()),
            None,
            options,
            RuntimeConfig::default(),
        );

        let report = engine.dispatch(&RouteId::new("p1", "commands"), "ping", vec![]).await;
        assert_eq!(report.values(), vec![&serde_json::json!({ "prefix": "!" })]);
    }
}
