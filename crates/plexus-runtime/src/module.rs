//! Handler modules and the loader seam that produces them.
//!
//! Compilation of handler sources is external: a [`ModuleLoader`] maps a
//! manifest entry to an already-loadable [`HandlerModule`]. Hosts that
//! compile handlers into the binary register them with
//! [`StaticModuleLoader`].

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use plexus_core::error::AppError;
use plexus_core::result::AppResult;
use plexus_manifest::ProcessedEntry;

/// Arguments passed to one handler invocation.
#[derive(Debug, Clone, Default)]
pub struct HandlerCall {
    /// Event or key being dispatched.
    pub event: String,
    /// Dispatch arguments.
    pub args: Vec<Value>,
    /// Options configured for the owning plugin.
    pub plugin_options: Option<Value>,
}

/// The default export of a handler module.
#[async_trait]
pub trait Handler: Send + Sync + std::fmt::Debug {
    /// Runs the handler.
    async fn call(&self, call: HandlerCall) -> AppResult<Value>;
}

type HandlerFuture = Pin<Box<dyn Future<Output = AppResult<Value>> + Send>>;
type BoxedHandlerFn = Arc<dyn Fn(HandlerCall) -> HandlerFuture + Send + Sync>;

/// A closure-based handler.
#[derive(Clone)]
pub struct FnHandler {
    handler: BoxedHandlerFn,
}

impl std::fmt::Debug for FnHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").field("handler", &"<closure>").finish()
    }
}

impl FnHandler {
    /// Wraps an async closure.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(HandlerCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<Value>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |call: HandlerCall| -> HandlerFuture { Box::pin(handler(call)) }),
        }
    }
}

#[async_trait]
impl Handler for FnHandler {
    async fn call(&self, call: HandlerCall) -> AppResult<Value> {
        (self.handler)(call).await
    }
}

/// A loaded handler module.
#[derive(Debug, Clone, Default)]
pub struct HandlerModule {
    /// Default export.
    pub default: Option<Arc<dyn Handler>>,
    /// `config` export.
    pub config: Option<Value>,
    /// Other named exports.
    pub named: BTreeMap<String, Value>,
}

impl HandlerModule {
    /// Creates a module without exports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a module whose default export is an async closure.
    pub fn from_fn<F, Fut>(handler: F) -> Self
    where
        F: Fn(HandlerCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<Value>> + Send + 'static,
    {
        Self::new().with_default(Arc::new(FnHandler::new(handler)))
    }

    /// Sets the default export.
    pub fn with_default(mut self, handler: Arc<dyn Handler>) -> Self {
        self.default = Some(handler);
        self
    }

    /// Sets the `config` export.
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Adds a named export.
    pub fn with_named(mut self, name: &str, value: Value) -> Self {
        self.named.insert(name.to_string(), value);
        self
    }
}

/// Turns manifest entries into loaded modules.
#[async_trait]
pub trait ModuleLoader: Send + Sync + std::fmt::Debug {
    /// Loads the module behind an entry.
    async fn load(&self, entry: &ProcessedEntry) -> AppResult<Arc<HandlerModule>>;
}

/// Loader over modules registered in code, keyed by path.
///
/// A registered path matches an entry whose path equals it or ends with
/// `/<registered>`; the longest match wins.
#[derive(Debug, Default)]
pub struct StaticModuleLoader {
    modules: DashMap<String, Arc<HandlerModule>>,
    loads: AtomicUsize,
}

impl StaticModuleLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module under a path.
    pub fn register(&self, path: &str, module: HandlerModule) {
        self.modules.insert(path.replace('\\', "/"), Arc::new(module));
    }

    /// Number of successful loads served.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn find(&self, path: &str) -> Option<Arc<HandlerModule>> {
        if let Some(module) = self.modules.get(path) {
            return Some(module.clone());
        }
        self.modules
            .iter()
            .filter(|item| {
                path.strip_suffix(item.key().as_str())
                    .is_some_and(|prefix| prefix.ends_with('/'))
            })
            .max_by_key(|item| item.key().len())
            .map(|item| item.value().clone())
    }
}

#[async_trait]
impl ModuleLoader for StaticModuleLoader {
    async fn load(&self, entry: &ProcessedEntry) -> AppResult<Arc<HandlerModule>> {
        let module = self
            .find(&entry.path)
            .ok_or_else(|| AppError::not_found(format!("No module registered for '{}'", entry.path)))?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        debug!(path = %entry.path, "Module loaded");
        Ok(module)
    }
}
