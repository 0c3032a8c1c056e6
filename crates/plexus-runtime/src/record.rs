//! Handler records: runtime wrappers around manifest entries.
//!
//! Records are created the first time their route key is resolved and
//! live for the rest of the process. Each record owns a single-flight
//! module cell and an atomic `enabled` flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;

use plexus_core::error::AppError;
use plexus_core::result::AppResult;
use plexus_manifest::{Manifest, ProcessedEntry};

use crate::module::{Handler, HandlerModule, ModuleLoader};

/// A `(namespace, kind)` pair addressing one manifest route.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouteId {
    /// Owning namespace.
    pub namespace: String,
    /// Handler kind.
    pub kind: String,
}

impl RouteId {
    /// Creates a route id.
    pub fn new(namespace: &str, kind: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            kind: kind.to_string(),
        }
    }
}

impl std::fmt::Display for RouteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.kind)
    }
}

/// Stable integer id of a handler record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HandlerId(pub usize);

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Runtime state of one handler.
#[derive(Debug)]
pub struct HandlerRecord {
    id: HandlerId,
    route: RouteId,
    entry: ProcessedEntry,
    module: OnceCell<Arc<HandlerModule>>,
    enabled: AtomicBool,
    priority: i64,
    once: bool,
}

impl HandlerRecord {
    /// Wraps a manifest entry.
    pub fn new(id: HandlerId, route: RouteId, entry: ProcessedEntry) -> Self {
        Self {
            id,
            route,
            priority: entry.priority(),
            once: entry.runs_once(),
            entry,
            module: OnceCell::new(),
            enabled: AtomicBool::new(true),
        }
    }

    /// Record id.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Owning route.
    pub fn route(&self) -> &RouteId {
        &self.route
    }

    /// Handler key.
    pub fn key(&self) -> &str {
        &self.entry.key
    }

    /// Underlying manifest entry.
    pub fn entry(&self) -> &ProcessedEntry {
        &self.entry
    }

    /// Owning plugin, `None` for the host project.
    pub fn plugin(&self) -> Option<&str> {
        self.entry.plugin.as_deref()
    }

    /// Owning feature module, if any.
    pub fn module_name(&self) -> Option<&str> {
        self.entry.module.as_deref()
    }

    /// Ordering priority; lower runs first.
    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// Returns whether the handler fires at most once.
    pub fn runs_once(&self) -> bool {
        self.once
    }

    /// Returns the `enabled` flag.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Sets the `enabled` flag.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Claims the single firing of a run-once handler.
    ///
    /// Returns `true` for exactly one caller; the flag is false afterwards.
    pub fn try_fire_once(&self) -> bool {
        self.enabled
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns whether the module has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.module.initialized()
    }

    /// Loads the module once; concurrent callers share the same load.
    ///
    /// A failed load is not cached and is retried by the next caller.
    pub async fn module(&self, loader: &dyn ModuleLoader) -> AppResult<Arc<HandlerModule>> {
        self.module
            .get_or_try_init(|| loader.load(&self.entry))
            .await
            .cloned()
    }

    /// Loads the module and returns its default export.
    pub async fn default_export(&self, loader: &dyn ModuleLoader) -> AppResult<Arc<dyn Handler>> {
        let module = self.module(loader).await?;
        module.default.clone().ok_or_else(|| {
            AppError::handler(format!(
                "Handler '{}' in {} has no default export",
                self.entry.key, self.entry.path
            ))
        })
    }

    /// JSON description passed to middleware.
    pub fn summary(&self) -> Value {
        serde_json::json!({
            "id": self.id.0,
            "route": self.route.to_string(),
            "key": self.entry.key,
            "path": self.entry.path,
            "plugin": self.entry.plugin,
            "module": self.entry.module,
            "metadata": self.entry.metadata,
        })
    }
}

/// Every record created so far, indexed by id and by route key.
#[derive(Debug, Default)]
pub struct RecordTable {
    records: DashMap<HandlerId, Arc<HandlerRecord>>,
    keys: DashMap<(RouteId, String), Vec<HandlerId>>,
    next_id: AtomicUsize,
}

impl RecordTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the records of a route key in manifest order.
    ///
    /// Records are created on first resolution; an unknown key yields none.
    pub fn resolve(&self, manifest: &Manifest, route: &RouteId, key: &str) -> Vec<Arc<HandlerRecord>> {
        let Some(slot) = manifest.get(&route.namespace, &route.kind, key) else {
            return Vec::new();
        };

        let ids = self
            .keys
            .entry((route.clone(), key.to_string()))
            .or_insert_with(|| {
                slot.entries()
                    .iter()
                    .map(|entry| {
                        let id = HandlerId(self.next_id.fetch_add(1, Ordering::SeqCst));
                        self.records
                            .insert(id, Arc::new(HandlerRecord::new(id, route.clone(), entry.clone())));
                        id
                    })
                    .collect()
            })
            .value()
            .clone();

        ids.iter()
            .filter_map(|id| self.records.get(id).map(|r| r.value().clone()))
            .collect()
    }

    /// Looks up a record by id.
    pub fn get(&self, id: HandlerId) -> Option<Arc<HandlerRecord>> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    /// Number of records created so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether no record was created yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
