//! Namespace controllers: per-(namespace, kind) read/execute facades.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use plexus_core::error::AppError;
use plexus_core::result::AppResult;

use crate::dispatcher::{DispatchEngine, DispatchReport};
use crate::module::Handler;
use crate::record::{HandlerRecord, RouteId};

/// Builds a custom controller on top of the base one.
///
/// The returned value is retrieved with a downcast through
/// [`Runtime::custom_controller`](crate::runtime::Runtime::custom_controller).
pub trait ControllerFactory: Send + Sync {
    /// Wraps the base controller.
    fn create(&self, base: NamespaceController) -> Arc<dyn Any + Send + Sync>;
}

impl<F> ControllerFactory for F
where
    F: Fn(NamespaceController) -> Arc<dyn Any + Send + Sync> + Send + Sync,
{
    fn create(&self, base: NamespaceController) -> Arc<dyn Any + Send + Sync> {
        self(base)
    }
}

/// Facade over the handlers of one route.
#[derive(Debug, Clone)]
pub struct NamespaceController {
    engine: DispatchEngine,
    route: RouteId,
}

impl NamespaceController {
    /// Creates a controller for a route.
    pub fn new(engine: DispatchEngine, route: RouteId) -> Self {
        Self { engine, route }
    }

    /// The controlled route.
    pub fn route(&self) -> &RouteId {
        &self.route
    }

    /// Manifest keys of the route, sorted. Nothing is imported.
    pub fn list(&self) -> Vec<String> {
        self.engine.manifest().keys(&self.route.namespace, &self.route.kind)
    }

    /// Records of a key, created on first use.
    pub fn records(&self, key: &str) -> Vec<Arc<HandlerRecord>> {
        self.engine.resolve(&self.route, key)
    }

    /// Imports a key's first handler and returns its default export.
    pub async fn get(&self, key: &str) -> Option<Arc<dyn Handler>> {
        let record = self.records(key).into_iter().next()?;
        match record.default_export(self.engine.loader()).await {
            Ok(handler) => Some(handler),
            Err(e) => {
                debug!(route = %self.route, key, error = %e, "Handler unavailable");
                None
            }
        }
    }

    /// Runs the handlers of a key; resolves once all of them settled.
    pub async fn execute(&self, key: &str, args: Vec<Value>) -> DispatchReport {
        self.engine.dispatch(&self.route, key, args).await
    }

    /// Emits an event to its handlers; resolves once all of them settled.
    pub async fn emit(&self, event: &str, args: Vec<Value>) -> DispatchReport {
        self.engine.dispatch(&self.route, event, args).await
    }

    /// Enabled middleware in execution order.
    ///
    /// Only available on controllers of the middleware kind.
    pub fn chain(&self) -> AppResult<Vec<Arc<HandlerRecord>>> {
        let middleware_kind = &self.engine.config().middleware_kind;
        if &self.route.kind != middleware_kind {
            return Err(AppError::validation(format!(
                "chain() is only available for '{middleware_kind}' controllers, not '{}'",
                self.route
            )));
        }
        Ok(self.engine.middleware().records())
    }

    /// Enables every handler of a key; returns how many were touched.
    pub fn enable(&self, key: &str) -> AppResult<usize> {
        self.set_enabled(key, true)
    }

    /// Disables every handler of a key; returns how many were touched.
    pub fn disable(&self, key: &str) -> AppResult<usize> {
        self.set_enabled(key, false)
    }

    fn set_enabled(&self, key: &str, enabled: bool) -> AppResult<usize> {
        let records = self.records(key);
        if records.is_empty() {
            return Err(AppError::not_found(format!("No handler '{key}' in {}", self.route)));
        }
        for record in &records {
            record.set_enabled(enabled);
        }
        info!(route = %self.route, key, enabled, handlers = records.len(), "Handler state changed");
        Ok(records.len())
    }
}
