//! Middleware chain: ordered interceptors that may abort a handler.
//!
//! The chain is flattened across every route of the middleware kind and
//! stable-sorted by priority. Each middleware receives
//! `{ "payload": <dispatch args>, "record": <target summary> }`:
//! - `null`, a non-object, or `{ "abort": false }` continues;
//! - `{ "abort": true }` stops the chain and skips the target;
//! - an error, a panic, or a missing default export also aborts.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use plexus_manifest::processor::panic_message;

use crate::module::{HandlerCall, ModuleLoader};
use crate::record::HandlerRecord;

/// Result of running the chain for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiddlewareOutcome {
    /// Every middleware let the target through.
    Continue,
    /// A middleware stopped the target.
    Abort {
        /// Key of the aborting middleware.
        by: String,
        /// Failure message when the middleware errored.
        error: Option<String>,
    },
}

/// Priority-ordered middleware records.
#[derive(Debug, Clone, Default)]
pub struct MiddlewareChain {
    records: Vec<Arc<HandlerRecord>>,
}

impl MiddlewareChain {
    /// Builds a chain, stable-sorting by priority.
    pub fn new(mut records: Vec<Arc<HandlerRecord>>) -> Self {
        records.sort_by_key(|r| r.priority());
        Self { records }
    }

    /// Enabled middleware in execution order.
    pub fn records(&self) -> Vec<Arc<HandlerRecord>> {
        self.records.iter().filter(|r| r.is_enabled()).cloned().collect()
    }

    /// Number of middleware, enabled or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether the chain has no middleware.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Runs every enabled middleware against a target handler.
    pub async fn execute(
        &self,
        loader: &dyn ModuleLoader,
        payload: &Value,
        target: &HandlerRecord,
        plugin_options: impl Fn(Option<&str>) -> Option<Value>,
    ) -> MiddlewareOutcome {
        for middleware in self.records.iter().filter(|r| r.is_enabled()) {
            let call = HandlerCall {
                event: target.key().to_string(),
                args: vec![serde_json::json!({
                    "payload": payload,
                    "record": target.summary(),
                })],
                plugin_options: plugin_options(middleware.plugin()),
            };

            let result = match middleware.default_export(loader).await {
                Ok(handler) => match AssertUnwindSafe(handler.call(call)).catch_unwind().await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(panic) => Err(panic_message(panic.as_ref())),
                },
                Err(e) => Err(e.to_string()),
            };

            match result {
                Ok(value) if is_abort(&value) => {
                    debug!(middleware = %middleware.key(), target = %target.key(), "Middleware aborted handler");
                    return MiddlewareOutcome::Abort {
                        by: middleware.key().to_string(),
                        error: None,
                    };
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(
                        middleware = %middleware.key(),
                        target = %target.key(),
                        error = %error,
                        "Middleware failed, aborting handler"
                    );
                    return MiddlewareOutcome::Abort {
                        by: middleware.key().to_string(),
                        error: Some(error),
                    };
                }
            }
        }
        MiddlewareOutcome::Continue
    }
}

fn is_abort(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|o| o.get("abort"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
