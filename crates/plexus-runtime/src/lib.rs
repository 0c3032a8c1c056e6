//! # plexus-runtime
//!
//! Runtime half of Plexus. Loads a manifest produced by `plexus-manifest`
//! and executes its handlers:
//!
//! - Lazily created handler records with single-flight module loading
//! - Concurrent, priority-ordered dispatch with per-handler isolation
//! - Run-once handlers, enable flags, and module-level enable state
//! - A global middleware chain that fails closed
//! - Per-route namespace controllers and custom controller factories

pub mod controller;
pub mod dispatcher;
pub mod middleware;
pub mod module;
pub mod record;
pub mod runtime;
pub mod state;

pub use controller::{ControllerFactory, NamespaceController};
pub use dispatcher::{DispatchEngine, DispatchReport, HandlerOutcome, HandlerReport, SkipReason};
pub use middleware::{MiddlewareChain, MiddlewareOutcome};
pub use module::{FnHandler, Handler, HandlerCall, HandlerModule, ModuleLoader, StaticModuleLoader};
pub use record::{HandlerId, HandlerRecord, RecordTable, RouteId};
pub use runtime::{Runtime, RuntimeBuilder};
pub use state::{
    Diagnostic, DiagnosticSink, FailureClass, MemoryDiagnosticSink, MemoryStateStore, StateStore,
};
