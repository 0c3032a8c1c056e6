//! # plexus-manifest
//!
//! Build-time half of Plexus. Provides:
//!
//! - Source resolution for the host project and installed plugins
//! - Declarative route definitions (one per handler kind)
//! - Directory scanning with key derivation, nesting rules, and dynamic params
//! - Entry processing with per-file failure isolation
//! - Manifest assembly with project overrides and aggregated validation
//! - Lifecycle and build hook discovery with category-specific ordering

pub mod assembler;
pub mod build;
pub mod entry;
pub mod error;
pub mod hooks;
pub mod inspect;
pub mod manifest;
pub mod processor;
pub mod route;
pub mod scanner;
pub mod source;

pub use assembler::{Assembler, BuildOutput};
pub use build::{BuildSummary, run_build, run_build_with};
pub use entry::{EntryExtra, ExportsSummary, ProcessedEntry, ScannedEntry};
pub use error::{BuildIssue, ValidationReport};
pub use hooks::{HookCategory, HookEntry, HooksManifest, discover_hooks};
pub use inspect::{ModuleExports, ModuleInspector, SourceInspector};
pub use manifest::{Manifest, ManifestDiff, RouteKey, RouteSlot};
pub use route::{EntryProcessor, RouteConfig, RouteDefinition};
pub use source::{Source, SourceSet};
