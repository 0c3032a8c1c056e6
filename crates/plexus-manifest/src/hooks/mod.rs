//! Hook discovery: lifecycle and build hooks with category-specific ordering.

pub mod definitions;
pub mod discovery;

pub use definitions::{BuildPhase, HookCategory, HookEntry, HookOrdering, HookSource, HooksManifest};
pub use discovery::discover_hooks;
