//! Build-time problems and the aggregated validation report.
//!
//! Discovery and validation never stop at the first problem. Every issue is
//! pushed into a [`ValidationReport`] so a single build lists all of them.

use plexus_core::error::AppError;
use thiserror::Error;

/// A single problem found while assembling the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildIssue {
    // --- Route definition errors ---
    /// Two route definitions scan the same directory.
    #[error("Directory '{directory}' is claimed by both {first} and {second}")]
    DirectoryCollision {
        /// The normalized directory both routes claim.
        directory: String,
        /// `namespace:kind` of the route that claimed it first.
        first: String,
        /// `namespace:kind` of the conflicting route.
        second: String,
    },

    /// The same (namespace, kind) pair was defined twice.
    #[error("Route {namespace}:{kind} is defined more than once")]
    DuplicateRoute {
        /// Owning namespace.
        namespace: String,
        /// Handler kind.
        kind: String,
    },

    // --- Entry errors ---
    /// A non-multiple route produced the same key twice, from one source or
    /// from two plugins.
    #[error("Duplicate key '{key}' in {namespace}:{kind} ({first} and {second})")]
    DuplicateKey {
        /// Owning namespace.
        namespace: String,
        /// Handler kind.
        kind: String,
        /// The colliding key.
        key: String,
        /// File that produced the key first.
        first: String,
        /// File that produced it again.
        second: String,
    },

    /// A required export is absent.
    #[error("{path}: missing required '{export}' export for {namespace}:{kind}")]
    MissingExport {
        /// Owning namespace.
        namespace: String,
        /// Handler kind.
        kind: String,
        /// Export name (`default` or `config`).
        export: String,
        /// Offending file.
        path: String,
    },

    /// A forbidden export is present.
    #[error("{path}: '{export}' export is not allowed for {namespace}:{kind}")]
    ForbiddenExport {
        /// Owning namespace.
        namespace: String,
        /// Handler kind.
        kind: String,
        /// Export name (`default` or `config`).
        export: String,
        /// Offending file.
        path: String,
    },
}

impl BuildIssue {
    /// Returns whether this issue blocks the build regardless of strictness.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DirectoryCollision { .. } | Self::DuplicateRoute { .. }
        )
    }
}

/// Every problem collected during one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Collected issues, in discovery order.
    pub issues: Vec<BuildIssue>,
}

impl ValidationReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an issue.
    pub fn push(&mut self, issue: BuildIssue) {
        self.issues.push(issue);
    }

    /// Returns whether no issue was recorded.
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Number of recorded issues.
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Returns whether any recorded issue is fatal on its own.
    pub fn has_fatal(&self) -> bool {
        self.issues.iter().any(BuildIssue::is_fatal)
    }

    /// Collapses the report into one consolidated error.
    ///
    /// Route collisions make it a conflict; anything else is a validation
    /// failure.
    pub fn to_error(&self) -> AppError {
        let lines: Vec<String> = self.issues.iter().map(|i| format!("  - {i}")).collect();
        let message = format!(
            "Build failed with {} problem(s):\n{}",
            self.issues.len(),
            lines.join("\n")
        );
        if self.has_fatal() {
            AppError::conflict(message)
        } else {
            AppError::validation(message)
        }
    }
}
