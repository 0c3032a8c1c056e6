//! Hook categories, entries, and the hooks manifest.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use plexus_core::result::AppResult;

use crate::manifest::write_artifact;

/// Every hook category a plugin or the project may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookCategory {
    // ── Lifecycle ──
    /// Process initialization.
    Init,
    /// Host start.
    Start,
    /// Post-start setup.
    Setup,
    /// Host shutdown.
    Stop,

    // ── Build ──
    /// Before the build begins.
    BuildStart,
    /// While build output is transformed.
    BuildTransform,
    /// After the build finished.
    BuildComplete,
}

/// Order in which sources contribute to a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOrdering {
    /// Plugins in registration order, project last.
    PluginsFirst,
    /// Project first, plugins in reverse registration order.
    ProjectFirstReversed,
    /// Project first, plugins in registration order.
    ProjectFirst,
}

impl HookCategory {
    /// All categories in discovery order.
    pub const ALL: [HookCategory; 7] = [
        Self::Init,
        Self::Start,
        Self::Setup,
        Self::Stop,
        Self::BuildStart,
        Self::BuildTransform,
        Self::BuildComplete,
    ];

    /// Returns the normalized name, which is also the hook file stem.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Start => "start",
            Self::Setup => "setup",
            Self::Stop => "stop",
            Self::BuildStart => "build-start",
            Self::BuildTransform => "build-transform",
            Self::BuildComplete => "build-complete",
        }
    }

    /// Returns how sources are ordered for this category.
    pub fn ordering(&self) -> HookOrdering {
        match self {
            Self::Init | Self::Start | Self::Setup => HookOrdering::PluginsFirst,
            Self::Stop => HookOrdering::ProjectFirstReversed,
            Self::BuildStart | Self::BuildTransform | Self::BuildComplete => HookOrdering::ProjectFirst,
        }
    }

    /// Returns the build phase, for build categories.
    pub fn build_phase(&self) -> Option<BuildPhase> {
        match self {
            Self::BuildStart => Some(BuildPhase::Start),
            Self::BuildTransform => Some(BuildPhase::Transform),
            Self::BuildComplete => Some(BuildPhase::Complete),
            _ => None,
        }
    }
}

impl std::fmt::Display for HookCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Phase of a build hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildPhase {
    /// Build start.
    Start,
    /// Output transform.
    Transform,
    /// Build completion.
    Complete,
}

/// Who provides a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookSource {
    /// An installed plugin.
    Plugin,
    /// The host project.
    Project,
}

/// One discovered hook module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookEntry {
    /// `namespace:category`.
    pub id: String,
    /// Provider kind.
    pub source: HookSource,
    /// Owning plugin; `None` for the project.
    pub plugin: Option<String>,
    /// Resolved module path.
    pub path: String,
    /// Invocation order within the category, from 0.
    pub priority: usize,
    /// Build phase, for build categories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<BuildPhase>,
}

/// Build artifact listing hooks per category in invocation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HooksManifest {
    categories: BTreeMap<HookCategory, Vec<HookEntry>>,
}

impl HooksManifest {
    /// Creates an empty hooks manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entries of a category.
    pub fn set(&mut self, category: HookCategory, entries: Vec<HookEntry>) {
        self.categories.insert(category, entries);
    }

    /// Entries of a category in invocation order.
    pub fn get(&self, category: HookCategory) -> &[HookEntry] {
        self.categories.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of hooks.
    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    /// Returns whether no hook was found.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the hooks manifest as pretty JSON.
    pub async fn write_to(&self, path: &Path) -> AppResult<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        write_artifact(path, &json).await
    }

    /// Reads a hooks manifest written by [`HooksManifest::write_to`].
    pub async fn read_from(path: &Path) -> AppResult<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_names_match_serde() {
        for category in HookCategory::ALL {
            let json = serde_json::to_value(category).expect("serialize");
            assert_eq!(json, serde_json::json!(category.as_str()));
        }
    }

    #[test]
    fn test_ordering_and_phase() {
        assert_eq!(HookCategory::Setup.ordering(), HookOrdering::PluginsFirst);
        assert_eq!(HookCategory::Stop.ordering(), HookOrdering::ProjectFirstReversed);
        assert_eq!(HookCategory::BuildTransform.ordering(), HookOrdering::ProjectFirst);
        assert_eq!(HookCategory::BuildComplete.build_phase(), Some(BuildPhase::Complete));
        assert_eq!(HookCategory::Init.build_phase(), None);
    }

    #[tokio::test]
    async fn test_round_trip_through_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("out/hooks.json");

        let mut manifest = HooksManifest::new();
        manifest.set(
            HookCategory::BuildStart,
            vec![HookEntry {
                id: "project:build-start".to_string(),
                source: HookSource::Project,
                plugin: None,
                path: "src/hooks/build-start.js".to_string(),
                priority: 0,
                phase: Some(BuildPhase::Start),
            }],
        );
        manifest.write_to(&path).await.expect("write");

        let raw = std::fs::read_to_string(&path).expect("read");
        assert!(raw.contains("\"build-start\""));
        let parsed = HooksManifest::read_from(&path).await.expect("parse");
        assert_eq!(parsed, manifest);
        assert!(parsed.get(HookCategory::Stop).is_empty());
    }
}
