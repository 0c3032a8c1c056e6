//! The handler manifest: namespace → kind → key → processed entry (or list).
//!
//! All levels are sorted maps so serializing an unchanged manifest yields
//! identical bytes on every build.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use plexus_core::result::AppResult;

use crate::entry::ProcessedEntry;

/// Entries stored under one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouteSlot {
    /// All entries of a `multiple` route, in discovery order.
    Many(Vec<ProcessedEntry>),
    /// The single entry of a non-multiple route.
    One(ProcessedEntry),
}

impl RouteSlot {
    /// Entries in discovery order.
    pub fn entries(&self) -> &[ProcessedEntry] {
        match self {
            Self::Many(entries) => entries,
            Self::One(entry) => std::slice::from_ref(entry),
        }
    }
}

/// Address of one manifest key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouteKey {
    /// Owning namespace.
    pub namespace: String,
    /// Handler kind.
    pub kind: String,
    /// Route key.
    pub key: String,
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.kind, self.key)
    }
}

/// Keys added, removed, or changed between two builds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    /// Keys present only in the new manifest.
    pub added: Vec<RouteKey>,
    /// Keys present only in the previous manifest.
    pub removed: Vec<RouteKey>,
    /// Keys whose entries differ.
    pub changed: Vec<RouteKey>,
}

impl ManifestDiff {
    /// Returns whether both manifests describe the same handlers.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Build artifact describing every discovered handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    namespaces: BTreeMap<String, BTreeMap<String, BTreeMap<String, RouteSlot>>>,
}

impl Manifest {
    /// Creates an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an empty kind so it is listed even without entries.
    pub fn ensure_kind(&mut self, namespace: &str, kind: &str) {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .entry(kind.to_string())
            .or_default();
    }

    /// Inserts an entry.
    ///
    /// For non-multiple routes an existing entry is replaced and returned;
    /// for multiple routes the entry is appended.
    pub fn insert(
        &mut self,
        namespace: &str,
        kind: &str,
        entry: ProcessedEntry,
        multiple: bool,
    ) -> Option<ProcessedEntry> {
        let keys = self
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .entry(kind.to_string())
            .or_default();

        if !multiple {
            return match keys.insert(entry.key.clone(), RouteSlot::One(entry)) {
                Some(RouteSlot::One(previous)) => Some(previous),
                Some(RouteSlot::Many(mut previous)) => previous.pop(),
                None => None,
            };
        }

        match keys.get_mut(&entry.key) {
            Some(RouteSlot::Many(entries)) => entries.push(entry),
            Some(slot @ RouteSlot::One(_)) => {
                let mut entries = slot.entries().to_vec();
                entries.push(entry);
                *slot = RouteSlot::Many(entries);
            }
            None => {
                keys.insert(entry.key.clone(), RouteSlot::Many(vec![entry]));
            }
        }
        None
    }

    /// Looks up one key.
    pub fn get(&self, namespace: &str, kind: &str, key: &str) -> Option<&RouteSlot> {
        self.namespaces.get(namespace)?.get(kind)?.get(key)
    }

    /// Keys of one kind, sorted.
    pub fn keys(&self, namespace: &str, kind: &str) -> Vec<String> {
        self.namespaces
            .get(namespace)
            .and_then(|kinds| kinds.get(kind))
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Namespaces present in the manifest.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    /// Iterates every slot as `(address, slot)`.
    pub fn iter(&self) -> impl Iterator<Item = (RouteKey, &RouteSlot)> {
        self.namespaces.iter().flat_map(|(namespace, kinds)| {
            kinds.iter().flat_map(move |(kind, keys)| {
                keys.iter().map(move |(key, slot)| {
                    (
                        RouteKey {
                            namespace: namespace.clone(),
                            kind: kind.clone(),
                            key: key.clone(),
                        },
                        slot,
                    )
                })
            })
        })
    }

    /// Total number of entries.
    pub fn entry_count(&self) -> usize {
        self.iter().map(|(_, slot)| slot.entries().len()).sum()
    }

    /// Compares against a previous build.
    pub fn diff(&self, previous: &Manifest) -> ManifestDiff {
        let mut diff = ManifestDiff::default();
        let old: BTreeMap<RouteKey, &RouteSlot> = previous.iter().collect();
        let new: BTreeMap<RouteKey, &RouteSlot> = self.iter().collect();

        for (address, slot) in &new {
            match old.get(address) {
                None => diff.added.push(address.clone()),
                Some(before) if before != slot => diff.changed.push(address.clone()),
                Some(_) => {}
            }
        }
        for address in old.keys() {
            if !new.contains_key(address) {
                diff.removed.push(address.clone());
            }
        }
        diff
    }

    /// Serializes to pretty JSON with a trailing newline.
    pub fn to_json(&self) -> AppResult<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Writes the manifest, creating parent directories.
    pub async fn write_to(&self, path: &Path) -> AppResult<()> {
        write_artifact(path, &self.to_json()?).await
    }

    /// Reads a manifest written by [`Manifest::write_to`].
    pub async fn read_from(path: &Path) -> AppResult<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Writes a build artifact, creating parent directories.
pub(crate) async fn write_artifact(path: &Path, contents: &str) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}
