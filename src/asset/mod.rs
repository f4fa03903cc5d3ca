//! Asset index
//!
//! A uuid → relative-path registry resolving scene-embedded references to
//! payload files inside a container. Merges are first-writer-wins so
//! repeated imports of the same asset never duplicate storage.

use std::collections::{HashMap, HashSet};

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One binary asset reference: globally unique uuid plus its location
/// inside a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub uuid: String,
    pub rel: String,
}

impl AssetEntry {
    pub fn new(uuid: impl Into<String>, rel: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            rel: rel.into(),
        }
    }
}

/// Ordered uuid → relative-path registry
#[derive(Debug, Clone, Default)]
pub struct AssetIndex {
    entries: Vec<AssetEntry>,
    by_uuid: HashMap<String, usize>,
}

impl AssetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `asset-index.json` bytes defensively
    ///
    /// A non-array or malformed document yields an empty index, never an
    /// error. Individual malformed entries are skipped.
    pub fn parse(bytes: &[u8]) -> Self {
        let value: Value = match serde_json::from_slice(bytes) {
            Ok(v) => v,
            Err(e) => {
                warn!("asset index is not valid JSON, treating as empty: {}", e);
                return Self::new();
            }
        };
        let Some(items) = value.as_array() else {
            warn!("asset index is not an array, treating as empty");
            return Self::new();
        };

        let mut index = Self::new();
        for item in items {
            let uuid = item.get("uuid").and_then(Value::as_str);
            let rel = item.get("rel").and_then(Value::as_str);
            match (uuid, rel) {
                (Some(uuid), Some(rel)) => {
                    index.merge(AssetEntry::new(uuid, rel));
                }
                _ => warn!("skipping malformed asset index entry: {}", item),
            }
        }
        index
    }

    /// Serialize to `asset-index.json` bytes
    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(&self.entries).unwrap_or_else(|_| b"[]".to_vec())
    }

    /// Add an entry if its uuid is absent (first-writer-wins)
    ///
    /// Returns true if the entry was added. Repeated merges of the same
    /// asset are idempotent.
    pub fn merge(&mut self, entry: AssetEntry) -> bool {
        if self.by_uuid.contains_key(&entry.uuid) {
            return false;
        }
        self.by_uuid.insert(entry.uuid.clone(), self.entries.len());
        self.entries.push(entry);
        true
    }

    /// Register a brand-new asset under a fresh uuid
    pub fn mint(&mut self, rel: impl Into<String>) -> AssetEntry {
        let entry = AssetEntry::new(Uuid::new_v4().to_string(), rel);
        self.merge(entry.clone());
        entry
    }

    pub fn contains_uuid(&self, uuid: &str) -> bool {
        self.by_uuid.contains_key(uuid)
    }

    pub fn get(&self, uuid: &str) -> Option<&AssetEntry> {
        self.by_uuid.get(uuid).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in merge order
    pub fn iter(&self) -> impl Iterator<Item = &AssetEntry> {
        self.entries.iter()
    }

    /// Prune to the entries reachable from an exported subtree
    ///
    /// An entry is kept iff its uuid appears as a literal substring of the
    /// serialized scene text, or its relative path names a template/symbol
    /// resource currently in use. This is a conservative textual
    /// over-approximation: extra bytes may be included, but a used asset is
    /// never dropped.
    pub fn reachable_from(&self, scene_text: &str, active_resources: &HashSet<String>) -> Self {
        let mut pruned = Self::new();
        for entry in &self.entries {
            if scene_text.contains(&entry.uuid) || active_resources.contains(&entry.rel) {
                pruned.merge(entry.clone());
            }
        }
        pruned
    }
}
