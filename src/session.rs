//! Project session
//!
//! The explicit context threaded through every operation: destination
//! container, project asset index, live scene graph, selection, and the
//! spawn undo/redo stacks. Replaces the ambient "current project"
//! registries of older designs so isolated sessions can coexist in one
//! process (and in tests).

use std::collections::HashSet;

use serde_json::Value;

use crate::asset::{AssetEntry, AssetIndex};
use crate::container::Container;
use crate::scene::graph::{NodeId, SceneGraph};
use crate::scene::ProjectManifest;

/// Maximum retained spawn undo steps
const MAX_UNDO_STEPS: usize = 100;

/// Collaborator notified after asset-index merges complete
///
/// Notification is ordered strictly after all merges and byte copies of a
/// spawn, and strictly before any object is instantiated.
pub trait AssetChangeListener {
    fn assets_changed(&mut self, added: &[AssetEntry]);
}

/// One recorded spawn, sufficient to undo and redo it
#[derive(Debug, Clone)]
pub(crate) struct SpawnStep {
    /// Top-level descriptors of the scene the spawn ran against
    pub descriptors: Vec<Value>,
    /// Objects created by this spawn (or its latest redo)
    pub spawned: Vec<NodeId>,
    /// Selection as it existed before the spawn
    pub prior_selection: Vec<NodeId>,
    pub keep_world_transform: bool,
}

/// Active project session
pub struct ProjectSession {
    /// Destination container assets are materialized into
    pub container: Container,
    /// Project-wide asset index
    pub asset_index: AssetIndex,
    /// Live scene graph spawn and rig binding operate on
    pub graph: SceneGraph,
    /// Project manifest used when exporting
    pub manifest: ProjectManifest,
    /// Currently selected nodes
    pub selection: Vec<NodeId>,
    /// Relative paths of named template/symbol resources currently in use;
    /// feeds the export reachability test
    pub active_resources: HashSet<String>,
    listeners: Vec<Box<dyn AssetChangeListener>>,
    pub(crate) undo_stack: Vec<SpawnStep>,
    pub(crate) redo_stack: Vec<SpawnStep>,
}

impl ProjectSession {
    pub fn new() -> Self {
        Self {
            container: Container::new(),
            asset_index: AssetIndex::new(),
            graph: SceneGraph::new(),
            manifest: ProjectManifest::default(),
            selection: Vec::new(),
            active_resources: HashSet::new(),
            listeners: Vec::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    pub fn add_asset_listener(&mut self, listener: Box<dyn AssetChangeListener>) {
        self.listeners.push(listener);
    }

    pub(crate) fn notify_assets_changed(&mut self, added: &[AssetEntry]) {
        for listener in &mut self.listeners {
            listener.assets_changed(added);
        }
    }

    pub(crate) fn push_spawn_step(&mut self, step: SpawnStep) {
        self.undo_stack.push(step);
        if self.undo_stack.len() > MAX_UNDO_STEPS {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }
}

impl Default for ProjectSession {
    fn default() -> Self {
        Self::new()
    }
}
