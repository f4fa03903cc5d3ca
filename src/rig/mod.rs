//! Rig binding
//!
//! Matches stored scene-graph nodes to a live skeletal bone hierarchy,
//! creating and re-pointing nodes until every bone has exactly one
//! corresponding node under the canonical "Rig" subtree. The live shape may
//! not exactly match what was saved: matching is by name and occurrence
//! with a claimed-set guaranteeing an injective mapping, and a coverage
//! pass making it bijective.

use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::scene::factory::ObjectFactory;
use crate::scene::graph::{NodeId, SceneGraph, Transform};

/// Canonical name of the rig subtree under a host node
pub const RIG_NODE_NAME: &str = "Rig";

/// Render-frame ticks to wait before binding, so previously saved children
/// (including an existing "Rig") finish materializing asynchronously
const BIND_DELAY_FRAMES: u8 = 2;

/// One bone in a runtime skeletal hierarchy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    /// Parent bone index (None = root bone)
    pub parent: Option<usize>,
    /// Local bind-pose transform relative to the parent
    pub local: Transform,
}

impl Bone {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            local: Transform::default(),
        }
    }

    pub fn with_parent(name: &str, parent: usize) -> Self {
        Self {
            name: name.to_string(),
            parent: Some(parent),
            local: Transform::default(),
        }
    }
}

/// A live bone hierarchy, index-linked like the rigged models it comes from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bone and return its index
    pub fn add_bone(&mut self, bone: Bone) -> usize {
        let idx = self.bones.len();
        self.bones.push(bone);
        idx
    }

    /// Indices of bones with no parent
    pub fn root_bones(&self) -> Vec<usize> {
        self.bones
            .iter()
            .enumerate()
            .filter(|(_, b)| b.parent.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }
}

/// One-shot per-bind lookup over a skeleton
///
/// Per parent scope (None = root): the unfiltered ordered child list, used
/// by the coverage pass regardless of name, and per-name buckets in
/// traversal order, used for occurrence matching. Built once per bind call
/// and discarded.
struct SkeletonIndex {
    children: HashMap<Option<usize>, Vec<usize>>,
    name_buckets: HashMap<(Option<usize>, String), Vec<usize>>,
}

impl SkeletonIndex {
    fn build(skeleton: &Skeleton) -> Self {
        let mut children: HashMap<Option<usize>, Vec<usize>> = HashMap::new();
        let mut name_buckets: HashMap<(Option<usize>, String), Vec<usize>> = HashMap::new();
        for (idx, bone) in skeleton.bones.iter().enumerate() {
            children.entry(bone.parent).or_default().push(idx);
            name_buckets
                .entry((bone.parent, bone.name.clone()))
                .or_default()
                .push(idx);
        }
        Self {
            children,
            name_buckets,
        }
    }

    fn children(&self, scope: Option<usize>) -> &[usize] {
        self.children.get(&scope).map(Vec::as_slice).unwrap_or(&[])
    }

    fn named(&self, scope: Option<usize>, name: &str) -> &[usize] {
        self.name_buckets
            .get(&(scope, name.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

struct PendingBind {
    host: NodeId,
    skeleton: Skeleton,
    frames: u8,
}

/// Binds scheduled skeletons onto their host nodes after a two-tick delay
#[derive(Default)]
pub struct RigBinder {
    pending: Vec<PendingBind>,
}

impl RigBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a bind of `skeleton` under `host`; it runs two ticks later
    pub fn schedule(&mut self, host: NodeId, skeleton: Skeleton) {
        self.pending.push(PendingBind {
            host,
            skeleton,
            frames: BIND_DELAY_FRAMES,
        });
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Advance one render frame; runs binds whose delay has elapsed
    pub fn tick(&mut self, graph: &mut SceneGraph, factory: &mut dyn ObjectFactory) {
        for bind in &mut self.pending {
            bind.frames = bind.frames.saturating_sub(1);
        }
        let ready: Vec<PendingBind> = {
            let mut remaining = Vec::new();
            let mut ready = Vec::new();
            for bind in self.pending.drain(..) {
                if bind.frames == 0 {
                    ready.push(bind);
                } else {
                    remaining.push(bind);
                }
            }
            self.pending = remaining;
            ready
        };
        for bind in ready {
            Self::bind(graph, factory, bind.host, &bind.skeleton);
        }
    }

    /// Bind immediately (the tick path lands here once the delay elapses)
    pub fn bind(
        graph: &mut SceneGraph,
        factory: &mut dyn ObjectFactory,
        host: NodeId,
        skeleton: &Skeleton,
    ) {
        // No skeleton is a silent no-op, not an error
        if skeleton.is_empty() {
            return;
        }
        if !graph.contains(host) {
            warn!("rig bind host {:?} no longer exists, skipping", host);
            return;
        }

        let index = SkeletonIndex::build(skeleton);
        let mut claimed = vec![false; skeleton.bones.len()];

        // An existing "Rig" child is the walk root; on first call the host's
        // own children are walked (saved nodes may sit directly under it)
        // and a fresh Rig node receives root-scope coverage nodes.
        let (walk, rig_root) = match graph.child_named(Some(host), RIG_NODE_NAME) {
            Some(rig) => (graph.children(Some(rig)).to_vec(), rig),
            None => {
                let existing = graph.children(Some(host)).to_vec();
                let rig = factory.create_child_node(graph, Some(host), Some(RIG_NODE_NAME), None);
                (existing, rig)
            }
        };

        for child in walk {
            Self::match_node(graph, factory, skeleton, &index, &mut claimed, child, None);
        }
        Self::cover(graph, factory, skeleton, &index, &mut claimed, rig_root, None);
    }

    /// Depth-first matching of an existing node within a bone-parent scope
    fn match_node(
        graph: &mut SceneGraph,
        factory: &mut dyn ObjectFactory,
        skeleton: &Skeleton,
        index: &SkeletonIndex,
        claimed: &mut [bool],
        node: NodeId,
        scope: Option<usize>,
    ) {
        let Some(data) = graph.node(node) else {
            return;
        };
        let name = data.name.clone();
        let occurrence = graph.name_occurrence(node);
        let children = graph.children(Some(node)).to_vec();

        let bucket = index.named(scope, &name);
        let chosen = bucket
            .get(occurrence)
            .copied()
            .filter(|&b| !claimed[b])
            .or_else(|| bucket.iter().copied().find(|&b| !claimed[b]));

        match chosen {
            Some(bone) => {
                // Only the backing identity changes; the node keeps its
                // authored local transform
                if graph.node(node).and_then(|n| n.backing_bone) != Some(bone) {
                    factory.rebind_node_backing(graph, node, bone, true);
                }
                claimed[bone] = true;
                for child in children {
                    Self::match_node(graph, factory, skeleton, index, claimed, child, Some(bone));
                }
                Self::cover(graph, factory, skeleton, index, claimed, node, Some(bone));
            }
            None => {
                // No match: deeper descendants may still match unclaimed
                // bones elsewhere, so recurse without advancing the scope.
                for child in children {
                    Self::match_node(graph, factory, skeleton, index, claimed, child, scope);
                }
            }
        }
    }

    /// Coverage pass: every bone in this scope not yet claimed gets a
    /// brand-new node under the current scene-graph parent
    fn cover(
        graph: &mut SceneGraph,
        factory: &mut dyn ObjectFactory,
        skeleton: &Skeleton,
        index: &SkeletonIndex,
        claimed: &mut [bool],
        parent_node: NodeId,
        scope: Option<usize>,
    ) {
        for &bone in index.children(scope) {
            if claimed[bone] {
                continue;
            }
            let info = &skeleton.bones[bone];
            let node = factory.create_child_node(
                graph,
                Some(parent_node),
                Some(&info.name),
                Some(info.local),
            );
            factory.rebind_node_backing(graph, node, bone, true);
            claimed[bone] = true;
            Self::cover(graph, factory, skeleton, index, claimed, node, Some(bone));
        }
    }
}
