//! Live scene graph
//!
//! The runtime structure spawn and rig binding operate on: named nodes with
//! stable ids, ordered children, a local transform, and an optional bone
//! backing. Ids are never reused, so a redo-spawned object is
//! distinguishable from the one it replaces.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use log::warn;

/// Local or world TRS transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Compose a child local transform under this (parent world) transform
    pub fn compose(&self, local: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * (self.scale * local.position),
            rotation: self.rotation * local.rotation,
            scale: self.scale * local.scale,
        }
    }

    /// Express a world transform as a local transform under this parent
    pub fn relativize(&self, world: &Transform) -> Transform {
        let inv_rot = self.rotation.inverse();
        Transform {
            position: (inv_rot * (world.position - self.position)) / self.scale,
            rotation: inv_rot * world.rotation,
            scale: world.scale / self.scale,
        }
    }
}

/// Stable scene-graph node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

/// One live node
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub local: Transform,
    /// Index of the bone backing this node, if it mirrors a skeleton bone
    pub backing_bone: Option<usize>,
    /// Non-structural descriptor fields carried through spawn/export
    pub extras: serde_json::Map<String, serde_json::Value>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Scene graph with ordered children and never-reused ids
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    nodes: HashMap<NodeId, Node>,
    roots: Vec<NodeId>,
    next_id: u64,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node under `parent` (None = graph root). An unknown parent is
    /// logged and the node lands at the root.
    pub fn add_node(&mut self, parent: Option<NodeId>, name: &str, local: Transform) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        let parent = match parent {
            Some(p) if self.nodes.contains_key(&p) => Some(p),
            Some(p) => {
                warn!("add_node: unknown parent {:?}, attaching at root", p);
                None
            }
            None => None,
        };

        self.nodes.insert(
            id,
            Node {
                name: name.to_string(),
                local,
                backing_bone: None,
                extras: serde_json::Map::new(),
                parent,
                children: Vec::new(),
            },
        );
        match parent {
            Some(p) => {
                if let Some(node) = self.nodes.get_mut(&p) {
                    node.children.push(id);
                }
            }
            None => self.roots.push(id),
        }
        id
    }

    /// Remove a node and all of its descendants; returns how many nodes
    /// were removed
    pub fn remove_subtree(&mut self, id: NodeId) -> usize {
        let Some(node) = self.nodes.get(&id) else {
            return 0;
        };
        match node.parent {
            Some(p) => {
                if let Some(parent) = self.nodes.get_mut(&p) {
                    parent.children.retain(|&c| c != id);
                }
            }
            None => self.roots.retain(|&r| r != id),
        }

        let mut removed = 0;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                removed += 1;
                stack.extend(node.children);
            }
        }
        removed
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ordered children of a node (None = root list)
    pub fn children(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            Some(p) => self.nodes.get(&p).map(|n| n.children.as_slice()).unwrap_or(&[]),
            None => &self.roots,
        }
    }

    /// Find the first direct child with the given name
    pub fn child_named(&self, parent: Option<NodeId>, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&c| self.nodes.get(&c).map(|n| n.name == name).unwrap_or(false))
    }

    /// 0-based occurrence index of a node among same-named siblings under
    /// its current parent
    pub fn name_occurrence(&self, id: NodeId) -> usize {
        let Some(node) = self.nodes.get(&id) else {
            return 0;
        };
        self.children(node.parent)
            .iter()
            .filter(|&&sibling| {
                self.nodes
                    .get(&sibling)
                    .map(|n| n.name == node.name)
                    .unwrap_or(false)
            })
            .position(|&sibling| sibling == id)
            .unwrap_or(0)
    }

    /// World transform composed from the parent chain
    pub fn world_transform(&self, id: NodeId) -> Transform {
        let Some(node) = self.nodes.get(&id) else {
            return Transform::default();
        };
        let parent_world = match node.parent {
            Some(p) => self.world_transform(p),
            None => Transform::default(),
        };
        parent_world.compose(&node.local)
    }

    /// Overwrite a node's world transform by adjusting its local transform
    pub fn set_world_transform(&mut self, id: NodeId, world: Transform) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let parent_world = match node.parent {
            Some(p) => self.world_transform(p),
            None => Transform::default(),
        };
        if let Some(node) = self.nodes.get_mut(&id) {
            node.local = parent_world.relativize(&world);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove_subtree() {
        let mut graph = SceneGraph::new();
        let root = graph.add_node(None, "root", Transform::default());
        let a = graph.add_node(Some(root), "a", Transform::default());
        let _b = graph.add_node(Some(a), "b", Transform::default());
        let c = graph.add_node(Some(root), "c", Transform::default());

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.remove_subtree(a), 2);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.children(Some(root)), &[c]);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut graph = SceneGraph::new();
        let a = graph.add_node(None, "a", Transform::default());
        graph.remove_subtree(a);
        let b = graph.add_node(None, "a", Transform::default());
        assert_ne!(a, b);
    }

    #[test]
    fn test_name_occurrence() {
        let mut graph = SceneGraph::new();
        let root = graph.add_node(None, "root", Transform::default());
        let leg0 = graph.add_node(Some(root), "leg", Transform::default());
        let _arm = graph.add_node(Some(root), "arm", Transform::default());
        let leg1 = graph.add_node(Some(root), "leg", Transform::default());

        assert_eq!(graph.name_occurrence(leg0), 0);
        assert_eq!(graph.name_occurrence(leg1), 1);
    }

    #[test]
    fn test_world_transform_round_trip() {
        let mut graph = SceneGraph::new();
        let root = graph.add_node(
            None,
            "root",
            Transform {
                position: Vec3::new(10.0, 0.0, 0.0),
                rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
                scale: Vec3::splat(2.0),
            },
        );
        let child = graph.add_node(
            Some(root),
            "child",
            Transform {
                position: Vec3::new(1.0, 0.0, 0.0),
                ..Default::default()
            },
        );

        let target = Transform {
            position: Vec3::new(5.0, 3.0, -2.0),
            rotation: Quat::from_rotation_x(0.5),
            scale: Vec3::splat(1.0),
        };
        graph.set_world_transform(child, target);
        let world = graph.world_transform(child);

        assert!((world.position - target.position).length() < 1e-4);
        assert!((world.rotation.dot(target.rotation)).abs() > 0.9999);
        assert!((world.scale - target.scale).length() < 1e-4);
    }
}
