//! Object factory seam
//!
//! The external collaborator that knows how to turn a descriptor into a
//! live runtime object and back. This core only moves, indexes and hands
//! off descriptor data; instantiation and serialization happen behind
//! [`ObjectFactory`]. `DescriptorFactory` is the JSON reference
//! implementation used by tests and as a default collaborator.

use serde_json::{json, Map, Value};

use super::graph::{NodeId, SceneGraph, Transform};
use super::{descriptor_name, descriptor_transform};

/// Error type for descriptor instantiation
#[derive(Debug)]
pub enum FactoryError {
    BadDescriptor(String),
    MissingNode(NodeId),
}

impl std::fmt::Display for FactoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactoryError::BadDescriptor(msg) => write!(f, "bad descriptor: {}", msg),
            FactoryError::MissingNode(id) => write!(f, "missing node: {:?}", id),
        }
    }
}

impl std::error::Error for FactoryError {}

/// External object-factory / serializer collaborator
pub trait ObjectFactory {
    /// Instantiate a descriptor (and its nested children) under `parent`
    fn instantiate(
        &mut self,
        graph: &mut SceneGraph,
        parent: Option<NodeId>,
        descriptor: &Value,
    ) -> Result<NodeId, FactoryError>;

    /// Serialize a live subtree back into a recursive descriptor
    fn serialize(&self, graph: &SceneGraph, node: NodeId) -> Value;

    /// Create one child node; name defaults to "Node", transform to identity
    fn create_child_node(
        &mut self,
        graph: &mut SceneGraph,
        parent: Option<NodeId>,
        name: Option<&str>,
        transform: Option<Transform>,
    ) -> NodeId;

    /// Re-point a node onto a new backing bone
    ///
    /// The node's authored local transform is preserved; only the backing
    /// identity changes. With `keep_children` false the node's existing
    /// children are discarded.
    fn rebind_node_backing(
        &mut self,
        graph: &mut SceneGraph,
        node: NodeId,
        bone: usize,
        keep_children: bool,
    );
}

/// Structural descriptor fields owned by this factory; everything else is
/// carried through as extras
const STRUCTURAL_FIELDS: [&str; 5] = ["name", "position", "rotation", "scale", "children"];

/// JSON-descriptor reference factory
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorFactory;

impl ObjectFactory for DescriptorFactory {
    fn instantiate(
        &mut self,
        graph: &mut SceneGraph,
        parent: Option<NodeId>,
        descriptor: &Value,
    ) -> Result<NodeId, FactoryError> {
        let Some(fields) = descriptor.as_object() else {
            return Err(FactoryError::BadDescriptor(format!(
                "expected an object, got {}",
                descriptor
            )));
        };

        let name = descriptor_name(descriptor).unwrap_or("Object");
        let transform = descriptor_transform(descriptor).unwrap_or_default();
        let id = graph.add_node(parent, name, transform);

        let extras: Map<String, Value> = fields
            .iter()
            .filter(|(key, _)| !STRUCTURAL_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if let Some(node) = graph.node_mut(id) {
            node.extras = extras;
        }

        if let Some(children) = fields.get("children").and_then(Value::as_array) {
            for child in children {
                self.instantiate(graph, Some(id), child)?;
            }
        }
        Ok(id)
    }

    fn serialize(&self, graph: &SceneGraph, node: NodeId) -> Value {
        let Some(data) = graph.node(node) else {
            return Value::Null;
        };

        let mut out = Map::new();
        for (key, value) in &data.extras {
            out.insert(key.clone(), value.clone());
        }
        out.insert("name".into(), Value::String(data.name.clone()));
        let t = data.local;
        out.insert(
            "position".into(),
            json!([t.position.x, t.position.y, t.position.z]),
        );
        out.insert(
            "rotation".into(),
            json!([t.rotation.x, t.rotation.y, t.rotation.z, t.rotation.w]),
        );
        out.insert("scale".into(), json!([t.scale.x, t.scale.y, t.scale.z]));

        let children: Vec<Value> = graph
            .children(Some(node))
            .iter()
            .map(|&child| self.serialize(graph, child))
            .collect();
        if !children.is_empty() {
            out.insert("children".into(), Value::Array(children));
        }
        Value::Object(out)
    }

    fn create_child_node(
        &mut self,
        graph: &mut SceneGraph,
        parent: Option<NodeId>,
        name: Option<&str>,
        transform: Option<Transform>,
    ) -> NodeId {
        graph.add_node(parent, name.unwrap_or("Node"), transform.unwrap_or_default())
    }

    fn rebind_node_backing(
        &mut self,
        graph: &mut SceneGraph,
        node: NodeId,
        bone: usize,
        keep_children: bool,
    ) {
        if !keep_children {
            let children: Vec<NodeId> = graph.children(Some(node)).to_vec();
            for child in children {
                graph.remove_subtree(child);
            }
        }
        if let Some(data) = graph.node_mut(node) {
            data.backing_bone = Some(bone);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_instantiate_recursive() {
        let mut graph = SceneGraph::new();
        let mut factory = DescriptorFactory;
        let descriptor = json!({
            "name": "hero",
            "position": [1.0, 0.0, 0.0],
            "texture": "u1",
            "children": [
                {"name": "sword"},
                {"name": "shield", "children": [{"name": "emblem"}]}
            ]
        });

        let id = factory.instantiate(&mut graph, None, &descriptor).unwrap();
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.node(id).unwrap().name, "hero");
        assert_eq!(
            graph.node(id).unwrap().local.position,
            Vec3::new(1.0, 0.0, 0.0)
        );
        assert_eq!(
            graph.node(id).unwrap().extras.get("texture"),
            Some(&json!("u1"))
        );
        assert_eq!(graph.children(Some(id)).len(), 2);
    }

    #[test]
    fn test_instantiate_rejects_non_object() {
        let mut graph = SceneGraph::new();
        let mut factory = DescriptorFactory;
        assert!(factory.instantiate(&mut graph, None, &json!(42)).is_err());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_serialize_round_trip_shape() {
        let mut graph = SceneGraph::new();
        let mut factory = DescriptorFactory;
        let descriptor = json!({
            "name": "hero",
            "texture": "u1",
            "children": [{"name": "sword", "children": [{"name": "gem"}]}]
        });
        let id = factory.instantiate(&mut graph, None, &descriptor).unwrap();
        let serialized = factory.serialize(&graph, id);

        // Extras and structure survive
        assert_eq!(serialized.get("texture"), Some(&json!("u1")));
        assert_eq!(descriptor_name(&serialized), Some("hero"));
        let children = serialized.get("children").unwrap().as_array().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(descriptor_name(&children[0]), Some("sword"));

        // Re-instantiating the serialized form yields the same node count
        let mut second = SceneGraph::new();
        factory.instantiate(&mut second, None, &serialized).unwrap();
        assert_eq!(second.len(), graph.len());
    }

    #[test]
    fn test_rebind_keep_children() {
        let mut graph = SceneGraph::new();
        let mut factory = DescriptorFactory;
        let parent = factory.create_child_node(&mut graph, None, Some("pelvis"), None);
        let _child = factory.create_child_node(&mut graph, Some(parent), Some("leg"), None);

        factory.rebind_node_backing(&mut graph, parent, 3, true);
        assert_eq!(graph.node(parent).unwrap().backing_bone, Some(3));
        assert_eq!(graph.children(Some(parent)).len(), 1);

        factory.rebind_node_backing(&mut graph, parent, 4, false);
        assert_eq!(graph.node(parent).unwrap().backing_bone, Some(4));
        assert!(graph.children(Some(parent)).is_empty());
    }
}
