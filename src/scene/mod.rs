//! Scene data model
//!
//! The stored side of the pipeline: project manifest, scene list, and the
//! descriptor boundary. Object descriptors are opaque recursive JSON owned
//! by the object-factory collaborator; this core only indexes and relocates
//! them, validating the engine fields it needs (transforms) at the boundary.

pub mod export;
pub mod factory;
pub mod graph;
pub mod spawn;

use glam::{Quat, Vec3};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use graph::Transform;

/// Required project entry names inside a container
pub const MANIFEST_ENTRY: &str = "manifest.json";
pub const SCENES_ENTRY: &str = "scenes.json";
pub const ASSET_INDEX_ENTRY: &str = "asset-index.json";

/// Project manifest (`manifest.json`)
///
/// `editor_config` is stripped for runnable-artifact exports and kept for
/// project-template exports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_config: Option<Value>,
    #[serde(default)]
    pub editor_version: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub start_scene: usize,
}

impl ProjectManifest {
    /// Parse manifest bytes; malformed JSON degrades to None
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match serde_json::from_slice(bytes) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!("manifest is not valid JSON, ignoring: {}", e);
                None
            }
        }
    }

    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|_| b"{}".to_vec())
    }
}

/// One scene: an ordered list of top-level object descriptors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneData {
    #[serde(default)]
    pub objects: Vec<Value>,
}

/// Parse `scenes.json` defensively: absent, non-array or malformed scene
/// data yields an empty list, never an error
pub fn parse_scene_list(bytes: &[u8]) -> Vec<SceneData> {
    match serde_json::from_slice::<Vec<SceneData>>(bytes) {
        Ok(scenes) => scenes,
        Err(e) => {
            warn!("scene list is not valid JSON, treating as empty: {}", e);
            Vec::new()
        }
    }
}

pub fn scene_list_to_json(scenes: &[SceneData]) -> Vec<u8> {
    serde_json::to_vec(scenes).unwrap_or_else(|_| b"[]".to_vec())
}

fn vec3_field(descriptor: &Value, field: &str) -> Option<Vec3> {
    let array = descriptor.get(field)?.as_array()?;
    if array.len() != 3 {
        return None;
    }
    let mut out = [0.0f32; 3];
    for (slot, item) in out.iter_mut().zip(array) {
        let v = item.as_f64()? as f32;
        if !v.is_finite() {
            return None;
        }
        *slot = v;
    }
    Some(Vec3::from_array(out))
}

fn quat_field(descriptor: &Value, field: &str) -> Option<Quat> {
    let array = descriptor.get(field)?.as_array()?;
    if array.len() != 4 {
        return None;
    }
    let mut out = [0.0f32; 4];
    for (slot, item) in out.iter_mut().zip(array) {
        let v = item.as_f64()? as f32;
        if !v.is_finite() {
            return None;
        }
        *slot = v;
    }
    Some(Quat::from_array(out).normalize())
}

/// Extract the transform captured in a descriptor
///
/// Missing fields fall back to identity components; a non-object descriptor
/// yields None. Field shapes are validated here rather than assumed.
pub fn descriptor_transform(descriptor: &Value) -> Option<Transform> {
    if !descriptor.is_object() {
        return None;
    }
    Some(Transform {
        position: vec3_field(descriptor, "position").unwrap_or(Vec3::ZERO),
        rotation: quat_field(descriptor, "rotation").unwrap_or(Quat::IDENTITY),
        scale: vec3_field(descriptor, "scale").unwrap_or(Vec3::ONE),
    })
}

/// The descriptor's display name, if present
pub fn descriptor_name(descriptor: &Value) -> Option<&str> {
    descriptor.get("name").and_then(Value::as_str)
}
