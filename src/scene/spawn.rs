//! Scene spawning
//!
//! Deserializes a container's scene data, merges its asset index into the
//! active project, and instantiates runtime objects through the object
//! factory. Unreadable or missing scene data yields an empty result, never
//! an error: callers treat empty as "nothing to add".

use log::warn;

use crate::container::worker::CodecWorker;
use crate::container::Container;
use crate::session::{ProjectSession, SpawnStep};

use super::factory::ObjectFactory;
use super::graph::NodeId;
use super::{
    descriptor_transform, parse_scene_list, ProjectManifest, SceneData, ASSET_INDEX_ENTRY,
    MANIFEST_ENTRY, SCENES_ENTRY,
};

/// Options for [`ProjectSession::spawn_scene`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnOptions {
    /// Land each spawned object at the absolute transform captured in its
    /// own descriptor rather than relative to its new parent
    pub keep_world_transform: bool,
    /// Record an undo step for this spawn
    pub add_undo_step: bool,
}

impl ProjectSession {
    /// Spawn the entry scene of a source container into this session
    ///
    /// Asset bytes referenced by the source's index are copied into the
    /// destination container first (skipping paths already present), index
    /// entries are merged, listeners are notified, and only then are
    /// objects instantiated. Returns the ids of the top-level objects
    /// created.
    pub fn spawn_scene(
        &mut self,
        factory: &mut dyn ObjectFactory,
        source: &Container,
        options: SpawnOptions,
    ) -> Vec<NodeId> {
        let manifest = source
            .read(MANIFEST_ENTRY)
            .and_then(ProjectManifest::parse);

        let scenes = match source.read(SCENES_ENTRY) {
            Some(bytes) => parse_scene_list(bytes),
            None => {
                warn!("source container has no {}", SCENES_ENTRY);
                return Vec::new();
            }
        };
        if scenes.is_empty() {
            return Vec::new();
        }

        let mut scene_idx = manifest.map(|m| m.start_scene).unwrap_or(0);
        if scene_idx >= scenes.len() {
            warn!(
                "start scene {} out of range ({} scenes), using 0",
                scene_idx,
                scenes.len()
            );
            scene_idx = 0;
        }

        let index = source
            .read(ASSET_INDEX_ENTRY)
            .map(crate::asset::AssetIndex::parse)
            .unwrap_or_default();

        // Materialize asset bytes before anything can reference them. The
        // path-presence check is the dedup point: already-present assets
        // are never recopied. A failed copy only skips that entry's merge.
        let mut added = Vec::new();
        for entry in index.iter() {
            if !self.container.contains(&entry.rel) {
                match source.read(&entry.rel) {
                    Some(bytes) => self.container.write(entry.rel.clone(), bytes.to_vec()),
                    None => {
                        warn!(
                            "asset {} has no bytes at '{}' in source container, skipping",
                            entry.uuid, entry.rel
                        );
                        continue;
                    }
                }
            }
            if self.asset_index.merge(entry.clone()) {
                added.push(entry.clone());
            }
        }
        self.notify_assets_changed(&added);

        let scene = &scenes[scene_idx];
        let spawned = self.instantiate_scene(factory, scene, options.keep_world_transform);

        if options.add_undo_step {
            let step = SpawnStep {
                descriptors: scene.objects.clone(),
                spawned: spawned.clone(),
                prior_selection: self.selection.clone(),
                keep_world_transform: options.keep_world_transform,
            };
            self.push_spawn_step(step);
        }

        spawned
    }

    /// Decode container bytes on the codec worker, then spawn
    pub fn spawn_scene_bytes(
        &mut self,
        factory: &mut dyn ObjectFactory,
        worker: &CodecWorker,
        bytes: Vec<u8>,
        options: SpawnOptions,
    ) -> Vec<NodeId> {
        match worker.decode(bytes).wait() {
            Ok(source) => self.spawn_scene(factory, &source, options),
            Err(e) => {
                warn!("container decode failed: {}", e);
                Vec::new()
            }
        }
    }

    fn instantiate_scene(
        &mut self,
        factory: &mut dyn ObjectFactory,
        scene: &SceneData,
        keep_world_transform: bool,
    ) -> Vec<NodeId> {
        let mut spawned = Vec::new();
        for descriptor in &scene.objects {
            match factory.instantiate(&mut self.graph, None, descriptor) {
                Ok(id) => {
                    if keep_world_transform {
                        if let Some(world) = descriptor_transform(descriptor) {
                            self.graph.set_world_transform(id, world);
                        }
                    }
                    spawned.push(id);
                }
                Err(e) => warn!("skipping descriptor that failed to instantiate: {}", e),
            }
        }
        spawned
    }

    /// Undo the most recent spawn: destroy every object it created and
    /// restore the selection that existed beforehand
    pub fn undo_spawn(&mut self) -> bool {
        let Some(step) = self.undo_stack.pop() else {
            return false;
        };
        for &id in &step.spawned {
            self.graph.remove_subtree(id);
        }
        self.selection = step.prior_selection.clone();
        self.redo_stack.push(step);
        true
    }

    /// Redo the most recently undone spawn
    ///
    /// Re-runs instantiation against the same scene description, producing
    /// a new set of object identities (not the originals), and selects
    /// them.
    pub fn redo_spawn(&mut self, factory: &mut dyn ObjectFactory) -> Vec<NodeId> {
        let Some(mut step) = self.redo_stack.pop() else {
            return Vec::new();
        };
        let scene = SceneData {
            objects: step.descriptors.clone(),
        };
        let spawned = self.instantiate_scene(factory, &scene, step.keep_world_transform);
        self.selection = spawned.clone();
        step.spawned = spawned.clone();
        self.undo_stack.push(step);
        spawned
    }
}

/// Build a minimal source container for tests
#[cfg(test)]
pub(crate) fn test_container(
    manifest: Option<&serde_json::Value>,
    scenes: &[SceneData],
    index_json: &str,
    assets: &[(&str, &[u8])],
) -> Container {
    let mut container = Container::new();
    if let Some(manifest) = manifest {
        container.write(
            MANIFEST_ENTRY,
            serde_json::to_vec(manifest).expect("manifest json"),
        );
    }
    container.write(SCENES_ENTRY, super::scene_list_to_json(scenes));
    container.write(ASSET_INDEX_ENTRY, index_json.as_bytes().to_vec());
    for (rel, bytes) in assets {
        container.write(rel.to_string(), bytes.to_vec());
    }
    container
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetEntry;
    use crate::scene::factory::DescriptorFactory;
    use crate::session::AssetChangeListener;
    use glam::Vec3;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn two_object_container() -> Container {
        let scene = SceneData {
            objects: vec![
                json!({"name": "crate", "texture": "u1", "position": [1.0, 0.0, 0.0]}),
                json!({"name": "barrel", "texture": "u1"}),
            ],
        };
        test_container(
            None,
            &[scene],
            r#"[{"uuid":"u1","rel":"tex/a.png"}]"#,
            &[("tex/a.png", &[1, 2, 3])],
        )
    }

    #[test]
    fn test_spawn_concrete_scenario() {
        // Two top-level descriptors, one referenced asset: spawning yields
        // two objects at the default parent and exactly one u1 entry.
        let mut session = ProjectSession::new();
        let mut factory = DescriptorFactory;
        let source = two_object_container();

        let spawned = session.spawn_scene(&mut factory, &source, SpawnOptions::default());
        assert_eq!(spawned.len(), 2);
        assert_eq!(session.graph.children(None).len(), 2);
        assert_eq!(session.asset_index.len(), 1);
        assert_eq!(session.asset_index.get("u1").unwrap().rel, "tex/a.png");
        assert_eq!(session.container.read("tex/a.png"), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn test_spawn_twice_never_recopies() {
        let mut session = ProjectSession::new();
        let mut factory = DescriptorFactory;
        let source = two_object_container();

        session.spawn_scene(&mut factory, &source, SpawnOptions::default());
        // Overwrite the destination copy to prove the second spawn leaves it alone
        session.container.write("tex/a.png", vec![9]);
        session.spawn_scene(&mut factory, &source, SpawnOptions::default());

        assert_eq!(session.asset_index.len(), 1);
        assert_eq!(session.container.read("tex/a.png"), Some(&[9][..]));
    }

    #[test]
    fn test_spawn_missing_or_malformed_scene_data_is_empty() {
        let mut session = ProjectSession::new();
        let mut factory = DescriptorFactory;

        // No scenes.json at all
        let empty = Container::new();
        assert!(session
            .spawn_scene(&mut factory, &empty, SpawnOptions::default())
            .is_empty());

        // Unparsable scenes.json
        let mut garbled = Container::new();
        garbled.write(SCENES_ENTRY, b"not json".to_vec());
        assert!(session
            .spawn_scene(&mut factory, &garbled, SpawnOptions::default())
            .is_empty());
        assert!(session.graph.is_empty());
    }

    #[test]
    fn test_start_scene_selection_and_fallback() {
        let scenes = vec![
            SceneData {
                objects: vec![json!({"name": "first"})],
            },
            SceneData {
                objects: vec![json!({"name": "second"})],
            },
        ];

        let mut session = ProjectSession::new();
        let mut factory = DescriptorFactory;
        let source = test_container(Some(&json!({"startScene": 1})), &scenes, "[]", &[]);
        let spawned = session.spawn_scene(&mut factory, &source, SpawnOptions::default());
        assert_eq!(session.graph.node(spawned[0]).unwrap().name, "second");

        // Out-of-range start scene falls back to 0
        let mut session = ProjectSession::new();
        let source = test_container(Some(&json!({"startScene": 9})), &scenes, "[]", &[]);
        let spawned = session.spawn_scene(&mut factory, &source, SpawnOptions::default());
        assert_eq!(session.graph.node(spawned[0]).unwrap().name, "first");
    }

    #[test]
    fn test_dangling_asset_entry_is_isolated() {
        let scene = SceneData {
            objects: vec![json!({"name": "crate"})],
        };
        let source = test_container(
            None,
            &[scene],
            r#"[{"uuid":"u1","rel":"tex/missing.png"},{"uuid":"u2","rel":"tex/ok.png"}]"#,
            &[("tex/ok.png", &[4])],
        );

        let mut session = ProjectSession::new();
        let mut factory = DescriptorFactory;
        let spawned = session.spawn_scene(&mut factory, &source, SpawnOptions::default());

        // The batch continued: the dangling entry was skipped, the good one
        // merged, and the spawn still happened.
        assert_eq!(spawned.len(), 1);
        assert!(!session.asset_index.contains_uuid("u1"));
        assert!(session.asset_index.contains_uuid("u2"));
    }

    #[test]
    fn test_keep_world_transform() {
        let scene = SceneData {
            objects: vec![json!({
                "name": "crate",
                "position": [5.0, 6.0, 7.0],
            })],
        };
        let source = test_container(None, &[scene], "[]", &[]);

        let mut session = ProjectSession::new();
        let mut factory = DescriptorFactory;
        let spawned = session.spawn_scene(
            &mut factory,
            &source,
            SpawnOptions {
                keep_world_transform: true,
                ..Default::default()
            },
        );
        let world = session.graph.world_transform(spawned[0]);
        assert_eq!(world.position, Vec3::new(5.0, 6.0, 7.0));
    }

    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl AssetChangeListener for Recorder {
        fn assets_changed(&mut self, added: &[AssetEntry]) {
            let mut seen = self.seen.lock().unwrap();
            for entry in added {
                seen.push(entry.uuid.clone());
            }
        }
    }

    #[test]
    fn test_listeners_notified_once_per_spawn() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut session = ProjectSession::new();
        session.add_asset_listener(Box::new(Recorder { seen: seen.clone() }));

        let mut factory = DescriptorFactory;
        let source = two_object_container();
        session.spawn_scene(&mut factory, &source, SpawnOptions::default());
        session.spawn_scene(&mut factory, &source, SpawnOptions::default());

        // Second spawn added nothing, so only the first notification carried u1
        assert_eq!(*seen.lock().unwrap(), vec!["u1".to_string()]);
    }

    #[test]
    fn test_undo_redo_spawn() {
        let mut session = ProjectSession::new();
        let mut factory = DescriptorFactory;

        // A pre-existing selected object survives the whole cycle
        let existing = session.graph.add_node(None, "floor", Default::default());
        session.selection = vec![existing];

        let source = two_object_container();
        let spawned = session.spawn_scene(
            &mut factory,
            &source,
            SpawnOptions {
                add_undo_step: true,
                ..Default::default()
            },
        );
        assert_eq!(spawned.len(), 2);
        assert!(session.can_undo());

        assert!(session.undo_spawn());
        assert_eq!(session.graph.len(), 1);
        assert_eq!(session.selection, vec![existing]);
        assert!(session.can_redo());

        let redone = session.redo_spawn(&mut factory);
        assert_eq!(redone.len(), 2);
        // New identities, not the originals
        for id in &redone {
            assert!(!spawned.contains(id));
        }
        assert_eq!(session.selection, redone);

        // Undo of the redo removes exactly the redone set
        assert!(session.undo_spawn());
        assert_eq!(session.graph.len(), 1);
    }

    #[test]
    fn test_spawn_scene_bytes_through_worker() {
        let source = two_object_container();
        let bytes = source.generate(&Default::default()).unwrap();

        let worker = CodecWorker::spawn();
        let mut session = ProjectSession::new();
        let mut factory = DescriptorFactory;

        let spawned =
            session.spawn_scene_bytes(&mut factory, &worker, bytes, SpawnOptions::default());
        assert_eq!(spawned.len(), 2);

        // Undecodable bytes degrade to an empty result
        let spawned = session.spawn_scene_bytes(
            &mut factory,
            &worker,
            vec![0xde, 0xad],
            SpawnOptions::default(),
        );
        assert!(spawned.is_empty());
    }
}
