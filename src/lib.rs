//! scenepack: project content containers and runtime scene rebinding
//!
//! A project's content travels as a single compressed archive (the
//! [`container::Container`]) holding a manifest, scene descriptors, an
//! asset index and raw asset bytes. This crate covers the full life cycle:
//! parsing and generating containers (synchronously or on the
//! [`container::worker::CodecWorker`] thread), merging their assets into a
//! live [`session::ProjectSession`], spawning scene objects through an
//! [`scene::factory::ObjectFactory`], exporting live objects back out as
//! fresh containers, caching loaded files ([`cache::FileCache`]), and
//! binding saved node hierarchies onto live skeletons ([`rig::RigBinder`]).

pub mod asset;
pub mod cache;
pub mod container;
pub mod rig;
pub mod scene;
pub mod session;

pub use asset::{AssetEntry, AssetIndex};
pub use cache::{CacheError, FileCache, LoadHandle};
pub use container::worker::CodecWorker;
pub use container::{CompressionOptions, Container, ContainerError};
pub use rig::{Bone, RigBinder, Skeleton};
pub use scene::export::{DirectorySink, ExportFile, ExportOptions, MultiFileSink};
pub use scene::factory::{DescriptorFactory, FactoryError, ObjectFactory};
pub use scene::graph::{NodeId, SceneGraph, Transform};
pub use scene::spawn::SpawnOptions;
pub use scene::{ProjectManifest, SceneData};
pub use session::{AssetChangeListener, ProjectSession};
