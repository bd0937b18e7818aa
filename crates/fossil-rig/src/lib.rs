//! Fossil Rigging Engine
//!
//! This crate builds control rigs for character skeletons from a catalog of
//! reusable components (FK, multi-FK, IK, spine IK, leg IK and so on),
//! composed through parent and upright space relationships.
//!
//! # Overview
//!
//! - A [`ComponentGraph`] owns the components and keeps the space relation
//!   acyclic.
//! - A [`Rig`] generates controls for the graph in a host [`Scene`], binds
//!   them to the skeleton, bakes existing animation onto them and unbinds.
//! - [`MemoryScene`] is an in-process host that evaluates the records the
//!   engine emits.
//!
//! # Example
//!
//! ```
//! use fossil_rig::{Component, ComponentKind, LifecycleState, MemoryScene, NodeKind, Rig, Scene};
//!
//! let mut scene = MemoryScene::new();
//! scene.create_node("head", NodeKind::Joint, None).unwrap();
//!
//! let mut rig = Rig::new("hero");
//! rig.graph_mut()
//!     .add(Component::new("head", ComponentKind::Fk).with_target("head"))
//!     .unwrap();
//!
//! let warnings = rig.preview(&mut scene).unwrap();
//! assert!(warnings.is_empty());
//! rig.bind(&mut scene).unwrap();
//! assert_eq!(rig.state(), LifecycleState::Bound);
//! ```
//!
//! # Modules
//!
//! - [`component`]: Component data model and kind parameters
//! - [`graph`]: Component graph and topological ordering
//! - [`curve`]: Control curve presets, factory and shape library
//! - [`scene`]: Host scene boundary and the in-memory host
//! - [`space`]: Space candidates, selectors and pop-free switching
//! - [`stretch`]: Squash and stretch factors and wiring
//! - [`rig`]: Lifecycle controller and rig registry
//! - [`document`]: Versioned rig documents
//! - [`settings`]: Engine configuration

pub mod component;
pub mod curve;
pub mod document;
pub mod error;
pub mod graph;
pub mod rig;
pub mod scene;
pub mod settings;
pub mod space;
pub mod stretch;
pub mod transform;

// Re-export commonly used types at the crate root
pub use component::{
    Component, ComponentBase, ComponentKind, ControlRole, GeneratedComponent, KindParams, SpaceRef,
};
pub use curve::{ControlColor, ControlShape, CurveFactory, CurveGeometry, ShapeLibrary};
pub use document::{RigDocument, DOCUMENT_VERSION};
pub use error::{
    BakeError, BindError, RegenerateWarning, RigError, RigResult, SceneError, WarningCode,
};
pub use graph::ComponentGraph;
pub use rig::{
    BakeObserver, BakeProgress, BakeReport, LifecycleState, Rig, RigRegistry, SharedWorkspace,
    Workspace,
};
pub use scene::{Frame, MemoryScene, NodeId, NodeKind, Scene};
pub use settings::{RigSettings, SettingsError};
pub use space::SpaceChannel;
pub use transform::{Axis, Transform};
