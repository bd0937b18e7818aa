//! Rig lifecycle controller.
//!
//! A [`Rig`] owns a component graph and tracks what it generated in a host
//! scene. States move `Empty -> Previewed -> Bound`, back to `Previewed` on
//! unbind and to `Empty` on remove.
//!
//! ```text
//!   preview        bind          unbind
//! Empty ----> Previewed ----> Bound ----> Previewed
//!   ^             |             |
//!   +-- remove ---+-------------+
//! ```

mod bake;
mod bind;
mod generate;
mod registry;

pub use bake::{BakeObserver, BakeProgress, BakeReport};
pub use registry::{RigRegistry, SharedWorkspace, Workspace};

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::component::GeneratedComponent;
use crate::curve::CurveFactory;
use crate::error::{BindError, RigError, RigResult};
use crate::graph::ComponentGraph;
use crate::scene::{Frame, NodeId, Scene};
use crate::settings::RigSettings;
use crate::space::{self, SpaceChannel};

/// Where a rig is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Nothing generated.
    #[default]
    Empty,
    /// Controls exist but drive nothing.
    Previewed,
    /// Controls drive their targets.
    Bound,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Empty => write!(f, "empty"),
            LifecycleState::Previewed => write!(f, "previewed"),
            LifecycleState::Bound => write!(f, "bound"),
        }
    }
}

/// A named control rig: its component graph, configuration and the handles
/// of whatever it generated in the scene.
#[derive(Debug)]
pub struct Rig {
    name: String,
    path: Option<PathBuf>,
    bake_on_bind: bool,
    graph: ComponentGraph,
    settings: RigSettings,
    factory: CurveFactory,
    state: LifecycleState,
    root: Option<NodeId>,
    generated: BTreeMap<String, GeneratedComponent>,
}

impl Rig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            bake_on_bind: false,
            graph: ComponentGraph::new(),
            settings: RigSettings::default(),
            factory: CurveFactory::default(),
            state: LifecycleState::Empty,
            root: None,
            generated: BTreeMap::new(),
        }
    }

    pub fn with_graph(mut self, graph: ComponentGraph) -> Self {
        self.graph = graph;
        self
    }

    pub fn with_settings(mut self, settings: RigSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_factory(mut self, factory: CurveFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_bake_on_bind(mut self, bake_on_bind: bool) -> Self {
        self.bake_on_bind = bake_on_bind;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the rig was loaded from or last saved to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: Option<PathBuf>) {
        self.path = path;
    }

    pub fn bake_on_bind(&self) -> bool {
        self.bake_on_bind
    }

    pub fn set_bake_on_bind(&mut self, bake_on_bind: bool) {
        self.bake_on_bind = bake_on_bind;
    }

    pub fn graph(&self) -> &ComponentGraph {
        &self.graph
    }

    /// Graph edits take effect on the next [`Rig::preview`].
    pub fn graph_mut(&mut self) -> &mut ComponentGraph {
        &mut self.graph
    }

    pub fn settings(&self) -> &RigSettings {
        &self.settings
    }

    pub fn factory(&self) -> &CurveFactory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut CurveFactory {
        &mut self.factory
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Top group holding every generated node.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn generated(&self, name: &str) -> Option<&GeneratedComponent> {
        self.generated.get(name)
    }

    /// Generated components keyed by name.
    pub fn generated_components(&self) -> &BTreeMap<String, GeneratedComponent> {
        &self.generated
    }

    /// Removes the attachment from controls to targets. The controls keep
    /// their keys and each target returns to its own animation.
    pub fn unbind(&mut self, scene: &mut dyn Scene) -> RigResult<()> {
        if self.state != LifecycleState::Bound {
            return Err(BindError::InvalidState {
                operation: "unbind",
                state: self.state,
            }
            .into());
        }
        self.detach(scene)?;
        self.state = LifecycleState::Previewed;
        tracing::info!(rig = %self.name, "unbound");
        Ok(())
    }

    /// Deletes every generated node. The target skeleton is left alone.
    pub fn remove(&mut self, scene: &mut dyn Scene) -> RigResult<()> {
        if self.state == LifecycleState::Bound {
            self.detach(scene)?;
        }
        self.teardown(scene)?;
        self.state = LifecycleState::Empty;
        tracing::info!(rig = %self.name, "removed");
        Ok(())
    }

    /// Switches a component's parent or upright space at `frame` without
    /// moving its main control.
    pub fn switch_space(
        &mut self,
        scene: &mut dyn Scene,
        component: &str,
        channel: SpaceChannel,
        label: &str,
        frame: Frame,
    ) -> RigResult<()> {
        let generated = self.generated.get(component).ok_or_else(|| {
            RigError::reference(format!(
                "component '{}' is not generated in rig '{}'",
                component, self.name
            ))
        })?;
        space::switch_space(scene, generated, channel, label, frame)
    }

    /// Problems that would stop [`Rig::bind`], one per component.
    pub fn readiness(&self, scene: &dyn Scene) -> Vec<BindError> {
        self.graph
            .iter()
            .filter(|component| component.base.enabled)
            .filter_map(|component| bind::check_targets(scene, component).err())
            .collect()
    }

    /// True when every enabled component has the targets its kind needs.
    pub fn is_ready(&self, scene: &dyn Scene) -> bool {
        self.readiness(scene).is_empty()
    }

    /// Removes every binding record and forgets them.
    fn detach(&mut self, scene: &mut dyn Scene) -> RigResult<()> {
        for generated in self.generated.values_mut() {
            for id in generated.bindings.drain(..) {
                if scene.constraint(id).is_some() {
                    scene.remove_constraint(id)?;
                }
            }
        }
        Ok(())
    }

    fn teardown(&mut self, scene: &mut dyn Scene) -> RigResult<()> {
        if let Some(root) = self.root.take() {
            if scene.contains(root) {
                scene.delete_node(root)?;
            }
        }
        self.generated.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ComponentKind};
    use crate::scene::{MemoryScene, NodeKind};

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::Previewed.to_string(), "previewed");
        assert_eq!(LifecycleState::default(), LifecycleState::Empty);
    }

    #[test]
    fn test_unbind_requires_bound() {
        let mut scene = MemoryScene::new();
        let mut rig = Rig::new("hero");
        let err = rig.unbind(&mut scene).unwrap_err();
        assert!(matches!(
            err,
            RigError::Bind(BindError::InvalidState {
                operation: "unbind",
                state: LifecycleState::Empty
            })
        ));
    }

    #[test]
    fn test_remove_leaves_skeleton() {
        let mut scene = MemoryScene::new();
        let joint = scene.create_node("hand", NodeKind::Joint, None).unwrap();
        let mut rig = Rig::new("hero");
        rig.graph_mut()
            .add(Component::new("hand", ComponentKind::Fk).with_target("hand"))
            .unwrap();
        rig.preview(&mut scene).unwrap();
        assert!(rig.root().is_some());

        rig.remove(&mut scene).unwrap();
        assert_eq!(rig.state(), LifecycleState::Empty);
        assert!(rig.generated("hand").is_none());
        assert_eq!(scene.roots(), vec![joint]);
    }

    #[test]
    fn test_readiness_reports_missing_target() {
        let scene = MemoryScene::new();
        let mut rig = Rig::new("hero");
        rig.graph_mut()
            .add(Component::new("hand", ComponentKind::Fk))
            .unwrap();
        rig.graph_mut()
            .add(Component::new("root", ComponentKind::Basic))
            .unwrap();
        let problems = rig.readiness(&scene);
        assert_eq!(problems.len(), 1);
        assert!(matches!(&problems[0], BindError::MissingTarget { component } if component == "hand"));
        assert!(!rig.is_ready(&scene));
    }
}
