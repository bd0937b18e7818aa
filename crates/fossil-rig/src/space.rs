//! Parent and upright space resolution, selector wiring and pop-free
//! switching.
//!
//! Each generated component has a space node driven by a
//! [`SpaceConstraint`]: translation and scale come from the selected parent
//! candidate, rotation from the selected upright candidate. With switching
//! enabled the main control carries keyable enum attributes naming the
//! candidates.

use std::collections::BTreeMap;

use crate::component::{Component, ControlRole, GeneratedComponent, SpaceRef};
use crate::error::{RegenerateWarning, RigError, RigResult, WarningCode};
use crate::graph::ComponentGraph;
use crate::scene::{
    AttributeKind, Constraint, ConstraintId, Frame, NodeId, Scene, SpaceConstraint, SpaceSource,
};
use crate::transform::relative;

/// Label of the world candidate.
pub const WORLD: &str = "world";

/// Which half of the space frame a selector drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpaceChannel {
    Parent,
    Upright,
}

impl SpaceChannel {
    /// Name of the selector attribute on the main control.
    pub fn attribute(&self) -> &'static str {
        match self {
            SpaceChannel::Parent => "parentSpace",
            SpaceChannel::Upright => "uprightSpace",
        }
    }

    pub fn both() -> [SpaceChannel; 2] {
        [SpaceChannel::Parent, SpaceChannel::Upright]
    }
}

/// A selectable frame: the world origin or another component's main control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceCandidate {
    pub label: String,
    pub node: Option<NodeId>,
}

impl SpaceCandidate {
    pub fn world() -> Self {
        Self {
            label: WORLD.to_string(),
            node: None,
        }
    }
}

/// Candidate list for one channel and the index selected at rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceSelector {
    pub candidates: Vec<SpaceCandidate>,
    pub default: usize,
}

impl SpaceSelector {
    pub fn labels(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.label.clone()).collect()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.candidates.iter().position(|c| c.label == label)
    }

    fn source(&self, selector: Option<(NodeId, String)>) -> SpaceSource {
        SpaceSource {
            candidates: self.candidates.iter().map(|c| c.node).collect(),
            selector,
            default: self.default,
        }
    }
}

/// Parent and upright selectors of a generated component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSpaces {
    pub parent: SpaceSelector,
    pub upright: SpaceSelector,
    pub switchable: bool,
}

impl ResolvedSpaces {
    pub fn selector(&self, channel: SpaceChannel) -> &SpaceSelector {
        match channel {
            SpaceChannel::Parent => &self.parent,
            SpaceChannel::Upright => &self.upright,
        }
    }
}

/// Builds both selectors for `component` from the components generated so
/// far. Missing or disabled spaces fall back to world; missing candidates are
/// pruned. Every fallback is reported as a warning.
pub fn resolve(
    component: &Component,
    graph: &ComponentGraph,
    generated: &BTreeMap<String, GeneratedComponent>,
    warnings: &mut Vec<RegenerateWarning>,
) -> ResolvedSpaces {
    let name = component.name();
    let lookup = |space: &SpaceRef, channel: &str, warnings: &mut Vec<RegenerateWarning>| {
        match space.name() {
            None => SpaceCandidate::world(),
            Some(target) => match generated.get(target) {
                Some(g) => SpaceCandidate {
                    label: target.to_string(),
                    node: Some(g.main()),
                },
                None => {
                    warnings.push(RegenerateWarning::new(
                        WarningCode::SpaceFellBackToWorld,
                        name,
                        format!("{} space '{}' is not generated; using world", channel, target),
                    ));
                    SpaceCandidate::world()
                }
            },
        }
    };
    let parent = lookup(&component.base.parent_space, "parent", warnings);
    let upright = lookup(&component.base.upright_space, "upright", warnings);

    if !component.base.space_switch_enabled {
        return ResolvedSpaces {
            parent: SpaceSelector {
                candidates: vec![parent],
                default: 0,
            },
            upright: SpaceSelector {
                candidates: vec![upright],
                default: 0,
            },
            switchable: false,
        };
    }

    let mut extra = Vec::new();
    for candidate in &component.base.space_candidates {
        match generated.get(candidate) {
            Some(g) => extra.push(SpaceCandidate {
                label: candidate.clone(),
                node: Some(g.main()),
            }),
            None => {
                let reason = if graph.contains(candidate) {
                    "is not generated"
                } else {
                    "no longer exists"
                };
                warnings.push(RegenerateWarning::new(
                    WarningCode::PrunedCandidate,
                    name,
                    format!("space candidate '{}' {} and was dropped", candidate, reason),
                ));
            }
        }
    }

    let build = |declared: SpaceCandidate| {
        let mut candidates = vec![SpaceCandidate::world()];
        for candidate in std::iter::once(declared.clone()).chain(extra.iter().cloned()) {
            if !candidates.iter().any(|c| c.label == candidate.label) {
                candidates.push(candidate);
            }
        }
        let default = candidates
            .iter()
            .position(|c| c.label == declared.label)
            .unwrap_or(0);
        SpaceSelector {
            candidates,
            default,
        }
    };

    ResolvedSpaces {
        parent: build(parent),
        upright: build(upright),
        switchable: true,
    }
}

/// Adds the selector attributes (when switchable) and the space constraint.
pub fn wire(
    scene: &mut dyn Scene,
    space_node: NodeId,
    main: NodeId,
    spaces: &ResolvedSpaces,
) -> RigResult<ConstraintId> {
    let mut selector = |channel: SpaceChannel| -> RigResult<Option<(NodeId, String)>> {
        if !spaces.switchable {
            return Ok(None);
        }
        let choice = spaces.selector(channel);
        scene.add_attribute(
            main,
            channel.attribute(),
            AttributeKind::Enum(choice.labels()),
            choice.default as f64,
        )?;
        Ok(Some((main, channel.attribute().to_string())))
    };
    let parent = spaces.parent.source(selector(SpaceChannel::Parent)?);
    let upright = spaces.upright.source(selector(SpaceChannel::Upright)?);
    Ok(scene.add_constraint(Constraint::Space(SpaceConstraint {
        driven: space_node,
        parent,
        upright,
    }))?)
}

/// Switches a channel to `label` at `frame` without moving the control.
///
/// The selector is keyed at `frame` and the main control's local transform is
/// re-keyed so its world transform at `frame` is unchanged. When the selector
/// or the control had no keys yet, their current values are held with a key
/// at `frame - 1`.
pub fn switch_space(
    scene: &mut dyn Scene,
    generated: &GeneratedComponent,
    channel: SpaceChannel,
    label: &str,
    frame: Frame,
) -> RigResult<()> {
    if !generated.spaces.switchable {
        return Err(RigError::validation(format!(
            "component '{}' does not have space switching enabled",
            generated.name
        )));
    }
    let index = generated
        .spaces
        .selector(channel)
        .index_of(label)
        .ok_or_else(|| {
            RigError::reference(format!(
                "'{}' is not a {} space candidate of '{}'",
                label,
                channel.attribute(),
                generated.name
            ))
        })?;
    let main = generated.main();
    let buffer = generated
        .control(ControlRole::Main)
        .map(|c| c.buffer)
        .unwrap_or(generated.space);
    let attribute = channel.attribute();

    let restore = scene.current_frame();
    scene.set_current_frame(frame);
    let world = scene.world_matrix(main)?;

    if scene.attribute_keys(main, attribute)?.is_empty() {
        let value = scene.attribute(main, attribute)?;
        scene.set_attribute_key(main, attribute, frame - 1, value)?;
    }
    if scene.transform_keys(main)?.is_empty() {
        let local = scene.local_transform(main)?;
        scene.set_transform_key(main, frame - 1, local)?;
    }

    scene.set_attribute_key(main, attribute, frame, index as f64)?;
    let local = relative(scene.world_matrix(buffer)?, world);
    scene.set_transform_key(main, frame, local)?;
    scene.set_current_frame(restore);

    tracing::debug!(
        component = %generated.name,
        channel = attribute,
        space = label,
        frame,
        "space switched"
    );
    Ok(())
}

// =============================================================================
// Selector capture across regenerate
// =============================================================================

/// Selector keys and rest value, stored by candidate label.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedSelector {
    pub channel: SpaceChannel,
    pub value: Option<String>,
    pub keys: Vec<(Frame, Option<String>)>,
}

/// Reads the selector keys of a generated component by label.
pub fn capture_selectors(
    scene: &dyn Scene,
    generated: &GeneratedComponent,
) -> RigResult<Vec<CapturedSelector>> {
    let mut captured = Vec::new();
    if !generated.spaces.switchable {
        return Ok(captured);
    }
    let main = generated.main();
    for channel in SpaceChannel::both() {
        let attribute = channel.attribute();
        if !scene.has_attribute(main, attribute) {
            continue;
        }
        let selector = generated.spaces.selector(channel);
        let label = |value: f64| {
            let index = value.round();
            if index < 0.0 {
                return None;
            }
            selector
                .candidates
                .get(index as usize)
                .map(|c| c.label.clone())
        };
        let keys = scene
            .attribute_keys(main, attribute)?
            .into_iter()
            .map(|(frame, value)| (frame, label(value)))
            .collect();
        captured.push(CapturedSelector {
            channel,
            value: label(scene.attribute(main, attribute)?),
            keys,
        });
    }
    Ok(captured)
}

/// Re-applies captured selector keys to a regenerated component. Labels that
/// are no longer candidates select world.
pub fn restore_selectors(
    scene: &mut dyn Scene,
    generated: &GeneratedComponent,
    captured: &[CapturedSelector],
    warnings: &mut Vec<RegenerateWarning>,
) -> RigResult<()> {
    if !generated.spaces.switchable {
        return Ok(());
    }
    let main = generated.main();
    for entry in captured {
        let attribute = entry.channel.attribute();
        let selector = generated.spaces.selector(entry.channel);
        let mut remap = |label: &Option<String>, frame: Option<Frame>| -> f64 {
            let found = label.as_deref().and_then(|l| selector.index_of(l));
            match found {
                Some(index) => index as f64,
                None => {
                    let at = frame.map(|f| format!(" at frame {}", f)).unwrap_or_default();
                    warnings.push(RegenerateWarning::new(
                        WarningCode::KeyFellBackToWorld,
                        &generated.name,
                        format!(
                            "{} selected '{}'{} which is no longer a candidate; using world",
                            attribute,
                            label.as_deref().unwrap_or("?"),
                            at
                        ),
                    ));
                    selector.index_of(WORLD).unwrap_or(0) as f64
                }
            }
        };
        let value = remap(&entry.value, None);
        let keys: Vec<(Frame, f64)> = entry
            .keys
            .iter()
            .map(|(frame, label)| (*frame, remap(label, Some(*frame))))
            .collect();
        scene.set_attribute(main, attribute, value)?;
        for (frame, value) in keys {
            scene.set_attribute_key(main, attribute, frame, value)?;
        }
    }
    Ok(())
}
