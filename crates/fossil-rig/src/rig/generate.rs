//! Regeneration: capture live edits, tear down, rebuild in topological order
//! and restore the captured animation.

use std::collections::BTreeMap;

use glam::DVec3;

use super::{LifecycleState, Rig};
use crate::component::{
    Component, ControlRole, GeneratedComponent, GeneratedControl, KindParams, PoleParams,
};
use crate::curve::{self, ControlColor, ControlShape, CurveError, CurveFactory};
use crate::error::{RegenerateWarning, RigError, RigResult, WarningCode};
use crate::graph::ComponentGraph;
use crate::scene::{parent_world, world_transform, AttributeKind, Frame, NodeId, NodeKind, Scene};
use crate::space::{self, CapturedSelector};
use crate::stretch::{StretchInputs, StretchPlan};
use crate::transform::{perpendicular, pole_position, relative, Axis, Transform};

/// Scalar attribute on IK main controls: bend-plane twist in degrees.
pub(crate) const TWIST: &str = "twist";

// =============================================================================
// Target resolution
// =============================================================================

/// Scene nodes behind a component's target names.
#[derive(Debug, Clone, Default)]
pub(super) struct ResolvedTargets {
    /// Nodes named by the component, root first.
    pub targets: Vec<NodeId>,
    /// Joints controls sit on. The targets' parents in leaf-joint mode.
    pub structural: Vec<NodeId>,
}

pub(super) fn resolve_targets(scene: &dyn Scene, component: &Component) -> RigResult<ResolvedTargets> {
    let mut targets = Vec::new();
    for name in component.targets() {
        let node = scene.find(&name).ok_or_else(|| {
            RigError::reference(format!(
                "component '{}' target '{}' does not exist in the scene",
                component.name(),
                name
            ))
        })?;
        targets.push(node);
    }
    let structural = if component.is_leaf_mode() {
        let mut parents = Vec::with_capacity(targets.len());
        for target in &targets {
            let parent = scene.parent(*target)?.ok_or_else(|| {
                RigError::reference(format!(
                    "component '{}' leaf joint {} has no parent joint",
                    component.name(),
                    target
                ))
            })?;
            parents.push(parent);
        }
        parents
    } else {
        targets.clone()
    };
    Ok(ResolvedTargets {
        targets,
        structural,
    })
}

// =============================================================================
// Snapshots
// =============================================================================

/// Local transform and transform keys of one node.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct ChannelSnapshot {
    pub local: Transform,
    pub keys: Vec<(Frame, Transform)>,
}

impl ChannelSnapshot {
    pub fn read(scene: &dyn Scene, node: NodeId) -> RigResult<Self> {
        Ok(Self {
            local: scene.local_transform(node)?,
            keys: scene.transform_keys(node)?,
        })
    }

    pub fn write(&self, scene: &mut dyn Scene, node: NodeId) -> RigResult<()> {
        scene.clear_transform_keys(node)?;
        scene.set_local_transform(node, self.local)?;
        for (frame, transform) in &self.keys {
            scene.set_transform_key(node, *frame, *transform)?;
        }
        Ok(())
    }
}

/// Value and keys of one scalar attribute.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct ScalarSnapshot {
    pub value: f64,
    pub keys: Vec<(Frame, f64)>,
}

impl ScalarSnapshot {
    pub fn read(scene: &dyn Scene, node: NodeId, attribute: &str) -> RigResult<Self> {
        Ok(Self {
            value: scene.attribute(node, attribute)?,
            keys: scene.attribute_keys(node, attribute)?,
        })
    }

    pub fn write(&self, scene: &mut dyn Scene, node: NodeId, attribute: &str) -> RigResult<()> {
        scene.clear_attribute_keys(node, attribute)?;
        scene.set_attribute(node, attribute, self.value)?;
        for (frame, value) in &self.keys {
            scene.set_attribute_key(node, attribute, *frame, *value)?;
        }
        Ok(())
    }
}

/// Animation read from the previous generation, by component name.
#[derive(Debug, Default)]
struct CapturedAnimation {
    controls: BTreeMap<(String, ControlRole), ChannelSnapshot>,
    selectors: BTreeMap<String, Vec<CapturedSelector>>,
    twist: BTreeMap<String, ScalarSnapshot>,
}

// =============================================================================
// Preview
// =============================================================================

impl Rig {
    /// Regenerates every enabled component and returns the warnings found.
    ///
    /// Valid from any state. Control animation, selector keys and custom
    /// curve edits survive. A bound rig is re-bound without baking; if that
    /// fails the rig is left previewed and the error is returned.
    pub fn preview(&mut self, scene: &mut dyn Scene) -> RigResult<Vec<RegenerateWarning>> {
        let _span = tracing::info_span!("preview", rig = %self.name).entered();

        let order: Vec<String> = self
            .graph
            .topological_order()?
            .into_iter()
            .map(|component| component.name().to_string())
            .collect();
        let mut resolved = BTreeMap::new();
        for component in self.graph.iter().filter(|c| c.base.enabled) {
            resolved.insert(
                component.name().to_string(),
                resolve_targets(scene, component)?,
            );
        }

        let rebind = self.state == LifecycleState::Bound;
        if rebind {
            self.detach(scene)?;
        }
        let captured = self.capture(scene)?;
        self.teardown(scene)?;

        let mut warnings = Vec::new();
        if let Err(err) = self.generate(scene, &order, &resolved, &captured, &mut warnings) {
            self.teardown(scene)?;
            self.state = LifecycleState::Empty;
            return Err(err);
        }
        self.state = LifecycleState::Previewed;

        for warning in &warnings {
            tracing::warn!(code = %warning.code, component = %warning.component, "{}", warning.message);
        }
        tracing::info!(
            components = self.generated.len(),
            warnings = warnings.len(),
            "previewed"
        );

        if rebind {
            self.attach(scene)?;
        }
        Ok(warnings)
    }

    fn capture(&mut self, scene: &dyn Scene) -> RigResult<CapturedAnimation> {
        let mut captured = CapturedAnimation::default();
        for (name, generated) in &self.generated {
            let main = generated.main();
            if !scene.contains(main) {
                continue;
            }
            for control in &generated.controls {
                if scene.contains(control.control) {
                    captured.controls.insert(
                        (name.clone(), control.role),
                        ChannelSnapshot::read(scene, control.control)?,
                    );
                }
            }
            captured
                .selectors
                .insert(name.clone(), space::capture_selectors(scene, generated)?);
            if scene.has_attribute(main, TWIST) {
                captured
                    .twist
                    .insert(name.clone(), ScalarSnapshot::read(scene, main, TWIST)?);
            }

            let Some(component) = self.graph.get_mut(name) else {
                continue;
            };
            if component.base.use_custom_curve {
                for control in &generated.controls {
                    if scene.contains(control.control) {
                        let geometry = curve::capture(scene, control.control)?;
                        component
                            .base
                            .custom_geometry
                            .insert(control.role.to_string(), geometry);
                    }
                }
            }
        }
        Ok(captured)
    }

    fn generate(
        &mut self,
        scene: &mut dyn Scene,
        order: &[String],
        resolved: &BTreeMap<String, ResolvedTargets>,
        captured: &CapturedAnimation,
        warnings: &mut Vec<RegenerateWarning>,
    ) -> RigResult<()> {
        let root = scene.create_node(&format!("{}_rig", self.name), NodeKind::Group, None)?;
        self.root = Some(root);

        for name in order {
            let Some(component) = self.graph.get(name) else {
                continue;
            };
            if !component.base.enabled {
                warnings.push(RegenerateWarning::new(
                    WarningCode::ComponentDisabled,
                    name,
                    "component is disabled and was skipped",
                ));
                continue;
            }
            let Some(targets) = resolved.get(name) else {
                continue;
            };
            let context = BuildContext {
                graph: &self.graph,
                factory: &self.factory,
                generated: &self.generated,
                root,
            };
            let generated = build_component(scene, &context, component, targets, warnings)?;
            tracing::debug!(
                component = %name,
                kind = %generated.kind,
                controls = generated.controls.len(),
                "component generated"
            );
            self.generated.insert(name.clone(), generated);
        }

        self.restore(scene, captured, warnings)
    }

    fn restore(
        &self,
        scene: &mut dyn Scene,
        captured: &CapturedAnimation,
        warnings: &mut Vec<RegenerateWarning>,
    ) -> RigResult<()> {
        for (name, generated) in &self.generated {
            for control in &generated.controls {
                if let Some(snapshot) = captured.controls.get(&(name.clone(), control.role)) {
                    snapshot.write(scene, control.control)?;
                }
            }
            if let Some(selectors) = captured.selectors.get(name) {
                space::restore_selectors(scene, generated, selectors, warnings)?;
            }
            let main = generated.main();
            if let Some(twist) = captured.twist.get(name) {
                if scene.has_attribute(main, TWIST) {
                    twist.write(scene, main, TWIST)?;
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Component construction
// =============================================================================

struct BuildContext<'a> {
    graph: &'a ComponentGraph,
    factory: &'a CurveFactory,
    generated: &'a BTreeMap<String, GeneratedComponent>,
    root: NodeId,
}

/// What a control hangs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Space,
    Control(ControlRole),
}

/// A control to create, before any node exists.
#[derive(Debug, Clone)]
struct ControlSpec {
    role: ControlRole,
    anchor: Anchor,
    /// Rest world transform.
    placement: Transform,
    shape: ControlShape,
    scale: f64,
    color: ControlColor,
}

fn build_component(
    scene: &mut dyn Scene,
    context: &BuildContext<'_>,
    component: &Component,
    targets: &ResolvedTargets,
    warnings: &mut Vec<RegenerateWarning>,
) -> RigResult<GeneratedComponent> {
    let name = component.name();
    let base = &component.base;

    let group = scene.create_node(&format!("{}_grp", name), NodeKind::Group, Some(context.root))?;
    let space_node = scene.create_node(&format!("{}_space", name), NodeKind::Group, Some(group))?;
    let spaces = space::resolve(component, context.graph, context.generated, warnings);

    let mut joints = Vec::with_capacity(targets.structural.len());
    for joint in &targets.structural {
        joints.push(world_transform(scene, *joint)?.rigid());
    }
    let specs = control_specs(component, &joints);

    let mut controls: Vec<GeneratedControl> = Vec::with_capacity(specs.len());
    for spec in &specs {
        let parent = match spec.anchor {
            Anchor::Space => space_node,
            Anchor::Control(role) => controls
                .iter()
                .find(|c| c.role == role)
                .map(|c| c.control)
                .unwrap_or(space_node),
        };
        let buffer = scene.create_node(
            &format!("{}_{}_buf", name, spec.role),
            NodeKind::Group,
            Some(parent),
        )?;
        let control = scene.create_node(
            &format!("{}_{}_ctl", name, spec.role),
            NodeKind::Curve,
            Some(buffer),
        )?;
        let custom = if base.use_custom_curve {
            base.custom_geometry.get(&spec.role.to_string())
        } else {
            None
        };
        let geometry = match context.factory.build(&spec.shape, spec.scale, base.aim_axis, custom) {
            Ok(geometry) => geometry,
            Err(CurveError::UnknownLibraryShape(shape)) => {
                warnings.push(RegenerateWarning::new(
                    WarningCode::UnknownShape,
                    name,
                    format!("{} control uses unknown library shape '{}'; using circle", spec.role, shape),
                ));
                context
                    .factory
                    .build(&ControlShape::Circle, spec.scale, base.aim_axis, None)
                    .map_err(|err| RigError::validation(err.to_string()))?
            }
            Err(err) => return Err(RigError::validation(err.to_string())),
        };
        scene.set_curve(control, geometry, spec.color)?;
        controls.push(GeneratedControl {
            role: spec.role,
            control,
            buffer,
        });
    }
    let main = controls
        .first()
        .map(|c| c.control)
        .ok_or_else(|| RigError::validation(format!("component '{}' produced no controls", name)))?;

    let space_constraint = space::wire(scene, space_node, main, &spaces)?;

    // Buffers absorb the rest placement so every control starts at identity.
    for (spec, control) in specs.iter().zip(&controls) {
        let parent = parent_world(scene, control.buffer)?;
        scene.set_local_transform(control.buffer, relative(parent, spec.placement.to_matrix()))?;
    }

    let kind = component.kind();
    if kind.is_ik() {
        scene.add_attribute(main, TWIST, AttributeKind::Scalar, 0.0)?;
    }

    let main_rest = specs.first().map(|s| s.placement).unwrap_or_default();
    let bend_hint = main_rest.rotation.inverse() * bend_direction(&joints, base.aim_axis);

    let stretch = match component.chain() {
        Some(chain) => {
            let children: Vec<NodeId> = controls
                .iter()
                .filter(|c| matches!(c.role, ControlRole::Child(_)))
                .map(|c| c.control)
                .collect();
            let base_control = controls
                .iter()
                .find(|c| c.role == ControlRole::Base)
                .map(|c| c.control);
            StretchPlan::plan(
                scene,
                StretchInputs {
                    kind,
                    params: &chain.stretch,
                    axis: base.aim_axis,
                    leaf: chain.leaf_joint,
                    targets: &targets.targets,
                    structural: &targets.structural,
                    main,
                    base: base_control,
                    children: &children,
                    reference: Some(space_node),
                },
            )?
        }
        None => None,
    };

    Ok(GeneratedComponent {
        name: name.to_string(),
        kind,
        group,
        space: space_node,
        space_constraint,
        spaces,
        controls,
        targets: targets.targets.clone(),
        structural: targets.structural.clone(),
        stretch,
        bend_hint,
        bindings: Vec::new(),
    })
}

/// Controls of one component, parents first. `joints` are the rigid rest
/// transforms of the structural joints; missing joints place at the origin.
fn control_specs(component: &Component, joints: &[Transform]) -> Vec<ControlSpec> {
    let base = &component.base;
    let joint = |index: usize| {
        joints
            .get(index)
            .or(joints.last())
            .copied()
            .unwrap_or(Transform::IDENTITY)
    };
    let last = joints.last().copied().unwrap_or(Transform::IDENTITY);
    let spec = |role, anchor, placement, shape: &ControlShape, scale| ControlSpec {
        role,
        anchor,
        placement,
        shape: shape.clone(),
        scale,
        color: base.control_color,
    };

    let main_at = match &component.params {
        KindParams::SimpleIk(_)
        | KindParams::StandardIk(_)
        | KindParams::ComplexIk(_)
        | KindParams::LegIk(_) => joint(2),
        KindParams::SpineIk(_) | KindParams::MultiIk(_) => last,
        _ => joint(0),
    };
    let mut specs = vec![spec(
        ControlRole::Main,
        Anchor::Space,
        main_at,
        &base.control_shape,
        base.control_scale,
    )];

    let pole = |specs: &mut Vec<ControlSpec>, params: &PoleParams| {
        if params.no_flip_knee {
            return;
        }
        let fallback = joint(1).rotation * secondary_axis(base.aim_axis).vector();
        let position = pole_position(
            joint(0).translation,
            joint(1).translation,
            joint(2).translation,
            params.pole_distance,
            fallback,
        );
        specs.push(spec(
            ControlRole::Pole,
            Anchor::Space,
            Transform::from_translation(position),
            &params.pole_shape,
            params.pole_scale,
        ));
    };

    match &component.params {
        KindParams::MultiFk(params) => {
            for (index, placement) in joints.iter().enumerate() {
                let over = params.child_overrides.get(&index);
                let anchor = if index == 0 {
                    Anchor::Control(ControlRole::Main)
                } else {
                    Anchor::Control(ControlRole::Child(index - 1))
                };
                let mut child = spec(
                    ControlRole::Child(index),
                    anchor,
                    *placement,
                    over.and_then(|o| o.shape.as_ref()).unwrap_or(&params.child_shape),
                    over.and_then(|o| o.scale).unwrap_or(params.child_scale),
                );
                if let Some(color) = over.and_then(|o| o.color) {
                    child.color = color;
                }
                specs.push(child);
            }
        }
        KindParams::AimFk(params) => {
            let offset = Transform::from_translation(base.aim_axis.vector() * params.aim_distance);
            specs.push(spec(
                ControlRole::Aim,
                Anchor::Control(ControlRole::Main),
                main_at.mul_transform(&offset),
                &params.aim_shape,
                params.aim_scale,
            ));
        }
        KindParams::StandardIk(params) => pole(&mut specs, &params.pole),
        KindParams::ComplexIk(params) => {
            pole(&mut specs, &params.pole);
            specs.push(spec(
                ControlRole::Base,
                Anchor::Space,
                joint(0),
                &params.base_shape,
                params.base_scale,
            ));
        }
        KindParams::LegIk(params) => {
            pole(&mut specs, &params.pole);
            specs.push(spec(
                ControlRole::Ball,
                Anchor::Control(ControlRole::Main),
                joint(3),
                &params.ball_shape,
                params.ball_scale,
            ));
        }
        KindParams::SpineIk(params) => specs.push(spec(
            ControlRole::Base,
            Anchor::Space,
            joint(0),
            &params.base_shape,
            params.base_scale,
        )),
        _ => {}
    }
    specs
}

/// Axis used for the bend direction when a chain is straight.
pub(super) fn secondary_axis(axis: Axis) -> Axis {
    match axis {
        Axis::X => Axis::Y,
        Axis::Y => Axis::Z,
        Axis::Z => Axis::X,
    }
}

/// World direction a chain bends in: the middle joint's offset from the
/// start-to-end line. A straight chain uses the middle joint's secondary
/// axis.
pub(super) fn bend_direction(joints: &[Transform], axis: Axis) -> DVec3 {
    if joints.len() < 3 {
        return DVec3::Y;
    }
    let start = joints[0].translation;
    let mid = joints[joints.len() / 2];
    let end = joints[joints.len() - 1].translation;
    let chain = (end - start).normalize_or_zero();
    let bend = perpendicular(mid.translation - start, chain).normalize_or_zero();
    if bend != DVec3::ZERO {
        return bend;
    }
    let fallback =
        perpendicular(mid.rotation * secondary_axis(axis).vector(), chain).normalize_or_zero();
    if fallback != DVec3::ZERO {
        fallback
    } else if chain != DVec3::ZERO {
        chain.any_orthonormal_vector()
    } else {
        DVec3::Y
    }
}
