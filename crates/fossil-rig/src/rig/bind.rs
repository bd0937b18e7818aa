//! Attaching generated controls to their targets.
//!
//! Binding is planned in full before anything touches the scene: topology is
//! checked, every constraint record and its offset is computed from the
//! current pose, and exclusive ownership of each driven node is verified.
//! Only then are records added. A failure while adding removes the records
//! added so far.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;

use super::generate::{resolve_targets, TWIST};
use super::{BakeProgress, LifecycleState, Rig};
use crate::component::{Component, ControlRole, GeneratedComponent, KindParams};
use crate::error::{BindError, RigError, RigResult};
use crate::scene::{
    world_transform, Constraint, ConstraintId, IkMethod, IkSolver, NodeId, Scene,
};
use crate::transform::EPSILON;

/// Checks a component's target names against the scene: chain length,
/// required target, existence and parent links of IK chains.
pub(super) fn check_targets(scene: &dyn Scene, component: &Component) -> Result<(), BindError> {
    let name = component.name();
    let kind = component.kind();
    let targets = component.targets();

    let required = kind.chain_requirement();
    if !required.accepts(targets.len()) {
        return Err(BindError::ChainLength {
            component: name.to_string(),
            kind,
            required,
            found: targets.len(),
        });
    }
    if kind.requires_target() && targets.is_empty() {
        return Err(BindError::MissingTarget {
            component: name.to_string(),
        });
    }

    let mut chain = Vec::with_capacity(targets.len());
    for target in &targets {
        let node = scene.find(target).ok_or_else(|| BindError::UnknownTarget {
            component: name.to_string(),
            target: target.clone(),
        })?;
        let joint = if component.is_leaf_mode() {
            scene
                .parent(node)
                .ok()
                .flatten()
                .ok_or_else(|| BindError::BrokenChain {
                    component: name.to_string(),
                    parent: "<none>".to_string(),
                    child: target.clone(),
                })?
        } else {
            node
        };
        chain.push(joint);
    }

    if kind.is_ik() {
        for pair in chain.windows(2) {
            if scene.parent(pair[1]).ok().flatten() != Some(pair[0]) {
                return Err(BindError::BrokenChain {
                    component: name.to_string(),
                    parent: label(scene, pair[0]),
                    child: label(scene, pair[1]),
                });
            }
        }
    }
    Ok(())
}

fn label(scene: &dyn Scene, node: NodeId) -> String {
    scene.node_name(node).unwrap_or_else(|_| node.to_string())
}

// =============================================================================
// Constraint records
// =============================================================================

fn parent_record(scene: &dyn Scene, driver: NodeId, driven: NodeId) -> RigResult<Constraint> {
    let driver_world = world_transform(scene, driver)?.rigid();
    let driven_world = world_transform(scene, driven)?.rigid();
    Ok(Constraint::Parent {
        driver,
        driven,
        offset: driver_world.inverse().mul_transform(&driven_world),
    })
}

fn orient_record(scene: &dyn Scene, driver: NodeId, driven: NodeId) -> RigResult<Constraint> {
    let driver_world = world_transform(scene, driver)?;
    let driven_world = world_transform(scene, driven)?;
    Ok(Constraint::Orient {
        driver,
        driven,
        offset: (driver_world.rotation.inverse() * driven_world.rotation).normalize(),
    })
}

fn scale_record(scene: &dyn Scene, driver: NodeId, driven: NodeId) -> RigResult<Constraint> {
    let driver_scale = world_transform(scene, driver)?.scale;
    let driven_scale = scene.local_transform(driven)?.scale;
    let mut offset = glam::DVec3::ONE;
    for axis in 0..3 {
        if driver_scale[axis].abs() > EPSILON {
            offset[axis] = driven_scale[axis] / driver_scale[axis];
        }
    }
    Ok(Constraint::Scale {
        driver,
        driven,
        offset,
    })
}

/// Records attaching one component, offsets taken from the current pose.
fn plan_records(
    scene: &dyn Scene,
    component: &Component,
    generated: &GeneratedComponent,
) -> RigResult<Vec<Constraint>> {
    let main = generated.main();
    let control = |role| generated.control(role).map(|c| c.control);
    let joints = &generated.structural;
    let twist = Some((main, TWIST.to_string()));
    let mut records = Vec::new();

    match &component.params {
        KindParams::Basic | KindParams::Fk => {
            if let Some(&target) = joints.first() {
                records.push(parent_record(scene, main, target)?);
            }
        }
        KindParams::Scale => {
            if let Some(&target) = joints.first() {
                records.push(parent_record(scene, main, target)?);
                records.push(scale_record(scene, main, target)?);
            }
        }
        KindParams::AimFk(_) => {
            if let Some(&target) = joints.first() {
                records.push(parent_record(scene, main, target)?);
                if let Some(aim) = control(ControlRole::Aim) {
                    records.push(Constraint::Aim {
                        target: aim,
                        driven: target,
                        axis: component.base.aim_axis,
                    });
                }
            }
        }
        KindParams::MultiFk(_) => {
            for (index, &joint) in joints.iter().enumerate() {
                if let Some(child) = control(ControlRole::Child(index)) {
                    records.push(parent_record(scene, child, joint)?);
                }
            }
        }
        KindParams::SimpleIk(_)
        | KindParams::StandardIk(_)
        | KindParams::ComplexIk(_)
        | KindParams::LegIk(_) => {
            let (Some(chain), Some(&end)) = (joints.get(..3), joints.get(2)) else {
                return Err(stale(component));
            };
            if let (KindParams::ComplexIk(_), Some(base)) = (&component.params, control(ControlRole::Base)) {
                records.push(parent_record(scene, base, chain[0])?);
            }
            records.push(Constraint::Ik(IkSolver {
                chain: chain.to_vec(),
                effector: main,
                pole: control(ControlRole::Pole),
                bend_hint: generated.bend_hint,
                twist,
                method: IkMethod::TwoBone,
            }));
            records.push(orient_record(scene, main, end)?);
            if let (KindParams::LegIk(_), Some(ball), Some(&toe)) =
                (&component.params, control(ControlRole::Ball), joints.get(3))
            {
                records.push(orient_record(scene, ball, toe)?);
            }
        }
        KindParams::SpineIk(_) | KindParams::MultiIk(_) => {
            let (Some(&start), Some(&end)) = (joints.first(), joints.last()) else {
                return Err(stale(component));
            };
            if let Some(base) = control(ControlRole::Base) {
                records.push(parent_record(scene, base, start)?);
            }
            records.push(Constraint::Ik(IkSolver {
                chain: joints.clone(),
                effector: main,
                pole: None,
                bend_hint: generated.bend_hint,
                twist,
                method: IkMethod::Chain,
            }));
            records.push(orient_record(scene, main, end)?);
        }
    }

    if let Some(plan) = &generated.stretch {
        records.extend(plan.drivers().into_iter().map(Constraint::Stretch));
    }
    Ok(records)
}

fn stale(component: &Component) -> RigError {
    RigError::validation(format!(
        "component '{}' changed since the last preview; preview again before binding",
        component.name()
    ))
}

/// Every driven node must be free in the scene and claimed by one component.
fn check_exclusive(scene: &dyn Scene, plans: &[(String, Vec<Constraint>)]) -> Result<(), BindError> {
    let mut claimed: BTreeMap<NodeId, &str> = BTreeMap::new();
    for (component, records) in plans {
        let driven: BTreeSet<NodeId> = records.iter().flat_map(Constraint::driven).collect();
        for node in driven {
            let taken = !scene.constraints_on(node).is_empty()
                || claimed.get(&node).is_some_and(|owner| *owner != component.as_str());
            if taken {
                return Err(BindError::AlreadyDriven {
                    component: component.clone(),
                    target: label(scene, node),
                });
            }
            claimed.insert(node, component.as_str());
        }
    }
    Ok(())
}

// =============================================================================
// Bind
// =============================================================================

impl Rig {
    /// Attaches every generated component to its targets.
    ///
    /// Valid from `Previewed`. Topology is checked before anything changes.
    /// With bake-on-bind the targets' animation is baked onto the controls
    /// first; if attaching then fails the bake is rolled back too.
    pub fn bind(&mut self, scene: &mut dyn Scene) -> RigResult<()> {
        let _span = tracing::info_span!("bind", rig = %self.name).entered();
        if self.state != LifecycleState::Previewed {
            return Err(BindError::InvalidState {
                operation: "bind",
                state: self.state,
            }
            .into());
        }
        self.check_bindable(scene)?;

        let snapshot = if self.bake_on_bind {
            let (report, snapshot) =
                self.bake_inner(scene, &mut |_: BakeProgress| ControlFlow::Continue(()))?;
            tracing::debug!(frames = report.frames, keys = report.keys, "baked before bind");
            Some(snapshot)
        } else {
            None
        };

        if let Err(err) = self.attach(scene) {
            if let Some(snapshot) = snapshot {
                snapshot.restore(scene)?;
            }
            return Err(err);
        }
        Ok(())
    }

    fn check_bindable(&self, scene: &dyn Scene) -> RigResult<()> {
        for (name, generated) in &self.generated {
            let component = self.graph.get(name).ok_or_else(|| {
                RigError::validation(format!(
                    "component '{}' was removed since the last preview",
                    name
                ))
            })?;
            check_targets(scene, component)?;
            let current = resolve_targets(scene, component)?;
            if current.targets != generated.targets || current.structural != generated.structural {
                return Err(stale(component));
            }
        }
        Ok(())
    }

    /// Adds every binding record. Nothing is left behind on failure.
    pub(super) fn attach(&mut self, scene: &mut dyn Scene) -> RigResult<()> {
        self.check_bindable(scene)?;
        for generated in self.generated.values_mut() {
            if let Some(plan) = &mut generated.stretch {
                plan.recapture(scene)?;
            }
        }

        let mut plans = Vec::with_capacity(self.generated.len());
        for (name, generated) in &self.generated {
            if let Some(component) = self.graph.get(name) {
                plans.push((name.clone(), plan_records(scene, component, generated)?));
            }
        }
        check_exclusive(scene, &plans)?;

        let mut attached: Vec<(String, ConstraintId)> = Vec::new();
        for (name, records) in plans {
            for record in records {
                match scene.add_constraint(record) {
                    Ok(id) => attached.push((name.clone(), id)),
                    Err(err) => {
                        for (_, id) in attached {
                            scene.remove_constraint(id)?;
                        }
                        return Err(err.into());
                    }
                }
            }
        }

        let count = attached.len();
        for (name, id) in attached {
            if let Some(generated) = self.generated.get_mut(&name) {
                generated.bindings.push(id);
            }
        }
        self.state = LifecycleState::Bound;
        tracing::info!(rig = %self.name, records = count, "bound");
        Ok(())
    }
}
