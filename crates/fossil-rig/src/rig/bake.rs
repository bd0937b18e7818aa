//! Baking target animation onto controls.
//!
//! Each frame in the targets' keyed range is fitted per kind: the desired
//! world transform of every control is derived from the sampled joints, then
//! keyed as a local transform relative to the control's buffer. Controls are
//! visited parents first and components in topological order, so every
//! buffer is already fitted for the frame when its child is keyed.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;

use glam::DVec3;

use super::generate::{bend_direction, secondary_axis, ChannelSnapshot, ScalarSnapshot, TWIST};
use super::{LifecycleState, Rig};
use crate::component::{Component, ControlRole, GeneratedComponent, KindParams};
use crate::error::{BakeError, RigResult};
use crate::scene::{world_transform, Frame, NodeId, Scene};
use crate::space::SpaceChannel;
use crate::transform::{pole_position, relative, signed_angle, Transform};

/// Progress of a running bake, reported after each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BakeProgress {
    pub frame: Frame,
    /// Zero-based position of `frame` in the range.
    pub index: usize,
    pub total: usize,
}

/// Receives bake progress. Returning `Break` cancels the bake and rolls
/// back every key written so far.
pub trait BakeObserver {
    fn on_frame(&mut self, progress: BakeProgress) -> ControlFlow<()>;
}

impl<F> BakeObserver for F
where
    F: FnMut(BakeProgress) -> ControlFlow<()>,
{
    fn on_frame(&mut self, progress: BakeProgress) -> ControlFlow<()> {
        self(progress)
    }
}

/// Summary of a finished bake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BakeReport {
    pub frames: usize,
    pub first: Option<Frame>,
    pub last: Option<Frame>,
    /// Transform and attribute keys written.
    pub keys: usize,
}

/// Control channels as they were before a bake.
#[derive(Debug, Clone, Default)]
pub(super) struct BakeSnapshot {
    controls: Vec<(NodeId, ChannelSnapshot)>,
    twist: Vec<(NodeId, ScalarSnapshot)>,
}

impl BakeSnapshot {
    fn take(scene: &dyn Scene, generated: &BTreeMap<String, GeneratedComponent>) -> RigResult<Self> {
        let mut snapshot = Self::default();
        for component in generated.values() {
            for control in &component.controls {
                snapshot
                    .controls
                    .push((control.control, ChannelSnapshot::read(scene, control.control)?));
            }
            let main = component.main();
            if scene.has_attribute(main, TWIST) {
                snapshot
                    .twist
                    .push((main, ScalarSnapshot::read(scene, main, TWIST)?));
            }
        }
        Ok(snapshot)
    }

    pub(super) fn restore(&self, scene: &mut dyn Scene) -> RigResult<()> {
        for (node, channels) in &self.controls {
            channels.write(scene, *node)?;
        }
        for (node, twist) in &self.twist {
            twist.write(scene, *node, TWIST)?;
        }
        Ok(())
    }
}

impl Rig {
    /// Bakes the targets' animation onto the controls. See [`Rig::bake_with`].
    pub fn bake(&mut self, scene: &mut dyn Scene) -> RigResult<BakeReport> {
        self.bake_with(scene, &mut |_: BakeProgress| ControlFlow::Continue(()))
    }

    /// Bakes every frame in the union of the targets' key ranges, reporting
    /// progress to `observer`.
    ///
    /// Valid from `Previewed`. On failure or cancellation every control gets
    /// back the keys it had before the call. Targets without keys bake
    /// nothing.
    pub fn bake_with(
        &mut self,
        scene: &mut dyn Scene,
        observer: &mut dyn BakeObserver,
    ) -> RigResult<BakeReport> {
        self.bake_inner(scene, observer).map(|(report, _)| report)
    }

    pub(super) fn bake_inner(
        &mut self,
        scene: &mut dyn Scene,
        observer: &mut dyn BakeObserver,
    ) -> RigResult<(BakeReport, BakeSnapshot)> {
        let _span = tracing::info_span!("bake", rig = %self.name).entered();
        if self.state != LifecycleState::Previewed {
            return Err(BakeError::InvalidState { state: self.state }.into());
        }

        let order: Vec<String> = self
            .graph
            .topological_order()?
            .into_iter()
            .map(|component| component.name().to_string())
            .filter(|name| self.generated.contains_key(name))
            .collect();
        let snapshot = BakeSnapshot::take(scene, &self.generated)?;
        let Some((first, last)) = key_range(scene, self.generated.values())? else {
            tracing::info!("no target keys; nothing to bake");
            return Ok((BakeReport::default(), snapshot));
        };

        let restore_frame = scene.current_frame();
        let mut keys = 0;
        let result = self.bake_frames(scene, &order, first, last, observer, &mut keys);
        scene.set_current_frame(restore_frame);

        if let Err(err) = result {
            tracing::warn!(error = %err, "bake rolled back");
            snapshot.restore(scene)?;
            return Err(err);
        }
        let report = BakeReport {
            frames: (last - first + 1) as usize,
            first: Some(first),
            last: Some(last),
            keys,
        };
        tracing::info!(frames = report.frames, keys, first, last, "baked");
        Ok((report, snapshot))
    }

    fn bake_frames(
        &self,
        scene: &mut dyn Scene,
        order: &[String],
        first: Frame,
        last: Frame,
        observer: &mut dyn BakeObserver,
        keys: &mut usize,
    ) -> RigResult<()> {
        let total = (last - first + 1) as usize;
        for (index, frame) in (first..=last).enumerate() {
            scene.set_current_frame(frame);
            for name in order {
                let (Some(component), Some(generated)) =
                    (self.graph.get(name), self.generated.get(name))
                else {
                    continue;
                };
                *keys += fit_frame(scene, component, generated, frame, self.settings.bake_tolerance)?;
            }
            if observer
                .on_frame(BakeProgress {
                    frame,
                    index,
                    total,
                })
                .is_break()
            {
                return Err(BakeError::Cancelled { frame }.into());
            }
        }
        Ok(())
    }
}

/// Smallest and largest keyed frame over every target and structural joint.
/// Union of the key ranges of every target and its ancestors.
fn key_range<'a>(
    scene: &dyn Scene,
    generated: impl Iterator<Item = &'a GeneratedComponent>,
) -> RigResult<Option<(Frame, Frame)>> {
    let mut visited = BTreeSet::new();
    let mut range: Option<(Frame, Frame)> = None;
    for component in generated {
        for &target in component.targets.iter().chain(&component.structural) {
            let mut node = Some(target);
            while let Some(current) = node {
                if !visited.insert(current) {
                    break;
                }
                for (frame, _) in scene.transform_keys(current)? {
                    range = Some(match range {
                        None => (frame, frame),
                        Some((first, last)) => (first.min(frame), last.max(frame)),
                    });
                }
                node = scene.parent(current)?;
            }
        }
    }
    Ok(range)
}

/// Fails when a selector points past its candidate list at `frame`.
fn check_selectors(scene: &dyn Scene, generated: &GeneratedComponent, frame: Frame) -> RigResult<()> {
    if !generated.spaces.switchable {
        return Ok(());
    }
    let main = generated.main();
    for channel in SpaceChannel::both() {
        let attribute = channel.attribute();
        if !scene.has_attribute(main, attribute) {
            continue;
        }
        let value = scene.attribute(main, attribute)?.round();
        let count = generated.spaces.selector(channel).candidates.len();
        if value < 0.0 || value as usize >= count {
            return Err(BakeError::NoCandidate {
                component: generated.name.clone(),
                frame,
                index: if value < 0.0 { usize::MAX } else { value as usize },
            }
            .into());
        }
    }
    Ok(())
}

/// Desired world transform per control role at the current frame.
fn desired_poses(component: &Component, joints: &[Transform]) -> Vec<(ControlRole, Transform)> {
    let rigid: Vec<Transform> = joints.iter().map(Transform::rigid).collect();
    let Some(&root) = rigid.first() else {
        return Vec::new();
    };
    let at = |index: usize| rigid.get(index).or(rigid.last()).copied().unwrap_or(root);
    let axis = component.base.aim_axis;

    let mut poses = Vec::new();
    match &component.params {
        KindParams::Basic | KindParams::Fk | KindParams::AimFk(_) => {
            poses.push((ControlRole::Main, root));
        }
        KindParams::Scale => poses.push((ControlRole::Main, joints[0])),
        KindParams::MultiFk(_) => {
            poses.push((ControlRole::Main, root));
            for (index, joint) in rigid.iter().enumerate() {
                poses.push((ControlRole::Child(index), *joint));
            }
        }
        KindParams::SimpleIk(_)
        | KindParams::StandardIk(_)
        | KindParams::ComplexIk(_)
        | KindParams::LegIk(_) => {
            poses.push((ControlRole::Main, at(2)));
            if let Some(pole) = component.params.pole() {
                let fallback = at(1).rotation * secondary_axis(axis).vector();
                let position = pole_position(
                    at(0).translation,
                    at(1).translation,
                    at(2).translation,
                    pole.pole_distance,
                    fallback,
                );
                poses.push((ControlRole::Pole, Transform::from_translation(position)));
            }
            poses.push((ControlRole::Base, root));
            poses.push((ControlRole::Ball, at(3)));
        }
        KindParams::SpineIk(_) | KindParams::MultiIk(_) => {
            poses.push((ControlRole::Main, at(rigid.len() - 1)));
            poses.push((ControlRole::Base, root));
        }
    }
    poses
}

/// Keys every control of one component at `frame`. Returns the number of
/// keys written.
fn fit_frame(
    scene: &mut dyn Scene,
    component: &Component,
    generated: &GeneratedComponent,
    frame: Frame,
    tolerance: f64,
) -> RigResult<usize> {
    check_selectors(scene, generated, frame)?;

    let mut joints = Vec::with_capacity(generated.structural.len());
    for joint in &generated.structural {
        joints.push(world_transform(scene, *joint)?);
    }
    let poses = desired_poses(component, &joints);
    if poses.is_empty() {
        return Ok(0);
    }

    let keep_scale = matches!(component.params, KindParams::Scale);
    let mut written = 0;
    for control in &generated.controls {
        let Some(desired) = poses
            .iter()
            .find(|(role, _)| *role == control.role)
            .map(|(_, pose)| *pose)
        else {
            continue;
        };
        let mut local = relative(scene.world_matrix(control.buffer)?, desired.to_matrix());
        if !keep_scale {
            local.scale = DVec3::ONE;
        }
        scene.set_transform_key(control.control, frame, local)?;
        written += 1;

        let reached = world_transform(scene, control.control)?.translation;
        let miss = reached.distance(desired.translation);
        if !miss.is_finite() || miss > tolerance {
            return Err(BakeError::Unsolvable {
                component: generated.name.clone(),
                frame,
                reason: format!("{} control misses its target by {:.6}", control.role, miss),
            }
            .into());
        }
    }

    let main = generated.main();
    let kind = component.kind();
    if kind.is_ik() && scene.has_attribute(main, TWIST) {
        let twist = if kind.is_two_bone() && generated.control(ControlRole::Pole).is_none() {
            let rigid: Vec<Transform> = joints.iter().take(3).map(Transform::rigid).collect();
            let bend = bend_direction(&rigid, component.base.aim_axis);
            let hint = world_transform(scene, main)?.rotation * generated.bend_hint;
            let axis = rigid[rigid.len() - 1].translation - rigid[0].translation;
            signed_angle(hint, bend, axis).to_degrees()
        } else {
            0.0
        };
        scene.set_attribute_key(main, TWIST, frame, twist)?;
        written += 1;
    }
    Ok(written)
}
