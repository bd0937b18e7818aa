//! Rig lifecycle integration tests against the in-memory host: regenerate,
//! space switching, bind validation, baking and the rig registry.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p fossil-rig --test lifecycle_tests
//! ```

use std::ops::ControlFlow;

use glam::{DQuat, DVec3};
use pretty_assertions::assert_eq;

use fossil_rig::component::StretchParams;
use fossil_rig::curve::CurveData;
use fossil_rig::scene::world_transform;
use fossil_rig::{
    BakeError, BakeProgress, BindError, Component, ComponentKind, ControlColor, ControlRole,
    CurveGeometry, Frame, KindParams, LifecycleState, MemoryScene, NodeId, NodeKind, Rig,
    RigError, RigRegistry, Scene, SpaceChannel, SpaceRef, Transform, WarningCode,
};

const TOL: f64 = 1e-6;
const FRAMES: std::ops::RangeInclusive<Frame> = 1..=10;

// ============================================================================
// Fixtures
// ============================================================================

/// A straight, unanimated chain `j0 -> j1 -> ...` along +X with two-unit bones.
fn rest_chain(scene: &mut MemoryScene, count: usize) -> Vec<NodeId> {
    let mut joints: Vec<NodeId> = Vec::with_capacity(count);
    for i in 0..count {
        let joint = scene
            .create_node(&format!("j{}", i), NodeKind::Joint, joints.last().copied())
            .unwrap();
        if i > 0 {
            scene
                .set_local_transform(joint, Transform::from_translation(DVec3::new(2.0, 0.0, 0.0)))
                .unwrap();
        }
        joints.push(joint);
    }
    joints
}

/// `rest_chain` with the root swinging about Z and the first child bending
/// over frames 1..=10.
fn animated_chain(scene: &mut MemoryScene, count: usize) -> Vec<NodeId> {
    let joints = rest_chain(scene, count);
    for frame in FRAMES {
        let t = f64::from(frame);
        scene
            .set_transform_key(
                joints[0],
                frame,
                Transform::new(
                    DVec3::new(0.0, 0.1 * t, 0.0),
                    DQuat::from_rotation_z(0.1 * t) * DQuat::from_rotation_x(0.05 * t),
                    DVec3::ONE,
                ),
            )
            .unwrap();
        if count > 1 {
            scene
                .set_transform_key(
                    joints[1],
                    frame,
                    Transform::new(
                        DVec3::new(2.0, 0.0, 0.0),
                        DQuat::from_rotation_z(0.4 + 0.05 * t),
                        DVec3::ONE,
                    ),
                )
                .unwrap();
        }
    }
    joints
}

fn names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("j{}", i)).collect()
}

fn sample(scene: &mut MemoryScene, joints: &[NodeId]) -> Vec<Vec<Transform>> {
    let mut frames = Vec::new();
    for frame in FRAMES {
        scene.set_current_frame(frame);
        frames.push(
            joints
                .iter()
                .map(|joint| world_transform(scene, *joint).unwrap())
                .collect(),
        );
    }
    scene.set_current_frame(0);
    frames
}

fn assert_poses_match(scene: &mut MemoryScene, joints: &[NodeId], expected: &[Vec<Transform>]) {
    let actual = sample(scene, joints);
    for (frame, (want, got)) in FRAMES.zip(expected.iter().zip(&actual)) {
        for (index, (want, got)) in want.iter().zip(got).enumerate() {
            assert!(
                want.abs_diff_eq(got, TOL),
                "joint j{} at frame {}: expected {:?}, got {:?}",
                index,
                frame,
                want,
                got
            );
        }
    }
}

fn control_worlds(scene: &MemoryScene, rig: &Rig) -> Vec<(String, ControlRole, Transform)> {
    let mut worlds = Vec::new();
    for (name, generated) in rig.generated_components() {
        for control in &generated.controls {
            worlds.push((
                name.clone(),
                control.role,
                world_transform(scene, control.control).unwrap(),
            ));
        }
    }
    worlds
}

fn control_keys(scene: &MemoryScene, rig: &Rig) -> Vec<Vec<(Frame, Transform)>> {
    rig.generated_components()
        .values()
        .flat_map(|generated| generated.controls.iter())
        .map(|control| scene.transform_keys(control.control).unwrap())
        .collect()
}

// ============================================================================
// 1. Regenerate
// ============================================================================

#[test]
fn test_preview_is_idempotent() {
    let mut scene = MemoryScene::new();
    animated_chain(&mut scene, 3);
    let mut rig = Rig::new("hero");
    rig.graph_mut()
        .add(Component::new("root", ComponentKind::Basic))
        .unwrap();
    rig.graph_mut()
        .add(
            Component::new("arm", ComponentKind::StandardIk)
                .with_bind_targets(names(3))
                .with_parent_space(SpaceRef::component("root"))
                .with_space_switch(true)
                .with_space_candidates(["root"]),
        )
        .unwrap();

    rig.preview(&mut scene).unwrap();
    let first_nodes = scene.len();
    let first_worlds = control_worlds(&scene, &rig);
    let first_labels = rig.generated("arm").unwrap().spaces.parent.labels();

    rig.preview(&mut scene).unwrap();
    assert_eq!(scene.len(), first_nodes);
    assert_eq!(rig.generated("arm").unwrap().spaces.parent.labels(), first_labels);
    assert_eq!(first_labels, vec!["world", "root"]);

    let second_worlds = control_worlds(&scene, &rig);
    assert_eq!(first_worlds.len(), second_worlds.len());
    for ((name, role, a), (name_b, role_b, b)) in first_worlds.iter().zip(&second_worlds) {
        assert_eq!((name, role), (name_b, role_b));
        assert!(a.abs_diff_eq(b, TOL), "{} {} moved", name, role);
    }
}

#[test]
fn test_preview_keeps_control_animation() {
    let mut scene = MemoryScene::new();
    animated_chain(&mut scene, 1);
    let mut rig = Rig::new("hero");
    rig.graph_mut()
        .add(Component::new("head", ComponentKind::Fk).with_target("j0"))
        .unwrap();
    rig.preview(&mut scene).unwrap();
    rig.bake(&mut scene).unwrap();
    let keys = control_keys(&scene, &rig);
    assert_eq!(keys[0].len(), 10);

    rig.preview(&mut scene).unwrap();
    assert_eq!(control_keys(&scene, &rig), keys);
}

#[test]
fn test_pruned_candidate_warns() {
    let mut scene = MemoryScene::new();
    scene.create_node("hand", NodeKind::Joint, None).unwrap();
    let mut rig = Rig::new("hero");
    rig.graph_mut()
        .add(Component::new("hips", ComponentKind::Basic))
        .unwrap();
    rig.graph_mut()
        .add(Component::new("chest", ComponentKind::Basic))
        .unwrap();
    rig.graph_mut()
        .add(
            Component::new("hand", ComponentKind::Fk)
                .with_target("hand")
                .with_space_switch(true)
                .with_space_candidates(["hips", "chest"]),
        )
        .unwrap();
    rig.graph_mut().remove("chest").unwrap();

    let warnings = rig.preview(&mut scene).unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].code, WarningCode::PrunedCandidate);
    assert_eq!(warnings[0].component, "hand");
    assert_eq!(
        rig.generated("hand").unwrap().spaces.parent.labels(),
        vec!["world", "hips"]
    );
}

#[test]
fn test_custom_curve_survives_regenerate() {
    let mut scene = MemoryScene::new();
    scene.create_node("head", NodeKind::Joint, None).unwrap();
    let mut rig = Rig::new("hero");
    rig.graph_mut()
        .add(
            Component::new("head", ComponentKind::Fk)
                .with_target("head")
                .with_custom_curve(true),
        )
        .unwrap();
    rig.preview(&mut scene).unwrap();

    let edited = CurveGeometry::new(vec![CurveData::linear(vec![
        [0.0, 0.0, 0.0],
        [0.0, 3.0, 0.0],
        [1.0, 3.0, 0.0],
    ])]);
    let main = rig.generated("head").unwrap().main();
    scene
        .set_curve(main, edited.clone(), ControlColor::default())
        .unwrap();

    rig.preview(&mut scene).unwrap();
    let main = rig.generated("head").unwrap().main();
    assert_eq!(scene.curve(main).unwrap(), edited);
    assert_eq!(
        rig.graph().get("head").unwrap().base.custom_geometry.get("main"),
        Some(&edited)
    );
}

// ============================================================================
// 2. Space switching
// ============================================================================

#[test]
fn test_space_switch_round_trip_without_pop() {
    let mut scene = MemoryScene::new();
    let root_joint = scene.create_node("root_jnt", NodeKind::Joint, None).unwrap();
    scene
        .set_local_transform(root_joint, Transform::from_translation(DVec3::new(1.0, 0.0, 0.0)))
        .unwrap();
    let hand_joint = scene
        .create_node("hand_jnt", NodeKind::Joint, Some(root_joint))
        .unwrap();
    scene
        .set_local_transform(hand_joint, Transform::from_translation(DVec3::new(2.0, 0.0, 0.0)))
        .unwrap();

    let mut rig = Rig::new("hero");
    rig.graph_mut()
        .add(Component::new("root", ComponentKind::Scale).with_target("root_jnt"))
        .unwrap();
    rig.graph_mut()
        .add(
            Component::new("hand", ComponentKind::Fk)
                .with_target("hand_jnt")
                .with_parent_space(SpaceRef::component("root"))
                .with_space_switch(true),
        )
        .unwrap();
    rig.preview(&mut scene).unwrap();

    let root_main = rig.generated("root").unwrap().main();
    scene
        .set_transform_key(root_main, 1, Transform::IDENTITY)
        .unwrap();
    scene
        .set_transform_key(
            root_main,
            10,
            Transform::new(
                DVec3::new(0.0, 3.0, 0.0),
                DQuat::from_rotation_z(0.8),
                DVec3::splat(2.0),
            ),
        )
        .unwrap();
    let hand_main = rig.generated("hand").unwrap().main();

    let world_at = |scene: &mut MemoryScene, frame: Frame| {
        scene.set_current_frame(frame);
        let world = world_transform(scene, hand_main).unwrap();
        scene.set_current_frame(0);
        world
    };

    let before = world_at(&mut scene, 5);
    rig.switch_space(&mut scene, "hand", SpaceChannel::Parent, "world", 5)
        .unwrap();
    let after = world_at(&mut scene, 5);
    assert!(before.abs_diff_eq(&after, TOL), "{:?} != {:?}", before, after);

    scene.set_current_frame(5);
    assert_eq!(scene.attribute(hand_main, "parentSpace").unwrap(), 0.0);

    let before = world_at(&mut scene, 8);
    rig.switch_space(&mut scene, "hand", SpaceChannel::Parent, "root", 8)
        .unwrap();
    let after = world_at(&mut scene, 8);
    assert!(before.abs_diff_eq(&after, TOL), "{:?} != {:?}", before, after);

    let err = rig
        .switch_space(&mut scene, "hand", SpaceChannel::Upright, "spine", 9)
        .unwrap_err();
    assert!(matches!(err, RigError::Reference(_)));
}

#[test]
fn test_fk_space_follows_scale_component() {
    let mut scene = MemoryScene::new();
    let root_joint = scene.create_node("root_jnt", NodeKind::Joint, None).unwrap();
    scene
        .set_local_transform(
            root_joint,
            Transform::new(
                DVec3::new(1.0, 2.0, 0.0),
                DQuat::from_rotation_y(0.6),
                DVec3::ONE,
            ),
        )
        .unwrap();
    let hand_joint = scene
        .create_node("hand_jnt", NodeKind::Joint, Some(root_joint))
        .unwrap();
    scene
        .set_local_transform(hand_joint, Transform::from_translation(DVec3::new(2.0, 0.0, 0.0)))
        .unwrap();

    let mut rig = Rig::new("hero");
    rig.graph_mut()
        .add(Component::new("root", ComponentKind::Scale).with_target("root_jnt"))
        .unwrap();
    rig.graph_mut()
        .add(
            Component::new("hand", ComponentKind::Fk)
                .with_target("hand_jnt")
                .with_parent_space(SpaceRef::component("root"))
                .with_upright_space(SpaceRef::component("root")),
        )
        .unwrap();
    rig.preview(&mut scene).unwrap();

    let root_main = rig.generated("root").unwrap().main();
    let hand_space = rig.generated("hand").unwrap().space;
    let root_world = world_transform(&scene, root_main).unwrap();
    let space_world = world_transform(&scene, hand_space).unwrap();
    assert!(
        root_world.abs_diff_eq(&space_world, TOL),
        "{:?} != {:?}",
        root_world,
        space_world
    );

    scene
        .set_local_transform(
            root_main,
            Transform::new(
                DVec3::new(0.0, 0.0, 4.0),
                DQuat::from_rotation_x(0.3),
                DVec3::splat(1.5),
            ),
        )
        .unwrap();
    let root_world = world_transform(&scene, root_main).unwrap();
    let space_world = world_transform(&scene, hand_space).unwrap();
    assert!(
        root_world.abs_diff_eq(&space_world, TOL),
        "{:?} != {:?}",
        root_world,
        space_world
    );
}

// ============================================================================
// 3. Bind validation
// ============================================================================

#[test]
fn test_leg_ik_with_three_joints_fails_to_bind() {
    let mut scene = MemoryScene::new();
    animated_chain(&mut scene, 3);
    let mut rig = Rig::new("hero");
    rig.graph_mut()
        .add(Component::new("leg", ComponentKind::LegIk).with_bind_targets(names(3)))
        .unwrap();
    rig.preview(&mut scene).unwrap();
    let constraints = scene.constraint_count();

    let err = rig.bind(&mut scene).unwrap_err();
    assert!(
        matches!(
            err,
            RigError::Bind(BindError::ChainLength { ref component, found: 3, .. }) if component == "leg"
        ),
        "got {:?}",
        err
    );
    assert_eq!(rig.state(), LifecycleState::Previewed);
    assert_eq!(scene.constraint_count(), constraints);
}

#[test]
fn test_preview_while_bound_rebinds() {
    let mut scene = MemoryScene::new();
    animated_chain(&mut scene, 3);
    let mut rig = Rig::new("hero");
    rig.graph_mut()
        .add(Component::new("arm", ComponentKind::MultiFk).with_bind_targets(names(3)))
        .unwrap();
    rig.preview(&mut scene).unwrap();
    rig.bind(&mut scene).unwrap();
    let constraints = scene.constraint_count();

    rig.preview(&mut scene).unwrap();
    assert_eq!(rig.state(), LifecycleState::Bound);
    assert_eq!(scene.constraint_count(), constraints);
    assert!(rig.generated("arm").unwrap().is_bound());
}

#[test]
fn test_collapsed_stretch_segment_stays_finite() {
    let mut scene = MemoryScene::new();
    let joints = rest_chain(&mut scene, 3);
    let mut rig = Rig::new("hero");
    rig.graph_mut()
        .add(
            Component::new("arm", ComponentKind::MultiFk)
                .with_bind_targets(names(3))
                .with_stretch(StretchParams::enabled()),
        )
        .unwrap();
    rig.preview(&mut scene).unwrap();
    rig.bind(&mut scene).unwrap();

    // Pull the second control back onto the first.
    let elbow = rig
        .generated("arm")
        .unwrap()
        .control(ControlRole::Child(1))
        .unwrap()
        .control;
    scene
        .set_local_transform(elbow, Transform::from_translation(DVec3::new(-2.0, 0.0, 0.0)))
        .unwrap();

    for joint in &joints {
        let world = world_transform(&scene, *joint).unwrap();
        assert!(
            world.translation.is_finite() && world.rotation.is_finite() && world.scale.is_finite(),
            "non-finite joint transform {:?}",
            world
        );
    }
    let shoulder = world_transform(&scene, joints[0]).unwrap();
    assert!(shoulder.scale.abs_diff_eq(DVec3::ONE, TOL), "{:?}", shoulder.scale);
    let elbow_world = world_transform(&scene, joints[1]).unwrap();
    assert!(elbow_world.translation.abs_diff_eq(shoulder.translation, TOL));
}

#[test]
fn test_global_scale_does_not_stretch_chain() {
    let mut scene = MemoryScene::new();
    let joints = rest_chain(&mut scene, 3);
    let mut rig = Rig::new("hero");
    rig.graph_mut()
        .add(Component::new("global", ComponentKind::Scale))
        .unwrap();
    rig.graph_mut()
        .add(
            Component::new("arm", ComponentKind::MultiFk)
                .with_bind_targets(names(3))
                .with_parent_space(SpaceRef::component("global"))
                .with_upright_space(SpaceRef::component("global"))
                .with_stretch(StretchParams::enabled()),
        )
        .unwrap();
    rig.preview(&mut scene).unwrap();
    rig.bind(&mut scene).unwrap();

    let global = rig.generated("global").unwrap().main();
    scene
        .set_local_transform(global, Transform::IDENTITY.with_scale(DVec3::splat(2.0)))
        .unwrap();
    let arm = rig.generated("arm").unwrap();
    let scale = |role| {
        let control = arm.control(role).unwrap().control;
        world_transform(&scene, control).unwrap().scale
    };
    assert!(scale(ControlRole::Child(1)).abs_diff_eq(DVec3::splat(2.0), TOL));

    // Doubled control spacing under a doubled global scale is not a stretch.
    let shoulder = world_transform(&scene, joints[0]).unwrap();
    assert!(
        (shoulder.scale.x - shoulder.scale.y).abs() < TOL,
        "shoulder stretched: {:?}",
        shoulder.scale
    );
}

// ============================================================================
// 4. Bake on bind
// ============================================================================

/// Binds with bake-on-bind, checks the skeleton still plays its own
/// animation through the controls, then unbinds and checks the skeleton's
/// keys are untouched.
fn assert_bake_round_trip(component: Component, joint_count: usize) {
    let mut scene = MemoryScene::new();
    let joints = animated_chain(&mut scene, joint_count);
    let expected = sample(&mut scene, &joints);
    let keys: Vec<_> = joints
        .iter()
        .map(|joint| scene.transform_keys(*joint).unwrap())
        .collect();

    let mut rig = Rig::new("hero").with_bake_on_bind(true);
    rig.graph_mut().add(component).unwrap();
    rig.preview(&mut scene).unwrap();
    rig.bind(&mut scene).unwrap();
    assert_eq!(rig.state(), LifecycleState::Bound);
    assert!(scene.constraint_count() > 1);
    assert_poses_match(&mut scene, &joints, &expected);

    rig.unbind(&mut scene).unwrap();
    assert_eq!(rig.state(), LifecycleState::Previewed);
    let after: Vec<_> = joints
        .iter()
        .map(|joint| scene.transform_keys(*joint).unwrap())
        .collect();
    assert_eq!(after, keys);
    assert_poses_match(&mut scene, &joints, &expected);
}

#[test]
fn test_fk_bake_round_trip() {
    assert_bake_round_trip(Component::new("root", ComponentKind::Fk).with_target("j0"), 1);
}

#[test]
fn test_multi_fk_bake_round_trip() {
    assert_bake_round_trip(
        Component::new("arm", ComponentKind::MultiFk).with_bind_targets(names(3)),
        3,
    );
}

#[test]
fn test_standard_ik_bake_round_trip() {
    assert_bake_round_trip(
        Component::new("arm", ComponentKind::StandardIk).with_bind_targets(names(3)),
        3,
    );
}

#[test]
fn test_simple_ik_bake_round_trip() {
    assert_bake_round_trip(
        Component::new("arm", ComponentKind::SimpleIk).with_bind_targets(names(3)),
        3,
    );
}

#[test]
fn test_no_flip_knee_bake_round_trip() {
    let mut component =
        Component::new("arm", ComponentKind::StandardIk).with_bind_targets(names(3));
    if let KindParams::StandardIk(params) = &mut component.params {
        params.pole.no_flip_knee = true;
    }
    assert_bake_round_trip(component, 3);
}

#[test]
fn test_complex_ik_bake_round_trip() {
    assert_bake_round_trip(
        Component::new("arm", ComponentKind::ComplexIk).with_bind_targets(names(3)),
        3,
    );
}

#[test]
fn test_leg_ik_bake_round_trip() {
    assert_bake_round_trip(
        Component::new("leg", ComponentKind::LegIk).with_bind_targets(names(4)),
        4,
    );
}

#[test]
fn test_spine_ik_bake_round_trip() {
    assert_bake_round_trip(
        Component::new("spine", ComponentKind::SpineIk).with_bind_targets(names(4)),
        4,
    );
}

#[test]
fn test_multi_ik_bake_round_trip() {
    assert_bake_round_trip(
        Component::new("tail", ComponentKind::MultiIk).with_bind_targets(names(4)),
        4,
    );
}

#[test]
fn test_aim_fk_bake_round_trip() {
    assert_bake_round_trip(Component::new("head", ComponentKind::AimFk).with_target("j0"), 1);
}

#[test]
fn test_scale_bake_round_trip() {
    assert_bake_round_trip(Component::new("root", ComponentKind::Scale).with_target("j0"), 1);
}

#[test]
fn test_bake_follows_animated_parent() {
    let mut scene = MemoryScene::new();
    let mover = scene.create_node("mover", NodeKind::Group, None).unwrap();
    let head = scene.create_node("head", NodeKind::Joint, Some(mover)).unwrap();
    scene
        .set_local_transform(head, Transform::from_translation(DVec3::new(1.0, 0.0, 0.0)))
        .unwrap();
    for frame in FRAMES {
        let t = f64::from(frame);
        scene
            .set_transform_key(
                mover,
                frame,
                Transform::new(
                    DVec3::new(0.0, 0.2 * t, 0.0),
                    DQuat::from_rotation_z(0.1 * t),
                    DVec3::ONE,
                ),
            )
            .unwrap();
    }
    let expected = sample(&mut scene, &[head]);

    let mut rig = Rig::new("hero");
    rig.graph_mut()
        .add(Component::new("head", ComponentKind::Fk).with_target("head"))
        .unwrap();
    rig.preview(&mut scene).unwrap();
    let report = rig.bake(&mut scene).unwrap();
    assert_eq!(report.frames, 10);
    assert_eq!((report.first, report.last), (Some(1), Some(10)));

    rig.bind(&mut scene).unwrap();
    assert_poses_match(&mut scene, &[head], &expected);
    assert!(scene.transform_keys(head).unwrap().is_empty());
}

#[test]
fn test_cancelled_bake_leaves_controls_untouched() {
    let mut scene = MemoryScene::new();
    animated_chain(&mut scene, 3);
    let mut rig = Rig::new("hero");
    rig.graph_mut()
        .add(Component::new("arm", ComponentKind::StandardIk).with_bind_targets(names(3)))
        .unwrap();
    rig.preview(&mut scene).unwrap();

    let main = rig.generated("arm").unwrap().main();
    scene
        .set_transform_key(main, 4, Transform::from_translation(DVec3::new(0.5, 0.0, 0.0)))
        .unwrap();
    let keys = control_keys(&scene, &rig);
    let twist = scene.attribute_keys(main, "twist").unwrap();

    let mut observer = |progress: BakeProgress| {
        if progress.frame == 6 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    };
    let err = rig.bake_with(&mut scene, &mut observer).unwrap_err();
    assert_eq!(err, RigError::Bake(BakeError::Cancelled { frame: 6 }));
    assert_eq!(control_keys(&scene, &rig), keys);
    assert_eq!(scene.attribute_keys(main, "twist").unwrap(), twist);
    assert_eq!(rig.state(), LifecycleState::Previewed);
}

// ============================================================================
// 5. Registry
// ============================================================================

#[test]
fn test_registry_switching_keeps_rigs_independent() {
    let mut scene = MemoryScene::new();
    animated_chain(&mut scene, 1);
    let mut registry = RigRegistry::new();

    let hero = registry.create("hero").unwrap();
    hero.graph_mut()
        .add(Component::new("head", ComponentKind::Fk).with_target("j0"))
        .unwrap();
    hero.preview(&mut scene).unwrap();

    registry.create("prop").unwrap();
    assert_eq!(registry.active().unwrap().state(), LifecycleState::Empty);

    registry.switch_active("hero").unwrap();
    let active = registry.active_mut().unwrap();
    assert_eq!(active.state(), LifecycleState::Previewed);
    active.bind(&mut scene).unwrap();

    assert_eq!(registry.get("hero").unwrap().state(), LifecycleState::Bound);
    assert_eq!(registry.get("prop").unwrap().state(), LifecycleState::Empty);
    assert_eq!(registry.len(), 2);
}
