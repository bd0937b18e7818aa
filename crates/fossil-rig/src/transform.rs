//! Transform math shared by generation, constraint evaluation and bake.
//!
//! Everything here is pure: no scene access, no allocation beyond the chain
//! solvers' output buffers.

use glam::{DMat4, DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// Distances and lengths below this are treated as zero.
pub const EPSILON: f64 = 1e-9;

// =============================================================================
// Transform
// =============================================================================

/// Decomposed translation / rotation / scale transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: DVec3,
    pub rotation: DQuat,
    pub scale: DVec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
        scale: DVec3::ONE,
    };

    pub fn new(translation: DVec3, rotation: DQuat, scale: DVec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn from_translation(translation: DVec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn from_rotation(rotation: DQuat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    pub fn with_translation(mut self, translation: DVec3) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_rotation(mut self, rotation: DQuat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: DVec3) -> Self {
        self.scale = scale;
        self
    }

    /// Decomposes an affine matrix. Shear is discarded.
    pub fn from_matrix(matrix: DMat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation: rotation.normalize(),
            scale,
        }
    }

    pub fn to_matrix(&self) -> DMat4 {
        DMat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Same translation and rotation with unit scale.
    pub fn rigid(&self) -> Self {
        Self {
            scale: DVec3::ONE,
            ..*self
        }
    }

    /// `self * other` in matrix order (other is applied first).
    pub fn mul_transform(&self, other: &Transform) -> Self {
        Self::from_matrix(self.to_matrix() * other.to_matrix())
    }

    pub fn inverse(&self) -> Self {
        Self::from_matrix(self.to_matrix().inverse())
    }

    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.to_matrix().transform_point3(point)
    }

    /// Linear translation and scale, shortest-path slerp rotation.
    pub fn interpolate(&self, other: &Transform, t: f64) -> Self {
        Self {
            translation: self.translation.lerp(other.translation, t),
            rotation: slerp_shortest(self.rotation, other.rotation, t),
            scale: self.scale.lerp(other.scale, t),
        }
    }

    /// Component-wise comparison; `q` and `-q` compare equal.
    pub fn abs_diff_eq(&self, other: &Transform, tolerance: f64) -> bool {
        self.translation.abs_diff_eq(other.translation, tolerance)
            && self.scale.abs_diff_eq(other.scale, tolerance)
            && rotations_match(self.rotation, other.rotation, tolerance)
    }
}

/// Returns true if two rotations describe the same orientation.
pub fn rotations_match(a: DQuat, b: DQuat, tolerance: f64) -> bool {
    a.dot(b).abs() >= 1.0 - tolerance
}

fn slerp_shortest(from: DQuat, to: DQuat, t: f64) -> DQuat {
    let to = if from.dot(to) < 0.0 { -to } else { to };
    from.slerp(to, t).normalize()
}

// =============================================================================
// Axis
// =============================================================================

/// Local axis a control or chain is aligned to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    #[default]
    X,
    Y,
    Z,
}

impl Axis {
    pub fn vector(&self) -> DVec3 {
        match self {
            Axis::X => DVec3::X,
            Axis::Y => DVec3::Y,
            Axis::Z => DVec3::Z,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Space frames
// =============================================================================

/// Combines a parent frame (translation and scale) with an upright frame
/// (rotation only) into the world frame of a space node.
pub fn resolve_space_frame(parent_world: DMat4, upright_world: DMat4) -> DMat4 {
    let parent = Transform::from_matrix(parent_world);
    let upright = Transform::from_matrix(upright_world);
    DMat4::from_scale_rotation_translation(parent.scale, upright.rotation, parent.translation)
}

/// Local transform that places a child of `parent_world` at `world`.
pub fn relative(parent_world: DMat4, world: DMat4) -> Transform {
    Transform::from_matrix(parent_world.inverse() * world)
}

/// Rotates `world` by `rotation` about the world-space point `pivot`.
pub fn rotate_about_pivot(world: DMat4, pivot: DVec3, rotation: DQuat) -> DMat4 {
    DMat4::from_translation(pivot)
        * DMat4::from_quat(rotation)
        * DMat4::from_translation(-pivot)
        * world
}

/// Smallest rotation taking direction `from` onto direction `to`.
pub fn shortest_arc(from: DVec3, to: DVec3) -> DQuat {
    if from.length_squared() < EPSILON * EPSILON || to.length_squared() < EPSILON * EPSILON {
        return DQuat::IDENTITY;
    }
    DQuat::from_rotation_arc(from.normalize(), to.normalize())
}

/// Component of `v` perpendicular to the unit vector `axis`.
pub fn perpendicular(v: DVec3, axis: DVec3) -> DVec3 {
    v - axis * v.dot(axis)
}

/// Signed angle in radians from `from` to `to` about `axis`, measured in the
/// plane perpendicular to `axis`.
pub fn signed_angle(from: DVec3, to: DVec3, axis: DVec3) -> f64 {
    let axis = axis.normalize_or_zero();
    let a = perpendicular(from, axis);
    let b = perpendicular(to, axis);
    if a.length_squared() < EPSILON * EPSILON || b.length_squared() < EPSILON * EPSILON {
        return 0.0;
    }
    axis.dot(a.cross(b)).atan2(a.dot(b))
}

// =============================================================================
// Squash and stretch
// =============================================================================

/// `current / rest`. A zero rest or current length yields 1.0.
pub fn stretch_factor(current: f64, rest: f64) -> f64 {
    if rest.abs() < EPSILON || current.abs() < EPSILON {
        1.0
    } else {
        current / rest
    }
}

/// Volume-preserving scale for the two axes orthogonal to the stretch axis.
///
/// A coefficient of 1.0 gives `1 / stretch`; 0.0 disables squash. A zero
/// stretch factor yields 1.0.
pub fn squash_factor(stretch: f64, coefficient: f64) -> f64 {
    if stretch.abs() < EPSILON {
        return 1.0;
    }
    1.0 + coefficient * (1.0 / stretch - 1.0)
}

/// Uniform scale of a world matrix: the geometric mean of its axis lengths.
/// A degenerate matrix yields 1.0.
pub fn uniform_scale(matrix: DMat4) -> f64 {
    let scale = (matrix.x_axis.truncate().length()
        * matrix.y_axis.truncate().length()
        * matrix.z_axis.truncate().length())
    .cbrt();
    if scale < EPSILON {
        1.0
    } else {
        scale
    }
}

/// Scale vector with `stretch` on `axis` and `squash` on the other two axes.
pub fn axis_scale(axis: Axis, stretch: f64, squash: f64) -> DVec3 {
    let mut scale = DVec3::splat(squash);
    scale[axis.index()] = stretch;
    scale
}

// =============================================================================
// Chain solving
// =============================================================================

/// Pole placement along the bend of a three-point chain: the offset from the
/// start/end midpoint to `mid`, scaled by `distance`.
///
/// A straight chain has no bend; `fallback` (or an arbitrary perpendicular)
/// supplies the direction.
pub fn pole_position(start: DVec3, mid: DVec3, end: DVec3, distance: f64, fallback: DVec3) -> DVec3 {
    let average = (start + end) * 0.5;
    let offset = mid - average;
    if offset.length() > EPSILON {
        return average + offset * distance;
    }
    let axis = (end - start).normalize_or_zero();
    let mut direction = perpendicular(fallback, axis).normalize_or_zero();
    if direction == DVec3::ZERO {
        direction = if axis == DVec3::ZERO {
            DVec3::Y
        } else {
            axis.any_orthonormal_vector()
        };
    }
    average + direction * distance
}

/// Analytic two-bone solve. Returns the world positions of the middle and end
/// joints. The chain bends in the plane spanned by the root→target direction
/// and `bend_hint`. Unreachable targets are clamped to full extension.
pub fn solve_two_bone(
    root: DVec3,
    upper: f64,
    lower: f64,
    target: DVec3,
    bend_hint: DVec3,
) -> (DVec3, DVec3) {
    let to_target = target - root;
    let raw = to_target.length();
    let direction = if raw > EPSILON {
        to_target / raw
    } else {
        let hint = bend_hint.normalize_or_zero();
        if hint == DVec3::ZERO {
            DVec3::X
        } else {
            hint.any_orthonormal_vector()
        }
    };

    let min_reach = (upper - lower).abs();
    let max_reach = upper + lower;
    let distance = raw.clamp(min_reach, max_reach);

    let mut bend = perpendicular(bend_hint, direction).normalize_or_zero();
    if bend == DVec3::ZERO {
        bend = direction.any_orthonormal_vector();
    }

    let cos_root = if upper > EPSILON && distance > EPSILON {
        ((upper * upper + distance * distance - lower * lower) / (2.0 * upper * distance))
            .clamp(-1.0, 1.0)
    } else {
        1.0
    };
    let sin_root = (1.0 - cos_root * cos_root).max(0.0).sqrt();

    let mid = root + direction * (upper * cos_root) + bend * (upper * sin_root);
    let end = root + direction * distance;
    (mid, end)
}

/// FABRIK solve for an arbitrary chain with a fixed root.
///
/// Returns new joint positions with the original segment lengths. A target
/// beyond full reach straightens the chain towards it.
pub fn solve_fabrik(
    points: &[DVec3],
    target: DVec3,
    iterations: usize,
    tolerance: f64,
) -> Vec<DVec3> {
    let mut solved = points.to_vec();
    if solved.len() < 2 {
        return solved;
    }
    let lengths: Vec<f64> = solved.windows(2).map(|w| w[0].distance(w[1])).collect();
    let total: f64 = lengths.iter().sum();
    let root = solved[0];

    if root.distance(target) >= total {
        let direction = (target - root).normalize_or_zero();
        for i in 1..solved.len() {
            solved[i] = solved[i - 1] + direction * lengths[i - 1];
        }
        return solved;
    }

    let last = solved.len() - 1;
    for _ in 0..iterations {
        if solved[last].distance(target) <= tolerance {
            break;
        }

        // Backward pass from the effector.
        solved[last] = target;
        for i in (0..last).rev() {
            let dir = (solved[i] - solved[i + 1]).normalize_or_zero();
            solved[i] = solved[i + 1] + dir * lengths[i];
        }

        // Forward pass from the root.
        solved[0] = root;
        for i in 1..=last {
            let dir = (solved[i] - solved[i - 1]).normalize_or_zero();
            solved[i] = solved[i - 1] + dir * lengths[i - 1];
        }
    }
    solved
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    const TOL: f64 = 1e-6;

    #[test]
    fn test_matrix_round_trip() {
        let t = Transform::new(
            DVec3::new(1.0, 2.0, 3.0),
            DQuat::from_rotation_y(0.7),
            DVec3::new(2.0, 2.0, 2.0),
        );
        let back = Transform::from_matrix(t.to_matrix());
        assert!(back.abs_diff_eq(&t, TOL));
    }

    #[test]
    fn test_relative_inverts_parent() {
        let parent = Transform::new(DVec3::new(5.0, 0.0, 0.0), DQuat::from_rotation_z(FRAC_PI_2), DVec3::ONE);
        let world = Transform::from_translation(DVec3::new(5.0, 3.0, 0.0));
        let local = relative(parent.to_matrix(), world.to_matrix());
        let recomposed = Transform::from_matrix(parent.to_matrix() * local.to_matrix());
        assert!(recomposed.abs_diff_eq(&world, TOL));
    }

    #[test]
    fn test_space_frame_takes_rotation_from_upright() {
        let parent = Transform::new(DVec3::new(1.0, 0.0, 0.0), DQuat::from_rotation_x(1.0), DVec3::splat(3.0));
        let upright = Transform::new(DVec3::new(9.0, 9.0, 9.0), DQuat::from_rotation_y(0.5), DVec3::ONE);
        let frame = Transform::from_matrix(resolve_space_frame(parent.to_matrix(), upright.to_matrix()));
        assert!(frame.translation.abs_diff_eq(parent.translation, TOL));
        assert!(frame.scale.abs_diff_eq(parent.scale, TOL));
        assert!(rotations_match(frame.rotation, upright.rotation, TOL));
    }

    #[test]
    fn test_stretch_factor_zero_rest() {
        assert_eq!(stretch_factor(4.0, 0.0), 1.0);
        assert_eq!(stretch_factor(0.0, 2.0), 1.0);
        assert_eq!(stretch_factor(0.0, 0.0), 1.0);
        assert_eq!(stretch_factor(4.0, 2.0), 2.0);
        assert_eq!(stretch_factor(1.0, 2.0), 0.5);
    }

    #[test]
    fn test_uniform_scale() {
        let matrix = DMat4::from_scale_rotation_translation(
            DVec3::splat(3.0),
            DQuat::from_rotation_z(0.7),
            DVec3::new(1.0, 2.0, 3.0),
        );
        assert!((uniform_scale(matrix) - 3.0).abs() < TOL);
        assert_eq!(uniform_scale(DMat4::ZERO), 1.0);
    }

    #[test]
    fn test_squash_factor() {
        assert!((squash_factor(2.0, 1.0) - 0.5).abs() < TOL);
        assert!((squash_factor(2.0, 0.0) - 1.0).abs() < TOL);
        assert!((squash_factor(2.0, 0.5) - 0.75).abs() < TOL);
        assert_eq!(squash_factor(1.0, 1.0), 1.0);
    }

    #[test]
    fn test_axis_scale() {
        assert_eq!(axis_scale(Axis::Y, 2.0, 0.5), DVec3::new(0.5, 2.0, 0.5));
    }

    #[test]
    fn test_shortest_arc_maps_direction() {
        let q = shortest_arc(DVec3::X, DVec3::new(0.0, 3.0, 0.0));
        assert!((q * DVec3::X).abs_diff_eq(DVec3::Y, TOL));
        assert_eq!(shortest_arc(DVec3::ZERO, DVec3::Y), DQuat::IDENTITY);
    }

    #[test]
    fn test_signed_angle() {
        let angle = signed_angle(DVec3::X, DVec3::Y, DVec3::Z);
        assert!((angle - FRAC_PI_2).abs() < TOL);
        let angle = signed_angle(DVec3::Y, DVec3::X, DVec3::Z);
        assert!((angle + FRAC_PI_2).abs() < TOL);
    }

    #[test]
    fn test_pole_position_scales_bend() {
        let pole = pole_position(DVec3::ZERO, DVec3::new(1.0, 1.0, 0.0), DVec3::new(2.0, 0.0, 0.0), 5.0, DVec3::Z);
        assert!(pole.abs_diff_eq(DVec3::new(1.0, 5.0, 0.0), TOL));
    }

    #[test]
    fn test_pole_position_straight_chain_uses_fallback() {
        let pole = pole_position(DVec3::ZERO, DVec3::X, DVec3::new(2.0, 0.0, 0.0), 5.0, DVec3::Z);
        assert!(pole.abs_diff_eq(DVec3::new(1.0, 0.0, 5.0), TOL));
    }

    #[test]
    fn test_two_bone_reaches_target() {
        let target = DVec3::new(1.5, 0.0, 0.0);
        let (mid, end) = solve_two_bone(DVec3::ZERO, 1.0, 1.0, target, DVec3::Y);
        assert!(end.abs_diff_eq(target, TOL));
        assert!((mid.length() - 1.0).abs() < TOL);
        assert!((mid.distance(end) - 1.0).abs() < TOL);
        assert!(mid.y > 0.0);
    }

    #[test]
    fn test_two_bone_clamps_out_of_reach() {
        let (_, end) = solve_two_bone(DVec3::ZERO, 1.0, 1.0, DVec3::new(5.0, 0.0, 0.0), DVec3::Y);
        assert!(end.abs_diff_eq(DVec3::new(2.0, 0.0, 0.0), TOL));
    }

    #[test]
    fn test_fabrik_preserves_lengths() {
        let chain = vec![DVec3::ZERO, DVec3::X, DVec3::new(2.0, 0.0, 0.0), DVec3::new(3.0, 0.0, 0.0)];
        let target = DVec3::new(1.0, 1.5, 0.0);
        let solved = solve_fabrik(&chain, target, 64, 1e-8);
        assert_eq!(solved[0], DVec3::ZERO);
        for w in solved.windows(2) {
            assert!((w[0].distance(w[1]) - 1.0).abs() < 1e-6);
        }
        assert!(solved[3].distance(target) < 1e-3);
    }

    #[test]
    fn test_fabrik_straightens_when_unreachable() {
        let chain = vec![DVec3::ZERO, DVec3::X, DVec3::new(2.0, 0.0, 0.0)];
        let solved = solve_fabrik(&chain, DVec3::new(0.0, 10.0, 0.0), 8, 1e-8);
        assert!(solved[2].abs_diff_eq(DVec3::new(0.0, 2.0, 0.0), TOL));
    }
}
