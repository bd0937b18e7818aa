//! Squash and stretch for multi-target components.
//!
//! A [`StretchPlan`] is built on regenerate. It lists measured segments, the
//! rest length of each, and the joints that receive the resulting scale. At
//! bind the rest lengths are recaptured and one [`StretchDriver`] record per
//! receiver is emitted.
//!
//! Lengths are measured in the frame of the component's space node, so
//! scaling a global control the component hangs under does not stretch it.

use crate::component::{ComponentKind, StretchParams};
use crate::error::SceneError;
use crate::scene::{MeasurePoint, NodeId, Scene, StretchDriver};
use crate::transform::{squash_factor, stretch_factor, uniform_scale, Axis};

/// How the measured distance maps to a stretch factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StretchMode {
    /// `current / rest` in both directions.
    Ratio,
    /// Like `Ratio` but never below 1.0; a short reach bends the chain.
    Reach,
}

impl StretchMode {
    /// Lowest stretch factor when the parameters set no minimum.
    pub fn floor(self) -> f64 {
        match self {
            StretchMode::Ratio => 0.0,
            StretchMode::Reach => 1.0,
        }
    }
}

/// Scale factors for the stretch axis and the two squash axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretchFactors {
    pub stretch: f64,
    pub squash: f64,
}

/// Computes the factors for one measurement. Disabled channels output 1.0.
///
/// The ratio is multiplied by `stretch_scale`, then raised to `stretch_min`
/// or the mode's floor.
pub fn evaluate(params: &StretchParams, mode: StretchMode, current: f64, rest: f64) -> StretchFactors {
    let floor = params.stretch_min.unwrap_or_else(|| mode.floor());
    let stretch = (stretch_factor(current, rest) * params.stretch_scale).max(floor);
    let squash = if params.squash_enabled {
        squash_factor(stretch, params.squash_coefficient)
    } else {
        1.0
    };
    StretchFactors {
        stretch: if params.stretch_enabled { stretch } else { 1.0 },
        squash,
    }
}

/// One measured span and the joints it scales.
#[derive(Debug, Clone, PartialEq)]
pub struct StretchSegment {
    pub from: MeasurePoint,
    pub to: MeasurePoint,
    /// Joints whose summed bone length is the rest length.
    pub rest_chain: Vec<NodeId>,
    pub rest_length: f64,
    pub mode: StretchMode,
    pub receivers: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StretchPlan {
    pub axis: Axis,
    pub params: StretchParams,
    /// Node whose world scale divides every measured length.
    pub reference: Option<NodeId>,
    pub segments: Vec<StretchSegment>,
}

/// Inputs for planning, all resolved scene handles.
#[derive(Debug, Clone, Copy)]
pub struct StretchInputs<'a> {
    pub kind: ComponentKind,
    pub params: &'a StretchParams,
    pub axis: Axis,
    pub leaf: bool,
    pub targets: &'a [NodeId],
    pub structural: &'a [NodeId],
    pub main: NodeId,
    pub base: Option<NodeId>,
    /// Multi-FK child controls, root first.
    pub children: &'a [NodeId],
    /// Measurement frame, normally the component's space node.
    pub reference: Option<NodeId>,
}

impl StretchPlan {
    /// Plans the segments for a component, or `None` when nothing stretches.
    pub fn plan(scene: &dyn Scene, inputs: StretchInputs<'_>) -> Result<Option<Self>, SceneError> {
        if !inputs.params.is_active() || !inputs.kind.supports_stretch() {
            return Ok(None);
        }
        let segments = if inputs.kind == ComponentKind::MultiFk {
            fk_segments(&inputs)
        } else {
            ik_segments(&inputs)
        };
        if segments.is_empty() {
            return Ok(None);
        }
        let mut plan = Self {
            axis: inputs.axis,
            params: inputs.params.clone(),
            reference: inputs.reference,
            segments,
        };
        plan.recapture(scene)?;
        Ok(Some(plan))
    }

    /// Re-measures every rest length from the current pose.
    pub fn recapture(&mut self, scene: &dyn Scene) -> Result<(), SceneError> {
        let scale = match self.reference {
            Some(node) => uniform_scale(scene.world_matrix(node)?),
            None => 1.0,
        };
        for segment in &mut self.segments {
            segment.rest_length = chain_length(scene, &segment.rest_chain)? / scale;
        }
        Ok(())
    }

    /// Constraint records for every receiver.
    pub fn drivers(&self) -> Vec<StretchDriver> {
        self.segments
            .iter()
            .flat_map(|segment| {
                segment.receivers.iter().map(move |receiver| StretchDriver {
                    driven: *receiver,
                    from: segment.from,
                    to: segment.to,
                    rest_length: segment.rest_length,
                    reference: self.reference,
                    axis: self.axis,
                    mode: segment.mode,
                    params: self.params.clone(),
                })
            })
            .collect()
    }

    pub fn receivers(&self) -> Vec<NodeId> {
        self.segments
            .iter()
            .flat_map(|s| s.receivers.iter().copied())
            .collect()
    }
}

/// Number of leading joints the IK solve spans.
pub(crate) fn ik_span(kind: ComponentKind, joints: usize) -> usize {
    match kind {
        ComponentKind::LegIk => joints.min(3),
        _ => joints,
    }
}

fn ik_segments(inputs: &StretchInputs<'_>) -> Vec<StretchSegment> {
    let span = ik_span(inputs.kind, inputs.structural.len());
    if span < 2 {
        return Vec::new();
    }
    let from = match (inputs.kind, inputs.base) {
        (ComponentKind::ComplexIk | ComponentKind::SpineIk, Some(base)) => MeasurePoint::Node(base),
        _ => MeasurePoint::Origin(inputs.structural[0]),
    };
    let receivers = if inputs.leaf {
        inputs.targets[..span.min(inputs.targets.len())].to_vec()
    } else {
        inputs.structural[..span - 1].to_vec()
    };
    vec![StretchSegment {
        from,
        to: MeasurePoint::Node(inputs.main),
        rest_chain: inputs.structural[..span].to_vec(),
        rest_length: 0.0,
        mode: StretchMode::Reach,
        receivers,
    }]
}

fn fk_segments(inputs: &StretchInputs<'_>) -> Vec<StretchSegment> {
    let count = inputs.children.len().min(inputs.structural.len());
    let mut segments = Vec::new();
    for i in 0..count.saturating_sub(1) {
        let mut receivers = vec![if inputs.leaf {
            inputs.targets[i]
        } else {
            inputs.structural[i]
        }];
        // The terminal leaf has no segment of its own and follows the last one.
        if inputs.leaf && i + 2 == count {
            receivers.push(inputs.targets[i + 1]);
        }
        segments.push(StretchSegment {
            from: MeasurePoint::Node(inputs.children[i]),
            to: MeasurePoint::Node(inputs.children[i + 1]),
            rest_chain: vec![inputs.structural[i], inputs.structural[i + 1]],
            rest_length: 0.0,
            mode: StretchMode::Ratio,
            receivers,
        });
    }
    segments
}

fn chain_length(scene: &dyn Scene, chain: &[NodeId]) -> Result<f64, SceneError> {
    let mut total = 0.0;
    for pair in chain.windows(2) {
        let a = scene.world_matrix(pair[0])?.transform_point3(glam::DVec3::ZERO);
        let b = scene.world_matrix(pair[1])?.transform_point3(glam::DVec3::ZERO);
        total += a.distance(b);
    }
    Ok(total)
}
