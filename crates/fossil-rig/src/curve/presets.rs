//! Unit-size built-in control shapes, authored in the XZ plane (normal +Y).

use std::f64::consts::TAU;

use super::{ControlShape, CurveData, CurveGeometry};

const CIRCLE_SEGMENTS: usize = 24;

pub(super) fn unit_geometry(shape: &ControlShape) -> CurveGeometry {
    let curves = match shape {
        ControlShape::Circle => vec![ring(|a| [a.cos(), 0.0, a.sin()])],
        ControlShape::Square => vec![closed(&[
            [1.0, 0.0, 1.0],
            [1.0, 0.0, -1.0],
            [-1.0, 0.0, -1.0],
            [-1.0, 0.0, 1.0],
        ])],
        ControlShape::Cube => vec![cube()],
        ControlShape::Star => vec![star(5, 1.0, 0.4)],
        ControlShape::Cross => vec![cross(1.0, 1.0 / 3.0)],
        ControlShape::Triangle => vec![closed(&[
            [0.0, 0.0, 1.0],
            [0.866_025_403_784_438_6, 0.0, -0.5],
            [-0.866_025_403_784_438_6, 0.0, -0.5],
        ])],
        ControlShape::Diamond => vec![closed(&[
            [1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
            [-1.0, 0.0, 0.0],
            [0.0, 0.0, -1.0],
        ])],
        ControlShape::Sphere => vec![
            ring(|a| [a.cos(), 0.0, a.sin()]),
            ring(|a| [a.cos(), a.sin(), 0.0]),
            ring(|a| [0.0, a.cos(), a.sin()]),
        ],
        ControlShape::Arrow => vec![closed(&[
            [1.0, 0.0, 0.0],
            [0.3, 0.0, 0.6],
            [0.3, 0.0, 0.25],
            [-1.0, 0.0, 0.25],
            [-1.0, 0.0, -0.25],
            [0.3, 0.0, -0.25],
            [0.3, 0.0, -0.6],
        ])],
        ControlShape::None | ControlShape::Library(_) => Vec::new(),
    };
    CurveGeometry::new(curves)
}

fn closed(points: &[[f64; 3]]) -> CurveData {
    let mut cvs = points.to_vec();
    if let Some(first) = points.first() {
        cvs.push(*first);
    }
    CurveData::linear(cvs)
}

fn ring(point: impl Fn(f64) -> [f64; 3]) -> CurveData {
    let points: Vec<[f64; 3]> = (0..CIRCLE_SEGMENTS)
        .map(|i| point(TAU * i as f64 / CIRCLE_SEGMENTS as f64))
        .collect();
    closed(&points)
}

fn star(points: usize, outer: f64, inner: f64) -> CurveData {
    let corners: Vec<[f64; 3]> = (0..points * 2)
        .map(|i| {
            let radius = if i % 2 == 0 { outer } else { inner };
            let angle = TAU * i as f64 / (points * 2) as f64;
            [radius * angle.sin(), 0.0, radius * angle.cos()]
        })
        .collect();
    closed(&corners)
}

fn cross(extent: f64, half_width: f64) -> CurveData {
    let (e, w) = (extent, half_width);
    closed(&[
        [w, 0.0, e],
        [w, 0.0, w],
        [e, 0.0, w],
        [e, 0.0, -w],
        [w, 0.0, -w],
        [w, 0.0, -e],
        [-w, 0.0, -e],
        [-w, 0.0, -w],
        [-e, 0.0, -w],
        [-e, 0.0, w],
        [-w, 0.0, w],
        [-w, 0.0, e],
    ])
}

/// Single polyline tracing all twelve cube edges.
fn cube() -> CurveData {
    CurveData::linear(vec![
        [-1.0, 1.0, 1.0],
        [1.0, 1.0, 1.0],
        [1.0, 1.0, -1.0],
        [-1.0, 1.0, -1.0],
        [-1.0, 1.0, 1.0],
        [-1.0, -1.0, 1.0],
        [1.0, -1.0, 1.0],
        [1.0, 1.0, 1.0],
        [1.0, -1.0, 1.0],
        [1.0, -1.0, -1.0],
        [1.0, 1.0, -1.0],
        [1.0, -1.0, -1.0],
        [-1.0, -1.0, -1.0],
        [-1.0, 1.0, -1.0],
        [-1.0, -1.0, -1.0],
        [-1.0, -1.0, 1.0],
    ])
}
