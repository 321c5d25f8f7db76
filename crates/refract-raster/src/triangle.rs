//! Triangle setup and block-wise coverage.
//!
//! Vertices are projected to window space and snapped to a fixed-point
//! sub-pixel grid, so edge equations evaluate exactly in `i128`. Each edge is
//! normalized to be positive inside the triangle; a pixel centre lying exactly
//! on an edge belongs to the triangle only when that edge's `tie` flag is
//! set. Two triangles sharing an edge see it with opposite directions, so
//! exactly one of them owns such a centre.

use refract_debug::VertexOutput;
use serde::{Deserialize, Serialize};

/// Half-open pixel rectangle `[x0, x1) × [y0, y1)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Region {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn intersect(self, other: Region) -> Region {
        Region {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        }
    }

    pub fn is_empty(self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    pub fn contains(self, x: u32, y: u32) -> bool {
        (self.x0..self.x1).contains(&x) && (self.y0..self.y1).contains(&y)
    }
}

/// Guard band in pixels. Vertices are never moved; a triangle with a vertex
/// outside the band is rejected like one behind the eye. Snapped coordinates
/// stay below 2^52, so every edge product fits in `i128`.
const GUARD_BAND: f64 = (1u64 << 44) as f64;

#[derive(Debug, Clone, Copy)]
struct Edge {
    a: i128,
    b: i128,
    c: i128,
    tie: bool,
}

impl Edge {
    /// Edge `p → q`, flipped by `sign` so the interior is positive.
    fn new(p: [i64; 2], q: [i64; 2], sign: i128) -> Self {
        let dx = i128::from(q[0] - p[0]) * sign;
        let dy = i128::from(q[1] - p[1]) * sign;
        Self {
            a: -dy,
            b: dx,
            c: dy * i128::from(p[0]) - dx * i128::from(p[1]),
            tie: dy > 0 || (dy == 0 && dx > 0),
        }
    }

    fn value(&self, x: i64, y: i64) -> i128 {
        self.a * i128::from(x) + self.b * i128::from(y) + self.c
    }

    fn owns(&self, value: i128) -> bool {
        value > 0 || (value == 0 && self.tie)
    }
}

/// A triangle ready for coverage tests.
#[derive(Debug, Clone)]
pub struct Triangle {
    /// `edges[i]` is opposite vertex `i`.
    edges: [Edge; 3],
    /// Twice the absolute area, in fixed-point units.
    area: i128,
    bounds: Region,
    bits: u32,
    /// Counter-clockwise in window space (y down).
    pub front_facing: bool,
}

impl Triangle {
    /// Project and snap clip-space `vertices`.
    ///
    /// `None` for zero-area triangles, for vertices at or behind the eye and
    /// for vertices outside the guard band, all of which would need
    /// clipping.
    pub fn setup(vertices: &[VertexOutput; 3], width: u32, height: u32, subpixel_bits: u32) -> Option<Self> {
        let bits = subpixel_bits.clamp(1, 8);
        let scale = f64::from(1u32 << bits);
        let mut points = [[0i64; 2]; 3];
        for (point, vertex) in points.iter_mut().zip(vertices) {
            let [x, y, _, w] = vertex.position.map(f64::from);
            if !(w > 0.0) || !x.is_finite() || !y.is_finite() {
                return None;
            }
            let sx = ((x / w) * 0.5 + 0.5) * f64::from(width);
            let sy = ((y / w) * 0.5 + 0.5) * f64::from(height);
            if !(sx.abs() < GUARD_BAND && sy.abs() < GUARD_BAND) {
                return None;
            }
            *point = [(sx * scale).round() as i64, (sy * scale).round() as i64];
        }
        let [p0, p1, p2] = points.map(|p| p.map(i128::from));
        let signed = (p1[0] - p0[0]) * (p2[1] - p0[1]) - (p1[1] - p0[1]) * (p2[0] - p0[0]);
        if signed == 0 {
            return None;
        }
        let sign = signed.signum();

        let fixed_to_pixel = |v: i64| (v >> bits).clamp(0, i64::from(u32::MAX)) as u32;
        let min = |i: usize| points.iter().map(|p| p[i]).min().unwrap_or(0);
        let max = |i: usize| points.iter().map(|p| p[i]).max().unwrap_or(0);
        let bounds = Region {
            x0: fixed_to_pixel(min(0)),
            y0: fixed_to_pixel(min(1)),
            x1: fixed_to_pixel(max(0)).saturating_add(1).min(width),
            y1: fixed_to_pixel(max(1)).saturating_add(1).min(height),
        };

        Some(Self {
            edges: [
                Edge::new(points[1], points[2], sign),
                Edge::new(points[2], points[0], sign),
                Edge::new(points[0], points[1], sign),
            ],
            area: signed.abs(),
            bounds,
            bits,
            front_facing: signed > 0,
        })
    }

    /// Screen bounding box, clamped to the target.
    pub fn bounds(&self) -> Region {
        self.bounds
    }

    fn centre(&self, x: u32, y: u32) -> (i64, i64) {
        let half = 1i64 << (self.bits - 1);
        ((i64::from(x) << self.bits) + half, (i64::from(y) << self.bits) + half)
    }

    fn values(&self, x: u32, y: u32) -> [i128; 3] {
        let (cx, cy) = self.centre(x, y);
        self.edges.map(|e| e.value(cx, cy))
    }

    fn weights(&self, values: [i128; 3]) -> [f32; 3] {
        let area = self.area as f64;
        values.map(|v| (v as f64 / area) as f32)
    }

    /// Whether the centre of pixel `(x, y)` is covered.
    pub fn covers(&self, x: u32, y: u32) -> bool {
        let values = self.values(x, y);
        self.edges.iter().zip(values).all(|(e, v)| e.owns(v))
    }

    /// Visit every covered pixel inside `region` with its barycentric
    /// weights, walking the bounding box in `block`-sized squares.
    pub fn for_each_covered(&self, region: Region, block: u32, mut visit: impl FnMut(u32, u32, [f32; 3])) {
        let area = self.bounds.intersect(region);
        if area.is_empty() {
            return;
        }
        let block = block.max(1);
        let mut by = area.y0;
        while by < area.y1 {
            let ey = by.saturating_add(block).min(area.y1);
            let mut bx = area.x0;
            while bx < area.x1 {
                let ex = bx.saturating_add(block).min(area.x1);
                self.visit_block(Region::new(bx, by, ex, ey), &mut visit);
                bx = ex;
            }
            by = ey;
        }
    }

    fn visit_block(&self, block: Region, visit: &mut impl FnMut(u32, u32, [f32; 3])) {
        let corners = [
            self.values(block.x0, block.y0),
            self.values(block.x1 - 1, block.y0),
            self.values(block.x0, block.y1 - 1),
            self.values(block.x1 - 1, block.y1 - 1),
        ];
        let mut fully = true;
        for (i, edge) in self.edges.iter().enumerate() {
            let owned = corners.iter().filter(|c| edge.owns(c[i])).count();
            if owned == 0 {
                return;
            }
            fully &= owned == corners.len();
        }

        for y in block.y0..block.y1 {
            for x in block.x0..block.x1 {
                let values = self.values(x, y);
                if fully || self.edges.iter().zip(values).all(|(e, v)| e.owns(v)) {
                    visit(x, y, self.weights(values));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32, y: f32) -> VertexOutput {
        VertexOutput {
            position: [x, y, 0.5, 1.0],
            varyings: Vec::new(),
        }
    }

    fn coverage(triangles: &[[VertexOutput; 3]], size: u32) -> Vec<u32> {
        let mut hits = vec![0; (size * size) as usize];
        for vertices in triangles {
            let triangle = Triangle::setup(vertices, size, size, 8).unwrap();
            triangle.for_each_covered(Region::full(size, size), 4, |x, y, _| {
                hits[(y * size + x) as usize] += 1;
            });
        }
        hits
    }

    #[test]
    fn test_shared_diagonal_is_covered_once() {
        let a = [vertex(-1.0, -1.0), vertex(1.0, -1.0), vertex(1.0, 1.0)];
        let b = [vertex(-1.0, -1.0), vertex(1.0, 1.0), vertex(-1.0, 1.0)];
        assert!(coverage(&[a, b], 16).iter().all(|&n| n == 1));
    }

    #[test]
    fn test_winding_does_not_change_coverage() {
        let ccw = [vertex(-1.0, -1.0), vertex(1.0, -1.0), vertex(1.0, 1.0)];
        let cw = [vertex(-1.0, -1.0), vertex(1.0, 1.0), vertex(1.0, -1.0)];
        assert_eq!(coverage(&[ccw], 8), coverage(&[cw], 8));
    }

    #[test]
    fn test_weights_sum_to_one() {
        let vertices = [vertex(-0.9, -0.8), vertex(0.7, -0.6), vertex(0.1, 0.9)];
        let triangle = Triangle::setup(&vertices, 32, 32, 8).unwrap();
        let mut visited = 0;
        triangle.for_each_covered(Region::full(32, 32), 8, |_, _, w| {
            visited += 1;
            assert!(w.iter().all(|&c| c >= 0.0));
            assert!((w.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        });
        assert!(visited > 0);
    }

    #[test]
    fn test_degenerate_and_behind_eye_are_rejected() {
        let line = [vertex(-1.0, -1.0), vertex(0.0, 0.0), vertex(1.0, 1.0)];
        assert!(Triangle::setup(&line, 8, 8, 8).is_none());
        let mut behind = [vertex(-1.0, -1.0), vertex(1.0, -1.0), vertex(1.0, 1.0)];
        behind[2].position[3] = -1.0;
        assert!(Triangle::setup(&behind, 8, 8, 8).is_none());
    }

    #[test]
    fn test_far_vertex_keeps_edge_slope() {
        // The long edge crosses the first row at x = 750.25.
        let vertices = [vertex(-1.0, -1.0), vertex(-1.0, 1.0), vertex(3000.0, 1.0)];
        let hits = coverage(&[vertices], 1000);
        let row0 = hits[..1000].iter().filter(|&&n| n == 1).count();
        assert_eq!(row0, 750);
        let last = hits[999 * 1000..].iter().filter(|&&n| n == 1).count();
        assert_eq!(last, 1000);
    }

    #[test]
    fn test_vertex_outside_guard_band_is_rejected() {
        let mut vertices = [vertex(-1.0, -1.0), vertex(1.0, -1.0), vertex(1.0, 1.0)];
        vertices[2].position = [1.0, 1.0, 0.5, 1.0e-30];
        assert!(Triangle::setup(&vertices, 8, 8, 8).is_none());
    }

    #[test]
    fn test_region_clips_coverage() {
        let vertices = [vertex(-1.0, -1.0), vertex(3.0, -1.0), vertex(-1.0, 3.0)];
        let triangle = Triangle::setup(&vertices, 8, 8, 8).unwrap();
        let mut pixels = Vec::new();
        triangle.for_each_covered(Region::new(2, 3, 4, 5), 8, |x, y, _| pixels.push((x, y)));
        assert_eq!(pixels, vec![(2, 3), (3, 3), (2, 4), (3, 4)]);
    }
}
