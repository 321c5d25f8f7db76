//! Recorded pixel invocations.

use refract_vm::UbEvent;

use crate::inputs::{PixelInput, VertexOutput};

/// Everything needed to inspect, and later re-run, one pixel of a pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PixelSample {
    /// Window coordinate.
    pub coordinate: [u32; 2],
    /// Coordinate divided by the render-target size.
    pub normalized: [f32; 2],
    pub pass: String,
    pub object: String,
    pub vertex_ids: [u32; 3],
    pub instance_id: u32,
    /// Post-vertex-stage corners of the covering triangle.
    pub vertices: Vec<VertexOutput>,
    /// Screen-space barycentric weights.
    pub weights: [f32; 3],
    pub front_facing: bool,
    /// Varyings as the pixel stage received them.
    pub varyings: Vec<(u32, Vec<f32>)>,
    pub color: [f32; 4],
    /// Color produced by the last explicit re-execution.
    pub reexecuted_color: Option<[f32; 4]>,
    /// Set once the sample has been re-executed.
    pub fetched: bool,
    pub discarded: bool,
    pub instruction_count: u64,
    /// Last undefined behavior the invocation hit.
    pub ub: Option<UbEvent>,
    pub ub_count: u32,
}

impl PixelSample {
    /// Inputs that reproduce this pixel. `None` unless all three corners
    /// were recorded.
    pub fn pixel_input(&self) -> Option<PixelInput> {
        let vertices: [VertexOutput; 3] = self.vertices.clone().try_into().ok()?;
        Some(PixelInput {
            position: [
                self.coordinate[0] as f32 + 0.5,
                self.coordinate[1] as f32 + 0.5,
            ],
            vertices,
            weights: self.weights,
            front_facing: self.front_facing,
        })
    }

    /// Same object and vertices as `other`.
    pub fn same_source(&self, other: &PixelSample) -> bool {
        self.object == other.object && self.vertex_ids == other.vertex_ids
    }
}
