//! Render passes, draw items and the vertex data they pull from.

use std::fmt;
use std::sync::Arc;

use refract_debug::BindingProvider;
use serde::{Deserialize, Serialize};

use crate::config::DepthFunc;

/// How a draw item's vertices form primitives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
    PointList,
    LineList,
    LineStrip,
}

impl Topology {
    pub fn is_triangles(self) -> bool {
        matches!(
            self,
            Topology::TriangleList | Topology::TriangleStrip | Topology::TriangleFan
        )
    }
}

/// Anything that can feed vertices to a draw.
///
/// Models, vertex buffers and built-in primitives all reduce to this one
/// capability.
pub trait VertexSource: Send + Sync {
    /// Float components of each attribute location, in interleaving order.
    fn layout(&self) -> &[u32];

    fn vertex_count(&self) -> u32;

    /// Interleaved attribute data of vertex `index`.
    fn vertex_attributes(&self, index: u32) -> Option<Vec<f32>>;

    /// Index list, for indexed draws.
    fn indices(&self) -> Option<&[u32]> {
        None
    }
}

/// Split interleaved vertex data into one list per attribute location.
pub fn split_attributes(layout: &[u32], data: &[f32]) -> Vec<Vec<f32>> {
    let mut offset = 0;
    layout
        .iter()
        .map(|&components| {
            let end = (offset + components as usize).min(data.len());
            let attribute = data.get(offset..end).unwrap_or_default().to_vec();
            offset = end;
            attribute
        })
        .collect()
}

/// Interleaved vertices held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexBuffer {
    layout: Vec<u32>,
    data: Vec<f32>,
    indices: Option<Vec<u32>>,
}

impl VertexBuffer {
    pub fn new(layout: Vec<u32>, data: Vec<f32>) -> Self {
        Self {
            layout,
            data,
            indices: None,
        }
    }

    pub fn with_indices(mut self, indices: Vec<u32>) -> Self {
        self.indices = Some(indices);
        self
    }

    /// Two triangles covering clip space at `depth`, as `(position: vec4,
    /// color: vec4)` vertices.
    pub fn fullscreen_quad(depth: f32, color: [f32; 4]) -> Self {
        Self::rectangle([-1.0, -1.0], [1.0, 1.0], depth, color)
    }

    /// Two triangles covering the clip-space rectangle `min..max`.
    pub fn rectangle(min: [f32; 2], max: [f32; 2], depth: f32, color: [f32; 4]) -> Self {
        let corners = [
            [min[0], min[1]],
            [max[0], min[1]],
            [max[0], max[1]],
            [min[0], max[1]],
        ];
        let data = corners
            .iter()
            .flat_map(|[x, y]| [*x, *y, depth, 1.0].into_iter().chain(color))
            .collect();
        Self::new(vec![4, 4], data).with_indices(vec![0, 1, 2, 0, 2, 3])
    }

    fn stride(&self) -> usize {
        self.layout.iter().map(|&c| c as usize).sum()
    }
}

impl VertexSource for VertexBuffer {
    fn layout(&self) -> &[u32] {
        &self.layout
    }

    fn vertex_count(&self) -> u32 {
        match self.stride() {
            0 => 0,
            stride => (self.data.len() / stride) as u32,
        }
    }

    fn vertex_attributes(&self, index: u32) -> Option<Vec<f32>> {
        let stride = self.stride();
        let start = index as usize * stride;
        self.data.get(start..start + stride).map(<[f32]>::to_vec)
    }

    fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }
}

/// One draw call of a pass.
#[derive(Clone)]
pub struct DrawItem {
    pub name: String,
    pub topology: Topology,
    pub source: Arc<dyn VertexSource>,
    pub instances: u32,
}

impl DrawItem {
    pub fn new(name: impl Into<String>, topology: Topology, source: Arc<dyn VertexSource>) -> Self {
        Self {
            name: name.into(),
            topology,
            source,
            instances: 1,
        }
    }

    /// Vertex indices in draw order.
    pub fn vertex_order(&self) -> Vec<u32> {
        match self.source.indices() {
            Some(indices) => indices.to_vec(),
            None => (0..self.source.vertex_count()).collect(),
        }
    }
}

impl fmt::Debug for DrawItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawItem")
            .field("name", &self.name)
            .field("topology", &self.topology)
            .field("vertices", &self.source.vertex_count())
            .field("instances", &self.instances)
            .finish()
    }
}

/// A shader pair, its bindings and the items drawn with it.
#[derive(Clone)]
pub struct Pass {
    pub name: String,
    pub vertex_module: Vec<u32>,
    pub pixel_module: Vec<u32>,
    pub bindings: Arc<dyn BindingProvider>,
    pub depth_func: DepthFunc,
    pub items: Vec<DrawItem>,
}

impl Pass {
    pub fn new(
        name: impl Into<String>,
        vertex_module: Vec<u32>,
        pixel_module: Vec<u32>,
        bindings: Arc<dyn BindingProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            vertex_module,
            pixel_module,
            bindings,
            depth_func: DepthFunc::default(),
            items: Vec::new(),
        }
    }

    pub fn with_item(mut self, item: DrawItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_depth_func(mut self, depth_func: DepthFunc) -> Self {
        self.depth_func = depth_func;
        self
    }
}

impl fmt::Debug for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pass")
            .field("name", &self.name)
            .field("depth_func", &self.depth_func)
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}
