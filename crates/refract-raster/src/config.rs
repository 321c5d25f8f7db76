//! Rasterizer configuration and depth comparison.

use serde::{Deserialize, Serialize};

/// Depth comparison applied before a pixel is shaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthFunc {
    Never,
    /// Closer wins.
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

impl DepthFunc {
    /// Whether a fragment at `depth` passes against the stored `current`.
    pub fn passes(self, depth: f32, current: f32) -> bool {
        match self {
            DepthFunc::Never => false,
            DepthFunc::Less => depth < current,
            DepthFunc::Equal => depth == current,
            DepthFunc::LessEqual => depth <= current,
            DepthFunc::Greater => depth > current,
            DepthFunc::NotEqual => depth != current,
            DepthFunc::GreaterEqual => depth >= current,
            DepthFunc::Always => true,
        }
    }
}

/// Tunables for a [`SoftwareRasterizer`](crate::SoftwareRasterizer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// Edge of the square pixel blocks the bounding box is walked in.
    pub block_size: u32,

    /// Fractional bits vertices are snapped to before edge setup.
    pub subpixel_bits: u32,

    /// Value the depth buffer is cleared to.
    pub clear_depth: f32,

    /// Run pixels through the breakpoint-aware path and record hits.
    pub breakpoint_aware: bool,

    /// Fragments per parallel chunk when building variable value maps.
    pub value_map_chunk: usize,

    /// Fragment count at or below which value maps are built serially.
    pub serial_threshold: usize,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            block_size: 8,
            subpixel_bits: 8,
            clear_depth: 1.0,
            breakpoint_aware: false,
            value_map_chunk: 256,
            serial_threshold: 64,
        }
    }
}
