//! Refract Raster - software rasterization over debug sessions
//!
//! A [`SoftwareRasterizer`] replays a [`Pass`] on the CPU: vertices are shaded
//! through the session's vertex stage, triangles are covered block by block
//! with exact fixed-point edge tests, and every covered pixel runs through the
//! session's pixel stage. Besides color and depth it keeps per-pixel
//! instruction counts, undefined-behavior cells and breakpoint hits, records
//! pixel history at probed coordinates, and builds spatial watches of a single
//! variable across the whole target.

pub mod config;
pub mod error;
pub mod pass;
pub mod rasterizer;
pub mod target;
pub mod triangle;
pub mod value_map;

pub use config::{DepthFunc, RasterConfig};
pub use error::{RasterError, Result};
pub use pass::{split_attributes, DrawItem, Pass, Topology, VertexBuffer, VertexSource};
pub use rasterizer::{assemble, AssembledTriangle, RasterStats, SoftwareRasterizer};
pub use target::{pack_rgba8, unpack_rgba8, UbCell};
pub use triangle::{Region, Triangle};
pub use value_map::VariableValueMap;

#[cfg(test)]
mod tests;
