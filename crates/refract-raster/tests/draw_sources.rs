//! Draws fed by custom vertex sources.
//!
//! Verifies: procedural sources, instancing, indexed draws and drawing single
//! items over an existing frame.

use std::sync::Arc;

use refract_debug::{DebugSession, StaticBindings};
use refract_raster::{pack_rgba8, DrawItem, Pass, SoftwareRasterizer, Topology, VertexBuffer, VertexSource};
use refract_testing::shaders;

/// A triangle fan around the centre of clip space, generated on demand.
struct Disc {
    segments: u32,
    color: [f32; 4],
}

impl VertexSource for Disc {
    fn layout(&self) -> &[u32] {
        &[4, 4]
    }

    fn vertex_count(&self) -> u32 {
        self.segments + 2
    }

    fn vertex_attributes(&self, index: u32) -> Option<Vec<f32>> {
        if index >= self.vertex_count() {
            return None;
        }
        let [x, y] = match index {
            0 => [0.0, 0.0],
            i => {
                let angle = (i - 1) as f32 / self.segments as f32 * std::f32::consts::TAU;
                [angle.cos(), angle.sin()]
            }
        };
        Some([x, y, 0.5, 1.0].into_iter().chain(self.color).collect())
    }
}

fn pass() -> Pass {
    Pass::new(
        "sources",
        shaders::passthrough_vertex(),
        shaders::varying_color_fragment(),
        Arc::new(StaticBindings::new()),
    )
}

fn target(size: u32) -> SoftwareRasterizer {
    refract_testing::init_logging();
    let mut raster = SoftwareRasterizer::default();
    raster.init(size, size, [0.0, 0.0, 0.0, 1.0]);
    raster
}

#[test]
fn test_procedural_fan_covers_disc() {
    let blue = [0.0, 0.0, 1.0, 1.0];
    let disc = DrawItem::new(
        "disc",
        Topology::TriangleFan,
        Arc::new(Disc {
            segments: 32,
            color: blue,
        }),
    );
    let mut raster = target(32);
    let mut session = DebugSession::default();
    raster.render_pass(&mut session, &pass().with_item(disc)).unwrap();

    assert_eq!(raster.stats().triangles, 32);
    assert_eq!(raster.color_at(16, 16), Some([0, 0, 255, 255]));
    assert_eq!(raster.color_at(0, 0), Some([0, 0, 0, 255]));
    let covered = raster
        .color_buffer()
        .iter()
        .filter(|&&c| c == pack_rgba8(blue))
        .count();
    // Area of the unit disc is about pi / 4 of the target.
    let ratio = covered as f32 / (32.0 * 32.0);
    assert!((ratio - std::f32::consts::FRAC_PI_4).abs() < 0.05, "ratio {ratio}");
}

#[test]
fn test_instances_shade_through_depth_test() {
    let mut item = DrawItem::new(
        "quad",
        Topology::TriangleList,
        Arc::new(VertexBuffer::fullscreen_quad(0.5, [1.0; 4])),
    );
    item.instances = 2;
    let mut raster = target(5);
    let mut session = DebugSession::default();
    raster.render_pass(&mut session, &pass().with_item(item)).unwrap();

    assert_eq!(raster.stats().triangles, 4);
    assert_eq!(raster.stats().invocations, 25);
    assert_eq!(raster.pixel_count(), 25);
}

#[test]
fn test_render_primitive_draws_over_existing_frame() {
    let red = [1.0, 0.0, 0.0, 1.0];
    let green = [0.0, 1.0, 0.0, 1.0];
    let background = DrawItem::new(
        "background",
        Topology::TriangleList,
        Arc::new(VertexBuffer::fullscreen_quad(0.9, red)),
    );
    let corner = DrawItem::new(
        "corner",
        Topology::TriangleList,
        Arc::new(VertexBuffer::rectangle([-1.0, -1.0], [0.0, 0.0], 0.1, green)),
    );
    let pass = pass().with_item(background);
    let mut raster = target(8);
    let mut session = DebugSession::default();
    raster.render_pass(&mut session, &pass).unwrap();
    raster.render_primitive(&mut session, &pass, &corner).unwrap();

    assert_eq!(raster.color_at(1, 1), Some([0, 255, 0, 255]));
    assert_eq!(raster.color_at(6, 6), Some([255, 0, 0, 255]));
    assert_eq!(raster.pixel_count(), 64 + 16);
}
