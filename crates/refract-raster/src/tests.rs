use std::sync::Arc;

use refract_debug::{DebugSession, SessionConfig, StaticBindings};
use refract_testing::{shaders, FIXTURE_FILE};
use refract_vm::{UndefinedBehavior, Value};

use super::*;

const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];

fn quad(name: &str, depth: f32, color: [f32; 4]) -> DrawItem {
    DrawItem::new(
        name,
        Topology::TriangleList,
        Arc::new(VertexBuffer::fullscreen_quad(depth, color)),
    )
}

fn pass_with(pixel_module: Vec<u32>, bindings: StaticBindings) -> Pass {
    Pass::new("main", shaders::passthrough_vertex(), pixel_module, Arc::new(bindings))
}

fn color_pass() -> Pass {
    pass_with(shaders::varying_color_fragment(), StaticBindings::new()).with_item(quad("quad", 0.5, RED))
}

fn rasterizer(width: u32, height: u32) -> SoftwareRasterizer {
    refract_testing::init_logging();
    let mut raster = SoftwareRasterizer::default();
    raster.init(width, height, [0.0, 0.0, 0.0, 1.0]);
    raster
}

#[test]
fn test_render_requires_init() {
    refract_testing::init_logging();
    let mut raster = SoftwareRasterizer::default();
    let mut session = DebugSession::default();
    let err = raster.render_pass(&mut session, &color_pass()).unwrap_err();
    assert!(matches!(err, RasterError::NotInitialized));
}

#[test]
fn test_fullscreen_quad_covers_every_pixel_once() {
    let mut raster = rasterizer(13, 7);
    let mut session = DebugSession::default();
    raster.render_pass(&mut session, &color_pass()).unwrap();

    assert_eq!(raster.pixel_count(), 13 * 7);
    assert_eq!(raster.pixels_discarded(), 0);
    assert_eq!(raster.stats().triangles, 2);
    assert!(raster.color_buffer().iter().all(|&c| c == pack_rgba8(RED)));
    assert!((raster.depth_at(12, 6).unwrap() - 0.5).abs() < 1e-6);
}

#[test]
fn test_shared_edges_shade_each_pixel_once() {
    let (width, height) = (9u32, 6u32);
    let len = (width * height) as usize;
    let bindings = StaticBindings::new()
        .with("width", width)
        .with("counters", Value::Composite(vec![Value::Composite(vec![Value::UInt(0); len])]));
    let pass = pass_with(shaders::coverage_counter_fragment(), bindings).with_item(quad("quad", 0.5, RED));

    let mut raster = rasterizer(width, height);
    let mut session = DebugSession::default();
    raster.render_pass(&mut session, &pass).unwrap();

    let counts = session.variable("counters").unwrap().value;
    for i in 0..len {
        assert_eq!(counts.at(&[0, i as u32]), Some(&Value::UInt(1)), "pixel {i}");
    }
}

#[test]
fn test_depth_test_keeps_nearest() {
    let pass = pass_with(shaders::varying_color_fragment(), StaticBindings::new())
        .with_item(quad("far", 0.8, RED))
        .with_item(quad("near", 0.2, GREEN));
    let mut raster = rasterizer(4, 4);
    let mut session = DebugSession::default();
    raster.render_pass(&mut session, &pass).unwrap();
    assert_eq!(raster.color_at(1, 2), Some([0, 255, 0, 255]));
    assert!((raster.depth_at(1, 2).unwrap() - 0.2).abs() < 1e-6);
    assert_eq!(raster.pixel_count(), 32);

    let reversed = pass_with(shaders::varying_color_fragment(), StaticBindings::new())
        .with_item(quad("near", 0.2, GREEN))
        .with_item(quad("far", 0.8, RED));
    raster.render_pass(&mut session, &reversed).unwrap();
    assert_eq!(raster.color_at(1, 2), Some([0, 255, 0, 255]));
    assert_eq!(raster.pixel_count(), 16);
    assert_eq!(raster.stats().invocations, 16);
}

#[test]
fn test_instruction_ceiling_discards_and_feeds_heatmap() {
    refract_testing::init_logging();
    let mut session = DebugSession::new(SessionConfig {
        max_instructions: 500,
        ..SessionConfig::default()
    });
    let pass = pass_with(shaders::infinite_loop_fragment(), StaticBindings::new()).with_item(quad("quad", 0.5, RED));
    let mut raster = SoftwareRasterizer::default();
    raster.init(3, 3, [0.0; 4]);
    raster.render_pass(&mut session, &pass).unwrap();

    assert_eq!(raster.pixel_count(), 0);
    assert_eq!(raster.pixels_discarded(), 9);
    assert_eq!(raster.heatmap_max(), 500);
    assert!((raster.heatmap_average() - 500.0).abs() < 1e-9);
    assert!(raster.instruction_buffer().iter().all(|&n| n == 500));
    assert_eq!(raster.color_at(0, 0), Some([0, 0, 0, 0]));
}

#[test]
fn test_discarded_pixels_leave_buffers_untouched() {
    let pass = pass_with(shaders::discard_fragment(), StaticBindings::new()).with_item(quad("quad", 0.5, RED));
    let mut raster = rasterizer(4, 2);
    let mut session = DebugSession::default();
    raster.render_pass(&mut session, &pass).unwrap();
    assert_eq!(raster.pixels_discarded(), 8);
    assert!(raster.depth_buffer().iter().all(|&d| d == 1.0));
}

#[test]
fn test_undefined_behavior_is_recorded_per_pixel() {
    let bindings = StaticBindings::new().with("divisor", 0i32);
    let pass = pass_with(shaders::division_fragment(), bindings).with_item(quad("quad", 0.5, RED));
    let mut raster = rasterizer(4, 4);
    let mut session = DebugSession::default();
    raster.render_pass(&mut session, &pass).unwrap();

    let cell = raster.ub_at(2, 3).unwrap();
    assert_eq!(cell.kind, UndefinedBehavior::DivisionByZero);
    assert_eq!(cell.line, 4);
    assert_eq!(cell.count, 1);
    assert_eq!(raster.pixel_count(), 16);
}

#[test]
fn test_region_limits_shading() {
    let mut raster = rasterizer(8, 8);
    raster.set_region(2, 2, 5, 4);
    let mut session = DebugSession::default();
    raster.render_pass(&mut session, &color_pass()).unwrap();
    assert_eq!(raster.pixel_count(), 6);
    assert_eq!(raster.color_at(0, 0), Some([0, 0, 0, 255]));
    assert_eq!(raster.color_at(4, 3), Some([255, 0, 0, 255]));

    raster.set_region(6, 6, 100, 100);
    assert_eq!(raster.region(), Region::new(6, 6, 8, 8));
}

#[test]
fn test_non_triangle_topologies_are_skipped() {
    let points = DrawItem::new(
        "points",
        Topology::PointList,
        Arc::new(VertexBuffer::fullscreen_quad(0.5, RED)),
    );
    let pass = pass_with(shaders::varying_color_fragment(), StaticBindings::new()).with_item(points);
    let mut raster = rasterizer(4, 4);
    let mut session = DebugSession::default();
    raster.render_pass(&mut session, &pass).unwrap();
    assert_eq!(raster.pixel_count(), 0);
    assert_eq!(raster.stats().triangles, 0);
}

#[test]
fn test_strip_and_fan_assembly() {
    assert_eq!(assemble(Topology::TriangleStrip, 5), vec![[0, 1, 2], [2, 1, 3], [2, 3, 4]]);
    assert_eq!(assemble(Topology::TriangleFan, 5), vec![[0, 1, 2], [0, 2, 3], [0, 3, 4]]);
    assert_eq!(assemble(Topology::TriangleList, 7).len(), 2);
    assert!(assemble(Topology::LineStrip, 7).is_empty());
}

#[test]
fn test_strip_renders_like_list() {
    let corners = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];
    let data = corners
        .iter()
        .flat_map(|[x, y]| [*x, *y, 0.5, 1.0].into_iter().chain(GREEN))
        .collect();
    let strip = DrawItem::new(
        "strip",
        Topology::TriangleStrip,
        Arc::new(VertexBuffer::new(vec![4, 4], data)),
    );
    let pass = pass_with(shaders::varying_color_fragment(), StaticBindings::new()).with_item(strip);
    let mut raster = rasterizer(6, 6);
    let mut session = DebugSession::default();
    raster.render_pass(&mut session, &pass).unwrap();
    assert_eq!(raster.pixel_count(), 36);
}

#[test]
fn test_probe_history_deduplicates_repeated_renders() {
    let mut raster = rasterizer(4, 4);
    raster.add_probe(1, 1);
    let mut session = DebugSession::default();
    let pass = color_pass();
    raster.render_pass(&mut session, &pass).unwrap();
    raster.render_pass(&mut session, &pass).unwrap();

    assert_eq!(raster.history().len(), 1);
    let sample = &raster.history()[0];
    assert_eq!(sample.coordinate, [1, 1]);
    assert_eq!(sample.normalized, [0.375, 0.375]);
    assert_eq!(sample.pass, "main");
    assert_eq!(sample.object, "quad");
    assert_eq!(pack_rgba8(sample.color), pack_rgba8(RED));
    assert_eq!(sample.vertices.len(), 3);
    assert!(!sample.fetched);
}

#[test]
fn test_probe_records_every_covering_object() {
    let pass = pass_with(shaders::varying_color_fragment(), StaticBindings::new())
        .with_item(quad("far", 0.8, RED))
        .with_item(quad("near", 0.2, GREEN));
    let mut raster = rasterizer(4, 4);
    raster.add_probe(2, 2);
    let mut session = DebugSession::default();
    raster.render_pass(&mut session, &pass).unwrap();

    let objects: Vec<&str> = raster.history().iter().map(|s| s.object.as_str()).collect();
    assert_eq!(objects, vec!["far", "near"]);
}

#[test]
fn test_reexecute_sample_marks_fetched() {
    let mut raster = rasterizer(4, 4);
    raster.add_probe(3, 0);
    let mut session = DebugSession::default();
    let pass = color_pass();
    raster.render_pass(&mut session, &pass).unwrap();

    let mut sample = raster.history()[0].clone();
    assert!(raster.reexecute_sample(&mut session, &pass, &mut sample));
    assert!(sample.fetched);
    assert_eq!(sample.reexecuted_color.map(pack_rgba8), Some(pack_rgba8(RED)));
}

#[test]
fn test_breakpoint_aware_render_records_hits() {
    refract_testing::init_logging();
    let mut raster = SoftwareRasterizer::new(RasterConfig {
        breakpoint_aware: true,
        ..RasterConfig::default()
    });
    raster.init(3, 2, [0.0; 4]);
    let mut session = DebugSession::default();
    session.add_breakpoint(FIXTURE_FILE, 5);
    let pass = pass_with(shaders::gradient_fragment(), StaticBindings::new()).with_item(quad("quad", 0.5, RED));
    raster.render_pass(&mut session, &pass).unwrap();

    assert_eq!(raster.breakpoint_hits().len(), 6);
    assert!(raster.breakpoint_buffer().iter().all(|&hit| hit));
    let (pixel, vm) = raster.take_first_breakpoint().unwrap();
    assert_eq!(vm.current_line(), Some(5));
    assert_eq!(vm.variable("x").map(|(_, v)| v), Some(Value::Float(pixel[0] as f32 + 0.5)));
}

#[test]
fn test_value_map_reads_variable_per_pixel() {
    let mut raster = rasterizer(5, 3);
    let mut session = DebugSession::default();
    let pass = pass_with(shaders::gradient_fragment(), StaticBindings::new()).with_item(quad("quad", 0.5, RED));

    let map = raster
        .allocate_variable_value_map(&mut session, &pass, "x", 5)
        .unwrap();
    assert_eq!(map.components, 1);
    assert_eq!(map.covered_count(), 15);
    assert_eq!(map.get(3, 2), Some(&[3.5][..]));
    assert_eq!(map.get(0, 1), Some(&[0.5][..]));

    assert!(raster
        .allocate_variable_value_map(&mut session, &pass, "missing", 5)
        .is_none());
}

#[test]
fn test_value_map_parallel_path_matches_serial() {
    let pass = pass_with(shaders::gradient_fragment(), StaticBindings::new()).with_item(quad("quad", 0.5, RED));
    let mut session = DebugSession::default();

    let mut serial = rasterizer(16, 16);
    serial.config_mut().serial_threshold = usize::MAX;
    let mut parallel = rasterizer(16, 16);
    parallel.config_mut().serial_threshold = 0;
    parallel.config_mut().value_map_chunk = 7;

    let a = serial.allocate_variable_value_map(&mut session, &pass, "y", 5).unwrap();
    let b = parallel.allocate_variable_value_map(&mut session, &pass, "y", 5).unwrap();
    assert_eq!(a, b);
    assert_eq!(b.get(9, 11), Some(&[11.5][..]));
}

#[test]
fn test_config_from_json() {
    let config: RasterConfig = serde_json::from_str(r#"{"block_size": 16, "breakpoint_aware": true}"#).unwrap();
    assert_eq!(config.block_size, 16);
    assert!(config.breakpoint_aware);
    assert_eq!(config.subpixel_bits, 8);

    let func: DepthFunc = serde_json::from_str(r#""less_equal""#).unwrap();
    assert!(func.passes(0.5, 0.5));
    assert!(!DepthFunc::Less.passes(0.5, 0.5));
}
