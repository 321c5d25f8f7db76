use std::path::Path;
use std::sync::Arc;

use refract_spirv::{BuiltIn, ExecutionMode, ExecutionModel, StorageClass};
use refract_testing::{shaders, FIXTURE_FILE};
use refract_vm::{UndefinedBehavior, Value};

use super::*;

fn session_for(stage: ShaderStage, module: Vec<u32>, bindings: StaticBindings) -> DebugSession {
    refract_testing::init_logging();
    let mut session = DebugSession::default();
    session
        .prepare_stage(stage, &module, Arc::new(bindings), None)
        .expect("fixture prepares");
    session
}

fn corner(position: [f32; 4], color: [f32; 4]) -> VertexOutput {
    VertexOutput {
        position,
        varyings: vec![(0, color.to_vec())],
    }
}

/// Pixel `(x, y)` inside a triangle whose corners all carry `color`.
fn pixel_at(x: u32, y: u32, color: [f32; 4]) -> PixelInput {
    PixelInput {
        position: [x as f32 + 0.5, y as f32 + 0.5],
        vertices: [
            corner([-1.0, -1.0, 0.5, 1.0], color),
            corner([3.0, -1.0, 0.5, 1.0], color),
            corner([-1.0, 3.0, 0.5, 1.0], color),
        ],
        weights: [1.0 / 3.0; 3],
        front_facing: true,
    }
}

fn counters(len: usize) -> Value {
    Value::Composite(vec![Value::Composite(vec![Value::UInt(0); len])])
}

fn assert_close(actual: [f32; 4], expected: [f32; 4]) {
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-5, "{actual:?} != {expected:?}");
    }
}

// ============================================================================
// Preparation
// ============================================================================

#[test]
fn test_prepare_requires_matching_entry_point() {
    refract_testing::init_logging();
    let mut session = DebugSession::default();
    let err = session
        .prepare_stage(
            ShaderStage::Vertex,
            &shaders::solid_color_fragment([1.0; 4]),
            Arc::new(StaticBindings::new()),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, DebugError::MissingEntryPoint(ShaderStage::Vertex)));
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_prepare_rejected_while_suspended() {
    let mut session = session_for(ShaderStage::Pixel, shaders::call_fragment(), StaticBindings::new());
    assert!(session.step());
    assert_eq!(session.state(), SessionState::Suspended);

    let err = session
        .prepare_stage(
            ShaderStage::Pixel,
            &shaders::call_fragment(),
            Arc::new(StaticBindings::new()),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, DebugError::Busy(SessionState::Suspended)));

    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn test_introspection_trims_function_names() {
    let session = session_for(ShaderStage::Pixel, shaders::call_fragment(), StaticBindings::new());
    let info = session.introspection();
    assert_eq!(info.function_at_line(3).map(|f| f.name.as_str()), Some("scale"));
    assert_eq!(info.function_at_line(8).map(|f| f.name.as_str()), Some("main"));
}

#[test]
fn test_config_partial_json() {
    let config: SessionConfig = serde_json::from_str(r#"{ "max_instructions": 50 }"#).unwrap();
    assert_eq!(config.max_instructions, 50);
    assert!(config.trim_function_names);
    assert!(config.write_back_storage);
    assert_eq!(config.max_barrier_rounds, SessionConfig::default().max_barrier_rounds);
    assert_eq!(config.clip_depth, ClipDepth::ZeroToOne);

    let config: SessionConfig = serde_json::from_str(r#"{ "clip_depth": "negative_one_to_one" }"#).unwrap();
    assert_eq!(config.clip_depth, ClipDepth::NegativeOneToOne);
}

// ============================================================================
// Run to completion
// ============================================================================

#[test]
fn test_vertex_passthrough() {
    let mut session = session_for(ShaderStage::Vertex, shaders::passthrough_vertex(), StaticBindings::new());
    assert!(session.set_vertex_shader_input(&VertexInput {
        vertex_id: 2,
        instance_id: 0,
        attributes: vec![vec![0.5, -0.5, 0.25, 1.0], vec![0.1, 0.2, 0.3, 1.0]],
    }));
    let output = session.execute_vertex_shader().unwrap();
    assert_eq!(output.position, [0.5, -0.5, 0.25, 1.0]);
    assert_eq!(output.varying(0), Some(&[0.1, 0.2, 0.3, 1.0][..]));
}

#[test]
fn test_setter_for_other_stage_is_ignored() {
    let mut session = session_for(ShaderStage::Vertex, shaders::passthrough_vertex(), StaticBindings::new());
    assert_eq!(session.set_pixel_shader_input(&pixel_at(0, 0, [1.0; 4])), 0.0);
    assert!(session.execute_pixel_shader().is_none());
}

#[test]
fn test_pixel_interpolates_varyings() {
    let mut session = session_for(ShaderStage::Pixel, shaders::varying_color_fragment(), StaticBindings::new());
    let depth = session.set_pixel_shader_input(&pixel_at(1, 1, [0.2, 0.4, 0.6, 1.0]));
    assert!((depth - 0.5).abs() < 1e-6);

    let result = session.execute_pixel_shader().unwrap();
    assert!(!result.discarded);
    assert!((result.depth - 0.5).abs() < 1e-6);
    assert_close(result.color, [0.2, 0.4, 0.6, 1.0]);
    assert!(result.instruction_count > 0);
}

#[test]
fn test_frag_coord_depth_follows_clip_convention() {
    let mut f = shaders::Fixture::new();
    let vec4 = f.vec4;
    f.builtin("gl_FragCoord", vec4, StorageClass::Input, BuiltIn::FragCoord);
    let main = f.begin_main();
    f.line(2);
    f.end_void();
    let module = f.finish(ExecutionModel::Fragment, main);

    let mut input = pixel_at(3, 4, [1.0; 4]);
    for vertex in &mut input.vertices {
        vertex.position = [vertex.position[0] * 2.0, vertex.position[1] * 2.0, -0.5, 2.0];
    }
    for (clip, expected) in [(ClipDepth::ZeroToOne, -0.25), (ClipDepth::NegativeOneToOne, 0.375)] {
        let mut session = DebugSession::new(SessionConfig {
            clip_depth: clip,
            ..SessionConfig::default()
        });
        session
            .prepare_stage(ShaderStage::Pixel, &module, Arc::new(StaticBindings::new()), None)
            .unwrap();
        let depth = session.set_pixel_shader_input(&input);
        assert!((depth - expected).abs() < 1e-6, "{clip:?}: {depth}");
        let frag_coord = session.variable("gl_FragCoord").unwrap().value.to_f32s();
        assert_close(
            [frag_coord[0], frag_coord[1], frag_coord[2], frag_coord[3]],
            [3.5, 4.5, expected, 0.5],
        );
    }
}

#[test]
fn test_pixel_sample_preloads_inputs() {
    refract_testing::init_logging();
    let input = pixel_at(4, 2, [0.0; 4]);
    let sample = PixelSample {
        coordinate: [4, 2],
        vertices: input.vertices.to_vec(),
        weights: input.weights,
        front_facing: true,
        ..PixelSample::default()
    };
    let mut session = DebugSession::default();
    session
        .prepare_stage(
            ShaderStage::Pixel,
            &shaders::gradient_fragment(),
            Arc::new(StaticBindings::new()),
            Some(&sample),
        )
        .unwrap();
    let result = session.execute_pixel_shader().unwrap();
    assert_eq!(result.color, [4.5, 2.5, 0.0, 1.0]);
}

#[test]
fn test_discard_counts_as_discarded() {
    let mut session = session_for(ShaderStage::Pixel, shaders::discard_fragment(), StaticBindings::new());
    session.set_pixel_shader_input(&pixel_at(0, 0, [0.0; 4]));
    assert!(session.execute_pixel_shader().unwrap().discarded);
}

#[test]
fn test_instruction_ceiling_discards_pixel() {
    refract_testing::init_logging();
    let mut session = DebugSession::new(SessionConfig {
        max_instructions: 1000,
        ..SessionConfig::default()
    });
    session
        .prepare_stage(
            ShaderStage::Pixel,
            &shaders::infinite_loop_fragment(),
            Arc::new(StaticBindings::new()),
            None,
        )
        .unwrap();
    let result = session.execute_pixel_shader().unwrap();
    assert!(result.discarded);
    assert_eq!(result.instruction_count, 1000);
}

#[test]
fn test_division_by_zero_is_reported_per_pixel() {
    let bindings = StaticBindings::new().with("divisor", 0i32);
    let mut session = session_for(ShaderStage::Pixel, shaders::division_fragment(), bindings);

    let result = session.execute_pixel_shader().unwrap();
    assert!(!result.discarded);
    assert_eq!(result.ub_count, 1);
    let ub = result.ub.unwrap();
    assert_eq!(ub.kind, UndefinedBehavior::DivisionByZero);
    assert_eq!(ub.line, Some(4));

    let summary = session.take_undefined_behavior();
    assert_eq!(summary.count, 1);
    assert_eq!(session.take_undefined_behavior(), UbSummary::default());
}

#[test]
fn test_storage_writes_accumulate_across_pixels() {
    let bindings = StaticBindings::new()
        .with("width", 2u32)
        .with("counters", counters(4));
    let mut session = session_for(ShaderStage::Pixel, shaders::coverage_counter_fragment(), bindings);
    for _ in 0..2 {
        session.set_pixel_shader_input(&pixel_at(1, 0, [0.0; 4]));
        session.execute_pixel_shader().unwrap();
    }
    let counts = session.variable("counters").unwrap().value;
    assert_eq!(counts.at(&[0, 1]), Some(&Value::UInt(2)));
    assert_eq!(counts.at(&[0, 0]), Some(&Value::UInt(0)));
}

#[test]
fn test_geometry_collects_primitive() {
    let mut session = session_for(ShaderStage::Geometry, shaders::geometry_passthrough(), StaticBindings::new());
    let triangle: Vec<VertexOutput> = (0..3)
        .map(|i| {
            let p = [i as f32, 0.0, 0.0, 1.0];
            VertexOutput {
                position: [0.0; 4],
                varyings: vec![(0, p.to_vec())],
            }
        })
        .collect();
    assert!(session.set_geometry_shader_input(&triangle, 0));

    let output = session.execute_geometry_shader().unwrap();
    assert_eq!(output.primitives.len(), 1);
    let positions: Vec<[f32; 4]> = output.primitives[0].iter().map(|v| v.position).collect();
    assert_eq!(
        positions,
        vec![[0.0, 0.0, 0.0, 1.0], [1.0, 0.0, 0.0, 1.0], [2.0, 0.0, 0.0, 1.0]]
    );
}

#[test]
fn test_tessellation_runs_every_output_vertex() {
    let mut session = session_for(
        ShaderStage::TessellationControl,
        shaders::tessellation_doubler(),
        StaticBindings::new(),
    );
    let patch: Vec<VertexOutput> = [1.0, 2.0, 3.0]
        .into_iter()
        .map(|v| VertexOutput {
            position: [0.0, 0.0, 0.0, 1.0],
            varyings: vec![(0, vec![v])],
        })
        .collect();
    assert!(session.set_tessellation_control_shader_input(&patch, 0));

    let output = session.execute_tessellation_control_shader().unwrap();
    let doubled: Vec<Option<&[f32]>> = output.vertices.iter().map(|v| v.varying(0)).collect();
    assert_eq!(
        doubled,
        vec![Some(&[2.0][..]), Some(&[4.0][..]), Some(&[6.0][..])]
    );
}

#[test]
fn test_compute_workgroup_shares_memory() {
    let bindings = StaticBindings::new().with("results", counters(4));
    let mut session = session_for(ShaderStage::Compute, shaders::shared_memory_compute(), bindings);
    assert!(!session.set_compute_shader_input([0; 3], [1, 1, 1], [4, 0, 0]));
    assert!(session.set_compute_shader_input([0; 3], [1, 1, 1], [1, 0, 0]));

    let result = session.execute_compute_shader().unwrap();
    assert!(result.completed);
    assert_eq!(result.invocations, 4);
    assert!(result.barrier_rounds >= 2);

    let results = session.variable("results").unwrap().value;
    let expected: Vec<Value> = [2u32, 3, 4, 1].into_iter().map(Value::UInt).collect();
    assert_eq!(results.at(&[0]), Some(&Value::Composite(expected)));
    assert_eq!(session.variable("idx").unwrap().value, Value::UInt(1));
}

/// Empty compute entry point of `size` that declares `gl_GlobalInvocationID`.
fn global_id_compute(size: [u32; 3]) -> Vec<u32> {
    let mut f = shaders::Fixture::new();
    let uint = f.uint;
    let uvec3 = f.b.type_vector(uint, 3);
    f.builtin("gl_GlobalInvocationID", uvec3, StorageClass::Input, BuiltIn::GlobalInvocationId);
    let main = f.begin_main();
    f.line(2);
    f.end_void();
    f.b.execution_mode(main, ExecutionMode::LocalSize, &size);
    f.finish(ExecutionModel::GLCompute, main)
}

#[test]
fn test_large_vertex_index_is_exact() {
    let mut f = shaders::Fixture::new();
    let int = f.int;
    f.builtin("gl_VertexIndex", int, StorageClass::Input, BuiltIn::VertexIndex);
    let main = f.begin_main();
    f.line(2);
    f.end_void();
    let module = f.finish(ExecutionModel::Vertex, main);

    let mut session = session_for(ShaderStage::Vertex, module, StaticBindings::new());
    assert!(session.set_vertex_shader_input(&VertexInput {
        vertex_id: 16_777_217,
        instance_id: 0,
        attributes: Vec::new(),
    }));
    assert_eq!(session.variable("gl_VertexIndex").unwrap().value, Value::Int(16_777_217));
}

#[test]
fn test_large_global_invocation_id_is_exact() {
    let mut session = session_for(ShaderStage::Compute, global_id_compute([4, 1, 1]), StaticBindings::new());
    assert!(session.set_compute_shader_input([4_194_305, 0, 0], [4_194_306, 1, 1], [1, 0, 0]));
    let expected = Value::Composite(vec![Value::UInt(16_777_221), Value::UInt(0), Value::UInt(0)]);
    assert_eq!(session.variable("gl_GlobalInvocationID").unwrap().value, expected);
}

#[test]
fn test_global_invocation_id_wraps() {
    let mut session = session_for(ShaderStage::Compute, global_id_compute([4, 1, 1]), StaticBindings::new());
    assert!(session.set_compute_shader_input([u32::MAX, 0, 0], [1, 1, 1], [3, 0, 0]));
    let expected = Value::Composite(vec![Value::UInt(u32::MAX), Value::UInt(0), Value::UInt(0)]);
    assert_eq!(session.variable("gl_GlobalInvocationID").unwrap().value, expected);
}

#[test]
fn test_oversized_workgroup_is_not_executed() {
    for size in [[MAX_WORKGROUP_INVOCATIONS, 2, 1], [u32::MAX, u32::MAX, 2]] {
        let mut session = session_for(ShaderStage::Compute, global_id_compute(size), StaticBindings::new());
        assert!(session.set_compute_shader_input([0; 3], [1, 1, 1], [0; 3]));
        assert_eq!(session.execute_compute_shader(), None);
    }
}

#[test]
fn test_pixel_runner_reads_variable_at_line() {
    let session = session_for(ShaderStage::Pixel, shaders::gradient_fragment(), StaticBindings::new());
    let runner = session.pixel_runner().unwrap();
    let input = pixel_at(3, 2, [0.0; 4]);
    assert_eq!(runner.variable_at(&input, "x", 5), Some(Value::Float(3.5)));
    assert_eq!(runner.variable_at(&input, "y", 4), Some(Value::Float(0.0)));
}

// ============================================================================
// Interactive execution
// ============================================================================

#[test]
fn test_step_over_and_into_calls() {
    let mut session = session_for(ShaderStage::Pixel, shaders::call_fragment(), StaticBindings::new());
    assert!(session.step());
    assert_eq!(session.current_line(), Some(7));
    assert!(session.step());
    assert_eq!(session.current_line(), Some(8));
    assert!(session.step());
    assert_eq!(session.current_line(), Some(9));
    assert_eq!(session.call_stack().len(), 1);
}

#[test]
fn test_step_into_and_out() {
    let mut session = session_for(ShaderStage::Pixel, shaders::call_fragment(), StaticBindings::new());
    session.step();
    session.step();
    while session.call_stack().len() < 2 {
        assert!(session.step_into());
    }
    let stack = session.call_stack();
    assert_eq!(stack[1].name.as_deref(), Some("scale"));
    assert_eq!(stack[0].line, Some(8));

    assert!(session.step_out());
    assert_eq!(session.call_stack().len(), 1);
    assert_eq!(session.current_line(), Some(8));
    assert_eq!(session.variable("b").unwrap().value, Value::Float(0.0));

    assert!(session.step());
    assert_eq!(session.variable("b").unwrap().value, Value::Float(3.0));
}

#[test]
fn test_run_to_end_stops_session() {
    let mut session = session_for(ShaderStage::Pixel, shaders::struct_local_fragment(), StaticBindings::new());
    assert!(!session.continue_execution());
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(!session.step());
}

#[test]
fn test_locals_are_pretty_printed() {
    let mut session = session_for(ShaderStage::Pixel, shaders::struct_local_fragment(), StaticBindings::new());
    session.continue_execution();

    let light = session.variable("light").unwrap();
    assert_eq!(light.text, "{ direction = (x = 0.0, y = 1.0, z = 0.0), power = 2.5 }");
    let weights = session.variable("weights").unwrap();
    assert_eq!(weights.text, "[ [0] = 0.25, [1] = 0.5, [2] = 0.25 ]");
    let m = session.variable("m").unwrap();
    assert_eq!(m.text, "[(1.0, 3.0), (2.0, 4.0)]");

    let mut names: Vec<String> = session.local_variables().into_iter().map(|v| v.name).collect();
    names.sort();
    assert_eq!(names, vec!["light", "m", "weights"]);
    assert!(session.global_variables().iter().any(|v| v.name == "out_color"));
}

#[test]
fn test_jump_back_rolls_back_memory() {
    let bindings = StaticBindings::new()
        .with("width", 2u32)
        .with("counters", counters(4));
    let mut session = session_for(ShaderStage::Pixel, shaders::coverage_counter_fragment(), bindings);
    session.set_pixel_shader_input(&pixel_at(0, 0, [0.0; 4]));
    session.add_breakpoint(FIXTURE_FILE, 7);

    assert!(session.continue_execution());
    assert_eq!(session.current_line(), Some(7));
    let counts = session.variable("counters").unwrap().value;
    assert_eq!(counts.at(&[0, 0]), Some(&Value::UInt(1)));

    assert!(session.jump(6));
    assert_eq!(session.current_line(), Some(6));
    let counts = session.variable("counters").unwrap().value;
    assert_eq!(counts.at(&[0, 0]), Some(&Value::UInt(0)));

    session.clear_breakpoints();
    assert!(!session.continue_execution());
    let counts = session.variable("counters").unwrap().value;
    assert_eq!(counts.at(&[0, 0]), Some(&Value::UInt(1)));
}

#[test]
fn test_jump_forward() {
    let mut session = session_for(ShaderStage::Pixel, shaders::vector_local_fragment(), StaticBindings::new());
    assert!(session.jump(5));
    assert_eq!(session.variable("s").unwrap().value, Value::Float(5.0));
    assert!(!session.jump(42));
    assert_eq!(session.state(), SessionState::Stopped);
}

// ============================================================================
// Breakpoints
// ============================================================================

#[test]
fn test_conditional_breakpoint_true() {
    let bindings = StaticBindings::new().with("u_x", 10.0f32);
    let mut session = session_for(ShaderStage::Pixel, shaders::conditional_fragment(), bindings);
    assert!(session.add_conditional_breakpoint(FIXTURE_FILE, 5, "x > 5.0"));

    assert!(session.continue_execution());
    assert_eq!(session.current_line(), Some(5));
    assert_eq!(session.state(), SessionState::Suspended);
    let bp = session.breakpoints().get(Path::new(FIXTURE_FILE), 5).unwrap();
    assert!(bp.is_compiled());
    assert!(bp.diagnostic().is_none());
}

#[test]
fn test_conditional_breakpoint_false() {
    let bindings = StaticBindings::new().with("u_x", 3.0f32);
    let mut session = session_for(ShaderStage::Pixel, shaders::conditional_fragment(), bindings);
    session.add_conditional_breakpoint(FIXTURE_FILE, 5, "x > 5.0");

    assert!(!session.continue_execution());
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn test_broken_condition_never_triggers() {
    let mut session = session_for(ShaderStage::Pixel, shaders::conditional_fragment(), StaticBindings::new());
    session.add_conditional_breakpoint(FIXTURE_FILE, 5, "missing > 1.0");

    assert!(!session.continue_execution());
    let bp = session.breakpoints().get(Path::new(FIXTURE_FILE), 5).unwrap();
    assert!(!bp.is_compiled());
    assert!(bp.diagnostic().is_some());
}

#[test]
fn test_disabled_breakpoint_keeps_condition() {
    let bindings = StaticBindings::new().with("u_x", 10.0f32);
    let mut session = session_for(ShaderStage::Pixel, shaders::conditional_fragment(), bindings);
    session.add_conditional_breakpoint(FIXTURE_FILE, 5, "x > 5.0");
    assert!(session.set_breakpoint_enabled(FIXTURE_FILE, 5, false));

    assert!(!session.continue_execution());
    let bp = session.breakpoints().get(Path::new(FIXTURE_FILE), 5).unwrap();
    assert!(!bp.enabled);
    assert_eq!(bp.condition(), Some("x > 5.0"));
}

#[test]
fn test_breakpoint_registry_edits() {
    let mut session = DebugSession::default();
    assert!(session.add_breakpoint("/src/a.glsl", 3));
    assert!(!session.add_breakpoint("/src/a.glsl", 3));
    assert!(session.add_breakpoint("/src/b.glsl", 3));
    assert!(session.move_breakpoint("/src/a.glsl", 3, "/src/a.glsl", 9));
    assert!(!session.move_breakpoint("/src/a.glsl", 9, "/src/b.glsl", 3));
    assert!(session.set_breakpoint_condition("/src/a.glsl", 9, Some("i == 2".to_string())));
    assert_eq!(
        session
            .breakpoints()
            .get(Path::new("/src/a.glsl"), 9)
            .and_then(|bp| bp.condition()),
        Some("i == 2")
    );
    assert!(session.remove_breakpoint("/src/b.glsl", 3));
    assert!(!session.remove_breakpoint("/src/b.glsl", 3));
    assert_eq!(session.breakpoints().len(), 1);
    session.clear_breakpoints();
    assert!(session.breakpoints().is_empty());
}

#[test]
fn test_breakpoint_aware_pixel_run_snapshots_hit() {
    let mut session = session_for(ShaderStage::Pixel, shaders::conditional_fragment(), StaticBindings::new());
    session.add_breakpoint(FIXTURE_FILE, 5);

    let result = session.execute_pixel_shader_with_breakpoints().unwrap();
    assert!(result.breakpoint_hit);
    let snapshot = session.take_breakpoint_snapshot().unwrap();
    assert_eq!(snapshot.current_line(), Some(5));
    assert!(snapshot.is_running());

    assert!(!session.execute_pixel_shader().unwrap().breakpoint_hit);
}

// ============================================================================
// Evaluation
// ============================================================================

#[test]
fn test_immediate_leaves_invocation_untouched() {
    let mut session = session_for(ShaderStage::Pixel, shaders::vector_local_fragment(), StaticBindings::new());
    session.step();
    session.step();
    session.step();
    assert_eq!(session.current_line(), Some(5));

    let value = session.immediate("v.x + v.w").unwrap();
    assert_eq!(value.value, Value::Float(5.0));
    assert_eq!(value.text, "5.0");
    assert_eq!(session.current_line(), Some(5));
    assert_eq!(session.call_stack().len(), 1);
    assert_eq!(session.state(), SessionState::Suspended);
    assert_eq!(session.variable("s").unwrap().value, Value::Float(5.0));
}

#[test]
fn test_immediate_failure_sets_diagnostic() {
    let mut session = session_for(ShaderStage::Pixel, shaders::vector_local_fragment(), StaticBindings::new());
    session.step();
    assert!(session.immediate("nope + 1.0").is_none());
    assert!(session.diagnostic().is_some());
    assert!(session.immediate("v").is_some());
    assert!(session.diagnostic().is_none());
}

#[test]
fn test_watches_update_with_color_preview() {
    let mut session = session_for(ShaderStage::Pixel, shaders::struct_local_fragment(), StaticBindings::new());
    let power = session.add_watch("light.power");
    let color = session.add_watch("out_color");
    let broken = session.add_watch("missing");
    session.continue_execution();
    session.update_watches();

    let watches = session.watches();
    assert_eq!(watches[power].value, "2.5");
    assert_eq!(watches[power].color, None);
    assert_eq!(watches[color].color, Some([1.0; 4]));
    assert!(!watches[broken].value.is_empty());
    assert_eq!(watches[broken].color, None);

    assert!(session.remove_watch(broken));
    assert!(!session.remove_watch(broken));
    assert_eq!(session.watches().len(), 2);
}

#[test]
fn test_color_preview_shapes() {
    assert_eq!(
        color_preview(&Value::vector(&[0.5, 2.0, -1.0])),
        Some([0.5, 1.0, 0.0, 1.0])
    );
    assert_eq!(color_preview(&Value::vector(&[0.5, 0.5])), None);
    assert_eq!(color_preview(&Value::Float(0.5)), None);
}
