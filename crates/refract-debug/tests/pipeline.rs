//! End-to-end stage chaining through a single debug session.
//!
//! Verifies: vertex stage → pixel inputs → pixel stage → stepping the same
//! pixel under a breakpoint.

use std::sync::Arc;

use refract_debug::{
    DebugSession, PixelInput, PixelSample, SessionState, ShaderStage, StaticBindings, VertexInput,
    VertexOutput,
};
use refract_testing::{shaders, FIXTURE_FILE};
use refract_vm::Value;

fn run_vertices(session: &mut DebugSession, corners: &[([f32; 4], [f32; 4])]) -> Vec<VertexOutput> {
    session
        .prepare_stage(
            ShaderStage::Vertex,
            &shaders::passthrough_vertex(),
            Arc::new(StaticBindings::new()),
            None,
        )
        .expect("vertex stage prepares");
    corners
        .iter()
        .enumerate()
        .map(|(i, (position, color))| {
            assert!(session.set_vertex_shader_input(&VertexInput {
                vertex_id: i as u32,
                instance_id: 0,
                attributes: vec![position.to_vec(), color.to_vec()],
            }));
            session.execute_vertex_shader().expect("vertex executes")
        })
        .collect()
}

/// Vertex outputs feed the pixel stage and reproduce the expected color.
#[test]
fn test_vertex_outputs_drive_pixel_stage() {
    refract_testing::init_logging();
    let mut session = DebugSession::default();
    let red = [1.0, 0.0, 0.0, 1.0];
    let vertices = run_vertices(
        &mut session,
        &[
            ([-1.0, -1.0, 0.25, 1.0], red),
            ([1.0, -1.0, 0.25, 1.0], red),
            ([-1.0, 1.0, 0.25, 1.0], red),
        ],
    );
    assert_eq!(vertices[1].position, [1.0, -1.0, 0.25, 1.0]);

    session
        .prepare_stage(
            ShaderStage::Pixel,
            &shaders::varying_color_fragment(),
            Arc::new(StaticBindings::new()),
            None,
        )
        .expect("pixel stage prepares");
    let input = PixelInput {
        position: [2.5, 2.5],
        vertices: [vertices[0].clone(), vertices[1].clone(), vertices[2].clone()],
        weights: [0.5, 0.25, 0.25],
        front_facing: true,
    };
    let depth = session.set_pixel_shader_input(&input);
    assert!((depth - 0.25).abs() < 1e-6);

    let result = session.execute_pixel_shader().expect("pixel executes");
    assert!(!result.discarded);
    assert_eq!(result.color, red);
}

/// A recorded sample can be re-prepared and stepped to a breakpoint.
#[test]
fn test_recorded_sample_can_be_stepped() {
    refract_testing::init_logging();
    let mut session = DebugSession::default();
    let vertices = run_vertices(
        &mut session,
        &[
            ([-1.0, -1.0, 0.5, 1.0], [0.0; 4]),
            ([3.0, -1.0, 0.5, 1.0], [0.0; 4]),
            ([-1.0, 3.0, 0.5, 1.0], [0.0; 4]),
        ],
    );
    let sample = PixelSample {
        coordinate: [6, 1],
        vertices,
        weights: [0.6, 0.2, 0.2],
        front_facing: true,
        ..PixelSample::default()
    };

    session
        .prepare_stage(
            ShaderStage::Pixel,
            &shaders::gradient_fragment(),
            Arc::new(StaticBindings::new()),
            Some(&sample),
        )
        .expect("pixel stage prepares");
    session.add_breakpoint(FIXTURE_FILE, 5);

    assert!(session.continue_execution());
    assert_eq!(session.state(), SessionState::Suspended);
    assert_eq!(session.variable("x").map(|v| v.value), Some(Value::Float(6.5)));
    assert_eq!(session.variable("y").map(|v| v.value), Some(Value::Float(1.5)));

    let stack = session.call_stack();
    assert_eq!(stack.len(), 1);
    assert_eq!(stack[0].name.as_deref(), Some("main"));
    assert_eq!(session.current_file().as_deref(), Some(std::path::Path::new(FIXTURE_FILE)));

    assert!(!session.continue_execution());
    assert_eq!(session.state(), SessionState::Stopped);
}
