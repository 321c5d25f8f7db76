use std::sync::Arc;

use refract_spirv::{ExecutionModel, GlslOp, Op, StorageClass};
use refract_testing::shaders::{self, Fixture};

use super::*;

fn session(words: Vec<u32>) -> VmSession {
    refract_testing::init_logging();
    let program = Program::new(&words).expect("fixture decodes");
    VmSession::new(Arc::new(program))
}

fn global_id(vm: &VmSession, name: &str) -> u32 {
    vm.program().global_by_name(name).expect("global exists").id
}

fn global(vm: &VmSession, name: &str) -> Value {
    vm.global(global_id(vm, name)).cloned().expect("global has a value")
}

fn uniform_block(vm: &VmSession) -> u32 {
    vm.program()
        .globals()
        .iter()
        .find(|g| g.storage == StorageClass::Uniform)
        .expect("uniform block")
        .id
}

#[test]
fn test_run_solid_color() {
    let mut vm = session(shaders::solid_color_fragment([0.25, 0.5, 0.75, 1.0]));
    vm.start_entry().unwrap();
    assert_eq!(vm.run().unwrap(), StepEvent::Finished);
    assert_eq!(vm.status(), Status::Finished);
    assert_eq!(global(&vm, "out_color"), Value::vector(&[0.25, 0.5, 0.75, 1.0]));
}

#[test]
fn test_step_after_finish_is_rejected() {
    let mut vm = session(shaders::solid_color_fragment([1.0; 4]));
    vm.start_entry().unwrap();
    vm.run().unwrap();
    assert_eq!(vm.step(), Err(ExecutionError::NotRunning));
}

#[test]
fn test_lines_follow_execution() {
    let mut vm = session(shaders::vector_local_fragment());
    vm.start_entry().unwrap();
    assert_eq!(vm.current_line(), Some(3));

    let mut seen = Vec::new();
    while vm.is_running() {
        if let Some(line) = vm.current_line() {
            if seen.last() != Some(&line) {
                seen.push(line);
            }
        }
        vm.step().unwrap();
    }
    assert_eq!(seen, vec![3, 4, 5, 6]);
}

#[test]
fn test_vector_locals() {
    let mut vm = session(shaders::vector_local_fragment());
    vm.start_entry().unwrap();
    vm.run().unwrap();
    assert_eq!(global(&vm, "out_color"), Value::vector(&[5.0, 10.0, 15.0, 20.0]));
}

#[test]
fn test_variable_lookup_in_frame() {
    let mut vm = session(shaders::vector_local_fragment());
    vm.start_entry().unwrap();
    while vm.current_line() != Some(5) {
        vm.step().unwrap();
    }
    let (_, v) = vm.variable("v").unwrap();
    assert_eq!(v, Value::vector(&[1.0, 2.0, 3.0, 4.0]));
    let (_, s) = vm.variable("s").unwrap();
    assert_eq!(s, Value::Float(5.0));

    let names: Vec<String> = vm.locals().into_iter().map(|(name, _, _)| name).collect();
    assert_eq!(names, vec!["v".to_string(), "s".to_string()]);
}

#[test]
fn test_division_by_zero_is_reported() {
    let mut vm = session(shaders::division_fragment());
    let block = uniform_block(&vm);
    vm.set_global(block, Value::Composite(vec![Value::Int(0)]));
    vm.start_entry().unwrap();
    assert_eq!(vm.run().unwrap(), StepEvent::Finished);

    let events = vm.drain_undefined_behavior();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, UndefinedBehavior::DivisionByZero);
    assert_eq!(events[0].line, Some(4));
    assert!(vm.drain_undefined_behavior().is_empty());
}

#[test]
fn test_division_without_fault() {
    let mut vm = session(shaders::division_fragment());
    let block = uniform_block(&vm);
    vm.set_global(block, Value::Composite(vec![Value::Int(5)]));
    vm.start_entry().unwrap();
    vm.run().unwrap();
    assert!(vm.drain_undefined_behavior().is_empty());
    assert_eq!(vm.variable("q").unwrap().1, Value::Int(2));
}

#[test]
fn test_instruction_limit() {
    let mut vm = session(shaders::infinite_loop_fragment());
    vm.set_instruction_limit(1_000);
    vm.start_entry().unwrap();
    assert_eq!(vm.run().unwrap(), StepEvent::LimitReached);
    assert_eq!(vm.status(), Status::Exhausted);
    assert_eq!(vm.executed(), 1_000);
}

#[test]
fn test_call_stack() {
    let mut vm = session(shaders::call_fragment());
    vm.start_entry().unwrap();
    let mut event = StepEvent::Executed;
    while event != StepEvent::Called {
        event = vm.step().unwrap();
    }
    assert_eq!(vm.depth(), 2);

    let stack = vm.call_stack();
    assert_eq!(stack.len(), 2);
    assert_eq!(stack[0].name.as_deref(), Some("main"));
    assert_eq!(stack[0].line, Some(8));
    assert_eq!(stack[1].name.as_deref(), Some("scale(f1;"));

    assert_eq!(vm.variable("a").unwrap().1, Value::Float(1.5));

    while vm.depth() == 2 {
        vm.step().unwrap();
    }
    assert_eq!(vm.depth(), 1);
    vm.run().unwrap();
    assert_eq!(vm.variable("b").unwrap().1, Value::Float(3.0));
    assert_eq!(global(&vm, "out_color"), Value::vector(&[3.0; 4]));
}

#[test]
fn test_atomic_add_on_storage_buffer() {
    let mut vm = session(shaders::coverage_counter_fragment());
    let block = uniform_block(&vm);
    vm.set_global(block, Value::Composite(vec![Value::UInt(4)]));
    let counters = global_id(&vm, "counters");
    vm.set_global(
        counters,
        Value::Composite(vec![Value::Composite(vec![Value::UInt(0); 16])]),
    );
    let frag_coord = global_id(&vm, "gl_FragCoord");
    vm.set_global(frag_coord, Value::vector(&[1.5, 2.5, 0.5, 1.0]));

    vm.start_entry().unwrap();
    vm.run().unwrap();

    let counts = global(&vm, "counters");
    assert_eq!(counts.at(&[0, 9]), Some(&Value::UInt(1)));
    assert_eq!(counts.at(&[0, 8]), Some(&Value::UInt(0)));
    assert!(vm.drain_undefined_behavior().is_empty());
}

#[test]
fn test_out_of_bounds_index_is_reported() {
    let mut vm = session(shaders::coverage_counter_fragment());
    let block = uniform_block(&vm);
    vm.set_global(block, Value::Composite(vec![Value::UInt(4)]));
    let counters = global_id(&vm, "counters");
    vm.set_global(
        counters,
        Value::Composite(vec![Value::Composite(vec![Value::UInt(0); 4])]),
    );
    let frag_coord = global_id(&vm, "gl_FragCoord");
    vm.set_global(frag_coord, Value::vector(&[3.5, 3.5, 0.5, 1.0]));

    vm.start_entry().unwrap();
    assert_eq!(vm.run().unwrap(), StepEvent::Finished);

    let events = vm.drain_undefined_behavior();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, UndefinedBehavior::IndexOutOfBounds);
    assert_eq!(events[0].line, Some(6));
}

struct UvSampler;

impl TextureSampler for UvSampler {
    fn sample(&self, binding: u32, coord: &[f32], _lod: f32) -> [f32; 4] {
        [coord[0], coord[1], binding as f32, 1.0]
    }
}

#[test]
fn test_texture_sampling() {
    let mut vm = session(shaders::texture_fragment());
    vm.set_sampler(Arc::new(UvSampler));
    let uv = global_id(&vm, "v_uv");
    vm.set_global(uv, Value::vector(&[0.25, 0.75]));
    vm.start_entry().unwrap();
    vm.run().unwrap();
    assert_eq!(global(&vm, "out_color"), Value::vector(&[0.25, 0.75, 0.0, 1.0]));
}

#[test]
fn test_texture_without_sampler_reads_zero() {
    let mut vm = session(shaders::texture_fragment());
    vm.start_entry().unwrap();
    vm.run().unwrap();
    assert_eq!(global(&vm, "out_color"), Value::vector(&[0.0; 4]));
}

#[test]
fn test_geometry_emits_vertices() {
    let mut vm = session(shaders::geometry_passthrough());
    let input = global_id(&vm, "in_position");
    let corners = [[0.0, 0.0, 0.0, 1.0], [1.0, 0.0, 0.0, 1.0], [0.0, 1.0, 0.0, 1.0]];
    vm.set_global(
        input,
        Value::Composite(corners.iter().map(|c| Value::vector(c)).collect()),
    );
    vm.start_entry().unwrap();

    for corner in &corners {
        assert_eq!(vm.run().unwrap(), StepEvent::EmitVertex);
        assert_eq!(global(&vm, "gl_Position"), Value::vector(corner));
    }
    assert_eq!(vm.run().unwrap(), StepEvent::EndPrimitive);
    assert_eq!(vm.run().unwrap(), StepEvent::Finished);
}

#[test]
fn test_discard_kills_invocation() {
    let mut vm = session(shaders::discard_fragment());
    vm.start_entry().unwrap();
    assert_eq!(vm.run().unwrap(), StepEvent::Killed);
    assert_eq!(vm.status(), Status::Killed);
    assert_eq!(vm.current_line(), Some(4));
}

#[test]
fn test_barrier_yields() {
    let mut vm = session(shaders::shared_memory_compute());
    let index = global_id(&vm, "gl_LocalInvocationIndex");
    vm.set_global(index, Value::UInt(2));
    vm.start_entry().unwrap();
    assert_eq!(vm.run().unwrap(), StepEvent::Barrier);
    assert_eq!(global(&vm, "shared_data").at(&[2]), Some(&Value::UInt(3)));
    assert_eq!(vm.program().local_size(vm.current_function().unwrap()), [4, 1, 1]);
}

#[test]
fn test_struct_and_matrix_locals() {
    let mut vm = session(shaders::struct_local_fragment());
    vm.start_entry().unwrap();
    vm.run().unwrap();

    let light = vm.variable("light").unwrap().1;
    assert_eq!(light.at(&[1]), Some(&Value::Float(2.5)));
    assert_eq!(light.at(&[0]), Some(&Value::vector(&[0.0, 1.0, 0.0])));
    let m = vm.variable("m").unwrap().1;
    assert_eq!(m.at(&[1, 0]), Some(&Value::Float(3.0)));
    assert_eq!(global(&vm, "out_color"), Value::vector(&[1.25; 4]));
}

#[test]
fn test_cloned_sessions_are_isolated() {
    let mut template = session(shaders::tessellation_doubler());
    let input = global_id(&template, "in_value");
    template.set_global(
        input,
        Value::Composite(vec![Value::Float(1.0), Value::Float(2.0), Value::Float(3.0)]),
    );
    let invocation = global_id(&template, "gl_InvocationID");

    let mut outputs = Vec::new();
    for id in 0..3 {
        let mut vm = template.clone();
        vm.set_global(invocation, Value::Int(id));
        vm.start_entry().unwrap();
        vm.run().unwrap();
        outputs.push(global(&vm, "out_value").at(&[id as u32]).cloned());
    }
    assert_eq!(
        outputs,
        vec![Some(Value::Float(2.0)), Some(Value::Float(4.0)), Some(Value::Float(6.0))]
    );
    assert_eq!(global(&template, "out_value"), Value::Composite(vec![Value::Float(0.0); 3]));
}

/// Fragment that loads the private `mat2 m` and hands it to `apply`.
fn matrix_module(apply: impl FnOnce(&mut Fixture, u32, u32)) -> Vec<u32> {
    let mut f = Fixture::new();
    let vec2 = f.vec2;
    let mat2 = f.b.type_matrix(vec2, 2);
    let m = f.b.variable(mat2, StorageClass::Private);
    f.b.name(m, "m");
    let main = f.begin_main();
    f.line(3);
    let value = f.load(mat2, m);
    apply(&mut f, mat2, value);
    f.line(4);
    f.end_void();
    f.finish(ExecutionModel::Fragment, main)
}

fn run_with_matrix(words: Vec<u32>, columns: &[&[f32]]) -> (VmSession, Result<StepEvent>) {
    let mut vm = session(words);
    let m = global_id(&vm, "m");
    vm.set_global(m, Value::Composite(columns.iter().map(|c| Value::vector(c)).collect()));
    vm.start_entry().unwrap();
    let outcome = vm.run();
    (vm, outcome)
}

fn assert_mismatch(outcome: Result<StepEvent>, expected: Op) {
    match outcome {
        Err(ExecutionError::TypeMismatch { op, .. }) => assert_eq!(op, expected),
        other => panic!("expected a type mismatch in {expected:?}, got {other:?}"),
    }
}

#[test]
fn test_transpose_of_ragged_matrix_fails() {
    let words = matrix_module(|f, mat2, m| {
        f.b.emit_result(Op::Transpose, mat2, &[m]);
    });
    let (_, outcome) = run_with_matrix(words, &[&[1.0, 2.0], &[3.0]]);
    assert_mismatch(outcome, Op::Transpose);
}

#[test]
fn test_matrix_times_vector_checks_length() {
    let words = matrix_module(|f, _, m| {
        let vec3 = f.vec3;
        let one = f.f32(1.0);
        let v = f.b.constant_composite(vec3, &[one, one, one]);
        let vec2 = f.vec2;
        f.b.emit_result(Op::MatrixTimesVector, vec2, &[m, v]);
    });
    let (_, outcome) = run_with_matrix(words, &[&[1.0, 0.0], &[0.0, 1.0]]);
    assert_mismatch(outcome, Op::MatrixTimesVector);
}

#[test]
fn test_determinant_requires_square_matrix() {
    let words = matrix_module(|f, _, m| {
        let float = f.float;
        f.b.ext_inst(float, GlslOp::Determinant.word(), &[m]);
    });
    let (_, outcome) = run_with_matrix(words.clone(), &[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
    assert_mismatch(outcome, Op::ExtInst);
    let (_, outcome) = run_with_matrix(words, &[&[1.0, 2.0], &[3.0, 4.0, 5.0]]);
    assert_mismatch(outcome, Op::ExtInst);
}

#[test]
fn test_determinant_of_square_matrix() {
    let words = matrix_module(|f, _, m| {
        let float = f.float;
        let d = f.b.variable(float, StorageClass::Private);
        f.b.name(d, "d");
        let value = f.b.ext_inst(float, GlslOp::Determinant.word(), &[m]);
        f.store(d, value);
    });
    let (vm, outcome) = run_with_matrix(words, &[&[1.0, 2.0], &[3.0, 4.0]]);
    assert_eq!(outcome, Ok(StepEvent::Finished));
    assert_eq!(global(&vm, "d"), Value::Float(-2.0));
}

#[test]
fn test_malformed_type_is_rejected_on_load() {
    let mut f = Fixture::new();
    let float = f.float;
    let array = f.b.type_array(float, 4);
    let main = f.begin_main();
    f.end_void();
    let mut words = f.finish(ExecutionModel::Fragment, main);
    // Turn the array element into a reference to the array itself.
    let at = words
        .windows(4)
        .position(|w| w[0] & 0xffff == u32::from(Op::TypeArray.word()) && w[1] == array)
        .expect("array declaration");
    words[at + 2] = array;
    assert!(matches!(
        Program::new(&words),
        Err(ExecutionError::Module(refract_spirv::ModuleError::InvalidType { id, .. })) if id == array
    ));
}
