use refract_spirv::{ExecutionModel, ModuleError, Op, StorageClass};
use refract_testing::shaders;

use super::*;

#[test]
fn test_function_names_are_trimmed() {
    let result = introspect(&shaders::call_fragment(), true).unwrap();
    let names: Vec<&str> = result.functions.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["scale", "main"]);

    let untrimmed = introspect(&shaders::call_fragment(), false).unwrap();
    assert!(untrimmed.functions.contains_key("scale(f1;"));
}

#[test]
fn test_function_line_bounds() {
    let result = introspect(&shaders::call_fragment(), true).unwrap();
    let scale = &result.functions["scale"];
    assert_eq!(scale.line_start, 2);
    assert_eq!(scale.line_end, Some(5));
    assert_eq!(scale.file.as_deref(), Some(shaders::FIXTURE_FILE));

    let main = &result.functions["main"];
    assert_eq!(main.line_start, 7);
    assert_eq!(main.line_end, Some(10));

    for f in result.functions.values() {
        assert!(f.line_start <= f.line_end.unwrap());
    }
}

#[test]
fn test_function_at_line() {
    let result = introspect(&shaders::call_fragment(), true).unwrap();
    assert_eq!(result.function_at_line(3).map(|f| f.name.as_str()), Some("scale"));
    assert_eq!(result.function_at_line(9).map(|f| f.name.as_str()), Some("main"));
    assert!(result.function_at_line(6).is_none());
    assert!(result.function_at_line(42).is_none());
}

#[test]
fn test_arguments_and_locals() {
    let result = introspect(&shaders::call_fragment(), true).unwrap();
    let scale = &result.functions["scale"];
    assert_eq!(scale.return_type.value_type, ValueType::Float);
    assert_eq!(scale.arguments.len(), 1);
    assert_eq!(scale.arguments[0].name, "a");
    assert_eq!(scale.locals.len(), 1);
    assert_eq!(scale.locals[0].name, "doubled");
    assert_eq!(scale.locals[0].storage, Some(StorageClass::Function));

    let main = &result.functions["main"];
    assert_eq!(main.return_type.value_type, ValueType::Void);
    let locals: Vec<&str> = main.locals.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(locals, vec!["a", "b"]);

    assert_eq!(result.lookup(Some("scale"), "a").map(|v| v.id), Some(scale.arguments[0].id));
    assert_eq!(result.lookup(Some("main"), "a").map(|v| v.id), Some(main.locals[0].id));
    assert_eq!(
        result.lookup(None, "out_color").map(|v| v.value_type),
        Some(ValueType::Vector)
    );
}

#[test]
fn test_user_types_and_shapes() {
    let result = introspect(&shaders::struct_local_fragment(), true).unwrap();
    let light = &result.user_types["Light"];
    assert_eq!(light.len(), 2);
    assert_eq!(light[0].name, "direction");
    assert_eq!(light[0].value_type, ValueType::Vector);
    assert_eq!(light[0].component_count, 3);
    assert_eq!(light[0].base_type, ValueType::Float);
    assert_eq!(light[1].name, "power");
    assert_eq!(light[1].value_type, ValueType::Float);

    let main = &result.functions["main"];
    let local = |name: &str| main.locals.iter().find(|v| v.name == name).unwrap();
    assert_eq!(local("light").value_type, ValueType::Struct);
    assert_eq!(local("light").type_name.as_deref(), Some("Light"));
    assert_eq!(local("weights").value_type, ValueType::Array);
    assert_eq!(local("weights").array_length, Some(3));
    assert_eq!(local("weights").base_type, ValueType::Float);
    assert_eq!(local("m").value_type, ValueType::Matrix);
    assert_eq!(local("m").columns, 2);
    assert_eq!(local("m").component_count, 4);
}

#[test]
fn test_anonymous_blocks_are_flattened() {
    let result = introspect(&shaders::coverage_counter_fragment(), true).unwrap();
    let width = result.uniforms.iter().find(|u| u.name == "width").unwrap();
    assert_eq!(width.value_type, ValueType::UInt);
    assert_eq!(width.block_member, Some(0));
    assert_eq!(width.storage, Some(StorageClass::Uniform));

    let counters = result.uniforms.iter().find(|u| u.name == "counters").unwrap();
    assert_eq!(counters.value_type, ValueType::Struct);
    assert_eq!(counters.block_member, None);
    assert_eq!(result.user_types["Counters"][0].value_type, ValueType::RuntimeArray);

    assert!(result.globals.iter().any(|g| g.name == "gl_FragCoord"));
    assert!(result.uniforms.iter().all(|u| !u.name.is_empty()));
}

#[test]
fn test_profile_and_compute_metadata() {
    let result = introspect(&shaders::shared_memory_compute(), true).unwrap();
    let profile = result.profile;
    assert!(profile.barrier_used);
    assert_eq!(profile.local_size, [4, 1, 1]);
    assert_eq!(profile.arithmetic, 3);
    assert_eq!(profile.control_flow, 1);
    assert_eq!(profile.texture, 0);
    assert_eq!(profile.total(), 4);

    assert_eq!(result.entry_points.len(), 1);
    assert_eq!(result.entry_points[0].model, Some(ExecutionModel::GLCompute));
    assert_eq!(result.entry_points[0].name, "main");
}

#[test]
fn test_profile_without_barrier() {
    let result = introspect(&shaders::texture_fragment(), true).unwrap();
    assert!(!result.profile.barrier_used);
    assert_eq!(result.profile.local_size, [0, 0, 0]);
    assert_eq!(result.profile.texture, 1);
    assert_eq!(result.files, vec![shaders::FIXTURE_FILE.to_string()]);
}

#[test]
fn test_parse_is_idempotent() {
    let words = shaders::struct_local_fragment();
    let mut introspector = BytecodeIntrospector::new();
    let first = introspector.parse(&words, true).unwrap().clone();
    let second = introspector.parse(&words, true).unwrap();
    assert_eq!(&first, second);
}

#[test]
fn test_parse_replaces_previous_result() {
    let mut introspector = BytecodeIntrospector::new();
    introspector.parse(&shaders::call_fragment(), true).unwrap();
    introspector.parse(&shaders::solid_color_fragment([1.0; 4]), true).unwrap();
    let names: Vec<&str> = introspector.result().functions.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["main"]);
}

#[test]
fn test_malformed_module_clears_result() {
    let mut introspector = BytecodeIntrospector::new();
    introspector.parse(&shaders::call_fragment(), true).unwrap();

    let mut words = shaders::solid_color_fragment([1.0; 4]);
    words.push((4 << 16) | u32::from(Op::Nop.word()));
    let err = introspector.parse(&words, true).unwrap_err();
    assert!(matches!(err, ModuleError::Truncated { needed: 4, available: 1, .. }));
    assert!(introspector.result().functions.is_empty());

    let err = introspect(&words[..3], true).unwrap_err();
    assert!(matches!(err, ModuleError::HeaderTooShort { words: 3 }));
}
