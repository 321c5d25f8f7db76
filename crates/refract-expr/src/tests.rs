use std::sync::Arc;

use refract_spirv::{Op, StorageClass};
use refract_testing::shaders;
use refract_vm::{Program, Value, VmSession};

use super::ast::{BinaryOp, ExprKind, UnaryOp};
use super::lexer::{lex, Token};
use super::*;

fn compiler(words: &[u32]) -> ExpressionCompiler {
    refract_testing::init_logging();
    let mut compiler = ExpressionCompiler::new();
    compiler.set_module(words).unwrap();
    compiler
}

/// VM ready to run the last compiled expression, with captures filled from `inputs`.
fn prepare(compiler: &ExpressionCompiler, inputs: &[(&str, Value)]) -> VmSession {
    let compiled = compiler.compiled().expect("expression compiled");
    let program = Program::new(&compiled.words).expect("compiled module decodes");
    let mut vm = VmSession::new(Arc::new(program));
    for capture in &compiled.captures {
        let (_, value) = inputs
            .iter()
            .find(|(name, _)| *name == capture.name)
            .expect("input for every capture");
        vm.set_global(capture.global, value.clone());
    }
    vm
}

fn run(compiler: &ExpressionCompiler, mut vm: VmSession) -> Value {
    let compiled = compiler.compiled().unwrap();
    vm.start(compiled.function, Vec::new()).unwrap();
    vm.run().unwrap();
    vm.global(compiled.result).cloned().unwrap()
}

fn evaluate(words: &[u32], function: Option<&str>, expression: &str, inputs: &[(&str, Value)]) -> Value {
    let mut compiler = compiler(words);
    compiler.compile(expression, function).unwrap();
    let vm = prepare(&compiler, inputs);
    run(&compiler, vm)
}

fn compile_error(words: &[u32], function: Option<&str>, expression: &str) -> CompileError {
    let mut compiler = compiler(words);
    let err = compiler.compile(expression, function).unwrap_err();
    assert!(compiler.compiled().is_none());
    assert!(compiler.compiled_module().is_empty());
    err
}

fn light() -> Value {
    Value::Composite(vec![Value::vector(&[0.0, 1.0, 0.0]), Value::Float(2.5)])
}

#[test]
fn test_lexer_literals() {
    let tokens: Vec<Token> = lex("1.5f 3u 7 .5 2e1 x_1 true")
        .unwrap()
        .into_iter()
        .map(|(t, _)| t)
        .collect();
    assert_eq!(
        tokens,
        vec![
            Token::Float(1.5),
            Token::UInt(3),
            Token::Integer(7),
            Token::Float(0.5),
            Token::Float(20.0),
            Token::Ident("x_1".to_string()),
            Token::True,
        ]
    );
}

#[test]
fn test_parse_precedence() {
    let expr = parse("1 + 2 * 3 == 7 && !b").unwrap();
    let ExprKind::Binary { op: BinaryOp::And, left, right } = expr.kind else {
        panic!("expected `&&` at the root");
    };
    assert!(matches!(right.kind, ExprKind::Unary { op: UnaryOp::Not, .. }));
    let ExprKind::Binary { op: BinaryOp::Eq, left: sum, .. } = left.kind else {
        panic!("expected `==` under `&&`");
    };
    let ExprKind::Binary { op: BinaryOp::Add, right: product, .. } = sum.kind else {
        panic!("expected `+` under `==`");
    };
    assert!(matches!(product.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
}

#[test]
fn test_parse_postfix_binds_tighter_than_negation() {
    let expr = parse("-light.direction[1]").unwrap();
    let ExprKind::Unary { op: UnaryOp::Neg, operand } = expr.kind else {
        panic!("expected negation at the root");
    };
    assert!(matches!(operand.kind, ExprKind::Index { .. }));
    assert_eq!(expr.span, 0..19);
}

#[test]
fn test_constant_arithmetic() {
    let words = shaders::solid_color_fragment([1.0; 4]);
    assert_eq!(evaluate(&words, None, "1.0 + 2.0", &[]), Value::Float(3.0));
    assert_eq!(evaluate(&words, None, "1 + 0.5", &[]), Value::Float(1.5));
    assert_eq!(evaluate(&words, None, "7 / 2", &[]), Value::Int(3));
    assert_eq!(evaluate(&words, None, "(2.0 + 1.0) * 2.0", &[]), Value::Float(6.0));
}

#[test]
fn test_swizzle_on_local() {
    let words = shaders::vector_local_fragment();
    let v = Value::vector(&[1.0, 2.0, 3.0, 4.0]);
    assert_eq!(
        evaluate(&words, Some("main"), "v.wx", &[("v", v.clone())]),
        Value::vector(&[4.0, 1.0])
    );
    assert_eq!(
        evaluate(&words, Some("main"), "v.b + s", &[("v", v.clone()), ("s", Value::Float(5.0))]),
        Value::Float(8.0)
    );
    assert_eq!(
        evaluate(&words, Some("main"), "v == vec4(1.0, 2.0, 3.0, 4.0)", &[("v", v)]),
        Value::Bool(true)
    );
}

/// Number of `op` instructions in a module.
fn count_op(words: &[u32], op: Op) -> usize {
    let mut count = 0;
    let mut at = 5;
    while let Some(&word) = words.get(at) {
        if word & 0xffff == u32::from(op.word()) {
            count += 1;
        }
        at += (word >> 16).max(1) as usize;
    }
    count
}

#[test]
fn test_vector_constructor_evaluates_argument_once() {
    let words = shaders::vector_local_fragment();
    let mut compiler = compiler(&words);
    compiler.compile("v", Some("main")).unwrap();
    let plain = count_op(compiler.compiled_module(), Op::Load);
    compiler.compile("vec4(v)", Some("main")).unwrap();
    assert_eq!(count_op(compiler.compiled_module(), Op::Load), plain);

    let v = Value::vector(&[1.0, 2.0, 3.0, 4.0]);
    let vm = prepare(&compiler, &[("v", v.clone())]);
    assert_eq!(run(&compiler, vm), v);
}

#[test]
fn test_struct_member_and_array_index() {
    let words = shaders::struct_local_fragment();
    let weights = Value::Composite(vec![Value::Float(0.25), Value::Float(0.5), Value::Float(0.25)]);
    let mut compiler = compiler(&words);
    let referenced = compiler
        .compile("light.power * weights[1]", Some("main"))
        .unwrap();
    assert_eq!(referenced, vec!["light".to_string(), "weights".to_string()]);

    let vm = prepare(&compiler, &[("light", light()), ("weights", weights)]);
    assert_eq!(run(&compiler, vm), Value::Float(1.25));
}

#[test]
fn test_matrix_times_vector() {
    let words = shaders::struct_local_fragment();
    let m = Value::Composite(vec![Value::vector(&[1.0, 2.0]), Value::vector(&[3.0, 4.0])]);
    assert_eq!(
        evaluate(&words, Some("main"), "m * vec2(1.0, 1.0)", &[("m", m.clone())]),
        Value::vector(&[4.0, 6.0])
    );
    assert_eq!(
        evaluate(&words, Some("main"), "m[1].y", &[("m", m)]),
        Value::Float(4.0)
    );
}

#[test]
fn test_builtins() {
    let words = shaders::vector_local_fragment();
    let s = ("s", Value::Float(5.0));
    assert_eq!(
        evaluate(&words, Some("main"), "clamp(s, 0.0, 1.0)", &[s.clone()]),
        Value::Float(1.0)
    );
    assert_eq!(evaluate(&words, None, "max(3, 7)", &[]), Value::Int(7));
    assert_eq!(
        evaluate(&words, None, "dot(vec2(1.0, 2.0), vec2(3.0, 4.0))", &[]),
        Value::Float(11.0)
    );
    assert_eq!(
        evaluate(&words, None, "length(vec2(3.0, 4.0))", &[]),
        Value::Float(5.0)
    );
}

#[test]
fn test_anonymous_block_member() {
    let words = shaders::coverage_counter_fragment();
    let mut compiler = compiler(&words);
    compiler.compile("width * 2u", Some("main")).unwrap();
    assert!(compiler.compiled().unwrap().captures.is_empty());

    let mut vm = prepare(&compiler, &[]);
    let block = vm
        .program()
        .globals()
        .iter()
        .find(|g| g.storage == StorageClass::Uniform)
        .unwrap()
        .id;
    vm.set_global(block, Value::Composite(vec![Value::UInt(4)]));
    assert_eq!(run(&compiler, vm), Value::UInt(8));
}

#[test]
fn test_captures_follow_current_function() {
    let words = shaders::call_fragment();
    let mut compiler = compiler(&words);
    compiler.compile("a * 2.0", Some("scale(f1;")).unwrap();
    let compiled = compiler.compiled().unwrap();
    assert_eq!(compiled.captures.len(), 1);
    assert_eq!(compiled.captures[0].name, "a");

    compiler.compile("a + a + b", Some("main")).unwrap();
    let names: Vec<&str> = compiler
        .compiled()
        .unwrap()
        .captures
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["a", "b"]);

    let err = compiler.compile("doubled", Some("main")).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::UnknownIdentifier);
}

#[test]
fn test_source_module_is_not_modified() {
    let words = shaders::vector_local_fragment();
    let mut compiler = compiler(&words);
    compiler.compile("v.x", Some("main")).unwrap();
    let compiled = compiler.compiled_module().to_vec();
    assert!(compiled.len() > words.len());

    let program = Program::new(&compiled).unwrap();
    assert!(program.function_by_name(EVAL_FUNCTION).is_some());
    assert!(program.global_by_name(RESULT_GLOBAL).is_some());

    compiler.compile("v.y", Some("main")).unwrap();
    assert_eq!(compiler.compiled_module().len(), compiled.len());
}

#[test]
fn test_invalid_swizzle() {
    let words = shaders::vector_local_fragment();
    for expr in ["v.xq", "v.xyzwx", "vec2(1.0, 2.0).z"] {
        let err = compile_error(&words, Some("main"), expr);
        assert_eq!(err.kind, CompileErrorKind::InvalidSwizzle, "{expr}");
    }
}

#[test]
fn test_vector_size_mismatch() {
    let words = shaders::vector_local_fragment();
    let err = compile_error(&words, Some("main"), "v + vec3(1.0)");
    assert_eq!(err.kind, CompileErrorKind::TypeMismatch);
    assert!(err.message.contains("size mismatch"));
}

#[test]
fn test_matrix_constructor_arity() {
    let words = shaders::vector_local_fragment();
    let err = compile_error(&words, None, "mat2(1.0, 2.0, 3.0)");
    assert_eq!(err.kind, CompileErrorKind::InvalidConstructor);
    assert_eq!(err.span, 0..19);

    let err = compile_error(&words, None, "vec3(1.0, 2.0)");
    assert_eq!(err.kind, CompileErrorKind::InvalidConstructor);

    assert_eq!(
        evaluate(&words, None, "mat2x3(1.0, 2.0, 3.0, 4.0, 5.0, 6.0)[1]", &[]),
        Value::vector(&[4.0, 5.0, 6.0])
    );
}

#[test]
fn test_syntax_and_name_errors() {
    let words = shaders::vector_local_fragment();
    let cases = [
        ("missing + 1.0", CompileErrorKind::UnknownIdentifier),
        ("frobnicate(1.0)", CompileErrorKind::UnknownFunction),
        ("1.0 +", CompileErrorKind::UnexpectedEof),
        ("(1.0", CompileErrorKind::UnexpectedEof),
        ("1.0 2.0", CompileErrorKind::UnexpectedToken),
        ("1.0 $ 2.0", CompileErrorKind::InvalidToken),
        ("true + 1.0", CompileErrorKind::TypeMismatch),
        ("1.0 && true", CompileErrorKind::TypeMismatch),
    ];
    for (expr, kind) in cases {
        assert_eq!(compile_error(&words, Some("main"), expr).kind, kind, "{expr}");
    }
}

#[test]
fn test_failed_compile_clears_output() {
    let words = shaders::vector_local_fragment();
    let mut compiler = compiler(&words);
    compiler.compile("v.x", Some("main")).unwrap();
    assert!(!compiler.compiled_module().is_empty());
    compiler.compile("v.q", Some("main")).unwrap_err();
    assert!(compiler.compiled_module().is_empty());
}

#[test]
fn test_no_module() {
    let mut compiler = ExpressionCompiler::new();
    let err = compiler.compile("1.0", None).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::NoModule);

    let err = compiler.set_module(&[1, 2, 3]).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::NoModule);
    assert!(!compiler.has_module());
}
