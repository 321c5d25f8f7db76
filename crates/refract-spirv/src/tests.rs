use super::*;

fn tiny_module() -> Vec<u32> {
    let mut b = ModuleBuilder::new();
    let void = b.type_void();
    let float = b.type_float();
    let vec4 = b.type_vector(float, 4);
    let fn_ty = b.type_function(void, &[]);
    let out = b.variable(vec4, StorageClass::Output);
    b.name(out, "color");
    let main = b.begin_function(void, fn_ty);
    b.name(main, "main");
    b.label();
    let one = b.constant_f32(1.0);
    let c = b.emit_result(Op::CompositeConstruct, vec4, &[one, one, one, one]);
    b.emit(Op::Store, &[out, c]);
    b.emit(Op::Return, &[]);
    b.end_function();
    b.entry_point(ExecutionModel::Fragment, main, "main", &[out]);
    b.build()
}

#[test]
fn test_header_validation() {
    assert_eq!(
        Module::parse(&[MAGIC, 0, 0]).unwrap_err(),
        ModuleError::HeaderTooShort { words: 3 }
    );
    assert_eq!(
        Module::parse(&[0xdead_beef, 0, 0, 1, 0]).unwrap_err(),
        ModuleError::InvalidMagic { found: 0xdead_beef }
    );
    let words = tiny_module();
    let module = Module::parse(&words).unwrap();
    assert_eq!(module.header().bound, words[3]);
}

#[test]
fn test_truncated_record_is_an_error() {
    let mut words = tiny_module();
    // Claim the last record is longer than what remains.
    let last = words.len() - 1;
    words[last] = (10 << 16) | Op::FunctionEnd.word() as u32;
    let module = Module::parse(&words).unwrap();
    let err = module.collect_instructions().unwrap_err();
    assert!(matches!(err, ModuleError::Truncated { needed: 10, available: 1, .. }));
}

#[test]
fn test_zero_word_count_stops_iteration() {
    let words = vec![MAGIC, 0x0001_0000, 0, 1, 0, 0, 0];
    let module = Module::parse(&words).unwrap();
    let mut iter = module.instructions();
    assert_eq!(iter.next(), Some(Err(ModuleError::ZeroWordCount { offset: 5 })));
    assert_eq!(iter.next(), None);
}

#[test]
fn test_missing_operand() {
    let words = vec![MAGIC, 0x0001_0000, 0, 1, 0, (1 << 16) | Op::TypeFloat.word() as u32];
    let module = Module::parse(&words).unwrap();
    let inst = module.collect_instructions().unwrap()[0];
    assert!(matches!(inst.word(1), Err(ModuleError::MissingOperand { index: 1, .. })));
    let mut table = TypeTable::new();
    assert!(table.record(&inst).is_err());
}

#[test]
fn test_string_literals() {
    for text in ["", "abc", "abcd", "main(vf4;"] {
        let words = encode_string(text);
        assert_eq!(words.len(), text.len() / 4 + 1);
        assert_eq!(decode_string(&words), Some((text.to_string(), words.len())));
    }
    // No terminator inside the record.
    assert_eq!(decode_string(&[u32::from_le_bytes(*b"abcd")]), None);
}

#[test]
fn test_type_table_follows_pointers() {
    let words = tiny_module();
    let module = Module::parse(&words).unwrap();
    let mut table = TypeTable::new();
    for inst in module.instructions() {
        table.record(&inst.unwrap()).unwrap();
    }
    let float = table.find(&TypeDesc::Float { width: 32 }).unwrap();
    let vec4 = table.find(&TypeDesc::Vector { component: float, count: 4 }).unwrap();
    let ptr = table.find_pointer(StorageClass::Output, vec4).unwrap();
    assert_eq!(table.resolve_id(ptr), vec4);
    assert_eq!(table.storage_class(ptr), Some(StorageClass::Output));
    assert_eq!(table.component_count(ptr), 4);
    assert_eq!(table.scalar_of(ptr), Some(float));
}

#[test]
fn test_builder_reopens_module() {
    let words = tiny_module();
    let mut b = ModuleBuilder::from_words(&words).unwrap();
    assert_eq!(b.bound(), words[3]);

    // Existing types are reused; new ids start at the old bound.
    let float = b.type_float();
    assert!(float < words[3]);
    let glsl = b.glsl_import();
    assert_eq!(glsl, words[3]);
    assert_eq!(b.glsl_import(), glsl);

    let rebuilt = b.build();
    assert_eq!(rebuilt[3], words[3] + 1);
    let module = Module::parse(&rebuilt).unwrap();
    let ops: Vec<_> = module
        .instructions()
        .map(|i| i.unwrap().op().unwrap())
        .collect();
    let import = ops.iter().position(|o| *o == Op::ExtInstImport).unwrap();
    let memory_model = ops.iter().position(|o| *o == Op::MemoryModel).unwrap();
    let function = ops.iter().position(|o| *o == Op::Function).unwrap();
    assert!(import < memory_model);
    assert!(memory_model < function);
}

#[test]
fn test_array_length_constant() {
    let mut b = ModuleBuilder::new();
    let float = b.type_float();
    let arr = b.type_array(float, 3);
    let words = b.build();
    let module = Module::parse(&words).unwrap();
    let mut table = TypeTable::new();
    for inst in module.instructions() {
        table.record(&inst.unwrap()).unwrap();
    }
    assert_eq!(table.get(arr), Some(&TypeDesc::Array { element: float, length: 3 }));
}

#[test]
fn test_queries_terminate_on_cyclic_entries() {
    let mut table = TypeTable::new();
    table.insert(1, TypeDesc::Matrix { column: 1, columns: 4 });
    table.insert(2, TypeDesc::Vector { component: 3, count: 2 });
    table.insert(3, TypeDesc::Vector { component: 2, count: 2 });
    assert_eq!(table.component_count(1), 0);
    assert_eq!(table.scalar_of(1), None);
    assert_eq!(table.scalar_of(2), None);
}

#[test]
fn test_record_rejects_oversized_matrix() {
    let mut b = ModuleBuilder::new();
    let float = b.type_float();
    let vec4 = b.type_vector(float, 4);
    let mat4 = b.type_matrix(vec4, 4);
    let mut words = b.build();
    let module = Module::parse(&words).unwrap();
    let mut table = TypeTable::new();
    for inst in module.instructions() {
        table.record(&inst.unwrap()).unwrap();
    }
    assert_eq!(table.component_count(mat4), 16);
    assert_eq!(table.scalar_of(mat4), Some(float));

    let at = words
        .windows(2)
        .position(|w| w[0] & 0xffff == u32::from(Op::TypeMatrix.word()) && w[1] == mat4)
        .unwrap();
    words[at + 3] = u32::MAX;
    let module = Module::parse(&words).unwrap();
    let mut table = TypeTable::new();
    let err = module
        .instructions()
        .map(|inst| table.record(&inst.unwrap()))
        .find_map(Result::err)
        .unwrap();
    assert!(matches!(err, ModuleError::InvalidType { id, .. } if id == mat4));
}
