//! Type declarations a compiler would never emit.
//!
//! Verifies: cyclic, out-of-order, oversized and overflowing declarations are
//! rejected with `ModuleError::InvalidType` instead of crashing the walk.

use refract_introspect::introspect;
use refract_spirv::{encode, ModuleError, Op, StorageClass, MAGIC, MAX_TYPE_DEPTH};

/// Header plus `records`, with the id bound set to `bound`.
fn module(bound: u32, records: &[Vec<u32>]) -> Vec<u32> {
    let mut words = vec![MAGIC, 0x0001_0000, 0, bound, 0];
    for record in records {
        words.extend_from_slice(record);
    }
    words
}

fn invalid_type(words: &[u32]) -> (u32, &'static str) {
    match introspect(words, true) {
        Err(ModuleError::InvalidType { id, reason }) => (id, reason),
        other => panic!("expected an invalid type, got {other:?}"),
    }
}

#[test]
fn test_matrix_with_huge_column_count() {
    let words = module(
        20,
        &[
            encode(Op::TypeFloat, &[10, 32]),
            encode(Op::TypeVector, &[11, 10, 4]),
            encode(Op::TypeMatrix, &[12, 11, u32::MAX]),
            encode(Op::TypePointer, &[13, StorageClass::Private.word(), 12]),
            encode(Op::Variable, &[13, 14, StorageClass::Private.word()]),
        ],
    );
    assert_eq!(invalid_type(&words).0, 12);
}

#[test]
fn test_self_referencing_array() {
    let words = module(
        10,
        &[
            encode(Op::TypeInt, &[2, 32, 0]),
            encode(Op::Constant, &[2, 3, 4]),
            encode(Op::TypeArray, &[5, 5, 3]),
            encode(Op::TypePointer, &[6, StorageClass::Private.word(), 5]),
            encode(Op::Variable, &[6, 7, StorageClass::Private.word()]),
        ],
    );
    assert_eq!(invalid_type(&words).0, 5);
}

#[test]
fn test_mutually_referencing_structs() {
    let words = module(
        10,
        &[
            encode(Op::TypeFloat, &[1, 32]),
            encode(Op::TypeStruct, &[2, 1, 3]),
            encode(Op::TypeStruct, &[3, 2]),
        ],
    );
    assert_eq!(invalid_type(&words).0, 2);
}

#[test]
fn test_array_size_overflow() {
    let words = module(
        20,
        &[
            encode(Op::TypeFloat, &[1, 32]),
            encode(Op::TypeInt, &[2, 32, 0]),
            encode(Op::Constant, &[2, 3, u32::MAX]),
            encode(Op::TypeArray, &[4, 1, 3]),
            encode(Op::TypeArray, &[5, 4, 3]),
        ],
    );
    // A single array of 2^32 - 1 floats is already past the slot cap.
    assert_eq!(invalid_type(&words), (4, "type is too large"));
}

#[test]
fn test_nesting_depth_is_capped() {
    let mut records = vec![
        encode(Op::TypeFloat, &[1, 32]),
        encode(Op::TypeInt, &[2, 32, 0]),
        encode(Op::Constant, &[2, 3, 1]),
    ];
    let mut element = 1;
    for id in 10..10 + MAX_TYPE_DEPTH + 1 {
        records.push(encode(Op::TypeArray, &[id, element, 3]));
        element = id;
    }
    let words = module(200, &records);
    assert_eq!(invalid_type(&words), (10 + MAX_TYPE_DEPTH, "type nesting is too deep"));
}

#[test]
fn test_duplicate_declaration() {
    let words = module(
        10,
        &[encode(Op::TypeFloat, &[1, 32]), encode(Op::TypeBool, &[1])],
    );
    assert_eq!(invalid_type(&words), (1, "declared twice"));
}

#[test]
fn test_well_formed_nesting_is_accepted() {
    let words = module(
        20,
        &[
            encode(Op::TypeFloat, &[1, 32]),
            encode(Op::TypeVector, &[2, 1, 3]),
            encode(Op::TypeMatrix, &[3, 2, 3]),
            encode(Op::TypeInt, &[4, 32, 0]),
            encode(Op::Constant, &[4, 5, 8]),
            encode(Op::TypeStruct, &[6, 3, 2, 1]),
            encode(Op::TypeArray, &[7, 6, 5]),
            encode(Op::TypePointer, &[8, StorageClass::Private.word(), 7]),
            encode(Op::Variable, &[8, 9, StorageClass::Private.word()]),
        ],
    );
    let result = introspect(&words, true).unwrap();
    assert_eq!(result.user_types.len(), 1);
}
