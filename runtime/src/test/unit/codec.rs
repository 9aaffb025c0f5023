use std::rc::Rc;

use gpumap_host::{Class, Value};
use gpumap_ir::{Type, extract};
use test_case::test_case;

use super::{class, field, ints, object};
use crate::codec::{self, CodecError, ListOfLists};

struct Classes {
    inner: Rc<Class>,
    record: Rc<Class>,
}

fn classes() -> Classes {
    Classes { inner: class("Inner"), record: class("Record") }
}

fn record(classes: &Classes, a: i32, x: i32, y: f32, flag: bool) -> Value {
    let inner = object(&classes.inner, vec![("x", Value::Int(x)), ("y", Value::Float(y))]);
    object(&classes.record, vec![("a", Value::Int(a)), ("inner", inner), ("flag", Value::Bool(flag))])
}

fn record_type(value: &Value) -> Type {
    Type::Class(extract(value).unwrap())
}

#[test_case(Type::INT, 4, "i"; "int")]
#[test_case(Type::FLOAT, 4, "f"; "float")]
#[test_case(Type::BOOL, 1, "?"; "bool")]
fn test_scalar_layout(ty: Type, size: usize, format: &str) {
    assert_eq!(codec::size_of(&ty).unwrap(), size);
    assert_eq!(codec::format(&ty).unwrap(), format);
}

#[test]
fn test_class_layout_is_depth_first() {
    let classes = classes();
    let ty = record_type(&record(&classes, 1, 2, 0.5, true));
    assert_eq!(codec::size_of(&ty).unwrap(), 13);
    assert_eq!(codec::format(&ty).unwrap(), "iif?");
}

#[test]
fn test_lists_have_no_element_size() {
    let ty = Type::list_of(Type::INT);
    assert!(matches!(codec::size_of(&ty), Err(CodecError::Unsized { .. })));
    assert!(matches!(codec::format(&ty), Err(CodecError::Unsized { .. })));
}

#[test]
fn test_pack_is_little_endian_and_packed() {
    let classes = classes();
    let value = record(&classes, 1, -2, 1.5, true);
    let bytes = codec::pack(&[value.clone()], &record_type(&value)).unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(&1i32.to_le_bytes());
    expected.extend_from_slice(&(-2i32).to_le_bytes());
    expected.extend_from_slice(&1.5f32.to_le_bytes());
    expected.push(1);
    assert_eq!(bytes, expected);
}

#[test]
fn test_pack_rejects_mismatched_values() {
    let result = codec::pack(&[Value::Float(1.0)], &Type::INT);
    assert!(matches!(result, Err(CodecError::TypeMismatch { .. })));

    let classes = classes();
    let full = record(&classes, 1, 2, 0.5, false);
    let ty = record_type(&full);
    let partial = object(&classes.record, vec![("a", Value::Int(1))]);
    match codec::pack(&[partial], &ty) {
        Err(CodecError::MissingField { class, field }) => {
            assert_eq!(class, "Record");
            assert_eq!(field, "inner");
        }
        other => panic!("expected a missing field, got {other:?}"),
    }

    let other = object(&class("Other"), vec![]);
    assert!(matches!(codec::pack(&[other], &ty), Err(CodecError::TypeMismatch { .. })));
}

#[test]
fn test_unpack_rebinds_objects_in_place() {
    let classes = classes();
    let target = record(&classes, 1, 2, 0.5, false);
    let inner = field(&target, "inner");
    let ty = record_type(&target);
    let bytes = codec::pack(&[record(&classes, 10, 20, 2.5, true)], &ty).unwrap();

    let decoded = codec::unpack(&bytes, &ty, &[target.clone()]).unwrap();

    assert!(decoded[0].is_identical(&target));
    assert!(field(&target, "inner").is_identical(&inner));
    assert_eq!(field(&target, "a"), Value::Int(10));
    assert_eq!(field(&target, "inner.x"), Value::Int(20));
    assert_eq!(field(&target, "inner.y"), Value::Float(2.5));
    assert_eq!(field(&target, "flag"), Value::Bool(true));
}

#[test]
fn test_unpack_primitives_are_returned() {
    let bytes = codec::pack(&ints(&[7, 8]), &Type::INT).unwrap();
    let decoded = codec::unpack(&bytes, &Type::INT, &ints(&[0, 0])).unwrap();
    assert_eq!(decoded, ints(&[7, 8]));
}

#[test]
fn test_unpack_checks_length() {
    let result = codec::unpack(&[0; 7], &Type::INT, &ints(&[0, 0]));
    assert!(matches!(result, Err(CodecError::LengthMismatch { expected: 8, actual: 7 })));
}

#[test]
fn test_unpack_new_builds_distinct_objects() {
    let classes = classes();
    let prototype = record(&classes, 0, 0, 0.0, false);
    let ty = record_type(&prototype);
    let sources = [record(&classes, 1, 2, 0.5, true), record(&classes, 3, 4, 1.5, false)];
    let bytes = codec::pack(&sources, &ty).unwrap();

    let decoded = codec::unpack_new(&bytes, &ty, &prototype, 2).unwrap();

    assert_eq!(decoded.len(), 2);
    assert!(!decoded[0].is_identical(&prototype));
    assert!(!field(&decoded[0], "inner").is_identical(&field(&decoded[1], "inner")));
    assert_eq!(field(&decoded[1], "a"), Value::Int(3));
    assert_eq!(field(&decoded[1], "inner.y"), Value::Float(1.5));
    assert_eq!(field(&prototype, "a"), Value::Int(0));
}

#[test]
fn test_prefixed_collection() {
    let bytes = codec::pack_prefixed(&ints(&[5, 6, 7]), &Type::INT).unwrap();
    assert_eq!(&bytes[..4], &3i32.to_le_bytes());
    assert_eq!(bytes.len(), 16);

    let decoded = codec::unpack_prefixed(&bytes, &Type::INT, &ints(&[0, 0, 0])).unwrap();
    assert_eq!(decoded, ints(&[5, 6, 7]));

    let result = codec::unpack_prefixed(&bytes, &Type::INT, &ints(&[0, 0]));
    assert!(matches!(result, Err(CodecError::CountMismatch { declared: 3, expected: 2 })));
}

#[test]
fn test_store_into_list() {
    let list = Value::list(ints(&[1, 2]));
    codec::store_into_list(&list, ints(&[3, 4])).unwrap();
    assert_eq!(list, Value::list(ints(&[3, 4])));

    let result = codec::store_into_list(&list, ints(&[1]));
    assert!(matches!(result, Err(CodecError::LengthMismatch { .. })));
}

#[test]
fn test_list_of_lists_layout() {
    let lists = vec![Value::list(ints(&[1, 2])), Value::list(ints(&[3, 4]))];
    let layout = ListOfLists::new(Type::INT, &lists).unwrap();
    assert_eq!(layout.inner_length(), 2);
    assert_eq!(layout.size(2).unwrap(), 20);

    let bytes = layout.pack(&lists).unwrap();
    let words: Vec<i32> = bytes.chunks(4).map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
    assert_eq!(words, vec![2, 1, 2, 3, 4]);
}

#[test]
fn test_list_of_lists_unpack_in_place() {
    let lists = vec![Value::list(ints(&[1, 2])), Value::list(ints(&[3, 4]))];
    let layout = ListOfLists::new(Type::INT, &lists).unwrap();
    let updated = vec![Value::list(ints(&[10, 20])), Value::list(ints(&[30, 40]))];
    let bytes = layout.pack(&updated).unwrap();

    layout.unpack(&bytes, &lists).unwrap();

    assert_eq!(lists[0], Value::list(ints(&[10, 20])));
    assert_eq!(lists[1], Value::list(ints(&[30, 40])));
}

#[test]
fn test_ragged_lists_are_rejected() {
    let lists = vec![Value::list(ints(&[1, 2])), Value::list(ints(&[3]))];
    match ListOfLists::new(Type::INT, &lists) {
        Err(CodecError::Ragged { index, expected, actual }) => assert_eq!((index, expected, actual), (1, 2, 1)),
        other => panic!("expected ragged lists, got {other:?}"),
    }
}

#[test]
fn test_list_of_lists_requires_lists() {
    let result = ListOfLists::new(Type::INT, &[Value::Int(1)]);
    assert!(matches!(result, Err(CodecError::TypeMismatch { .. })));
}
