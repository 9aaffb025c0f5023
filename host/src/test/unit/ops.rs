use proptest::prelude::*;
use test_case::test_case;

use crate::ast::{BinOp, CmpOp, UnaryOp};
use crate::error::Error;
use crate::ops::{binary, compare, unary};
use crate::value::Value;

#[test_case(7, 2, BinOp::FloorDiv, 3; "floor div positive")]
#[test_case(-7, 2, BinOp::FloorDiv, -4; "floor div rounds down")]
#[test_case(7, -2, BinOp::FloorDiv, -4; "floor div negative divisor")]
#[test_case(-7, 3, BinOp::Mod, 2; "mod takes divisor sign")]
#[test_case(7, -3, BinOp::Mod, -2; "mod negative divisor")]
#[test_case(2, 10, BinOp::Pow, 1024; "pow")]
#[test_case(6, 3, BinOp::BitXor, 5; "xor")]
#[test_case(1, 4, BinOp::LShift, 16; "shift")]
fn test_int_binary(lhs: i32, rhs: i32, op: BinOp, expected: i32) {
    assert_eq!(binary(op, &Value::Int(lhs), &Value::Int(rhs)).unwrap(), Value::Int(expected));
}

#[test]
fn test_int_overflow_wraps() {
    let result = binary(BinOp::Add, &Value::Int(i32::MAX), &Value::Int(1)).unwrap();
    assert_eq!(result, Value::Int(i32::MIN));
}

#[test]
fn test_true_division_yields_float() {
    assert_eq!(binary(BinOp::Div, &Value::Int(7), &Value::Int(2)).unwrap(), Value::Float(3.5));
}

#[test]
fn test_mixed_promotes_to_float() {
    assert_eq!(binary(BinOp::Mult, &Value::Int(3), &Value::Float(0.5)).unwrap(), Value::Float(1.5));
    assert_eq!(binary(BinOp::Add, &Value::Bool(true), &Value::Int(1)).unwrap(), Value::Int(2));
}

#[test_case(BinOp::Div; "div")]
#[test_case(BinOp::FloorDiv; "floordiv")]
#[test_case(BinOp::Mod; "mod")]
fn test_division_by_zero(op: BinOp) {
    assert!(matches!(binary(op, &Value::Int(1), &Value::Int(0)), Err(Error::DivisionByZero)));
    assert!(matches!(binary(op, &Value::Float(1.0), &Value::Float(0.0)), Err(Error::DivisionByZero)));
}

#[test]
fn test_string_concat_and_type_error() {
    assert_eq!(binary(BinOp::Add, &Value::str("ab"), &Value::str("c")).unwrap(), Value::str("abc"));
    assert!(matches!(binary(BinOp::Sub, &Value::str("a"), &Value::Int(1)), Err(Error::Type { .. })));
}

#[test]
fn test_unary() {
    assert_eq!(unary(UnaryOp::USub, &Value::Int(4)).unwrap(), Value::Int(-4));
    assert_eq!(unary(UnaryOp::Not, &Value::Int(0)).unwrap(), Value::Bool(true));
    assert_eq!(unary(UnaryOp::Invert, &Value::Int(0)).unwrap(), Value::Int(-1));
    assert!(unary(UnaryOp::Invert, &Value::Float(1.0)).is_err());
}

#[test]
fn test_compare() {
    assert!(compare(CmpOp::Lt, &Value::Int(1), &Value::Float(1.5)).unwrap());
    assert!(compare(CmpOp::Eq, &Value::Int(2), &Value::Float(2.0)).unwrap());
    assert!(compare(CmpOp::In, &Value::Int(2), &Value::list(vec![Value::Int(1), Value::Int(2)])).unwrap());
    assert!(compare(CmpOp::Is, &Value::None, &Value::None).unwrap());
    assert!(compare(CmpOp::Lt, &Value::str("a"), &Value::Int(1)).is_err());
}

proptest! {
    #[test]
    fn floor_div_and_mod_reconstruct(a in -10_000i32..10_000, b in (-10_000i32..10_000).prop_filter("nonzero", |b| *b != 0)) {
        let q = binary(BinOp::FloorDiv, &Value::Int(a), &Value::Int(b)).unwrap();
        let r = binary(BinOp::Mod, &Value::Int(a), &Value::Int(b)).unwrap();
        let (Value::Int(q), Value::Int(r)) = (q, r) else { panic!("integer results expected") };
        prop_assert_eq!(q * b + r, a);
        prop_assert!(r == 0 || (r < 0) == (b < 0));
    }
}
