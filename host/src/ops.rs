//! Operator semantics of the host language.
//!
//! Integer arithmetic wraps at 32 bits and floats are single precision so
//! that host results agree with the device. Division, floor division and
//! modulo keep host semantics (true division, flooring, divisor-signed
//! remainder).

use std::rc::Rc;

use snafu::ensure;

use crate::ast::{BinOp, CmpOp, UnaryOp};
use crate::error::{DivisionByZeroSnafu, Result, TypeSnafu};
use crate::value::Value;

/// Numeric view of an operand after `bool` promotion.
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i32),
    Big(i128),
    Float(f32),
}

fn as_num(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(*b as i32)),
        Value::Int(i) => Some(Num::Int(*i)),
        Value::BigInt(i) => Some(Num::Big(*i)),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn as_f32(num: Num) -> f32 {
    match num {
        Num::Int(i) => i as f32,
        Num::Big(i) => i as f32,
        Num::Float(f) => f,
    }
}

fn as_i128(num: Num) -> Option<i128> {
    match num {
        Num::Int(i) => Some(i as i128),
        Num::Big(i) => Some(i),
        Num::Float(_) => None,
    }
}

fn type_error<T>(op: impl std::fmt::Display, lhs: &Value, rhs: &Value) -> Result<T> {
    TypeSnafu {
        reason: format!(
            "unsupported operand type(s) for {op}: '{}' and '{}'",
            lhs.type_name(),
            rhs.type_name()
        ),
    }
    .fail()
}

pub fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    match (lhs, rhs, op) {
        (Value::Str(a), Value::Str(b), BinOp::Add) => return Ok(Value::Str(Rc::from(format!("{a}{b}")))),
        (Value::List(a), Value::List(b), BinOp::Add) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            return Ok(Value::list(items));
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (as_num(lhs), as_num(rhs)) else {
        return type_error(op, lhs, rhs);
    };

    match (a, b) {
        (Num::Int(x), Num::Int(y)) => int_binary(op, x, y, lhs, rhs),
        (Num::Float(_), _) | (_, Num::Float(_)) => float_binary(op, as_f32(a), as_f32(b), lhs, rhs),
        _ => {
            let (Some(x), Some(y)) = (as_i128(a), as_i128(b)) else {
                return type_error(op, lhs, rhs);
            };
            big_binary(op, x, y, lhs, rhs)
        }
    }
}

fn int_binary(op: BinOp, x: i32, y: i32, lhs: &Value, rhs: &Value) -> Result<Value> {
    Ok(match op {
        BinOp::Add => Value::Int(x.wrapping_add(y)),
        BinOp::Sub => Value::Int(x.wrapping_sub(y)),
        BinOp::Mult => Value::Int(x.wrapping_mul(y)),
        BinOp::Div => {
            ensure!(y != 0, DivisionByZeroSnafu);
            Value::Float(x as f32 / y as f32)
        }
        BinOp::FloorDiv => {
            ensure!(y != 0, DivisionByZeroSnafu);
            Value::Int(x.wrapping_div(y) - i32::from((x % y != 0) && ((x < 0) != (y < 0))))
        }
        BinOp::Mod => {
            ensure!(y != 0, DivisionByZeroSnafu);
            let r = x.wrapping_rem(y);
            Value::Int(if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r })
        }
        BinOp::Pow if y >= 0 => Value::Int(x.wrapping_pow(y as u32)),
        BinOp::Pow => Value::Float((x as f32).powf(y as f32)),
        BinOp::LShift => Value::Int(x.wrapping_shl(y as u32)),
        BinOp::RShift => Value::Int(x.wrapping_shr(y as u32)),
        BinOp::BitOr => Value::Int(x | y),
        BinOp::BitXor => Value::Int(x ^ y),
        BinOp::BitAnd => Value::Int(x & y),
        BinOp::MatMult => return type_error(op, lhs, rhs),
    })
}

fn float_binary(op: BinOp, x: f32, y: f32, lhs: &Value, rhs: &Value) -> Result<Value> {
    Ok(Value::Float(match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mult => x * y,
        BinOp::Div => {
            ensure!(y != 0.0, DivisionByZeroSnafu);
            x / y
        }
        BinOp::FloorDiv => {
            ensure!(y != 0.0, DivisionByZeroSnafu);
            (x / y).floor()
        }
        BinOp::Mod => {
            ensure!(y != 0.0, DivisionByZeroSnafu);
            x - y * (x / y).floor()
        }
        BinOp::Pow => x.powf(y),
        _ => return type_error(op, lhs, rhs),
    }))
}

fn big_binary(op: BinOp, x: i128, y: i128, lhs: &Value, rhs: &Value) -> Result<Value> {
    let result = match op {
        BinOp::Add => x.checked_add(y),
        BinOp::Sub => x.checked_sub(y),
        BinOp::Mult => x.checked_mul(y),
        BinOp::FloorDiv => {
            ensure!(y != 0, DivisionByZeroSnafu);
            Some(x.div_euclid(y))
        }
        BinOp::Mod => {
            ensure!(y != 0, DivisionByZeroSnafu);
            Some(x.rem_euclid(y))
        }
        BinOp::Div => {
            ensure!(y != 0, DivisionByZeroSnafu);
            return Ok(Value::Float(x as f32 / y as f32));
        }
        _ => return type_error(op, lhs, rhs),
    };
    match result {
        Some(v) => Ok(Value::BigInt(v)),
        None => TypeSnafu { reason: "integer overflow" }.fail(),
    }
}

pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value> {
    if op == UnaryOp::Not {
        return Ok(Value::Bool(!operand.truthy()));
    }
    let Some(num) = as_num(operand) else {
        return TypeSnafu { reason: format!("bad operand type for unary {op}: '{}'", operand.type_name()) }.fail();
    };
    Ok(match (op, num) {
        (UnaryOp::USub, Num::Int(i)) => Value::Int(i.wrapping_neg()),
        (UnaryOp::USub, Num::Big(i)) => Value::BigInt(-i),
        (UnaryOp::USub, Num::Float(f)) => Value::Float(-f),
        (UnaryOp::UAdd, Num::Int(i)) => Value::Int(i),
        (UnaryOp::UAdd, Num::Big(i)) => Value::BigInt(i),
        (UnaryOp::UAdd, Num::Float(f)) => Value::Float(f),
        (UnaryOp::Invert, Num::Int(i)) => Value::Int(!i),
        (UnaryOp::Invert, Num::Big(i)) => Value::BigInt(!i),
        _ => {
            return TypeSnafu { reason: format!("bad operand type for unary {op}: '{}'", operand.type_name()) }
                .fail();
        }
    })
}

/// Evaluate one link of a comparison chain.
pub fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool> {
    match op {
        CmpOp::Is => return Ok(lhs.is_identical(rhs)),
        CmpOp::IsNot => return Ok(!lhs.is_identical(rhs)),
        CmpOp::In => return contains(rhs, lhs),
        CmpOp::NotIn => return contains(rhs, lhs).map(|found| !found),
        _ => {}
    }

    if let (Some(a), Some(b)) = (as_num(lhs), as_num(rhs)) {
        let ordering = match (as_i128(a), as_i128(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => as_f32(a).partial_cmp(&as_f32(b)),
        };
        return Ok(match op {
            CmpOp::Eq => ordering == Some(std::cmp::Ordering::Equal),
            CmpOp::NotEq => ordering != Some(std::cmp::Ordering::Equal),
            CmpOp::Lt => ordering == Some(std::cmp::Ordering::Less),
            CmpOp::LtE => matches!(ordering, Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)),
            CmpOp::Gt => ordering == Some(std::cmp::Ordering::Greater),
            CmpOp::GtE => matches!(ordering, Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)),
            _ => unreachable!("identity and membership handled above"),
        });
    }

    match (op, lhs, rhs) {
        (CmpOp::Eq, _, _) => Ok(lhs == rhs),
        (CmpOp::NotEq, _, _) => Ok(lhs != rhs),
        (_, Value::Str(a), Value::Str(b)) => Ok(match op {
            CmpOp::Lt => a < b,
            CmpOp::LtE => a <= b,
            CmpOp::Gt => a > b,
            _ => a >= b,
        }),
        _ => TypeSnafu {
            reason: format!("'{op}' not supported between '{}' and '{}'", lhs.type_name(), rhs.type_name()),
        }
        .fail(),
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool> {
    match container {
        Value::List(items) => Ok(items.borrow().iter().any(|v| v == item)),
        Value::Range(range) => Ok(match item {
            Value::Int(i) => range.iter().any(|v| v == *i),
            _ => false,
        }),
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(&**needle)),
            _ => TypeSnafu { reason: "'in <string>' requires string as left operand" }.fail(),
        },
        other => TypeSnafu { reason: format!("argument of type '{}' is not iterable", other.type_name()) }.fail(),
    }
}
