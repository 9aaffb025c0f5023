//! Built-in functions and the `math` module.

use std::collections::HashMap;
use std::rc::Rc;

use itertools::Itertools;
use snafu::ensure;
use strum::IntoEnumIterator;

use crate::ast::CmpOp;
use crate::error::{AritySnafu, Result, TypeSnafu};
use crate::ops;
use crate::value::{Builtin, HostModule, MathFn, Range, Value};

/// Names bound in every fresh global scope.
pub fn global_builtins() -> impl Iterator<Item = (&'static str, Value)> {
    [
        ("range", Builtin::Range),
        ("len", Builtin::Len),
        ("print", Builtin::Print),
        ("abs", Builtin::Abs),
        ("min", Builtin::Min),
        ("max", Builtin::Max),
        ("int", Builtin::Int),
        ("float", Builtin::Float),
    ]
    .into_iter()
    .map(|(name, b)| (name, Value::Builtin(b)))
}

pub fn math_module() -> Value {
    let mut attrs: HashMap<String, Value> =
        MathFn::iter().map(|f| (f.to_string(), Value::Builtin(Builtin::Math(f)))).collect();
    attrs.insert("pi".into(), Value::Float(std::f32::consts::PI));
    attrs.insert("e".into(), Value::Float(std::f32::consts::E));
    Value::Module(Rc::new(HostModule { name: "math".into(), attrs }))
}

/// Text written by `print` for these arguments.
pub fn print_line(args: &[Value]) -> String {
    args.iter().map(|v| v.to_string()).join(" ")
}

/// Call a built-in other than `print`, which needs interpreter state.
pub fn call(builtin: Builtin, args: &[Value]) -> Result<Value> {
    match builtin {
        Builtin::Range => range(args),
        Builtin::Len => {
            expect_arity("len", 1, args)?;
            let len = match &args[0] {
                Value::List(items) => items.borrow().len(),
                Value::Str(s) => s.chars().count(),
                Value::Range(r) => r.len(),
                other => return TypeSnafu { reason: format!("object of type '{}' has no len()", other.type_name()) }.fail(),
            };
            Ok(Value::int(len as i64))
        }
        Builtin::Print => Ok(Value::None),
        Builtin::Abs => {
            expect_arity("abs", 1, args)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
                Value::BigInt(i) => Ok(Value::BigInt(i.abs())),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                Value::Bool(b) => Ok(Value::Int(*b as i32)),
                other => TypeSnafu { reason: format!("bad operand type for abs(): '{}'", other.type_name()) }.fail(),
            }
        }
        Builtin::Min => extremum("min", CmpOp::Lt, args),
        Builtin::Max => extremum("max", CmpOp::Gt, args),
        Builtin::Int => {
            expect_arity("int", 1, args)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::BigInt(i) => Ok(Value::BigInt(*i)),
                Value::Bool(b) => Ok(Value::Int(*b as i32)),
                Value::Float(f) => Ok(Value::int(f.trunc() as i64)),
                Value::Str(s) => s.trim().parse::<i64>().map(Value::int).map_err(|_| {
                    TypeSnafu { reason: format!("invalid literal for int(): '{s}'") }.build()
                }),
                other => TypeSnafu { reason: format!("int() argument must not be '{}'", other.type_name()) }.fail(),
            }
        }
        Builtin::Float => {
            expect_arity("float", 1, args)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::Float(*i as f32)),
                Value::BigInt(i) => Ok(Value::Float(*i as f32)),
                Value::Bool(b) => Ok(Value::Float(*b as i32 as f32)),
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::Str(s) => s.trim().parse::<f32>().map(Value::Float).map_err(|_| {
                    TypeSnafu { reason: format!("could not convert string to float: '{s}'") }.build()
                }),
                other => TypeSnafu { reason: format!("float() argument must not be '{}'", other.type_name()) }.fail(),
            }
        }
        Builtin::Math(f) => math(f, args),
    }
}

fn expect_arity(callee: &str, expected: usize, args: &[Value]) -> Result<()> {
    ensure!(args.len() == expected, AritySnafu { callee, expected, actual: args.len() });
    Ok(())
}

fn int_arg(callee: &str, value: &Value) -> Result<i32> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(*b as i32),
        other => TypeSnafu { reason: format!("{callee}() expects integer arguments, got '{}'", other.type_name()) }
            .fail(),
    }
}

fn range(args: &[Value]) -> Result<Value> {
    let ints: Vec<i32> = args.iter().map(|a| int_arg("range", a)).try_collect()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return AritySnafu { callee: "range", expected: 3usize, actual: args.len() }.fail(),
    };
    ensure!(step != 0, TypeSnafu { reason: "range() arg 3 must not be zero" });
    Ok(Value::Range(Range { start, stop, step }))
}

fn extremum(callee: &str, better: CmpOp, args: &[Value]) -> Result<Value> {
    let candidates: Vec<Value> = match args {
        [Value::List(items)] => items.borrow().clone(),
        [Value::Range(r)] => r.iter().map(Value::Int).collect(),
        [_] | [] => {
            return TypeSnafu { reason: format!("{callee}() expects an iterable or at least two arguments") }.fail();
        }
        many => many.to_vec(),
    };
    let mut iter = candidates.into_iter();
    let Some(mut best) = iter.next() else {
        return TypeSnafu { reason: format!("{callee}() arg is an empty sequence") }.fail();
    };
    for candidate in iter {
        if ops::compare(better, &candidate, &best)? {
            best = candidate;
        }
    }
    Ok(best)
}

fn float_arg(callee: MathFn, value: &Value) -> Result<f32> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Int(i) => Ok(*i as f32),
        Value::Bool(b) => Ok(*b as i32 as f32),
        other => TypeSnafu { reason: format!("math.{callee}() must be real number, not '{}'", other.type_name()) }
            .fail(),
    }
}

fn math(f: MathFn, args: &[Value]) -> Result<Value> {
    let expected = if f == MathFn::Pow { 2 } else { 1 };
    ensure!(args.len() == expected, AritySnafu { callee: format!("math.{f}"), expected, actual: args.len() });
    let x = float_arg(f, &args[0])?;

    Ok(match f {
        MathFn::Sin => Value::Float(x.sin()),
        MathFn::Cos => Value::Float(x.cos()),
        MathFn::Tan => Value::Float(x.tan()),
        MathFn::Exp => Value::Float(x.exp()),
        MathFn::Ceil => Value::int(x.ceil() as i64),
        MathFn::Floor => Value::int(x.floor() as i64),
        MathFn::Sqrt => {
            ensure!(x >= 0.0, TypeSnafu { reason: "math domain error" });
            Value::Float(x.sqrt())
        }
        MathFn::Pow => Value::Float(x.powf(float_arg(f, &args[1])?)),
        MathFn::Log | MathFn::Log10 | MathFn::Log2 => {
            ensure!(x > 0.0, TypeSnafu { reason: "math domain error" });
            Value::Float(match f {
                MathFn::Log => x.ln(),
                MathFn::Log10 => x.log10(),
                _ => x.log2(),
            })
        }
        MathFn::Log1p => {
            ensure!(x > -1.0, TypeSnafu { reason: "math domain error" });
            Value::Float(x.ln_1p())
        }
        MathFn::Fabs => Value::Float(x.abs()),
    })
}
