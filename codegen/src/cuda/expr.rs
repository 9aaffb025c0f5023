//! Expression translation.
//!
//! Every expression is translated together with its statically known type,
//! which drives declaration qualifiers, overload-free operator rewriting and
//! field checks. Unknown types pass through as `None`.

use std::str::FromStr;

use gpumap_dtype::ScalarDType;
use gpumap_host::ast::{BinOp, BoolOp, CmpOp, ComprehensionKind, Expr, Keyword, UnaryOp};
use gpumap_host::value::MathFn;
use gpumap_ir::Type;
use itertools::Itertools;
use snafu::{OptionExt, ensure};

use super::function::FunctionContext;
use super::types::{capture_ident, float_literal, ident, math_function, math_return, string_literal};
use crate::error::{
    AritySnafu, Construct, Result, UndeclaredFieldSnafu, UnknownMethodSnafu, UnknownNameSnafu, UntracedSnafu,
};

/// Device code for one expression plus its type, when known.
#[derive(Debug, Clone, PartialEq)]
pub struct Typed {
    pub code: String,
    pub ty: Option<Type>,
}

impl Typed {
    pub fn new(code: impl Into<String>, ty: Option<Type>) -> Self {
        Self { code: code.into(), ty }
    }

    fn scalar(code: impl Into<String>, dtype: ScalarDType) -> Self {
        Self::new(code, Some(Type::Scalar(dtype)))
    }

    pub fn dtype(&self) -> Option<ScalarDType> {
        self.ty.as_ref().and_then(Type::scalar)
    }

    pub fn is_primitive(&self) -> bool {
        self.dtype().is_some()
    }

    fn is_float(&self) -> bool {
        self.dtype().is_some_and(|d| d.is_float())
    }

    fn is_integral(&self) -> bool {
        self.dtype().is_some_and(|d| !d.is_float())
    }
}

pub fn translate_expr(expr: &Expr, ctx: &FunctionContext<'_>) -> Result<Typed> {
    match expr {
        Expr::Name(name) => name_expr(name, ctx),
        Expr::Int(value) => Ok(Typed::scalar(value.to_string(), ScalarDType::Int32)),
        Expr::Float(value) => Ok(Typed::scalar(float_literal(*value), ScalarDType::Float32)),
        Expr::Bool(value) => Ok(Typed::scalar(if *value { "true" } else { "false" }, ScalarDType::Bool)),
        Expr::Str(text) => Ok(Typed::new(string_literal(text), None)),
        Expr::Attribute { value, attr } => attribute(value, attr, ctx),
        Expr::Subscript { value, index } => {
            if matches!(**index, Expr::Slice { .. }) {
                return Err(ctx.unsupported(Construct::Slice));
            }
            let sequence = translate_expr(value, ctx)?;
            let index = translate_expr(index, ctx)?;
            let ty = match sequence.ty {
                Some(Type::List(element)) => Some(*element),
                _ => None,
            };
            Ok(Typed::new(format!("{}[{}]", sequence.code, index.code), ty))
        }
        Expr::Call { func, args, keywords } => call(func, args, keywords, ctx),
        Expr::BinOp { left, op, right } => {
            let left = translate_expr(left, ctx)?;
            let right = translate_expr(right, ctx)?;
            binary(*op, &left, &right, ctx)
        }
        Expr::UnaryOp { op, operand } => {
            let operand = translate_expr(operand, ctx)?;
            let code = &operand.code;
            Ok(match op {
                UnaryOp::Not => Typed::scalar(format!("(!{code})"), ScalarDType::Bool),
                UnaryOp::Invert => Typed::scalar(format!("(~{code})"), ScalarDType::Int32),
                UnaryOp::USub | UnaryOp::UAdd => {
                    let sign = if *op == UnaryOp::USub { "-" } else { "+" };
                    let ty = operand.dtype().map(|d| Type::Scalar(ScalarDType::promote(d, d)));
                    Typed::new(format!("({sign}{code})"), ty)
                }
            })
        }
        Expr::BoolOp { op, values } => {
            let joiner = match op {
                BoolOp::And => " && ",
                BoolOp::Or => " || ",
            };
            let parts: Vec<String> = values.iter().map(|v| translate_expr(v, ctx).map(|t| t.code)).try_collect()?;
            Ok(Typed::scalar(format!("({})", parts.join(joiner)), ScalarDType::Bool))
        }
        Expr::Compare { left, ops, comparators } => compare(left, ops, comparators, ctx),
        Expr::IfExp { test, body, orelse } => {
            let test = translate_expr(test, ctx)?;
            let body = translate_expr(body, ctx)?;
            let orelse = translate_expr(orelse, ctx)?;
            let ty = match (body.dtype(), orelse.dtype()) {
                (Some(a), Some(b)) if a != b => Some(Type::Scalar(ScalarDType::promote(a, b))),
                _ if body.ty == orelse.ty => body.ty.clone(),
                _ => None,
            };
            Ok(Typed::new(format!("({} ? {} : {})", test.code, body.code, orelse.code), ty))
        }
        Expr::None => Err(ctx.unsupported(Construct::NoneLiteral)),
        Expr::Bytes(_) => Err(ctx.unsupported(Construct::BytesLiteral)),
        Expr::Ellipsis => Err(ctx.unsupported(Construct::Ellipsis)),
        Expr::Slice { .. } => Err(ctx.unsupported(Construct::Slice)),
        Expr::Starred(_) => Err(ctx.unsupported(Construct::StarredArgument)),
        Expr::Lambda { .. } => Err(ctx.unsupported(Construct::Lambda)),
        Expr::List(_) => Err(ctx.unsupported(Construct::ListLiteral)),
        Expr::Tuple(_) => Err(ctx.unsupported(Construct::TupleLiteral)),
        Expr::Set(_) => Err(ctx.unsupported(Construct::SetLiteral)),
        Expr::Dict(_) => Err(ctx.unsupported(Construct::DictLiteral)),
        Expr::Comprehension { kind, .. } => Err(ctx.unsupported(match kind {
            ComprehensionKind::List => Construct::ListComprehension,
            ComprehensionKind::Set => Construct::SetComprehension,
            ComprehensionKind::Dict => Construct::DictComprehension,
            ComprehensionKind::Generator => Construct::GeneratorExpression,
        })),
        Expr::Yield(_) => Err(ctx.unsupported(Construct::Yield)),
        Expr::YieldFrom(_) => Err(ctx.unsupported(Construct::YieldFrom)),
        Expr::Await(_) => Err(ctx.unsupported(Construct::Await)),
    }
}

/// Operator translation shared with augmented assignment.
///
/// `/` is true division and `%` on floats is `fmodf`, as on the host; `//`
/// truncates toward zero.
pub fn binary(op: BinOp, left: &Typed, right: &Typed, ctx: &FunctionContext<'_>) -> Result<Typed> {
    let (l, r) = (&left.code, &right.code);
    let integral = left.is_integral() && right.is_integral();
    let promoted = match (left.dtype(), right.dtype()) {
        (Some(a), Some(b)) => Some(Type::Scalar(ScalarDType::promote(a, b))),
        _ => None,
    };

    Ok(match op {
        BinOp::MatMult => return Err(ctx.unsupported(Construct::MatrixMultiplication)),
        BinOp::Pow if integral => Typed::scalar(format!("py_ipow({l}, {r})"), ScalarDType::Int32),
        BinOp::Pow => Typed::scalar(format!("pow(float({l}), float({r}))"), ScalarDType::Float32),
        BinOp::FloorDiv => Typed::scalar(format!("int({l} / {r})"), ScalarDType::Int32),
        BinOp::Div if integral => Typed::scalar(format!("(float({l}) / {r})"), ScalarDType::Float32),
        BinOp::Div => Typed::scalar(format!("({l} / {r})"), ScalarDType::Float32),
        BinOp::Mod if left.is_float() || right.is_float() => {
            Typed::scalar(format!("fmodf({l}, {r})"), ScalarDType::Float32)
        }
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor
            if left.dtype() == Some(ScalarDType::Bool) && right.dtype() == Some(ScalarDType::Bool) =>
        {
            Typed::scalar(format!("({l} {op} {r})"), ScalarDType::Bool)
        }
        _ => Typed::new(format!("({l} {op} {r})"), promoted),
    })
}

fn name_expr(name: &str, ctx: &FunctionContext<'_>) -> Result<Typed> {
    if let Some((receiver, class)) = ctx.receiver()
        && receiver == name
    {
        return Ok(Typed::new("(*this)", Some(Type::Class(class.clone()))));
    }
    if let Some(ty) = ctx.local(name) {
        return Ok(Typed::new(ident(name), ty.clone()));
    }
    if let Some(capture) = ctx.capture(name) {
        return Ok(Typed::new(capture_ident(name), Some(capture.ty.clone())));
    }
    let registry = ctx.registry();
    if registry.function(name).is_some() || registry.class(name).is_some() {
        return Err(ctx.unsupported(Construct::FunctionReference));
    }
    UnknownNameSnafu { name, function: ctx.function_name() }.fail()
}

fn is_math_module(value: &Expr, ctx: &FunctionContext<'_>) -> bool {
    matches!(value, Expr::Name(name) if name == "math" && !ctx.is_bound(name))
}

fn attribute(value: &Expr, attr: &str, ctx: &FunctionContext<'_>) -> Result<Typed> {
    if is_math_module(value, ctx) {
        return match attr {
            "pi" => Ok(Typed::scalar(float_literal(std::f32::consts::PI.into()), ScalarDType::Float32)),
            "e" => Ok(Typed::scalar(float_literal(std::f32::consts::E.into()), ScalarDType::Float32)),
            _ if MathFn::from_str(attr).is_ok() => Err(ctx.unsupported(Construct::FunctionReference)),
            _ => UnknownNameSnafu { name: format!("math.{attr}"), function: ctx.function_name() }.fail(),
        };
    }

    let object = translate_expr(value, ctx)?;
    let ty = match &object.ty {
        Some(Type::Class(class)) => {
            let field = class.field(attr).context(UndeclaredFieldSnafu { class: class.name.clone(), field: attr })?;
            Some(field.ty.clone())
        }
        Some(Type::List(_)) => return Err(ctx.unsupported(Construct::ListMethod)),
        Some(scalar @ Type::Scalar(_)) => {
            return UndeclaredFieldSnafu { class: scalar.c_name(), field: attr }.fail();
        }
        None => None,
    };
    Ok(Typed::new(format!("{}.{}", object.code, ident(attr)), ty))
}

fn compare(left: &Expr, ops: &[CmpOp], comparators: &[Expr], ctx: &FunctionContext<'_>) -> Result<Typed> {
    for op in ops {
        let construct = match op {
            CmpOp::Is => Construct::Is,
            CmpOp::IsNot => Construct::IsNot,
            CmpOp::In => Construct::In,
            CmpOp::NotIn => Construct::NotIn,
            _ => continue,
        };
        return Err(ctx.unsupported(construct));
    }

    let operands: Vec<String> = std::iter::once(left)
        .chain(comparators)
        .map(|e| translate_expr(e, ctx).map(|t| t.code))
        .try_collect()?;
    let pairs: Vec<String> = ops
        .iter()
        .zip(operands.iter().tuple_windows())
        .map(|(op, (lhs, rhs))| format!("({lhs} {op} {rhs})"))
        .collect();

    let code = match pairs.as_slice() {
        [single] => single.clone(),
        _ => format!("({})", pairs.join(" && ")),
    };
    Ok(Typed::scalar(code, ScalarDType::Bool))
}

fn translate_args(args: &[Expr], ctx: &FunctionContext<'_>) -> Result<Vec<Typed>> {
    args.iter().map(|a| translate_expr(a, ctx)).try_collect()
}

fn joined(args: &[Typed]) -> String {
    args.iter().map(|a| a.code.as_str()).join(", ")
}

fn call(func: &Expr, args: &[Expr], keywords: &[Keyword], ctx: &FunctionContext<'_>) -> Result<Typed> {
    if !keywords.is_empty() {
        return Err(ctx.unsupported(Construct::KeywordArgument));
    }
    if args.iter().any(|a| matches!(a, Expr::Starred(_))) {
        return Err(ctx.unsupported(Construct::StarredArgument));
    }

    match func {
        Expr::Name(name) if !ctx.is_bound(name) => named_call(name, args, ctx),
        Expr::Attribute { value, attr } if is_math_module(value, ctx) => {
            let f = MathFn::from_str(attr)
                .ok()
                .context(UnknownNameSnafu { name: format!("math.{attr}"), function: ctx.function_name() })?;
            math_call(f, args, ctx)
        }
        Expr::Attribute { value, attr } => method_call(value, attr, args, ctx),
        Expr::Lambda { .. } => Err(ctx.unsupported(Construct::Lambda)),
        other => {
            translate_expr(other, ctx)?;
            Err(ctx.unsupported(Construct::FunctionReference))
        }
    }
}

/// Translated arguments followed by the captures every traced callable
/// expects.
fn call_args(args: &[Expr], ctx: &FunctionContext<'_>) -> Result<String> {
    let mut parts: Vec<String> = translate_args(args, ctx)?.into_iter().map(|a| a.code).collect();
    parts.extend(ctx.captures().iter().map(|c| capture_ident(&c.name)));
    Ok(parts.join(", "))
}

fn named_call(name: &str, args: &[Expr], ctx: &FunctionContext<'_>) -> Result<Typed> {
    let registry = ctx.registry();

    if let Some(function) = registry.function(name) {
        let args = call_args(args, ctx)?;
        return Ok(Typed::new(format!("{}({args})", ident(name)), function.ret.clone()));
    }

    if let Some(class) = registry.class(name) {
        let traced = registry.method(name, "__init__").is_some();
        ensure!(
            args.is_empty() || traced,
            UntracedSnafu { name: format!("{name}.__init__"), function: ctx.function_name() }
        );
        // The implicit default constructor takes no captures.
        let args = if traced { call_args(args, ctx)? } else { String::new() };
        return Ok(Typed::new(format!("{name}({args})"), Some(Type::Class(class.clone()))));
    }

    let arity = |expected: usize| -> Result<()> {
        ensure!(args.len() == expected, AritySnafu { callee: name, function: ctx.function_name() });
        Ok(())
    };

    match name {
        "abs" => {
            arity(1)?;
            let arg = translate_expr(&args[0], ctx)?;
            let ty = arg.dtype().map(|d| Type::Scalar(ScalarDType::promote(d, d)));
            Ok(Typed::new(format!("py_abs({})", arg.code), ty))
        }
        "min" | "max" => {
            ensure!(args.len() >= 2, AritySnafu { callee: name, function: ctx.function_name() });
            let args = translate_args(args, ctx)?;
            let mut ty = args[0].ty.clone();
            let mut code = args[0].code.clone();
            for arg in &args[1..] {
                code = format!("py_{name}({code}, {})", arg.code);
                ty = match (ty.as_ref().and_then(Type::scalar), arg.dtype()) {
                    (Some(a), Some(b)) => Some(Type::Scalar(ScalarDType::promote(a, b))),
                    _ => None,
                };
            }
            Ok(Typed::new(code, ty))
        }
        "len" => {
            arity(1)?;
            let arg = translate_expr(&args[0], ctx)?;
            Ok(Typed::scalar(format!("len({})", arg.code), ScalarDType::Int32))
        }
        "print" => {
            let args = translate_args(args, ctx)?;
            Ok(Typed::new(format!("print({})", joined(&args)), None))
        }
        "int" | "float" => {
            arity(1)?;
            let arg = translate_expr(&args[0], ctx)?;
            let dtype = if name == "int" { ScalarDType::Int32 } else { ScalarDType::Float32 };
            Ok(Typed::scalar(format!("{name}({})", arg.code), dtype))
        }
        "range" => Err(ctx.unsupported(Construct::RangeValue)),
        _ => match MathFn::from_str(name) {
            Ok(f) => math_call(f, args, ctx),
            Err(_) => UntracedSnafu { name, function: ctx.function_name() }.fail(),
        },
    }
}

fn math_call(f: MathFn, args: &[Expr], ctx: &FunctionContext<'_>) -> Result<Typed> {
    let expected = if f == MathFn::Pow { 2 } else { 1 };
    ensure!(args.len() == expected, AritySnafu { callee: format!("math.{f}"), function: ctx.function_name() });
    let args = translate_args(args, ctx)?;
    let call = format!("{}({})", math_function(f), joined(&args));
    let code = match f {
        MathFn::Ceil | MathFn::Floor => format!("int({call})"),
        _ => call,
    };
    Ok(Typed::new(code, Some(math_return(f))))
}

fn method_call(value: &Expr, method: &str, args: &[Expr], ctx: &FunctionContext<'_>) -> Result<Typed> {
    let object = translate_expr(value, ctx)?;
    let ret = match &object.ty {
        Some(Type::Class(class)) => {
            let ir = ctx
                .registry()
                .method(&class.name, method)
                .context(UnknownMethodSnafu { class: class.name.clone(), method })?;
            ir.function.ret.clone()
        }
        Some(Type::List(_)) => return Err(ctx.unsupported(Construct::ListMethod)),
        Some(scalar @ Type::Scalar(_)) => {
            return UnknownMethodSnafu { class: scalar.c_name(), method }.fail();
        }
        None => None,
    };
    let args = call_args(args, ctx)?;
    Ok(Typed::new(format!("{}.{}({args})", object.code, ident(method)), ret))
}

/// Short source-like label for diagnostics.
pub fn expr_label(expr: &Expr) -> String {
    match expr {
        Expr::Name(name) => name.clone(),
        Expr::Attribute { value, attr } => format!("{}.{attr}", expr_label(value)),
        Expr::Call { func, .. } => format!("{}(...)", expr_label(func)),
        Expr::Subscript { value, .. } => format!("{}[...]", expr_label(value)),
        _ => "expression".to_string(),
    }
}
