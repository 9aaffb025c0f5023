//! Statement translation.

use gpumap_host::ast::{BinOp, Expr, Stmt};
use gpumap_ir::Type;
use itertools::Itertools;
use snafu::{OptionExt, ensure};

use super::expr::{Typed, binary, expr_label, translate_expr};
use super::function::FunctionContext;
use super::types::ident;
use crate::error::{
    AritySnafu, CapturedAssignmentSnafu, Construct, Result, UnknownIterableSnafu, UnknownNameSnafu,
};

pub fn translate_body(body: &[Stmt], ctx: &mut FunctionContext<'_>, out: &mut Vec<String>) -> Result<()> {
    for stmt in body {
        translate_stmt(stmt, ctx, out)?;
    }
    Ok(())
}

/// Translate `body` one indentation level deeper, in its own scope.
fn block(body: &[Stmt], ctx: &mut FunctionContext<'_>, out: &mut Vec<String>) -> Result<()> {
    ctx.push_scope();
    let result = translate_body(body, ctx, out);
    ctx.pop_scope();
    result
}

pub fn translate_stmt(stmt: &Stmt, ctx: &mut FunctionContext<'_>, out: &mut Vec<String>) -> Result<()> {
    match stmt {
        // Docstrings.
        Stmt::Expr(Expr::Str(_)) | Stmt::Pass => {}
        Stmt::Expr(expr) => {
            let expr = translate_expr(expr, ctx)?;
            ctx.emit(out, format!("{};", expr.code));
        }
        Stmt::Assign { targets, value } => {
            let [target] = targets.as_slice() else {
                return Err(ctx.unsupported(Construct::MultipleAssignment));
            };
            assign(target, value, ctx, out)?;
        }
        Stmt::AugAssign { target, op, value } => aug_assign(target, *op, value, ctx, out)?,
        Stmt::Return(None) | Stmt::Return(Some(Expr::None)) => ctx.emit(out, "return;"),
        Stmt::Return(Some(value)) => {
            let value = translate_expr(value, ctx)?;
            ctx.emit(out, format!("return {};", value.code));
        }
        Stmt::Break => ctx.emit(out, "break;"),
        Stmt::Continue => ctx.emit(out, "continue;"),
        Stmt::If { test, body, orelse } => {
            let test = translate_expr(test, ctx)?;
            ctx.emit(out, format!("if ({}) {{", test.code));
            block(body, ctx, out)?;
            if !orelse.is_empty() {
                ctx.emit(out, "} else {");
                block(orelse, ctx, out)?;
            }
            ctx.emit(out, "}");
        }
        Stmt::While { test, body, orelse } => {
            if !orelse.is_empty() {
                return Err(ctx.unsupported(Construct::LoopElse));
            }
            let test = translate_expr(test, ctx)?;
            ctx.emit(out, format!("while ({}) {{", test.code));
            block(body, ctx, out)?;
            ctx.emit(out, "}");
        }
        Stmt::For { target, iter, body, orelse, is_async } => {
            if *is_async {
                return Err(ctx.unsupported(Construct::AsyncFor));
            }
            if !orelse.is_empty() {
                return Err(ctx.unsupported(Construct::LoopElse));
            }
            for_loop(target, iter, body, ctx, out)?;
        }
        Stmt::FunctionDef(_) => return Err(ctx.unsupported(Construct::NestedFunction)),
        Stmt::ClassDef(_) => return Err(ctx.unsupported(Construct::NestedClass)),
        Stmt::Try { .. } => return Err(ctx.unsupported(Construct::Try)),
        Stmt::Raise(_) => return Err(ctx.unsupported(Construct::Raise)),
        Stmt::Assert { .. } => return Err(ctx.unsupported(Construct::Assert)),
        Stmt::Delete(_) => return Err(ctx.unsupported(Construct::Delete)),
        Stmt::With { is_async: true, .. } => return Err(ctx.unsupported(Construct::AsyncWith)),
        Stmt::With { .. } => return Err(ctx.unsupported(Construct::With)),
        Stmt::Global(_) => return Err(ctx.unsupported(Construct::Global)),
        Stmt::Nonlocal(_) => return Err(ctx.unsupported(Construct::Nonlocal)),
        Stmt::Import(_) => return Err(ctx.unsupported(Construct::Import)),
        Stmt::ImportFrom { .. } => return Err(ctx.unsupported(Construct::ImportFrom)),
    }
    Ok(())
}

fn ensure_assignable(name: &str, ctx: &FunctionContext<'_>) -> Result<()> {
    ensure!(
        ctx.is_local(name) || ctx.capture(name).is_none(),
        CapturedAssignmentSnafu { name, function: ctx.function_name() }
    );
    Ok(())
}

/// The first assignment to a name declares it: `auto` when the value is
/// statically primitive, `auto&&` otherwise. Later assignments never
/// re-qualify.
fn assign(target: &Expr, value: &Expr, ctx: &mut FunctionContext<'_>, out: &mut Vec<String>) -> Result<()> {
    match target {
        Expr::Name(name) if ctx.is_receiver(name) => {
            let value = translate_expr(value, ctx)?;
            ctx.emit(out, format!("(*this) = {};", value.code));
        }
        Expr::Name(name) => {
            ensure_assignable(name, ctx)?;
            let value = translate_expr(value, ctx)?;
            if ctx.is_local(name) {
                ctx.emit(out, format!("{} = {};", ident(name), value.code));
            } else {
                let qualifier = if value.is_primitive() { "auto" } else { "auto&&" };
                ctx.emit(out, format!("{qualifier} {} = {};", ident(name), value.code));
                ctx.declare(name, value.ty);
            }
        }
        Expr::Tuple(_) | Expr::List(_) | Expr::Starred(_) => {
            return Err(ctx.unsupported(Construct::UnpackingAssignment));
        }
        place => {
            let place = translate_expr(place, ctx)?;
            let value = translate_expr(value, ctx)?;
            ctx.emit(out, format!("{} = {};", place.code, value.code));
        }
    }
    Ok(())
}

fn aug_assign(target: &Expr, op: BinOp, value: &Expr, ctx: &mut FunctionContext<'_>, out: &mut Vec<String>) -> Result<()> {
    match target {
        Expr::Name(name) => {
            ensure_assignable(name, ctx)?;
            ensure!(ctx.is_bound(name), UnknownNameSnafu { name, function: ctx.function_name() });
        }
        Expr::Tuple(_) | Expr::List(_) | Expr::Starred(_) => {
            return Err(ctx.unsupported(Construct::UnpackingAssignment));
        }
        _ => {}
    }
    let current = translate_expr(target, ctx)?;
    let value = translate_expr(value, ctx)?;
    let combined = binary(op, &current, &value, ctx)?;
    ctx.emit(out, format!("{} = {};", current.code, combined.code));
    Ok(())
}

/// `for` over `range(...)` or a collection-typed variable, desugared into an
/// explicit iterator and a `while` loop. The loop variable is scoped to the
/// loop body.
fn for_loop(target: &Expr, iter: &Expr, body: &[Stmt], ctx: &mut FunctionContext<'_>, out: &mut Vec<String>) -> Result<()> {
    let Expr::Name(var) = target else {
        return Err(ctx.unsupported(Construct::UnpackingAssignment));
    };
    ensure_assignable(var, ctx)?;

    let (init, element, binding) = match iter {
        Expr::Call { func, args, keywords } if matches!(&**func, Expr::Name(n) if n == "range" && !ctx.is_bound(n)) => {
            if !keywords.is_empty() {
                return Err(ctx.unsupported(Construct::KeywordArgument));
            }
            let bounds: Vec<Typed> = args.iter().map(|a| translate_expr(a, ctx)).try_collect()?;
            let (start, stop, step) = match bounds.as_slice() {
                [stop] => ("0", stop.code.as_str(), "1"),
                [start, stop] => (start.code.as_str(), stop.code.as_str(), "1"),
                [start, stop, step] => (start.code.as_str(), stop.code.as_str(), step.code.as_str()),
                _ => return AritySnafu { callee: "range", function: ctx.function_name() }.fail(),
            };
            (format!("RangeIterator({start}, {stop}, {step})"), Type::INT, "")
        }
        collection => {
            let typed = translate_expr(collection, ctx)?;
            let element = typed
                .ty
                .as_ref()
                .and_then(Type::element)
                .cloned()
                .context(UnknownIterableSnafu { iterable: expr_label(collection), function: ctx.function_name() })?;
            (format!("ListIterator<{}>({})", element.c_name(), typed.code), element, "&")
        }
    };

    let iterator = ctx.next_iterator();
    ctx.emit(out, format!("auto {iterator} = {init};"));
    ctx.emit(out, format!("while ({iterator}.has_next()) {{"));
    ctx.push_scope();
    ctx.emit(out, format!("{} {binding}{} = {iterator}.next();", element.c_name(), ident(var)));
    ctx.declare(var, Some(element));
    let result = translate_body(body, ctx, out);
    ctx.pop_scope();
    result?;
    ctx.emit(out, "}");
    Ok(())
}
