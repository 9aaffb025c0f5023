//! Function and method definitions.
//!
//! Each callable is converted once per reference-qualification variant. The
//! variants share one body; only the signature differs, so overload
//! resolution picks `&` for named arguments and `&&` for temporaries.

use std::collections::HashMap;
use std::sync::Arc;

use gpumap_ir::{ClassDescriptor, ClosureParam, FunctionIr, MethodIr, Registry, Type};
use itertools::Itertools;
use tracing::debug;

use super::stmt::translate_body;
use super::types::{capture_ident, capture_label, ident, param_list, return_label, variant_count};
use crate::error::{Construct, Error, Result, UnsupportedSnafu};

/// Per-conversion state: the symbol table, the capture table and output
/// indentation.
pub struct FunctionContext<'a> {
    registry: &'a Registry,
    /// Qualified name for diagnostics.
    name: String,
    receiver: Option<(&'a str, &'a Arc<ClassDescriptor>)>,
    captures: &'a [ClosureParam],
    /// Innermost scope last. A local's type is `None` when it cannot be
    /// inferred statically.
    scopes: Vec<HashMap<String, Option<Type>>>,
    iterators: usize,
    depth: usize,
}

impl<'a> FunctionContext<'a> {
    pub fn new(registry: &'a Registry, name: impl Into<String>, captures: &'a [ClosureParam]) -> Self {
        Self {
            registry,
            name: name.into(),
            receiver: None,
            captures,
            scopes: vec![HashMap::new()],
            iterators: 0,
            depth: 1,
        }
    }

    pub fn with_receiver(mut self, name: &'a str, class: &'a Arc<ClassDescriptor>) -> Self {
        self.receiver = Some((name, class));
        self
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn function_name(&self) -> &str {
        &self.name
    }

    pub fn receiver(&self) -> Option<(&'a str, &'a Arc<ClassDescriptor>)> {
        self.receiver
    }

    pub fn is_receiver(&self, name: &str) -> bool {
        self.receiver.is_some_and(|(receiver, _)| receiver == name)
    }

    /// Known type of a declared local, innermost scope first.
    pub fn local(&self, name: &str) -> Option<&Option<Type>> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.local(name).is_some()
    }

    pub fn declare(&mut self, name: &str, ty: Option<Type>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
    }

    pub fn capture(&self, name: &str) -> Option<&'a ClosureParam> {
        self.captures.iter().find(|c| c.name == name)
    }

    pub fn captures(&self) -> &'a [ClosureParam] {
        self.captures
    }

    /// Whether `name` refers to a receiver, local or capture rather than a
    /// global.
    pub fn is_bound(&self, name: &str) -> bool {
        self.is_receiver(name) || self.is_local(name) || self.capture(name).is_some()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
        self.depth += 1;
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
        self.depth = self.depth.saturating_sub(1);
    }

    /// Fresh `__iterator_N` name, numbered from 1 per conversion.
    pub fn next_iterator(&mut self) -> String {
        self.iterators += 1;
        format!("__iterator_{}", self.iterators)
    }

    pub fn indent(&self) -> String {
        "    ".repeat(self.depth)
    }

    pub fn emit(&self, out: &mut Vec<String>, line: impl AsRef<str>) {
        out.push(format!("{}{}", self.indent(), line.as_ref()));
    }

    pub fn unsupported(&self, construct: Construct) -> Error {
        UnsupportedSnafu { construct, function: self.name.clone() }.build()
    }
}

/// A function or method to convert.
#[derive(Debug, Clone, Copy)]
pub enum Callable<'a> {
    Function(&'a FunctionIr),
    Method(&'a MethodIr),
}

impl<'a> Callable<'a> {
    pub fn ir(&self) -> &'a FunctionIr {
        match self {
            Self::Function(function) => function,
            Self::Method(method) => &method.function,
        }
    }

    /// Parameters that appear in the device signature.
    pub fn params(&self) -> impl Iterator<Item = (&'a str, &'a Type)> + 'a {
        let ir = self.ir();
        let skip = usize::from(matches!(self, Self::Method(_)));
        ir.params.iter().zip(&ir.param_types).skip(skip).map(|(n, t)| (n.as_str(), t))
    }

    pub fn variants(&self) -> usize {
        variant_count(self.params().map(|(_, ty)| ty))
    }

    pub fn qualified_name(&self) -> String {
        match self {
            Self::Function(function) => function.name.clone(),
            Self::Method(method) => format!("{}.{}", method.owner.name, method.name()),
        }
    }
}

/// Capture parameters appended after the declared ones.
fn capture_params(captures: &[ClosureParam]) -> impl Iterator<Item = String> + '_ {
    captures.iter().map(|c| format!("{} {}", capture_label(&c.ty), capture_ident(&c.name)))
}

/// Out-of-class signature without the trailing `;` or body.
pub fn signature(callable: Callable<'_>, variant: usize, captures: &[ClosureParam]) -> String {
    let mut params = param_list(callable.params(), variant);
    params.extend(capture_params(captures));
    match callable {
        Callable::Function(function) => format!(
            "__device__ {} {}({})",
            return_label(function.ret.as_ref()),
            ident(&function.name),
            params.join(", ")
        ),
        Callable::Method(method) if method.is_constructor => {
            format!("__device__ {0}::{0}({1})", method.owner.name, params.join(", "))
        }
        Callable::Method(method) => format!(
            "__device__ {} {}::{}({})",
            return_label(method.function.ret.as_ref()),
            method.owner.name,
            ident(method.name()),
            params.join(", ")
        ),
    }
}

/// Free-function prototype for one variant.
pub fn prototype(function: &FunctionIr, variant: usize, captures: &[ClosureParam]) -> String {
    format!("{};", signature(Callable::Function(function), variant, captures))
}

/// In-class method declaration for one variant.
pub fn method_declaration(method: &MethodIr, variant: usize, captures: &[ClosureParam]) -> String {
    let mut params = param_list(Callable::Method(method).params(), variant);
    params.extend(capture_params(captures));
    let params = params.join(", ");
    if method.is_constructor {
        format!("__device__ {} ({params});", method.owner.name)
    } else {
        format!("__device__ {} {} ({params});", return_label(method.function.ret.as_ref()), ident(method.name()))
    }
}

/// Translate one variant of a function or method into a device definition.
///
/// Every callable takes the captures as trailing parameters, spelled with
/// [`capture_ident`] so they cannot collide with declared names.
pub fn convert(
    registry: &Registry,
    callable: Callable<'_>,
    variant: usize,
    captures: &[ClosureParam],
) -> Result<String> {
    let ir = callable.ir();
    let name = callable.qualified_name();

    let mut ctx = FunctionContext::new(registry, name.clone(), captures);
    if ir.def.is_async {
        return Err(ctx.unsupported(Construct::AsyncFunction));
    }
    if let Callable::Method(method) = callable {
        ctx = ctx.with_receiver(method.receiver(), &method.owner);
    }
    for (param, ty) in callable.params() {
        ctx.declare(param, Some(ty.clone()));
    }

    let mut body = Vec::new();
    translate_body(&ir.def.body, &mut ctx, &mut body)?;

    let mut lines = Vec::with_capacity(body.len() + 2);
    lines.push(format!("{} {{", signature(callable, variant, captures)));
    lines.extend(body);
    lines.push("}".to_string());

    debug!(function = %name, variant, lines = lines.len(), "converted");
    Ok(lines.into_iter().join("\n"))
}
