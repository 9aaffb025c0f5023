//! Free variables of the traced functions.
//!
//! Every name a traced function or method reads without binding it is resolved
//! the way the host would resolve it (closure cell first, then the module
//! globals). Names that resolve to functions, classes, modules or built-ins
//! are part of the translated program, not data; everything else becomes a
//! capture: serialized before launch, passed as an extra kernel parameter and
//! written back after the launch.

use std::collections::HashSet;
use std::slice;

use gpumap_host::{Cell, Interpreter, Value};
use gpumap_ir::{ClosureParam, Registry, Type, TypeBinding};
use snafu::{IntoError, OptionExt};
use tracing::debug;

use crate::codec::{self, TypeMismatchSnafu};
use crate::error::{LayoutSnafu, RegistrySnafu, Result, UnsupportedCaptureSnafu};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CaptureKind {
    /// `int`, `float` or `bool`; the device sees a pointer to one element.
    Scalar,
    /// A class instance; the device sees a pointer to one element.
    Object,
    /// A list; the device sees a length-prefixed buffer wrapped in `List<T>`.
    Collection,
}

/// Where a captured name lives on the host.
enum Slot {
    Global,
    Cell(Cell),
}

pub struct Capture {
    pub name: String,
    pub ty: Type,
    pub kind: CaptureKind,
    value: Value,
    slot: Slot,
}

impl std::fmt::Debug for Capture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capture").field("name", &self.name).field("ty", &self.ty).field("kind", &self.kind).finish()
    }
}

impl Capture {
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn closure_param(&self) -> ClosureParam {
        ClosureParam { name: self.name.clone(), ty: self.ty.clone() }
    }

    fn items(&self) -> codec::Result<Vec<Value>> {
        let items = self
            .value
            .as_list()
            .with_context(|| TypeMismatchSnafu { expected: "list", found: self.value.type_name() })?;
        Ok(items.borrow().clone())
    }

    /// Device bytes of the captured value.
    pub fn pack(&self) -> codec::Result<Vec<u8>> {
        match (&self.kind, &self.ty) {
            (CaptureKind::Collection, Type::List(element)) => codec::pack_prefixed(&self.items()?, element),
            _ => codec::pack(slice::from_ref(&self.value), &self.ty),
        }
    }

    /// Rebind the host variable from the device copy in `bytes`.
    pub fn write_back(&self, bytes: &[u8], interp: &Interpreter) -> codec::Result<()> {
        match (&self.kind, &self.ty) {
            (CaptureKind::Collection, Type::List(element)) => {
                let decoded = codec::unpack_prefixed(bytes, element, &self.items()?)?;
                codec::store_into_list(&self.value, decoded)
            }
            (CaptureKind::Object, _) => codec::unpack(bytes, &self.ty, slice::from_ref(&self.value)).map(drop),
            _ => {
                let decoded = codec::unpack(bytes, &self.ty, slice::from_ref(&self.value))?;
                let value = decoded
                    .into_iter()
                    .next()
                    .context(codec::LengthMismatchSnafu { expected: 1usize, actual: 0usize })?;
                match &self.slot {
                    Slot::Global => interp.set_global(&self.name, value),
                    Slot::Cell(cell) => *cell.borrow_mut() = value,
                }
                Ok(())
            }
        }
    }
}

fn resolve(interp: &Interpreter, binding: &TypeBinding, name: &str) -> Option<(Value, Slot)> {
    if let Some((_, cell)) = binding.function.captures.iter().find(|(n, _)| n == name) {
        let value = cell.borrow().clone();
        return Some((value, Slot::Cell(cell.clone())));
    }
    interp.global(name).map(|value| (value, Slot::Global))
}

/// Captures of every traced function and method, in first-use order. Classes found
/// inside captured values are registered in `registry`.
pub fn collect(interp: &Interpreter, bindings: &[TypeBinding], registry: &mut Registry) -> Result<Vec<Capture>> {
    let mut seen = HashSet::new();
    let mut captures = Vec::new();

    for binding in bindings {
        for name in binding.function.def.free_names() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let Some((value, slot)) = resolve(interp, binding, &name) else { continue };
            let kind = match &value {
                Value::Int(_) | Value::Float(_) | Value::Bool(_) => CaptureKind::Scalar,
                Value::Object(_) => CaptureKind::Object,
                Value::List(_) => CaptureKind::Collection,
                Value::Function(_) | Value::Class(_) | Value::Module(_) | Value::Builtin(_) => continue,
                other => return UnsupportedCaptureSnafu { name, type_name: other.type_name() }.fail(),
            };
            let ty = registry.type_of(&value).map_err(|err| match err {
                gpumap_ir::Error::Layout { source } => LayoutSnafu { name: name.clone() }.into_error(source),
                other => RegistrySnafu.into_error(other),
            })?;
            debug!(capture = %name, ty = %ty, %kind, function = %binding.name, "captured free variable");
            captures.push(Capture { name, ty, kind, value, slot });
        }
    }
    Ok(captures)
}

