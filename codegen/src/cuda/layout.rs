//! Class declarations in dependency order.
//!
//! A class depends on the classes of its fields and on the classes named by
//! its methods' argument and return types (lists unwrapped). Every class is
//! forward-declared first, so only by-value fields actually require the
//! ordering; method signatures are satisfied by the forward declarations.

use std::collections::HashMap;
use std::sync::Arc;

use gpumap_ir::{ClassDescriptor, ClosureParam, Registry};
use tracing::debug;

use super::function::{Callable, method_declaration};
use super::types::ident;

/// Direct dependencies of `class`, without itself, in first-mention order.
pub fn dependencies(registry: &Registry, class: &ClassDescriptor) -> Vec<Arc<ClassDescriptor>> {
    let mut deps = class.field_classes();
    for method in registry.methods_of(&class.name) {
        let function = &method.function;
        for ty in function.param_types.iter().skip(1).chain(function.ret.iter()) {
            if let Some(dep) = ty.innermost_class()
                && !deps.contains(dep)
            {
                deps.push(dep.clone());
            }
        }
    }
    deps.retain(|d| d.name != class.name);
    deps
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first topological order with registry order as the tie-break.
///
/// Cycles can only pass through method signatures (by-value field cycles are
/// rejected at extraction), so a back edge is simply skipped.
pub fn declaration_order(registry: &Registry) -> Vec<Arc<ClassDescriptor>> {
    fn visit(
        registry: &Registry,
        class: &Arc<ClassDescriptor>,
        marks: &mut HashMap<String, Mark>,
        order: &mut Vec<Arc<ClassDescriptor>>,
    ) {
        if marks.contains_key(&class.name) {
            return;
        }
        marks.insert(class.name.clone(), Mark::Visiting);
        for dep in dependencies(registry, class) {
            let dep = registry.class(&dep.name).cloned().unwrap_or(dep);
            visit(registry, &dep, marks, order);
        }
        marks.insert(class.name.clone(), Mark::Done);
        order.push(class.clone());
    }

    let mut marks = HashMap::new();
    let mut order = Vec::with_capacity(registry.classes().len());
    for class in registry.classes() {
        visit(registry, class, &mut marks, &mut order);
    }
    debug_assert!(marks.values().all(|m| *m == Mark::Done));
    order
}

pub fn forward_declarations(registry: &Registry) -> Vec<String> {
    registry.classes().iter().map(|c| format!("class {};", c.name)).collect()
}

/// Full declaration: fields in extraction order, a default constructor
/// (unless the traced constructor already has an empty parameter list), a
/// member-wise copy constructor and every method overload.
pub fn class_declaration(registry: &Registry, class: &ClassDescriptor, captures: &[ClosureParam]) -> Vec<String> {
    let name = &class.name;
    let mut code_lines = vec![format!("class {name} {{"), "    public:".to_string()];

    for field in &class.fields {
        code_lines.push(format!("        {} {};", field.ty.c_name(), ident(&field.name)));
    }

    let nullary_constructor = registry
        .method(name, "__init__")
        .is_some_and(|ctor| ctor.args().next().is_none() && captures.is_empty());
    if !nullary_constructor {
        code_lines.push(format!("        __device__ {name}(){{}};"));
    }

    code_lines.push(format!("        __device__ {name}(const {name}& other) {{"));
    for field in &class.fields {
        let field = ident(&field.name);
        code_lines.push(format!("            (*this).{field} = other.{field};"));
    }
    code_lines.push("        };".to_string());

    for method in registry.methods_of(name) {
        for variant in 0..Callable::Method(method).variants() {
            code_lines.push(format!("        {}", method_declaration(method, variant, captures)));
        }
    }

    code_lines.push("};".to_string());
    code_lines
}

/// Forward declarations followed by every class declaration.
pub fn emit(registry: &Registry, captures: &[ClosureParam]) -> Vec<String> {
    let order = declaration_order(registry);
    debug!(
        classes = %order.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(" -> "),
        "class declaration order"
    );

    let mut code_lines = forward_declarations(registry);
    for class in &order {
        code_lines.push(String::new());
        code_lines.extend(class_declaration(registry, class, captures));
    }
    code_lines
}
