//! CUDA C++ source generation.
//!
//! One translation unit holds, in order: host shims, the runtime prelude and
//! class declarations (packed, so device layout matches the codec), function
//! prototypes, function definitions, method definitions, the entry kernel and
//! a host launch trampoline compiled only outside `__CUDACC__`.
//!
//! Every function and method is emitted once per reference-qualification
//! variant: the powerset over its non-primitive parameters of `&` vs `&&`.

pub mod entry;
pub mod expr;
pub mod function;
pub mod layout;
pub mod prelude;
pub mod stmt;
pub mod types;

use gpumap_ir::Registry;
use snafu::OptionExt;
use tracing::{debug, instrument};

use crate::error::{MissingEntrySnafu, Result};
use crate::types::{KernelSpec, RenderedKernel};

use self::entry::{render_entry, render_launcher};
use self::function::{Callable, convert, prototype};

/// CUDA C++ renderer; the output also builds as plain C++17 for host
/// emulation.
pub struct CudaRenderer;

impl CudaRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CudaRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::Renderer for CudaRenderer {
    fn render(&self, registry: &Registry, spec: &KernelSpec) -> Result<RenderedKernel> {
        render(registry, spec)
    }

    fn backend_name(&self) -> &str {
        "cuda"
    }
}

/// Render the whole registry as one translation unit around `spec`'s entry.
#[instrument(skip_all, fields(kernel = %spec.name, entry = %spec.entry))]
pub fn render(registry: &Registry, spec: &KernelSpec) -> Result<RenderedKernel> {
    let entry = registry.function(&spec.entry).context(MissingEntrySnafu { name: &spec.entry })?;
    let captures = entry.closure.as_slice();
    let (kernel_lines, params) = render_entry(entry, spec)?;

    let mut code_lines = vec![prelude::HOST_SHIM.to_string(), "#pragma pack(push, 1)".to_string(), String::new()];
    code_lines.push(prelude::PRELUDE.to_string());
    code_lines.push(String::new());
    code_lines.extend(layout::emit(registry, captures));
    code_lines.push(String::new());
    code_lines.push("#pragma pack(pop)".to_string());
    code_lines.push(String::new());

    for function in registry.functions() {
        for variant in 0..Callable::Function(function).variants() {
            code_lines.push(prototype(function, variant, captures));
        }
    }

    let callables = registry
        .functions()
        .iter()
        .map(Callable::Function)
        .chain(registry.methods().iter().map(Callable::Method));
    for callable in callables {
        for variant in 0..callable.variants() {
            code_lines.push(String::new());
            code_lines.push(convert(registry, callable, variant, captures)?);
        }
    }

    code_lines.push(String::new());
    code_lines.extend(kernel_lines);
    code_lines.push(String::new());
    code_lines.extend(render_launcher(spec, &params));

    let mut kernel = RenderedKernel::new(code_lines.join("\n"), spec);
    for param in params {
        kernel.add_param(param);
    }
    debug!(
        classes = registry.classes().len(),
        functions = registry.functions().len(),
        methods = registry.methods().len(),
        bytes = kernel.code.len(),
        "rendered translation unit"
    );
    Ok(kernel)
}
