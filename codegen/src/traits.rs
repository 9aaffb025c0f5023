//! Core traits for code generation.

use gpumap_ir::Registry;

use crate::{KernelSpec, RenderedKernel, Result};

/// Backend-agnostic code generation interface.
///
/// A renderer turns every function, method and class in a registry into one
/// translation unit whose single entry kernel is described by a
/// [`KernelSpec`].
pub trait Renderer {
    /// Render the registry into source for one kernel.
    ///
    /// Fails without partial output on the first construct that has no
    /// translation.
    fn render(&self, registry: &Registry, spec: &KernelSpec) -> Result<RenderedKernel>;

    /// Get the backend name (e.g., "cuda").
    fn backend_name(&self) -> &str;
}
