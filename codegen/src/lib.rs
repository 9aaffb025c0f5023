//! Device code generation for gpumap.
//!
//! - [`cuda::layout`] - class declarations in dependency order
//! - [`cuda::function`] - function and method definitions, one per
//!   reference-qualification variant
//! - [`cuda::entry`] - the entry kernel and its host launch trampoline

pub mod cuda;
pub mod error;
pub mod traits;
pub mod types;

#[cfg(test)]
pub mod test;

pub use cuda::CudaRenderer;
pub use error::{Construct, Error, Result};
pub use traits::Renderer;
pub use types::{InputLayout, KernelKind, KernelParam, KernelSpec, ParamRole, RenderedKernel};
