//! Execution backends for generated kernels.
//!
//! - [`backend`] - the [`Backend`] / [`Artifact`] interface and launch arguments
//! - [`cpu`] - host emulation through the system C++ compiler
//! - `cuda` - NVRTC and the CUDA driver (feature `cuda`)

pub mod allocator;
pub mod backend;
pub mod cpu;
#[cfg(feature = "cuda")]
pub mod cuda;
pub mod error;


pub use allocator::{HostAllocator, HostBuffer};
pub use backend::{Artifact, Backend, BufferHandle, CompileOptions, EntryHandle, EntryPoint, KernelArg};
pub use cpu::{CpuBackend, CpuBackendConfig};
#[cfg(feature = "cuda")]
pub use cuda::CudaBackend;
pub use error::{Error, Result};
