//! The execution backend interface the orchestrator drives.
//!
//! A backend compiles one translation unit into an [`Artifact`], resolves
//! the entry kernel from it, owns device memory behind opaque
//! [`BufferHandle`]s and launches the kernel over a 1-D grid. Launches are
//! synchronous: `launch` returns once every lane has finished.

use std::ffi::{c_uint, c_void};
use std::fmt;
use std::sync::Arc;

use bon::bon;

use crate::error::Result;

/// Opaque reference to one device allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(u64);

impl BufferHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One kernel argument, in entry-point parameter order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelArg {
    Buffer(BufferHandle),
    Int(i32),
}

/// Host trampoline exported next to the kernel: `(args, grid, block)`.
pub type LaunchFn = unsafe extern "C" fn(*mut *mut c_void, c_uint, c_uint);

/// Keeps a loaded kernel library (and whatever owns its file) alive for as
/// long as an entry point into it exists.
pub struct HostLibrary {
    pub(crate) library: libloading::Library,
    pub(crate) _dir: Option<tempfile::TempDir>,
}

#[derive(Clone)]
pub struct HostLauncher {
    pub(crate) _library: Arc<HostLibrary>,
    pub(crate) launch: LaunchFn,
}

pub enum EntryHandle {
    /// Resolved by name at launch time.
    Named,
    Host(HostLauncher),
    #[cfg(feature = "cuda")]
    Cuda(cudarc::driver::CudaFunction),
}

/// A launchable kernel resolved from an [`Artifact`].
pub struct EntryPoint {
    name: String,
    handle: EntryHandle,
}

impl EntryPoint {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), handle: EntryHandle::Named }
    }

    pub fn new(name: impl Into<String>, handle: EntryHandle) -> Self {
        Self { name: name.into(), handle }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &EntryHandle {
        &self.handle
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.handle {
            EntryHandle::Named => "named",
            EntryHandle::Host(_) => "host",
            #[cfg(feature = "cuda")]
            EntryHandle::Cuda(_) => "cuda",
        };
        f.debug_struct("EntryPoint").field("name", &self.name).field("kind", &kind).finish()
    }
}

/// Per-compilation options.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Entry kernel name; also names the temporary files.
    pub kernel_name: String,
    /// Flags appended after the backend's own.
    pub extra_flags: Vec<String>,
}

#[bon]
impl CompileOptions {
    #[builder]
    pub fn builder(#[builder(into)] kernel_name: String, #[builder(default)] extra_flags: Vec<String>) -> Self {
        Self { kernel_name, extra_flags }
    }

    pub fn for_kernel(kernel_name: impl Into<String>) -> Self {
        Self { kernel_name: kernel_name.into(), extra_flags: Vec::new() }
    }
}

/// A compiled translation unit.
pub trait Artifact {
    fn entry_point(&self, name: &str) -> Result<EntryPoint>;
}

pub trait Backend {
    fn name(&self) -> &str;

    /// Compile a translation unit; failures carry the compiler diagnostic.
    fn compile(&self, source: &str, options: &CompileOptions) -> Result<Box<dyn Artifact>>;

    /// Zero-initialized allocation of `size` bytes.
    fn alloc(&self, size: usize) -> Result<BufferHandle>;

    /// Allocate and fill a buffer with `bytes`.
    fn to_device(&self, bytes: &[u8]) -> Result<BufferHandle>;

    /// Copy the first `size` bytes of a buffer back to the host.
    fn copy_back(&self, handle: BufferHandle, size: usize) -> Result<Vec<u8>>;

    fn free(&self, handle: BufferHandle) -> Result<()>;

    /// Run `entry` on `grid` blocks of `block` lanes and wait for completion.
    fn launch(&self, entry: &EntryPoint, args: &[KernelArg], grid: u32, block: u32) -> Result<()>;
}
