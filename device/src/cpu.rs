//! Device emulation on the host.
//!
//! The translation unit is compiled as plain C++ with the system compiler into
//! a shared library. Outside `__CUDACC__` the unit defines `blockIdx`,
//! `blockDim` and `threadIdx` as globals and exports `<kernel>_launch`, which
//! walks the whole grid sequentially; launching means calling that
//! trampoline with one pointer per kernel argument.

use std::ffi::c_void;
use std::process::Command;
use std::ptr;
use std::sync::Arc;

use bon::bon;
use snafu::{ResultExt, ensure};
use tracing::{debug, instrument};

use crate::allocator::HostAllocator;
use crate::backend::{
    Artifact, Backend, BufferHandle, CompileOptions, EntryHandle, EntryPoint, HostLauncher, HostLibrary, KernelArg,
    LaunchFn,
};
use crate::error::{
    CompileSnafu, ForeignEntryPointSnafu, IoSnafu, LoadSnafu, MissingSymbolSnafu, Result, SpawnSnafu,
};

pub const DEFAULT_COMPILER: &str = "clang++";

fn default_flags() -> Vec<String> {
    ["-std=c++17", "-O2", "-shared", "-fPIC"].map(String::from).to_vec()
}

#[derive(Debug, Clone)]
pub struct CpuBackendConfig {
    /// C++ compiler executable.
    pub compiler: String,
    pub flags: Vec<String>,
}

impl Default for CpuBackendConfig {
    fn default() -> Self {
        Self { compiler: DEFAULT_COMPILER.to_string(), flags: default_flags() }
    }
}

#[bon]
impl CpuBackendConfig {
    #[builder]
    pub fn builder(
        #[builder(into, default = DEFAULT_COMPILER.to_string())] compiler: String,
        #[builder(default = default_flags())] flags: Vec<String>,
    ) -> Self {
        Self { compiler, flags }
    }

    /// Configuration from environment variables.
    ///
    /// * `GPUMAP_CXX` - C++ compiler (default: `clang++`)
    pub fn from_env() -> Self {
        let compiler = std::env::var("GPUMAP_CXX").unwrap_or_else(|_| DEFAULT_COMPILER.to_string());
        Self { compiler, flags: default_flags() }
    }
}

#[derive(Debug, Default)]
pub struct CpuBackend {
    config: CpuBackendConfig,
    memory: HostAllocator,
}

impl CpuBackend {
    pub fn new(config: CpuBackendConfig) -> Self {
        Self { config, memory: HostAllocator::new() }
    }

    pub fn from_env() -> Self {
        Self::new(CpuBackendConfig::from_env())
    }

    pub fn config(&self) -> &CpuBackendConfig {
        &self.config
    }

    /// Whether the configured compiler can be executed at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.config.compiler).arg("--version").output().is_ok_and(|out| out.status.success())
    }

    /// Buffers allocated and not yet freed.
    pub fn live_buffers(&self) -> usize {
        self.memory.live()
    }
}

struct CpuArtifact {
    library: Arc<HostLibrary>,
}

impl Artifact for CpuArtifact {
    fn entry_point(&self, name: &str) -> Result<EntryPoint> {
        let symbol = format!("{name}_launch");
        // SAFETY: the generated trampoline is `extern "C"` with exactly the
        // `LaunchFn` signature.
        let launch: LaunchFn = unsafe {
            *self.library.library.get::<LaunchFn>(symbol.as_bytes()).context(MissingSymbolSnafu { name: &symbol })?
        };
        Ok(EntryPoint::new(name, EntryHandle::Host(HostLauncher { _library: Arc::clone(&self.library), launch })))
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    #[instrument(skip_all, fields(kernel = %options.kernel_name, compiler = %self.config.compiler))]
    fn compile(&self, source: &str, options: &CompileOptions) -> Result<Box<dyn Artifact>> {
        let dir = tempfile::tempdir().context(IoSnafu { action: "create build directory" })?;
        let source_path = dir.path().join(format!("{}.cpp", options.kernel_name));
        let library_path =
            dir.path().join(format!("lib{}.{}", options.kernel_name, std::env::consts::DLL_EXTENSION));
        std::fs::write(&source_path, source)
            .context(IoSnafu { action: format!("write {}", source_path.display()) })?;

        let output = Command::new(&self.config.compiler)
            .args(&self.config.flags)
            .args(&options.extra_flags)
            .arg("-o")
            .arg(&library_path)
            .arg(&source_path)
            .output()
            .context(SpawnSnafu { compiler: &self.config.compiler })?;
        ensure!(
            output.status.success(),
            CompileSnafu { diagnostic: String::from_utf8_lossy(&output.stderr).into_owned() }
        );

        // SAFETY: the library is the unit we just compiled; it has no
        // initializers beyond zeroing the emulated index globals.
        let library = unsafe { libloading::Library::new(&library_path) }.context(LoadSnafu)?;
        debug!(bytes = source.len(), "compiled and loaded kernel library");
        Ok(Box::new(CpuArtifact { library: Arc::new(HostLibrary { library, _dir: Some(dir) }) }))
    }

    fn alloc(&self, size: usize) -> Result<BufferHandle> {
        let handle = self.memory.alloc(size);
        debug!(%handle, size, "alloc");
        Ok(handle)
    }

    fn to_device(&self, bytes: &[u8]) -> Result<BufferHandle> {
        let handle = self.memory.upload(bytes);
        debug!(%handle, size = bytes.len(), "to_device");
        Ok(handle)
    }

    fn copy_back(&self, handle: BufferHandle, size: usize) -> Result<Vec<u8>> {
        self.memory.read(handle, size)
    }

    fn free(&self, handle: BufferHandle) -> Result<()> {
        self.memory.free(handle)
    }

    #[instrument(skip_all, fields(kernel = %entry.name(), grid = grid, block = block))]
    fn launch(&self, entry: &EntryPoint, args: &[KernelArg], grid: u32, block: u32) -> Result<()> {
        let EntryHandle::Host(launcher) = entry.handle() else {
            return ForeignEntryPointSnafu { name: entry.name(), backend: self.name() }.fail();
        };

        let handles: Vec<BufferHandle> = args
            .iter()
            .filter_map(|arg| match arg {
                KernelArg::Buffer(handle) => Some(*handle),
                KernelArg::Int(_) => None,
            })
            .collect();
        let mut ints: Vec<i32> = args
            .iter()
            .filter_map(|arg| match arg {
                KernelArg::Int(value) => Some(*value),
                KernelArg::Buffer(_) => None,
            })
            .collect();

        self.memory.with_pointers(&handles, |buffers| {
            let mut buffers = buffers.iter().copied();
            let mut ints = ints.iter_mut();
            let mut slots: Vec<*mut c_void> = args
                .iter()
                .map(|arg| match arg {
                    KernelArg::Buffer(_) => buffers.next().unwrap_or(ptr::null_mut()),
                    KernelArg::Int(_) => ints.next().map_or(ptr::null_mut(), |v| ptr::from_mut(v).cast()),
                })
                .collect();
            debug!(args = slots.len(), "launching host trampoline");
            // SAFETY: every slot points at a live buffer or an i32 that
            // outlives the call, the table lock keeps buffers in place, and
            // the trampoline's parameter list was generated from the same
            // argument order.
            unsafe { (launcher.launch)(slots.as_mut_ptr(), grid, block) };
        })
    }
}
