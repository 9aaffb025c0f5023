//! NVRTC compilation and launch through `cudarc`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cudarc::driver::{CudaContext, CudaModule, CudaSlice, CudaStream, LaunchConfig, PushKernelArg};
use cudarc::nvrtc::{CompileOptions as NvrtcOptions, compile_ptx_with_opts};
use parking_lot::Mutex;
use snafu::{OptionExt, ResultExt, ensure};
use tracing::{debug, instrument};

use crate::backend::{Artifact, Backend, BufferHandle, CompileOptions, EntryHandle, EntryPoint, KernelArg};
use crate::error::{
    CompileSnafu, CudaSnafu, ForeignEntryPointSnafu, OutOfBoundsSnafu, Result, UnknownBufferSnafu,
};

pub struct CudaBackend {
    context: Arc<CudaContext>,
    stream: Arc<CudaStream>,
    buffers: Mutex<HashMap<BufferHandle, CudaSlice<u8>>>,
    next_id: AtomicU64,
}

impl CudaBackend {
    pub fn new(ordinal: usize) -> Result<Self> {
        let context = CudaContext::new(ordinal).context(CudaSnafu)?;
        let stream = context.default_stream();
        Ok(Self { context, stream, buffers: Mutex::new(HashMap::new()), next_id: AtomicU64::new(0) })
    }

    fn insert(&self, slice: CudaSlice<u8>) -> BufferHandle {
        let handle = BufferHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.buffers.lock().insert(handle, slice);
        handle
    }
}

struct CudaArtifact {
    module: Arc<CudaModule>,
}

impl Artifact for CudaArtifact {
    fn entry_point(&self, name: &str) -> Result<EntryPoint> {
        let function = self.module.load_function(name).context(CudaSnafu)?;
        Ok(EntryPoint::new(name, EntryHandle::Cuda(function)))
    }
}

impl Backend for CudaBackend {
    fn name(&self) -> &str {
        "cuda"
    }

    #[instrument(skip_all, fields(kernel = %options.kernel_name))]
    fn compile(&self, source: &str, options: &CompileOptions) -> Result<Box<dyn Artifact>> {
        let nvrtc = NvrtcOptions { options: options.extra_flags.clone(), ..Default::default() };
        let ptx = compile_ptx_with_opts(source, nvrtc)
            .map_err(|e| CompileSnafu { diagnostic: format!("{e:?}") }.build())?;
        let module = self.context.load_module(ptx).context(CudaSnafu)?;
        debug!(bytes = source.len(), "compiled and loaded module");
        Ok(Box::new(CudaArtifact { module }))
    }

    fn alloc(&self, size: usize) -> Result<BufferHandle> {
        let slice = self.stream.alloc_zeros::<u8>(size).context(CudaSnafu)?;
        Ok(self.insert(slice))
    }

    fn to_device(&self, bytes: &[u8]) -> Result<BufferHandle> {
        let slice = self.stream.memcpy_stod(bytes).context(CudaSnafu)?;
        Ok(self.insert(slice))
    }

    fn copy_back(&self, handle: BufferHandle, size: usize) -> Result<Vec<u8>> {
        let buffers = self.buffers.lock();
        let slice = buffers.get(&handle).context(UnknownBufferSnafu { handle })?;
        ensure!(size <= slice.len(), OutOfBoundsSnafu { handle, requested: size, size: slice.len() });
        let mut bytes = self.stream.memcpy_dtov(slice).context(CudaSnafu)?;
        bytes.truncate(size);
        Ok(bytes)
    }

    fn free(&self, handle: BufferHandle) -> Result<()> {
        self.buffers.lock().remove(&handle).map(drop).context(UnknownBufferSnafu { handle })
    }

    #[instrument(skip_all, fields(kernel = %entry.name(), grid = grid, block = block))]
    fn launch(&self, entry: &EntryPoint, args: &[KernelArg], grid: u32, block: u32) -> Result<()> {
        let EntryHandle::Cuda(function) = entry.handle() else {
            return ForeignEntryPointSnafu { name: entry.name(), backend: self.name() }.fail();
        };

        let buffers = self.buffers.lock();
        let ints: Vec<i32> = args
            .iter()
            .filter_map(|arg| match arg {
                KernelArg::Int(value) => Some(*value),
                KernelArg::Buffer(_) => None,
            })
            .collect();
        let mut ints = ints.iter();

        let mut builder = self.stream.launch_builder(function);
        for arg in args {
            match arg {
                KernelArg::Buffer(handle) => {
                    let slice = buffers.get(handle).context(UnknownBufferSnafu { handle: *handle })?;
                    builder.arg(slice);
                }
                KernelArg::Int(_) => {
                    if let Some(value) = ints.next() {
                        builder.arg(value);
                    }
                }
            }
        }

        let config = LaunchConfig { grid_dim: (grid, 1, 1), block_dim: (block, 1, 1), shared_mem_bytes: 0 };
        // SAFETY: arguments follow the generated kernel's parameter order and
        // every buffer stays alive under the table lock until synchronization.
        unsafe { builder.launch(config) }.context(CudaSnafu)?;
        self.stream.synchronize().context(CudaSnafu)
    }
}
