use snafu::Snafu;

use crate::backend::BufferHandle;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The backend compiler rejected the translation unit. The diagnostic is
    /// the compiler output, unmodified.
    #[snafu(display("kernel compilation failed:\n{diagnostic}"))]
    Compile { diagnostic: String },

    #[snafu(display("failed to run `{compiler}`: {source}"))]
    Spawn { compiler: String, source: std::io::Error },

    #[snafu(display("{action}: {source}"))]
    Io { action: String, source: std::io::Error },

    #[snafu(display("failed to load compiled kernel: {source}"))]
    Load { source: libloading::Error },

    #[snafu(display("entry point '{name}' not found: {source}"))]
    MissingSymbol { name: String, source: libloading::Error },

    /// Entry point was resolved by another backend.
    #[snafu(display("entry point '{name}' does not belong to the {backend} backend"))]
    ForeignEntryPoint { name: String, backend: String },

    #[snafu(display("unknown buffer {handle}"))]
    UnknownBuffer { handle: BufferHandle },

    #[snafu(display("read of {requested} bytes exceeds buffer {handle} of {size} bytes"))]
    OutOfBounds { handle: BufferHandle, requested: usize, size: usize },

    #[cfg(feature = "cuda")]
    #[snafu(display("CUDA error: {source}"))]
    Cuda { source: cudarc::driver::DriverError },
}
