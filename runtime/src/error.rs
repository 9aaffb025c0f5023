//! Errors of a map operation, one variant per failing layer.

use snafu::Snafu;

use crate::codec::CodecError;
use crate::mapper::Stage;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("trace failed: {source}"))]
    Trace { source: gpumap_ir::TraceError },

    /// Registry construction from the trace, including layout extraction.
    #[snafu(display("{source}"))]
    Registry { source: gpumap_ir::Error },

    #[snafu(display("translation failed: {source}"))]
    Translation { source: gpumap_codegen::Error },

    #[snafu(display("capture '{name}': {source}"))]
    Layout { name: String, source: gpumap_ir::LayoutError },

    #[snafu(display("{stage}: {source}"))]
    Codec { stage: Stage, source: CodecError },

    #[snafu(display("{stage}: {source}"))]
    Backend { stage: Stage, source: gpumap_device::Error },

    #[snafu(display("host: {source}"))]
    Host { source: gpumap_host::Error },

    #[snafu(display("captured '{name}' of type '{type_name}' cannot be passed to the device"))]
    UnsupportedCapture { name: String, type_name: String },

    #[snafu(display("'{type_name}' object is not a function"))]
    NotAFunction { type_name: String },

    #[snafu(display("trace recorded no free function taking one argument"))]
    NoEntryPoint,

    #[snafu(display("cannot prepare a map over an empty collection"))]
    EmptyInput,

    #[snafu(display("no value staged for kernel parameter '{param}'"))]
    MissingArgument { param: String },

    #[snafu(display("{count} elements exceed the device lane count"))]
    TooManyItems { count: usize },

    #[snafu(display("cannot {operation} in stage {stage}"))]
    OutOfOrder { operation: String, stage: Stage },

    #[snafu(display("filter predicate returned '{type_name}' instead of bool"))]
    NotAPredicate { type_name: String },
}
