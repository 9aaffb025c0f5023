//! Host-side orchestration of gpumap operations.
//!
//! - [`codec`] - packed byte layout of elements, prefixed and nested collections
//! - [`capture`] - free variables passed to the device and written back
//! - [`mapper`] - the trace/translate/compile/launch/collect state machine
//! - [`filter`] - predicate filtering on top of a map

pub mod capture;
pub mod codec;
pub mod config;
pub mod error;
pub mod filter;
pub mod mapper;


pub use capture::{Capture, CaptureKind};
pub use codec::{CodecError, ListOfLists};
pub use config::MapConfig;
pub use error::{Error, Result};
pub use filter::gpufilter;
pub use gpumap_codegen::{InputLayout, KernelKind};
pub use mapper::{DeviceBuffers, MapReport, Mapper, Stage, gpu_foreach, gpumap, gpumap_nested};
