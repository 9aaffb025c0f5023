//! Intermediate representation for gpumap.
//!
//! - [`trace`] - observes one representative call and records type bindings
//! - [`extract`] - builds [`ClassDescriptor`]s from sample instances
//! - [`registry`] - typed [`FunctionIr`] and [`MethodIr`] records
//! - [`types`] - the closed [`Type`] union shared by every later stage

pub mod class;
pub mod error;
pub mod extract;
pub mod registry;
pub mod trace;
pub mod types;


pub use class::{ClassDescriptor, Field};
pub use error::{Error, LayoutError, Result, TraceError};
pub use extract::{Extractor, extract};
pub use registry::{ClosureParam, FunctionIr, MethodIr, Registry};
pub use trace::{TraceSession, Traced, TypeBinding, entry_point, trace};
pub use types::Type;
