//! Filtering on the device: map a predicate, keep the elements it accepts.

use gpumap_device::Backend;
use gpumap_host::{Interpreter, Value};
use tracing::{debug, instrument};

use crate::error::{NotAPredicateSnafu, Result};
use crate::mapper::Mapper;

/// Elements of `items` for which `predicate` returns `True`, in order.
#[instrument(skip_all, fields(backend = backend.name(), items = items.len()))]
pub fn gpufilter(backend: &dyn Backend, interp: &Interpreter, predicate: &Value, items: &[Value]) -> Result<Vec<Value>> {
    let verdicts = Mapper::new(backend, interp).run(predicate, items)?;

    let mut kept = Vec::new();
    for (item, verdict) in items.iter().zip(&verdicts) {
        match verdict {
            Value::Bool(true) => kept.push(item.clone()),
            Value::Bool(false) => {}
            other => return NotAPredicateSnafu { type_name: other.type_name() }.fail(),
        }
    }
    debug!(kept = kept.len(), "filtered");
    Ok(kept)
}
