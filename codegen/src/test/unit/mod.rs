pub mod render;
pub mod translate;

use gpumap_host::Interpreter;
use gpumap_ir::{Registry, trace};

use crate::Result;
use crate::cuda::function::{Callable, convert};

pub const RECORDS: &str = r#"
class Inner:
    def __init__(self, x, y):
        self.x = x
        self.y = y

class Record:
    def __init__(self, a, b, c, inner):
        self.a = a
        self.b = b
        self.c = c
        self.inner = inner

    def bump(self, n):
        self.a += n
        self.inner.x += n

def total(r):
    r.bump(1)
    return Record(r.a, r.a + r.b, r.a + r.b + r.c, Inner(r.inner.x, r.inner.x + r.inner.y))

def touch(r):
    r.bump(1)
"#;

pub const RECORD_ARG: &str = "Record(1, 2, 3, Inner(10, 2.5))";

/// Trace `entry(arg)` and build its registry.
pub fn registry_for(source: &str, entry: &str, arg: &str) -> Registry {
    let interp = Interpreter::new();
    interp.load(source).unwrap_or_else(|e| panic!("{e}"));
    let function = interp.global(entry).unwrap();
    let arg = interp.eval(arg).unwrap_or_else(|e| panic!("{e}"));
    let traced = trace(&interp, &function, vec![arg]).unwrap_or_else(|e| panic!("{e}"));
    Registry::from_bindings(&traced.bindings).unwrap_or_else(|e| panic!("{e}"))
}

/// First variant of a traced free function, with its own captures.
pub fn convert_function(registry: &Registry, name: &str) -> Result<String> {
    let function = registry.function(name).unwrap();
    convert(registry, Callable::Function(function), 0, &function.closure)
}

/// Trace and translate `f(arg)`.
pub fn translate(source: &str, arg: &str) -> Result<String> {
    convert_function(&registry_for(source, "f", arg), "f")
}
