//! Whole map operations on the host-emulated device. Skipped when no C++
//! compiler is installed.

use gpumap_codegen::cuda::prelude;
use gpumap_device::{Backend, CompileOptions, CpuBackend, CpuBackendConfig, KernelArg};
use gpumap_host::Value;

use super::{RECORDS, eval, field, interpreter, ints, record};
use crate::config::MapConfig;
use crate::mapper::{Mapper, Stage};
use crate::{gpu_foreach, gpufilter, gpumap, gpumap_nested};

fn backend() -> Option<CpuBackend> {
    let from_env = CpuBackend::from_env();
    if from_env.is_available() {
        return Some(from_env);
    }
    let fallback = CpuBackend::new(CpuBackendConfig::builder().compiler("c++").build());
    fallback.is_available().then_some(fallback)
}

#[test]
fn test_map_records() {
    let Some(backend) = backend() else { return };
    let interp = interpreter(RECORDS);
    let total = interp.global("total").unwrap();
    let items: Vec<Value> = (0..1000).map(|i| record(&interp, i)).collect();

    let mut mapper = Mapper::new(&backend, &interp).with_config(MapConfig::builder().block_size(128).build());
    let results = mapper.run(&total, &items).unwrap();

    assert_eq!(mapper.stage(), Stage::Done);
    assert_eq!((mapper.report().grid, mapper.report().block), (8, 128));
    assert_eq!(results.len(), 1000);
    for (i, (result, item)) in (0..).zip(results.iter().zip(&items)) {
        let a = i + 1;
        assert_eq!(field(item, "a"), Value::Int(a), "input {i}");
        assert_eq!(field(item, "inner.x"), Value::Int(a), "input {i}");
        assert_eq!(field(result, "a"), Value::Int(a), "result {i}");
        assert_eq!(field(result, "b"), Value::Int(a + 2 * i), "result {i}");
        assert_eq!(field(result, "c"), Value::Int(a + 5 * i), "result {i}");
        assert_eq!(field(result, "inner.x"), Value::Int(a), "result {i}");
        assert_eq!(field(result, "inner.y"), Value::Float(a as f32 + 0.5), "result {i}");
    }
    assert_eq!(backend.live_buffers(), 0);
}

#[test]
fn test_map_matches_host_evaluation() {
    let Some(backend) = backend() else { return };
    let source = "def f(x):\n    y = x * 0.5 + 1.0\n    if y > 10.0:\n        return y - 10.0\n    return y * 2.0\n";
    let interp = interpreter(source);
    let f = interp.global("f").unwrap();
    let items: Vec<Value> = (0..64).map(|i| Value::Float(i as f32)).collect();

    let results = gpumap(&backend, &interp, &f, &items).unwrap();

    let expected: Vec<Value> = items.iter().map(|item| interp.call(&f, vec![item.clone()]).unwrap()).collect();
    assert_eq!(results, expected);
}

#[test]
fn test_foreach_mutates_inputs() {
    let Some(backend) = backend() else { return };
    let interp = interpreter(RECORDS);
    let touch = interp.global("touch").unwrap();
    let items: Vec<Value> = (0..100).map(|i| record(&interp, i)).collect();

    gpu_foreach(&backend, &interp, &touch, &items).unwrap();

    for (i, item) in (0..).zip(&items) {
        assert_eq!(field(item, "a"), Value::Int(i + 1));
        assert_eq!(field(item, "inner.x"), Value::Int(i + 1));
        assert_eq!(field(item, "b"), Value::Int(2 * i));
    }
}

#[test]
fn test_captured_values() {
    let Some(backend) = backend() else { return };
    let source = r#"
K = 3
weights = [1, 2, 3]

def weighted(x):
    s = 0
    for w in weights:
        s += w * x
    return s * K
"#;
    let interp = interpreter(source);
    let weighted = interp.global("weighted").unwrap();
    let items = ints(&(0..50).collect::<Vec<_>>());

    let results = gpumap(&backend, &interp, &weighted, &items).unwrap();

    assert_eq!(results, ints(&(0..50).map(|x| 18 * x).collect::<Vec<_>>()));
    assert_eq!(interp.global("weights").unwrap(), Value::list(ints(&[1, 2, 3])));
}

#[test]
fn test_nested_lists() {
    let Some(backend) = backend() else { return };
    let source = "def total(xs):\n    s = 0\n    for x in xs:\n        s += x\n    return s\n";
    let interp = interpreter(source);
    let total = interp.global("total").unwrap();
    let lists: Vec<Value> = (0..40).map(|i| Value::list(ints(&[i, i + 1, i + 2]))).collect();

    let results = gpumap_nested(&backend, &interp, &total, &lists).unwrap();

    assert_eq!(results, ints(&(0..40).map(|i| 3 * i + 3).collect::<Vec<_>>()));
}

#[test]
fn test_filter() {
    let Some(backend) = backend() else { return };
    let interp = interpreter("def even(x):\n    return x % 2 == 0\n");
    let even = interp.global("even").unwrap();
    let items = ints(&(0..100).collect::<Vec<_>>());

    let kept = gpufilter(&backend, &interp, &even, &items).unwrap();

    assert_eq!(kept, ints(&(0..100).filter(|x| x % 2 == 0).collect::<Vec<_>>()));
}

#[test]
fn test_method_calls_helper_with_captures() {
    let Some(backend) = backend() else { return };
    let source = r#"
K = 3

def sq(v):
    return v * v

class P:
    def __init__(self, x):
        self.x = x

    def norm(self):
        return sq(self.x)

def f(p):
    return p.norm() + K
"#;
    let interp = interpreter(source);
    let f = interp.global("f").unwrap();
    let items: Vec<Value> = (0..20).map(|i| eval(&interp, &format!("P({i})"))).collect();
    let expected: Vec<Value> = items.iter().map(|item| interp.call(&f, vec![item.clone()]).unwrap()).collect();

    let results = gpumap(&backend, &interp, &f, &items).unwrap();

    assert_eq!(results, expected);
    assert_eq!(results[4], Value::Int(19));
}

#[test]
fn test_capture_named_like_helper_parameter() {
    let Some(backend) = backend() else { return };
    let source = "scale = 2\n\ndef mul(x, scale):\n    return x * scale\n\ndef f(x):\n    return mul(x, 5) + scale\n";
    let interp = interpreter(source);
    let f = interp.global("f").unwrap();
    let items = ints(&(0..30).collect::<Vec<_>>());

    let results = gpumap(&backend, &interp, &f, &items).unwrap();

    assert_eq!(results, ints(&(0..30).map(|x| 5 * x + 2).collect::<Vec<_>>()));
}

#[test]
fn test_integer_power_is_exact() {
    let Some(backend) = backend() else { return };
    let interp = interpreter("def f(x):\n    return x ** 9\n");
    let f = interp.global("f").unwrap();
    let mut items = ints(&[1, 7]);
    items.extend(ints(&(-9..=9).collect::<Vec<_>>()));
    let expected: Vec<Value> = items.iter().map(|item| interp.call(&f, vec![item.clone()]).unwrap()).collect();

    let results = gpumap(&backend, &interp, &f, &items).unwrap();

    assert_eq!(results[1], Value::Int(40_353_607));
    assert_eq!(results, expected);
}

const PRELUDE_CHECKS: &str = r#"
extern "C" void prelude_checks(int *out) {
    int steps = 0;
    RangeIterator stalled(0, 5, 0);
    while (stalled.has_next() && steps < 10) {
        stalled.next();
        steps += 1;
    }
    out[0] = steps;
    out[1] = py_ipow(7, 9);
    out[2] = py_ipow(-3, 9);
    out[3] = py_ipow(2, 31);
    out[4] = py_ipow(5, 0);
}

extern "C" void prelude_checks_launch(void **args, unsigned int grid, unsigned int block) {
    prelude_checks((int *)args[0]);
}
"#;

#[test]
fn test_prelude_range_and_power_helpers() {
    let Some(backend) = backend() else { return };
    let source = [prelude::HOST_SHIM, prelude::PRELUDE, PRELUDE_CHECKS].join("\n");
    let artifact = backend.compile(&source, &CompileOptions::for_kernel("prelude_checks")).unwrap();
    let entry = artifact.entry_point("prelude_checks").unwrap();
    let out = backend.alloc(5 * 4).unwrap();
    backend.launch(&entry, &[KernelArg::Buffer(out)], 1, 1).unwrap();

    let bytes = backend.copy_back(out, 5 * 4).unwrap();
    let values: Vec<i32> = bytes.chunks_exact(4).map(|c| i32::from_le_bytes(c.try_into().unwrap())).collect();
    assert_eq!(values, vec![0, 40_353_607, -19_683, 2i32.wrapping_pow(31), 1]);
    backend.free(out).unwrap();
}
