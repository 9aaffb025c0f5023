use gpumap_device::{BufferHandle, KernelArg};
use gpumap_host::Value;

use super::{RECORDS, RecordingBackend, eval, field, interpreter, ints, record};
use crate::config::MapConfig;
use crate::error::Error;
use crate::filter::gpufilter;
use crate::mapper::{Mapper, Stage};
use crate::{InputLayout, KernelKind};

fn config() -> MapConfig {
    MapConfig::builder().block_size(4).build()
}

#[test]
fn test_stage_sequence() {
    let backend = RecordingBackend::default();
    let interp = interpreter(RECORDS);
    let total = interp.global("total").unwrap();
    let items: Vec<Value> = (1..=3).map(|i| record(&interp, i)).collect();

    let mut mapper = Mapper::new(&backend, &interp).with_config(config());
    let results = mapper.run(&total, &items).unwrap();

    let report = mapper.report();
    assert_eq!(
        report.stages,
        vec![
            Stage::Trace,
            Stage::BuildIr,
            Stage::Codegen,
            Stage::Compile,
            Stage::StageInput,
            Stage::Launch,
            Stage::Collect,
            Stage::Done,
        ]
    );
    assert_eq!(mapper.stage(), Stage::Done);
    assert_eq!(report.failed_at, None);
    assert_eq!((report.lanes, report.grid, report.block), (2, 1, 4));
    assert_eq!(report.source_bytes, mapper.kernel_source().unwrap().len());

    assert_eq!(
        *backend.calls.borrow(),
        vec!["compile", "to_device", "alloc", "launch", "copy_back", "copy_back", "free", "free"]
    );
    assert_eq!(backend.live(), 0);

    let launches = backend.launches.borrow();
    let (args, grid, block) = &launches[0];
    assert_eq!(
        *args,
        vec![KernelArg::Buffer(BufferHandle::new(0)), KernelArg::Buffer(BufferHandle::new(1)), KernelArg::Int(2)]
    );
    assert_eq!((*grid, *block), (1, 4));

    assert_eq!(results.len(), 3);
    assert_eq!(field(&results[0], "a"), Value::Int(2));
    assert_eq!(field(&results[0], "b"), Value::Int(4));
    assert_eq!(field(&results[0], "c"), Value::Int(7));
    assert_eq!(field(&results[0], "inner.y"), Value::Float(2.5));
    // The recording backend never runs the kernel: outputs stay zeroed and
    // inputs come back unchanged.
    assert_eq!(field(&results[1], "a"), Value::Int(0));
    assert_eq!(field(&items[1], "a"), Value::Int(2));
    assert_eq!(field(&items[0], "a"), Value::Int(2));
}

#[test]
fn test_compile_failure_allocates_nothing() {
    let backend = RecordingBackend { fail_compile: true, ..Default::default() };
    let interp = interpreter(RECORDS);
    let total = interp.global("total").unwrap();
    let items: Vec<Value> = (0..4).map(|i| record(&interp, i)).collect();

    let mut mapper = Mapper::new(&backend, &interp).with_config(config());
    match mapper.run(&total, &items) {
        Err(Error::Backend { stage, source }) => {
            assert_eq!(stage, Stage::Compile);
            assert!(source.to_string().contains("expected ';'"));
        }
        other => panic!("expected a compile failure, got {other:?}"),
    }
    assert_eq!(mapper.report().failed_at, Some(Stage::Compile));
    assert_eq!(mapper.stage(), Stage::Failed);
    assert_eq!(*backend.calls.borrow(), vec!["compile"]);
    assert_eq!(backend.live(), 0);
}

#[test]
fn test_launch_failure_frees_buffers() {
    let backend = RecordingBackend { fail_launch: true, ..Default::default() };
    let interp = interpreter(RECORDS);
    let total = interp.global("total").unwrap();
    let items: Vec<Value> = (0..4).map(|i| record(&interp, i)).collect();

    let mut mapper = Mapper::new(&backend, &interp).with_config(config());
    assert!(matches!(mapper.run(&total, &items), Err(Error::Backend { stage: Stage::Launch, .. })));
    assert_eq!(mapper.report().failed_at, Some(Stage::Launch));
    assert_eq!(mapper.report().stages.last(), Some(&Stage::Failed));
    assert_eq!(backend.count("free"), 2);
    assert_eq!(backend.live(), 0);
}

#[test]
fn test_single_element_stays_on_host() {
    let backend = RecordingBackend::default();
    let interp = interpreter(RECORDS);
    let total = interp.global("total").unwrap();
    let items = vec![record(&interp, 1)];

    let mut mapper = Mapper::new(&backend, &interp).with_config(config());
    let results = mapper.run(&total, &items).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(field(&results[0], "a"), Value::Int(2));
    assert_eq!(*backend.calls.borrow(), vec!["compile"]);
    assert_eq!(mapper.report().lanes, 0);
    assert_eq!(mapper.stage(), Stage::Done);
    assert!(mapper.report().stages.contains(&Stage::Collect));
}

#[test]
fn test_empty_input_is_not_traced() {
    let backend = RecordingBackend::default();
    let interp = interpreter(RECORDS);
    let total = interp.global("total").unwrap();

    let mut mapper = Mapper::new(&backend, &interp);
    assert!(mapper.run(&total, &[]).unwrap().is_empty());
    assert_eq!(mapper.report().stages, vec![Stage::Done]);
    assert!(backend.calls.borrow().is_empty());
    assert!(mapper.kernel().is_none());
}

#[test]
fn test_stages_must_run_in_order() {
    let backend = RecordingBackend::default();
    let interp = interpreter(RECORDS);
    let total = interp.global("total").unwrap();
    let items: Vec<Value> = (0..2).map(|i| record(&interp, i)).collect();

    let mut mapper = Mapper::new(&backend, &interp);
    assert!(matches!(mapper.perform(), Err(Error::OutOfOrder { stage: Stage::Idle, .. })));
    assert!(matches!(mapper.collect(), Err(Error::OutOfOrder { .. })));

    mapper.prepare(&total, &items).unwrap();
    assert_eq!(mapper.stage(), Stage::Compile);
    assert!(matches!(mapper.prepare(&total, &items), Err(Error::OutOfOrder { stage: Stage::Compile, .. })));
    mapper.perform().unwrap();
    assert_eq!(mapper.collect().unwrap().len(), 2);
    assert!(matches!(mapper.run(&total, &items), Err(Error::OutOfOrder { stage: Stage::Done, .. })));
}

#[test]
fn test_translation_failure_stops_before_compile() {
    let backend = RecordingBackend::default();
    let interp = interpreter("def f(x):\n    if x < 0:\n        y = [x]\n    return x\n");
    let f = interp.global("f").unwrap();

    let mut mapper = Mapper::new(&backend, &interp);
    assert!(matches!(mapper.run(&f, &ints(&[1, 2])), Err(Error::Translation { .. })));
    assert_eq!(mapper.report().failed_at, Some(Stage::Codegen));
    assert!(backend.calls.borrow().is_empty());
}

#[test]
fn test_not_a_function() {
    let backend = RecordingBackend::default();
    let interp = interpreter("");
    let mut mapper = Mapper::new(&backend, &interp);
    assert!(matches!(mapper.run(&Value::Int(3), &ints(&[1])), Err(Error::NotAFunction { .. })));
    assert_eq!(mapper.report().failed_at, Some(Stage::Idle));
}

#[test]
fn test_captures_are_staged_and_written_back() {
    let backend = RecordingBackend::default();
    let interp = interpreter("K = 3\n\ndef f(x):\n    return x * K\n");
    let f = interp.global("f").unwrap();

    let mut mapper = Mapper::new(&backend, &interp).with_config(config());
    let results = mapper.run(&f, &ints(&[1, 2, 3])).unwrap();

    assert!(mapper.kernel_source().unwrap().contains("int *cap_K"));
    let launches = backend.launches.borrow();
    assert_eq!(launches[0].0.len(), 4);
    assert_eq!(launches[0].0[3], KernelArg::Buffer(BufferHandle::new(2)));
    // Input (primitive, not copied back), output and K.
    assert_eq!(backend.count("copy_back"), 2);
    assert_eq!(interp.global("K"), Some(Value::Int(3)));
    assert_eq!(results, ints(&[3, 0, 0]));
}

#[test]
fn test_foreach_has_no_output_buffer() {
    let backend = RecordingBackend::default();
    let interp = interpreter(RECORDS);
    let touch = interp.global("touch").unwrap();
    let items: Vec<Value> = (1..=3).map(|i| record(&interp, i)).collect();

    let mut mapper = Mapper::new(&backend, &interp).with_kind(KernelKind::Foreach).with_config(config());
    assert!(mapper.run(&touch, &items).unwrap().is_empty());
    assert_eq!(backend.count("alloc"), 0);
    assert_eq!(backend.launches.borrow()[0].0, vec![KernelArg::Buffer(BufferHandle::new(0)), KernelArg::Int(2)]);
    assert_eq!(field(&items[0], "a"), Value::Int(2));
}

#[test]
fn test_nested_rejects_ragged_input() {
    let backend = RecordingBackend::default();
    let interp = interpreter("def total(xs):\n    s = 0\n    for x in xs:\n        s += x\n    return s\n");
    let total = interp.global("total").unwrap();
    let lists = vec![Value::list(ints(&[1, 2])), Value::list(ints(&[3]))];

    let mut mapper = Mapper::new(&backend, &interp).with_layout(InputLayout::Nested);
    assert!(matches!(mapper.run(&total, &lists), Err(Error::Codec { stage: Stage::StageInput, .. })));
    assert_eq!(backend.live(), 0);
}

#[test]
fn test_filter_keeps_accepted_items() {
    let backend = RecordingBackend::default();
    let interp = interpreter("def positive(x):\n    return x > 0\n");
    let positive = interp.global("positive").unwrap();

    // Device verdicts decode from zeroed memory as `False`.
    let kept = gpufilter(&backend, &interp, &positive, &ints(&[5, 6, 7])).unwrap();
    assert_eq!(kept, ints(&[5]));
}

#[test]
fn test_filter_requires_bool_results() {
    let backend = RecordingBackend::default();
    let interp = interpreter("def twice(x):\n    return x * 2\n");
    let twice = interp.global("twice").unwrap();
    assert!(matches!(gpufilter(&backend, &interp, &twice, &ints(&[1, 2])), Err(Error::NotAPredicate { .. })));
}

#[test]
fn test_entry_is_the_traced_unary_function() {
    let backend = RecordingBackend::default();
    let interp = interpreter("def twice(x):\n    return x * 2\n\nalias = twice\n");
    let alias = interp.global("alias").unwrap();

    let mut mapper = Mapper::new(&backend, &interp).with_config(config());
    mapper.run(&alias, &ints(&[1, 2, 3])).unwrap();

    let source = mapper.kernel_source().unwrap();
    assert!(source.contains("__device__ int twice(int x)"));
    assert!(source.contains("out[thread_id] = twice(in_item);"));
}

#[test]
fn test_method_captures_reach_the_kernel() {
    let backend = RecordingBackend::default();
    let source = "K = 3\n\ndef sq(v):\n    return v * v\n\nclass P:\n    def __init__(self, x):\n        self.x = x\n\n    def norm(self):\n        return sq(self.x) + K\n\ndef f(p):\n    return p.norm()\n";
    let interp = interpreter(source);
    let f = interp.global("f").unwrap();
    let items: Vec<Value> = (0..3).map(|i| eval(&interp, &format!("P({i})"))).collect();

    let mut mapper = Mapper::new(&backend, &interp).with_config(config());
    mapper.run(&f, &items).unwrap();

    let source = mapper.kernel_source().unwrap();
    assert!(source.contains("__device__ int P::norm(int __cap_K) {"));
    assert!(source.contains("return (sq((*this).x, __cap_K) + __cap_K);"));
    assert!(source.contains("return p.norm(__cap_K);"));
    assert!(source.contains("int *cap_K"));
}
