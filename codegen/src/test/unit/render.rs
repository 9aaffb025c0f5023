use gpumap_ir::{ClosureParam, Type};

use super::{RECORD_ARG, RECORDS, registry_for};
use crate::{CudaRenderer, Error, InputLayout, KernelKind, KernelSpec, ParamRole, Renderer, cuda};

fn position(code: &str, needle: &str) -> usize {
    code.find(needle).unwrap_or_else(|| panic!("missing {needle:?} in\n{code}"))
}

#[test]
fn test_map_translation_unit() {
    let registry = registry_for(RECORDS, "total", RECORD_ARG);
    let kernel = cuda::render(&registry, &KernelSpec::map("total")).unwrap();
    let code = &kernel.code;

    let pack = position(code, "#pragma pack(push, 1)");
    let inner = position(code, "class Inner {");
    let record = position(code, "class Record {");
    let pop = position(code, "#pragma pack(pop)");
    let prototype = position(code, "__device__ Record total(Record&& r);");
    let definition = position(code, "__device__ Record total(Record&& r) {");
    let method = position(code, "__device__ void Record::bump(int n) {");
    let entry = position(code, "extern \"C\" __global__ void map_kernel(Record *in, Record *out, int length) {");
    assert!(pack < inner && inner < record && record < pop);
    assert!(pop < prototype && prototype < definition && definition < method && method < entry);

    assert!(code.contains("__device__ Record total(Record& r);"));
    assert!(code.contains("        Record &in_item = in[thread_id];"));
    assert!(code.contains("        out[thread_id] = total(in_item);"));
    assert!(code.contains("extern \"C\" void map_kernel_launch(void **args, unsigned int grid, unsigned int block) {"));
    assert!(code.contains("            map_kernel((Record *)args[0], (Record *)args[1], *(int *)args[2]);"));

    assert_eq!(kernel.entry_point, "map_kernel");
    assert_eq!(kernel.launcher, "map_kernel_launch");
    let roles: Vec<&ParamRole> = kernel.params.iter().map(|p| &p.role).collect();
    assert_eq!(roles, vec![&ParamRole::Input, &ParamRole::Output, &ParamRole::Length]);
}

#[test]
fn test_foreach_has_no_output() {
    let registry = registry_for(RECORDS, "touch", RECORD_ARG);
    let spec = KernelSpec::map("touch").with_kind(KernelKind::Foreach);
    let kernel = cuda::render(&registry, &spec).unwrap();
    assert!(kernel.code.contains("void map_kernel(Record *in, int length) {"), "{}", kernel.code);
    assert!(kernel.code.contains("        touch(in_item);"));
    assert!(kernel.param(&ParamRole::Output).is_none());
}

#[test]
fn test_map_requires_a_return_value() {
    let registry = registry_for(RECORDS, "touch", RECORD_ARG);
    let err = cuda::render(&registry, &KernelSpec::map("touch")).unwrap_err();
    assert!(matches!(err, Error::InvalidEntry { .. }), "{err}");
}

#[test]
fn test_nested_input() {
    let source = "def f(xs):\n    s = 0\n    for v in xs:\n        s += v\n    return s\n";
    let registry = registry_for(source, "f", "[1, 2, 3]");
    let spec = KernelSpec::map("f").with_layout(InputLayout::Nested);
    let code = cuda::render(&registry, &spec).unwrap().code;

    assert!(code.contains("__device__ int f(List<int>&& xs) {"), "{code}");
    assert!(code.contains("void map_kernel(char *in, int *out, int length) {"), "{code}");
    assert!(code.contains("int inner_length = *(int *)in;"));
    assert!(code.contains("List<int> in_item(inner_length, (int *)(in + sizeof(int)) + thread_id * inner_length);"));

    let err = cuda::render(&registry, &KernelSpec::map("f")).unwrap_err();
    assert!(matches!(err, Error::InvalidEntry { .. }), "{err}");
}

#[test]
fn test_capture_parameters() {
    let source = "K = 3\nxs = [1, 2]\n\ndef f(x):\n    s = K\n    for v in xs:\n        s += v\n    return s * x\n";
    let mut registry = registry_for(source, "f", "2");
    registry
        .append_closure_params(
            "f",
            vec![
                ClosureParam { name: "K".into(), ty: Type::INT },
                ClosureParam { name: "xs".into(), ty: Type::list_of(Type::INT) },
            ],
        )
        .unwrap();
    let kernel = cuda::render(&registry, &KernelSpec::map("f")).unwrap();
    let code = &kernel.code;

    assert!(code.contains("void map_kernel(int *in, int *out, int length, int *cap_K, char *cap_xs) {"), "{code}");
    assert!(code.contains("List<int> cap_xs_list(*(int *)cap_xs, (int *)(cap_xs + sizeof(int)));"), "{code}");
    assert!(code.contains("out[thread_id] = f(in_item, *cap_K, cap_xs_list);"), "{code}");
    assert!(code.contains("__device__ int f(int x, int __cap_K, List<int>& __cap_xs);"), "{code}");
    assert!(code.contains("ListIterator<int>(__cap_xs)"), "{code}");
    assert_eq!(kernel.param(&ParamRole::Capture("xs".into())).map(|(i, _)| i), Some(4));
}

#[test]
fn test_methods_receive_captures() {
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
    let mut registry = registry_for(source, "f", "P(2)");
    registry.append_closure_params("f", vec![ClosureParam { name: "K".into(), ty: Type::INT }]).unwrap();
    let kernel = cuda::render(&registry, &KernelSpec::map("f")).unwrap();
    let code = &kernel.code;

    assert!(code.contains("        __device__ int norm (int __cap_K);"), "{code}");
    assert!(code.contains("__device__ int sq(int v, int __cap_K);"), "{code}");
    assert!(code.contains("__device__ int P::norm(int __cap_K) {"), "{code}");
    assert!(code.contains("    return sq((*this).x, __cap_K);"), "{code}");
    assert!(code.contains("    return (p.norm(__cap_K) + __cap_K);"), "{code}");
    assert!(code.contains("out[thread_id] = f(in_item, *cap_K);"), "{code}");
}

#[test]
fn test_capture_shadowed_by_parameter() {
    let source = "scale = 2\n\ndef mul(x, scale):\n    return x * scale\n\ndef f(x):\n    return mul(x, 5) + scale\n";
    let mut registry = registry_for(source, "f", "1");
    registry.append_closure_params("f", vec![ClosureParam { name: "scale".into(), ty: Type::INT }]).unwrap();
    let code = cuda::render(&registry, &KernelSpec::map("f")).unwrap().code;

    assert!(code.contains("__device__ int mul(int x, int scale, int __cap_scale) {"), "{code}");
    assert!(code.contains("    return (x * scale);"), "{code}");
    assert!(code.contains("    return (mul(x, 5, __cap_scale) + __cap_scale);"), "{code}");
}

#[test]
fn test_custom_kernel_name() {
    let registry = registry_for(RECORDS, "total", RECORD_ARG);
    let kernel = cuda::render(&registry, &KernelSpec::map("total").with_name("records")).unwrap();
    assert!(kernel.code.contains("__global__ void records("));
    assert_eq!(kernel.launcher, "records_launch");
}

#[test]
fn test_missing_entry() {
    let registry = registry_for(RECORDS, "total", RECORD_ARG);
    let err = CudaRenderer::new().render(&registry, &KernelSpec::map("nope")).unwrap_err();
    assert!(matches!(err, Error::MissingEntry { .. }), "{err}");
    assert_eq!(CudaRenderer.backend_name(), "cuda");
}

#[test]
fn test_translation_errors_abort_rendering() {
    let source = "def f(x):\n    if x < 0:\n        y = [x]\n    return x\n";
    let registry = registry_for(source, "f", "1");
    assert!(matches!(cuda::render(&registry, &KernelSpec::map("f")), Err(Error::Unsupported { .. })));
}
