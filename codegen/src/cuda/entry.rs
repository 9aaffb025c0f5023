//! The entry kernel and its host launch trampoline.
//!
//! Kernel parameters are `(in, [out,] length, [cap_<name>...])`. Flat inputs
//! are an array of elements; nested inputs are a leading `int` inner length
//! followed by the inner lists back to back. Captured primitives and classes
//! arrive as a pointer to one element; captured collections as a
//! length-prefixed buffer.

use gpumap_ir::{ClosureParam, FunctionIr, Type};
use snafu::ensure;

use super::types::ident;
use crate::error::{InvalidEntrySnafu, Result};
use crate::types::{InputLayout, KernelKind, KernelParam, KernelSpec, ParamRole};

fn check_entry(function: &FunctionIr, spec: &KernelSpec) -> Result<()> {
    let name = &function.name;
    ensure!(
        function.params.len() == 1,
        InvalidEntrySnafu { name, reason: format!("takes {} parameters instead of one element", function.params.len()) }
    );
    ensure!(
        spec.kind == KernelKind::Foreach || function.ret.is_some(),
        InvalidEntrySnafu { name, reason: "returns no value to map" }
    );
    let input = &function.param_types[0];
    match (spec.layout, input) {
        (InputLayout::Flat, Type::List(_)) => InvalidEntrySnafu { name, reason: "takes a list; use a nested input" }.fail(),
        (InputLayout::Nested, Type::List(element)) if matches!(**element, Type::List(_)) => {
            InvalidEntrySnafu { name, reason: "inner lists must hold elements, not lists" }.fail()
        }
        (InputLayout::Nested, Type::List(_)) | (InputLayout::Flat, _) => Ok(()),
        (InputLayout::Nested, _) => InvalidEntrySnafu { name, reason: "nested input needs a list parameter" }.fail(),
    }
}

fn capture_param(capture: &ClosureParam) -> KernelParam {
    let c_type = match &capture.ty {
        Type::List(_) => "char *".to_string(),
        other => format!("{} *", other.c_name()),
    };
    KernelParam { name: format!("cap_{}", capture.name), role: ParamRole::Capture(capture.name.clone()), c_type }
}

/// Entry kernel source lines and its parameters in launch order.
pub fn render_entry(function: &FunctionIr, spec: &KernelSpec) -> Result<(Vec<String>, Vec<KernelParam>)> {
    check_entry(function, spec)?;

    let input = &function.param_types[0];
    let mut params = Vec::new();
    let mut item_lines = Vec::new();
    match (spec.layout, input.element()) {
        (InputLayout::Nested, Some(element)) => {
            let element = element.c_name();
            params.push(KernelParam { name: "in".into(), role: ParamRole::Input, c_type: "char *".into() });
            item_lines.push("int inner_length = *(int *)in;".to_string());
            item_lines.push(format!(
                "List<{element}> in_item(inner_length, ({element} *)(in + sizeof(int)) + thread_id * inner_length);"
            ));
        }
        _ => {
            let c_name = input.c_name();
            params.push(KernelParam { name: "in".into(), role: ParamRole::Input, c_type: format!("{c_name} *") });
            item_lines.push(format!("{c_name} &in_item = in[thread_id];"));
        }
    }
    if spec.kind == KernelKind::Map
        && let Some(ret) = &function.ret
    {
        params.push(KernelParam { name: "out".into(), role: ParamRole::Output, c_type: format!("{} *", ret.c_name()) });
    }
    params.push(KernelParam { name: "length".into(), role: ParamRole::Length, c_type: "int".into() });

    let mut call_args = vec!["in_item".to_string()];
    for capture in &function.closure {
        let param = capture_param(capture);
        match &capture.ty {
            Type::List(element) => {
                let element = element.c_name();
                let view = format!("{}_list", param.name);
                item_lines.push(format!(
                    "List<{element}> {view}(*(int *){0}, ({element} *)({0} + sizeof(int)));",
                    param.name
                ));
                call_args.push(view);
            }
            _ => call_args.push(format!("*{}", param.name)),
        }
        params.push(param);
    }

    let call = format!("{}({})", ident(&function.name), call_args.join(", "));
    let declarations: Vec<String> = params.iter().map(KernelParam::declaration).collect();

    let mut code_lines = vec![
        format!("extern \"C\" __global__ void {}({}) {{", spec.name, declarations.join(", ")),
        "    int thread_id = blockIdx.x * blockDim.x + threadIdx.x;".to_string(),
        "    if (thread_id < length) {".to_string(),
    ];
    code_lines.extend(item_lines.into_iter().map(|line| format!("        {line}")));
    match spec.kind {
        KernelKind::Map => code_lines.push(format!("        out[thread_id] = {call};")),
        KernelKind::Foreach => code_lines.push(format!("        {call};")),
    }
    code_lines.push("    }".to_string());
    code_lines.push("}".to_string());
    Ok((code_lines, params))
}

/// Host trampoline running every lane of the grid sequentially.
///
/// `args[i]` points at the i-th kernel argument: buffers are passed as their
/// base pointer, the length as a pointer to an `int`.
pub fn render_launcher(spec: &KernelSpec, params: &[KernelParam]) -> Vec<String> {
    let args: Vec<String> = params
        .iter()
        .enumerate()
        .map(|(i, p)| if p.is_buffer() { format!("({})args[{i}]", p.c_type) } else { format!("*(int *)args[{i}]") })
        .collect();

    vec![
        "#ifndef __CUDACC__".to_string(),
        format!("extern \"C\" void {}(void **args, unsigned int grid, unsigned int block) {{", spec.launcher_name()),
        "    blockDim.x = block;".to_string(),
        "    for (unsigned int block_index = 0; block_index < grid; ++block_index) {".to_string(),
        "        blockIdx.x = block_index;".to_string(),
        "        for (unsigned int thread_index = 0; thread_index < block; ++thread_index) {".to_string(),
        "            threadIdx.x = thread_index;".to_string(),
        format!("            {}({});", spec.name, args.join(", ")),
        "        }".to_string(),
        "    }".to_string(),
        "}".to_string(),
        "#endif".to_string(),
    ]
}
