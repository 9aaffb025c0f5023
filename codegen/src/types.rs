//! Types for code generation.

/// Whether the kernel writes one result per lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum KernelKind {
    /// `out[i] = f(in[i])`.
    Map,
    /// `f(in[i])` for its side effects; no output buffer.
    Foreach,
}

/// Shape of the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum InputLayout {
    /// One element per lane.
    Flat,
    /// A leading inner length, then fixed-length inner lists; one inner list
    /// per lane.
    Nested,
}

/// What to launch: which registry function, under which kernel name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSpec {
    /// Device symbol of the entry kernel.
    pub name: String,
    /// Registry function applied per lane.
    pub entry: String,
    pub kind: KernelKind,
    pub layout: InputLayout,
}

impl KernelSpec {
    pub fn map(entry: impl Into<String>) -> Self {
        Self { name: "map_kernel".into(), entry: entry.into(), kind: KernelKind::Map, layout: InputLayout::Flat }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_kind(mut self, kind: KernelKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_layout(mut self, layout: InputLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Symbol of the host trampoline that emulates a grid launch.
    pub fn launcher_name(&self) -> String {
        format!("{}_launch", self.name)
    }
}

/// Role of one entry kernel parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamRole {
    Input,
    Output,
    /// Number of lanes with work.
    Length,
    /// Device copy of the named captured variable.
    Capture(String),
}

/// One parameter of the entry kernel, in launch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelParam {
    pub name: String,
    pub role: ParamRole,
    /// Device spelling, e.g. `Point *`.
    pub c_type: String,
}

impl KernelParam {
    pub fn is_buffer(&self) -> bool {
        self.role != ParamRole::Length
    }

    /// `Point *in`, `int length`.
    pub fn declaration(&self) -> String {
        if self.c_type.ends_with('*') {
            format!("{}{}", self.c_type, self.name)
        } else {
            format!("{} {}", self.c_type, self.name)
        }
    }
}

/// A rendered translation unit ready for compilation.
#[derive(Debug, Clone)]
pub struct RenderedKernel {
    /// The generated CUDA C++ source.
    pub code: String,

    /// Entry kernel symbol.
    pub entry_point: String,

    /// Host trampoline symbol, compiled only outside `__CUDACC__`.
    pub launcher: String,

    /// Entry kernel parameters in launch order.
    pub params: Vec<KernelParam>,
}

impl RenderedKernel {
    pub fn new(code: String, spec: &KernelSpec) -> Self {
        Self { code, entry_point: spec.name.clone(), launcher: spec.launcher_name(), params: Vec::new() }
    }

    pub fn add_param(&mut self, param: KernelParam) {
        self.params.push(param);
    }

    pub fn param(&self, role: &ParamRole) -> Option<(usize, &KernelParam)> {
        self.params.iter().enumerate().find(|(_, p)| &p.role == role)
    }
}
