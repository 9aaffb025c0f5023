//! One end-to-end parallel map.
//!
//! ```text
//! Idle -> Trace -> BuildIr -> Codegen -> Compile -> StageInput -> Launch -> Collect -> Done
//!                                (any stage) -> Failed
//! ```
//!
//! The first element is the prototype: the traced host call processes it,
//! its result heads the output and is the template every device result is
//! decoded into. The device runs one lane per remaining element. The
//! monomorphic assumption (every element shares the prototype's layout) is
//! not checked beyond what the codec rejects.

use gpumap_codegen::{CudaRenderer, InputLayout, KernelKind, ParamRole, RenderedKernel, Renderer};
use gpumap_device::{Artifact, Backend, BufferHandle, CompileOptions, EntryPoint, KernelArg};
use gpumap_host::{Interpreter, Value};
use gpumap_ir::{Registry, Type, entry_point, trace};
use snafu::{OptionExt, ResultExt, ensure};
use tracing::{debug, instrument, warn};

use crate::capture::{self, Capture};
use crate::codec::{self, ListOfLists};
use crate::config::MapConfig;
use crate::error::{
    BackendSnafu, CodecSnafu, EmptyInputSnafu, MissingArgumentSnafu, NoEntryPointSnafu, NotAFunctionSnafu, OutOfOrderSnafu,
    RegistrySnafu, Result, TooManyItemsSnafu, TraceSnafu, TranslationSnafu,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    Trace,
    BuildIr,
    Codegen,
    Compile,
    StageInput,
    Launch,
    Collect,
    Done,
    Failed,
}

/// What happened during one map operation.
#[derive(Debug, Clone, Default)]
pub struct MapReport {
    pub stage: Stage,
    /// Every stage entered, in order.
    pub stages: Vec<Stage>,
    pub failed_at: Option<Stage>,
    /// Device lanes with work (elements after the prototype).
    pub lanes: usize,
    pub grid: u32,
    pub block: u32,
    pub source_bytes: usize,
}

impl MapReport {
    fn enter(&mut self, stage: Stage) {
        debug!(from = %self.stage, to = %stage, "stage");
        self.stage = stage;
        self.stages.push(stage);
    }
}

/// Device buffers owned by one map operation; every handle still held is
/// freed on drop.
pub struct DeviceBuffers<'b> {
    backend: &'b dyn Backend,
    handles: Vec<BufferHandle>,
}

impl<'b> DeviceBuffers<'b> {
    pub fn new(backend: &'b dyn Backend) -> Self {
        Self { backend, handles: Vec::new() }
    }

    pub fn upload(&mut self, bytes: &[u8]) -> gpumap_device::Result<BufferHandle> {
        let handle = self.backend.to_device(bytes)?;
        self.handles.push(handle);
        Ok(handle)
    }

    pub fn alloc(&mut self, size: usize) -> gpumap_device::Result<BufferHandle> {
        let handle = self.backend.alloc(size)?;
        self.handles.push(handle);
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Free every buffer, reporting the first failure.
    pub fn release(mut self) -> gpumap_device::Result<()> {
        let mut first = None;
        for handle in self.handles.drain(..) {
            if let Err(err) = self.backend.free(handle) {
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl Drop for DeviceBuffers<'_> {
    fn drop(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(err) = self.backend.free(handle) {
                warn!(%handle, error = %err, "failed to free device buffer");
            }
        }
    }
}

/// Output of the compile-time stages.
struct Prepared {
    items: Vec<Value>,
    prototype_result: Value,
    /// Per-lane element type: the input type, or the inner list's element.
    element: Type,
    output: Option<Type>,
    captures: Vec<Capture>,
    kernel: RenderedKernel,
    entry: EntryPoint,
    _artifact: Box<dyn Artifact>,
}

/// Buffers of a launched kernel, awaiting collection.
struct Staged<'b> {
    buffers: DeviceBuffers<'b>,
    input: (BufferHandle, usize),
    output: Option<(BufferHandle, usize)>,
    captures: Vec<(BufferHandle, usize)>,
}

/// Drives the stages of one map operation over a backend.
pub struct Mapper<'b> {
    backend: &'b dyn Backend,
    interp: &'b Interpreter,
    config: MapConfig,
    kind: KernelKind,
    layout: InputLayout,
    report: MapReport,
    prepared: Option<Prepared>,
    staged: Option<Staged<'b>>,
}

impl<'b> Mapper<'b> {
    /// A flat map configured from the environment.
    pub fn new(backend: &'b dyn Backend, interp: &'b Interpreter) -> Self {
        Self {
            backend,
            interp,
            config: MapConfig::from_env(),
            kind: KernelKind::Map,
            layout: InputLayout::Flat,
            report: MapReport::default(),
            prepared: None,
            staged: None,
        }
    }

    pub fn with_config(mut self, config: MapConfig) -> Self {
        self.config = config;
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

    pub fn stage(&self) -> Stage {
        self.report.stage
    }

    pub fn report(&self) -> &MapReport {
        &self.report
    }

    pub fn kernel(&self) -> Option<&RenderedKernel> {
        self.prepared.as_ref().map(|p| &p.kernel)
    }

    /// The generated translation unit, once code generation has run.
    pub fn kernel_source(&self) -> Option<&str> {
        self.kernel().map(|k| k.code.as_str())
    }

    fn expect_stage(&self, expected: Stage, operation: &str) -> Result<()> {
        ensure!(self.report.stage == expected, OutOfOrderSnafu { operation, stage: self.report.stage });
        Ok(())
    }

    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            warn!(stage = %self.report.stage, error = %err, "map operation failed");
            self.report.failed_at = Some(self.report.stage);
            self.report.enter(Stage::Failed);
            self.staged = None;
        }
        result
    }

    /// Run every stage. An empty input returns an empty result untraced.
    pub fn run(&mut self, function: &Value, items: &[Value]) -> Result<Vec<Value>> {
        if items.is_empty() {
            debug!("empty input");
            self.expect_stage(Stage::Idle, "run")?;
            self.report.enter(Stage::Done);
            return Ok(Vec::new());
        }
        self.prepare(function, items)?;
        self.perform()?;
        self.collect()
    }

    /// Trace, build the registry, generate and compile the kernel.
    pub fn prepare(&mut self, function: &Value, items: &[Value]) -> Result<()> {
        self.expect_stage(Stage::Idle, "prepare")?;
        let result = self.try_prepare(function, items);
        self.settle(result)
    }

    fn try_prepare(&mut self, function: &Value, items: &[Value]) -> Result<()> {
        function.as_function().with_context(|| NotAFunctionSnafu { type_name: function.type_name() })?;
        let prototype = items.first().context(EmptyInputSnafu)?;
        ensure!(i32::try_from(items.len()).is_ok(), TooManyItemsSnafu { count: items.len() });

        self.report.enter(Stage::Trace);
        let traced = trace(self.interp, function, vec![prototype.clone()]).context(TraceSnafu)?;
        let entry_name = entry_point(&traced.bindings).context(NoEntryPointSnafu)?.name.clone();
        debug!(entry = %entry_name, bindings = traced.bindings.len(), "selected entry point");

        self.report.enter(Stage::BuildIr);
        let mut registry = Registry::from_bindings(&traced.bindings).context(RegistrySnafu)?;
        let captures = capture::collect(self.interp, &traced.bindings, &mut registry)?;
        registry
            .append_closure_params(&entry_name, captures.iter().map(Capture::closure_param).collect())
            .context(RegistrySnafu)?;

        self.report.enter(Stage::Codegen);
        let spec = gpumap_codegen::KernelSpec::map(&entry_name)
            .with_name(&self.config.kernel_name)
            .with_kind(self.kind)
            .with_layout(self.layout);
        let kernel = CudaRenderer::new().render(&registry, &spec).context(TranslationSnafu)?;
        self.report.source_bytes = kernel.code.len();
        if self.config.dump_source {
            debug!(source = %kernel.code, "generated translation unit");
        }

        let entry_ir = registry
            .function(&entry_name)
            .context(gpumap_ir::error::UnknownFunctionSnafu { function: &entry_name })
            .context(RegistrySnafu)?;
        let input = entry_ir.param_types[0].clone();
        let element = match (self.layout, input.element()) {
            (InputLayout::Nested, Some(element)) => element.clone(),
            _ => input,
        };
        let output = match self.kind {
            KernelKind::Map => entry_ir.ret.clone(),
            KernelKind::Foreach => None,
        };

        self.report.enter(Stage::Compile);
        let options = CompileOptions::for_kernel(&spec.name);
        let artifact = self.backend.compile(&kernel.code, &options).context(BackendSnafu { stage: Stage::Compile })?;
        let entry = artifact.entry_point(&kernel.entry_point).context(BackendSnafu { stage: Stage::Compile })?;

        self.prepared = Some(Prepared {
            items: items.to_vec(),
            prototype_result: traced.result,
            element,
            output,
            captures,
            kernel,
            entry,
            _artifact: artifact,
        });
        Ok(())
    }

    /// Stage the remaining elements and captures, then launch.
    pub fn perform(&mut self) -> Result<()> {
        self.expect_stage(Stage::Compile, "perform")?;
        let result = self.try_perform();
        self.settle(result)
    }

    fn try_perform(&mut self) -> Result<()> {
        let prepared = self.prepared.as_ref().context(OutOfOrderSnafu { operation: "perform", stage: Stage::Compile })?;
        let rest = &prepared.items[1..];
        let lanes = rest.len();
        self.report.lanes = lanes;

        self.report.enter(Stage::StageInput);
        if lanes == 0 {
            debug!("single element handled by the traced call");
            self.report.enter(Stage::Launch);
            return Ok(());
        }

        let stage = Stage::StageInput;
        let input_bytes = match self.layout {
            InputLayout::Flat => codec::pack(rest, &prepared.element),
            InputLayout::Nested => {
                ListOfLists::new(prepared.element.clone(), &prepared.items).and_then(|lists| lists.pack(rest))
            }
        }
        .context(CodecSnafu { stage })?;

        let mut buffers = DeviceBuffers::new(self.backend);
        let input = buffers.upload(&input_bytes).context(BackendSnafu { stage })?;
        let output = match &prepared.output {
            Some(ty) => {
                let size = codec::size_of(ty).context(CodecSnafu { stage })? * lanes;
                Some((buffers.alloc(size).context(BackendSnafu { stage })?, size))
            }
            None => None,
        };
        let mut captures = Vec::with_capacity(prepared.captures.len());
        for capture in &prepared.captures {
            let bytes = capture.pack().context(CodecSnafu { stage })?;
            captures.push((buffers.upload(&bytes).context(BackendSnafu { stage })?, bytes.len()));
        }

        let length = i32::try_from(lanes).ok().context(TooManyItemsSnafu { count: lanes })?;
        let mut args = Vec::with_capacity(prepared.kernel.params.len());
        for param in &prepared.kernel.params {
            let arg = match &param.role {
                ParamRole::Input => Some(KernelArg::Buffer(input)),
                ParamRole::Output => output.map(|(handle, _)| KernelArg::Buffer(handle)),
                ParamRole::Length => Some(KernelArg::Int(length)),
                ParamRole::Capture(name) => prepared
                    .captures
                    .iter()
                    .position(|c| &c.name == name)
                    .map(|i| KernelArg::Buffer(captures[i].0)),
            };
            args.push(arg.context(MissingArgumentSnafu { param: &param.name })?);
        }
        debug!(buffers = buffers.len(), bytes = input_bytes.len(), "staged input");

        self.report.enter(Stage::Launch);
        let (grid, block) = self.config.dims(lanes);
        self.report.grid = grid;
        self.report.block = block;
        self.backend.launch(&prepared.entry, &args, grid, block).context(BackendSnafu { stage: Stage::Launch })?;

        self.staged = Some(Staged { buffers, input: (input, input_bytes.len()), output, captures });
        Ok(())
    }

    /// Copy results back, rebind inputs and captures, free device memory.
    pub fn collect(&mut self) -> Result<Vec<Value>> {
        self.expect_stage(Stage::Launch, "collect")?;
        let result = self.try_collect();
        self.settle(result)
    }

    fn try_collect(&mut self) -> Result<Vec<Value>> {
        let prepared = self.prepared.as_ref().context(OutOfOrderSnafu { operation: "collect", stage: Stage::Launch })?;
        self.report.enter(Stage::Collect);
        let stage = Stage::Collect;
        let rest = &prepared.items[1..];

        let mut results = Vec::with_capacity(prepared.items.len());
        if self.kind == KernelKind::Map {
            results.push(prepared.prototype_result.clone());
        }

        if let Some(Staged { buffers, input, output, captures }) = self.staged.take() {
            let (handle, size) = input;
            match self.layout {
                InputLayout::Flat if prepared.element.is_primitive() => {}
                InputLayout::Flat => {
                    let bytes = self.backend.copy_back(handle, size).context(BackendSnafu { stage })?;
                    codec::unpack(&bytes, &prepared.element, rest).context(CodecSnafu { stage })?;
                }
                InputLayout::Nested => {
                    let bytes = self.backend.copy_back(handle, size).context(BackendSnafu { stage })?;
                    ListOfLists::new(prepared.element.clone(), rest)
                        .and_then(|lists| lists.unpack(&bytes, rest))
                        .context(CodecSnafu { stage })?;
                }
            }

            if let (Some((handle, size)), Some(ty)) = (output, &prepared.output) {
                let bytes = self.backend.copy_back(handle, size).context(BackendSnafu { stage })?;
                let decoded = codec::unpack_new(&bytes, ty, &prepared.prototype_result, rest.len())
                    .context(CodecSnafu { stage })?;
                results.extend(decoded);
            }

            for (capture, &(handle, size)) in prepared.captures.iter().zip(&captures) {
                let bytes = self.backend.copy_back(handle, size).context(BackendSnafu { stage })?;
                capture.write_back(&bytes, self.interp).context(CodecSnafu { stage })?;
            }
            buffers.release().context(BackendSnafu { stage })?;
        }

        self.report.enter(Stage::Done);
        debug!(results = results.len(), lanes = self.report.lanes, "map finished");
        Ok(results)
    }
}

/// `[function(x) for x in items]` with every element after the first
/// computed on the device.
#[instrument(skip_all, fields(backend = backend.name(), items = items.len()))]
pub fn gpumap(backend: &dyn Backend, interp: &Interpreter, function: &Value, items: &[Value]) -> Result<Vec<Value>> {
    Mapper::new(backend, interp).run(function, items)
}

/// `function(x)` for every element, for its effect on the elements and
/// captured state.
#[instrument(skip_all, fields(backend = backend.name(), items = items.len()))]
pub fn gpu_foreach(backend: &dyn Backend, interp: &Interpreter, function: &Value, items: &[Value]) -> Result<()> {
    Mapper::new(backend, interp).with_kind(KernelKind::Foreach).run(function, items).map(drop)
}

/// Map over equally long inner lists, one lane per inner list.
#[instrument(skip_all, fields(backend = backend.name(), lists = lists.len()))]
pub fn gpumap_nested(
    backend: &dyn Backend,
    interp: &Interpreter,
    function: &Value,
    lists: &[Value],
) -> Result<Vec<Value>> {
    Mapper::new(backend, interp).with_layout(InputLayout::Nested).run(function, lists)
}
