//! Runtime type tracing over one representative call.
//!
//! A [`TraceSession`] installs a call observer on the interpreter for the
//! duration of one invocation. Sessions are exclusive process-wide: sessions
//! on different threads are serialized on a global lock, and a nested session
//! on the same thread is rejected instead of silently replacing the hook.
//! Dropping the session removes the observer on every exit path.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use gpumap_host::{CallEvent, CallObserver, Function, Interpreter, Value};
use itertools::Itertools;
use parking_lot::{Mutex, MutexGuard};
use snafu::{ResultExt, ensure};
use tracing::{debug, warn};

use crate::error::{CallSnafu, NotCallableSnafu, SessionActiveSnafu, TraceError};

static TRACE_LOCK: Mutex<()> = Mutex::new(());

thread_local! {
    static SESSION_ON_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Signature observed for the first call of one (owner, name) pair.
///
/// Runtime types are read off the sample values, which are shared handles:
/// by the time the binding is consumed the traced call has finished, so
/// objects built by a constructor carry all of their fields.
#[derive(Clone)]
pub struct TypeBinding {
    /// Class name for methods and constructors.
    pub owner: Option<String>,
    pub name: String,
    /// Parameter names; methods include the receiver.
    pub params: Vec<String>,
    pub args: Vec<Value>,
    /// `None` until the matching return is observed.
    pub ret: Option<Value>,
    pub function: Rc<Function>,
}

impl TypeBinding {
    pub fn is_method(&self) -> bool {
        self.owner.is_some()
    }

    /// Qualified name for diagnostics, e.g. `Point.norm`.
    pub fn qualified_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{owner}.{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn observed_types(&self) -> Vec<String> {
        self.args.iter().map(Value::type_name).collect()
    }
}

impl std::fmt::Debug for TypeBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeBinding")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("types", &self.observed_types())
            .field("ret", &self.ret.as_ref().map(Value::type_name))
            .finish()
    }
}

/// Records first calls and their returns.
#[derive(Default)]
struct Recorder {
    bindings: RefCell<Vec<TypeBinding>>,
    seen: RefCell<HashMap<(Option<String>, String), usize>>,
    /// One entry per active call: the binding to complete on return, if any.
    pending: RefCell<Vec<Option<usize>>>,
    skipped: RefCell<HashSet<String>>,
}

impl CallObserver for Recorder {
    fn on_call(&self, event: &CallEvent<'_>) {
        let Some(function) = event.callee else {
            if self.skipped.borrow_mut().insert(event.name.to_string()) {
                warn!(builtin = event.name, "skipping built-in call during trace");
            }
            self.pending.borrow_mut().push(None);
            return;
        };

        let key = (event.owner.map(str::to_string), event.name.to_string());
        let mut seen = self.seen.borrow_mut();
        if seen.contains_key(&key) {
            self.pending.borrow_mut().push(None);
            return;
        }

        let mut bindings = self.bindings.borrow_mut();
        let binding = TypeBinding {
            owner: key.0.clone(),
            name: key.1.clone(),
            params: event.params.to_vec(),
            args: event.args.to_vec(),
            ret: None,
            function: function.clone(),
        };
        debug!(function = %binding.qualified_name(), types = ?binding.observed_types(), "traced first call");
        seen.insert(key, bindings.len());
        self.pending.borrow_mut().push(Some(bindings.len()));
        bindings.push(binding);
    }

    fn on_return(&self, _event: &CallEvent<'_>, value: &Value) {
        if let Some(Some(index)) = self.pending.borrow_mut().pop() {
            self.bindings.borrow_mut()[index].ret = Some(value.clone());
        }
    }
}

/// Exclusive ownership of the interpreter's call observer.
pub struct TraceSession<'i> {
    interp: &'i Interpreter,
    recorder: Rc<Recorder>,
    previous: Option<Rc<dyn CallObserver>>,
    _lock: MutexGuard<'static, ()>,
}

impl<'i> TraceSession<'i> {
    pub fn begin(interp: &'i Interpreter) -> Result<Self, TraceError> {
        ensure!(!Self::is_active(), SessionActiveSnafu);
        let lock = TRACE_LOCK.lock();
        SESSION_ON_THREAD.set(true);

        let recorder = Rc::new(Recorder::default());
        let previous = interp.set_observer(Some(recorder.clone()));
        Ok(Self { interp, recorder, previous, _lock: lock })
    }

    /// Whether the current thread holds a session.
    pub fn is_active() -> bool {
        SESSION_ON_THREAD.get()
    }

    /// Bindings recorded so far, in first-call order.
    pub fn bindings(&self) -> Vec<TypeBinding> {
        self.recorder.bindings.borrow().clone()
    }
}

impl Drop for TraceSession<'_> {
    fn drop(&mut self) {
        self.interp.set_observer(self.previous.take());
        SESSION_ON_THREAD.set(false);
    }
}

/// Bindings plus the host result of the traced call.
#[derive(Debug)]
pub struct Traced {
    pub bindings: Vec<TypeBinding>,
    pub result: Value,
}

/// Call `function(*args)` under a trace session.
pub fn trace(interp: &Interpreter, function: &Value, args: Vec<Value>) -> Result<Traced, TraceError> {
    let Value::Function(func) = function else {
        return NotCallableSnafu { type_name: function.type_name() }.fail();
    };

    let session = TraceSession::begin(interp)?;
    let result = interp.call(function, args).context(CallSnafu { function: func.def.name.clone() })?;
    let bindings = session.bindings();
    drop(session);

    debug!(
        bindings = bindings.len(),
        functions = %bindings.iter().map(TypeBinding::qualified_name).join(", "),
        "trace finished"
    );
    Ok(Traced { bindings, result })
}

/// The first free function taking exactly one parameter.
pub fn entry_point(bindings: &[TypeBinding]) -> Option<&TypeBinding> {
    bindings.iter().find(|b| b.owner.is_none() && b.params.len() == 1)
}
