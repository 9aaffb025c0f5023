//! Tree-walking interpreter with a call observer hook.
//!
//! The observer sees every function, method, constructor and built-in call
//! together with its actual arguments and return value. This is the seam the
//! type tracer plugs into.

use std::cell::{Cell as StdCell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use itertools::Itertools;
use smallvec::SmallVec;
use snafu::ensure;
use tracing::{debug, trace};

use crate::ast::*;
use crate::builtins;
use crate::error::{
    AritySnafu, IndexOutOfRangeSnafu, NoAttributeSnafu, OutsideLoopSnafu, RecursionLimitSnafu, Result,
    TypeSnafu, UndefinedNameSnafu, UnsupportedSnafu,
};
use crate::ops;
use crate::parser::{parse_expr, parse_module};
use crate::value::{Builtin, Cell, Class, Function, Object, Reflect, Value};

/// Maximum nesting of user-level calls.
pub const RECURSION_LIMIT: usize = 64;

/// One observed call.
#[derive(Clone, Copy)]
pub struct CallEvent<'a> {
    /// Class name for methods and constructors.
    pub owner: Option<&'a str>,
    pub name: &'a str,
    /// Parameter names, including `self` for methods.
    pub params: &'a [String],
    /// Actual arguments, including the receiver for methods.
    pub args: &'a [Value],
    /// `None` for built-ins.
    pub callee: Option<&'a Rc<Function>>,
}

impl CallEvent<'_> {
    pub fn is_builtin(&self) -> bool {
        self.callee.is_none()
    }
}

pub trait CallObserver {
    fn on_call(&self, event: &CallEvent<'_>);
    fn on_return(&self, event: &CallEvent<'_>, value: &Value);
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

struct Frame<'f> {
    /// `None` at module level, where bindings go to globals.
    locals: Option<HashMap<String, Cell>>,
    captures: &'f [(String, Cell)],
    loop_depth: usize,
}

impl Frame<'static> {
    fn module() -> Self {
        Frame { locals: None, captures: &[], loop_depth: 0 }
    }
}

pub struct Interpreter {
    globals: RefCell<HashMap<String, Value>>,
    builtins: HashMap<&'static str, Value>,
    observer: RefCell<Option<Rc<dyn CallObserver>>>,
    output: RefCell<Vec<String>>,
    depth: StdCell<usize>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            globals: RefCell::new(HashMap::new()),
            builtins: builtins::global_builtins().collect(),
            observer: RefCell::new(None),
            output: RefCell::new(Vec::new()),
            depth: StdCell::new(0),
        }
    }

    /// Execute a module's top-level statements in the global scope.
    pub fn load(&self, source: &str) -> Result<()> {
        let module = parse_module(source)?;
        let mut frame = Frame::module();
        match self.exec_block(&module.body, &mut frame)? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => UnsupportedSnafu { construct: "'return' outside function" }.fail(),
            Flow::Break => OutsideLoopSnafu { keyword: "break" }.fail(),
            Flow::Continue => OutsideLoopSnafu { keyword: "continue" }.fail(),
        }
    }

    /// Evaluate a single expression against the global scope.
    pub fn eval(&self, source: &str) -> Result<Value> {
        let expr = parse_expr(source)?;
        self.eval_expr(&expr, &mut Frame::module())
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).cloned()
    }

    pub fn set_global(&self, name: &str, value: Value) {
        self.globals.borrow_mut().insert(name.to_string(), value);
    }

    /// Install `observer`, returning the previously installed one.
    pub fn set_observer(&self, observer: Option<Rc<dyn CallObserver>>) -> Option<Rc<dyn CallObserver>> {
        std::mem::replace(&mut *self.observer.borrow_mut(), observer)
    }

    /// Lines written by `print` so far.
    pub fn printed(&self) -> Vec<String> {
        self.output.borrow().clone()
    }

    /// Call any callable value: function, class or built-in.
    pub fn call(&self, callee: &Value, args: Vec<Value>) -> Result<Value> {
        match callee {
            Value::Function(func) => self.call_function(func, args),
            Value::Class(class) => self.instantiate(class, args),
            Value::Builtin(builtin) => {
                let name = match builtin {
                    Builtin::Math(f) => f.to_string(),
                    other => other.to_string(),
                };
                let observer = self.observer.borrow().clone();
                let event = CallEvent { owner: None, name: &name, params: &[], args: &args, callee: None };
                if let Some(observer) = &observer {
                    observer.on_call(&event);
                }
                let value = match builtin {
                    Builtin::Print => {
                        let line = builtins::print_line(&args);
                        debug!(output = %line, "print");
                        self.output.borrow_mut().push(line);
                        Value::None
                    }
                    other => builtins::call(*other, &args)?,
                };
                if let Some(observer) = &observer {
                    observer.on_return(&event, &value);
                }
                Ok(value)
            }
            other => TypeSnafu { reason: format!("'{}' object is not callable", other.type_name()) }.fail(),
        }
    }

    /// Invoke `receiver.name(*args)`.
    pub fn call_method(&self, receiver: &Value, name: &str, args: Vec<Value>) -> Result<Value> {
        match receiver {
            Value::Object(obj) => {
                let method = obj.borrow().class.methods.get(name).cloned();
                let Some(method) = method else {
                    return NoAttributeSnafu { type_name: receiver.type_name(), attr: name }.fail();
                };
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(receiver.clone());
                full.extend(args);
                self.call_function(&method, full)
            }
            Value::List(items) => match (name, args.as_slice()) {
                ("append", [item]) => {
                    items.borrow_mut().push(item.clone());
                    Ok(Value::None)
                }
                ("pop", []) => items.borrow_mut().pop().ok_or_else(|| {
                    IndexOutOfRangeSnafu { index: -1i64, length: 0usize }.build()
                }),
                ("append" | "pop", _) => {
                    AritySnafu { callee: format!("list.{name}"), expected: usize::from(name == "append"), actual: args.len() }
                        .fail()
                }
                _ => NoAttributeSnafu { type_name: "list", attr: name }.fail(),
            },
            Value::Module(module) => match module.attrs.get(name) {
                Some(callee) => self.call(callee, args),
                None => NoAttributeSnafu { type_name: "module", attr: name }.fail(),
            },
            Value::Class(class) => match class.methods.get(name) {
                Some(method) => self.call_function(method, args),
                None => NoAttributeSnafu { type_name: class.name.clone(), attr: name }.fail(),
            },
            other => NoAttributeSnafu { type_name: other.type_name(), attr: name }.fail(),
        }
    }

    fn instantiate(&self, class: &Rc<Class>, args: Vec<Value>) -> Result<Value> {
        let instance = Value::object(Object::new(class.clone()));
        match class.methods.get("__init__") {
            Some(init) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(instance.clone());
                full.extend(args);
                self.call_function(init, full)?;
            }
            None => ensure!(args.is_empty(), AritySnafu { callee: class.name.clone(), expected: 0usize, actual: args.len() }),
        }
        Ok(instance)
    }

    fn call_function(&self, func: &Rc<Function>, args: Vec<Value>) -> Result<Value> {
        let def = &func.def;
        ensure!(
            args.len() == def.params.len(),
            AritySnafu { callee: def.name.clone(), expected: def.params.len(), actual: args.len() }
        );
        ensure!(!def.is_async, UnsupportedSnafu { construct: "async function" });

        let depth = self.depth.get();
        ensure!(depth < RECURSION_LIMIT, RecursionLimitSnafu { limit: RECURSION_LIMIT });

        let observer = self.observer.borrow().clone();
        let event =
            CallEvent { owner: func.owner.as_deref(), name: &def.name, params: &def.params, args: &args, callee: Some(func) };
        if let Some(observer) = &observer {
            observer.on_call(&event);
        }
        trace!(function.name = %def.name, depth, "call");

        let locals = def.params.iter().cloned().zip(args.iter().map(|a| Rc::new(RefCell::new(a.clone())))).collect();
        let mut frame = Frame { locals: Some(locals), captures: &func.captures, loop_depth: 0 };

        self.depth.set(depth + 1);
        let flow = self.exec_block(&def.body, &mut frame);
        self.depth.set(depth);

        let value = match flow? {
            Flow::Return(value) => value,
            Flow::Normal => Value::None,
            Flow::Break => return OutsideLoopSnafu { keyword: "break" }.fail(),
            Flow::Continue => return OutsideLoopSnafu { keyword: "continue" }.fail(),
        };
        if let Some(observer) = &observer {
            observer.on_return(&event, &value);
        }
        Ok(value)
    }

    fn exec_block(&self, body: &[Stmt], frame: &mut Frame<'_>) -> Result<Flow> {
        for stmt in body {
            match self.exec(stmt, frame)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&self, stmt: &Stmt, frame: &mut Frame<'_>) -> Result<Flow> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval_expr(expr, frame)?;
            }
            Stmt::Assign { targets, value } => {
                let value = self.eval_expr(value, frame)?;
                for target in targets {
                    self.assign(target, value.clone(), frame)?;
                }
            }
            Stmt::AugAssign { target, op, value } => self.aug_assign(target, *op, value, frame)?,
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, frame)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Pass => {}
            Stmt::Break if frame.loop_depth > 0 => return Ok(Flow::Break),
            Stmt::Continue if frame.loop_depth > 0 => return Ok(Flow::Continue),
            Stmt::Break => return OutsideLoopSnafu { keyword: "break" }.fail(),
            Stmt::Continue => return OutsideLoopSnafu { keyword: "continue" }.fail(),
            Stmt::If { test, body, orelse } => {
                let branch = if self.eval_expr(test, frame)?.truthy() { body } else { orelse };
                return self.exec_block(branch, frame);
            }
            Stmt::While { test, body, orelse } => {
                frame.loop_depth += 1;
                let result = self.exec_while(test, body, frame);
                frame.loop_depth -= 1;
                match result? {
                    LoopExit::Broke => {}
                    LoopExit::Exhausted => return self.exec_block(orelse, frame),
                    LoopExit::Returned(value) => return Ok(Flow::Return(value)),
                }
            }
            Stmt::For { is_async: true, .. } => return UnsupportedSnafu { construct: "async for" }.fail(),
            Stmt::For { target, iter, body, orelse, .. } => {
                let items = self.iterate(&self.eval_expr(iter, frame)?)?;
                frame.loop_depth += 1;
                let result = self.exec_for(target, items, body, frame);
                frame.loop_depth -= 1;
                match result? {
                    LoopExit::Broke => {}
                    LoopExit::Exhausted => return self.exec_block(orelse, frame),
                    LoopExit::Returned(value) => return Ok(Flow::Return(value)),
                }
            }
            Stmt::FunctionDef(def) => {
                // Bind the name first so a nested function can capture itself.
                let cell = self.declare(&def.name, frame);
                let func = self.make_function(def.clone(), None, frame);
                match cell {
                    Some(cell) => *cell.borrow_mut() = func,
                    None => self.set_global(&def.name, func),
                }
            }
            Stmt::ClassDef(def) => {
                let class = self.make_class(def)?;
                self.bind(&def.name, class, frame);
            }
            Stmt::Assert { test, msg } => {
                if !self.eval_expr(test, frame)?.truthy() {
                    let msg = match msg {
                        Some(msg) => self.eval_expr(msg, frame)?.to_string(),
                        None => String::new(),
                    };
                    return TypeSnafu { reason: format!("AssertionError: {msg}") }.fail();
                }
            }
            Stmt::Import(names) => {
                for name in names {
                    ensure!(name == "math", UnsupportedSnafu { construct: format!("import of module '{name}'") });
                    self.bind(name, builtins::math_module(), frame);
                }
            }
            Stmt::ImportFrom { module, names } => {
                ensure!(module == "math", UnsupportedSnafu { construct: format!("import from module '{module}'") });
                let math = builtins::math_module();
                for name in names {
                    let value = match &math {
                        Value::Module(m) => m.attrs.get(name).cloned(),
                        _ => None,
                    };
                    let Some(value) = value else {
                        return NoAttributeSnafu { type_name: "module", attr: name.clone() }.fail();
                    };
                    self.bind(name, value, frame);
                }
            }
            Stmt::Try { .. } => return UnsupportedSnafu { construct: "try statement" }.fail(),
            Stmt::Raise(_) => return UnsupportedSnafu { construct: "raise statement" }.fail(),
            Stmt::Delete(_) => return UnsupportedSnafu { construct: "del statement" }.fail(),
            Stmt::With { .. } => return UnsupportedSnafu { construct: "with statement" }.fail(),
            Stmt::Global(_) => return UnsupportedSnafu { construct: "global declaration" }.fail(),
            Stmt::Nonlocal(_) => return UnsupportedSnafu { construct: "nonlocal declaration" }.fail(),
        }
        Ok(Flow::Normal)
    }

    fn exec_while(&self, test: &Expr, body: &[Stmt], frame: &mut Frame<'_>) -> Result<LoopExit> {
        while self.eval_expr(test, frame)?.truthy() {
            match self.exec_block(body, frame)? {
                Flow::Break => return Ok(LoopExit::Broke),
                Flow::Return(value) => return Ok(LoopExit::Returned(value)),
                Flow::Normal | Flow::Continue => {}
            }
        }
        Ok(LoopExit::Exhausted)
    }

    fn exec_for(&self, target: &Expr, items: Vec<Value>, body: &[Stmt], frame: &mut Frame<'_>) -> Result<LoopExit> {
        for item in items {
            self.assign(target, item, frame)?;
            match self.exec_block(body, frame)? {
                Flow::Break => return Ok(LoopExit::Broke),
                Flow::Return(value) => return Ok(LoopExit::Returned(value)),
                Flow::Normal | Flow::Continue => {}
            }
        }
        Ok(LoopExit::Exhausted)
    }

    /// Materialize the items of an iterable. Lists are snapshotted.
    fn iterate(&self, iterable: &Value) -> Result<Vec<Value>> {
        match iterable {
            Value::Range(range) => Ok(range.iter().map(Value::Int).collect()),
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.encode_utf8(&mut [0; 4]))).collect()),
            other => TypeSnafu { reason: format!("'{}' object is not iterable", other.type_name()) }.fail(),
        }
    }

    fn make_function(&self, def: Arc<FunctionDef>, owner: Option<String>, frame: &Frame<'_>) -> Value {
        let captures = def
            .free_names()
            .into_iter()
            .filter_map(|name| self.lookup_cell(&name, frame).map(|cell| (name, cell)))
            .collect();
        Value::Function(Rc::new(Function { def, captures, owner }))
    }

    fn make_class(&self, def: &ClassDef) -> Result<Value> {
        for base in &def.bases {
            ensure!(
                matches!(base, Expr::Name(name) if name == "object"),
                UnsupportedSnafu { construct: format!("inheritance in class '{}'", def.name) }
            );
        }

        let mut methods = HashMap::new();
        for stmt in &def.body {
            match stmt {
                Stmt::FunctionDef(method) => {
                    ensure!(
                        method.params.first().is_some(),
                        TypeSnafu { reason: format!("method '{}.{}' takes no receiver", def.name, method.name) }
                    );
                    let func = Function { def: method.clone(), captures: Vec::new(), owner: Some(def.name.clone()) };
                    methods.insert(method.name.clone(), Rc::new(func));
                }
                Stmt::Pass | Stmt::Expr(Expr::Str(_)) => {}
                _ => {
                    return UnsupportedSnafu { construct: format!("class attribute in class '{}'", def.name) }.fail();
                }
            }
        }
        Ok(Value::Class(Rc::new(Class { name: def.name.clone(), methods })))
    }

    // ------------------------------------------------------------------
    // Name resolution
    // ------------------------------------------------------------------

    fn lookup_cell(&self, name: &str, frame: &Frame<'_>) -> Option<Cell> {
        if let Some(cell) = frame.locals.as_ref().and_then(|locals| locals.get(name)) {
            return Some(cell.clone());
        }
        frame.captures.iter().find(|(n, _)| n == name).map(|(_, cell)| cell.clone())
    }

    fn lookup(&self, name: &str, frame: &Frame<'_>) -> Result<Value> {
        if let Some(cell) = self.lookup_cell(name, frame) {
            return Ok(cell.borrow().clone());
        }
        if let Some(value) = self.globals.borrow().get(name) {
            return Ok(value.clone());
        }
        match self.builtins.get(name) {
            Some(value) => Ok(value.clone()),
            None => UndefinedNameSnafu { name }.fail(),
        }
    }

    /// Local cell for `name`, created on first use. `None` at module level.
    fn declare(&self, name: &str, frame: &mut Frame<'_>) -> Option<Cell> {
        let locals = frame.locals.as_mut()?;
        Some(locals.entry(name.to_string()).or_insert_with(|| Rc::new(RefCell::new(Value::None))).clone())
    }

    fn bind(&self, name: &str, value: Value, frame: &mut Frame<'_>) {
        match self.declare(name, frame) {
            Some(cell) => *cell.borrow_mut() = value,
            None => self.set_global(name, value),
        }
    }

    fn assign(&self, target: &Expr, value: Value, frame: &mut Frame<'_>) -> Result<()> {
        match target {
            Expr::Name(name) => self.bind(name, value, frame),
            Expr::Attribute { value: object, attr } => {
                let object = self.eval_expr(object, frame)?;
                match &object {
                    Value::Object(obj) => obj.borrow_mut().set_field(attr, value),
                    other => {
                        return TypeSnafu {
                            reason: format!("cannot set attribute '{attr}' on '{}' object", other.type_name()),
                        }
                        .fail();
                    }
                }
            }
            Expr::Subscript { value: container, index } => {
                let container = self.eval_expr(container, frame)?;
                let index = self.eval_expr(index, frame)?;
                let Value::List(items) = &container else {
                    return TypeSnafu {
                        reason: format!("'{}' object does not support item assignment", container.type_name()),
                    }
                    .fail();
                };
                let slot = normalize_index(&index, items.borrow().len())?;
                items.borrow_mut()[slot] = value;
            }
            Expr::Tuple(_) | Expr::List(_) => return UnsupportedSnafu { construct: "destructuring assignment" }.fail(),
            other => {
                return TypeSnafu { reason: format!("cannot assign to expression {}", expr_kind(other)) }.fail();
            }
        }
        Ok(())
    }

    fn aug_assign(&self, target: &Expr, op: BinOp, value: &Expr, frame: &mut Frame<'_>) -> Result<()> {
        match target {
            Expr::Name(name) => {
                let current = self.lookup(name, frame)?;
                let rhs = self.eval_expr(value, frame)?;
                self.bind(name, ops::binary(op, &current, &rhs)?, frame);
            }
            Expr::Attribute { value: object, attr } => {
                let object = self.eval_expr(object, frame)?;
                let current = self.get_attr(&object, attr)?;
                let rhs = self.eval_expr(value, frame)?;
                let updated = ops::binary(op, &current, &rhs)?;
                if let Value::Object(obj) = &object {
                    obj.borrow_mut().set_field(attr, updated);
                }
            }
            Expr::Subscript { value: container, index } => {
                let container = self.eval_expr(container, frame)?;
                let index = self.eval_expr(index, frame)?;
                let current = self.subscript(&container, &index)?;
                let rhs = self.eval_expr(value, frame)?;
                let updated = ops::binary(op, &current, &rhs)?;
                if let Value::List(items) = &container {
                    let slot = normalize_index(&index, items.borrow().len())?;
                    items.borrow_mut()[slot] = updated;
                }
            }
            other => {
                return TypeSnafu { reason: format!("illegal target for augmented assignment: {}", expr_kind(other)) }
                    .fail();
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn eval_expr(&self, expr: &Expr, frame: &mut Frame<'_>) -> Result<Value> {
        match expr {
            Expr::Name(name) => self.lookup(name, frame),
            Expr::Int(v) => Ok(Value::int(*v)),
            Expr::Float(v) => Ok(Value::Float(*v as f32)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::None => Ok(Value::None),
            Expr::Str(s) => Ok(Value::str(s)),
            Expr::Attribute { value, attr } => {
                let object = self.eval_expr(value, frame)?;
                self.get_attr(&object, attr)
            }
            Expr::Subscript { value, index } => {
                ensure!(!matches!(**index, Expr::Slice { .. }), UnsupportedSnafu { construct: "slicing" });
                let container = self.eval_expr(value, frame)?;
                let index = self.eval_expr(index, frame)?;
                self.subscript(&container, &index)
            }
            Expr::Call { keywords, .. } if !keywords.is_empty() => {
                UnsupportedSnafu { construct: "keyword arguments" }.fail()
            }
            Expr::Call { func, args, .. } => {
                let args = self.eval_args(args, frame)?;
                match &**func {
                    Expr::Attribute { value, attr } => {
                        let receiver = self.eval_expr(value, frame)?;
                        // A callable stored in a field shadows a method of the same name.
                        let field = match &receiver {
                            Value::Object(obj) => obj.borrow().get_field(attr),
                            _ => None,
                        };
                        match field {
                            Some(field) => self.call(&field, args),
                            None => self.call_method(&receiver, attr, args),
                        }
                    }
                    callee => {
                        let callee = self.eval_expr(callee, frame)?;
                        self.call(&callee, args)
                    }
                }
            }
            Expr::BinOp { left, op, right } => {
                let lhs = self.eval_expr(left, frame)?;
                let rhs = self.eval_expr(right, frame)?;
                ops::binary(*op, &lhs, &rhs)
            }
            Expr::UnaryOp { op, operand } => ops::unary(*op, &self.eval_expr(operand, frame)?),
            Expr::BoolOp { op, values } => {
                let mut last = Value::None;
                for value in values {
                    last = self.eval_expr(value, frame)?;
                    let short_circuit = match op {
                        BoolOp::And => !last.truthy(),
                        BoolOp::Or => last.truthy(),
                    };
                    if short_circuit {
                        break;
                    }
                }
                Ok(last)
            }
            Expr::Compare { left, ops: cmp_ops, comparators } => {
                let mut lhs = self.eval_expr(left, frame)?;
                for (op, rhs) in cmp_ops.iter().zip(comparators) {
                    let rhs = self.eval_expr(rhs, frame)?;
                    if !ops::compare(*op, &lhs, &rhs)? {
                        return Ok(Value::Bool(false));
                    }
                    lhs = rhs;
                }
                Ok(Value::Bool(true))
            }
            Expr::IfExp { test, body, orelse } => {
                if self.eval_expr(test, frame)?.truthy() {
                    self.eval_expr(body, frame)
                } else {
                    self.eval_expr(orelse, frame)
                }
            }
            Expr::Lambda { params, body } => {
                let def = FunctionDef {
                    name: "<lambda>".into(),
                    params: params.clone(),
                    body: vec![Stmt::Return(Some((**body).clone()))],
                    is_async: false,
                    line: 0,
                };
                Ok(self.make_function(Arc::new(def), None, frame))
            }
            Expr::List(items) => Ok(Value::list(self.eval_args(items, frame)?)),
            Expr::Comprehension { kind: ComprehensionKind::List, element, generators, .. } => {
                let mut out = Vec::new();
                self.comprehend(element, generators, frame, &mut out)?;
                Ok(Value::list(out))
            }
            other => UnsupportedSnafu { construct: expr_kind(other) }.fail(),
        }
    }

    fn eval_args(&self, args: &[Expr], frame: &mut Frame<'_>) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            ensure!(!matches!(arg, Expr::Starred(_)), UnsupportedSnafu { construct: "argument unpacking" });
            values.push(self.eval_expr(arg, frame)?);
        }
        Ok(values)
    }

    /// List comprehension; loop targets are bound in the enclosing frame.
    fn comprehend(
        &self,
        element: &Expr,
        generators: &[Comprehension],
        frame: &mut Frame<'_>,
        out: &mut Vec<Value>,
    ) -> Result<()> {
        let Some((generator, rest)) = generators.split_first() else {
            out.push(self.eval_expr(element, frame)?);
            return Ok(());
        };
        ensure!(!generator.is_async, UnsupportedSnafu { construct: "async comprehension" });
        let items = self.iterate(&self.eval_expr(&generator.iter, frame)?)?;
        'items: for item in items {
            self.assign(&generator.target, item, frame)?;
            for condition in &generator.conditions {
                if !self.eval_expr(condition, frame)?.truthy() {
                    continue 'items;
                }
            }
            self.comprehend(element, rest, frame, out)?;
        }
        Ok(())
    }

    fn get_attr(&self, object: &Value, attr: &str) -> Result<Value> {
        match object {
            Value::Object(obj) => {
                let obj = obj.borrow();
                if let Some(value) = obj.get_field(attr) {
                    return Ok(value);
                }
                ensure!(
                    !obj.class.methods.contains_key(attr),
                    UnsupportedSnafu { construct: format!("bound method reference '{}.{attr}'", obj.class.name) }
                );
                NoAttributeSnafu { type_name: obj.class.name.clone(), attr }.fail()
            }
            Value::Module(module) => match module.attrs.get(attr) {
                Some(value) => Ok(value.clone()),
                None => NoAttributeSnafu { type_name: format!("module '{}'", module.name), attr }.fail(),
            },
            Value::Class(class) => match class.methods.get(attr) {
                Some(method) => Ok(Value::Function(method.clone())),
                None => NoAttributeSnafu { type_name: class.name.clone(), attr }.fail(),
            },
            other => NoAttributeSnafu { type_name: other.type_name(), attr }.fail(),
        }
    }

    fn subscript(&self, container: &Value, index: &Value) -> Result<Value> {
        match container {
            Value::List(items) => {
                let items = items.borrow();
                let slot = normalize_index(index, items.len())?;
                Ok(items[slot].clone())
            }
            Value::Str(s) => {
                let chars: SmallVec<[char; 32]> = s.chars().collect();
                let slot = normalize_index(index, chars.len())?;
                Ok(Value::str(chars[slot].encode_utf8(&mut [0; 4])))
            }
            Value::Range(range) => {
                let values = range.iter().collect_vec();
                let slot = normalize_index(index, values.len())?;
                Ok(Value::Int(values[slot]))
            }
            other => TypeSnafu { reason: format!("'{}' object is not subscriptable", other.type_name()) }.fail(),
        }
    }
}

enum LoopExit {
    Broke,
    Exhausted,
    Returned(Value),
}

fn normalize_index(index: &Value, length: usize) -> Result<usize> {
    let raw = match index {
        Value::Int(i) => *i as i64,
        Value::Bool(b) => *b as i64,
        other => {
            return TypeSnafu { reason: format!("indices must be integers, not '{}'", other.type_name()) }.fail();
        }
    };
    let resolved = if raw < 0 { raw + length as i64 } else { raw };
    ensure!((0..length as i64).contains(&resolved), IndexOutOfRangeSnafu { index: raw, length });
    Ok(resolved as usize)
}

/// Short description of an expression form for diagnostics.
fn expr_kind(expr: &Expr) -> String {
    match expr {
        Expr::Tuple(_) => "tuple",
        Expr::Set(_) => "set",
        Expr::Dict(_) => "dict",
        Expr::Bytes(_) => "bytes literal",
        Expr::Ellipsis => "ellipsis",
        Expr::Slice { .. } => "slice",
        Expr::Starred(_) => "starred expression",
        Expr::Yield(_) | Expr::YieldFrom(_) => "yield",
        Expr::Await(_) => "await",
        Expr::Comprehension { kind: ComprehensionKind::Set, .. } => "set comprehension",
        Expr::Comprehension { kind: ComprehensionKind::Dict, .. } => "dict comprehension",
        Expr::Comprehension { kind: ComprehensionKind::Generator, .. } => "generator expression",
        Expr::Call { .. } => "call",
        Expr::Lambda { .. } => "lambda",
        _ => "expression",
    }
    .to_string()
}
