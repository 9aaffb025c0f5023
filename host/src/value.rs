//! Runtime values of the host language.
//!
//! Objects, lists and closure cells are shared mutable handles
//! (`Rc<RefCell<_>>`), so mutating an argument inside a call is visible to
//! the caller, the same aliasing the device code reproduces with references.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use gpumap_dtype::ScalarDType;
use itertools::Itertools;

use crate::ast::FunctionDef;

/// A mutable variable slot shared between a scope and the closures that
/// capture it.
pub type Cell = Rc<RefCell<Value>>;
pub type ListRef = Rc<RefCell<Vec<Value>>>;
pub type ObjectRef = Rc<RefCell<Object>>;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    /// 32-bit integer with wrapping arithmetic, the same width as the device.
    Int(i32),
    Float(f32),
    /// Integer that does not fit the device width. Never translatable.
    BigInt(i128),
    Str(Rc<str>),
    List(ListRef),
    Object(ObjectRef),
    Function(Rc<Function>),
    Class(Rc<Class>),
    Module(Rc<HostModule>),
    Builtin(Builtin),
    Range(Range),
}

/// Instance of a user class. Attributes keep first-assignment order.
pub struct Object {
    pub class: Rc<Class>,
    fields: Vec<(String, Value)>,
}

pub struct Class {
    pub name: String,
    pub methods: HashMap<String, Rc<Function>>,
}

/// A user function together with the cells it closed over.
pub struct Function {
    pub def: Arc<FunctionDef>,
    pub captures: Vec<(String, Cell)>,
    /// Name of the defining class for methods.
    pub owner: Option<String>,
}

pub struct HostModule {
    pub name: String,
    pub attrs: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i32,
    pub stop: i32,
    pub step: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Builtin {
    Range,
    Len,
    Print,
    Abs,
    Min,
    Max,
    Int,
    Float,
    #[strum(disabled)]
    Math(MathFn),
}

/// Functions of the `math` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MathFn {
    Sin,
    Cos,
    Tan,
    Exp,
    Ceil,
    Floor,
    Sqrt,
    Pow,
    Log,
    Log10,
    Log1p,
    Log2,
    Fabs,
}

/// Field-level reflection over host objects.
///
/// This is the only view of an object the structural extractor and the
/// codec rely on.
pub trait Reflect {
    fn type_name(&self) -> &str;

    /// Visit attributes in declaration order, stopping at the first error.
    fn for_each_field<E>(&self, visitor: impl FnMut(&str, &Value) -> Result<(), E>) -> Result<(), E>;

    fn get_field(&self, name: &str) -> Option<Value>;

    /// Rebind an attribute, appending it when it does not exist yet.
    fn set_field(&mut self, name: &str, value: Value);
}

impl Object {
    pub fn new(class: Rc<Class>) -> Self {
        Self { class, fields: Vec::new() }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

impl Reflect for Object {
    fn type_name(&self) -> &str {
        &self.class.name
    }

    fn for_each_field<E>(&self, mut visitor: impl FnMut(&str, &Value) -> Result<(), E>) -> Result<(), E> {
        for (name, value) in &self.fields {
            visitor(name, value)?;
        }
        Ok(())
    }

    fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone())
    }

    fn set_field(&mut self, name: &str, value: Value) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }
}

impl Value {
    /// Integer literal, falling back to [`Value::BigInt`] outside the 32-bit range.
    pub fn int(v: i64) -> Self {
        i32::try_from(v).map(Value::Int).unwrap_or(Value::BigInt(v as i128))
    }

    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn object(object: Object) -> Self {
        Value::Object(Rc::new(RefCell::new(object)))
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Float(_) => "float".into(),
            Value::BigInt(_) => "bigint".into(),
            Value::Str(_) => "str".into(),
            Value::List(_) => "list".into(),
            Value::Object(obj) => obj.borrow().class.name.clone(),
            Value::Function(_) => "function".into(),
            Value::Class(_) => "type".into(),
            Value::Module(_) => "module".into(),
            Value::Builtin(_) => "builtin_function_or_method".into(),
            Value::Range(_) => "range".into(),
        }
    }

    /// Primitive tag for values that map onto a device scalar.
    pub fn scalar_dtype(&self) -> Option<ScalarDType> {
        match self {
            Value::Bool(_) => Some(ScalarDType::Bool),
            Value::Int(_) => Some(ScalarDType::Int32),
            Value::Float(_) => Some(ScalarDType::Float32),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::BigInt(i) => *i != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Range(r) => r.len() > 0,
            _ => true,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListRef> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Same object for reference values, equal payload for immediates.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            _ => false,
        }
    }

    /// Recursive copy of objects and lists; functions, classes and modules
    /// stay shared.
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::List(items) => Value::list(items.borrow().iter().map(Value::deep_clone).collect()),
            Value::Object(obj) => {
                let obj = obj.borrow();
                let fields = obj.fields.iter().map(|(n, v)| (n.clone(), v.deep_clone())).collect();
                Value::object(Object { class: obj.class.clone(), fields })
            }
            other => other.clone(),
        }
    }
}

impl Range {
    pub fn len(&self) -> usize {
        let span = if self.step > 0 {
            (self.stop as i64 - self.start as i64 + self.step as i64 - 1) / self.step as i64
        } else {
            (self.start as i64 - self.stop as i64 - self.step as i64 - 1) / -(self.step as i64)
        };
        span.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> + use<> {
        let Range { start, step, .. } = *self;
        (0..self.len()).map(move |i| start.wrapping_add(step.wrapping_mul(i as i32)))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::BigInt(i) => write!(f, "{i}"),
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 => write!(f, "{v:.1}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => write!(f, "[{}]", items.borrow().iter().map(|v| v.to_string()).join(", ")),
            Value::Object(obj) => write!(f, "<{} object>", obj.borrow().class.name),
            Value::Function(func) => write!(f, "<function {}>", func.def.name),
            Value::Class(class) => write!(f, "<class '{}'>", class.name),
            Value::Module(module) => write!(f, "<module '{}'>", module.name),
            Value::Builtin(Builtin::Math(m)) => write!(f, "<built-in function {m}>"),
            Value::Builtin(b) => write!(f, "<built-in function {b}>"),
            Value::Range(r) => write!(f, "range({}, {}, {})", r.start, r.stop, r.step),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(obj) => {
                let obj = obj.borrow();
                let mut s = f.debug_struct(&obj.class.name);
                for (name, value) in &obj.fields {
                    s.field(name, value);
                }
                s.finish()
            }
            Value::List(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            other => write!(f, "{other}"),
        }
    }
}

impl PartialEq for Value {
    /// Structural equality for immediates and lists, identity for objects.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            _ => self.is_identical(other),
        }
    }
}
