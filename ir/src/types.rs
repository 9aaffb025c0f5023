//! The closed set of translatable types.

use std::fmt;
use std::sync::Arc;

use gpumap_dtype::ScalarDType;

use crate::class::ClassDescriptor;

/// Every type the translator, layout generator and codec understand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Scalar(ScalarDType),
    Class(Arc<ClassDescriptor>),
    /// Homogeneous collection; only valid as a parameter or capture type.
    List(Box<Type>),
}

impl Type {
    pub const INT: Type = Type::Scalar(ScalarDType::Int32);
    pub const FLOAT: Type = Type::Scalar(ScalarDType::Float32);
    pub const BOOL: Type = Type::Scalar(ScalarDType::Bool);

    pub fn list_of(element: Type) -> Type {
        Type::List(Box::new(element))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Scalar(_))
    }

    pub fn scalar(&self) -> Option<ScalarDType> {
        match self {
            Type::Scalar(dtype) => Some(*dtype),
            _ => None,
        }
    }

    pub fn class(&self) -> Option<&Arc<ClassDescriptor>> {
        match self {
            Type::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::List(element) => Some(element),
            _ => None,
        }
    }

    /// Class at the bottom of any list nesting.
    pub fn innermost_class(&self) -> Option<&Arc<ClassDescriptor>> {
        match self {
            Type::Scalar(_) => None,
            Type::Class(class) => Some(class),
            Type::List(element) => element.innermost_class(),
        }
    }

    /// Device spelling: `int`, `Point`, `List<Point>`.
    pub fn c_name(&self) -> String {
        match self {
            Type::Scalar(dtype) => dtype.c_style().to_string(),
            Type::Class(class) => class.name.clone(),
            Type::List(element) => format!("List<{}>", element.c_name()),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.c_name())
    }
}

impl From<ScalarDType> for Type {
    fn from(dtype: ScalarDType) -> Self {
        Type::Scalar(dtype)
    }
}
