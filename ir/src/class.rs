//! Class descriptors: the structural record shared by layout, codec and
//! code generation.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::types::Type;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

/// Field names and types of one host class, in first-extraction order.
///
/// The field order is the binary layout contract: struct declarations, the
/// codec and the format string all walk `fields` front to back. Two
/// descriptors are the same type iff their names match.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    pub name: String,
    pub fields: Vec<Field>,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Arc<Self> {
        Arc::new(Self { name: name.into(), fields })
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Classes used directly as field types, in field order, without duplicates.
    pub fn field_classes(&self) -> Vec<Arc<ClassDescriptor>> {
        let mut out: Vec<Arc<ClassDescriptor>> = Vec::new();
        for field in &self.fields {
            if let Some(class) = field.ty.innermost_class()
                && !out.iter().any(|c| c.name == class.name)
            {
                out.push(class.clone());
            }
        }
        out
    }
}

impl PartialEq for ClassDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ClassDescriptor {}

impl Hash for ClassDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{ ", self.name)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field.name, field.ty)?;
        }
        write!(f, " }}")
    }
}
