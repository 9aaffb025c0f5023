//! Structural extraction of class descriptors from sample instances.

use std::collections::HashMap;
use std::sync::Arc;

use gpumap_host::{Reflect, Value};
use snafu::ensure;
use tracing::debug;

use crate::class::{ClassDescriptor, Field};
use crate::error::{EmptyCollectionSnafu, LayoutError, RecursiveClassSnafu, UnsupportedFieldSnafu, UnsupportedValueSnafu};
use crate::types::Type;

type Result<T> = std::result::Result<T, LayoutError>;

/// Builds descriptors by walking instance attributes, memoized by class name.
///
/// The first instance of a class fixes its field order for the lifetime of
/// the extractor; later instances of the same class reuse that descriptor.
#[derive(Debug, Default)]
pub struct Extractor {
    /// Completed descriptors, dependencies before dependents.
    classes: Vec<Arc<ClassDescriptor>>,
    by_name: HashMap<String, usize>,
    /// Classes currently being walked, to reject by-value self containment.
    in_progress: Vec<String>,
}

impl Extractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extract<R: Reflect>(&mut self, instance: &R) -> Result<Arc<ClassDescriptor>> {
        let name = instance.type_name();
        if let Some(&index) = self.by_name.get(name) {
            return Ok(self.classes[index].clone());
        }
        ensure!(!self.in_progress.iter().any(|n| n == name), RecursiveClassSnafu { name });
        self.in_progress.push(name.to_string());

        let mut fields = Vec::new();
        let walked = instance.for_each_field(|field: &str, value: &Value| -> Result<()> {
            let ty = match value {
                Value::Object(obj) => Type::Class(self.extract(&*obj.borrow())?),
                other => match other.scalar_dtype() {
                    Some(dtype) => Type::Scalar(dtype),
                    None => {
                        return UnsupportedFieldSnafu { class: name, field, type_name: other.type_name() }.fail();
                    }
                },
            };
            fields.push(Field { name: field.to_string(), ty });
            Ok(())
        });
        self.in_progress.pop();
        walked?;

        let descriptor = ClassDescriptor::new(name, fields);
        debug!(class.name = %descriptor.name, fields = descriptor.fields.len(), "extracted class");
        self.by_name.insert(descriptor.name.clone(), self.classes.len());
        self.classes.push(descriptor.clone());
        Ok(descriptor)
    }

    /// Type of an arbitrary host value: primitives, objects and lists of those.
    pub fn type_of(&mut self, value: &Value) -> Result<Type> {
        if let Some(dtype) = value.scalar_dtype() {
            return Ok(Type::Scalar(dtype));
        }
        match value {
            Value::Object(obj) => Ok(Type::Class(self.extract(&*obj.borrow())?)),
            Value::List(items) => {
                let first = items.borrow().first().cloned();
                let Some(first) = first else {
                    return EmptyCollectionSnafu { context: "list value" }.fail();
                };
                Ok(Type::list_of(self.type_of(&first)?))
            }
            other => UnsupportedValueSnafu { type_name: other.type_name() }.fail(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ClassDescriptor>> {
        self.by_name.get(name).map(|&i| &self.classes[i])
    }

    /// All descriptors in completion order (field classes first).
    pub fn classes(&self) -> &[Arc<ClassDescriptor>] {
        &self.classes
    }
}

/// One-shot extraction with a fresh memo table.
pub fn extract(instance: &Value) -> Result<Arc<ClassDescriptor>> {
    match instance {
        Value::Object(obj) => Extractor::new().extract(&*obj.borrow()),
        other => UnsupportedValueSnafu { type_name: other.type_name() }.fail(),
    }
}
