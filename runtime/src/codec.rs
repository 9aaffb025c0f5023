//! Byte layout shared by the host and the generated device code.
//!
//! An element is the concatenation of its primitive fields, depth-first in
//! class-descriptor field order, little-endian and without padding (the
//! device classes are declared under `#pragma pack(1)`). `int` is an `i32`,
//! `float` an `f32` and `bool` a single byte.
//!
//! Two framings add a leading `i32`: a prefixed collection carries its
//! element count (the device `List<T>` view of a captured collection), a
//! list of lists carries the common inner length.

use gpumap_dtype::ScalarDType;
use gpumap_host::{Reflect, Value};
use gpumap_ir::{ClassDescriptor, Type};
use snafu::{OptionExt, Snafu, ensure};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CodecError {
    #[snafu(display("expected {expected} bytes, got {actual}"))]
    LengthMismatch { expected: usize, actual: usize },

    #[snafu(display("expected a value of type '{expected}', found '{found}'"))]
    TypeMismatch { expected: String, found: String },

    #[snafu(display("instance of '{class}' has no field '{field}'"))]
    MissingField { class: String, field: String },

    /// Collections only appear as whole buffers, never inside an element.
    #[snafu(display("type '{type_name}' has no fixed size"))]
    Unsized { type_name: String },

    #[snafu(display("inner list {index} has {actual} elements, expected {expected}"))]
    Ragged { index: usize, expected: usize, actual: usize },

    #[snafu(display("{count} elements do not fit a 32-bit length"))]
    CountOverflow { count: usize },

    #[snafu(display("prefix declares {declared} elements, {expected} expected"))]
    CountMismatch { declared: i32, expected: usize },
}

pub type Result<T, E = CodecError> = std::result::Result<T, E>;

/// Packed width of one element of `ty`.
pub fn size_of(ty: &Type) -> Result<usize> {
    match ty {
        Type::Scalar(dtype) => Ok(dtype.bytes()),
        Type::Class(class) => class.fields.iter().map(|f| size_of(&f.ty)).sum(),
        Type::List(_) => UnsizedSnafu { type_name: ty.c_name() }.fail(),
    }
}

/// `struct`-style format string of one element, e.g. `iiiif`.
pub fn format(ty: &Type) -> Result<String> {
    fn push(ty: &Type, out: &mut String) -> Result<()> {
        match ty {
            Type::Scalar(dtype) => out.push(dtype.format_char()),
            Type::Class(class) => {
                for field in &class.fields {
                    push(&field.ty, out)?;
                }
            }
            Type::List(_) => return UnsizedSnafu { type_name: ty.c_name() }.fail(),
        }
        Ok(())
    }
    let mut out = String::new();
    push(ty, &mut out)?;
    Ok(out)
}

fn mismatch(ty: &Type, value: &Value) -> CodecError {
    TypeMismatchSnafu { expected: ty.c_name(), found: value.type_name() }.build()
}

fn encode_scalar(dtype: ScalarDType, value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match (dtype, value) {
        (ScalarDType::Int32, Value::Int(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ScalarDType::Float32, Value::Float(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ScalarDType::Bool, Value::Bool(v)) => out.push(u8::from(*v)),
        _ => return Err(mismatch(&Type::Scalar(dtype), value)),
    }
    Ok(())
}

fn encode_object(class: &ClassDescriptor, value: &Value, out: &mut Vec<u8>) -> Result<()> {
    let object = value.as_object().filter(|o| o.borrow().type_name() == class.name);
    let object = object.with_context(|| TypeMismatchSnafu { expected: &class.name, found: value.type_name() })?;
    let object = object.borrow();
    for field in &class.fields {
        let field_value =
            object.get_field(&field.name).context(MissingFieldSnafu { class: &class.name, field: &field.name })?;
        encode(&field.ty, &field_value, out)?;
    }
    Ok(())
}

fn encode(ty: &Type, value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match ty {
        Type::Scalar(dtype) => encode_scalar(*dtype, value, out),
        Type::Class(class) => encode_object(class, value, out),
        Type::List(_) => UnsizedSnafu { type_name: ty.c_name() }.fail(),
    }
}

/// Sequential reader over a packed buffer.
struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        ensure!(n <= self.bytes.len(), LengthMismatchSnafu { expected: n, actual: self.bytes.len() });
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn i32(&mut self) -> Result<i32> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.take(4)?);
        Ok(i32::from_le_bytes(word))
    }

    fn scalar(&mut self, dtype: ScalarDType) -> Result<Value> {
        Ok(match dtype {
            ScalarDType::Int32 => Value::Int(self.i32()?),
            ScalarDType::Float32 => Value::Float(f32::from_bits(self.i32()? as u32)),
            ScalarDType::Bool => Value::Bool(self.take(1)?[0] != 0),
        })
    }

    /// Decode one element. Class elements are written into `target` field by
    /// field so nested objects keep their identity; primitives are returned.
    fn element(&mut self, ty: &Type, target: &Value) -> Result<Value> {
        match ty {
            Type::Scalar(dtype) => self.scalar(*dtype),
            Type::Class(class) => {
                let object = target.as_object().with_context(|| TypeMismatchSnafu {
                    expected: &class.name,
                    found: target.type_name(),
                })?;
                for field in &class.fields {
                    match &field.ty {
                        Type::Scalar(dtype) => {
                            let value = self.scalar(*dtype)?;
                            object.borrow_mut().set_field(&field.name, value);
                        }
                        nested => {
                            let inner = object
                                .borrow()
                                .get_field(&field.name)
                                .context(MissingFieldSnafu { class: &class.name, field: &field.name })?;
                            self.element(nested, &inner)?;
                        }
                    }
                }
                Ok(target.clone())
            }
            Type::List(_) => UnsizedSnafu { type_name: ty.c_name() }.fail(),
        }
    }

    fn finish(&self) -> Result<()> {
        ensure!(self.bytes.is_empty(), LengthMismatchSnafu { expected: 0usize, actual: self.bytes.len() });
        Ok(())
    }
}

fn count_prefix(count: usize) -> Result<[u8; 4]> {
    let count = i32::try_from(count).ok().context(CountOverflowSnafu { count })?;
    Ok(count.to_le_bytes())
}

/// Pack a flat collection of elements of type `ty`.
pub fn pack(values: &[Value], ty: &Type) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(values.len() * size_of(ty)?);
    for value in values {
        encode(ty, value, &mut out)?;
    }
    Ok(out)
}

/// Decode `targets.len()` elements. Class elements are rebound in place and
/// returned as the same handles; primitive elements are returned decoded.
pub fn unpack(bytes: &[u8], ty: &Type, targets: &[Value]) -> Result<Vec<Value>> {
    let expected = size_of(ty)? * targets.len();
    ensure!(bytes.len() == expected, LengthMismatchSnafu { expected, actual: bytes.len() });
    let mut reader = Reader { bytes };
    targets.iter().map(|target| reader.element(ty, target)).collect()
}

/// Decode `count` elements into fresh deep copies of `prototype`.
pub fn unpack_new(bytes: &[u8], ty: &Type, prototype: &Value, count: usize) -> Result<Vec<Value>> {
    let expected = size_of(ty)? * count;
    ensure!(bytes.len() == expected, LengthMismatchSnafu { expected, actual: bytes.len() });
    let mut reader = Reader { bytes };
    (0..count).map(|_| reader.element(ty, &prototype.deep_clone())).collect()
}

/// [`pack`] behind a leading `i32` element count.
pub fn pack_prefixed(values: &[Value], ty: &Type) -> Result<Vec<u8>> {
    let mut out = count_prefix(values.len())?.to_vec();
    out.extend(pack(values, ty)?);
    Ok(out)
}

/// Inverse of [`pack_prefixed`]; the prefix must match `targets`.
pub fn unpack_prefixed(bytes: &[u8], ty: &Type, targets: &[Value]) -> Result<Vec<Value>> {
    let mut reader = Reader { bytes };
    let declared = reader.i32()?;
    ensure!(
        usize::try_from(declared).is_ok_and(|d| d == targets.len()),
        CountMismatchSnafu { declared, expected: targets.len() }
    );
    unpack(reader.bytes, ty, targets)
}

/// Rebind the items of a host list from decoded values: class items were
/// updated in place already, primitive items are replaced.
pub fn store_into_list(list: &Value, decoded: Vec<Value>) -> Result<()> {
    let items = list.as_list().with_context(|| TypeMismatchSnafu { expected: "list", found: list.type_name() })?;
    let mut items = items.borrow_mut();
    ensure!(items.len() == decoded.len(), LengthMismatchSnafu { expected: items.len(), actual: decoded.len() });
    for (slot, value) in items.iter_mut().zip(decoded) {
        if !slot.is_identical(&value) {
            *slot = value;
        }
    }
    Ok(())
}

fn list_items(value: &Value) -> Result<Vec<Value>> {
    let items = value.as_list().with_context(|| TypeMismatchSnafu { expected: "list", found: value.type_name() })?;
    Ok(items.borrow().clone())
}

/// Outer collection of equally long inner lists.
///
/// Layout: `i32` inner length, then every item outer-major, inner-minor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOfLists {
    element: Type,
    inner_length: usize,
}

impl ListOfLists {
    /// Validate `lists` and fix the inner length from the first one.
    pub fn new(element: Type, lists: &[Value]) -> Result<Self> {
        let mut inner_length = None;
        for (index, list) in lists.iter().enumerate() {
            let len = list.as_list().with_context(|| TypeMismatchSnafu { expected: "list", found: list.type_name() })?;
            let actual = len.borrow().len();
            match inner_length {
                None => inner_length = Some(actual),
                Some(expected) => ensure!(actual == expected, RaggedSnafu { index, expected, actual }),
            }
        }
        Ok(Self { element, inner_length: inner_length.unwrap_or(0) })
    }

    pub fn element(&self) -> &Type {
        &self.element
    }

    pub fn inner_length(&self) -> usize {
        self.inner_length
    }

    /// Buffer size for `outer` inner lists, including the prefix.
    pub fn size(&self, outer: usize) -> Result<usize> {
        Ok(4 + size_of(&self.element)? * self.inner_length * outer)
    }

    pub fn pack(&self, lists: &[Value]) -> Result<Vec<u8>> {
        let mut out = count_prefix(self.inner_length)?.to_vec();
        out.reserve(self.size(lists.len())?);
        for (index, list) in lists.iter().enumerate() {
            let items = list_items(list)?;
            ensure!(
                items.len() == self.inner_length,
                RaggedSnafu { index, expected: self.inner_length, actual: items.len() }
            );
            for item in &items {
                encode(&self.element, item, &mut out)?;
            }
        }
        Ok(out)
    }

    /// Write decoded items back into the same inner lists.
    pub fn unpack(&self, bytes: &[u8], lists: &[Value]) -> Result<()> {
        let expected = self.size(lists.len())?;
        ensure!(bytes.len() == expected, LengthMismatchSnafu { expected, actual: bytes.len() });
        let mut reader = Reader { bytes };
        let declared = reader.i32()?;
        ensure!(
            usize::try_from(declared).is_ok_and(|d| d == self.inner_length),
            CountMismatchSnafu { declared, expected: self.inner_length }
        );
        for list in lists {
            let items = list_items(list)?;
            let decoded = items.iter().map(|item| reader.element(&self.element, item)).collect::<Result<Vec<_>>>()?;
            store_into_list(list, decoded)?;
        }
        reader.finish()
    }
}
