//! Primitive scalar types understood by every gpumap layer.
//!
//! The set is deliberately closed: the structural extractor, the layout
//! generator and the codec all match on [`ScalarDType`] exhaustively, so a
//! host value that does not map onto one of these variants cannot be
//! transferred to the device.


/// Scalar data types that may appear as class fields, parameters and
/// collection elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ScalarDType {
    Bool,
    Int32,
    Float32,
}

impl ScalarDType {
    /// Width on the device and in packed buffers.
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Bool => 1,
            Self::Int32 => 4,
            Self::Float32 => 4,
        }
    }

    pub const fn c_style(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int32 => "int",
            Self::Float32 => "float",
        }
    }

    /// Name of the matching host type (`bool`, `int`, `float`).
    pub const fn host_name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int32 => "int",
            Self::Float32 => "float",
        }
    }

    /// `struct`-style format character used in packed layout descriptions.
    pub const fn format_char(&self) -> char {
        match self {
            Self::Bool => '?',
            Self::Int32 => 'i',
            Self::Float32 => 'f',
        }
    }

    pub const fn from_format_char(c: char) -> Option<Self> {
        match c {
            '?' => Some(Self::Bool),
            'i' => Some(Self::Int32),
            'f' => Some(Self::Float32),
            _ => None,
        }
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float32)
    }

    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int32)
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }

    /// Result type of a binary arithmetic expression on the device.
    ///
    /// `bool` promotes to `int`; anything mixed with `float` becomes `float`.
    pub fn promote(lhs: Self, rhs: Self) -> Self {
        if lhs.is_float() || rhs.is_float() { Self::Float32 } else { Self::Int32 }
    }
}

/// Total packed width of a format string, or `None` on an unknown character.
pub fn format_size(format: &str) -> Option<usize> {
    format.chars().map(|c| ScalarDType::from_format_char(c).map(|s| s.bytes())).sum()
}
