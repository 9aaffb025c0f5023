//! Device spellings of types, literals and library functions.

use std::borrow::Cow;

use gpumap_host::value::MathFn;
use gpumap_ir::Type;

/// How a non-primitive parameter binds its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefQualifier {
    /// `&&`: temporaries.
    Move,
    /// `&`: named values.
    Ref,
}

impl RefQualifier {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Move => "&&",
            Self::Ref => "&",
        }
    }
}

/// Number of overloads emitted for a parameter list: one per subset of its
/// non-primitive parameters.
pub fn variant_count<'a>(params: impl IntoIterator<Item = &'a Type>) -> usize {
    1 << params.into_iter().filter(|t| !t.is_primitive()).count()
}

/// Parameter declarations for overload `variant`.
///
/// Bit `j` of `variant` selects `&` for the `j`-th non-primitive parameter;
/// a clear bit selects `&&`. Primitives are always passed by value.
pub fn param_list<'a>(params: impl IntoIterator<Item = (&'a str, &'a Type)>, variant: usize) -> Vec<String> {
    let mut bit = 0;
    params
        .into_iter()
        .map(|(name, ty)| {
            let label = if ty.is_primitive() {
                ty.c_name()
            } else {
                let qualifier = if variant & (1 << bit) != 0 { RefQualifier::Ref } else { RefQualifier::Move };
                bit += 1;
                format!("{}{}", ty.c_name(), qualifier.suffix())
            };
            format!("{label} {}", ident(name))
        })
        .collect()
}

/// Device spelling of a captured name. The prefix is reserved so a capture
/// never collides with a parameter or local of the same source name.
pub fn capture_ident(name: &str) -> String {
    format!("__cap_{name}")
}

/// Captured variables: primitives by value, everything else by `&`.
pub fn capture_label(ty: &Type) -> String {
    if ty.is_primitive() { ty.c_name() } else { format!("{}&", ty.c_name()) }
}

pub fn return_label(ret: Option<&Type>) -> String {
    ret.map_or_else(|| "void".to_string(), Type::c_name)
}

/// Device floats are 32-bit, so every literal carries the `f` suffix.
pub fn float_literal(value: f64) -> String {
    let value = value as f32;
    if value.is_nan() {
        "(0.0f / 0.0f)".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "(1.0f / 0.0f)".to_string() } else { "(-1.0f / 0.0f)".to_string() }
    } else {
        format!("{value:?}f")
    }
}

pub fn string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Single-precision device function for a `math` module function.
pub fn math_function(f: MathFn) -> &'static str {
    match f {
        MathFn::Sin => "sinf",
        MathFn::Cos => "cosf",
        MathFn::Tan => "tanf",
        MathFn::Exp => "expf",
        MathFn::Ceil => "ceilf",
        MathFn::Floor => "floorf",
        MathFn::Sqrt => "sqrtf",
        MathFn::Pow => "powf",
        MathFn::Log => "logf",
        MathFn::Log10 => "log10f",
        MathFn::Log1p => "log1pf",
        MathFn::Log2 => "log2f",
        MathFn::Fabs => "fabsf",
    }
}

/// Return type of a `math` function on the host.
pub fn math_return(f: MathFn) -> Type {
    match f {
        MathFn::Ceil | MathFn::Floor => Type::INT,
        _ => Type::FLOAT,
    }
}

const RESERVED: &[&str] = &[
    "auto", "bool", "case", "char", "const", "default", "delete", "do", "double", "enum", "explicit", "extern",
    "float", "friend", "goto", "inline", "int", "long", "namespace", "new", "operator", "private", "protected",
    "public", "register", "short", "signed", "sizeof", "static", "struct", "switch", "template", "this", "throw",
    "typedef", "typename", "union", "unsigned", "using", "virtual", "void", "volatile",
];

/// Host identifier as a device identifier; C++ keywords get a trailing `_`.
pub fn ident(name: &str) -> Cow<'_, str> {
    if RESERVED.contains(&name) { Cow::Owned(format!("{name}_")) } else { Cow::Borrowed(name) }
}
