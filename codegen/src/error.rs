//! Error types for code generation.

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Host constructs with no static translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum Construct {
    #[strum(to_string = "try statement")]
    Try,
    #[strum(to_string = "raise statement")]
    Raise,
    #[strum(to_string = "assert statement")]
    Assert,
    #[strum(to_string = "del statement")]
    Delete,
    #[strum(to_string = "with statement")]
    With,
    #[strum(to_string = "global declaration")]
    Global,
    #[strum(to_string = "nonlocal declaration")]
    Nonlocal,
    #[strum(to_string = "nested function definition")]
    NestedFunction,
    #[strum(to_string = "nested class definition")]
    NestedClass,
    #[strum(to_string = "async function")]
    AsyncFunction,
    #[strum(to_string = "async for")]
    AsyncFor,
    #[strum(to_string = "async with")]
    AsyncWith,
    #[strum(to_string = "lambda")]
    Lambda,
    #[strum(to_string = "yield")]
    Yield,
    #[strum(to_string = "yield from")]
    YieldFrom,
    #[strum(to_string = "await")]
    Await,
    #[strum(to_string = "import statement")]
    Import,
    #[strum(to_string = "from-import statement")]
    ImportFrom,
    #[strum(to_string = "list literal")]
    ListLiteral,
    #[strum(to_string = "tuple literal")]
    TupleLiteral,
    #[strum(to_string = "set literal")]
    SetLiteral,
    #[strum(to_string = "dict literal")]
    DictLiteral,
    #[strum(to_string = "list comprehension")]
    ListComprehension,
    #[strum(to_string = "set comprehension")]
    SetComprehension,
    #[strum(to_string = "dict comprehension")]
    DictComprehension,
    #[strum(to_string = "generator expression")]
    GeneratorExpression,
    #[strum(to_string = "multiple assignment")]
    MultipleAssignment,
    #[strum(to_string = "unpacking assignment")]
    UnpackingAssignment,
    #[strum(to_string = "'is' test")]
    Is,
    #[strum(to_string = "'is not' test")]
    IsNot,
    #[strum(to_string = "'in' test")]
    In,
    #[strum(to_string = "'not in' test")]
    NotIn,
    #[strum(to_string = "starred argument")]
    StarredArgument,
    #[strum(to_string = "keyword argument")]
    KeywordArgument,
    #[strum(to_string = "slice")]
    Slice,
    #[strum(to_string = "matrix multiplication")]
    MatrixMultiplication,
    #[strum(to_string = "ellipsis")]
    Ellipsis,
    #[strum(to_string = "bytes literal")]
    BytesLiteral,
    #[strum(to_string = "None value")]
    NoneLiteral,
    #[strum(to_string = "loop else clause")]
    LoopElse,
    #[strum(to_string = "list method call")]
    ListMethod,
    #[strum(to_string = "function reference")]
    FunctionReference,
    #[strum(to_string = "range() outside a for loop")]
    RangeValue,
}

/// Translation failures. Translation stops at the first one and produces no
/// partial output.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("cannot translate {construct} in '{function}'"))]
    Unsupported { construct: Construct, function: String },

    /// Fields must be established by the constructor before methods assign them.
    #[snafu(display("'{class}' has no field '{field}'; fields must be set in the constructor"))]
    UndeclaredField { class: String, field: String },

    #[snafu(display("captured variable '{name}' cannot be assigned in '{function}'"))]
    CapturedAssignment { name: String, function: String },

    #[snafu(display("cannot iterate over '{iterable}' in '{function}': only range() and list variables"))]
    UnknownIterable { iterable: String, function: String },

    #[snafu(display("unknown name '{name}' in '{function}'"))]
    UnknownName { name: String, function: String },

    /// A callee that never ran during tracing has no signature.
    #[snafu(display("'{name}' is called from '{function}' but was never called during tracing"))]
    Untraced { name: String, function: String },

    #[snafu(display("wrong number of arguments to '{callee}' in '{function}'"))]
    Arity { callee: String, function: String },

    #[snafu(display("'{class}' has no traced method '{method}'"))]
    UnknownMethod { class: String, method: String },

    #[snafu(display("entry function '{name}' is not in the registry"))]
    MissingEntry { name: String },

    #[snafu(display("entry function '{name}' cannot be launched: {reason}"))]
    InvalidEntry { name: String, reason: String },
}
