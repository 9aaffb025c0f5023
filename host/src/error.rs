//! Error types for parsing and evaluating host programs.

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Malformed source text.
    #[snafu(display("syntax error at line {line}: {message}"))]
    Syntax { line: usize, message: String },

    #[snafu(display("name '{name}' is not defined"))]
    UndefinedName { name: String },

    #[snafu(display("'{type_name}' object has no attribute '{attr}'"))]
    NoAttribute { type_name: String, attr: String },

    #[snafu(display("type error: {reason}"))]
    Type { reason: String },

    #[snafu(display("{callee}() takes {expected} arguments but {actual} were given"))]
    Arity { callee: String, expected: usize, actual: usize },

    #[snafu(display("index {index} out of range for list of length {length}"))]
    IndexOutOfRange { index: i64, length: usize },

    #[snafu(display("division by zero"))]
    DivisionByZero,

    /// Parsed but not executable by the interpreter.
    #[snafu(display("unsupported construct: {construct}"))]
    Unsupported { construct: String },

    #[snafu(display("'{keyword}' outside loop"))]
    OutsideLoop { keyword: String },

    #[snafu(display("maximum recursion depth {limit} exceeded"))]
    RecursionLimit { limit: usize },
}
