//! Host language for gpumap.
//!
//! A small dynamically typed, indentation-structured language with
//! user classes, closures and a `math` module. Programs are parsed into an
//! [`ast::Module`] and executed by the tree-walking [`Interpreter`], which
//! reports user-level calls to an installed [`CallObserver`].

pub mod ast;
pub mod builtins;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod ops;
pub mod parser;
pub mod value;


pub use error::{Error, Result};
pub use interp::{CallEvent, CallObserver, Interpreter};
pub use parser::{parse_expr, parse_module};
pub use value::{Cell, Class, Function, Object, Reflect, Value};
