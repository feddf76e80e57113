//! Restricted expression language used by `Raw` selectors
//!
//! A Python-flavoured subset: literals and displays, names with an optional
//! `@line` scope qualifier, attribute access, indexing and slicing, a fixed
//! set of builtins and value methods, arithmetic, chained comparisons,
//! boolean operators, conditionals and list comprehensions.

pub mod ast;
pub mod interp;
pub mod lexer;
pub mod parser;

pub use ast::Expr;
pub use interp::{evaluate, Bindings, EvalError};
pub use parser::parse_expression;
