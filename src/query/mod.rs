//! Temporal query engine: operators, their evaluation and the query front-end

pub mod align;
pub mod executor;
pub mod loops;
pub mod operator;
pub mod optimizer;
pub mod parser;
pub mod result;
pub mod temporal;

pub use executor::{EvalCache, Evaluator};
pub use operator::{Arity, Operator, OperatorKind};
pub use optimizer::optimize;
pub use parser::{parse_operator, parse_select, SelectItem};
pub use result::{EvalResult, EvalResultEntry, Replacement};
