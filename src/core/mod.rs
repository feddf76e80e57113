//! Core data types and models

pub mod interval;
pub mod record;
pub mod temporal;
pub mod value;

pub use interval::*;
pub use record::*;
pub use temporal::*;
pub use value::*;
