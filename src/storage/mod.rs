//! Storage layer: the event journal and its table interchange format

pub mod journal;
pub mod table;

pub use journal::*;
pub use table::TableRow;
