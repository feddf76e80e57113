//! Timetravel-DB: recording archive for time-travel debugging
//!
//! An instrumented program reports every variable assignment, container
//! mutation and scope change as a [`Record`](core::Record). The archive
//! stamps each record with a logical time; queries then reconstruct any
//! object or variable as it was at any instant and evaluate temporal
//! operators over the whole run.
//!
//! # Core Concepts
//!
//! - **Records**: Immutable events, totally ordered by logical time
//! - **Reconstruction**: Object states rebuilt from versioned intervals
//! - **Scopes**: Variable names resolved to the frame that held them
//! - **Operators**: Boolean, temporal and data operators over a time window
//!
//! # Example
//!
//! ```no_run
//! use timetravel_db::prelude::*;
//!
//! # fn example() -> timetravel_db::error::Result<()> {
//! let db = TraceDB::in_memory()?;
//!
//! db.store(Record::builder(1, FieldKey::name("a"), EventKind::Var).value(1).line(3));
//! db.store(Record::builder(1, FieldKey::name("b"), EventKind::Var).value(5).line(4));
//!
//! let doc = db.query("Until(a > 0, b == 5)", None, None, None);
//! println!("{doc}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod expr;
pub mod index;
pub mod query;
pub mod reconstruct;
pub mod storage;
pub mod trace;

/// Main database type
pub mod db;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::core::*;
    pub use crate::db::TraceDB;
    pub use crate::error::{Error, Result};
    pub use crate::query::{EvalResult, Operator};
    pub use crate::storage::*;
}
