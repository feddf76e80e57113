//! Reconstruction of entity values from the event log
//!
//! Mutation records are folded into per-entity structural versions
//! ([`ObjectState`]); a [`Builder`] turns a version into a fully resolved
//! [`Value`](crate::core::value::Value) by replacing references and
//! replaying queued collection methods.

pub mod objects;
pub mod ops;
pub mod state;

pub use objects::{BuildCache, Builder, ObjectIndex, Slot};
pub use ops::{CollectionKind, DeferredOp};
pub use state::{ObjectState, Step};
