//! Indexes derived from the event log

pub mod scope;

pub use scope::{Activation, NameScope, Resolution, ScopeIndex};
