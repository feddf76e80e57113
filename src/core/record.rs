//! Records: immutable entries of the event log

use crate::core::temporal::LogicalTime;
use crate::core::value::{EntityId, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a recorded event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Variable or attribute assignment
    Var,
    /// Dictionary item assignment
    DictItem,
    /// List item assignment or append
    ListItem,
    /// Set insertion
    SetItem,
    /// Tuple element construction
    TupleItem,
    /// Mutating method call on a built-in collection
    BuiltinManip,
    /// Function call with its return value
    FunctionCall,
    ScopeEnter,
    ScopeExit,
    LoopStart,
    LoopIter,
    LoopEnd,
    Break,
    Print,
}

impl EventKind {
    /// Every kind, in declaration order
    pub const ALL: [EventKind; 14] = [
        EventKind::Var,
        EventKind::DictItem,
        EventKind::ListItem,
        EventKind::SetItem,
        EventKind::TupleItem,
        EventKind::BuiltinManip,
        EventKind::FunctionCall,
        EventKind::ScopeEnter,
        EventKind::ScopeExit,
        EventKind::LoopStart,
        EventKind::LoopIter,
        EventKind::LoopEnd,
        EventKind::Break,
        EventKind::Print,
    ];

    /// Kinds that change the structural state of an entity
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            EventKind::Var
                | EventKind::DictItem
                | EventKind::ListItem
                | EventKind::SetItem
                | EventKind::TupleItem
                | EventKind::BuiltinManip
                | EventKind::FunctionCall
        )
    }

    /// Name used in the export table
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Var => "VAR",
            EventKind::DictItem => "DICT_ITEM",
            EventKind::ListItem => "LIST_ITEM",
            EventKind::SetItem => "SET_ITEM",
            EventKind::TupleItem => "TUPLE_ITEM",
            EventKind::BuiltinManip => "BUILTIN_MANIP",
            EventKind::FunctionCall => "FUNCTION_CALL",
            EventKind::ScopeEnter => "SCOPE_ENTER",
            EventKind::ScopeExit => "SCOPE_EXIT",
            EventKind::LoopStart => "LOOP_START",
            EventKind::LoopIter => "LOOP_ITER",
            EventKind::LoopEnd => "LOOP_END",
            EventKind::Break => "BREAK",
            EventKind::Print => "PRINT",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slot of an entity that a record writes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKey {
    /// Variable or attribute name
    Name(String),
    /// Sequence index
    Index(i64),
    /// Mapping key
    Key(Value),
}

impl FieldKey {
    pub fn name(name: impl Into<String>) -> Self {
        FieldKey::Name(name.into())
    }

    /// The name, if this is a named field
    pub fn as_name(&self) -> Option<&str> {
        match self {
            FieldKey::Name(name) => Some(name),
            _ => None,
        }
    }

    /// The key as a value, for use as a dictionary key
    pub fn to_value(&self) -> Value {
        match self {
            FieldKey::Name(name) => Value::Str(name.clone()),
            FieldKey::Index(i) => Value::Int(*i),
            FieldKey::Key(v) => v.clone(),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKey::Name(name) => f.write_str(name),
            FieldKey::Index(i) => write!(f, "[{i}]"),
            FieldKey::Key(v) => write!(f, "[{v}]"),
        }
    }
}

/// A recorded mutation or control event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Entity the event applies to
    pub entity: EntityId,
    /// Slot written
    pub field: FieldKey,
    /// Event kind
    pub kind: EventKind,
    /// Declared type name of `value`
    pub value_type: String,
    /// Written value, argument or return value
    pub value: Value,
    /// Source expression that produced the event
    pub expression: String,
    /// Source line
    pub line: u32,
    /// Logical time assigned at store
    pub time: LogicalTime,
    /// Kind-specific annotation (method name, scope span, ...)
    pub extra: String,
    /// Version number within the (entity, field) sequence
    pub record_id: u64,
}

impl Record {
    /// Start describing a record; time and record id are assigned at store
    pub fn builder(entity: EntityId, field: FieldKey, kind: EventKind) -> RecordDraft {
        RecordDraft {
            entity,
            field,
            kind,
            value_type: String::new(),
            value: Value::None,
            expression: String::new(),
            line: 0,
            extra: String::new(),
        }
    }

    /// Key of the per-slot sequence this record belongs to
    pub fn key(&self) -> (EntityId, FieldKey) {
        (self.entity, self.field.clone())
    }
}

/// A record that has not been assigned a time yet
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub entity: EntityId,
    pub field: FieldKey,
    pub kind: EventKind,
    pub value_type: String,
    pub value: Value,
    pub expression: String,
    pub line: u32,
    pub extra: String,
}

impl RecordDraft {
    /// Set value, deriving the declared type from it when none is set
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        if self.value_type.is_empty() {
            self.value_type = self.value.type_name().to_string();
        }
        self
    }

    /// Set declared type
    pub fn value_type(mut self, value_type: impl Into<String>) -> Self {
        self.value_type = value_type.into();
        self
    }

    /// Set source expression
    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = expression.into();
        self
    }

    /// Set source line
    pub fn line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    /// Set kind-specific annotation
    pub fn extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = extra.into();
        self
    }

    /// Finalize with the time and version assigned by the journal
    pub fn into_record(self, time: LogicalTime, record_id: u64) -> Record {
        Record {
            entity: self.entity,
            field: self.field,
            kind: self.kind,
            value_type: self.value_type,
            value: self.value,
            expression: self.expression,
            line: self.line,
            time,
            extra: self.extra,
            record_id,
        }
    }
}
