//! Structural snapshots of entities

use crate::core::record::{EventKind, FieldKey, Record};
use crate::core::temporal::LogicalTime;
use crate::core::value::Value;
use crate::reconstruct::ops::{self, CollectionKind, DeferredOp};
use std::sync::Arc;

/// Fewest steps replayed between two checkpoints of a history
const MIN_CHECKPOINT_GAP: usize = 16;

/// A write or method call queued behind a deferred operation
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Write {
        kind: EventKind,
        field: FieldKey,
        value: Value,
    },
    Deferred(DeferredOp),
}

/// One version of an entity's structure
///
/// `base` may contain `Ref`s. Once a deferred operation is queued, every
/// later step for the entity is queued behind it so replay keeps record
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectState {
    pub kind: CollectionKind,
    pub base: Value,
    pub pending: Vec<Step>,
    /// Return value of a call, visible only in the version the call created
    pub transient: Option<(String, Value)>,
}

impl ObjectState {
    /// Empty state for an entity first seen through `record`
    pub fn initial(record: &Record) -> Self {
        let kind = match record.kind {
            EventKind::BuiltinManip => DeferredOp::parse(&record.extra, Value::None)
                .map(|op| op.collection)
                .unwrap_or(CollectionKind::Namespace),
            other => CollectionKind::for_event(other).unwrap_or(CollectionKind::Namespace),
        };
        Self {
            kind,
            base: kind.empty(""),
            pending: Vec::new(),
            transient: None,
        }
    }

    /// Advance this state past `record`
    pub fn apply(&mut self, record: &Record) {
        self.transient = None;

        match record.kind {
            EventKind::FunctionCall => {
                let name = match &record.field {
                    FieldKey::Name(name) => name.clone(),
                    other => other.to_string(),
                };
                self.transient = Some((name, record.value.clone()));
            }
            EventKind::BuiltinManip => match DeferredOp::parse(&record.extra, record.value.clone()) {
                Some(op) if self.pending.is_empty() && self.settles(&op) => {
                    let argument = op.argument.clone();
                    if let Err(e) = ops::apply_deferred(&op, &mut self.base, argument) {
                        tracing::warn!(time = record.time, error = %e, "skipped builtin manipulation");
                    }
                }
                Some(op) => self.pending.push(Step::Deferred(op)),
                None => tracing::warn!(
                    time = record.time,
                    extra = %record.extra,
                    "unrecognized builtin manipulation"
                ),
            },
            kind => {
                let step = Step::Write {
                    kind,
                    field: record.field.clone(),
                    value: record.value.clone(),
                };
                if self.pending.is_empty() {
                    self.write(step);
                } else {
                    self.pending.push(step);
                }
            }
        }
    }

    // A call whose outcome cannot depend on what a `Ref` resolves to is
    // applied straight to `base`.
    fn settles(&self, op: &DeferredOp) -> bool {
        op.is_positional() || !(op.argument.has_refs() || self.base.has_refs())
    }

    fn write(&mut self, step: Step) {
        if let Step::Write { kind, field, value } = step {
            if let Err(e) = ops::write_value(&mut self.base, kind, &field, value) {
                tracing::warn!(error = %e, "skipped structural write");
            }
        }
    }

    /// Rough cost of cloning this state
    fn weight(&self) -> usize {
        let elements = match &self.base {
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => items.len(),
            Value::Dict(entries) => entries.len(),
            Value::Object { fields, .. } => fields.len(),
            _ => 1,
        };
        elements + self.pending.len()
    }
}

/// Every version of one entity
///
/// Holds the entity's mutation records plus snapshots taken after some of
/// them. A snapshot is only taken once at least as many records as the
/// state's weight have passed since the previous one, so snapshots use
/// memory linear in the number of records and reaching any version replays
/// at most that many records.
#[derive(Debug, Default)]
pub struct StateHistory {
    records: Vec<Arc<Record>>,
    /// `(i, state after records[..=i])`
    checkpoints: Vec<(usize, Arc<ObjectState>)>,
    current: Option<ObjectState>,
    since_checkpoint: usize,
}

impl StateHistory {
    /// Append the next mutation record (in time order)
    pub fn push(&mut self, record: Arc<Record>) {
        let state = self
            .current
            .get_or_insert_with(|| ObjectState::initial(&record));
        state.apply(&record);
        self.records.push(record);
        self.since_checkpoint += 1;

        if self.checkpoints.is_empty()
            || self.since_checkpoint >= state.weight().max(MIN_CHECKPOINT_GAP)
        {
            self.checkpoints
                .push((self.records.len() - 1, Arc::new(state.clone())));
            self.since_checkpoint = 0;
        }
    }

    /// State after every record at or before `t`; `None` before the first
    pub fn state_at(&self, t: LogicalTime) -> Option<ObjectState> {
        let last = self.records.partition_point(|r| r.time <= t).checked_sub(1)?;
        let at = self.checkpoints.partition_point(|(i, _)| *i <= last) - 1;
        let (from, snapshot) = &self.checkpoints[at];
        let mut state = ObjectState::clone(snapshot);
        for record in &self.records[from + 1..=last] {
            state.apply(record);
        }
        Some(state)
    }
}
