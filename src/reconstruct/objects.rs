//! Per-entity version history and value building

use crate::core::interval::IntervalStore;
use crate::core::record::{EventKind, FieldKey, Record};
use crate::core::temporal::{LogicalTime, TimeRange};
use crate::core::value::{EntityId, Value};
use crate::reconstruct::ops::{self, CollectionKind};
use crate::reconstruct::state::{ObjectState, StateHistory, Step};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One version of a single field
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub value: Value,
    pub value_type: String,
}

/// Structural history of every entity in a trace
#[derive(Debug, Default)]
pub struct ObjectIndex {
    states: HashMap<EntityId, StateHistory>,
    fields: HashMap<(EntityId, FieldKey), IntervalStore<Slot>>,
    classes: HashMap<EntityId, String>,
    referenced: HashSet<EntityId>,
    lifetimes: HashMap<EntityId, TimeRange>,
}

impl ObjectIndex {
    /// Replay mutation records (in time order) into version histories
    pub fn from_records(records: &[Arc<Record>]) -> Self {
        let mut index = Self::default();

        for record in records {
            index
                .lifetimes
                .entry(record.entity)
                .and_modify(|range| range.last = record.time)
                .or_insert_with(|| TimeRange::instant(record.time));

            if !record.kind.is_mutation() {
                continue;
            }

            if let Value::Ref(target) = record.value {
                index.referenced.insert(target);
                if !record.value_type.is_empty() && record.value_type != "ref" {
                    index.classes.insert(target, record.value_type.clone());
                }
            }

            index
                .states
                .entry(record.entity)
                .or_default()
                .push(Arc::clone(record));

            if record.kind != EventKind::BuiltinManip {
                index
                    .fields
                    .entry(record.key())
                    .or_default()
                    .set(
                        record.time,
                        Slot {
                            value: record.value.clone(),
                            value_type: record.value_type.clone(),
                        },
                    );
            }
        }

        tracing::debug!(
            entities = index.states.len(),
            fields = index.fields.len(),
            "built object index"
        );
        index
    }

    /// Structural state of `entity` at `t`
    pub fn state_at(&self, entity: EntityId, t: LogicalTime) -> Option<ObjectState> {
        self.states.get(&entity)?.state_at(t)
    }

    /// History of one field
    pub fn field_history(&self, entity: EntityId, field: &FieldKey) -> Option<&IntervalStore<Slot>> {
        self.fields.get(&(entity, field.clone()))
    }

    /// Declared class of `entity`, learnt from references to it
    pub fn class_of(&self, entity: EntityId) -> Option<&str> {
        self.classes.get(&entity).map(String::as_str)
    }

    /// True if some record holds a reference to `entity`
    pub fn is_referenced(&self, entity: EntityId) -> bool {
        self.referenced.contains(&entity)
    }

    /// First and last record touching `entity`
    pub fn lifetime(&self, entity: EntityId) -> Option<TimeRange> {
        self.lifetimes.get(&entity).copied()
    }

    pub fn entity_count(&self) -> usize {
        self.states.len()
    }

    /// Value an entity has when referenced but never mutated
    pub fn empty_of(&self, entity: EntityId) -> Value {
        let class = self.class_of(entity).unwrap_or("object");
        CollectionKind::from_type_name(class).empty(class)
    }
}

/// Memo of built values per (entity, time)
///
/// Writes are insert-if-absent: a key always rebuilds to the same value, so
/// concurrent population is harmless.
#[derive(Debug, Default)]
pub struct BuildCache {
    built: DashMap<(EntityId, LogicalTime), Value>,
}

impl BuildCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity: EntityId, t: LogicalTime) -> Option<Value> {
        self.built.get(&(entity, t)).map(|v| v.value().clone())
    }

    pub fn insert(&self, entity: EntityId, t: LogicalTime, value: Value) {
        self.built.entry((entity, t)).or_insert(value);
    }

    pub fn len(&self) -> usize {
        self.built.len()
    }

    pub fn is_empty(&self) -> bool {
        self.built.is_empty()
    }
}

/// Builds fully resolved values from an [`ObjectIndex`]
pub struct Builder<'a> {
    index: &'a ObjectIndex,
    cache: &'a BuildCache,
    max_depth: usize,
}

impl<'a> Builder<'a> {
    pub fn new(index: &'a ObjectIndex, cache: &'a BuildCache, max_depth: usize) -> Self {
        Self {
            index,
            cache,
            max_depth,
        }
    }

    /// Value of `entity` at `t`; `None` if `t` precedes its first version
    pub fn build(&self, entity: EntityId, t: LogicalTime) -> Option<Value> {
        let mut stack = Vec::new();
        self.build_inner(entity, t, &mut stack).map(|(value, _)| value)
    }

    /// Replace every `Ref` reachable from `value` by its built value at `t`
    pub fn resolve(&self, value: &Value, t: LogicalTime) -> Value {
        let mut stack = Vec::new();
        let mut cut = false;
        self.resolve_inner(value, t, &mut stack, &mut cut)
    }

    // Returns the value and whether a cycle was cut while building it.
    fn build_inner(
        &self,
        entity: EntityId,
        t: LogicalTime,
        stack: &mut Vec<EntityId>,
    ) -> Option<(Value, bool)> {
        if let Some(value) = self.cache.get(entity, t) {
            return Some((value, false));
        }
        let state = self.index.state_at(entity, t)?;

        stack.push(entity);
        let (value, cut) = self.materialize(entity, &state, t, stack);
        stack.pop();

        if !cut {
            self.cache.insert(entity, t, value.clone());
        }
        Some((value, cut))
    }

    fn materialize(
        &self,
        entity: EntityId,
        state: &ObjectState,
        t: LogicalTime,
        stack: &mut Vec<EntityId>,
    ) -> (Value, bool) {
        let mut cut = false;
        let mut value = self.resolve_inner(&state.base, t, stack, &mut cut);
        if let Value::Object { class, .. } = &mut value {
            *class = self.index.class_of(entity).unwrap_or("object").to_string();
        }

        for step in &state.pending {
            let outcome = match step {
                Step::Write { kind, field, value: written } => {
                    let written = self.resolve_inner(written, t, stack, &mut cut);
                    ops::write_value(&mut value, *kind, field, written)
                }
                Step::Deferred(op) => {
                    let argument = self.resolve_inner(&op.argument, t, stack, &mut cut);
                    ops::apply_deferred(op, &mut value, argument)
                }
            };
            if let Err(e) = outcome {
                tracing::debug!(entity, t, error = %e, "skipped replayed step");
            }
        }

        if let Some((name, returned)) = &state.transient {
            let returned = self.resolve_inner(returned, t, stack, &mut cut);
            if let Value::Object { fields, .. } = &mut value {
                fields.push((format!("{name}()"), returned));
            }
        }
        (value, cut)
    }

    fn resolve_inner(
        &self,
        value: &Value,
        t: LogicalTime,
        stack: &mut Vec<EntityId>,
        cut: &mut bool,
    ) -> Value {
        match value {
            Value::Ref(id) => {
                if stack.contains(id) || stack.len() >= self.max_depth {
                    *cut = true;
                    return Value::Ref(*id);
                }
                match self.build_inner(*id, t, stack) {
                    Some((built, inner_cut)) => {
                        *cut |= inner_cut;
                        built
                    }
                    None => self.index.empty_of(*id),
                }
            }
            Value::List(items) => Value::List(self.resolve_all(items, t, stack, cut)),
            Value::Tuple(items) => Value::Tuple(self.resolve_all(items, t, stack, cut)),
            Value::Set(items) => Value::Set(self.resolve_all(items, t, stack, cut)),
            Value::Dict(entries) => Value::Dict(
                entries
                    .iter()
                    .map(|(k, v)| {
                        (
                            self.resolve_inner(k, t, stack, cut),
                            self.resolve_inner(v, t, stack, cut),
                        )
                    })
                    .collect(),
            ),
            Value::Object { class, fields } => Value::Object {
                class: class.clone(),
                fields: fields
                    .iter()
                    .map(|(name, v)| (name.clone(), self.resolve_inner(v, t, stack, cut)))
                    .collect(),
            },
            other => other.clone(),
        }
    }

    fn resolve_all(
        &self,
        items: &[Value],
        t: LogicalTime,
        stack: &mut Vec<EntityId>,
        cut: &mut bool,
    ) -> Vec<Value> {
        items
            .iter()
            .map(|item| self.resolve_inner(item, t, stack, cut))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Trace {
        records: Vec<Arc<Record>>,
    }

    impl Trace {
        fn new() -> Self {
            Self { records: Vec::new() }
        }

        fn push(&mut self, draft: crate::core::record::RecordDraft) -> LogicalTime {
            let t = self.records.len() as LogicalTime;
            self.records.push(Arc::new(draft.into_record(t, 0)));
            t
        }

        fn var(&mut self, frame: EntityId, name: &str, value: Value) -> LogicalTime {
            let draft = Record::builder(frame, FieldKey::name(name), EventKind::Var).value(value);
            self.push(draft)
        }
    }

    fn build(index: &ObjectIndex, entity: EntityId, t: LogicalTime) -> Option<Value> {
        let cache = BuildCache::new();
        Builder::new(index, &cache, 64).build(entity, t)
    }

    fn field(value: &Value, name: &str) -> Option<Value> {
        match value {
            Value::Object { fields, .. } => fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    #[test]
    fn test_var_versions_coalesce() {
        let mut trace = Trace::new();
        trace.var(1, "x", Value::Int(1));
        trace.var(1, "x", Value::Int(2));
        trace.var(1, "x", Value::Int(2));
        trace.var(1, "x", Value::Int(3));
        let index = ObjectIndex::from_records(&trace.records);

        let history = index.field_history(1, &FieldKey::name("x")).unwrap();
        let ranges: Vec<_> = history.ranges().map(|(r, s)| (r, s.value.clone())).collect();
        assert_eq!(
            ranges,
            vec![
                (TimeRange::new(0, 0), Value::Int(1)),
                (TimeRange::new(1, 2), Value::Int(2)),
                (TimeRange::new(3, 3), Value::Int(3)),
            ]
        );
        assert_eq!(field(&build(&index, 1, 2).unwrap(), "x"), Some(Value::Int(2)));
        assert_eq!(field(&build(&index, 1, 10).unwrap(), "x"), Some(Value::Int(3)));
    }

    #[test]
    fn test_nested_reference_resolves_at_same_time() {
        let mut trace = Trace::new();
        let point = Record::builder(1, FieldKey::name("p"), EventKind::Var)
            .value_type("Point")
            .value(Value::Ref(7));
        trace.push(point);
        trace.var(7, "x", Value::Int(1));
        trace.var(7, "x", Value::Int(5));
        let index = ObjectIndex::from_records(&trace.records);

        let at_0 = build(&index, 1, 0).unwrap();
        assert_eq!(
            field(&at_0, "p"),
            Some(Value::Object {
                class: "Point".to_string(),
                fields: vec![]
            })
        );
        let at_2 = build(&index, 1, 2).unwrap();
        let p = field(&at_2, "p").unwrap();
        assert_eq!(field(&p, "x"), Some(Value::Int(5)));
        assert_eq!(p.type_name(), "Point");
    }

    #[test]
    fn test_list_item_append_and_replace() {
        let mut trace = Trace::new();
        let item = |i: i64, v: i64| {
            Record::builder(3, FieldKey::Index(i), EventKind::ListItem).value(v)
        };
        trace.push(item(0, 10));
        trace.push(item(1, 20));
        trace.push(item(0, 99));
        trace.push(item(7, 30));
        let index = ObjectIndex::from_records(&trace.records);

        assert_eq!(
            build(&index, 3, 1),
            Some(Value::List(vec![Value::Int(10), Value::Int(20)]))
        );
        assert_eq!(
            build(&index, 3, 3),
            Some(Value::List(vec![Value::Int(99), Value::Int(20), Value::Int(30)]))
        );
        assert_eq!(build(&index, 99, 3), None);
    }

    #[test]
    fn test_deferred_argument_resolved_at_build_time() {
        let mut trace = Trace::new();
        // items = [] ; items.append(obj) ; obj.v = 1 ; obj.v = 2
        trace.push(
            Record::builder(1, FieldKey::name("items"), EventKind::Var)
                .value_type("list")
                .value(Value::Ref(2)),
        );
        trace.push(
            Record::builder(2, FieldKey::name("append"), EventKind::BuiltinManip)
                .value_type("Obj")
                .value(Value::Ref(3))
                .extra("list.append"),
        );
        trace.var(3, "v", Value::Int(1));
        trace.var(3, "v", Value::Int(2));
        let index = ObjectIndex::from_records(&trace.records);

        assert_eq!(build(&index, 2, 0), None);
        let list_at = |t| build(&index, 2, t).unwrap();
        match list_at(3) {
            Value::List(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(field(&items[0], "v"), Some(Value::Int(2)));
            }
            other => panic!("expected list, got {other}"),
        }
        match list_at(2) {
            Value::List(items) => assert_eq!(field(&items[0], "v"), Some(Value::Int(1))),
            other => panic!("expected list, got {other}"),
        }
    }

    #[test]
    fn test_cycles_are_cut() {
        let mut trace = Trace::new();
        trace.var(1, "other", Value::Ref(2));
        trace.var(2, "other", Value::Ref(1));
        let index = ObjectIndex::from_records(&trace.records);
        let cache = BuildCache::new();
        let builder = Builder::new(&index, &cache, 64);

        let a = builder.build(1, 1).unwrap();
        let b = field(&a, "other").unwrap();
        assert_eq!(field(&b, "other"), Some(Value::Ref(1)));
        // Cut values are not memoized.
        assert!(cache.get(1, 1).is_none());
        assert_eq!(builder.build(1, 1), Some(a));
    }

    #[test]
    fn test_function_call_visible_once() {
        let mut trace = Trace::new();
        trace.push(
            Record::builder(1, FieldKey::name("compute"), EventKind::FunctionCall).value(42),
        );
        trace.var(1, "y", Value::Int(42));
        let index = ObjectIndex::from_records(&trace.records);

        assert_eq!(field(&build(&index, 1, 0).unwrap(), "compute()"), Some(Value::Int(42)));
        assert_eq!(field(&build(&index, 1, 1).unwrap(), "compute()"), None);
    }

    #[test]
    fn test_lifetime_and_memoization() {
        let mut trace = Trace::new();
        trace.var(4, "a", Value::Int(1));
        trace.var(5, "b", Value::Int(1));
        trace.var(4, "a", Value::Int(2));
        let index = ObjectIndex::from_records(&trace.records);
        assert_eq!(index.lifetime(4), Some(TimeRange::new(0, 2)));
        assert_eq!(index.lifetime(5), Some(TimeRange::instant(1)));

        let cache = BuildCache::new();
        let builder = Builder::new(&index, &cache, 64);
        let first = builder.build(4, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(builder.build(4, 1), first);
    }
}
