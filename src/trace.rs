//! Frozen view of a recorded run
//!
//! A [`Trace`] is built from a snapshot of the archive and never changes
//! afterwards. It owns every derived structure (object versions, name
//! scopes and the build and operator caches), so dropping it discards all
//! of them at once.

use crate::core::interval::IntervalStore;
use crate::core::record::FieldKey;
use crate::core::temporal::{LogicalTime, TimeRange};
use crate::core::value::{EntityId, Value};
use crate::index::{Resolution, ScopeIndex};
use crate::query::executor::EvalCache;
use crate::reconstruct::{BuildCache, Builder, ObjectIndex, Slot};
use crate::storage::{EventJournal, InMemoryJournal};

pub struct Trace {
    journal: InMemoryJournal,
    objects: ObjectIndex,
    scopes: ScopeIndex,
    builds: BuildCache,
    evals: EvalCache,
    version: u64,
    max_build_depth: usize,
}

impl Trace {
    /// Index a journal snapshot taken at archive version `version`
    pub fn new(version: u64, journal: InMemoryJournal, max_build_depth: usize) -> Self {
        let objects = ObjectIndex::from_records(journal.records());
        let scopes = ScopeIndex::from_records(journal.records());
        tracing::debug!(
            version,
            records = journal.len(),
            entities = objects.entity_count(),
            "trace rebuilt"
        );
        Self {
            journal,
            objects,
            scopes,
            builds: BuildCache::new(),
            evals: EvalCache::new(),
            version,
            max_build_depth,
        }
    }

    pub fn journal(&self) -> &InMemoryJournal {
        &self.journal
    }

    pub fn objects(&self) -> &ObjectIndex {
        &self.objects
    }

    pub fn scopes(&self) -> &ScopeIndex {
        &self.scopes
    }

    pub fn evals(&self) -> &EvalCache {
        &self.evals
    }

    /// Archive version this trace was built from
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn builder(&self) -> Builder<'_> {
        Builder::new(&self.objects, &self.builds, self.max_build_depth)
    }

    /// Fully built value of `entity` at `t`
    pub fn build(&self, entity: EntityId, t: LogicalTime) -> Option<Value> {
        self.builder().build(entity, t)
    }

    pub fn resolve_name(&self, name: &str, line: Option<u32>, t: LogicalTime) -> Option<Resolution> {
        self.scopes.resolve(name, line, t, &self.objects)
    }

    /// Fully built value of variable `name` as seen from `line` at `t`
    pub fn build_name(&self, name: &str, line: Option<u32>, t: LogicalTime) -> Option<Value> {
        let resolution = self.resolve_name(name, line, t)?;
        Some(self.builder().resolve(&resolution.value, t))
    }

    pub fn lifetime(&self, entity: EntityId) -> Option<TimeRange> {
        self.objects.lifetime(entity)
    }

    pub fn field_history(&self, entity: EntityId, field: &FieldKey) -> Option<&IntervalStore<Slot>> {
        self.objects.field_history(entity, field)
    }

    /// Times covered by the recording
    pub fn span(&self) -> Option<TimeRange> {
        Some(TimeRange::new(self.journal.first_time()?, self.journal.last_time()?))
    }

    /// Query window clamped to the recording; `None` when they do not meet
    pub fn window(&self, start: Option<LogicalTime>, end: Option<LogicalTime>) -> Option<TimeRange> {
        let span = self.span()?;
        let first = start.unwrap_or(span.first).max(span.first);
        let last = end.unwrap_or(span.last).min(span.last);
        (first <= last).then(|| TimeRange::new(first, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{EventKind, Record};

    fn trace() -> Trace {
        let mut journal = InMemoryJournal::new();
        let drafts = vec![
            Record::builder(1, FieldKey::name("x"), EventKind::Var).value(1),
            Record::builder(1, FieldKey::name("xs"), EventKind::Var)
                .value_type("list")
                .value(Value::Ref(2)),
            Record::builder(2, FieldKey::Index(0), EventKind::ListItem).value(4),
            Record::builder(1, FieldKey::name("x"), EventKind::Var).value(2),
        ];
        for (t, draft) in drafts.into_iter().enumerate() {
            journal.append(draft.into_record(t as LogicalTime, 0)).unwrap();
        }
        Trace::new(1, journal, 32)
    }

    #[test]
    fn test_build_name_resolves_references() {
        let trace = trace();
        assert_eq!(trace.build_name("x", None, 2), Some(Value::Int(1)));
        assert_eq!(trace.build_name("x", None, 3), Some(Value::Int(2)));
        assert_eq!(trace.build_name("xs", None, 1), Some(Value::List(vec![])));
        assert_eq!(
            trace.build_name("xs", None, 3),
            Some(Value::List(vec![Value::Int(4)]))
        );
        assert_eq!(trace.build_name("missing", None, 3), None);
    }

    #[test]
    fn test_window_is_clamped() {
        let trace = trace();
        assert_eq!(trace.span(), Some(TimeRange::new(0, 3)));
        assert_eq!(trace.window(None, Some(10)), Some(TimeRange::new(0, 3)));
        assert_eq!(trace.window(Some(2), None), Some(TimeRange::new(2, 3)));
        assert_eq!(trace.window(Some(5), None), None);
    }

    #[test]
    fn test_lifetime() {
        let trace = trace();
        assert_eq!(trace.lifetime(1), Some(TimeRange::new(0, 3)));
        assert_eq!(trace.lifetime(2), Some(TimeRange::instant(2)));
        assert_eq!(trace.lifetime(9), None);
    }
}
