//! Name resolution: which frame held a variable at a line and time

use crate::core::record::{EventKind, FieldKey, Record};
use crate::core::temporal::LogicalTime;
use crate::core::value::{EntityId, Value};
use crate::reconstruct::ObjectIndex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// One execution of a function body in a frame
#[derive(Debug, Clone, PartialEq)]
pub struct Activation {
    pub function: String,
    /// Source lines of the body, when the instrumentation reported them
    pub span: Option<(u32, u32)>,
    pub entered: LogicalTime,
    pub exited: Option<LogicalTime>,
}

impl Activation {
    pub fn covers_line(&self, line: u32) -> bool {
        matches!(self.span, Some((first, last)) if first <= line && line <= last)
    }

    /// True while the body runs at `t`
    pub fn is_live_at(&self, t: LogicalTime) -> bool {
        self.entered <= t && self.exited.map_or(true, |exit| t <= exit)
    }
}

/// Holders of one variable name
#[derive(Debug, Clone, Default)]
pub struct NameScope {
    pub holders: BTreeSet<EntityId>,
    /// Holders that assigned the name at a given source line
    pub lines: HashMap<u32, BTreeSet<EntityId>>,
}

/// Outcome of resolving a name
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub holder: EntityId,
    /// Raw value, possibly a `Ref`
    pub value: Value,
    pub value_type: String,
    /// Start of the version in effect
    pub since: LogicalTime,
}

#[derive(Debug, Default)]
pub struct ScopeIndex {
    names: HashMap<String, NameScope>,
    frames: HashMap<EntityId, Vec<Activation>>,
}

impl ScopeIndex {
    /// Index VAR assignments and scope markers (records in time order)
    pub fn from_records(records: &[Arc<Record>]) -> Self {
        let mut index = Self::default();
        for record in records {
            match record.kind {
                EventKind::Var => {
                    let FieldKey::Name(name) = &record.field else {
                        continue;
                    };
                    let scope = index.names.entry(name.clone()).or_default();
                    scope.holders.insert(record.entity);
                    scope
                        .lines
                        .entry(record.line)
                        .or_default()
                        .insert(record.entity);
                }
                EventKind::ScopeEnter => {
                    let span = parse_span(&record.extra);
                    if span.is_none() && !record.extra.is_empty() {
                        tracing::warn!(time = record.time, extra = %record.extra, "malformed scope span");
                    }
                    index.frames.entry(record.entity).or_default().push(Activation {
                        function: record.field.to_string(),
                        span,
                        entered: record.time,
                        exited: None,
                    });
                }
                EventKind::ScopeExit => {
                    let open = index
                        .frames
                        .get_mut(&record.entity)
                        .and_then(|activations| activations.iter_mut().rev().find(|a| a.exited.is_none()));
                    match open {
                        Some(activation) => activation.exited = Some(record.time),
                        None => tracing::warn!(
                            time = record.time,
                            frame = record.entity,
                            "scope exit without matching enter"
                        ),
                    }
                }
                _ => {}
            }
        }
        index
    }

    pub fn name(&self, name: &str) -> Option<&NameScope> {
        self.names.get(name)
    }

    /// Every variable name seen
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    pub fn activations(&self, frame: EntityId) -> &[Activation] {
        self.frames.get(&frame).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every activation of `function`, across frames
    pub fn activations_of<'a>(
        &'a self,
        function: &'a str,
    ) -> impl Iterator<Item = (EntityId, &'a Activation)> + 'a {
        self.frames.iter().flat_map(move |(frame, activations)| {
            activations
                .iter()
                .filter(move |a| a.function == function)
                .map(move |a| (*frame, a))
        })
    }

    /// Resolve `name` as seen from `line` (if given) at time `t`
    ///
    /// Without an exact scope the closest version at or before `t` wins.
    pub fn resolve(
        &self,
        name: &str,
        line: Option<u32>,
        t: LogicalTime,
        objects: &ObjectIndex,
    ) -> Option<Resolution> {
        let scope = self.names.get(name)?;

        let mut candidates: BTreeSet<EntityId> = match line {
            Some(line) => {
                let mut exact: BTreeSet<EntityId> = scope
                    .holders
                    .iter()
                    .copied()
                    .filter(|holder| self.activations(*holder).iter().any(|a| a.covers_line(line)))
                    .collect();
                if let Some(writers) = scope.lines.get(&line) {
                    exact.extend(writers);
                }
                exact
            }
            None => BTreeSet::new(),
        };
        if candidates.is_empty() {
            candidates = scope.holders.clone();
        }

        let live: BTreeSet<EntityId> = candidates
            .iter()
            .copied()
            .filter(|holder| !self.exited_before(*holder, t))
            .collect();
        let candidates = if live.is_empty() { candidates } else { live };

        let field = FieldKey::name(name);
        let resolved: Vec<_> = candidates
            .into_iter()
            .filter_map(|holder| {
                let (range, slot) = objects.field_history(holder, &field)?.get_with_range(t)?;
                Some((range.first, holder, slot))
            })
            .collect();

        // Attributes of referenced objects share names with locals; frames win.
        let prefer_frames = resolved.iter().any(|(_, holder, _)| !objects.is_referenced(*holder));
        resolved
            .into_iter()
            .filter(|(_, holder, _)| !prefer_frames || !objects.is_referenced(*holder))
            .max_by_key(|(since, holder, _)| (*since, *holder))
            .map(|(since, holder, slot)| Resolution {
                holder,
                value: slot.value.clone(),
                value_type: slot.value_type.clone(),
                since,
            })
    }

    // A frame with no activations (module level, object) never exits.
    fn exited_before(&self, frame: EntityId, t: LogicalTime) -> bool {
        let activations = self.activations(frame);
        if activations.is_empty() || activations.iter().any(|a| a.is_live_at(t)) {
            return false;
        }
        let mut started = activations.iter().filter(|a| a.entered <= t).peekable();
        started.peek().is_some() && started.all(|a| a.exited.map_or(false, |exit| exit < t))
    }
}

fn parse_span(extra: &str) -> Option<(u32, u32)> {
    let (first, last) = extra.split_once(':')?;
    let first = first.trim().parse().ok()?;
    let last = last.trim().parse().ok()?;
    (first <= last).then_some((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::RecordDraft;

    fn index(drafts: Vec<RecordDraft>) -> (ScopeIndex, ObjectIndex) {
        let records: Vec<_> = drafts
            .into_iter()
            .enumerate()
            .map(|(t, d)| Arc::new(d.into_record(t as LogicalTime, 0)))
            .collect();
        (ScopeIndex::from_records(&records), ObjectIndex::from_records(&records))
    }

    fn var(frame: EntityId, name: &str, value: i64, line: u32) -> RecordDraft {
        Record::builder(frame, FieldKey::name(name), EventKind::Var)
            .value(value)
            .line(line)
    }

    fn enter(frame: EntityId, function: &str, span: &str) -> RecordDraft {
        Record::builder(frame, FieldKey::name(function), EventKind::ScopeEnter).extra(span)
    }

    fn exit(frame: EntityId, function: &str) -> RecordDraft {
        Record::builder(frame, FieldKey::name(function), EventKind::ScopeExit)
    }

    #[test]
    fn test_closest_version_wins_without_line() {
        let (scopes, objects) = index(vec![
            var(1, "n", 3, 10),
            enter(2, "fact", "20:25"),
            var(2, "n", 2, 21),
            enter(3, "fact", "20:25"),
            var(3, "n", 1, 21),
        ]);
        let at = |t| scopes.resolve("n", None, t, &objects).map(|r| (r.holder, r.value));
        assert_eq!(at(0), Some((1, Value::Int(3))));
        assert_eq!(at(2), Some((2, Value::Int(2))));
        assert_eq!(at(4), Some((3, Value::Int(1))));
    }

    #[test]
    fn test_line_selects_exact_scope() {
        let (scopes, objects) = index(vec![
            var(1, "x", 1, 3),
            enter(2, "f", "10:12"),
            var(2, "x", 50, 11),
            var(1, "x", 2, 4),
        ]);
        let r = scopes.resolve("x", Some(11), 3, &objects).unwrap();
        assert_eq!((r.holder, r.value.clone()), (2, Value::Int(50)));
        let r = scopes.resolve("x", Some(3), 3, &objects).unwrap();
        assert_eq!((r.holder, r.value), (1, Value::Int(2)));
        assert!(scopes.resolve("y", None, 3, &objects).is_none());
    }

    #[test]
    fn test_exited_frames_are_dropped() {
        let (scopes, objects) = index(vec![
            var(1, "r", 1, 2),
            enter(2, "g", "5:7"),
            var(2, "r", 9, 6),
            exit(2, "g"),
            enter(3, "h", ""),
        ]);
        assert_eq!(scopes.resolve("r", None, 2, &objects).unwrap().holder, 2);
        assert_eq!(scopes.resolve("r", None, 4, &objects).unwrap().holder, 1);
        assert_eq!(scopes.activations(2)[0].exited, Some(3));
        assert_eq!(scopes.activations_of("g").count(), 1);
    }

    #[test]
    fn test_locals_win_over_object_attributes() {
        let (scopes, objects) = index(vec![
            var(1, "x", 1, 2),
            Record::builder(1, FieldKey::name("p"), EventKind::Var)
                .value_type("Point")
                .value(Value::Ref(9)),
            var(9, "x", 40, 3),
        ]);
        let r = scopes.resolve("x", None, 2, &objects).unwrap();
        assert_eq!((r.holder, r.value), (1, Value::Int(1)));
    }

    #[test]
    fn test_parse_span() {
        assert_eq!(parse_span("3:9"), Some((3, 9)));
        assert_eq!(parse_span("9:3"), None);
        assert_eq!(parse_span("x"), None);
    }
}
