//! Operator evaluation over a frozen trace

use crate::config::EngineConfig;
use crate::core::record::{EventKind, FieldKey};
use crate::core::temporal::{LogicalTime, TimeRange};
use crate::core::value::Value;
use crate::error::{Error, Result};
use crate::expr::{evaluate, Bindings, Expr};
use crate::query::operator::Operator;
use crate::query::result::{EvalResult, EvalResultEntry, Replacement};
use crate::query::{align, loops, temporal};
use crate::storage::EventJournal;
use crate::trace::Trace;
use dashmap::DashMap;
use rayon::prelude::*;
use std::cell::RefCell;
use std::sync::Arc;

/// Memo of operator results per (operator, window)
#[derive(Debug, Default)]
pub struct EvalCache {
    results: DashMap<(String, TimeRange), Arc<EvalResult>>,
}

impl EvalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str, window: TimeRange) -> Option<Arc<EvalResult>> {
        self.results
            .get(&(key.to_string(), window))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Insert unless present; returns the cached result either way
    pub fn insert(&self, key: String, window: TimeRange, result: Arc<EvalResult>) -> Arc<EvalResult> {
        Arc::clone(self.results.entry((key, window)).or_insert(result).value())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Variable lookups for one instant, recording what was substituted
struct InstantBindings<'a> {
    trace: &'a Trace,
    time: LogicalTime,
    line: Option<u32>,
    used: RefCell<Vec<Replacement>>,
}

impl Bindings for InstantBindings<'_> {
    fn lookup(&self, name: &str, line: Option<u32>) -> Option<Value> {
        let line = line.or(self.line);
        let resolution = self.trace.resolve_name(name, line, self.time)?;
        let value = self.trace.builder().resolve(&resolution.value, self.time);
        let expression = match line {
            Some(line) => format!("{name}@{line}"),
            None => name.to_string(),
        };
        self.used.borrow_mut().push(Replacement {
            expression,
            value: value.clone(),
            time: resolution.since,
        });
        Some(value)
    }
}

/// Evaluates operator trees against a [`Trace`]
///
/// Sibling operators run on the current rayon pool; callers are expected to
/// invoke [`eval`](Self::eval) inside `ThreadPool::install`.
pub struct Evaluator<'a> {
    trace: &'a Trace,
    config: &'a EngineConfig,
}

impl<'a> Evaluator<'a> {
    pub fn new(trace: &'a Trace, config: &'a EngineConfig) -> Self {
        Self { trace, config }
    }

    /// Result of `op` over `window`, memoized when enabled
    pub fn eval(&self, op: &Operator, window: TimeRange) -> Result<Arc<EvalResult>> {
        if !self.config.cache_operator_results {
            return self.compute(op, window).map(Arc::new);
        }
        // Debug form: a Raw selector displays as its bare text, which may
        // coincide with another operator's rendering.
        let key = format!("{op:?}");
        if let Some(hit) = self.trace.evals().get(&key, window) {
            return Ok(hit);
        }
        let result = Arc::new(self.compute(op, window)?);
        Ok(self.trace.evals().insert(key, window, result))
    }

    fn flags(&self, op: &Operator, window: TimeRange) -> Result<Vec<bool>> {
        Ok(self.eval(op, window)?.flags(window))
    }

    fn flags2(&self, a: &Operator, b: &Operator, window: TimeRange) -> Result<(Vec<bool>, Vec<bool>)> {
        let (fa, fb) = rayon::join(|| self.flags(a, window), || self.flags(b, window));
        Ok((fa?, fb?))
    }

    fn pair(&self, a: &Operator, b: &Operator, window: TimeRange) -> Result<(Arc<EvalResult>, Arc<EvalResult>)> {
        let (ra, rb) = rayon::join(|| self.eval(a, window), || self.eval(b, window));
        Ok((ra?, rb?))
    }

    fn compute(&self, op: &Operator, window: TimeRange) -> Result<EvalResult> {
        tracing::trace!(operator = %op, %window, "evaluating");
        let key = op.to_string();
        let boolean = |flags: Vec<bool>| EvalResult::from_flags(window, &key, &flags);

        let result = match op {
            Operator::Const(b) => boolean(vec![*b; window.len()]),
            Operator::And(a, b) => {
                let (fa, fb) = self.flags2(a, b, window)?;
                boolean(temporal::and(&fa, &fb))
            }
            Operator::Or(a, b) => {
                let (fa, fb) = self.flags2(a, b, window)?;
                boolean(temporal::or(&fa, &fb))
            }
            Operator::Not(a) => boolean(temporal::not(&self.flags(a, window)?)),
            Operator::Whenever(a) => boolean(self.flags(a, window)?),
            Operator::Until(a, b) => {
                let (fa, fb) = self.flags2(a, b, window)?;
                boolean(temporal::until(&fa, &fb))
            }
            Operator::Release(a, b) => {
                let (fa, fb) = self.flags2(a, b, window)?;
                boolean(temporal::release(&fa, &fb))
            }
            Operator::Globally(a) => boolean(temporal::globally(&self.flags(a, window)?)),
            Operator::Finally(a) => boolean(temporal::finally(&self.flags(a, window)?)),
            Operator::Next(a) => boolean(temporal::next(&self.flags(a, window)?)),
            Operator::Before(a, b) => {
                let (fa, fb) = self.flags2(a, b, window)?;
                boolean(temporal::before(&fa, &fb))
            }
            Operator::After(a, b) => {
                let (fa, fb) = self.flags2(a, b, window)?;
                boolean(temporal::after(&fa, &fb))
            }
            Operator::First(a) => boolean(temporal::first(&self.flags(a, window)?)),
            Operator::Last(a) => boolean(temporal::last(&self.flags(a, window)?)),
            Operator::Range(a, b) => {
                let (fa, fb) = self.flags2(a, b, window)?;
                boolean(temporal::range(&fa, &fb))
            }
            Operator::AndThen(a, b) => {
                let (fa, fb) = self.flags2(a, b, window)?;
                boolean(temporal::and_then(&fa, &fb))
            }
            Operator::LineHit(line) => {
                let journal = self.trace.journal();
                boolean(
                    window
                        .instants()
                        .map(|t| journal.at(t).map_or(false, |r| r.line == *line))
                        .collect(),
                )
            }
            Operator::InFunction(function) => boolean(self.in_function(function, window)),
            Operator::Raw { text, expr, line } => self.raw(text, expr, *line, window),
            Operator::Type { text, expr, line } => self.type_of(&key, text, expr, *line, window),
            Operator::LineNo => {
                let journal = self.trace.journal();
                let entries = window
                    .instants()
                    .map(|t| {
                        let line = journal.at(t).map(|r| Value::Int(r.line as i64));
                        EvalResultEntry::new(t).with(&key, line)
                    })
                    .collect();
                EvalResult::from_entries(entries)
            }
            Operator::VarSelector(condition) => {
                let ranges = match condition {
                    Some(condition) => self.eval(condition, window)?.satisfaction_ranges(window),
                    None => vec![window],
                };
                self.assigned_in(&ranges)?
            }
            Operator::LoopIteration { line, index } => {
                let iterations = self.iterations(*line);
                match iterations.get(*index).and_then(|span| span.intersect(&window)) {
                    Some(span) => self.iteration(*index, span)?,
                    None => EvalResult::new(),
                }
            }
            Operator::LoopSummary { line } => {
                let iterations = self.iterations(*line);
                let parts = iterations
                    .par_iter()
                    .enumerate()
                    .filter_map(|(i, span)| span.intersect(&window).map(|span| (i, span)))
                    .map(|(i, span)| self.iteration(i, span))
                    .collect::<Result<Vec<_>>>()?;
                stitch(parts)
            }
            Operator::Union(children) => {
                let parts = children
                    .par_iter()
                    .map(|child| self.eval(child, window).map(|r| (*r).clone()))
                    .collect::<Result<Vec<_>>>()?;
                stitch(parts)
            }
            Operator::Where(selector, condition) => {
                let ranges = self.eval(condition, window)?.satisfaction_ranges(window);
                let parts = ranges
                    .par_iter()
                    .map(|range| self.eval(selector, *range).map(|r| (*r).clone()))
                    .collect::<Result<Vec<_>>>()?;
                let mut entries: Vec<EvalResultEntry> = window
                    .instants()
                    .filter(|t| !ranges.iter().any(|r| r.contains(*t)))
                    .map(EvalResultEntry::new)
                    .collect();
                entries.extend(parts.into_iter().flat_map(EvalResult::into_entries));
                EvalResult::from_entries(entries)
            }
            Operator::Align(a, b) | Operator::Meld(a, b) => {
                for child in [a, b] {
                    if child.is_boolean() {
                        return Err(Error::Composition(format!(
                            "{} needs selectors, got boolean operator {child}",
                            op.kind()
                        )));
                    }
                }
                let (left, right) = self.pair(a, b, window)?;
                match op {
                    Operator::Align(..) => align::align(&left, &right, self.config.float_tolerance),
                    _ => align::meld(&left, &right, &self.config.placeholder),
                }
            }
        };
        Ok(result)
    }

    fn raw(&self, text: &str, expr: &Expr, line: Option<u32>, window: TimeRange) -> EvalResult {
        let instants: Vec<LogicalTime> = window.instants().collect();
        let entries = instants
            .par_iter()
            .map(|&t| {
                let bindings = InstantBindings {
                    trace: self.trace,
                    time: t,
                    line,
                    used: RefCell::new(Vec::new()),
                };
                let value = match evaluate(expr, &bindings) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::trace!(expression = text, time = t, error = %e, "expression failed");
                        None
                    }
                };
                let mut entry = EvalResultEntry::new(t).with(text, value);
                entry.provenance = bindings.used.into_inner();
                entry
            })
            .collect();
        EvalResult::from_entries(entries)
    }

    fn type_of(&self, key: &str, text: &str, expr: &Expr, line: Option<u32>, window: TimeRange) -> EvalResult {
        let declared = expr.as_name();
        let entries = window
            .instants()
            .map(|t| {
                let type_name = match declared {
                    Some((name, name_line)) => self
                        .trace
                        .resolve_name(name, name_line.or(line), t)
                        .map(|r| {
                            if r.value_type.is_empty() {
                                self.trace.builder().resolve(&r.value, t).type_name().to_string()
                            } else {
                                r.value_type
                            }
                        }),
                    None => {
                        let bindings = InstantBindings {
                            trace: self.trace,
                            time: t,
                            line,
                            used: RefCell::new(Vec::new()),
                        };
                        evaluate(expr, &bindings)
                            .map_err(|e| tracing::trace!(expression = text, time = t, error = %e, "expression failed"))
                            .ok()
                            .map(|v| v.type_name().to_string())
                    }
                };
                EvalResultEntry::new(t).with(key, type_name.map(Value::Str))
            })
            .collect();
        EvalResult::from_entries(entries)
    }

    // Activations may nest (recursion); their spans are unioned.
    fn in_function(&self, function: &str, window: TimeRange) -> Vec<bool> {
        let end = self.trace.journal().last_time().unwrap_or(window.last);
        let mut flags = vec![false; window.len()];
        for (_, activation) in self.trace.scopes().activations_of(function) {
            let span = TimeRange::new(activation.entered, activation.exited.unwrap_or(end).max(activation.entered));
            if let Some(overlap) = span.intersect(&window) {
                for t in overlap.instants() {
                    flags[(t - window.first) as usize] = true;
                }
            }
        }
        flags
    }

    fn iterations(&self, line: u32) -> Vec<TimeRange> {
        let journal = self.trace.journal();
        let last_time = journal.last_time().unwrap_or(0);
        loops::iterations(
            &journal.by_line(line),
            line,
            last_time,
            self.config.include_incomplete_iterations,
        )
    }

    fn iteration(&self, index: usize, span: TimeRange) -> Result<EvalResult> {
        let mut entries = self.assigned_in(&[span])?.into_entries();
        for entry in &mut entries {
            entry.set("iteration", Some(Value::Int(index as i64)));
        }
        Ok(EvalResult::from_entries(entries))
    }

    /// Raw series of every variable assigned inside `ranges`, restricted to them
    fn assigned_in(&self, ranges: &[TimeRange]) -> Result<EvalResult> {
        let journal = self.trace.journal();
        let mut names: Vec<String> = Vec::new();
        for range in ranges {
            for record in journal.in_time_range(*range) {
                if record.kind != EventKind::Var {
                    continue;
                }
                if let FieldKey::Name(name) = &record.field {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
            }
        }

        let parts = names
            .par_iter()
            .flat_map_iter(|name| ranges.iter().map(move |range| (name, *range)))
            .map(|(name, range)| {
                let op = Operator::raw(
                    name,
                    Expr::Name {
                        name: name.clone(),
                        line: None,
                    },
                );
                self.eval(&op, range).map(|r| (*r).clone())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(stitch(parts))
    }
}

/// Join results by time
fn stitch(parts: Vec<EvalResult>) -> EvalResult {
    EvalResult::from_entries(parts.into_iter().flat_map(EvalResult::into_entries).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Record;
    use crate::expr::parse_expression;
    use crate::storage::InMemoryJournal;

    fn raw(text: &str) -> Box<Operator> {
        Box::new(Operator::raw(text, parse_expression(text).unwrap()))
    }

    // a = 1, b = 0 .. b = 5 at t=3, a = -1 at t=5
    fn trace() -> Trace {
        let mut journal = InMemoryJournal::new();
        let var = |name: &str, v: i64, line: u32| {
            Record::builder(1, FieldKey::name(name), EventKind::Var).value(v).line(line)
        };
        let drafts = vec![
            var("a", 1, 1),
            var("b", 0, 2),
            var("b", 1, 3),
            var("b", 5, 3),
            var("b", 6, 3),
            var("a", -1, 4),
        ];
        for (t, draft) in drafts.into_iter().enumerate() {
            journal.append(draft.into_record(t as LogicalTime, 0)).unwrap();
        }
        Trace::new(1, journal, 64)
    }

    fn flags(trace: &Trace, op: &Operator, window: TimeRange) -> Vec<bool> {
        let config = EngineConfig::default();
        Evaluator::new(trace, &config).eval(op, window).unwrap().flags(window)
    }

    #[test]
    fn test_until_over_raw() {
        let trace = trace();
        let op = Operator::Until(raw("a > 0"), raw("b == 5"));
        assert_eq!(
            flags(&trace, &op, TimeRange::new(0, 4)),
            vec![true, true, true, true, false]
        );
    }

    #[test]
    fn test_raw_records_provenance() {
        let trace = trace();
        let config = EngineConfig::default();
        let result = Evaluator::new(&trace, &config)
            .eval(&raw("a + b"), TimeRange::new(0, 3))
            .unwrap();
        assert_eq!(result.get(0).unwrap().get("a + b"), Some(&None));
        let at_3 = result.get(3).unwrap();
        assert_eq!(at_3.get("a + b"), Some(&Some(Value::Int(6))));
        assert_eq!(at_3.provenance.len(), 2);
        assert_eq!(at_3.provenance[1].time, 3);
    }

    #[test]
    fn test_line_hit_and_line_no() {
        let trace = trace();
        assert_eq!(
            flags(&trace, &Operator::LineHit(3), TimeRange::new(0, 5)),
            vec![false, false, true, true, true, false]
        );
        let config = EngineConfig::default();
        let lines = Evaluator::new(&trace, &config)
            .eval(&Operator::LineNo, TimeRange::new(4, 5))
            .unwrap();
        assert_eq!(lines.get(5).unwrap().get("LineNo()"), Some(&Some(Value::Int(4))));
    }

    #[test]
    fn test_where_restricts_selector() {
        let trace = trace();
        let config = EngineConfig::default();
        let op = Operator::Where(raw("b"), raw("b > 0"));
        let result = Evaluator::new(&trace, &config).eval(&op, TimeRange::new(0, 5)).unwrap();
        assert_eq!(result.len(), 6);
        assert!(result.get(1).unwrap().results.is_empty());
        assert_eq!(result.get(3).unwrap().get("b"), Some(&Some(Value::Int(5))));
    }

    #[test]
    fn test_union_joins_keys() {
        let trace = trace();
        let config = EngineConfig::default();
        let op = Operator::Union(vec![*raw("a"), *raw("b")]);
        let result = Evaluator::new(&trace, &config).eval(&op, TimeRange::new(1, 2)).unwrap();
        assert_eq!(result.keys(), vec!["a", "b"]);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_var_selector() {
        let trace = trace();
        let config = EngineConfig::default();
        let op = Operator::VarSelector(Some(raw("b >= 5")));
        let result = Evaluator::new(&trace, &config).eval(&op, TimeRange::new(0, 5)).unwrap();
        // b >= 5 holds on [3, 5]; b and a are assigned there
        assert_eq!(result.keys(), vec!["b", "a"]);
        assert!(result.get(2).is_none());
        assert_eq!(result.get(5).unwrap().get("a"), Some(&Some(Value::Int(-1))));
    }

    #[test]
    fn test_align_rejects_boolean_children() {
        let trace = trace();
        let config = EngineConfig::default();
        let op = Operator::Meld(Box::new(Operator::Const(true)), raw("a"));
        let err = Evaluator::new(&trace, &config).eval(&op, TimeRange::new(0, 5)).unwrap_err();
        assert!(matches!(err, Error::Composition(_)));
    }

    #[test]
    fn test_results_are_memoized() {
        let trace = trace();
        let config = EngineConfig::default();
        let evaluator = Evaluator::new(&trace, &config);
        let op = Operator::Not(raw("a > 0"));
        let first = evaluator.eval(&op, TimeRange::new(0, 5)).unwrap();
        let second = evaluator.eval(&op, TimeRange::new(0, 5)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.flags(TimeRange::new(0, 5)), vec![false, false, false, false, false, true]);
        assert_eq!(trace.evals().len(), 2);
    }

    #[test]
    fn test_raw_text_does_not_share_operator_slot() {
        let trace = trace();
        let config = EngineConfig::default();
        let evaluator = Evaluator::new(&trace, &config);
        let window = TimeRange::new(4, 5);
        let line_no = evaluator.eval(&Operator::LineNo, window).unwrap();
        let text = evaluator.eval(&raw("LineNo()"), window).unwrap();
        assert_eq!(line_no.get(5).unwrap().get("LineNo()"), Some(&Some(Value::Int(4))));
        assert_eq!(text.get(5).unwrap().get("LineNo()"), Some(&None));
    }
}
