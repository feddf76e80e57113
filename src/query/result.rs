//! Per-instant result series produced by operators

use crate::core::temporal::{runs_of, LogicalTime, TimeRange};
use crate::core::value::Value;
use serde::Serialize;
use serde_json::{json, Map};

/// A variable substituted while evaluating an expression
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Replacement {
    pub expression: String,
    pub value: Value,
    /// Start of the version that supplied the value
    pub time: LogicalTime,
}

/// Results of one instant
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResultEntry {
    pub time: LogicalTime,
    pub results: Vec<(String, Option<Value>)>,
    pub provenance: Vec<Replacement>,
}

impl EvalResultEntry {
    pub fn new(time: LogicalTime) -> Self {
        Self {
            time,
            results: Vec::new(),
            provenance: Vec::new(),
        }
    }

    /// Entry holding a single boolean under `key`
    pub fn flag(time: LogicalTime, key: &str, flag: bool) -> Self {
        Self::new(time).with(key, Some(Value::Bool(flag)))
    }

    pub fn with(mut self, key: &str, value: Option<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or overwrite `key`
    pub fn set(&mut self, key: &str, value: Option<Value>) {
        match self.results.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.results.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Option<Value>> {
        self.results.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Non-empty with every value present and truthy
    pub fn satisfied(&self) -> bool {
        !self.results.is_empty()
            && self
                .results
                .iter()
                .all(|(_, v)| v.as_ref().map_or(false, Value::truthy))
    }

    fn merge(&mut self, other: EvalResultEntry) {
        for (key, value) in other.results {
            self.set(&key, value);
        }
        for replacement in other.provenance {
            if !self.provenance.contains(&replacement) {
                self.provenance.push(replacement);
            }
        }
    }

    fn same_row(&self, other: &EvalResultEntry) -> bool {
        self.results == other.results
    }
}

/// Time-ordered result series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalResult {
    entries: Vec<EvalResultEntry>,
}

impl EvalResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries in any order; entries at the same time are merged
    pub fn from_entries(mut entries: Vec<EvalResultEntry>) -> Self {
        entries.sort_by_key(|e| e.time);
        let mut merged: Vec<EvalResultEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            match merged.last_mut() {
                Some(last) if last.time == entry.time => last.merge(entry),
                _ => merged.push(entry),
            }
        }
        Self { entries: merged }
    }

    /// One boolean entry per instant of `window`
    pub fn from_flags(window: TimeRange, key: &str, flags: &[bool]) -> Self {
        let entries = window
            .instants()
            .zip(flags)
            .map(|(t, &flag)| EvalResultEntry::flag(t, key, flag))
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[EvalResultEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<EvalResultEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, t: LogicalTime) -> Option<&EvalResultEntry> {
        self.entries
            .binary_search_by_key(&t, |e| e.time)
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Every result key, in first-seen order
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for entry in &self.entries {
            for (key, _) in &entry.results {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
        keys
    }

    /// Satisfaction per instant of `window`; missing instants are false
    pub fn flags(&self, window: TimeRange) -> Vec<bool> {
        window
            .instants()
            .map(|t| self.get(t).map_or(false, EvalResultEntry::satisfied))
            .collect()
    }

    /// Maximal runs of satisfied instants within `window`
    pub fn satisfaction_ranges(&self, window: TimeRange) -> Vec<TimeRange> {
        runs_of(window, &self.flags(window))
    }

    /// Outer join by time: union of keys, `other` wins on a shared key
    pub fn join(self, other: EvalResult) -> EvalResult {
        let mut all = self.entries;
        all.extend(other.entries);
        Self::from_entries(all)
    }

    /// Keep only entries inside one of `ranges`
    pub fn restrict(self, ranges: &[TimeRange]) -> EvalResult {
        let entries = self
            .entries
            .into_iter()
            .filter(|e| ranges.iter().any(|r| r.contains(e.time)))
            .collect();
        Self { entries }
    }

    /// Rename keys positionally (in [`keys`](Self::keys) order)
    pub fn rename(mut self, names: &[String]) -> EvalResult {
        let keys = self.keys();
        for entry in &mut self.entries {
            for (key, _) in &mut entry.results {
                if let Some(pos) = keys.iter().position(|k| k == key) {
                    if let Some(name) = names.get(pos) {
                        *key = name.clone();
                    }
                }
            }
        }
        self
    }

    /// Coalesce consecutive instants with identical rows
    pub fn group(&self) -> Vec<(TimeRange, &EvalResultEntry)> {
        let mut groups: Vec<(TimeRange, &EvalResultEntry)> = Vec::new();
        for entry in &self.entries {
            match groups.last_mut() {
                Some((range, first))
                    if range.last + 1 == entry.time && first.same_row(entry) =>
                {
                    range.last = entry.time;
                }
                _ => groups.push((TimeRange::instant(entry.time), entry)),
            }
        }
        groups
    }

    /// Query output: `{"keys": [...], "(first, last)": {key: value}}`
    ///
    /// Rows without any result are omitted.
    pub fn to_json(&self) -> serde_json::Value {
        let mut out = Map::new();
        out.insert("keys".to_string(), json!(self.keys()));
        for (range, entry) in self.group() {
            if entry.results.is_empty() {
                continue;
            }
            let row: Map<String, serde_json::Value> = entry
                .results
                .iter()
                .map(|(k, v)| {
                    let value = v.as_ref().map_or(serde_json::Value::Null, Value::to_json);
                    (k.clone(), value)
                })
                .collect();
            out.insert(range.key(), serde_json::Value::Object(row));
        }
        serde_json::Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(key: &str, values: &[(LogicalTime, i64)]) -> EvalResult {
        EvalResult::from_entries(
            values
                .iter()
                .map(|&(t, v)| EvalResultEntry::new(t).with(key, Some(Value::Int(v))))
                .collect(),
        )
    }

    #[test]
    fn test_satisfied() {
        assert!(!EvalResultEntry::new(0).satisfied());
        assert!(EvalResultEntry::flag(0, "a", true).satisfied());
        let entry = EvalResultEntry::new(0)
            .with("a", Some(Value::Int(1)))
            .with("b", None);
        assert!(!entry.satisfied());
    }

    #[test]
    fn test_join_is_outer() {
        let joined = series("x", &[(0, 1), (2, 3)]).join(series("y", &[(1, 5), (2, 6)]));
        assert_eq!(joined.len(), 3);
        assert_eq!(joined.keys(), vec!["x", "y"]);
        let at_2 = joined.get(2).unwrap();
        assert_eq!(at_2.results.len(), 2);
        assert!(joined.get(1).unwrap().get("x").is_none());
    }

    #[test]
    fn test_group_and_json() {
        let result = series("x", &[(0, 1), (1, 1), (2, 2), (4, 2)]);
        let groups: Vec<_> = result.group().into_iter().map(|(r, _)| r).collect();
        assert_eq!(
            groups,
            vec![TimeRange::new(0, 1), TimeRange::instant(2), TimeRange::instant(4)]
        );
        let json = result.to_json();
        assert_eq!(json["keys"], json!(["x"]));
        assert_eq!(json["(0, 1)"], json!({"x": 1}));
        assert_eq!(json["(4, 4)"], json!({"x": 2}));
    }

    #[test]
    fn test_satisfaction_ranges() {
        let flags = [true, true, false, true];
        let result = EvalResult::from_flags(TimeRange::new(3, 6), "f", &flags);
        assert_eq!(result.flags(TimeRange::new(3, 6)), flags);
        assert_eq!(
            result.satisfaction_ranges(TimeRange::new(3, 6)),
            vec![TimeRange::new(3, 4), TimeRange::instant(6)]
        );
        assert_eq!(result.flags(TimeRange::new(6, 7)), vec![true, false]);
    }

    #[test]
    fn test_rename_and_restrict() {
        let result = series("x", &[(0, 1), (1, 2)])
            .join(series("y", &[(0, 3)]))
            .rename(&["a".to_string(), "b".to_string()]);
        assert_eq!(result.keys(), vec!["a", "b"]);
        let restricted = result.restrict(&[TimeRange::instant(1)]);
        assert_eq!(restricted.len(), 1);
        assert_eq!(restricted.entries()[0].time, 1);
    }
}
