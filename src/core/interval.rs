//! Interval store: versioned values over logical time

use crate::core::temporal::{LogicalTime, TimeRange};
use serde::{Deserialize, Serialize};

/// Maps logical time to versioned values, one entry per maximal run of an
/// unchanged value
///
/// Ranges are contiguous and ordered: opening a new version closes the
/// previous one at the instant before, so the ranges partition
/// `[first_time, last_time]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalStore<V> {
    versions: Vec<(TimeRange, V)>,
}

impl<V: PartialEq> IntervalStore<V> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            versions: Vec::new(),
        }
    }

    /// Record `value` as current from `t` on
    pub fn set(&mut self, t: LogicalTime, value: V) {
        let Some((range, last)) = self.versions.last_mut() else {
            self.versions.push((TimeRange::instant(t), value));
            return;
        };

        assert!(
            t >= range.last,
            "interval store write at {t} precedes current version {range}"
        );

        if *last == value {
            range.last = t;
        } else if t == range.first {
            // Same instant: the later write wins.
            *last = value;
            self.merge_tail();
        } else {
            range.last = t - 1;
            self.versions.push((TimeRange::instant(t), value));
        }
    }

    // An in-place replacement may make the tail equal to its predecessor.
    fn merge_tail(&mut self) {
        let n = self.versions.len();
        if n >= 2 && self.versions[n - 2].1 == self.versions[n - 1].1 {
            if let Some((range, _)) = self.versions.pop() {
                self.versions[n - 2].0.last = range.last;
            }
        }
    }

    /// Value valid at `t`, the last value if `t` is past the last version,
    /// `None` if `t` precedes the first version
    pub fn get(&self, t: LogicalTime) -> Option<&V> {
        self.get_with_range(t).map(|(_, v)| v)
    }

    /// Like [`get`](Self::get), also returning the version's range
    pub fn get_with_range(&self, t: LogicalTime) -> Option<(TimeRange, &V)> {
        let idx = self.versions.partition_point(|(range, _)| range.first <= t);
        if idx == 0 {
            return None;
        }
        let (range, value) = &self.versions[idx - 1];
        Some((*range, value))
    }

    /// All versions in time order
    pub fn ranges(&self) -> impl Iterator<Item = (TimeRange, &V)> {
        self.versions.iter().map(|(range, v)| (*range, v))
    }

    /// Most recent value
    pub fn latest(&self) -> Option<&V> {
        self.versions.last().map(|(_, v)| v)
    }

    /// Start of the first version
    pub fn first_time(&self) -> Option<LogicalTime> {
        self.versions.first().map(|(range, _)| range.first)
    }

    /// End of the last version
    pub fn last_time(&self) -> Option<LogicalTime> {
        self.versions.last().map(|(range, _)| range.last)
    }

    /// Number of distinct versions
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl<V: PartialEq> Default for IntervalStore<V> {
    fn default() -> Self {
        Self::new()
    }
}
