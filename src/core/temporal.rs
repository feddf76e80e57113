//! Logical time and time ranges

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical clock value assigned to exactly one recorded event
pub type LogicalTime = u64;

/// Inclusive range of logical time `[first, last]`
///
/// Used for interval-store versions, query windows and satisfaction runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// First instant covered
    pub first: LogicalTime,
    /// Last instant covered
    pub last: LogicalTime,
}

impl TimeRange {
    /// Create a range; `first` must not be after `last`
    pub fn new(first: LogicalTime, last: LogicalTime) -> Self {
        assert!(first <= last, "TimeRange [{first}, {last}] is inverted");
        Self { first, last }
    }

    /// Create a range covering a single instant
    pub fn instant(t: LogicalTime) -> Self {
        Self { first: t, last: t }
    }

    /// Check if an instant is within this range
    pub fn contains(&self, t: LogicalTime) -> bool {
        t >= self.first && t <= self.last
    }

    /// Number of instants covered
    pub fn len(&self) -> usize {
        (self.last - self.first) as usize + 1
    }

    /// A range always covers at least one instant
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Intersection of two ranges, if they overlap
    pub fn intersect(&self, other: &TimeRange) -> Option<TimeRange> {
        let first = self.first.max(other.first);
        let last = self.last.min(other.last);
        (first <= last).then_some(TimeRange { first, last })
    }

    /// Iterate over every instant in the range
    pub fn instants(&self) -> impl Iterator<Item = LogicalTime> {
        self.first..=self.last
    }

    /// Key used when a coalesced row is serialized
    pub fn key(&self) -> String {
        format!("({}, {})", self.first, self.last)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.first, self.last)
    }
}

/// Collapse a satisfaction series into maximal runs of `true`
///
/// `flags[i]` describes instant `window.first + i`.
pub fn runs_of(window: TimeRange, flags: &[bool]) -> Vec<TimeRange> {
    let mut runs = Vec::new();
    let mut open: Option<LogicalTime> = None;
    for (offset, &flag) in flags.iter().enumerate() {
        let t = window.first + offset as LogicalTime;
        match (flag, open) {
            (true, None) => open = Some(t),
            (false, Some(start)) => {
                runs.push(TimeRange::new(start, t - 1));
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        runs.push(TimeRange::new(start, window.first + flags.len() as LogicalTime - 1));
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_contains() {
        let range = TimeRange::new(3, 7);
        assert!(range.contains(3));
        assert!(range.contains(7));
        assert!(!range.contains(2));
        assert!(!range.contains(8));
        assert_eq!(range.len(), 5);
    }

    #[test]
    fn test_range_intersect() {
        let a = TimeRange::new(0, 5);
        let b = TimeRange::new(4, 9);
        assert_eq!(a.intersect(&b), Some(TimeRange::new(4, 5)));
        assert_eq!(a.intersect(&TimeRange::new(6, 9)), None);
    }

    #[test]
    fn test_runs_of() {
        let window = TimeRange::new(10, 16);
        let flags = [true, true, false, true, false, true, true];
        assert_eq!(
            runs_of(window, &flags),
            vec![
                TimeRange::new(10, 11),
                TimeRange::instant(13),
                TimeRange::new(15, 16)
            ]
        );
        assert!(runs_of(window, &[false; 7]).is_empty());
    }

    #[test]
    fn test_range_key() {
        assert_eq!(TimeRange::new(0, 3).key(), "(0, 3)");
    }
}
