//! Loop iteration boundaries from loop markers

use crate::core::record::{EventKind, Record};
use crate::core::temporal::{LogicalTime, TimeRange};
use std::sync::Arc;

/// One execution of a loop, from LOOP_START to LOOP_END
#[derive(Debug, Clone, PartialEq)]
pub struct LoopRun {
    pub started: LogicalTime,
    pub iterations: Vec<TimeRange>,
    /// False when the recording ended inside the loop
    pub complete: bool,
}

#[derive(Debug)]
struct OpenRun {
    started: LogicalTime,
    markers: Vec<LogicalTime>,
    broken_at: Option<LogicalTime>,
}

impl OpenRun {
    fn close(self, end: LogicalTime, complete: bool) -> LoopRun {
        let mut iterations = Vec::with_capacity(self.markers.len());
        for (i, &start) in self.markers.iter().enumerate() {
            let last = match self.markers.get(i + 1) {
                Some(&next) => next - 1,
                None => end,
            };
            iterations.push(TimeRange::new(start, last.max(start)));
        }
        LoopRun {
            started: self.started,
            iterations,
            complete,
        }
    }
}

/// Runs of the loop headed at `line`
///
/// `records` are the records of that line in time order; nested runs of the
/// same loop (recursion) are tracked with a stack. An iteration ends just
/// before the next LOOP_ITER marker, or just before the LOOP_END/BREAK that
/// closes the run. A run still open when the recording ends is closed at
/// `last_time` and marked incomplete.
pub fn loop_runs(records: &[Arc<Record>], line: u32, last_time: LogicalTime) -> Vec<LoopRun> {
    let mut stack: Vec<OpenRun> = Vec::new();
    let mut runs = Vec::new();

    for record in records.iter().filter(|r| r.line == line) {
        match record.kind {
            EventKind::LoopStart => stack.push(OpenRun {
                started: record.time,
                markers: Vec::new(),
                broken_at: None,
            }),
            EventKind::LoopIter => match stack.last_mut() {
                Some(run) => run.markers.push(record.time),
                None => {
                    tracing::warn!(line, time = record.time, "loop iteration outside a loop run");
                    stack.push(OpenRun {
                        started: record.time,
                        markers: vec![record.time],
                        broken_at: None,
                    });
                }
            },
            EventKind::Break => match stack.last_mut() {
                Some(run) => run.broken_at = Some(record.time),
                None => tracing::warn!(line, time = record.time, "break outside a loop run"),
            },
            EventKind::LoopEnd => match stack.pop() {
                Some(run) => {
                    let end = run.broken_at.unwrap_or(record.time);
                    runs.push(run.close(end.saturating_sub(1), true));
                }
                None => tracing::warn!(line, time = record.time, "loop end without a start"),
            },
            _ => {}
        }
    }

    while let Some(run) = stack.pop() {
        let run = match run.broken_at {
            Some(at) => run.close(at.saturating_sub(1), true),
            None => run.close(last_time, false),
        };
        runs.push(run);
    }
    runs.sort_by_key(|run| run.started);
    runs
}

/// Iterations of every run, in time order
///
/// The final iteration of an incomplete run is kept only when
/// `include_incomplete` is set.
pub fn iterations(
    records: &[Arc<Record>],
    line: u32,
    last_time: LogicalTime,
    include_incomplete: bool,
) -> Vec<TimeRange> {
    let mut out = Vec::new();
    for run in loop_runs(records, line, last_time) {
        let keep = if run.complete || include_incomplete {
            run.iterations.len()
        } else {
            run.iterations.len().saturating_sub(1)
        };
        out.extend(run.iterations.into_iter().take(keep));
    }
    out.sort_by_key(|range| range.first);
    out
}
