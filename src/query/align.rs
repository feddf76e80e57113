//! Comparing two result series: edit-distance melding and numeric alignment

use crate::core::temporal::LogicalTime;
use crate::core::value::Value;
use crate::query::result::{EvalResult, EvalResultEntry};

/// One step of an edit script: indices into the left and right sequences
pub type Pairing = (Option<usize>, Option<usize>);

/// Wagner-Fischer alignment with unit insert/delete cost
///
/// Equal symbols pair at zero cost; there is no substitution. The script is
/// read back from `(n, m)` to `(0, 0)`, preferring a match, then a deletion
/// from the left, then an insertion from the right.
pub fn edit_script<T>(left: &[T], right: &[T], eq: impl Fn(&T, &T) -> bool) -> Vec<Pairing> {
    let (n, m) = (left.len(), right.len());
    let mut cost = vec![vec![0usize; m + 1]; n + 1];
    for (i, row) in cost.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=m {
        cost[0][j] = j;
    }
    for i in 1..=n {
        for j in 1..=m {
            let skip = cost[i - 1][j].min(cost[i][j - 1]) + 1;
            cost[i][j] = if eq(&left[i - 1], &right[j - 1]) {
                skip.min(cost[i - 1][j - 1])
            } else {
                skip
            };
        }
    }

    let mut script = Vec::with_capacity(n + m);
    let (mut i, mut j) = (n, m);
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && eq(&left[i - 1], &right[j - 1]) && cost[i][j] == cost[i - 1][j - 1] {
            script.push((Some(i - 1), Some(j - 1)));
            i -= 1;
            j -= 1;
        } else if i > 0 && cost[i][j] == cost[i - 1][j] + 1 {
            script.push((Some(i - 1), None));
            i -= 1;
        } else {
            script.push((None, Some(j - 1)));
            j -= 1;
        }
    }
    script.reverse();
    script
}

/// One symbol per instant that carries results
fn rows(result: &EvalResult) -> Vec<&EvalResultEntry> {
    result
        .entries()
        .iter()
        .filter(|entry| !entry.results.is_empty())
        .collect()
}

fn same_symbol(a: &EvalResultEntry, b: &EvalResultEntry) -> bool {
    a.results.len() == b.results.len()
        && a.results.iter().zip(&b.results).all(|((_, x), (_, y))| match (x, y) {
            (Some(x), Some(y)) => x.loose_eq(y),
            (None, None) => true,
            _ => false,
        })
}

fn side(entry: &mut EvalResultEntry, prefix: &str, keys: &[String], row: Option<&EvalResultEntry>, placeholder: &str) {
    for key in keys {
        let value = match row {
            Some(row) => row.get(key).cloned().flatten(),
            None => Some(Value::str(placeholder)),
        };
        entry.set(&format!("{prefix}.{key}"), value);
    }
}

/// Merge two series row by row along their edit script
///
/// Row `i` of the output is the `i`-th aligned pair; the side that does not
/// take part is filled with `placeholder`.
pub fn meld(left: &EvalResult, right: &EvalResult, placeholder: &str) -> EvalResult {
    let (left_rows, right_rows) = (rows(left), rows(right));
    let (left_keys, right_keys) = (left.keys(), right.keys());
    let script = edit_script(&left_rows, &right_rows, |a, b| same_symbol(a, b));

    let entries = script
        .into_iter()
        .enumerate()
        .map(|(i, (l, r))| {
            let mut entry = EvalResultEntry::new(i as LogicalTime);
            side(&mut entry, "left", &left_keys, l.map(|l| left_rows[l]), placeholder);
            side(&mut entry, "right", &right_keys, r.map(|r| right_rows[r]), placeholder);
            entry
        })
        .collect();
    EvalResult::from_entries(entries)
}

/// Numeric relation tried between paired values
#[derive(Debug, Clone, Copy, PartialEq)]
enum Heuristic {
    Identity,
    Offset(f64),
    Ratio(f64),
}

impl Heuristic {
    fn label(&self) -> &'static str {
        match self {
            Heuristic::Identity => "identity",
            Heuristic::Offset(_) => "offset",
            Heuristic::Ratio(_) => "ratio",
        }
    }

    fn predict(&self, left: f64) -> f64 {
        match self {
            Heuristic::Identity => left,
            Heuristic::Offset(delta) => left + delta,
            Heuristic::Ratio(scale) => left * scale,
        }
    }
}

/// Heuristics in trial order, calibrated on a reference pair
fn calibrate(left: f64, right: f64) -> Vec<Heuristic> {
    let mut out = vec![Heuristic::Identity, Heuristic::Offset(right - left)];
    if left != 0.0 {
        out.push(Heuristic::Ratio(right / left));
    }
    out
}

fn close(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance * 1f64.max(a.abs()).max(b.abs())
}

struct Aligner {
    heuristics: Vec<Heuristic>,
    current: usize,
    tolerance: f64,
}

impl Aligner {
    fn new(tolerance: f64) -> Self {
        Self {
            heuristics: Vec::new(),
            current: 0,
            tolerance,
        }
    }

    fn step(&mut self, left: &Value, right: &Value) -> &'static str {
        let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) else {
            return if left.loose_eq(right) { "identity" } else { "mismatch" };
        };
        if self.heuristics.is_empty() {
            self.heuristics = calibrate(l, r);
        }
        let tolerance = self.tolerance;
        let found = (self.current..self.heuristics.len())
            .find(|&h| close(self.heuristics[h].predict(l), r, tolerance));
        match found {
            Some(h) => {
                self.current = h;
                self.heuristics[h].label()
            }
            None => {
                self.heuristics = calibrate(l, r);
                self.current = 0;
                "mismatch"
            }
        }
    }
}

/// Pair keys positionally and label how each right value relates to its
/// left counterpart
pub fn align(left: &EvalResult, right: &EvalResult, tolerance: f64) -> EvalResult {
    let pairs: Vec<(String, String)> = left.keys().into_iter().zip(right.keys()).collect();
    let mut aligners: Vec<Aligner> = pairs.iter().map(|_| Aligner::new(tolerance)).collect();

    let mut times: Vec<LogicalTime> = left
        .entries()
        .iter()
        .chain(right.entries())
        .map(|e| e.time)
        .collect();
    times.sort_unstable();
    times.dedup();

    let mut entries = Vec::with_capacity(times.len());
    for t in times {
        let (l_row, r_row) = (left.get(t), right.get(t));
        let mut entry = EvalResultEntry::new(t);
        for ((lk, rk), aligner) in pairs.iter().zip(aligners.iter_mut()) {
            let l = l_row.and_then(|row| row.get(lk).cloned().flatten());
            let r = r_row.and_then(|row| row.get(rk).cloned().flatten());
            let label = match (&l, &r) {
                (Some(l), Some(r)) => Some(Value::str(aligner.step(l, r))),
                _ => None,
            };
            entry.set(&format!("left.{lk}"), l);
            entry.set(&format!("right.{rk}"), r);
            entry.set(&format!("align.{lk}"), label);
        }
        entries.push(entry);
    }
    EvalResult::from_entries(entries)
}
