//! Temporal combinators over finite satisfaction series
//!
//! Every function takes series aligned to the same window (`a[i]` is the
//! instant `window.first + i`) and returns a series of the same length.

/// `a` holds from `t` up to the first instant `b` holds
///
/// Anchored at `b`'s first witness `k`: true at `t <= k` when `a` holds on
/// all of `[t, k)`, false after `k`, false everywhere if `b` never holds.
pub fn until(a: &[bool], b: &[bool]) -> Vec<bool> {
    let mut out = vec![false; a.len()];
    let Some(k) = b.iter().position(|&x| x) else {
        return out;
    };
    out[k] = true;
    for t in (0..k).rev() {
        out[t] = a[t] && out[t + 1];
    }
    out
}

/// `b` holds at every instant until (and excluding) one where `a` held
pub fn release(a: &[bool], b: &[bool]) -> Vec<bool> {
    let mut out = vec![false; a.len()];
    let mut after = true;
    for t in (0..a.len()).rev() {
        out[t] = b[t] && (a[t] || after);
        after = out[t];
    }
    out
}

pub fn globally(a: &[bool]) -> Vec<bool> {
    release(&vec![false; a.len()], a)
}

pub fn finally(a: &[bool]) -> Vec<bool> {
    until(&vec![true; a.len()], a)
}

/// `a` holds at the following instant
pub fn next(a: &[bool]) -> Vec<bool> {
    let mut out: Vec<bool> = a.iter().skip(1).copied().collect();
    if !a.is_empty() {
        out.push(false);
    }
    out
}

/// From each instant on, `a` holds before `b` does
pub fn before(a: &[bool], b: &[bool]) -> Vec<bool> {
    let not_b: Vec<bool> = b.iter().map(|x| !x).collect();
    until(&not_b, a)
}

pub fn after(a: &[bool], b: &[bool]) -> Vec<bool> {
    before(b, a)
}

/// Only the first satisfying instant
pub fn first(a: &[bool]) -> Vec<bool> {
    let mut out = vec![false; a.len()];
    if let Some(i) = a.iter().position(|&x| x) {
        out[i] = true;
    }
    out
}

/// Only the last satisfying instant
pub fn last(a: &[bool]) -> Vec<bool> {
    let mut out = vec![false; a.len()];
    if let Some(i) = a.iter().rposition(|&x| x) {
        out[i] = true;
    }
    out
}

/// From `a`'s first satisfaction through `b`'s last
pub fn range(a: &[bool], b: &[bool]) -> Vec<bool> {
    let mut out = vec![false; a.len()];
    if let (Some(start), Some(end)) = (a.iter().position(|&x| x), b.iter().rposition(|&x| x)) {
        if start <= end {
            out[start..=end].iter_mut().for_each(|x| *x = true);
        }
    }
    out
}

/// For each run of `a`, the span from the run's start to the first instant
/// after the run where `b` holds
pub fn and_then(a: &[bool], b: &[bool]) -> Vec<bool> {
    let mut out = vec![false; a.len()];
    let mut t = 0;
    while t < a.len() {
        if !a[t] {
            t += 1;
            continue;
        }
        let start = t;
        while t < a.len() && a[t] {
            t += 1;
        }
        if let Some(offset) = b[t..].iter().position(|&x| x) {
            out[start..=t + offset].iter_mut().for_each(|x| *x = true);
        }
    }
    out
}

pub fn and(a: &[bool], b: &[bool]) -> Vec<bool> {
    a.iter().zip(b).map(|(x, y)| *x && *y).collect()
}

pub fn or(a: &[bool], b: &[bool]) -> Vec<bool> {
    a.iter().zip(b).map(|(x, y)| *x || *y).collect()
}

pub fn not(a: &[bool]) -> Vec<bool> {
    a.iter().map(|x| !x).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(s: &str) -> Vec<bool> {
        s.chars().map(|c| c == '1').collect()
    }

    #[test]
    fn test_until_anchored_at_first_witness() {
        assert_eq!(until(&bits("11111"), &bits("00011")), bits("11110"));
        assert_eq!(until(&bits("10111"), &bits("00010")), bits("00110"));
        assert_eq!(until(&bits("11111"), &bits("00000")), bits("00000"));
        assert_eq!(until(&bits("00000"), &bits("10000")), bits("10000"));
    }

    #[test]
    fn test_release_and_globally() {
        assert_eq!(release(&bits("00100"), &bits("11100")), bits("11100"));
        assert_eq!(release(&bits("00000"), &bits("11011")), bits("00011"));
        assert_eq!(globally(&bits("10111")), bits("00111"));
    }

    #[test]
    fn test_finally() {
        assert_eq!(finally(&bits("00101")), bits("11100"));
    }

    #[test]
    fn test_next() {
        assert_eq!(next(&bits("0101")), bits("1010"));
        assert!(next(&[]).is_empty());
    }

    #[test]
    fn test_before_after() {
        // a at 1, b at 3: a comes first
        assert_eq!(before(&bits("01000"), &bits("00010")), bits("11000"));
        // b at 1 is already past from instant 2 on
        assert_eq!(before(&bits("00010"), &bits("01000")), bits("00110"));
        assert_eq!(after(&bits("00010"), &bits("01000")), bits("11000"));
    }

    #[test]
    fn test_first_last_range() {
        assert_eq!(first(&bits("0110")), bits("0100"));
        assert_eq!(last(&bits("0110")), bits("0010"));
        assert_eq!(range(&bits("01000"), &bits("00011")), bits("01111"));
        assert_eq!(range(&bits("00010"), &bits("01000")), bits("00000"));
    }

    #[test]
    fn test_and_then() {
        assert_eq!(and_then(&bits("1100000"), &bits("0100100")), bits("1111100"));
        assert_eq!(and_then(&bits("0011"), &bits("1000")), bits("0000"));
        assert_eq!(
            and_then(&bits("1001000"), &bits("0010010")),
            bits("1111110")
        );
    }
}
