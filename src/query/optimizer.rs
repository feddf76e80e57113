//! Rewrites derived operators into the core set before evaluation

use crate::query::operator::Operator;

/// Rewrite `op` bottom-up
///
/// Globally, Finally, Before and After reduce to Release and Until;
/// double negation cancels. A `Not` over a selector first turns the
/// selector into its truthiness series.
pub fn optimize(op: Operator) -> Operator {
    match op {
        Operator::Globally(a) => Operator::Release(Box::new(Operator::Const(false)), boxed(*a)),
        Operator::Finally(a) => Operator::Until(Box::new(Operator::Const(true)), boxed(*a)),
        Operator::After(a, b) => optimize(Operator::Before(b, a)),
        Operator::Before(a, b) => optimize(Operator::Until(Box::new(Operator::Not(b)), a)),
        Operator::Not(a) => match optimize(*a) {
            Operator::Not(inner) => *inner,
            inner if inner.is_boolean() => Operator::Not(Box::new(inner)),
            inner => Operator::Not(Box::new(Operator::Whenever(Box::new(inner)))),
        },
        Operator::And(a, b) => Operator::And(boxed(*a), boxed(*b)),
        Operator::Or(a, b) => Operator::Or(boxed(*a), boxed(*b)),
        Operator::Whenever(a) => Operator::Whenever(boxed(*a)),
        Operator::Until(a, b) => Operator::Until(boxed(*a), boxed(*b)),
        Operator::Release(a, b) => Operator::Release(boxed(*a), boxed(*b)),
        Operator::Next(a) => Operator::Next(boxed(*a)),
        Operator::First(a) => Operator::First(boxed(*a)),
        Operator::Last(a) => Operator::Last(boxed(*a)),
        Operator::Range(a, b) => Operator::Range(boxed(*a), boxed(*b)),
        Operator::AndThen(a, b) => Operator::AndThen(boxed(*a), boxed(*b)),
        Operator::VarSelector(cond) => Operator::VarSelector(cond.map(|c| boxed(*c))),
        Operator::Union(children) => Operator::Union(children.into_iter().map(optimize).collect()),
        Operator::Where(a, b) => Operator::Where(boxed(*a), boxed(*b)),
        Operator::Align(a, b) => Operator::Align(boxed(*a), boxed(*b)),
        Operator::Meld(a, b) => Operator::Meld(boxed(*a), boxed(*b)),
        leaf => leaf,
    }
}

fn boxed(op: Operator) -> Box<Operator> {
    Box::new(optimize(op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_expression;

    fn raw(text: &str) -> Box<Operator> {
        Box::new(Operator::raw(text, parse_expression(text).unwrap()))
    }

    #[test]
    fn test_derived_operators_reduce() {
        let op = optimize(Operator::Globally(raw("x > 1")));
        assert_eq!(op.to_string(), "Release(Const(False), x > 1)");
        let op = optimize(Operator::Finally(raw("x")));
        assert_eq!(op.to_string(), "Until(Const(True), x)");
        let op = optimize(Operator::After(raw("a"), raw("b")));
        assert_eq!(op.to_string(), "Until(Not(Whenever(a)), b)");
    }

    #[test]
    fn test_double_negation() {
        let cond = Operator::LineHit(3);
        let op = optimize(Operator::Not(Box::new(Operator::Not(Box::new(cond.clone())))));
        assert_eq!(op, cond);
        let op = optimize(Operator::Not(Box::new(Operator::Not(raw("x")))));
        assert_eq!(op.to_string(), "Whenever(x)");
    }

    #[test]
    fn test_rewrites_nested_children() {
        let op = optimize(Operator::And(
            Box::new(Operator::Finally(raw("a"))),
            Box::new(Operator::Const(true)),
        ));
        assert_eq!(op.to_string(), "And(Until(Const(True), a), Const(True))");
    }
}
