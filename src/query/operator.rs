//! Operator tree
//!
//! Every operator is a variant of the closed [`Operator`] enum.
//! [`OperatorKind`] mirrors the variants without their children and carries
//! the per-kind metadata the front-end needs: keyword, arity and whether the
//! operator yields a plain satisfaction series.

use crate::expr::Expr;
use std::fmt;

type Child = Box<Operator>;

#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Const(bool),
    /// Expression evaluated at every instant
    Raw {
        text: String,
        expr: Expr,
        line: Option<u32>,
    },
    And(Child, Child),
    Or(Child, Child),
    Not(Child),
    /// Satisfaction of a non-boolean operator as a boolean series
    Whenever(Child),
    Until(Child, Child),
    Release(Child, Child),
    Globally(Child),
    Finally(Child),
    Next(Child),
    Before(Child, Child),
    After(Child, Child),
    First(Child),
    Last(Child),
    Range(Child, Child),
    AndThen(Child, Child),
    VarSelector(Option<Child>),
    Type {
        text: String,
        expr: Expr,
        line: Option<u32>,
    },
    LineNo,
    LineHit(u32),
    InFunction(String),
    LoopIteration {
        line: u32,
        index: usize,
    },
    LoopSummary {
        line: u32,
    },
    Union(Vec<Operator>),
    Where(Child, Child),
    Align(Child, Child),
    Meld(Child, Child),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Const,
    Raw,
    And,
    Or,
    Not,
    Whenever,
    Until,
    Release,
    Globally,
    Finally,
    Next,
    Before,
    After,
    First,
    Last,
    Range,
    AndThen,
    VarSelector,
    Type,
    LineNo,
    LineHit,
    InFunction,
    LoopIteration,
    LoopSummary,
    Union,
    Where,
    Align,
    Meld,
}

/// Argument count bounds of an operator call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    /// `None` for variadic operators
    pub max: Option<usize>,
}

impl Arity {
    const fn exactly(n: usize) -> Self {
        Arity { min: n, max: Some(n) }
    }

    const fn between(min: usize, max: usize) -> Self {
        Arity { min, max: Some(max) }
    }

    pub fn accepts(&self, n: usize) -> bool {
        n >= self.min && self.max.map_or(true, |max| n <= max)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{max}"),
            Some(max) => write!(f, "{} to {}", self.min, max),
            None => write!(f, "at least {}", self.min),
        }
    }
}

impl OperatorKind {
    pub const ALL: [OperatorKind; 28] = [
        OperatorKind::Const,
        OperatorKind::Raw,
        OperatorKind::And,
        OperatorKind::Or,
        OperatorKind::Not,
        OperatorKind::Whenever,
        OperatorKind::Until,
        OperatorKind::Release,
        OperatorKind::Globally,
        OperatorKind::Finally,
        OperatorKind::Next,
        OperatorKind::Before,
        OperatorKind::After,
        OperatorKind::First,
        OperatorKind::Last,
        OperatorKind::Range,
        OperatorKind::AndThen,
        OperatorKind::VarSelector,
        OperatorKind::Type,
        OperatorKind::LineNo,
        OperatorKind::LineHit,
        OperatorKind::InFunction,
        OperatorKind::LoopIteration,
        OperatorKind::LoopSummary,
        OperatorKind::Union,
        OperatorKind::Where,
        OperatorKind::Align,
        OperatorKind::Meld,
    ];

    /// Canonical spelling
    pub fn keyword(&self) -> &'static str {
        match self {
            OperatorKind::Const => "Const",
            OperatorKind::Raw => "Raw",
            OperatorKind::And => "And",
            OperatorKind::Or => "Or",
            OperatorKind::Not => "Not",
            OperatorKind::Whenever => "Whenever",
            OperatorKind::Until => "Until",
            OperatorKind::Release => "Release",
            OperatorKind::Globally => "Globally",
            OperatorKind::Finally => "Finally",
            OperatorKind::Next => "Next",
            OperatorKind::Before => "Before",
            OperatorKind::After => "After",
            OperatorKind::First => "First",
            OperatorKind::Last => "Last",
            OperatorKind::Range => "Range",
            OperatorKind::AndThen => "AndThen",
            OperatorKind::VarSelector => "VarSelector",
            OperatorKind::Type => "Type",
            OperatorKind::LineNo => "LineNo",
            OperatorKind::LineHit => "LineHit",
            OperatorKind::InFunction => "InFunction",
            OperatorKind::LoopIteration => "LoopIteration",
            OperatorKind::LoopSummary => "LoopSummary",
            OperatorKind::Union => "Union",
            OperatorKind::Where => "Where",
            OperatorKind::Align => "Align",
            OperatorKind::Meld => "Meld",
        }
    }

    /// Look up a keyword ignoring case and underscores
    pub fn from_keyword(word: &str) -> Option<OperatorKind> {
        let wanted = normalize(word);
        Self::ALL
            .iter()
            .copied()
            .find(|kind| normalize(kind.keyword()) == wanted)
    }

    pub fn arity(&self) -> Arity {
        match self {
            OperatorKind::LineNo => Arity::exactly(0),
            OperatorKind::VarSelector => Arity::between(0, 1),
            OperatorKind::Raw | OperatorKind::Type => Arity::between(1, 2),
            OperatorKind::Const
            | OperatorKind::Not
            | OperatorKind::Whenever
            | OperatorKind::Globally
            | OperatorKind::Finally
            | OperatorKind::Next
            | OperatorKind::First
            | OperatorKind::Last
            | OperatorKind::LineHit
            | OperatorKind::InFunction
            | OperatorKind::LoopSummary => Arity::exactly(1),
            OperatorKind::Until
            | OperatorKind::Release
            | OperatorKind::Before
            | OperatorKind::After
            | OperatorKind::Range
            | OperatorKind::AndThen
            | OperatorKind::LoopIteration
            | OperatorKind::Where
            | OperatorKind::Align
            | OperatorKind::Meld => Arity::exactly(2),
            OperatorKind::And | OperatorKind::Or => Arity { min: 2, max: None },
            OperatorKind::Union => Arity { min: 1, max: None },
        }
    }

    /// True if the operator yields a satisfaction series keyed by itself
    pub fn is_boolean(&self) -> bool {
        !matches!(
            self,
            OperatorKind::Raw
                | OperatorKind::VarSelector
                | OperatorKind::Type
                | OperatorKind::LineNo
                | OperatorKind::LoopIteration
                | OperatorKind::LoopSummary
                | OperatorKind::Union
                | OperatorKind::Where
                | OperatorKind::Align
                | OperatorKind::Meld
        )
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

fn normalize(word: &str) -> String {
    word.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl Operator {
    pub fn kind(&self) -> OperatorKind {
        match self {
            Operator::Const(_) => OperatorKind::Const,
            Operator::Raw { .. } => OperatorKind::Raw,
            Operator::And(..) => OperatorKind::And,
            Operator::Or(..) => OperatorKind::Or,
            Operator::Not(_) => OperatorKind::Not,
            Operator::Whenever(_) => OperatorKind::Whenever,
            Operator::Until(..) => OperatorKind::Until,
            Operator::Release(..) => OperatorKind::Release,
            Operator::Globally(_) => OperatorKind::Globally,
            Operator::Finally(_) => OperatorKind::Finally,
            Operator::Next(_) => OperatorKind::Next,
            Operator::Before(..) => OperatorKind::Before,
            Operator::After(..) => OperatorKind::After,
            Operator::First(_) => OperatorKind::First,
            Operator::Last(_) => OperatorKind::Last,
            Operator::Range(..) => OperatorKind::Range,
            Operator::AndThen(..) => OperatorKind::AndThen,
            Operator::VarSelector(_) => OperatorKind::VarSelector,
            Operator::Type { .. } => OperatorKind::Type,
            Operator::LineNo => OperatorKind::LineNo,
            Operator::LineHit(_) => OperatorKind::LineHit,
            Operator::InFunction(_) => OperatorKind::InFunction,
            Operator::LoopIteration { .. } => OperatorKind::LoopIteration,
            Operator::LoopSummary { .. } => OperatorKind::LoopSummary,
            Operator::Union(_) => OperatorKind::Union,
            Operator::Where(..) => OperatorKind::Where,
            Operator::Align(..) => OperatorKind::Align,
            Operator::Meld(..) => OperatorKind::Meld,
        }
    }

    pub fn is_boolean(&self) -> bool {
        self.kind().is_boolean()
    }

    /// Plain expression selector
    pub fn raw(text: &str, expr: Expr) -> Operator {
        let line = match &expr {
            Expr::Name { line, .. } => *line,
            _ => None,
        };
        Operator::Raw {
            text: text.trim().to_string(),
            expr,
            line,
        }
    }

    /// Direct children, left to right
    pub fn children(&self) -> Vec<&Operator> {
        match self {
            Operator::And(a, b)
            | Operator::Or(a, b)
            | Operator::Until(a, b)
            | Operator::Release(a, b)
            | Operator::Before(a, b)
            | Operator::After(a, b)
            | Operator::Range(a, b)
            | Operator::AndThen(a, b)
            | Operator::Where(a, b)
            | Operator::Align(a, b)
            | Operator::Meld(a, b) => vec![a.as_ref(), b.as_ref()],
            Operator::Not(a)
            | Operator::Whenever(a)
            | Operator::Globally(a)
            | Operator::Finally(a)
            | Operator::Next(a)
            | Operator::First(a)
            | Operator::Last(a) => vec![a.as_ref()],
            Operator::VarSelector(cond) => cond.iter().map(|c| c.as_ref()).collect(),
            Operator::Union(children) => children.iter().collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Const(b) => write!(f, "Const({})", if *b { "True" } else { "False" }),
            Operator::Raw { text, .. } => f.write_str(text),
            Operator::Type { text, line, .. } => match line {
                Some(line) if !text.contains('@') => write!(f, "Type({text}, {line})"),
                _ => write!(f, "Type({text})"),
            },
            Operator::LineHit(line) => write!(f, "LineHit({line})"),
            Operator::InFunction(name) => write!(f, "InFunction({name:?})"),
            Operator::LoopIteration { line, index } => write!(f, "LoopIteration({line}, {index})"),
            Operator::LoopSummary { line } => write!(f, "LoopSummary({line})"),
            other => {
                write!(f, "{}(", other.kind())?;
                for (i, child) in other.children().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_expression;

    fn raw(text: &str) -> Operator {
        Operator::raw(text, parse_expression(text).unwrap())
    }

    #[test]
    fn test_keywords_are_normalized() {
        assert_eq!(OperatorKind::from_keyword("and_then"), Some(OperatorKind::AndThen));
        assert_eq!(OperatorKind::from_keyword("UNTIL"), Some(OperatorKind::Until));
        assert_eq!(OperatorKind::from_keyword("line_no"), Some(OperatorKind::LineNo));
        assert_eq!(OperatorKind::from_keyword("frobnicate"), None);
    }

    #[test]
    fn test_all_kinds_have_unique_keywords() {
        let mut seen = std::collections::HashSet::new();
        for kind in OperatorKind::ALL {
            assert!(seen.insert(normalize(kind.keyword())), "duplicate {kind}");
            assert_eq!(OperatorKind::from_keyword(kind.keyword()), Some(kind));
        }
    }

    #[test]
    fn test_display_is_stable() {
        let op = Operator::Until(Box::new(raw("a > 0")), Box::new(raw("b == 5")));
        assert_eq!(op.to_string(), "Until(a > 0, b == 5)");
        assert!(op.is_boolean());
        assert!(!raw("x").is_boolean());
        assert_eq!(Operator::VarSelector(None).to_string(), "VarSelector()");
    }

    #[test]
    fn test_arity() {
        assert!(OperatorKind::Until.arity().accepts(2));
        assert!(!OperatorKind::Until.arity().accepts(3));
        assert!(OperatorKind::Union.arity().accepts(5));
        assert_eq!(OperatorKind::Raw.arity().to_string(), "1 to 2");
    }

    #[test]
    fn test_scope_qualifier_sets_line() {
        match raw("x@7") {
            Operator::Raw { line, .. } => assert_eq!(line, Some(7)),
            other => panic!("unexpected {other}"),
        }
    }
}
