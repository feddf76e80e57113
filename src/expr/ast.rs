//! Expression syntax tree

use crate::core::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

/// Binding target of a comprehension
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Tuple(Vec<Target>),
}

impl Target {
    fn names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Target::Name(name) => out.push(name),
            Target::Tuple(items) => items.iter().for_each(|t| t.names(out)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Variable, optionally pinned to the scope of a source line
    Name {
        name: String,
        line: Option<u32>,
    },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Set(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attribute(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Slice {
        target: Box<Expr>,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Chained comparison `a < b <= c`
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    IfElse {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    ListComp {
        element: Box<Expr>,
        target: Target,
        iter: Box<Expr>,
        condition: Option<Box<Expr>>,
    },
}

impl Expr {
    /// Variables the expression reads from the trace, in first-use order
    ///
    /// Called names (`len(x)`) and comprehension targets are excluded.
    pub fn free_names(&self) -> Vec<(String, Option<u32>)> {
        let mut out = Vec::new();
        self.collect_names(&mut Vec::new(), &mut out);
        out
    }

    fn collect_names<'a>(&'a self, bound: &mut Vec<&'a str>, out: &mut Vec<(String, Option<u32>)>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Name { name, line } => {
                let entry = (name.clone(), *line);
                if !bound.contains(&name.as_str()) && !out.contains(&entry) {
                    out.push(entry);
                }
            }
            Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => {
                items.iter().for_each(|e| e.collect_names(bound, out))
            }
            Expr::Dict(entries) => {
                for (k, v) in entries {
                    k.collect_names(bound, out);
                    v.collect_names(bound, out);
                }
            }
            Expr::Attribute(target, _) | Expr::Unary(_, target) => target.collect_names(bound, out),
            Expr::Index(target, index) => {
                target.collect_names(bound, out);
                index.collect_names(bound, out);
            }
            Expr::Slice { target, lower, upper } => {
                target.collect_names(bound, out);
                for e in [lower, upper].into_iter().flatten() {
                    e.collect_names(bound, out);
                }
            }
            Expr::Call { func, args } => {
                if !matches!(**func, Expr::Name { .. }) {
                    func.collect_names(bound, out);
                }
                args.iter().for_each(|e| e.collect_names(bound, out));
            }
            Expr::Binary(_, a, b) | Expr::And(a, b) | Expr::Or(a, b) => {
                a.collect_names(bound, out);
                b.collect_names(bound, out);
            }
            Expr::Compare { first, rest } => {
                first.collect_names(bound, out);
                rest.iter().for_each(|(_, e)| e.collect_names(bound, out));
            }
            Expr::IfElse { test, body, orelse } => {
                test.collect_names(bound, out);
                body.collect_names(bound, out);
                orelse.collect_names(bound, out);
            }
            Expr::ListComp {
                element,
                target,
                iter,
                condition,
            } => {
                iter.collect_names(bound, out);
                let depth = bound.len();
                target.names(bound);
                element.collect_names(bound, out);
                if let Some(condition) = condition {
                    condition.collect_names(bound, out);
                }
                bound.truncate(depth);
            }
        }
    }

    /// True if the expression is a bare variable reference
    pub fn as_name(&self) -> Option<(&str, Option<u32>)> {
        match self {
            Expr::Name { name, line } => Some((name, *line)),
            _ => None,
        }
    }
}
