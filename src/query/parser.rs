//! Query front-end: select lists and operator-call syntax
//!
//! A select item is either an operator call such as `Until(a > 0, b == 5)`,
//! with keywords matched ignoring case and underscores, or a bare expression
//! that becomes a `Raw` selector. `(lo, hi) = Op(...)` renames the keys of a
//! multi-valued selector positionally.

use crate::error::{Error, Result};
use crate::expr::lexer::{tokenize, Token};
use crate::expr::{parse_expression, Expr};
use crate::query::operator::{Operator, OperatorKind};
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, alphanumeric1, char, multispace0};
use nom::combinator::{map, not, recognize};
use nom::multi::{many0_count, separated_list1};
use nom::sequence::{delimited, pair, terminated, tuple};
use nom::IResult;

/// Deepest operator-call nesting accepted in one selector
pub const MAX_OPERATOR_NESTING: usize = 64;

/// One comma-separated item of a select list
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    /// Names from a `(a, b) = ...` prefix; empty otherwise
    pub targets: Vec<String>,
    pub operator: Operator,
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn targets(input: &str) -> IResult<&str, Vec<String>> {
    let (rest, names) = delimited(
        pair(char('('), multispace0),
        separated_list1(
            tuple((multispace0, char(','), multispace0)),
            map(identifier, str::to_string),
        ),
        pair(multispace0, char(')')),
    )(input)?;
    let (rest, _) = tuple((multispace0, char('='), not(char('=')), multispace0))(rest)?;
    Ok((rest, names))
}

fn call_head(input: &str) -> IResult<&str, &str> {
    terminated(identifier, pair(multispace0, char('(')))(input)
}

/// Split on commas outside brackets and string literals
fn split_top_level(text: &str) -> Result<Vec<&str>> {
    let unbalanced = || Error::Parse(format!("unbalanced brackets or quotes in {text:?}"));
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.checked_sub(1).ok_or_else(unbalanced)?,
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 || quote.is_some() {
        return Err(unbalanced());
    }
    parts.push(&text[start..]);
    Ok(parts)
}

/// Byte offset of the `)` closing a call whose `(` was just consumed
fn closing(rest: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' if depth == 0 => return Some(i),
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

/// Parse a comma-separated select list
pub fn parse_select(text: &str) -> Result<Vec<SelectItem>> {
    split_top_level(text)?
        .into_iter()
        .map(|item| parse_item(item.trim()))
        .collect()
}

fn parse_item(item: &str) -> Result<SelectItem> {
    if item.is_empty() {
        return Err(Error::Parse("empty select item".to_string()));
    }
    match targets(item) {
        Ok((rest, names)) => Ok(SelectItem {
            targets: names,
            operator: parse_operator(rest)?,
        }),
        Err(_) => Ok(SelectItem {
            targets: Vec::new(),
            operator: parse_operator(item)?,
        }),
    }
}

/// Parse one operator call, falling back to a `Raw` expression
pub fn parse_operator(text: &str) -> Result<Operator> {
    operator_at(text, 0)
}

fn operator_at(text: &str, depth: usize) -> Result<Operator> {
    if depth >= MAX_OPERATOR_NESTING {
        return Err(Error::Parse(format!(
            "operators nested deeper than {MAX_OPERATOR_NESTING} levels"
        )));
    }
    let text = text.trim();
    if let Some((kind, args)) = keyword_call(text)? {
        return build(kind, &args, depth + 1);
    }
    if text.is_empty() {
        return Err(Error::Parse("empty selector".to_string()));
    }
    Ok(Operator::raw(text, parse_expression(text)?))
}

// Only a call spanning the whole text is an operator; `Until(a, b) and c`
// is an expression.
fn keyword_call(text: &str) -> Result<Option<(OperatorKind, Vec<&str>)>> {
    let Ok((rest, head)) = call_head(text) else {
        return Ok(None);
    };
    let Some(kind) = OperatorKind::from_keyword(head) else {
        return Ok(None);
    };
    match closing(rest) {
        Some(end) if end + 1 == rest.len() => {
            let inner = &rest[..end];
            let args = if inner.trim().is_empty() {
                Vec::new()
            } else {
                split_top_level(inner)?.into_iter().map(str::trim).collect()
            };
            Ok(Some((kind, args)))
        }
        _ => Ok(None),
    }
}

fn build(kind: OperatorKind, args: &[&str], depth: usize) -> Result<Operator> {
    let arity = kind.arity();
    if !arity.accepts(args.len()) {
        return Err(Error::Arity {
            operator: kind.to_string(),
            expected: arity.to_string(),
            found: args.len(),
        });
    }
    if args.iter().any(|arg| arg.is_empty()) {
        return Err(Error::Parse(format!("empty argument to {kind}")));
    }
    let child = |i: usize| operator_at(args[i], depth).map(Box::new);

    let op = match kind {
        OperatorKind::Const => Operator::Const(bool_literal(kind, args[0])?),
        OperatorKind::Raw => {
            let (text, expr, line) = expression_args(kind, args)?;
            let text = match (args.get(1), expr.as_name()) {
                (None, _) => text,
                (Some(_), Some((name, None))) => format!("{name}@{}", line.unwrap_or_default()),
                (Some(_), _) => format!("Raw({text}, {})", line.unwrap_or_default()),
            };
            Operator::Raw { text, expr, line }
        }
        OperatorKind::Type => {
            let (text, expr, line) = expression_args(kind, args)?;
            Operator::Type { text, expr, line }
        }
        OperatorKind::And => fold(args, Operator::And, depth)?,
        OperatorKind::Or => fold(args, Operator::Or, depth)?,
        OperatorKind::Not => Operator::Not(child(0)?),
        OperatorKind::Whenever => Operator::Whenever(child(0)?),
        OperatorKind::Until => Operator::Until(child(0)?, child(1)?),
        OperatorKind::Release => Operator::Release(child(0)?, child(1)?),
        OperatorKind::Globally => Operator::Globally(child(0)?),
        OperatorKind::Finally => Operator::Finally(child(0)?),
        OperatorKind::Next => Operator::Next(child(0)?),
        OperatorKind::Before => Operator::Before(child(0)?, child(1)?),
        OperatorKind::After => Operator::After(child(0)?, child(1)?),
        OperatorKind::First => Operator::First(child(0)?),
        OperatorKind::Last => Operator::Last(child(0)?),
        OperatorKind::Range => Operator::Range(child(0)?, child(1)?),
        OperatorKind::AndThen => Operator::AndThen(child(0)?, child(1)?),
        OperatorKind::VarSelector => match args.first() {
            Some(arg) => Operator::VarSelector(Some(Box::new(operator_at(arg, depth)?))),
            None => Operator::VarSelector(None),
        },
        OperatorKind::LineNo => Operator::LineNo,
        OperatorKind::LineHit => Operator::LineHit(line_literal(kind, args[0])?),
        OperatorKind::InFunction => Operator::InFunction(name_literal(kind, args[0])?),
        OperatorKind::LoopIteration => Operator::LoopIteration {
            line: line_literal(kind, args[0])?,
            index: usize::try_from(int_literal(kind, args[1])?)
                .map_err(|_| Error::Parse(format!("{kind} expects a non-negative index")))?,
        },
        OperatorKind::LoopSummary => Operator::LoopSummary {
            line: line_literal(kind, args[0])?,
        },
        OperatorKind::Union => Operator::Union(
            args.iter()
                .map(|arg| operator_at(arg, depth))
                .collect::<Result<Vec<_>>>()?,
        ),
        OperatorKind::Where => Operator::Where(child(0)?, child(1)?),
        OperatorKind::Align => Operator::Align(child(0)?, child(1)?),
        OperatorKind::Meld => Operator::Meld(child(0)?, child(1)?),
    };
    Ok(op)
}

/// Left fold of a variadic logical operator
fn fold(
    args: &[&str],
    join: fn(Box<Operator>, Box<Operator>) -> Operator,
    depth: usize,
) -> Result<Operator> {
    let mut acc = operator_at(args[0], depth)?;
    for arg in &args[1..] {
        acc = join(Box::new(acc), Box::new(operator_at(arg, depth)?));
    }
    Ok(acc)
}

/// Expression text (a quoted string is unquoted), parsed form and scope line
fn expression_args(kind: OperatorKind, args: &[&str]) -> Result<(String, Expr, Option<u32>)> {
    let text = match literal(args[0]) {
        Some(Token::Str(s)) => s,
        _ => args[0].to_string(),
    };
    let text = text.trim().to_string();
    let expr = parse_expression(&text)?;
    let line = match args.get(1) {
        Some(arg) => Some(line_literal(kind, arg)?),
        None => expr.as_name().and_then(|(_, line)| line),
    };
    Ok((text, expr, line))
}

fn literal(arg: &str) -> Option<Token> {
    match tokenize(arg).ok()?.as_slice() {
        [token] => Some(token.clone()),
        _ => None,
    }
}

fn int_literal(kind: OperatorKind, arg: &str) -> Result<i64> {
    match literal(arg) {
        Some(Token::Int(i)) => Ok(i),
        _ => Err(Error::Parse(format!("{kind} expects an integer, got {arg:?}"))),
    }
}

fn line_literal(kind: OperatorKind, arg: &str) -> Result<u32> {
    u32::try_from(int_literal(kind, arg)?)
        .map_err(|_| Error::Parse(format!("{kind} expects a line number, got {arg:?}")))
}

fn name_literal(kind: OperatorKind, arg: &str) -> Result<String> {
    match literal(arg) {
        Some(Token::Str(s)) | Some(Token::Name(s)) => Ok(s),
        _ => Err(Error::Parse(format!("{kind} expects a name, got {arg:?}"))),
    }
}

fn bool_literal(kind: OperatorKind, arg: &str) -> Result<bool> {
    match literal(arg) {
        Some(Token::Int(1)) => Ok(true),
        Some(Token::Int(0)) => Ok(false),
        Some(Token::Name(name)) if name.eq_ignore_ascii_case("true") => Ok(true),
        Some(Token::Name(name)) if name.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(Error::Parse(format!("{kind} expects True or False, got {arg:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(text: &str) -> String {
        parse_operator(text).unwrap().to_string()
    }

    #[test]
    fn test_keywords_ignore_case_and_underscores() {
        assert_eq!(op("until(a > 0, and_then(x, y))"), "Until(a > 0, AndThen(x, y))");
        assert_eq!(op("WHENEVER(flag)"), "Whenever(flag)");
    }

    #[test]
    fn test_non_keyword_calls_are_expressions() {
        assert!(matches!(parse_operator("len(xs) > 2").unwrap(), Operator::Raw { .. }));
        assert!(matches!(parse_operator("Until(a, b) and c").unwrap(), Operator::Raw { .. }));
    }

    #[test]
    fn test_arity_is_checked() {
        match parse_operator("Until(a)").unwrap_err() {
            Error::Arity { operator, expected, found } => {
                assert_eq!((operator.as_str(), expected.as_str(), found), ("Until", "2", 1));
            }
            other => panic!("unexpected {other}"),
        }
        assert!(matches!(parse_operator("LineNo(3)"), Err(Error::Arity { .. })));
    }

    #[test]
    fn test_variadic_logic_folds_left() {
        assert_eq!(op("And(a, b, c)"), "And(And(a, b), c)");
    }

    #[test]
    fn test_literal_arguments() {
        assert_eq!(op("Raw('a>0')"), "a>0");
        assert_eq!(op("Raw(x, 12)"), "x@12");
        assert_eq!(op("Raw('x + 1', 12)"), "Raw(x + 1, 12)");
        assert_eq!(op("LoopIteration(4, 2)"), "LoopIteration(4, 2)");
        assert_eq!(op("in_function('fact')"), "InFunction(\"fact\")");
        assert_eq!(op("Const(True)"), "Const(True)");
        assert_eq!(op("Type(p, 3)"), "Type(p, 3)");
        assert_eq!(op("line_no()"), "LineNo()");
        assert!(parse_operator("LineHit(x)").is_err());
    }

    #[test]
    fn test_select_list_with_destructuring() {
        let items = parse_select("(lo, hi) = Union(a, b), c > 1, VarSelector()").unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].targets, vec!["lo", "hi"]);
        assert_eq!(items[0].operator.to_string(), "Union(a, b)");
        assert!(items[1].targets.is_empty());
        assert_eq!(items[2].operator, Operator::VarSelector(None));

        let items = parse_select("(a, b) == (1, 2)").unwrap();
        assert!(items[0].targets.is_empty());
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(parse_select("Until(a, b"), Err(Error::Parse(_))));
        assert!(matches!(parse_select("a,,b"), Err(Error::Parse(_))));
        assert!(matches!(parse_select("Until(a, )"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_operator_nesting_limit() {
        let nest = |depth: usize| format!("{}x{}", "Not(".repeat(depth), ")".repeat(depth));
        assert!(parse_operator(&nest(MAX_OPERATOR_NESTING - 1)).is_ok());
        assert!(matches!(parse_operator(&nest(10_000)), Err(Error::Parse(_))));
    }
}
