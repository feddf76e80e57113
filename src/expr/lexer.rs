//! Tokenizer for the expression language

use crate::error::{Error, Result};
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, alphanumeric1, char, digit0, digit1, multispace0, one_of};
use nom::combinator::{map, map_res, opt, recognize, value};
use nom::error::ErrorKind;
use nom::multi::many0_count;
use nom::sequence::{pair, tuple};
use nom::IResult;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    /// Identifier or keyword
    Name(String),
    /// Operator or punctuation
    Op(&'static str),
}

impl Token {
    pub fn is_op(&self, op: &str) -> bool {
        matches!(self, Token::Op(o) if *o == op)
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Name(name) if name == keyword)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(i) => write!(f, "{i}"),
            Token::Float(x) => write!(f, "{x}"),
            Token::Str(s) => write!(f, "{s:?}"),
            Token::Name(name) => f.write_str(name),
            Token::Op(op) => f.write_str(op),
        }
    }
}

fn number(input: &str) -> IResult<&str, Token> {
    map_res(
        recognize(tuple((
            digit1,
            opt(pair(char('.'), digit0)),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        |text: &str| {
            if text.contains(['.', 'e', 'E']) {
                text.parse().map(Token::Float).map_err(|_| ErrorKind::Float)
            } else {
                text.parse().map(Token::Int).map_err(|_| ErrorKind::Digit)
            }
        },
    )(input)
}

fn string(input: &str) -> IResult<&str, Token> {
    let (rest, quote) = one_of("'\"")(input)?;
    let mut out = String::new();
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((&rest[i + 1..], Token::Str(out))),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, escaped)) => out.push(escaped),
                None => break,
            },
            c => out.push(c),
        }
    }
    Err(nom::Err::Failure(nom::error::Error::new(input, ErrorKind::Char)))
}

fn name(input: &str) -> IResult<&str, Token> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0_count(alt((alphanumeric1, tag("_")))),
        )),
        |s: &str| Token::Name(s.to_string()),
    )(input)
}

fn operator(input: &str) -> IResult<&str, Token> {
    map(
        alt((
            alt((
                value("**", tag("**")),
                value("//", tag("//")),
                value("==", tag("==")),
                value("!=", tag("!=")),
                value("<=", tag("<=")),
                value(">=", tag(">=")),
            )),
            alt((
                value("+", tag("+")),
                value("-", tag("-")),
                value("*", tag("*")),
                value("/", tag("/")),
                value("%", tag("%")),
                value("<", tag("<")),
                value(">", tag(">")),
                value("(", tag("(")),
                value(")", tag(")")),
                value("[", tag("[")),
                value("]", tag("]")),
                value("{", tag("{")),
                value("}", tag("}")),
                value(",", tag(",")),
                value(":", tag(":")),
                value(".", tag(".")),
                value("@", tag("@")),
            )),
        )),
        Token::Op,
    )(input)
}

fn token(input: &str) -> IResult<&str, Token> {
    let (input, _) = multispace0(input)?;
    alt((number, string, name, operator))(input)
}

/// Split expression text into tokens
pub fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = text;
    loop {
        let (trimmed, _) = multispace0::<&str, nom::error::Error<&str>>(rest)
            .map_err(|e| Error::Parse(e.to_string()))?;
        if trimmed.is_empty() {
            return Ok(tokens);
        }
        match token(trimmed) {
            Ok((next, tok)) => {
                tokens.push(tok);
                rest = next;
            }
            Err(_) => {
                let offset = text.len() - trimmed.len();
                return Err(Error::Parse(format!(
                    "unexpected input at offset {offset} in {text:?}"
                )));
            }
        }
    }
}
