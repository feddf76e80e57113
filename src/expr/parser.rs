//! Recursive-descent parser over lexer tokens

use crate::core::value::Value;
use crate::error::{Error, Result};
use crate::expr::ast::{BinaryOp, CompareOp, Expr, Target, UnaryOp};
use crate::expr::lexer::{tokenize, Token};

const KEYWORDS: [&str; 9] = ["and", "or", "not", "in", "is", "if", "else", "for", "lambda"];

/// Deepest bracket or unary nesting accepted before parsing gives up
pub const MAX_NESTING: usize = 64;

/// Parse one expression
pub fn parse_expression(text: &str) -> Result<Expr> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(Error::Parse("empty expression".to_string()));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.ternary()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(Error::Parse(format!("unexpected '{tok}' in {text:?}"))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn at_op(&self, op: &str) -> bool {
        self.peek().map_or(false, |t| t.is_op(op))
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.peek().map_or(false, |t| t.is_keyword(keyword))
    }

    fn eat_op(&mut self, op: &str) -> bool {
        let found = self.at_op(op);
        if found {
            self.pos += 1;
        }
        found
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let found = self.at_keyword(keyword);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{op}'")))
        }
    }

    fn unexpected(&self, wanted: &str) -> Error {
        match self.peek() {
            Some(tok) => Error::Parse(format!("expected {wanted}, found '{tok}'")),
            None => Error::Parse(format!("expected {wanted}, found end of input")),
        }
    }

    // Every recursive production passes through here.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING {
            return Err(Error::Parse(format!(
                "expression nested deeper than {MAX_NESTING} levels"
            )));
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn ternary(&mut self) -> Result<Expr> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr> {
        let body = self.or_expr()?;
        if !self.eat_keyword("if") {
            return Ok(body);
        }
        let test = self.or_expr()?;
        if !self.eat_keyword("else") {
            return Err(self.unexpected("'else'"));
        }
        let orelse = self.ternary()?;
        Ok(Expr::IfElse {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        })
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            let inner = self.nested(Self::not_expr)?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.comparison()
    }

    fn compare_op(&mut self) -> Option<CompareOp> {
        let followed_by = |keyword: &str| self.peek_at(1).map_or(false, |t| t.is_keyword(keyword));
        let (op, width) = match self.peek()? {
            Token::Op("==") => (CompareOp::Eq, 1),
            Token::Op("!=") => (CompareOp::Ne, 1),
            Token::Op("<") => (CompareOp::Lt, 1),
            Token::Op("<=") => (CompareOp::Le, 1),
            Token::Op(">") => (CompareOp::Gt, 1),
            Token::Op(">=") => (CompareOp::Ge, 1),
            Token::Name(k) if k == "in" => (CompareOp::In, 1),
            Token::Name(k) if k == "not" && followed_by("in") => (CompareOp::NotIn, 2),
            Token::Name(k) if k == "is" && followed_by("not") => (CompareOp::IsNot, 2),
            Token::Name(k) if k == "is" => (CompareOp::Is, 1),
            _ => return None,
        };
        self.pos += width;
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let first = self.arith()?;
        let mut rest = Vec::new();
        while let Some(op) = self.compare_op() {
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn arith(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        loop {
            let op = if self.eat_op("+") {
                BinaryOp::Add
            } else if self.eat_op("-") {
                BinaryOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op("*")) => BinaryOp::Mul,
                Some(Token::Op("/")) => BinaryOp::Div,
                Some(Token::Op("//")) => BinaryOp::FloorDiv,
                Some(Token::Op("%")) => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn factor(&mut self) -> Result<Expr> {
        if self.eat_op("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.nested(Self::factor)?)));
        }
        if self.eat_op("+") {
            return Ok(Expr::Unary(UnaryOp::Pos, Box::new(self.nested(Self::factor)?)));
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.postfix()?;
        if self.eat_op("**") {
            let exponent = self.nested(Self::factor)?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op(".") {
                match self.next() {
                    Some(Token::Name(attr)) => expr = Expr::Attribute(Box::new(expr), attr),
                    _ => return Err(Error::Parse("expected attribute name after '.'".to_string())),
                }
            } else if self.eat_op("[") {
                expr = self.subscript(expr)?;
            } else if self.eat_op("(") {
                let args = self.sequence(")")?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn subscript(&mut self, target: Expr) -> Result<Expr> {
        let lower = if self.at_op(":") {
            None
        } else {
            Some(Box::new(self.ternary()?))
        };
        if self.eat_op(":") {
            let upper = if self.at_op("]") {
                None
            } else {
                Some(Box::new(self.ternary()?))
            };
            self.expect_op("]")?;
            return Ok(Expr::Slice {
                target: Box::new(target),
                lower,
                upper,
            });
        }
        self.expect_op("]")?;
        match lower {
            Some(index) => Ok(Expr::Index(Box::new(target), index)),
            None => Err(Error::Parse("empty subscript".to_string())),
        }
    }

    // Comma-separated expressions up to `close`; a trailing comma is allowed.
    fn sequence(&mut self, close: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.eat_op(close) {
            items.push(self.ternary()?);
            if !self.eat_op(",") {
                self.expect_op(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn atom(&mut self) -> Result<Expr> {
        let tok = self.next().ok_or_else(|| Error::Parse("unexpected end of input".to_string()))?;
        match tok {
            Token::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Token::Float(x) => Ok(Expr::Literal(Value::Float(x))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::Name(name) => match name.as_str() {
                "True" => Ok(Expr::Literal(Value::Bool(true))),
                "False" => Ok(Expr::Literal(Value::Bool(false))),
                "None" => Ok(Expr::Literal(Value::None)),
                k if KEYWORDS.contains(&k) => Err(Error::Parse(format!("unexpected keyword '{k}'"))),
                _ => {
                    let line = if self.eat_op("@") {
                        match self.next() {
                            Some(Token::Int(line)) if line >= 0 => Some(line as u32),
                            _ => return Err(Error::Parse(format!("expected line number after '{name}@'"))),
                        }
                    } else {
                        None
                    };
                    Ok(Expr::Name { name, line })
                }
            },
            Token::Op("(") => self.parenthesized(),
            Token::Op("[") => self.list_display(),
            Token::Op("{") => self.brace_display(),
            Token::Op(op) => Err(Error::Parse(format!("unexpected '{op}'"))),
        }
    }

    fn parenthesized(&mut self) -> Result<Expr> {
        if self.eat_op(")") {
            return Ok(Expr::Tuple(Vec::new()));
        }
        let first = self.ternary()?;
        if self.eat_op(")") {
            return Ok(first);
        }
        self.expect_op(",")?;
        let mut items = vec![first];
        items.extend(self.sequence(")")?);
        Ok(Expr::Tuple(items))
    }

    fn list_display(&mut self) -> Result<Expr> {
        if self.eat_op("]") {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.ternary()?;
        if self.eat_keyword("for") {
            let target = self.target()?;
            if !self.eat_keyword("in") {
                return Err(self.unexpected("'in'"));
            }
            let iter = self.or_expr()?;
            let condition = if self.eat_keyword("if") {
                Some(Box::new(self.or_expr()?))
            } else {
                None
            };
            self.expect_op("]")?;
            return Ok(Expr::ListComp {
                element: Box::new(first),
                target,
                iter: Box::new(iter),
                condition,
            });
        }
        let mut items = vec![first];
        if self.eat_op(",") {
            items.extend(self.sequence("]")?);
        } else {
            self.expect_op("]")?;
        }
        Ok(Expr::List(items))
    }

    fn brace_display(&mut self) -> Result<Expr> {
        if self.eat_op("}") {
            return Ok(Expr::Dict(Vec::new()));
        }
        let first = self.ternary()?;
        if !self.eat_op(":") {
            let mut items = vec![first];
            if self.eat_op(",") {
                items.extend(self.sequence("}")?);
            } else {
                self.expect_op("}")?;
            }
            return Ok(Expr::Set(items));
        }

        let mut entries = vec![(first, self.ternary()?)];
        while self.eat_op(",") {
            if self.at_op("}") {
                break;
            }
            let key = self.ternary()?;
            self.expect_op(":")?;
            entries.push((key, self.ternary()?));
        }
        self.expect_op("}")?;
        Ok(Expr::Dict(entries))
    }

    fn target(&mut self) -> Result<Target> {
        let first = self.target_atom()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            items.push(self.target_atom()?);
        }
        Ok(Target::Tuple(items))
    }

    fn target_atom(&mut self) -> Result<Target> {
        match self.next() {
            Some(Token::Name(name)) if !KEYWORDS.contains(&name.as_str()) => Ok(Target::Name(name)),
            Some(Token::Op("(")) => {
                let inner = self.nested(Self::target)?;
                self.expect_op(")")?;
                Ok(inner)
            }
            _ => Err(Error::Parse("invalid comprehension target".to_string())),
        }
    }
}
