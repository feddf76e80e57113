//! Interpreter for parsed expressions

use crate::core::value::Value;
use crate::expr::ast::{BinaryOp, CompareOp, Expr, Target, UnaryOp};
use std::cmp::Ordering;
use thiserror::Error;

/// Largest sequence `range` or repetition may produce
const MAX_RANGE: i64 = 10_000_000;

/// Failure while evaluating an expression
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("name '{0}' is not defined")]
    Name(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("attribute error: {0}")]
    Attribute(String),

    #[error("division by zero")]
    ZeroDivision,

    #[error("unsupported: {0}")]
    Unsupported(String),
}

type EvalResult<T> = std::result::Result<T, EvalError>;

/// Source of variable values
pub trait Bindings {
    /// Fully built value of `name` in the scope of `line`
    fn lookup(&self, name: &str, line: Option<u32>) -> Option<Value>;
}

impl Bindings for std::collections::HashMap<String, Value> {
    fn lookup(&self, name: &str, _line: Option<u32>) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Evaluate `expr` with variables taken from `bindings`
pub fn evaluate(expr: &Expr, bindings: &dyn Bindings) -> EvalResult<Value> {
    Interpreter {
        bindings,
        locals: Vec::new(),
    }
    .eval(expr)
}

struct Interpreter<'a> {
    bindings: &'a dyn Bindings,
    /// Comprehension variables, innermost last
    locals: Vec<(String, Value)>,
}

impl Interpreter<'_> {
    fn eval(&mut self, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Name { name, line } => self.lookup(name, *line),
            Expr::List(items) => Ok(Value::List(self.eval_all(items)?)),
            Expr::Tuple(items) => Ok(Value::Tuple(self.eval_all(items)?)),
            Expr::Set(items) => Ok(Value::Set(dedup(self.eval_all(items)?))),
            Expr::Dict(entries) => {
                let mut out: Vec<(Value, Value)> = Vec::new();
                for (k, v) in entries {
                    let key = self.eval(k)?;
                    let value = self.eval(v)?;
                    match out.iter_mut().find(|(existing, _)| existing.loose_eq(&key)) {
                        Some(slot) => slot.1 = value,
                        None => out.push((key, value)),
                    }
                }
                Ok(Value::Dict(out))
            }
            Expr::Attribute(target, attr) => {
                let target = self.eval(target)?;
                attribute(&target, attr)
            }
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                subscript(&target, &index)
            }
            Expr::Slice { target, lower, upper } => {
                let target = self.eval(target)?;
                let lower = self.eval_bound(lower.as_deref())?;
                let upper = self.eval_bound(upper.as_deref())?;
                slice(&target, lower, upper)
            }
            Expr::Call { func, args } => self.call(func, args),
            Expr::Unary(op, operand) => {
                let v = self.eval(operand)?;
                unary(*op, &v)
            }
            Expr::Binary(op, left, right) => {
                let a = self.eval(left)?;
                let b = self.eval(right)?;
                binary(*op, &a, &b)
            }
            Expr::Compare { first, rest } => {
                let mut left = self.eval(first)?;
                for (op, next) in rest {
                    let right = self.eval(next)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::And(a, b) => {
                let left = self.eval(a)?;
                if !left.truthy() {
                    return Ok(left);
                }
                self.eval(b)
            }
            Expr::Or(a, b) => {
                let left = self.eval(a)?;
                if left.truthy() {
                    return Ok(left);
                }
                self.eval(b)
            }
            Expr::IfElse { test, body, orelse } => {
                if self.eval(test)?.truthy() {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::ListComp {
                element,
                target,
                iter,
                condition,
            } => {
                let source = iterate(&self.eval(iter)?)?;
                let mut out = Vec::new();
                for item in source {
                    let depth = self.locals.len();
                    let outcome = self.comprehension_step(element, target, item, condition.as_deref());
                    self.locals.truncate(depth);
                    if let Some(value) = outcome? {
                        out.push(value);
                    }
                }
                Ok(Value::List(out))
            }
        }
    }

    fn comprehension_step(
        &mut self,
        element: &Expr,
        target: &Target,
        item: Value,
        condition: Option<&Expr>,
    ) -> EvalResult<Option<Value>> {
        self.bind(target, item)?;
        if let Some(condition) = condition {
            if !self.eval(condition)?.truthy() {
                return Ok(None);
            }
        }
        self.eval(element).map(Some)
    }

    fn bind(&mut self, target: &Target, value: Value) -> EvalResult<()> {
        match target {
            Target::Name(name) => {
                self.locals.push((name.clone(), value));
                Ok(())
            }
            Target::Tuple(targets) => {
                let items = match value {
                    Value::List(items) | Value::Tuple(items) => items,
                    other => {
                        return Err(EvalError::Type(format!(
                            "cannot unpack non-sequence {}",
                            other.type_name()
                        )))
                    }
                };
                if items.len() != targets.len() {
                    return Err(EvalError::Type(format!(
                        "expected {} values to unpack, got {}",
                        targets.len(),
                        items.len()
                    )));
                }
                targets
                    .iter()
                    .zip(items)
                    .try_for_each(|(target, item)| self.bind(target, item))
            }
        }
    }

    fn lookup(&self, name: &str, line: Option<u32>) -> EvalResult<Value> {
        if line.is_none() {
            if let Some((_, v)) = self.locals.iter().rev().find(|(n, _)| n == name) {
                return Ok(v.clone());
            }
        }
        self.bindings
            .lookup(name, line)
            .ok_or_else(|| EvalError::Name(name.to_string()))
    }

    fn eval_all(&mut self, items: &[Expr]) -> EvalResult<Vec<Value>> {
        items.iter().map(|e| self.eval(e)).collect()
    }

    fn eval_bound(&mut self, bound: Option<&Expr>) -> EvalResult<Option<i64>> {
        match bound {
            None => Ok(None),
            Some(e) => match self.eval(e)? {
                Value::None => Ok(None),
                v => v
                    .as_int()
                    .map(Some)
                    .ok_or_else(|| EvalError::Type("slice indices must be integers".to_string())),
            },
        }
    }

    fn call(&mut self, func: &Expr, args: &[Expr]) -> EvalResult<Value> {
        match func {
            Expr::Attribute(target, method) => {
                let target = self.eval(target)?;
                let args = self.eval_all(args)?;
                call_method(&target, method, &args)
            }
            Expr::Name { name, line: None } => {
                let args = self.eval_all(args)?;
                call_builtin(name, &args)
            }
            _ => Err(EvalError::Unsupported("call of a non-builtin".to_string())),
        }
    }
}

fn dedup(items: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !out.iter().any(|existing| existing.loose_eq(&item)) {
            out.push(item);
        }
    }
    out
}

/// Elements produced by iterating `value`
pub fn iterate(value: &Value) -> EvalResult<Vec<Value>> {
    match value {
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => Ok(items.clone()),
        Value::Dict(entries) => Ok(entries.iter().map(|(k, _)| k.clone()).collect()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        other => Err(EvalError::Type(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

fn attribute(target: &Value, attr: &str) -> EvalResult<Value> {
    match target {
        Value::Object { class, fields } => fields
            .iter()
            .find(|(name, _)| name == attr)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| EvalError::Attribute(format!("'{class}' object has no attribute '{attr}'"))),
        other => Err(EvalError::Attribute(format!(
            "'{}' object has no attribute '{attr}'",
            other.type_name()
        ))),
    }
}

// Python index normalization; `None` when out of range.
fn position(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { index + len } else { index };
    (0..len).contains(&i).then_some(i as usize)
}

fn subscript(target: &Value, index: &Value) -> EvalResult<Value> {
    match target {
        Value::List(items) | Value::Tuple(items) => {
            let i = index
                .as_int()
                .ok_or_else(|| EvalError::Type("indices must be integers".to_string()))?;
            position(i, items.len())
                .map(|p| items[p].clone())
                .ok_or_else(|| EvalError::Index(format!("index {i} out of range")))
        }
        Value::Str(s) => {
            let i = index
                .as_int()
                .ok_or_else(|| EvalError::Type("string indices must be integers".to_string()))?;
            let chars: Vec<char> = s.chars().collect();
            position(i, chars.len())
                .map(|p| Value::Str(chars[p].to_string()))
                .ok_or_else(|| EvalError::Index(format!("string index {i} out of range")))
        }
        Value::Dict(entries) => entries
            .iter()
            .find(|(k, _)| k.loose_eq(index))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| EvalError::Key(index.to_string())),
        other => Err(EvalError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn slice_bounds(lower: Option<i64>, upper: Option<i64>, len: usize) -> (usize, usize) {
    let len = len as i64;
    let clamp = |i: i64| if i < 0 { (i + len).max(0) } else { i.min(len) } as usize;
    let start = lower.map_or(0, clamp);
    let end = upper.map_or(len as usize, clamp);
    (start, end.max(start))
}

fn slice(target: &Value, lower: Option<i64>, upper: Option<i64>) -> EvalResult<Value> {
    match target {
        Value::List(items) => {
            let (a, b) = slice_bounds(lower, upper, items.len());
            Ok(Value::List(items[a..b].to_vec()))
        }
        Value::Tuple(items) => {
            let (a, b) = slice_bounds(lower, upper, items.len());
            Ok(Value::Tuple(items[a..b].to_vec()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (a, b) = slice_bounds(lower, upper, chars.len());
            Ok(Value::Str(chars[a..b].iter().collect()))
        }
        other => Err(EvalError::Type(format!(
            "'{}' object is not sliceable",
            other.type_name()
        ))),
    }
}

fn unary(op: UnaryOp, v: &Value) -> EvalResult<Value> {
    match (op, v) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::Neg, v) if v.is_numeric() => v
            .as_int()
            .and_then(i64::checked_neg)
            .map(Value::Int)
            .ok_or_else(|| EvalError::Unsupported("integer overflow".to_string())),
        (UnaryOp::Pos, Value::Bool(b)) => Ok(Value::Int(*b as i64)),
        (UnaryOp::Pos, v) if v.is_numeric() => Ok(v.clone()),
        (_, v) => Err(EvalError::Type(format!(
            "bad operand type for unary operator: '{}'",
            v.type_name()
        ))),
    }
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn num(v: &Value) -> Option<Num> {
    match v {
        Value::Float(x) => Some(Num::Float(*x)),
        other => other.as_int().map(Num::Int),
    }
}

fn binary(op: BinaryOp, a: &Value, b: &Value) -> EvalResult<Value> {
    if let (Some(x), Some(y)) = (num(a), num(b)) {
        return arithmetic(op, x, y);
    }
    match (op, a, b) {
        (BinaryOp::Add, Value::Str(x), Value::Str(y)) => Ok(Value::Str(format!("{x}{y}"))),
        (BinaryOp::Add, Value::List(x), Value::List(y)) => {
            Ok(Value::List(x.iter().chain(y).cloned().collect()))
        }
        (BinaryOp::Add, Value::Tuple(x), Value::Tuple(y)) => {
            Ok(Value::Tuple(x.iter().chain(y).cloned().collect()))
        }
        (BinaryOp::Mul, seq, n) | (BinaryOp::Mul, n, seq)
            if matches!(n, Value::Int(_) | Value::Bool(_))
                && matches!(seq, Value::Str(_) | Value::List(_) | Value::Tuple(_)) =>
        {
            let times = usize::try_from(n.as_int().unwrap_or(0).max(0)).map_err(|_| overflow())?;
            match seq {
                Value::Str(s) => Ok(Value::Str(s.repeat(repeat_count(s.len(), times)?))),
                Value::List(items) => repeat(items, times).map(Value::List),
                Value::Tuple(items) => repeat(items, times).map(Value::Tuple),
                other => Err(EvalError::Type(format!(
                    "can't multiply sequence of type '{}'",
                    other.type_name()
                ))),
            }
        }
        (BinaryOp::Mod, Value::Str(_), _) => {
            Err(EvalError::Unsupported("string formatting".to_string()))
        }
        _ => Err(EvalError::Type(format!(
            "unsupported operand types for {op:?}: '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}

// `times`, or an error when `len * times` elements would exceed the range cap.
fn repeat_count(len: usize, times: usize) -> EvalResult<usize> {
    match len.checked_mul(times) {
        Some(total) if total as u64 <= MAX_RANGE as u64 => Ok(times),
        _ => Err(EvalError::Unsupported(format!(
            "repeating {len} element(s) {times} times"
        ))),
    }
}

fn repeat(items: &[Value], times: usize) -> EvalResult<Vec<Value>> {
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = Vec::with_capacity(items.len() * repeat_count(items.len(), times)?);
    for _ in 0..times {
        out.extend_from_slice(items);
    }
    Ok(out)
}

fn overflow() -> EvalError {
    EvalError::Unsupported("integer overflow".to_string())
}

fn arithmetic(op: BinaryOp, x: Num, y: Num) -> EvalResult<Value> {
    use Num::{Float as F, Int as I};
    let as_f = |n: Num| match n {
        I(i) => i as f64,
        F(f) => f,
    };
    match (op, x, y) {
        (BinaryOp::Add, I(a), I(b)) => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        (BinaryOp::Sub, I(a), I(b)) => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        (BinaryOp::Mul, I(a), I(b)) => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        (BinaryOp::Add, ..) => Ok(Value::Float(as_f(x) + as_f(y))),
        (BinaryOp::Sub, ..) => Ok(Value::Float(as_f(x) - as_f(y))),
        (BinaryOp::Mul, ..) => Ok(Value::Float(as_f(x) * as_f(y))),
        (BinaryOp::Div, ..) => {
            let d = as_f(y);
            if d == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            Ok(Value::Float(as_f(x) / d))
        }
        (BinaryOp::FloorDiv | BinaryOp::Mod, _, I(0)) => Err(EvalError::ZeroDivision),
        (BinaryOp::FloorDiv, I(a), I(b)) => {
            let q = a.checked_div(b).ok_or_else(overflow)?;
            Ok(Value::Int(if a % b != 0 && (a < 0) != (b < 0) { q - 1 } else { q }))
        }
        (BinaryOp::Mod, I(a), I(b)) => {
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            Ok(Value::Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }))
        }
        (BinaryOp::FloorDiv | BinaryOp::Mod, ..) => {
            let (a, b) = (as_f(x), as_f(y));
            if b == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            let q = (a / b).floor();
            Ok(Value::Float(if op == BinaryOp::FloorDiv { q } else { a - b * q }))
        }
        (BinaryOp::Pow, I(a), I(b)) if b >= 0 => u32::try_from(b)
            .ok()
            .and_then(|b| a.checked_pow(b))
            .map(Value::Int)
            .ok_or_else(overflow),
        (BinaryOp::Pow, ..) => {
            let (a, b) = (as_f(x), as_f(y));
            if a == 0.0 && b < 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            Ok(Value::Float(a.powf(b)))
        }
    }
}

fn compare(op: CompareOp, a: &Value, b: &Value) -> EvalResult<bool> {
    let ordered = |wanted: fn(Ordering) -> bool| {
        a.loose_cmp(b).map(wanted).ok_or_else(|| {
            EvalError::Type(format!(
                "'{op:?}' not supported between '{}' and '{}'",
                a.type_name(),
                b.type_name()
            ))
        })
    };
    let member = || {
        b.contains(a).ok_or_else(|| {
            EvalError::Type(format!("argument of type '{}' is not iterable", b.type_name()))
        })
    };
    match op {
        CompareOp::Eq => Ok(a.loose_eq(b)),
        CompareOp::Ne => Ok(!a.loose_eq(b)),
        CompareOp::Lt => ordered(|o| o == Ordering::Less),
        CompareOp::Le => ordered(|o| o != Ordering::Greater),
        CompareOp::Gt => ordered(|o| o == Ordering::Greater),
        CompareOp::Ge => ordered(|o| o != Ordering::Less),
        CompareOp::In => member(),
        CompareOp::NotIn => member().map(|found| !found),
        CompareOp::Is => Ok(a == b),
        CompareOp::IsNot => Ok(a != b),
    }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> EvalResult<()> {
    if args.len() < min || args.len() > max {
        return Err(EvalError::Type(format!(
            "{name}() takes {min} to {max} arguments ({} given)",
            args.len()
        )));
    }
    Ok(())
}

// Arguments of min/max/any/all: one iterable or several values.
fn spread(args: &[Value]) -> EvalResult<Vec<Value>> {
    match args {
        [single] => iterate(single),
        many => Ok(many.to_vec()),
    }
}

fn sort(mut items: Vec<Value>) -> EvalResult<Vec<Value>> {
    let mut failed = None;
    items.sort_by(|a, b| {
        a.loose_cmp(b).unwrap_or_else(|| {
            failed.get_or_insert_with(|| (a.type_name().to_string(), b.type_name().to_string()));
            Ordering::Equal
        })
    });
    match failed {
        Some((a, b)) => Err(EvalError::Type(format!("cannot order '{a}' and '{b}'"))),
        None => Ok(items),
    }
}

fn extreme(name: &str, args: &[Value], keep: Ordering) -> EvalResult<Value> {
    let items = spread(args)?;
    let mut best: Option<Value> = None;
    for item in items {
        best = Some(match best {
            None => item,
            Some(current) => match item.loose_cmp(&current) {
                Some(o) if o == keep => item,
                Some(_) => current,
                None => return Err(EvalError::Type(format!("{name}() of unorderable values"))),
            },
        });
    }
    best.ok_or_else(|| EvalError::Type(format!("{name}() arg is an empty sequence")))
}

// Round half to even, like Python.
fn round_half_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        r
    }
}

fn call_builtin(name: &str, args: &[Value]) -> EvalResult<Value> {
    match name {
        "len" => {
            arity(name, args, 1, 1)?;
            let n = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) | Value::Tuple(items) | Value::Set(items) => items.len(),
                Value::Dict(entries) => entries.len(),
                other => {
                    return Err(EvalError::Type(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(n as i64))
        }
        "abs" => {
            arity(name, args, 1, 1)?;
            match num(&args[0]) {
                Some(Num::Int(i)) => i.checked_abs().map(Value::Int).ok_or_else(overflow),
                Some(Num::Float(x)) => Ok(Value::Float(x.abs())),
                None => Err(EvalError::Type("bad operand type for abs()".to_string())),
            }
        }
        "min" => extreme(name, args, Ordering::Less),
        "max" => extreme(name, args, Ordering::Greater),
        "sum" => {
            arity(name, args, 1, 2)?;
            let start = args.get(1).cloned().unwrap_or(Value::Int(0));
            iterate(&args[0])?
                .iter()
                .try_fold(start, |acc, item| binary(BinaryOp::Add, &acc, item))
        }
        "sorted" => {
            arity(name, args, 1, 1)?;
            Ok(Value::List(sort(iterate(&args[0])?)?))
        }
        "reversed" => {
            arity(name, args, 1, 1)?;
            let mut items = iterate(&args[0])?;
            items.reverse();
            Ok(Value::List(items))
        }
        "str" => {
            arity(name, args, 0, 1)?;
            Ok(Value::Str(args.first().map(|v| v.to_string()).unwrap_or_default()))
        }
        "int" => {
            arity(name, args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Int(0)),
                Some(Value::Float(x)) if x.is_finite() => Ok(Value::Int(x.trunc() as i64)),
                Some(Value::Str(s)) => s
                    .trim()
                    .parse()
                    .map(Value::Int)
                    .map_err(|_| EvalError::Type(format!("invalid literal for int(): {s:?}"))),
                Some(v) => v
                    .as_int()
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::Type(format!("int() of '{}'", v.type_name()))),
            }
        }
        "float" => {
            arity(name, args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(s)) => s
                    .trim()
                    .parse()
                    .map(Value::Float)
                    .map_err(|_| EvalError::Type(format!("could not convert string to float: {s:?}"))),
                Some(v) => v
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| EvalError::Type(format!("float() of '{}'", v.type_name()))),
            }
        }
        "bool" => {
            arity(name, args, 0, 1)?;
            Ok(Value::Bool(args.first().map_or(false, Value::truthy)))
        }
        "list" => {
            arity(name, args, 0, 1)?;
            Ok(Value::List(args.first().map_or(Ok(Vec::new()), iterate)?))
        }
        "tuple" => {
            arity(name, args, 0, 1)?;
            Ok(Value::Tuple(args.first().map_or(Ok(Vec::new()), iterate)?))
        }
        "set" => {
            arity(name, args, 0, 1)?;
            Ok(Value::Set(dedup(args.first().map_or(Ok(Vec::new()), iterate)?)))
        }
        "any" => {
            arity(name, args, 1, 1)?;
            Ok(Value::Bool(iterate(&args[0])?.iter().any(Value::truthy)))
        }
        "all" => {
            arity(name, args, 1, 1)?;
            Ok(Value::Bool(iterate(&args[0])?.iter().all(Value::truthy)))
        }
        "range" => {
            arity(name, args, 1, 3)?;
            let ints = args
                .iter()
                .map(|a| a.as_int().ok_or_else(|| EvalError::Type("range() takes integers".to_string())))
                .collect::<EvalResult<Vec<i64>>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => unreachable!("arity checked"),
            };
            if step == 0 {
                return Err(EvalError::Type("range() step must not be zero".to_string()));
            }
            let count = if (step > 0 && start < stop) || (step < 0 && start > stop) {
                let (span, stride) = ((stop as i128 - start as i128).abs(), (step as i128).abs());
                (span + stride - 1) / stride
            } else {
                0
            };
            if count > MAX_RANGE as i128 {
                return Err(EvalError::Unsupported(format!("range of {count} elements")));
            }
            let count = count as i64;
            Ok(Value::List((0..count).map(|i| Value::Int(start + i * step)).collect()))
        }
        "round" => {
            arity(name, args, 1, 2)?;
            let x = args[0]
                .as_f64()
                .ok_or_else(|| EvalError::Type(format!("round() of '{}'", args[0].type_name())))?;
            match args.get(1) {
                None | Some(Value::None) => match &args[0] {
                    Value::Float(_) => Ok(Value::Int(round_half_even(x) as i64)),
                    other => Ok(Value::Int(other.as_int().unwrap_or(0))),
                },
                Some(digits) => {
                    let digits = digits
                        .as_int()
                        .ok_or_else(|| EvalError::Type("round() digits must be an integer".to_string()))?;
                    let scale = 10f64.powi(digits.clamp(-308, 308) as i32);
                    let rounded = round_half_even(x * scale) / scale;
                    match &args[0] {
                        Value::Float(_) => Ok(Value::Float(rounded)),
                        _ => Ok(Value::Int(rounded as i64)),
                    }
                }
            }
        }
        "type" => {
            arity(name, args, 1, 1)?;
            Ok(Value::Str(args[0].type_name().to_string()))
        }
        other => Err(EvalError::Name(other.to_string())),
    }
}

fn call_method(target: &Value, method: &str, args: &[Value]) -> EvalResult<Value> {
    match (target, method) {
        (Value::Dict(entries), "keys") => {
            arity(method, args, 0, 0)?;
            Ok(Value::List(entries.iter().map(|(k, _)| k.clone()).collect()))
        }
        (Value::Dict(entries), "values") => {
            arity(method, args, 0, 0)?;
            Ok(Value::List(entries.iter().map(|(_, v)| v.clone()).collect()))
        }
        (Value::Dict(entries), "items") => {
            arity(method, args, 0, 0)?;
            Ok(Value::List(
                entries
                    .iter()
                    .map(|(k, v)| Value::Tuple(vec![k.clone(), v.clone()]))
                    .collect(),
            ))
        }
        (Value::Dict(entries), "get") => {
            arity(method, args, 1, 2)?;
            Ok(entries
                .iter()
                .find(|(k, _)| k.loose_eq(&args[0]))
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        (Value::List(items) | Value::Tuple(items), "count") => {
            arity(method, args, 1, 1)?;
            Ok(Value::Int(items.iter().filter(|v| v.loose_eq(&args[0])).count() as i64))
        }
        (Value::List(items) | Value::Tuple(items), "index") => {
            arity(method, args, 1, 1)?;
            items
                .iter()
                .position(|v| v.loose_eq(&args[0]))
                .map(|p| Value::Int(p as i64))
                .ok_or_else(|| EvalError::Index(format!("{} is not in {}", args[0], target.type_name())))
        }
        (Value::Str(s), "count") => match args {
            [Value::Str(sub)] if !sub.is_empty() => Ok(Value::Int(s.matches(sub.as_str()).count() as i64)),
            [Value::Str(_)] => Ok(Value::Int(s.chars().count() as i64 + 1)),
            _ => Err(EvalError::Type("count() takes a string".to_string())),
        },
        (Value::Str(s), "index") => match args {
            [Value::Str(sub)] => s
                .find(sub.as_str())
                .map(|byte| Value::Int(s[..byte].chars().count() as i64))
                .ok_or_else(|| EvalError::Index("substring not found".to_string())),
            _ => Err(EvalError::Type("index() takes a string".to_string())),
        },
        (Value::Str(s), "startswith" | "endswith") => match args {
            [Value::Str(affix)] => Ok(Value::Bool(if method == "startswith" {
                s.starts_with(affix.as_str())
            } else {
                s.ends_with(affix.as_str())
            })),
            _ => Err(EvalError::Type(format!("{method}() takes a string"))),
        },
        (Value::Str(s), "lower") => {
            arity(method, args, 0, 0)?;
            Ok(Value::Str(s.to_lowercase()))
        }
        (Value::Str(s), "upper") => {
            arity(method, args, 0, 0)?;
            Ok(Value::Str(s.to_uppercase()))
        }
        (other, _) => Err(EvalError::Attribute(format!(
            "'{}' object has no method '{method}'",
            other.type_name()
        ))),
    }
}
