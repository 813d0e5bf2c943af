//! Column expressions.
//!
//! Used by Select, Update, and Filter kernels. The `parse` helper exists
//! for the plan description format; the compiler feeding this engine
//! normally constructs `Expr` values directly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::table::Table;
use crate::value::{DataType, Value};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("unknown column '{name}' (available: {available:?})")]
    UnknownColumn { name: String, available: Vec<String> },

    #[error("row index {0} out of bounds")]
    RowOutOfBounds(usize),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("parse error: {0}")]
    Parse(String),
}

/// Binary operators, comparison then logical then arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    IsNull,
    IsNotNull,
}

/// Expression tree evaluated one row at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Column reference by name.
    Column(String),
    Literal(Value),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn literal(value: Value) -> Self {
        Expr::Literal(value)
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, arg: Expr) -> Self {
        Expr::Unary {
            op,
            arg: Box::new(arg),
        }
    }

    /// Column names referenced anywhere in this expression.
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out.sort();
        out.dedup();
        out
    }

    fn collect_columns(&self, out: &mut Vec<String>) {
        match self {
            Expr::Column(name) => out.push(name.clone()),
            Expr::Literal(_) => {}
            Expr::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Unary { arg, .. } => arg.collect_columns(out),
        }
    }

    /// Evaluate against one row of a table.
    pub fn evaluate(&self, table: &Table, row: usize) -> Result<Value, ExprError> {
        match self {
            Expr::Column(name) => {
                let col = table.column(name).ok_or_else(|| ExprError::UnknownColumn {
                    name: name.clone(),
                    available: table.columns().iter().map(|c| c.name.clone()).collect(),
                })?;
                col.values
                    .get(row)
                    .cloned()
                    .ok_or(ExprError::RowOutOfBounds(row))
            }
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Binary { op, left, right } => {
                let lhs = left.evaluate(table, row)?;
                let rhs = right.evaluate(table, row)?;
                eval_binary(*op, &lhs, &rhs)
            }
            Expr::Unary { op, arg } => {
                let v = arg.evaluate(table, row)?;
                eval_unary(*op, &v)
            }
        }
    }

    /// Evaluate as a predicate; `Null` counts as false.
    pub fn evaluate_bool(&self, table: &Table, row: usize) -> Result<bool, ExprError> {
        match self.evaluate(table, row)? {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(b),
            other => Err(ExprError::Type(format!(
                "predicate evaluated to {} rather than bool",
                other.type_name()
            ))),
        }
    }

    /// Parse an expression string.
    ///
    /// Grammar: binary operators with the usual precedence (`or` < `and`
    /// < comparisons < `+ -` < `* /`), unary `not`, `is null`,
    /// `is not null`, parentheses, quoted text literals, and bare column
    /// names. Enough for the plan description format.
    pub fn parse(input: &str) -> Result<Self, ExprError> {
        let expr = parse_or(input.trim())?;
        Ok(expr)
    }

    /// Infer the output type of this expression against an input shape.
    /// `None` dtype lookups surface as `UnknownColumn`.
    pub fn infer_type(
        &self,
        schema: &crate::schema::Schema,
    ) -> Result<(DataType, bool), ExprError> {
        match self {
            Expr::Column(name) => {
                let field = schema
                    .field_named(name)
                    .ok_or_else(|| ExprError::UnknownColumn {
                        name: name.clone(),
                        available: schema.fields.iter().map(|f| f.name.clone()).collect(),
                    })?;
                Ok((field.dtype.clone(), field.nullable))
            }
            Expr::Literal(v) => Ok(match v {
                Value::Null => (DataType::Text, true),
                Value::Bool(_) => (DataType::Bool, false),
                Value::Int(_) => (DataType::Int, false),
                Value::Float(_) => (DataType::Float, false),
                Value::Text(_) => (DataType::Text, false),
                Value::Date(_) => (DataType::Date, false),
                Value::Enum(_) => (DataType::Text, false),
            }),
            Expr::Binary { op, left, right } => {
                let (lt, ln) = left.infer_type(schema)?;
                let (rt, rn) = right.infer_type(schema)?;
                let nullable = ln || rn;
                match op {
                    BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
                    | BinOp::And | BinOp::Or => Ok((DataType::Bool, nullable)),
                    BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                        match (&lt, &rt) {
                            (DataType::Int, DataType::Int) => Ok((DataType::Int, nullable)),
                            (DataType::Int | DataType::Float, DataType::Int | DataType::Float) => {
                                Ok((DataType::Float, nullable))
                            }
                            (DataType::Text, DataType::Text) if *op == BinOp::Add => {
                                Ok((DataType::Text, nullable))
                            }
                            _ => Err(ExprError::Type(format!(
                                "operator '{}' not defined for {} and {}",
                                op.symbol(),
                                lt,
                                rt
                            ))),
                        }
                    }
                }
            }
            Expr::Unary { op, arg } => {
                let (_, nullable) = arg.infer_type(schema)?;
                match op {
                    UnaryOp::Not => Ok((DataType::Bool, nullable)),
                    UnaryOp::IsNull | UnaryOp::IsNotNull => Ok((DataType::Bool, false)),
                }
            }
        }
    }
}

fn eval_binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, ExprError> {
    use Value::*;
    match op {
        BinOp::Eq | BinOp::Ne => {
            if lhs.is_null() || rhs.is_null() {
                return Ok(Null);
            }
            let eq = value_eq(lhs, rhs)?;
            Ok(Bool(if op == BinOp::Eq { eq } else { !eq }))
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            if lhs.is_null() || rhs.is_null() {
                return Ok(Null);
            }
            let ord = value_cmp(lhs, rhs)?;
            Ok(Bool(match op {
                BinOp::Lt => ord.is_lt(),
                BinOp::Le => ord.is_le(),
                BinOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            }))
        }
        BinOp::And => match (as_bool(lhs)?, as_bool(rhs)?) {
            (Some(false), _) | (_, Some(false)) => Ok(Bool(false)),
            (Some(true), Some(true)) => Ok(Bool(true)),
            _ => Ok(Null),
        },
        BinOp::Or => match (as_bool(lhs)?, as_bool(rhs)?) {
            (Some(true), _) | (_, Some(true)) => Ok(Bool(true)),
            (Some(false), Some(false)) => Ok(Bool(false)),
            _ => Ok(Null),
        },
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
            if lhs.is_null() || rhs.is_null() {
                return Ok(Null);
            }
            arith(op, lhs, rhs)
        }
    }
}

fn eval_unary(op: UnaryOp, v: &Value) -> Result<Value, ExprError> {
    match op {
        UnaryOp::Not => match as_bool(v)? {
            Some(b) => Ok(Value::Bool(!b)),
            None => Ok(Value::Null),
        },
        UnaryOp::IsNull => Ok(Value::Bool(v.is_null())),
        UnaryOp::IsNotNull => Ok(Value::Bool(!v.is_null())),
    }
}

fn as_bool(v: &Value) -> Result<Option<bool>, ExprError> {
    match v {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(ExprError::Type(format!(
            "expected bool, found {}",
            other.type_name()
        ))),
    }
}

fn value_eq(a: &Value, b: &Value) -> Result<bool, ExprError> {
    use Value::*;
    match (a, b) {
        (Bool(x), Bool(y)) => Ok(x == y),
        (Int(x), Int(y)) => Ok(x == y),
        (Float(x), Float(y)) => Ok(x == y),
        (Int(x), Float(y)) | (Float(y), Int(x)) => Ok((*x as f64) == *y),
        (Text(x), Text(y)) => Ok(x == y),
        (Enum(x), Enum(y)) => Ok(x == y),
        (Date(x), Date(y)) => Ok(x == y),
        _ => Err(ExprError::Type(format!(
            "cannot compare {} with {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn value_cmp(a: &Value, b: &Value) -> Result<std::cmp::Ordering, ExprError> {
    use std::cmp::Ordering;
    use Value::*;
    match (a, b) {
        (Bool(x), Bool(y)) => Ok(x.cmp(y)),
        (Int(x), Int(y)) => Ok(x.cmp(y)),
        (Float(x), Float(y)) => Ok(x.partial_cmp(y).unwrap_or(Ordering::Equal)),
        (Int(x), Float(y)) => Ok((*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal)),
        (Float(x), Int(y)) => Ok(x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal)),
        (Text(x), Text(y)) => Ok(x.cmp(y)),
        (Date(x), Date(y)) => Ok(x.cmp(y)),
        _ => Err(ExprError::Type(format!(
            "cannot order {} against {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn arith(op: BinOp, a: &Value, b: &Value) -> Result<Value, ExprError> {
    use Value::*;
    match (a, b) {
        (Int(x), Int(y)) => match op {
            BinOp::Add => Ok(Int(x.wrapping_add(*y))),
            BinOp::Sub => Ok(Int(x.wrapping_sub(*y))),
            BinOp::Mul => Ok(Int(x.wrapping_mul(*y))),
            BinOp::Div => {
                if *y == 0 {
                    Err(ExprError::DivisionByZero)
                } else {
                    Ok(Int(x / y))
                }
            }
            _ => unreachable!(),
        },
        (Int(_) | Float(_), Int(_) | Float(_)) => {
            let x = match a {
                Int(v) => *v as f64,
                Float(v) => *v,
                _ => unreachable!(),
            };
            let y = match b {
                Int(v) => *v as f64,
                Float(v) => *v,
                _ => unreachable!(),
            };
            match op {
                BinOp::Add => Ok(Float(x + y)),
                BinOp::Sub => Ok(Float(x - y)),
                BinOp::Mul => Ok(Float(x * y)),
                BinOp::Div => {
                    if y == 0.0 {
                        Err(ExprError::DivisionByZero)
                    } else {
                        Ok(Float(x / y))
                    }
                }
                _ => unreachable!(),
            }
        }
        (Text(x), Text(y)) if op == BinOp::Add => Ok(Text(format!("{x}{y}"))),
        _ => Err(ExprError::Type(format!(
            "operator '{}' not defined for {} and {}",
            op.symbol(),
            a.type_name(),
            b.type_name()
        ))),
    }
}

// --- parsing -----------------------------------------------------------

fn parse_or(s: &str) -> Result<Expr, ExprError> {
    if let Some((l, r)) = split_top_level(s, &["or"]) {
        return Ok(Expr::binary(BinOp::Or, parse_or(l)?, parse_and(r)?));
    }
    parse_and(s)
}

fn parse_and(s: &str) -> Result<Expr, ExprError> {
    if let Some((l, r)) = split_top_level(s, &["and"]) {
        return Ok(Expr::binary(BinOp::And, parse_and(l)?, parse_cmp(r)?));
    }
    parse_cmp(s)
}

fn parse_cmp(s: &str) -> Result<Expr, ExprError> {
    // Longest symbols first so "<=" is not read as "<".
    for (sym, op) in [
        ("==", BinOp::Eq),
        ("!=", BinOp::Ne),
        ("<=", BinOp::Le),
        (">=", BinOp::Ge),
        ("<", BinOp::Lt),
        (">", BinOp::Gt),
    ] {
        if let Some((l, r)) = split_top_level(s, &[sym]) {
            return Ok(Expr::binary(op, parse_add(l)?, parse_add(r)?));
        }
    }
    parse_add(s)
}

fn parse_add(s: &str) -> Result<Expr, ExprError> {
    if let Some((l, r)) = split_top_level_rightmost(s, &[("+", BinOp::Add), ("-", BinOp::Sub)]) {
        let (left, op, right) = (l.0, l.1, r);
        return Ok(Expr::binary(op, parse_add(left)?, parse_mul(right)?));
    }
    parse_mul(s)
}

fn parse_mul(s: &str) -> Result<Expr, ExprError> {
    if let Some((l, r)) = split_top_level_rightmost(s, &[("*", BinOp::Mul), ("/", BinOp::Div)]) {
        let (left, op, right) = (l.0, l.1, r);
        return Ok(Expr::binary(op, parse_mul(left)?, parse_atom(right)?));
    }
    parse_atom(s)
}

fn parse_atom(s: &str) -> Result<Expr, ExprError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ExprError::Parse("empty expression".into()));
    }
    if let Some(rest) = strip_keyword(s, "not") {
        return Ok(Expr::unary(UnaryOp::Not, parse_atom(rest)?));
    }
    if let Some(head) = strip_suffix_keyword(s, "is not null") {
        return Ok(Expr::unary(UnaryOp::IsNotNull, parse_atom(head)?));
    }
    if let Some(head) = strip_suffix_keyword(s, "is null") {
        return Ok(Expr::unary(UnaryOp::IsNull, parse_atom(head)?));
    }
    if s.starts_with('(') && s.ends_with(')') && balanced(&s[1..s.len() - 1]) {
        return parse_or(&s[1..s.len() - 1]);
    }
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        return Ok(Expr::literal(Value::Text(s[1..s.len() - 1].to_string())));
    }
    match s {
        "null" => return Ok(Expr::literal(Value::Null)),
        "true" => return Ok(Expr::literal(Value::Bool(true))),
        "false" => return Ok(Expr::literal(Value::Bool(false))),
        _ => {}
    }
    if let Ok(i) = s.parse::<i64>() {
        return Ok(Expr::literal(Value::Int(i)));
    }
    if let Ok(f) = s.parse::<f64>() {
        return Ok(Expr::literal(Value::Float(f)));
    }
    if s.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Ok(Expr::column(s));
    }
    Err(ExprError::Parse(format!("cannot parse '{s}'")))
}

fn strip_keyword<'a>(s: &'a str, kw: &str) -> Option<&'a str> {
    let rest = s.strip_prefix(kw)?;
    rest.starts_with(char::is_whitespace).then(|| rest.trim_start())
}

fn strip_suffix_keyword<'a>(s: &'a str, kw: &str) -> Option<&'a str> {
    let lower = s.to_ascii_lowercase();
    let head_len = lower.strip_suffix(kw)?.len();
    let head = &s[..head_len];
    head.ends_with(char::is_whitespace).then(|| head.trim_end())
}

fn balanced(s: &str) -> bool {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for c in s.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return false;
                    }
                }
                _ => {}
            },
        }
    }
    depth == 0 && quote.is_none()
}

/// Split on the last top-level occurrence of any symbol in `ops`,
/// ignoring text inside quotes or parentheses. Word operators ("and",
/// "or") must be delimited by whitespace.
fn split_top_level<'a>(s: &'a str, ops: &[&str]) -> Option<(&'a str, &'a str)> {
    let positions = top_level_positions(s);
    for op in ops {
        let word = op.chars().all(char::is_alphabetic);
        let mut best: Option<usize> = None;
        for &pos in &positions {
            if !s[pos..].starts_with(op) {
                continue;
            }
            if word {
                let before_ws = pos == 0 || s[..pos].ends_with(char::is_whitespace);
                let after = &s[pos + op.len()..];
                let after_ws = after.is_empty() || after.starts_with(char::is_whitespace);
                if !(before_ws && after_ws) || pos == 0 {
                    continue;
                }
            } else if pos == 0 {
                continue;
            }
            best = Some(pos);
        }
        if let Some(pos) = best {
            let (l, r) = (s[..pos].trim(), s[pos + op.len()..].trim());
            if !l.is_empty() && !r.is_empty() {
                return Some((l, r));
            }
        }
    }
    None
}

/// Like `split_top_level` but tracks which operator matched, and skips a
/// `+`/`-` that is a sign rather than an operator.
fn split_top_level_rightmost<'a>(
    s: &'a str,
    ops: &[(&str, BinOp)],
) -> Option<((&'a str, BinOp), &'a str)> {
    let positions = top_level_positions(s);
    let mut best: Option<(usize, BinOp, usize)> = None;
    for &(sym, op) in ops {
        for &pos in &positions {
            if pos == 0 || !s[pos..].starts_with(sym) {
                continue;
            }
            let before = s[..pos].trim_end();
            // "a * -b": the '-' is a sign, not a subtraction.
            if before.ends_with(|c: char| "+-*/<>=".contains(c)) || before.is_empty() {
                continue;
            }
            match best {
                Some((p, _, _)) if p >= pos => {}
                _ => best = Some((pos, op, sym.len())),
            }
        }
    }
    let (pos, op, len) = best?;
    let (l, r) = (s[..pos].trim(), s[pos + len..].trim());
    (!l.is_empty() && !r.is_empty()).then_some(((l, op), r))
}

/// Byte offsets in `s` that sit outside quotes and parentheses.
fn top_level_positions(s: &str) -> Vec<usize> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {
                    if depth == 0 {
                        out.push(i);
                    }
                }
            },
        }
    }
    out
}
