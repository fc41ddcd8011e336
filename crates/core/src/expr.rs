// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource requirement expressions.
//!
//! A requirement is one line of a job's `requires`, e.g.
//! `package.name == "fwts" and package.version >= 22`. Each line names
//! exactly one resource; it holds when at least one record produced by that
//! resource satisfies it. Referencing an attribute a record lacks makes the
//! line false for that record, including under `not`.

use crate::resource::ResourceRecord;
use std::borrow::Cow;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("empty requirement expression")]
    Empty,
    #[error("unexpected character {ch:?} at offset {pos} in {text:?}")]
    UnexpectedChar { ch: char, pos: usize, text: String },
    #[error("unterminated string literal in {0:?}")]
    UnterminatedString(String),
    #[error("unexpected {found} in {text:?}")]
    Unexpected { found: String, text: String },
    #[error("{0:?} does not reference any resource")]
    NoResource(String),
    #[error("{text:?} references more than one resource ({first}, {second})")]
    MultipleResources { text: String, first: String, second: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `resource.attribute`
    Attr { resource: String, attr: String },
    Str(String),
    Num(f64),
    Bool(bool),
    List(Vec<Operand>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare { op: CmpOp, lhs: Operand, rhs: Operand },
    Truthy(Operand),
}

/// A parsed `requires` line.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    text: String,
    resource: String,
    expr: Expr,
}

impl Requirement {
    pub fn parse(text: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(ExprError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0, text };
        let expr = parser.parse_or()?;
        if let Some(tok) = parser.peek() {
            return Err(parser.unexpected(tok));
        }

        let mut resources = Vec::new();
        collect_resources(&expr, &mut resources);
        let resource = match resources.as_slice() {
            [] => return Err(ExprError::NoResource(text.to_string())),
            [one] => one.clone(),
            [first, second, ..] => {
                return Err(ExprError::MultipleResources {
                    text: text.to_string(),
                    first: first.clone(),
                    second: second.clone(),
                })
            }
        };
        Ok(Self { text: text.trim().to_string(), resource, expr })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Name of the referenced resource, as written (partial id or import alias).
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// True when any record satisfies the expression.
    pub fn evaluate(&self, records: &[ResourceRecord]) -> bool {
        records.iter().any(|record| eval(&self.expr, record) == Some(true))
    }
}

fn collect_resources(expr: &Expr, out: &mut Vec<String>) {
    fn operand(op: &Operand, out: &mut Vec<String>) {
        match op {
            Operand::Attr { resource, .. } => {
                if !out.contains(resource) {
                    out.push(resource.clone());
                }
            }
            Operand::List(items) => items.iter().for_each(|i| operand(i, out)),
            Operand::Str(_) | Operand::Num(_) | Operand::Bool(_) => {}
        }
    }
    match expr {
        Expr::Or(a, b) | Expr::And(a, b) => {
            collect_resources(a, out);
            collect_resources(b, out);
        }
        Expr::Not(e) => collect_resources(e, out),
        Expr::Compare { lhs, rhs, .. } => {
            operand(lhs, out);
            operand(rhs, out);
        }
        Expr::Truthy(op) => operand(op, out),
    }
}

// ── Tokenizer ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Cmp(CmpOp),
    And,
    Or,
    Not,
    In,
    Bool(bool),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "identifier {s:?}"),
            Token::Str(s) => write!(f, "string {s:?}"),
            Token::Num(n) => write!(f, "number {n}"),
            Token::Dot => f.write_str("'.'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::LBracket => f.write_str("'['"),
            Token::RBracket => f.write_str("']'"),
            Token::Comma => f.write_str("','"),
            Token::Cmp(op) => write!(f, "operator {op:?}"),
            Token::And => f.write_str("'and'"),
            Token::Or => f.write_str("'or'"),
            Token::Not => f.write_str("'not'"),
            Token::In => f.write_str("'in'"),
            Token::Bool(b) => write!(f, "{b}"),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let bad = |pos: usize, ch: char| ExprError::UnexpectedChar { ch, pos, text: text.to_string() };

    while let Some(&(pos, ch)) = chars.get(i) {
        let next = chars.get(i + 1).map(|&(_, c)| c);
        match ch {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '(' | ')' | '[' | ']' | ',' => {
                tokens.push(match ch {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    _ => Token::Comma,
                });
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let (op, len) = match (ch, next) {
                    ('=', Some('=')) => (CmpOp::Eq, 2),
                    ('!', Some('=')) => (CmpOp::Ne, 2),
                    ('<', Some('=')) => (CmpOp::Le, 2),
                    ('>', Some('=')) => (CmpOp::Ge, 2),
                    ('<', _) => (CmpOp::Lt, 1),
                    ('>', _) => (CmpOp::Gt, 1),
                    _ => return Err(bad(pos, ch)),
                };
                tokens.push(Token::Cmp(op));
                i += len;
            }
            '\'' | '"' => {
                let quote = ch;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(ExprError::UnterminatedString(text.to_string())),
                        Some(&(_, '\\')) => {
                            if let Some(&(_, escaped)) = chars.get(i + 1) {
                                value.push(escaped);
                            }
                            i += 2;
                        }
                        Some(&(_, c)) if c == quote => {
                            i += 1;
                            break;
                        }
                        Some(&(_, c)) => {
                            value.push(c);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while chars.get(i).is_some_and(|&(_, c)| c.is_ascii_digit() || c == '.') {
                    i += 1;
                }
                let end = chars.get(i).map_or(text.len(), |&(p, _)| p);
                let literal = &text[chars[start].0..end];
                let value = literal.parse::<f64>().map_err(|_| bad(pos, ch))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while chars
                    .get(i)
                    .is_some_and(|&(_, c)| c.is_alphanumeric() || c == '_' || c == '-')
                {
                    i += 1;
                }
                let end = chars.get(i).map_or(text.len(), |&(p, _)| p);
                let word = &text[chars[start].0..end];
                tokens.push(match word {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "True" | "true" => Token::Bool(true),
                    "False" | "false" => Token::Bool(false),
                    _ => Token::Ident(word.to_string()),
                });
            }
            _ => return Err(bad(pos, ch)),
        }
    }
    Ok(tokens)
}

// ── Parser ──────────────────────────────────────────────────────────────────

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    text: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn unexpected(&self, tok: &Token) -> ExprError {
        ExprError::Unexpected { found: tok.to_string(), text: self.text.to_string() }
    }

    fn end_of_input(&self) -> ExprError {
        ExprError::Unexpected { found: "end of expression".to_string(), text: self.text.to_string() }
    }

    fn expect(&mut self, want: &Token) -> Result<(), ExprError> {
        match self.bump() {
            Some(ref tok) if tok == want => Ok(()),
            Some(tok) => Err(self.unexpected(&tok)),
            None => Err(self.end_of_input()),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }

        let lhs = self.parse_operand(false)?;
        let op = match (self.peek(), self.tokens.get(self.pos + 1)) {
            (Some(Token::Cmp(op)), _) => {
                let op = *op;
                self.pos += 1;
                op
            }
            (Some(Token::In), _) => {
                self.pos += 1;
                CmpOp::In
            }
            (Some(Token::Not), Some(Token::In)) => {
                self.pos += 2;
                CmpOp::NotIn
            }
            _ => return Ok(Expr::Truthy(lhs)),
        };
        let rhs = self.parse_operand(matches!(op, CmpOp::In | CmpOp::NotIn))?;
        Ok(Expr::Compare { op, lhs, rhs })
    }

    /// `tuple_parens` allows `(a, b)` as a list, used on the right of `in`.
    fn parse_operand(&mut self, tuple_parens: bool) -> Result<Operand, ExprError> {
        match self.bump() {
            Some(Token::Ident(resource)) => {
                self.expect(&Token::Dot)?;
                match self.bump() {
                    Some(Token::Ident(attr)) => Ok(Operand::Attr { resource, attr }),
                    Some(tok) => Err(self.unexpected(&tok)),
                    None => Err(self.end_of_input()),
                }
            }
            Some(Token::Str(s)) => Ok(Operand::Str(s)),
            Some(Token::Num(n)) => Ok(Operand::Num(n)),
            Some(Token::Bool(b)) => Ok(Operand::Bool(b)),
            Some(Token::LBracket) => self.parse_list(Token::RBracket),
            Some(Token::LParen) if tuple_parens => self.parse_list(Token::RParen),
            Some(tok) => Err(self.unexpected(&tok)),
            None => Err(self.end_of_input()),
        }
    }

    fn parse_list(&mut self, close: Token) -> Result<Operand, ExprError> {
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(&close) {
                self.pos += 1;
                return Ok(Operand::List(items));
            }
            items.push(self.parse_operand(false)?);
            match self.bump() {
                Some(Token::Comma) => {}
                Some(ref tok) if *tok == close => return Ok(Operand::List(items)),
                Some(tok) => return Err(self.unexpected(&tok)),
                None => return Err(self.end_of_input()),
            }
        }
    }
}

// ── Evaluation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Value<'a> {
    Str(Cow<'a, str>),
    Num(f64),
    Bool(bool),
    List(Vec<Value<'a>>),
}

impl Value<'_> {
    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Bool(_) | Value::List(_) => None,
        }
    }

    fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Str(s) => Some(Cow::Borrowed(s.as_ref())),
            Value::Num(n) if n.fract() == 0.0 => Some(Cow::Owned(format!("{}", *n as i64))),
            Value::Num(n) => Some(Cow::Owned(n.to_string())),
            Value::Bool(true) => Some(Cow::Borrowed("True")),
            Value::Bool(false) => Some(Cow::Borrowed("False")),
            Value::List(_) => None,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0,
            Value::Bool(b) => *b,
            Value::List(items) => !items.is_empty(),
        }
    }
}

fn resolve<'a>(op: &'a Operand, record: &'a ResourceRecord) -> Option<Value<'a>> {
    match op {
        Operand::Attr { attr, .. } => record.get(attr).map(|v| Value::Str(Cow::Borrowed(v))),
        Operand::Str(s) => Some(Value::Str(Cow::Borrowed(s))),
        Operand::Num(n) => Some(Value::Num(*n)),
        Operand::Bool(b) => Some(Value::Bool(*b)),
        Operand::List(items) => {
            items.iter().map(|i| resolve(i, record)).collect::<Option<Vec<_>>>().map(Value::List)
        }
    }
}

fn order(a: &Value<'_>, b: &Value<'_>) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return x.partial_cmp(&y);
    }
    Some(a.as_text()?.cmp(&b.as_text()?))
}

fn contains(needle: &Value<'_>, haystack: &Value<'_>) -> Option<bool> {
    match haystack {
        Value::List(items) => Some(items.iter().any(|i| order(needle, i) == Some(Ordering::Equal))),
        Value::Str(s) => Some(s.contains(needle.as_text()?.as_ref())),
        Value::Num(_) | Value::Bool(_) => None,
    }
}

/// `None` means the expression could not be evaluated against this record.
fn eval(expr: &Expr, record: &ResourceRecord) -> Option<bool> {
    match expr {
        Expr::Or(a, b) => {
            if eval(a, record)? {
                Some(true)
            } else {
                eval(b, record)
            }
        }
        Expr::And(a, b) => {
            if eval(a, record)? {
                eval(b, record)
            } else {
                Some(false)
            }
        }
        Expr::Not(e) => eval(e, record).map(|v| !v),
        Expr::Truthy(op) => resolve(op, record).map(|v| v.truthy()),
        Expr::Compare { op, lhs, rhs } => {
            let lhs = resolve(lhs, record)?;
            let rhs = resolve(rhs, record)?;
            match op {
                CmpOp::Eq => Some(order(&lhs, &rhs)? == Ordering::Equal),
                CmpOp::Ne => Some(order(&lhs, &rhs)? != Ordering::Equal),
                CmpOp::Lt => Some(order(&lhs, &rhs)? == Ordering::Less),
                CmpOp::Le => Some(order(&lhs, &rhs)? != Ordering::Greater),
                CmpOp::Gt => Some(order(&lhs, &rhs)? == Ordering::Greater),
                CmpOp::Ge => Some(order(&lhs, &rhs)? != Ordering::Less),
                CmpOp::In => contains(&lhs, &rhs),
                CmpOp::NotIn => contains(&lhs, &rhs).map(|v| !v),
            }
        }
    }
}

#[cfg(test)]
#[path = "expr_tests.rs"]
mod tests;
