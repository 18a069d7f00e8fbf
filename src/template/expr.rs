//! Expression parsing and evaluation.
//!
//! Expressions appear inside `{{ }}` tags, `if`/`elif` conditions, and
//! `for` loop subjects. The grammar is deliberately small: literals,
//! dotted variable paths, unary `not`, binary `and`/`or` (short-circuit),
//! and the six comparison operators. Precedence, loosest to tightest:
//! `or`, `and`, `not`, comparison, primary. Parentheses group.
//!
//! Evaluation never fails: an unresolved variable path evaluates to
//! `Null` and records a warning, mirroring how missing variables in
//! output substitution degrade to the empty string rather than aborting
//! the render.

use serde::Serialize;

use crate::core::{ErrorCategory, GuidegenError};
use crate::template::value::{Value, VariableContext};

/// The six comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
}

/// A non-fatal problem observed while evaluating or rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderWarning {
    /// Which part of the taxonomy the warning belongs to
    pub category: ErrorCategory,
    /// Human-readable description
    pub message: String,
    /// 1-based template line, when known
    pub line: Option<usize>,
    /// 1-based template column, when known
    pub column: Option<usize>,
}

impl RenderWarning {
    pub(crate) fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub(crate) fn at(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Path(String),
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Not,
    And,
    Or,
    LParen,
    RParen,
    Cmp(CmpOp),
}

fn lex(input: &str) -> Result<Vec<Tok>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    toks.push(Tok::Cmp(CmpOp::Eq));
                    i += 2;
                } else {
                    return Err("'=' is not an operator; did you mean '=='?".to_string());
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    toks.push(Tok::Cmp(CmpOp::Ne));
                    i += 2;
                } else {
                    return Err("'!' is not an operator; use 'not'".to_string());
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    toks.push(Tok::Cmp(CmpOp::Ge));
                    i += 2;
                } else {
                    toks.push(Tok::Cmp(CmpOp::Gt));
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    toks.push(Tok::Cmp(CmpOp::Le));
                    i += 2;
                } else {
                    toks.push(Tok::Cmp(CmpOp::Lt));
                    i += 1;
                }
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < chars.len() {
                    if chars[j] == '\\' && j + 1 < chars.len() {
                        s.push(chars[j + 1]);
                        j += 2;
                    } else if chars[j] == quote {
                        closed = true;
                        j += 1;
                        break;
                    } else {
                        s.push(chars[j]);
                        j += 1;
                    }
                }
                if !closed {
                    return Err("unterminated string literal".to_string());
                }
                toks.push(Tok::Str(s));
                i = j;
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text
                    .parse()
                    .map_err(|_| format!("invalid number literal '{text}'"))?;
                toks.push(Tok::Num(n));
            }
            '-' => {
                // Negative number literal
                let start = i;
                i += 1;
                if i >= chars.len() || !chars[i].is_ascii_digit() {
                    return Err("'-' must begin a number literal".to_string());
                }
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text
                    .parse()
                    .map_err(|_| format!("invalid number literal '{text}'"))?;
                toks.push(Tok::Num(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if word.ends_with('.') || word.contains("..") {
                    return Err(format!("malformed variable path '{word}'"));
                }
                toks.push(match word.as_str() {
                    "not" => Tok::Not,
                    "and" => Tok::And,
                    "or" => Tok::Or,
                    "true" => Tok::Bool(true),
                    "false" => Tok::Bool(false),
                    "null" => Tok::Null,
                    _ => Tok::Path(word),
                });
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(toks)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Tok::Or) {
            self.next();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_not()?;
        while self.peek() == Some(&Tok::And) {
            self.next();
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Tok::Not) {
            self.next();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_primary()?;
        while let Some(Tok::Cmp(op)) = self.peek().cloned() {
            self.next();
            let rhs = self.parse_primary()?;
            lhs = Expr::Compare(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Tok::Path(p)) => Ok(Expr::Path(p)),
            Some(Tok::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Tok::Num(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Tok::Bool(b)) => Ok(Expr::Literal(Value::Bool(b))),
            Some(Tok::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Tok::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Tok::RParen) => Ok(inner),
                    _ => Err("expected closing ')'".to_string()),
                }
            }
            Some(other) => Err(format!("unexpected token {other:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

/// Parse an expression string into a tree.
///
/// # Errors
///
/// Returns [`GuidegenError::ExpressionSyntax`] when the input does not
/// conform to the grammar.
pub fn parse_expression(input: &str) -> Result<Expr, GuidegenError> {
    let fail = |message: String| GuidegenError::ExpressionSyntax {
        expression: input.to_string(),
        message,
    };

    let toks = lex(input).map_err(|m| fail(m))?;
    if toks.is_empty() {
        return Err(fail("empty expression".to_string()));
    }
    let mut parser = Parser { toks, pos: 0 };
    let expr = parser.parse_or().map_err(|m| fail(m))?;
    if parser.pos != parser.toks.len() {
        return Err(fail(format!(
            "trailing input after expression: {:?}",
            &parser.toks[parser.pos..]
        )));
    }
    Ok(expr)
}

/// Parse a `for` loop header of the form `ident in expr`.
///
/// Returns the loop variable name and the parsed sequence expression.
pub(crate) fn parse_loop_header(header: &str) -> Result<(String, Expr), GuidegenError> {
    let fail = |message: String| GuidegenError::ExpressionSyntax {
        expression: header.to_string(),
        message,
    };

    let mut words = header.split_whitespace();
    let var = words
        .next()
        .ok_or_else(|| fail("expected 'ident in expr'".to_string()))?;
    if !is_identifier(var) {
        return Err(fail(format!("'{var}' is not a valid loop variable name")));
    }
    match words.next() {
        Some("in") => {}
        _ => return Err(fail("expected 'in' after loop variable".to_string())),
    }
    let seq: Vec<&str> = words.collect();
    if seq.is_empty() {
        return Err(fail("expected a sequence expression after 'in'".to_string()));
    }
    let seq_expr = parse_expression(&seq.join(" "))?;
    Ok((var.to_string(), seq_expr))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluate an expression against a variable context.
///
/// Comparisons and boolean operators always yield `Bool`. An unresolved
/// path yields `Null` and pushes a warning.
pub fn evaluate(expr: &Expr, ctx: &VariableContext, warnings: &mut Vec<RenderWarning>) -> Value {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Path(path) => match ctx.lookup(path) {
            Some(v) => v,
            None => {
                warnings.push(RenderWarning::new(
                    ErrorCategory::Validation,
                    format!("variable '{path}' is undefined; treated as null"),
                ));
                Value::Null
            }
        },
        Expr::Not(inner) => Value::Bool(!evaluate(inner, ctx, warnings).is_truthy()),
        Expr::And(lhs, rhs) => {
            // Short-circuit: rhs is untouched when lhs is falsy
            if !evaluate(lhs, ctx, warnings).is_truthy() {
                Value::Bool(false)
            } else {
                Value::Bool(evaluate(rhs, ctx, warnings).is_truthy())
            }
        }
        Expr::Or(lhs, rhs) => {
            if evaluate(lhs, ctx, warnings).is_truthy() {
                Value::Bool(true)
            } else {
                Value::Bool(evaluate(rhs, ctx, warnings).is_truthy())
            }
        }
        Expr::Compare(op, lhs, rhs) => {
            let l = evaluate(lhs, ctx, warnings);
            let r = evaluate(rhs, ctx, warnings);
            Value::Bool(compare(*op, &l, &r, warnings))
        }
    }
}

/// Apply a comparison operator. Equality is deep; ordering is defined for
/// number/number and string/string pairs, anything else is `false` with a
/// warning.
fn compare(op: CmpOp, l: &Value, r: &Value, warnings: &mut Vec<RenderWarning>) -> bool {
    match op {
        CmpOp::Eq => l == r,
        CmpOp::Ne => l != r,
        CmpOp::Gt | CmpOp::Lt | CmpOp::Ge | CmpOp::Le => {
            let ordering = match (l, r) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            let Some(ordering) = ordering else {
                warnings.push(RenderWarning::new(
                    ErrorCategory::Validation,
                    format!(
                        "cannot order {} against {} with '{}'",
                        l.type_name(),
                        r.type_name(),
                        op.symbol()
                    ),
                ));
                return false;
            };
            match op {
                CmpOp::Gt => ordering == std::cmp::Ordering::Greater,
                CmpOp::Lt => ordering == std::cmp::Ordering::Less,
                CmpOp::Ge => ordering != std::cmp::Ordering::Less,
                CmpOp::Le => ordering != std::cmp::Ordering::Greater,
                _ => unreachable!(),
            }
        }
    }
}

/// Collect the root variable names referenced by an expression.
///
/// Used by the validator to cross-check references against a template's
/// variable schema without evaluating anything.
pub(crate) fn collect_roots(expr: &Expr, out: &mut std::collections::BTreeSet<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Path(p) => {
            if let Some(root) = p.split('.').next() {
                out.insert(root.to_string());
            }
        }
        Expr::Not(inner) => collect_roots(inner, out),
        Expr::And(a, b) | Expr::Or(a, b) | Expr::Compare(_, a, b) => {
            collect_roots(a, out);
            collect_roots(b, out);
        }
    }
}
