//! Task conditions — a small boolean expression language.
//!
//! Conditions are parsed into an [`Expr`] tree and evaluated against the
//! task's *resolved* input map. Nothing is ever compiled or executed.
//!
//! ```text
//! expr       := or
//! or         := and ( "||" and )*
//! and        := unary ( "&&" unary )*
//! unary      := "!" unary | comparison
//! comparison := primary ( ("==" | "!=" | "<" | "<=" | ">" | ">=") primary )?
//! primary    := number | string | "true" | "false" | "null" | path | "(" expr ")"
//! path       := ident ( "." ident )*
//! ```
//!
//! Paths look up fields of the input map; a leading `input.` is accepted as
//! an alias for the map root. A bare path is tested for truthiness
//! (`null`, `false`, `0` and `""` are false). Referencing a field that does
//! not exist is an error, not `false`.
//!
//! Expression trees are capped at [`MAX_DEPTH`] levels, counting `!`,
//! parentheses and chained `&&`/`||` operators.

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Deepest expression tree a condition may produce.
pub const MAX_DEPTH: usize = 64;

/// Why a condition could not be evaluated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConditionError {
    #[error("condition is empty")]
    Empty,

    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: &'static str, found: String },

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("cannot order {left} against {right}")]
    Incomparable { left: String, right: String },

    #[error("condition nests deeper than {0} levels")]
    TooDeep(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Parsed condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// A parsed, reusable condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ConditionError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0, depth: 0 };
        let expr = parser.or()?;
        if let Some(token) = parser.peek() {
            return Err(ConditionError::UnexpectedToken {
                expected: "end of condition",
                found: token.describe(),
            });
        }
        Ok(Self { expr })
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn evaluate(&self, input: &Map<String, Value>) -> Result<bool, ConditionError> {
        eval(&self.expr, input).map(|v| truthy(&v))
    }
}

/// Parse and evaluate `source` in one step.
pub fn evaluate(source: &str, input: &Map<String, Value>) -> Result<bool, ConditionError> {
    Condition::parse(source)?.evaluate(input)
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Not,
    And,
    Or,
    Op(CompareOp),
    Literal(Value),
    Ident(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::Not => "'!'".into(),
            Token::And => "'&&'".into(),
            Token::Or => "'||'".into(),
            Token::Op(op) => format!("operator {op:?}"),
            Token::Literal(v) => format!("literal {v}"),
            Token::Ident(name) => format!("'{name}'"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, ch) = chars[i];
        let next = chars.get(i + 1).map(|&(_, c)| c);

        match (ch, next) {
            (c, _) if c.is_whitespace() => i += 1,
            ('(', _) => { tokens.push(Token::LParen); i += 1; }
            (')', _) => { tokens.push(Token::RParen); i += 1; }
            ('&', Some('&')) => { tokens.push(Token::And); i += 2; }
            ('|', Some('|')) => { tokens.push(Token::Or); i += 2; }
            ('=', Some('=')) => { tokens.push(Token::Op(CompareOp::Eq)); i += 2; }
            ('!', Some('=')) => { tokens.push(Token::Op(CompareOp::Ne)); i += 2; }
            ('<', Some('=')) => { tokens.push(Token::Op(CompareOp::Le)); i += 2; }
            ('>', Some('=')) => { tokens.push(Token::Op(CompareOp::Ge)); i += 2; }
            ('!', _) => { tokens.push(Token::Not); i += 1; }
            ('<', _) => { tokens.push(Token::Op(CompareOp::Lt)); i += 1; }
            ('>', _) => { tokens.push(Token::Op(CompareOp::Gt)); i += 1; }
            ('"' | '\'', _) => {
                let quote = ch;
                let mut text = String::new();
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        None => return Err(ConditionError::UnterminatedString(offset)),
                        Some(&(_, '\\')) => {
                            if let Some(&(_, escaped)) = chars.get(j + 1) {
                                text.push(escaped);
                            }
                            j += 2;
                        }
                        Some(&(_, c)) if c == quote => break,
                        Some(&(_, c)) => {
                            text.push(c);
                            j += 1;
                        }
                    }
                }
                tokens.push(Token::Literal(Value::String(text)));
                i = j + 1;
            }
            (c, n) if c.is_ascii_digit() || (c == '-' && n.is_some_and(|n| n.is_ascii_digit())) => {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].1.is_ascii_digit() || chars[j].1 == '.') {
                    j += 1;
                }
                let end = chars.get(j).map_or(source.len(), |&(o, _)| o);
                tokens.push(Token::Literal(parse_number(&source[offset..end])?));
                i = j;
            }
            (c, _) if is_ident_start(c) => {
                let mut j = i + 1;
                while j < chars.len() && (is_ident_char(chars[j].1) || chars[j].1 == '.') {
                    j += 1;
                }
                let end = chars.get(j).map_or(source.len(), |&(o, _)| o);
                let word = &source[offset..end];
                tokens.push(match word {
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "null" => Token::Literal(Value::Null),
                    _ => Token::Ident(word.to_owned()),
                });
                i = j;
            }
            _ => return Err(ConditionError::UnexpectedChar { ch, offset }),
        }
    }

    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn parse_number(text: &str) -> Result<Value, ConditionError> {
    if let Ok(n) = text.parse::<i64>() {
        return Ok(Value::Number(n.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| ConditionError::InvalidNumber(text.to_owned()))
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Levels of the tree above the node being parsed.
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn descend(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ConditionError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    // Chains build left-nested trees, so every operator adds a level.
    fn or(&mut self) -> Result<Expr, ConditionError> {
        let entry = self.depth;
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            self.descend()?;
            left = Expr::Or(Box::new(left), Box::new(self.and()?));
        }
        self.depth = entry;
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ConditionError> {
        let entry = self.depth;
        let mut left = self.unary()?;
        while self.eat(&Token::And) {
            self.descend()?;
            left = Expr::And(Box::new(left), Box::new(self.unary()?));
        }
        self.depth = entry;
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ConditionError> {
        if self.eat(&Token::Not) {
            self.descend()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ConditionError> {
        let left = self.primary()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.primary()?;
            return Ok(Expr::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Expr, ConditionError> {
        match self.next() {
            Some(Token::Literal(value)) => Ok(Expr::Literal(value)),
            Some(Token::Ident(name)) => {
                let segments: Vec<String> = name.split('.').map(str::to_owned).collect();
                if segments.iter().any(String::is_empty) {
                    return Err(ConditionError::UnexpectedToken {
                        expected: "a field path",
                        found: format!("'{name}'"),
                    });
                }
                Ok(Expr::Path(segments))
            }
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.or()?;
                self.depth -= 1;
                if !self.eat(&Token::RParen) {
                    return Err(ConditionError::UnexpectedToken {
                        expected: "')'",
                        found: self.peek().map_or("end of condition".into(), Token::describe),
                    });
                }
                Ok(inner)
            }
            Some(other) => Err(ConditionError::UnexpectedToken {
                expected: "a value",
                found: other.describe(),
            }),
            None => Err(ConditionError::UnexpectedToken {
                expected: "a value",
                found: "end of condition".into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn eval(expr: &Expr, input: &Map<String, Value>) -> Result<Value, ConditionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(segments) => lookup(segments, input),
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, input)?))),
        Expr::And(l, r) => {
            let result = truthy(&eval(l, input)?) && truthy(&eval(r, input)?);
            Ok(Value::Bool(result))
        }
        Expr::Or(l, r) => {
            let result = truthy(&eval(l, input)?) || truthy(&eval(r, input)?);
            Ok(Value::Bool(result))
        }
        Expr::Compare { op, left, right } => {
            let l = eval(left, input)?;
            let r = eval(right, input)?;
            compare(*op, &l, &r).map(Value::Bool)
        }
    }
}

fn lookup(segments: &[String], input: &Map<String, Value>) -> Result<Value, ConditionError> {
    let path = match segments {
        [root, rest @ ..] if root == "input" && !input.contains_key("input") => rest,
        all => all,
    };

    let mut current: Option<&Value> = None;
    for segment in path {
        let next = match current {
            None => input.get(segment),
            Some(Value::Object(map)) => map.get(segment),
            Some(Value::Array(items)) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            Some(_) => None,
        };
        current = Some(next.ok_or_else(|| ConditionError::UnknownVariable(segments.join(".")))?);
    }

    Ok(match current {
        Some(value) => value.clone(),
        // Bare `input`.
        None => Value::Object(input.clone()),
    })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn compare(op: CompareOp, l: &Value, r: &Value) -> Result<bool, ConditionError> {
    use std::cmp::Ordering;

    let ordering: Option<Ordering> = match (l, r) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };

    match op {
        CompareOp::Eq => Ok(ordering.map_or_else(|| l == r, Ordering::is_eq)),
        CompareOp::Ne => Ok(ordering.map_or_else(|| l != r, Ordering::is_ne)),
        _ => {
            let ordering = ordering.ok_or_else(|| ConditionError::Incomparable {
                left: l.to_string(),
                right: r.to_string(),
            })?;
            Ok(match op {
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Le => ordering.is_le(),
                CompareOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input() -> Map<String, Value> {
        match json!({
            "score": 72,
            "ratio": 0.5,
            "status": "ok",
            "enabled": true,
            "empty": "",
            "note": null,
            "page": { "title": "Home", "links": [1, 2, 3] }
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn check(source: &str) -> bool {
        evaluate(source, &input()).unwrap_or_else(|e| panic!("'{source}' failed: {e}"))
    }

    #[test]
    fn comparisons_on_numbers_and_strings() {
        assert!(check("score > 50"));
        assert!(check("score >= 72"));
        assert!(!check("score < 72"));
        assert!(check("ratio <= 0.5"));
        assert!(check("score == 72.0"));
        assert!(check("status == 'ok'"));
        assert!(check("status != \"failed\""));
        assert!(check("page.title < 'Zebra'"));
    }

    #[test]
    fn boolean_operators_and_precedence() {
        // && binds tighter than ||
        assert!(check("score < 0 || enabled && status == 'ok'"));
        assert!(!check("(score < 0 || enabled) && status == 'bad'"));
        assert!(check("!(score < 0)"));
        assert!(check("!!enabled"));
    }

    #[test]
    fn bare_paths_test_truthiness() {
        assert!(check("enabled"));
        assert!(!check("empty"));
        assert!(!check("note"));
        assert!(check("page.links"));
        assert!(check("page.links.0"));
    }

    #[test]
    fn input_prefix_is_an_alias_for_the_root() {
        assert!(check("input.score == 72"));
        assert!(check("input.page.title == 'Home'"));
    }

    #[test]
    fn null_equality_is_structural() {
        assert!(check("note == null"));
        assert!(check("status != null"));
        assert!(check("score != 'x'"));
    }

    #[test]
    fn missing_variable_is_an_error() {
        assert_eq!(
            evaluate("nope > 1", &input()),
            Err(ConditionError::UnknownVariable("nope".into()))
        );
        assert_eq!(
            evaluate("page.author == 'x'", &input()),
            Err(ConditionError::UnknownVariable("page.author".into()))
        );
    }

    #[test]
    fn ordering_mismatched_types_is_an_error() {
        assert!(matches!(
            evaluate("status > 3", &input()),
            Err(ConditionError::Incomparable { .. })
        ));
    }

    #[test]
    fn malformed_sources_are_rejected() {
        assert_eq!(evaluate("   ", &input()), Err(ConditionError::Empty));
        assert!(matches!(evaluate("score >", &input()), Err(ConditionError::UnexpectedToken { .. })));
        assert!(matches!(evaluate("(score > 1", &input()), Err(ConditionError::UnexpectedToken { .. })));
        assert!(matches!(evaluate("score = 1", &input()), Err(ConditionError::UnexpectedChar { ch: '=', .. })));
        assert!(matches!(evaluate("status == 'ok", &input()), Err(ConditionError::UnterminatedString(_))));
        assert!(matches!(evaluate("score > 1 2", &input()), Err(ConditionError::UnexpectedToken { .. })));
        assert!(matches!(evaluate("page..title", &input()), Err(ConditionError::UnexpectedToken { .. })));
    }

    #[test]
    fn code_is_never_executed() {
        // Looks like a call; it is just an unknown identifier followed by junk.
        assert!(evaluate("process.exit(1)", &input()).is_err());
        assert!(evaluate("require('fs')", &input()).is_err());
    }

    #[test]
    fn parsed_condition_is_reusable() {
        let cond = Condition::parse("score > threshold").expect("parses");
        let mut ctx = input();
        ctx.insert("threshold".into(), json!(100));
        assert!(!cond.evaluate(&ctx).unwrap());
        ctx.insert("threshold".into(), json!(10));
        assert!(cond.evaluate(&ctx).unwrap());
        assert!(matches!(cond.expr(), Expr::Compare { op: CompareOp::Gt, .. }));
    }

    #[test]
    fn negative_numbers_parse() {
        assert!(check("score > -1"));
        assert!(check("-0.5 < ratio"));
    }

    #[test]
    fn moderate_nesting_is_accepted() {
        let nested = format!("{}score > 50{}", "(".repeat(20), ")".repeat(20));
        assert!(check(&nested));
        assert!(check(&format!("{}enabled", "!!".repeat(10))));
    }

    #[test]
    fn runaway_nesting_is_rejected() {
        let parens = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_eq!(evaluate(&parens, &input()), Err(ConditionError::TooDeep(MAX_DEPTH)));

        let negations = format!("{}true", "!".repeat(20_000));
        assert_eq!(evaluate(&negations, &input()), Err(ConditionError::TooDeep(MAX_DEPTH)));

        let chain = vec!["enabled"; 10_000].join(" && ");
        assert_eq!(evaluate(&chain, &input()), Err(ConditionError::TooDeep(MAX_DEPTH)));
    }

    #[test]
    fn depth_limit_is_exact() {
        let at_limit = format!("{}true", "!".repeat(MAX_DEPTH));
        assert!(evaluate(&at_limit, &input()).is_ok());
        let over = format!("{}true", "!".repeat(MAX_DEPTH + 1));
        assert_eq!(evaluate(&over, &input()), Err(ConditionError::TooDeep(MAX_DEPTH)));
    }
}
