// pydeps-common/src/model/marker.rs
//! PEP 508 environment markers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::requirement::canonicalize_name;
use super::specifier::{Operator, Specifier};
use super::version::Version;
use crate::error::{PydepsError, Result};

/// Marker variable values for one target environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerEnvironment {
    values: BTreeMap<String, String>,
}

impl MarkerEnvironment {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// A copy with `extra` bound to `extra`.
    pub fn with_extra(&self, extra: &str) -> Self {
        let mut env = self.clone();
        env.set("extra", extra);
        env
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarkerValue {
    Variable(String),
    Literal(String),
}

impl fmt::Display for MarkerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(name) => f.write_str(name),
            Self::Literal(value) => write!(f, "\"{value}\""),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerOp {
    Compare(Operator),
    In,
    NotIn,
}

impl fmt::Display for MarkerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare(op) => write!(f, "{op}"),
            Self::In => f.write_str("in"),
            Self::NotIn => f.write_str("not in"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarkerTree {
    Expression {
        lhs: MarkerValue,
        op: MarkerOp,
        rhs: MarkerValue,
    },
    And(Vec<MarkerTree>),
    Or(Vec<MarkerTree>),
}

pub fn evaluate_marker(expr: &MarkerTree, environment: &MarkerEnvironment) -> Result<bool> {
    expr.evaluate(environment)
}

impl MarkerTree {
    pub fn parse(text: &str) -> Result<Self> {
        let tokens = tokenize(text)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            text,
        };
        let tree = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(tree)
    }

    pub fn evaluate(&self, env: &MarkerEnvironment) -> Result<bool> {
        match self {
            Self::And(children) => {
                for child in children {
                    if !child.evaluate(env)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or(children) => {
                for child in children {
                    if child.evaluate(env)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Expression { lhs, op, rhs } => eval_expression(lhs, *op, rhs, env),
        }
    }

    /// Whether the tree references the `extra` variable anywhere.
    pub fn mentions_extra(&self) -> bool {
        match self {
            Self::And(children) | Self::Or(children) => children.iter().any(Self::mentions_extra),
            Self::Expression { lhs, rhs, .. } => [lhs, rhs]
                .iter()
                .any(|v| matches!(v, MarkerValue::Variable(name) if name == "extra")),
        }
    }
}

fn resolve<'a>(value: &'a MarkerValue, env: &'a MarkerEnvironment) -> Result<&'a str> {
    match value {
        MarkerValue::Literal(s) => Ok(s),
        MarkerValue::Variable(name) => env.get(name).ok_or_else(|| {
            PydepsError::MarkerEvaluation(format!("unknown marker variable '{name}'"))
        }),
    }
}

fn eval_expression(
    lhs: &MarkerValue,
    op: MarkerOp,
    rhs: &MarkerValue,
    env: &MarkerEnvironment,
) -> Result<bool> {
    let is_extra = [lhs, rhs]
        .iter()
        .any(|v| matches!(v, MarkerValue::Variable(name) if name == "extra"));
    let (left, right) = if is_extra {
        (
            canonicalize_name(resolve(lhs, env)?),
            canonicalize_name(resolve(rhs, env)?),
        )
    } else {
        (resolve(lhs, env)?.to_string(), resolve(rhs, env)?.to_string())
    };

    match op {
        MarkerOp::In => Ok(right.contains(&left)),
        MarkerOp::NotIn => Ok(!right.contains(&left)),
        MarkerOp::Compare(operator) => {
            if !is_extra {
                if let (Ok(spec), Ok(version)) = (
                    Specifier::parse(&format!("{operator}{right}")),
                    Version::parse(&left),
                ) {
                    return Ok(spec.matches(&version));
                }
            }
            match operator {
                Operator::Equal | Operator::Arbitrary => Ok(left == right),
                Operator::NotEqual => Ok(left != right),
                _ => Err(PydepsError::MarkerEvaluation(format!(
                    "undefined comparison '{left}' {operator} '{right}'"
                ))),
            }
        }
    }
}

impl fmt::Display for MarkerTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expression { lhs, op, rhs } => write!(f, "{lhs} {op} {rhs}"),
            Self::And(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" and ")?;
                    }
                    match child {
                        Self::Or(_) => write!(f, "({child})")?,
                        _ => write!(f, "{child}")?,
                    }
                }
                Ok(())
            }
            Self::Or(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" or ")?;
                    }
                    write!(f, "{child}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for MarkerTree {
    type Err = PydepsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Str(String),
    Ident(String),
    Op(Operator),
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let err = |reason: String| PydepsError::ParseError("marker", format!("'{text}': {reason}"));
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| err("unterminated string".to_string()))?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '<' | '>' | '=' | '!' | '~' => {
                let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
                let op = [
                    Operator::Arbitrary,
                    Operator::Equal,
                    Operator::NotEqual,
                    Operator::LessEqual,
                    Operator::GreaterEqual,
                    Operator::Compatible,
                    Operator::Less,
                    Operator::Greater,
                ]
                .into_iter()
                .find(|op| rest.starts_with(op.as_str()))
                .ok_or_else(|| err(format!("invalid operator at '{rest}'")))?;
                tokens.push(Token::Op(op));
                i += op.as_str().len();
            }
            c if c.is_ascii_alphanumeric() || c == '_' || c == '.' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(err(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    text: &'a str,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> PydepsError {
        PydepsError::ParseError("marker", format!("'{}': {reason}", self.text))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word == keyword)
    }

    fn parse_or(&mut self) -> Result<MarkerTree> {
        let mut children = vec![self.parse_and()?];
        while self.peek_keyword("or") {
            self.pos += 1;
            children.push(self.parse_and()?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            MarkerTree::Or(children)
        })
    }

    fn parse_and(&mut self) -> Result<MarkerTree> {
        let mut children = vec![self.parse_atom()?];
        while self.peek_keyword("and") {
            self.pos += 1;
            children.push(self.parse_atom()?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            MarkerTree::And(children)
        })
    }

    fn parse_atom(&mut self) -> Result<MarkerTree> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            if self.next() != Some(Token::RParen) {
                return Err(self.error("expected ')'"));
            }
            return Ok(inner);
        }
        let lhs = self.parse_value()?;
        let op = self.parse_op()?;
        let rhs = self.parse_value()?;
        if matches!(
            (&lhs, &rhs),
            (MarkerValue::Literal(_), MarkerValue::Literal(_))
        ) {
            return Err(self.error("comparison needs at least one marker variable"));
        }
        Ok(MarkerTree::Expression { lhs, op, rhs })
    }

    fn parse_value(&mut self) -> Result<MarkerValue> {
        match self.next() {
            Some(Token::Str(s)) => Ok(MarkerValue::Literal(s)),
            Some(Token::Ident(name)) if !matches!(name.as_str(), "and" | "or" | "in" | "not") => {
                Ok(MarkerValue::Variable(normalize_variable(&name).to_string()))
            }
            _ => Err(self.error("expected a marker variable or quoted string")),
        }
    }

    fn parse_op(&mut self) -> Result<MarkerOp> {
        match self.next() {
            Some(Token::Op(op)) => Ok(MarkerOp::Compare(op)),
            Some(Token::Ident(word)) if word == "in" => Ok(MarkerOp::In),
            Some(Token::Ident(word)) if word == "not" => match self.next() {
                Some(Token::Ident(word)) if word == "in" => Ok(MarkerOp::NotIn),
                _ => Err(self.error("expected 'in' after 'not'")),
            },
            _ => Err(self.error("expected a marker operator")),
        }
    }
}

fn normalize_variable(name: &str) -> &str {
    match name {
        "os.name" => "os_name",
        "sys.platform" => "sys_platform",
        "platform.version" => "platform_version",
        "platform.machine" => "platform_machine",
        "platform.python_implementation" | "python_implementation" => {
            "platform_python_implementation"
        }
        other => other,
    }
}
