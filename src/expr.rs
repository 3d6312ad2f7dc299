// src/expr.rs
// Initial conditions arrive as text such as "pi/2, pi/2, 0, 0". Each comma-separated item is
// a small arithmetic expression over decimal numbers, the constants `pi` and `e`, the four
// basic operators, unary signs and parentheses. Anything else is rejected rather than
// skipped, so a typo never silently shortens the state vector.

use crate::error::SimError;
use serde::Deserialize;
use std::f64::consts::{E, PI};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Open,
    Close,
}

fn malformed(item: &str, what: impl std::fmt::Display) -> SimError {
    SimError::MalformedInput(format!("cannot read {item:?}: {what}"))
}

fn tokenize(item: &str) -> Result<Vec<Token>, SimError> {
    let chars: Vec<char> = item.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let operator = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '(' => Some(Token::Open),
            ')' => Some(Token::Close),
            _ => None,
        };
        if let Some(token) = operator {
            tokens.push(token);
            i += 1;
            continue;
        }
        match c {
            ' ' | '\t' => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent only when followed by a digit, so "2e" stays an error and "e" a constant.
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| malformed(item, format!("bad number {text:?}")))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_alphanumeric() {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let value = match word.to_ascii_lowercase().as_str() {
                    "pi" | "π" => PI,
                    "e" => E,
                    _ => return Err(malformed(item, format!("unknown name {word:?}"))),
                };
                tokens.push(Token::Num(value));
            }
            other => return Err(malformed(item, format!("unexpected character {other:?}"))),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    item: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn expression(&mut self) -> Result<f64, SimError> {
        let mut value = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == Token::Plus { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, SimError> {
        let mut value = self.factor()?;
        while let Some(op @ (Token::Star | Token::Slash)) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            value = if op == Token::Star { value * rhs } else { value / rhs };
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, SimError> {
        match self.next() {
            Some(Token::Num(v)) => Ok(v),
            Some(Token::Minus) => Ok(-self.factor()?),
            Some(Token::Plus) => self.factor(),
            Some(Token::Open) => {
                let value = self.expression()?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    _ => Err(malformed(self.item, "missing ')'")),
                }
            }
            Some(other) => Err(malformed(self.item, format!("unexpected {other:?}"))),
            None => Err(malformed(self.item, "expression ends early")),
        }
    }
}

/// Evaluates one expression such as `-pi/4` or `2*(1.5e-1 + e)`.
pub fn parse_expression(item: &str) -> Result<f64, SimError> {
    let mut parser = Parser {
        item,
        tokens: tokenize(item)?,
        pos: 0,
    };
    let value = parser.expression()?;
    if parser.pos < parser.tokens.len() {
        return Err(malformed(item, "trailing input"));
    }
    if !value.is_finite() {
        return Err(malformed(item, "value is not finite"));
    }
    Ok(value)
}

/// Initial conditions as supplied by a request or scenario file: either a list of numbers
/// or one comma-separated expression string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InitialConditions {
    Values(Vec<f64>),
    Text(String),
}

impl InitialConditions {
    pub fn resolve(&self) -> Result<Vec<f64>, SimError> {
        match self {
            InitialConditions::Values(values) => Ok(values.clone()),
            InitialConditions::Text(text) => parse_initial_conditions(text),
        }
    }
}

/// Parses a comma-separated list of expressions.
pub fn parse_initial_conditions(text: &str) -> Result<Vec<f64>, SimError> {
    if text.trim().is_empty() {
        return Err(SimError::MalformedInput("no initial conditions given".into()));
    }
    text.split(',').map(|item| parse_expression(item.trim())).collect()
}
