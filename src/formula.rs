//! Weight expressions for formula-type allocation rules.
//!
//! Grammar:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := number | ident | '(' expr ')' | '-' factor
//! ```
//!
//! Identifiers are resolved against a caller-supplied set of variables at
//! evaluation time, so an expression is parsed once and evaluated per target.
//!
//! Expressions are capped at [`MAX_TOKENS`] tokens and [`MAX_DEPTH`] levels of
//! parentheses or unary minus, which bounds the recursion of both the parser
//! and the evaluator.

use std::collections::HashMap;

use thiserror::Error;

pub const MAX_DEPTH: usize = 64;
pub const MAX_TOKENS: usize = 256;

#[derive(Debug, Error, PartialEq)]
pub enum FormulaError {
    #[error("unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token at offset {0}")]
    UnexpectedToken(usize),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NotFinite,
    #[error("expression nests deeper than {MAX_DEPTH} levels")]
    TooDeep,
    #[error("expression has more than {MAX_TOKENS} tokens")]
    TooLong,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Var(String),
    Neg(Box<Expr>),
    Binary(Box<Expr>, Op, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    root: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let root = parser.expr()?;
        if let Some((_, offset)) = parser.tokens.get(parser.pos) {
            return Err(FormulaError::UnexpectedToken(*offset));
        }
        Ok(Self { root })
    }

    pub fn eval(&self, vars: &HashMap<&str, f64>) -> Result<f64, FormulaError> {
        let value = eval(&self.root, vars)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(FormulaError::NotFinite)
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            c if c.is_ascii_digit() || c == '.' => {
                let mut text = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if !(c.is_ascii_digit() || c == '.') {
                        break;
                    }
                    text.push(c);
                    chars.next();
                }
                let value = text
                    .parse()
                    .map_err(|_| FormulaError::InvalidNumber(text.clone()))?;
                tokens.push((Token::Number(value), offset));
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut text = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if !(c.is_alphanumeric() || c == '_') {
                        break;
                    }
                    text.push(c);
                    chars.next();
                }
                tokens.push((Token::Ident(text), offset));
                continue;
            }
            other => return Err(FormulaError::UnexpectedChar(other, offset)),
        };
        chars.next();
        tokens.push((token, offset));
    }

    if tokens.len() > MAX_TOKENS {
        return Err(FormulaError::TooLong);
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    /// Open parentheses and unary minus currently being parsed
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Result<(Token, usize), FormulaError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(FormulaError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn descend(&mut self) -> Result<(), FormulaError> {
        if self.depth == MAX_DEPTH {
            return Err(FormulaError::TooDeep);
        }
        self.depth += 1;
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(Op::Add),
            Some(Token::Minus) => Some(Op::Sub),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.factor()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(Op::Mul),
            Some(Token::Slash) => Some(Op::Div),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, FormulaError> {
        match self.next()? {
            (Token::Number(n), _) => Ok(Expr::Number(n)),
            (Token::Ident(name), _) => Ok(Expr::Var(name)),
            (Token::Minus, _) => {
                self.descend()?;
                let inner = self.factor()?;
                self.depth -= 1;
                Ok(Expr::Neg(Box::new(inner)))
            }
            (Token::LParen, _) => {
                self.descend()?;
                let inner = self.expr()?;
                self.depth -= 1;
                match self.next()? {
                    (Token::RParen, _) => Ok(inner),
                    (_, offset) => Err(FormulaError::UnexpectedToken(offset)),
                }
            }
            (_, offset) => Err(FormulaError::UnexpectedToken(offset)),
        }
    }
}

fn eval(expr: &Expr, vars: &HashMap<&str, f64>) -> Result<f64, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Var(name) => vars
            .get(name.as_str())
            .copied()
            .ok_or_else(|| FormulaError::UnknownVariable(name.clone())),
        Expr::Neg(inner) => Ok(-eval(inner, vars)?),
        Expr::Binary(lhs, op, rhs) => {
            let lhs = eval(lhs, vars)?;
            let rhs = eval(rhs, vars)?;
            match op {
                Op::Add => Ok(lhs + rhs),
                Op::Sub => Ok(lhs - rhs),
                Op::Mul => Ok(lhs * rhs),
                Op::Div if rhs == 0.0 => Err(FormulaError::DivisionByZero),
                Op::Div => Ok(lhs / rhs),
            }
        }
    }
}
