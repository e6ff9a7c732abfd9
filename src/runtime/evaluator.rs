//! A small expression evaluator for rendering chunk trees without a host
//! language backend
//!
//! Supports literals (`null`, `true`, `false`, integers, quoted strings),
//! variables, `+`, `-`, comparisons, `!`, `&&`, `||`, parentheses and calls
//! to registered functions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use logos::Logos;

use super::value::Value;
use crate::error::RenderError;

/// Looks up variables visible to an expression
pub trait Variables {
    fn variable(&self, name: &str) -> Option<Value>;
}

impl Variables for HashMap<String, Value> {
    fn variable(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Evaluates the opaque code carried by chunks
pub trait Evaluator {
    fn evaluate(&self, code: &str, variables: &dyn Variables) -> Result<Value, RenderError>;

    /// Evaluate a comma separated list of expressions
    fn evaluate_list(&self, code: &str, variables: &dyn Variables) -> Result<Vec<Value>, RenderError> {
        split_arguments(code)
            .into_iter()
            .map(|part| self.evaluate(part, variables))
            .collect()
    }
}

/// Split `code` on commas outside of parentheses and quotes
pub fn split_arguments(code: &str) -> Vec<&str> {
    split_top_level(code, ',')
}

/// Split `code` on `separator` outside of brackets and quotes
pub(crate) fn split_top_level(code: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (index, c) in code.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(code[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    let last = code[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

fn unquote(lex: &mut logos::Lexer<'_, Token>) -> String {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1];
    let mut text = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some('r') => text.push('\r'),
                Some(other) => text.push(other),
                None => {}
            }
        } else {
            text.push(c);
        }
    }
    text
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum Token {
    #[token("null")]
    Null,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[regex("[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),
    #[regex(r#""([^"\\]|\\.)*""#, unquote)]
    #[regex(r"'([^'\\]|\\.)*'", unquote)]
    Str(String),
    /// Dotted names are looked up as a whole
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*", |lex| lex.slice().to_string())]
    Ident(String),
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("!")]
    Not,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Null => f.write_str("null"),
            Token::True => f.write_str("true"),
            Token::False => f.write_str("false"),
            Token::Int(i) => write!(f, "{}", i),
            Token::Str(s) => write!(f, "{:?}", s),
            Token::Ident(name) => f.write_str(name),
            Token::Eq => f.write_str("=="),
            Token::Ne => f.write_str("!="),
            Token::Le => f.write_str("<="),
            Token::Ge => f.write_str(">="),
            Token::Lt => f.write_str("<"),
            Token::Gt => f.write_str(">"),
            Token::And => f.write_str("&&"),
            Token::Or => f.write_str("||"),
            Token::Not => f.write_str("!"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Variable(String),
    Not(Box<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Call(String, Vec<Expr>),
}

fn expression_parser<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let literal = select! {
            Token::Null => Expr::Literal(Value::Null),
            Token::True => Expr::Literal(Value::Bool(true)),
            Token::False => Expr::Literal(Value::Bool(false)),
            Token::Int(i) => Expr::Literal(Value::Int(i)),
            Token::Str(s) => Expr::Literal(Value::Str(s)),
        };
        let ident = select! { Token::Ident(name) => name };

        let call = ident
            .clone()
            .then(
                expr.clone()
                    .separated_by(just(Token::Comma))
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .map(|(name, args)| Expr::Call(name, args));

        let atom = choice((
            literal,
            call,
            ident.map(Expr::Variable),
            expr.delimited_by(just(Token::LParen), just(Token::RParen)),
        ));

        let unary = just(Token::Not)
            .repeated()
            .collect::<Vec<_>>()
            .then(atom)
            .map(|(nots, operand)| {
                nots.iter()
                    .fold(operand, |operand, _| Expr::Not(Box::new(operand)))
            });

        let additive = unary.clone().foldl(
            choice((just(Token::Plus).to(BinaryOp::Add), just(Token::Minus).to(BinaryOp::Sub)))
                .then(unary)
                .repeated(),
            |lhs, (op, rhs)| Expr::Binary(Box::new(lhs), op, Box::new(rhs)),
        );

        let comparison = additive.clone().foldl(
            choice((
                just(Token::Eq).to(BinaryOp::Eq),
                just(Token::Ne).to(BinaryOp::Ne),
                just(Token::Le).to(BinaryOp::Le),
                just(Token::Ge).to(BinaryOp::Ge),
                just(Token::Lt).to(BinaryOp::Lt),
                just(Token::Gt).to(BinaryOp::Gt),
            ))
            .then(additive)
            .repeated(),
            |lhs, (op, rhs)| Expr::Binary(Box::new(lhs), op, Box::new(rhs)),
        );

        let and = comparison.clone().foldl(
            just(Token::And).to(BinaryOp::And).then(comparison).repeated(),
            |lhs, (op, rhs)| Expr::Binary(Box::new(lhs), op, Box::new(rhs)),
        );

        and.clone().foldl(
            just(Token::Or).to(BinaryOp::Or).then(and).repeated(),
            |lhs, (op, rhs)| Expr::Binary(Box::new(lhs), op, Box::new(rhs)),
        )
    })
}

/// A registered function callable from expressions
pub type Function = Arc<dyn Fn(&[Value]) -> Result<Value, RenderError> + Send + Sync>;

/// Reference evaluator over a small expression language
#[derive(Clone, Default)]
pub struct BasicEvaluator {
    functions: HashMap<String, Function>,
}

impl BasicEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(
        mut self,
        name: impl Into<String>,
        function: impl Fn(&[Value]) -> Result<Value, RenderError> + Send + Sync + 'static,
    ) -> Self {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    fn parse(&self, code: &str) -> Result<Expr, RenderError> {
        let error = |message: String| RenderError::Expression {
            code: code.to_string(),
            message,
        };

        let mut tokens = Vec::new();
        for (token, span) in Token::lexer(code).spanned() {
            match token {
                Ok(token) => tokens.push((token, SimpleSpan::from(span))),
                Err(()) => {
                    return Err(error(format!(
                        "unexpected '{}' at {}",
                        code.get(span.clone()).unwrap_or(""),
                        span.start
                    )))
                }
            }
        }

        let len = code.len();
        let token_stream = Stream::from_iter(tokens).map((len..len).into(), |(t, s): (_, _)| (t, s));
        expression_parser()
            .then_ignore(end())
            .parse(token_stream)
            .into_result()
            .map_err(|errs| {
                error(
                    errs.into_iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("; "),
                )
            })
    }

    fn eval(&self, expr: &Expr, variables: &dyn Variables) -> Result<Value, RenderError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Variable(name) => variables
                .variable(name)
                .ok_or_else(|| RenderError::UnknownVariable { name: name.clone() }),
            Expr::Not(operand) => Ok(Value::Bool(!self.eval(operand, variables)?.is_truthy())),
            Expr::Call(name, args) => {
                let function = self
                    .functions
                    .get(name)
                    .ok_or_else(|| RenderError::UnknownFunction { name: name.clone() })?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, variables))
                    .collect::<Result<Vec<_>, _>>()?;
                function(&args)
            }
            Expr::Binary(lhs, BinaryOp::And, rhs) => {
                let lhs = self.eval(lhs, variables)?;
                if !lhs.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(rhs, variables)?.is_truthy()))
            }
            Expr::Binary(lhs, BinaryOp::Or, rhs) => {
                let lhs = self.eval(lhs, variables)?;
                if lhs.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(rhs, variables)?.is_truthy()))
            }
            Expr::Binary(lhs, op, rhs) => {
                let lhs = self.eval(lhs, variables)?;
                let rhs = self.eval(rhs, variables)?;
                binary(*op, lhs, rhs)
            }
        }
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, RenderError> {
    let mismatch = |lhs: &Value, rhs: &Value| RenderError::Custom(format!(
        "cannot apply {:?} to {} and {}",
        op,
        lhs.type_name(),
        rhs.type_name()
    ));
    match (op, &lhs, &rhs) {
        (BinaryOp::Add, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
        (BinaryOp::Add, Value::Str(_), _) | (BinaryOp::Add, _, Value::Str(_)) => {
            Ok(Value::Str(format!("{}{}", lhs, rhs)))
        }
        (BinaryOp::Sub, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(*b))),
        (BinaryOp::Eq, _, _) => Ok(Value::Bool(lhs == rhs)),
        (BinaryOp::Ne, _, _) => Ok(Value::Bool(lhs != rhs)),
        (BinaryOp::Lt, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a < b)),
        (BinaryOp::Le, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a <= b)),
        (BinaryOp::Gt, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a > b)),
        (BinaryOp::Ge, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a >= b)),
        _ => Err(mismatch(&lhs, &rhs)),
    }
}

impl Evaluator for BasicEvaluator {
    fn evaluate(&self, code: &str, variables: &dyn Variables) -> Result<Value, RenderError> {
        let expr = self.parse(code)?;
        self.eval(&expr, variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn eval(code: &str) -> Result<Value, RenderError> {
        let variables = vars(&[("x", Value::Int(2)), ("name", Value::from("bob")), ("user.Ok", Value::Bool(true))]);
        BasicEvaluator::new()
            .with_function("twice", |args| match args {
                [Value::Int(i)] => Ok(Value::Int(i * 2)),
                _ => Err(RenderError::Custom("twice takes an int".into())),
            })
            .evaluate(code, &variables)
    }

    #[test]
    fn test_literals_and_variables() {
        assert_eq!(eval("null"), Ok(Value::Null));
        assert_eq!(eval("'it\\'s'"), Ok(Value::from("it's")));
        assert_eq!(eval("x"), Ok(Value::Int(2)));
        assert_eq!(eval("user.Ok"), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_operators() {
        assert_eq!(eval("x + 3 - 1"), Ok(Value::Int(4)));
        assert_eq!(eval("\"hi \" + name"), Ok(Value::from("hi bob")));
        assert_eq!(eval("x == 2 && !(name != 'bob')"), Ok(Value::Bool(true)));
        assert_eq!(eval("x > 5 || x <= 2"), Ok(Value::Bool(true)));
        assert_eq!(eval("!!x"), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_short_circuit_skips_unknown() {
        assert_eq!(eval("false && missing"), Ok(Value::Bool(false)));
        assert_eq!(eval("true || missing"), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval("twice(x + 1)"), Ok(Value::Int(6)));
        assert_eq!(
            eval("nope(1)"),
            Err(RenderError::UnknownFunction { name: "nope".into() })
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(eval("missing"), Err(RenderError::UnknownVariable { name: "missing".into() }));
        assert!(matches!(eval("x +"), Err(RenderError::Expression { .. })));
        assert!(matches!(eval("x # 1"), Err(RenderError::Expression { .. })));
        assert!(matches!(eval("x - 'a'"), Err(RenderError::Custom(_))));
    }

    #[test]
    fn test_split_arguments() {
        assert_eq!(split_arguments("a, f(b, c), 'x,y'"), vec!["a", "f(b, c)", "'x,y'"]);
        assert!(split_arguments("  ").is_empty());
    }

    #[test]
    fn test_evaluate_list() {
        let variables = vars(&[("x", Value::Int(1))]);
        let values = BasicEvaluator::new()
            .evaluate_list("x, 'b'", &variables)
            .expect("should evaluate");
        assert_eq!(values, vec![Value::Int(1), Value::from("b")]);
    }
}
