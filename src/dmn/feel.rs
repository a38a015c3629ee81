//! # FEEL subset
//!
//! Simple expressions and unary tests as they appear in decision table
//! cells. Expressions are parsed once when a decision is loaded and
//! evaluated against a [`Scope`] per evaluation.

use crate::errors::ServiceError;
use crate::types::Variables;
use regex::Regex;
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Name the input value is bound to while its entries are tested
pub const DEFAULT_INPUT_VARIABLE: &str = "cellInput";

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Dotted name, resolved against the longest matching variable prefix
    Path(Vec<String>),
    /// `?`, the value under test inside a unary test
    InputValue,
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    List(Vec<Expr>),
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Not,
    Contains,
    Matches,
    String,
    Number,
    Count,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "not" => Some(Function::Not),
            "contains" => Some(Function::Contains),
            "matches" => Some(Function::Matches),
            "string" => Some(Function::String),
            "number" => Some(Function::Number),
            "count" => Some(Function::Count),
            _ => None,
        }
    }

    fn arity(self) -> usize {
        match self {
            Function::Contains | Function::Matches => 2,
            _ => 1,
        }
    }
}

/// Variables visible to an expression, plus the input value under test.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    variables: &'a Variables,
    input: Option<(&'a str, &'a Value)>,
}

impl<'a> Scope<'a> {
    pub fn new(variables: &'a Variables) -> Self {
        Self {
            variables,
            input: None,
        }
    }

    pub fn with_input(variables: &'a Variables, name: &'a str, value: &'a Value) -> Self {
        Self {
            variables,
            input: Some((name, value)),
        }
    }

    fn lookup(&self, name: &str) -> Option<&'a Value> {
        match self.input {
            Some((input_name, value)) if input_name == name => Some(value),
            _ => self.variables.get(name),
        }
    }

    fn resolve_path(&self, segments: &[String]) -> Value {
        for split in (1..=segments.len()).rev() {
            let name = segments[..split].join(".");
            if let Some(root) = self.lookup(&name) {
                return navigate(root, &segments[split..]);
            }
        }
        tracing::trace!(name = %segments.join("."), "unresolved name evaluates to null");
        Value::Null
    }
}

fn navigate(root: &Value, segments: &[String]) -> Value {
    let mut current = root;
    for segment in segments {
        match current.get(segment.as_str()) {
            Some(next) if current.is_object() => current = next,
            _ => return Value::Null,
        }
    }
    current.clone()
}

/// A compiled FEEL expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct FeelExpression {
    pub source: String,
    expr: Expr,
}

impl FeelExpression {
    pub fn parse(source: &str) -> Result<Self, ServiceError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser::new(&tokens, source);
        let expr = parser.parse_expression()?;
        parser.expect_end()?;
        Ok(Self {
            source: source.trim().to_string(),
            expr,
        })
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn evaluate(&self, scope: &Scope<'_>) -> Result<Value, ServiceError> {
        self.expr.evaluate(scope)
    }
}

/// The content of one input entry cell.
#[derive(Debug, Clone, PartialEq)]
pub enum UnaryTests {
    /// `-` or an empty cell
    Any,
    Tests(Vec<UnaryTest>),
    Negated(Vec<UnaryTest>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnaryTest {
    Compare(BinaryOp, Expr),
    Interval { start: Endpoint, end: Endpoint },
    /// A plain expression: equality, list membership, or a boolean when it mentions `?`
    Expression(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub value: Expr,
    pub inclusive: bool,
}

impl UnaryTests {
    pub fn parse(source: &str) -> Result<Self, ServiceError> {
        let trimmed = source.trim();
        if trimmed.is_empty() || trimmed == "-" {
            return Ok(UnaryTests::Any);
        }
        let tokens = tokenize(trimmed)?;
        let mut parser = Parser::new(&tokens, trimmed);
        if parser.wraps_in_not() {
            parser.advance(2);
            let tests = parser.parse_positive_tests()?;
            parser.expect(&Token::RParen)?;
            parser.expect_end()?;
            return Ok(UnaryTests::Negated(tests));
        }
        let tests = parser.parse_positive_tests()?;
        parser.expect_end()?;
        Ok(UnaryTests::Tests(tests))
    }

    /// Test the scope's input value; a scope without input only matches `-`.
    pub fn matches(&self, scope: &Scope<'_>) -> Result<bool, ServiceError> {
        let input = scope.input.map(|(_, value)| value).unwrap_or(&Value::Null);
        match self {
            UnaryTests::Any => Ok(true),
            UnaryTests::Tests(tests) => any_test_matches(tests, input, scope),
            UnaryTests::Negated(tests) => Ok(!any_test_matches(tests, input, scope)?),
        }
    }
}

fn any_test_matches(
    tests: &[UnaryTest],
    input: &Value,
    scope: &Scope<'_>,
) -> Result<bool, ServiceError> {
    for test in tests {
        if test.matches(input, scope)? {
            return Ok(true);
        }
    }
    Ok(false)
}

impl UnaryTest {
    fn matches(&self, input: &Value, scope: &Scope<'_>) -> Result<bool, ServiceError> {
        match self {
            UnaryTest::Compare(op, expr) => {
                let endpoint = expr.evaluate(scope)?;
                Ok(compare_with(*op, input, &endpoint) == Value::Bool(true))
            }
            UnaryTest::Interval { start, end } => {
                let low = start.value.evaluate(scope)?;
                let high = end.value.evaluate(scope)?;
                let above = match compare_values(input, &low) {
                    Some(Ordering::Greater) => true,
                    Some(Ordering::Equal) => start.inclusive,
                    _ => false,
                };
                let below = match compare_values(input, &high) {
                    Some(Ordering::Less) => true,
                    Some(Ordering::Equal) => end.inclusive,
                    _ => false,
                };
                Ok(above && below)
            }
            UnaryTest::Expression(expr) => {
                let value = expr.evaluate(scope)?;
                if expr.mentions_input() {
                    return Ok(value == Value::Bool(true));
                }
                if let Value::Bool(result) = value {
                    if !input.is_boolean() {
                        return Ok(result);
                    }
                }
                if values_equal(input, &value) {
                    return Ok(true);
                }
                match value {
                    Value::Array(items) => Ok(items.iter().any(|item| values_equal(input, item))),
                    _ => Ok(false),
                }
            }
        }
    }
}

impl Expr {
    pub fn evaluate(&self, scope: &Scope<'_>) -> Result<Value, ServiceError> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Path(segments) => Ok(scope.resolve_path(segments)),
            Expr::InputValue => Ok(scope
                .input
                .map(|(_, value)| value.clone())
                .unwrap_or(Value::Null)),
            Expr::Negate(inner) => {
                let value = inner.evaluate(scope)?;
                Ok(value
                    .as_f64()
                    .map(|n| number_value(-n))
                    .unwrap_or(Value::Null))
            }
            Expr::Binary { op, left, right } => {
                let left = left.evaluate(scope)?;
                let right = right.evaluate(scope)?;
                Ok(apply_binary(*op, &left, &right))
            }
            Expr::And(left, right) => {
                let left = left.evaluate(scope)?;
                let right = right.evaluate(scope)?;
                Ok(match (left.as_bool(), right.as_bool()) {
                    (Some(false), _) | (_, Some(false)) => Value::Bool(false),
                    (Some(true), Some(true)) => Value::Bool(true),
                    _ => Value::Null,
                })
            }
            Expr::Or(left, right) => {
                let left = left.evaluate(scope)?;
                let right = right.evaluate(scope)?;
                Ok(match (left.as_bool(), right.as_bool()) {
                    (Some(true), _) | (_, Some(true)) => Value::Bool(true),
                    (Some(false), Some(false)) => Value::Bool(false),
                    _ => Value::Null,
                })
            }
            Expr::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if condition.evaluate(scope)? == Value::Bool(true) {
                    then_branch.evaluate(scope)
                } else {
                    else_branch.evaluate(scope)
                }
            }
            Expr::List(items) => items
                .iter()
                .map(|item| item.evaluate(scope))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Call { function, args } => {
                let args = args
                    .iter()
                    .map(|arg| arg.evaluate(scope))
                    .collect::<Result<Vec<_>, _>>()?;
                call_function(*function, &args)
            }
        }
    }

    fn mentions_input(&self) -> bool {
        match self {
            Expr::InputValue => true,
            Expr::Literal(_) | Expr::Path(_) => false,
            Expr::Negate(inner) => inner.mentions_input(),
            Expr::Binary { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                left.mentions_input() || right.mentions_input()
            }
            Expr::If {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.mentions_input()
                    || then_branch.mentions_input()
                    || else_branch.mentions_input()
            }
            Expr::List(items) | Expr::Call { args: items, .. } => {
                items.iter().any(Expr::mentions_input)
            }
        }
    }
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => match (left, right) {
            (Value::String(a), Value::String(b)) => Value::String(format!("{a}{b}")),
            _ => arithmetic(left, right, |a, b| Some(a + b)),
        },
        BinaryOp::Sub => arithmetic(left, right, |a, b| Some(a - b)),
        BinaryOp::Mul => arithmetic(left, right, |a, b| Some(a * b)),
        BinaryOp::Div => arithmetic(left, right, |a, b| (b != 0.0).then(|| a / b)),
        _ => compare_with(op, left, right),
    }
}

fn arithmetic(left: &Value, right: &Value, f: impl Fn(f64, f64) -> Option<f64>) -> Value {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => f(a, b).map(number_value).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn compare_with(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Eq => Value::Bool(values_equal(left, right)),
        BinaryOp::Ne => Value::Bool(!values_equal(left, right)),
        _ => match compare_values(left, right) {
            Some(ordering) => Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::Ge => ordering != Ordering::Less,
                _ => false,
            }),
            None => Value::Null,
        },
    }
}

/// Ordering for numbers and strings only; anything else is incomparable.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Structural equality where `1` and `1.0` are the same number.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => left == right,
    }
}

/// Integral values become JSON integers so `"1"` style outputs stay tidy.
pub fn number_value(n: f64) -> Value {
    match exact_i64(n) {
        Some(i) => Value::from(i),
        None => Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
    }
}

/// `n` as an `i64` when it is integral and inside the `i64` range.
pub fn exact_i64(n: f64) -> Option<i64> {
    (n.fract() == 0.0 && n.abs() < i64::MAX as f64).then(|| n as i64)
}

fn call_function(function: Function, args: &[Value]) -> Result<Value, ServiceError> {
    let value = match (function, args) {
        (Function::Not, [Value::Bool(b)]) => Value::Bool(!b),
        (Function::Contains, [Value::String(s), Value::String(sub)]) => {
            Value::Bool(s.contains(sub.as_str()))
        }
        (Function::Matches, [Value::String(s), Value::String(pattern)]) => {
            Value::Bool(Regex::new(pattern)?.is_match(s))
        }
        (Function::String, [Value::Null]) => Value::Null,
        (Function::String, [Value::String(s)]) => Value::String(s.clone()),
        (Function::String, [other]) => Value::String(other.to_string()),
        (Function::Number, [Value::String(s)]) => s
            .trim()
            .parse::<f64>()
            .map(number_value)
            .unwrap_or(Value::Null),
        (Function::Number, [n @ Value::Number(_)]) => n.clone(),
        (Function::Count, [Value::Array(items)]) => Value::from(items.len()),
        _ => Value::Null,
    };
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Num(f64),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    DotDot,
    Question,
    Plus,
    Minus,
    Star,
    Slash,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn tokenize(source: &str) -> Result<Vec<Token>, ServiceError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut cursor = 0;

    while cursor < bytes.len() {
        let byte = bytes[cursor];
        if byte.is_ascii_whitespace() {
            cursor += 1;
            continue;
        }
        let peek = bytes.get(cursor + 1).copied();
        let (token, width) = match byte {
            b'(' => (Token::LParen, 1),
            b')' => (Token::RParen, 1),
            b'[' => (Token::LBracket, 1),
            b']' => (Token::RBracket, 1),
            b',' => (Token::Comma, 1),
            b'?' => (Token::Question, 1),
            b'+' => (Token::Plus, 1),
            b'-' => (Token::Minus, 1),
            b'*' => (Token::Star, 1),
            b'/' => (Token::Slash, 1),
            b'=' => (Token::Eq, 1),
            b'.' if peek == Some(b'.') => (Token::DotDot, 2),
            b'.' => (Token::Dot, 1),
            b'!' if peek == Some(b'=') => (Token::Ne, 2),
            b'<' if peek == Some(b'=') => (Token::Le, 2),
            b'<' => (Token::Lt, 1),
            b'>' if peek == Some(b'=') => (Token::Ge, 2),
            b'>' => (Token::Gt, 1),
            b'"' => {
                let (value, width) = lex_string(&source[cursor..])?;
                (Token::Str(value), width)
            }
            b'0'..=b'9' => {
                let mut end = cursor;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if bytes.get(end) == Some(&b'.')
                    && bytes.get(end + 1).is_some_and(u8::is_ascii_digit)
                {
                    end += 1;
                    while end < bytes.len() && bytes[end].is_ascii_digit() {
                        end += 1;
                    }
                }
                let text = &source[cursor..end];
                let number = text.parse::<f64>().map_err(|_| {
                    ServiceError::ParserError(format!("Invalid number '{text}' in '{source}'"))
                })?;
                (Token::Num(number), end - cursor)
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let mut end = cursor;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                (Token::Ident(source[cursor..end].to_string()), end - cursor)
            }
            _ => {
                let ch = source[cursor..].chars().next().unwrap_or('?');
                return Err(ServiceError::ParserError(format!(
                    "Unexpected character '{ch}' in '{source}'"
                )));
            }
        };
        tokens.push(token);
        cursor += width;
    }

    Ok(tokens)
}

/// Lex a double-quoted string starting at the opening quote.
fn lex_string(input: &str) -> Result<(String, usize), ServiceError> {
    let mut parsed = String::new();
    let mut chars = input.char_indices().skip(1);
    while let Some((index, current)) = chars.next() {
        match current {
            '"' => return Ok((parsed, index + 1)),
            '\\' => {
                let translated = match chars.next().map(|(_, c)| c) {
                    Some('\\') => '\\',
                    Some('"') => '"',
                    Some('n') => '\n',
                    Some('r') => '\r',
                    Some('t') => '\t',
                    other => {
                        return Err(ServiceError::ParserError(format!(
                            "Invalid escape sequence '\\{}' in string literal",
                            other.map(String::from).unwrap_or_default()
                        )));
                    }
                };
                parsed.push(translated);
            }
            _ => parsed.push(current),
        }
    }
    Err(ServiceError::ParserError(format!(
        "Unterminated string literal: {input}"
    )))
}

/// Bound on expression tree depth, counting both nesting and operator chains
const MAX_NESTING_DEPTH: usize = 128;

struct Parser<'t> {
    tokens: &'t [Token],
    cursor: usize,
    source: &'t str,
    depth: usize,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token], source: &'t str) -> Self {
        Self {
            tokens,
            cursor: 0,
            source,
            depth: 0,
        }
    }

    fn descend(&mut self) -> Result<(), ServiceError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    /// Run `parse` one level deeper, restoring the depth afterwards
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let depth = self.depth;
        self.descend()?;
        let result = parse(self);
        self.depth = depth;
        result
    }

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.cursor)
    }

    fn peek_at(&self, offset: usize) -> Option<&'t Token> {
        self.tokens.get(self.cursor + offset)
    }

    fn advance(&mut self, count: usize) {
        self.cursor += count;
    }

    fn next(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.cursor);
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(name)) if name == keyword) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ServiceError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {expected:?}")))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ServiceError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{keyword}'")))
        }
    }

    fn expect_end(&self) -> Result<(), ServiceError> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.error("unexpected trailing input")),
        }
    }

    fn error(&self, message: &str) -> ServiceError {
        let found = match self.peek() {
            Some(token) => format!("{token:?}"),
            None => "end of input".to_string(),
        };
        ServiceError::ParserError(format!(
            "Invalid FEEL '{}': {message}, found {found}",
            self.source
        ))
    }

    /// `not( ... )` spanning the whole cell
    fn wraps_in_not(&self) -> bool {
        if !matches!(self.peek(), Some(Token::Ident(name)) if name == "not")
            || self.peek_at(1) != Some(&Token::LParen)
        {
            return false;
        }
        let mut depth = 0usize;
        for (index, token) in self.tokens.iter().enumerate().skip(self.cursor + 1) {
            match token {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return index == self.tokens.len() - 1;
                    }
                }
                _ => {}
            }
        }
        false
    }

    fn parse_positive_tests(&mut self) -> Result<Vec<UnaryTest>, ServiceError> {
        let mut tests = vec![self.parse_positive_test()?];
        while self.eat(&Token::Comma) {
            tests.push(self.parse_positive_test()?);
        }
        Ok(tests)
    }

    fn parse_positive_test(&mut self) -> Result<UnaryTest, ServiceError> {
        let op = match self.peek() {
            Some(Token::Lt) => Some(BinaryOp::Lt),
            Some(Token::Le) => Some(BinaryOp::Le),
            Some(Token::Gt) => Some(BinaryOp::Gt),
            Some(Token::Ge) => Some(BinaryOp::Ge),
            Some(Token::Eq) => Some(BinaryOp::Eq),
            Some(Token::Ne) => Some(BinaryOp::Ne),
            _ => None,
        };
        if let Some(op) = op {
            self.advance(1);
            return Ok(UnaryTest::Compare(op, self.parse_additive()?));
        }

        if matches!(
            self.peek(),
            Some(Token::LBracket | Token::LParen | Token::RBracket)
        ) {
            let start = self.cursor;
            if let Some(interval) = self.try_parse_interval() {
                return Ok(interval);
            }
            self.cursor = start;
        }

        Ok(UnaryTest::Expression(self.parse_expression()?))
    }

    fn try_parse_interval(&mut self) -> Option<UnaryTest> {
        let start_inclusive = match self.next()? {
            Token::LBracket => true,
            Token::LParen | Token::RBracket => false,
            _ => return None,
        };
        let low = self.parse_additive().ok()?;
        if !self.eat(&Token::DotDot) {
            return None;
        }
        let high = self.parse_additive().ok()?;
        let end_inclusive = match self.next()? {
            Token::RBracket => true,
            Token::RParen | Token::LBracket => false,
            _ => return None,
        };
        Some(UnaryTest::Interval {
            start: Endpoint {
                value: low,
                inclusive: start_inclusive,
            },
            end: Endpoint {
                value: high,
                inclusive: end_inclusive,
            },
        })
    }

    fn parse_expression(&mut self) -> Result<Expr, ServiceError> {
        self.nested(|parser| {
            if parser.eat_keyword("if") {
                let condition = parser.parse_expression()?;
                parser.expect_keyword("then")?;
                let then_branch = parser.parse_expression()?;
                parser.expect_keyword("else")?;
                let else_branch = parser.parse_expression()?;
                return Ok(Expr::If {
                    condition: Box::new(condition),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                });
            }
            parser.parse_disjunction()
        })
    }

    fn parse_disjunction(&mut self) -> Result<Expr, ServiceError> {
        self.nested(|parser| {
            let mut left = parser.parse_conjunction()?;
            while parser.eat_keyword("or") {
                parser.descend()?;
                let right = parser.parse_conjunction()?;
                left = Expr::Or(Box::new(left), Box::new(right));
            }
            Ok(left)
        })
    }

    fn parse_conjunction(&mut self) -> Result<Expr, ServiceError> {
        self.nested(|parser| {
            let mut left = parser.parse_comparison()?;
            while parser.eat_keyword("and") {
                parser.descend()?;
                let right = parser.parse_comparison()?;
                left = Expr::And(Box::new(left), Box::new(right));
            }
            Ok(left)
        })
    }

    fn parse_comparison(&mut self) -> Result<Expr, ServiceError> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.advance(1);
        let right = self.parse_additive()?;
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, ServiceError> {
        self.nested(|parser| {
            let mut left = parser.parse_multiplicative()?;
            loop {
                let op = match parser.peek() {
                    Some(Token::Plus) => BinaryOp::Add,
                    Some(Token::Minus) => BinaryOp::Sub,
                    _ => return Ok(left),
                };
                parser.advance(1);
                parser.descend()?;
                let right = parser.parse_multiplicative()?;
                left = Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                };
            }
        })
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ServiceError> {
        self.nested(|parser| {
            let mut left = parser.parse_unary()?;
            loop {
                let op = match parser.peek() {
                    Some(Token::Star) => BinaryOp::Mul,
                    Some(Token::Slash) => BinaryOp::Div,
                    _ => return Ok(left),
                };
                parser.advance(1);
                parser.descend()?;
                let right = parser.parse_unary()?;
                left = Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                };
            }
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, ServiceError> {
        self.nested(|parser| {
            if parser.eat(&Token::Minus) {
                return match parser.parse_unary()? {
                    Expr::Literal(Value::Number(n)) => Ok(n
                        .as_f64()
                        .map(|n| Expr::Literal(number_value(-n)))
                        .unwrap_or(Expr::Literal(Value::Null))),
                    other => Ok(Expr::Negate(Box::new(other))),
                };
            }
            parser.parse_primary()
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ServiceError> {
        let Some(token) = self.next() else {
            return Err(self.error("expected an expression"));
        };
        match token {
            Token::Str(s) => Ok(Expr::Literal(Value::String(s.clone()))),
            Token::Num(n) => Ok(Expr::Literal(number_value(*n))),
            Token::Question => Ok(Expr::InputValue),
            Token::LParen => {
                let inner = self.parse_expression()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    items.push(self.parse_expression()?);
                    while self.eat(&Token::Comma) {
                        items.push(self.parse_expression()?);
                    }
                    self.expect(&Token::RBracket)?;
                }
                Ok(Expr::List(items))
            }
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ if self.peek() == Some(&Token::LParen) => self.parse_call(name),
                _ => self.parse_path(name),
            },
            _ => {
                self.cursor -= 1;
                Err(self.error("expected an expression"))
            }
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Expr, ServiceError> {
        let function = Function::from_name(name)
            .ok_or_else(|| self.error(&format!("unknown function '{name}'")))?;
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            args.push(self.parse_expression()?);
            while self.eat(&Token::Comma) {
                args.push(self.parse_expression()?);
            }
            self.expect(&Token::RParen)?;
        }
        if args.len() != function.arity() {
            return Err(self.error(&format!(
                "function '{name}' takes {} argument(s), got {}",
                function.arity(),
                args.len()
            )));
        }
        Ok(Expr::Call { function, args })
    }

    fn parse_path(&mut self, first: &str) -> Result<Expr, ServiceError> {
        let mut segments = vec![first.to_string()];
        while self.peek() == Some(&Token::Dot) {
            match self.peek_at(1) {
                Some(Token::Ident(segment)) => {
                    segments.push(segment.clone());
                    self.advance(2);
                }
                _ => {
                    self.advance(1);
                    return Err(self.error("expected a name after '.'"));
                }
            }
        }
        Ok(Expr::Path(segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use serde_json::json;

    fn eval(source: &str, variables: &Variables) -> Value {
        FeelExpression::parse(source)
            .unwrap()
            .evaluate(&Scope::new(variables))
            .unwrap()
    }

    fn test_cell(source: &str, input: Value) -> bool {
        let variables = Variables::new().with("limit", json!(10));
        let tests = UnaryTests::parse(source).unwrap();
        tests
            .matches(&Scope::with_input(&variables, DEFAULT_INPUT_VARIABLE, &input))
            .unwrap()
    }

    #[test]
    fn test_literals() {
        let vars = Variables::new();
        assert_eq!(eval(r#""Taylor House""#, &vars), json!("Taylor House"));
        assert_eq!(eval(r#""say \"hi\"""#, &vars), json!("say \"hi\""));
        assert_eq!(eval("765324", &vars), json!(765324));
        assert_eq!(eval("1.5", &vars), json!(1.5));
        assert_eq!(eval("-2", &vars), json!(-2));
        assert_eq!(eval("null", &vars), Value::Null);
        assert_eq!(eval("true", &vars), json!(true));
    }

    #[test]
    fn test_dotted_variable_names_resolve_before_paths() {
        let vars = Variables::new()
            .with("case", json!(""))
            .with("case.data.appealType", json!("protection"));
        assert_eq!(eval("case.data.appealType", &vars), json!("protection"));
        assert_eq!(eval("case.data.appellantFamilyName", &vars), Value::Null);
    }

    #[test]
    fn test_context_navigation() {
        let vars = Variables::new().with(
            "case",
            json!({"data": {"caseManagementLocation": {"region": "2", "baseLocation": "386417"}}}),
        );
        assert_eq!(
            eval("case.data.caseManagementLocation.region", &vars),
            json!("2")
        );
        assert_eq!(eval("case.data.missing.deeper", &vars), Value::Null);
        assert_eq!(eval("unknown", &vars), Value::Null);
    }

    #[test]
    fn test_operators() {
        let vars = Variables::new().with("a", json!(4)).with("b", json!("x"));
        assert_eq!(eval("a + 1", &vars), json!(5));
        assert_eq!(eval("a * 2 - 3", &vars), json!(5));
        assert_eq!(eval("a / 0", &vars), Value::Null);
        assert_eq!(eval(r#"b + "y""#, &vars), json!("xy"));
        assert_eq!(eval("a > 3 and a < 5", &vars), json!(true));
        assert_eq!(eval("a = 4.0", &vars), json!(true));
        assert_eq!(eval("missing < 3", &vars), Value::Null);
        assert_eq!(eval("missing < 3 or true", &vars), json!(true));
        assert_eq!(eval(r#"if a > 3 then "big" else "small""#, &vars), json!("big"));
        assert_eq!(eval("[1, 2, a]", &vars), json!([1, 2, 4]));
    }

    #[test]
    fn test_functions() {
        let vars = Variables::new().with("s", json!("Taylor House"));
        assert_eq!(eval(r#"contains(s, "House")"#, &vars), json!(true));
        assert_eq!(eval(r#"matches(s, "^Tay")"#, &vars), json!(true));
        assert_eq!(eval(r#"number("42")"#, &vars), json!(42));
        assert_eq!(eval("string(12)", &vars), json!("12"));
        assert_eq!(eval("count([1, 2, 3])", &vars), json!(3));
        assert_eq!(eval("not(true)", &vars), json!(false));
    }

    #[test]
    fn test_parse_errors() {
        assert!(FeelExpression::parse("\"unterminated").is_err());
        assert!(FeelExpression::parse("a +").is_err());
        assert!(FeelExpression::parse("lookup(a)").is_err());
        assert!(FeelExpression::parse("contains(a)").is_err());
        assert!(FeelExpression::parse("a b").is_err());
        assert!(UnaryTests::parse("[1..").is_err());
    }

    #[test]
    fn test_any_cells() {
        assert_eq!(UnaryTests::parse("").unwrap(), UnaryTests::Any);
        assert_eq!(UnaryTests::parse(" - ").unwrap(), UnaryTests::Any);
        assert!(test_cell("-", Value::Null));
    }

    #[test]
    fn test_equality_and_lists() {
        assert!(test_cell(r#""""#, json!("")));
        assert!(!test_cell(r#""""#, Value::Null));
        assert!(test_cell(r#""", null"#, Value::Null));
        assert!(test_cell(r#""protection","revocationOfProtection""#, json!("revocationOfProtection")));
        assert!(!test_cell(r#""protection""#, json!("refusalOfHumanRights")));
        assert!(test_cell("10", json!(10.0)));
        assert!(test_cell("limit", json!(10)));
    }

    #[test]
    fn test_comparisons_and_intervals() {
        assert!(test_cell("< 5", json!(4)));
        assert!(!test_cell("< 5", json!(5)));
        assert!(test_cell("<= limit", json!(10)));
        assert!(!test_cell("> 5", Value::Null));
        assert!(test_cell("[1..10]", json!(10)));
        assert!(!test_cell("[1..10)", json!(10)));
        assert!(!test_cell("]1..10]", json!(1)));
        assert!(test_cell("(1..10)", json!(5)));
        assert!(test_cell(r#"["a".."c"]"#, json!("b")));
    }

    #[test]
    fn test_negation() {
        assert!(test_cell(r#"not("", null)"#, json!({"data": {}})));
        assert!(!test_cell(r#"not("", null)"#, json!("")));
        assert!(!test_cell(r#"not("", null)"#, Value::Null));
        assert!(test_cell("not(< 3)", json!(3)));
    }

    #[test]
    fn test_input_value_expressions() {
        assert!(test_cell("? > 3 and ? < 7", json!(5)));
        assert!(!test_cell("? > 3 and ? < 7", json!(9)));
        assert!(test_cell(r#"matches(?, "^[0-9]+$")"#, json!("765324")));
        assert!(test_cell("cellInput = 4", json!(4)));
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let deep = format!("{}1{}", "(".repeat(5000), ")".repeat(5000));
        let err = FeelExpression::parse(&deep).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EvaluationFailure);
        assert!(err.to_string().contains("nested too deeply"));

        assert!(FeelExpression::parse(&format!("{}1", "-".repeat(5000))).is_err());
        assert!(FeelExpression::parse(&vec!["1"; 5000].join(" + ")).is_err());
        assert!(UnaryTests::parse(&format!("not({}1{})", "[".repeat(3000), "]".repeat(3000))).is_err());

        let vars = Variables::new();
        assert_eq!(eval("((((((1))))))", &vars), json!(1));
        assert_eq!(eval(&vec!["1"; 50].join(" + "), &vars), json!(50));
    }
}
