//! Recursive descent parser for the expression language.
//!
//! Precedence, from loosest to tightest:
//! assignment, `or`, `and`, equality, relational, additive, multiplicative, unary, then
//! calls and indexing applied to a primary expression.
//! All binary operators are left associative; assignment is right associative.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use compact_str::CompactString;

use crate::ast::*;
use crate::lexer::{tokenize, Token};
use crate::runtime::Number;

/// The reason a label failed to tokenize or parse.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    UnknownToken(char),
    UnterminatedString,
    BadNumber,
    /// `found` is [`None`] at the end of the input.
    Expected { expected: &'static str, found: Option<Token> },
    BadAssignTarget,
    BadCallee,
    BadIndexCount { count: usize },
}

/// A tokenizer or parser error located at a char column of the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub source: CompactString,
    pub pos: usize,
    pub kind: ParseErrorKind,
}
impl ParseError {
    pub fn new(source: &str, pos: usize, kind: ParseErrorKind) -> Self {
        Self { source: source.into(), pos, kind }
    }
}
impl fmt::Display for ParseError {
    /// Renders the error with the source line and a caret under the offending column.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ParseErrorKind::UnknownToken(c) => write!(f, "Unknown token: {c}")?,
            ParseErrorKind::UnterminatedString => f.write_str("Unterminated string")?,
            ParseErrorKind::BadNumber => f.write_str("Invalid number")?,
            ParseErrorKind::Expected { expected, found: Some(found) } => write!(f, "Expected {expected}, but got '{found}'")?,
            ParseErrorKind::Expected { expected, found: None } => write!(f, "Expected {expected}, but got nothing")?,
            ParseErrorKind::BadAssignTarget => f.write_str("Only variables and array elements can be assigned")?,
            ParseErrorKind::BadCallee => f.write_str("Only named functions can be called")?,
            ParseErrorKind::BadIndexCount { count } => write!(f, "Arrays have 1 or 2 dimensions, but got {count} indices")?,
        }
        write!(f, " at\n{}\n", self.source)?;
        for _ in 0..self.pos {
            f.write_str("-")?;
        }
        f.write_str("^")
    }
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<(Token, usize)>,
    next: usize,
}
impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Result<Self, ParseError> {
        Ok(Self { src, tokens: tokenize(src)?, next: 0 })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.next).map(|x| &x.0)
    }
    /// The column of the next token, or the end of the source.
    fn column(&self) -> usize {
        self.tokens.get(self.next).map(|x| x.1).unwrap_or_else(|| self.src.chars().count())
    }
    fn error(&self, pos: usize, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.src, pos, kind)
    }
    fn unexpected(&self, expected: &'static str) -> ParseError {
        self.error(self.column(), ParseErrorKind::Expected { expected, found: self.peek().cloned() })
    }
    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.next += 1;
            true
        } else {
            false
        }
    }
    fn expect(&mut self, token: &Token, expected: &'static str) -> Result<(), ParseError> {
        match self.eat(token) {
            true => Ok(()),
            false => Err(self.unexpected(expected)),
        }
    }
    fn ident(&mut self) -> Result<CompactString, ParseError> {
        match self.peek() {
            Some(Token::Ident(x)) => {
                let res = x.clone();
                self.next += 1;
                Ok(res)
            }
            _ => Err(self.unexpected("a name")),
        }
    }
    fn finish(&self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.unexpected("end of expression")),
        }
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let start = self.column();
        let target = self.or()?;
        if !self.eat(&Token::Assign) {
            return Ok(target);
        }
        if !target.is_place() {
            return Err(self.error(start, ParseErrorKind::BadAssignTarget));
        }
        let value = self.assignment()?;
        Ok(Expr::Assign { target: Box::new(target), value: Box::new(value) })
    }

    fn binary(&mut self, ops: &[(Token, BinaryOp)], operand: fn(&mut Self) -> Result<Expr, ParseError>) -> Result<Expr, ParseError> {
        let mut left = operand(self)?;
        'outer: loop {
            for (token, op) in ops {
                if self.eat(token) {
                    let right = operand(self)?;
                    left = Expr::Binary { op: *op, left: Box::new(left), right: Box::new(right) };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }
    fn or(&mut self) -> Result<Expr, ParseError> {
        self.binary(&[(Token::Or, BinaryOp::Or)], Self::and)
    }
    fn and(&mut self) -> Result<Expr, ParseError> {
        self.binary(&[(Token::And, BinaryOp::And)], Self::equality)
    }
    fn equality(&mut self) -> Result<Expr, ParseError> {
        self.binary(&[(Token::Eq, BinaryOp::Eq), (Token::NotEq, BinaryOp::NotEq)], Self::relational)
    }
    fn relational(&mut self) -> Result<Expr, ParseError> {
        self.binary(&[
            (Token::Less, BinaryOp::Less), (Token::LessEq, BinaryOp::LessEq),
            (Token::Greater, BinaryOp::Greater), (Token::GreaterEq, BinaryOp::GreaterEq),
        ], Self::additive)
    }
    fn additive(&mut self) -> Result<Expr, ParseError> {
        self.binary(&[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)], Self::multiplicative)
    }
    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.binary(&[(Token::Star, BinaryOp::Mul), (Token::Slash, BinaryOp::Div), (Token::Percent, BinaryOp::Mod)], Self::unary)
    }
    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Some(Token::Not) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Pos,
            _ => return self.postfix(),
        };
        self.next += 1;
        Ok(Expr::Unary { op, value: Box::new(self.unary()?) })
    }
    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let start = self.column();
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::LParen) => {
                    let Expr::Variable(name) = expr else { return Err(self.error(start, ParseErrorKind::BadCallee)) };
                    self.next += 1;
                    let args = self.list(&Token::RParen, "')'")?;
                    expr = Expr::Call { name, args };
                }
                Some(Token::LBracket) => {
                    let pos = self.column();
                    self.next += 1;
                    let indices = self.list(&Token::RBracket, "']'")?;
                    if !(1..=2).contains(&indices.len()) {
                        return Err(self.error(pos, ParseErrorKind::BadIndexCount { count: indices.len() }));
                    }
                    expr = Expr::Index { target: Box::new(expr), indices };
                }
                _ => return Ok(expr),
            }
        }
    }
    /// Parses a comma separated list up to and including the `close` token.
    fn list(&mut self, close: &Token, expected: &'static str) -> Result<Vec<Expr>, ParseError> {
        let mut res = vec![];
        if self.eat(close) {
            return Ok(res);
        }
        loop {
            res.push(self.or()?);
            if !self.eat(&Token::Comma) {
                self.expect(close, expected)?;
                return Ok(res);
            }
        }
    }
    fn primary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.column();
        let expr = match self.peek() {
            Some(Token::Number(x)) => Expr::Number(Number::new(*x).map_err(|_| self.error(pos, ParseErrorKind::BadNumber))?),
            Some(Token::String(x)) => Expr::String(x.clone()),
            Some(Token::Bool(x)) => Expr::Bool(*x),
            Some(Token::Ident(x)) => Expr::Variable(x.clone()),
            Some(Token::LParen) => {
                self.next += 1;
                let inner = self.or()?;
                self.expect(&Token::RParen, "')'")?;
                return Ok(inner);
            }
            Some(Token::LBracket) => {
                self.next += 1;
                return Ok(Expr::Array(self.list(&Token::RBracket, "']'")?));
            }
            _ => return Err(self.unexpected("an expression")),
        };
        self.next += 1;
        Ok(expr)
    }

    fn param(&mut self) -> Result<Param, ParseError> {
        let first = self.ident()?;
        let (mode, name) = match first.as_str() {
            "in" => match self.ident()? {
                x if x == "out" => (ParamMode::InOut, self.ident()?),
                x => (ParamMode::In, x),
            }
            "out" => (ParamMode::Out, self.ident()?),
            "inout" => (ParamMode::InOut, self.ident()?),
            _ => (ParamMode::In, first),
        };
        Ok(Param { name, mode })
    }
}

/// Parses a complete expression, which may be an assignment.
pub fn parse_expr(src: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(src)?;
    let res = parser.assignment()?;
    parser.finish()?;
    Ok(res)
}

/// Parses the label of an assignment component, which must be an assignment.
pub fn parse_assignment(src: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(src)?;
    let res = parser.assignment()?;
    if !matches!(res, Expr::Assign { .. }) {
        return Err(parser.unexpected("':='"));
    }
    parser.finish()?;
    Ok(res)
}

/// Parses the target of an input component: a variable or array element.
pub fn parse_target(src: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(src)?;
    let start = parser.column();
    let res = parser.or()?;
    parser.finish()?;
    match res.is_place() {
        true => Ok(res),
        false => Err(parser.error(start, ParseErrorKind::BadAssignTarget)),
    }
}

/// Parses the label of a call component: a subchart name, optionally followed by an argument list.
pub fn parse_call(src: &str) -> Result<(CompactString, Vec<Expr>), ParseError> {
    let mut parser = Parser::new(src)?;
    let start = parser.column();
    let res = parser.or()?;
    parser.finish()?;
    match res {
        Expr::Variable(name) => Ok((name, vec![])),
        Expr::Call { name, args } => Ok((name, args)),
        _ => Err(parser.error(start, ParseErrorKind::Expected { expected: "a subchart call", found: None })),
    }
}

/// Parses a procedure header such as `swap(in out a, in out b)`.
/// Parameters without a mode are passed by value.
pub fn parse_procedure_header(src: &str) -> Result<ProcedureHeader, ParseError> {
    let mut parser = Parser::new(src)?;
    let name = parser.ident()?;
    let mut params = vec![];
    if parser.eat(&Token::LParen) && !parser.eat(&Token::RParen) {
        loop {
            params.push(parser.param()?);
            if !parser.eat(&Token::Comma) {
                parser.expect(&Token::RParen, "')'")?;
                break;
            }
        }
    }
    parser.finish()?;
    Ok(ProcedureHeader { name, params })
}

#[cfg(test)]
fn num(x: f64) -> Box<Expr> {
    Box::new(Expr::Number(Number::new(x).unwrap()))
}
#[cfg(test)]
fn var(x: &str) -> Box<Expr> {
    Box::new(Expr::Variable(x.into()))
}

#[test]
fn test_parse_precedence() {
    assert_eq!(parse_expr("1 + 2 * 3").unwrap(), Expr::Binary {
        op: BinaryOp::Add,
        left: num(1.0),
        right: Box::new(Expr::Binary { op: BinaryOp::Mul, left: num(2.0), right: num(3.0) }),
    });
    assert_eq!(parse_expr("8 - 4 - 2").unwrap(), Expr::Binary {
        op: BinaryOp::Sub,
        left: Box::new(Expr::Binary { op: BinaryOp::Sub, left: num(8.0), right: num(4.0) }),
        right: num(2.0),
    });
    assert_eq!(parse_expr("(8 - 4) * -x").unwrap(), Expr::Binary {
        op: BinaryOp::Mul,
        left: Box::new(Expr::Binary { op: BinaryOp::Sub, left: num(8.0), right: num(4.0) }),
        right: Box::new(Expr::Unary { op: UnaryOp::Neg, value: var("x") }),
    });
    assert_eq!(parse_expr("a < 1 or not b and c").unwrap(), Expr::Binary {
        op: BinaryOp::Or,
        left: Box::new(Expr::Binary { op: BinaryOp::Less, left: var("a"), right: num(1.0) }),
        right: Box::new(Expr::Binary {
            op: BinaryOp::And,
            left: Box::new(Expr::Unary { op: UnaryOp::Not, value: var("b") }),
            right: var("c"),
        }),
    });
}

#[test]
fn test_parse_postfix() {
    assert_eq!(parse_expr("Grid[i, j + 1]").unwrap(), Expr::Index {
        target: var("grid"),
        indices: vec![Expr::Variable("i".into()), Expr::Binary { op: BinaryOp::Add, left: var("j"), right: num(1.0) }],
    });
    assert_eq!(parse_expr("max(a, (b))").unwrap(), Expr::Call {
        name: "max".into(),
        args: vec![Expr::Variable("a".into()), Expr::Variable("b".into())],
    });
    assert_eq!(parse_expr("(random)()").unwrap(), Expr::Call { name: "random".into(), args: vec![] });
    assert_eq!(parse_expr("[1, \"two\"]").unwrap(), Expr::Array(vec![*num(1.0), Expr::String("two".into())]));

    assert_eq!(parse_expr("f(1)(2)").unwrap_err().kind, ParseErrorKind::BadCallee);
    assert_eq!(parse_expr("3(2)").unwrap_err().kind, ParseErrorKind::BadCallee);
    assert_eq!(parse_expr("a[1, 2, 3]").unwrap_err().kind, ParseErrorKind::BadIndexCount { count: 3 });
    assert_eq!(parse_expr("a[]").unwrap_err().kind, ParseErrorKind::BadIndexCount { count: 0 });
}

#[test]
fn test_parse_assignment() {
    assert_eq!(parse_assignment("x := y := 2").unwrap(), Expr::Assign {
        target: var("x"),
        value: Box::new(Expr::Assign { target: var("y"), value: num(2.0) }),
    });
    assert_eq!(parse_assignment("a[3] := a[2] + 1").unwrap(), Expr::Assign {
        target: Box::new(Expr::Index { target: var("a"), indices: vec![*num(3.0)] }),
        value: Box::new(Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(Expr::Index { target: var("a"), indices: vec![*num(2.0)] }),
            right: num(1.0),
        }),
    });

    let e = parse_expr("x + 1 := 4").unwrap_err();
    assert_eq!((e.pos, e.kind), (0, ParseErrorKind::BadAssignTarget));
    let e = parse_assignment("x + 1").unwrap_err();
    assert_eq!((e.pos, e.kind), (5, ParseErrorKind::Expected { expected: "':='", found: None }));
    assert_eq!(parse_target("count").unwrap(), *var("count"));
    assert_eq!(parse_target("count + 1").unwrap_err().kind, ParseErrorKind::BadAssignTarget);
}

#[test]
fn test_parse_errors() {
    let e = parse_expr("(1 + 2").unwrap_err();
    assert_eq!((e.pos, e.kind.clone()), (6, ParseErrorKind::Expected { expected: "')'", found: None }));
    assert_eq!(format!("{e}"), "Expected ')', but got nothing at\n(1 + 2\n------^");

    let e = parse_expr("1 2").unwrap_err();
    assert_eq!((e.pos, e.kind), (2, ParseErrorKind::Expected { expected: "end of expression", found: Some(Token::Number(2.0)) }));

    let e = parse_expr("x * ").unwrap_err();
    assert_eq!(e.kind, ParseErrorKind::Expected { expected: "an expression", found: None });

    assert_eq!(parse_expr("x @ y").unwrap_err().kind, ParseErrorKind::UnknownToken('@'));
}

#[test]
fn test_parse_call_and_header() {
    assert_eq!(parse_call("Draw_Board").unwrap(), (CompactString::new("draw_board"), vec![]));
    assert_eq!(parse_call("swap(a, b[1])").unwrap().1.len(), 2);
    assert!(parse_call("1 + 2").is_err());

    assert_eq!(parse_procedure_header("Swap(in out A, in out B)").unwrap(), ProcedureHeader {
        name: "swap".into(),
        params: vec![Param { name: "a".into(), mode: ParamMode::InOut }, Param { name: "b".into(), mode: ParamMode::InOut }],
    });
    assert_eq!(parse_procedure_header("area(in w, in h, out result)").unwrap().params, [
        Param { name: "w".into(), mode: ParamMode::In },
        Param { name: "h".into(), mode: ParamMode::In },
        Param { name: "result".into(), mode: ParamMode::Out },
    ]);
    assert_eq!(parse_procedure_header("reset()").unwrap().params, []);
    assert_eq!(parse_procedure_header("greet").unwrap(), ProcedureHeader { name: "greet".into(), params: vec![] });
    assert!(parse_procedure_header("f(in)").is_err());
}
