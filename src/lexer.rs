//! Tokenizer for the expression language used in component labels.

use alloc::vec::Vec;
use core::fmt;

use compact_str::CompactString;

use crate::parser::{ParseError, ParseErrorKind};

/// A token of the expression language.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// An identifier, always lowercase.
    Ident(CompactString),
    Number(f64),
    String(CompactString),
    Bool(bool),

    Assign,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    And,
    Or,
    Not,

    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(x) => write!(f, "{x}"),
            Token::Number(x) => write!(f, "{x}"),
            Token::String(x) => write!(f, "\"{x}\""),
            Token::Bool(x) => write!(f, "{x}"),
            Token::Assign => f.write_str(":="),
            Token::Eq => f.write_str("=="),
            Token::NotEq => f.write_str("!="),
            Token::Less => f.write_str("<"),
            Token::LessEq => f.write_str("<="),
            Token::Greater => f.write_str(">"),
            Token::GreaterEq => f.write_str(">="),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::Percent => f.write_str("%"),
            Token::And => f.write_str("and"),
            Token::Or => f.write_str("or"),
            Token::Not => f.write_str("not"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::LBracket => f.write_str("["),
            Token::RBracket => f.write_str("]"),
            Token::Comma => f.write_str(","),
        }
    }
}

/// Splits `src` into tokens, each paired with the char column it starts at.
pub fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let chars: Vec<char> = src.chars().collect();
    let error = |pos, kind| ParseError::new(src, pos, kind);

    let mut tokens = vec![];
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        let next = chars.get(i + 1).copied();
        let (token, len) = match (c, next) {
            (':', Some('=')) => (Token::Assign, 2),
            ('=', Some('=')) => (Token::Eq, 2),
            ('=', _) => (Token::Eq, 1),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('!', _) => (Token::Not, 1),
            ('<', Some('=')) => (Token::LessEq, 2),
            ('<', _) => (Token::Less, 1),
            ('>', Some('=')) => (Token::GreaterEq, 2),
            ('>', _) => (Token::Greater, 1),
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            (',', _) => (Token::Comma, 1),
            ('"', _) => {
                let len = chars[i + 1..].iter().position(|&x| x == '"').ok_or_else(|| error(start, ParseErrorKind::UnterminatedString))?;
                (Token::String(chars[i + 1..i + 1 + len].iter().collect()), len + 2)
            }
            (c, _) if c.is_ascii_digit() => {
                let mut len = 0;
                let mut seen_point = false;
                for &x in &chars[i..] {
                    match x {
                        '0'..='9' => (),
                        '.' if !seen_point => seen_point = true,
                        _ => break,
                    }
                    len += 1;
                }
                let text: CompactString = chars[i..i + len].iter().collect();
                let value = text.parse::<f64>().ok().filter(|x| x.is_finite()).ok_or_else(|| error(start, ParseErrorKind::BadNumber))?;
                (Token::Number(value), len)
            }
            (c, _) if c.is_alphabetic() || c == '_' => {
                let len = chars[i..].iter().position(|&x| !(x.is_alphanumeric() || x == '_')).unwrap_or(chars.len() - i);
                let ident: CompactString = chars[i..i + len].iter().flat_map(|x| x.to_lowercase()).collect();
                let token = match ident.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(ident),
                };
                (token, len)
            }
            (c, _) => return Err(error(start, ParseErrorKind::UnknownToken(c))),
        };
        tokens.push((token, start));
        i += len;
    }
    Ok(tokens)
}

#[test]
fn test_tokenize() {
    let toks = |src: &str| tokenize(src).unwrap().into_iter().map(|x| x.0).collect::<Vec<_>>();

    assert_eq!(toks("Count := count + 1"), [
        Token::Ident("count".into()), Token::Assign, Token::Ident("count".into()), Token::Plus, Token::Number(1.0),
    ]);
    assert_eq!(toks("x<=3.25 AND NOT Done"), [
        Token::Ident("x".into()), Token::LessEq, Token::Number(3.25), Token::And, Token::Not, Token::Ident("done".into()),
    ]);
    assert_eq!(toks("a[i,j]!=\"Hi There\"||TRUE"), [
        Token::Ident("a".into()), Token::LBracket, Token::Ident("i".into()), Token::Comma, Token::Ident("j".into()), Token::RBracket,
        Token::NotEq, Token::String("Hi There".into()), Token::Or, Token::Bool(true),
    ]);
    assert_eq!(toks("12. 1.5"), [Token::Number(12.0), Token::Number(1.5)]);
    assert_eq!(toks("x = y == z"), [Token::Ident("x".into()), Token::Eq, Token::Ident("y".into()), Token::Eq, Token::Ident("z".into())]);
    assert!(toks("  ").is_empty());
}

#[test]
fn test_tokenize_positions() {
    let pos = tokenize("ab + \"c\" * 10").unwrap().into_iter().map(|x| x.1).collect::<Vec<_>>();
    assert_eq!(pos, [0, 3, 5, 9, 11]);
}

#[test]
fn test_tokenize_errors() {
    let e = tokenize("x := 3 # 4").unwrap_err();
    assert_eq!(e.pos, 7);
    assert_eq!(e.kind, ParseErrorKind::UnknownToken('#'));
    assert_eq!(format!("{e}"), "Unknown token: # at\nx := 3 # 4\n-------^");

    let e = tokenize("say(\"hello)").unwrap_err();
    assert_eq!(e.pos, 4);
    assert_eq!(e.kind, ParseErrorKind::UnterminatedString);
}
