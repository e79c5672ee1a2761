//! Lexer for rule source lines.
//!
//! Uses Logos for tokenization. A `-` directly in front of digits is folded
//! into a negative number unless it follows an operand, so `a-1` stays a
//! subtraction while `a=-1` reads a negative literal.

use std::fmt;
use std::ops::Range;

use logos::{Lexer, Logos};
use thiserror::Error;
use voxel_ca_core::Offset;

/// Token type for rule source.
#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    #[regex(r"//[^\n]*", logos::skip, allow_greedy = true)]
    Comment,

    /// Bare name: a state, a neighborhood or a property value.
    #[regex(r"[A-Za-z_][A-Za-z0-9_']*", |lex| lex.slice().to_string())]
    Identifier(String),

    /// Material reference: `#name` or `"name"`.
    #[regex(r"#[A-Za-z_][A-Za-z0-9_':]*", |lex| lex.slice()[1..].to_string())]
    #[regex(r#""[^"\n]*""#, |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    Constant(String),

    /// Decimal literal. The magnitude `2^63` lexes as `i64::MIN` and is only
    /// accepted directly after a folded minus sign.
    #[regex(r"[0-9]+", parse_number)]
    Number(i64),

    /// Literal displacement `{x, y, z}`.
    #[regex(
        r"\{[ \t]*-?[0-9]+[ \t]*,[ \t]*-?[0-9]+[ \t]*,[ \t]*-?[0-9]+[ \t]*\}",
        parse_offset
    )]
    Offset(Offset),

    #[token("->")]
    Arrow,
    #[token("@")]
    At,
    #[token("$")]
    Dollar,
    #[token("~")]
    Tilde,
    #[token("&")]
    And,
    #[token("!")]
    Exclamation,
    #[token(",")]
    Comma,
    #[token("|")]
    Separator,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token(":")]
    Colon,
    #[token("=")]
    Equals,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token(">")]
    GreaterThan,
    #[token("<")]
    LessThan,

    /// End of the line; appended by [`scan`].
    Eof,
}

fn parse_offset(lex: &mut Lexer<Token>) -> Option<Offset> {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1];
    let mut parts = inner.split(',').map(|p| p.trim().parse::<i32>());
    let x = parts.next()?.ok()?;
    let y = parts.next()?.ok()?;
    let z = parts.next()?.ok()?;
    Some(Offset::new(x, y, z))
}

impl Token {
    /// Whether the token can end an operand.
    fn is_operand(&self) -> bool {
        matches!(
            self,
            Token::Identifier(_)
                | Token::Constant(_)
                | Token::Number(_)
                | Token::Offset(_)
                | Token::RightBracket
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Comment => write!(f, "comment"),
            Token::Identifier(name) => write!(f, "identifier '{name}'"),
            Token::Constant(name) => write!(f, "constant '#{name}'"),
            Token::Number(n) => write!(f, "number {n}"),
            Token::Offset(o) => write!(f, "offset {o}"),
            Token::Arrow => write!(f, "'->'"),
            Token::At => write!(f, "'@'"),
            Token::Dollar => write!(f, "'$'"),
            Token::Tilde => write!(f, "'~'"),
            Token::And => write!(f, "'&'"),
            Token::Exclamation => write!(f, "'!'"),
            Token::Comma => write!(f, "','"),
            Token::Separator => write!(f, "'|'"),
            Token::LeftBracket => write!(f, "'['"),
            Token::RightBracket => write!(f, "']'"),
            Token::Colon => write!(f, "':'"),
            Token::Equals => write!(f, "'='"),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::Percent => write!(f, "'%'"),
            Token::GreaterThan => write!(f, "'>'"),
            Token::LessThan => write!(f, "'<'"),
            Token::Eof => write!(f, "end of line"),
        }
    }
}

/// Error during lexing. Columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unexpected character '{character}' at column {column}")]
    UnexpectedCharacter { character: char, column: usize },

    #[error("unterminated offset literal at column {column}")]
    UnterminatedOffset { column: usize },

    #[error("unterminated constant at column {column}")]
    UnterminatedConstant { column: usize },

    #[error("number '{literal}' out of range at column {column}")]
    NumberOutOfRange { literal: String, column: usize },
}

impl LexError {
    pub fn column(&self) -> usize {
        match self {
            LexError::UnexpectedCharacter { column, .. }
            | LexError::UnterminatedOffset { column }
            | LexError::UnterminatedConstant { column }
            | LexError::NumberOutOfRange { column, .. } => *column,
        }
    }
}

/// Tokenize one line of rule source. The result always ends with [`Token::Eof`].
pub fn scan(line: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Token::lexer(line);
    let mut spanned: Vec<(Token, Range<usize>)> = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(Token::Comment) => {}
            Ok(token) => spanned.push((token, lexer.span())),
            Err(()) => return Err(classify_error(lexer.slice(), lexer.span().start + 1)),
        }
    }

    let mut tokens: Vec<Token> = Vec::with_capacity(spanned.len() + 1);
    let mut iter = spanned.into_iter().peekable();
    while let Some((token, span)) = iter.next() {
        if token == Token::Minus && !tokens.last().is_some_and(Token::is_operand) {
            if let Some((Token::Number(n), next_span)) = iter.peek() {
                if next_span.start == span.end {
                    tokens.push(Token::Number(n.wrapping_neg()));
                    iter.next();
                    continue;
                }
            }
        }
        if token == Token::Number(i64::MIN) {
            return Err(LexError::NumberOutOfRange {
                literal: line[span.clone()].to_string(),
                column: span.start + 1,
            });
        }
        tokens.push(token);
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

fn parse_number(lex: &mut Lexer<Token>) -> Option<i64> {
    let magnitude: u64 = lex.slice().parse().ok()?;
    match i64::try_from(magnitude) {
        Ok(value) => Some(value),
        Err(_) if magnitude == i64::MIN.unsigned_abs() => Some(i64::MIN),
        Err(_) => None,
    }
}

fn classify_error(slice: &str, column: usize) -> LexError {
    if slice.starts_with('{') {
        LexError::UnterminatedOffset { column }
    } else if slice.starts_with('"') {
        LexError::UnterminatedConstant { column }
    } else if !slice.is_empty() && slice.bytes().all(|b| b.is_ascii_digit()) {
        LexError::NumberOutOfRange {
            literal: slice.to_string(),
            column,
        }
    } else {
        LexError::UnexpectedCharacter {
            character: slice.chars().next().unwrap_or(' '),
            column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(s: &str) -> Token {
        Token::Identifier(s.to_string())
    }

    fn constant(s: &str) -> Token {
        Token::Constant(s.to_string())
    }

    #[test]
    fn test_simple_rule() {
        let tokens = scan("#white_wool & points=0 -> #black_wool").unwrap();
        assert_eq!(
            tokens,
            vec![
                constant("white_wool"),
                Token::And,
                ident("points"),
                Token::Equals,
                Token::Number(0),
                Token::Arrow,
                constant("black_wool"),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(scan("// nothing here").unwrap(), vec![Token::Eof]);
        let tokens = scan("#dirt -> #stone // trailing").unwrap();
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_negative_numbers() {
        let tokens = scan("points=-1").unwrap();
        assert_eq!(tokens[2], Token::Number(-1));

        let tokens = scan("points-1").unwrap();
        assert_eq!(tokens, vec![ident("points"), Token::Minus, Token::Number(1), Token::Eof]);

        let tokens = scan("a = - 1").unwrap();
        assert_eq!(tokens[2], Token::Minus);
    }

    #[test]
    fn test_integer_bounds() {
        let tokens = scan("x=-9223372036854775808").unwrap();
        assert_eq!(tokens[2], Token::Number(i64::MIN));
        let tokens = scan("x=9223372036854775807").unwrap();
        assert_eq!(tokens[2], Token::Number(i64::MAX));

        assert_eq!(
            scan("x=9223372036854775808"),
            Err(LexError::NumberOutOfRange {
                literal: "9223372036854775808".to_string(),
                column: 3,
            })
        );
        assert!(matches!(
            scan("x-9223372036854775808"),
            Err(LexError::NumberOutOfRange { column: 3, .. })
        ));
        assert!(matches!(
            scan("x=-9223372036854775809"),
            Err(LexError::NumberOutOfRange { .. })
        ));
    }

    #[test]
    fn test_offsets_and_symbols() {
        let tokens = scan("{1, -1, 0}@block ~up $boom").unwrap();
        assert_eq!(tokens[0], Token::Offset(Offset::new(1, -1, 0)));
        assert_eq!(tokens[1], Token::At);
        assert_eq!(tokens[3], Token::Tilde);
        assert_eq!(tokens[5], Token::Dollar);
    }

    #[test]
    fn test_quoted_and_namespaced_constants() {
        let tokens = scan(r#""stone" #minecraft:dirt"#).unwrap();
        assert_eq!(tokens[0], constant("stone"));
        assert_eq!(tokens[1], constant("minecraft:dirt"));
    }

    #[test]
    fn test_identifier_with_prime() {
        let tokens = scan("heat' -> heat'=1").unwrap();
        assert_eq!(tokens[0], ident("heat'"));
    }

    #[test]
    fn test_lex_errors() {
        assert!(matches!(
            scan("#dirt -> ?"),
            Err(LexError::UnexpectedCharacter { character: '?', column: 10 })
        ));
        assert!(matches!(
            scan("{1, 2 -> #dirt"),
            Err(LexError::UnterminatedOffset { column: 1 })
        ));
        assert!(matches!(
            scan("\"stone -> #dirt"),
            Err(LexError::UnterminatedConstant { .. })
        ));
        assert!(matches!(
            scan("x=99999999999999999999999"),
            Err(LexError::NumberOutOfRange { .. })
        ));
    }
}
