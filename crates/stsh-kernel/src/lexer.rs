//! Lexer for command lines.
//!
//! Converts a line into words and operators using the logos lexer generator.
//!
//! # Token Categories
//!
//! - **Operators**: `|`, `<`, `>`, `&`
//! - **Words**: bare words, `'single quoted'` (literal), `"double quoted"`
//!   (with `\"` and `\\` escapes)
//!
//! Word pieces that touch, like `a"b c"d`, are joined into one word.

use logos::{Logos, Span};
use std::fmt;

/// A token with its span in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub token: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(token: T, span: Span) -> Self {
        Self { token, span }
    }
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LexerError {
    #[default]
    UnexpectedCharacter,
    UnterminatedString,
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexerError::UnexpectedCharacter => write!(f, "unexpected character"),
            LexerError::UnterminatedString => write!(f, "unterminated string"),
        }
    }
}

/// Tokens produced by the lexer.
#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(error = LexerError)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    #[token("|")]
    Pipe,

    #[token("<")]
    Less,

    #[token(">")]
    Greater,

    #[token("&")]
    Amp,

    #[regex(r#""([^"\\]|\\.)*""#, lex_string)]
    #[regex(r"'[^']*'", lex_single_string)]
    #[regex(r#"[^ \t\r\n\f|<>&'"]+"#, lex_bare)]
    Word(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Pipe => write!(f, "|"),
            Token::Less => write!(f, "<"),
            Token::Greater => write!(f, ">"),
            Token::Amp => write!(f, "&"),
            Token::Word(w) => write!(f, "{w}"),
        }
    }
}

/// Lex a double-quoted string, processing `\"` and `\\` escapes.
fn lex_string(lex: &mut logos::Lexer<Token>) -> String {
    let s = lex.slice();
    let inner = &s[1..s.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('"' | '\\')) => out.push(next),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Lex a single-quoted string literal (no escape processing).
fn lex_single_string(lex: &mut logos::Lexer<Token>) -> String {
    let s = lex.slice();
    s[1..s.len() - 1].to_string()
}

fn lex_bare(lex: &mut logos::Lexer<Token>) -> String {
    lex.slice().to_string()
}

/// Tokenize a line, joining adjacent word pieces.
pub fn tokenize(source: &str) -> Result<Vec<Spanned<Token>>, Spanned<LexerError>> {
    let mut tokens: Vec<Spanned<Token>> = Vec::new();

    for (result, span) in Token::lexer(source).spanned() {
        let token = match result {
            Ok(token) => token,
            Err(err) => {
                let err = if source[span.clone()].starts_with(['"', '\'']) {
                    LexerError::UnterminatedString
                } else {
                    err
                };
                return Err(Spanned::new(err, span));
            }
        };

        if let (Token::Word(piece), Some(last)) = (&token, tokens.last_mut()) {
            if let Token::Word(word) = &mut last.token {
                if last.span.end == span.start {
                    word.push_str(piece);
                    last.span.end = span.end;
                    continue;
                }
            }
        }
        tokens.push(Spanned::new(token, span));
    }

    Ok(tokens)
}
