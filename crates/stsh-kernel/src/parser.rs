//! Parser: turns one input line into a [`Pipeline`].
//!
//! Grammar (informal):
//!
//! ```text
//! line     := pipeline? '&'?
//! pipeline := command ('|' command)*
//! command  := (WORD | '<' WORD | '>' WORD)+
//! ```
//!
//! Redirections may appear anywhere in the line but apply to the pipeline:
//! `<` feeds the first command, `>` receives the last command's output.

use thiserror::Error;

use crate::lexer::{tokenize, LexerError, Token};
use crate::pipeline::{Command, Pipeline};

/// Why a line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{error} at column {column}")]
    Lex { error: LexerError, column: usize },

    #[error("missing command {0}")]
    EmptyCommand(&'static str),

    #[error("missing file name after `{0}`")]
    MissingTarget(Token),

    #[error("more than one `{0}` redirection")]
    DuplicateRedirect(Token),

    #[error("`&` must end the line")]
    MisplacedAmp,
}

/// Parse a line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Pipeline>, ParseError> {
    let tokens = tokenize(line).map_err(|e| ParseError::Lex {
        error: e.token,
        column: e.span.start + 1,
    })?;
    if tokens.is_empty() {
        return Ok(None);
    }

    let mut pipeline = Pipeline::default();
    let mut words: Vec<String> = Vec::new();
    let mut tokens = tokens.into_iter().map(|s| s.token).peekable();

    while let Some(token) = tokens.next() {
        match token {
            Token::Word(w) => words.push(w),
            Token::Pipe => {
                let command = take_command(&mut words).ok_or(ParseError::EmptyCommand("before `|`"))?;
                pipeline.commands.push(command);
            }
            redirect @ (Token::Less | Token::Greater) => {
                let Some(Token::Word(target)) = tokens.next() else {
                    return Err(ParseError::MissingTarget(redirect));
                };
                let slot = if redirect == Token::Less {
                    &mut pipeline.input
                } else {
                    &mut pipeline.output
                };
                if slot.is_some() {
                    return Err(ParseError::DuplicateRedirect(redirect));
                }
                *slot = Some(target.into());
            }
            Token::Amp => {
                if tokens.peek().is_some() {
                    return Err(ParseError::MisplacedAmp);
                }
                pipeline.background = true;
            }
        }
    }

    match take_command(&mut words) {
        Some(command) => pipeline.commands.push(command),
        None if pipeline.commands.is_empty() => return Err(ParseError::EmptyCommand("in line")),
        None => return Err(ParseError::EmptyCommand("after `|`")),
    }

    Ok(Some(pipeline))
}

fn take_command(words: &mut Vec<String>) -> Option<Command> {
    if words.is_empty() {
        return None;
    }
    let mut words = std::mem::take(words).into_iter();
    let program = words.next()?;
    Some(Command::new(program).args(words))
}
