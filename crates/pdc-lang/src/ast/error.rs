use thiserror::Error;

use crate::{Token, range::Range};

#[derive(Error, Debug, PartialEq, Clone)]
pub enum ParseError {
    #[error("Unexpected token `{}`", if .0.kind == crate::TokenKind::Eof { "EOF".to_string() } else { .0.to_string() })]
    UnexpectedToken(Token),
    #[error("Unexpected indent")]
    UnexpectedIndent(Range),
    #[error("Expected an indented block")]
    ExpectedIndentedBlock(Range),
    #[error("Cannot assign to expression")]
    InvalidTarget(Range),
    #[error("Invalid number literal `{0}`")]
    InvalidNumber(Token),
    #[error("Expected `{1}` but got `{got}`", got = if .0.kind == crate::TokenKind::Eof { "EOF".to_string() } else { .0.to_string() })]
    Expected(Token, &'static str),
}

impl ParseError {
    pub fn range(&self) -> Range {
        match self {
            ParseError::UnexpectedToken(token)
            | ParseError::InvalidNumber(token)
            | ParseError::Expected(token, _) => token.range,
            ParseError::UnexpectedIndent(range)
            | ParseError::ExpectedIndentedBlock(range)
            | ParseError::InvalidTarget(range) => *range,
        }
    }
}
