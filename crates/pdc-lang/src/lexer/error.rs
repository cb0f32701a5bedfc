use thiserror::Error;

use crate::range::Range;

use super::token::Token;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum LexerError {
    #[error("Unexpected token `{0}`")]
    UnexpectedToken(Token),
    #[error("Unterminated string literal")]
    UnterminatedString(Range),
    #[error("Unexpected EOF detected")]
    UnexpectedEOFDetected(Range),
}

impl LexerError {
    pub fn range(&self) -> Range {
        match self {
            LexerError::UnexpectedToken(token) => token.range,
            LexerError::UnterminatedString(range) | LexerError::UnexpectedEOFDetected(range) => *range,
        }
    }
}
