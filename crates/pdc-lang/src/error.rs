use miette::{Diagnostic, SourceOffset, SourceSpan};

use crate::{ast::error::ParseError, eval::error::RuntimeError, lexer::error::LexerError, range::Range};

#[derive(Debug, thiserror::Error, PartialEq, Clone)]
pub enum InnerError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl InnerError {
    pub fn range(&self) -> Option<Range> {
        match self {
            InnerError::Lexer(err) => Some(err.range()),
            InnerError::Parse(err) => Some(err.range()),
            InnerError::Runtime(err) => err.range(),
        }
    }
}

/// Represents a high-level error with diagnostic information for the user.
#[derive(PartialEq, Debug, thiserror::Error)]
#[error("{cause}")]
pub struct Error {
    /// The underlying cause of the error.
    pub cause: InnerError,
    /// The source code related to the error.
    pub source_code: String,
    /// The location in the source code for diagnostics.
    pub location: SourceSpan,
}

impl Error {
    pub fn from_error(source_code: impl Into<String>, cause: impl Into<InnerError>) -> Self {
        let source_code = source_code.into();
        let cause = cause.into();

        let location = match cause.range() {
            Some(range) if range != Range::default() => {
                let start = SourceOffset::from_location(
                    &source_code,
                    range.start.line as usize,
                    range.start.column,
                );
                let end = SourceOffset::from_location(&source_code, range.end.line as usize, range.end.column);
                SourceSpan::new(
                    start,
                    std::cmp::max(end.offset().saturating_sub(start.offset()), 1),
                )
            }
            _ => SourceSpan::new(SourceOffset::from(source_code.len().saturating_sub(1)), 1),
        };

        Self {
            cause,
            source_code,
            location,
        }
    }
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let code = match &self.cause {
            InnerError::Lexer(LexerError::UnexpectedToken(_)) => "LexerError::UnexpectedToken",
            InnerError::Lexer(LexerError::UnterminatedString(_)) => "LexerError::UnterminatedString",
            InnerError::Lexer(LexerError::UnexpectedEOFDetected(_)) => "LexerError::UnexpectedEOFDetected",
            InnerError::Parse(ParseError::UnexpectedToken(_)) => "ParseError::UnexpectedToken",
            InnerError::Parse(ParseError::UnexpectedIndent(_)) => "ParseError::UnexpectedIndent",
            InnerError::Parse(ParseError::ExpectedIndentedBlock(_)) => "ParseError::ExpectedIndentedBlock",
            InnerError::Parse(ParseError::InvalidTarget(_)) => "ParseError::InvalidTarget",
            InnerError::Parse(ParseError::InvalidNumber(_)) => "ParseError::InvalidNumber",
            InnerError::Parse(ParseError::Expected(_, _)) => "ParseError::Expected",
            InnerError::Runtime(RuntimeError::NameError(_, _)) => "RuntimeError::NameError",
            InnerError::Runtime(RuntimeError::TypeError(_, _)) => "RuntimeError::TypeError",
            InnerError::Runtime(RuntimeError::ValueError(_, _)) => "RuntimeError::ValueError",
            InnerError::Runtime(RuntimeError::AttributeError(_, _, _)) => "RuntimeError::AttributeError",
            InnerError::Runtime(RuntimeError::IndexError(_)) => "RuntimeError::IndexError",
            InnerError::Runtime(RuntimeError::KeyError(_, _)) => "RuntimeError::KeyError",
            InnerError::Runtime(RuntimeError::ZeroDivision(_)) => "RuntimeError::ZeroDivision",
            InnerError::Runtime(RuntimeError::Overflow(_)) => "RuntimeError::Overflow",
            InnerError::Runtime(RuntimeError::RecursionError(_)) => "RuntimeError::RecursionError",
            InnerError::Runtime(RuntimeError::OutsideFunction(_, _)) => "RuntimeError::OutsideFunction",
            InnerError::Runtime(RuntimeError::OutsideLoop(_, _)) => "RuntimeError::OutsideLoop",
            InnerError::Runtime(RuntimeError::Template(_)) => "RuntimeError::Template",
            InnerError::Runtime(RuntimeError::Native(_)) => "RuntimeError::Native",
        };

        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let msg = match &self.cause {
            InnerError::Lexer(LexerError::UnexpectedToken(_)) => {
                Some("Check for unexpected or misplaced characters in your input.".to_string())
            }
            InnerError::Lexer(LexerError::UnterminatedString(_)) => {
                Some("Close the string literal with a matching quote.".to_string())
            }
            InnerError::Parse(ParseError::UnexpectedIndent(_)) => {
                Some("Indentation must match an enclosing block.".to_string())
            }
            InnerError::Parse(ParseError::ExpectedIndentedBlock(_)) => {
                Some("A line ending with `:` must be followed by an indented block.".to_string())
            }
            InnerError::Parse(ParseError::InvalidTarget(_)) => {
                Some("Only names, subscripts, tuples and lists can be assigned to.".to_string())
            }
            InnerError::Runtime(RuntimeError::NameError(_, name)) => {
                Some(format!("'{name}' is not defined. Did you forget to assign it?"))
            }
            InnerError::Runtime(RuntimeError::ZeroDivision(_)) => {
                Some("Division by zero is not allowed.".to_string())
            }
            InnerError::Runtime(RuntimeError::RecursionError(depth)) => Some(format!(
                "Calls nested deeper than {depth} levels. Check for unbounded recursion."
            )),
            InnerError::Runtime(RuntimeError::Template(err)) => Some(format!(
                "The template handler has no replacement for '{}' in section '{}'.",
                err.matched, err.section
            )),
            _ => None,
        };

        msg.map(|m| Box::new(m) as Box<dyn std::fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(
            miette::LabeledSpan::new_with_span(Some(format!("{}", self.cause)), self.location),
        )))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Position, Token, TokenKind};
    use rstest::rstest;

    #[test]
    fn test_from_error_points_at_token() {
        let token = Token {
            range: Range::new(Position::new(2, 5), Position::new(2, 7)),
            kind: TokenKind::Ident("ab".into()),
        };
        let error = Error::from_error("x = 1\ny = ab\n", ParseError::UnexpectedToken(token));

        assert_eq!(error.location.offset(), 10);
        assert_eq!(error.location.len(), 2);
    }

    #[test]
    fn test_from_error_without_range() {
        let error = Error::from_error("x", RuntimeError::RecursionError(8));

        assert_eq!(error.location.offset(), 0);
        assert_eq!(error.location.len(), 1);
    }

    #[rstest]
    #[case::lexer(InnerError::Lexer(LexerError::UnterminatedString(Range::default())), "LexerError::UnterminatedString")]
    #[case::runtime(InnerError::Runtime(RuntimeError::ZeroDivision(Range::default())), "RuntimeError::ZeroDivision")]
    fn test_diagnostic_code(#[case] cause: InnerError, #[case] expected: &str) {
        let error = Error::from_error("x", cause);
        assert_eq!(error.code().map(|c| c.to_string()), Some(expected.to_string()));
    }
}
