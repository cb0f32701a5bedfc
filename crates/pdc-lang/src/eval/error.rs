use thiserror::Error;

use crate::range::Range;

/// Raised by a template callback when it cannot produce a replacement.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Template substitution failed in section \"{section}\" for \"{matched}\": {message}")]
pub struct TemplateError {
    pub section: String,
    pub matched: String,
    pub message: String,
}

impl TemplateError {
    pub fn new(section: &str, matched: &str, message: impl Into<String>) -> Self {
        Self {
            section: section.to_string(),
            matched: matched.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Name \"{1}\" is not defined")]
    NameError(Range, String),
    #[error("{1}")]
    TypeError(Range, String),
    #[error("{1}")]
    ValueError(Range, String),
    #[error("\"{1}\" object has no attribute \"{2}\"")]
    AttributeError(Range, String, String),
    #[error("Index out of range")]
    IndexError(Range),
    #[error("Key {1} not found")]
    KeyError(Range, String),
    #[error("Division by zero")]
    ZeroDivision(Range),
    #[error("Integer overflow")]
    Overflow(Range),
    #[error("Maximum recursion depth exceeded ({0})")]
    RecursionError(u32),
    #[error("\"{1}\" outside function")]
    OutsideFunction(Range, &'static str),
    #[error("\"{1}\" outside loop")]
    OutsideLoop(Range, &'static str),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("{0}")]
    Native(String),
}

impl RuntimeError {
    #[cold]
    pub fn range(&self) -> Option<Range> {
        match self {
            RuntimeError::NameError(range, _)
            | RuntimeError::TypeError(range, _)
            | RuntimeError::ValueError(range, _)
            | RuntimeError::AttributeError(range, _, _)
            | RuntimeError::IndexError(range)
            | RuntimeError::KeyError(range, _)
            | RuntimeError::ZeroDivision(range)
            | RuntimeError::Overflow(range)
            | RuntimeError::OutsideFunction(range, _)
            | RuntimeError::OutsideLoop(range, _) => Some(*range),
            RuntimeError::RecursionError(_)
            | RuntimeError::Template(_)
            | RuntimeError::Native(_) => None,
        }
    }
}
