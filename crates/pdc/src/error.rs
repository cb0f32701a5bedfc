use miette::Diagnostic;
use pdc_lang::{RuntimeError, TemplateError};
use thiserror::Error;

/// A comment that looks like a directive but cannot be one.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq)]
pub enum DirectiveError {
    #[error("Unrecognized directive on line {line}: {text}")]
    #[diagnostic(
        code(pdc::directive::unrecognized),
        help("Known tags are Function, Start, End, Verbatim, VerbatimLine, TemplateCode, Replace, Kill, KillIf and KillLine.")
    )]
    Unrecognized { line: u32, text: String },
    #[error("Directive on line {line} must be on its own line: {text}")]
    #[diagnostic(
        code(pdc::directive::inline),
        help("Move the directive to a comment line above the statement it applies to.")
    )]
    Inline { line: u32, text: String },
}

/// Directives that are individually valid but do not nest or attach correctly.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq)]
pub enum StructureError {
    #[error("End directive ('{end}', line {end_line}) does not match start directive ('{start}', line {start_line})")]
    #[diagnostic(code(pdc::structure::mismatched_end))]
    MismatchedEnd {
        end: String,
        end_line: u32,
        start: String,
        start_line: u32,
    },
    #[error("End directive ('{name}', line {line}) has no matching start directive")]
    #[diagnostic(code(pdc::structure::unmatched_end))]
    UnmatchedEnd { name: String, line: u32 },
    #[error("Section {name} started on line {line} but never ended")]
    #[diagnostic(
        code(pdc::structure::unclosed),
        help("Add `# PDC-End {name}` in the same block as the start directive.")
    )]
    Unclosed { name: String, line: u32 },
    #[error("Line directive on line {line} is not followed by a statement")]
    #[diagnostic(code(pdc::structure::dangling_line_directive))]
    DanglingLineDirective { line: u32 },
    #[error("Line directive on line {line} is followed by the section starting on line {section_line}")]
    #[diagnostic(
        code(pdc::structure::line_directive_before_section),
        help("Line directives apply to the next statement, not to a section.")
    )]
    LineDirectiveBeforeSection { line: u32, section_line: u32 },
    #[error("Section directive on line {line} is outside of any section")]
    #[diagnostic(code(pdc::structure::attachment_outside_section))]
    AttachmentOutsideSection { line: u32 },
    #[error("Replace directive on line {line} is in a section without TemplateCode")]
    #[diagnostic(code(pdc::structure::replace_without_template))]
    ReplaceWithoutTemplate { line: u32 },
    #[error("Replace directive on line {line} has an empty pattern")]
    #[diagnostic(code(pdc::structure::empty_pattern))]
    EmptyPattern { line: u32 },
    #[error("Node is not a section")]
    #[diagnostic(code(pdc::structure::not_a_section))]
    NotASection,
    #[error("KillIf directive on line {line} has an invalid condition: {condition}")]
    #[diagnostic(code(pdc::structure::invalid_condition))]
    InvalidCondition { line: u32, condition: String },
}

/// Invalid builder configuration, reported by `build()`.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Cannot recalculate with both a hash function and a compare function")]
    #[diagnostic(
        code(pdc::config::conflicting_recalculation),
        help("Configure at most one of `hash` and `compare`.")
    )]
    ConflictingRecalculation,
    #[error("A template handler is required")]
    #[diagnostic(code(pdc::config::missing_template_handler))]
    MissingTemplateHandler,
}

#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Directive(#[from] DirectiveError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Structure(#[from] StructureError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(pdc_lang::Error),
    #[error(transparent)]
    #[diagnostic(code(pdc::template))]
    Template(TemplateError),
    #[error(transparent)]
    #[diagnostic(code(pdc::runtime))]
    Runtime(RuntimeError),
    #[error("Cannot retrieve source: {0}")]
    #[diagnostic(code(pdc::source))]
    Source(String),
    #[error("Generated code does not compile: {cause}")]
    #[diagnostic(code(pdc::generated_code), help("Generated code:\n{code}"))]
    GeneratedCode {
        code: String,
        cause: Box<pdc_lang::Error>,
    },
}

impl From<Box<pdc_lang::Error>> for Error {
    fn from(err: Box<pdc_lang::Error>) -> Self {
        Error::Parse(*err)
    }
}

impl From<RuntimeError> for Error {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Template(err) => Error::Template(err),
            err => Error::Runtime(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::unrecognized(
        Error::from(DirectiveError::Unrecognized { line: 3, text: "# PDC-Verbatm".into() }),
        "pdc::directive::unrecognized"
    )]
    #[case::unclosed(
        Error::from(StructureError::Unclosed { name: "a".into(), line: 2 }),
        "pdc::structure::unclosed"
    )]
    #[case::config(Error::from(ConfigError::ConflictingRecalculation), "pdc::config::conflicting_recalculation")]
    #[case::template(
        Error::from(RuntimeError::Template(TemplateError::new("s", "X", "no"))),
        "pdc::template"
    )]
    fn test_diagnostic_code(#[case] error: Error, #[case] expected: &str) {
        assert_eq!(error.code().map(|c| c.to_string()), Some(expected.to_string()));
    }

    #[test]
    fn test_mismatched_end_message() {
        let err = StructureError::MismatchedEnd {
            end: "b".into(),
            end_line: 5,
            start: "a".into(),
            start_line: 2,
        };
        assert_eq!(
            err.to_string(),
            "End directive ('b', line 5) does not match start directive ('a', line 2)"
        );
    }

    #[test]
    fn test_template_error_is_unwrapped() {
        let err = Error::from(RuntimeError::Template(TemplateError::new("s", "X", "no")));
        assert!(matches!(err, Error::Template(e) if e == TemplateError::new("s", "X", "no")));
    }
}
