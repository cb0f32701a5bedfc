use std::path::PathBuf;

use pdc_lang::{Args, Function, Namespace, RuntimeValue};

use crate::Error;

/// Where the annotated routine comes from.
#[derive(Debug, Clone)]
pub enum Source {
    Text(String),
    Lines(Vec<String>),
    /// A live function, or a partial wrapping one.
    Routine(RuntimeValue),
}

/// Source text plus what is known about its origin.
#[derive(Debug, Clone, Default)]
pub struct Acquired {
    pub text: String,
    pub namespace: Option<Namespace>,
    pub file: Option<PathBuf>,
    /// Arguments bound by a partial, prepended to every call.
    pub bound: Args,
}

impl Source {
    pub fn acquire(&self) -> Result<Acquired, Error> {
        match self {
            Source::Text(text) => Ok(Acquired {
                text: text.clone(),
                ..Acquired::default()
            }),
            Source::Lines(lines) => Ok(Acquired {
                text: lines.join("\n"),
                ..Acquired::default()
            }),
            Source::Routine(RuntimeValue::Function(function)) => Ok(Acquired {
                text: routine_text(function),
                namespace: function.namespace(),
                file: function.file(),
                bound: Args::default(),
            }),
            Source::Routine(RuntimeValue::Partial(partial)) => match partial.target() {
                RuntimeValue::Function(function) => Ok(Acquired {
                    text: routine_text(function),
                    namespace: function.namespace(),
                    file: function.file(),
                    bound: partial.bound_args(),
                }),
                other => Err(Error::Source(format!(
                    "partial wraps a {} which has no source",
                    other.type_name()
                ))),
            },
            Source::Routine(other) => Err(Error::Source(format!("a {} has no source", other.type_name()))),
        }
    }
}

/// The definition's lines, dedented and preceded by blank lines so that line
/// numbers match the original file.
fn routine_text(function: &Function) -> String {
    let (lines, start) = function.source_lines();
    let indent = lines
        .first()
        .map_or(0, |line| line.len() - line.trim_start_matches(' ').len());

    let mut text = "\n".repeat(start.saturating_sub(1) as usize);
    text.push_str(
        &lines
            .iter()
            .map(|line| {
                let spaces = line.len() - line.trim_start_matches(' ').len();
                &line[spaces.min(indent)..]
            })
            .collect::<Vec<_>>()
            .join("\n"),
    );
    text
}

impl From<&str> for Source {
    fn from(text: &str) -> Self {
        Source::Text(text.to_string())
    }
}

impl From<String> for Source {
    fn from(text: String) -> Self {
        Source::Text(text)
    }
}

impl From<Vec<String>> for Source {
    fn from(lines: Vec<String>) -> Self {
        Source::Lines(lines)
    }
}

impl From<RuntimeValue> for Source {
    fn from(routine: RuntimeValue) -> Self {
        Source::Routine(routine)
    }
}
