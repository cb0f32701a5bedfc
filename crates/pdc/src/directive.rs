use std::fmt::{self, Display, Formatter};

use crate::error::DirectiveError;

/// Every directive comment starts with this.
pub const PREFIX: &str = "# PDC-";

/// Section name of the open-ended group started by `Function`.
pub const FUNCTION_SECTION: &str = "__pdc_function";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Function,
    Start,
    End,
    VerbatimLine,
    Verbatim,
    TemplateCode,
    Replace,
    KillIf,
    KillLine,
    Kill,
}

/// How a directive takes part in section structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveClass {
    GroupStart,
    GroupEnd,
    SectionAttachment,
    LineDirective,
}

impl DirectiveKind {
    /// Tags are tried in this order; longer tags sharing a stem come first.
    pub const REGISTRY: [DirectiveKind; 10] = [
        DirectiveKind::Function,
        DirectiveKind::Start,
        DirectiveKind::End,
        DirectiveKind::VerbatimLine,
        DirectiveKind::Verbatim,
        DirectiveKind::TemplateCode,
        DirectiveKind::Replace,
        DirectiveKind::KillIf,
        DirectiveKind::KillLine,
        DirectiveKind::Kill,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            DirectiveKind::Function => "Function",
            DirectiveKind::Start => "Start",
            DirectiveKind::End => "End",
            DirectiveKind::VerbatimLine => "VerbatimLine",
            DirectiveKind::Verbatim => "Verbatim",
            DirectiveKind::TemplateCode => "TemplateCode",
            DirectiveKind::Replace => "Replace",
            DirectiveKind::KillIf => "KillIf",
            DirectiveKind::KillLine => "KillLine",
            DirectiveKind::Kill => "Kill",
        }
    }

    pub fn class(&self) -> DirectiveClass {
        match self {
            DirectiveKind::Function | DirectiveKind::Start => DirectiveClass::GroupStart,
            DirectiveKind::End => DirectiveClass::GroupEnd,
            DirectiveKind::VerbatimLine | DirectiveKind::KillLine => DirectiveClass::LineDirective,
            DirectiveKind::Verbatim
            | DirectiveKind::TemplateCode
            | DirectiveKind::Replace
            | DirectiveKind::KillIf
            | DirectiveKind::Kill => DirectiveClass::SectionAttachment,
        }
    }

    pub fn requires_end_tag(&self) -> bool {
        matches!(self, DirectiveKind::Start)
    }

    pub fn is_end_tag(&self) -> bool {
        matches!(self, DirectiveKind::End)
    }

    fn match_tag<'a>(&self, rest: &'a str) -> Option<&'a str> {
        let tag = self.tag();
        if rest == tag {
            Some("")
        } else {
            rest.strip_prefix(tag)?.strip_prefix(' ')
        }
    }
}

impl Display for DirectiveKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A comment as seen by the directive parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentLine<'a> {
    /// The comment text starting at `#`.
    pub text: &'a str,
    pub line: u32,
    /// Zero-based column of the `#`.
    pub indent: usize,
}

impl<'a> CommentLine<'a> {
    pub fn new(text: &'a str, line: u32, indent: usize) -> Self {
        Self { text, line, indent }
    }

    pub fn is_directive_like(&self) -> bool {
        self.text.starts_with(PREFIX)
    }
}

/// One parsed directive, possibly spanning several comment lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub start_line: u32,
    pub end_line: u32,
    /// Text after the tag. Continuation lines are joined with `\n`.
    pub instruction_input: String,
    pub indent: usize,
}

impl Directive {
    /// Parses a comment. `Ok(None)` means it is an ordinary comment.
    pub fn parse(comment: &CommentLine) -> Result<Option<Directive>, DirectiveError> {
        let text = comment.text.trim_end();
        let Some(rest) = text.strip_prefix(PREFIX) else {
            return Ok(None);
        };

        DirectiveKind::REGISTRY
            .iter()
            .find_map(|kind| {
                kind.match_tag(rest).map(|input| Directive {
                    kind: *kind,
                    start_line: comment.line,
                    end_line: comment.line,
                    instruction_input: input.to_string(),
                    indent: comment.indent,
                })
            })
            .map(Some)
            .ok_or_else(|| DirectiveError::Unrecognized {
                line: comment.line,
                text: text.to_string(),
            })
    }

    /// Appends `comment` as a continuation line if it directly follows this
    /// directive and is aligned with the text after the tag.
    pub fn absorb_continuation(&mut self, comment: &CommentLine) -> bool {
        if comment.line != self.end_line + 1 || comment.indent != self.indent {
            return false;
        }

        let width = PREFIX.len() + self.kind.tag().len();
        let Some(body) = comment.text.trim_end().strip_prefix('#') else {
            return false;
        };
        let content = match body.get(..width) {
            Some(pad) if pad.chars().all(|c| c == ' ') => &body[width..],
            _ => return false,
        };
        if content.is_empty() {
            return false;
        }

        self.instruction_input.push('\n');
        self.instruction_input.push_str(content);
        self.end_line = comment.line;
        true
    }

    pub fn class(&self) -> DirectiveClass {
        self.kind.class()
    }

    /// The name used to pair `Start` with `End`. Empty for other kinds.
    pub fn section_name(&self) -> &str {
        match self.kind {
            DirectiveKind::Function => FUNCTION_SECTION,
            DirectiveKind::Start | DirectiveKind::End => self.instruction_input.trim(),
            _ => "",
        }
    }

    pub fn requires_end_tag(&self) -> bool {
        self.kind.requires_end_tag()
    }

    pub fn is_end_tag(&self) -> bool {
        self.kind.is_end_tag()
    }
}

impl Display for Directive {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", PREFIX, self.kind)?;
        if !self.instruction_input.is_empty() {
            write!(f, " {}", self.instruction_input.replace('\n', " "))?;
        }
        Ok(())
    }
}

/// Scans raw source for directives without building a tree.
///
/// Only comments that are alone on their line are considered.
pub fn find_directives(text: &str) -> Result<Vec<Directive>, DirectiveError> {
    let mut directives: Vec<Directive> = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        if !trimmed.starts_with('#') {
            continue;
        }

        let comment = CommentLine::new(trimmed, index as u32 + 1, line.len() - trimmed.len());
        if let Some(last) = directives.last_mut()
            && last.absorb_continuation(&comment)
        {
            continue;
        }
        if let Some(directive) = Directive::parse(&comment)? {
            directives.push(directive);
        }
    }

    Ok(directives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::function("# PDC-Function", DirectiveKind::Function, "")]
    #[case::start("# PDC-Start section 1", DirectiveKind::Start, "section 1")]
    #[case::end("# PDC-End section 1", DirectiveKind::End, "section 1")]
    #[case::verbatim_line("# PDC-VerbatimLine", DirectiveKind::VerbatimLine, "")]
    #[case::verbatim("# PDC-Verbatim", DirectiveKind::Verbatim, "")]
    #[case::replace("# PDC-Replace NAME", DirectiveKind::Replace, "NAME")]
    #[case::kill_if("# PDC-KillIf x > 1", DirectiveKind::KillIf, "x > 1")]
    #[case::kill_line("# PDC-KillLine", DirectiveKind::KillLine, "")]
    #[case::kill("# PDC-Kill  ", DirectiveKind::Kill, "")]
    fn test_parse(#[case] text: &str, #[case] kind: DirectiveKind, #[case] input: &str) {
        let directive = Directive::parse(&CommentLine::new(text, 4, 8)).unwrap().unwrap();

        assert_eq!(directive.kind, kind);
        assert_eq!(directive.instruction_input, input);
        assert_eq!((directive.start_line, directive.end_line, directive.indent), (4, 4, 8));
    }

    #[rstest]
    #[case::plain("# just a note")]
    #[case::no_space("#PDC-Verbatim")]
    fn test_parse_ordinary_comment(#[case] text: &str) {
        assert_eq!(Directive::parse(&CommentLine::new(text, 1, 0)), Ok(None));
    }

    #[rstest]
    #[case::typo("# PDC-Verbatm")]
    #[case::glued("# PDC-Killx")]
    #[case::empty("# PDC-")]
    fn test_parse_unrecognized(#[case] text: &str) {
        assert_eq!(
            Directive::parse(&CommentLine::new(text, 7, 0)),
            Err(DirectiveError::Unrecognized {
                line: 7,
                text: text.to_string()
            })
        );
    }

    #[rstest]
    #[case::aligned("#             more", 3, 4, true)]
    #[case::gap("#             more", 4, 4, false)]
    #[case::indent("#             more", 3, 0, false)]
    #[case::misaligned("#            more", 3, 4, false)]
    #[case::blank("#              ", 3, 4, false)]
    fn test_continuation(#[case] text: &str, #[case] line: u32, #[case] indent: usize, #[case] absorbed: bool) {
        let mut directive = Directive::parse(&CommentLine::new("# PDC-Replace A", 2, 4))
            .unwrap()
            .unwrap();

        assert_eq!(directive.absorb_continuation(&CommentLine::new(text, line, indent)), absorbed);
        if absorbed {
            assert_eq!(directive.instruction_input, "A\nmore");
            assert_eq!(directive.end_line, 3);
        } else {
            assert_eq!(directive.instruction_input, "A");
        }
    }

    #[test]
    fn test_section_name() {
        let start = Directive::parse(&CommentLine::new("# PDC-Start  outer ", 1, 0))
            .unwrap()
            .unwrap();
        let function = Directive::parse(&CommentLine::new("# PDC-Function", 1, 0))
            .unwrap()
            .unwrap();

        assert_eq!(start.section_name(), "outer");
        assert_eq!(function.section_name(), FUNCTION_SECTION);
        assert!(start.requires_end_tag());
        assert!(!function.requires_end_tag());
    }

    #[test]
    fn test_find_directives() {
        let text = "def f(x):\n    # PDC-Function\n    # PDC-KillIf x and\n    #            not x\n    y = 1  # PDC-Kill\n    # note\n";
        let directives = find_directives(text).unwrap();

        assert_eq!(directives.len(), 2);
        assert_eq!(directives[1].kind, DirectiveKind::KillIf);
        assert_eq!(directives[1].instruction_input, "x and\nnot x");
        assert_eq!((directives[1].start_line, directives[1].end_line), (3, 4));
    }
}
