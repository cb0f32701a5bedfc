use pdc_lang::{AstArg, AstExpr, BinaryOp};
use smallvec::smallvec;

use crate::{
    directive::{Directive, DirectiveKind},
    error::StructureError,
    section::Section,
    writer::{Fragment, Fragments, RuleContext},
};

/// What a directive does to the statements it applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Verbatim,
    VerbatimLine,
    Template { section: String, patterns: Vec<String> },
    Kill,
    KillLine,
    KillIf { condition: AstExpr },
}

impl Rule {
    /// Rules declared directly in `section`, in declaration order.
    ///
    /// `Replace` directives do not produce rules of their own; they become the
    /// patterns of the section's template rule.
    pub fn for_section(section: &Section) -> Result<Vec<Rule>, StructureError> {
        section
            .attachments
            .iter()
            .filter_map(|directive| match directive.kind {
                DirectiveKind::Verbatim => Some(Ok(Rule::Verbatim)),
                DirectiveKind::TemplateCode => Some(Ok(Rule::Template {
                    section: section.name.clone(),
                    patterns: section.patterns(),
                })),
                DirectiveKind::Kill => Some(Ok(Rule::Kill)),
                DirectiveKind::KillIf => Some(condition(directive).map(|condition| Rule::KillIf { condition })),
                _ => None,
            })
            .collect()
    }

    /// The rule for a line directive, if it is one.
    pub fn for_line(directive: &Directive) -> Option<Rule> {
        match directive.kind {
            DirectiveKind::VerbatimLine => Some(Rule::VerbatimLine),
            DirectiveKind::KillLine => Some(Rule::KillLine),
            _ => None,
        }
    }

    /// Whether the rule adds text to the generated code.
    pub fn is_emitting(&self) -> bool {
        matches!(self, Rule::Verbatim | Rule::VerbatimLine | Rule::Template { .. })
    }

    /// Lets this more specific rule rewrite the rules it is added on top of.
    ///
    /// Kills and emitting rules both retire inherited emitting rules, so a statement
    /// is emitted at most once and a narrower kill always wins.
    pub fn update_rules(&self, existing: &mut Vec<Rule>) {
        match self {
            Rule::Kill | Rule::KillLine | Rule::Verbatim | Rule::VerbatimLine | Rule::Template { .. } => {
                existing.retain(|rule| !rule.is_emitting());
            }
            Rule::KillIf { .. } => {}
        }
    }

    pub fn run_rule(&self, context: &RuleContext, fragments: Fragments) -> Fragments {
        match self {
            Rule::Kill | Rule::KillLine => Fragments::new(),
            Rule::KillIf { condition } => smallvec![Fragment::Guard {
                condition: condition.clone(),
                body: fragments.into_vec(),
            }],
            Rule::Verbatim | Rule::VerbatimLine | Rule::Template { .. } => emit(self, context, fragments),
        }
    }

    /// The expression an emitting rule yields for `text`.
    pub fn text_expr(&self, context: &RuleContext, text: &str) -> AstExpr {
        match self {
            Rule::Template { section, patterns } => template_expr(text, section, patterns, context.template_fn),
            _ => AstExpr::str(text),
        }
    }
}

fn condition(directive: &Directive) -> Result<AstExpr, StructureError> {
    let source = directive.instruction_input.replace('\n', " ");
    pdc_lang::parse_expr(&source).map_err(|_| StructureError::InvalidCondition {
        line: directive.start_line,
        condition: source.clone(),
    })
}

/// Keeps each statement and adds an emit of its text after it.
///
/// A compound statement with directives in its body is emitted piecewise, so
/// those directives still apply to the statements they precede.
fn emit(rule: &Rule, context: &RuleContext, fragments: Fragments) -> Fragments {
    fragments
        .into_iter()
        .flat_map(|fragment| -> Fragments {
            match fragment {
                Fragment::Original { id, covered: false } if context.is_piecewise(id) => smallvec![
                    Fragment::Original { id, covered: true },
                    Fragment::Piecewise { id, rule: rule.clone() }
                ],
                Fragment::Original { id, covered: false } => smallvec![
                    Fragment::Original { id, covered: true },
                    Fragment::Emit(rule.text_expr(context, &context.statement_text(id)))
                ],
                Fragment::Guard { condition, body } => smallvec![Fragment::Guard {
                    condition,
                    body: emit(rule, context, Fragments::from_vec(body)).into_vec(),
                }],
                other => smallvec![other],
            }
        })
        .collect()
}

/// Builds `'lit' + handler('section', 'pattern', locals()) + 'lit'` for `text`.
///
/// Matches are taken leftmost first; at equal positions the pattern declared first wins.
pub fn template_expr(text: &str, section: &str, patterns: &[String], handler: &str) -> AstExpr {
    let mut parts = Vec::new();
    let mut rest = text;

    loop {
        let found = patterns
            .iter()
            .filter(|pattern| !pattern.is_empty())
            .filter_map(|pattern| rest.find(pattern.as_str()).map(|pos| (pos, pattern)))
            .min_by_key(|(pos, _)| *pos);

        let Some((pos, pattern)) = found else {
            if !rest.is_empty() || parts.is_empty() {
                parts.push(AstExpr::str(rest));
            }
            break;
        };

        if pos > 0 {
            parts.push(AstExpr::str(&rest[..pos]));
        }
        parts.push(AstExpr::call(
            AstExpr::name(handler),
            vec![
                AstArg::Positional(AstExpr::str(section)),
                AstArg::Positional(AstExpr::str(pattern)),
                AstArg::Positional(AstExpr::call(AstExpr::name("locals"), Vec::new())),
            ],
        ));
        rest = &rest[pos + pattern.len()..];
    }

    parts
        .into_iter()
        .reduce(|left, right| AstExpr::binary(BinaryOp::Add, left, right))
        .unwrap_or_else(|| AstExpr::str(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdc_lang::render_expr;
    use rstest::rstest;

    #[rstest]
    #[case::single("x = A", &["A"], "'x = ' + t('s', 'A', locals())")]
    #[case::repeated("A + A", &["A"], "t('s', 'A', locals()) + ' + ' + t('s', 'A', locals())")]
    #[case::leftmost("B A", &["A", "B"], "t('s', 'B', locals()) + ' ' + t('s', 'A', locals())")]
    #[case::declaration_order("AB", &["A", "AB"], "t('s', 'A', locals()) + 'B'")]
    #[case::no_match("x = 1", &["A"], "'x = 1'")]
    fn test_template_expr(#[case] text: &str, #[case] patterns: &[&str], #[case] expected: &str) {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        assert_eq!(render_expr(&template_expr(text, "s", &patterns, "t")), expected);
    }

    #[rstest]
    #[case::kill_clears_verbatim(Rule::Kill, vec![Rule::Verbatim], vec![])]
    #[case::kill_line_clears_template(
        Rule::KillLine,
        vec![Rule::Template { section: "s".into(), patterns: vec![] }, Rule::Kill],
        vec![Rule::Kill]
    )]
    #[case::verbatim_replaces_template(
        Rule::VerbatimLine,
        vec![Rule::Template { section: "s".into(), patterns: vec![] }],
        vec![]
    )]
    #[case::kill_if_keeps_everything(
        Rule::KillIf { condition: pdc_lang::parse_expr("x").unwrap() },
        vec![Rule::Verbatim],
        vec![Rule::Verbatim]
    )]
    fn test_update_rules(#[case] rule: Rule, #[case] mut existing: Vec<Rule>, #[case] expected: Vec<Rule>) {
        rule.update_rules(&mut existing);
        assert_eq!(existing, expected);
    }
}
