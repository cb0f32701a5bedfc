use itertools::Itertools;
use pdc_lang::{AstExpr, AstExprKind, AstNode, AstNodeKind, Block, NodeId, Range, Tree, UnaryOp, source_segment};
use smallvec::{SmallVec, smallvec};

use crate::{
    Error,
    annotate::{ANode, ANodeId, AnnotatedTree},
    directive::{Directive, DirectiveClass},
    error::StructureError,
    rule::Rule,
    section::Section,
};

/// One piece of conversion output produced by the rules for a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// The source statement itself. `covered` once its text has been emitted.
    Original { id: ANodeId, covered: bool },
    /// `yield <expr>`
    Emit(AstExpr),
    /// `if not (<condition>): <body>`
    Guard { condition: AstExpr, body: Vec<Fragment> },
    /// Emits a compound statement's headers under `rule` and its body statements under their own rules.
    Piecewise { id: ANodeId, rule: Rule },
}

pub type Fragments = SmallVec<[Fragment; 2]>;

/// What a rule needs to know about the statement it runs on.
pub struct RuleContext<'a> {
    tree: &'a AnnotatedTree,
    source: &'a str,
    pub template_fn: &'a str,
    emit_base: usize,
}

impl RuleContext<'_> {
    /// The original text of a statement, re-indented relative to the emit base.
    pub fn statement_text(&self, id: ANodeId) -> String {
        let ANode::Statement { node, .. } = &self.tree.arena[id] else {
            return String::new();
        };
        let range = self.tree.host[*node].range;
        let Some(segment) = source_segment(self.source, &range) else {
            return pdc_lang::render_node(&self.tree.host, *node, 0);
        };
        self.reindent(&segment, range.indent())
    }

    /// Whether `id` is a compound statement whose body carries directives.
    pub fn is_piecewise(&self, id: ANodeId) -> bool {
        match &self.tree.arena[id] {
            ANode::Statement { blocks, .. } => blocks.iter().any(|block| self.tree.has_directives(block)),
            _ => false,
        }
    }

    /// The header that opens `blocks[index]` of the compound statement `node`.
    ///
    /// `elif` branches carry their own header and have none here.
    fn header(&self, node: NodeId, blocks: &[Vec<ANodeId>], index: usize) -> Option<Header> {
        let first = *blocks.get(index)?.first()?;
        if index > 0 && self.is_elif(blocks[index].as_slice()) {
            return None;
        }

        let range = self.tree.host[node].range;
        let indent = range.indent();
        let body_line = self.tree.first_line(first);
        let lines = self.source.split('\n').collect::<Vec<_>>();
        let line = |number: u32| lines.get(number.checked_sub(1)? as usize).copied();

        let start = if index == 0 {
            range.start.line
        } else {
            (range.start.line + 1..=body_line).rev().find(|number| {
                line(*number).is_some_and(|text| {
                    let keyword = text.trim_start();
                    keyword.starts_with("else") && text.len() - keyword.len() == indent
                })
            })?
        };
        if start == body_line {
            return line(start).map(|text| Header::Inline(self.reindent(strip_indent(text, indent), indent)));
        }

        let text = (start..body_line)
            .filter_map(line)
            .enumerate()
            .map(|(i, text)| if i == 0 { strip_indent(text, indent) } else { text })
            .join("\n");
        Some(Header::Lines(self.reindent(text.trim_end(), indent)))
    }

    fn is_elif(&self, block: &[ANodeId]) -> bool {
        match block {
            [only] => match &self.tree.arena[*only] {
                ANode::Statement { node, .. } => {
                    matches!(self.tree.host[*node].kind, AstNodeKind::If { is_elif: true, .. })
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Moves `text`, which starts at column `indent`, to its place relative to the emit base.
    ///
    /// Lines inside a string literal are part of its value and stay as they are.
    fn reindent(&self, text: &str, indent: usize) -> String {
        let prefix = " ".repeat(indent.saturating_sub(self.emit_base));
        let literal = pdc_lang::string_continuation_lines(text);
        text.split('\n')
            .enumerate()
            .map(|(i, line)| {
                if literal.contains(&(i as u32 + 1)) {
                    line.to_string()
                } else if i == 0 {
                    format!("{prefix}{line}")
                } else {
                    format!("{prefix}{}", strip_indent(line, indent))
                }
            })
            .join("\n")
    }
}

/// The opening text of one block of a compound statement.
enum Header {
    /// Header lines above an indented block.
    Lines(String),
    /// A header line that holds its whole block.
    Inline(String),
}

fn strip_indent(line: &str, width: usize) -> &str {
    let spaces = line.len() - line.trim_start_matches(' ').len();
    &line[spaces.min(width)..]
}

/// How the statements of a block reach the conversion program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Statements run and emit under their rules.
    Convert,
    /// Statements run. An enclosing statement has emitted their text.
    Covered,
    /// Statements only emit. An enclosing statement runs them.
    EmitOnly,
}

/// Rewrites an annotated block into the body of the conversion program.
pub struct ConversionWriter<'a> {
    tree: &'a AnnotatedTree,
    source: &'a str,
    template_fn: &'a str,
    out: Tree,
    section_stack: Vec<Section>,
    rule_stack: Vec<Vec<Rule>>,
    pending: Vec<Directive>,
    emit_base: usize,
}

impl<'a> ConversionWriter<'a> {
    /// `source` is the text `tree` was parsed from; `template_fn` is the name the
    /// generated code calls for template substitutions.
    pub fn new(tree: &'a AnnotatedTree, source: &'a str, template_fn: &'a str) -> Self {
        Self {
            tree,
            source,
            template_fn,
            out: Tree::new(),
            section_stack: Vec::new(),
            rule_stack: vec![Vec::new()],
            pending: Vec::new(),
            emit_base: 0,
        }
    }

    /// Converts `block`. The returned tree's body holds the converted statements.
    pub fn write(mut self, block: &[ANodeId]) -> Result<Tree, Error> {
        self.emit_base = block.first().map_or(0, |id| self.tree.indent_of(*id));
        let body = self.visit_block(block, Mode::Convert)?;
        self.out.body = body;
        Ok(self.out)
    }

    fn current_rules(&self) -> &[Rule] {
        self.rule_stack.last().map(Vec::as_slice).unwrap_or_default()
    }

    fn context(&self) -> RuleContext<'a> {
        RuleContext {
            tree: self.tree,
            source: self.source,
            template_fn: self.template_fn,
            emit_base: self.emit_base,
        }
    }

    fn visit_block(&mut self, block: &[ANodeId], mode: Mode) -> Result<Block, Error> {
        let mut out = Vec::with_capacity(block.len());
        for id in block {
            self.visit(*id, mode, &mut out)?;
        }

        match self.pending.first() {
            Some(first) => Err(StructureError::DanglingLineDirective {
                line: first.start_line,
            }
            .into()),
            None => Ok(out),
        }
    }

    fn visit(&mut self, id: ANodeId, mode: Mode, out: &mut Block) -> Result<(), Error> {
        let tree = self.tree;
        match &tree.arena[id] {
            ANode::Group { body } => self.visit_group(id, body, mode, out),
            ANode::Directive { directive, .. } => match directive.class() {
                DirectiveClass::LineDirective => {
                    self.pending.push(directive.clone());
                    Ok(())
                }
                DirectiveClass::SectionAttachment if self.section_stack.is_empty() => {
                    Err(StructureError::AttachmentOutsideSection {
                        line: directive.start_line,
                    }
                    .into())
                }
                _ => Ok(()),
            },
            ANode::Comment { .. } if mode == Mode::EmitOnly => Ok(()),
            ANode::Comment { node } => {
                out.push(self.out.import(&tree.host, *node));
                Ok(())
            }
            ANode::Statement { .. } => self.visit_statement(id, mode, out),
        }
    }

    fn visit_group(&mut self, id: ANodeId, body: &[ANodeId], mode: Mode, out: &mut Block) -> Result<(), Error> {
        let section = Section::derive_shallow(self.tree, id)?;
        if let Some(first) = self.pending.first() {
            return Err(StructureError::LineDirectiveBeforeSection {
                line: first.start_line,
                section_line: section.start_line(),
            }
            .into());
        }

        let mut rules = self.current_rules().to_vec();
        for rule in Rule::for_section(&section)? {
            rule.update_rules(&mut rules);
            rules.push(rule);
        }

        // Emitted text stays relative to the enclosing statement when only emitting.
        let base = match mode {
            Mode::EmitOnly => self.emit_base,
            Mode::Convert | Mode::Covered => section.start.indent,
        };
        let saved_base = std::mem::replace(&mut self.emit_base, base);
        tracing::trace!(section = %section.name, rules = rules.len(), ?mode, "enter section");
        self.rule_stack.push(rules);
        self.section_stack.push(section);

        let result = body[1..]
            .iter()
            .try_for_each(|member| self.visit(*member, mode, out));

        self.section_stack.pop();
        self.rule_stack.pop();
        self.emit_base = saved_base;
        result?;

        match self.pending.first() {
            Some(first) => Err(StructureError::DanglingLineDirective {
                line: first.start_line,
            }
            .into()),
            None => Ok(()),
        }
    }

    fn visit_statement(&mut self, id: ANodeId, mode: Mode, out: &mut Block) -> Result<(), Error> {
        let mut rules = self.current_rules().to_vec();
        for directive in std::mem::take(&mut self.pending) {
            if let Some(rule) = Rule::for_line(&directive) {
                rule.update_rules(&mut rules);
                rules.push(rule);
            }
        }
        if mode == Mode::Covered {
            rules.retain(|rule| !rule.is_emitting());
        }

        let context = self.context();
        let mut fragments: Fragments = smallvec![Fragment::Original { id, covered: false }];
        for rule in &rules {
            fragments = rule.run_rule(&context, fragments);
            if fragments.is_empty() {
                break;
            }
        }

        for fragment in fragments {
            self.lower(fragment, mode, out)?;
        }
        Ok(())
    }

    /// Turns a fragment into conversion program statements.
    fn lower(&mut self, fragment: Fragment, mode: Mode, out: &mut Block) -> Result<(), Error> {
        let tree = self.tree;
        match fragment {
            Fragment::Original { .. } if mode == Mode::EmitOnly => {}
            Fragment::Original { id, covered } => {
                let ANode::Statement { node, blocks } = &tree.arena[id] else {
                    return Ok(());
                };
                let host = &tree.host[*node];
                let header_indent = host.range.indent();
                let body_mode = if covered { Mode::Covered } else { mode };

                let mut converted = Vec::with_capacity(blocks.len());
                for block in blocks {
                    let saved_base = self.emit_base;
                    if !covered && let Some(first) = block.first() {
                        // The header is not emitted, so its body takes the header's place.
                        self.emit_base += tree.indent_of(*first).saturating_sub(header_indent);
                    }
                    let result = self.visit_block(block, body_mode);
                    self.emit_base = saved_base;
                    converted.push(result?);
                }

                out.push(self.out.alloc(AstNode {
                    kind: host.kind.with_blocks(converted),
                    range: host.range,
                    comment: host.comment.clone(),
                }));
            }
            Fragment::Emit(expr) => {
                out.push(
                    self.out
                        .alloc(AstNode::new(AstNodeKind::Yield(Some(expr)), Range::default())),
                );
            }
            Fragment::Guard { condition, body } => {
                let mut guarded = Vec::with_capacity(body.len());
                for fragment in body {
                    self.lower(fragment, mode, &mut guarded)?;
                }
                let test = AstExpr::synthetic(AstExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(condition),
                });
                out.push(self.out.alloc(AstNode::new(
                    AstNodeKind::If {
                        test,
                        body: guarded,
                        orelse: Vec::new(),
                        is_elif: false,
                    },
                    Range::default(),
                )));
            }
            Fragment::Piecewise { id, rule } => {
                let ANode::Statement { node, blocks } = &tree.arena[id] else {
                    return Ok(());
                };
                let context = self.context();
                for index in 0..blocks.len() {
                    let header = context.header(*node, blocks, index);
                    if let Some(Header::Lines(text) | Header::Inline(text)) = &header {
                        let expr = rule.text_expr(&context, text);
                        self.lower(Fragment::Emit(expr), mode, out)?;
                    }
                    if matches!(header, Some(Header::Inline(_))) {
                        continue;
                    }

                    self.rule_stack.push(vec![rule.clone()]);
                    let result = self.visit_block(&blocks[index], Mode::EmitOnly);
                    self.rule_stack.pop();
                    out.extend(result?);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::annotate;
    use rstest::rstest;

    fn convert(code: &str) -> String {
        let tree = annotate(code).unwrap();
        let out = ConversionWriter::new(&tree, code, "tpl").write(&tree.body).unwrap();
        pdc_lang::render(&out)
    }

    #[rstest]
    #[case::no_directives("x = 1\ny = x", "x = 1\ny = x")]
    #[case::verbatim_line("# PDC-VerbatimLine\nprint('hi')", "print('hi')\nyield \"print('hi')\"")]
    #[case::verbatim_section(
        "# PDC-Start s\n# PDC-Verbatim\nx = 1\ny = 2\n# PDC-End s",
        "x = 1\nyield 'x = 1'\ny = 2\nyield 'y = 2'"
    )]
    #[case::kill("# PDC-Start s\n# PDC-Verbatim\n# PDC-Kill\nx = 1\n# PDC-End s\ny = 2", "y = 2")]
    #[case::kill_line(
        "# PDC-Start s\n# PDC-Verbatim\n# PDC-KillLine\nx = 1\ny = 2\n# PDC-End s",
        "y = 2\nyield 'y = 2'"
    )]
    #[case::inner_kill_overrides_outer_verbatim(
        "# PDC-Start a\n# PDC-Verbatim\nx = 1\n# PDC-Start b\n# PDC-Kill\ny = 2\n# PDC-End b\n# PDC-End a",
        "x = 1\nyield 'x = 1'"
    )]
    #[case::kill_if(
        "# PDC-Start s\n# PDC-KillIf debug\n# PDC-Verbatim\nx = 1\n# PDC-End s",
        "if not debug:\n    x = 1\n    yield 'x = 1'"
    )]
    #[case::template(
        "# PDC-Start s\n# PDC-TemplateCode\n# PDC-Replace N\nx = N\n# PDC-End s",
        "x = N\nyield 'x = ' + tpl('s', 'N', locals())"
    )]
    #[case::unrolled_loop(
        "# PDC-Start s\nfor i in range(2):\n    # PDC-VerbatimLine\n    x = i\n# PDC-End s",
        "for i in range(2):\n    x = i\n    yield 'x = i'"
    )]
    #[case::covered_compound(
        "# PDC-Start s\n# PDC-Verbatim\nif a:\n    b = 1\n# PDC-End s",
        "if a:\n    b = 1\nyield 'if a:\\n    b = 1'"
    )]
    #[case::kill_inside_covered_loop(
        "# PDC-Start outer\n# PDC-Verbatim\nfor i in xs:\n    # PDC-Start inner\n    # PDC-Kill\n    print('debug')\n    # PDC-End inner\n    print(i)\n# PDC-End outer",
        "for i in xs:\n    print(i)\nyield 'for i in xs:'\nyield '    print(i)'"
    )]
    #[case::kill_line_inside_covered_if(
        "# PDC-Start s\n# PDC-Verbatim\nif a:\n    # PDC-KillLine\n    print('debug')\n    print('keep')\n# PDC-End s",
        "if a:\n    print('keep')\nyield 'if a:'\nyield \"    print('keep')\""
    )]
    #[case::kill_if_inside_covered_if_else(
        "# PDC-Start s\n# PDC-Verbatim\nif a:\n    # PDC-Start d\n    # PDC-KillIf debug\n    print(a)\n    # PDC-End d\nelse:\n    b = 2\n# PDC-End s",
        "if a:\n    if not debug:\n        print(a)\nelse:\n    b = 2\nyield 'if a:'\nif not debug:\n    yield '    print(a)'\nyield 'else:'\nyield '    b = 2'"
    )]
    #[case::template_inside_covered_loop(
        "# PDC-Start s\n# PDC-Verbatim\nfor i in xs:\n    # PDC-Start t\n    # PDC-TemplateCode\n    # PDC-Replace N\n    x = N\n    # PDC-End t\n# PDC-End s",
        "for i in xs:\n    x = N\nyield 'for i in xs:'\nyield '    x = ' + tpl('t', 'N', locals())"
    )]
    fn test_write(#[case] code: &str, #[case] expected: &str) {
        assert_eq!(convert(code), expected);
    }

    #[rstest]
    #[case::at_base("if a:\n    print('''x\n    y''')", 4, "print('''x\n    y''')")]
    #[case::below_base("if a:\n    print('''x\n    y''')\n    z = [1,\n        2]", 0, "    print('''x\n    y''')")]
    #[case::continuation("if a:\n    z = [1,\n        2]", 0, "    z = [1,\n        2]")]
    fn test_statement_text_keeps_string_lines(#[case] code: &str, #[case] emit_base: usize, #[case] expected: &str) {
        let tree = annotate(code).unwrap();
        let ANode::Statement { blocks, .. } = &tree.arena[tree.body[0]] else {
            panic!("expected a statement");
        };
        let context = RuleContext {
            tree: &tree,
            source: code,
            template_fn: "tpl",
            emit_base,
        };

        assert_eq!(context.statement_text(blocks[0][0]), expected);
    }

    #[test]
    fn test_relative_indent() {
        let code = "def f():\n    # PDC-Function\n    for i in x:\n        # PDC-Start s\n        # PDC-Verbatim\n        y = i\n        # PDC-End s";
        let host = pdc_lang::parse(code).unwrap();
        let body = match &host[host.body[0]].kind {
            AstNodeKind::Def { body, .. } => body.clone(),
            _ => unreachable!(),
        };
        let tree = AnnotatedTree::from_block(host, body).unwrap();
        let out = ConversionWriter::new(&tree, code, "tpl").write(&tree.body).unwrap();

        assert_eq!(
            pdc_lang::render(&out),
            "for i in x:\n    y = i\n    yield 'y = i'"
        );
    }

    #[rstest]
    #[case::dangling("# PDC-KillLine", "pdc::structure::dangling_line_directive")]
    #[case::outside_section("# PDC-Verbatim\nx = 1", "pdc::structure::attachment_outside_section")]
    #[case::invalid_condition(
        "# PDC-Start s\n# PDC-KillIf x +\ny = 1\n# PDC-End s",
        "pdc::structure::invalid_condition"
    )]
    fn test_write_error(#[case] code: &str, #[case] expected: &str) {
        use miette::Diagnostic;

        let tree = annotate(code).unwrap();
        let err = ConversionWriter::new(&tree, code, "tpl").write(&tree.body).unwrap_err();
        assert_eq!(err.code().map(|c| c.to_string()), Some(expected.to_string()));
    }
}
