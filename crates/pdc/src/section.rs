use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::{
    annotate::{ANode, ANodeId, AnnotatedTree},
    directive::{Directive, DirectiveClass, DirectiveKind},
    error::StructureError,
};

/// The logical view of a group.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub name: String,
    pub start: Directive,
    pub sub_sections: Vec<Section>,
    /// Section-level directives declared directly in this section, in order.
    pub attachments: Vec<Directive>,
    /// Line directives keyed by the statement that follows them, in source order.
    pub statement_attachments: Vec<(ANodeId, Vec<Directive>)>,
}

impl Section {
    /// Derives the section for `group` and all of its nested sections.
    pub fn derive(tree: &AnnotatedTree, group: ANodeId) -> Result<Section, StructureError> {
        Self::derive_with(tree, group, true)
    }

    /// Derives only this section's own level. Nested groups are skipped.
    pub fn derive_shallow(tree: &AnnotatedTree, group: ANodeId) -> Result<Section, StructureError> {
        Self::derive_with(tree, group, false)
    }

    fn derive_with(tree: &AnnotatedTree, group: ANodeId, recurse: bool) -> Result<Section, StructureError> {
        let (ANode::Group { body }, Some(start)) = (&tree.arena[group], tree.start_directive(group)) else {
            return Err(StructureError::NotASection);
        };

        let mut walk = Walk {
            tree,
            recurse,
            section: Section {
                name: start.section_name().to_string(),
                start: start.clone(),
                sub_sections: Vec::new(),
                attachments: Vec::new(),
                statement_attachments: Vec::new(),
            },
            pending: Vec::new(),
        };
        walk.block(&body[1..])?;

        let section = walk.section;
        section.validate()?;
        Ok(section)
    }

    fn validate(&self) -> Result<(), StructureError> {
        for directive in &self.attachments {
            match directive.kind {
                DirectiveKind::Replace if !self.has_template() => {
                    return Err(StructureError::ReplaceWithoutTemplate {
                        line: directive.start_line,
                    });
                }
                DirectiveKind::Replace if directive.instruction_input.is_empty() => {
                    return Err(StructureError::EmptyPattern {
                        line: directive.start_line,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn start_line(&self) -> u32 {
        self.start.start_line
    }

    pub fn has_template(&self) -> bool {
        self.attachments
            .iter()
            .any(|directive| directive.kind == DirectiveKind::TemplateCode)
    }

    /// `Replace` patterns of this section in declaration order.
    pub fn patterns(&self) -> Vec<String> {
        self.attachments
            .iter()
            .filter(|directive| directive.kind == DirectiveKind::Replace)
            .map(|directive| directive.instruction_input.clone())
            .collect()
    }

    pub fn line_directives(&self, statement: ANodeId) -> &[Directive] {
        self.statement_attachments
            .iter()
            .find_map(|(id, directives)| (*id == statement).then_some(directives.as_slice()))
            .unwrap_or_default()
    }

    /// Levels of nesting, counting this section.
    pub fn depth(&self) -> usize {
        1 + self.sub_sections.iter().map(Section::depth).max().unwrap_or(0)
    }

    fn fmt_indented(&self, f: &mut Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{}{} (line {})", "  ".repeat(depth), self.name, self.start_line())?;
        if !self.attachments.is_empty() {
            write!(f, " [{}]", self.attachments.iter().map(|d| d.kind.tag()).join(", "))?;
        }
        let line_directives: usize = self.statement_attachments.iter().map(|(_, d)| d.len()).sum();
        if line_directives > 0 {
            write!(f, " +{} line", line_directives)?;
        }
        for sub_section in &self.sub_sections {
            writeln!(f)?;
            sub_section.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl Display for Section {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

struct Walk<'a> {
    tree: &'a AnnotatedTree,
    recurse: bool,
    section: Section,
    pending: Vec<Directive>,
}

impl Walk<'_> {
    fn block(&mut self, block: &[ANodeId]) -> Result<(), StructureError> {
        for id in block {
            match &self.tree.arena[*id] {
                ANode::Group { .. } => {
                    if let Some(first) = self.pending.first() {
                        return Err(StructureError::LineDirectiveBeforeSection {
                            line: first.start_line,
                            section_line: self.tree.start_directive(*id).map_or(0, |d| d.start_line),
                        });
                    }
                    if self.recurse {
                        self.section.sub_sections.push(Section::derive(self.tree, *id)?);
                    }
                }
                ANode::Directive { directive, .. } => match directive.class() {
                    DirectiveClass::SectionAttachment => self.section.attachments.push(directive.clone()),
                    DirectiveClass::LineDirective => self.pending.push(directive.clone()),
                    DirectiveClass::GroupStart | DirectiveClass::GroupEnd => {}
                },
                ANode::Comment { .. } => {}
                ANode::Statement { blocks, .. } => {
                    if !self.pending.is_empty() {
                        self.section
                            .statement_attachments
                            .push((*id, std::mem::take(&mut self.pending)));
                    }
                    for block in blocks {
                        self.block(block)?;
                    }
                }
            }
        }

        match self.pending.first() {
            Some(first) => Err(StructureError::DanglingLineDirective {
                line: first.start_line,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::annotate;
    use proptest::prelude::*;
    use rstest::rstest;

    fn sections(code: &str) -> Result<Vec<Section>, StructureError> {
        annotate(code).unwrap().sections()
    }

    #[test]
    fn test_nested_start_end() {
        let sections = sections(
            "# PDC-Start section 1\nx = 1\n# PDC-Start section 1.1\ny = 2\n# PDC-End section 1.1\n# PDC-End section 1",
        )
        .unwrap();

        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].name, "section 1");
        assert_eq!(sections[0].sub_sections.len(), 1);
        assert_eq!(sections[0].sub_sections[0].name, "section 1.1");
        assert!(sections[0].sub_sections[0].sub_sections.is_empty());
    }

    #[test]
    fn test_attachments_and_line_directives() {
        let tree = annotate(
            "# PDC-Start s\n# PDC-TemplateCode\n# PDC-Replace NAME\nx = 1\n# PDC-VerbatimLine\n# PDC-KillLine\n# note\ny = 2\n# PDC-End s",
        )
        .unwrap();
        let section = &tree.sections().unwrap()[0];

        assert_eq!(
            section.attachments.iter().map(|d| d.kind).collect::<Vec<_>>(),
            vec![DirectiveKind::TemplateCode, DirectiveKind::Replace]
        );
        assert_eq!(section.patterns(), vec!["NAME".to_string()]);
        assert_eq!(section.statement_attachments.len(), 1);

        let (statement, directives) = &section.statement_attachments[0];
        assert_eq!(
            directives.iter().map(|d| d.kind).collect::<Vec<_>>(),
            vec![DirectiveKind::VerbatimLine, DirectiveKind::KillLine]
        );
        assert_eq!(section.line_directives(*statement).len(), 2);
    }

    #[test]
    fn test_sections_inside_compound_statements() {
        let sections = sections(
            "# PDC-Function\nfor i in x:\n    # PDC-Start body\n    y = i\n    # PDC-End body",
        )
        .unwrap();

        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].sub_sections[0].name, "body");
    }

    #[rstest]
    #[case::dangling(
        "# PDC-Start s\nx = 1\n# PDC-KillLine\n# PDC-End s",
        StructureError::DanglingLineDirective { line: 3 }
    )]
    #[case::dangling_in_loop(
        "# PDC-Function\nfor i in x:\n    y = i\n    # PDC-VerbatimLine\nz = 1",
        StructureError::DanglingLineDirective { line: 4 }
    )]
    #[case::before_section(
        "# PDC-Function\n# PDC-KillLine\n# PDC-Start s\nx = 1\n# PDC-End s",
        StructureError::LineDirectiveBeforeSection { line: 2, section_line: 3 }
    )]
    #[case::replace_without_template(
        "# PDC-Start s\n# PDC-Replace X\nx = 1\n# PDC-End s",
        StructureError::ReplaceWithoutTemplate { line: 2 }
    )]
    fn test_structure_errors(#[case] code: &str, #[case] expected: StructureError) {
        assert_eq!(sections(code), Err(expected));
    }

    #[test]
    fn test_display() {
        let sections = sections(
            "# PDC-Start outer\n# PDC-Verbatim\n# PDC-Start inner\n# PDC-KillLine\nx = 1\n# PDC-End inner\n# PDC-End outer",
        )
        .unwrap();

        assert_eq!(
            sections[0].to_string(),
            "outer (line 1) [Verbatim]\n  inner (line 3) +1 line"
        );
    }

    fn nested_source(depth: usize) -> String {
        let mut lines = Vec::new();
        for level in 0..depth {
            lines.push(format!("# PDC-Start s{level}"));
            lines.push(format!("x{level} = {level}"));
        }
        for level in (0..depth).rev() {
            lines.push(format!("# PDC-End s{level}"));
        }
        lines.join("\n")
    }

    proptest! {
        #[test]
        fn test_nesting_mirrors_source(depth in 1usize..12) {
            let sections = sections(&nested_source(depth)).unwrap();

            prop_assert_eq!(sections.len(), 1);
            prop_assert_eq!(sections[0].depth(), depth);
        }

        #[test]
        fn test_render_is_idempotent(items in prop::collection::vec(strategies::item(), 1..5)) {
            let code = strategies::source(&items);
            let tree = annotate(&code).unwrap();
            let rendered = tree.render();
            let reparsed = annotate(&rendered).unwrap();

            prop_assert_eq!(&rendered, &code);
            prop_assert_eq!(reparsed.render(), rendered);
            prop_assert_eq!(reparsed.sections().unwrap(), tree.sections().unwrap());
        }

        #[test]
        fn test_generated_conversion_parses(items in prop::collection::vec(strategies::item(), 1..5)) {
            let code = strategies::source(&items);
            let tree = annotate(&code).unwrap();
            let program = crate::writer::ConversionWriter::new(&tree, &code, "tpl")
                .write(&tree.body)
                .unwrap();

            prop_assert!(pdc_lang::parse(&pdc_lang::render(&program)).is_ok());
        }
    }

    mod strategies {
        use super::*;

        /// A statement or section of generated annotated source.
        #[derive(Debug, Clone)]
        pub enum Item {
            Assign,
            Line(&'static str),
            If(Vec<Item>, Vec<Item>),
            For(Vec<Item>),
            Section(&'static [&'static str], Vec<Item>),
        }

        const ATTACHMENTS: &[&[&str]] = &[
            &[],
            &["# PDC-Verbatim"],
            &["# PDC-TemplateCode", "# PDC-Replace X"],
            &["# PDC-Kill"],
            &["# PDC-Verbatim", "# PDC-KillIf a and", "#            not b"],
        ];

        pub fn item() -> impl Strategy<Value = Item> {
            let leaf = prop_oneof![
                Just(Item::Assign),
                Just(Item::Line("# PDC-VerbatimLine")),
                Just(Item::Line("# PDC-KillLine")),
            ];
            leaf.prop_recursive(4, 24, 3, |inner| {
                let block = || prop::collection::vec(inner.clone(), 0..3);
                prop_oneof![
                    (block(), block()).prop_map(|(body, orelse)| Item::If(body, orelse)),
                    block().prop_map(Item::For),
                    (prop::sample::select(ATTACHMENTS), block())
                        .prop_map(|(attachments, body)| Item::Section(attachments, body)),
                ]
            })
        }

        /// Canonical source for `items`. Every block ends with a plain statement.
        pub fn source(items: &[Item]) -> String {
            let mut lines = Vec::new();
            write_block(items, 0, &mut lines, &mut 0);
            lines.join("\n")
        }

        fn write_block(items: &[Item], indent: usize, lines: &mut Vec<String>, counter: &mut usize) {
            let pad = " ".repeat(indent);
            for item in items {
                *counter += 1;
                let n = *counter;
                match item {
                    Item::Assign => lines.push(format!("{pad}x{n} = {n}")),
                    Item::Line(directive) => {
                        lines.push(format!("{pad}{directive}"));
                        lines.push(format!("{pad}x{n} = {n}"));
                    }
                    Item::If(body, orelse) => {
                        lines.push(format!("{pad}if x{n}:"));
                        write_block(body, indent + 4, lines, counter);
                        if !orelse.is_empty() {
                            lines.push(format!("{pad}else:"));
                            write_block(orelse, indent + 4, lines, counter);
                        }
                    }
                    Item::For(body) => {
                        lines.push(format!("{pad}for x{n} in xs:"));
                        write_block(body, indent + 4, lines, counter);
                    }
                    Item::Section(attachments, body) => {
                        lines.push(format!("{pad}# PDC-Start s{n}"));
                        lines.extend(attachments.iter().map(|attachment| format!("{pad}{attachment}")));
                        write_block(body, indent, lines, counter);
                        lines.push(format!("{pad}# PDC-End s{n}"));
                    }
                }
            }
            *counter += 1;
            lines.push(format!("{pad}y{} = {indent}", *counter));
        }
    }
}
