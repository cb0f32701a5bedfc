//! Turns directive comments into tree nodes and folds sections into groups.
//!
//! Annotation runs in two passes over the host tree. The first replaces every
//! directive comment with an [`ANode::Directive`], folding continuation lines
//! into it. The second merges each group-start directive with the siblings that
//! belong to it, producing nested [`ANode::Group`]s. Each pass builds a fresh
//! arena.

use pdc_lang::{Arena, ArenaId, AstNode, AstNodeKind, Block, NodeId, Tree};
use smallvec::{SmallVec, smallvec};

use crate::{
    Error,
    directive::{CommentLine, Directive, DirectiveClass, DirectiveKind, PREFIX},
    error::{DirectiveError, StructureError},
    section::Section,
};

pub type ANodeId = ArenaId<ANode>;

#[derive(Debug, Clone, PartialEq)]
pub enum ANode {
    /// A host statement. Compound statements keep their annotated blocks.
    Statement { node: NodeId, blocks: Vec<Vec<ANodeId>> },
    /// A comment that is not a directive.
    Comment { node: NodeId },
    /// A directive and the comment statements it was parsed from.
    Directive {
        directive: Directive,
        nodes: SmallVec<[NodeId; 1]>,
    },
    /// A section. The first member is its start directive.
    Group { body: Vec<ANodeId> },
}

/// A host tree with directives recognized and sections grouped.
#[derive(Debug, Clone)]
pub struct AnnotatedTree {
    pub host: Tree,
    pub arena: Arena<ANode>,
    pub body: Vec<ANodeId>,
}

impl AnnotatedTree {
    /// Annotates the top-level block of `host`.
    pub fn new(host: Tree) -> Result<Self, Error> {
        let block = host.body.clone();
        Self::from_block(host, block)
    }

    /// Annotates `block`, which must belong to `host`.
    pub fn from_block(host: Tree, block: Block) -> Result<Self, Error> {
        let mut recognized = Arena::new(host.arena.len());
        let body = recognize(&host, &block, &mut recognized)?;

        let mut merger = Merger {
            old: &recognized,
            arena: Arena::new(recognized.len()),
        };
        let body = merger.block(&body)?;
        let arena = merger.arena;

        tracing::debug!(
            nodes = arena.len(),
            statements = body.len(),
            "annotated"
        );
        Ok(Self { host, arena, body })
    }

    pub fn directive(&self, id: ANodeId) -> Option<&Directive> {
        match &self.arena[id] {
            ANode::Directive { directive, .. } => Some(directive),
            _ => None,
        }
    }

    /// The directive that opened `group`.
    pub fn start_directive(&self, group: ANodeId) -> Option<&Directive> {
        match &self.arena[group] {
            ANode::Group { body } => body.first().and_then(|first| self.directive(*first)),
            _ => None,
        }
    }

    /// Zero-based indentation of the first line of `id`.
    pub fn indent_of(&self, id: ANodeId) -> usize {
        match &self.arena[id] {
            ANode::Statement { node, .. } | ANode::Comment { node } => self.host[*node].range.indent(),
            ANode::Directive { directive, .. } => directive.indent,
            ANode::Group { body } => body.first().map_or(0, |first| self.indent_of(*first)),
        }
    }

    /// 1-based source line on which `id` starts.
    pub fn first_line(&self, id: ANodeId) -> u32 {
        match &self.arena[id] {
            ANode::Statement { node, .. } | ANode::Comment { node } => self.host[*node].range.start.line,
            ANode::Directive { directive, .. } => directive.start_line,
            ANode::Group { body } => body.first().map_or(0, |first| self.first_line(*first)),
        }
    }

    /// Whether `block`, or any block nested in it, contains a directive.
    pub fn has_directives(&self, block: &[ANodeId]) -> bool {
        block.iter().any(|id| match &self.arena[*id] {
            ANode::Directive { .. } | ANode::Group { .. } => true,
            ANode::Statement { blocks, .. } => blocks.iter().any(|block| self.has_directives(block)),
            ANode::Comment { .. } => false,
        })
    }

    /// Everything from the `Function` group onwards, or the whole body if there is none.
    pub fn routine_body(&self) -> &[ANodeId] {
        let function = self.body.iter().position(|id| {
            self.start_directive(*id)
                .is_some_and(|directive| directive.kind == DirectiveKind::Function)
        });
        &self.body[function.unwrap_or(0)..]
    }

    /// Groups in `block` that are not nested inside another group.
    pub fn outermost_groups(&self, block: &[ANodeId]) -> Vec<ANodeId> {
        let mut groups = Vec::new();
        self.collect_groups(block, &mut groups);
        groups
    }

    fn collect_groups(&self, block: &[ANodeId], groups: &mut Vec<ANodeId>) {
        for id in block {
            match &self.arena[*id] {
                ANode::Group { .. } => groups.push(*id),
                ANode::Statement { blocks, .. } => {
                    for block in blocks {
                        self.collect_groups(block, groups);
                    }
                }
                ANode::Comment { .. } | ANode::Directive { .. } => {}
            }
        }
    }

    pub fn sections(&self) -> Result<Vec<Section>, StructureError> {
        self.sections_in(&self.body)
    }

    pub fn sections_in(&self, block: &[ANodeId]) -> Result<Vec<Section>, StructureError> {
        self.outermost_groups(block)
            .into_iter()
            .map(|group| Section::derive(self, group))
            .collect()
    }

    /// Rebuilds a host tree with the original comments in place of directives.
    pub fn to_tree(&self) -> Tree {
        let mut tree = Tree::new();
        tree.body = self.unannotate(&self.body, &mut tree);
        tree
    }

    pub fn render(&self) -> String {
        pdc_lang::render(&self.to_tree())
    }

    fn unannotate(&self, block: &[ANodeId], tree: &mut Tree) -> Block {
        let mut out = Vec::with_capacity(block.len());
        for id in block {
            match &self.arena[*id] {
                ANode::Statement { node, blocks } => {
                    let blocks = blocks.iter().map(|block| self.unannotate(block, tree)).collect();
                    let host = &self.host[*node];
                    out.push(tree.alloc(AstNode {
                        kind: host.kind.with_blocks(blocks),
                        range: host.range,
                        comment: host.comment.clone(),
                    }));
                }
                ANode::Comment { node } => out.push(tree.import(&self.host, *node)),
                ANode::Directive { nodes, .. } => {
                    out.extend(nodes.iter().map(|node| tree.import(&self.host, *node)));
                }
                ANode::Group { body } => out.extend(self.unannotate(body, tree)),
            }
        }
        out
    }
}

/// Parses `code` and annotates its top-level block.
pub fn annotate(code: &str) -> Result<AnnotatedTree, Error> {
    let host = pdc_lang::parse(code)?;
    tracing::debug!(statements = host.body.len(), "parsed");
    AnnotatedTree::new(host)
}

fn recognize(host: &Tree, block: &[NodeId], arena: &mut Arena<ANode>) -> Result<Vec<ANodeId>, Error> {
    let mut out = Vec::with_capacity(block.len());
    let mut current: Option<(Directive, SmallVec<[NodeId; 1]>)> = None;

    for id in block {
        let node = &host[*id];

        if let AstNodeKind::Comment(text) = &node.kind {
            let comment = CommentLine::new(text, node.range.start.line, node.range.indent());
            if let Some((directive, nodes)) = current.as_mut()
                && directive.absorb_continuation(&comment)
            {
                nodes.push(*id);
                continue;
            }

            flush(&mut current, arena, &mut out);
            match Directive::parse(&comment)? {
                Some(directive) => current = Some((directive, smallvec![*id])),
                None => out.push(arena.alloc(ANode::Comment { node: *id })),
            }
            continue;
        }

        flush(&mut current, arena, &mut out);
        if let Some(comment) = &node.comment
            && comment.starts_with(PREFIX)
        {
            return Err(DirectiveError::Inline {
                line: node.range.start.line,
                text: comment.clone(),
            }
            .into());
        }

        let blocks = node
            .kind
            .blocks()
            .into_iter()
            .map(|block| recognize(host, block, arena))
            .collect::<Result<Vec<_>, _>>()?;
        out.push(arena.alloc(ANode::Statement { node: *id, blocks }));
    }

    flush(&mut current, arena, &mut out);
    Ok(out)
}

fn flush(
    current: &mut Option<(Directive, SmallVec<[NodeId; 1]>)>,
    arena: &mut Arena<ANode>,
    out: &mut Vec<ANodeId>,
) {
    if let Some((directive, nodes)) = current.take() {
        out.push(arena.alloc(ANode::Directive { directive, nodes }));
    }
}

/// A sibling on its way into a group.
enum Incoming {
    Node { id: ANodeId, end: Option<Directive> },
    Group(GroupBuilder),
}

enum Member {
    Node(ANodeId),
    Group(GroupBuilder),
}

impl Member {
    fn build(self, arena: &mut Arena<ANode>) -> Result<ANodeId, StructureError> {
        match self {
            Member::Node(id) => Ok(id),
            Member::Group(group) => group.build(arena),
        }
    }
}

struct GroupBuilder {
    start: ANodeId,
    directive: Directive,
    members: Vec<Member>,
    closed: bool,
}

impl GroupBuilder {
    fn new(start: ANodeId, directive: Directive) -> Self {
        Self {
            start,
            directive,
            members: Vec::new(),
            closed: false,
        }
    }

    /// Takes `item` into this group, or hands it back if the group is done.
    ///
    /// The most recent member gets the first chance, so nesting follows the source.
    fn absorb(&mut self, item: Incoming) -> Result<Option<Incoming>, StructureError> {
        if self.closed {
            return Ok(Some(item));
        }

        let item = match self.members.last_mut() {
            Some(Member::Group(last)) => match last.absorb(item)? {
                None => return Ok(None),
                Some(item) => item,
            },
            _ => item,
        };

        match item {
            Incoming::Node { id, end: Some(end) } => {
                if !self.directive.requires_end_tag() {
                    return Err(StructureError::UnmatchedEnd {
                        name: end.section_name().to_string(),
                        line: end.start_line,
                    });
                }
                if end.section_name() != self.directive.section_name() {
                    return Err(StructureError::MismatchedEnd {
                        end: end.section_name().to_string(),
                        end_line: end.start_line,
                        start: self.directive.section_name().to_string(),
                        start_line: self.directive.start_line,
                    });
                }
                self.members.push(Member::Node(id));
                self.closed = true;
            }
            Incoming::Node { id, end: None } => self.members.push(Member::Node(id)),
            Incoming::Group(group) => self.members.push(Member::Group(group)),
        }
        Ok(None)
    }

    fn build(self, arena: &mut Arena<ANode>) -> Result<ANodeId, StructureError> {
        if self.directive.requires_end_tag() && !self.closed {
            return Err(StructureError::Unclosed {
                name: self.directive.section_name().to_string(),
                line: self.directive.start_line,
            });
        }

        let mut body = Vec::with_capacity(self.members.len() + 1);
        body.push(self.start);
        for member in self.members {
            body.push(member.build(arena)?);
        }
        Ok(arena.alloc(ANode::Group { body }))
    }
}

struct Merger<'a> {
    old: &'a Arena<ANode>,
    arena: Arena<ANode>,
}

impl Merger<'_> {
    /// Merges one block bottom-up: nested blocks first, then the siblings.
    fn block(&mut self, block: &[ANodeId]) -> Result<Vec<ANodeId>, StructureError> {
        let mut out: Vec<Member> = Vec::with_capacity(block.len());

        for old_id in block {
            let incoming = match &self.old[*old_id] {
                ANode::Statement { node, blocks } => {
                    let blocks = blocks
                        .iter()
                        .map(|block| self.block(block))
                        .collect::<Result<Vec<_>, _>>()?;
                    Incoming::Node {
                        id: self.arena.alloc(ANode::Statement { node: *node, blocks }),
                        end: None,
                    }
                }
                ANode::Directive { directive, nodes } => {
                    let id = self.arena.alloc(ANode::Directive {
                        directive: directive.clone(),
                        nodes: nodes.clone(),
                    });
                    match directive.class() {
                        DirectiveClass::GroupStart => Incoming::Group(GroupBuilder::new(id, directive.clone())),
                        DirectiveClass::GroupEnd => Incoming::Node {
                            id,
                            end: Some(directive.clone()),
                        },
                        DirectiveClass::SectionAttachment | DirectiveClass::LineDirective => {
                            Incoming::Node { id, end: None }
                        }
                    }
                }
                node => Incoming::Node {
                    id: self.arena.alloc(node.clone()),
                    end: None,
                },
            };

            let incoming = match out.last_mut() {
                Some(Member::Group(group)) => match group.absorb(incoming)? {
                    None => continue,
                    Some(incoming) => incoming,
                },
                _ => incoming,
            };

            match incoming {
                Incoming::Group(group) => out.push(Member::Group(group)),
                Incoming::Node { end: Some(end), .. } => {
                    return Err(StructureError::UnmatchedEnd {
                        name: end.section_name().to_string(),
                        line: end.start_line,
                    });
                }
                Incoming::Node { id, end: None } => out.push(Member::Node(id)),
            }
        }

        out.into_iter().map(|member| member.build(&mut self.arena)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn outline(tree: &AnnotatedTree, block: &[ANodeId]) -> Vec<String> {
        block
            .iter()
            .map(|id| match &tree.arena[*id] {
                ANode::Statement { blocks, .. } => format!(
                    "stmt[{}]",
                    blocks.iter().map(|b| outline(tree, b).join(", ")).collect::<Vec<_>>().join(" | ")
                ),
                ANode::Comment { .. } => "comment".to_string(),
                ANode::Directive { directive, .. } => directive.kind.tag().to_string(),
                ANode::Group { body } => format!("group({})", outline(tree, body).join(", ")),
            })
            .collect()
    }

    #[rstest]
    #[case::plain("x = 1\n# note\ny = 2", vec!["stmt[]", "comment", "stmt[]"])]
    #[case::function(
        "a = 0\n# PDC-Function\nx = 1\ny = 2",
        vec!["stmt[]", "group(Function, stmt[], stmt[])"]
    )]
    #[case::start_end(
        "# PDC-Start a\n# PDC-Verbatim\nx = 1\n# PDC-End a\ny = 2",
        vec!["group(Start, Verbatim, stmt[], End)", "stmt[]"]
    )]
    #[case::nested(
        "# PDC-Start a\n# PDC-Start b\nx = 1\n# PDC-End b\ny = 1\n# PDC-End a",
        vec!["group(Start, group(Start, stmt[], End), stmt[], End)"]
    )]
    #[case::siblings(
        "# PDC-Start a\nx = 1\n# PDC-End a\n# PDC-Start b\ny = 1\n# PDC-End b",
        vec!["group(Start, stmt[], End)", "group(Start, stmt[], End)"]
    )]
    #[case::inside_loop(
        "for i in x:\n    # PDC-Start a\n    y = i\n    # PDC-End a",
        vec!["stmt[group(Start, stmt[], End)]"]
    )]
    #[case::line_directive("# PDC-KillLine\nx = 1", vec!["KillLine", "stmt[]"])]
    fn test_annotate(#[case] code: &str, #[case] expected: Vec<&str>) {
        let tree = annotate(code).unwrap();
        assert_eq!(outline(&tree, &tree.body), expected);
    }

    #[test]
    fn test_continuation_lines_fold_into_one_directive() {
        let tree = annotate("# PDC-KillIf a and\n#            b\nx = 1").unwrap();

        assert_eq!(outline(&tree, &tree.body), vec!["KillIf", "stmt[]"]);
        let directive = tree.directive(tree.body[0]).unwrap();
        assert_eq!(directive.instruction_input, "a and\nb");
        assert_eq!((directive.start_line, directive.end_line), (1, 2));
    }

    #[rstest]
    #[case::mismatched(
        "# PDC-Start a\nx = 1\n# PDC-End b",
        Error::Structure(StructureError::MismatchedEnd { end: "b".into(), end_line: 3, start: "a".into(), start_line: 1 })
    )]
    #[case::unmatched(
        "x = 1\n# PDC-End a",
        Error::Structure(StructureError::UnmatchedEnd { name: "a".into(), line: 2 })
    )]
    #[case::unclosed(
        "x = 1\n# PDC-Start a\ny = 2",
        Error::Structure(StructureError::Unclosed { name: "a".into(), line: 2 })
    )]
    #[case::end_in_nested_block(
        "# PDC-Start a\nif x:\n    # PDC-End a\n    y = 1",
        Error::Structure(StructureError::UnmatchedEnd { name: "a".into(), line: 3 })
    )]
    #[case::inline(
        "x = 1  # PDC-Kill",
        Error::Directive(DirectiveError::Inline { line: 1, text: "# PDC-Kill".into() })
    )]
    #[case::unrecognized(
        "# PDC-Verbatum\nx = 1",
        Error::Directive(DirectiveError::Unrecognized { line: 1, text: "# PDC-Verbatum".into() })
    )]
    fn test_annotate_error(#[case] code: &str, #[case] expected: Error) {
        let err = annotate(code).unwrap_err();
        assert_eq!(err.to_string(), expected.to_string());
    }

    #[test]
    fn test_routine_body_starts_at_function() {
        let tree = annotate("doc = 1\n# PDC-Function\nx = 1").unwrap();
        assert_eq!(tree.routine_body().len(), 1);
        assert_eq!(
            tree.start_directive(tree.routine_body()[0]).map(|d| d.kind),
            Some(DirectiveKind::Function)
        );
    }

    #[rstest]
    #[case::plain_body("if a:\n    # note\n    b = 1", false)]
    #[case::line_directive("if a:\n    # PDC-KillLine\n    b = 1", true)]
    #[case::nested_section("for i in x:\n    if i:\n        # PDC-Start s\n        b = i\n        # PDC-End s", true)]
    #[case::else_block("if a:\n    b = 1\nelse:\n    # PDC-VerbatimLine\n    b = 2", true)]
    fn test_has_directives(#[case] code: &str, #[case] expected: bool) {
        let tree = annotate(code).unwrap();
        let ANode::Statement { blocks, .. } = &tree.arena[tree.body[0]] else {
            panic!("expected a statement");
        };

        assert_eq!(blocks.iter().any(|block| tree.has_directives(block)), expected);
        assert_eq!(tree.first_line(blocks[0][0]), 2);
    }

    #[test]
    fn test_render_restores_comments() {
        let code = "# PDC-Start a\n# PDC-Replace A\n#             B\nx = 1\n# PDC-End a";
        let tree = annotate(code).unwrap();
        assert_eq!(tree.render(), code);
    }
}
