use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::{
    arena::{Arena, ArenaId},
    range::Range,
};

pub type NodeId = ArenaId<Node>;
pub type Block = Vec<NodeId>;
pub type IdentName = SmolStr;

/// A statement. Expressions are owned by their statement.
#[derive(PartialEq, Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub range: Range,
    /// A comment trailing the statement (or its header line), including the `#`.
    pub comment: Option<String>,
}

impl Node {
    pub fn new(kind: NodeKind, range: Range) -> Self {
        Self {
            kind,
            range,
            comment: None,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum NodeKind {
    Expr(Expr),
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AugAssign {
        target: Expr,
        op: BinaryOp,
        value: Expr,
    },
    Return(Option<Expr>),
    Yield(Option<Expr>),
    Pass,
    Break,
    Continue,
    If {
        test: Expr,
        body: Block,
        orelse: Block,
        is_elif: bool,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Block,
    },
    While {
        test: Expr,
        body: Block,
    },
    Def {
        name: IdentName,
        params: Vec<Param>,
        body: Block,
    },
    Comment(String),
}

impl NodeKind {
    pub fn is_compound(&self) -> bool {
        matches!(
            self,
            NodeKind::If { .. } | NodeKind::For { .. } | NodeKind::While { .. } | NodeKind::Def { .. }
        )
    }

    /// Nested statement blocks in source order.
    pub fn blocks(&self) -> Vec<&Block> {
        match self {
            NodeKind::If { body, orelse, .. } => vec![body, orelse],
            NodeKind::For { body, .. } | NodeKind::While { body, .. } | NodeKind::Def { body, .. } => {
                vec![body]
            }
            _ => Vec::new(),
        }
    }

    /// A copy of this statement with its blocks replaced, in the order of [`NodeKind::blocks`].
    pub fn with_blocks(&self, blocks: Vec<Block>) -> NodeKind {
        let mut blocks = blocks.into_iter();
        let mut next = || blocks.next().unwrap_or_default();

        match self {
            NodeKind::If { test, is_elif, .. } => NodeKind::If {
                test: test.clone(),
                body: next(),
                orelse: next(),
                is_elif: *is_elif,
            },
            NodeKind::For { target, iter, .. } => NodeKind::For {
                target: target.clone(),
                iter: iter.clone(),
                body: next(),
            },
            NodeKind::While { test, .. } => NodeKind::While {
                test: test.clone(),
                body: next(),
            },
            NodeKind::Def { name, params, .. } => NodeKind::Def {
                name: name.clone(),
                params: params.clone(),
                body: next(),
            },
            other => other.clone(),
        }
    }

    pub fn contains_yield(&self, tree: &Tree) -> bool {
        match self {
            NodeKind::Yield(_) => true,
            // A nested definition is its own generator.
            NodeKind::Def { .. } => false,
            _ => self
                .blocks()
                .into_iter()
                .flatten()
                .any(|id| tree[*id].kind.contains_yield(tree)),
        }
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum ParamKind {
    Positional,
    VarArgs,
    KwArgs,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Param {
    pub name: IdentName,
    pub default: Option<Expr>,
    pub kind: ParamKind,
}

impl Param {
    pub fn positional(name: &str) -> Self {
        Self {
            name: SmolStr::new(name),
            default: None,
            kind: ParamKind::Positional,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub range: Range,
}

impl Expr {
    pub fn new(kind: ExprKind, range: Range) -> Self {
        Self { kind, range }
    }

    /// Builds an expression with no source position, used by code generators.
    pub fn synthetic(kind: ExprKind) -> Self {
        Self {
            kind,
            range: Range::default(),
        }
    }

    pub fn str(value: &str) -> Self {
        Self::synthetic(ExprKind::Literal(Literal::Str(value.to_string())))
    }

    pub fn name(name: &str) -> Self {
        Self::synthetic(ExprKind::Name(SmolStr::new(name)))
    }

    pub fn call(func: Expr, args: Vec<Arg>) -> Self {
        Self::synthetic(ExprKind::Call {
            func: Box::new(func),
            args,
        })
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::synthetic(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn is_assignable(&self) -> bool {
        match &self.kind {
            ExprKind::Name(_) | ExprKind::Subscript { .. } => true,
            ExprKind::Tuple(items) | ExprKind::List(items) => items.iter().all(Expr::is_assignable),
            _ => false,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Name(IdentName),
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    ListComp {
        element: Box<Expr>,
        target: Box<Expr>,
        iter: Box<Expr>,
        conditions: Vec<Expr>,
    },
    Attribute {
        value: Box<Expr>,
        attr: IdentName,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Arg>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    BoolOp {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        comparisons: Vec<(CmpOp, Expr)>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
}

#[derive(PartialEq, Debug, Clone)]
pub enum Arg {
    Positional(Expr),
    Keyword(IdentName, Expr),
    Star(Expr),
    DoubleStar(Expr),
}

#[derive(PartialEq, Debug, Clone)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
    Is,
    IsNot,
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let op = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
        };
        write!(f, "{}", op)
    }
}

impl Display for CmpOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let op = match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        };
        write!(f, "{}", op)
    }
}

impl Display for BoolOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BoolOp::And => write!(f, "and"),
            BoolOp::Or => write!(f, "or"),
        }
    }
}

/// A parsed module: an arena of statements plus the top-level block.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    pub arena: Arena<Node>,
    pub body: Block,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        self.arena.alloc(node)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(id)
    }

    /// The first definition in the top-level block.
    pub fn first_def(&self) -> Option<NodeId> {
        self.body
            .iter()
            .copied()
            .find(|id| matches!(self[*id].kind, NodeKind::Def { .. }))
    }

    /// Renames the first top-level definition, returning its previous name.
    pub fn rename_first_def(&mut self, new_name: &str) -> Option<IdentName> {
        let id = self.first_def()?;
        match &mut self.arena.get_mut(id)?.kind {
            NodeKind::Def { name, .. } => Some(std::mem::replace(name, SmolStr::new(new_name))),
            _ => None,
        }
    }

    /// Copies the subtree rooted at `id` from `other` into this tree.
    pub fn import(&mut self, other: &Tree, id: NodeId) -> NodeId {
        let node = &other[id];
        let blocks = node
            .kind
            .blocks()
            .into_iter()
            .map(|block| block.iter().map(|child| self.import(other, *child)).collect())
            .collect();

        self.alloc(Node {
            kind: node.kind.with_blocks(blocks),
            range: node.range,
            comment: node.comment.clone(),
        })
    }

    /// Statements in pre-order, nested blocks included.
    pub fn walk(&self) -> Vec<NodeId> {
        fn visit(tree: &Tree, block: &Block, out: &mut Vec<NodeId>) {
            for id in block {
                out.push(*id);
                for child in tree[*id].kind.blocks() {
                    visit(tree, child, out);
                }
            }
        }

        let mut out = Vec::with_capacity(self.arena.len());
        visit(self, &self.body, &mut out);
        out
    }
}

impl std::ops::Index<NodeId> for Tree {
    type Output = Node;

    fn index(&self, index: NodeId) -> &Self::Output {
        &self.arena[index]
    }
}
