use smol_str::SmolStr;

use crate::lexer::token::{Token, TokenKind};
use crate::range::Range;

use super::error::ParseError;
use super::node::{
    Arg, BinaryOp, Block, BoolOp, CmpOp, Expr, ExprKind, Literal, Node, NodeId, NodeKind, Param,
    ParamKind, Tree, UnaryOp,
};

/// One logical line: either a lone comment or code with an optional trailing comment.
#[derive(Debug, Clone)]
enum Line {
    Comment(Token),
    Code {
        indent: usize,
        tokens: Vec<Token>,
        comment: Option<Token>,
    },
}

impl Line {
    fn indent(&self) -> usize {
        match self {
            Line::Comment(token) => token.range.start.column.saturating_sub(1),
            Line::Code { indent, .. } => *indent,
        }
    }

    fn first_kind(&self) -> Option<&TokenKind> {
        match self {
            Line::Code { tokens, .. } => tokens.first().map(|t| &t.kind),
            Line::Comment(_) => None,
        }
    }
}

/// Groups a token stream into logical lines. Newlines and comments inside
/// brackets are dropped, as are explicit line continuations.
fn logical_lines(tokens: Vec<Token>) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let mut comment: Option<Token> = None;
    let mut depth = 0usize;

    let flush = |lines: &mut Vec<Line>, current: &mut Vec<Token>, comment: &mut Option<Token>| {
        if current.is_empty() {
            if let Some(comment) = comment.take() {
                lines.push(Line::Comment(comment));
            }
            return;
        }

        let mut tokens = std::mem::take(current);
        let indent = tokens[0].range.start.column.saturating_sub(1);
        let end = tokens[tokens.len() - 1].range.end;
        tokens.push(Token::new(Range::new(end, end), TokenKind::Eof));
        lines.push(Line::Code {
            indent,
            tokens,
            comment: comment.take(),
        });
    };

    for token in tokens {
        match &token.kind {
            TokenKind::Whitespace(_) | TokenKind::Continuation => {}
            TokenKind::NewLine | TokenKind::Comment(_) if depth > 0 => {}
            TokenKind::NewLine | TokenKind::Eof => flush(&mut lines, &mut current, &mut comment),
            TokenKind::Comment(_) => comment = Some(token),
            kind => {
                if kind.opens_bracket() {
                    depth += 1;
                } else if kind.closes_bracket() {
                    depth = depth.saturating_sub(1);
                }
                current.push(token);
            }
        }
    }
    flush(&mut lines, &mut current, &mut comment);

    lines
}

pub struct Parser {
    lines: Vec<Line>,
    pos: usize,
    tree: Tree,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            lines: logical_lines(tokens),
            pos: 0,
            tree: Tree::new(),
        }
    }

    pub fn parse(mut self) -> Result<Tree, ParseError> {
        let indent = self
            .lines
            .iter()
            .find(|line| matches!(line, Line::Code { .. }))
            .map(Line::indent)
            .unwrap_or_default();

        let body = self.parse_block(indent, true)?;

        if let Some(Line::Code { tokens, .. }) = self.lines.get(self.pos) {
            return Err(ParseError::UnexpectedIndent(tokens[0].range));
        }

        self.tree.body = body;
        Ok(self.tree)
    }

    fn parse_block(&mut self, indent: usize, module: bool) -> Result<Block, ParseError> {
        let mut block = Vec::new();
        let mut has_code = false;

        while let Some(line) = self.lines.get(self.pos).cloned() {
            match line {
                Line::Comment(token) => {
                    if !module && has_code && line_indent(&token) < indent {
                        break;
                    }
                    self.pos += 1;
                    block.push(self.comment_node(token));
                }
                Line::Code {
                    indent: code_indent,
                    tokens,
                    comment,
                } => {
                    if code_indent < indent {
                        break;
                    }
                    if code_indent > indent {
                        return Err(ParseError::UnexpectedIndent(tokens[0].range));
                    }
                    self.pos += 1;
                    has_code = true;
                    block.extend(self.parse_statement(&tokens, comment, code_indent)?);
                }
            }
        }

        Ok(block)
    }

    fn comment_node(&mut self, token: Token) -> NodeId {
        let text = match token.kind {
            TokenKind::Comment(text) => text,
            other => other.to_string(),
        };
        self.tree.alloc(Node::new(NodeKind::Comment(text), token.range))
    }

    fn parse_statement(
        &mut self,
        tokens: &[Token],
        comment: Option<Token>,
        indent: usize,
    ) -> Result<Vec<NodeId>, ParseError> {
        let mut cursor = Cursor::new(tokens);
        let comment = comment.and_then(|c| match c.kind {
            TokenKind::Comment(text) => Some(text),
            _ => None,
        });

        let id = match cursor.peek().kind {
            TokenKind::If => self.parse_if(&mut cursor, indent, comment, false)?,
            TokenKind::For => self.parse_for(&mut cursor, indent, comment)?,
            TokenKind::While => self.parse_while(&mut cursor, indent, comment)?,
            TokenKind::Def => self.parse_def(&mut cursor, indent, comment)?,
            TokenKind::Elif | TokenKind::Else => {
                return Err(ParseError::UnexpectedToken(cursor.peek().clone()));
            }
            _ => {
                let mut ids = self.parse_simple_statements(&mut cursor)?;
                if let Some(last) = ids.pop() {
                    let node = self.finish_comment(last, comment);
                    ids.push(node);
                }
                return Ok(ids);
            }
        };

        Ok(vec![id])
    }

    fn finish_comment(&mut self, id: NodeId, comment: Option<String>) -> NodeId {
        if let Some(node) = self.tree.arena.get_mut(id) {
            node.comment = comment;
        }
        id
    }

    /// The body after a compound statement's colon: either the rest of the
    /// line or an indented block on the following lines.
    fn parse_suite(&mut self, cursor: &mut Cursor, indent: usize) -> Result<Block, ParseError> {
        let colon = cursor.expect(TokenKind::Colon, ":")?;

        if cursor.peek().kind != TokenKind::Eof {
            return self.parse_simple_statements(cursor);
        }

        let next_code = self.lines[self.pos..]
            .iter()
            .find(|line| matches!(line, Line::Code { .. }))
            .map(Line::indent);

        match next_code {
            Some(body_indent) if body_indent > indent => self.parse_block(body_indent, false),
            _ => Err(ParseError::ExpectedIndentedBlock(colon.range)),
        }
    }

    /// Looks past comment lines for an `elif`/`else` continuing the statement at `indent`.
    fn peek_branch(&self, indent: usize) -> Option<usize> {
        let mut skipped = 0;
        for line in &self.lines[self.pos..] {
            match line {
                Line::Comment(_) => skipped += 1,
                Line::Code { .. } => {
                    return (line.indent() == indent
                        && matches!(line.first_kind(), Some(TokenKind::Elif | TokenKind::Else)))
                    .then_some(skipped);
                }
            }
        }
        None
    }

    fn parse_if(
        &mut self,
        cursor: &mut Cursor,
        indent: usize,
        comment: Option<String>,
        is_elif: bool,
    ) -> Result<NodeId, ParseError> {
        let start = cursor.next().range;
        let test = cursor.expr()?;
        let mut body = self.parse_suite(cursor, indent)?;
        let mut orelse = Vec::new();

        if let Some(skipped) = self.peek_branch(indent) {
            for _ in 0..skipped {
                if let Some(Line::Comment(token)) = self.lines.get(self.pos).cloned() {
                    self.pos += 1;
                    body.push(self.comment_node(token));
                }
            }

            if let Some(Line::Code { tokens, comment, .. }) = self.lines.get(self.pos).cloned() {
                self.pos += 1;
                let branch_comment = comment.and_then(|c| match c.kind {
                    TokenKind::Comment(text) => Some(text),
                    _ => None,
                });
                let mut branch = Cursor::new(&tokens);

                if branch.peek().kind == TokenKind::Elif {
                    orelse.push(self.parse_if(&mut branch, indent, branch_comment, true)?);
                } else {
                    branch.next();
                    orelse = self.parse_suite(&mut branch, indent)?;
                }
            }
        }

        let range = self.cover(start, &[&body, &orelse], test.range);
        let node = Node {
            kind: NodeKind::If {
                test,
                body,
                orelse,
                is_elif,
            },
            range,
            comment,
        };
        Ok(self.tree.alloc(node))
    }

    fn parse_for(
        &mut self,
        cursor: &mut Cursor,
        indent: usize,
        comment: Option<String>,
    ) -> Result<NodeId, ParseError> {
        let start = cursor.next().range;
        let target = cursor.target_list()?;
        cursor.expect(TokenKind::In, "in")?;
        let iter = cursor.expr_list()?;
        let body = self.parse_suite(cursor, indent)?;

        let range = self.cover(start, &[&body], iter.range);
        Ok(self.tree.alloc(Node {
            kind: NodeKind::For { target, iter, body },
            range,
            comment,
        }))
    }

    fn parse_while(
        &mut self,
        cursor: &mut Cursor,
        indent: usize,
        comment: Option<String>,
    ) -> Result<NodeId, ParseError> {
        let start = cursor.next().range;
        let test = cursor.expr()?;
        let body = self.parse_suite(cursor, indent)?;

        let range = self.cover(start, &[&body], test.range);
        Ok(self.tree.alloc(Node {
            kind: NodeKind::While { test, body },
            range,
            comment,
        }))
    }

    fn parse_def(
        &mut self,
        cursor: &mut Cursor,
        indent: usize,
        comment: Option<String>,
    ) -> Result<NodeId, ParseError> {
        let start = cursor.next().range;
        let name = cursor.ident()?;
        cursor.expect(TokenKind::LParen, "(")?;
        let params = cursor.params()?;
        let close = cursor.expect(TokenKind::RParen, ")")?.range;
        let body = self.parse_suite(cursor, indent)?;

        let range = self.cover(start, &[&body], close);
        Ok(self.tree.alloc(Node {
            kind: NodeKind::Def { name, params, body },
            range,
            comment,
        }))
    }

    fn parse_simple_statements(&mut self, cursor: &mut Cursor) -> Result<Vec<NodeId>, ParseError> {
        let mut ids = Vec::new();

        loop {
            let node = cursor.simple_statement()?;
            ids.push(self.tree.alloc(node));

            match cursor.peek().kind {
                TokenKind::SemiColon => {
                    cursor.next();
                    if cursor.peek().kind == TokenKind::Eof {
                        break;
                    }
                }
                TokenKind::Eof => break,
                _ => return Err(ParseError::UnexpectedToken(cursor.peek().clone())),
            }
        }

        Ok(ids)
    }

    /// Range from `start` to the end of the last statement in the last non-empty block.
    fn cover(&self, start: Range, blocks: &[&Block], header_end: Range) -> Range {
        let end = blocks
            .iter()
            .rev()
            .find_map(|block| block.last())
            .and_then(|id| self.tree.get(*id))
            .map(|node| node.range.end)
            .unwrap_or(header_end.end);

        Range::new(start.start, std::cmp::max(end, header_end.end))
    }
}

fn line_indent(token: &Token) -> usize {
    token.range.start.column.saturating_sub(1)
}

/// Expression and simple-statement parsing over one logical line. The token
/// slice always ends with an `Eof` token.
struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &'a Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_nth(&self, n: usize) -> &'a Token {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    fn next(&mut self) -> &'a Token {
        let token = self.peek();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.next();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<&'a Token, ParseError> {
        if self.peek().kind == kind {
            Ok(self.next())
        } else {
            Err(ParseError::Expected(self.peek().clone(), expected))
        }
    }

    fn last_end(&self) -> Range {
        self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)].range
    }

    fn span_from(&self, start: Range) -> Range {
        Range::new(start.start, self.last_end().end)
    }

    fn ident(&mut self) -> Result<SmolStr, ParseError> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                self.next();
                Ok(name.clone())
            }
            _ => Err(ParseError::Expected(self.peek().clone(), "identifier")),
        }
    }

    fn at_list_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Eof
                | TokenKind::SemiColon
                | TokenKind::Equal
                | TokenKind::PlusEqual
                | TokenKind::MinusEqual
                | TokenKind::StarEqual
                | TokenKind::SlashEqual
                | TokenKind::Colon
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::In
        )
    }

    fn simple_statement(&mut self) -> Result<Node, ParseError> {
        let start = self.peek().range;

        let kind = match self.peek().kind {
            TokenKind::Pass => {
                self.next();
                NodeKind::Pass
            }
            TokenKind::Break => {
                self.next();
                NodeKind::Break
            }
            TokenKind::Continue => {
                self.next();
                NodeKind::Continue
            }
            TokenKind::Return => {
                self.next();
                NodeKind::Return(self.optional_expr_list()?)
            }
            TokenKind::Yield => {
                self.next();
                NodeKind::Yield(self.optional_expr_list()?)
            }
            _ => self.expression_statement()?,
        };

        Ok(Node::new(kind, self.span_from(start)))
    }

    fn optional_expr_list(&mut self) -> Result<Option<Expr>, ParseError> {
        if matches!(self.peek().kind, TokenKind::Eof | TokenKind::SemiColon) {
            Ok(None)
        } else {
            self.expr_list().map(Some)
        }
    }

    fn expression_statement(&mut self) -> Result<NodeKind, ParseError> {
        let first = self.expr_list()?;

        let aug_op = match self.peek().kind {
            TokenKind::PlusEqual => Some(BinaryOp::Add),
            TokenKind::MinusEqual => Some(BinaryOp::Sub),
            TokenKind::StarEqual => Some(BinaryOp::Mul),
            TokenKind::SlashEqual => Some(BinaryOp::Div),
            _ => None,
        };

        if let Some(op) = aug_op {
            if !matches!(first.kind, ExprKind::Name(_) | ExprKind::Subscript { .. }) {
                return Err(ParseError::InvalidTarget(first.range));
            }
            self.next();
            let value = self.expr_list()?;
            return Ok(NodeKind::AugAssign {
                target: first,
                op,
                value,
            });
        }

        if self.peek().kind != TokenKind::Equal {
            return Ok(NodeKind::Expr(first));
        }

        let mut exprs = vec![first];
        while self.eat(TokenKind::Equal) {
            exprs.push(self.expr_list()?);
        }

        let value = exprs.pop().ok_or_else(|| ParseError::UnexpectedToken(self.peek().clone()))?;
        if let Some(invalid) = exprs.iter().find(|e| !e.is_assignable()) {
            return Err(ParseError::InvalidTarget(invalid.range));
        }

        Ok(NodeKind::Assign {
            targets: exprs,
            value,
        })
    }

    fn params(&mut self) -> Result<Vec<Param>, ParseError> {
        let mut params = Vec::new();

        while self.peek().kind != TokenKind::RParen {
            let kind = if self.eat(TokenKind::StarStar) {
                ParamKind::KwArgs
            } else if self.eat(TokenKind::Star) {
                ParamKind::VarArgs
            } else {
                ParamKind::Positional
            };
            let name = self.ident()?;
            let default = if kind == ParamKind::Positional && self.eat(TokenKind::Equal) {
                Some(self.expr()?)
            } else {
                None
            };
            params.push(Param {
                name,
                default,
                kind,
            });

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        Ok(params)
    }

    /// Comma separated expressions; more than one (or a trailing comma) makes a tuple.
    fn expr_list(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().range;
        let first = self.expr()?;

        if self.peek().kind != TokenKind::Comma {
            return Ok(first);
        }

        let mut items = vec![first];
        while self.eat(TokenKind::Comma) {
            if self.at_list_end() {
                break;
            }
            items.push(self.expr()?);
        }

        Ok(Expr::new(ExprKind::Tuple(items), self.span_from(start)))
    }

    /// Assignment targets for `for` loops and comprehensions; stops before `in`.
    fn target_list(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().range;
        let first = self.postfix()?;

        let target = if self.peek().kind == TokenKind::Comma {
            let mut items = vec![first];
            while self.eat(TokenKind::Comma) {
                if self.at_list_end() {
                    break;
                }
                items.push(self.postfix()?);
            }
            Expr::new(ExprKind::Tuple(items), self.span_from(start))
        } else {
            first
        };

        if target.is_assignable() {
            Ok(target)
        } else {
            Err(ParseError::InvalidTarget(target.range))
        }
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().range;
        let body = self.or_test()?;

        if !self.eat(TokenKind::If) {
            return Ok(body);
        }

        let test = self.or_test()?;
        self.expect(TokenKind::Else, "else")?;
        let orelse = self.expr()?;

        Ok(Expr::new(
            ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
            self.span_from(start),
        ))
    }

    fn or_test(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().range;
        let mut left = self.and_test()?;

        while self.eat(TokenKind::Or) {
            let right = self.and_test()?;
            left = Expr::new(
                ExprKind::BoolOp {
                    op: BoolOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                self.span_from(start),
            );
        }

        Ok(left)
    }

    fn and_test(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().range;
        let mut left = self.not_test()?;

        while self.eat(TokenKind::And) {
            let right = self.not_test()?;
            left = Expr::new(
                ExprKind::BoolOp {
                    op: BoolOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                self.span_from(start),
            );
        }

        Ok(left)
    }

    fn not_test(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().range;

        if self.eat(TokenKind::Not) {
            let operand = self.not_test()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                self.span_from(start),
            ));
        }

        self.comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek().kind {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::NeEq => CmpOp::NotEq,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::Lte => CmpOp::Lte,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::Gte => CmpOp::Gte,
            TokenKind::In => CmpOp::In,
            TokenKind::Not if self.peek_nth(1).kind == TokenKind::In => {
                self.next();
                CmpOp::NotIn
            }
            TokenKind::Is if self.peek_nth(1).kind == TokenKind::Not => {
                self.next();
                CmpOp::IsNot
            }
            TokenKind::Is => CmpOp::Is,
            _ => return None,
        };
        self.next();
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().range;
        let left = self.arith(0)?;
        let mut comparisons = Vec::new();

        while let Some(op) = self.comparison_op() {
            comparisons.push((op, self.arith(0)?));
        }

        if comparisons.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::new(
                ExprKind::Compare {
                    left: Box::new(left),
                    comparisons,
                },
                self.span_from(start),
            ))
        }
    }

    fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
        match kind {
            TokenKind::Plus => Some((BinaryOp::Add, 1)),
            TokenKind::Minus => Some((BinaryOp::Sub, 1)),
            TokenKind::Star => Some((BinaryOp::Mul, 2)),
            TokenKind::Slash => Some((BinaryOp::Div, 2)),
            TokenKind::SlashSlash => Some((BinaryOp::FloorDiv, 2)),
            TokenKind::Percent => Some((BinaryOp::Mod, 2)),
            _ => None,
        }
    }

    /// Precedence climbing over the left-associative arithmetic operators.
    fn arith(&mut self, min_precedence: u8) -> Result<Expr, ParseError> {
        let start = self.peek().range;
        let mut left = self.unary()?;

        while let Some((op, precedence)) = Self::binary_op(&self.peek().kind) {
            if precedence < min_precedence {
                break;
            }
            self.next();
            let right = self.arith(precedence + 1)?;
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                self.span_from(start),
            );
        }

        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().range;
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.next();
        let operand = self.unary()?;

        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            self.span_from(start),
        ))
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().range;
        let base = self.postfix()?;

        if !self.eat(TokenKind::StarStar) {
            return Ok(base);
        }

        let exponent = self.unary()?;
        Ok(Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            },
            self.span_from(start),
        ))
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().range;
        let mut expr = self.atom()?;

        loop {
            match self.peek().kind {
                TokenKind::LParen => {
                    self.next();
                    let args = self.call_args()?;
                    self.expect(TokenKind::RParen, ")")?;
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                        },
                        self.span_from(start),
                    );
                }
                TokenKind::LBracket => {
                    self.next();
                    let index = self.expr_list()?;
                    self.expect(TokenKind::RBracket, "]")?;
                    expr = Expr::new(
                        ExprKind::Subscript {
                            value: Box::new(expr),
                            index: Box::new(index),
                        },
                        self.span_from(start),
                    );
                }
                TokenKind::Dot => {
                    self.next();
                    let attr = self.ident()?;
                    expr = Expr::new(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        self.span_from(start),
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn call_args(&mut self) -> Result<Vec<Arg>, ParseError> {
        let mut args = Vec::new();

        while self.peek().kind != TokenKind::RParen {
            let arg = match &self.peek().kind {
                TokenKind::Star => {
                    self.next();
                    Arg::Star(self.expr()?)
                }
                TokenKind::StarStar => {
                    self.next();
                    Arg::DoubleStar(self.expr()?)
                }
                TokenKind::Ident(name) if self.peek_nth(1).kind == TokenKind::Equal => {
                    let name = name.clone();
                    self.next();
                    self.next();
                    Arg::Keyword(name, self.expr()?)
                }
                _ => Arg::Positional(self.expr()?),
            };
            args.push(arg);

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        Ok(args)
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        let token = self.next();
        let literal = |kind| Ok(Expr::new(ExprKind::Literal(kind), token.range));

        match &token.kind {
            TokenKind::None => literal(Literal::None),
            TokenKind::True => literal(Literal::Bool(true)),
            TokenKind::False => literal(Literal::Bool(false)),
            TokenKind::NumberLiteral(text) => {
                let value = if text.contains(['.', 'e', 'E']) {
                    text.parse::<f64>().map(Literal::Float).ok()
                } else {
                    text.parse::<i64>().map(Literal::Int).ok()
                };
                value
                    .map(|value| Expr::new(ExprKind::Literal(value), token.range))
                    .ok_or_else(|| ParseError::InvalidNumber(token.clone()))
            }
            TokenKind::StringLiteral(s) => {
                let mut value = s.clone();
                while let TokenKind::StringLiteral(next) = &self.peek().kind {
                    value.push_str(next);
                    self.next();
                }
                Ok(Expr::new(
                    ExprKind::Literal(Literal::Str(value)),
                    self.span_from(token.range),
                ))
            }
            TokenKind::Ident(name) => Ok(Expr::new(ExprKind::Name(name.clone()), token.range)),
            TokenKind::LParen => self.paren(token.range),
            TokenKind::LBracket => self.list(token.range),
            TokenKind::LBrace => self.dict(token.range),
            _ => Err(ParseError::UnexpectedToken(token.clone())),
        }
    }

    fn paren(&mut self, start: Range) -> Result<Expr, ParseError> {
        if self.eat(TokenKind::RParen) {
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), self.span_from(start)));
        }

        let first = self.expr()?;
        if self.eat(TokenKind::RParen) {
            return Ok(Expr::new(first.kind, self.span_from(start)));
        }

        let mut items = vec![first];
        while self.eat(TokenKind::Comma) {
            if self.peek().kind == TokenKind::RParen {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect(TokenKind::RParen, ")")?;

        Ok(Expr::new(ExprKind::Tuple(items), self.span_from(start)))
    }

    fn list(&mut self, start: Range) -> Result<Expr, ParseError> {
        if self.eat(TokenKind::RBracket) {
            return Ok(Expr::new(ExprKind::List(Vec::new()), self.span_from(start)));
        }

        let first = self.expr()?;

        if self.eat(TokenKind::For) {
            let target = self.target_list()?;
            self.expect(TokenKind::In, "in")?;
            let iter = self.or_test()?;
            let mut conditions = Vec::new();
            while self.eat(TokenKind::If) {
                conditions.push(self.or_test()?);
            }
            self.expect(TokenKind::RBracket, "]")?;

            return Ok(Expr::new(
                ExprKind::ListComp {
                    element: Box::new(first),
                    target: Box::new(target),
                    iter: Box::new(iter),
                    conditions,
                },
                self.span_from(start),
            ));
        }

        let mut items = vec![first];
        while self.eat(TokenKind::Comma) {
            if self.peek().kind == TokenKind::RBracket {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect(TokenKind::RBracket, "]")?;

        Ok(Expr::new(ExprKind::List(items), self.span_from(start)))
    }

    fn dict(&mut self, start: Range) -> Result<Expr, ParseError> {
        let mut entries = Vec::new();

        while self.peek().kind != TokenKind::RBrace {
            let key = self.expr()?;
            self.expect(TokenKind::Colon, ":")?;
            let value = self.expr()?;
            entries.push((key, value));

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "}")?;

        Ok(Expr::new(ExprKind::Dict(entries), self.span_from(start)))
    }
}

/// Parses a standalone expression, e.g. a condition supplied outside of any statement.
pub fn parse_expr(tokens: &[Token]) -> Result<Expr, ParseError> {
    let tokens: Vec<Token> = tokens
        .iter()
        .filter(|t| !t.is_layout() && !matches!(t.kind, TokenKind::Comment(_)))
        .cloned()
        .collect();

    if tokens.is_empty() {
        return Err(ParseError::UnexpectedToken(Token::new(
            Range::default(),
            TokenKind::Eof,
        )));
    }

    let mut cursor = Cursor::new(&tokens);
    let expr = cursor.expr_list()?;

    match cursor.peek().kind {
        TokenKind::Eof => Ok(expr),
        _ => Err(ParseError::UnexpectedToken(cursor.peek().clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{Lexer, Options};
    use crate::range::Position;
    use rstest::rstest;

    fn parse(code: &str) -> Tree {
        let tokens = Lexer::new(Options::default()).tokenize(code).unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    fn parse_err(code: &str) -> ParseError {
        let tokens = Lexer::new(Options::default()).tokenize(code).unwrap();
        Parser::new(tokens).parse().unwrap_err()
    }

    fn kinds(tree: &Tree, block: &Block) -> Vec<&'static str> {
        block
            .iter()
            .map(|id| match tree[*id].kind {
                NodeKind::Expr(_) => "expr",
                NodeKind::Assign { .. } => "assign",
                NodeKind::AugAssign { .. } => "aug",
                NodeKind::Return(_) => "return",
                NodeKind::Yield(_) => "yield",
                NodeKind::Pass => "pass",
                NodeKind::Break => "break",
                NodeKind::Continue => "continue",
                NodeKind::If { .. } => "if",
                NodeKind::For { .. } => "for",
                NodeKind::While { .. } => "while",
                NodeKind::Def { .. } => "def",
                NodeKind::Comment(_) => "comment",
            })
            .collect()
    }

    #[rstest]
    #[case::simple("x = 1\nprint(x)", vec!["assign", "expr"])]
    #[case::semicolons("a = 1; b = 2", vec!["assign", "assign"])]
    #[case::comment_lines("# one\nx += 1\n# two", vec!["comment", "aug", "comment"])]
    #[case::compound("for i in range(3):\n    pass\nwhile x:\n    break", vec!["for", "while"])]
    #[case::blank_lines("a()\n\n\nb()\n", vec!["expr", "expr"])]
    #[case::bracket_continuation("x = [\n    1,  # one\n    2,\n]", vec!["assign"])]
    #[case::backslash_continuation("x = 1 + \\\n    2", vec!["assign"])]
    fn test_top_level_statements(#[case] code: &str, #[case] expected: Vec<&str>) {
        let tree = parse(code);
        assert_eq!(kinds(&tree, &tree.body), expected);
    }

    #[test]
    fn test_def_with_comments() {
        let tree = parse("def f(x, y=2, *args, **kw):\n    # PDC-Function\n    # PDC-VerbatimLine\n    print('hi')\n");
        let NodeKind::Def { name, params, body } = &tree[tree.body[0]].kind else {
            panic!("expected def");
        };
        assert_eq!(name, "f");
        assert_eq!(params.len(), 4);
        assert_eq!(params[2].kind, ParamKind::VarArgs);
        assert_eq!(params[3].kind, ParamKind::KwArgs);
        assert_eq!(kinds(&tree, body), vec!["comment", "comment", "expr"]);
        assert_eq!(
            tree[body[2]].range,
            Range::new(Position::new(4, 5), Position::new(4, 16))
        );
        assert_eq!(
            tree[tree.body[0]].range,
            Range::new(Position::new(1, 1), Position::new(4, 16))
        );
    }

    #[test]
    fn test_comment_placement_after_block() {
        let tree = parse("if x:\n    a()\n    # inner\n# outer\nb()");
        let NodeKind::If { body, .. } = &tree[tree.body[0]].kind else {
            panic!("expected if");
        };
        assert_eq!(kinds(&tree, body), vec!["expr", "comment"]);
        assert_eq!(kinds(&tree, &tree.body), vec!["if", "comment", "expr"]);
    }

    #[test]
    fn test_comment_before_else_stays_in_branch() {
        let tree = parse("if x:\n    a()\n# before else\nelse:\n    b()");
        let NodeKind::If { body, orelse, .. } = &tree[tree.body[0]].kind else {
            panic!("expected if");
        };
        assert_eq!(kinds(&tree, body), vec!["expr", "comment"]);
        assert_eq!(kinds(&tree, orelse), vec!["expr"]);
    }

    #[test]
    fn test_elif_chain() {
        let tree = parse("if a:\n    x()\nelif b:\n    y()\nelse:\n    z()");
        let NodeKind::If { orelse, .. } = &tree[tree.body[0]].kind else {
            panic!("expected if");
        };
        let NodeKind::If {
            is_elif, orelse: inner, ..
        } = &tree[orelse[0]].kind
        else {
            panic!("expected elif");
        };
        assert!(is_elif);
        assert_eq!(kinds(&tree, inner), vec!["expr"]);
    }

    #[test]
    fn test_trailing_comment() {
        let tree = parse("x = 1  # note\nif y:  # header\n    pass");
        assert_eq!(tree[tree.body[0]].comment.as_deref(), Some("# note"));
        assert_eq!(tree[tree.body[1]].comment.as_deref(), Some("# header"));
    }

    #[test]
    fn test_inline_suite() {
        let tree = parse("if x: y = 1\nz = 2");
        assert_eq!(kinds(&tree, &tree.body), vec!["if", "assign"]);
    }

    #[rstest]
    #[case::precedence("1 + 2 * 3 ** -x")]
    #[case::comparison_chain("a < b <= c not in d is not None")]
    #[case::conditional("a if b or not c else d")]
    #[case::comprehension("[x * 2 for x, y in pairs if x if y]")]
    #[case::call_args("f(1, *rest, key='v', **kw).g[0]")]
    #[case::containers("({'a': 1}, [], (), (1,))")]
    fn test_expression_parses(#[case] code: &str) {
        let tree = parse(code);
        assert!(matches!(tree[tree.body[0]].kind, NodeKind::Expr(_)));
    }

    #[test]
    fn test_operator_precedence_shape() {
        let tree = parse("1 + 2 * 3");
        let NodeKind::Expr(expr) = &tree[tree.body[0]].kind else {
            panic!("expected expr");
        };
        let ExprKind::Binary { op, right, .. } = &expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[rstest]
    #[case::unexpected_indent("a()\n    b()")]
    #[case::missing_block("if x:\nb()")]
    #[case::bad_target("f() = 1")]
    #[case::dangling_else("else:\n    pass")]
    #[case::unclosed_paren("f(1, 2")]
    fn test_parse_errors(#[case] code: &str) {
        let err = parse_err(code);
        assert!(err.range().start.line >= 1);
    }
}
