use std::fmt::Write;

use itertools::Itertools;

use super::node::{
    Arg, BinaryOp, Block, BoolOp, Expr, ExprKind, Literal, NodeId, NodeKind, Param, ParamKind, Tree,
    UnaryOp,
};

const INDENT: &str = "    ";

/// Binding strength of each expression form, loosest first.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
enum Precedence {
    Tuple,
    IfExp,
    Or,
    And,
    Not,
    Compare,
    Additive,
    Multiplicative,
    Unary,
    Power,
    Postfix,
    Atom,
}

impl Precedence {
    fn of(expr: &Expr) -> Precedence {
        match &expr.kind {
            ExprKind::IfExp { .. } => Precedence::IfExp,
            ExprKind::BoolOp { op: BoolOp::Or, .. } => Precedence::Or,
            ExprKind::BoolOp { op: BoolOp::And, .. } => Precedence::And,
            ExprKind::Unary { op: UnaryOp::Not, .. } => Precedence::Not,
            ExprKind::Compare { .. } => Precedence::Compare,
            ExprKind::Binary { op, .. } => match op {
                BinaryOp::Add | BinaryOp::Sub => Precedence::Additive,
                BinaryOp::Pow => Precedence::Power,
                _ => Precedence::Multiplicative,
            },
            ExprKind::Unary { .. } => Precedence::Unary,
            ExprKind::Call { .. } | ExprKind::Subscript { .. } | ExprKind::Attribute { .. } => {
                Precedence::Postfix
            }
            ExprKind::Literal(Literal::Int(i)) if *i < 0 => Precedence::Unary,
            ExprKind::Literal(Literal::Float(f)) if f.is_sign_negative() => Precedence::Unary,
            _ => Precedence::Atom,
        }
    }

    fn next(self) -> Precedence {
        match self {
            Precedence::Tuple => Precedence::IfExp,
            Precedence::IfExp => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Not,
            Precedence::Not => Precedence::Compare,
            Precedence::Compare => Precedence::Additive,
            Precedence::Additive => Precedence::Multiplicative,
            Precedence::Multiplicative => Precedence::Unary,
            Precedence::Unary => Precedence::Power,
            Precedence::Power => Precedence::Postfix,
            Precedence::Postfix | Precedence::Atom => Precedence::Atom,
        }
    }
}

/// Renders a tree back to canonical source text.
pub fn render(tree: &Tree) -> String {
    let mut lines = Vec::new();
    render_block(tree, &tree.body, 0, &mut lines);
    lines.join("\n")
}

/// Renders a single statement (and its nested blocks) at the given depth.
pub fn render_node(tree: &Tree, id: NodeId, depth: usize) -> String {
    let mut lines = Vec::new();
    render_statement(tree, id, depth, &mut lines);
    lines.join("\n")
}

fn render_block(tree: &Tree, block: &Block, depth: usize, lines: &mut Vec<String>) {
    if block.is_empty() {
        lines.push(format!("{}pass", INDENT.repeat(depth)));
        return;
    }

    for id in block {
        render_statement(tree, *id, depth, lines);
    }
}

fn push_line(lines: &mut Vec<String>, depth: usize, text: String, comment: &Option<String>) {
    let mut line = format!("{}{}", INDENT.repeat(depth), text);
    if let Some(comment) = comment {
        line.push_str("  ");
        line.push_str(comment);
    }
    lines.push(line);
}

fn render_statement(tree: &Tree, id: NodeId, depth: usize, lines: &mut Vec<String>) {
    let node = &tree[id];
    let comment = &node.comment;

    match &node.kind {
        NodeKind::Expr(expr) => push_line(lines, depth, render_expr(expr), comment),
        NodeKind::Assign { targets, value } => {
            let text = targets
                .iter()
                .map(render_target)
                .chain(std::iter::once(render_expr(value)))
                .join(" = ");
            push_line(lines, depth, text, comment);
        }
        NodeKind::AugAssign { target, op, value } => push_line(
            lines,
            depth,
            format!("{} {}= {}", render_target(target), op, render_expr(value)),
            comment,
        ),
        NodeKind::Return(value) => push_line(lines, depth, keyword_with("return", value), comment),
        NodeKind::Yield(value) => push_line(lines, depth, keyword_with("yield", value), comment),
        NodeKind::Pass => push_line(lines, depth, "pass".to_string(), comment),
        NodeKind::Break => push_line(lines, depth, "break".to_string(), comment),
        NodeKind::Continue => push_line(lines, depth, "continue".to_string(), comment),
        NodeKind::Comment(text) => lines.push(format!("{}{}", INDENT.repeat(depth), text)),
        NodeKind::If { .. } => render_if(tree, id, "if", depth, lines),
        NodeKind::For { target, iter, body } => {
            push_line(
                lines,
                depth,
                format!("for {} in {}:", render_target(target), render_expr(iter)),
                comment,
            );
            render_block(tree, body, depth + 1, lines);
        }
        NodeKind::While { test, body } => {
            push_line(lines, depth, format!("while {}:", render_expr(test)), comment);
            render_block(tree, body, depth + 1, lines);
        }
        NodeKind::Def { name, params, body } => {
            push_line(
                lines,
                depth,
                format!("def {}({}):", name, render_params(params)),
                comment,
            );
            render_block(tree, body, depth + 1, lines);
        }
    }
}

fn render_if(tree: &Tree, id: NodeId, keyword: &str, depth: usize, lines: &mut Vec<String>) {
    let node = &tree[id];
    let NodeKind::If {
        test, body, orelse, ..
    } = &node.kind
    else {
        render_statement(tree, id, depth, lines);
        return;
    };

    push_line(
        lines,
        depth,
        format!("{} {}:", keyword, render_expr(test)),
        &node.comment,
    );
    render_block(tree, body, depth + 1, lines);

    match orelse.as_slice() {
        [] => {}
        [only] if matches!(tree[*only].kind, NodeKind::If { is_elif: true, .. }) => {
            render_if(tree, *only, "elif", depth, lines);
        }
        _ => {
            lines.push(format!("{}else:", INDENT.repeat(depth)));
            render_block(tree, orelse, depth + 1, lines);
        }
    }
}

fn keyword_with(keyword: &str, value: &Option<Expr>) -> String {
    match value {
        Some(value) => format!("{} {}", keyword, render_target(value)),
        None => keyword.to_string(),
    }
}

pub fn render_params(params: &[Param]) -> String {
    params
        .iter()
        .map(|param| match param.kind {
            ParamKind::Positional => match &param.default {
                Some(default) => format!("{}={}", param.name, render_expr(default)),
                None => param.name.to_string(),
            },
            ParamKind::VarArgs => format!("*{}", param.name),
            ParamKind::KwArgs => format!("**{}", param.name),
        })
        .join(", ")
}

/// Tuples in target position are rendered without parentheses.
fn render_target(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Tuple(items) if items.len() > 1 => items.iter().map(render_expr).join(", "),
        _ => render_expr(expr),
    }
}

pub fn render_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, Precedence::Tuple);
    out
}

fn write_expr(out: &mut String, expr: &Expr, min: Precedence) {
    let parenthesize = Precedence::of(expr) < min;
    if parenthesize {
        out.push('(');
    }

    match &expr.kind {
        ExprKind::Literal(literal) => write_literal(out, literal),
        ExprKind::Name(name) => out.push_str(name),
        ExprKind::Tuple(items) => {
            out.push('(');
            write_items(out, items);
            if items.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        ExprKind::List(items) => {
            out.push('[');
            write_items(out, items);
            out.push(']');
        }
        ExprKind::Dict(entries) => {
            out.push('{');
            for (i, (key, value)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, key, Precedence::IfExp);
                out.push_str(": ");
                write_expr(out, value, Precedence::IfExp);
            }
            out.push('}');
        }
        ExprKind::ListComp {
            element,
            target,
            iter,
            conditions,
        } => {
            out.push('[');
            write_expr(out, element, Precedence::IfExp);
            out.push_str(" for ");
            out.push_str(&render_target(target));
            out.push_str(" in ");
            write_expr(out, iter, Precedence::Or);
            for condition in conditions {
                out.push_str(" if ");
                write_expr(out, condition, Precedence::Or);
            }
            out.push(']');
        }
        ExprKind::Attribute { value, attr } => {
            write_expr(out, value, Precedence::Postfix);
            out.push('.');
            out.push_str(attr);
        }
        ExprKind::Subscript { value, index } => {
            write_expr(out, value, Precedence::Postfix);
            out.push('[');
            out.push_str(&render_target(index));
            out.push(']');
        }
        ExprKind::Call { func, args } => {
            write_expr(out, func, Precedence::Postfix);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match arg {
                    Arg::Positional(value) => write_expr(out, value, Precedence::IfExp),
                    Arg::Keyword(name, value) => {
                        out.push_str(name);
                        out.push('=');
                        write_expr(out, value, Precedence::IfExp);
                    }
                    Arg::Star(value) => {
                        out.push('*');
                        write_expr(out, value, Precedence::IfExp);
                    }
                    Arg::DoubleStar(value) => {
                        out.push_str("**");
                        write_expr(out, value, Precedence::IfExp);
                    }
                }
            }
            out.push(')');
        }
        ExprKind::Unary { op, operand } => {
            let (text, precedence) = match op {
                UnaryOp::Not => ("not ", Precedence::Not),
                UnaryOp::Neg => ("-", Precedence::Unary),
                UnaryOp::Pos => ("+", Precedence::Unary),
            };
            out.push_str(text);
            write_expr(out, operand, precedence);
        }
        ExprKind::Binary { op, left, right } => {
            let precedence = Precedence::of(expr);
            if *op == BinaryOp::Pow {
                write_expr(out, left, Precedence::Postfix);
                out.push_str(" ** ");
                write_expr(out, right, Precedence::Unary);
            } else {
                write_expr(out, left, precedence);
                let _ = write!(out, " {} ", op);
                write_expr(out, right, precedence.next());
            }
        }
        ExprKind::BoolOp { op, left, right } => {
            let precedence = Precedence::of(expr);
            write_expr(out, left, precedence);
            let _ = write!(out, " {} ", op);
            write_expr(out, right, precedence.next());
        }
        ExprKind::Compare { left, comparisons } => {
            write_expr(out, left, Precedence::Additive);
            for (op, right) in comparisons {
                let _ = write!(out, " {} ", op);
                write_expr(out, right, Precedence::Additive);
            }
        }
        ExprKind::IfExp { test, body, orelse } => {
            write_expr(out, body, Precedence::Or);
            out.push_str(" if ");
            write_expr(out, test, Precedence::Or);
            out.push_str(" else ");
            write_expr(out, orelse, Precedence::IfExp);
        }
    }

    if parenthesize {
        out.push(')');
    }
}

fn write_items(out: &mut String, items: &[Expr]) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, item, Precedence::IfExp);
    }
}

fn write_literal(out: &mut String, literal: &Literal) {
    match literal {
        Literal::None => out.push_str("None"),
        Literal::Bool(true) => out.push_str("True"),
        Literal::Bool(false) => out.push_str("False"),
        Literal::Int(i) => {
            let _ = write!(out, "{}", i);
        }
        Literal::Float(f) => out.push_str(&format_float(*f)),
        Literal::Str(s) => out.push_str(&repr_str(s)),
    }
}

/// Formats a float the way the host language prints it: always with a
/// fractional part or exponent.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    format!("{:?}", f)
}

/// Quotes a string using Python `repr` rules.
pub fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::Parser;
    use crate::lexer::{Lexer, Options};
    use rstest::rstest;

    fn roundtrip(code: &str) -> String {
        let tokens = Lexer::new(Options::default()).tokenize(code).unwrap();
        render(&Parser::new(tokens).parse().unwrap())
    }

    #[rstest]
    #[case::print("print('hi')", "print('hi')")]
    #[case::spacing("x=1+2*3", "x = 1 + 2 * 3")]
    #[case::redundant_parens("y = (a + b) * (c)", "y = (a + b) * c")]
    #[case::left_assoc("a - (b - c)", "a - (b - c)")]
    #[case::power("(-x) ** 2 + -x ** 2", "(-x) ** 2 + -x ** 2")]
    #[case::tuple_target("a, b = 1, 2", "a, b = (1, 2)")]
    #[case::single_tuple("t = (1,)", "t = (1,)")]
    #[case::not_in("x not in y and not z", "x not in y and not z")]
    #[case::conditional("v = (a if b else c) + 1", "v = (a if b else c) + 1")]
    #[case::comprehension("[i*2 for i in range(3) if i]", "[i * 2 for i in range(3) if i]")]
    #[case::dict("{'a': [1, 2], 'b': {}}", "{'a': [1, 2], 'b': {}}")]
    #[case::call("f(1, *a, k=2, **kw)", "f(1, *a, k=2, **kw)")]
    #[case::float("x = 1.0", "x = 1.0")]
    #[case::quotes("s = \"it's\"", "s = \"it's\"")]
    #[case::escapes("s = 'a\\nb'", "s = 'a\\nb'")]
    #[case::return_tuple("def f():\n    return a, b", "def f():\n    return a, b")]
    fn test_render(#[case] code: &str, #[case] expected: &str) {
        assert_eq!(roundtrip(code), expected);
    }

    #[test]
    fn test_render_blocks_and_comments() {
        let code = "def f(x, y=1, *a, **k):  # head\n  # lead\n  if x:\n      pass\n  elif y:\n      a = 1  # tail\n  else:\n      # only comment\n      b = 2\n  for i, j in z: print(i)\n  while True:\n      break";
        let expected = "def f(x, y=1, *a, **k):  # head\n    # lead\n    if x:\n        pass\n    elif y:\n        a = 1  # tail\n    else:\n        # only comment\n        b = 2\n    for i, j in z:\n        print(i)\n    while True:\n        break";
        assert_eq!(roundtrip(code), expected);
    }

    #[rstest]
    #[case("", "''")]
    #[case("a'b", "\"a'b\"")]
    #[case("a'b\"", "'a\\'b\"'")]
    #[case("\u{1}", "'\\x01'")]
    #[case("back\\slash", "'back\\\\slash'")]
    fn test_repr_str(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(repr_str(input), expected);
    }

    #[test]
    fn test_render_is_idempotent() {
        let code = "def f(a):\n    # c\n    for x in [1,2]:\n        a += x if x else -x\n    return (a, [y for y in a])";
        let once = roundtrip(code);
        assert_eq!(roundtrip(&once), once);
    }
}
