//! `pdc-lang` is the host language of [pdc](https://github.com/pdc-rs/pdc): a small,
//! indentation-based scripting language with a parser, a canonical renderer and
//! a tree-walking evaluator.
//!
//! ## Examples
//!
//! ```rust
//! use pdc_lang::{Args, Namespace, RuntimeValue};
//!
//! let namespace = Namespace::new("demo");
//! namespace.exec("def twice(x):\n    return x * 2").unwrap();
//!
//! let result = namespace.call("twice", Args::new(vec![RuntimeValue::Int(21)])).unwrap();
//! assert_eq!(result, RuntimeValue::Int(42));
//!
//! // Parse and render code
//! let tree = pdc_lang::parse("x=[1,2]  # two").unwrap();
//! assert_eq!(pdc_lang::render(&tree), "x = [1, 2]  # two");
//! ```
mod arena;
mod ast;
mod error;
mod eval;
mod lexer;
mod namespace;
mod range;

use ast::parser::Parser;
use lexer::Lexer;

pub use arena::{Arena, ArenaId};
pub use ast::error::ParseError;
pub use ast::node::{
    Arg as AstArg, BinaryOp, BoolOp, CmpOp, Expr as AstExpr, ExprKind as AstExprKind,
    Literal as AstLiteral, Node as AstNode, NodeKind as AstNodeKind, Param as AstParam, ParamKind,
    UnaryOp,
};
pub use ast::parser::parse_expr as parse_expr_tokens;
pub use ast::render::{format_float, render_expr, render_node, render_params, repr_str};
pub use ast::{Block, IdentName, NodeId, Tree};
pub use error::{Error, InnerError};
pub use eval::Options;
pub use eval::error::{RuntimeError, TemplateError};
pub use eval::runtime_value::{
    Args, BoundMethod, Function, FunctionParam, NativeFunction, Partial, RuntimeValue,
};
pub use lexer::Options as LexerOptions;
pub use lexer::error::LexerError;
pub use lexer::token::{Token, TokenKind};
pub use namespace::Namespace;
pub use range::{Position, Range, source_segment};

#[allow(clippy::result_large_err)]
pub fn tokenize(code: &str, options: LexerOptions) -> Result<Vec<Token>, Box<Error>> {
    Lexer::new(options)
        .tokenize(code)
        .map_err(|e| Box::new(Error::from_error(code, e)))
}

/// Parses `code` into a statement tree. Comments are kept.
pub fn parse(code: &str) -> Result<Tree, Box<Error>> {
    Parser::new(tokenize(code, LexerOptions::default())?)
        .parse()
        .map_err(|e| Box::new(Error::from_error(code, e)))
}

/// Parses a single expression.
pub fn parse_expr(code: &str) -> Result<AstExpr, Box<Error>> {
    parse_expr_tokens(&tokenize(code, LexerOptions::default())?)
        .map_err(|e| Box::new(Error::from_error(code, e)))
}

/// 1-based lines of `code` that continue a string literal opened on an earlier line.
///
/// Their leading whitespace is part of the literal. Code that does not tokenize has none.
pub fn string_continuation_lines(code: &str) -> Vec<u32> {
    let Ok(tokens) = Lexer::new(LexerOptions::default()).tokenize(code) else {
        return Vec::new();
    };
    tokens
        .iter()
        .filter(|token| matches!(token.kind, TokenKind::StringLiteral(_)))
        .flat_map(|token| token.range.start.line + 1..=token.range.end.line)
        .collect()
}

/// Renders a tree back to canonical source text.
pub fn render(tree: &Tree) -> String {
    ast::render::render(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::simple("x = 1")]
    #[case::nested("def f(a, *rest, **kw):\n    if a:\n        return [b for b in rest if b]\n    else:\n        pass")]
    #[case::comments("# leading\nx = 1  # trailing\n# closing")]
    fn test_parse_render_idempotent(#[case] code: &str) {
        let rendered = render(&parse(code).unwrap());
        let reparsed = render(&parse(&rendered).unwrap());
        assert_eq!(rendered, reparsed);
    }

    #[test]
    fn test_parse_error_has_location() {
        let err = parse("x = (1,\ny = 2").unwrap_err();
        assert!(matches!(err.cause, InnerError::Parse(_)));
    }

    #[rstest]
    #[case::single_line("x = 'a'\ny = 1", vec![])]
    #[case::triple_quoted("x = '''a\n  b\nc'''\ny = 1", vec![2, 3])]
    #[case::two_literals("f('''a\nb''', \"\"\"c\n\n\"\"\")", vec![2, 3, 4])]
    #[case::unterminated("x = '''a\nb", vec![])]
    fn test_string_continuation_lines(#[case] code: &str, #[case] expected: Vec<u32>) {
        assert_eq!(string_continuation_lines(code), expected);
    }

    #[test]
    fn test_parse_expr() {
        let expr = parse_expr("a + b * 2").unwrap();
        assert_eq!(render_expr(&expr), "a + b * 2");
    }
}
