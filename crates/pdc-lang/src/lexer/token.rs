use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::range::Range;

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone)]
pub struct Token {
    pub range: Range,
    pub kind: TokenKind,
}

impl Token {
    pub fn new(range: Range, kind: TokenKind) -> Self {
        Token { range, kind }
    }

    /// Tokens that never reach the parser's expression grammar.
    pub fn is_layout(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Whitespace(_) | TokenKind::Continuation | TokenKind::NewLine
        )
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone)]
pub enum TokenKind {
    // layout
    Comment(String),
    Continuation,
    Eof,
    NewLine,
    Whitespace(usize),

    // literals
    Ident(SmolStr),
    NumberLiteral(SmolStr),
    StringLiteral(String),

    // keywords
    And,
    Break,
    Continue,
    Def,
    Elif,
    Else,
    False,
    For,
    If,
    In,
    Is,
    None,
    Not,
    Or,
    Pass,
    Return,
    True,
    While,
    Yield,

    // punctuation
    Colon,
    Comma,
    Dot,
    EqEq,
    Equal,
    Gt,
    Gte,
    LBrace,
    LBracket,
    LParen,
    Lt,
    Lte,
    Minus,
    MinusEqual,
    NeEq,
    Percent,
    Plus,
    PlusEqual,
    RBrace,
    RBracket,
    RParen,
    SemiColon,
    Slash,
    SlashEqual,
    SlashSlash,
    Star,
    StarEqual,
    StarStar,
}

impl TokenKind {
    pub fn keyword(ident: &str) -> Option<TokenKind> {
        Some(match ident {
            "and" => TokenKind::And,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "def" => TokenKind::Def,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "False" => TokenKind::False,
            "for" => TokenKind::For,
            "if" => TokenKind::If,
            "in" => TokenKind::In,
            "is" => TokenKind::Is,
            "None" => TokenKind::None,
            "not" => TokenKind::Not,
            "or" => TokenKind::Or,
            "pass" => TokenKind::Pass,
            "return" => TokenKind::Return,
            "True" => TokenKind::True,
            "while" => TokenKind::While,
            "yield" => TokenKind::Yield,
            _ => return None,
        })
    }

    pub fn opens_bracket(&self) -> bool {
        matches!(self, TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace)
    }

    pub fn closes_bracket(&self) -> bool {
        matches!(self, TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.kind)
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match &self {
            TokenKind::Comment(comment) => write!(f, "{}", comment),
            TokenKind::Continuation => write!(f, "\\"),
            TokenKind::Eof => write!(f, "end of input"),
            TokenKind::NewLine => writeln!(f),
            TokenKind::Whitespace(n) => write!(f, "{}", " ".repeat(*n)),
            TokenKind::Ident(ident) => write!(f, "{}", ident),
            TokenKind::NumberLiteral(n) => write!(f, "{}", n),
            TokenKind::StringLiteral(s) => write!(f, "{:?}", s),
            TokenKind::And => write!(f, "and"),
            TokenKind::Break => write!(f, "break"),
            TokenKind::Continue => write!(f, "continue"),
            TokenKind::Def => write!(f, "def"),
            TokenKind::Elif => write!(f, "elif"),
            TokenKind::Else => write!(f, "else"),
            TokenKind::False => write!(f, "False"),
            TokenKind::For => write!(f, "for"),
            TokenKind::If => write!(f, "if"),
            TokenKind::In => write!(f, "in"),
            TokenKind::Is => write!(f, "is"),
            TokenKind::None => write!(f, "None"),
            TokenKind::Not => write!(f, "not"),
            TokenKind::Or => write!(f, "or"),
            TokenKind::Pass => write!(f, "pass"),
            TokenKind::Return => write!(f, "return"),
            TokenKind::True => write!(f, "True"),
            TokenKind::While => write!(f, "while"),
            TokenKind::Yield => write!(f, "yield"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Dot => write!(f, "."),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::Equal => write!(f, "="),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::Gte => write!(f, ">="),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::LParen => write!(f, "("),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Lte => write!(f, "<="),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::MinusEqual => write!(f, "-="),
            TokenKind::NeEq => write!(f, "!="),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::PlusEqual => write!(f, "+="),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::SemiColon => write!(f, ";"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::SlashEqual => write!(f, "/="),
            TokenKind::SlashSlash => write!(f, "//"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::StarEqual => write!(f, "*="),
            TokenKind::StarStar => write!(f, "**"),
        }
    }
}
