pub mod error;
pub mod token;

use error::LexerError;
use nom::Parser;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{is_not, tag, take},
    character::complete::{alpha1, alphanumeric1, char, digit1, line_ending, one_of},
    combinator::{map, opt, recognize},
    error::{Error as NomError, ErrorKind},
    multi::{many0, many1},
    sequence::{pair, preceded},
};
use nom_locate::position;
use smol_str::SmolStr;
use token::{Token, TokenKind};

use crate::range::{Range, Span};

macro_rules! define_token_parser {
    ($name:ident, $tag:expr, $kind:expr) => {
        fn $name(input: Span) -> IResult<Span, Token> {
            map(tag($tag), |span: Span| Token {
                range: span.into(),
                kind: $kind,
            })
            .parse(input)
        }
    };
}

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub include_spaces: bool,
}

pub struct Lexer {
    options: Options,
}

impl Lexer {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    pub fn tokenize(&self, input: &str) -> Result<Vec<Token>, LexerError> {
        match many0(token).parse(Span::new(input)) {
            Ok((span, tokens)) => {
                let eof: Range = span.into();

                if span.fragment().is_empty() {
                    let mut tokens: Vec<Token> = if self.options.include_spaces {
                        tokens
                    } else {
                        tokens
                            .into_iter()
                            .filter(|t| !matches!(t.kind, TokenKind::Whitespace(_)))
                            .collect()
                    };
                    tokens.push(Token {
                        range: Range::new(eof.start, eof.start),
                        kind: TokenKind::Eof,
                    });
                    Ok(tokens)
                } else {
                    Err(unexpected(span))
                }
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(unexpected(e.input)),
            Err(nom::Err::Incomplete(_)) => Err(LexerError::UnexpectedEOFDetected(Range::default())),
        }
    }
}

fn unexpected(span: Span) -> LexerError {
    let range: Range = span.into();
    let start = range.start;

    if span.fragment().starts_with(['\'', '"']) {
        LexerError::UnterminatedString(Range::new(start, start))
    } else {
        let text: String = span.fragment().chars().take(1).collect();
        LexerError::UnexpectedToken(Token {
            range: Range::new(
                start,
                crate::range::Position::new(start.line, start.column + 1),
            ),
            kind: TokenKind::Ident(text.into()),
        })
    }
}

fn comment(input: Span) -> IResult<Span, Token> {
    map(recognize(preceded(char('#'), opt(is_not("\n\r")))), |span: Span| {
        let kind = TokenKind::Comment(span.fragment().to_string());
        Token {
            range: span.into(),
            kind,
        }
    })
    .parse(input)
}

fn newline(input: Span) -> IResult<Span, Token> {
    map(line_ending, |span: Span| Token {
        range: span.into(),
        kind: TokenKind::NewLine,
    })
    .parse(input)
}

fn continuation(input: Span) -> IResult<Span, Token> {
    map(recognize(pair(char('\\'), line_ending)), |span: Span| Token {
        range: span.into(),
        kind: TokenKind::Continuation,
    })
    .parse(input)
}

fn spaces(input: Span) -> IResult<Span, Token> {
    map(recognize(many1(one_of(" \t"))), |span: Span| {
        let num = span.fragment().len();
        Token {
            range: span.into(),
            kind: TokenKind::Whitespace(num),
        }
    })
    .parse(input)
}

define_token_parser!(star_star, "**", TokenKind::StarStar);
define_token_parser!(slash_equal, "/=", TokenKind::SlashEqual);
define_token_parser!(slash_slash, "//", TokenKind::SlashSlash);
define_token_parser!(eq_eq, "==", TokenKind::EqEq);
define_token_parser!(ne_eq, "!=", TokenKind::NeEq);
define_token_parser!(lte, "<=", TokenKind::Lte);
define_token_parser!(gte, ">=", TokenKind::Gte);
define_token_parser!(plus_equal, "+=", TokenKind::PlusEqual);
define_token_parser!(minus_equal, "-=", TokenKind::MinusEqual);
define_token_parser!(star_equal, "*=", TokenKind::StarEqual);
define_token_parser!(l_paren, "(", TokenKind::LParen);
define_token_parser!(r_paren, ")", TokenKind::RParen);
define_token_parser!(l_bracket, "[", TokenKind::LBracket);
define_token_parser!(r_bracket, "]", TokenKind::RBracket);
define_token_parser!(l_brace, "{", TokenKind::LBrace);
define_token_parser!(r_brace, "}", TokenKind::RBrace);
define_token_parser!(comma, ",", TokenKind::Comma);
define_token_parser!(colon, ":", TokenKind::Colon);
define_token_parser!(semi_colon, ";", TokenKind::SemiColon);
define_token_parser!(dot, ".", TokenKind::Dot);
define_token_parser!(equal, "=", TokenKind::Equal);
define_token_parser!(lt, "<", TokenKind::Lt);
define_token_parser!(gt, ">", TokenKind::Gt);
define_token_parser!(plus, "+", TokenKind::Plus);
define_token_parser!(minus, "-", TokenKind::Minus);
define_token_parser!(star, "*", TokenKind::Star);
define_token_parser!(slash, "/", TokenKind::Slash);
define_token_parser!(percent, "%", TokenKind::Percent);

fn operators(input: Span) -> IResult<Span, Token> {
    alt((
        star_star,
        slash_equal,
        slash_slash,
        eq_eq,
        ne_eq,
        lte,
        gte,
        plus_equal,
        minus_equal,
        star_equal,
        equal,
        lt,
        gt,
        plus,
        minus,
        star,
        slash,
        percent,
    ))
    .parse(input)
}

fn punctuations(input: Span) -> IResult<Span, Token> {
    alt((
        l_paren, r_paren, l_bracket, r_bracket, l_brace, r_brace, comma, colon, semi_colon, dot,
    ))
    .parse(input)
}

fn number_literal(input: Span) -> IResult<Span, Token> {
    map(
        recognize((
            digit1,
            opt(pair(char('.'), opt(digit1))),
            opt((one_of("eE"), opt(one_of("+-")), digit1)),
        )),
        |span: Span| {
            let kind = TokenKind::NumberLiteral(SmolStr::new(span.fragment()));
            Token {
                range: span.into(),
                kind,
            }
        },
    )
    .parse(input)
}

/// Decodes a quoted literal starting at `input`, returning the decoded text and
/// the number of characters the literal occupies.
fn scan_string(fragment: &str) -> Option<(String, usize)> {
    let quote = fragment.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let triple: String = std::iter::repeat_n(quote, 3).collect();
    let is_triple = fragment.starts_with(&triple);
    let open = if is_triple { 3 } else { 1 };

    let body = &fragment[open..];
    let mut value = String::new();
    let mut chars = body.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '0' => value.push('\0'),
                    '\\' | '\'' | '"' => value.push(escaped),
                    '\n' => {}
                    'x' | 'u' | 'U' => {
                        let width = match escaped {
                            'x' => 2,
                            'u' => 4,
                            _ => 8,
                        };
                        let mut hex = String::with_capacity(width);
                        for _ in 0..width {
                            let (_, h) = chars.next_if(|(_, h)| h.is_ascii_hexdigit())?;
                            hex.push(h);
                        }
                        let code = u32::from_str_radix(&hex, 16).ok()?;
                        value.push(char::from_u32(code)?);
                    }
                    other => {
                        value.push('\\');
                        value.push(other);
                    }
                }
            }
            '\n' if !is_triple => return None,
            c if c == quote => {
                if !is_triple {
                    let end = open + i + 1;
                    return Some((value, fragment[..end].chars().count()));
                }
                if body[i..].starts_with(&triple) {
                    let end = open + i + 3;
                    return Some((value, fragment[..end].chars().count()));
                }
                value.push(c);
            }
            c => value.push(c),
        }
    }

    None
}

fn string_literal(input: Span) -> IResult<Span, Token> {
    let (span, start) = position(input)?;
    let Some((value, len)) = scan_string(span.fragment()) else {
        // An opening quote without a closing one cannot be anything else.
        return if span.fragment().starts_with(['\'', '"']) {
            Err(nom::Err::Failure(NomError::new(span, ErrorKind::Fail)))
        } else {
            Err(nom::Err::Error(NomError::new(span, ErrorKind::Char)))
        };
    };
    let (span, _) = take::<_, _, NomError<Span>>(len)(span)?;
    let (span, end) = position(span)?;

    Ok((
        span,
        Token {
            range: Range {
                start: start.into(),
                end: end.into(),
            },
            kind: TokenKind::StringLiteral(value),
        },
    ))
}

fn ident(input: Span) -> IResult<Span, Token> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        |span: Span| {
            let fragment = span.fragment();
            let kind = TokenKind::keyword(fragment)
                .unwrap_or_else(|| TokenKind::Ident(SmolStr::new(fragment)));
            Token {
                range: span.into(),
                kind,
            }
        },
    )
    .parse(input)
}

fn token(input: Span) -> IResult<Span, Token> {
    alt((
        newline,
        spaces,
        continuation,
        comment,
        string_literal,
        number_literal,
        ident,
        operators,
        punctuations,
    ))
    .parse(input)
}

#[cfg(test)]
mod tests {
    use crate::range::Position;

    use super::*;
    use rstest::rstest;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(Options::default())
            .tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[rstest]
    #[case::call("print('hi')", vec![
        TokenKind::Ident("print".into()),
        TokenKind::LParen,
        TokenKind::StringLiteral("hi".to_string()),
        TokenKind::RParen,
        TokenKind::Eof,
    ])]
    #[case::keywords("if x is not None:", vec![
        TokenKind::If,
        TokenKind::Ident("x".into()),
        TokenKind::Is,
        TokenKind::Not,
        TokenKind::None,
        TokenKind::Colon,
        TokenKind::Eof,
    ])]
    #[case::keyword_prefix("iffy", vec![TokenKind::Ident("iffy".into()), TokenKind::Eof])]
    #[case::operators("a **= b // c", vec![
        TokenKind::Ident("a".into()),
        TokenKind::StarStar,
        TokenKind::Equal,
        TokenKind::Ident("b".into()),
        TokenKind::SlashSlash,
        TokenKind::Ident("c".into()),
        TokenKind::Eof,
    ])]
    #[case::comment("x = 1  # PDC-Kill\n", vec![
        TokenKind::Ident("x".into()),
        TokenKind::Equal,
        TokenKind::NumberLiteral("1".into()),
        TokenKind::Comment("# PDC-Kill".to_string()),
        TokenKind::NewLine,
        TokenKind::Eof,
    ])]
    #[case::numbers("1.5 2e3 7", vec![
        TokenKind::NumberLiteral("1.5".into()),
        TokenKind::NumberLiteral("2e3".into()),
        TokenKind::NumberLiteral("7".into()),
        TokenKind::Eof,
    ])]
    #[case::continuation("a + \\\nb", vec![
        TokenKind::Ident("a".into()),
        TokenKind::Plus,
        TokenKind::Continuation,
        TokenKind::Ident("b".into()),
        TokenKind::Eof,
    ])]
    fn test_tokenize(#[case] input: &str, #[case] expected: Vec<TokenKind>) {
        assert_eq!(kinds(input), expected);
    }

    #[rstest]
    #[case::escapes(r#"'a\n\'b\\'"#, "a\n'b\\")]
    #[case::double_quotes(r#""it's""#, "it's")]
    #[case::hex(r#"'\x41é'"#, "Aé")]
    #[case::unknown_escape(r#"'\d'"#, "\\d")]
    #[case::triple("'''a\n'b'\n'''", "a\n'b'\n")]
    fn test_string_literal(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(
            kinds(input),
            vec![TokenKind::StringLiteral(expected.to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_token_ranges() {
        let tokens = Lexer::new(Options::default()).tokenize("def f():\n    pass").unwrap();
        let pass = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Pass)
            .unwrap();
        assert_eq!(
            pass.range,
            Range::new(Position::new(2, 5), Position::new(2, 9))
        );
    }

    #[test]
    fn test_include_spaces() {
        let tokens = Lexer::new(Options { include_spaces: true })
            .tokenize("  a")
            .unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Whitespace(2));
    }

    #[rstest]
    #[case::unterminated("x = 'abc", true)]
    #[case::newline_in_string("x = 'a\nb'", true)]
    #[case::stray_char("x = a ? b", false)]
    fn test_tokenize_error(#[case] input: &str, #[case] unterminated: bool) {
        let err = Lexer::new(Options::default()).tokenize(input).unwrap_err();
        assert_eq!(matches!(err, LexerError::UnterminatedString(_)), unterminated);
    }
}
