//! Expression tokens.

use logos::Logos;

use crate::error::{CompileError, CompileErrorKind, Result, Span};

/// Expression token.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    #[token("true")]
    True,
    #[token("false")]
    False,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,

    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,

    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    /// Unsigned literal with a `u` suffix (e.g. `3u`).
    #[regex(r"[0-9]+[uU]", |lex| {
        let s = lex.slice();
        s[..s.len() - 1].parse::<u32>().ok()
    })]
    UInt(u32),

    /// Integer literal. Values that do not fit an `i32` are rejected by the parser.
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Integer(i64),

    /// Float literal, with an optional `f` suffix (e.g. `1.0`, `.5`, `2e3f`).
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?[fF]?", parse_float)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?[fF]?", parse_float)]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+[fF]?", parse_float)]
    Float(f64),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

fn parse_float(lex: &mut logos::Lexer<Token>) -> Option<f64> {
    lex.slice().trim_end_matches(['f', 'F']).parse().ok()
}

impl Token {
    /// Source-like rendering used in diagnostics.
    pub fn describe(&self) -> String {
        let text = match self {
            Token::True => "true",
            Token::False => "false",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::EqEq => "==",
            Token::BangEq => "!=",
            Token::Lt => "<",
            Token::LtEq => "<=",
            Token::Gt => ">",
            Token::GtEq => ">=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Bang => "!",
            Token::Dot => ".",
            Token::Comma => ",",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::UInt(v) => return format!("`{v}u`"),
            Token::Integer(v) => return format!("`{v}`"),
            Token::Float(v) => return format!("`{v}`"),
            Token::Ident(name) => return format!("`{name}`"),
        };
        format!("`{text}`")
    }
}

/// Tokenize `source`, pairing each token with its byte span.
pub fn lex(source: &str) -> Result<Vec<(Token, Span)>> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next() {
        match token {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                return Err(CompileError::new(
                    CompileErrorKind::InvalidToken,
                    format!("invalid token `{}`", lexer.slice()),
                    lexer.span(),
                ))
            }
        }
    }
    Ok(tokens)
}
