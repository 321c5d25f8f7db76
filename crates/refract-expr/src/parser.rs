//! Pratt parser for debugger expressions.
//!
//! Precedence, loosest first:
//!
//! | Level | Operators |
//! |-------|-----------|
//! | 10 | `\|\|` |
//! | 20 | `&&` |
//! | 30 | `==` `!=` |
//! | 35 | `<` `<=` `>` `>=` |
//! | 40 | `+` `-` |
//! | 50 | `*` `/` `%` |
//! | prefix | `-` `!` |
//! | postfix | `.member` `[index]` |
//!
//! All binary operators are left-associative.

use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::error::{CompileError, CompileErrorKind, Result};
use crate::lexer::{lex, Token};
use crate::stream::TokenStream;

/// Parse a complete expression.
pub fn parse(source: &str) -> Result<Expr> {
    let tokens = lex(source)?;
    let mut stream = TokenStream::new(&tokens, source.len());
    let expr = parse_pratt(&mut stream, 0)?;
    if !stream.at_end() {
        return Err(stream.error("after expression"));
    }
    Ok(expr)
}

fn binary_op_info(token: &Token) -> Option<(u8, BinaryOp)> {
    Some(match token {
        Token::OrOr => (10, BinaryOp::Or),
        Token::AndAnd => (20, BinaryOp::And),
        Token::EqEq => (30, BinaryOp::Eq),
        Token::BangEq => (30, BinaryOp::Ne),
        Token::Lt => (35, BinaryOp::Lt),
        Token::LtEq => (35, BinaryOp::Le),
        Token::Gt => (35, BinaryOp::Gt),
        Token::GtEq => (35, BinaryOp::Ge),
        Token::Plus => (40, BinaryOp::Add),
        Token::Minus => (40, BinaryOp::Sub),
        Token::Star => (50, BinaryOp::Mul),
        Token::Slash => (50, BinaryOp::Div),
        Token::Percent => (50, BinaryOp::Mod),
        _ => return None,
    })
}

fn parse_pratt(stream: &mut TokenStream, min_prec: u8) -> Result<Expr> {
    let start = stream.current_pos();
    let mut left = parse_prefix(stream)?;

    while let Some((prec, op)) = stream.peek().and_then(binary_op_info) {
        if prec < min_prec {
            break;
        }
        stream.advance();
        let right = parse_pratt(stream, prec + 1)?;
        left = Expr::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            stream.span_from(start),
        );
    }
    Ok(left)
}

fn parse_prefix(stream: &mut TokenStream) -> Result<Expr> {
    let start = stream.current_pos();
    let op = match stream.peek() {
        Some(Token::Minus) => UnaryOp::Neg,
        Some(Token::Bang) => UnaryOp::Not,
        _ => return parse_postfix(stream),
    };
    stream.advance();
    let operand = parse_prefix(stream)?;
    Ok(Expr::new(
        ExprKind::Unary {
            op,
            operand: Box::new(operand),
        },
        stream.span_from(start),
    ))
}

fn parse_postfix(stream: &mut TokenStream) -> Result<Expr> {
    let start = stream.current_pos();
    let mut expr = parse_atom(stream)?;
    loop {
        if stream.eat(&Token::Dot) {
            let Some(Token::Ident(name)) = stream.peek() else {
                return Err(stream.error("after `.`"));
            };
            stream.advance();
            expr = Expr::new(
                ExprKind::Member {
                    base: Box::new(expr),
                    name: name.clone(),
                },
                stream.span_from(start),
            );
        } else if stream.eat(&Token::LBracket) {
            let index = parse_pratt(stream, 0)?;
            stream.expect(&Token::RBracket)?;
            expr = Expr::new(
                ExprKind::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                },
                stream.span_from(start),
            );
        } else {
            return Ok(expr);
        }
    }
}

fn parse_atom(stream: &mut TokenStream) -> Result<Expr> {
    let start = stream.current_pos();
    let span = stream.current_span();
    let Some(token) = stream.advance() else {
        return Err(stream.error("where an expression was expected"));
    };
    let kind = match token {
        Token::Float(v) => ExprKind::Float(*v as f32),
        Token::Integer(v) => match i32::try_from(*v) {
            Ok(v) => ExprKind::Int(v),
            Err(_) => {
                return Err(CompileError::new(
                    CompileErrorKind::InvalidToken,
                    format!("integer literal {v} does not fit in 32 bits"),
                    span,
                ))
            }
        },
        Token::UInt(v) => ExprKind::UInt(*v),
        Token::True => ExprKind::Bool(true),
        Token::False => ExprKind::Bool(false),
        Token::Ident(name) => {
            if stream.eat(&Token::LParen) {
                let args = parse_args(stream)?;
                ExprKind::Call {
                    name: name.clone(),
                    args,
                }
            } else {
                ExprKind::Ident(name.clone())
            }
        }
        Token::LParen => {
            let inner = parse_pratt(stream, 0)?;
            stream.expect(&Token::RParen)?;
            return Ok(Expr::new(inner.kind, stream.span_from(start)));
        }
        other => {
            return Err(CompileError::unexpected(
                Some(other.describe()),
                "where an expression was expected",
                span,
            ))
        }
    };
    Ok(Expr::new(kind, stream.span_from(start)))
}

/// Arguments after an opening parenthesis, consuming the closing one.
fn parse_args(stream: &mut TokenStream) -> Result<Vec<Expr>> {
    let mut args = Vec::new();
    if stream.eat(&Token::RParen) {
        return Ok(args);
    }
    loop {
        args.push(parse_pratt(stream, 0)?);
        if stream.eat(&Token::Comma) {
            continue;
        }
        stream.expect(&Token::RParen)?;
        return Ok(args);
    }
}
