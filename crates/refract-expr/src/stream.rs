//! Token stream for the expression parser.

use crate::error::{CompileError, Result, Span};
use crate::lexer::Token;

/// Cursor over lexed tokens with lookahead.
pub(crate) struct TokenStream<'src> {
    tokens: &'src [(Token, Span)],
    pos: usize,
    /// Length of the source text, used for end-of-input spans.
    end: usize,
}

impl<'src> TokenStream<'src> {
    pub fn new(tokens: &'src [(Token, Span)], end: usize) -> Self {
        Self { tokens, pos: 0, end }
    }

    pub fn peek(&self) -> Option<&'src Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    pub fn advance(&mut self) -> Option<&'src Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Whether the next token has the same variant as `expected`.
    pub fn check(&self, expected: &Token) -> bool {
        self.peek()
            .is_some_and(|t| std::mem::discriminant(t) == std::mem::discriminant(expected))
    }

    pub fn eat(&mut self, expected: &Token) -> bool {
        let matched = self.check(expected);
        if matched {
            self.pos += 1;
        }
        matched
    }

    pub fn expect(&mut self, expected: &Token) -> Result<Span> {
        if self.check(expected) {
            let span = self.current_span();
            self.pos += 1;
            Ok(span)
        } else {
            Err(self.error(&format!("where {} was expected", expected.describe())))
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Byte offset where the next token starts.
    pub fn current_pos(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(_, s)| s.start)
    }

    /// Span from `start` to the end of the last consumed token.
    pub fn span_from(&self, start: usize) -> Span {
        let end = self
            .pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(start, |(_, s)| s.end);
        start..end.max(start)
    }

    pub fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map_or(self.end..self.end, |(_, s)| s.clone())
    }

    /// Error describing the next token (or end of input) in `context`.
    pub fn error(&self, context: &str) -> CompileError {
        CompileError::unexpected(self.peek().map(Token::describe), context, self.current_span())
    }
}
