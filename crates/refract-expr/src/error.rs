//! Compile error types.

use std::ops::Range;

use thiserror::Error;

/// Byte range in the expression text.
pub type Span = Range<usize>;

/// Compiler result type.
pub type Result<T> = std::result::Result<T, CompileError>;

/// Category of compile failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// No module has been set, or it could not be read.
    NoModule,
    /// Text that is not a token.
    InvalidToken,
    UnexpectedToken,
    UnexpectedEof,
    /// A name that is neither a visible variable nor a struct member.
    UnknownIdentifier,
    UnknownFunction,
    /// Operand types that cannot be combined, including vector size mismatches.
    TypeMismatch,
    /// Swizzle letters out of range or from mixed sets.
    InvalidSwizzle,
    /// Wrong number or kind of constructor arguments.
    InvalidConstructor,
}

/// Compile error with its location in the expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at {span:?}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
    pub span: Span,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
        }
    }

    pub fn no_module(message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::NoModule, message, 0..0)
    }

    /// Error for `found` where `context` was expected; `None` means end of input.
    pub fn unexpected(found: Option<String>, context: &str, span: Span) -> Self {
        match found {
            Some(token) => Self::new(
                CompileErrorKind::UnexpectedToken,
                format!("unexpected {token} {context}"),
                span,
            ),
            None => Self::new(
                CompileErrorKind::UnexpectedEof,
                format!("unexpected end of input {context}"),
                span,
            ),
        }
    }

    pub fn mismatch(message: impl Into<String>, span: Span) -> Self {
        Self::new(CompileErrorKind::TypeMismatch, message, span)
    }
}
