//! Refract Expr - debugger expression compiler
//!
//! Parses GLSL-like expressions (`light.power * 2.0`, `v.wx`, `clamp(x, 0.0, 1.0)`)
//! and lowers them into an extra SPIR-V function that the VM can run next to
//! the shader being debugged.

pub mod ast;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;

mod codegen;
mod stream;

pub use codegen::Capture;
pub use compiler::{CompiledExpression, ExpressionCompiler, EVAL_FUNCTION, RESULT_GLOBAL};
pub use error::{CompileError, CompileErrorKind, Result, Span};
pub use parser::parse;

#[cfg(test)]
mod tests;
