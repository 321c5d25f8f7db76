//! Errors raised while reading a bytecode module.
//!
//! Every read from the word stream goes through a bounds check; a module that
//! is truncated or otherwise malformed produces one of these errors instead of
//! an out-of-range access.

use thiserror::Error;

/// Module result type.
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Malformed or incompatible bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    /// The module is shorter than the fixed 5-word header.
    #[error("module has {words} words, shorter than the 5-word header")]
    HeaderTooShort {
        /// Number of words actually present.
        words: usize,
    },

    /// The first word is not the SPIR-V magic number.
    #[error("invalid magic number {found:#010x}")]
    InvalidMagic {
        /// The word found in the magic slot.
        found: u32,
    },

    /// An instruction declared a word count of zero, which would never advance.
    #[error("instruction at word {offset} declares a zero word count")]
    ZeroWordCount {
        /// Word offset of the instruction.
        offset: usize,
    },

    /// An instruction runs past the end of the module.
    #[error("instruction at word {offset} needs {needed} words but only {available} remain")]
    Truncated {
        /// Word offset of the instruction.
        offset: usize,
        /// Declared word count.
        needed: usize,
        /// Words left in the module.
        available: usize,
    },

    /// An instruction is shorter than its opcode requires.
    #[error("opcode {opcode} at word {offset} has no operand {index}")]
    MissingOperand {
        /// Raw opcode.
        opcode: u16,
        /// Word offset of the instruction.
        offset: usize,
        /// Index of the missing operand (excluding the opcode word).
        index: usize,
    },

    /// A literal string is not nul-terminated inside its instruction or is not UTF-8.
    #[error("invalid string literal in instruction at word {offset}")]
    InvalidString {
        /// Word offset of the instruction.
        offset: usize,
    },

    /// A referenced id does not name a declared type.
    #[error("id {id} is not a declared type")]
    UnknownType {
        /// The offending id.
        id: u32,
    },

    /// A type declaration is cyclic, out of order, out of range or too large.
    #[error("type {id} is invalid: {reason}")]
    InvalidType {
        /// The declared id.
        id: u32,
        /// What the declaration violates.
        reason: &'static str,
    },
}
