//! SPIR-V word stream plumbing.
//!
//! Everything above this crate reads bytecode through [`Module`] and
//! [`Instruction`], which check every access against the record bounds, and
//! writes it through [`ModuleBuilder`].

pub mod builder;
pub mod error;
pub mod op;
pub mod reader;
pub mod types;

pub use builder::{encode, ModuleBuilder};
pub use error::{ModuleError, Result};
pub use op::{
    BuiltIn, Category, Decoration, ExecutionMode, ExecutionModel, GlslOp, Op, StorageClass,
    GLSL_STD_450,
};
pub use reader::{decode_string, encode_string, Header, Instruction, Module, HEADER_WORDS, MAGIC};
pub use types::{TypeDesc, TypeTable, MAX_TYPE_DEPTH, MAX_TYPE_SLOTS};

#[cfg(test)]
mod tests;
