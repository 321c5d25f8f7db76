//! Refract VM - stepping interpreter for SPIR-V shader modules
//!
//! A [`Program`] is the decoded, shareable form of a module. A [`VmSession`]
//! executes one invocation of it an instruction at a time, tracking the
//! source line, the call stack and any undefined behavior encountered.

mod error;
mod exec;
mod glsl;
mod program;
mod session;
mod value;

pub use error::{ExecutionError, Result, UbEvent, UndefinedBehavior};
pub use program::{EntryPointDef, FunctionDef, GlobalVar, Instr, LocalVar, Program, SourceLine};
pub use session::{CallFrame, StepEvent, Status, TextureSampler, VmSession, DEFAULT_INSTRUCTION_LIMIT};
pub use value::{Pointer, PointerRoot, ScalarKind, Value};

#[cfg(test)]
mod tests;
