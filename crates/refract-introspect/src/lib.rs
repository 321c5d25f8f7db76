//! Bytecode introspection.
//!
//! Recovers the metadata the debugger needs from a compiled module: functions
//! with their source line bounds, arguments and locals, struct layouts,
//! uniforms and globals, and an instruction histogram.

mod introspector;
mod profile;
mod variable;

pub use introspector::{introspect, BytecodeIntrospector, EntryPoint, FunctionInfo, IntrospectionResult};
pub use profile::InstructionProfile;
pub use variable::{ValueType, Variable};

#[cfg(test)]
mod tests;
