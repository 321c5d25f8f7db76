//! Refract Debug - stage-aware shader debug sessions
//!
//! A [`DebugSession`] binds one stage of a pipeline, feeds it inputs, and
//! either runs invocations to completion or steps a single one under
//! breakpoints. Expressions typed by the user are compiled into an extension
//! of the stage module and evaluated on a separate VM, so inspecting never
//! disturbs the invocation being debugged.

pub mod breakpoint;
pub mod config;
pub mod error;
mod eval;
pub mod inputs;
pub mod printer;
pub mod provider;
pub mod sample;
pub mod session;
pub mod stage;
pub mod watch;
mod workgroup;

pub use breakpoint::{Breakpoint, Breakpoints};
pub use config::{ClipDepth, SessionConfig};
pub use error::{DebugError, Result};
pub use eval::EvaluatedValue;
pub use inputs::{PixelInput, VertexInput, VertexOutput};
pub use printer::{color_preview, format_value};
pub use provider::{BindingProvider, StaticBindings};
pub use sample::PixelSample;
pub use session::{
    DebugSession, GeometryOutput, PixelResult, PixelRunner, TessellationOutput, UbSummary,
    VariableValue,
};
pub use stage::{SessionState, ShaderStage};
pub use watch::WatchExpression;
pub use workgroup::{ComputeResult, MAX_WORKGROUP_INVOCATIONS};

#[cfg(test)]
mod tests;
