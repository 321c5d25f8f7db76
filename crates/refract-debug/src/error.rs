//! Debug session errors.
//!
//! [`DebugSession::prepare_stage`](crate::DebugSession::prepare_stage) returns
//! a [`DebugError`]. Everything after a successful prepare recovers locally:
//! failures surface as `None`, `false` or a diagnostic string built from the
//! error.

use refract_expr::CompileError;
use refract_spirv::ModuleError;
use refract_vm::{ExecutionError, StepEvent};
use thiserror::Error;

use crate::stage::{SessionState, ShaderStage};

/// Debug result type alias.
pub type Result<T> = std::result::Result<T, DebugError>;

#[derive(Debug, Error)]
pub enum DebugError {
    /// The stage module could not be decoded.
    #[error("invalid module: {0}")]
    Module(#[from] ModuleError),

    /// The module decoded but has no entry point for the requested stage.
    #[error("module has no {0} entry point")]
    MissingEntryPoint(ShaderStage),

    /// A stage cannot be prepared while an invocation is live.
    #[error("cannot prepare a stage while the session is {0:?}")]
    Busy(SessionState),

    /// An expression captured a variable that is not live at this point.
    #[error("`{0}` is not available here")]
    Unavailable(String),

    /// An expression stopped before producing a value.
    #[error("evaluation stopped early: {0:?}")]
    Unfinished(StepEvent),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}
