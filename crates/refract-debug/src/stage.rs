//! Shader stages and session lifecycle.

use std::fmt;

use refract_spirv::ExecutionModel;
use serde::{Deserialize, Serialize};

/// Pipeline stage a session is prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Pixel,
    Geometry,
    TessellationControl,
    Compute,
}

impl ShaderStage {
    /// Execution model of the entry point that runs this stage.
    pub fn execution_model(self) -> ExecutionModel {
        match self {
            ShaderStage::Vertex => ExecutionModel::Vertex,
            ShaderStage::Pixel => ExecutionModel::Fragment,
            ShaderStage::Geometry => ExecutionModel::Geometry,
            ShaderStage::TessellationControl => ExecutionModel::TessellationControl,
            ShaderStage::Compute => ExecutionModel::GLCompute,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Pixel => "pixel",
            ShaderStage::Geometry => "geometry",
            ShaderStage::TessellationControl => "tessellation control",
            ShaderStage::Compute => "compute",
        };
        f.write_str(name)
    }
}

/// Where a [`DebugSession`](crate::DebugSession) is in its lifecycle.
///
/// ```text
/// Idle ──prepare──▶ Prepared ──step/continue──▶ Running ──▶ Suspended
///   ▲                  ▲                           │            │
///   └──── reset ───────┴──────── stop ◀── Stopped ◀┴────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No stage has been prepared.
    #[default]
    Idle,
    /// A stage is bound and inputs can be set.
    Prepared,
    /// An interactive invocation is executing.
    Running,
    /// Paused on a breakpoint or after a step.
    Suspended,
    /// The interactive invocation ended.
    Stopped,
}
