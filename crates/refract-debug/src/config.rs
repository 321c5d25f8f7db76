//! Session configuration.

use refract_vm::DEFAULT_INSTRUCTION_LIMIT;
use serde::{Deserialize, Serialize};

/// Range of clip-space `z / w` that maps onto window depth `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipDepth {
    /// Vulkan: window depth is `z / w`.
    #[default]
    ZeroToOne,
    /// OpenGL: window depth is `(z / w) * 0.5 + 0.5`.
    NegativeOneToOne,
}

impl ClipDepth {
    /// Window depth of a normalized device `z`, for the default depth range.
    pub fn window_depth(self, ndc_z: f32) -> f32 {
        match self {
            Self::ZeroToOne => ndc_z,
            Self::NegativeOneToOne => ndc_z * 0.5 + 0.5,
        }
    }
}

/// Tunables for a [`DebugSession`](crate::DebugSession).
///
/// Missing fields deserialize to their defaults, so a host application can
/// persist only what the user changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Per-invocation instruction ceiling. Exhausted invocations are stopped
    /// and, for pixels, counted as discarded.
    pub max_instructions: u64,

    /// Strip mangled parameter suffixes (`scale(f1;` → `scale`) from
    /// function names reported by introspection and call stacks.
    pub trim_function_names: bool,

    /// Carry storage-buffer writes from one executed invocation into the
    /// next, so atomics and counters accumulate across a pass or workgroup.
    pub write_back_storage: bool,

    /// Rounds of barrier synchronisation a compute workgroup may take before
    /// the remaining invocations are abandoned.
    pub max_barrier_rounds: u32,

    /// Clip-space depth convention used for `gl_FragCoord.z` and depth
    /// testing.
    pub clip_depth: ClipDepth,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_instructions: DEFAULT_INSTRUCTION_LIMIT,
            trim_function_names: true,
            write_back_storage: true,
            max_barrier_rounds: 1024,
            clip_depth: ClipDepth::default(),
        }
    }
}
