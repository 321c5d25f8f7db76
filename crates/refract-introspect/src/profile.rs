//! Instruction histogram.

use refract_spirv::{Category, Op};

/// Per-category instruction counts for a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstructionProfile {
    pub arithmetic: u32,
    pub bitwise: u32,
    pub logical: u32,
    pub texture: u32,
    pub derivative: u32,
    pub control_flow: u32,
    /// The module contains a control or memory barrier.
    pub barrier_used: bool,
    /// Compute workgroup size; zero when the module declares none.
    pub local_size: [u32; 3],
}

impl InstructionProfile {
    pub(crate) fn count(&mut self, op: Op) {
        if op.is_barrier() {
            self.barrier_used = true;
        }
        let Some(category) = op.category() else {
            return;
        };
        let slot = match category {
            Category::Arithmetic => &mut self.arithmetic,
            Category::Bitwise => &mut self.bitwise,
            Category::Logical => &mut self.logical,
            Category::Texture => &mut self.texture,
            Category::Derivative => &mut self.derivative,
            Category::ControlFlow => &mut self.control_flow,
        };
        *slot += 1;
    }

    /// Sum of all six buckets.
    pub fn total(&self) -> u32 {
        self.arithmetic
            + self.bitwise
            + self.logical
            + self.texture
            + self.derivative
            + self.control_flow
    }
}
