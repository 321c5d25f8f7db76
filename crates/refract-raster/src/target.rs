//! Output buffers of the rasterizer.

use refract_vm::UndefinedBehavior;

/// Pack an RGBA float color into `0xAABBGGRR`.
pub fn pack_rgba8(color: [f32; 4]) -> u32 {
    color
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let byte = (c.clamp(0.0, 1.0) * 255.0).round() as u32;
            byte << (8 * i)
        })
        .fold(0, |acc, b| acc | b)
}

pub fn unpack_rgba8(packed: u32) -> [u8; 4] {
    packed.to_le_bytes()
}

/// Undefined behavior observed at one pixel.
///
/// Packed as `kind | count << 8 | line << 12`: the kind code in the low
/// byte, a repeat count capped at 15 in the next nibble, the line above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UbCell {
    pub kind: UndefinedBehavior,
    pub count: u8,
    pub line: u32,
}

impl UbCell {
    pub const MAX_COUNT: u8 = 15;
    pub const MAX_LINE: u32 = (1 << 20) - 1;

    pub fn pack(self) -> u32 {
        u32::from(self.kind.code())
            | u32::from(self.count.min(Self::MAX_COUNT)) << 8
            | self.line.min(Self::MAX_LINE) << 12
    }

    /// `None` for an empty cell.
    pub fn unpack(packed: u32) -> Option<Self> {
        let kind = UndefinedBehavior::from_code((packed & 0xff) as u8)?;
        Some(Self {
            kind,
            count: ((packed >> 8) & 0xf) as u8,
            line: packed >> 12,
        })
    }
}

/// Per-pixel buffers, row-major.
#[derive(Debug, Clone, Default)]
pub(crate) struct RenderTarget {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) color: Vec<u32>,
    pub(crate) depth: Vec<f32>,
    pub(crate) instructions: Vec<u32>,
    pub(crate) ub: Vec<u32>,
    pub(crate) breakpoints: Vec<bool>,
}

impl RenderTarget {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            color: vec![0; len],
            depth: vec![1.0; len],
            instructions: vec![0; len],
            ub: vec![0; len],
            breakpoints: vec![false; len],
        }
    }

    pub(crate) fn clear(&mut self, color: [f32; 4], depth: f32) {
        self.color.fill(pack_rgba8(color));
        self.depth.fill(depth);
        self.instructions.fill(0);
        self.ub.fill(0);
        self.breakpoints.fill(false);
    }

    pub(crate) fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y as usize * self.width as usize + x as usize)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.color.is_empty()
    }

    /// Fold one invocation's undefined behavior into the cell at `index`.
    /// Repeats of the same kind and line add up; anything else replaces it.
    pub(crate) fn record_ub(&mut self, index: usize, kind: UndefinedBehavior, line: u32, count: u32) {
        let Some(cell) = self.ub.get_mut(index) else {
            return;
        };
        let count = u8::try_from(count).unwrap_or(u8::MAX);
        let merged = match UbCell::unpack(*cell) {
            Some(prior) if prior.kind == kind && prior.line == line.min(UbCell::MAX_LINE) => {
                prior.count.saturating_add(count)
            }
            _ => count,
        };
        *cell = UbCell { kind, count: merged, line }.pack();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ub_cell_layout() {
        let cell = UbCell {
            kind: UndefinedBehavior::IndexOutOfBounds,
            count: 3,
            line: 42,
        };
        assert_eq!(cell.pack(), 2 | 3 << 8 | 42 << 12);
        assert_eq!(UbCell::unpack(cell.pack()), Some(cell));
        assert_eq!(UbCell::unpack(0), None);
    }

    #[test]
    fn test_ub_count_saturates() {
        let mut target = RenderTarget::new(1, 1);
        for _ in 0..20 {
            target.record_ub(0, UndefinedBehavior::DivisionByZero, 7, 1);
        }
        let cell = UbCell::unpack(target.ub[0]).unwrap();
        assert_eq!(cell.count, UbCell::MAX_COUNT);
        assert_eq!(cell.line, 7);

        target.record_ub(0, UndefinedBehavior::SqrtOfNegative, 9, 1);
        let cell = UbCell::unpack(target.ub[0]).unwrap();
        assert_eq!((cell.kind, cell.count, cell.line), (UndefinedBehavior::SqrtOfNegative, 1, 9));
    }

    #[test]
    fn test_rgba8_packing() {
        assert_eq!(pack_rgba8([1.0, 0.0, 0.0, 1.0]), 0xff00_00ff);
        assert_eq!(unpack_rgba8(pack_rgba8([0.0, 0.5, 2.0, -1.0])), [0, 128, 255, 0]);
    }
}
