//! Spatial watches: one variable's value at every visible pixel.
//!
//! ```text
//! covered pixels: [f0, f1, f2, f3, f4, f5, ...]
//!                  └chunk 0┘ └chunk 1┘ └chunk 2┘
//!                      ↓         ↓         ↓
//!                  re-run to   re-run to  re-run to
//!                  `line`      `line`     `line`
//!                      └─────────┬─────────┘
//!                                ↓
//!                      merged in pixel order
//! ```
//!
//! Every fragment runs on its own VM clone, so workers share nothing but the
//! read-only template.

use rayon::prelude::*;

/// Per-pixel float components of a variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableValueMap {
    pub width: u32,
    pub height: u32,
    /// Components per pixel, 1 to 4.
    pub components: u32,
    /// `width * height * components` floats, row-major.
    pub values: Vec<f32>,
    /// Pixels where the variable was read.
    pub covered: Vec<bool>,
}

impl VariableValueMap {
    pub(crate) fn new(width: u32, height: u32, components: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            components,
            values: vec![0.0; len * components as usize],
            covered: vec![false; len],
        }
    }

    /// Components at `(x, y)`, if the variable was read there.
    pub fn get(&self, x: u32, y: u32) -> Option<&[f32]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = y as usize * self.width as usize + x as usize;
        if !self.covered.get(index).copied().unwrap_or(false) {
            return None;
        }
        let n = self.components as usize;
        self.values.get(index * n..index * n + n)
    }

    pub(crate) fn set(&mut self, index: usize, data: &[f32]) {
        let n = self.components as usize;
        if let Some(slot) = self.values.get_mut(index * n..index * n + n) {
            for (dst, src) in slot.iter_mut().zip(data.iter().chain(std::iter::repeat(&0.0))) {
                *dst = *src;
            }
            self.covered[index] = true;
        }
    }

    pub fn covered_count(&self) -> usize {
        self.covered.iter().filter(|c| **c).count()
    }
}

/// Map `values` in parallel chunks, keeping index order. Populations at or
/// below `serial_threshold` run on the calling thread.
pub(crate) fn parallel_chunked_map<T, U, F>(
    values: &[T],
    map_fn: F,
    chunk_size: usize,
    serial_threshold: usize,
) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync,
{
    if values.len() <= serial_threshold {
        return values.iter().map(&map_fn).collect();
    }
    values
        .par_chunks(chunk_size.max(1))
        .flat_map_iter(|chunk| chunk.iter().map(&map_fn).collect::<Vec<_>>())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunked_map_keeps_order() {
        let values: Vec<u32> = (0..1000).collect();
        let doubled = parallel_chunked_map(&values, |v| v * 2, 37, 10);
        assert_eq!(doubled, values.iter().map(|v| v * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_set_pads_missing_components() {
        let mut map = VariableValueMap::new(2, 1, 3);
        map.set(1, &[1.0]);
        assert_eq!(map.get(1, 0), Some(&[1.0, 0.0, 0.0][..]));
        assert_eq!(map.get(0, 0), None);
        assert_eq!(map.covered_count(), 1);
    }
}
