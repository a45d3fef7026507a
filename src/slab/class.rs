//! slab/class - size class table.
//!
//! Chunk sizes start at align8(item_min) and grow geometrically by `factor`
//! (at least 8 bytes per step) until half the usable slab; the last class is
//! always a whole slab minus its header. Class ids start at 1.

use crate::consts::{CLASS_INVALID, CLASS_MAX_COUNT, SLAB_HDR_SIZE};
use crate::util::align8;

#[derive(Debug, Clone)]
pub struct SlabClasses {
    sizes: Vec<u32>,
}

impl SlabClasses {
    pub fn new(slab_size: usize, item_min: usize, factor: f64) -> Self {
        let max = slab_size - SLAB_HDR_SIZE;
        let mut sizes = Vec::new();
        let mut size = align8(item_min);
        while size < max / 2 && sizes.len() < CLASS_MAX_COUNT - 1 {
            sizes.push(size as u32);
            let grown = (size as f64 * factor) as usize;
            size = align8(grown.max(size + 8));
        }
        sizes.push(max as u32);
        Self { sizes }
    }

    pub fn count(&self) -> usize {
        self.sizes.len()
    }

    /// Smallest class whose chunks hold `need` bytes.
    pub fn lookup(&self, need: usize) -> Option<u8> {
        let idx = self.sizes.partition_point(|&s| (s as usize) < need);
        if idx == self.sizes.len() {
            None
        } else {
            Some(idx as u8 + 1)
        }
    }

    pub fn chunk_size(&self, class: u8) -> usize {
        debug_assert!(class != CLASS_INVALID);
        self.sizes[class as usize - 1] as usize
    }

    pub fn is_valid(&self, class: u8) -> bool {
        class != CLASS_INVALID && (class as usize) <= self.sizes.len()
    }

    pub fn max_chunk(&self) -> usize {
        self.sizes.last().copied().unwrap_or(0) as usize
    }

    /// Chunks a slab of `slab_size` bytes holds for `class`.
    pub fn per_slab(&self, class: u8, slab_size: usize) -> u32 {
        ((slab_size - SLAB_HDR_SIZE) / self.chunk_size(class)) as u32
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, usize)> + '_ {
        self.sizes
            .iter()
            .enumerate()
            .map(|(i, &s)| (i as u8 + 1, s as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_grow_and_end_at_slab() {
        let c = SlabClasses::new(1 << 20, 48, 1.25);
        let sizes: Vec<usize> = c.iter().map(|(_, s)| s).collect();
        assert_eq!(sizes[0], 48);
        assert_eq!(sizes[1], 64); // 48 * 1.25 = 60 -> 64
        assert!(sizes.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(c.max_chunk(), (1 << 20) - SLAB_HDR_SIZE);
        assert_eq!(c.per_slab(c.count() as u8, 1 << 20), 1);
    }

    #[test]
    fn lookup_picks_smallest_fit() {
        let c = SlabClasses::new(1 << 20, 48, 1.25);
        assert_eq!(c.lookup(1), Some(1));
        assert_eq!(c.lookup(48), Some(1));
        assert_eq!(c.lookup(49), Some(2));
        assert_eq!(c.lookup(c.max_chunk()), Some(c.count() as u8));
        assert_eq!(c.lookup(c.max_chunk() + 1), None);
        assert!(!c.is_valid(CLASS_INVALID));
    }

    #[test]
    fn small_factor_is_capped() {
        let c = SlabClasses::new(1 << 30, 32, 1.0001);
        assert!(c.count() <= CLASS_MAX_COUNT);
    }
}
