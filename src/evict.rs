//! Eviction extension point.
//!
//! When an allocation finds no free chunk, no room in the current slab and no
//! uncarved slab, the cache asks its `Evictor` for a victim slab. The cache
//! then unlinks the slab's items and hands the slab to the requesting class.
//! A victim holding RESERVED items is refused and the allocation fails.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait Evictor {
    /// Pick a slab id in `0..nslab`, or None to give up.
    fn choose(&mut self, nslab: u32) -> Option<u32>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoEviction;

impl Evictor for NoEviction {
    fn choose(&mut self, _nslab: u32) -> Option<u32> {
        None
    }
}

#[derive(Debug)]
pub struct RandomEviction {
    rng: StdRng,
}

impl RandomEviction {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomEviction {
    fn default() -> Self {
        Self::new()
    }
}

impl Evictor for RandomEviction {
    fn choose(&mut self, nslab: u32) -> Option<u32> {
        if nslab == 0 {
            return None;
        }
        Some(self.rng.gen_range(0..nslab))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_stays_in_range() {
        let mut ev = RandomEviction::with_seed(7);
        assert_eq!(ev.choose(0), None);
        for _ in 0..100 {
            assert!(ev.choose(3).unwrap() < 3);
        }
        assert_eq!(NoEviction.choose(3), None);
    }
}
